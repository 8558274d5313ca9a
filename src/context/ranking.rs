// Relevance scoring for search hits

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static MENTIONS_TESTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tests?|testing|spec|specs|coverage|e2e)\b").expect("valid test regex")
});

const MATCH_WEIGHT: i64 = 10;
const SOURCE_DIR_BOOST: i64 = 15;
const CORE_DIR_BOOST: i64 = 10;
const LAYER_DIR_BOOST: i64 = 8;
const UTIL_DIR_BOOST: i64 = 5;
const TEST_PATH_PENALTY: i64 = 20;
const FILENAME_KEYWORD_BOOST: i64 = 20;

/// Whether the request is about tests, which lifts the test-path penalty.
pub fn mentions_testing(request: &str) -> bool {
    MENTIONS_TESTS.is_match(request)
}

fn is_test_path(dirs: &[String], file_name: &str) -> bool {
    let test_dir = dirs.iter().any(|d| {
        matches!(
            d.as_str(),
            "test" | "tests" | "__tests__" | "spec" | "specs" | "example" | "examples" | "demo" | "demos"
        )
    });
    test_dir
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
        || file_name.contains("_test.")
        || file_name.starts_with("test_")
}

/// Score a file from its workspace-relative path and match count. Never negative.
pub fn score_file(relative_path: &Path, match_count: usize, keywords: &[String], request_mentions_tests: bool) -> u32 {
    let dirs: Vec<String> = relative_path
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                .collect()
        })
        .unwrap_or_default();
    let file_name = relative_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = relative_path
        .file_stem()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut score = match_count as i64 * MATCH_WEIGHT;

    if dirs.iter().any(|d| d == "src") {
        score += SOURCE_DIR_BOOST;
    }
    if dirs.iter().any(|d| d == "lib" || d == "core") {
        score += CORE_DIR_BOOST;
    }
    if dirs.iter().any(|d| {
        ["service", "component", "api", "engine"]
            .iter()
            .any(|layer| d.starts_with(layer))
    }) {
        score += LAYER_DIR_BOOST;
    }
    if dirs.iter().any(|d| d.starts_with("util") || d == "helpers") {
        score += UTIL_DIR_BOOST;
    }
    if !request_mentions_tests && is_test_path(&dirs, &file_name) {
        score -= TEST_PATH_PENALTY;
    }
    for keyword in keywords {
        if stem.contains(&keyword.to_lowercase()) {
            score += FILENAME_KEYWORD_BOOST;
        }
    }

    score.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_source_and_filename_boosts() {
        let keywords = kw(&["export", "csv"]);
        // 2*10 + src 15 + services 8 + "export" in stem 20
        assert_eq!(score_file(Path::new("src/services/export.rs"), 2, &keywords, false), 63);
        assert_eq!(score_file(Path::new("docs/notes.md"), 2, &keywords, false), 20);
    }

    #[test]
    fn test_test_paths_penalized_unless_requested() {
        let keywords = kw(&["billing"]);
        let path = Path::new("tests/billing_test.rs");
        // 10 + 20 - 20
        assert_eq!(score_file(path, 1, &keywords, false), 10);
        assert_eq!(score_file(path, 1, &keywords, true), 30);
    }

    #[test]
    fn test_score_is_clamped_at_zero() {
        assert_eq!(score_file(Path::new("examples/demo.rs"), 0, &[], false), 0);
    }

    #[test]
    fn test_mentions_testing() {
        assert!(mentions_testing("Add integration tests for checkout"));
        assert!(!mentions_testing("Add CSV export"));
        assert!(!mentions_testing("Contest leaderboard"));
    }
}
