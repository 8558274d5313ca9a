// Context relevance builder against real and in-memory workspaces

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use specforge::config::ContextSettings;
use specforge::context::{
    ContextRelevanceBuilder, ContextStrategy, FileReader, FileSearch, LocalWorkspace, SearchMatch,
    SearchOptions,
};

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn local_builder(root: &Path) -> ContextRelevanceBuilder {
    let workspace = Arc::new(LocalWorkspace::new(root));
    ContextRelevanceBuilder::new(root, workspace.clone(), workspace, ContextSettings::default())
}

#[tokio::test]
async fn test_no_matches_falls_back_to_skeletons() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.rs", "fn main() {\n    println!(\"hello\");\n}\n");
    write(dir.path(), "README.md", "Demo project\n");

    let context = local_builder(dir.path())
        .build_context("Add CSV export", 2_000)
        .await
        .unwrap();

    assert_eq!(context.strategy, ContextStrategy::SkeletonOnly);
    assert!(context.files.is_empty());
    assert_eq!(context.keywords, vec!["export", "csv"]);
    assert_eq!(context.listed_files, vec!["README.md", "src/main.rs"]);
    assert!(context.content.starts_with("## Workspace files\n"));
    assert!(context.content.contains("// File: src/main.rs (signatures)\nfn main()"));
    assert_eq!(context.skeleton_files, 1);
    assert_eq!(context.full_content_files, 0);
}

#[tokio::test]
async fn test_ranked_context_prefers_source_over_tests() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/export/csv.rs", "pub fn export_csv() {}\n");
    write(dir.path(), "tests/export_test.rs", "fn test_export_csv() { export_csv(); }\n");
    write(dir.path(), "notes.txt", "nothing relevant\n");

    let context = local_builder(dir.path())
        .build_context("Add CSV export", 4_000)
        .await
        .unwrap();

    assert_eq!(context.strategy, ContextStrategy::Ranked);
    let order: Vec<&str> = context.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(order, vec!["src/export/csv.rs", "tests/export_test.rs"]);
    assert!(context.files[0].score > context.files[1].score);
    assert_eq!(context.full_content_files, 2);
    assert!(context
        .content
        .starts_with("// File: src/export/csv.rs\npub fn export_csv() {}\n\n"));
    assert!(!context.content.contains("nothing relevant"));
}

#[tokio::test]
async fn test_tests_rank_higher_when_requested() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/report.rs", "// report\n");
    write(dir.path(), "tests/report_test.rs", "// report\n// report\n// report\n");

    let context = local_builder(dir.path())
        .build_context("Add tests for report", 4_000)
        .await
        .unwrap();

    assert_eq!(context.files[0].relative_path, "tests/report_test.rs");
}

#[tokio::test]
async fn test_budget_is_never_exceeded() {
    let dir = TempDir::new().unwrap();
    let body: String = (0..200).map(|i| format!("// export csv row {i}\n")).collect();
    for i in 0..12 {
        write(dir.path(), &format!("src/file_{i:02}.rs"), &body);
    }

    let budget = 3_000;
    let context = local_builder(dir.path())
        .build_context("Add CSV export", budget)
        .await
        .unwrap();

    assert!(context.estimated_tokens <= budget, "{} > {budget}", context.estimated_tokens);
    assert!(context.full_content_files >= 1);
    assert!(context.full_content_files < 12);
}

#[tokio::test]
async fn test_files_lists_only_contributing_paths() {
    let dir = TempDir::new().unwrap();
    let body: String = (0..200).map(|i| format!("// export csv row {i}\n")).collect();
    for i in 0..12 {
        write(dir.path(), &format!("src/file_{i:02}.rs"), &body);
    }

    let context = local_builder(dir.path())
        .build_context("Add CSV export", 3_000)
        .await
        .unwrap();

    assert_eq!(context.strategy, ContextStrategy::Ranked);
    assert_eq!(context.files.len(), context.full_content_files + context.skeleton_files);
    assert!(context.files.len() < 12);
    for file in &context.files {
        let banner = format!("// File: {}", file.relative_path);
        assert!(context.content.contains(&banner), "{banner} missing from content");
    }
}

#[tokio::test]
async fn test_empty_workspace_yields_placeholder() {
    let dir = TempDir::new().unwrap();
    let context = local_builder(dir.path())
        .build_context("Add CSV export", 500)
        .await
        .unwrap();

    assert_eq!(context.strategy, ContextStrategy::Placeholder);
    assert!(context.listed_files.is_empty());
    assert!(context.content.contains("contains no files"));
}

#[tokio::test]
async fn test_markup_only_workspace_inlines_small_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "# Demo\nA small project.\n");
    write(dir.path(), "settings.json", "{\"theme\": \"dark\"}\n");

    let context = local_builder(dir.path())
        .build_context("Add CSV export", 2_000)
        .await
        .unwrap();

    assert_eq!(context.strategy, ContextStrategy::InlineSmallFiles);
    assert!(context.content.contains("// File: README.md\n# Demo"));
    assert!(context.content.contains("// File: settings.json"));
}

/// Search results come from a fixed list; reads come from a map.
struct FixedWorkspace {
    hits: Vec<PathBuf>,
    files: HashMap<PathBuf, String>,
}

#[async_trait]
impl FileSearch for FixedWorkspace {
    async fn search(&self, _keyword: &str, _options: &SearchOptions) -> Result<Vec<SearchMatch>> {
        Ok(self
            .hits
            .iter()
            .map(|path| SearchMatch {
                path: path.clone(),
                line: 1,
                preview: String::new(),
            })
            .collect())
    }

    async fn list_files(&self, _options: &SearchOptions) -> Result<Vec<PathBuf>> {
        Ok(self.hits.clone())
    }
}

#[async_trait]
impl FileReader for FixedWorkspace {
    async fn read(&self, path: &Path) -> Result<String> {
        match self.files.get(path) {
            Some(body) => Ok(body.clone()),
            None => bail!("unexpected read of {}", path.display()),
        }
    }

    async fn skeleton(&self, _path: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_hits_outside_root_are_discarded() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("ws");
    write(&root, "src/export.rs", "pub fn export() {}\n");
    write(dir.path(), "outside.rs", "secret export\n");
    let root = fs::canonicalize(&root).unwrap();

    let inside = root.join("src/export.rs");
    let workspace = Arc::new(FixedWorkspace {
        hits: vec![
            inside.clone(),
            root.join("../outside.rs"),
            PathBuf::from("src/../../outside.rs"),
            PathBuf::from("/etc/passwd"),
        ],
        files: HashMap::from([(inside, "pub fn export() {}\n".to_string())]),
    });
    let builder = ContextRelevanceBuilder::new(&root, workspace.clone(), workspace, ContextSettings::default());

    let context = builder.build_context("Add CSV export", 2_000).await.unwrap();
    let paths: Vec<&str> = context.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["src/export.rs"]);
    assert!(!context.content.contains("secret"));
    for file in &context.files {
        assert!(file.path.starts_with(builder.root()));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_ignored() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    write(outside.path(), "secret.rs", "// export csv TOP SECRET\n");
    write(dir.path(), "src/lib.rs", "// export csv\n");
    std::os::unix::fs::symlink(outside.path().join("secret.rs"), dir.path().join("src/leak.rs")).unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();

    let builder = local_builder(dir.path());
    let context = builder.build_context("Add CSV export", 4_000).await.unwrap();

    assert!(!context.content.contains("TOP SECRET"));
    assert!(context.files.iter().all(|f| f.path.starts_with(builder.root())));
    assert!(builder.contain(&dir.path().join("src/leak.rs")).is_none());
}

#[tokio::test]
async fn test_unreadable_hits_are_not_reported() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/export.rs", "pub fn export() {}\n");
    write(dir.path(), "src/export_gone.rs", "");
    let root = fs::canonicalize(dir.path()).unwrap();

    let readable = root.join("src/export.rs");
    let workspace = Arc::new(FixedWorkspace {
        hits: vec![readable.clone(), root.join("src/export_gone.rs")],
        files: HashMap::from([(readable, "pub fn export() {}\n".to_string())]),
    });
    let builder = ContextRelevanceBuilder::new(&root, workspace.clone(), workspace, ContextSettings::default());

    let context = builder.build_context("Add CSV export", 2_000).await.unwrap();
    let paths: Vec<&str> = context.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["src/export.rs"]);
    assert_eq!(context.full_content_files, 1);
}
