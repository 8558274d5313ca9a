// Content truncation that respects file and section boundaries when it can

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::estimate_tokens;

/// Lines that start a new logical unit: markdown headings, file banners, rules.
static SECTION_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:#{1,6} |// File:|File:|={3,})").expect("valid boundary regex")
});

const HEAD_TAIL_MARKER: &str = "\n\n[... content truncated to fit token budget ...]\n\n";

/// Share of the target kept for leading sections.
const HEAD_SECTION_RATIO: f64 = 0.7;

/// Tails shorter than this are not worth keeping.
const MIN_TAIL_TOKENS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationResult {
    pub content: String,
    pub was_truncated: bool,
    pub original_tokens: usize,
    pub truncated_tokens: usize,
}

/// Fit `content` into `target_tokens`.
///
/// Input that already fits comes back unchanged. Otherwise whole leading
/// sections are kept, an omission marker is inserted, and the final section is
/// appended (trimmed if needed). Unstructured text falls back to head + tail
/// around a marker. The result never exceeds the target.
pub fn truncate_context(content: &str, target_tokens: usize) -> TruncationResult {
    let original_tokens = estimate_tokens(content);
    if original_tokens <= target_tokens {
        return TruncationResult {
            content: content.to_string(),
            was_truncated: false,
            original_tokens,
            truncated_tokens: original_tokens,
        };
    }

    let truncated = truncate_by_sections(content, target_tokens)
        .unwrap_or_else(|| truncate_head_tail(content, target_tokens));
    let truncated_tokens = estimate_tokens(&truncated);
    debug_assert!(truncated_tokens <= target_tokens);

    tracing::debug!(
        original_tokens,
        truncated_tokens,
        target_tokens,
        "Truncated content to fit budget"
    );

    TruncationResult {
        content: truncated,
        was_truncated: true,
        original_tokens,
        truncated_tokens,
    }
}

fn split_sections(content: &str) -> Vec<&str> {
    let mut starts: Vec<usize> = SECTION_BOUNDARY.find_iter(content).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    let mut sections = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(content.len());
        if end > *start {
            sections.push(&content[*start..end]);
        }
    }
    sections
}

fn truncate_by_sections(content: &str, target_tokens: usize) -> Option<String> {
    let sections = split_sections(content);
    if sections.len() < 3 {
        return None;
    }

    let head_budget = (target_tokens as f64 * HEAD_SECTION_RATIO) as usize;
    let last = sections.len() - 1;

    let mut head = String::new();
    let mut kept = 0;
    for section in &sections[..last] {
        let candidate_tokens = estimate_tokens(&head) + estimate_tokens(section);
        if candidate_tokens > head_budget {
            break;
        }
        head.push_str(section);
        kept += 1;
    }
    if kept == 0 {
        return None;
    }

    let omitted = last - kept;
    let marker = format!("\n[... {omitted} sections omitted to fit token budget ...]\n\n");
    let mut result = head;
    result.push_str(&marker);

    let used = estimate_tokens(&result);
    let remaining = target_tokens.saturating_sub(used);
    let tail = sections[last];
    if estimate_tokens(tail) <= remaining {
        result.push_str(tail);
    } else if remaining >= MIN_TAIL_TOKENS {
        result.push_str(take_chars(tail, remaining * 4));
    }

    (estimate_tokens(&result) <= target_tokens).then_some(result)
}

fn truncate_head_tail(content: &str, target_tokens: usize) -> String {
    let marker_tokens = estimate_tokens(HEAD_TAIL_MARKER);
    if target_tokens <= marker_tokens {
        return take_chars(content, target_tokens * 4).to_string();
    }

    let available_chars = (target_tokens - marker_tokens) * 4;
    let head_chars = available_chars * 2 / 3;
    let tail_chars = available_chars - head_chars;

    let mut result = String::with_capacity(available_chars + HEAD_TAIL_MARKER.len());
    result.push_str(take_chars(content, head_chars));
    result.push_str(HEAD_TAIL_MARKER);
    result.push_str(last_chars(content, tail_chars));
    result
}

/// Prefix of at most `n` characters, cut on a char boundary.
pub(crate) fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Suffix of at most `n` characters, cut on a char boundary.
pub(crate) fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
