// Model context limits, matched by case-insensitive substring

use std::collections::HashMap;

/// Limit used when no table entry matches.
pub const DEFAULT_MODEL_LIMIT: usize = 32_000;

/// Built-in limits. More specific identifiers must come before their prefixes
/// (`gpt-4o` before `gpt-4`, `claude-3-5` before `claude-3`).
const BUILTIN_LIMITS: &[(&str, usize)] = &[
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4.1", 1_000_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo-16k", 16_385),
    ("gpt-3.5", 16_385),
    ("o1-mini", 128_000),
    ("o1", 200_000),
    ("o3", 200_000),
    ("claude-3-5", 200_000),
    ("claude-3-7", 200_000),
    ("claude-3", 200_000),
    ("claude-sonnet", 200_000),
    ("claude-opus", 200_000),
    ("claude-haiku", 200_000),
    ("claude", 100_000),
    ("gemini-1.5-pro", 2_000_000),
    ("gemini-1.5", 1_000_000),
    ("gemini-2", 1_000_000),
    ("gemini", 32_760),
    ("grok", 131_072),
    ("mistral-large", 128_000),
    ("mistral", 32_000),
    ("llama-3.1", 128_000),
    ("llama-3", 8_192),
    ("qwen2.5", 32_768),
    ("deepseek", 64_000),
];

/// Ordered lookup table. Configured entries are consulted before the built-ins.
#[derive(Debug, Clone, Default)]
pub struct ModelTable {
    extra: Vec<(String, usize)>,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add configured limits. Longer identifiers are tried first so a
    /// configured `my-model-large` wins over `my-model`.
    pub fn with_extra(mut self, extra: &HashMap<String, usize>) -> Self {
        let mut entries: Vec<(String, usize)> = extra
            .iter()
            .map(|(id, limit)| (id.to_lowercase(), *limit))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        self.extra = entries;
        self
    }

    pub fn limit_for(&self, model_id: &str) -> usize {
        let id = model_id.to_lowercase();
        self.extra
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .chain(BUILTIN_LIMITS.iter().copied())
            .find(|(pattern, _)| id.contains(pattern))
            .map(|(_, limit)| limit)
            .unwrap_or(DEFAULT_MODEL_LIMIT)
    }
}
