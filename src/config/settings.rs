// Configuration structs
//
// Every field carries a serde default, so an empty or partial TOML file
// deserializes into a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::constants::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model identifier, used to size the token budget
    pub model: String,
    pub budget: BudgetSettings,
    pub refinement: RefinementSettings,
    pub context: ContextSettings,
    /// Extra model limits, matched by substring before the built-in table
    pub models: HashMap<String, usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            budget: BudgetSettings::default(),
            refinement: RefinementSettings::default(),
            context: ContextSettings::default(),
            models: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Share of the window held back for the model's response
    pub reserve_ratio: f64,
    pub analyst_ratio: f64,
    pub critic_ratio: f64,
    pub refiner_ratio: f64,
    /// Utilization above which turn history is summarized
    pub summarize_threshold: f64,
    /// Share of the usable window above which refinement is chunked
    pub chunk_threshold: f64,
    /// Skip the model table and use this limit
    pub max_tokens_override: Option<usize>,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            reserve_ratio: 0.25,
            analyst_ratio: 0.4,
            critic_ratio: 0.3,
            refiner_ratio: 0.5,
            summarize_threshold: 0.8,
            chunk_threshold: 0.8,
            max_tokens_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementSettings {
    pub max_iterations: u32,
    pub confidence_threshold: u8,
    pub invocation_timeout_secs: u64,
    pub compact_context_threshold_tokens: usize,
    pub max_critique_questions: usize,
    pub verbatim_clarifications: usize,
    pub summarize_keep_recent: usize,
    pub estimated_artifact_tokens: usize,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            invocation_timeout_secs: DEFAULT_INVOCATION_TIMEOUT_SECS,
            compact_context_threshold_tokens: DEFAULT_COMPACT_CONTEXT_TOKENS,
            max_critique_questions: DEFAULT_MAX_CRITIQUE_QUESTIONS,
            verbatim_clarifications: DEFAULT_VERBATIM_CLARIFICATIONS,
            summarize_keep_recent: DEFAULT_SUMMARIZE_KEEP_RECENT,
            estimated_artifact_tokens: DEFAULT_ESTIMATED_ARTIFACT_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Glob patterns a file must match (empty = everything)
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_results_per_keyword: usize,
    pub max_files: usize,
    pub case_sensitive: bool,
    pub max_keywords: usize,
    /// Files read in full before falling back to skeletons
    pub max_full_files: usize,
    /// Share of the budget spent on full file contents
    pub full_content_ratio: f64,
    /// Files estimated above this many tokens get a skeleton instead
    pub max_file_tokens: usize,
    /// Markup/style/data files up to this size may be inlined
    pub small_file_bytes: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            max_results_per_keyword: 200,
            max_files: 2_000,
            case_sensitive: false,
            max_keywords: 10,
            max_full_files: 10,
            full_content_ratio: 0.7,
            max_file_tokens: 5_000,
            small_file_bytes: 4_096,
        }
    }
}
