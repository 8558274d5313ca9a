// Project-wide constants
//
// Defaults for the refinement protocol and the context builder live here so
// settings and tests share one source of truth.

/// Model identifier used when neither config nor environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Environment variable overriding the configured model.
pub const MODEL_ENV_VAR: &str = "SPECFORGE_MODEL";

/// Config file location, relative to the home directory.
pub const CONFIG_RELATIVE_PATH: &str = ".specforge/config.toml";

/// Clarification rounds before refinement is forced.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Critique confidence at or above which the draft goes to the refiner.
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 70;

/// Per-invocation timeout (5 minutes).
pub const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 300;

/// Context packages above this size get the compact analyst prompt.
pub const DEFAULT_COMPACT_CONTEXT_TOKENS: usize = 5_000;

/// Critique issues converted into follow-up questions.
pub const DEFAULT_MAX_CRITIQUE_QUESTIONS: usize = 3;

/// Clarifications listed verbatim before older ones get compressed.
pub const DEFAULT_VERBATIM_CLARIFICATIONS: usize = 5;

/// Turns kept intact when history is summarized.
pub const DEFAULT_SUMMARIZE_KEEP_RECENT: usize = 4;

/// Expected size of a finished artifact, used for the chunking decision.
pub const DEFAULT_ESTIMATED_ARTIFACT_TOKENS: usize = 4_000;

/// Directories never searched.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/vendor/**",
    "**/__pycache__/**",
];
