// Token budget manager: accounting, truncation and summarization
//
// Pure bookkeeping over estimated token counts. Nothing in here knows about
// sessions beyond the per-persona allocation ratios.

use serde::Serialize;

use crate::config::{BudgetSettings, Config};
use crate::protocol::{ConversationTurn, Persona};

pub mod models;
pub mod summarize;
pub mod truncate;

pub use models::{ModelTable, DEFAULT_MODEL_LIMIT};
pub use summarize::summarize_turns;
pub use truncate::{truncate_context, TruncationResult};

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBudgetState {
    pub max_tokens: usize,
    pub reserve_ratio: f64,
    pub conversation_tokens: usize,
    pub system_prompt_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetTelemetry {
    pub used: usize,
    pub available: usize,
    pub utilization_pct: f64,
    pub max: usize,
}

impl std::fmt::Display for BudgetTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} tokens used ({:.1}%), {} available",
            self.used, self.max, self.utilization_pct, self.available
        )
    }
}

#[derive(Debug, Clone)]
pub struct TokenBudgetManager {
    state: TokenBudgetState,
    settings: BudgetSettings,
}

impl TokenBudgetManager {
    pub fn new(max_tokens: usize, settings: BudgetSettings) -> Self {
        Self {
            state: TokenBudgetState {
                max_tokens,
                reserve_ratio: settings.reserve_ratio.clamp(0.0, 1.0),
                conversation_tokens: 0,
                system_prompt_tokens: 0,
            },
            settings,
        }
    }

    /// Size the budget from the model table (plus configured limits).
    pub fn for_model(model_id: &str, config: &Config) -> Self {
        let max_tokens = config
            .budget
            .max_tokens_override
            .unwrap_or_else(|| ModelTable::new().with_extra(&config.models).limit_for(model_id));
        tracing::debug!(model = model_id, max_tokens, "Sized token budget");
        Self::new(max_tokens, config.budget.clone())
    }

    pub fn state(&self) -> &TokenBudgetState {
        &self.state
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    fn reserve_tokens(&self) -> usize {
        (self.state.max_tokens as f64 * self.state.reserve_ratio) as usize
    }

    fn usable_tokens(&self) -> usize {
        self.state.max_tokens.saturating_sub(self.reserve_tokens())
    }

    fn used_tokens(&self) -> usize {
        self.state.system_prompt_tokens + self.state.conversation_tokens
    }

    /// Tokens left after the response reserve, system prompt and conversation.
    pub fn remaining_tokens(&self) -> usize {
        self.usable_tokens().saturating_sub(self.used_tokens())
    }

    pub fn stage_ratio(&self, stage: Persona) -> f64 {
        let ratio = match stage {
            Persona::Analyst => self.settings.analyst_ratio,
            Persona::Critic => self.settings.critic_ratio,
            Persona::Refiner => self.settings.refiner_ratio,
        };
        ratio.clamp(0.0, 1.0)
    }

    /// Allocation for one persona turn: `floor(remaining * ratio)`.
    pub fn available_tokens(&self, stage: Persona) -> usize {
        (self.remaining_tokens() as f64 * self.stage_ratio(stage)).floor() as usize
    }

    pub fn utilization_pct(&self) -> f64 {
        let usable = self.usable_tokens();
        if usable == 0 {
            return 100.0;
        }
        self.used_tokens() as f64 / usable as f64 * 100.0
    }

    pub fn telemetry(&self) -> BudgetTelemetry {
        BudgetTelemetry {
            used: self.used_tokens(),
            available: self.remaining_tokens(),
            utilization_pct: self.utilization_pct(),
            max: self.state.max_tokens,
        }
    }

    pub fn needs_summarization(&self) -> bool {
        self.utilization_pct() > self.settings.summarize_threshold * 100.0
    }

    /// True when context plus expected output would crowd out the window.
    pub fn needs_chunked_generation(&self, context_tokens: usize, estimated_output_tokens: usize) -> bool {
        let window = self
            .usable_tokens()
            .saturating_sub(self.state.system_prompt_tokens);
        (context_tokens + estimated_output_tokens) as f64 > window as f64 * self.settings.chunk_threshold
    }

    pub fn set_system_prompt_tokens(&mut self, tokens: usize) {
        self.state.system_prompt_tokens = tokens;
    }

    pub fn add_conversation_tokens(&mut self, tokens: usize) {
        self.state.conversation_tokens += tokens;
    }

    /// Recount the conversation after history was summarized.
    pub fn recompute_conversation(&mut self, turns: &[ConversationTurn]) {
        let total = turns.iter().map(|t| estimate_tokens(&t.content)).sum();
        tracing::debug!(
            before = self.state.conversation_tokens,
            after = total,
            "Recomputed conversation tokens"
        );
        self.state.conversation_tokens = total;
    }

    pub fn truncate_context(&self, content: &str, target_tokens: usize) -> TruncationResult {
        truncate_context(content, target_tokens)
    }
}
