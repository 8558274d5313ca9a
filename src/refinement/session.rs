// Refinement session: drives the analyst -> critic -> refiner protocol

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::events::{EventReceiver, EventSender, SessionEvent};
use super::parsers::{is_draft_shaped, parse_artifact, parse_critique, parse_questions};
use crate::budget::{estimate_tokens, summarize_turns, TokenBudgetManager};
use crate::config::{Config, RefinementSettings};
use crate::context::ContextRelevanceBuilder;
use crate::errors::RefineError;
use crate::model::{invoke_with_timeout, ModelChannel, ModelResponse};
use crate::protocol::prompts::{
    analyst_compact_prompt, analyst_incorporate_prompt, analyst_initial_prompt, critic_prompt,
    refiner_prompt, refiner_section_prompt,
};
use crate::protocol::{
    Artifact, ArtifactSection, AwaitReason, ClarifyingQuestion, ConversationTurn, CritiqueIssue,
    IssueType, Persona, Phase, QuestionCategory, SessionState, TurnMetadata, UserClarification,
};

type Result<T> = std::result::Result<T, RefineError>;

/// Older clarifications are shortened to this many characters when compressed.
const COMPRESSED_CLARIFICATION_CHARS: usize = 80;
/// Clarifications kept verbatim after compression kicks in.
const RECENT_CLARIFICATIONS: usize = 3;
/// Chunked generation refuses to exceed this share of the remaining budget.
const CHUNKING_BUDGET_SHARE: f64 = 0.8;
/// Refiner allocation floor once the conversation has used up the window.
const MIN_REFINER_ALLOCATION: usize = 2_000;
/// The refiner always sees at least this much of the draft.
const MIN_DRAFT_TOKENS: usize = 1_000;

/// Session and budget as they were before a public operation began.
struct Checkpoint {
    state: SessionState,
    budget: TokenBudgetManager,
}

/// One refinement conversation.
///
/// Owns its [`SessionState`] exclusively. Collaborators are shared read-only
/// through `Arc`, so several sessions can run side by side on separate tasks.
/// Every state change, draft, critique and artifact is also published on the
/// event stream returned by [`RefinementSession::new`].
pub struct RefinementSession {
    state: SessionState,
    model: Arc<dyn ModelChannel>,
    context_builder: Arc<ContextRelevanceBuilder>,
    budget: TokenBudgetManager,
    settings: RefinementSettings,
    events: EventSender,
}

impl RefinementSession {
    pub fn new(
        request: impl Into<String>,
        model: Arc<dyn ModelChannel>,
        context_builder: Arc<ContextRelevanceBuilder>,
        config: &Config,
    ) -> (Self, EventReceiver) {
        let (events, rx) = EventSender::channel();
        let budget = TokenBudgetManager::for_model(model.model_id(), config);
        let session = Self {
            state: SessionState::new(request),
            model,
            context_builder,
            budget,
            settings: config.refinement.clone(),
            events,
        };
        (session, rx)
    }

    /// Link the session to the task it was opened from.
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.state.task_id = Some(task_id.into());
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn budget(&self) -> &TokenBudgetManager {
        &self.budget
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.state.final_artifact.as_ref()
    }

    // ── Public operations ──────────────────────────────────────────────────

    /// First analyst turn. Always ends awaiting the user, questions or not.
    ///
    /// A failed model call puts the session back in `Idle`, so `start` can be
    /// retried.
    pub async fn start(&mut self, workspace_context: &str) -> Result<()> {
        let checkpoint = self.checkpoint();
        let result = self.run_start(workspace_context).await;
        self.settle(checkpoint, result)
    }

    /// Record the user's answer and move the protocol forward.
    ///
    /// On a failed model call the answer is not recorded and the session is
    /// left awaiting the user again.
    pub async fn handle_user_response(&mut self, text: &str) -> Result<()> {
        let checkpoint = self.checkpoint();
        let result = self.run_user_response(text).await;
        self.settle(checkpoint, result)
    }

    /// Score the current draft and branch on confidence.
    pub async fn trigger_critique(&mut self) -> Result<()> {
        let checkpoint = self.checkpoint();
        let result = self.run_critique().await;
        self.settle(checkpoint, result)
    }

    /// Produce the final artifact, chunking the generation when the budget is tight.
    pub async fn trigger_refine(&mut self) -> Result<()> {
        let checkpoint = self.checkpoint();
        let result = self.run_refine().await;
        self.settle(checkpoint, result)
    }

    pub fn approve(&mut self) -> Result<()> {
        if self.state.final_artifact.is_none() {
            return Err(RefineError::MissingArtifact);
        }
        self.transition(Phase::Approved)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition(Phase::Cancelled)
    }

    // ── Protocol steps ─────────────────────────────────────────────────────

    async fn run_start(&mut self, workspace_context: &str) -> Result<()> {
        if self.state.phase != Phase::Idle {
            return Err(RefineError::InvalidStateTransition {
                from: self.state.phase,
                to: Phase::Drafting,
            });
        }
        self.transition(Phase::Drafting)?;
        let request = self.state.original_request.clone();
        self.push_turn(ConversationTurn::user(request.clone()));

        let allocation = self.budget.available_tokens(Persona::Analyst);
        let context = self.gather_context(&request, workspace_context, allocation).await;
        self.budget.set_system_prompt_tokens(estimate_tokens(&context));

        let prompt = if estimate_tokens(&context) > self.settings.compact_context_threshold_tokens {
            debug!(session = %self.state.id, "Large context, using compact analyst prompt");
            analyst_compact_prompt(&request, &context)
        } else {
            analyst_initial_prompt(&request, &context)
        };

        let response = self.invoke(Persona::Analyst, &prompt).await?;
        let questions = self.record_analyst_turn(&response);

        self.state.pending_questions = questions.clone();
        if !questions.is_empty() {
            self.events.emit(SessionEvent::Questions(questions));
        }
        self.transition(Phase::AwaitingUser(AwaitReason::Clarification))
    }

    async fn run_user_response(&mut self, text: &str) -> Result<()> {
        if !self.state.phase.is_awaiting_user() {
            return Err(RefineError::InvalidStateTransition {
                from: self.state.phase,
                to: Phase::Drafting,
            });
        }

        let question_id = match self.state.pending_questions.as_slice() {
            [only] => Some(only.id.clone()),
            _ => None,
        };
        self.state
            .clarifications
            .push(UserClarification::new(question_id, text));
        self.push_turn(ConversationTurn::user(text));
        self.state.pending_questions.clear();
        self.state.iteration += 1;

        info!(
            session = %self.state.id,
            iteration = self.state.iteration,
            max = self.settings.max_iterations,
            "User response recorded"
        );

        if self.state.iteration >= self.settings.max_iterations {
            self.events.emit(SessionEvent::Progress(format!(
                "Reached {} clarification rounds, proceeding to refinement",
                self.settings.max_iterations
            )));
            if self.state.current_draft.is_none() {
                self.install_synthesized_draft();
            }
            return self.run_refine().await;
        }

        self.transition(Phase::Drafting)?;
        let allocation = self.budget.available_tokens(Persona::Analyst);
        let draft = self
            .state
            .current_draft
            .as_deref()
            .map(|d| self.budget.truncate_context(d, allocation / 2).content);
        let prompt = analyst_incorporate_prompt(
            &self.state.original_request,
            &self.clarification_summary(),
            text,
            draft.as_deref(),
        );

        let response = self.invoke(Persona::Analyst, &prompt).await?;
        let questions = self.record_analyst_turn(&response);

        if self.state.current_draft.is_some() {
            return self.run_critique().await;
        }

        self.state.pending_questions = questions.clone();
        if !questions.is_empty() {
            self.events.emit(SessionEvent::Questions(questions));
        }
        self.transition(Phase::AwaitingUser(AwaitReason::Clarification))
    }

    async fn run_critique(&mut self) -> Result<()> {
        let draft = self.state.current_draft.clone().ok_or(RefineError::MissingDraft)?;
        self.transition(Phase::Critiquing)?;

        let allocation = self.budget.available_tokens(Persona::Critic);
        let truncated = self.budget.truncate_context(&draft, allocation);
        if truncated.was_truncated {
            debug!(
                original = truncated.original_tokens,
                truncated = truncated.truncated_tokens,
                "Draft truncated for critique"
            );
        }
        let prompt = critic_prompt(
            &self.state.original_request,
            &truncated.content,
            &self.clarification_summary(),
        );

        let response = self.invoke(Persona::Critic, &prompt).await?;
        let critique = parse_critique(&response.text);
        self.push_turn(persona_turn(
            Persona::Critic,
            response.text.clone(),
            TurnMetadata {
                critique: Some(critique.clone()),
                ..Default::default()
            },
        ));
        self.state.latest_critique = Some(critique.clone());
        self.events.emit(SessionEvent::CritiqueReady(critique.clone()));
        self.after_call();

        info!(
            session = %self.state.id,
            confidence = critique.confidence_score,
            passed = critique.passed_validation,
            issues = critique.issues.len(),
            "Critique received"
        );

        if critique.confidence_score >= self.settings.confidence_threshold {
            return self.run_refine().await;
        }

        let questions: Vec<ClarifyingQuestion> = critique
            .actionable_issues()
            .into_iter()
            .take(self.settings.max_critique_questions)
            .enumerate()
            .map(|(idx, issue)| issue_to_question(idx, issue))
            .collect();

        if questions.is_empty() {
            // Low confidence with nothing to ask about: refine anyway
            self.events.emit(SessionEvent::Progress(
                "Low confidence but no actionable issues, refining".to_string(),
            ));
            return self.run_refine().await;
        }

        self.state.pending_questions = questions.clone();
        self.events.emit(SessionEvent::Questions(questions));
        self.transition(Phase::AwaitingUser(AwaitReason::Clarification))
    }

    async fn run_refine(&mut self) -> Result<()> {
        self.transition(Phase::Refining)?;
        if self.state.current_draft.is_none() {
            self.install_synthesized_draft();
        }

        let draft = self.state.current_draft.clone().unwrap_or_default();
        let clarifications = self.clarification_summary();
        let critique = self.critique_summary();

        // Decide on the full draft; truncation happens per call afterwards
        let summary_tokens = estimate_tokens(&clarifications) + estimate_tokens(&critique);
        let context_tokens = estimate_tokens(&draft) + summary_tokens;
        let expected = self.settings.estimated_artifact_tokens;
        let remaining = self.budget.remaining_tokens();
        let chunked = (context_tokens + expected) as f64 > remaining as f64 * CHUNKING_BUDGET_SHARE
            || self.budget.needs_chunked_generation(context_tokens, expected);

        let allocation = self
            .budget
            .available_tokens(Persona::Refiner)
            .max(MIN_REFINER_ALLOCATION);

        info!(
            session = %self.state.id,
            chunked,
            context_tokens,
            remaining,
            allocation,
            "Refining draft"
        );

        let document = if chunked {
            self.generate_chunked(&draft, &clarifications, &critique, allocation)
                .await?
        } else {
            let draft = self
                .budget
                .truncate_context(&draft, allocation.saturating_sub(summary_tokens).max(MIN_DRAFT_TOKENS))
                .content;
            let prompt = refiner_prompt(&self.state.original_request, &draft, &clarifications, &critique);
            let response = self.invoke(Persona::Refiner, &prompt).await?;
            response.text
        };

        let artifact = parse_artifact(&document);
        if !chunked {
            self.push_turn(persona_turn(
                Persona::Refiner,
                document,
                TurnMetadata {
                    artifact: Some(artifact.clone()),
                    ..Default::default()
                },
            ));
            self.after_call();
        }
        self.state.final_artifact = Some(artifact.clone());
        self.events.emit(SessionEvent::ArtifactReady(artifact));
        self.transition(Phase::AwaitingUser(AwaitReason::Approval))
    }

    // ── Internals ──────────────────────────────────────────────────────────

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            budget: self.budget.clone(),
        }
    }

    /// Undo a step whose model call failed, so the caller can retry it.
    fn settle(&mut self, checkpoint: Checkpoint, result: Result<()>) -> Result<()> {
        if !matches!(&result, Err(e) if e.is_recoverable()) {
            return result;
        }

        let from = self.state.phase;
        let to = checkpoint.state.phase;
        self.state = checkpoint.state;
        self.budget = checkpoint.budget;
        self.state.touch();
        warn!(session = %self.state.id, %from, %to, "Step failed, session restored for retry");
        if from != to {
            self.events.emit(SessionEvent::StateChange { from, to });
        }
        result
    }

    fn transition(&mut self, to: Phase) -> Result<()> {
        let from = self.state.phase;
        if !from.can_transition_to(to) {
            return Err(RefineError::InvalidStateTransition { from, to });
        }
        self.state.phase = to;
        self.state.touch();
        info!(session = %self.state.id, %from, %to, "Phase transition");
        self.events.emit(SessionEvent::StateChange { from, to });
        Ok(())
    }

    /// One model call raced against the configured timeout.
    async fn invoke(&mut self, stage: Persona, prompt: &str) -> Result<ModelResponse> {
        let limit = Duration::from_secs(self.settings.invocation_timeout_secs);
        debug!(
            session = %self.state.id,
            %stage,
            prompt_tokens = estimate_tokens(prompt),
            "Invoking model"
        );
        match invoke_with_timeout(self.model.as_ref(), prompt, stage, limit).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(session = %self.state.id, %stage, "Model invocation failed: {e}");
                self.events.emit(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn push_turn(&mut self, turn: ConversationTurn) {
        self.budget.add_conversation_tokens(estimate_tokens(&turn.content));
        self.state.turns.push(turn);
        self.state.touch();
    }

    /// Budget upkeep after a model call: telemetry, then summarization if needed.
    fn after_call(&mut self) {
        let telemetry = self.budget.telemetry();
        self.events.emit(SessionEvent::Progress(format!("Budget: {telemetry}")));

        if self.budget.needs_summarization() {
            let before = self.state.turns.len();
            if before <= self.settings.summarize_keep_recent {
                debug!(session = %self.state.id, turns = before, "Nothing old enough to summarize");
                return;
            }
            self.state.turns = summarize_turns(&self.state.turns, self.settings.summarize_keep_recent);
            self.budget.recompute_conversation(&self.state.turns);
            info!(
                session = %self.state.id,
                before,
                after = self.state.turns.len(),
                "Summarized conversation history"
            );
            self.events.emit(SessionEvent::Progress(format!(
                "Summarized {} turns to stay within budget",
                before.saturating_sub(self.state.turns.len()) + 1
            )));
        }
    }

    /// Build the analyst's context package; builder failures fall back to the
    /// caller's workspace context alone.
    async fn gather_context(&self, request: &str, workspace_context: &str, allocation: usize) -> String {
        let smart = match self.context_builder.build_context(request, allocation).await {
            Ok(smart) => {
                self.events.emit(SessionEvent::Progress(format!(
                    "Context: {} full files, {} skeletons (~{} tokens)",
                    smart.full_content_files, smart.skeleton_files, smart.estimated_tokens
                )));
                smart.content
            }
            Err(e) => {
                warn!(session = %self.state.id, "Context builder failed, using workspace context only: {e:#}");
                String::new()
            }
        };

        let combined = match (workspace_context.trim().is_empty(), smart.trim().is_empty()) {
            (true, true) => "(no workspace context available)".to_string(),
            (false, true) => workspace_context.trim().to_string(),
            (true, false) => smart,
            (false, false) => format!("{}\n\n{}", workspace_context.trim(), smart),
        };
        self.budget.truncate_context(&combined, allocation).content
    }

    /// Append the analyst turn, adopt a draft-shaped response, and return its questions.
    fn record_analyst_turn(&mut self, response: &ModelResponse) -> Vec<ClarifyingQuestion> {
        let questions = parse_questions(response);
        self.push_turn(persona_turn(
            Persona::Analyst,
            response.text.clone(),
            TurnMetadata {
                questions: questions.clone(),
                ..Default::default()
            },
        ));
        if is_draft_shaped(&response.text) {
            self.state.current_draft = Some(response.text.clone());
            self.events.emit(SessionEvent::DraftReady(response.text.clone()));
        }
        self.after_call();
        debug!(session = %self.state.id, questions = questions.len(), "Analyst turn recorded");
        questions
    }

    fn install_synthesized_draft(&mut self) {
        let draft = synthesize_draft(&self.state.original_request, &self.state.clarifications);
        warn!(session = %self.state.id, "No draft available, synthesizing a minimal one");
        self.state.current_draft = Some(draft.clone());
        self.events.emit(SessionEvent::DraftReady(draft));
    }

    async fn generate_chunked(
        &mut self,
        draft: &str,
        clarifications: &str,
        critique: &str,
        allocation: usize,
    ) -> Result<String> {
        let mut document = String::new();
        let total = ArtifactSection::ALL.len();
        let half = allocation / 2;
        let draft = self
            .budget
            .truncate_context(
                draft,
                half.saturating_sub(estimate_tokens(clarifications) + estimate_tokens(critique))
                    .max(MIN_DRAFT_TOKENS),
            )
            .content;

        for (idx, section) in ArtifactSection::ALL.into_iter().enumerate() {
            self.events.emit(SessionEvent::Progress(format!(
                "Generating section {}/{}: {}",
                idx + 1,
                total,
                section.heading()
            )));
            let previous = self.budget.truncate_context(&document, half).content;
            let prompt = refiner_section_prompt(
                section,
                &self.state.original_request,
                &draft,
                clarifications,
                critique,
                &previous,
            );
            let response = self.invoke(Persona::Refiner, &prompt).await?;
            let text = ensure_section_heading(section, response.text.trim());

            if !document.is_empty() {
                document.push_str("\n\n");
            }
            document.push_str(&text);

            self.push_turn(persona_turn(Persona::Refiner, text, TurnMetadata::default()));
            self.after_call();
        }
        Ok(document)
    }

    fn clarification_summary(&self) -> String {
        let clarifications = &self.state.clarifications;
        if clarifications.is_empty() {
            return "(no clarifications yet)".to_string();
        }
        if clarifications.len() <= self.settings.verbatim_clarifications {
            return clarifications
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {}", i + 1, c.response.trim()))
                .collect::<Vec<_>>()
                .join("\n");
        }

        let split = clarifications.len().saturating_sub(RECENT_CLARIFICATIONS);
        let (older, recent) = clarifications.split_at(split);
        let compressed: Vec<String> = older
            .iter()
            .map(|c| {
                let flat = c.response.split_whitespace().collect::<Vec<_>>().join(" ");
                match flat.char_indices().nth(COMPRESSED_CLARIFICATION_CHARS) {
                    Some((cut, _)) => format!("{}…", &flat[..cut]),
                    None => flat,
                }
            })
            .collect();
        let mut summary = format!("Earlier answers ({}): {}", older.len(), compressed.join("; "));
        for (i, c) in recent.iter().enumerate() {
            summary.push_str(&format!("\n{}. {}", split + i + 1, c.response.trim()));
        }
        summary
    }

    fn critique_summary(&self) -> String {
        let Some(critique) = &self.state.latest_critique else {
            return "(no review yet)".to_string();
        };
        let lines: Vec<String> = critique
            .actionable_issues()
            .into_iter()
            .map(|issue| {
                let mut line = format!(
                    "- [{}/{}] {}",
                    issue.severity.as_str(),
                    issue.issue_type.as_str(),
                    issue.description
                );
                if let Some(suggestion) = &issue.suggestion {
                    line.push_str(&format!(" (suggestion: {suggestion})"));
                }
                line
            })
            .collect();
        if lines.is_empty() {
            format!("Confidence {}; no blocking issues.", critique.confidence_score)
        } else {
            format!("Confidence {}.\n{}", critique.confidence_score, lines.join("\n"))
        }
    }
}

fn persona_turn(persona: Persona, text: String, metadata: TurnMetadata) -> ConversationTurn {
    ConversationTurn::new(persona.role(), text).with_metadata(metadata)
}

fn issue_to_question(idx: usize, issue: &CritiqueIssue) -> ClarifyingQuestion {
    let category = match issue.issue_type {
        IssueType::Security | IssueType::Architecture => QuestionCategory::Technical,
        IssueType::Performance => QuestionCategory::Constraint,
        IssueType::Ambiguity | IssueType::Contradiction | IssueType::Omission => {
            QuestionCategory::Requirement
        }
    };
    let mut question = issue.description.trim().trim_end_matches('.').to_string();
    match &issue.suggestion {
        Some(suggestion) => question.push_str(&format!(
            ". Suggested: {}. Should we go with that?",
            suggestion.trim().trim_end_matches('.')
        )),
        None => question.push_str(". How should this be handled?"),
    }
    ClarifyingQuestion::new(format!("issue-{}", idx + 1), question, category)
}

fn ensure_section_heading(section: ArtifactSection, text: &str) -> String {
    let marker = format!("## {}", section.heading()).to_lowercase();
    if text.to_lowercase().contains(&marker) {
        text.to_string()
    } else {
        format!("## {}\n\n{}", section.heading(), text)
    }
}

/// Minimal but well-formed draft used when the analyst never produced one.
fn synthesize_draft(request: &str, clarifications: &[UserClarification]) -> String {
    let title: String = request.lines().next().unwrap_or("").chars().take(80).collect();
    let title = if title.trim().is_empty() { "Feature Request" } else { title.trim() };

    let mut draft = format!("# {title}\n\n## Problem Statement\n{}\n\n## Functional Requirements\n", request.trim());
    if clarifications.is_empty() {
        draft.push_str(&format!("- {}\n", title));
    }
    for c in clarifications {
        let answer = c.response.trim();
        if !answer.is_empty() {
            draft.push_str(&format!("- {answer}\n"));
        }
    }
    draft.push_str(
        "\n## Non-Functional Requirements\n- To be confirmed during implementation\n\n\
         ## Technical Implementation Plan\n- To be determined from the requirements above\n\n\
         ## Acceptance Criteria\n- The behavior described in the problem statement is observable\n",
    );
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Severity;

    #[test]
    fn test_synthesized_draft_is_draft_shaped() {
        let clarifications = vec![UserClarification::new(None, "Only admins can export")];
        let draft = synthesize_draft("Add CSV export", &clarifications);
        assert!(is_draft_shaped(&draft));
        assert!(draft.starts_with("# Add CSV export"));
        assert!(draft.contains("- Only admins can export"));
    }

    #[test]
    fn test_issue_questions() {
        let issue = CritiqueIssue::new(IssueType::Performance, Severity::High, "Large exports may time out.")
            .with_suggestion("Stream rows");
        let question = issue_to_question(0, &issue);
        assert_eq!(question.id, "issue-1");
        assert_eq!(question.category, QuestionCategory::Constraint);
        assert_eq!(
            question.question,
            "Large exports may time out. Suggested: Stream rows. Should we go with that?"
        );
    }

    #[test]
    fn test_section_heading_added_when_missing() {
        let text = ensure_section_heading(ArtifactSection::AcceptanceCriteria, "```gherkin\nScenario: x\n```");
        assert!(text.starts_with("## Acceptance Criteria\n"));
        let kept = ensure_section_heading(ArtifactSection::ProblemStatement, "# T\n\n## Problem Statement\nx");
        assert!(kept.starts_with("# T"));
    }
}
