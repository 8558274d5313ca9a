// Shared data contracts for refinement sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::phase::Phase;

/// The three fixed personas driving the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Analyst,
    Critic,
    Refiner,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Analyst => "analyst",
            Persona::Critic => "critic",
            Persona::Refiner => "refiner",
        }
    }

    pub fn role(&self) -> TurnRole {
        match self {
            Persona::Analyst => TurnRole::Analyst,
            Persona::Critic => TurnRole::Critic,
            Persona::Refiner => TurnRole::Refiner,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Analyst,
    Critic,
    Refiner,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Analyst => "analyst",
            TurnRole::Critic => "critic",
            TurnRole::Refiner => "refiner",
            TurnRole::System => "system",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured data extracted from a turn, kept alongside the raw text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<ClarifyingQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<CritiqueResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    Requirement,
    Constraint,
    Preference,
    Technical,
}

impl QuestionCategory {
    /// Lenient parse used for model output; unknown values map to `Requirement`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "constraint" | "constraints" => QuestionCategory::Constraint,
            "preference" | "preferences" => QuestionCategory::Preference,
            "technical" | "tech" => QuestionCategory::Technical,
            _ => QuestionCategory::Requirement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyingQuestion {
    pub id: String,
    pub question: String,
    pub category: QuestionCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub multi_select: bool,
}

impl ClarifyingQuestion {
    pub fn new(id: impl Into<String>, question: impl Into<String>, category: QuestionCategory) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            category,
            options: None,
            multi_select: false,
        }
    }

    pub fn with_options(mut self, options: Vec<String>, multi_select: bool) -> Self {
        if !options.is_empty() {
            self.options = Some(options);
            self.multi_select = multi_select;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClarification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl UserClarification {
    pub fn new(question_id: Option<String>, response: impl Into<String>) -> Self {
        Self {
            question_id,
            response: response.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Ambiguity,
    Contradiction,
    Omission,
    Security,
    Performance,
    Architecture,
}

impl IssueType {
    pub fn parse_lenient(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        if lower.starts_with("ambig") {
            IssueType::Ambiguity
        } else if lower.starts_with("contradict") || lower.starts_with("conflict") {
            IssueType::Contradiction
        } else if lower.starts_with("secur") {
            IssueType::Security
        } else if lower.starts_with("perf") {
            IssueType::Performance
        } else if lower.starts_with("arch") || lower.starts_with("design") {
            IssueType::Architecture
        } else {
            IssueType::Omission
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Ambiguity => "ambiguity",
            IssueType::Contradiction => "contradiction",
            IssueType::Omission => "omission",
            IssueType::Security => "security",
            IssueType::Performance => "performance",
            IssueType::Architecture => "architecture",
        }
    }
}

/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "critical" | "major" | "blocker" => Severity::High,
            "low" | "minor" | "trivial" | "info" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CritiqueIssue {
    pub fn new(issue_type: IssueType, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            description: description.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Medium and high severity issues are worth asking the user about.
    pub fn is_actionable(&self) -> bool {
        self.severity > Severity::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueResult {
    /// Always within 0..=100; enforced by [`CritiqueResult::new`].
    pub confidence_score: u8,
    pub issues: Vec<CritiqueIssue>,
    pub passed_validation: bool,
}

impl CritiqueResult {
    /// Build a critique, clamping the score into 0..=100.
    pub fn new(confidence: i64, issues: Vec<CritiqueIssue>, passed_validation: bool) -> Self {
        Self {
            confidence_score: confidence.clamp(0, 100) as u8,
            issues,
            passed_validation,
        }
    }

    /// Conservative default used when nothing can be recovered from the critic.
    pub fn fallback() -> Self {
        Self::new(75, Vec::new(), true)
    }

    /// Non-low issues, highest severity first.
    pub fn actionable_issues(&self) -> Vec<&CritiqueIssue> {
        let mut issues: Vec<&CritiqueIssue> =
            self.issues.iter().filter(|i| i.is_actionable()).collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalPlan {
    pub files_to_create: Vec<String>,
    pub files_to_modify: Vec<String>,
    /// Plan items that were not labelled as file creations or modifications
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_changes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub version: String,
    pub title: String,
    pub problem_statement: String,
    pub functional_requirements: Vec<String>,
    pub non_functional_requirements: Vec<String>,
    pub technical_plan: TechnicalPlan,
    /// Behavioral scenario blocks, verbatim
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
    pub raw_markdown: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub phase: Phase,
    pub original_request: String,
    pub turns: Vec<ConversationTurn>,
    pub clarifications: Vec<UserClarification>,
    #[serde(default)]
    pub pending_questions: Vec<ClarifyingQuestion>,
    pub current_draft: Option<String>,
    pub latest_critique: Option<CritiqueResult>,
    pub final_artifact: Option<Artifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub iteration: u32,
}

impl SessionState {
    pub fn new(original_request: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: None,
            phase: Phase::Idle,
            original_request: original_request.into(),
            turns: Vec::new(),
            clarifications: Vec::new(),
            pending_questions: Vec::new(),
            current_draft: None,
            latest_critique: None,
            final_artifact: None,
            created_at: now,
            updated_at: now,
            iteration: 0,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
