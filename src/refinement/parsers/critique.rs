// Critic turn parsing: fenced JSON, direct JSON, then prose heuristics

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{brace_slice, fenced_block, ParseStrategy, ParserChain};
use crate::config::constants::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::protocol::{CritiqueIssue, CritiqueResult, IssueType, Severity};

static CONFIDENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:confidence|score|rating)(?:\s+score)?\s*(?:is|of|:|=|-)?\s*(\d{1,3}(?:\.\d+)?)\s*(%|/\s*10\b|/\s*100\b|out of 10\b|out of 100\b)?",
    )
    .expect("valid confidence regex")
});

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3})\s*%").expect("valid percent regex"));

static NEGATED_REJECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:no|without|zero|free of)\s+(?:major|critical|significant|blocking|serious)\s+(?:issues?|problems?|gaps?|concerns?)",
    )
    .expect("valid negation regex")
});

static REJECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:major (?:issues?|problems?|gaps?|concerns?)|critical (?:issues?|problems?|gaps?|flaws?)|significant (?:issues?|gaps?|problems?)|serious (?:issues?|problems?)|not ready|rejected|reject|insufficient|blocking issues?|needs? (?:significant|major|substantial) (?:work|revision|rework))\b",
    )
    .expect("valid rejection regex")
});

static APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:looks good|lgtm|approved?|ready for implementation|ready to implement|well[- ]defined|comprehensive|passes validation|solid draft)\b",
    )
    .expect("valid approval regex")
});

static BULLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.{8,})$").expect("valid bullet regex")
});

const MAX_HEURISTIC_ISSUES: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCritique {
    #[serde(default, alias = "confidence_score", alias = "confidence", alias = "score")]
    confidence_score: Option<Value>,
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default, alias = "passed_validation", alias = "passed", alias = "pass")]
    passed_validation: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default, rename = "type", alias = "issueType", alias = "issue_type", alias = "category")]
    kind: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default, alias = "issue", alias = "concern", alias = "message")]
    description: String,
    #[serde(default, alias = "fix", alias = "recommendation")]
    suggestion: Option<String>,
}

impl From<RawIssue> for CritiqueIssue {
    fn from(raw: RawIssue) -> Self {
        let issue_type = match raw.kind.as_deref() {
            Some(kind) if !kind.trim().is_empty() => IssueType::parse_lenient(kind),
            _ => infer_issue_type(&raw.description),
        };
        let severity = raw
            .severity
            .as_deref()
            .map(Severity::parse_lenient)
            .unwrap_or_else(|| infer_severity(&raw.description));
        let issue = CritiqueIssue::new(issue_type, severity, raw.description.trim());
        match raw.suggestion.filter(|s| !s.trim().is_empty()) {
            Some(s) => issue.with_suggestion(s.trim()),
            None => issue,
        }
    }
}

/// Accept `85`, `85.5`, `"85"`, `"85%"` and 0-1 fractions.
fn confidence_value(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let scaled = if n > 0.0 && n < 1.0 { n * 100.0 } else { n };
    Some(scaled.round() as i64)
}

impl RawCritique {
    /// Recompute the derived pieces; the model's own arithmetic is not trusted.
    fn into_result(self) -> CritiqueResult {
        let issues: Vec<CritiqueIssue> = self
            .issues
            .into_iter()
            .filter(|i| !i.description.trim().is_empty())
            .map(CritiqueIssue::from)
            .collect();
        let confidence = self
            .confidence_score
            .as_ref()
            .and_then(confidence_value)
            .unwrap_or(75);
        let passed = self.passed_validation.unwrap_or_else(|| {
            confidence >= DEFAULT_CONFIDENCE_THRESHOLD as i64
                && !issues.iter().any(|i| i.severity == Severity::High)
        });
        CritiqueResult::new(confidence, issues, passed)
    }
}

fn parse_raw(json: &str) -> Option<CritiqueResult> {
    let raw: RawCritique = serde_json::from_str(json).ok()?;
    if raw.confidence_score.is_none() && raw.issues.is_empty() && raw.passed_validation.is_none() {
        return None;
    }
    Some(raw.into_result())
}

fn infer_issue_type(text: &str) -> IssueType {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["security", "auth", "permission", "injection", "encrypt", "secret", "xss", "csrf"]) {
        IssueType::Security
    } else if has(&["performance", "slow", "latency", "memory", "scal", "throughput"]) {
        IssueType::Performance
    } else if has(&["contradict", "conflict", "inconsistent"]) {
        IssueType::Contradiction
    } else if has(&["ambigu", "unclear", "vague", "undefined", "not specified"]) {
        IssueType::Ambiguity
    } else if has(&["architecture", "coupling", "design", "module", "layer"]) {
        IssueType::Architecture
    } else {
        IssueType::Omission
    }
}

fn infer_severity(text: &str) -> Severity {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["critical", "major", "security", "must", "blocking", "data loss"]) {
        Severity::High
    } else if has(&["minor", "nit", "consider", "optional", "cosmetic"]) {
        Severity::Low
    } else {
        Severity::Medium
    }
}

struct FencedJsonCritique;

impl ParseStrategy<str, CritiqueResult> for FencedJsonCritique {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn parse(&self, text: &str) -> Option<CritiqueResult> {
        parse_raw(fenced_block(text, "json")?)
    }
}

struct DirectJsonCritique;

impl ParseStrategy<str, CritiqueResult> for DirectJsonCritique {
    fn name(&self) -> &'static str {
        "direct_json"
    }

    fn parse(&self, text: &str) -> Option<CritiqueResult> {
        parse_raw(text.trim()).or_else(|| parse_raw(brace_slice(text)?))
    }
}

/// Last resort: never fails.
struct HeuristicCritique;

impl ParseStrategy<str, CritiqueResult> for HeuristicCritique {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn parse(&self, text: &str) -> Option<CritiqueResult> {
        // "no major issues" must not read as "major issues"
        let approved_by_negation = NEGATED_REJECTION.is_match(text);
        let scrubbed = NEGATED_REJECTION.replace_all(text, " ");
        let rejected = REJECTION.is_match(&scrubbed);
        let approved = approved_by_negation || APPROVAL.is_match(&scrubbed);

        let issues = extract_bullet_issues(text);
        let threshold = DEFAULT_CONFIDENCE_THRESHOLD as i64;

        let result = match extract_confidence(text) {
            Some(score) => CritiqueResult::new(score, issues, score >= threshold && !rejected),
            None if rejected => CritiqueResult::new(50, issues, false),
            None if approved => CritiqueResult::new(85, issues, true),
            None => CritiqueResult::new(75, issues, true),
        };
        Some(result)
    }
}

fn extract_confidence(text: &str) -> Option<i64> {
    if let Some(caps) = CONFIDENCE.captures(text) {
        let value: f64 = caps[1].parse().ok()?;
        let scale = caps
            .get(2)
            .map(|m| m.as_str().replace(' ', "").to_lowercase())
            .map(|unit| if unit == "/10" || unit == "outof10" { 10.0 } else { 1.0 })
            .unwrap_or(1.0);
        return Some((value * scale).round() as i64);
    }
    PERCENT
        .captures(text)
        .and_then(|caps| caps[1].parse::<i64>().ok())
}

fn extract_bullet_issues(text: &str) -> Vec<CritiqueIssue> {
    text.lines()
        .filter_map(|line| BULLET.captures(line))
        .map(|caps| caps[1].trim().replace("**", ""))
        .filter(|line| !APPROVAL.is_match(line) && CONFIDENCE.find(line).is_none())
        .take(MAX_HEURISTIC_ISSUES)
        .map(|line| CritiqueIssue::new(infer_issue_type(&line), infer_severity(&line), line))
        .collect()
}

static CRITIQUE_CHAIN: Lazy<ParserChain<str, CritiqueResult>> = Lazy::new(|| {
    ParserChain::new()
        .with(FencedJsonCritique)
        .with(DirectJsonCritique)
        .with(HeuristicCritique)
});

/// Parse a critic response. Always produces a result.
pub fn parse_critique(text: &str) -> CritiqueResult {
    CRITIQUE_CHAIN.parse(text).unwrap_or_else(CritiqueResult::fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_critique() {
        let text = "Review:\n```json\n{\"confidenceScore\": 85, \"passedValidation\": true, \"issues\": []}\n```";
        let critique = parse_critique(text);
        assert_eq!(critique.confidence_score, 85);
        assert!(critique.passed_validation);
        assert!(critique.issues.is_empty());
    }

    #[test]
    fn test_direct_json_with_snake_case_and_clamping() {
        let text = r#"{"confidence_score": 140, "issues": [{"type": "security", "severity": "high", "description": "No auth on export endpoint", "suggestion": "Require a session"}]}"#;
        let critique = parse_critique(text);
        assert_eq!(critique.confidence_score, 100);
        // passed is recomputed when missing: a high issue blocks it
        assert!(!critique.passed_validation);
        assert_eq!(critique.issues[0].issue_type, IssueType::Security);
        assert_eq!(critique.issues[0].suggestion.as_deref(), Some("Require a session"));
    }

    #[test]
    fn test_embedded_json_object() {
        let text = "Here you go: {\"confidence\": \"62%\", \"passed\": false} hope it helps";
        let critique = parse_critique(text);
        assert_eq!(critique.confidence_score, 62);
        assert!(!critique.passed_validation);
    }

    #[test]
    fn test_prose_with_score_and_major_issues() {
        let text = "Overall score: 40. The draft has major issues with error handling.";
        let critique = parse_critique(text);
        assert_eq!(critique.confidence_score, 40);
        assert!(!critique.passed_validation);
    }

    #[test]
    fn test_high_score_with_rejection_cue_fails() {
        let critique = parse_critique("Confidence: 80 but there are critical gaps in auth.");
        assert_eq!(critique.confidence_score, 80);
        assert!(!critique.passed_validation);
    }

    #[test]
    fn test_negated_rejection_is_approval() {
        let critique = parse_critique("I found no major issues in this draft.");
        assert_eq!(critique.confidence_score, 85);
        assert!(critique.passed_validation);
    }

    #[test]
    fn test_rejection_without_score() {
        let critique = parse_critique("This is not ready. Needs major revision.");
        assert_eq!(critique.confidence_score, 50);
        assert!(!critique.passed_validation);
    }

    #[test]
    fn test_out_of_ten_is_scaled() {
        assert_eq!(parse_critique("Rating: 7/10").confidence_score, 70);
        assert_eq!(parse_critique("score is 6 out of 10").confidence_score, 60);
    }

    #[test]
    fn test_nothing_recoverable_defaults() {
        let critique = parse_critique("hmm");
        assert_eq!(critique.confidence_score, 75);
        assert!(critique.passed_validation);
    }

    #[test]
    fn test_bullets_become_issues() {
        let text = "Score: 55\n- The retry policy is unclear for failed uploads\n- Minor: consider renaming the flag\n";
        let critique = parse_critique(text);
        assert_eq!(critique.issues.len(), 2);
        assert_eq!(critique.issues[0].issue_type, IssueType::Ambiguity);
        assert_eq!(critique.issues[0].severity, Severity::Medium);
        assert_eq!(critique.issues[1].severity, Severity::Low);
    }
}
