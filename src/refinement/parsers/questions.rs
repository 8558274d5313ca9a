// Analyst turn parsing: clarifying questions and draft detection

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use super::{fenced_block, ParseStrategy, ParserChain};
use crate::model::ModelResponse;
use crate::protocol::prompts::ASK_QUESTIONS_CALL;
use crate::protocol::{ClarifyingQuestion, QuestionCategory, CANONICAL_HEADINGS};

static NUMBERED_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+[.)]\s+(.+\?)\s*$").expect("valid numbered question regex")
});

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").expect("valid heading regex")
});

const MIN_FREE_QUESTION_CHARS: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "text")]
    question: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default, alias = "multi_select")]
    multi_select: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuestionSet {
    Wrapped { questions: Vec<RawQuestion> },
    Bare(Vec<RawQuestion>),
}

impl RawQuestionSet {
    fn into_questions(self) -> Vec<RawQuestion> {
        match self {
            RawQuestionSet::Wrapped { questions } | RawQuestionSet::Bare(questions) => questions,
        }
    }
}

/// Normalize raw questions: drop blanks, assign missing ids, infer missing categories.
fn finish(raw: Vec<RawQuestion>) -> Option<Vec<ClarifyingQuestion>> {
    let questions: Vec<ClarifyingQuestion> = raw
        .into_iter()
        .filter(|q| !q.question.trim().is_empty())
        .enumerate()
        .map(|(idx, q)| {
            let text = q.question.trim().to_string();
            let category = match q.category.as_deref() {
                Some(c) if !c.trim().is_empty() => QuestionCategory::parse_lenient(c),
                _ => infer_category(&text),
            };
            let id = q
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("q{}", idx + 1));
            ClarifyingQuestion::new(id, text, category)
                .with_options(q.options.unwrap_or_default(), q.multi_select)
        })
        .collect();
    (!questions.is_empty()).then_some(questions)
}

fn from_text_lines(lines: Vec<String>) -> Option<Vec<ClarifyingQuestion>> {
    let mut seen = HashSet::new();
    let raw = lines
        .into_iter()
        .filter(|l| seen.insert(l.to_lowercase()))
        .map(|question| RawQuestion {
            id: None,
            question,
            category: None,
            options: None,
            multi_select: false,
        })
        .collect();
    finish(raw)
}

/// Best-guess category from question wording.
pub fn infer_category(question: &str) -> QuestionCategory {
    let lower = question.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&[
        "database", "api", "framework", "library", "schema", "endpoint", "protocol", "format",
        "architecture", "stack", "language", "integration", "version",
    ]) {
        QuestionCategory::Technical
    } else if has(&[
        "limit", "deadline", "budget", "maximum", "minimum", "latency", "performance", "size",
        "compliance", "must", "security", "scale", "within",
    ]) {
        QuestionCategory::Constraint
    } else if has(&["prefer", "style", "look", "would you like", "should we", "rather", "user interface", "layout"]) {
        QuestionCategory::Preference
    } else {
        QuestionCategory::Requirement
    }
}

fn clean_line(line: &str) -> String {
    line.trim()
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•' | '>') || c.is_whitespace())
        .replace("**", "")
        .trim()
        .to_string()
}

struct StructuredCallQuestions;

impl ParseStrategy<ModelResponse, Vec<ClarifyingQuestion>> for StructuredCallQuestions {
    fn name(&self) -> &'static str {
        "structured_call"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Vec<ClarifyingQuestion>> {
        let call = response.call(ASK_QUESTIONS_CALL)?;
        let value = match &call.arguments {
            Value::Object(map) if map.contains_key("questions") => map["questions"].clone(),
            other => other.clone(),
        };
        let raw: Vec<RawQuestion> = serde_json::from_value(value).ok()?;
        finish(raw)
    }
}

struct FencedJsonQuestions;

impl ParseStrategy<ModelResponse, Vec<ClarifyingQuestion>> for FencedJsonQuestions {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Vec<ClarifyingQuestion>> {
        let body = fenced_block(&response.text, "json")?;
        let set: RawQuestionSet = serde_json::from_str(body).ok()?;
        finish(set.into_questions())
    }
}

struct NumberedQuestions;

impl ParseStrategy<ModelResponse, Vec<ClarifyingQuestion>> for NumberedQuestions {
    fn name(&self) -> &'static str {
        "numbered_lines"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Vec<ClarifyingQuestion>> {
        let lines = response
            .text
            .lines()
            .filter_map(|line| NUMBERED_QUESTION.captures(line))
            .map(|caps| clean_line(&caps[1]))
            .collect();
        from_text_lines(lines)
    }
}

struct QuestionLines;

impl ParseStrategy<ModelResponse, Vec<ClarifyingQuestion>> for QuestionLines {
    fn name(&self) -> &'static str {
        "question_lines"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Vec<ClarifyingQuestion>> {
        let lines = response
            .text
            .lines()
            .map(clean_line)
            .filter(|line| line.ends_with('?') && line.chars().count() > MIN_FREE_QUESTION_CHARS)
            .collect();
        from_text_lines(lines)
    }
}

static QUESTION_CHAIN: Lazy<ParserChain<ModelResponse, Vec<ClarifyingQuestion>>> = Lazy::new(|| {
    ParserChain::new()
        .with(StructuredCallQuestions)
        .with(FencedJsonQuestions)
        .with(NumberedQuestions)
        .with(QuestionLines)
});

/// Clarifying questions in an analyst response; empty when there are none.
pub fn parse_questions(response: &ModelResponse) -> Vec<ClarifyingQuestion> {
    QUESTION_CHAIN.parse(response).unwrap_or_default()
}

/// Map a heading's text onto a canonical section, most specific first.
pub(crate) fn canonical_section(heading: &str) -> Option<usize> {
    let lower = heading.to_lowercase();
    let is = |needle: &str| lower.contains(needle);
    if is("non-functional") || is("non functional") || is("nonfunctional") {
        Some(2)
    } else if is("functional requirement") {
        Some(1)
    } else if is("problem") {
        Some(0)
    } else if is("technical") || is("implementation plan") {
        Some(3)
    } else if is("acceptance") {
        Some(4)
    } else {
        None
    }
}

/// True when the text carries at least two distinct canonical section headings.
pub fn is_draft_shaped(text: &str) -> bool {
    let mut found = HashSet::new();
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            if let Some(section) = canonical_section(&caps[1]) {
                found.insert(section);
            }
        }
    }
    debug_assert!(found.len() <= CANONICAL_HEADINGS.len());
    found.len() >= 2
}
