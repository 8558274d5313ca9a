// Turn-history summarization: collapse older turns into one system turn
//
// No model call is made here. Each role has a cheap extraction rule so the
// summary stays deterministic and never fails.

use once_cell::sync::Lazy;
use regex::Regex;

use super::truncate::take_chars;
use crate::protocol::{ConversationTurn, TurnRole};

static CONFIDENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:confidence(?:_score|score)?|score)["']?\s*[:=]?\s*(\d{1,3})"#)
        .expect("valid confidence regex")
});

const USER_EXCERPT_CHARS: usize = 200;
const OTHER_EXCERPT_CHARS: usize = 150;
const LISTED_QUESTIONS: usize = 3;

/// Replace all but the last `keep_recent` turns with a single summary turn.
///
/// Returns the history unchanged when there is nothing older to collapse.
pub fn summarize_turns(turns: &[ConversationTurn], keep_recent: usize) -> Vec<ConversationTurn> {
    if turns.len() <= keep_recent {
        return turns.to_vec();
    }

    let split = turns.len() - keep_recent;
    let (older, recent) = turns.split_at(split);

    let mut summary = format!("[Summary of {} earlier turns]", older.len());
    for turn in older {
        summary.push_str(&format!("\n- {}: {}", turn.role, summarize_turn(turn)));
    }

    let mut result = Vec::with_capacity(recent.len() + 1);
    result.push(ConversationTurn::system(summary));
    result.extend_from_slice(recent);
    result
}

fn summarize_turn(turn: &ConversationTurn) -> String {
    match turn.role {
        TurnRole::User => excerpt(&turn.content, USER_EXCERPT_CHARS),
        TurnRole::Analyst => summarize_analyst(turn),
        TurnRole::Critic => summarize_critic(turn),
        _ => excerpt(&turn.content, OTHER_EXCERPT_CHARS),
    }
}

fn summarize_analyst(turn: &ConversationTurn) -> String {
    let questions: Vec<String> = match turn.metadata.as_ref() {
        Some(meta) if !meta.questions.is_empty() => {
            meta.questions.iter().map(|q| q.question.clone()).collect()
        }
        _ => turn
            .content
            .lines()
            .map(str::trim)
            .filter(|l| l.ends_with('?'))
            .map(str::to_string)
            .collect(),
    };

    if questions.is_empty() {
        return format!("drafted ({})", excerpt(&turn.content, OTHER_EXCERPT_CHARS));
    }

    let listed: Vec<&str> = questions.iter().take(LISTED_QUESTIONS).map(String::as_str).collect();
    format!("asked {} questions: {}", questions.len(), listed.join(" | "))
}

fn summarize_critic(turn: &ConversationTurn) -> String {
    let score = turn
        .metadata
        .as_ref()
        .and_then(|m| m.critique.as_ref())
        .map(|c| c.confidence_score as u32)
        .or_else(|| {
            CONFIDENCE
                .captures(&turn.content)
                .and_then(|c| c[1].parse::<u32>().ok())
                .map(|s| s.min(100))
        });
    match score {
        Some(score) => format!("confidence {score}"),
        None => excerpt(&turn.content, OTHER_EXCERPT_CHARS),
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = take_chars(&flat, max_chars);
    if cut.len() < flat.len() {
        format!("{cut}…")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClarifyingQuestion, QuestionCategory, TurnMetadata};

    fn turn(role: TurnRole, content: &str) -> ConversationTurn {
        ConversationTurn::new(role, content)
    }

    #[test]
    fn test_short_history_is_untouched() {
        let turns = vec![turn(TurnRole::User, "hello"), turn(TurnRole::Analyst, "hi?")];
        let result = summarize_turns(&turns, 4);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].role, TurnRole::User);
    }

    #[test]
    fn test_older_turns_collapse_into_one_system_turn() {
        let turns = vec![
            turn(TurnRole::User, &"Export invoices as CSV. ".repeat(30)),
            turn(TurnRole::Analyst, "1. Which columns?\n2. Which delimiter?\n3. Max rows?\n4. Encoding?"),
            turn(TurnRole::Critic, r#"{"confidenceScore": 45, "issues": []}"#),
            turn(TurnRole::User, "recent 1"),
            turn(TurnRole::Analyst, "recent 2"),
        ];

        let result = summarize_turns(&turns, 2);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].role, TurnRole::System);

        let summary = &result[0].content;
        assert!(summary.starts_with("[Summary of 3 earlier turns]"));
        assert!(summary.contains("asked 4 questions"));
        assert!(!summary.contains("Encoding?"), "only three questions listed");
        assert!(summary.contains("confidence 45"));
        assert!(summary.contains('…'), "long user turn is shortened");
        assert_eq!(result[2].content, "recent 2");
    }

    #[test]
    fn test_analyst_metadata_questions_preferred() {
        let meta = TurnMetadata {
            questions: vec![ClarifyingQuestion::new("q1", "Which format?", QuestionCategory::Requirement)],
            ..Default::default()
        };
        let turns = vec![
            turn(TurnRole::Analyst, "```json\n{...}\n```").with_metadata(meta),
            turn(TurnRole::User, "csv"),
        ];
        let result = summarize_turns(&turns, 1);
        assert!(result[0].content.contains("asked 1 questions: Which format?"));
    }
}
