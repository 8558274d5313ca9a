// Keyword extraction from free-text feature requests

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static CAMEL_OR_PASCAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[a-z]+(?:[A-Z][a-z0-9]+)+|(?:[A-Z][a-z0-9]+){2,})\b")
        .expect("valid camel case regex")
});

static SNAKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z][A-Za-z0-9]*(?:_[A-Za-z0-9]+)+\b").expect("valid snake case regex")
});

const STOP_WORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "not", "one", "via", "as", "at", "be", "been", "but", "by", "can", "could", "do",
    "does", "for", "from", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me",
    "my", "of", "on", "or", "our", "should", "so", "some", "that", "the", "their", "them", "then",
    "there", "these", "this", "to", "up", "us", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "will", "with", "would", "you", "your",
    // request verbs and filler
    "add", "adding", "allow", "allows", "able", "also", "build", "change", "create", "enable",
    "ensure", "feature", "get", "implement", "improve", "let", "like", "make", "need", "needs",
    "new", "please", "set", "support", "update", "use", "using", "want", "way",
];

const TECH_SUFFIXES: &[&str] = &[
    "service", "manager", "controller", "handler", "provider", "repository", "store", "client",
    "server", "router", "model", "view", "component", "module", "engine", "parser", "builder",
    "factory", "adapter", "middleware", "schema", "config", "util", "helper", "worker", "queue",
];

const TECH_PREFIXES: &[&str] = &[
    "auth", "api", "db", "http", "user", "file", "data", "cache", "config", "log", "csv", "json",
    "sql", "ui", "export", "import", "session", "token", "payment", "search", "upload", "email",
];

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    text: String,
    score: u32,
    position: usize,
}

fn score(word: &str, is_identifier: bool) -> u32 {
    let lower = word.to_lowercase();
    let mut score = 1;
    if TECH_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        score += 3;
    }
    if TECH_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        score += 2;
    }
    if is_identifier {
        score += 4;
    }
    score + (lower.chars().count() as u32 / 4).min(3)
}

/// Up to `max` search keywords, best first.
///
/// Identifier-shaped tokens (mixedCase, PascalCase, snake_case) are kept
/// verbatim; plain words are lowercased and filtered against stop words.
pub fn extract_keywords(request: &str, max: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Candidate> = Vec::new();

    let identifiers = CAMEL_OR_PASCAL
        .find_iter(request)
        .chain(SNAKE.find_iter(request))
        .map(|m| (m.start(), m.as_str().to_string()));
    for (position, ident) in identifiers {
        if seen.insert(ident.to_lowercase()) {
            candidates.push(Candidate {
                score: score(&ident, true),
                text: ident,
                position,
            });
        }
    }

    let cleaned: String = request
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    for (offset, word) in cleaned.split_whitespace().enumerate() {
        if word.chars().count() < 3
            || STOP_WORDS.contains(&word)
            || word.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        if seen.insert(word.to_string()) {
            candidates.push(Candidate {
                score: score(word, false),
                text: word.to_string(),
                position: request.len() + offset,
            });
        }
    }

    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.position.cmp(&b.position)));
    candidates.into_iter().take(max).map(|c| c.text).collect()
}
