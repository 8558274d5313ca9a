// Response parsing as a chain of strategies
//
// Model output is untrusted. Each strategy either recovers a value or passes;
// the chain returns the first success. Nothing here returns an error.

pub mod artifact;
pub mod critique;
pub mod questions;

pub use artifact::{parse_artifact, render_artifact};
pub use critique::parse_critique;
pub use questions::{is_draft_shaped, parse_questions};

/// One way of recovering a `T` from input `I`.
pub trait ParseStrategy<I: ?Sized, T>: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, input: &I) -> Option<T>;
}

/// Ordered strategies; the first to return `Some` wins.
pub struct ParserChain<I: ?Sized, T> {
    strategies: Vec<Box<dyn ParseStrategy<I, T>>>,
}

impl<I: ?Sized, T> ParserChain<I, T> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl ParseStrategy<I, T> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn parse(&self, input: &I) -> Option<T> {
        self.strategies.iter().find_map(|strategy| {
            let parsed = strategy.parse(input);
            if parsed.is_some() {
                tracing::debug!(strategy = strategy.name(), "Parse strategy succeeded");
            }
            parsed
        })
    }
}

impl<I: ?Sized, T> Default for ParserChain<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the first fenced code block, preferring one tagged `lang`.
pub(crate) fn fenced_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let blocks = fenced_blocks(text);
    blocks
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case(lang))
        .or_else(|| blocks.iter().find(|(tag, _)| tag.is_empty()))
        .map(|(_, body)| *body)
}

/// All fenced blocks as (info string, body).
pub(crate) fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let Some(newline) = after.find('\n') else { break };
        let tag = after[..newline].trim();
        let body_start = &after[newline + 1..];
        let Some(close) = body_start.find("```") else { break };
        blocks.push((tag, body_start[..close].trim()));
        rest = &body_start[close + 3..];
    }
    blocks
}

/// The outermost `{...}` slice of `text`, if any.
pub(crate) fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<u32>, &'static str);

    impl ParseStrategy<str, u32> for Fixed {
        fn name(&self) -> &'static str {
            self.1
        }
        fn parse(&self, _input: &str) -> Option<u32> {
            self.0
        }
    }

    #[test]
    fn test_chain_returns_first_success() {
        let chain = ParserChain::new()
            .with(Fixed(None, "a"))
            .with(Fixed(Some(2), "b"))
            .with(Fixed(Some(3), "c"));
        assert_eq!(chain.parse("x"), Some(2));
    }

    #[test]
    fn test_empty_chain_yields_none() {
        let chain: ParserChain<str, u32> = ParserChain::new();
        assert_eq!(chain.parse("x"), None);
    }

    #[test]
    fn test_fenced_block_prefers_language_tag() {
        let text = "intro\n```\nplain\n```\n```json\n{\"a\":1}\n```\n";
        assert_eq!(fenced_block(text, "json"), Some("{\"a\":1}"));
        assert_eq!(fenced_block("```\n[1]\n```", "json"), Some("[1]"));
        assert_eq!(fenced_block("no fences", "json"), None);
    }

    #[test]
    fn test_brace_slice() {
        assert_eq!(brace_slice("score {\"a\": {\"b\": 1}} done"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(brace_slice("} nothing {"), None);
    }
}
