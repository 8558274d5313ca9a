// Prompt templates for the analyst, critic and refiner personas

/// Section headings every finished artifact carries, in document order.
pub const CANONICAL_HEADINGS: [&str; 5] = [
    "Problem Statement",
    "Functional Requirements",
    "Non-Functional Requirements",
    "Technical Implementation Plan",
    "Acceptance Criteria",
];

/// Name of the structured call the analyst may use to ask questions.
pub const ASK_QUESTIONS_CALL: &str = "ask_clarifying_questions";

const ANALYST_PREAMBLE: &str = "You are the Analyst. Your job is to understand a feature request \
well enough that an engineer could implement it without guessing. Ask only questions whose \
answers change the implementation. Never invent requirements the user did not state.";

const CRITIC_PREAMBLE: &str = "You are the Critic. You review requirement drafts adversarially. \
Look for ambiguity, contradictions, omissions, security gaps, performance risks and \
architectural problems. Be specific and cite the part of the draft you object to.";

const REFINER_PREAMBLE: &str = "You are the Refiner. You turn a reviewed draft plus the user's \
clarifications into a final, implementation-ready requirements document.";

const QUESTION_FORMAT: &str = "If anything is unclear, either call the `ask_clarifying_questions` \
tool or reply with a fenced ```json block of the form:\n\
{\"questions\": [{\"question\": \"...\", \"category\": \"requirement|constraint|preference|technical\", \
\"options\": [\"...\"], \"multiSelect\": false}]}\n\
Ask at most 5 questions. If the request is already clear, skip the questions and write the \
draft directly using the sections below.";

const CRITIQUE_FORMAT: &str = "Reply with a fenced ```json block only:\n\
{\"confidenceScore\": 0-100, \"passedValidation\": true|false, \"issues\": [\
{\"type\": \"ambiguity|contradiction|omission|security|performance|architecture\", \
\"severity\": \"low|medium|high\", \"description\": \"...\", \"suggestion\": \"...\"}]}\n\
confidenceScore is how ready the draft is for implementation. Set passedValidation to false \
when any high severity issue remains.";

/// One section of the final artifact, used for chunked generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSection {
    ProblemStatement,
    FunctionalRequirements,
    NonFunctionalRequirements,
    TechnicalPlan,
    AcceptanceCriteria,
}

impl ArtifactSection {
    pub const ALL: [ArtifactSection; 5] = [
        ArtifactSection::ProblemStatement,
        ArtifactSection::FunctionalRequirements,
        ArtifactSection::NonFunctionalRequirements,
        ArtifactSection::TechnicalPlan,
        ArtifactSection::AcceptanceCriteria,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            ArtifactSection::ProblemStatement => CANONICAL_HEADINGS[0],
            ArtifactSection::FunctionalRequirements => CANONICAL_HEADINGS[1],
            ArtifactSection::NonFunctionalRequirements => CANONICAL_HEADINGS[2],
            ArtifactSection::TechnicalPlan => CANONICAL_HEADINGS[3],
            ArtifactSection::AcceptanceCriteria => CANONICAL_HEADINGS[4],
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            ArtifactSection::ProblemStatement => {
                "One or two paragraphs: who has the problem, what is missing today, and what success looks like."
            }
            ArtifactSection::FunctionalRequirements => {
                "A bulleted list. Each bullet is one testable behavior, phrased as 'The system shall ...'."
            }
            ArtifactSection::NonFunctionalRequirements => {
                "A bulleted list covering performance, security, reliability and compatibility where relevant."
            }
            ArtifactSection::TechnicalPlan => {
                "Use the labels 'Files to Create:', 'Files to Modify:' and 'API Changes:' followed by bullets, then numbered implementation steps."
            }
            ArtifactSection::AcceptanceCriteria => {
                "One fenced ```gherkin block per scenario (Given/When/Then)."
            }
        }
    }
}

fn document_outline() -> String {
    let mut outline = String::from("# <Title>\n\n");
    for section in ArtifactSection::ALL {
        outline.push_str(&format!("## {}\n{}\n\n", section.heading(), section.instructions()));
    }
    outline.push_str(
        "Optionally add a fenced ```mermaid block with a component or sequence diagram.\n",
    );
    outline
}

/// First analyst turn, used when the workspace context is small enough to inline.
pub fn analyst_initial_prompt(request: &str, context: &str) -> String {
    format!(
        "{ANALYST_PREAMBLE}\n\n\
         ## Feature request\n{request}\n\n\
         ## Workspace context\n{context}\n\n\
         ## What to do\n{QUESTION_FORMAT}\n\n\
         ## Draft format\n{outline}",
        outline = document_outline(),
    )
}

/// First analyst turn for large workspaces: shorter instructions, same contract.
pub fn analyst_compact_prompt(request: &str, context: &str) -> String {
    format!(
        "{ANALYST_PREAMBLE}\n\n\
         Request: {request}\n\n\
         Relevant code (ranked, may be partial):\n{context}\n\n\
         {QUESTION_FORMAT}\n\
         Draft sections: {headings}.",
        headings = CANONICAL_HEADINGS.join(", "),
    )
}

/// Follow-up analyst turn after the user answered.
pub fn analyst_incorporate_prompt(
    request: &str,
    clarifications: &str,
    latest_response: &str,
    current_draft: Option<&str>,
) -> String {
    let draft = current_draft
        .map(|d| format!("## Current draft\n{d}\n\n"))
        .unwrap_or_default();
    format!(
        "{ANALYST_PREAMBLE}\n\n\
         Request: {request}\n\n\
         ## Clarifications so far\n{clarifications}\n\n\
         ## Latest answer\n{latest_response}\n\n\
         {draft}\
         Incorporate the answers. If you now have enough to proceed, write the complete draft \
         using the sections {headings}. Otherwise ask the remaining questions. {QUESTION_FORMAT}",
        headings = CANONICAL_HEADINGS.join(", "),
    )
}

pub fn critic_prompt(request: &str, draft: &str, clarifications: &str) -> String {
    format!(
        "{CRITIC_PREAMBLE}\n\n\
         ## Original request\n{request}\n\n\
         ## User clarifications\n{clarifications}\n\n\
         ## Draft under review\n{draft}\n\n\
         {CRITIQUE_FORMAT}"
    )
}

/// Single-call refiner prompt producing the whole document.
pub fn refiner_prompt(request: &str, draft: &str, clarifications: &str, critique: &str) -> String {
    format!(
        "{REFINER_PREAMBLE}\n\n\
         ## Original request\n{request}\n\n\
         ## Draft\n{draft}\n\n\
         ## User clarifications\n{clarifications}\n\n\
         ## Issues raised in review\n{critique}\n\n\
         Resolve every issue above. Write the final document in exactly this format:\n\n\
         {outline}\n\
         Start the document with `Version: 1.0` on its own line after the title.",
        outline = document_outline(),
    )
}

/// Chunked refiner prompt for one section; `previous` holds the sections written so far.
pub fn refiner_section_prompt(
    section: ArtifactSection,
    request: &str,
    draft: &str,
    clarifications: &str,
    critique: &str,
    previous: &str,
) -> String {
    let title_hint = if section == ArtifactSection::ProblemStatement {
        "Begin with a `# <Title>` line, then `Version: 1.0`, then the section."
    } else {
        "Do not repeat earlier sections or the title."
    };
    let previous = if previous.is_empty() {
        "(none yet)".to_string()
    } else {
        previous.to_string()
    };
    format!(
        "{REFINER_PREAMBLE}\n\n\
         You are writing ONE section of the document: `## {heading}`.\n\
         {instructions}\n{title_hint}\n\n\
         ## Original request\n{request}\n\n\
         ## Draft\n{draft}\n\n\
         ## User clarifications\n{clarifications}\n\n\
         ## Issues raised in review\n{critique}\n\n\
         ## Sections written so far\n{previous}",
        heading = section.heading(),
        instructions = section.instructions(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_lists_every_canonical_heading() {
        let prompt = refiner_prompt("Add CSV export", "draft", "none", "none");
        for heading in CANONICAL_HEADINGS {
            assert!(prompt.contains(&format!("## {heading}")), "missing {heading}");
        }
    }

    #[test]
    fn test_section_prompt_only_asks_for_title_once() {
        let first = refiner_section_prompt(ArtifactSection::ProblemStatement, "r", "d", "c", "k", "");
        let later = refiner_section_prompt(ArtifactSection::TechnicalPlan, "r", "d", "c", "k", "## Problem Statement\n...");
        assert!(first.contains("# <Title>"));
        assert!(!later.contains("# <Title>"));
        assert!(later.contains("## Technical Implementation Plan"));
    }

    #[test]
    fn test_compact_prompt_is_shorter() {
        let ctx = "fn main() {}";
        assert!(analyst_compact_prompt("req", ctx).len() < analyst_initial_prompt("req", ctx).len());
    }
}
