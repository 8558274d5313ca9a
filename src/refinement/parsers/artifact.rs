// Refiner output parsing: markdown document -> Artifact
//
// Best effort throughout. Missing sections leave fields empty rather than
// failing, and `raw_markdown` always keeps the untouched input.

use once_cell::sync::Lazy;
use regex::Regex;

use super::fenced_blocks;
use super::questions::canonical_section;
use crate::protocol::{Artifact, ArtifactSection, TechnicalPlan};

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s{0,3}(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid heading regex")
});

static VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*[*_]*version[*_]*\s*[:=]\s*[*_]*v?(\d+(?:\.\d+)*)").expect("valid version regex")
});

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+(?:\[[ xX]\]\s+)?(.+?)\s*$").expect("valid list item regex")
});

static BACKTICKED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid backtick regex"));

const DEFAULT_VERSION: &str = "1.0";
const DEFAULT_TITLE: &str = "Untitled Requirements";

/// Lines of one canonical section, fences included.
#[derive(Default)]
struct Sections {
    bodies: [Option<String>; 5],
}

impl Sections {
    fn get(&self, idx: usize) -> &str {
        self.bodies[idx].as_deref().unwrap_or("")
    }
}

fn split_sections(markdown: &str) -> (Option<String>, Sections) {
    let mut title = None;
    let mut sections = Sections::default();
    // Open section and the heading level that opened it
    let mut current: Option<(usize, usize)> = None;
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some(caps) = HEADING.captures(line) {
                let level = caps[1].len();
                let text = caps[2].trim();
                if level == 1 {
                    if title.is_none() {
                        title = Some(text.to_string());
                    }
                    current = None;
                    continue;
                }
                // Headings deeper than the one that opened the section belong to it
                let nested = matches!(current, Some((_, open)) if level > open);
                if !nested {
                    match canonical_section(text) {
                        Some(idx) => {
                            current = Some((idx, level));
                            sections.bodies[idx].get_or_insert_with(String::new);
                            continue;
                        }
                        None if current.is_some() => {
                            current = None;
                            continue;
                        }
                        None => {}
                    }
                }
            }
        }
        if let Some((idx, _)) = current {
            let body = sections.bodies[idx].get_or_insert_with(String::new);
            body.push_str(line);
            body.push('\n');
        }
    }
    (title, sections)
}

fn clean_item(item: &str) -> String {
    item.replace("**", "").trim().to_string()
}

/// List items outside fenced blocks; falls back to paragraphs when there are none.
fn list_items(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = LIST_ITEM.captures(line) {
            items.push(clean_item(&caps[1]));
        }
    }
    if items.is_empty() {
        items = body
            .split("\n\n")
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|p| !p.is_empty() && !p.starts_with("```"))
            .collect();
    }
    items
}

#[derive(Clone, Copy, PartialEq)]
enum PlanBucket {
    Create,
    Modify,
    Api,
    Steps,
}

fn plan_label(line: &str) -> Option<(PlanBucket, String)> {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c == '_' || c.is_whitespace());
    let lower = stripped.to_lowercase();
    let bucket = if lower.starts_with("files to create") || lower.starts_with("new files") {
        PlanBucket::Create
    } else if lower.starts_with("files to modify")
        || lower.starts_with("files to change")
        || lower.starts_with("modified files")
    {
        PlanBucket::Modify
    } else if lower.starts_with("api changes") || lower.starts_with("api:") {
        PlanBucket::Api
    } else if lower.starts_with("implementation steps") || lower.starts_with("steps") {
        PlanBucket::Steps
    } else {
        return None;
    };
    // Text after the label on the same line, e.g. "API Changes: none"
    let inline = stripped
        .split_once(':')
        .map(|(_, rest)| rest.replace("**", "").trim().to_string())
        .unwrap_or_default();
    Some((bucket, inline))
}

fn file_path_of(item: &str) -> String {
    if let Some(caps) = BACKTICKED.captures(item) {
        return caps[1].trim().to_string();
    }
    let cut = [" - ", " — ", " – ", ": ", " ("]
        .iter()
        .filter_map(|sep| item.find(sep))
        .min()
        .unwrap_or(item.len());
    item[..cut].trim().to_string()
}

fn parse_technical_plan(body: &str) -> TechnicalPlan {
    let mut plan = TechnicalPlan::default();
    let mut api_lines: Vec<String> = Vec::new();
    let mut bucket = PlanBucket::Steps;
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            if bucket == PlanBucket::Api {
                api_lines.push(line.to_string());
            }
            continue;
        }
        if in_fence {
            if bucket == PlanBucket::Api {
                api_lines.push(line.to_string());
            }
            continue;
        }
        let is_list_item = LIST_ITEM.is_match(line);
        if !is_list_item {
            if let Some((label, inline)) = plan_label(line) {
                bucket = label;
                if label == PlanBucket::Api && !inline.is_empty() {
                    api_lines.push(inline);
                }
                continue;
            }
        }
        let Some(caps) = LIST_ITEM.captures(line) else {
            if bucket == PlanBucket::Api && !line.trim().is_empty() {
                api_lines.push(line.trim().to_string());
            }
            continue;
        };
        let item = clean_item(&caps[1]);
        match bucket {
            PlanBucket::Create => plan.files_to_create.push(file_path_of(&item)),
            PlanBucket::Modify => plan.files_to_modify.push(file_path_of(&item)),
            PlanBucket::Api => api_lines.push(format!("- {item}")),
            PlanBucket::Steps => plan.steps.push(item),
        }
    }

    let api = api_lines.join("\n").trim().to_string();
    if !api.is_empty() {
        plan.api_changes = Some(api);
    }
    plan
}

fn is_scenario_block(tag: &str, body: &str) -> bool {
    let tag = tag.to_lowercase();
    tag == "gherkin" || tag == "cucumber" || tag == "feature" || body.contains("Scenario")
}

fn parse_acceptance(body: &str, whole: &str) -> Vec<String> {
    let scenarios: Vec<String> = fenced_blocks(body)
        .into_iter()
        .filter(|(tag, body)| is_scenario_block(tag, body))
        .map(|(_, body)| body.to_string())
        .collect();
    if !scenarios.is_empty() {
        return scenarios;
    }
    if !body.trim().is_empty() {
        return list_items(body);
    }
    // No section at all: pick up scenario blocks anywhere in the document
    fenced_blocks(whole)
        .into_iter()
        .filter(|(tag, body)| is_scenario_block(tag, body))
        .map(|(_, body)| body.to_string())
        .collect()
}

fn parse_diagram(markdown: &str) -> Option<String> {
    fenced_blocks(markdown)
        .into_iter()
        .find(|(tag, _)| {
            let tag = tag.to_lowercase();
            tag == "mermaid" || tag == "plantuml"
        })
        .map(|(_, body)| body.to_string())
}

fn paragraph_text(body: &str) -> String {
    let mut text = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            text.push(line);
        }
    }
    text.join("\n").trim().to_string()
}

/// Parse a refiner document into an [`Artifact`].
pub fn parse_artifact(markdown: &str) -> Artifact {
    let (title, sections) = split_sections(markdown);
    let version = VERSION
        .captures(markdown)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    let problem_statement = {
        let text = paragraph_text(sections.get(0));
        // Strip a version line that landed inside the section
        VERSION.replace_all(&text, "").trim().to_string()
    };

    Artifact {
        version,
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        problem_statement,
        functional_requirements: list_items(sections.get(1)),
        non_functional_requirements: list_items(sections.get(2)),
        technical_plan: parse_technical_plan(sections.get(3)),
        acceptance_criteria: parse_acceptance(sections.get(4), markdown),
        diagram: parse_diagram(markdown),
        raw_markdown: markdown.to_string(),
    }
}

/// Render an artifact back into the canonical document layout.
pub fn render_artifact(artifact: &Artifact) -> String {
    let mut doc = format!("# {}\n\nVersion: {}\n\n", artifact.title, artifact.version);
    for section in ArtifactSection::ALL {
        doc.push_str(&format!("## {}\n\n", section.heading()));
        match section {
            ArtifactSection::ProblemStatement => {
                doc.push_str(&artifact.problem_statement);
                doc.push_str("\n\n");
            }
            ArtifactSection::FunctionalRequirements => push_list(&mut doc, &artifact.functional_requirements),
            ArtifactSection::NonFunctionalRequirements => {
                push_list(&mut doc, &artifact.non_functional_requirements)
            }
            ArtifactSection::TechnicalPlan => {
                let plan = &artifact.technical_plan;
                if !plan.files_to_create.is_empty() {
                    doc.push_str("### Files to Create\n");
                    push_list(&mut doc, &wrap_paths(&plan.files_to_create));
                }
                if !plan.files_to_modify.is_empty() {
                    doc.push_str("### Files to Modify\n");
                    push_list(&mut doc, &wrap_paths(&plan.files_to_modify));
                }
                if let Some(api) = &plan.api_changes {
                    doc.push_str(&format!("### API Changes\n{api}\n\n"));
                }
                if !plan.steps.is_empty() {
                    doc.push_str("### Implementation Steps\n");
                    for (i, step) in plan.steps.iter().enumerate() {
                        doc.push_str(&format!("{}. {}\n", i + 1, step));
                    }
                    doc.push('\n');
                }
            }
            ArtifactSection::AcceptanceCriteria => {
                for scenario in &artifact.acceptance_criteria {
                    doc.push_str(&format!("```gherkin\n{scenario}\n```\n\n"));
                }
            }
        }
    }
    if let Some(diagram) = &artifact.diagram {
        doc.push_str(&format!("## Diagram\n\n```mermaid\n{diagram}\n```\n"));
    }
    doc
}

fn wrap_paths(paths: &[String]) -> Vec<String> {
    paths.iter().map(|p| format!("`{p}`")).collect()
}

fn push_list(doc: &mut String, items: &[String]) {
    for item in items {
        doc.push_str(&format!("- {item}\n"));
    }
    doc.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"# CSV Export for Invoices

Version: 1.2

## Problem Statement
Finance staff copy invoice tables by hand into spreadsheets.

## Functional Requirements
- The system shall export the visible invoice list as CSV
- The system shall include a header row
1. The system shall respect active filters

## Non-Functional Requirements
- Exports of 50k rows complete in under 5 seconds
- **Security:** only authenticated users may export

## Technical Implementation Plan
### Files to Create
- `src/export/csv.rs` - CSV writer
- src/export/mod.rs
### Files to Modify
- `src/routes/invoices.rs`
API Changes: `GET /invoices/export.csv`
### Implementation Steps
1. Add the writer
2. Wire the route

## Acceptance Criteria
```gherkin
Scenario: Export filtered invoices
  Given I filtered invoices by "paid"
  When I click export
  Then the CSV contains only paid invoices
```

```gherkin
Scenario: Unauthenticated export
  Given I am logged out
  Then export returns 401
```

## Diagram
```mermaid
graph TD; UI-->API; API-->Writer
```
"#;

    #[test]
    fn test_full_document() {
        let artifact = parse_artifact(DOC);
        assert_eq!(artifact.title, "CSV Export for Invoices");
        assert_eq!(artifact.version, "1.2");
        assert_eq!(
            artifact.problem_statement,
            "Finance staff copy invoice tables by hand into spreadsheets."
        );
        assert_eq!(artifact.functional_requirements.len(), 3);
        assert_eq!(artifact.non_functional_requirements.len(), 2);
        assert_eq!(artifact.non_functional_requirements[1], "Security: only authenticated users may export");

        let plan = &artifact.technical_plan;
        assert_eq!(plan.files_to_create, vec!["src/export/csv.rs", "src/export/mod.rs"]);
        assert_eq!(plan.files_to_modify, vec!["src/routes/invoices.rs"]);
        assert_eq!(plan.api_changes.as_deref(), Some("`GET /invoices/export.csv`"));
        assert_eq!(plan.steps, vec!["Add the writer", "Wire the route"]);

        assert_eq!(artifact.acceptance_criteria.len(), 2);
        assert!(artifact.acceptance_criteria[0].starts_with("Scenario: Export filtered invoices"));
        assert_eq!(artifact.diagram.as_deref(), Some("graph TD; UI-->API; API-->Writer"));
        assert_eq!(artifact.raw_markdown, DOC);
    }

    #[test]
    fn test_reparse_is_stable() {
        let first = parse_artifact(DOC);
        let again = parse_artifact(&first.raw_markdown);
        assert_eq!(again.title, first.title);
        assert_eq!(again.problem_statement, first.problem_statement);
        assert_eq!(again.functional_requirements.len(), first.functional_requirements.len());
        assert_eq!(again.non_functional_requirements.len(), first.non_functional_requirements.len());

        let rendered = render_artifact(&first);
        let from_render = parse_artifact(&rendered);
        assert_eq!(from_render.title, first.title);
        assert_eq!(from_render.version, first.version);
        assert_eq!(from_render.problem_statement, first.problem_statement);
        assert_eq!(from_render.functional_requirements, first.functional_requirements);
        assert_eq!(from_render.non_functional_requirements, first.non_functional_requirements);
        assert_eq!(from_render.technical_plan, first.technical_plan);
        assert_eq!(from_render.acceptance_criteria, first.acceptance_criteria);
    }

    #[test]
    fn test_headings_inside_fences_are_ignored() {
        let doc = "# T\n## Problem Statement\nText\n```\n## Functional Requirements\n- fake\n```\n";
        let artifact = parse_artifact(doc);
        assert!(artifact.functional_requirements.is_empty());
        assert_eq!(artifact.problem_statement, "Text");
    }

    #[test]
    fn test_deviating_document_degrades() {
        let artifact = parse_artifact("Just some prose without structure.");
        assert_eq!(artifact.title, "Untitled Requirements");
        assert_eq!(artifact.version, "1.0");
        assert!(artifact.problem_statement.is_empty());
        assert!(artifact.functional_requirements.is_empty());
        assert!(artifact.acceptance_criteria.is_empty());
        assert!(artifact.diagram.is_none());
    }

    #[test]
    fn test_nested_headings_stay_in_their_section() {
        let doc = "# T\n## Functional Requirements\n- Export rows as CSV\n\
                   ### Technical constraints\n- Stream rows instead of buffering\n\
                   ### Problem areas\n- Large tenants\n\
                   ## Technical Implementation Plan\nFiles to Create:\n- `src/export.rs`\n";
        let artifact = parse_artifact(doc);
        assert_eq!(
            artifact.functional_requirements,
            vec!["Export rows as CSV", "Stream rows instead of buffering", "Large tenants"]
        );
        assert!(artifact.problem_statement.is_empty());
        assert_eq!(artifact.technical_plan.files_to_create, vec!["src/export.rs"]);
        assert!(artifact.technical_plan.steps.is_empty());
    }

    #[test]
    fn test_level_three_sections_without_parents() {
        let doc = "# T\n### Problem Statement\nManual copying.\n### Functional Requirements\n- Export rows\n";
        let artifact = parse_artifact(doc);
        assert_eq!(artifact.problem_statement, "Manual copying.");
        assert_eq!(artifact.functional_requirements, vec!["Export rows"]);
    }

    #[test]
    fn test_paragraph_requirements_without_bullets() {
        let doc = "# T\n## Functional Requirements\nExport rows as CSV.\n\nInclude headers.\n";
        assert_eq!(parse_artifact(doc).functional_requirements.len(), 2);
    }
}
