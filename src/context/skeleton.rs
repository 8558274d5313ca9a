// Signature-only skeletons for source files

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static RUST_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+|const\s+|unsafe\s+|extern\s+\S+\s+)*(?:fn|struct|enum|trait|impl|mod|type|macro_rules!)\b",
    )
    .expect("valid rust signature regex")
});

static TS_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\b\*?|(?:class|interface|type|enum)\b|const\s+\w+\s*=\s*(?:async\s*)?\(|(?:public|private|protected|static|readonly)\s+[\w$]+\s*\()",
    )
    .expect("valid ts signature regex")
});

static PY_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:async\s+)?(?:def|class)\s+\w+").expect("valid python signature regex")
});

static GO_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:func|type)\s+").expect("valid go signature regex")
});

static C_FAMILY_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|override|virtual|sealed|async)\s+)*(?:class|interface|enum|record|struct|[\w<>\[\],.]+\s+\w+\s*\([^;]*$)",
    )
    .expect("valid c-family signature regex")
});

static RUBY_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:def|class|module)\s+").expect("valid ruby signature regex")
});

/// Extensions inlined as-is rather than skeletonized.
const MARKUP_STYLE_DATA: &[&str] = &[
    "md", "markdown", "txt", "html", "htm", "xml", "svg", "css", "scss", "sass", "less", "json",
    "yaml", "yml", "toml", "ini", "csv", "tsv", "lock",
];

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// True for markup, style and data files, which never have a skeleton.
pub fn is_markup_or_data(path: &Path) -> bool {
    MARKUP_STYLE_DATA.contains(&extension(path).as_str())
}

fn signature_regex(ext: &str) -> Option<&'static Regex> {
    match ext {
        "rs" => Some(&RUST_SIG),
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => Some(&TS_SIG),
        "py" => Some(&PY_SIG),
        "go" => Some(&GO_SIG),
        "java" | "kt" | "cs" | "swift" | "c" | "h" | "cpp" | "hpp" | "cc" => Some(&C_FAMILY_SIG),
        "rb" => Some(&RUBY_SIG),
        _ => None,
    }
}

/// Strip an opening body from a signature line.
fn clean_signature(line: &str) -> String {
    let mut sig = line.trim_end();
    for suffix in ["{}", "{", ":"] {
        if let Some(stripped) = sig.strip_suffix(suffix) {
            sig = stripped.trim_end();
            break;
        }
    }
    sig.to_string()
}

/// Signature lines of a source file, or `None` for unsupported or
/// signature-free files.
pub fn extract_skeleton(path: &Path, content: &str) -> Option<String> {
    let ext = extension(path);
    if is_markup_or_data(path) {
        return None;
    }
    let regex = signature_regex(&ext)?;

    let signatures: Vec<String> = content
        .lines()
        .filter(|line| regex.is_match(line))
        .map(clean_signature)
        .collect();

    if signatures.is_empty() {
        None
    } else {
        Some(signatures.join("\n"))
    }
}
