// Workspace collaborators: file search and file reads
//
// The context builder only talks to these traits. `LocalWorkspace` is the
// on-disk implementation; tests substitute in-memory fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use glob::Pattern;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::skeleton::extract_skeleton;
use crate::config::ContextSettings;

const MAX_DEPTH: usize = 24;
const PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Glob patterns over workspace-relative paths; empty means everything
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_results: usize,
    pub max_files: usize,
    pub case_sensitive: bool,
}

impl SearchOptions {
    pub fn from_settings(settings: &ContextSettings) -> Self {
        Self {
            include: settings.include.clone(),
            exclude: settings.exclude.clone(),
            max_results: settings.max_results_per_keyword,
            max_files: settings.max_files,
            case_sensitive: settings.case_sensitive,
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_settings(&ContextSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    pub preview: String,
}

#[async_trait]
pub trait FileSearch: Send + Sync {
    /// Literal keyword search. Returns at most `options.max_results` matches.
    async fn search(&self, keyword: &str, options: &SearchOptions) -> Result<Vec<SearchMatch>>;

    /// Every in-scope file, at most `options.max_files`.
    async fn list_files(&self, options: &SearchOptions) -> Result<Vec<PathBuf>>;
}

#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String>;

    /// Signature-only view of a source file; `None` when the type has no skeleton.
    async fn skeleton(&self, path: &Path) -> Result<Option<String>>;
}

/// Include/exclude filter compiled once per call.
struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    fn new(options: &SearchOptions) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| Pattern::new(p).with_context(|| format!("Invalid glob pattern: {p}")))
                .collect()
        };
        Ok(Self {
            include: compile(&options.include)?,
            exclude: compile(&options.exclude)?,
        })
    }

    fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(rel))
    }

    /// A directory is pruned when anything inside it would be excluded.
    fn prunes_dir(&self, rel_dir: &str) -> bool {
        !rel_dir.is_empty() && self.is_excluded(&format!("{rel_dir}/_"))
    }

    fn accepts_file(&self, rel: &str) -> bool {
        if self.is_excluded(rel) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(rel))
    }
}

fn relative_str(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Search and read files directly from disk under one root.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(root: &Path, options: &SearchOptions) -> Result<Vec<PathBuf>> {
        let filter = PathFilter::new(options)?;
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .max_depth(MAX_DEPTH)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !e.file_type().is_dir() || !filter.prunes_dir(&relative_str(root, e.path()))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if !filter.accepts_file(&relative_str(root, entry.path())) {
                continue;
            }
            files.push(entry.into_path());
            if files.len() >= options.max_files {
                tracing::debug!(max_files = options.max_files, "File cap reached during walk");
                break;
            }
        }
        Ok(files)
    }

    fn search_blocking(root: &Path, keyword: &str, options: &SearchOptions) -> Result<Vec<SearchMatch>> {
        let regex = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(!options.case_sensitive)
            .build()
            .with_context(|| format!("Invalid search keyword: {keyword}"))?;

        let mut matches = Vec::new();
        'files: for path in Self::walk(root, options)? {
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(_) => continue, // binary or unreadable
            };
            for (idx, line) in contents.lines().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                matches.push(SearchMatch {
                    path: path.clone(),
                    line: idx + 1,
                    preview: line.trim().chars().take(PREVIEW_CHARS).collect(),
                });
                if matches.len() >= options.max_results {
                    break 'files;
                }
            }
        }
        Ok(matches)
    }
}

#[async_trait]
impl FileSearch for LocalWorkspace {
    async fn search(&self, keyword: &str, options: &SearchOptions) -> Result<Vec<SearchMatch>> {
        let root = self.root.clone();
        let keyword = keyword.to_string();
        let options = options.clone();
        tokio::task::spawn_blocking(move || Self::search_blocking(&root, &keyword, &options))
            .await
            .context("Search task failed")?
    }

    async fn list_files(&self, options: &SearchOptions) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || Self::walk(&root, &options))
            .await
            .context("File listing task failed")?
    }
}

#[async_trait]
impl FileReader for LocalWorkspace {
    async fn read(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn skeleton(&self, path: &Path) -> Result<Option<String>> {
        let content = self.read(path).await?;
        Ok(extract_skeleton(path, &content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::write(root.join("src/export.rs"), "pub fn export_csv() {}\n// CSV writer\n").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("node_modules/lib/index.js"), "export const csv = 1;\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_skips_excluded_dirs() {
        let dir = workspace();
        let ws = LocalWorkspace::new(dir.path());
        let matches = ws.search("csv", &SearchOptions::default()).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.path.ends_with("src/export.rs")));
        assert_eq!(matches[0].line, 1);
    }

    #[tokio::test]
    async fn test_search_respects_result_cap() {
        let dir = workspace();
        let ws = LocalWorkspace::new(dir.path());
        let options = SearchOptions {
            max_results: 1,
            ..SearchOptions::default()
        };
        assert_eq!(ws.search("csv", &options).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_is_matched_literally() {
        let dir = workspace();
        let ws = LocalWorkspace::new(dir.path());
        let matches = ws.search("fn main()", &SearchOptions::default()).await.unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn test_list_files_applies_include_patterns() {
        let dir = workspace();
        let ws = LocalWorkspace::new(dir.path());
        let all = ws.list_files(&SearchOptions::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let options = SearchOptions {
            include: vec!["**/main.rs".to_string()],
            ..SearchOptions::default()
        };
        let only_main = ws.list_files(&options).await.unwrap();
        assert_eq!(only_main.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_glob_is_an_error() {
        let dir = workspace();
        let ws = LocalWorkspace::new(dir.path());
        let options = SearchOptions {
            exclude: vec!["[".to_string()],
            ..SearchOptions::default()
        };
        assert!(ws.list_files(&options).await.is_err());
    }

    #[tokio::test]
    async fn test_reader_skeleton() {
        let dir = workspace();
        let ws = LocalWorkspace::new(dir.path());
        let skeleton = ws.skeleton(&dir.path().join("src/export.rs")).await.unwrap();
        assert_eq!(skeleton.as_deref(), Some("pub fn export_csv()"));
    }
}
