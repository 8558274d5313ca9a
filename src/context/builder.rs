// Context relevance builder: ranked, budgeted workspace slices for prompts

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::keywords::extract_keywords;
use super::ranking::{mentions_testing, score_file};
use super::skeleton::is_markup_or_data;
use super::workspace::{FileReader, FileSearch, SearchOptions};
use crate::budget::{estimate_tokens, truncate_context};
use crate::config::ContextSettings;

/// How a context package was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    /// Keyword hits ranked and read in full or as skeletons
    Ranked,
    /// File listing plus skeletons, no keyword hits
    SkeletonOnly,
    /// File listing plus small markup/data files inlined
    InlineSmallFiles,
    /// Nothing in the workspace
    Placeholder,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantFile {
    /// Canonical absolute path
    pub path: PathBuf,
    pub relative_path: String,
    pub match_count: usize,
    pub score: u32,
    /// Full content, when the file made it into the package in full
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartContext {
    pub content: String,
    pub full_content_files: usize,
    pub skeleton_files: usize,
    pub estimated_tokens: usize,
    /// Ranked files that made it into `content`; always empty for the fallback strategies
    pub files: Vec<RelevantFile>,
    pub keywords: Vec<String>,
    /// Workspace listing used by the fallback strategies
    pub listed_files: Vec<String>,
    pub strategy: ContextStrategy,
}

/// Builds context packages for one workspace root.
pub struct ContextRelevanceBuilder {
    root: PathBuf,
    search: Arc<dyn FileSearch>,
    reader: Arc<dyn FileReader>,
    settings: ContextSettings,
}

impl ContextRelevanceBuilder {
    pub fn new(
        root: impl AsRef<Path>,
        search: Arc<dyn FileSearch>,
        reader: Arc<dyn FileReader>,
        settings: ContextSettings,
    ) -> Self {
        Self {
            root: canonical_or_lexical(root.as_ref()),
            search,
            reader,
            settings,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` and return (canonical path, relative path) if it lies
    /// inside the root. Symlinks and `..` are resolved before the check.
    pub fn contain(&self, path: &Path) -> Option<(PathBuf, PathBuf)> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = canonical_or_lexical(&absolute);
        let relative = resolved.strip_prefix(&self.root).ok()?.to_path_buf();
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some((resolved, relative))
    }

    fn search_options(&self) -> SearchOptions {
        SearchOptions::from_settings(&self.settings)
    }

    /// Assemble at most `token_budget` tokens of workspace context for `request`.
    pub async fn build_context(&self, request: &str, token_budget: usize) -> Result<SmartContext> {
        let keywords = extract_keywords(request, self.settings.max_keywords);
        if keywords.is_empty() {
            debug!("No keywords in request, using skeleton-only context");
            return self.build_skeleton_context(keywords, token_budget).await;
        }

        let ranked = self.rank_files(request, &keywords).await;
        if ranked.is_empty() {
            debug!(keywords = ?keywords, "No search hits, using skeleton-only context");
            return self.build_skeleton_context(keywords, token_budget).await;
        }

        let context = self.assemble_ranked(ranked, keywords, token_budget).await;
        info!(
            strategy = ?context.strategy,
            full = context.full_content_files,
            skeletons = context.skeleton_files,
            tokens = context.estimated_tokens,
            budget = token_budget,
            "Built workspace context"
        );
        Ok(context)
    }

    async fn rank_files(&self, request: &str, keywords: &[String]) -> Vec<RelevantFile> {
        let options = self.search_options();
        let mut counts: HashMap<PathBuf, (PathBuf, usize)> = HashMap::new();

        for keyword in keywords {
            let matches = match self.search.search(keyword, &options).await {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(keyword = %keyword, "Search failed, skipping keyword: {e:#}");
                    continue;
                }
            };
            for hit in matches {
                match self.contain(&hit.path) {
                    Some((resolved, relative)) => {
                        counts.entry(resolved).or_insert((relative, 0)).1 += 1;
                    }
                    None => warn!(path = %hit.path.display(), "Discarding search hit outside workspace root"),
                }
            }
        }

        let tests_requested = mentions_testing(request);
        let mut ranked: Vec<RelevantFile> = counts
            .into_iter()
            .map(|(path, (relative, match_count))| RelevantFile {
                score: score_file(&relative, match_count, keywords, tests_requested),
                relative_path: display_relative(&relative),
                path,
                match_count,
                content: None,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.match_count.cmp(&a.match_count))
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        ranked
    }

    async fn assemble_ranked(
        &self,
        mut ranked: Vec<RelevantFile>,
        keywords: Vec<String>,
        token_budget: usize,
    ) -> SmartContext {
        let full_budget = (token_budget as f64 * self.settings.full_content_ratio) as usize;
        let mut content = String::new();
        let mut used = 0usize;
        let mut full_files = 0usize;
        let mut skeleton_files = 0usize;
        // `handled` files are skipped by the skeleton pass; `contributed` ones reach the output
        let mut handled = vec![false; ranked.len()];
        let mut contributed = vec![false; ranked.len()];

        // Full content for the top files
        for (idx, file) in ranked.iter_mut().enumerate() {
            if idx >= self.settings.max_full_files || used >= full_budget {
                break;
            }
            let body = match self.reader.read(&file.path).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %file.relative_path, "Skipping unreadable file: {e:#}");
                    handled[idx] = true;
                    continue;
                }
            };

            if estimate_tokens(&body) > self.settings.max_file_tokens {
                if let Some(section) = self.skeleton_section(&file.path, &file.relative_path).await {
                    let tokens = estimate_tokens(&section);
                    if used + tokens <= token_budget {
                        content.push_str(&section);
                        used += tokens;
                        skeleton_files += 1;
                        contributed[idx] = true;
                    }
                }
                handled[idx] = true;
                continue;
            }

            let section = full_section(&file.relative_path, &body);
            let tokens = estimate_tokens(&section);
            if used + tokens <= full_budget {
                content.push_str(&section);
                used += tokens;
                full_files += 1;
                file.content = Some(body);
                handled[idx] = true;
                contributed[idx] = true;
            }
        }

        // Skeletons for everything else while the budget lasts
        for (idx, file) in ranked.iter().enumerate() {
            if handled[idx] {
                continue;
            }
            if used >= token_budget {
                break;
            }
            if let Some(section) = self.skeleton_section(&file.path, &file.relative_path).await {
                let tokens = estimate_tokens(&section);
                if used + tokens <= token_budget {
                    content.push_str(&section);
                    used += tokens;
                    skeleton_files += 1;
                    contributed[idx] = true;
                }
            }
        }

        let files: Vec<RelevantFile> = ranked
            .into_iter()
            .zip(contributed)
            .filter_map(|(file, kept)| kept.then_some(file))
            .collect();

        SmartContext {
            estimated_tokens: estimate_tokens(&content),
            content,
            full_content_files: full_files,
            skeleton_files,
            files,
            keywords,
            listed_files: Vec::new(),
            strategy: ContextStrategy::Ranked,
        }
    }

    async fn skeleton_section(&self, path: &Path, relative: &str) -> Option<String> {
        match self.reader.skeleton(path).await {
            Ok(Some(skeleton)) => Some(format!("// File: {relative} (signatures)\n{skeleton}\n\n")),
            Ok(None) => None,
            Err(e) => {
                warn!(path = %relative, "Skeleton extraction failed: {e:#}");
                None
            }
        }
    }

    async fn build_skeleton_context(&self, keywords: Vec<String>, token_budget: usize) -> Result<SmartContext> {
        let listed = self
            .search
            .list_files(&self.search_options())
            .await
            .context("Failed to list workspace files")?;

        let mut files: Vec<(PathBuf, String)> = listed
            .iter()
            .filter_map(|p| self.contain(p))
            .map(|(resolved, relative)| (resolved, display_relative(&relative)))
            .collect();
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files.dedup_by(|a, b| a.1 == b.1);

        if files.is_empty() {
            let placeholder = format!(
                "(The workspace at {} contains no files in scope.)\n",
                self.root.display()
            );
            let content = truncate_context(&placeholder, token_budget).content;
            return Ok(SmartContext {
                estimated_tokens: estimate_tokens(&content),
                content,
                full_content_files: 0,
                skeleton_files: 0,
                files: Vec::new(),
                keywords,
                listed_files: Vec::new(),
                strategy: ContextStrategy::Placeholder,
            });
        }

        let mut listing = String::from("## Workspace files\n");
        for (_, relative) in &files {
            listing.push_str(&format!("- {relative}\n"));
        }
        listing.push('\n');
        let mut content = truncate_context(&listing, token_budget).content;
        let mut used = estimate_tokens(&content);

        let mut skeleton_files = 0usize;
        for (path, relative) in &files {
            if used >= token_budget {
                break;
            }
            if let Some(section) = self.skeleton_section(path, relative).await {
                let tokens = estimate_tokens(&section);
                if used + tokens <= token_budget {
                    content.push_str(&section);
                    used += tokens;
                    skeleton_files += 1;
                }
            }
        }

        let mut strategy = ContextStrategy::SkeletonOnly;
        if skeleton_files == 0 {
            let mut inlined = 0usize;
            for (path, relative) in files.iter().filter(|(p, _)| is_markup_or_data(p)) {
                let body = match self.reader.read(path).await {
                    Ok(body) if body.len() as u64 <= self.settings.small_file_bytes => body,
                    _ => continue,
                };
                let section = full_section(relative, &body);
                let tokens = estimate_tokens(&section);
                if used + tokens <= token_budget {
                    content.push_str(&section);
                    used += tokens;
                    inlined += 1;
                }
            }
            if inlined > 0 {
                strategy = ContextStrategy::InlineSmallFiles;
            }
        }

        info!(
            strategy = ?strategy,
            listed = files.len(),
            skeletons = skeleton_files,
            tokens = used,
            "Built fallback workspace context"
        );

        Ok(SmartContext {
            estimated_tokens: estimate_tokens(&content),
            content,
            full_content_files: 0,
            skeleton_files,
            files: Vec::new(),
            keywords,
            listed_files: files.into_iter().map(|(_, relative)| relative).collect(),
            strategy,
        })
    }
}

fn full_section(relative: &str, body: &str) -> String {
    format!("// File: {relative}\n{}\n\n", body.trim_end())
}

fn display_relative(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonicalize when the path exists, otherwise normalize `.` and `..` lexically.
fn canonical_or_lexical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
