//! Search over the provisioned data directory.
//!
//! The search tool hands every query to a [`DocSearch`] implementation
//! together with the data directory path. The directory is read directly
//! from disk on each call; nothing is indexed or locked, so a query racing
//! a background pull may see a mix of old and new files.
//!
//! [`KeywordSearch`] is the built-in implementation: a term-frequency scan
//! over text files, cut to a token budget.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Token budget the search tool passes with every query.
pub const MAX_TOKENS: usize = 10_000;

/// Approximate chars-per-token ratio used for budgeting.
const CHARS_PER_TOKEN: usize = 4;

/// Lines of context kept on each side of the first matching line.
const SNIPPET_LINES: usize = 2;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub path: PathBuf,
    pub query: String,
    pub max_tokens: usize,
    /// 1-based page of budget-sized result windows.
    pub page: usize,
}

/// Natural-language search over a directory of documents.
#[async_trait]
pub trait DocSearch: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<String>;
}

/// Case-insensitive keyword search over UTF-8 files.
#[derive(Debug, Clone, Default)]
pub struct KeywordSearch;

#[async_trait]
impl DocSearch for KeywordSearch {
    async fn search(&self, request: SearchRequest) -> Result<String> {
        tokio::task::spawn_blocking(move || search_dir(&request)).await?
    }
}

struct Hit {
    relative: String,
    score: usize,
    snippet: String,
}

fn search_dir(request: &SearchRequest) -> Result<String> {
    let terms: Vec<String> = request
        .query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if terms.is_empty() {
        bail!("query must not be empty");
    }
    if request.page == 0 {
        bail!("page must be >= 1");
    }

    let mut hits = Vec::new();
    for entry in WalkDir::new(&request.path)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        // Binary and non-UTF-8 files are skipped silently.
        let Ok(body) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        if let Some(hit) = score_file(&request.path, entry.path(), &body, &terms) {
            hits.push(hit);
        }
    }

    hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.relative.cmp(&b.relative)));

    let pages = paginate(&hits, request.max_tokens * CHARS_PER_TOKEN);
    match pages.get(request.page - 1) {
        Some(page) => Ok(page.clone()),
        None if hits.is_empty() => Ok(format!("No results for \"{}\".", request.query)),
        None => Ok(format!(
            "No more results: page {} requested, {} available.",
            request.page,
            pages.len()
        )),
    }
}

fn score_file(root: &Path, path: &Path, body: &str, terms: &[String]) -> Option<Hit> {
    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();
    let haystack = body.to_lowercase();
    let path_lower = relative.to_lowercase();

    let score: usize = terms
        .iter()
        .map(|t| haystack.matches(t.as_str()).count() + 3 * path_lower.matches(t.as_str()).count())
        .sum();
    if score == 0 {
        return None;
    }

    Some(Hit {
        snippet: snippet(body, terms),
        relative,
        score,
    })
}

/// Lines around the first line containing any term, or the head of the file.
fn snippet(body: &str, terms: &[String]) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let first = lines
        .iter()
        .position(|line| {
            let lower = line.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .unwrap_or(0);
    let start = first.saturating_sub(SNIPPET_LINES);
    let end = (first + SNIPPET_LINES + 1).min(lines.len());
    lines[start..end].join("\n")
}

/// Pack hits into pages no longer than `max_chars`. A single hit longer than
/// the budget is truncated on a char boundary.
fn paginate(hits: &[Hit], max_chars: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut current = String::new();

    for hit in hits {
        let mut section = format!("## {}\n\n{}\n\n", hit.relative, hit.snippet);
        if section.len() > max_chars {
            let mut cut = max_chars;
            while !section.is_char_boundary(cut) {
                cut -= 1;
            }
            section.truncate(cut);
        }
        if !current.is_empty() && current.len() + section.len() > max_chars {
            pages.push(std::mem::take(&mut current));
        }
        current.push_str(&section);
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}
