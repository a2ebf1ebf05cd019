//! Corpus loading: documentation files split into paragraph chunks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{SearchError, SearchResult};

use super::SearchDocument;

static RE_PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

const CORPUS_EXTENSIONS: &[&str] = &["md", "txt"];

/// Split text into trimmed, non-empty chunks separated by blank lines.
pub fn chunk_text(text: &str) -> Vec<String> {
    RE_PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_corpus_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CORPUS_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Corpus files under `roots`, in order: each root is either a file or a
/// directory whose top-level `.md`/`.txt` files are taken in name order.
/// Missing roots are skipped with a warning.
pub fn discover_files(roots: &[PathBuf]) -> SearchResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            if is_corpus_file(root) {
                files.push(root.clone());
            }
            continue;
        }
        if !root.is_dir() {
            warn!(path = %root.display(), "corpus path does not exist, skipping");
            continue;
        }
        let entries = std::fs::read_dir(root).map_err(|source| SearchError::Io {
            path: root.display().to_string(),
            source,
        })?;
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_corpus_file(p))
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// Load every corpus file under `roots` as chunked documents.
///
/// Document ids are `"{path}#{n}"` with `n` counting chunks from zero; the
/// source is the file path. Files are read in parallel, output keeps
/// discovery order.
pub fn load_corpus(roots: &[PathBuf]) -> SearchResult<Vec<SearchDocument>> {
    let files = discover_files(roots)?;
    let per_file: Vec<Vec<SearchDocument>> = files
        .par_iter()
        .map(|path| -> SearchResult<Vec<SearchDocument>> {
            let text = std::fs::read_to_string(path).map_err(|source| SearchError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let source = path.display().to_string();
            Ok(chunk_text(&text)
                .into_iter()
                .enumerate()
                .map(|(n, chunk)| {
                    SearchDocument::new(format!("{source}#{n}"), source.clone(), chunk)
                })
                .collect())
        })
        .collect::<SearchResult<_>>()?;

    let docs: Vec<SearchDocument> = per_file.into_iter().flatten().collect();
    debug!(files = files.len(), chunks = docs.len(), "loaded search corpus");
    Ok(docs)
}
