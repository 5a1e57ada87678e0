//! Query Planner (4.H): ranked content search, filename search, fused
//! retrieval with retry, the suggestion oracle, and highlighting.
//!
//! Grounded on `perform_search_with_mode` (AND/OR MultifieldParser),
//! `get_multi_keyword_suggestions` (prefix scan preserving leading case),
//! and `highlight_search_results` (truncate-before-highlight ordering).

use crate::filenames::FilenameIndex;
use crate::index::{IndexPartition, Partition};
use crate::shards::ShardMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const MIN_TOKEN_LEN: usize = 2;
pub const MAX_TOKEN_LEN: usize = 39;
const EXCERPT_LEN: usize = 200;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").unwrap())
}

/// The canonical analyzer: word-character tokenization, lowercase, length
/// filter `[2, 39]`. Used identically for indexing and query parsing.
pub fn tokenize(text: &str) -> Vec<String> {
    word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && t.chars().count() <= MAX_TOKEN_LEN)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct ContentHit {
    pub path: String,
    pub score: f64,
    pub page: Option<usize>,
    pub sheet: Option<String>,
}

/// Ranked content search against one partition, scoring across both
/// `content` and `filename` fields.
pub fn search_content(partition: &IndexPartition, query: &str, mode: Mode, limit: usize) -> Vec<ContentHit> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    let scores = partition.search_scores(&tokens, true);

    let mut hits: Vec<(String, f64)> = if mode == Mode::And {
        scores
            .into_iter()
            .filter(|(path, _)| tokens.iter().all(|t| partition.has_token(path, t)))
            .collect()
    } else {
        scores.into_iter().collect()
    };

    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);

    hits.into_iter().map(|(path, score)| ContentHit { path, score, page: None, sheet: None }).collect()
}

/// Rewrite a `docs`-partition hit's shard path back to its origin, attaching
/// the shard's label. `other`-partition hits are left as source-root-relative
/// paths by the caller.
pub fn normalize_docs_hit(hit: &mut ContentHit, shard_map: &ShardMap, root: &Path) {
    let stem = Path::new(&hit.path).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    if let Some((origin, sheet, page)) = shard_map.origin_of(&stem) {
        let origin_path = Path::new(origin);
        hit.path = origin_path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| origin.to_string());
        hit.sheet = sheet.map(|s| s.to_string());
        hit.page = page;
    }
}

/// Split, lowercase, exact-then-substring filename search.
pub fn search_filenames(
    index: &FilenameIndex,
    query: &str,
    and_mode: bool,
    folder_prefix: Option<&str>,
    extension: Option<&str>,
    limit: usize,
) -> Vec<PathBuf> {
    let tokens: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut exact = index.search_exact(&tokens, and_mode, folder_prefix, extension);
    if exact.len() < limit {
        let remaining = limit - exact.len();
        let substr = index.search_substring(&tokens, &exact, remaining);
        exact.extend(substr);
    }
    exact.truncate(limit);
    exact
}

/// Fused retrieval with retry: OR-mode content search, retried with
/// suggestion-rewritten queries up to three attempts, then a filename
/// fallback over the whole tree.
pub fn fused_retrieval(
    partition: &IndexPartition,
    filename_index: &FilenameIndex,
    query: &str,
    limit: usize,
) -> Vec<ContentHit> {
    let mut attempt_query = query.to_string();
    for _ in 0..3 {
        let hits = search_content(partition, &attempt_query, Mode::Or, limit);
        if !hits.is_empty() {
            return hits;
        }
        let suggestions = suggest(partition, &attempt_query, limit);
        match suggestions.into_iter().next() {
            Some(next) => attempt_query = next,
            None => break,
        }
    }

    search_filenames(filename_index, query, false, None, None, limit)
        .into_iter()
        .map(|p| ContentHit { path: p.to_string_lossy().to_string(), score: 0.0, page: None, sheet: None })
        .collect()
}

/// Prefix-scan suggestion oracle over the content lexicon. Multi-token
/// queries hold all but the last token as a fixed prefix; leading-uppercase
/// of the last token is preserved on the reconstructed candidate.
pub fn suggest(partition: &IndexPartition, partial_query: &str, limit: usize) -> Vec<String> {
    let words: Vec<&str> = partial_query.split_whitespace().collect();
    let Some(last) = words.last() else { return Vec::new() };
    let prefix_words = &words[..words.len().saturating_sub(1)];
    let last_lower = last.to_lowercase();
    let preserve_upper = last.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);

    let lexicon = partition.content_lexicon();
    let mut candidates: Vec<String> = lexicon
        .into_iter()
        .filter(|term| term.starts_with(&last_lower))
        .take(limit)
        .map(|term| {
            if preserve_upper {
                let mut chars = term.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                    None => term,
                }
            } else {
                term
            }
        })
        .collect();

    if prefix_words.is_empty() {
        return candidates;
    }
    let prefix = prefix_words.join(" ");
    candidates.iter_mut().for_each(|c| *c = format!("{prefix} {c}"));
    candidates
}

/// Truncate an excerpt to ~200 chars first, then wrap every query term
/// (substring match, surface-preserving) in `<mark>...</mark>`.
pub fn highlight(content: &str, query: &str) -> String {
    let truncated: String = content.chars().take(EXCERPT_LEN).collect();
    let truncated = if content.chars().count() > EXCERPT_LEN { format!("{truncated}...") } else { truncated };

    let terms: Vec<String> = tokenize(query);
    if terms.is_empty() {
        return truncated;
    }

    let mut out = String::with_capacity(truncated.len());
    let lower = truncated.to_lowercase();
    let mut i = 0;
    let chars: Vec<char> = truncated.chars().collect();
    let lower_chars: Vec<char> = lower.chars().collect();
    while i < chars.len() {
        let rest: String = lower_chars[i..].iter().collect();
        if let Some(term) = terms.iter().find(|t| rest.starts_with(t.as_str())) {
            let len = term.chars().count();
            let surface: String = chars[i..i + len].iter().collect();
            out.push_str("<mark>");
            out.push_str(&surface);
            out.push_str("</mark>");
            i += len;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Partition a request's default query-planner mode (AND) from an HTTP
/// endpoint's own convenience default for an omitted `mode` parameter (OR).
pub fn endpoint_default_mode() -> Mode {
    Mode::Or
}

pub fn planner_default_mode() -> Mode {
    Mode::And
}

pub fn partition_for(index_type: &str) -> Partition {
    if index_type == "docs" {
        Partition::Docs
    } else {
        Partition::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::update_partition;
    use tempfile::tempdir;

    #[test]
    fn tokenizer_excludes_out_of_range_lengths() {
        let toks = tokenize("a ab abcde");
        assert_eq!(toks, vec!["ab".to_string(), "abcde".to_string()]);
    }

    #[test]
    fn suggest_preserves_leading_uppercase_and_prefix() {
        let root = tempdir().unwrap();
        let file = root.path().join("a.py");
        std::fs::write(&file, "handler handshake").unwrap();
        let mut partition = IndexPartition::default();
        update_partition(&mut partition, root.path(), &[file]).unwrap();

        let suggestions = suggest(&partition, "use Han", 10);
        assert!(suggestions.iter().any(|s| s.starts_with("use Han")));
    }

    #[test]
    fn highlight_truncates_before_wrapping_terms() {
        let long = "x".repeat(300);
        let out = highlight(&long, "x");
        assert!(out.ends_with("..."));
    }
}
