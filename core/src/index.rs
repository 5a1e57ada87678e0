//! Index Builder (4.G): an incremental inverted index over two partitions
//! (`docs`, `other`), with a metadata-driven dirty check and atomic commit.
//!
//! Grounded on `update_index`'s mtime/size dirty-check loop; the index
//! engine itself (inverted postings + sidecar metadata) is built directly on
//! the serde stack already used for every other persisted artifact rather
//! than pulling in an embedded search-engine crate this workspace has no
//! other use for.

use crate::error::{CoreError, CoreResult};
use crate::query::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Docs,
    Other,
}

impl Partition {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Partition::Docs => "docs",
            Partition::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub mtime_secs: i64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    filename_tokens: BTreeSet<String>,
    content_tokens: BTreeMap<String, u32>,
}

/// A persisted partition: posting lists for `filename` and `content` fields,
/// plus the per-path metadata used for incremental dirty-checking.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexPartition {
    documents: BTreeMap<String, Document>,
    metadata: BTreeMap<String, FileMeta>,
}

impl IndexPartition {
    pub fn load(dir: &Path) -> CoreResult<Self> {
        let path = dir.join("partition.json");
        if !path.is_file() {
            return Ok(IndexPartition::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| CoreError::Io { path: Some(path.clone()), message: e.to_string() })?;
        serde_json::from_str(&raw).map_err(|e| CoreError::CorruptState { message: e.to_string() })
    }

    pub fn save(&self, dir: &Path) -> CoreResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::Io { path: Some(dir.to_path_buf()), message: e.to_string() })?;
        let path = dir.join("partition.json");
        let tmp = dir.join("partition.json.tmp");
        let body = serde_json::to_string_pretty(self).map_err(|e| CoreError::CorruptState { message: e.to_string() })?;
        std::fs::write(&tmp, body).map_err(|e| CoreError::Io { path: Some(tmp.clone()), message: e.to_string() })?;
        std::fs::rename(&tmp, &path).map_err(|e| CoreError::Io { path: Some(path), message: e.to_string() })?;
        Ok(())
    }

    pub fn metadata(&self) -> &BTreeMap<String, FileMeta> {
        &self.metadata
    }

    fn upsert(&mut self, path_key: &str, filename: &str, content: &str) {
        let mut doc = Document::default();
        for tok in tokenize(filename) {
            doc.filename_tokens.insert(tok);
        }
        for tok in tokenize(content) {
            *doc.content_tokens.entry(tok).or_insert(0) += 1;
        }
        self.documents.insert(path_key.to_string(), doc);
    }

    fn remove(&mut self, path_key: &str) {
        self.documents.remove(path_key);
    }

    /// Document frequency and total document count, for IDF-weighted scoring.
    pub fn search_scores(&self, query_tokens: &[String], field_both: bool) -> HashMap<String, f64> {
        let total_docs = self.documents.len().max(1) as f64;
        let mut scores: HashMap<String, f64> = HashMap::new();

        for token in query_tokens {
            let doc_freq = self
                .documents
                .values()
                .filter(|d| d.content_tokens.contains_key(token) || (field_both && d.filename_tokens.contains(token)))
                .count();
            if doc_freq == 0 {
                continue;
            }
            let idf = (total_docs / doc_freq as f64).ln() + 1.0;
            for (path, doc) in &self.documents {
                let tf = *doc.content_tokens.get(token).unwrap_or(&0) as f64
                    + if field_both && doc.filename_tokens.contains(token) { 1.0 } else { 0.0 };
                if tf > 0.0 {
                    *scores.entry(path.clone()).or_insert(0.0) += tf * idf;
                }
            }
        }
        scores
    }

    /// All distinct content-field tokens, for the suggestion oracle's prefix scan.
    pub fn content_lexicon(&self) -> BTreeSet<String> {
        self.documents.values().flat_map(|d| d.content_tokens.keys().cloned()).collect()
    }

    pub fn contains_path(&self, path_key: &str) -> bool {
        self.documents.contains_key(path_key)
    }

    pub fn has_token(&self, path_key: &str, token: &str) -> bool {
        self.documents
            .get(path_key)
            .map(|d| d.content_tokens.contains_key(token) || d.filename_tokens.contains(token))
            .unwrap_or(false)
    }

    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }
}

fn file_signature(path: &Path) -> CoreResult<FileMeta> {
    let meta = std::fs::metadata(path).map_err(|e| CoreError::Io { path: Some(path.to_path_buf()), message: e.to_string() })?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(FileMeta { mtime_secs: mtime, size: meta.len() })
}

fn is_binary_content(path: &Path) -> bool {
    let Ok(mut f) = std::fs::File::open(path) else { return true };
    use std::io::Read;
    let mut buf = [0u8; 1024];
    let n = f.read(&mut buf).unwrap_or(0);
    buf[..n].contains(&0)
}

/// Incrementally update one partition against `eligible_paths` (absolute
/// paths; `path_key` is computed relative to `root`). Deletes documents for
/// paths no longer eligible, upserts dirty ones, commits once.
pub fn update_partition(
    partition: &mut IndexPartition,
    root: &Path,
    eligible_paths: &[PathBuf],
) -> CoreResult<()> {
    let mut current_keys = BTreeSet::new();
    let mut dirty = Vec::new();

    for path in eligible_paths {
        let key = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
        current_keys.insert(key.clone());
        let sig = match file_signature(path) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let is_dirty = match partition.metadata.get(&key) {
            Some(prev) => *prev != sig,
            None => true,
        };
        if is_dirty {
            dirty.push((key, path.clone(), sig));
        }
    }

    let stale_keys: Vec<String> =
        partition.metadata.keys().filter(|k| !current_keys.contains(*k)).cloned().collect();
    for key in &stale_keys {
        partition.remove(key);
        partition.metadata.remove(key);
    }

    for (key, path, sig) in dirty {
        if is_binary_content(&path) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else { continue };
        let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        partition.upsert(&key, &filename, &content);
        partition.metadata.insert(key, sig);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rerun_with_no_changes_produces_identical_metadata() {
        let root = tempdir().unwrap();
        let file = root.path().join("a.py");
        std::fs::write(&file, "def ab(): pass").unwrap();

        let mut partition = IndexPartition::default();
        update_partition(&mut partition, root.path(), &[file.clone()]).unwrap();
        let first = partition.metadata().clone();

        update_partition(&mut partition, root.path(), &[file.clone()]).unwrap();
        let second = partition.metadata().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn removed_path_is_deleted_from_index_and_metadata() {
        let root = tempdir().unwrap();
        let file = root.path().join("a.py");
        std::fs::write(&file, "ab").unwrap();

        let mut partition = IndexPartition::default();
        update_partition(&mut partition, root.path(), &[file.clone()]).unwrap();
        assert!(partition.contains_path("a.py"));

        update_partition(&mut partition, root.path(), &[]).unwrap();
        assert!(!partition.contains_path("a.py"));
        assert!(partition.metadata().is_empty());
    }

    #[test]
    fn token_length_filter_excludes_short_and_long_tokens() {
        let root = tempdir().unwrap();
        let file = root.path().join("a.py");
        std::fs::write(&file, "a ab abcde").unwrap();

        let mut partition = IndexPartition::default();
        update_partition(&mut partition, root.path(), &[file]).unwrap();
        let lexicon = partition.content_lexicon();
        assert!(lexicon.contains("ab"));
        assert!(lexicon.contains("abcde"));
        assert!(!lexicon.contains("a"));
    }
}
