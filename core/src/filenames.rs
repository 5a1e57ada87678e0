//! Filename Index (4.E): exact-key and substring filename lookup structures,
//! rebuilt as a single pass over the source tree and treated as an
//! immutable snapshot per query.

use ignore::WalkBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct FilenameIndex {
    /// basename / stem / extension (lowercase) -> relative paths.
    exact: HashMap<String, Vec<PathBuf>>,
    /// (relative path, lowercase basename) pairs, for substring scans.
    all: Vec<(PathBuf, String)>,
}

fn relative_key_parts(rel_path: &Path) -> (String, String, Option<String>) {
    let basename = rel_path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    let stem = Path::new(&basename).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| basename.clone());
    let ext = Path::new(&basename).extension().map(|e| format!(".{}", e.to_string_lossy()));
    (basename, stem, ext)
}

impl FilenameIndex {
    /// Build by walking every file under `root`, respecting ignore rules the
    /// way the rest of the ingestion pass does.
    pub fn build(root: &Path) -> Self {
        let mut idx = FilenameIndex::default();
        let walker = WalkBuilder::new(root).hidden(false).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(rel) = path.strip_prefix(root) else { continue };
            idx.insert(rel);
        }
        idx
    }

    fn insert(&mut self, rel_path: &Path) {
        let (basename, stem, ext) = relative_key_parts(rel_path);
        self.exact.entry(basename.clone()).or_default().push(rel_path.to_path_buf());
        self.exact.entry(stem).or_default().push(rel_path.to_path_buf());
        if let Some(ext) = ext {
            self.exact.entry(ext).or_default().push(rel_path.to_path_buf());
        }
        self.all.push((rel_path.to_path_buf(), basename));
    }

    fn matches_prefix_and_ext(&self, path: &Path, folder_prefix: Option<&str>, extension: Option<&str>) -> bool {
        if let Some(prefix) = folder_prefix {
            if !path.to_string_lossy().replace('\\', "/").starts_with(prefix) {
                return false;
            }
        }
        if let Some(ext) = extension {
            let basename = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
            if !basename.ends_with(&ext.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Exact-key search over `tokens` (already lowercased), AND or OR across
    /// tokens, restricted by optional folder prefix / extension suffix.
    pub fn search_exact(
        &self,
        tokens: &[String],
        and_mode: bool,
        folder_prefix: Option<&str>,
        extension: Option<&str>,
    ) -> Vec<PathBuf> {
        if tokens.is_empty() {
            return Vec::new();
        }
        let sets: Vec<Vec<&PathBuf>> = tokens
            .iter()
            .map(|t| self.exact.get(t).map(|v| v.iter().collect()).unwrap_or_default())
            .collect();

        let mut combined: Vec<PathBuf> = if and_mode {
            let mut iter = sets.into_iter();
            let Some(first) = iter.next() else { return Vec::new() };
            let mut acc: Vec<PathBuf> = first.into_iter().cloned().collect();
            for set in iter {
                acc.retain(|p| set.contains(&p));
            }
            acc
        } else {
            let mut seen = std::collections::HashSet::new();
            let mut acc = Vec::new();
            for set in sets {
                for p in set {
                    if seen.insert(p.clone()) {
                        acc.push(p.clone());
                    }
                }
            }
            acc
        };

        combined.retain(|p| self.matches_prefix_and_ext(p, folder_prefix, extension));
        combined.dedup();
        combined
    }

    /// Substring scan over `All`: every AND-token must be a substring of the
    /// lowercase basename. `exclude` paths (already returned by exact search)
    /// are never re-added.
    pub fn search_substring(&self, tokens: &[String], exclude: &[PathBuf], limit: usize) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for (path, basename) in &self.all {
            if out.len() >= limit {
                break;
            }
            if exclude.contains(path) {
                continue;
            }
            if tokens.iter().all(|t| basename.contains(t.as_str())) {
                out.push(path.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn exact_lookup_finds_by_basename_stem_and_extension() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("report.xlsx"), "x").unwrap();
        let idx = FilenameIndex::build(root.path());

        assert_eq!(idx.search_exact(&["report.xlsx".to_string()], true, None, None), vec![PathBuf::from("report.xlsx")]);
        assert_eq!(idx.search_exact(&["report".to_string()], true, None, None), vec![PathBuf::from("report.xlsx")]);
        assert_eq!(idx.search_exact(&[".xlsx".to_string()], true, None, None), vec![PathBuf::from("report.xlsx")]);
    }

    #[test]
    fn substring_scan_never_readds_an_exact_hit() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("widget_report.txt"), "x").unwrap();
        let idx = FilenameIndex::build(root.path());

        let exact = idx.search_exact(&["widget_report.txt".to_string()], true, None, None);
        let subs = idx.search_substring(&["report".to_string()], &exact, 10);
        assert!(subs.is_empty());
    }
}
