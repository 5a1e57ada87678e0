//! Folder Model (4.D): a hierarchical folder tree annotated with
//! per-extension file counts, built with bounded fan-out at shallow depth.
//!
//! Grounded on `build_folder_tree_json`'s exact concurrency shape: parallel
//! workers are only spawned for subtrees at depth 0/1 with more than 5
//! entries, using a fixed-size worker pool (`ThreadPoolExecutor(max_workers=10)`
//! in the original, a scoped `rayon::ThreadPoolBuilder` here).

use crate::config::BinaryExtensionSet;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const MAX_FANOUT_DEPTH: usize = 1;
const FANOUT_ENTRY_THRESHOLD: usize = 5;
const FANOUT_WORKERS: usize = 10;
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct FolderNode {
    pub name: String,
    pub counts: BTreeMap<String, usize>,
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    fn leaf(name: &str) -> Self {
        FolderNode { name: name.to_string(), counts: BTreeMap::new(), children: Vec::new() }
    }

    fn add_count(&mut self, ext: &str, n: usize) {
        *self.counts.entry(ext.to_string()).or_insert(0) += n;
    }

    fn merge_child_counts(&mut self, child: &FolderNode) {
        for (ext, n) in &child.counts {
            self.add_count(ext, *n);
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

fn looks_binary(path: &Path) -> bool {
    let Ok(mut f) = fs::File::open(path) else { return false };
    use std::io::Read;
    let mut buf = [0u8; 1024];
    let n = f.read(&mut buf).unwrap_or(0);
    buf[..n].contains(&0)
}

/// Build the full folder tree rooted at `dir`. `skip_binary` additionally
/// excludes BinaryExtensionSet members, NUL-containing files, and extensions
/// longer than 10 chars — the "non-binary-only" variant.
pub fn build_tree(dir: &Path, binary_exts: &BinaryExtensionSet, skip_binary: bool) -> FolderNode {
    build_tree_at(dir, binary_exts, skip_binary, 0)
}

fn build_tree_at(dir: &Path, binary_exts: &BinaryExtensionSet, skip_binary: bool, depth: usize) -> FolderNode {
    let name = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| dir.display().to_string());
    let mut node = FolderNode::leaf(&name);

    let Ok(entries) = fs::read_dir(dir) else { return node };
    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else {
            files.push(path);
        }
    }

    for file in &files {
        let ext = extension_of(file);
        if skip_binary {
            if ext.len() > MAX_EXTENSION_LEN {
                continue;
            }
            if binary_exts.contains(&ext) {
                continue;
            }
            if looks_binary(file) {
                continue;
            }
        }
        node.add_count(&ext, 1);
    }

    let children: Vec<FolderNode> = if depth <= MAX_FANOUT_DEPTH && subdirs.len() > FANOUT_ENTRY_THRESHOLD {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(FANOUT_WORKERS)
            .build()
            .expect("failed to build folder-scan thread pool");
        pool.install(|| {
            use rayon::prelude::*;
            subdirs
                .par_iter()
                .map(|d| build_tree_at(d, binary_exts, skip_binary, depth + 1))
                .collect()
        })
    } else {
        subdirs.iter().map(|d| build_tree_at(d, binary_exts, skip_binary, depth + 1)).collect()
    };

    for child in &children {
        node.merge_child_counts(child);
    }
    node.children = children;
    node
}

/// A displayable line: name (possibly merged with ancestors), count, indent depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub name: String,
    pub count: usize,
    pub depth: usize,
}

fn filtered_count(node: &FolderNode, ext_filter: &str) -> usize {
    if ext_filter == "*" {
        node.counts.values().sum()
    } else {
        *node.counts.get(ext_filter).unwrap_or(&0)
    }
}

/// Render `node` under `ext_filter`, collapsing zero-count nodes, merging a
/// sole child whose filtered count equals the parent's, and truncating the
/// subtree at `max_depth` (if given) to a single aggregated line.
pub fn display(node: &FolderNode, ext_filter: &str, max_depth: Option<usize>) -> Vec<DisplayLine> {
    let mut out = Vec::new();
    display_rec(node, ext_filter, max_depth, 0, node.name.clone(), &mut out);
    out
}

fn display_rec(
    node: &FolderNode,
    ext_filter: &str,
    max_depth: Option<usize>,
    depth: usize,
    display_name: String,
    out: &mut Vec<DisplayLine>,
) {
    let count = filtered_count(node, ext_filter);
    if count == 0 {
        return;
    }

    if let Some(max) = max_depth {
        if depth >= max {
            out.push(DisplayLine { name: display_name, count, depth });
            return;
        }
    }

    let visible_children: Vec<&FolderNode> =
        node.children.iter().filter(|c| filtered_count(c, ext_filter) > 0).collect();

    if visible_children.len() == 1 && filtered_count(visible_children[0], ext_filter) == count {
        let merged_name = format!("{}/{}", display_name, visible_children[0].name);
        display_rec(visible_children[0], ext_filter, max_depth, depth, merged_name, out);
        return;
    }

    out.push(DisplayLine { name: display_name, count, depth });
    for child in visible_children {
        display_rec(child, ext_filter, max_depth, depth + 1, child.name.clone(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn counts_files_by_extension_and_aggregates_upward() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("a.py"), "x").unwrap();
        let sub = root.path().join("sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("b.py"), "x").unwrap();
        fs::write(sub.join("c.txt"), "x").unwrap();

        let binary_exts = BinaryExtensionSet::default();
        let tree = build_tree(root.path(), &binary_exts, true);
        assert_eq!(tree.counts.get("py"), Some(&2));
        assert_eq!(tree.counts.get("txt"), Some(&1));
    }

    #[test]
    fn skip_binary_excludes_known_binary_extensions() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("a.png"), [0u8, 1, 2]).unwrap();
        fs::write(root.path().join("a.py"), "x").unwrap();

        let binary_exts = BinaryExtensionSet::default();
        let tree = build_tree(root.path(), &binary_exts, true);
        assert_eq!(tree.counts.get("png"), None);
        assert_eq!(tree.counts.get("py"), Some(&1));
    }

    #[test]
    fn display_omits_zero_count_nodes_and_merges_single_child() {
        let mut root = FolderNode::leaf("root");
        let mut a = FolderNode::leaf("a");
        let mut b = FolderNode::leaf("b");
        b.add_count("py", 3);
        a.merge_child_counts(&b);
        a.children.push(b);
        root.merge_child_counts(&a);
        root.children.push(a);

        let lines = display(&root, "py", None);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "root/a/b");
        assert_eq!(lines[0].count, 3);
    }
}
