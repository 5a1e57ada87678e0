//! Top-level ingestion pipeline: walks the source tree and runs the B → C →
//! F → G → E passes in the fixed order the service depends on for
//! consistency (Folder/Index/Filename views always reflect a completed F).
//!
//! Grounded on `init.py`'s orchestration order: folder tree + search index,
//! then code analysis, then shard extraction, then mapping save. Index
//! building itself runs as its own step here (the upstream calls it from the
//! `/update` endpoint, after this same setup sequence).

use crate::analyzer::{self, SourceFile};
use crate::binder::{self, DependencyGraph};
use crate::config::{BinaryExtensionSet, Config};
use crate::error::CoreResult;
use crate::filenames::FilenameIndex;
use crate::folder::{self, FolderNode};
use crate::index::{update_partition, IndexPartition, Partition};
use crate::progress::{Cadence, ProgressSink};
use crate::shards::{self, ShardMap};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct IngestResult {
    pub files: HashMap<PathBuf, SourceFile>,
    pub graph: DependencyGraph,
    pub folder_tree: FolderNode,
    pub filename_index: FilenameIndex,
    pub shard_map: ShardMap,
    pub docs_partition: IndexPartition,
    pub other_partition: IndexPartition,
}

/// Cooperative cancellation flag checked at file boundaries; in-flight file
/// work always completes.
pub type CancellationToken = Arc<AtomicBool>;

fn is_cancelled(token: &CancellationToken) -> bool {
    token.load(Ordering::Relaxed)
}

fn walk_python_files(root: &std::path::Path) -> Vec<PathBuf> {
    ignore::WalkBuilder::new(root)
        .hidden(false)
        .build()
        .flatten()
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("py"))
        .collect()
}

fn walk_other_eligible_files(
    root: &std::path::Path,
    shard_dir: &std::path::Path,
    index_dir: &std::path::Path,
    binary_exts: &BinaryExtensionSet,
) -> Vec<PathBuf> {
    ignore::WalkBuilder::new(root)
        .hidden(false)
        .build()
        .flatten()
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.is_file())
        .filter(|p| !p.starts_with(shard_dir))
        .filter(|p| !p.starts_with(index_dir))
        .filter(|p| {
            let ext = p.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
            !binary_exts.contains(&ext)
        })
        .collect()
}

fn walk_shard_txt_files(shard_dir: &std::path::Path) -> Vec<PathBuf> {
    if !shard_dir.is_dir() {
        return Vec::new();
    }
    std::fs::read_dir(shard_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
        .collect()
}

/// Run the full pipeline once: B (parse) → C (bind) → F (shards) → G (index,
/// both partitions) → E (filename index, rebuilt last so it always agrees
/// with F and G as of this run).
pub fn run(
    config: &Config,
    binary_exts: &BinaryExtensionSet,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> CoreResult<IngestResult> {
    let root = config.root.clone();
    let shard_dir = config.shard_dir_path();

    // B: parse every Python file.
    let py_files = walk_python_files(&root);
    let cadence = Cadence::new(py_files.len(), 5);
    let mut files = HashMap::new();
    for path in &py_files {
        if is_cancelled(cancel) {
            break;
        }
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let sf = analyzer::analyze(path, &root, &text);
                files.insert(path.clone(), sf);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable source file");
            }
        }
        if let Some(pct) = cadence.tick() {
            progress.report("code_analysis", pct);
        }
    }

    // C: bind references and build the dependency graph.
    let graph = binder::bind(&mut files);

    // F: extract shards (office documents) and persist the mapping.
    let shard_map = shards::extract_all(&root, &shard_dir, binary_exts, progress)?;

    // G: update both index partitions from current eligible files.
    let mut docs_partition = IndexPartition::load(&config.index_dir_path().join(Partition::Docs.dir_name()))?;
    let shard_txts = walk_shard_txt_files(&shard_dir);
    update_partition(&mut docs_partition, &shard_dir, &shard_txts)?;
    docs_partition.save(&config.index_dir_path().join(Partition::Docs.dir_name()))?;
    progress.report("docs_index", 100);

    let mut other_partition = IndexPartition::load(&config.index_dir_path().join(Partition::Other.dir_name()))?;
    let other_eligible = walk_other_eligible_files(&root, &shard_dir, &config.index_dir_path(), binary_exts);
    update_partition(&mut other_partition, &root, &other_eligible)?;
    other_partition.save(&config.index_dir_path().join(Partition::Other.dir_name()))?;
    progress.report("other_index", 100);

    // D: folder model (used by /tree and the agent's DirectoryExplorer tool).
    let folder_tree = folder::build_tree(&root, binary_exts, true);

    // E: filename index, rebuilt last.
    let filename_index = FilenameIndex::build(&root);
    progress.report("filename_index", 100);

    Ok(IngestResult {
        files,
        graph,
        folder_tree,
        filename_index,
        shard_map,
        docs_partition,
        other_partition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use tempfile::tempdir;

    #[test]
    fn full_pipeline_runs_over_a_small_tree() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.py"), "import os\ndef run(): pass\n").unwrap();

        let mut config = Config::new(root.path().to_path_buf());
        config.shard_dir = "__docs__".to_string();
        config.index_dir = "index".to_string();
        let binary_exts = BinaryExtensionSet::default();
        let cancel = CancellationToken::new(AtomicBool::new(false));

        let result = run(&config, &binary_exts, &NullProgress, &cancel).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.other_partition.doc_count() >= 1);
    }

    #[test]
    fn rerunning_the_pipeline_does_not_index_its_own_index_directory() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.py"), "import os\ndef run(): pass\n").unwrap();
        std::fs::write(root.path().join("notes.txt"), "hello\n").unwrap();

        let mut config = Config::new(root.path().to_path_buf());
        config.shard_dir = "__docs__".to_string();
        config.index_dir = "index".to_string();
        let binary_exts = BinaryExtensionSet::default();
        let cancel = CancellationToken::new(AtomicBool::new(false));

        run(&config, &binary_exts, &NullProgress, &cancel).unwrap();
        let second = run(&config, &binary_exts, &NullProgress, &cancel).unwrap();

        assert!(second.other_partition.metadata().keys().all(|k| !k.starts_with("index/")));
    }
}
