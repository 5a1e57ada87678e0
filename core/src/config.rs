//! Configuration as an explicit, versioned snapshot rather than re-read global state.
//!
//! Readers clone an `Arc<Config>`; updates go through `SharedConfig::update`, which
//! takes the single writer lock, produces a new snapshot, and swaps it in.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Default name of the shard directory under the source root.
pub const DEFAULT_SHARD_DIR: &str = "__docs__";
/// Default name of the index directory under the source root.
pub const DEFAULT_INDEX_DIR: &str = "index";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path to the source tree being served.
    pub root: PathBuf,
    #[serde(default = "default_shard_dir")]
    pub shard_dir: String,
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
    /// Optional path to a YAML file with a `binary_extensions` key; falls back to
    /// the built-in default list when absent.
    #[serde(default)]
    pub binary_extensions_path: Option<PathBuf>,
    /// LLM endpoint — external collaborator, only round-tripped through `/config`.
    #[serde(default)]
    pub end_point: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_shard_dir() -> String {
    DEFAULT_SHARD_DIR.to_string()
}

fn default_index_dir() -> String {
    DEFAULT_INDEX_DIR.to_string()
}

impl Config {
    pub fn new(root: PathBuf) -> Self {
        Config {
            root,
            shard_dir: DEFAULT_SHARD_DIR.to_string(),
            index_dir: DEFAULT_INDEX_DIR.to_string(),
            binary_extensions_path: None,
            end_point: String::new(),
            api_key: String::new(),
        }
    }

    pub fn from_toml_file(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Io { path: Some(path.to_path_buf()), message: e.to_string() })?;
        toml::from_str(&raw)
            .map_err(|e| CoreError::CorruptState { message: format!("invalid config: {e}") })
    }

    pub fn shard_dir_path(&self) -> PathBuf {
        self.root.join(&self.shard_dir)
    }

    pub fn index_dir_path(&self) -> PathBuf {
        self.root.join(&self.index_dir)
    }
}

/// Read-mostly configuration snapshot behind a single writer mutex.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<Mutex<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        SharedConfig { inner: Arc::new(Mutex::new(Arc::new(config))) }
    }

    /// Take a consistent snapshot for reading.
    pub fn snapshot(&self) -> Arc<Config> {
        self.inner.lock().expect("config lock poisoned").clone()
    }

    /// Apply `allowed_keys`-restricted updates, producing a new snapshot.
    pub fn update(&self, patch: ConfigPatch) {
        let mut guard = self.inner.lock().expect("config lock poisoned");
        let mut next = (**guard).clone();
        if let Some(end_point) = patch.end_point {
            next.end_point = end_point;
        }
        if let Some(api_key) = patch.api_key {
            next.api_key = api_key;
        }
        if let Some(app_dir) = patch.app_dir {
            next.root = app_dir;
        }
        *guard = Arc::new(next);
    }
}

/// The fixed set of keys `/config` accepts on update, matching the upstream
/// `allowed_keys = {"end_point", "api_key", "app_dir"}` contract exactly.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigPatch {
    pub end_point: Option<String>,
    pub api_key: Option<String>,
    pub app_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// BinaryExtensionSet
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BinaryExtensionsFile {
    binary_extensions: Vec<String>,
}

/// Case-insensitive set of file extensions (without the leading dot) that are
/// authoritative for "skip without reading content".
#[derive(Debug, Clone)]
pub struct BinaryExtensionSet {
    extensions: HashSet<String>,
}

impl BinaryExtensionSet {
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| CoreError::Io { path: Some(p.to_path_buf()), message: e.to_string() })?;
                let parsed: BinaryExtensionsFile = serde_yaml::from_str(&raw)
                    .map_err(|e| CoreError::CorruptState { message: e.to_string() })?;
                Ok(BinaryExtensionSet {
                    extensions: parsed
                        .binary_extensions
                        .into_iter()
                        .map(|e| e.trim_start_matches('.').to_lowercase())
                        .collect(),
                })
            }
            None => Ok(Self::default()),
        }
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.trim_start_matches('.').to_lowercase())
    }
}

impl Default for BinaryExtensionSet {
    fn default() -> Self {
        const DEFAULTS: &[&str] = &[
            "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tiff",
            "mp3", "mp4", "wav", "flac", "ogg", "avi", "mov", "mkv",
            "zip", "tar", "gz", "7z", "rar", "bz2", "xz",
            "exe", "dll", "so", "dylib", "bin", "o", "a", "lib",
            "pdf", "xlsx", "xls", "xlsm", "doc", "docx", "odt", "ppt", "pptx",
            "woff", "woff2", "ttf", "otf", "eot",
            "pyc", "class", "jar", "db", "sqlite", "sqlite3",
        ];
        BinaryExtensionSet { extensions: DEFAULTS.iter().map(|s| s.to_string()).collect() }
    }
}
