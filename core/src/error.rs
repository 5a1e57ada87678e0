//! The error surface for the ingestion and retrieval pipeline.
//!
//! Kept as one flat enum with string context rather than a `thiserror`-derived
//! hierarchy or `anyhow`, matching how this workspace already threads errors
//! through `Result<T, String>` and axum `(StatusCode, Json<Value>)` pairs.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CoreError {
    /// A source file could not be parsed. Non-fatal to the enclosing pass.
    Parse { path: PathBuf, message: String },
    /// A file could not be read or written.
    Io { path: Option<PathBuf>, message: String },
    /// The Path Resolver found no binding for a symbolic reference.
    ResolutionMiss { reason: String },
    /// A shard extractor failed on one origin file.
    Extraction { path: PathBuf, message: String },
    /// A request path escaped the source root or targeted the shard directory directly.
    AccessDenied { path: String },
    /// A request path does not exist.
    NotFound { path: String },
    /// An LLM or subordinate HTTP call failed.
    Upstream { message: String },
    /// A sidecar metadata table failed to load.
    CorruptState { message: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Parse { path, message } => {
                write!(f, "parse error in {}: {message}", path.display())
            }
            CoreError::Io { path, message } => match path {
                Some(p) => write!(f, "io error at {}: {message}", p.display()),
                None => write!(f, "io error: {message}"),
            },
            CoreError::ResolutionMiss { reason } => write!(f, "resolution miss: {reason}"),
            CoreError::Extraction { path, message } => {
                write!(f, "extraction error for {}: {message}", path.display())
            }
            CoreError::AccessDenied { path } => write!(f, "access denied: {path}"),
            CoreError::NotFound { path } => write!(f, "not found: {path}"),
            CoreError::Upstream { message } => write!(f, "upstream error: {message}"),
            CoreError::CorruptState { message } => write!(f, "corrupt state: {message}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io { path: None, message: e.to_string() }
    }
}

impl CoreError {
    /// HTTP status code this error kind surfaces as, per the propagation policy.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::AccessDenied { .. } => 403,
            CoreError::NotFound { .. } => 404,
            CoreError::Upstream { .. } => 502,
            _ => 500,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
