//! CodeScope server: HTTP transport and the agent orchestrator built on top
//! of `codescope-core`'s ingestion pipeline and retrieval structures.

pub mod agent;
pub mod api;
pub mod router;
pub mod state;
pub mod watch;

pub use router::build_router;
pub use state::AppState;
