//! Test harness for HTTP integration tests.
//!
//! Builds an [`AppState`] from fixture files in a temp dir, runs the full
//! ingestion pipeline once, then serves the real router on an ephemeral
//! localhost port so tests exercise the handlers exactly as `serve` does.

pub mod fixtures;

use codescope_server::agent::HeuristicModel;
use codescope_server::AppState;
use codescope_core::{BinaryExtensionSet, Config, SharedConfig};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    pub base_url: String,
    pub state: Arc<AppState>,
    _temp_dir: TempDir,
}

impl TestHarness {
    /// Build a harness from a named fixture directory under `tests/fixtures`,
    /// run an initial ingestion pass, and bind the router on `127.0.0.1:0`.
    pub async fn from_fixture(name: &str) -> Self {
        let fixture_src =
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
        assert!(fixture_src.exists(), "fixture '{name}' not found at {}", fixture_src.display());

        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let root = temp_dir.path();
        fixtures::copy_dir_recursive(&fixture_src, root);

        let config = Config::new(root.to_path_buf());
        let binary_exts = BinaryExtensionSet::default();
        let cancel = Arc::new(AtomicBool::new(false));
        let initial = codescope_core::ingest::run(
            &config,
            &binary_exts,
            &codescope_core::progress::NullProgress,
            &cancel,
        )
        .expect("initial ingestion failed");

        let shared_config = SharedConfig::new(config);
        let state =
            Arc::new(AppState::new(shared_config, binary_exts, initial, Arc::new(HeuristicModel)));

        let router = codescope_server::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has no local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestHarness { base_url: format!("http://{addr}"), state, _temp_dir: temp_dir }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
