//! CodeScope binary: `ingest`, `doctor`, and `serve` over the
//! [`codescope_server`] library crate.

use clap::{CommandFactory, Parser, Subcommand};
use codescope_server::agent::HeuristicModel;
use codescope_server::{build_router, watch, AppState};
use codescope_core::config::BinaryExtensionSet;
use codescope_core::{Config, CoreError, CoreResult, SharedConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "codescope", version, about = "Local code-and-document intelligence service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full ingestion pipeline once and exit.
    Ingest {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a source root and configuration without writing anything.
    Doctor {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the HTTP server, after an initial ingestion pass.
    Serve {
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value_t = 6546)]
        port: u16,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a shell completion script for this CLI.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn build_config(root: PathBuf, config_path: Option<PathBuf>) -> CoreResult<Config> {
    let mut config = match &config_path {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::new(root.clone()),
    };
    config.root = root;
    Ok(config)
}

async fn run_ingest(root: PathBuf, config_path: Option<PathBuf>) -> CoreResult<()> {
    let config = build_config(root, config_path)?;
    let binary_exts = BinaryExtensionSet::load(config.binary_extensions_path.as_deref())?;
    let cancel = Arc::new(AtomicBool::new(false));
    let result =
        codescope_core::ingest::run(&config, &binary_exts, &codescope_core::progress::NullProgress, &cancel)?;
    println!(
        "ingested {} python files ({} modules); other index: {} documents; docs index: {} documents",
        result.files.len(),
        result.graph.module_count(),
        result.other_partition.doc_count(),
        result.docs_partition.doc_count(),
    );
    Ok(())
}

async fn run_doctor(root: PathBuf, config_path: Option<PathBuf>) -> CoreResult<()> {
    if !root.is_dir() {
        return Err(CoreError::NotFound { path: root.display().to_string() });
    }
    let config = build_config(root, config_path)?;
    let binary_exts = BinaryExtensionSet::load(config.binary_extensions_path.as_deref())?;
    println!("source root:    {}", config.root.display());
    println!("shard dir:      {}", config.shard_dir_path().display());
    println!("index dir:      {}", config.index_dir_path().display());
    println!("binary exts:    loaded ({} not shown exhaustively)", if config.binary_extensions_path.is_some() { "custom" } else { "built-in" });
    let _ = &binary_exts;
    println!("doctor: configuration is valid");
    Ok(())
}

async fn run_serve(root: PathBuf, port: u16, config_path: Option<PathBuf>) -> CoreResult<()> {
    let config = build_config(root, config_path)?;
    let binary_exts = BinaryExtensionSet::load(config.binary_extensions_path.as_deref())?;

    tracing::info!(root = %config.root.display(), "running initial ingestion pass");
    let cancel = Arc::new(AtomicBool::new(false));
    let initial =
        codescope_core::ingest::run(&config, &binary_exts, &codescope_core::progress::NullProgress, &cancel)?;

    let shared_config = SharedConfig::new(config);
    let state = Arc::new(AppState::new(shared_config, binary_exts, initial, Arc::new(HeuristicModel)));

    let _watcher = watch::spawn(state.clone());

    let app = build_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(CoreError::from)?;
    tracing::info!(%addr, "codescope serving");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoreError::Io { path: None, message: e.to_string() })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run(cli: Cli) -> CoreResult<()> {
    match cli.command {
        Command::Ingest { root, config } => run_ingest(root, config).await,
        Command::Doctor { root, config } => run_doctor(root, config).await,
        Command::Serve { root, port, config } => run_serve(root, port, config).await,
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
