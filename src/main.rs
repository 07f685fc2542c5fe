//! # Docs Harness CLI (`docs-harness`)
//!
//! ```bash
//! docs-harness --config ./docs-harness.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Reset the data directory and provision it from scratch |
//! | `serve` | Provision for runtime, start the updater, serve MCP on stdio |
//! | `sync` | Run one synchronize pass against an existing clone |
//!
//! Logs go to stderr; stdout belongs to the MCP transport. Set `RUST_LOG`
//! to change verbosity (default `info`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docs_harness::config::{self, SourceKind};
use docs_harness::mcp::DocsServer;
use docs_harness::mirror::RepositoryMirror;
use docs_harness::search::KeywordSearch;
use docs_harness::{Mode, ProvisioningEngine};

/// Provision a documentation snapshot and serve it through an MCP search tool.
#[derive(Parser)]
#[command(name = "docs-harness", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docs-harness.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the data directory from an empty state.
    ///
    /// Static sources are copied, repositories are downloaded as an archive
    /// (or cloned when auto-update is enabled). Exits non-zero on failure.
    Build,

    /// Provision for runtime and serve the search tool over stdio.
    ///
    /// With a repository source and `autoUpdateInterval > 0`, a background
    /// updater pulls new commits until the process is interrupted.
    Serve,

    /// Fetch and pull an existing clone once, then exit.
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build => {
            let engine = ProvisioningEngine::new(cfg.provisioning());
            engine
                .provision(Mode::Build)
                .await
                .context("provisioning failed")?;
        }
        Commands::Serve => serve(cfg).await?,
        Commands::Sync => {
            let prov = cfg.provisioning();
            let SourceKind::Repository { git_ref, .. } = &prov.source else {
                bail!("sync requires gitUrl to be configured");
            };
            let engine = ProvisioningEngine::new(prov.clone());
            let mirror = engine.mirror();
            if !mirror.is_valid_clone(&prov.target_dir).await {
                bail!(
                    "{} is not a git clone; run `docs-harness build` with autoUpdateInterval > 0 first",
                    prov.target_dir.display()
                );
            }
            let report = mirror.try_synchronize(&prov.target_dir, git_ref).await?;
            println!(
                "updated: {}, behind by: {}",
                report.updated, report.behind_count
            );
        }
    }

    Ok(())
}

async fn serve(cfg: config::Config) -> anyhow::Result<()> {
    let engine = ProvisioningEngine::new(cfg.provisioning());
    let mut scheduler = engine
        .provision(Mode::Runtime)
        .await
        .context("provisioning failed")?
        .into_scheduler();

    let server = DocsServer::new(&cfg, Arc::new(KeywordSearch));
    tracing::info!(tool = server.tool_name(), "serving MCP on stdio");

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start MCP server")?;

    let cancel = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; shutting down");
            cancel.cancel();
        }
    });

    let reason = service.waiting().await;
    tracing::info!(reason = ?reason, "MCP server stopped");

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.stop(cfg.shutdown_grace()).await;
    }
    Ok(())
}
