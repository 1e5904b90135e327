use anyhow::Context;
use clap::{Parser, Subcommand};
use codexa_cli::config::Config;
use codexa_preview::{PreviewConfig, PreviewController, SessionLock, SystemProcessTable};
use codexa_storage::{SqliteFileStore, StorageConfig, StructureNode};
use colored::*;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand)]
enum PreviewCommands {
    /// Stop the preview left behind by a previous run
    Stop,
}

#[derive(Parser)]
#[command(name = "codexa")]
#[command(about = "Codexa preview supervisor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, help = "API server port (defaults to CODEXA_API_PORT or 4001)")]
        port: Option<u16>,
    },
    /// Load a generated structure tree into the file store
    Import {
        /// Project to store the files under
        project_id: String,
        /// JSON file holding an array of structure nodes
        structure: PathBuf,
    },
    /// Manage the preview session
    #[command(subcommand)]
    Preview(PreviewCommands),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let mut config = Config::from_env().context("Invalid server configuration")?;

    match command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Commands::Import {
            project_id,
            structure,
        } => import_structure(&config, &project_id, structure).await,
        Commands::Preview(PreviewCommands::Stop) => stop_leftover_preview().await,
    }
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteFileStore> {
    let storage_config = StorageConfig {
        path: config.database_path.clone(),
        ..StorageConfig::default()
    };
    SqliteFileStore::new(storage_config)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path.display()))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    println!("{}", "Starting Codexa preview server...".green().bold());
    println!(
        "{} http://localhost:{}",
        "API:".cyan(),
        config.port
    );
    println!("{} {}", "CORS origin:".cyan(), config.cors_origin);

    let store = open_store(&config).await?;
    let controller = codexa_preview::init(Arc::new(store)).await;
    let urls = controller.urls();
    println!(
        "{} frontend {} / backend {}",
        "Preview:".cyan(),
        urls.frontend,
        urls.backend
    );

    codexa_cli::run_server(config, controller, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn import_structure(
    config: &Config,
    project_id: &str,
    structure: PathBuf,
) -> anyhow::Result<()> {
    codexa_preview::validate_project_id(project_id)?;

    let raw = tokio::fs::read_to_string(&structure)
        .await
        .with_context(|| format!("Failed to read {}", structure.display()))?;
    let nodes: Vec<StructureNode> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid structure tree", structure.display()))?;

    let store = open_store(config).await?;
    let saved = store.save_structure(project_id, &nodes).await?;

    println!(
        "{} Imported {} files for project {}",
        "✅".green(),
        saved,
        project_id
    );
    Ok(())
}

/// Sweep the workspace recorded in the lock file and both fixed ports.
/// Works without a running server.
async fn stop_leftover_preview() -> anyhow::Result<()> {
    println!("{}", "Stopping leftover preview...".yellow().bold());

    let preview_config = PreviewConfig::from_env();
    let store = Arc::new(codexa_storage::InMemoryFileStore::new());
    let table = Arc::new(SystemProcessTable::new());

    let lock_path = preview_config.lock_path();
    let recovered: Option<SessionLock> = codexa_preview::lock::read_lock(&lock_path).await;

    let controller =
        PreviewController::new_with_recovery(preview_config.clone(), store, table).await;
    controller.stop_current_preview().await;

    match recovered {
        Some(lock) => println!(
            "{} Stopped preview for project {}",
            "✅".green(),
            lock.project_id
        ),
        None => println!(
            "{} No preview session was recorded; swept ports {} and {}",
            "✅".green(),
            preview_config.ports.frontend,
            preview_config.ports.backend
        ),
    }

    Ok(())
}
