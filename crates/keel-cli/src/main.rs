//! keel - job lifecycle reconciler CLI
//!
//! - `keel plan <resource.json>`: 何が変わるかを表示（scheduler が落ちていても失敗しない）
//! - `keel apply <resource.json>`: create / update / replace を実行し state を保存
//! - `keel refresh <resource.json>`: remote を読み直し、drift を表示
//! - `keel destroy <resource.json>`: teardown して state を削除
//! - `keel demo <resource.json>`: in-memory scheduler 上で create → read → destroy

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod state_file;

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Reconcile scheduler jobs against declared jobspecs", long_about = None)]
#[command(version)]
struct Cli {
    /// Reconciler configuration file (JSON)
    #[arg(short, long, env = "KEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what apply would do
    Plan { resource: PathBuf },

    /// Create, update or replace the job
    Apply { resource: PathBuf },

    /// Re-read the job from the scheduler and report drift
    Refresh { resource: PathBuf },

    /// Deregister the job and forget it
    Destroy { resource: PathBuf },

    /// Run create, read and destroy against an in-memory scheduler
    Demo { resource: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { resource } => commands::plan(&config, &resource).await,
        Commands::Apply { resource } => commands::apply(&config, &resource).await,
        Commands::Refresh { resource } => commands::refresh(&config, &resource).await,
        Commands::Destroy { resource } => commands::destroy(&config, &resource).await,
        Commands::Demo { resource } => commands::demo(&resource).await,
    }
}
