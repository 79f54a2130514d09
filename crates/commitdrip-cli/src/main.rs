//! commitdrip CLI.

use clap::{Parser, Subcommand};
use commitdrip_config::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod engine;
mod services;
mod shutdown;

use engine::Engine;

#[derive(Parser)]
#[command(name = "commitdrip")]
#[command(about = "Push planned commits to a remote repository over time", long_about = None)]
struct Cli {
    /// Path to the KDL configuration file
    #[arg(long, env = "COMMITDRIP_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resume interrupted jobs, then process the queue until stopped
    Worker,
    /// Accept a commit plan and source archive as a new job
    Submit {
        /// Commit plan as JSON
        plan: PathBuf,
        /// Source tree as .zip or .tar.gz
        archive: PathBuf,
        /// Do not check or create the remote repository
        #[arg(long)]
        skip_repo_check: bool,
    },
    /// Submit a job and execute it in this process
    Run {
        /// Commit plan as JSON
        plan: PathBuf,
        /// Source tree as .zip or .tar.gz
        archive: PathBuf,
        /// Do not check or create the remote repository
        #[arg(long)]
        skip_repo_check: bool,
    },
    /// Cancel a pending or running job
    Cancel {
        /// Job ID
        id: String,
    },
    /// Show a job and its commits
    Show {
        /// Job ID
        id: String,
    },
    /// List recent jobs, newest first
    List {
        /// Only jobs with this status
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of jobs to show
        #[arg(long, default_value = "100")]
        limit: i64,
    },
    /// Apply database migrations
    Migrate,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = EngineConfig::load(cli.config.as_deref())?;

    if let Commands::Migrate = cli.command {
        return commands::worker::migrate(&config).await;
    }

    let engine = Engine::connect(config).await?;

    match cli.command {
        Commands::Worker => commands::worker::run(&engine).await?,
        Commands::Submit {
            plan,
            archive,
            skip_repo_check,
        } => {
            commands::jobs::submit(&engine, &plan, &archive, skip_repo_check).await?;
        }
        Commands::Run {
            plan,
            archive,
            skip_repo_check,
        } => {
            commands::jobs::run(&engine, &plan, &archive, skip_repo_check).await?;
        }
        Commands::Cancel { id } => commands::jobs::cancel(&engine, &id).await?,
        Commands::Show { id } => commands::jobs::show(&engine, &id).await?,
        Commands::List { status, limit } => {
            commands::jobs::list(&engine, status.as_deref(), limit).await?;
        }
        Commands::Migrate => {}
    }

    Ok(())
}
