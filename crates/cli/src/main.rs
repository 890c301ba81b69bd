//! Forge CLI - webinar production runs from the terminal
//!
//! Imports transcripts, drives the deliverable pipeline, and inspects,
//! edits and scores the resulting artifacts.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use forge::DeliverableId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Forge - webinar deliverable production
#[derive(Parser)]
#[command(name = "forge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Produce, validate and score webinar deliverables from a build transcript")]
#[command(long_about = r#"
Forge turns a build transcript into the full set of webinar deliverables
(brief, framework, landing page, emails, social posts, run of show,
checklists, slide prompts) and gates export behind a readiness score.

Examples:
  forge import --project acme --name "Pricing Masterclass" --transcript build.txt
  forge run --project acme --run first-pass
  forge regenerate --project acme --run first-pass --deliverable landing_page --cascade
  forge status --project acme --run first-pass
"#)]
struct Cli {
    /// Configuration file (defaults to ./forge.toml when present)
    #[arg(short, long, env = "FORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the storage database URL
    #[arg(long, env = "FORGE_DATABASE_URL")]
    database: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project from transcript files
    Import {
        #[arg(short, long)]
        project: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Build transcript (required)
        #[arg(short, long)]
        transcript: PathBuf,

        /// Intake call transcript
        #[arg(long)]
        intake: Option<PathBuf>,

        /// Operator notes
        #[arg(long)]
        notes: Option<PathBuf>,
    },

    /// Generate every deliverable for a run
    Run {
        #[arg(short, long)]
        project: String,

        /// Run id (a new one is generated when omitted)
        #[arg(short, long)]
        run: Option<String>,
    },

    /// Regenerate one deliverable, optionally with everything downstream
    Regenerate {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        run: String,

        #[arg(short, long)]
        deliverable: DeliverableId,

        /// Also regenerate dependent deliverables
        #[arg(long)]
        cascade: bool,
    },

    /// Replace a deliverable with edited JSON content
    Edit {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        run: String,

        #[arg(short, long)]
        deliverable: DeliverableId,

        /// JSON file with the new content
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show project status, artifacts and readiness for a run
    Status {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        run: String,
    },

    /// Print a deliverable's content as JSON
    Show {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        run: String,

        #[arg(short, long)]
        deliverable: DeliverableId,

        /// Specific version (latest when omitted)
        #[arg(long)]
        version: Option<u32>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("forge={},forge_cli={},warn", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = forge::ForgeConfig::load_from(cli.config.as_deref())?;
    if let Some(url) = cli.database {
        config.storage.database_url = url;
    }

    match cli.command {
        Commands::Import {
            project,
            name,
            transcript,
            intake,
            notes,
        } => {
            commands::import(
                &config,
                &project,
                &name,
                &transcript,
                intake.as_deref(),
                notes.as_deref(),
            )
            .await?;
        }
        Commands::Run { project, run } => {
            let run = run.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            commands::run(&config, &project, &run).await?;
        }
        Commands::Regenerate {
            project,
            run,
            deliverable,
            cascade,
        } => {
            commands::regenerate(&config, &project, &run, deliverable, cascade).await?;
        }
        Commands::Edit {
            project,
            run,
            deliverable,
            file,
        } => {
            commands::edit(&config, &project, &run, deliverable, &file).await?;
        }
        Commands::Status { project, run } => {
            commands::status(&config, &project, &run).await?;
        }
        Commands::Show {
            project,
            run,
            deliverable,
            version,
        } => {
            commands::show(&config, &project, &run, deliverable, version).await?;
        }
        Commands::Config => {
            commands::show_config(&config)?;
        }
    }

    Ok(())
}
