//! CLI subcommand handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use forge::{
    model, ArtifactKey, ArtifactStore, DeliverableId, ForgeConfig, ForgeError, Pipeline, Project,
    ProjectStore, RunOutcome, SqliteStore, Transcript,
};
use tokio::sync::broadcast::error::RecvError;

use crate::output::OutputHandler;

async fn open_store(config: &ForgeConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(&config.storage.database_url)
        .await
        .with_context(|| format!("opening {}", config.storage.database_url))?;
    Ok(Arc::new(store))
}

async fn open_pipeline(config: &ForgeConfig) -> Result<Pipeline> {
    let store = open_store(config).await?;
    let client = model::create_client(&config.model)?;
    Ok(Pipeline::from_config(store, client, config))
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display())))
        .transpose()
}

pub async fn import(
    config: &ForgeConfig,
    project_id: &str,
    name: &str,
    transcript: &Path,
    intake: Option<&Path>,
    notes: Option<&Path>,
) -> Result<()> {
    let output = OutputHandler::new();
    let build_transcript = std::fs::read_to_string(transcript)
        .with_context(|| format!("reading {}", transcript.display()))?;
    let min = config.pipeline.min_transcript_chars;
    if build_transcript.trim().chars().count() < min {
        output.print_warning(&format!(
            "Build transcript is shorter than {} characters; runs will be refused",
            min
        ));
    }

    let store = open_store(config).await?;
    store
        .create_project(
            Project::new(project_id, name),
            Transcript {
                build_transcript,
                intake_transcript: read_optional(intake)?,
                operator_notes: read_optional(notes)?,
            },
        )
        .await?;
    output.print_success(&format!("Imported project {} ({})", project_id, name));
    Ok(())
}

/// Drive a pipeline future while streaming its events; Ctrl-C cancels
async fn drive<F>(pipeline: &Pipeline, work: F) -> Result<RunOutcome>
where
    F: std::future::Future<Output = forge::Result<RunOutcome>>,
{
    let output = OutputHandler::new();
    let mut events = pipeline.subscribe();
    tokio::pin!(work);

    let result = loop {
        tokio::select! {
            result = &mut work => break result,
            event = events.recv() => match event {
                Ok(event) => output.print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} progress events", skipped)
                }
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                output.print_warning("Cancelling; in-flight calls are abandoned");
                pipeline.cancel();
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        output.print_event(&event);
    }

    match result {
        Ok(outcome) => {
            output.print_outcome(&outcome);
            Ok(outcome)
        }
        Err(ForgeError::Cancelled) => bail!("run cancelled; artifacts written so far are kept"),
        Err(e) => Err(e.into()),
    }
}

pub async fn run(config: &ForgeConfig, project_id: &str, run_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    drive(&pipeline, pipeline.run(project_id, run_id)).await?;
    Ok(())
}

pub async fn regenerate(
    config: &ForgeConfig,
    project_id: &str,
    run_id: &str,
    deliverable: DeliverableId,
    cascade: bool,
) -> Result<()> {
    if !deliverable.is_generated() {
        return Err(ForgeError::NotEditable(deliverable).into());
    }
    let pipeline = open_pipeline(config).await?;
    drive(
        &pipeline,
        pipeline.regenerate(project_id, run_id, deliverable, cascade),
    )
    .await?;
    Ok(())
}

pub async fn edit(
    config: &ForgeConfig,
    project_id: &str,
    run_id: &str,
    deliverable: DeliverableId,
    file: &Path,
) -> Result<()> {
    let output = OutputHandler::new();
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let content: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;

    let pipeline = Pipeline::offline(open_store(config).await?, config);
    let artifact = pipeline
        .apply_edit(project_id, run_id, deliverable, content)
        .await?;

    if artifact.validated {
        output.print_success(&format!(
            "{} saved as version {}",
            deliverable.display_name(),
            artifact.version
        ));
    } else {
        output.print_warning(&format!(
            "{} saved as version {} with {} problem(s)",
            deliverable.display_name(),
            artifact.version,
            artifact.validation_errors.len()
        ));
        for error in &artifact.validation_errors {
            println!("      {}", forge::repair::plain_message(error).dimmed());
        }
    }
    output.print_evaluation(&pipeline.readiness(project_id, run_id).await?);
    Ok(())
}

pub async fn status(config: &ForgeConfig, project_id: &str, run_id: &str) -> Result<()> {
    let output = OutputHandler::new();
    let store = open_store(config).await?;
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| ForgeError::ProjectNotFound(project_id.to_string()))?;

    output.print_header(&format!("{} ({})", project.name, project.id));
    println!("  {} {}", "Status:".dimmed(), project.status);
    println!(
        "  {} {}",
        "Updated:".dimmed(),
        project.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    let latest = store.list_latest(project_id, run_id).await?;
    let rows: Vec<_> = DeliverableId::ALL
        .iter()
        .map(|id| (*id, latest.get(id)))
        .collect();
    output.print_artifacts(&rows);

    let pipeline = Pipeline::offline(store, config);
    output.print_evaluation(&pipeline.readiness(project_id, run_id).await?);
    Ok(())
}

pub async fn show(
    config: &ForgeConfig,
    project_id: &str,
    run_id: &str,
    deliverable: DeliverableId,
    version: Option<u32>,
) -> Result<()> {
    let store = open_store(config).await?;
    let key = ArtifactKey::new(project_id, run_id, deliverable);
    let artifact = match version {
        Some(v) => store.read_version(&key, v).await?,
        None => store.read_artifact(&key).await?,
    };
    let Some(artifact) = artifact else {
        bail!("no artifact stored for {}", key);
    };
    println!("{}", serde_json::to_string_pretty(&artifact.content)?);
    Ok(())
}

pub fn show_config(config: &ForgeConfig) -> Result<()> {
    let output = OutputHandler::new();
    output.print_header("Configuration");
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
