//! Pipeline orchestration
//!
//! Drives the stage batches in order, generates every deliverable of a batch
//! concurrently through the shared queue, persists each artifact with its
//! validation outcome and finishes with the QA report.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::events::{DeliverableState, EventSender, PipelineEvent};
use super::{prompts, schedule};
use crate::catalog::{kind, DeliverableId};
use crate::config::{ForgeConfig, PipelineConfig};
use crate::model::{CallOptions, ModelClient, OfflineClient};
use crate::placeholders::{scan_placeholders, PlaceholderScan};
use crate::queue::GenerationQueue;
use crate::readiness::{compute_readiness_score_with, ReadinessInput, ReadinessResult};
use crate::repair::{self, RepairContext, RepairProgress};
use crate::store::{Artifact, ArtifactKey, ArtifactStore, ProjectStatus, ProjectStore, Transcript};
use crate::validate::{
    validate_full, DependencyArtifact, DependencyArtifacts, TargetConstraints, ValidationResult,
};
use crate::{ForgeError, Result};

/// What the pipeline does after a batch settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    /// Preflight found the input context insufficient; a hard stop
    Blocked { reason: String },
    Cancelled,
}

/// Terminal result for one deliverable in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableOutcome {
    pub deliverable: DeliverableId,
    pub validated: bool,
    pub attempts: u32,
    /// Short failure summary
    pub message: Option<String>,
    /// Plain-language detail for each remaining violation
    pub errors: Vec<String>,
}

impl DeliverableOutcome {
    fn success(deliverable: DeliverableId, attempts: u32) -> Self {
        Self {
            deliverable,
            validated: true,
            attempts,
            message: None,
            errors: Vec::new(),
        }
    }

    fn failure(deliverable: DeliverableId, attempts: u32, message: String, errors: Vec<String>) -> Self {
        Self {
            deliverable,
            validated: false,
            attempts,
            message: Some(message),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub project_id: String,
    pub run_id: String,
    pub status: ProjectStatus,
    pub deliverables: Vec<DeliverableOutcome>,
    /// Absent when the run stopped before the QA report
    pub readiness: Option<ReadinessResult>,
    pub blocked_reason: Option<String>,
}

impl RunOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &DeliverableOutcome> {
        self.deliverables.iter().filter(|d| !d.validated)
    }
}

/// Readiness inputs and result for the latest artifacts of a run
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub readiness: ReadinessResult,
    pub scan: PlaceholderScan,
    pub missing_context_count: usize,
}

pub struct Pipeline {
    artifacts: Arc<dyn ArtifactStore>,
    projects: Arc<dyn ProjectStore>,
    queue: GenerationQueue,
    config: PipelineConfig,
    options: CallOptions,
    events: EventSender,
}

impl Pipeline {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        projects: Arc<dyn ProjectStore>,
        queue: GenerationQueue,
        config: PipelineConfig,
        options: CallOptions,
    ) -> Self {
        Self {
            artifacts,
            projects,
            queue,
            config,
            options,
            events: EventSender::new(),
        }
    }

    /// Wire a pipeline from loaded configuration over one store
    pub fn from_config<S>(store: Arc<S>, client: Arc<dyn ModelClient>, config: &ForgeConfig) -> Self
    where
        S: ArtifactStore + ProjectStore + 'static,
    {
        Self::new(
            store.clone(),
            store,
            GenerationQueue::from_config(client, &config.pipeline),
            config.pipeline.clone(),
            CallOptions::from_config(&config.model),
        )
    }

    /// Pipeline for edits and readiness checks that never reach a model
    pub fn offline<S>(store: Arc<S>, config: &ForgeConfig) -> Self
    where
        S: ArtifactStore + ProjectStore + 'static,
    {
        Self::from_config(store, Arc::new(OfflineClient), config)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Cooperative cancellation: checked before each batch and propagated to
    /// queued and in-flight calls. A cancelled pipeline stays cancelled.
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    /// Produce every deliverable of a run
    pub async fn run(&self, project_id: &str, run_id: &str) -> Result<RunOutcome> {
        tracing::info!("[PIPELINE] Starting run {} for project {}", run_id, project_id);
        let transcript = self.preconditions(project_id).await?;
        let result = self
            .execute(project_id, run_id, &transcript, schedule::all_generated(), BTreeMap::new())
            .await;
        self.settle(project_id, result).await
    }

    /// Regenerate `target` (and, when cascading, everything downstream of it)
    /// using the run's persisted artifacts as context. The QA report is
    /// always recomputed.
    pub async fn regenerate(
        &self,
        project_id: &str,
        run_id: &str,
        target: DeliverableId,
        cascade: bool,
    ) -> Result<RunOutcome> {
        let transcript = self.preconditions(project_id).await?;
        let existing = self.artifacts.list_latest(project_id, run_id).await?;
        let targets = schedule::affected(target, cascade);
        tracing::info!(
            "[PIPELINE] Regenerating {} (cascade={}): {:?}",
            target,
            cascade,
            targets
        );
        let result = self
            .execute(project_id, run_id, &transcript, targets, existing)
            .await;
        self.settle(project_id, result).await
    }

    /// Replace a deliverable with operator-edited content. The content is
    /// canonicalized and re-validated; `generated_at` is kept and `edited_at` set.
    pub async fn apply_edit(
        &self,
        project_id: &str,
        run_id: &str,
        deliverable: DeliverableId,
        content: Value,
    ) -> Result<Artifact> {
        if !deliverable.is_generated() {
            return Err(ForgeError::NotEditable(deliverable));
        }
        self.projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| ForgeError::ProjectNotFound(project_id.to_string()))?;

        let latest = self.artifacts.list_latest(project_id, run_id).await?;
        let canonical = kind(deliverable).canonicalize(content);
        let validation = validate_full(
            deliverable,
            &canonical.value,
            &dependency_view(&latest, deliverable),
            &self.constraints(&latest),
        );

        let now = Utc::now();
        let artifact = Artifact {
            validated: validation.ok(),
            generated_at: latest.get(&deliverable).map_or(now, |a| a.generated_at),
            edited_at: Some(now),
            content: canonical.value,
            normalization_log: canonical.changes,
            validation_errors: validation.errors,
            warnings: validation.warnings,
            version: 0,
        };
        let key = ArtifactKey::new(project_id, run_id, deliverable);
        let written = self.artifacts.write_artifact(&key, artifact).await?;
        tracing::info!(
            "[PIPELINE] Applied edit to {} (version {}, validated={})",
            key,
            written.version,
            written.validated
        );

        self.finish(project_id, run_id, Vec::new()).await?;
        Ok(written)
    }

    /// Score the latest artifacts of a run without writing anything
    pub async fn readiness(&self, project_id: &str, run_id: &str) -> Result<Evaluation> {
        let latest = self.artifacts.list_latest(project_id, run_id).await?;
        Ok(evaluate(project_id, run_id, &latest, self.config.readiness_threshold))
    }

    async fn preconditions(&self, project_id: &str) -> Result<Transcript> {
        self.projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| ForgeError::ProjectNotFound(project_id.to_string()))?;

        let result = match self.projects.read_transcript(project_id).await? {
            None => Err(ForgeError::TranscriptUnavailable(project_id.to_string())),
            Some(transcript) => {
                let actual = transcript.build_transcript.trim().chars().count();
                let minimum = self.config.min_transcript_chars;
                if actual < minimum {
                    Err(ForgeError::TranscriptTooShort { actual, minimum })
                } else {
                    Ok(transcript)
                }
            }
        };
        if let Err(e) = &result {
            tracing::error!("[PIPELINE] Precondition failed for {}: {}", project_id, e);
            self.mark_failed(project_id).await;
        }
        result
    }

    /// Orchestration-level errors leave the project failed; cancellation does not
    async fn settle(&self, project_id: &str, result: Result<RunOutcome>) -> Result<RunOutcome> {
        if let Err(e) = &result {
            if !matches!(e, ForgeError::Cancelled) {
                tracing::error!("[PIPELINE] Run failed for {}: {}", project_id, e);
                self.mark_failed(project_id).await;
            }
        }
        result
    }

    async fn mark_failed(&self, project_id: &str) {
        if let Err(e) = self
            .projects
            .update_project_status(project_id, ProjectStatus::Failed)
            .await
        {
            tracing::error!("[PIPELINE] Could not mark {} failed: {}", project_id, e);
        }
    }

    async fn execute(
        &self,
        project_id: &str,
        run_id: &str,
        transcript: &Transcript,
        targets: BTreeSet<DeliverableId>,
        mut completed: BTreeMap<DeliverableId, Artifact>,
    ) -> Result<RunOutcome> {
        self.projects
            .update_project_status(project_id, ProjectStatus::Generating)
            .await?;
        self.events.send(PipelineEvent::RunStarted {
            project_id: project_id.to_string(),
            run_id: run_id.to_string(),
            deliverables: targets.iter().copied().collect(),
        });
        for id in &targets {
            self.events.state(*id, DeliverableState::Pending);
        }

        let mut outcomes = Vec::new();
        for (stage, batch) in schedule::batches(&targets) {
            if self.queue.is_cancelled() {
                return self.cancelled(project_id).await;
            }

            tracing::info!("[PIPELINE] Stage {}: {:?}", stage, batch);
            self.events.send(PipelineEvent::BatchStarted {
                stage,
                deliverables: batch.clone(),
            });

            let constraints = self.constraints(&completed);
            let results = join_all(batch.iter().map(|id| {
                let dependencies = dependency_view(&completed, *id);
                let constraints = constraints.clone();
                async move {
                    self.produce(project_id, run_id, *id, transcript, dependencies, constraints)
                        .await
                }
            }))
            .await;

            for (outcome, artifact) in results {
                if let Some(artifact) = artifact {
                    completed.insert(outcome.deliverable, artifact);
                }
                outcomes.push(outcome);
            }

            match self.stage_outcome(&batch, &completed) {
                StageOutcome::Continue => {}
                StageOutcome::Cancelled => return self.cancelled(project_id).await,
                StageOutcome::Blocked { reason } => {
                    tracing::warn!("[PIPELINE] Preflight blocked {}: {}", project_id, reason);
                    self.projects
                        .update_project_status(project_id, ProjectStatus::PreflightBlocked)
                        .await?;
                    self.events.send(PipelineEvent::RunFinished {
                        status: ProjectStatus::PreflightBlocked,
                    });
                    return Ok(RunOutcome {
                        project_id: project_id.to_string(),
                        run_id: run_id.to_string(),
                        status: ProjectStatus::PreflightBlocked,
                        deliverables: outcomes,
                        readiness: None,
                        blocked_reason: Some(reason),
                    });
                }
            }
        }

        self.finish(project_id, run_id, outcomes).await
    }

    fn stage_outcome(
        &self,
        batch: &[DeliverableId],
        completed: &BTreeMap<DeliverableId, Artifact>,
    ) -> StageOutcome {
        if self.queue.is_cancelled() {
            return StageOutcome::Cancelled;
        }
        if !batch.contains(&DeliverableId::Preflight) {
            return StageOutcome::Continue;
        }
        match completed.get(&DeliverableId::Preflight) {
            // A blocked verdict stops the run even when the rest of the preflight is invalid
            Some(preflight) if preflight.content["status"].as_str() == Some("blocked") => {
                let reason = preflight.content["blocking_reason"]
                    .as_str()
                    .or_else(|| preflight.content["summary"].as_str())
                    .unwrap_or("insufficient input context")
                    .to_string();
                StageOutcome::Blocked { reason }
            }
            _ => StageOutcome::Continue,
        }
    }

    async fn cancelled(&self, project_id: &str) -> Result<RunOutcome> {
        tracing::warn!("[PIPELINE] Run for {} cancelled; written artifacts are kept", project_id);
        self.events.send(PipelineEvent::RunCancelled);
        self.projects
            .update_project_status(project_id, ProjectStatus::Review)
            .await?;
        Err(ForgeError::Cancelled)
    }

    /// Target duration: configured override, else the brief's length
    fn constraints(&self, completed: &BTreeMap<DeliverableId, Artifact>) -> TargetConstraints {
        let from_brief = completed
            .get(&DeliverableId::WebinarBrief)
            .and_then(|brief| brief.content["duration_minutes"].as_u64())
            .and_then(|minutes| u32::try_from(minutes).ok());
        TargetConstraints {
            target_duration_minutes: self.config.target_duration_minutes.or(from_brief),
        }
    }

    /// Generate, repair and persist one deliverable. Never fails the batch:
    /// every error becomes this deliverable's recorded outcome.
    async fn produce(
        &self,
        project_id: &str,
        run_id: &str,
        deliverable: DeliverableId,
        transcript: &Transcript,
        dependencies: DependencyArtifacts,
        constraints: TargetConstraints,
    ) -> (DeliverableOutcome, Option<Artifact>) {
        let key = ArtifactKey::new(project_id, run_id, deliverable);
        self.events.state(deliverable, DeliverableState::Generating);

        let ctx = RepairContext {
            deliverable,
            system_prompt: prompts::system_prompt(deliverable),
            user_prompt: prompts::user_prompt(deliverable, transcript, &dependencies, &constraints),
            options: self.options.for_deliverable(deliverable),
            dependencies,
            constraints,
        };

        let events = self.events.clone();
        let on_progress = move |progress: RepairProgress| match progress {
            RepairProgress::Validating { attempt, budget } => {
                events.state(deliverable, DeliverableState::Validating { attempt, budget })
            }
            RepairProgress::Repairing { attempt, budget } => {
                events.state(deliverable, DeliverableState::Repairing { attempt, budget })
            }
            RepairProgress::Normalized { changes } => events.send(PipelineEvent::Normalized {
                deliverable,
                changes,
            }),
        };

        match repair::generate(&ctx, &self.queue, None, &on_progress).await {
            Ok(repaired) => {
                let attempts = repaired.attempts;
                let artifact =
                    Artifact::generated(repaired.content, repaired.validation, repaired.changes);
                match self.artifacts.write_artifact(&key, artifact).await {
                    Ok(written) => {
                        tracing::info!("[PIPELINE] {} complete (version {})", key, written.version);
                        self.events
                            .state(deliverable, DeliverableState::Complete { validated: true });
                        (DeliverableOutcome::success(deliverable, attempts), Some(written))
                    }
                    Err(e) => {
                        tracing::warn!("[PIPELINE] Could not persist {}: {}", key, e);
                        let message = format!("could not persist artifact: {}", e);
                        self.events.state(
                            deliverable,
                            DeliverableState::Error {
                                message: message.clone(),
                                errors: Vec::new(),
                            },
                        );
                        (
                            DeliverableOutcome::failure(deliverable, attempts, message, Vec::new()),
                            None,
                        )
                    }
                }
            }
            Err(err) => {
                tracing::warn!("[PIPELINE] {} failed: {}", key, err);

                // Keep the best invalid candidate so operators can edit it
                let mut written = None;
                if let Some(content) = err.last_candidate.clone() {
                    let validation = ValidationResult {
                        errors: err.errors.clone(),
                        warnings: Vec::new(),
                    };
                    match self
                        .artifacts
                        .write_artifact(&key, Artifact::generated(content, validation, Vec::new()))
                        .await
                    {
                        Ok(artifact) => written = Some(artifact),
                        Err(e) => tracing::warn!("[PIPELINE] Could not persist {}: {}", key, e),
                    }
                }

                let message = match &err.generation_error {
                    Some(e) => format!("generation failed: {}", e),
                    None => format!("still invalid after {} attempt(s)", err.attempts),
                };
                self.events.state(
                    deliverable,
                    DeliverableState::Error {
                        message: message.clone(),
                        errors: err.messages.clone(),
                    },
                );
                (
                    DeliverableOutcome::failure(deliverable, err.attempts, message, err.messages),
                    written,
                )
            }
        }
    }

    /// Write the QA report and settle the project status
    async fn finish(
        &self,
        project_id: &str,
        run_id: &str,
        deliverables: Vec<DeliverableOutcome>,
    ) -> Result<RunOutcome> {
        let latest = self.artifacts.list_latest(project_id, run_id).await?;
        let evaluation = evaluate(project_id, run_id, &latest, self.config.readiness_threshold);

        let report = qa_report(&evaluation, &latest);
        let validation = validate_full(
            DeliverableId::QaReport,
            &report,
            &DependencyArtifacts::new(),
            &TargetConstraints::default(),
        );
        if !validation.ok() {
            tracing::error!("[PIPELINE] QA report failed its contract: {:?}", validation.messages());
        }
        let key = ArtifactKey::new(project_id, run_id, DeliverableId::QaReport);
        self.artifacts
            .write_artifact(&key, Artifact::generated(report, validation, Vec::new()))
            .await?;

        // Failures in this run count even when an older validated version is latest
        let complete = schedule::all_generated()
            .iter()
            .all(|id| latest.get(id).map_or(false, |a| a.validated));
        let status = if complete && deliverables.iter().all(|d| d.validated) {
            ProjectStatus::Ready
        } else {
            ProjectStatus::Review
        };
        self.projects.update_project_status(project_id, status).await?;
        self.events.send(PipelineEvent::RunFinished { status });

        tracing::info!(
            "[PIPELINE] Run {} finished: status={}, score={}, pass={}",
            run_id,
            status,
            evaluation.readiness.score,
            evaluation.readiness.pass
        );

        Ok(RunOutcome {
            project_id: project_id.to_string(),
            run_id: run_id.to_string(),
            status,
            deliverables,
            readiness: Some(evaluation.readiness),
            blocked_reason: None,
        })
    }
}

/// Direct upstream artifacts of `deliverable`, as validation context
fn dependency_view(
    completed: &BTreeMap<DeliverableId, Artifact>,
    deliverable: DeliverableId,
) -> DependencyArtifacts {
    deliverable
        .dependencies()
        .iter()
        .filter_map(|id| {
            completed.get(id).map(|artifact| {
                (
                    *id,
                    DependencyArtifact {
                        content: artifact.content.clone(),
                        validated: artifact.validated,
                    },
                )
            })
        })
        .collect()
}

fn evaluate(
    project_id: &str,
    run_id: &str,
    latest: &BTreeMap<DeliverableId, Artifact>,
    threshold: u32,
) -> Evaluation {
    let validation_results = DeliverableId::CONTENT
        .iter()
        .filter_map(|id| latest.get(id).map(|artifact| (*id, artifact.validation())))
        .collect();

    let by_key: BTreeMap<String, Value> = latest
        .iter()
        .map(|(id, artifact)| {
            (
                ArtifactKey::new(project_id, run_id, *id).to_string(),
                artifact.content.clone(),
            )
        })
        .collect();
    let scan = scan_placeholders(&by_key);

    let missing_context_count = latest
        .get(&DeliverableId::Preflight)
        .and_then(|preflight| preflight.content["missing_context"].as_array())
        .map_or(0, Vec::len);

    let input = ReadinessInput::new(validation_results, &scan, missing_context_count);
    Evaluation {
        readiness: compute_readiness_score_with(&input, threshold),
        scan,
        missing_context_count,
    }
}

fn qa_report(evaluation: &Evaluation, latest: &BTreeMap<DeliverableId, Artifact>) -> Value {
    let critical_locations: Vec<Value> = evaluation
        .scan
        .critical()
        .map(|location| {
            json!({
                "artifact_id": location.artifact_id,
                "field_path": location.field_path,
                "matched_text": location.matched_text,
            })
        })
        .collect();

    let deliverables: Vec<Value> = DeliverableId::CONTENT
        .iter()
        .map(|id| {
            let artifact = latest.get(id);
            json!({
                "deliverable_id": id.as_str(),
                "present": artifact.is_some(),
                "validated": artifact.map_or(false, |a| a.validated),
            })
        })
        .collect();

    json!({
        "score": evaluation.readiness.score,
        "pass": evaluation.readiness.pass,
        "blocking_reasons": evaluation.readiness.reason_messages(),
        "missing_context_count": evaluation.missing_context_count,
        "placeholders": {
            "total_count": evaluation.scan.total_count,
            "critical_count": evaluation.scan.critical_count,
            "skipped_count": evaluation.scan.skipped_count,
        },
        "critical_locations": critical_locations,
        "deliverables": deliverables,
    })
}
