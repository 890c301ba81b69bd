use std::sync::Arc;

use serde_json::json;

use crate::catalog::DeliverableId;
use crate::model::ModelError;
use crate::pipeline::{DeliverableState, PipelineEvent};
use crate::store::{ArtifactKey, ArtifactStore, MemoryStore, Project, ProjectStatus, ProjectStore, Transcript};
use crate::test_support::{fixtures, pipeline, seeded_store, ScriptedModel, PROJECT, RUN};
use crate::ForgeError;

async fn status(store: &MemoryStore) -> ProjectStatus {
    store.get_project(PROJECT).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_full_run_is_ready() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());

    let outcome = pipeline.run(PROJECT, RUN).await.unwrap();

    assert_eq!(outcome.status, ProjectStatus::Ready);
    assert_eq!(outcome.deliverables.len(), 9);
    assert_eq!(outcome.failures().count(), 0);
    let readiness = outcome.readiness.unwrap();
    assert!(readiness.pass, "{:?}", readiness.blocking_reasons);
    assert_eq!(readiness.score, 100);

    for id in DeliverableId::ALL.iter().filter(|id| id.is_generated()) {
        assert_eq!(model.calls(*id), 1, "{}", id);
    }
    assert_eq!(model.total_calls(), 9);

    let latest = store.list_latest(PROJECT, RUN).await.unwrap();
    assert_eq!(latest.len(), 10);
    assert!(latest.values().all(|a| a.validated));
    assert_eq!(latest[&DeliverableId::QaReport].content["pass"], json!(true));
    assert_eq!(status(&store).await, ProjectStatus::Ready);
}

#[tokio::test]
async fn test_run_emits_lifecycle_events() {
    let store = seeded_store().await;
    let pipeline = pipeline(store, Arc::new(ScriptedModel::new()));
    let mut rx = pipeline.subscribe();

    pipeline.run(PROJECT, RUN).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::RunFinished {
            status: ProjectStatus::Ready
        })
    );
    let stages: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::BatchStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, vec![1, 2, 3, 4, 5]);
    assert!(events.contains(&PipelineEvent::DeliverableState {
        deliverable: DeliverableId::SlidePrompts,
        state: DeliverableState::Complete { validated: true },
    }));
}

#[tokio::test]
async fn test_blocked_preflight_stops_the_run() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    model.always(DeliverableId::Preflight, fixtures::blocked_preflight().to_string());
    let pipeline = pipeline(store.clone(), model.clone());

    let outcome = pipeline.run(PROJECT, RUN).await.unwrap();

    assert_eq!(outcome.status, ProjectStatus::PreflightBlocked);
    assert_eq!(
        outcome.blocked_reason.as_deref(),
        Some("No teaching content in the transcript")
    );
    assert!(outcome.readiness.is_none());
    assert_eq!(model.calls(DeliverableId::Preflight), 1);
    assert_eq!(model.total_calls(), 1);
    assert_eq!(status(&store).await, ProjectStatus::PreflightBlocked);
}

#[tokio::test]
async fn test_short_transcript_fails_the_project() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_project(
            Project::new(PROJECT, "Pricing Masterclass"),
            Transcript {
                build_transcript: "Too short to plan a webinar from.".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());

    let err = pipeline.run(PROJECT, RUN).await.unwrap_err();

    assert!(matches!(err, ForgeError::TranscriptTooShort { minimum: 400, .. }));
    assert_eq!(model.total_calls(), 0);
    assert_eq!(status(&store).await, ProjectStatus::Failed);
}

#[tokio::test]
async fn test_unknown_project() {
    let pipeline = pipeline(Arc::new(MemoryStore::new()), Arc::new(ScriptedModel::new()));
    let err = pipeline.run("nope", RUN).await.unwrap_err();
    assert!(matches!(err, ForgeError::ProjectNotFound(id) if id == "nope"));
}

#[tokio::test]
async fn test_invalid_deliverable_leaves_siblings_alone() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    model.always(DeliverableId::SocialPosts, r#"{"promo_posts": []}"#);
    let pipeline = pipeline(store.clone(), model.clone());

    let outcome = pipeline.run(PROJECT, RUN).await.unwrap();

    assert_eq!(outcome.status, ProjectStatus::Review);
    let failures: Vec<_> = outcome.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].deliverable, DeliverableId::SocialPosts);
    assert_eq!(failures[0].attempts, 3);
    assert!(!failures[0].errors.is_empty());
    assert_eq!(model.calls(DeliverableId::SocialPosts), 3);
    assert_eq!(model.calls(DeliverableId::LandingPage), 1);

    // The last candidate is kept for operator editing
    let latest = store.list_latest(PROJECT, RUN).await.unwrap();
    let social = &latest[&DeliverableId::SocialPosts];
    assert!(!social.validated);
    assert!(!social.validation_errors.is_empty());
    assert!(latest[&DeliverableId::Checklists].validated);

    let readiness = outcome.readiness.unwrap();
    assert!(!readiness.pass);
    assert_eq!(status(&store).await, ProjectStatus::Review);
}

#[tokio::test]
async fn test_repaired_deliverable_counts_attempts() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let mut short = fixtures::valid(DeliverableId::Framework);
    short["blocks"].as_array_mut().unwrap().pop();
    model.script(DeliverableId::Framework, vec![Ok(short.to_string())]);
    let pipeline = pipeline(store, model.clone());

    let outcome = pipeline.run(PROJECT, RUN).await.unwrap();

    let framework = outcome
        .deliverables
        .iter()
        .find(|d| d.deliverable == DeliverableId::Framework)
        .unwrap();
    assert!(framework.validated);
    assert_eq!(framework.attempts, 2);
    assert_eq!(model.calls(DeliverableId::Framework), 2);
    assert_eq!(outcome.status, ProjectStatus::Ready);
}

#[tokio::test]
async fn test_regenerate_without_cascade_touches_only_target() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());
    pipeline.run(PROJECT, RUN).await.unwrap();
    let before = store.list_latest(PROJECT, RUN).await.unwrap();

    let outcome = pipeline
        .regenerate(PROJECT, RUN, DeliverableId::LandingPage, false)
        .await
        .unwrap();

    assert_eq!(outcome.status, ProjectStatus::Ready);
    assert_eq!(outcome.deliverables.len(), 1);
    assert_eq!(model.calls(DeliverableId::LandingPage), 2);
    assert_eq!(model.calls(DeliverableId::SlidePrompts), 1);

    let after = store.list_latest(PROJECT, RUN).await.unwrap();
    for (id, artifact) in &after {
        let expected = match id {
            DeliverableId::LandingPage | DeliverableId::QaReport => 2,
            _ => 1,
        };
        assert_eq!(artifact.version, expected, "{}", id);
        if expected == 1 {
            assert_eq!(artifact.generated_at, before[id].generated_at);
        }
    }
}

#[tokio::test]
async fn test_regenerate_with_cascade_includes_dependents() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());
    pipeline.run(PROJECT, RUN).await.unwrap();

    pipeline
        .regenerate(PROJECT, RUN, DeliverableId::EmailSequence, true)
        .await
        .unwrap();

    assert_eq!(model.calls(DeliverableId::EmailSequence), 2);
    assert_eq!(model.calls(DeliverableId::Checklists), 2);
    assert_eq!(model.calls(DeliverableId::SocialPosts), 1);
    let checklists = ArtifactKey::new(PROJECT, RUN, DeliverableId::Checklists);
    assert_eq!(store.version_count(&checklists).await, 2);
}

#[tokio::test]
async fn test_apply_edit_keeps_generated_at() {
    let store = seeded_store().await;
    let pipeline = pipeline(store.clone(), Arc::new(ScriptedModel::new()));
    pipeline.run(PROJECT, RUN).await.unwrap();
    let key = ArtifactKey::new(PROJECT, RUN, DeliverableId::LandingPage);
    let original = store.read_artifact(&key).await.unwrap().unwrap();

    let mut content = fixtures::valid(DeliverableId::LandingPage);
    content["headline"] = json!("Charge What You Are Worth");
    let edited = pipeline
        .apply_edit(PROJECT, RUN, DeliverableId::LandingPage, content)
        .await
        .unwrap();

    assert_eq!(edited.version, 2);
    assert!(edited.validated);
    assert!(edited.edited_at.is_some());
    assert_eq!(edited.generated_at, original.generated_at);
    assert_eq!(edited.content["headline"], "Charge What You Are Worth");
    assert_eq!(status(&store).await, ProjectStatus::Ready);
}

#[tokio::test]
async fn test_edit_introducing_placeholder_fails_readiness() {
    let store = seeded_store().await;
    let pipeline = pipeline(store.clone(), Arc::new(ScriptedModel::new()));
    pipeline.run(PROJECT, RUN).await.unwrap();

    let mut content = fixtures::valid(DeliverableId::LandingPage);
    content["link_placeholder"] = json!("{{REGISTRATION_LINK}}");
    pipeline
        .apply_edit(PROJECT, RUN, DeliverableId::LandingPage, content)
        .await
        .unwrap();

    let evaluation = pipeline.readiness(PROJECT, RUN).await.unwrap();
    assert!(!evaluation.readiness.pass);
    assert_eq!(evaluation.scan.critical_count, 1);

    let qa = ArtifactKey::new(PROJECT, RUN, DeliverableId::QaReport);
    let report = store.read_artifact(&qa).await.unwrap().unwrap();
    assert_eq!(report.content["pass"], json!(false));
    assert_eq!(report.content["placeholders"]["critical_count"], json!(1));
}

#[tokio::test]
async fn test_qa_report_is_not_editable() {
    let store = seeded_store().await;
    let pipeline = pipeline(store, Arc::new(ScriptedModel::new()));
    let err = pipeline
        .apply_edit(PROJECT, RUN, DeliverableId::QaReport, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::NotEditable(DeliverableId::QaReport)));
}

#[tokio::test]
async fn test_cancelled_pipeline_makes_no_calls() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());
    pipeline.cancel();

    let err = pipeline.run(PROJECT, RUN).await.unwrap_err();

    assert!(matches!(err, ForgeError::Cancelled));
    assert_eq!(model.total_calls(), 0);
    assert_eq!(status(&store).await, ProjectStatus::Review);
}

#[tokio::test]
async fn test_offline_pipeline_edits_without_a_model() {
    let store = seeded_store().await;
    pipeline(store.clone(), Arc::new(ScriptedModel::new()))
        .run(PROJECT, RUN)
        .await
        .unwrap();

    let offline = crate::pipeline::Pipeline::offline(store.clone(), &crate::ForgeConfig::default());
    let mut content = fixtures::valid(DeliverableId::EmailSequence);
    content["emails"][0]["send_offset_days"] = json!(-1);
    let edited = offline
        .apply_edit(PROJECT, RUN, DeliverableId::EmailSequence, content)
        .await
        .unwrap();

    // E01 now sends after E02
    assert!(!edited.validated);
    assert_eq!(status(&store).await, ProjectStatus::Review);

    let outcome = offline.run(PROJECT, "run-2").await.unwrap();
    assert_eq!(outcome.failures().count(), 9);
    assert!(outcome
        .failures()
        .all(|f| f.message.as_deref().map_or(false, |m| m.starts_with("generation failed"))));
}

fn transport_failures(n: usize) -> Vec<Result<String, ModelError>> {
    (0..n)
        .map(|_| Err(ModelError::RequestFailed("connection reset".to_string())))
        .collect()
}

#[tokio::test]
async fn test_failed_regenerate_leaves_project_in_review() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());
    pipeline.run(PROJECT, RUN).await.unwrap();
    model.script(DeliverableId::LandingPage, transport_failures(2));

    let outcome = pipeline
        .regenerate(PROJECT, RUN, DeliverableId::LandingPage, false)
        .await
        .unwrap();

    assert_eq!(outcome.status, ProjectStatus::Review);
    let failures: Vec<_> = outcome.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].deliverable, DeliverableId::LandingPage);
    assert_eq!(model.calls(DeliverableId::LandingPage), 3);

    // Nothing new was written; the earlier validated version is still latest
    let key = ArtifactKey::new(PROJECT, RUN, DeliverableId::LandingPage);
    let latest = store.read_artifact(&key).await.unwrap().unwrap();
    assert_eq!(latest.version, 1);
    assert!(latest.validated);
    assert_eq!(status(&store).await, ProjectStatus::Review);
}

#[tokio::test]
async fn test_transport_failure_mid_batch_spares_siblings() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    model.script(DeliverableId::EmailSequence, transport_failures(3));
    let pipeline = pipeline(store.clone(), model.clone());

    let outcome = pipeline.run(PROJECT, RUN).await.unwrap();

    assert_eq!(outcome.status, ProjectStatus::Review);
    let email = outcome
        .deliverables
        .iter()
        .find(|d| d.deliverable == DeliverableId::EmailSequence)
        .unwrap();
    assert!(!email.validated);
    assert_eq!(email.attempts, 3);
    assert!(email
        .message
        .as_deref()
        .map_or(false, |m| m.starts_with("generation failed")));
    assert_eq!(model.calls(DeliverableId::EmailSequence), 3);

    let latest = store.list_latest(PROJECT, RUN).await.unwrap();
    assert!(!latest.contains_key(&DeliverableId::EmailSequence));
    for id in [
        DeliverableId::LandingPage,
        DeliverableId::SocialPosts,
        DeliverableId::RunOfShow,
        DeliverableId::SlidePrompts,
    ] {
        assert!(latest[&id].validated, "{}", id);
        assert_eq!(model.calls(id), 1, "{}", id);
    }
    assert!(latest.contains_key(&DeliverableId::QaReport));
    assert!(!outcome.readiness.unwrap().pass);
}

#[tokio::test]
async fn test_regenerated_preflight_can_block() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let pipeline = pipeline(store.clone(), model.clone());
    pipeline.run(PROJECT, RUN).await.unwrap();
    model.always(DeliverableId::Preflight, fixtures::blocked_preflight().to_string());

    let outcome = pipeline
        .regenerate(PROJECT, RUN, DeliverableId::Preflight, true)
        .await
        .unwrap();

    assert_eq!(outcome.status, ProjectStatus::PreflightBlocked);
    assert_eq!(
        outcome.blocked_reason.as_deref(),
        Some("No teaching content in the transcript")
    );
    assert_eq!(model.calls(DeliverableId::Preflight), 2);
    assert_eq!(model.calls(DeliverableId::WebinarBrief), 1);
    assert_eq!(status(&store).await, ProjectStatus::PreflightBlocked);
}

#[tokio::test]
async fn test_invalid_blocked_preflight_still_stops_the_run() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new());
    let mut blocked = fixtures::blocked_preflight();
    blocked.as_object_mut().unwrap().remove("summary");
    model.always(DeliverableId::Preflight, blocked.to_string());
    let pipeline = pipeline(store.clone(), model.clone());

    let outcome = pipeline.run(PROJECT, RUN).await.unwrap();

    assert_eq!(outcome.status, ProjectStatus::PreflightBlocked);
    assert_eq!(model.calls(DeliverableId::Preflight), 2);
    assert_eq!(model.calls(DeliverableId::WebinarBrief), 0);
    let key = ArtifactKey::new(PROJECT, RUN, DeliverableId::Preflight);
    assert!(!store.read_artifact(&key).await.unwrap().unwrap().validated);
}
