//! Progress events for UI surfaces and the CLI

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::canonicalize::NormalizationChange;
use crate::catalog::DeliverableId;
use crate::store::ProjectStatus;

/// Observable per-deliverable state during a run:
/// `pending -> generating -> (validating <-> repairing)* -> complete | error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliverableState {
    Pending,
    Generating,
    Validating { attempt: u32, budget: u32 },
    Repairing { attempt: u32, budget: u32 },
    Complete { validated: bool },
    Error { message: String, errors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        project_id: String,
        run_id: String,
        deliverables: Vec<DeliverableId>,
    },
    BatchStarted {
        stage: u32,
        deliverables: Vec<DeliverableId>,
    },
    DeliverableState {
        deliverable: DeliverableId,
        state: DeliverableState,
    },
    Normalized {
        deliverable: DeliverableId,
        changes: Vec<NormalizationChange>,
    },
    RunFinished {
        status: ProjectStatus,
    },
    RunCancelled,
}

/// Broadcasts pipeline events to every subscriber
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self { sender }
    }

    pub fn send(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn state(&self, deliverable: DeliverableId, state: DeliverableState) {
        self.send(PipelineEvent::DeliverableState { deliverable, state });
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}
