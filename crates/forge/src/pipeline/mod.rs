//! Dependency-ordered production of a run's deliverables

pub mod engine;
pub mod events;
pub mod prompts;
pub mod schedule;

pub use engine::{DeliverableOutcome, Evaluation, Pipeline, RunOutcome, StageOutcome};
pub use events::{DeliverableState, EventSender, PipelineEvent};
