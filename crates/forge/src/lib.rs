//! # Forge - Webinar Deliverable Production Pipeline
//!
//! Produces the interdependent content artifacts of a webinar production run
//! (brief, framework, landing page, emails, social posts, run of show,
//! checklists, slide prompts) with a generative text model, and gates their
//! export behind contract validation, placeholder scanning and a readiness score.

pub mod canonicalize;
pub mod catalog;
pub mod config;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod placeholders;
pub mod queue;
pub mod readiness;
pub mod repair;
pub mod store;
pub mod validate;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod test_support;

pub use canonicalize::{canonicalize, Canonicalized, ChangeKind, NormalizationChange};
pub use catalog::{kind, DeliverableId, DeliverableKind, Phase};
pub use config::{ForgeConfig, ModelConfig, PipelineConfig, StorageConfig};
pub use model::{CallOptions, ModelClient, ModelError, OfflineClient, ProviderType};
pub use pipeline::{
    DeliverableOutcome, DeliverableState, Pipeline, PipelineEvent, RunOutcome, StageOutcome,
};
pub use placeholders::{scan_placeholders, PlaceholderLocation, PlaceholderScan};
pub use queue::GenerationQueue;
pub use readiness::{compute_readiness_score, BlockingReason, ReadinessInput, ReadinessResult};
pub use repair::{attempt_repair, RepairContext, RepairError};
pub use store::{
    Artifact, ArtifactKey, ArtifactStore, MemoryStore, Project, ProjectStatus, ProjectStore,
    SqliteStore, StoreError, Transcript,
};
pub use validate::{
    validate_crosslinks, validate_schema, DependencyArtifact, DependencyArtifacts, ErrorCode,
    ErrorKind, Severity, TargetConstraints, ValidationError, ValidationResult,
};

/// Main error types for Forge operations
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Transcript unavailable for project {0}")]
    TranscriptUnavailable(String),

    #[error("Build transcript too short: {actual} chars (minimum {minimum})")]
    TranscriptTooShort { actual: usize, minimum: usize },

    #[error("Unknown deliverable: {0}")]
    UnknownDeliverable(String),

    #[error("{0} is computed by the pipeline and cannot be edited")]
    NotEditable(DeliverableId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Repair failed: {0}")]
    Repair(#[from] RepairError),

    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ForgeError>;
