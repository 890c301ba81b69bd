//! Artifact and project persistence
//!
//! The pipeline talks to storage only through [`ArtifactStore`] and
//! [`ProjectStore`]. Artifacts are versioned: a write appends a new version
//! and earlier versions stay readable.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canonicalize::NormalizationChange;
use crate::catalog::DeliverableId;
use crate::validate::{ValidationError, ValidationResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),
    #[error("Project not found: {0}")]
    ProjectNotFound(String),
    #[error("Project already exists: {0}")]
    ProjectExists(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Identifies one deliverable slot within a run. Rendered as
/// `project:run:deliverable`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub project: String,
    pub run: String,
    pub deliverable: DeliverableId,
}

impl ArtifactKey {
    pub fn new(project: impl Into<String>, run: impl Into<String>, deliverable: DeliverableId) -> Self {
        Self {
            project: project.into(),
            run: run.into(),
            deliverable,
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.run, self.deliverable)
    }
}

impl std::str::FromStr for ArtifactKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split(':').map(str::trim).collect();
        let &[project, run, deliverable] = segments.as_slice() else {
            return Err(StoreError::InvalidKey(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        };
        for segment in [project, run, deliverable] {
            if segment.is_empty()
                || segment.eq_ignore_ascii_case("undefined")
                || segment.eq_ignore_ascii_case("null")
            {
                return Err(StoreError::InvalidKey(format!("bad segment {:?}", segment)));
            }
        }
        let deliverable = deliverable
            .parse()
            .map_err(|e: crate::ForgeError| StoreError::InvalidKey(e.to_string()))?;
        Ok(ArtifactKey::new(project, run, deliverable))
    }
}

/// A persisted deliverable instance with its validation and audit metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub content: Value,
    /// True iff content passed schema and crosslink validation when written
    pub validated: bool,
    pub generated_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub normalization_log: Vec<NormalizationChange>,
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
    #[serde(default)]
    pub warnings: Vec<ValidationError>,
    /// Assigned by the store on write
    #[serde(default)]
    pub version: u32,
}

impl Artifact {
    pub fn generated(
        content: Value,
        validation: ValidationResult,
        normalization_log: Vec<NormalizationChange>,
    ) -> Self {
        Self {
            content,
            validated: validation.ok(),
            generated_at: Utc::now(),
            edited_at: None,
            normalization_log,
            validation_errors: validation.errors,
            warnings: validation.warnings,
            version: 0,
        }
    }

    /// The validation outcome recorded at write time
    pub fn validation(&self) -> ValidationResult {
        ValidationResult {
            errors: self.validation_errors.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    PreflightBlocked,
    Generating,
    Review,
    Ready,
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Draft => write!(f, "draft"),
            ProjectStatus::PreflightBlocked => write!(f, "preflight_blocked"),
            ProjectStatus::Generating => write!(f, "generating"),
            ProjectStatus::Review => write!(f, "review"),
            ProjectStatus::Ready => write!(f, "ready"),
            ProjectStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "preflight_blocked" => Ok(ProjectStatus::PreflightBlocked),
            "generating" => Ok(ProjectStatus::Generating),
            "review" => Ok(ProjectStatus::Review),
            "ready" => Ok(ProjectStatus::Ready),
            "failed" => Ok(ProjectStatus::Failed),
            other => Err(StoreError::Corrupt(format!("unknown project status {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Source material for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub build_transcript: String,
    pub intake_transcript: Option<String>,
    pub operator_notes: Option<String>,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Latest version, if any
    async fn read_artifact(&self, key: &ArtifactKey) -> Result<Option<Artifact>, StoreError>;

    /// Append a new version atomically; returns the artifact with its version set
    async fn write_artifact(&self, key: &ArtifactKey, artifact: Artifact) -> Result<Artifact, StoreError>;

    async fn read_version(&self, key: &ArtifactKey, version: u32) -> Result<Option<Artifact>, StoreError>;

    /// Latest version of every deliverable written in a run
    async fn list_latest(
        &self,
        project: &str,
        run: &str,
    ) -> Result<BTreeMap<DeliverableId, Artifact>, StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, project: Project, transcript: Transcript) -> Result<(), StoreError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    async fn update_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<(), StoreError>;

    async fn read_transcript(&self, project_id: &str) -> Result<Option<Transcript>, StoreError>;
}
