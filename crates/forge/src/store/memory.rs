//! In-process store backed by `RwLock`ed maps

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    Artifact, ArtifactKey, ArtifactStore, Project, ProjectStatus, ProjectStore, StoreError,
    Transcript,
};
use crate::catalog::DeliverableId;

#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Every version of every artifact, oldest first
    artifacts: RwLock<HashMap<ArtifactKey, Vec<Artifact>>>,
    projects: RwLock<HashMap<String, (Project, Transcript)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions for a key
    pub async fn version_count(&self, key: &ArtifactKey) -> usize {
        let artifacts = self.artifacts.read().await;
        artifacts.get(key).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn read_artifact(&self, key: &ArtifactKey) -> Result<Option<Artifact>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(key).and_then(|versions| versions.last()).cloned())
    }

    async fn write_artifact(
        &self,
        key: &ArtifactKey,
        mut artifact: Artifact,
    ) -> Result<Artifact, StoreError> {
        let mut artifacts = self.artifacts.write().await;
        let versions = artifacts.entry(key.clone()).or_default();
        artifact.version = versions.len() as u32 + 1;
        versions.push(artifact.clone());
        Ok(artifact)
    }

    async fn read_version(
        &self,
        key: &ArtifactKey,
        version: u32,
    ) -> Result<Option<Artifact>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts
            .get(key)
            .and_then(|versions| versions.iter().find(|a| a.version == version))
            .cloned())
    }

    async fn list_latest(
        &self,
        project: &str,
        run: &str,
    ) -> Result<BTreeMap<DeliverableId, Artifact>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts
            .iter()
            .filter(|(key, _)| key.project == project && key.run == run)
            .filter_map(|(key, versions)| versions.last().map(|a| (key.deliverable, a.clone())))
            .collect())
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(
        &self,
        project: Project,
        transcript: Transcript,
    ) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.id) {
            return Err(StoreError::ProjectExists(project.id));
        }
        projects.insert(project.id.clone(), (project, transcript));
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let projects = self.projects.read().await;
        Ok(projects.get(project_id).map(|(p, _)| p.clone()))
    }

    async fn update_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let (project, _) = projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?;
        project.status = status;
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn read_transcript(&self, project_id: &str) -> Result<Option<Transcript>, StoreError> {
        let projects = self.projects.read().await;
        Ok(projects.get(project_id).map(|(_, t)| t.clone()))
    }
}
