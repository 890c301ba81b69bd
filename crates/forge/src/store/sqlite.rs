//! SQLite-backed store
//!
//! One row per artifact version. The schema is created on connect.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{
    Artifact, ArtifactKey, ArtifactStore, Project, ProjectStatus, ProjectStore, StoreError,
    Transcript,
};
use crate::catalog::DeliverableId;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id                TEXT PRIMARY KEY,
        name              TEXT NOT NULL,
        status            TEXT NOT NULL,
        build_transcript  TEXT NOT NULL,
        intake_transcript TEXT,
        operator_notes    TEXT,
        created_at        TEXT NOT NULL,
        updated_at        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS artifacts (
        project_id        TEXT NOT NULL,
        run_id            TEXT NOT NULL,
        deliverable       TEXT NOT NULL,
        version           INTEGER NOT NULL,
        content           TEXT NOT NULL,
        validated         INTEGER NOT NULL,
        generated_at      TEXT NOT NULL,
        edited_at         TEXT,
        normalization_log TEXT NOT NULL,
        validation_errors TEXT NOT NULL,
        warnings          TEXT NOT NULL,
        PRIMARY KEY (project_id, run_id, deliverable, version)
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect (creating the database file if needed) and bootstrap the schema
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        // An in-memory database lives and dies with its single connection
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(10));
        if !in_memory {
            // Batch members persist concurrently over the pool
            options = options.journal_mode(SqliteJournalMode::Wal);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.bootstrap().await?;
        tracing::info!("[STORE] SQLite store ready at {}", database_url);
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn artifact_from_row(row: &SqliteRow) -> Result<Artifact, StoreError> {
    let content: String = row.try_get("content")?;
    let log: String = row.try_get("normalization_log")?;
    let errors: String = row.try_get("validation_errors")?;
    let warnings: String = row.try_get("warnings")?;
    let version: i64 = row.try_get("version")?;

    Ok(Artifact {
        content: serde_json::from_str(&content)?,
        validated: row.try_get("validated")?,
        generated_at: row.try_get::<DateTime<Utc>, _>("generated_at")?,
        edited_at: row.try_get::<Option<DateTime<Utc>>, _>("edited_at")?,
        normalization_log: serde_json::from_str(&log)?,
        validation_errors: serde_json::from_str(&errors)?,
        warnings: serde_json::from_str(&warnings)?,
        version: u32::try_from(version)
            .map_err(|_| StoreError::Corrupt(format!("artifact version {}", version)))?,
    })
}

fn deliverable_from_row(row: &SqliteRow) -> Result<DeliverableId, StoreError> {
    let raw: String = row.try_get("deliverable")?;
    raw.parse()
        .map_err(|e: crate::ForgeError| StoreError::Corrupt(e.to_string()))
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn read_artifact(&self, key: &ArtifactKey) -> Result<Option<Artifact>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM artifacts
            WHERE project_id = $1 AND run_id = $2 AND deliverable = $3
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(&key.project)
        .bind(&key.run)
        .bind(key.deliverable.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn write_artifact(
        &self,
        key: &ArtifactKey,
        mut artifact: Artifact,
    ) -> Result<Artifact, StoreError> {
        // Version assignment and insert must stay one statement
        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO artifacts (
                project_id, run_id, deliverable, version, content, validated,
                generated_at, edited_at, normalization_log, validation_errors, warnings
            )
            SELECT $1, $2, $3, COALESCE(MAX(version), 0) + 1, $4, $5, $6, $7, $8, $9, $10
            FROM artifacts
            WHERE project_id = $1 AND run_id = $2 AND deliverable = $3
            RETURNING version
            "#,
        )
        .bind(&key.project)
        .bind(&key.run)
        .bind(key.deliverable.as_str())
        .bind(serde_json::to_string(&artifact.content)?)
        .bind(artifact.validated)
        .bind(artifact.generated_at)
        .bind(artifact.edited_at)
        .bind(serde_json::to_string(&artifact.normalization_log)?)
        .bind(serde_json::to_string(&artifact.validation_errors)?)
        .bind(serde_json::to_string(&artifact.warnings)?)
        .fetch_one(&self.pool)
        .await?;

        artifact.version = u32::try_from(version)
            .map_err(|_| StoreError::Corrupt(format!("artifact version {}", version)))?;
        tracing::debug!("[STORE] Wrote {} v{}", key, artifact.version);
        Ok(artifact)
    }

    async fn read_version(
        &self,
        key: &ArtifactKey,
        version: u32,
    ) -> Result<Option<Artifact>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM artifacts
            WHERE project_id = $1 AND run_id = $2 AND deliverable = $3 AND version = $4
            "#,
        )
        .bind(&key.project)
        .bind(&key.run)
        .bind(key.deliverable.as_str())
        .bind(version as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn list_latest(
        &self,
        project: &str,
        run: &str,
    ) -> Result<BTreeMap<DeliverableId, Artifact>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.* FROM artifacts a
            JOIN (
                SELECT deliverable, MAX(version) AS latest FROM artifacts
                WHERE project_id = $1 AND run_id = $2
                GROUP BY deliverable
            ) m ON a.deliverable = m.deliverable AND a.version = m.latest
            WHERE a.project_id = $1 AND a.run_id = $2
            "#,
        )
        .bind(project)
        .bind(run)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<_, StoreError> {
                Ok((deliverable_from_row(row)?, artifact_from_row(row)?))
            })
            .collect()
    }
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn create_project(
        &self,
        project: Project,
        transcript: Transcript,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO projects (
                id, name, status, build_transcript, intake_transcript, operator_notes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(project.status.to_string())
        .bind(&transcript.build_transcript)
        .bind(&transcript.intake_transcript)
        .bind(&transcript.operator_notes)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProjectExists(project.id));
        }
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, status, created_at, updated_at FROM projects WHERE id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn update_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE projects SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }
        Ok(())
    }

    async fn read_transcript(&self, project_id: &str) -> Result<Option<Transcript>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT build_transcript, intake_transcript, operator_notes
            FROM projects WHERE id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Transcript, StoreError> {
            Ok(Transcript {
                build_transcript: row.try_get("build_transcript")?,
                intake_transcript: row.try_get("intake_transcript")?,
                operator_notes: row.try_get("operator_notes")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalize::{ChangeKind, NormalizationChange};
    use crate::validate::ValidationResult;
    use serde_json::json;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("forge.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();

        let writes = (0..12).map(|n| {
            let store = store.clone();
            let deliverable = if n % 2 == 0 {
                DeliverableId::Framework
            } else {
                DeliverableId::LandingPage
            };
            async move {
                store
                    .write_artifact(
                        &ArtifactKey::new("acme", "run-1", deliverable),
                        Artifact::generated(json!({"n": n}), ValidationResult::default(), vec![]),
                    )
                    .await
            }
        });
        let results = futures::future::join_all(writes).await;

        let mut framework_versions = Vec::new();
        for (n, result) in results.into_iter().enumerate() {
            let artifact = result.unwrap();
            if n % 2 == 0 {
                framework_versions.push(artifact.version);
            }
        }
        framework_versions.sort_unstable();
        assert_eq!(framework_versions, (1..=6).collect::<Vec<u32>>());

        let latest = store.list_latest("acme", "run-1").await.unwrap();
        assert_eq!(latest[&DeliverableId::Framework].version, 6);
        assert_eq!(latest[&DeliverableId::LandingPage].version, 6);
    }

    #[tokio::test]
    async fn test_artifact_versions_round_trip() {
        let store = store().await;
        let key = ArtifactKey::new("acme", "run-1", DeliverableId::Framework);
        let change = NormalizationChange {
            kind: ChangeKind::IdPadding,
            path: "blocks[0].block_id".to_string(),
            before: json!("B1"),
            after: json!("B01"),
        };

        let first = store
            .write_artifact(
                &key,
                Artifact::generated(json!({"title": "one"}), ValidationResult::default(), vec![change.clone()]),
            )
            .await
            .unwrap();
        let mut edited = first.clone();
        edited.content = json!({"title": "two"});
        edited.edited_at = Some(Utc::now());
        let second = store.write_artifact(&key, edited).await.unwrap();

        assert_eq!((first.version, second.version), (1, 2));

        let latest = store.read_artifact(&key).await.unwrap().unwrap();
        assert_eq!(latest.content, json!({"title": "two"}));
        assert!(latest.edited_at.is_some());
        assert_eq!(latest.normalization_log, vec![change]);
        assert!(latest.validated);

        let original = store.read_version(&key, 1).await.unwrap().unwrap();
        assert_eq!(original.content, json!({"title": "one"}));
        assert_eq!(original.generated_at, latest.generated_at);
    }

    #[tokio::test]
    async fn test_list_latest_returns_newest_per_deliverable() {
        let store = store().await;
        for (deliverable, n) in [
            (DeliverableId::Preflight, 1),
            (DeliverableId::Framework, 1),
            (DeliverableId::Framework, 2),
        ] {
            store
                .write_artifact(
                    &ArtifactKey::new("acme", "run-1", deliverable),
                    Artifact::generated(json!({"n": n}), ValidationResult::default(), vec![]),
                )
                .await
                .unwrap();
        }

        let latest = store.list_latest("acme", "run-1").await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&DeliverableId::Framework].content, json!({"n": 2}));
        assert_eq!(latest[&DeliverableId::Framework].version, 2);
        assert!(store.list_latest("acme", "run-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_projects_and_transcripts() {
        let store = store().await;
        let transcript = Transcript {
            build_transcript: "We are launching a webinar".to_string(),
            intake_transcript: None,
            operator_notes: Some("Keep it short".to_string()),
        };
        store
            .create_project(Project::new("acme", "Acme Launch"), transcript.clone())
            .await
            .unwrap();
        store
            .update_project_status("acme", ProjectStatus::Generating)
            .await
            .unwrap();

        let project = store.get_project("acme").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Generating);
        assert_eq!(store.read_transcript("acme").await.unwrap(), Some(transcript));
        assert!(store.get_project("other").await.unwrap().is_none());
        assert!(matches!(
            store
                .create_project(Project::new("acme", "Dup"), Transcript::default())
                .await,
            Err(StoreError::ProjectExists(_))
        ));
    }
}
