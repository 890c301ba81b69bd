//! Contract validation
//!
//! Two passes over a candidate artifact: the schema pass checks it against
//! its own contract, the crosslink pass checks it against upstream artifacts
//! and run-level constraints. Both collect every violation instead of stopping
//! at the first, so one repair round can address all of them.

pub mod crosslink;
pub mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{kind, DeliverableId};

/// Which validation pass produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    Crosslink,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Schema => "schema",
            ErrorKind::Crosslink => "crosslink",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Fails validation
    Blocking,
    /// Reported and persisted, never fails validation
    Advisory,
}

/// Machine-readable violation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Missing,
    WrongType,
    Empty,
    IdFormat,
    EnumValue,
    OutOfRange,
    Length,
    UnknownField,
    Unparseable,
    DuplicateId,
    PhaseMismatch,
    CategoryMismatch,
    Range,
    Overlap,
    Cardinality,
    UnknownReference,
    Order,
    DependencyInvalid,
    DurationBudget,
}

impl ErrorCode {
    /// Whether re-prompting the model can fix this class of violation
    pub fn is_repairable(&self) -> bool {
        !matches!(self, ErrorCode::DependencyInvalid)
    }
}

/// One structured violation. Rendered to text only at display time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub deliverable: DeliverableId,
    /// Dotted path with array indices, e.g. `blocks[3].block_id`; `$` is the root
    pub field: String,
    pub detail: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn schema(
        deliverable: DeliverableId,
        code: ErrorCode,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::Schema,
            code,
            deliverable,
            field: field.into(),
            detail: detail.into(),
            severity: Severity::Blocking,
        }
    }

    pub fn crosslink(
        deliverable: DeliverableId,
        code: ErrorCode,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::Crosslink,
            code,
            deliverable,
            field: field.into(),
            detail: detail.into(),
            severity: Severity::Blocking,
        }
    }

    pub fn advisory(mut self) -> Self {
        self.severity = Severity::Advisory;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}.{} {}",
            self.kind.as_str(),
            self.deliverable,
            self.field,
            self.detail
        )
    }
}

/// Outcome of a validation pass: blocking errors plus advisory warnings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    #[serde(default)]
    pub warnings: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, error: ValidationError) {
        if error.is_blocking() {
            self.errors.push(error);
        } else {
            self.warnings.push(error);
        }
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Display strings for the blocking errors, in order
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    /// False when the only blocking errors are ones re-prompting cannot fix
    pub fn is_repairable(&self) -> bool {
        self.errors.iter().any(|e| e.code.is_repairable())
    }
}

/// An upstream artifact as seen by crosslink validation
#[derive(Debug, Clone)]
pub struct DependencyArtifact {
    pub content: Value,
    pub validated: bool,
}

pub type DependencyArtifacts = BTreeMap<DeliverableId, DependencyArtifact>;

/// Run-level constraints not carried by any single artifact
#[derive(Debug, Clone, Default)]
pub struct TargetConstraints {
    pub target_duration_minutes: Option<u32>,
}

/// Validate a candidate artifact against its deliverable's contract
pub fn validate_schema(deliverable: DeliverableId, content: &Value) -> ValidationResult {
    kind(deliverable).validate_schema(content)
}

/// Validate cross-artifact references and run-level constraints.
/// Callers run this only after [`validate_schema`] passed.
pub fn validate_crosslinks(
    deliverable: DeliverableId,
    content: &Value,
    dependencies: &DependencyArtifacts,
    constraints: &TargetConstraints,
) -> ValidationResult {
    kind(deliverable).validate_crosslinks(content, dependencies, constraints)
}

/// Schema pass, then (only if it passed) the crosslink pass
pub fn validate_full(
    deliverable: DeliverableId,
    content: &Value,
    dependencies: &DependencyArtifacts,
    constraints: &TargetConstraints,
) -> ValidationResult {
    let schema = validate_schema(deliverable, content);
    if !schema.ok() {
        return schema;
    }
    let mut result = schema;
    result.merge(validate_crosslinks(deliverable, content, dependencies, constraints));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_format() {
        let error = ValidationError::schema(
            DeliverableId::Framework,
            ErrorCode::IdFormat,
            "blocks[3].block_id",
            "must match B01-B21 (got \"B22\")",
        );
        assert_eq!(
            error.to_string(),
            "schema:framework.blocks[3].block_id must match B01-B21 (got \"B22\")"
        );
    }

    #[test]
    fn test_advisory_errors_do_not_fail_result() {
        let mut result = ValidationResult::default();
        result.push(
            ValidationError::crosslink(
                DeliverableId::RunOfShow,
                ErrorCode::DurationBudget,
                "segments",
                "over budget",
            )
            .advisory(),
        );
        assert!(result.ok());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_dependency_invalid_alone_is_not_repairable() {
        let mut result = ValidationResult::default();
        result.push(ValidationError::crosslink(
            DeliverableId::RunOfShow,
            ErrorCode::DependencyInvalid,
            "$",
            "upstream framework failed validation",
        ));
        assert!(!result.is_repairable());
    }
}
