//! Export readiness scoring
//!
//! Score, pass flag and blocking reasons come out of one evaluation pass over
//! the same inputs, so they cannot disagree with each other.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::DeliverableId;
use crate::placeholders::PlaceholderScan;
use crate::validate::{ErrorKind, ValidationResult};

pub const DEFAULT_THRESHOLD: u32 = 70;

const MISSING_CONTEXT_PENALTY: u32 = 15;
const MISSING_CONTEXT_CAP: u32 = 60;
const CRITICAL_PLACEHOLDER_PENALTY: u32 = 10;
const CRITICAL_PLACEHOLDER_CAP: u32 = 40;
const INCOMPLETE_DELIVERABLES_PENALTY: u32 = 10;

#[derive(Debug, Clone, Default)]
pub struct ReadinessInput {
    /// Latest validation outcome per deliverable; absent means never produced
    pub validation_results: BTreeMap<DeliverableId, ValidationResult>,
    pub critical_placeholders: usize,
    pub missing_context_count: usize,
}

impl ReadinessInput {
    pub fn new(
        validation_results: BTreeMap<DeliverableId, ValidationResult>,
        scan: &PlaceholderScan,
        missing_context_count: usize,
    ) -> Self {
        Self {
            validation_results,
            critical_placeholders: scan.critical_count,
            missing_context_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockingReason {
    MissingDeliverable { deliverable: DeliverableId },
    FailedValidation { deliverable: DeliverableId, kind: ErrorKind },
    CriticalPlaceholders { count: usize },
    ScoreBelowThreshold { score: u32, threshold: u32 },
}

impl std::fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockingReason::MissingDeliverable { deliverable } => {
                write!(f, "{} is missing", deliverable.display_name())
            }
            BlockingReason::FailedValidation { deliverable, kind } => write!(
                f,
                "{} failed {} validation",
                deliverable.display_name(),
                kind.as_str()
            ),
            BlockingReason::CriticalPlaceholders { count } => {
                write!(f, "{} critical placeholder(s) unresolved", count)
            }
            BlockingReason::ScoreBelowThreshold { score, threshold } => {
                write!(f, "readiness score {} is below {}", score, threshold)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub score: u32,
    pub pass: bool,
    pub blocking_reasons: Vec<BlockingReason>,
}

impl ReadinessResult {
    pub fn reason_messages(&self) -> Vec<String> {
        self.blocking_reasons.iter().map(|r| r.to_string()).collect()
    }
}

pub fn compute_readiness_score(input: &ReadinessInput) -> ReadinessResult {
    compute_readiness_score_with(input, DEFAULT_THRESHOLD)
}

pub fn compute_readiness_score_with(input: &ReadinessInput, threshold: u32) -> ReadinessResult {
    let mut blocking_reasons = Vec::new();
    let mut incomplete = false;

    for id in DeliverableId::CONTENT {
        match input.validation_results.get(&id) {
            None => {
                incomplete = true;
                blocking_reasons.push(BlockingReason::MissingDeliverable { deliverable: id });
            }
            Some(result) if !result.ok() => {
                incomplete = true;
                let kinds: BTreeSet<ErrorKind> = result.errors.iter().map(|e| e.kind).collect();
                for kind in kinds {
                    blocking_reasons.push(BlockingReason::FailedValidation {
                        deliverable: id,
                        kind,
                    });
                }
            }
            Some(_) => {}
        }
    }

    let missing_context = penalty(
        input.missing_context_count,
        MISSING_CONTEXT_PENALTY,
        MISSING_CONTEXT_CAP,
    );
    let placeholders = penalty(
        input.critical_placeholders,
        CRITICAL_PLACEHOLDER_PENALTY,
        CRITICAL_PLACEHOLDER_CAP,
    );
    let deliverables = if incomplete {
        INCOMPLETE_DELIVERABLES_PENALTY
    } else {
        0
    };
    let score = 100u32.saturating_sub(missing_context + placeholders + deliverables);

    if input.critical_placeholders > 0 {
        blocking_reasons.push(BlockingReason::CriticalPlaceholders {
            count: input.critical_placeholders,
        });
    }
    if score < threshold {
        blocking_reasons.push(BlockingReason::ScoreBelowThreshold { score, threshold });
    }

    let pass = score >= threshold && input.critical_placeholders == 0 && !incomplete;

    ReadinessResult {
        score,
        pass,
        blocking_reasons,
    }
}

fn penalty(count: usize, per_item: u32, cap: u32) -> u32 {
    u32::try_from(count)
        .unwrap_or(u32::MAX)
        .saturating_mul(per_item)
        .min(cap)
}
