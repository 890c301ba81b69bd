//! Bounded repair loop
//!
//! Every round extracts a JSON object from the model text, canonicalizes it
//! and runs full validation. A failing round builds a repair prompt from the
//! structured errors and asks the model again. The budget counts validation
//! rounds: the first round checks the original output, so a budget of `n`
//! spends at most `n - 1` repair calls.

use serde_json::Value;

use crate::canonicalize::NormalizationChange;
use crate::catalog::{kind, DeliverableId};
use crate::extract::extract_json_object;
use crate::model::{CallOptions, ModelError};
use crate::queue::GenerationQueue;
use crate::validate::{
    validate_full, DependencyArtifacts, ErrorCode, ErrorKind, TargetConstraints, ValidationError,
    ValidationResult,
};

/// Longest slice of a bad response echoed back in a repair prompt
const MAX_ECHOED_CHARS: usize = 6000;

/// Everything needed to (re)generate one deliverable
#[derive(Debug, Clone)]
pub struct RepairContext {
    pub deliverable: DeliverableId,
    pub dependencies: DependencyArtifacts,
    pub constraints: TargetConstraints,
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: CallOptions,
}

/// Progress notifications, in the order they happen
#[derive(Debug, Clone)]
pub enum RepairProgress {
    Validating { attempt: u32, budget: u32 },
    Repairing { attempt: u32, budget: u32 },
    Normalized { changes: Vec<NormalizationChange> },
}

/// A candidate that passed validation
#[derive(Debug, Clone)]
pub struct Repaired {
    pub content: Value,
    pub changes: Vec<NormalizationChange>,
    /// Carries advisory warnings; never has blocking errors
    pub validation: ValidationResult,
    pub attempts: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{} still failing after {attempts} attempt(s): {}", .deliverable.display_name(), .messages.join("; "))]
pub struct RepairError {
    pub deliverable: DeliverableId,
    pub attempts: u32,
    /// Plain-language translation of each remaining violation
    pub messages: Vec<String>,
    /// The machine-readable errors the messages were translated from
    pub errors: Vec<ValidationError>,
    /// Last canonicalized candidate, if any round produced one
    pub last_candidate: Option<Value>,
    /// Set when the last round failed in the model call itself
    pub generation_error: Option<ModelError>,
}

impl RepairError {
    pub fn is_cancelled(&self) -> bool {
        self.generation_error == Some(ModelError::Cancelled)
    }
}

/// Outcome of one validation round
enum Round {
    Valid(Repaired),
    Invalid {
        raw: String,
        candidate: Option<Value>,
        validation: ValidationResult,
    },
    Failed(ModelError),
}

/// Repair raw model output for `ctx.deliverable`.
///
/// `max_attempts` defaults to the deliverable's repair budget.
pub async fn attempt_repair(
    raw_output: &str,
    ctx: &RepairContext,
    queue: &GenerationQueue,
    max_attempts: Option<u32>,
    on_progress: &(dyn Fn(RepairProgress) + Send + Sync),
) -> Result<Repaired, RepairError> {
    run_rounds(Ok(raw_output.to_string()), ctx, queue, max_attempts, on_progress).await
}

/// Make the initial generation call and repair its output.
/// The initial call counts as the first attempt.
pub async fn generate(
    ctx: &RepairContext,
    queue: &GenerationQueue,
    max_attempts: Option<u32>,
    on_progress: &(dyn Fn(RepairProgress) + Send + Sync),
) -> Result<Repaired, RepairError> {
    let first = queue
        .call(&ctx.system_prompt, &ctx.user_prompt, &ctx.options)
        .await;
    run_rounds(first, ctx, queue, max_attempts, on_progress).await
}

async fn run_rounds(
    first: Result<String, ModelError>,
    ctx: &RepairContext,
    queue: &GenerationQueue,
    max_attempts: Option<u32>,
    on_progress: &(dyn Fn(RepairProgress) + Send + Sync),
) -> Result<Repaired, RepairError> {
    let budget = max_attempts
        .unwrap_or_else(|| ctx.deliverable.repair_budget())
        .max(1);

    let mut response = first;
    let mut last_invalid: Option<(String, Option<Value>, ValidationResult)> = None;
    let mut last_generation_error: Option<ModelError> = None;
    let mut attempt = 0;

    while attempt < budget {
        attempt += 1;
        on_progress(RepairProgress::Validating { attempt, budget });

        let round = match response {
            Ok(raw) => evaluate(ctx, raw),
            Err(e) => Round::Failed(e),
        };

        match round {
            Round::Valid(mut repaired) => {
                repaired.attempts = attempt;
                if !repaired.changes.is_empty() {
                    on_progress(RepairProgress::Normalized {
                        changes: repaired.changes.clone(),
                    });
                }
                if attempt > 1 {
                    tracing::info!(
                        "[REPAIR] {} repaired on attempt {}/{}",
                        ctx.deliverable,
                        attempt,
                        budget
                    );
                }
                return Ok(repaired);
            }
            Round::Failed(ModelError::Cancelled) => {
                return Err(exhausted(ctx, attempt, last_invalid, Some(ModelError::Cancelled)));
            }
            Round::Failed(e) => {
                tracing::warn!(
                    "[REPAIR] {} generation failed on attempt {}/{}: {}",
                    ctx.deliverable,
                    attempt,
                    budget,
                    e
                );
                last_generation_error = Some(e);
            }
            Round::Invalid {
                raw,
                candidate,
                validation,
            } => {
                tracing::debug!(
                    "[REPAIR] {} attempt {}/{} has {} blocking error(s)",
                    ctx.deliverable,
                    attempt,
                    budget,
                    validation.errors.len()
                );
                let repairable = validation.is_repairable();
                last_generation_error = None;
                last_invalid = Some((raw, candidate, validation));
                if !repairable {
                    tracing::warn!(
                        "[REPAIR] {} has only errors re-prompting cannot fix; giving up",
                        ctx.deliverable
                    );
                    break;
                }
            }
        }

        if attempt == budget {
            break;
        }

        on_progress(RepairProgress::Repairing { attempt, budget });
        let user = match &last_invalid {
            Some((raw, _, validation)) => repair_prompt(ctx, raw, validation),
            None => ctx.user_prompt.clone(),
        };
        response = queue.call(&ctx.system_prompt, &user, &ctx.options).await;
    }

    Err(exhausted(ctx, attempt, last_invalid, last_generation_error))
}

fn evaluate(ctx: &RepairContext, raw: String) -> Round {
    let extracted = match extract_json_object(&raw) {
        Ok(value) => value,
        Err(e) => {
            let mut validation = ValidationResult::default();
            validation.push(ValidationError::schema(
                ctx.deliverable,
                ErrorCode::Unparseable,
                "$",
                e.to_string(),
            ));
            return Round::Invalid {
                raw,
                candidate: None,
                validation,
            };
        }
    };

    let canonical = kind(ctx.deliverable).canonicalize(extracted);
    let validation = validate_full(
        ctx.deliverable,
        &canonical.value,
        &ctx.dependencies,
        &ctx.constraints,
    );
    if validation.ok() {
        Round::Valid(Repaired {
            content: canonical.value,
            changes: canonical.changes,
            validation,
            attempts: 0,
        })
    } else {
        Round::Invalid {
            raw,
            candidate: Some(canonical.value),
            validation,
        }
    }
}

fn exhausted(
    ctx: &RepairContext,
    attempts: u32,
    last_invalid: Option<(String, Option<Value>, ValidationResult)>,
    generation_error: Option<ModelError>,
) -> RepairError {
    let (errors, last_candidate) = match last_invalid {
        Some((_, candidate, validation)) => (validation.errors, candidate),
        None => (Vec::new(), None),
    };
    let mut messages: Vec<String> = errors.iter().map(plain_message).collect();
    if let Some(e) = &generation_error {
        messages.push(format!("The model call failed: {}", e));
    }
    RepairError {
        deliverable: ctx.deliverable,
        attempts,
        messages,
        errors,
        last_candidate,
        generation_error,
    }
}

/// Targeted advice for a known failure mode
fn hint(error: &ValidationError) -> Option<String> {
    let hint = match error.code {
        ErrorCode::IdFormat if error.field.ends_with("block_id") || error.field.contains("block_ids") => {
            "block ids must be B followed by exactly two digits with leading zeros (B07, not B7)"
                .to_string()
        }
        ErrorCode::IdFormat => format!("use the exact id format: {}", error.detail),
        ErrorCode::Length => format!(
            "the array has the wrong number of entries; it {}",
            error.detail
        ),
        ErrorCode::Missing => format!("add the required field \"{}\"", leaf(&error.field)),
        ErrorCode::UnknownField => format!(
            "remove \"{}\"; only the fields in the contract are allowed",
            leaf(&error.field)
        ),
        ErrorCode::WrongType => {
            "write numbers and booleans as JSON literals, not quoted strings".to_string()
        }
        ErrorCode::Empty => "fill in real content instead of an empty string".to_string(),
        ErrorCode::EnumValue => format!("use one of the allowed values; it {}", error.detail),
        ErrorCode::Unparseable => {
            "respond with a single JSON object and no surrounding text".to_string()
        }
        ErrorCode::DuplicateId => "give every entry its own unique id".to_string(),
        ErrorCode::PhaseMismatch => {
            "phase is beginning for B01-B07, middle for B08-B14 and end for B15-B21".to_string()
        }
        ErrorCode::CategoryMismatch => {
            "the category in the checklist id must match the category field".to_string()
        }
        ErrorCode::UnknownReference => {
            "only reference ids that exist in the upstream deliverable".to_string()
        }
        ErrorCode::Range | ErrorCode::Overlap => {
            "segments must start before they end, stay within total_minutes and not overlap"
                .to_string()
        }
        ErrorCode::Cardinality => format!("adjust the number of entries; it {}", error.detail),
        ErrorCode::Order => "keep send_offset_days non-decreasing from email to email".to_string(),
        ErrorCode::OutOfRange
        | ErrorCode::DependencyInvalid
        | ErrorCode::DurationBudget => return None,
    };
    Some(hint)
}

fn leaf(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

/// One violation in words an operator can act on
pub fn plain_message(error: &ValidationError) -> String {
    let scope = match error.kind {
        ErrorKind::Schema => "structure",
        ErrorKind::Crosslink => "consistency",
    };
    let location = if error.field == "$" {
        "the document".to_string()
    } else {
        format!("field {}", error.field)
    };
    match hint(error) {
        Some(hint) => format!(
            "{} {} problem in {}: {} (hint: {})",
            error.deliverable.display_name(),
            scope,
            location,
            error.detail,
            hint
        ),
        None => format!(
            "{} {} problem in {}: {}",
            error.deliverable.display_name(),
            scope,
            location,
            error.detail
        ),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

/// Repair prompt: contract summary, full error list, hints, truncated output
pub fn repair_prompt(ctx: &RepairContext, raw: &str, validation: &ValidationResult) -> String {
    let contract = kind(ctx.deliverable).contract();
    let mut prompt = format!(
        "Your previous {} response does not satisfy its contract. Fix every error below and return the complete corrected JSON object only.\n\n",
        ctx.deliverable.display_name()
    );

    prompt.push_str("CONTRACT:\n");
    prompt.push_str(&contract.summary());
    prompt.push_str("\n\nERRORS:\n");
    for error in &validation.errors {
        prompt.push_str("- ");
        prompt.push_str(&error.to_string());
        prompt.push('\n');
    }

    let mut hints: Vec<String> = Vec::new();
    for hint in validation.errors.iter().filter_map(hint) {
        if !hints.contains(&hint) {
            hints.push(hint);
        }
    }
    if !hints.is_empty() {
        prompt.push_str("\nHINTS:\n");
        for hint in hints {
            prompt.push_str("- ");
            prompt.push_str(&hint);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nPREVIOUS RESPONSE:\n");
    prompt.push_str(&truncate(raw, MAX_ECHOED_CHARS));
    prompt
}
