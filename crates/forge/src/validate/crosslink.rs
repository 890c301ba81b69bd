//! Cross-artifact consistency checks
//!
//! Each check runs to completion and accumulates. The one exception is the
//! upstream short-circuit: when a referenced upstream artifact is missing or
//! failed its own validation, the result is a single `dependency_invalid`
//! error so its defects do not cascade into false positives here.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::{
    DependencyArtifacts, ErrorCode, TargetConstraints, ValidationError, ValidationResult,
};
use crate::catalog::{DeliverableId, IdPattern, Phase};

/// Allowed relative drift between allocated time and the target duration
pub const DURATION_TOLERANCE: f64 = 0.15;

const SOCIAL_CATEGORIES: [&str; 3] = ["promo_posts", "reminder_posts", "replay_posts"];
const SOCIAL_TOTAL: (usize, usize) = (6, 18);

struct Checks {
    deliverable: DeliverableId,
    result: ValidationResult,
}

impl Checks {
    fn new(deliverable: DeliverableId) -> Self {
        Self {
            deliverable,
            result: ValidationResult::default(),
        }
    }

    fn error(&mut self, code: ErrorCode, field: impl Into<String>, detail: impl Into<String>) {
        self.result
            .push(ValidationError::crosslink(self.deliverable, code, field, detail));
    }

    fn advisory(&mut self, code: ErrorCode, field: impl Into<String>, detail: impl Into<String>) {
        self.result.push(
            ValidationError::crosslink(self.deliverable, code, field, detail).advisory(),
        );
    }

    /// Flag every id after its first occurrence
    fn unique<'a>(&mut self, ids: impl IntoIterator<Item = (String, &'a str)>) {
        let mut seen: HashMap<&str, String> = HashMap::new();
        for (path, id) in ids {
            match seen.get(id) {
                Some(first) => {
                    let detail = format!("duplicates id {} already used at {}", id, first);
                    self.error(ErrorCode::DuplicateId, path, detail);
                }
                None => {
                    seen.insert(id, path);
                }
            }
        }
    }

    /// Advisory check of allocated minutes against the target duration
    fn duration_budget(&mut self, field: &str, allocated: i64, constraints: &TargetConstraints) {
        let Some(target) = constraints.target_duration_minutes else {
            return;
        };
        if target == 0 {
            return;
        }
        let drift = (allocated - target as i64).abs() as f64 / target as f64;
        if drift > DURATION_TOLERANCE {
            self.advisory(
                ErrorCode::DurationBudget,
                field,
                format!(
                    "allocates {} minutes, more than {}% away from the {}-minute target",
                    allocated,
                    (DURATION_TOLERANCE * 100.0).round(),
                    target
                ),
            );
        }
    }

    fn finish(self) -> ValidationResult {
        self.result
    }
}

/// Resolve a validated upstream artifact, or the short-circuit result
fn upstream<'a>(
    deliverable: DeliverableId,
    dependencies: &'a DependencyArtifacts,
    needed: DeliverableId,
) -> Result<&'a Value, ValidationResult> {
    let detail = match dependencies.get(&needed) {
        Some(dep) if dep.validated => return Ok(&dep.content),
        Some(_) => format!("upstream {} failed validation", needed),
        None => format!("upstream {} is missing", needed),
    };
    let mut checks = Checks::new(deliverable);
    checks.error(ErrorCode::DependencyInvalid, "$", detail);
    Err(checks.finish())
}

fn items<'a>(content: &'a Value, field: &str) -> &'a [Value] {
    content
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    item.get(field).and_then(Value::as_str)
}

fn int_field(item: &Value, field: &str) -> Option<i64> {
    item.get(field).and_then(Value::as_i64)
}

fn block_ids(framework: &Value) -> BTreeSet<&str> {
    items(framework, "blocks")
        .iter()
        .filter_map(|b| str_field(b, "block_id"))
        .collect()
}

fn ids_at<'a>(list: &'a [Value], prefix: &str, field: &str) -> Vec<(String, &'a str)> {
    list.iter()
        .enumerate()
        .filter_map(|(i, item)| {
            str_field(item, field).map(|id| (format!("{}[{}].{}", prefix, i, field), id))
        })
        .collect()
}

/// For deliverables with no cross-artifact relationships
pub fn no_crosslinks(
    _content: &Value,
    _dependencies: &DependencyArtifacts,
    _constraints: &TargetConstraints,
) -> ValidationResult {
    ValidationResult::default()
}

pub fn framework(
    content: &Value,
    _dependencies: &DependencyArtifacts,
    constraints: &TargetConstraints,
) -> ValidationResult {
    let mut checks = Checks::new(DeliverableId::Framework);
    let blocks = items(content, "blocks");
    checks.unique(ids_at(blocks, "blocks", "block_id"));

    for (i, block) in blocks.iter().enumerate() {
        let Some(parsed) = str_field(block, "block_id").and_then(|id| IdPattern::Block.parse(id))
        else {
            continue;
        };
        let (Some(expected), Some(actual)) =
            (Phase::from_block_number(parsed.number), str_field(block, "phase"))
        else {
            continue;
        };
        if expected.as_str() != actual {
            checks.error(
                ErrorCode::PhaseMismatch,
                format!("blocks[{}].phase", i),
                format!(
                    "is {:?} but block {} belongs to the {} phase",
                    actual,
                    parsed.number,
                    expected.as_str()
                ),
            );
        }
    }

    let allocated = blocks
        .iter()
        .filter_map(|b| int_field(b, "duration_minutes"))
        .sum();
    checks.duration_budget("blocks", allocated, constraints);
    checks.finish()
}

pub fn landing_page(
    content: &Value,
    dependencies: &DependencyArtifacts,
    _constraints: &TargetConstraints,
) -> ValidationResult {
    let framework = match upstream(DeliverableId::LandingPage, dependencies, DeliverableId::Framework) {
        Ok(v) => v,
        Err(short) => return short,
    };
    let known = block_ids(framework);
    let mut checks = Checks::new(DeliverableId::LandingPage);

    checks.unique(ids_at(items(content, "proof_blocks"), "proof_blocks", "proof_id"));

    let agenda = items(content, "agenda_block_ids");
    checks.unique(
        agenda
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_str().map(|id| (format!("agenda_block_ids[{}]", i), id))),
    );
    for (i, id) in agenda.iter().enumerate() {
        if let Some(id) = id.as_str() {
            if !known.contains(id) {
                checks.error(
                    ErrorCode::UnknownReference,
                    format!("agenda_block_ids[{}]", i),
                    format!("references block {} which is not in the framework", id),
                );
            }
        }
    }
    checks.finish()
}

pub fn email_sequence(
    content: &Value,
    dependencies: &DependencyArtifacts,
    _constraints: &TargetConstraints,
) -> ValidationResult {
    let emails = items(content, "emails");
    let teaches: Vec<(usize, &str)> = emails
        .iter()
        .enumerate()
        .filter_map(|(i, e)| str_field(e, "teaches_block_id").map(|id| (i, id)))
        .collect();

    let known = if teaches.is_empty() {
        BTreeSet::new()
    } else {
        match upstream(DeliverableId::EmailSequence, dependencies, DeliverableId::Framework) {
            Ok(framework) => block_ids(framework),
            Err(short) => return short,
        }
    };

    let mut checks = Checks::new(DeliverableId::EmailSequence);
    checks.unique(ids_at(emails, "emails", "email_id"));

    let mut previous: Option<i64> = None;
    for (i, email) in emails.iter().enumerate() {
        let Some(offset) = int_field(email, "send_offset_days") else {
            continue;
        };
        if let Some(prev) = previous {
            if offset < prev {
                checks.error(
                    ErrorCode::Order,
                    format!("emails[{}].send_offset_days", i),
                    format!("is {} but the previous email sends on day {}", offset, prev),
                );
            }
        }
        previous = Some(offset);
    }

    for (i, id) in teaches {
        if !known.contains(id) {
            checks.error(
                ErrorCode::UnknownReference,
                format!("emails[{}].teaches_block_id", i),
                format!("references block {} which is not in the framework", id),
            );
        }
    }
    checks.finish()
}

pub fn social_posts(
    content: &Value,
    _dependencies: &DependencyArtifacts,
    _constraints: &TargetConstraints,
) -> ValidationResult {
    let mut checks = Checks::new(DeliverableId::SocialPosts);

    let mut all_ids = Vec::new();
    let mut total = 0;
    for category in SOCIAL_CATEGORIES {
        let posts = items(content, category);
        total += posts.len();
        all_ids.extend(ids_at(posts, category, "post_id"));
    }
    checks.unique(all_ids);

    let (min, max) = SOCIAL_TOTAL;
    if total < min || total > max {
        checks.error(
            ErrorCode::Cardinality,
            "$",
            format!(
                "must contain between {} and {} posts across all categories (got {})",
                min, max, total
            ),
        );
    }
    checks.finish()
}

pub fn run_of_show(
    content: &Value,
    dependencies: &DependencyArtifacts,
    constraints: &TargetConstraints,
) -> ValidationResult {
    let framework = match upstream(DeliverableId::RunOfShow, dependencies, DeliverableId::Framework) {
        Ok(v) => v,
        Err(short) => return short,
    };
    let known = block_ids(framework);
    let mut checks = Checks::new(DeliverableId::RunOfShow);
    let total = int_field(content, "total_minutes");
    let segments = items(content, "segments");

    let mut allocated = 0;
    let mut previous_end: Option<(usize, i64)> = None;
    for (i, segment) in segments.iter().enumerate() {
        let start = int_field(segment, "start_minute");
        let end = int_field(segment, "end_minute");

        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                checks.error(
                    ErrorCode::Range,
                    format!("segments[{}]", i),
                    format!("starts at minute {} but ends at minute {}", start, end),
                );
            } else {
                allocated += end - start;
            }
            if let Some(total) = total {
                if end > total {
                    checks.error(
                        ErrorCode::Range,
                        format!("segments[{}].end_minute", i),
                        format!("ends at minute {} after the {}-minute total", end, total),
                    );
                }
            }
            if let Some((prev_index, prev_end)) = previous_end {
                if start < prev_end {
                    checks.error(
                        ErrorCode::Overlap,
                        format!("segments[{}]", i),
                        format!(
                            "starts at minute {} before segments[{}] ends at minute {}",
                            start, prev_index, prev_end
                        ),
                    );
                }
            }
            if previous_end.map_or(true, |(_, prev_end)| end > prev_end) {
                previous_end = Some((i, end));
            }
        }

        for (j, id) in items(segment, "block_ids").iter().enumerate() {
            if let Some(id) = id.as_str() {
                if !known.contains(id) {
                    checks.error(
                        ErrorCode::UnknownReference,
                        format!("segments[{}].block_ids[{}]", i, j),
                        format!("references block {} which is not in the framework", id),
                    );
                }
            }
        }
    }

    checks.duration_budget("segments", allocated, constraints);
    checks.finish()
}

pub fn checklists(
    content: &Value,
    dependencies: &DependencyArtifacts,
    _constraints: &TargetConstraints,
) -> ValidationResult {
    let lists = items(content, "checklists");
    let mut refs: Vec<(String, &str)> = Vec::new();
    for (i, list) in lists.iter().enumerate() {
        for (j, item) in items(list, "items").iter().enumerate() {
            if let Some(email) = str_field(item, "email_ref") {
                refs.push((format!("checklists[{}].items[{}].email_ref", i, j), email));
            }
        }
    }

    let known: BTreeSet<&str> = if refs.is_empty() {
        BTreeSet::new()
    } else {
        match upstream(DeliverableId::Checklists, dependencies, DeliverableId::EmailSequence) {
            Ok(sequence) => items(sequence, "emails")
                .iter()
                .filter_map(|e| str_field(e, "email_id"))
                .collect(),
            Err(short) => return short,
        }
    };

    let mut checks = Checks::new(DeliverableId::Checklists);
    checks.unique(ids_at(lists, "checklists", "checklist_id"));

    for (i, list) in lists.iter().enumerate() {
        let id_category = str_field(list, "checklist_id")
            .and_then(|id| IdPattern::Checklist.parse(id))
            .and_then(|p| p.category);
        let (Some(id_category), Some(category)) = (id_category, str_field(list, "category")) else {
            continue;
        };
        if !id_category.eq_ignore_ascii_case(category) {
            checks.error(
                ErrorCode::CategoryMismatch,
                format!("checklists[{}].category", i),
                format!(
                    "is {:?} but the checklist id names the {} category",
                    category,
                    id_category.to_ascii_lowercase()
                ),
            );
        }
    }

    for (path, email) in refs {
        if !known.contains(email) {
            checks.error(
                ErrorCode::UnknownReference,
                path,
                format!("references email {} which is not in the email sequence", email),
            );
        }
    }
    checks.finish()
}

pub fn slide_prompts(
    content: &Value,
    dependencies: &DependencyArtifacts,
    _constraints: &TargetConstraints,
) -> ValidationResult {
    let framework = match upstream(DeliverableId::SlidePrompts, dependencies, DeliverableId::Framework) {
        Ok(v) => v,
        Err(short) => return short,
    };
    let known = block_ids(framework);
    let mut checks = Checks::new(DeliverableId::SlidePrompts);
    let slides = items(content, "slides");
    checks.unique(ids_at(slides, "slides", "block_id"));

    for (i, slide) in slides.iter().enumerate() {
        if let Some(id) = str_field(slide, "block_id") {
            if !known.contains(id) {
                checks.error(
                    ErrorCode::UnknownReference,
                    format!("slides[{}].block_id", i),
                    format!("references block {} which is not in the framework", id),
                );
            }
        }
    }
    checks.finish()
}
