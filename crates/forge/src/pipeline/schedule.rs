//! Batch schedule over the fixed stage graph

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::DeliverableId;

/// Group `deliverables` into batches by stage, in stage order.
/// The QA report is computed after the last batch and never scheduled.
pub fn batches(deliverables: &BTreeSet<DeliverableId>) -> Vec<(u32, Vec<DeliverableId>)> {
    let mut by_stage: BTreeMap<u32, Vec<DeliverableId>> = BTreeMap::new();
    for id in deliverables.iter().filter(|id| id.is_generated()) {
        by_stage.entry(id.stage()).or_default().push(*id);
    }
    by_stage.into_iter().collect()
}

/// Every model-generated deliverable
pub fn all_generated() -> BTreeSet<DeliverableId> {
    DeliverableId::ALL
        .iter()
        .copied()
        .filter(DeliverableId::is_generated)
        .collect()
}

/// Deliverables whose dependency chain reaches `target`, excluding `target`
pub fn dependents(target: DeliverableId) -> BTreeSet<DeliverableId> {
    let mut found = BTreeSet::new();
    let mut frontier = vec![target];
    while let Some(current) = frontier.pop() {
        for id in DeliverableId::ALL {
            if id.dependencies().contains(&current) && found.insert(id) {
                frontier.push(id);
            }
        }
    }
    found
}

/// Minimal set to regenerate: the target, plus its transitive dependents
/// when cascading. The QA report is excluded; it is always recomputed.
pub fn affected(target: DeliverableId, cascade: bool) -> BTreeSet<DeliverableId> {
    let mut set = BTreeSet::new();
    if target.is_generated() {
        set.insert(target);
    }
    if cascade {
        set.extend(dependents(target));
    }
    set.retain(DeliverableId::is_generated);
    set
}
