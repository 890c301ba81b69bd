//! Deterministic, contract-driven cleanup of model output
//!
//! Runs before validation. Only touches scopes the contract declares:
//! unknown keys are dropped, padded ids re-rendered, stringified primitives
//! coerced, id-derived fields recomputed and ordered collections sorted.
//! Every mutation is recorded so edits stay auditable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::catalog::{Contract, ListShape, ObjectShape, Shape, SortKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    IdPadding,
    FieldRemoval,
    TypeCoercion,
    ArraySort,
    PhaseFix,
}

/// One recorded mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationChange {
    pub kind: ChangeKind,
    pub path: String,
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone)]
pub struct Canonicalized {
    pub value: Value,
    pub changes: Vec<NormalizationChange>,
}

impl Canonicalized {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Canonicalize `value` against `contract`. Idempotent: a second pass over
/// the output records no changes.
pub fn canonicalize(contract: &Contract, value: Value) -> Canonicalized {
    let mut changes = Vec::new();
    let value = object(contract.root, value, "", &mut changes);
    Canonicalized { value, changes }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn record(
    changes: &mut Vec<NormalizationChange>,
    kind: ChangeKind,
    path: &str,
    before: Value,
    after: Value,
) {
    changes.push(NormalizationChange {
        kind,
        path: if path.is_empty() { "$".to_string() } else { path.to_string() },
        before,
        after,
    });
}

fn object(
    shape: &ObjectShape,
    value: Value,
    path: &str,
    changes: &mut Vec<NormalizationChange>,
) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };

    let unknown: Vec<String> = map
        .keys()
        .filter(|k| shape.field(k).is_none())
        .cloned()
        .collect();
    for key in unknown {
        if let Some(removed) = map.remove(&key) {
            record(changes, ChangeKind::FieldRemoval, &join(path, &key), removed, Value::Null);
        }
    }

    let mut out = Map::new();
    for field in shape.fields {
        if let Some(v) = map.remove(field.name) {
            let child = join(path, field.name);
            out.insert(field.name.to_string(), self::value(&field.shape, v, &child, changes));
        }
    }

    for derived in shape.derived {
        let expected = out
            .get(derived.source)
            .and_then(Value::as_str)
            .and_then(derived.derive);
        let Some(expected) = expected else {
            continue;
        };
        let current = out.get(derived.field).cloned().unwrap_or(Value::Null);
        if current.as_str() != Some(expected) {
            let after = Value::String(expected.to_string());
            record(
                changes,
                ChangeKind::PhaseFix,
                &join(path, derived.field),
                current,
                after.clone(),
            );
            out.insert(derived.field.to_string(), after);
        }
    }

    Value::Object(out)
}

fn value(shape: &Shape, value: Value, path: &str, changes: &mut Vec<NormalizationChange>) -> Value {
    match shape {
        Shape::Object(inner) => object(inner, value, path, changes),
        Shape::List(list) => self::list(list, value, path, changes),
        Shape::Id(pattern) => {
            let padded = match &value {
                Value::String(raw) => pattern.normalize(raw).filter(|canonical| canonical != raw),
                _ => None,
            };
            match padded {
                Some(canonical) => {
                    let after = Value::String(canonical);
                    record(changes, ChangeKind::IdPadding, path, value, after.clone());
                    after
                }
                None => value,
            }
        }
        Shape::Integer { .. } => coerce(value, path, changes, coerce_integer),
        Shape::Number { .. } => coerce(value, path, changes, coerce_number),
        Shape::Bool => coerce(value, path, changes, coerce_bool),
        Shape::Text | Shape::Enum(_) => value,
    }
}

fn coerce(
    value: Value,
    path: &str,
    changes: &mut Vec<NormalizationChange>,
    convert: fn(&Value) -> Option<Value>,
) -> Value {
    match convert(&value) {
        Some(after) => {
            record(changes, ChangeKind::TypeCoercion, path, value, after.clone());
            after
        }
        None => value,
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(Value::from(n));
            }
            let f = s.parse::<f64>().ok()?;
            whole(f).map(Value::from)
        }
        Value::Number(n) if !n.is_i64() && !n.is_u64() => n.as_f64().and_then(whole).map(Value::from),
        _ => None,
    }
}

fn whole(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    let Value::String(s) = value else {
        return None;
    };
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::from(n));
    }
    let f = s.parse::<f64>().ok()?;
    Number::from_f64(f).map(Value::Number)
}

fn coerce_bool(value: &Value) -> Option<Value> {
    let Value::String(s) = value else {
        return None;
    };
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(Value::Bool(true)),
        "false" | "no" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn list(
    shape: &ListShape,
    value: Value,
    path: &str,
    changes: &mut Vec<NormalizationChange>,
) -> Value {
    let Value::Array(items) = value else {
        return value;
    };
    let items: Vec<Value> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| self::value(shape.items, item, &format!("{}[{}]", path, i), changes))
        .collect();

    let Some(order) = shape.order else {
        return Value::Array(items);
    };

    let keys: Vec<f64> = items.iter().map(|item| sort_key(order, item)).collect();
    let mut indices: Vec<usize> = (0..items.len()).collect();
    indices.sort_by(|a, b| {
        keys[*a]
            .partial_cmp(&keys[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if indices.iter().enumerate().all(|(pos, idx)| pos == *idx) {
        return Value::Array(items);
    }

    let before = Value::Array(items.clone());
    let sorted: Vec<Value> = indices.into_iter().map(|i| items[i].clone()).collect();
    let after = Value::Array(sorted);
    record(changes, ChangeKind::ArraySort, path, before, after.clone());
    after
}

/// Items without a usable key sort last, keeping their relative order
fn sort_key(order: SortKey, item: &Value) -> f64 {
    let key = match order {
        SortKey::IdField(field, pattern) => item
            .get(field)
            .and_then(Value::as_str)
            .and_then(|raw| pattern.sort_key(raw)),
        SortKey::NumberField(field) => item.get(field).and_then(Value::as_f64),
        SortKey::Id(pattern) => item.as_str().and_then(|raw| pattern.sort_key(raw)),
    };
    key.unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::contracts::{CHECKLISTS, FRAMEWORK, RUN_OF_SHOW};
    use crate::test_support::fixtures;
    use serde_json::json;

    fn framework_with(blocks: Vec<Value>) -> Value {
        json!({
            "title": "t",
            "big_promise": "p",
            "total_minutes": 60,
            "blocks": blocks,
        })
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let messy = framework_with(vec![
            json!({"block_id": "B2", "phase": "end", "title": "a", "objective": "o",
                   "talking_points": ["x"], "duration_minutes": "3", "extra": 1}),
            json!({"block_id": "b1", "title": "a", "objective": "o",
                   "talking_points": ["x"], "duration_minutes": 3.0}),
        ]);
        let first = canonicalize(&FRAMEWORK, messy);
        assert!(!first.changes.is_empty());

        let second = canonicalize(&FRAMEWORK, first.value.clone());
        assert!(second.is_unchanged(), "{:?}", second.changes);
        assert_eq!(second.value, first.value);
    }

    #[test]
    fn test_valid_fixtures_are_already_canonical() {
        for id in crate::catalog::DeliverableId::ALL {
            let result = crate::catalog::kind(id).canonicalize(fixtures::valid(id));
            assert!(result.is_unchanged(), "{}: {:?}", id, result.changes);
        }
    }

    #[test]
    fn test_pads_in_range_ids_and_leaves_out_of_range() {
        let result = canonicalize(
            &FRAMEWORK,
            framework_with(vec![
                json!({"block_id": "B7", "phase": "beginning"}),
                json!({"block_id": "B22"}),
            ]),
        );
        let blocks = result.value["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["block_id"], "B07");
        assert_eq!(blocks[1]["block_id"], "B22");
        assert!(blocks[1].get("phase").is_none());
        assert!(result
            .changes
            .iter()
            .any(|c| c.kind == ChangeKind::IdPadding && c.path == "blocks[0].block_id"));
    }

    #[test]
    fn test_phase_overrides_contradicting_input() {
        for n in 1..=21u32 {
            let expected = match n {
                1..=7 => "beginning",
                8..=14 => "middle",
                _ => "end",
            };
            let input = framework_with(vec![json!({"block_id": format!("B{}", n), "phase": "wrong"})]);
            let result = canonicalize(&FRAMEWORK, input);
            assert_eq!(result.value["blocks"][0]["phase"], expected, "block {}", n);
            assert!(result.changes.iter().any(|c| c.kind == ChangeKind::PhaseFix));
        }
    }

    #[test]
    fn test_removes_unknown_fields_at_declared_scopes() {
        let result = canonicalize(
            &FRAMEWORK,
            json!({"title": "t", "notes": "drop me", "blocks": []}),
        );
        assert!(result.value.get("notes").is_none());
        let removal = result
            .changes
            .iter()
            .find(|c| c.kind == ChangeKind::FieldRemoval)
            .unwrap();
        assert_eq!(removal.path, "notes");
        assert_eq!(removal.before, json!("drop me"));
    }

    #[test]
    fn test_coerces_stringified_primitives() {
        let result = canonicalize(
            &CHECKLISTS,
            json!({"checklists": [{"checklist_id": "CL_PRE_01", "category": "pre", "title": "t",
                                   "items": [{"text": "a", "done": "yes"}]}]}),
        );
        assert_eq!(result.value["checklists"][0]["items"][0]["done"], json!(true));
        assert_eq!(result.changes[0].kind, ChangeKind::TypeCoercion);
    }

    #[test]
    fn test_sorts_ordered_collections() {
        let result = canonicalize(
            &RUN_OF_SHOW,
            json!({"total_minutes": 60, "segments": [
                {"start_minute": 30, "end_minute": 60},
                {"start_minute": "0", "end_minute": 30},
            ]}),
        );
        assert_eq!(result.value["segments"][0]["start_minute"], json!(0));
        assert!(result.changes.iter().any(|c| c.kind == ChangeKind::ArraySort));
    }
}
