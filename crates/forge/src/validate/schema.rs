//! Structural validation against a deliverable contract

use serde_json::{Map, Value};

use super::{ErrorCode, ValidationError, ValidationResult};
use crate::catalog::{Contract, DeliverableId, ListShape, ObjectShape, Shape};

struct Walker {
    deliverable: DeliverableId,
    result: ValidationResult,
}

impl Walker {
    fn error(&mut self, code: ErrorCode, path: &str, detail: String) {
        let field = if path.is_empty() { "$" } else { path };
        self.result
            .push(ValidationError::schema(self.deliverable, code, field, detail));
    }

    fn object(&mut self, shape: &ObjectShape, map: &Map<String, Value>, path: &str) {
        for key in map.keys() {
            if shape.field(key).is_none() {
                self.error(
                    ErrorCode::UnknownField,
                    &join(path, key),
                    "is not a permitted field".to_string(),
                );
            }
        }

        for field in shape.fields {
            let child = join(path, field.name);
            match map.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        self.error(ErrorCode::Missing, &child, "is required".to_string());
                    }
                }
                Some(value) => self.value(&field.shape, value, &child),
            }
        }
    }

    fn value(&mut self, shape: &Shape, value: &Value, path: &str) {
        match shape {
            Shape::Text => match value.as_str() {
                Some(s) if s.trim().is_empty() => {
                    self.error(ErrorCode::Empty, path, "must not be empty".to_string())
                }
                Some(_) => {}
                None => self.wrong_type(path, "a string", value),
            },
            Shape::Integer { min, max } => match value.as_i64() {
                Some(n) if n < *min || n > *max => self.error(
                    ErrorCode::OutOfRange,
                    path,
                    format!("must be between {} and {} (got {})", min, max, n),
                ),
                Some(_) => {}
                None => self.wrong_type(path, "an integer", value),
            },
            Shape::Number { min, max } => match value.as_f64() {
                Some(n) if n < *min || n > *max => self.error(
                    ErrorCode::OutOfRange,
                    path,
                    format!("must be between {} and {} (got {})", min, max, n),
                ),
                Some(_) => {}
                None => self.wrong_type(path, "a number", value),
            },
            Shape::Bool => {
                if !value.is_boolean() {
                    self.wrong_type(path, "a boolean", value);
                }
            }
            Shape::Id(pattern) => match value.as_str() {
                Some(raw) if !pattern.is_canonical(raw) => self.error(
                    ErrorCode::IdFormat,
                    path,
                    format!("must be {} (got {:?})", pattern.describe(), raw),
                ),
                Some(_) => {}
                None => self.wrong_type(path, "an id string", value),
            },
            Shape::Enum(allowed) => match value.as_str() {
                Some(s) if !allowed.iter().any(|a| *a == s) => self.error(
                    ErrorCode::EnumValue,
                    path,
                    format!("must be one of [{}] (got {:?})", allowed.join(", "), s),
                ),
                Some(_) => {}
                None => self.wrong_type(path, "a string", value),
            },
            Shape::List(list) => match value.as_array() {
                Some(items) => self.list(list, items, path),
                None => self.wrong_type(path, "an array", value),
            },
            Shape::Object(inner) => match value.as_object() {
                Some(map) => self.object(inner, map, path),
                None => self.wrong_type(path, "an object", value),
            },
        }
    }

    fn list(&mut self, shape: &ListShape, items: &[Value], path: &str) {
        let n = items.len();
        if n < shape.min || n > shape.max {
            self.error(ErrorCode::Length, path, length_detail(shape, n));
        }
        for (i, item) in items.iter().enumerate() {
            self.value(shape.items, item, &format!("{}[{}]", path, i));
        }
    }

    fn wrong_type(&mut self, path: &str, expected: &str, value: &Value) {
        self.error(
            ErrorCode::WrongType,
            path,
            format!("must be {} (got {})", expected, type_name(value)),
        );
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn length_detail(shape: &ListShape, n: usize) -> String {
    if shape.min == shape.max {
        format!("must contain exactly {} items (got {})", shape.min, n)
    } else if shape.max == usize::MAX {
        format!("must contain at least {} items (got {})", shape.min, n)
    } else {
        format!(
            "must contain between {} and {} items (got {})",
            shape.min, shape.max, n
        )
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate `content` against `contract`, collecting every violation
pub fn validate_against(contract: &Contract, content: &Value) -> ValidationResult {
    let mut walker = Walker {
        deliverable: contract.deliverable,
        result: ValidationResult::default(),
    };
    match content.as_object() {
        Some(map) => walker.object(contract.root, map, ""),
        None => walker.wrong_type("", "an object", content),
    }
    walker.result
}
