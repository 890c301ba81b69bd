//! Unresolved placeholder detection across exportable artifacts

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::DeliverableId;
use crate::store::ArtifactKey;

static DOUBLE_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").unwrap());
static BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*(?:TBD|TODO|INSERT|PLACEHOLDER|FILL|ADD)\b[^\]]*\]").unwrap()
});
static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:XXX|FIXME)\b").unwrap());
static LINK_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)link|url").unwrap());

const PLACEHOLDER_SUFFIX: &str = "_placeholder";

/// Fields coached live by the host; markers there never block export
fn non_critical_fields(deliverable: DeliverableId) -> &'static [&'static str] {
    match deliverable {
        DeliverableId::RunOfShow => &["host_notes"],
        DeliverableId::SlidePrompts => &["speaker_notes"],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderLocation {
    pub artifact_id: String,
    pub deliverable: DeliverableId,
    pub field_path: String,
    pub matched_text: String,
    pub is_critical: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderScan {
    pub total_count: usize,
    pub critical_count: usize,
    pub skipped_count: usize,
    /// Artifact identifiers that could not be parsed
    pub skipped: Vec<String>,
    pub locations: Vec<PlaceholderLocation>,
}

impl PlaceholderScan {
    pub fn critical(&self) -> impl Iterator<Item = &PlaceholderLocation> {
        self.locations.iter().filter(|l| l.is_critical)
    }

    fn push(&mut self, location: PlaceholderLocation) {
        self.total_count += 1;
        if location.is_critical {
            self.critical_count += 1;
        }
        self.locations.push(location);
    }
}

/// Scan every exportable artifact, keyed by `project:run:deliverable`.
/// Malformed keys are skipped and counted.
pub fn scan_placeholders(artifacts: &BTreeMap<String, Value>) -> PlaceholderScan {
    let mut scan = PlaceholderScan::default();

    for (artifact_id, content) in artifacts {
        let key = match artifact_id.parse::<ArtifactKey>() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("[PLACEHOLDERS] Skipping artifact {:?}: {}", artifact_id, e);
                scan.skipped_count += 1;
                scan.skipped.push(artifact_id.clone());
                continue;
            }
        };
        if !key.deliverable.is_exportable() {
            continue;
        }

        let mut walker = Walker {
            artifact_id,
            deliverable: key.deliverable,
            exceptions: non_critical_fields(key.deliverable),
            scan: &mut scan,
        };
        walker.walk(content, "", None);

        if key.deliverable == DeliverableId::LandingPage {
            synthesize_proof_locations(artifact_id, content, &mut scan);
        }
    }

    tracing::debug!(
        "[PLACEHOLDERS] {} found, {} critical, {} skipped",
        scan.total_count,
        scan.critical_count,
        scan.skipped_count
    );
    scan
}

struct Walker<'a> {
    artifact_id: &'a str,
    deliverable: DeliverableId,
    exceptions: &'static [&'static str],
    scan: &'a mut PlaceholderScan,
}

impl Walker<'_> {
    fn walk(&mut self, value: &Value, path: &str, key: Option<&str>) {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    let child = if path.is_empty() {
                        k.clone()
                    } else {
                        format!("{}.{}", path, k)
                    };
                    self.walk(v, &child, Some(k.as_str()));
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.walk(item, &format!("{}[{}]", path, i), key);
                }
            }
            Value::String(text) => self.leaf(text, path, key),
            _ => {}
        }
    }

    fn leaf(&mut self, text: &str, path: &str, key: Option<&str>) {
        let exempt = key.map_or(false, |k| self.exceptions.iter().any(|e| *e == k));
        let mut matched = false;

        for pattern in [&*DOUBLE_BRACE, &*BRACKETED, &*MARKER] {
            for m in pattern.find_iter(text) {
                matched = true;
                let is_critical = !exempt && LINK_MARKER.is_match(m.as_str());
                self.record(path, m.as_str(), is_critical);
            }
        }

        // A `*_placeholder` field still holding a non-URL value is unresolved
        if let Some(key) = key.filter(|k| k.ends_with(PLACEHOLDER_SUFFIX)) {
            let value = text.trim();
            if !matched && !value.is_empty() && !is_url(value) {
                let is_critical = !exempt && LINK_MARKER.is_match(key);
                self.record(path, value, is_critical);
            }
        }
    }

    fn record(&mut self, path: &str, matched_text: &str, is_critical: bool) {
        self.scan.push(PlaceholderLocation {
            artifact_id: self.artifact_id.to_string(),
            deliverable: self.deliverable,
            field_path: path.to_string(),
            matched_text: matched_text.to_string(),
            is_critical,
        });
    }
}

fn is_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

/// Proof claims flagged `needs_source` block export until a source is supplied
fn synthesize_proof_locations(artifact_id: &str, content: &Value, scan: &mut PlaceholderScan) {
    let Some(blocks) = content.get("proof_blocks").and_then(Value::as_array) else {
        return;
    };
    for (i, block) in blocks.iter().enumerate() {
        if block.get("needs_source").and_then(Value::as_bool) == Some(true) {
            let claim = block.get("claim").and_then(Value::as_str).unwrap_or_default();
            scan.push(PlaceholderLocation {
                artifact_id: artifact_id.to_string(),
                deliverable: DeliverableId::LandingPage,
                field_path: format!("proof_blocks[{}].needs_source", i),
                matched_text: format!("source needed: {}", claim),
                is_critical: true,
            });
        }
    }
}
