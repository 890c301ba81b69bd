//! Structural contracts for every deliverable
//!
//! A contract is static data: permitted fields per object scope, primitive
//! types, array bounds, id formats, orderings and id-derived fields. The
//! canonicalizer and the schema validator both walk these shapes.

use super::ids::IdPattern;
use super::{DeliverableId, Phase};

#[derive(Debug)]
pub enum Shape {
    /// Non-empty string
    Text,
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    Bool,
    Id(IdPattern),
    Enum(&'static [&'static str]),
    List(ListShape),
    Object(&'static ObjectShape),
}

#[derive(Debug)]
pub struct ListShape {
    pub items: &'static Shape,
    pub min: usize,
    pub max: usize,
    pub order: Option<SortKey>,
}

/// How an ordered collection is sorted
#[derive(Debug, Clone, Copy)]
pub enum SortKey {
    /// Items are objects; sort by the numeric part of an id field
    IdField(&'static str, IdPattern),
    /// Items are objects; sort by a numeric field
    NumberField(&'static str),
    /// Items are bare ids
    Id(IdPattern),
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
}

/// A field whose value is fully determined by another field of the same object
#[derive(Debug)]
pub struct Derived {
    pub field: &'static str,
    pub source: &'static str,
    pub derive: fn(&str) -> Option<&'static str>,
}

#[derive(Debug)]
pub struct ObjectShape {
    pub fields: &'static [Field],
    pub derived: &'static [Derived],
}

impl ObjectShape {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug)]
pub struct Contract {
    pub deliverable: DeliverableId,
    pub root: &'static ObjectShape,
    /// Deliverable-specific rules the shape alone does not express
    pub rules: &'static [&'static str],
}

impl Contract {
    /// Compact constraint summary for prompts: a JSON-like skeleton plus rules
    pub fn summary(&self) -> String {
        let mut out = String::new();
        describe_object(self.root, 0, &mut out);
        if !self.rules.is_empty() {
            out.push_str("\nRules:\n");
            for rule in self.rules {
                out.push_str("- ");
                out.push_str(rule);
                out.push('\n');
            }
        }
        out
    }
}

fn describe_object(shape: &ObjectShape, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth + 1);
    out.push_str("{\n");
    for field in shape.fields {
        out.push_str(&indent);
        out.push_str(&format!("\"{}\": ", field.name));
        describe_shape(&field.shape, depth + 1, out);
        if !field.required {
            out.push_str(" (optional)");
        }
        out.push('\n');
    }
    out.push_str(&"  ".repeat(depth));
    out.push('}');
}

fn describe_shape(shape: &Shape, depth: usize, out: &mut String) {
    match shape {
        Shape::Text => out.push_str("string (non-empty)"),
        Shape::Integer { min, max } => out.push_str(&format!("integer {}..={}", min, max)),
        Shape::Number { min, .. } => out.push_str(&format!("number >= {}", min)),
        Shape::Bool => out.push_str("boolean"),
        Shape::Id(pattern) => out.push_str(&format!("id ({})", pattern.describe())),
        Shape::Enum(values) => out.push_str(&format!("one of [{}]", values.join(", "))),
        Shape::List(list) => {
            if list.min == list.max {
                out.push_str(&format!("array of exactly {} x ", list.min));
            } else {
                out.push_str(&format!("array of {}-{} x ", list.min, list.max));
            }
            describe_shape(list.items, depth, out);
        }
        Shape::Object(object) => describe_object(object, depth, out),
    }
}

fn block_phase(block_id: &str) -> Option<&'static str> {
    let parsed = IdPattern::Block.parse(block_id)?;
    Phase::from_block_number(parsed.number).map(|p| p.as_str())
}

const MINUTES: Shape = Shape::Integer { min: 0, max: 600 };

static TEXT: Shape = Shape::Text;
static BLOCK_REF: Shape = Shape::Id(IdPattern::Block);

// preflight

static MISSING_CONTEXT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "field", shape: Shape::Text, required: true },
        Field { name: "question", shape: Shape::Text, required: true },
    ],
    derived: &[],
};
static MISSING_CONTEXT_ITEM: Shape = Shape::Object(&MISSING_CONTEXT);

static PREFLIGHT_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field {
            name: "status",
            shape: Shape::Enum(&["ready", "needs_review", "blocked"]),
            required: true,
        },
        Field { name: "summary", shape: Shape::Text, required: true },
        Field {
            name: "missing_context",
            shape: Shape::List(ListShape { items: &MISSING_CONTEXT_ITEM, min: 0, max: 8, order: None }),
            required: true,
        },
        Field { name: "blocking_reason", shape: Shape::Text, required: false },
    ],
    derived: &[],
};

pub static PREFLIGHT: Contract = Contract {
    deliverable: DeliverableId::Preflight,
    root: &PREFLIGHT_ROOT,
    rules: &[
        "Use status \"blocked\" only when the transcript cannot support a webinar at all, and explain why in blocking_reason.",
        "List every piece of context the operator still has to supply in missing_context.",
    ],
};

// webinar brief

static PRESENTER: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "name", shape: Shape::Text, required: true },
        Field { name: "credentials", shape: Shape::Text, required: true },
    ],
    derived: &[],
};

static OFFER: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "name", shape: Shape::Text, required: true },
        Field {
            name: "price_usd",
            shape: Shape::Number { min: 0.0, max: 1_000_000.0 },
            required: true,
        },
        Field { name: "link_placeholder", shape: Shape::Text, required: true },
    ],
    derived: &[],
};

static BRIEF_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "webinar_title", shape: Shape::Text, required: true },
        Field { name: "target_audience", shape: Shape::Text, required: true },
        Field { name: "core_promise", shape: Shape::Text, required: true },
        Field {
            name: "duration_minutes",
            shape: Shape::Integer { min: 15, max: 240 },
            required: true,
        },
        Field { name: "presenter", shape: Shape::Object(&PRESENTER), required: true },
        Field { name: "offer", shape: Shape::Object(&OFFER), required: true },
        Field {
            name: "key_themes",
            shape: Shape::List(ListShape { items: &TEXT, min: 2, max: 8, order: None }),
            required: true,
        },
    ],
    derived: &[],
};

pub static WEBINAR_BRIEF: Contract = Contract {
    deliverable: DeliverableId::WebinarBrief,
    root: &BRIEF_ROOT,
    rules: &["Keep offer.link_placeholder as a {{LINK}}-style token unless the transcript gives a real URL."],
};

// framework

static BLOCK: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "block_id", shape: Shape::Id(IdPattern::Block), required: true },
        Field {
            name: "phase",
            shape: Shape::Enum(&["beginning", "middle", "end"]),
            required: true,
        },
        Field { name: "title", shape: Shape::Text, required: true },
        Field { name: "objective", shape: Shape::Text, required: true },
        Field {
            name: "talking_points",
            shape: Shape::List(ListShape { items: &TEXT, min: 1, max: 6, order: None }),
            required: true,
        },
        Field { name: "duration_minutes", shape: MINUTES, required: true },
    ],
    derived: &[Derived { field: "phase", source: "block_id", derive: block_phase }],
};
static BLOCK_ITEM: Shape = Shape::Object(&BLOCK);

static FRAMEWORK_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "title", shape: Shape::Text, required: true },
        Field { name: "big_promise", shape: Shape::Text, required: true },
        Field { name: "total_minutes", shape: MINUTES, required: true },
        Field {
            name: "blocks",
            shape: Shape::List(ListShape {
                items: &BLOCK_ITEM,
                min: 21,
                max: 21,
                order: Some(SortKey::IdField("block_id", IdPattern::Block)),
            }),
            required: true,
        },
    ],
    derived: &[],
};

pub static FRAMEWORK: Contract = Contract {
    deliverable: DeliverableId::Framework,
    root: &FRAMEWORK_ROOT,
    rules: &[
        "Exactly 21 blocks, B01 through B21, each id used once.",
        "Phase is beginning for B01-B07, middle for B08-B14, end for B15-B21.",
        "Block durations should add up to the webinar length (within 15%).",
    ],
};

// landing page

static PROOF_BLOCK: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "proof_id", shape: Shape::Id(IdPattern::Proof), required: true },
        Field { name: "claim", shape: Shape::Text, required: true },
        Field { name: "needs_source", shape: Shape::Bool, required: true },
    ],
    derived: &[],
};
static PROOF_ITEM: Shape = Shape::Object(&PROOF_BLOCK);

static FAQ: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "question", shape: Shape::Text, required: true },
        Field { name: "answer", shape: Shape::Text, required: true },
    ],
    derived: &[],
};
static FAQ_ITEM: Shape = Shape::Object(&FAQ);

static LANDING_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "headline", shape: Shape::Text, required: true },
        Field { name: "subheadline", shape: Shape::Text, required: true },
        Field {
            name: "bullets",
            shape: Shape::List(ListShape { items: &TEXT, min: 2, max: 8, order: None }),
            required: true,
        },
        Field {
            name: "agenda_block_ids",
            shape: Shape::List(ListShape {
                items: &BLOCK_REF,
                min: 2,
                max: 8,
                order: Some(SortKey::Id(IdPattern::Block)),
            }),
            required: true,
        },
        Field {
            name: "proof_blocks",
            shape: Shape::List(ListShape {
                items: &PROOF_ITEM,
                min: 2,
                max: 8,
                order: Some(SortKey::IdField("proof_id", IdPattern::Proof)),
            }),
            required: true,
        },
        Field {
            name: "faq",
            shape: Shape::List(ListShape { items: &FAQ_ITEM, min: 2, max: 8, order: None }),
            required: true,
        },
        Field { name: "cta_text", shape: Shape::Text, required: true },
        Field { name: "link_placeholder", shape: Shape::Text, required: true },
    ],
    derived: &[],
};

pub static LANDING_PAGE: Contract = Contract {
    deliverable: DeliverableId::LandingPage,
    root: &LANDING_ROOT,
    rules: &[
        "agenda_block_ids must reference blocks that exist in the framework.",
        "Set needs_source to true for any proof claim the transcript does not back with a source.",
    ],
};

// email sequence

static EMAIL: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "email_id", shape: Shape::Id(IdPattern::Email), required: true },
        Field {
            name: "send_offset_days",
            shape: Shape::Integer { min: -30, max: 30 },
            required: true,
        },
        Field { name: "subject", shape: Shape::Text, required: true },
        Field { name: "preview_text", shape: Shape::Text, required: true },
        Field { name: "body", shape: Shape::Text, required: true },
        Field { name: "cta_text", shape: Shape::Text, required: true },
        Field { name: "link_placeholder", shape: Shape::Text, required: true },
        Field { name: "teaches_block_id", shape: Shape::Id(IdPattern::Block), required: false },
    ],
    derived: &[],
};
static EMAIL_ITEM: Shape = Shape::Object(&EMAIL);

static EMAIL_ROOT: ObjectShape = ObjectShape {
    fields: &[Field {
        name: "emails",
        shape: Shape::List(ListShape {
            items: &EMAIL_ITEM,
            min: 8,
            max: 10,
            order: Some(SortKey::IdField("email_id", IdPattern::Email)),
        }),
        required: true,
    }],
    derived: &[],
};

pub static EMAIL_SEQUENCE: Contract = Contract {
    deliverable: DeliverableId::EmailSequence,
    root: &EMAIL_ROOT,
    rules: &[
        "Between 8 and 10 emails with unique ids E01-E10.",
        "send_offset_days is relative to the live session and must not decrease from one email to the next.",
    ],
};

// social posts

static POST: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "post_id", shape: Shape::Id(IdPattern::Social), required: true },
        Field {
            name: "platform",
            shape: Shape::Enum(&["linkedin", "x", "facebook", "instagram"]),
            required: true,
        },
        Field { name: "copy", shape: Shape::Text, required: true },
        Field { name: "link_placeholder", shape: Shape::Text, required: true },
    ],
    derived: &[],
};
static POST_ITEM: Shape = Shape::Object(&POST);

macro_rules! post_list {
    () => {
        Shape::List(ListShape {
            items: &POST_ITEM,
            min: 2,
            max: 8,
            order: Some(SortKey::IdField("post_id", IdPattern::Social)),
        })
    };
}

static SOCIAL_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "promo_posts", shape: post_list!(), required: true },
        Field { name: "reminder_posts", shape: post_list!(), required: true },
        Field { name: "replay_posts", shape: post_list!(), required: true },
    ],
    derived: &[],
};

pub static SOCIAL_POSTS: Contract = Contract {
    deliverable: DeliverableId::SocialPosts,
    root: &SOCIAL_ROOT,
    rules: &[
        "Between 6 and 18 posts in total across the three categories.",
        "Post ids are unique across all categories.",
    ],
};

// run of show

static SEGMENT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "start_minute", shape: MINUTES, required: true },
        Field { name: "end_minute", shape: MINUTES, required: true },
        Field { name: "label", shape: Shape::Text, required: true },
        Field {
            name: "block_ids",
            shape: Shape::List(ListShape {
                items: &BLOCK_REF,
                min: 1,
                max: 21,
                order: Some(SortKey::Id(IdPattern::Block)),
            }),
            required: true,
        },
        Field { name: "host_notes", shape: Shape::Text, required: true },
    ],
    derived: &[],
};
static SEGMENT_ITEM: Shape = Shape::Object(&SEGMENT);

static RUN_OF_SHOW_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "total_minutes", shape: MINUTES, required: true },
        Field {
            name: "segments",
            shape: Shape::List(ListShape {
                items: &SEGMENT_ITEM,
                min: 2,
                max: 8,
                order: Some(SortKey::NumberField("start_minute")),
            }),
            required: true,
        },
    ],
    derived: &[],
};

pub static RUN_OF_SHOW: Contract = Contract {
    deliverable: DeliverableId::RunOfShow,
    root: &RUN_OF_SHOW_ROOT,
    rules: &[
        "Each segment starts before it ends and ends no later than total_minutes.",
        "Segments do not overlap.",
        "Every block id must exist in the framework.",
    ],
};

// checklists

static CHECK_ITEM: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "text", shape: Shape::Text, required: true },
        Field { name: "done", shape: Shape::Bool, required: true },
        Field { name: "email_ref", shape: Shape::Id(IdPattern::Email), required: false },
    ],
    derived: &[],
};
static CHECK_ITEM_ITEM: Shape = Shape::Object(&CHECK_ITEM);

static CHECKLIST: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "checklist_id", shape: Shape::Id(IdPattern::Checklist), required: true },
        Field {
            name: "category",
            shape: Shape::Enum(&["pre", "live", "post"]),
            required: true,
        },
        Field { name: "title", shape: Shape::Text, required: true },
        Field {
            name: "items",
            shape: Shape::List(ListShape { items: &CHECK_ITEM_ITEM, min: 2, max: 12, order: None }),
            required: true,
        },
    ],
    derived: &[],
};
static CHECKLIST_ITEM: Shape = Shape::Object(&CHECKLIST);

static CHECKLISTS_ROOT: ObjectShape = ObjectShape {
    fields: &[Field {
        name: "checklists",
        shape: Shape::List(ListShape {
            items: &CHECKLIST_ITEM,
            min: 2,
            max: 8,
            order: Some(SortKey::IdField("checklist_id", IdPattern::Checklist)),
        }),
        required: true,
    }],
    derived: &[],
};

pub static CHECKLISTS: Contract = Contract {
    deliverable: DeliverableId::Checklists,
    root: &CHECKLISTS_ROOT,
    rules: &[
        "The category inside checklist_id must match the category field.",
        "email_ref, when present, must name an email in the email sequence.",
    ],
};

// slide prompts

static SLIDE: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "block_id", shape: Shape::Id(IdPattern::Block), required: true },
        Field { name: "prompt", shape: Shape::Text, required: true },
        Field { name: "speaker_notes", shape: Shape::Text, required: true },
    ],
    derived: &[],
};
static SLIDE_ITEM: Shape = Shape::Object(&SLIDE);

static SLIDES_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "deck_title", shape: Shape::Text, required: true },
        Field { name: "visual_style", shape: Shape::Text, required: true },
        Field {
            name: "slides",
            shape: Shape::List(ListShape {
                items: &SLIDE_ITEM,
                min: 3,
                max: 30,
                order: Some(SortKey::IdField("block_id", IdPattern::Block)),
            }),
            required: true,
        },
    ],
    derived: &[],
};

pub static SLIDE_PROMPTS: Contract = Contract {
    deliverable: DeliverableId::SlidePrompts,
    root: &SLIDES_ROOT,
    rules: &["One slide per framework block at most; every block id must exist in the framework."],
};

// qa report

static PLACEHOLDER_SUMMARY: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "total_count", shape: Shape::Integer { min: 0, max: i64::MAX }, required: true },
        Field { name: "critical_count", shape: Shape::Integer { min: 0, max: i64::MAX }, required: true },
        Field { name: "skipped_count", shape: Shape::Integer { min: 0, max: i64::MAX }, required: true },
    ],
    derived: &[],
};

static CRITICAL_LOCATION: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "artifact_id", shape: Shape::Text, required: true },
        Field { name: "field_path", shape: Shape::Text, required: true },
        Field { name: "matched_text", shape: Shape::Text, required: true },
    ],
    derived: &[],
};
static CRITICAL_LOCATION_ITEM: Shape = Shape::Object(&CRITICAL_LOCATION);

static DELIVERABLE_STATUS: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "deliverable_id", shape: Shape::Text, required: true },
        Field { name: "present", shape: Shape::Bool, required: true },
        Field { name: "validated", shape: Shape::Bool, required: true },
    ],
    derived: &[],
};
static DELIVERABLE_STATUS_ITEM: Shape = Shape::Object(&DELIVERABLE_STATUS);

static QA_ROOT: ObjectShape = ObjectShape {
    fields: &[
        Field { name: "score", shape: Shape::Integer { min: 0, max: 100 }, required: true },
        Field { name: "pass", shape: Shape::Bool, required: true },
        Field {
            name: "blocking_reasons",
            shape: Shape::List(ListShape { items: &TEXT, min: 0, max: usize::MAX, order: None }),
            required: true,
        },
        Field {
            name: "missing_context_count",
            shape: Shape::Integer { min: 0, max: i64::MAX },
            required: true,
        },
        Field { name: "placeholders", shape: Shape::Object(&PLACEHOLDER_SUMMARY), required: true },
        Field {
            name: "critical_locations",
            shape: Shape::List(ListShape {
                items: &CRITICAL_LOCATION_ITEM,
                min: 0,
                max: usize::MAX,
                order: None,
            }),
            required: true,
        },
        Field {
            name: "deliverables",
            shape: Shape::List(ListShape {
                items: &DELIVERABLE_STATUS_ITEM,
                min: 8,
                max: 8,
                order: None,
            }),
            required: true,
        },
    ],
    derived: &[],
};

pub static QA_REPORT: Contract = Contract {
    deliverable: DeliverableId::QaReport,
    root: &QA_ROOT,
    rules: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_phase_derivation() {
        assert_eq!(block_phase("B01"), Some("beginning"));
        assert_eq!(block_phase("B8"), Some("middle"));
        assert_eq!(block_phase("B21"), Some("end"));
        assert_eq!(block_phase("B22"), None);
    }

    #[test]
    fn test_summary_mentions_bounds_and_rules() {
        let summary = FRAMEWORK.summary();
        assert!(summary.contains("array of exactly 21"));
        assert!(summary.contains("B01-B21"));
        assert!(summary.contains("Rules:"));
    }
}
