//! Shared test fixtures and a scripted model client

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::DeliverableId;
use crate::config::PipelineConfig;
use crate::model::{CallOptions, ModelClient, ModelError};
use crate::pipeline::Pipeline;
use crate::queue::GenerationQueue;
use crate::store::{MemoryStore, Project, ProjectStore, Transcript};

pub mod fixtures {
    use serde_json::{json, Value};

    use crate::catalog::{DeliverableId, Phase};

    const REGISTER_URL: &str = "https://events.example.com/pricing-masterclass";
    const OFFER_URL: &str = "https://shop.example.com/pricing-accelerator";

    /// Schema-valid, canonical, crosslink-clean and placeholder-free content
    pub fn valid(deliverable: DeliverableId) -> Value {
        match deliverable {
            DeliverableId::Preflight => preflight(),
            DeliverableId::WebinarBrief => webinar_brief(),
            DeliverableId::Framework => framework(),
            DeliverableId::LandingPage => landing_page(),
            DeliverableId::EmailSequence => email_sequence(),
            DeliverableId::SocialPosts => social_posts(),
            DeliverableId::RunOfShow => run_of_show(),
            DeliverableId::Checklists => checklists(),
            DeliverableId::SlidePrompts => slide_prompts(),
            DeliverableId::QaReport => qa_report(),
        }
    }

    pub fn preflight() -> Value {
        json!({
            "status": "ready",
            "summary": "The build transcript covers audience, offer and teaching content.",
            "missing_context": [],
        })
    }

    pub fn blocked_preflight() -> Value {
        json!({
            "status": "blocked",
            "summary": "The transcript never describes what the webinar teaches.",
            "missing_context": [
                {"field": "topic", "question": "What will attendees learn?"},
                {"field": "offer", "question": "What is sold at the end?"}
            ],
            "blocking_reason": "No teaching content in the transcript",
        })
    }

    pub fn webinar_brief() -> Value {
        json!({
            "webinar_title": "Price With Confidence",
            "target_audience": "Independent consultants billing hourly",
            "core_promise": "Move from hourly billing to value-based packages in 30 days",
            "duration_minutes": 60,
            "presenter": {
                "name": "Dana Reyes",
                "credentials": "Ran pricing for 200+ consulting practices"
            },
            "offer": {
                "name": "Pricing Accelerator",
                "price_usd": 497,
                "link_placeholder": OFFER_URL
            },
            "key_themes": ["Value conversations", "Package design", "Raising rates"],
        })
    }

    pub fn framework() -> Value {
        let blocks: Vec<Value> = (1..=21u32)
            .map(|n| {
                let phase = Phase::from_block_number(n).map(|p| p.as_str()).unwrap_or("end");
                json!({
                    "block_id": format!("B{:02}", n),
                    "phase": phase,
                    "title": format!("Block {}", n),
                    "objective": format!("Attendees can apply idea {}", n),
                    "talking_points": [format!("Point {}a", n), format!("Point {}b", n)],
                    "duration_minutes": 3,
                })
            })
            .collect();
        json!({
            "title": "Price With Confidence",
            "big_promise": "Value-based packages in 30 days",
            "total_minutes": 60,
            "blocks": blocks,
        })
    }

    pub fn landing_page() -> Value {
        json!({
            "headline": "Stop Trading Hours for Dollars",
            "subheadline": "A 60-minute live workshop for independent consultants",
            "bullets": [
                "Run a value conversation",
                "Design three-tier packages",
                "Raise rates without losing clients"
            ],
            "agenda_block_ids": ["B01", "B08", "B15"],
            "proof_blocks": [
                {"proof_id": "P01", "claim": "200+ practices repriced", "needs_source": false},
                {"proof_id": "P02", "claim": "Average fee up 38%", "needs_source": false}
            ],
            "faq": [
                {"question": "Is there a replay?", "answer": "Yes, for 72 hours."},
                {"question": "Who is this for?", "answer": "Solo consultants and small firms."}
            ],
            "cta_text": "Save my seat",
            "link_placeholder": REGISTER_URL,
        })
    }

    pub fn email_sequence() -> Value {
        let plan: [(i64, Option<&str>); 8] = [
            (-7, None),
            (-5, Some("B03")),
            (-3, Some("B09")),
            (-1, None),
            (0, None),
            (0, Some("B16")),
            (1, None),
            (3, None),
        ];
        let emails: Vec<Value> = plan
            .iter()
            .enumerate()
            .map(|(i, (offset, teaches))| {
                let mut email = json!({
                    "email_id": format!("E{:02}", i + 1),
                    "send_offset_days": offset,
                    "subject": format!("Pricing workshop note {}", i + 1),
                    "preview_text": "A short idea you can use this week",
                    "body": "Here is one change that lifts your fees.",
                    "cta_text": "Join the workshop",
                    "link_placeholder": REGISTER_URL,
                });
                if let Some(block) = teaches {
                    email["teaches_block_id"] = json!(block);
                }
                email
            })
            .collect();
        json!({ "emails": emails })
    }

    pub fn social_posts() -> Value {
        let post = |id: &str, platform: &str, copy: &str| {
            json!({
                "post_id": id,
                "platform": platform,
                "copy": copy,
                "link_placeholder": REGISTER_URL,
            })
        };
        json!({
            "promo_posts": [
                post("S01", "linkedin", "Hourly billing caps your income. Join us live."),
                post("S02", "x", "Free workshop on value pricing next week.")
            ],
            "reminder_posts": [
                post("S03", "linkedin", "Tomorrow: price with confidence."),
                post("S04", "facebook", "Starting in one hour.")
            ],
            "replay_posts": [
                post("S05", "linkedin", "Missed it? The replay is up for 72 hours."),
                post("S06", "instagram", "Replay closes tonight.")
            ],
        })
    }

    pub fn run_of_show() -> Value {
        let blocks = |from: u32, to: u32| -> Vec<String> {
            (from..=to).map(|n| format!("B{:02}", n)).collect()
        };
        json!({
            "total_minutes": 60,
            "segments": [
                {"start_minute": 0, "end_minute": 15, "label": "Opening",
                 "block_ids": blocks(1, 7), "host_notes": "Welcome people as they join"},
                {"start_minute": 15, "end_minute": 45, "label": "Teaching",
                 "block_ids": blocks(8, 14), "host_notes": "Pause for questions at minute 30"},
                {"start_minute": 45, "end_minute": 60, "label": "Offer and close",
                 "block_ids": blocks(15, 21), "host_notes": "Read the bonus deadline twice"}
            ],
        })
    }

    pub fn checklists() -> Value {
        json!({
            "checklists": [
                {"checklist_id": "CL_PRE_01", "category": "pre", "title": "Before the session",
                 "items": [
                     {"text": "Schedule the first invitation", "done": false, "email_ref": "E01"},
                     {"text": "Test audio and slides", "done": false}
                 ]},
                {"checklist_id": "CL_LIVE_01", "category": "live", "title": "During the session",
                 "items": [
                     {"text": "Start the recording", "done": false},
                     {"text": "Post the offer in chat", "done": false}
                 ]},
                {"checklist_id": "CL_POST_01", "category": "post", "title": "After the session",
                 "items": [
                     {"text": "Send the replay email", "done": false, "email_ref": "E07"},
                     {"text": "Export attendee questions", "done": false}
                 ]}
            ],
        })
    }

    pub fn slide_prompts() -> Value {
        json!({
            "deck_title": "Price With Confidence",
            "visual_style": "Warm flat illustration, navy and amber",
            "slides": [
                {"block_id": "B01", "prompt": "A consultant staring at a stopwatch",
                 "speaker_notes": "Open with the hourly trap"},
                {"block_id": "B08", "prompt": "Three gift boxes of rising size",
                 "speaker_notes": "Introduce the three tiers"},
                {"block_id": "B15", "prompt": "A staircase climbing into sunlight",
                 "speaker_notes": "Transition into the offer"}
            ],
        })
    }

    pub fn qa_report() -> Value {
        let deliverables: Vec<Value> = DeliverableId::CONTENT
            .iter()
            .map(|id| json!({"deliverable_id": id.as_str(), "present": true, "validated": true}))
            .collect();
        json!({
            "score": 100,
            "pass": true,
            "blocking_reasons": [],
            "missing_context_count": 0,
            "placeholders": {"total_count": 0, "critical_count": 0, "skipped_count": 0},
            "critical_locations": [],
            "deliverables": deliverables,
        })
    }
}

/// Model client answering from scripts, falling back to valid fixtures.
/// Counts calls per deliverable via `CallOptions::deliverable`.
#[derive(Default)]
pub struct ScriptedModel {
    scripted: Mutex<HashMap<DeliverableId, VecDeque<Result<String, ModelError>>>>,
    fixed: Mutex<HashMap<DeliverableId, String>>,
    calls: Mutex<HashMap<DeliverableId, usize>>,
    user_prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one-off responses, consumed before any fixed response
    pub fn script(&self, deliverable: DeliverableId, responses: Vec<Result<String, ModelError>>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(deliverable)
            .or_default()
            .extend(responses);
    }

    /// Answer every call for `deliverable` with `response`
    pub fn always(&self, deliverable: DeliverableId, response: impl Into<String>) {
        self.fixed.lock().unwrap().insert(deliverable, response.into());
    }

    pub fn calls(&self, deliverable: DeliverableId) -> usize {
        self.calls.lock().unwrap().get(&deliverable).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.user_prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, _system: &str, user: &str, options: &CallOptions) -> Result<String, ModelError> {
        self.user_prompts.lock().unwrap().push(user.to_string());
        let Some(deliverable) = options.deliverable else {
            return Ok("{}".to_string());
        };
        *self.calls.lock().unwrap().entry(deliverable).or_default() += 1;

        if let Some(response) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&deliverable)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        if let Some(response) = self.fixed.lock().unwrap().get(&deliverable) {
            return Ok(response.clone());
        }

        let body = serde_json::to_string_pretty(&fixtures::valid(deliverable)).unwrap();
        Ok(format!("Here is the {}:\n```json\n{}\n```", deliverable.display_name(), body))
    }
}

pub const PROJECT: &str = "proj-1";
pub const RUN: &str = "run-1";

pub fn transcript() -> Transcript {
    Transcript {
        build_transcript: "Dana walks through how independent consultants move from hourly billing \
            to value-based packages. She covers value conversations, three-tier package design, \
            anchoring, handling objections, and raising rates with existing clients. The workshop \
            runs sixty minutes and closes with the Pricing Accelerator offer at 497 dollars. \
            Attendees are solo consultants and small firms who feel underpaid and overworked. \
            Proof points include two hundred repriced practices and an average fee increase of \
            thirty eight percent across the last cohort."
            .to_string(),
        intake_transcript: None,
        operator_notes: None,
    }
}

pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .create_project(Project::new(PROJECT, "Pricing Masterclass"), transcript())
        .await
        .unwrap();
    store
}

pub fn pipeline(store: Arc<MemoryStore>, model: Arc<ScriptedModel>) -> Pipeline {
    let config = PipelineConfig::default();
    let queue = GenerationQueue::new(model, config.concurrency_limit, Duration::from_secs(5));
    Pipeline::new(store.clone(), store, queue, config, CallOptions::default())
}
