//! Deliverable catalog
//!
//! The fixed set of deliverables a run produces, ordered by production stage:
//! 1. Preflight - readiness of the input context
//! 2. Webinar Brief - normalized inputs
//! 3. Framework - the 21-block outline
//! 4. Landing Page, Email Sequence, Social Posts
//! 5. Run of Show, Checklists, Slide Prompts
//! 6. QA Report - internal aggregate, computed locally

pub mod contracts;
pub mod ids;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonicalize::{self, Canonicalized};
use crate::validate::{self, crosslink, DependencyArtifacts, TargetConstraints, ValidationResult};
use crate::ForgeError;

pub use contracts::{Contract, Derived, Field, ListShape, ObjectShape, Shape, SortKey};
pub use ids::IdPattern;

/// Deliverable identifiers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableId {
    Preflight,
    WebinarBrief,
    Framework,
    LandingPage,
    EmailSequence,
    SocialPosts,
    RunOfShow,
    Checklists,
    SlidePrompts,
    QaReport,
}

impl DeliverableId {
    /// Every deliverable, in production order
    pub const ALL: [DeliverableId; 10] = [
        DeliverableId::Preflight,
        DeliverableId::WebinarBrief,
        DeliverableId::Framework,
        DeliverableId::LandingPage,
        DeliverableId::EmailSequence,
        DeliverableId::SocialPosts,
        DeliverableId::RunOfShow,
        DeliverableId::Checklists,
        DeliverableId::SlidePrompts,
        DeliverableId::QaReport,
    ];

    /// The eight content deliverables that gate readiness
    pub const CONTENT: [DeliverableId; 8] = [
        DeliverableId::WebinarBrief,
        DeliverableId::Framework,
        DeliverableId::LandingPage,
        DeliverableId::EmailSequence,
        DeliverableId::SocialPosts,
        DeliverableId::RunOfShow,
        DeliverableId::Checklists,
        DeliverableId::SlidePrompts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliverableId::Preflight => "preflight",
            DeliverableId::WebinarBrief => "webinar_brief",
            DeliverableId::Framework => "framework",
            DeliverableId::LandingPage => "landing_page",
            DeliverableId::EmailSequence => "email_sequence",
            DeliverableId::SocialPosts => "social_posts",
            DeliverableId::RunOfShow => "run_of_show",
            DeliverableId::Checklists => "checklists",
            DeliverableId::SlidePrompts => "slide_prompts",
            DeliverableId::QaReport => "qa_report",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DeliverableId::Preflight => "Preflight Check",
            DeliverableId::WebinarBrief => "Webinar Brief",
            DeliverableId::Framework => "Framework",
            DeliverableId::LandingPage => "Landing Page",
            DeliverableId::EmailSequence => "Email Sequence",
            DeliverableId::SocialPosts => "Social Posts",
            DeliverableId::RunOfShow => "Run of Show",
            DeliverableId::Checklists => "Checklists",
            DeliverableId::SlidePrompts => "Slide Prompts",
            DeliverableId::QaReport => "QA Report",
        }
    }

    /// Direct upstream dependencies in the stage graph
    pub fn dependencies(&self) -> &'static [DeliverableId] {
        use DeliverableId::*;
        match self {
            Preflight => &[],
            WebinarBrief => &[Preflight],
            Framework => &[WebinarBrief],
            LandingPage | EmailSequence | SocialPosts => &[Framework, WebinarBrief],
            RunOfShow => &[Framework],
            Checklists => &[Framework, EmailSequence],
            SlidePrompts => &[Framework, LandingPage],
            QaReport => &[
                Preflight,
                WebinarBrief,
                Framework,
                LandingPage,
                EmailSequence,
                SocialPosts,
                RunOfShow,
                Checklists,
                SlidePrompts,
            ],
        }
    }

    /// Production stage, 1-6. Every dependency sits in an earlier stage.
    pub fn stage(&self) -> u32 {
        use DeliverableId::*;
        match self {
            Preflight => 1,
            WebinarBrief => 2,
            Framework => 3,
            LandingPage | EmailSequence | SocialPosts => 4,
            RunOfShow | Checklists | SlidePrompts => 5,
            QaReport => 6,
        }
    }

    pub fn is_content(&self) -> bool {
        !matches!(self, DeliverableId::Preflight | DeliverableId::QaReport)
    }

    /// Whether the deliverable leaves the system in a client-facing export
    pub fn is_exportable(&self) -> bool {
        self.is_content()
    }

    /// Whether the artifact is produced by the model (the QA report is computed)
    pub fn is_generated(&self) -> bool {
        *self != DeliverableId::QaReport
    }

    /// Validation rounds the repair loop may spend on this deliverable
    pub fn repair_budget(&self) -> u32 {
        match self {
            DeliverableId::Framework
            | DeliverableId::EmailSequence
            | DeliverableId::SocialPosts
            | DeliverableId::RunOfShow => 3,
            _ => 2,
        }
    }
}

impl std::fmt::Display for DeliverableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliverableId {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliverableId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| ForgeError::UnknownDeliverable(s.to_string()))
    }
}

/// Framework phase, derived from the block number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Beginning,
    Middle,
    End,
}

impl Phase {
    pub fn from_block_number(number: u32) -> Option<Phase> {
        match number {
            1..=7 => Some(Phase::Beginning),
            8..=14 => Some(Phase::Middle),
            15..=21 => Some(Phase::End),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Beginning => "beginning",
            Phase::Middle => "middle",
            Phase::End => "end",
        }
    }
}

/// Polymorphic view of one deliverable: its contract plus the three
/// validation-side behaviors. Selected statically through [`kind`].
pub trait DeliverableKind: Send + Sync {
    fn id(&self) -> DeliverableId;

    fn contract(&self) -> &'static Contract;

    fn canonicalize(&self, value: Value) -> Canonicalized {
        canonicalize::canonicalize(self.contract(), value)
    }

    fn validate_schema(&self, content: &Value) -> ValidationResult {
        validate::schema::validate_against(self.contract(), content)
    }

    fn validate_crosslinks(
        &self,
        content: &Value,
        dependencies: &DependencyArtifacts,
        constraints: &TargetConstraints,
    ) -> ValidationResult;
}

macro_rules! deliverable_kind {
    ($kind:ident, $id:ident, $contract:expr, $crosslinks:path) => {
        struct $kind;

        impl DeliverableKind for $kind {
            fn id(&self) -> DeliverableId {
                DeliverableId::$id
            }

            fn contract(&self) -> &'static Contract {
                &$contract
            }

            fn validate_crosslinks(
                &self,
                content: &Value,
                dependencies: &DependencyArtifacts,
                constraints: &TargetConstraints,
            ) -> ValidationResult {
                $crosslinks(content, dependencies, constraints)
            }
        }
    };
}

deliverable_kind!(PreflightKind, Preflight, contracts::PREFLIGHT, crosslink::no_crosslinks);
deliverable_kind!(BriefKind, WebinarBrief, contracts::WEBINAR_BRIEF, crosslink::no_crosslinks);
deliverable_kind!(FrameworkKind, Framework, contracts::FRAMEWORK, crosslink::framework);
deliverable_kind!(LandingKind, LandingPage, contracts::LANDING_PAGE, crosslink::landing_page);
deliverable_kind!(EmailKind, EmailSequence, contracts::EMAIL_SEQUENCE, crosslink::email_sequence);
deliverable_kind!(SocialKind, SocialPosts, contracts::SOCIAL_POSTS, crosslink::social_posts);
deliverable_kind!(RunOfShowKind, RunOfShow, contracts::RUN_OF_SHOW, crosslink::run_of_show);
deliverable_kind!(ChecklistKind, Checklists, contracts::CHECKLISTS, crosslink::checklists);
deliverable_kind!(SlideKind, SlidePrompts, contracts::SLIDE_PROMPTS, crosslink::slide_prompts);
deliverable_kind!(QaReportKind, QaReport, contracts::QA_REPORT, crosslink::no_crosslinks);

/// Look up the registered kind for a deliverable
pub fn kind(id: DeliverableId) -> &'static dyn DeliverableKind {
    match id {
        DeliverableId::Preflight => &PreflightKind,
        DeliverableId::WebinarBrief => &BriefKind,
        DeliverableId::Framework => &FrameworkKind,
        DeliverableId::LandingPage => &LandingKind,
        DeliverableId::EmailSequence => &EmailKind,
        DeliverableId::SocialPosts => &SocialKind,
        DeliverableId::RunOfShow => &RunOfShowKind,
        DeliverableId::Checklists => &ChecklistKind,
        DeliverableId::SlidePrompts => &SlideKind,
        DeliverableId::QaReport => &QaReportKind,
    }
}
