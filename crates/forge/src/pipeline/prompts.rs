//! Generation prompts per deliverable

use crate::catalog::{kind, DeliverableId};
use crate::store::Transcript;
use crate::validate::{DependencyArtifacts, TargetConstraints};

fn task(deliverable: DeliverableId) -> &'static str {
    match deliverable {
        DeliverableId::Preflight => {
            "Decide whether the transcripts contain enough context to produce a complete webinar. \
             List every missing piece of context as a question for the operator."
        }
        DeliverableId::WebinarBrief => {
            "Normalize the inputs into a webinar brief: title, audience, core promise, length, presenter and offer."
        }
        DeliverableId::Framework => {
            "Outline the webinar as exactly 21 teaching blocks split across the beginning, middle and end phases."
        }
        DeliverableId::LandingPage => {
            "Write the registration landing page. The agenda must point at framework blocks."
        }
        DeliverableId::EmailSequence => {
            "Write the promotion, reminder and replay email sequence, ordered by send day relative to the live session."
        }
        DeliverableId::SocialPosts => {
            "Write promotion, reminder and replay social posts for the listed platforms."
        }
        DeliverableId::RunOfShow => {
            "Build the minute-by-minute run of show covering the framework blocks, with coaching notes for the host."
        }
        DeliverableId::Checklists => {
            "Build the pre, live and post production checklists. Reference emails by id where a task depends on one."
        }
        DeliverableId::SlidePrompts => {
            "Write one image-generation prompt per slide, keyed to framework blocks, with speaker notes."
        }
        DeliverableId::QaReport => "",
    }
}

pub fn system_prompt(deliverable: DeliverableId) -> String {
    format!(
        r#"You are a webinar production specialist producing the {} deliverable.

{}

Respond with a single JSON object and nothing else. It must satisfy this contract exactly:
{}

Use only the fields listed. Ids use the exact zero-padded formats shown. Where a real URL is not known, write a {{{{LINK}}}}-style token in link fields rather than inventing one."#,
        deliverable.display_name(),
        task(deliverable),
        kind(deliverable).contract().summary()
    )
}

pub fn user_prompt(
    deliverable: DeliverableId,
    transcript: &Transcript,
    dependencies: &DependencyArtifacts,
    constraints: &TargetConstraints,
) -> String {
    let mut prompt = format!(
        "**Build transcript:**\n{}\n",
        transcript.build_transcript.trim()
    );
    if let Some(intake) = transcript.intake_transcript.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!("\n**Intake transcript:**\n{}\n", intake.trim()));
    }
    if let Some(notes) = transcript.operator_notes.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!("\n**Operator notes:**\n{}\n", notes.trim()));
    }
    if let Some(minutes) = constraints.target_duration_minutes {
        prompt.push_str(&format!("\n**Target length:** {} minutes\n", minutes));
    }

    for dep in deliverable.dependencies() {
        match dependencies.get(dep) {
            Some(artifact) => {
                let body = serde_json::to_string_pretty(&artifact.content).unwrap_or_default();
                prompt.push_str(&format!(
                    "\n**{} ({}):**\n{}\n",
                    dep.display_name(),
                    if artifact.validated { "validated" } else { "unvalidated" },
                    body
                ));
            }
            None => {
                prompt.push_str(&format!("\n**{}:** not available\n", dep.display_name()));
            }
        }
    }

    prompt.push_str(&format!(
        "\nProduce the {} JSON object now.",
        deliverable.display_name()
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::DependencyArtifact;
    use serde_json::json;

    #[test]
    fn test_system_prompt_embeds_contract() {
        let prompt = system_prompt(DeliverableId::Framework);
        assert!(prompt.contains("Framework deliverable"));
        assert!(prompt.contains("array of exactly 21"));
        assert!(prompt.contains("{{LINK}}"));
    }

    #[test]
    fn test_user_prompt_lists_upstream_artifacts() {
        let transcript = Transcript {
            build_transcript: "We teach founders to price.".to_string(),
            intake_transcript: None,
            operator_notes: Some("Keep it under an hour".to_string()),
        };
        let deps = DependencyArtifacts::from([(
            DeliverableId::Framework,
            DependencyArtifact {
                content: json!({"title": "Pricing"}),
                validated: true,
            },
        )]);
        let prompt = user_prompt(
            DeliverableId::RunOfShow,
            &transcript,
            &deps,
            &TargetConstraints {
                target_duration_minutes: Some(60),
            },
        );
        assert!(prompt.contains("**Operator notes:**"));
        assert!(prompt.contains("**Target length:** 60 minutes"));
        assert!(prompt.contains("**Framework (validated):**"));
        assert!(!prompt.contains("Intake transcript"));
    }
}
