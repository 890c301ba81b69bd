//! Terminal rendering for pipeline events, outcomes and readiness

use colored::Colorize;
use forge::pipeline::{DeliverableState, Evaluation, PipelineEvent, RunOutcome};
use forge::{Artifact, DeliverableId, ProjectStatus};

pub struct OutputHandler;

impl OutputHandler {
    pub fn new() -> Self {
        Self
    }

    /// Print a section header
    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", format!("▶ {}", text).bright_yellow().bold());
        println!("{}", "─".repeat(60).dimmed());
    }

    pub fn print_success(&self, text: &str) {
        println!("{} {}", "✓".bright_green(), text.bright_white());
    }

    pub fn print_error(&self, text: &str) {
        println!("{} {}", "✗".bright_red(), text.bright_red());
    }

    pub fn print_warning(&self, text: &str) {
        println!("{} {}", "⚠".bright_yellow(), text.yellow());
    }

    pub fn print_info(&self, text: &str) {
        println!("{} {}", "ℹ".bright_blue(), text);
    }

    /// One line per progress event
    pub fn print_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted {
                project_id,
                run_id,
                deliverables,
            } => {
                self.print_info(&format!(
                    "Run {} for {}: {} deliverable(s)",
                    run_id,
                    project_id,
                    deliverables.len()
                ));
            }
            PipelineEvent::BatchStarted {
                stage,
                deliverables,
            } => {
                let names: Vec<&str> = deliverables.iter().map(|d| d.display_name()).collect();
                println!(
                    "{} {}",
                    format!("Stage {}:", stage).bright_cyan(),
                    names.join(", ").dimmed()
                );
            }
            PipelineEvent::DeliverableState { deliverable, state } => {
                self.print_state(*deliverable, state);
            }
            PipelineEvent::Normalized {
                deliverable,
                changes,
            } => {
                println!(
                    "  {} {} normalization change(s)",
                    format!("{}:", deliverable.display_name()).dimmed(),
                    changes.len()
                );
            }
            PipelineEvent::RunFinished { status } => {
                println!("{} {}", "Finished:".bright_white(), status_colored(*status));
            }
            PipelineEvent::RunCancelled => self.print_warning("Run cancelled"),
        }
    }

    fn print_state(&self, deliverable: DeliverableId, state: &DeliverableState) {
        let name = deliverable.display_name();
        match state {
            DeliverableState::Pending => {}
            DeliverableState::Generating => println!("  {} {}", "…".dimmed(), name),
            DeliverableState::Validating { attempt, budget } if *attempt > 1 => {
                println!("  {} {} (attempt {}/{})", "↻".bright_blue(), name, attempt, budget)
            }
            DeliverableState::Validating { .. } => {}
            DeliverableState::Repairing { attempt, budget } => println!(
                "  {} {} repairing after attempt {}/{}",
                "⚙".bright_yellow(),
                name,
                attempt,
                budget
            ),
            DeliverableState::Complete { validated: true } => {
                println!("  {} {}", "✓".bright_green(), name)
            }
            DeliverableState::Complete { validated: false } => {
                println!("  {} {} (unvalidated)", "⚠".bright_yellow(), name)
            }
            DeliverableState::Error { message, errors } => {
                println!("  {} {}: {}", "✗".bright_red(), name, message.red());
                for error in errors {
                    println!("      {}", error.dimmed());
                }
            }
        }
    }

    pub fn print_outcome(&self, outcome: &RunOutcome) {
        self.print_header(&format!("Run {}", outcome.run_id));
        println!("  {} {}", "Status:".dimmed(), status_colored(outcome.status));
        if let Some(reason) = &outcome.blocked_reason {
            self.print_error(&format!("Preflight blocked: {}", reason));
        }
        for failure in outcome.failures() {
            self.print_error(&format!(
                "{} after {} attempt(s): {}",
                failure.deliverable.display_name(),
                failure.attempts,
                failure.message.as_deref().unwrap_or("invalid")
            ));
            for error in &failure.errors {
                println!("      {}", error.dimmed());
            }
        }
        if let Some(readiness) = &outcome.readiness {
            self.print_score(readiness.score, readiness.pass, &readiness.reason_messages());
        }
    }

    pub fn print_evaluation(&self, evaluation: &Evaluation) {
        self.print_score(
            evaluation.readiness.score,
            evaluation.readiness.pass,
            &evaluation.readiness.reason_messages(),
        );
        println!(
            "  {} {} found, {} critical, {} skipped",
            "Placeholders:".dimmed(),
            evaluation.scan.total_count,
            evaluation.scan.critical_count,
            evaluation.scan.skipped_count
        );
        for location in evaluation.scan.critical() {
            println!(
                "      {} {} {}",
                location.deliverable.display_name().dimmed(),
                location.field_path,
                location.matched_text.bright_red()
            );
        }
        if evaluation.missing_context_count > 0 {
            println!(
                "  {} {}",
                "Missing context:".dimmed(),
                evaluation.missing_context_count
            );
        }
    }

    fn print_score(&self, score: u32, pass: bool, reasons: &[String]) {
        let verdict = if pass {
            "PASS".bright_green().bold()
        } else {
            "BLOCKED".bright_red().bold()
        };
        println!("  {} {}/100 {}", "Readiness:".dimmed(), score, verdict);
        for reason in reasons {
            println!("      {}", reason.yellow());
        }
    }

    /// Artifact table for one run
    pub fn print_artifacts(&self, artifacts: &[(DeliverableId, Option<&Artifact>)]) {
        println!();
        println!(
            "{}",
            format!("{:<20} {:>8} {:>10} {:>8} {:>20}", "Deliverable", "Version", "Validated", "Edited", "Generated")
                .bright_white()
                .bold()
        );
        println!("{}", "─".repeat(70).dimmed());

        for (id, artifact) in artifacts {
            match artifact {
                Some(a) => println!(
                    "{:<20} {:>8} {:>10} {:>8} {:>20}",
                    id.as_str(),
                    a.version,
                    if a.validated {
                        "yes".bright_green()
                    } else {
                        "no".bright_red()
                    },
                    if a.edited_at.is_some() { "yes" } else { "" },
                    a.generated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
                ),
                None => println!("{:<20} {:>8}", id.as_str(), "-".dimmed()),
            }
        }
        println!();
    }
}

fn status_colored(status: ProjectStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        ProjectStatus::Ready => text.bright_green(),
        ProjectStatus::Review => text.bright_yellow(),
        ProjectStatus::Generating => text.bright_blue(),
        ProjectStatus::PreflightBlocked | ProjectStatus::Failed => text.bright_red(),
        ProjectStatus::Draft => text.normal(),
    }
}
