//! Presentation of upgrade progress.

use std::cell::RefCell;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::plan::{Phase, UpgradePlan};
use crate::qvm::command::Privilege;

/// Sink for user-facing progress, kept apart from orchestration.
pub trait Output {
    fn message(&self, text: &str);
    fn plan(&self, plan: &UpgradePlan);
    fn phase_started(&self, index: usize, total: usize, phase: &Phase);
    fn phase_finished(&self, phase: &Phase);
    fn phase_failed(&self, phase: &Phase);
    fn completed(&self, plan: &UpgradePlan);
}

/// Colored terminal output with a spinner while a phase runs.
#[derive(Default)]
pub struct ConsoleOutput {
    spinner: RefCell<Option<ProgressBar>>,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_spinner(&self) -> Option<ProgressBar> {
        self.spinner.borrow_mut().take()
    }
}

impl Output for ConsoleOutput {
    fn message(&self, text: &str) {
        println!("{}", text.white().bold());
    }

    fn plan(&self, plan: &UpgradePlan) {
        println!();
        println!(
            "{}",
            format!(
                "Upgrade Plan: {} ({} {} -> {})",
                plan.target_name, plan.family, plan.step.current, plan.step.target
            )
            .bold()
        );
        println!("{}", "=".repeat(60));
        if plan.source_name != plan.target_name {
            println!("  Original {} is left untouched.", plan.source_name.bold());
        }
        for (i, phase) in plan.phases.iter().enumerate() {
            let user = match phase.privilege() {
                Privilege::Root => format!(" {}", "[root]".yellow()),
                Privilege::Caller => String::new(),
            };
            println!(
                "  {}. {:<22}{}{}",
                i + 1,
                phase.kind.name(),
                phase.invocation.to_string().dimmed(),
                user
            );
        }
        println!();
    }

    fn phase_started(&self, index: usize, total: usize, phase: &Phase) {
        println!(
            "{}",
            format!("Phase [{}/{}]: {}", index + 1, total, phase.kind.name())
                .cyan()
                .bold()
        );
        let pb = create_spinner();
        pb.set_message(phase.message.clone());
        *self.spinner.borrow_mut() = Some(pb);
    }

    fn phase_finished(&self, phase: &Phase) {
        if let Some(pb) = self.take_spinner() {
            pb.finish_and_clear();
        }
        println!("  {} {}", "✓".green(), phase.message);
    }

    fn phase_failed(&self, phase: &Phase) {
        if let Some(pb) = self.take_spinner() {
            pb.finish_and_clear();
        }
        println!("  {} {}", "✗".red(), phase.message);
    }

    fn completed(&self, plan: &UpgradePlan) {
        println!();
        println!("{}", "=".repeat(60));
        println!(
            "{}",
            format!(
                "Upgrade to {} completed successfully for {}.",
                plan.step.target, plan.target_name
            )
            .green()
            .bold()
        );
        println!("{}", "=".repeat(60));
    }
}

/// Spinner for phases whose duration is unknown.
fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
