//! Template upgrade orchestration.
//!
//! Detection and planning run first and issue only read-only lookups. The
//! phase sequence then runs strictly in order; the first failing phase
//! aborts the run and nothing after it is issued. Earlier phases are not
//! undone.

use tracing::{debug, info};

use crate::detect::{detect_family, detect_version};
use crate::error::{QupError, Result};
use crate::output::Output;
use crate::plan::{UpgradePlan, build_plan, plan_version};
use crate::qvm::executor::Executor;
use crate::template::{Detected, Family, Template};

/// Options for a single run.
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Stop after printing the plan.
    pub dry_run: bool,
}

/// Detect, plan and upgrade one template.
///
/// Returns the plan that was executed, or only printed in dry-run mode.
pub fn run(
    template: &Template,
    options: &UpgradeOptions,
    executor: &dyn Executor,
    output: &dyn Output,
) -> Result<UpgradePlan> {
    executor.ensure_available()?;

    output.message("Determining template type and version...");
    let family = detect_family(executor, &template.name)?;
    if let Family::Unknown(id) = &family {
        return Err(QupError::UnsupportedFamily(id.clone()));
    }
    let version = detect_version(executor, &template.name)?;

    output.message(&format!("Template type: {}", family));
    output.message(&format!("Template version: {}", version));

    let detected = Detected { family, version };
    let step = plan_version(&detected)?;
    let plan = build_plan(template, &detected, step)?;

    output.plan(&plan);

    if options.dry_run {
        output.message("[DRY RUN] Upgrade plan generated. Nothing was changed.");
        return Ok(plan);
    }

    execute_plan(&plan, executor, output)?;
    output.completed(&plan);

    Ok(plan)
}

/// Execute every phase of a plan in order, stopping at the first failure.
pub fn execute_plan(
    plan: &UpgradePlan,
    executor: &dyn Executor,
    output: &dyn Output,
) -> Result<()> {
    let total = plan.phases.len();

    for (index, phase) in plan.phases.iter().enumerate() {
        info!(
            "Phase [{}/{}] {} on {}",
            index + 1,
            total,
            phase.kind,
            phase.invocation.vm()
        );
        output.phase_started(index, total, phase);

        if let Err(e) = executor.execute(&phase.invocation) {
            debug!("Phase {} failed, aborting remaining phases", phase.kind);
            output.phase_failed(phase);
            return Err(e);
        }

        output.phase_finished(phase);
    }

    Ok(())
}
