//! qup - Qubes OS template upgrade CLI tool.
//!
//! Upgrades Debian and Fedora templates to their next release:
//! - OS family and version detection with layered fallbacks
//! - Successor version planning
//! - Fail-fast phase execution, optionally against a clone

mod config;
mod detect;
mod error;
mod output;
mod plan;
mod qvm;
mod template;
#[cfg(test)]
mod testing;
mod upgrade;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::debug;

use config::{Args, Config};
use error::QupError;
use output::{ConsoleOutput, Output};
use qvm::executor::{Executor, QvmExecutor};
use template::Template;
use upgrade::UpgradeOptions;

fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::from_args(args);

    // Initialize logging
    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    debug!("Starting qup - Qubes OS Template Upgrade Tool");

    match run(&config, &QvmExecutor::new(), &ConsoleOutput::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e),
    }
}

/// Main application logic.
fn run(config: &Config, executor: &dyn Executor, output: &dyn Output) -> error::Result<()> {
    let template = Template::new(
        &config.template,
        config.clone,
        config.new_template.as_deref(),
    )?;

    if !template.clone_requested && template.new_name.is_some() {
        debug!("--new-template given without --clone, ignoring it");
    }

    let options = UpgradeOptions {
        dry_run: config.dry_run,
    };
    upgrade::run(&template, &options, executor, output)?;

    Ok(())
}

/// Report a failure once. Every failure kind exits with status 1.
fn report_failure(err: &QupError) -> ExitCode {
    debug!("Run failed: {:?}", err);
    eprintln!("{} {}", "Error:".red().bold(), err);
    if let Some(hint) = err.hint() {
        eprintln!("{} {}", "Hint:".yellow(), hint);
    }
    ExitCode::FAILURE
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
