//! Execution of management-interface invocations.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::command::{Invocation, shell_quote};
use crate::error::{QupError, Result};

/// Tool whose presence marks a host with the management interface.
pub const INTERFACE_TOOL: &str = "qvm-ls";

/// The only seam through which the upgrade touches the management interface.
pub trait Executor {
    /// Check once that the management interface exists on this host.
    fn ensure_available(&self) -> Result<()>;

    /// Execute an invocation and block until it finishes.
    ///
    /// Returns trimmed stdout for capturing invocations and an empty
    /// string otherwise. A non-zero exit becomes `QupError::Execution`
    /// carrying the captured stderr.
    fn execute(&self, invocation: &Invocation) -> Result<String>;
}

/// Executor that spawns the `qvm-*` tools directly.
#[derive(Debug, Default)]
pub struct QvmExecutor;

impl QvmExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for QvmExecutor {
    fn ensure_available(&self) -> Result<()> {
        let path = std::env::var_os("PATH").unwrap_or_default();
        match find_in_path(INTERFACE_TOOL, &path) {
            Some(found) => {
                debug!("Found {} at {}", INTERFACE_TOOL, found.display());
                Ok(())
            }
            None => Err(QupError::InterfaceUnavailable(INTERFACE_TOOL.to_string())),
        }
    }

    fn execute(&self, invocation: &Invocation) -> Result<String> {
        let (program, args) = invocation.argv();
        run_program(program, &args, invocation.captures_output())
    }
}

/// Spawn a program with explicit arguments and wait for it.
///
/// Returns trimmed stdout when `capture` is set and an empty string
/// otherwise. A non-zero exit carries the captured stderr.
pub fn run_program(program: &str, args: &[String], capture: bool) -> Result<String> {
    let rendered = std::iter::once(program.to_string())
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ");
    debug!("Executing: {}", rendered);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| QupError::execution(&rendered, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} exited with {}", program, output.status);
        return Err(QupError::execution(rendered, stderr));
    }

    if capture {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Ok(String::new())
    }
}

/// Locate an executable file named `program` in a `PATH`-style list.
pub fn find_in_path(program: &str, path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
