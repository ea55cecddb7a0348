//! Custom error types for qup.

use thiserror::Error;

/// Errors that can occur while upgrading a template.
#[derive(Error, Debug)]
pub enum QupError {
    #[error("{0}")]
    Detection(String),

    #[error("{0}")]
    Planning(String),

    #[error("{0}")]
    Validation(String),

    #[error("Command '{command}' failed: {stderr}")]
    Execution { command: String, stderr: String },

    #[error("Unsupported template type '{0}'. Use 'debian' or 'fedora'.")]
    UnsupportedFamily(String),

    #[error("{0} not found. This tool is intended to run in a Qubes OS environment (dom0).")]
    InterfaceUnavailable(String),
}

impl QupError {
    /// Create an execution error from a rendered command and its stderr.
    pub fn execution(command: impl Into<String>, stderr: impl AsRef<str>) -> Self {
        let stderr = stderr.as_ref().trim();
        QupError::Execution {
            command: command.into(),
            stderr: if stderr.is_empty() {
                "exited with non-zero status".to_string()
            } else {
                stderr.to_string()
            },
        }
    }

    /// Hint printed below the error message, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            QupError::Detection(_) => {
                Some("The template may have reached end-of-life and lost its release metadata.")
            }
            QupError::UnsupportedFamily(_) => Some("Run with --help for usage."),
            QupError::Execution { .. } => Some(
                "No rollback was attempted. The template may be left partially upgraded.",
            ),
            _ => None,
        }
    }
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, QupError>;
