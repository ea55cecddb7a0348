//! Template OS family and version detection.
//!
//! Every lookup is read-only: a `qvm-features` lookup or a captured,
//! unprivileged file read inside the template. Lookups are tried in a fixed
//! order and the first usable answer wins, so templates with stale or
//! missing feature metadata can still be identified.

use tracing::debug;

use crate::error::{QupError, Result};
use crate::qvm::command::{GuestCommand, Invocation};
use crate::qvm::executor::Executor;
use crate::template::Family;

const OS_RELEASE: &str = "/etc/os-release";
const FEDORA_RELEASE: &str = "/etc/fedora-release";
const DEBIAN_VERSION: &str = "/etc/debian_version";

/// Value some lookups report instead of an empty answer.
const UNKNOWN: &str = "unknown";

/// How a lookup's raw output becomes a value.
#[derive(Debug, Clone, Copy)]
enum Extract {
    Trimmed,
    /// Value of the first `KEY=` line, quotes removed.
    Field(&'static str),
    /// First run of ASCII digits.
    FirstNumber,
}

/// A single detection lookup.
struct Lookup {
    invocation: Invocation,
    extract: Extract,
}

impl Lookup {
    fn feature(vm: &str, key: &str) -> Self {
        Self {
            invocation: Invocation::feature(vm, key),
            extract: Extract::Trimmed,
        }
    }

    fn file(vm: &str, path: &str, extract: Extract) -> Self {
        Self {
            invocation: Invocation::guest_read(vm, GuestCommand::new(["cat", path])),
            extract,
        }
    }

    /// Run the lookup. Failures and placeholder answers both yield `None`.
    fn run(&self, executor: &dyn Executor) -> Option<String> {
        let raw = match executor.execute(&self.invocation) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Lookup '{}' failed: {}", self.invocation, e);
                return None;
            }
        };

        let value = match self.extract {
            Extract::Trimmed => Some(raw.trim().to_string()),
            Extract::Field(key) => field_value(&raw, key),
            Extract::FirstNumber => first_number(&raw),
        }?;

        if value.is_empty() || value.eq_ignore_ascii_case(UNKNOWN) {
            debug!("Lookup '{}' returned nothing usable", self.invocation);
            return None;
        }
        Some(value)
    }
}

fn first_answer(executor: &dyn Executor, lookups: &[Lookup]) -> Option<String> {
    lookups.iter().find_map(|lookup| lookup.run(executor))
}

/// Determine the template's OS family.
///
/// Reads the `os-distribution` feature, falling back to the `ID=` field of
/// `/etc/os-release`.
pub fn detect_family(executor: &dyn Executor, vm: &str) -> Result<Family> {
    let lookups = [
        Lookup::feature(vm, "os-distribution"),
        Lookup::file(vm, OS_RELEASE, Extract::Field("ID")),
    ];

    let id = first_answer(executor, &lookups).ok_or_else(|| {
        QupError::Detection(format!(
            "Could not determine template type for {}. It might be EOL.",
            vm
        ))
    })?;

    debug!("Detected distribution '{}' for {}", id, vm);
    Ok(Family::parse(&id))
}

/// Determine the template's current version token.
///
/// Tries the `os-version` feature, the first number in
/// `/etc/fedora-release`, `VERSION_CODENAME=` from `/etc/os-release` and
/// finally the raw contents of `/etc/debian_version`.
pub fn detect_version(executor: &dyn Executor, vm: &str) -> Result<String> {
    let lookups = [
        Lookup::feature(vm, "os-version"),
        Lookup::file(vm, FEDORA_RELEASE, Extract::FirstNumber),
        Lookup::file(vm, OS_RELEASE, Extract::Field("VERSION_CODENAME")),
        Lookup::file(vm, DEBIAN_VERSION, Extract::Trimmed),
    ];

    let version = first_answer(executor, &lookups).ok_or_else(|| {
        QupError::Detection(format!(
            "Could not determine template version for {}. It might be EOL.",
            vm
        ))
    })?;

    debug!("Detected version '{}' for {}", version, vm);
    Ok(version)
}

/// Value of the first `KEY=value` line in os-release syntax.
fn field_value(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k == key).then(|| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    })
}

fn first_number(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .map(String::from)
}
