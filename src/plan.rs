//! Successor version planning and upgrade phase sequences.

use std::fmt;

use tracing::debug;

use crate::error::{QupError, Result};
use crate::qvm::command::{
    GuestCommand, Invocation, Privilege, ShellWord, sed_escape_pattern, sed_escape_replacement,
};
use crate::template::{Detected, Family, Template};

/// A Debian release known to the succession table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebianRelease {
    pub codename: &'static str,
    pub number: u32,
}

/// Debian releases in upgrade order. The last entry has no successor.
pub const DEBIAN_RELEASES: &[DebianRelease] = &[
    DebianRelease {
        codename: "buster",
        number: 10,
    },
    DebianRelease {
        codename: "bullseye",
        number: 11,
    },
    DebianRelease {
        codename: "bookworm",
        number: 12,
    },
    DebianRelease {
        codename: "trixie",
        number: 13,
    },
];

/// Files holding APT sources inside a Debian template.
const APT_SOURCES: &str = "/etc/apt/sources.list";
const APT_SOURCES_DIR_GLOB: &str = "/etc/apt/sources.list.d/*.list";

/// Service refreshing template metadata after OS-level changes.
pub const POST_INSTALL_SERVICE: &str = "qubes.PostInstall";

/// Resolve a Debian version token (codename, `12` or `12.5`) to its table index.
fn debian_index(version: &str) -> Option<usize> {
    let version = version.trim().to_ascii_lowercase();
    if let Some(i) = DEBIAN_RELEASES.iter().position(|r| r.codename == version) {
        return Some(i);
    }
    let major: u32 = version.split('.').next()?.parse().ok()?;
    DEBIAN_RELEASES.iter().position(|r| r.number == major)
}

/// Successor of a Debian version, or `None` when there is none.
pub fn next_debian_version(current: &str) -> Option<&'static DebianRelease> {
    let index = debian_index(current)?;
    DEBIAN_RELEASES.get(index + 1)
}

/// Successor of a Fedora release number. No upper bound is applied.
pub fn next_fedora_version(current: &str) -> Result<u32> {
    let number: u32 = current.trim().parse().map_err(|_| {
        QupError::Planning(format!(
            "Fedora version '{}' is not a release number.",
            current
        ))
    })?;
    number.checked_add(1).ok_or_else(|| {
        QupError::Planning(format!("Fedora version '{}' is out of range.", current))
    })
}

/// Current and target version tokens for one upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStep {
    pub current: String,
    pub target: String,
}

/// Compute the version step for a detected template.
pub fn plan_version(detected: &Detected) -> Result<VersionStep> {
    let step = match &detected.family {
        Family::Debian => {
            let current = debian_index(&detected.version)
                .map(|i| DEBIAN_RELEASES[i].codename)
                .ok_or_else(|| {
                    QupError::Planning(format!("Unknown Debian version '{}'.", detected.version))
                })?;
            let next = next_debian_version(current).ok_or_else(|| {
                QupError::Planning(format!(
                    "No known successor for Debian {}.",
                    current
                ))
            })?;
            VersionStep {
                current: current.to_string(),
                target: next.codename.to_string(),
            }
        }
        Family::Fedora => VersionStep {
            current: detected.version.trim().to_string(),
            target: next_fedora_version(&detected.version)?.to_string(),
        },
        Family::Unknown(id) => return Err(QupError::UnsupportedFamily(id.clone())),
    };

    if step.target == step.current {
        return Err(QupError::Planning(format!(
            "Target version equals current version '{}'.",
            step.current
        )));
    }

    debug!("Planned {} -> {}", step.current, step.target);
    Ok(step)
}

/// Named step of an upgrade sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Clone,
    Start,
    RewriteRepositories,
    PackageUpgrade,
    DistroSync,
    Trim,
    Shutdown,
    PostInstall,
}

impl PhaseKind {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseKind::Clone => "Clone",
            PhaseKind::Start => "Start",
            PhaseKind::RewriteRepositories => "Rewrite Repositories",
            PhaseKind::PackageUpgrade => "Package Upgrade",
            PhaseKind::DistroSync => "Distro Sync",
            PhaseKind::Trim => "Trim",
            PhaseKind::Shutdown => "Shutdown",
            PhaseKind::PostInstall => "Post-install",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of the plan. Every phase is fatal on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub kind: PhaseKind,
    pub invocation: Invocation,
    /// Progress line shown while the phase runs.
    pub message: String,
}

impl Phase {
    fn new(kind: PhaseKind, invocation: Invocation, message: impl Into<String>) -> Self {
        Self {
            kind,
            invocation,
            message: message.into(),
        }
    }

    pub fn privilege(&self) -> Privilege {
        self.invocation.privilege()
    }
}

/// Ordered phases for upgrading one template.
#[derive(Debug, Clone)]
pub struct UpgradePlan {
    pub source_name: String,
    pub target_name: String,
    pub family: Family,
    pub step: VersionStep,
    pub phases: Vec<Phase>,
}

/// Build the phase sequence for a template's family.
pub fn build_plan(
    template: &Template,
    detected: &Detected,
    step: VersionStep,
) -> Result<UpgradePlan> {
    let target = template.target_name();
    let mut phases = Vec::new();

    if let Some(new_name) = template.clone_target() {
        phases.push(Phase::new(
            PhaseKind::Clone,
            Invocation::clone_vm(&template.name, new_name),
            format!("Cloning {} to {}...", template.name, new_name),
        ));
    }

    phases.push(Phase::new(
        PhaseKind::Start,
        Invocation::start(target),
        format!(
            "Upgrading {} from {} to {}...",
            target, step.current, step.target
        ),
    ));

    match &detected.family {
        Family::Debian => {
            phases.push(Phase::new(
                PhaseKind::RewriteRepositories,
                Invocation::guest(
                    target,
                    rewrite_sources_command(&step.current, &step.target),
                    Privilege::Root,
                    false,
                ),
                "Updating APT repositories...",
            ));
            phases.push(Phase::new(
                PhaseKind::PackageUpgrade,
                Invocation::guest(target, apt_upgrade_command(), Privilege::Root, true),
                "Performing upgrade. Patience...",
            ));
            phases.push(Phase::new(
                PhaseKind::Trim,
                Invocation::guest(
                    target,
                    GuestCommand::new(["fstrim", "-av"]),
                    Privilege::Root,
                    false,
                ),
                "Trimming the new template...",
            ));
        }
        Family::Fedora => {
            phases.push(Phase::new(
                PhaseKind::DistroSync,
                Invocation::guest(target, dnf_sync_command(&step.target), Privilege::Root, true),
                "Performing upgrade. Patience...",
            ));
        }
        Family::Unknown(id) => return Err(QupError::UnsupportedFamily(id.clone())),
    }

    phases.push(Phase::new(
        PhaseKind::Shutdown,
        Invocation::shutdown(target),
        format!("Shutting down {}...", target),
    ));
    phases.push(Phase::new(
        PhaseKind::PostInstall,
        Invocation::service(target, POST_INSTALL_SERVICE),
        "Refreshing template metadata...",
    ));

    Ok(UpgradePlan {
        source_name: template.name.clone(),
        target_name: target.to_string(),
        family: detected.family.clone(),
        step,
        phases,
    })
}

/// Replace every occurrence of `old` with `new` in the APT source lists.
fn rewrite_sources_command(old: &str, new: &str) -> GuestCommand {
    let expression = format!(
        "s/{}/{}/g",
        sed_escape_pattern(old),
        sed_escape_replacement(new)
    );
    GuestCommand::new([
        ShellWord::from("sed"),
        ShellWord::from("-i"),
        ShellWord::from(expression),
        ShellWord::from(APT_SOURCES),
        ShellWord::Glob(APT_SOURCES_DIR_GLOB),
    ])
}

fn apt_upgrade_command() -> GuestCommand {
    GuestCommand::new(["apt", "update"])
        .and(["apt", "full-upgrade", "-y"])
        .and(["apt", "autoremove", "-y"])
        .and(["apt", "clean"])
}

fn dnf_sync_command(release: &str) -> GuestCommand {
    GuestCommand::new(["dnf", "clean", "all"])
        .and([
            "dnf".to_string(),
            format!("--releasever={}", release),
            "distro-sync".to_string(),
            "--best".to_string(),
            "--allowerasing".to_string(),
            "-y".to_string(),
        ])
        .and(["dnf", "update", "-y"])
        .and(["dnf", "upgrade", "-y"])
}
