//! Template identity and detected OS family.

use std::fmt;

use crate::error::{QupError, Result};

/// Longest VM name qubesd accepts.
const MAX_VM_NAME_LEN: usize = 31;

/// OS lineage of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Family {
    Debian,
    Fedora,
    /// Anything else, keeping the raw distribution identifier.
    Unknown(String),
}

impl Family {
    /// Parse a distribution identifier such as `debian` or `"fedora"`.
    pub fn parse(id: &str) -> Self {
        let id = id.trim().trim_matches(|c| c == '"' || c == '\'');
        match id.to_ascii_lowercase().as_str() {
            "debian" => Family::Debian,
            "fedora" => Family::Fedora,
            _ => Family::Unknown(id.to_string()),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Debian => write!(f, "debian"),
            Family::Fedora => write!(f, "fedora"),
            Family::Unknown(id) => write!(f, "{}", id),
        }
    }
}

/// What detection learned about a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub family: Family,
    pub version: String,
}

/// The template to upgrade, as requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub clone_requested: bool,
    pub new_name: Option<String>,
}

impl Template {
    /// Build a template request, rejecting it before anything runs if the
    /// clone destination is missing or any name is invalid.
    pub fn new(name: &str, clone_requested: bool, new_name: Option<&str>) -> Result<Self> {
        validate_vm_name(name)?;

        let new_name = new_name.map(str::trim).filter(|n| !n.is_empty());

        if clone_requested {
            let target = new_name.ok_or_else(|| {
                QupError::Validation("New template name required when cloning.".to_string())
            })?;
            validate_vm_name(target)?;
            if target == name {
                return Err(QupError::Validation(format!(
                    "New template name must differ from '{}'.",
                    name
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            clone_requested,
            new_name: new_name.map(String::from),
        })
    }

    /// Clone destination, when cloning was requested.
    pub fn clone_target(&self) -> Option<&str> {
        if self.clone_requested {
            self.new_name.as_deref()
        } else {
            None
        }
    }

    /// Environment every mutating phase addresses.
    pub fn target_name(&self) -> &str {
        self.clone_target().unwrap_or(&self.name)
    }
}

/// Check a name against qubesd's VM naming rules.
pub fn validate_vm_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(QupError::Validation(format!(
            "Invalid template name '{}': {}.",
            name, reason
        )))
    };

    let Some(first) = name.chars().next() else {
        return invalid("name is empty");
    };
    if !first.is_ascii_alphabetic() {
        return invalid("must start with a letter");
    }
    if name.len() > MAX_VM_NAME_LEN {
        return invalid("longer than 31 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return invalid("only letters, digits, '_', '.' and '-' are allowed");
    }
    Ok(())
}
