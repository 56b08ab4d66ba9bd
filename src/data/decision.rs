//! Run policy and per-component decisions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Run-wide behavioural switches, resolved once before the engine starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    pub auto_yes: bool,
    pub dry_run: bool,
    pub interactive: bool,
}

impl Policy {
    pub fn new(auto_yes: bool, dry_run: bool) -> Self {
        Self {
            auto_yes,
            dry_run,
            interactive: !(auto_yes || dry_run),
        }
    }
}

/// What to do with a component. Update and reinstall both re-run the
/// install steps, so they are `Install` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Skip,
    Install,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Skip => f.write_str("skip"),
            Action::Install => f.write_str("install"),
        }
    }
}

/// Resolved action for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub component: String,
    pub action: Action,
    pub rationale: String,
}

impl Decision {
    pub fn install(component: &str, rationale: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            action: Action::Install,
            rationale: rationale.into(),
        }
    }

    pub fn skip(component: &str, rationale: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            action: Action::Skip,
            rationale: rationale.into(),
        }
    }
}
