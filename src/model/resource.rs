//! Resource identity and lifecycle types.

use serde::{Deserialize, Serialize};

/// Identity of a managed resource: its kind and caller-chosen name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource kind (e.g. `container`, `network`).
    pub kind: String,
    /// Resource name, unique within its kind.
    pub name: String,
}

/// Observed lifecycle status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// The resource does not exist.
    #[default]
    Absent,
    /// The resource exists but was never started.
    Created,
    /// The resource is running.
    Running,
    /// The resource exists and is stopped.
    Stopped,
    /// The resource is restarting.
    Restarting,
    /// The resource is being removed.
    Removing,
}

/// Lifecycle the caller wants the resource to converge to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// The resource exists; its running state is left as observed.
    #[serde(alias = "created")]
    Present,
    /// The resource exists and is running.
    #[serde(alias = "started")]
    Running,
    /// The resource exists and is not running.
    Stopped,
    /// The resource does not exist.
    Absent,
}

impl ResourceId {
    /// Creates a new resource identity.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Returns the `kind/name` key used by backends.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl Lifecycle {
    /// Returns true if the resource exists in any form.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns true if the resource is running or about to be.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Absent => "absent",
        };
        write!(f, "{s}")
    }
}
