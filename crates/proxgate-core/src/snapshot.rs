use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::resource::de_opt_bool;

/// Snapshot-management verbs. Identical for vms and containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotVerb {
    Create,
    List,
    GetConfig,
    Delete,
    Rollback,
}

impl SnapshotVerb {
    pub const ALL: [SnapshotVerb; 5] = [
        Self::Create,
        Self::List,
        Self::GetConfig,
        Self::Delete,
        Self::Rollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::GetConfig => "getConfig",
            Self::Delete => "delete",
            Self::Rollback => "rollback",
        }
    }

    /// Irreversible verbs that require dangerous mode.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Delete | Self::Rollback)
    }

    /// Verbs that address one named snapshot.
    pub fn needs_name(&self) -> bool {
        !matches!(self, Self::List)
    }
}

impl std::fmt::Display for SnapshotVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotVerb {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "list" => Ok(Self::List),
            "getConfig" | "get_config" => Ok(Self::GetConfig),
            "delete" => Ok(Self::Delete),
            "rollback" => Ok(Self::Rollback),
            _ => Err(GatewayError::invalid_parameter(
                "snapshot verb",
                s,
                &["create", "list", "getConfig", "delete", "rollback"],
            )),
        }
    }
}

/// Row from `GET .../snapshot`. The pseudo-entry `current` marks the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub snaptime: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub vmstate: Option<bool>,
}

impl SnapshotInfo {
    pub fn is_current(&self) -> bool {
        self.name == "current"
    }
}

/// Parameters for snapshot creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Include RAM state (vms only; ignored for containers).
    #[serde(default)]
    pub vmstate: bool,
}

/// Validate a snapshot name: letter first, then `[A-Za-z0-9_-]`, at most 40 chars.
pub fn validate_snapshot_name(name: &str) -> Result<(), GatewayError> {
    let mut chars = name.chars();
    let valid = name.len() <= 40
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && name != "current";
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidParameter {
            name: "snapshot name".to_string(),
            value: name.to_string(),
            expected: "a letter followed by letters, digits, '_' or '-' (max 40, not 'current')"
                .to_string(),
        })
    }
}
