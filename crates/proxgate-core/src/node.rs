use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Membership state of a cluster node as reported by `GET /nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Online,
    Offline,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A cluster node. Discovered fresh on every query, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    #[serde(rename = "node")]
    pub name: String,
    #[serde(default)]
    pub status: NodeState,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub maxcpu: Option<u32>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub disk: Option<u64>,
    #[serde(default)]
    pub maxdisk: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
}

impl ClusterNode {
    /// Anything not explicitly offline is considered reachable; `unknown`
    /// nodes are still queried and may fail individually.
    pub fn is_available(&self) -> bool {
        self.status != NodeState::Offline
    }
}

/// Response of `GET /nodes/{node}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub loadavg: Option<Vec<String>>,
    #[serde(default)]
    pub kversion: Option<String>,
    #[serde(default)]
    pub pveversion: Option<String>,
    #[serde(default)]
    pub memory: Option<UsageCounter>,
    #[serde(default)]
    pub rootfs: Option<UsageCounter>,
    #[serde(default)]
    pub swap: Option<UsageCounter>,
    #[serde(default)]
    pub cpuinfo: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub free: u64,
}

/// Response of `GET /version`; also the connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub repoid: Option<String>,
}

/// Node names are hostnames: `[A-Za-z0-9][A-Za-z0-9.-]*`.
///
/// Names end up as URL path segments, so anything else is rejected before
/// it can reach the cluster.
pub fn validate_node_name(name: &str) -> Result<(), GatewayError> {
    let mut chars = name.chars();
    let valid = name.len() <= 255
        && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidParameter {
            name: "node".to_string(),
            value: name.to_string(),
            expected: "a node name: letters, digits, '.' or '-', starting with a letter or digit"
                .to_string(),
        })
    }
}
