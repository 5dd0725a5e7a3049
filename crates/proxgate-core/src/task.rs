use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Handle for an asynchronous cluster-side operation.
///
/// Holds no progress state; status must be re-fetched from the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub node: String,
    pub upid: String,
}

impl TaskHandle {
    pub fn new(node: impl Into<String>, upid: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            upid: upid.into(),
        }
    }

    /// Build a handle from a bare UPID, taking the node from its second field.
    ///
    /// UPID layout: `UPID:<node>:<pid>:<pstart>:<starttime>:<type>:<id>:<user>:`
    pub fn from_upid(upid: &str) -> Result<Self, GatewayError> {
        let node = upid_node(upid).ok_or_else(|| bad_upid(upid))?;
        Ok(Self::new(node, upid))
    }

    /// Task type field of the UPID (`vzdump`, `qmstart`, ...), when well-formed.
    pub fn task_type(&self) -> Option<&str> {
        self.upid.split(':').nth(5).filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.upid, self.node)
    }
}

fn upid_node(upid: &str) -> Option<&str> {
    let mut parts = upid.split(':');
    if parts.next()? != "UPID" {
        return None;
    }
    let node = parts.next()?;
    // pid, pstart, starttime, type, id, user must follow
    if node.is_empty() || parts.count() < 6 {
        return None;
    }
    Some(node)
}

fn bad_upid(upid: &str) -> GatewayError {
    GatewayError::InvalidParameter {
        name: "upid".to_string(),
        value: upid.to_string(),
        expected: "UPID:<node>:<pid>:<pstart>:<starttime>:<type>:<id>:<user>:".to_string(),
    }
}

/// A UPID is used verbatim as a URL path segment: it must be well-formed
/// and free of `/`, `?`, `#`, `%`, `\` and whitespace.
pub fn validate_upid(upid: &str) -> Result<(), GatewayError> {
    let clean = upid
        .chars()
        .all(|c| c.is_ascii_graphic() && !matches!(c, '/' | '?' | '#' | '%' | '\\'));
    if clean && upid_node(upid).is_some() {
        Ok(())
    } else {
        Err(bad_upid(upid))
    }
}

/// What a mutating call returned: a task to poll, or a result that completed inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Task(TaskHandle),
    Completed { data: serde_json::Value },
}

impl ActionOutcome {
    /// Interpret a mutating call's `data`: a UPID string becomes a task handle.
    pub fn from_data(node: &str, data: serde_json::Value) -> Self {
        match data {
            serde_json::Value::String(ref s) if s.starts_with("UPID:") => {
                Self::Task(TaskHandle::new(node, s.as_str()))
            }
            other => Self::Completed { data: other },
        }
    }

    pub fn task(&self) -> Option<&TaskHandle> {
        match self {
            Self::Task(handle) => Some(handle),
            Self::Completed { .. } => None,
        }
    }
}

/// Point-in-time task state from `GET /nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub upid: String,
    /// `running` or `stopped`.
    pub status: String,
    /// Present once stopped: `OK`, `WARNINGS: n`, or an error message.
    #[serde(default)]
    pub exitstatus: Option<String>,
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub starttime: Option<u64>,
    #[serde(default)]
    pub pid: Option<u64>,
}

impl TaskStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    /// `Some(true)` once stopped with `OK`, `Some(false)` once stopped otherwise.
    pub fn succeeded(&self) -> Option<bool> {
        if self.is_running() {
            return None;
        }
        Some(self.exitstatus.as_deref() == Some("OK"))
    }
}

/// One line of `GET /nodes/{node}/tasks/{upid}/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogLine {
    #[serde(rename = "n")]
    pub line_no: u64,
    #[serde(rename = "t")]
    pub text: String,
}
