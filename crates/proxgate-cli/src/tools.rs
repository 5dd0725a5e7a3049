//! Tool registry: names, parameter docs, and routing of tool calls onto the gateway.
//!
//! Lifecycle tools are named `<verb>_<kind>`. Any name with a `_vm` or
//! `_container` suffix is routed to the dispatcher, so a verb the kind does
//! not allow (`pause_vm`, `reset_container`) comes back as `invalid_action`
//! without touching the cluster.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use proxgate_core::error::GatewayError;
use proxgate_core::protocol::ToolError;
use proxgate_core::resource::{ResourceKind, ResourceRef};
use proxgate_core::snapshot::SnapshotVerb;
use proxgate_runtime::Gateway;
use proxgate_runtime::backup::RestoreRequest;
use proxgate_runtime::dispatcher::SnapshotArgs;
use proxgate_runtime::tasks::TaskTracker;

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

const fn req(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        required: true,
        description,
    }
}

const fn opt(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        required: false,
        description,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    fn new(name: impl Into<String>, description: impl Into<String>, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
        }
    }
}

const NODE: ParamSpec = req("node", "Cluster node name");
const VMID: ParamSpec = req("vmid", "Resource id");
const KIND: ParamSpec = opt("kind", "vm or container; probed vm-first when omitted");
const SNAPNAME: ParamSpec = req("name", "Snapshot name");
const UPID: ParamSpec = req("upid", "Task UPID");
const TASK_NODE: ParamSpec = opt("node", "Node running the task; taken from the UPID when omitted");

/// Every tool, in listing order.
pub fn catalog() -> Vec<ToolSpec> {
    let mut tools = vec![
        ToolSpec::new("get_version", "Cluster API version", vec![]),
        ToolSpec::new("get_nodes", "All cluster nodes with status and usage", vec![]),
        ToolSpec::new("get_node_status", "Detailed status of one node", vec![NODE]),
        ToolSpec::new(
            "list_vms",
            "VMs on every online node; per-node failures reported under errors",
            vec![],
        ),
        ToolSpec::new(
            "list_containers",
            "Containers on every online node; per-node failures reported under errors",
            vec![],
        ),
        ToolSpec::new("get_vm_status", "Current status of a VM", vec![NODE, VMID]),
        ToolSpec::new("get_vm_config", "Configuration of a VM", vec![NODE, VMID]),
        ToolSpec::new("get_container_status", "Current status of a container", vec![NODE, VMID]),
        ToolSpec::new("get_container_config", "Configuration of a container", vec![NODE, VMID]),
        ToolSpec::new("get_firewall_rules", "Firewall rules of a resource", vec![NODE, VMID, KIND]),
        ToolSpec::new(
            "list_storage",
            "Storage of one node, or of every online node when node is omitted",
            vec![opt("node", "Cluster node name")],
        ),
        ToolSpec::new(
            "create_snapshot",
            "Take a snapshot; returns a task handle",
            vec![
                NODE,
                VMID,
                SNAPNAME,
                KIND,
                opt("description", "Free-form description"),
                opt("vmstate", "Include RAM state (VMs only)"),
            ],
        ),
        ToolSpec::new("list_snapshots", "Snapshots of a resource", vec![NODE, VMID, KIND]),
        ToolSpec::new(
            "get_snapshot_config",
            "Configuration captured by a snapshot",
            vec![NODE, VMID, SNAPNAME, KIND],
        ),
        ToolSpec::new(
            "delete_snapshot",
            "Delete a snapshot (requires dangerous mode)",
            vec![NODE, VMID, SNAPNAME, KIND],
        ),
        ToolSpec::new(
            "rollback_snapshot",
            "Roll a resource back to a snapshot (requires dangerous mode)",
            vec![NODE, VMID, SNAPNAME, KIND],
        ),
        ToolSpec::new(
            "create_backup",
            "Start a vzdump backup; returns a task handle",
            vec![
                NODE,
                VMID,
                req("storage", "Target storage id"),
                opt("mode", "snapshot (default), suspend or stop"),
                opt("compress", "zstd (default), gzip or lzo"),
            ],
        ),
        ToolSpec::new(
            "list_backups",
            "Backup archives on the backup-capable storages of a node",
            vec![
                NODE,
                opt("storage", "Only this storage"),
                opt("vmid", "Only backups of this id"),
            ],
        ),
        ToolSpec::new(
            "restore_backup",
            "Restore an archive into a resource id (requires dangerous mode)",
            vec![
                NODE,
                req("archive", "Backup volume id"),
                VMID,
                opt("kind", "vm or container; inferred from the archive name when omitted"),
                opt("storage", "Target storage for disks"),
                opt("force", "Overwrite an existing resource"),
            ],
        ),
        ToolSpec::new("get_task_status", "Point-in-time status of a task", vec![UPID, TASK_NODE]),
        ToolSpec::new(
            "get_task_log",
            "Log lines of a task",
            vec![
                UPID,
                TASK_NODE,
                opt("start", "First line"),
                opt("limit", "Maximum lines"),
            ],
        ),
    ];

    for kind in ResourceKind::PROBE_ORDER {
        for verb in kind.lifecycle_verbs() {
            tools.push(ToolSpec::new(
                format!("{}_{}", verb, kind),
                format!("{} a {}; returns a task handle", capitalize(verb.as_str()), kind),
                vec![NODE, VMID],
            ));
        }
    }
    tools
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split `<verb>_<kind>` when the suffix names a kind.
pub fn lifecycle_tool(name: &str) -> Option<(&str, ResourceKind)> {
    let (verb, suffix) = name.rsplit_once('_')?;
    if verb.is_empty() {
        return None;
    }
    match suffix {
        "vm" => Some((verb, ResourceKind::Vm)),
        "container" => Some((verb, ResourceKind::Container)),
        _ => None,
    }
}

// ============================================================================
// Invocation
// ============================================================================

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool '{0}'; run `proxgate tools` for the list")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    BadArguments { tool: String, message: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ToolCallError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::BadArguments { .. } => "bad_request",
            Self::Gateway(e) => e.code(),
        }
    }
}

impl From<&ToolCallError> for ToolError {
    fn from(e: &ToolCallError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct NodeArgs {
    node: String,
}

#[derive(Deserialize)]
struct OptNodeArgs {
    #[serde(default)]
    node: Option<String>,
}

#[derive(Deserialize)]
struct ResourceArgs {
    node: String,
    #[serde(alias = "id")]
    vmid: u32,
    #[serde(default)]
    kind: Option<ResourceKind>,
}

#[derive(Deserialize)]
struct SnapshotToolArgs {
    node: String,
    #[serde(alias = "id")]
    vmid: u32,
    #[serde(default)]
    kind: Option<ResourceKind>,
    #[serde(flatten)]
    snapshot: SnapshotArgs,
}

fn default_mode() -> String {
    "snapshot".to_string()
}

fn default_compress() -> String {
    "zstd".to_string()
}

#[derive(Deserialize)]
struct CreateBackupArgs {
    node: String,
    #[serde(alias = "id")]
    vmid: u32,
    storage: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_compress")]
    compress: String,
}

#[derive(Deserialize)]
struct ListBackupsArgs {
    node: String,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default, alias = "id")]
    vmid: Option<u32>,
}

#[derive(Deserialize)]
struct RestoreArgs {
    node: String,
    archive: String,
    #[serde(alias = "id")]
    vmid: u32,
    #[serde(default)]
    kind: Option<ResourceKind>,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct TaskArgs {
    upid: String,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

fn args<T: DeserializeOwned>(tool: &str, value: Value) -> Result<T, ToolCallError> {
    // A bare `null` means "no arguments".
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    };
    serde_json::from_value(value).map_err(|e| ToolCallError::BadArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

fn json<T: Serialize>(tool: &str, value: T) -> Result<Value, ToolCallError> {
    serde_json::to_value(value).map_err(|e| {
        ToolCallError::Gateway(GatewayError::Decode {
            endpoint: tool.to_string(),
            message: e.to_string(),
        })
    })
}

/// Run one tool against the gateway.
pub async fn invoke(gw: &Gateway, tool: &str, arguments: Value) -> Result<Value, ToolCallError> {
    match tool {
        "get_version" => json(tool, gw.version().await?),
        "get_nodes" => json(tool, gw.nodes().await?),
        "get_node_status" => {
            let a: NodeArgs = args(tool, arguments)?;
            json(tool, gw.node_status(&a.node).await?)
        }
        "list_vms" => json(tool, gw.list_resources(ResourceKind::Vm).await),
        "list_containers" => json(tool, gw.list_resources(ResourceKind::Container).await),
        "get_vm_status" | "get_container_status" | "get_vm_config" | "get_container_config" => {
            let a: ResourceArgs = args(tool, arguments)?;
            let kind = if tool.contains("_vm_") {
                ResourceKind::Vm
            } else {
                ResourceKind::Container
            };
            let target = ResourceRef::new(a.node, a.vmid, kind);
            if tool.ends_with("_status") {
                json(tool, gw.resource_status(&target).await?)
            } else {
                json(tool, gw.resource_config(&target).await?)
            }
        }
        "get_firewall_rules" => {
            let a: ResourceArgs = args(tool, arguments)?;
            json(tool, gw.firewall_rules(&a.node, a.vmid, a.kind).await?)
        }
        "list_storage" => {
            let a: OptNodeArgs = args(tool, arguments)?;
            match a.node {
                Some(node) => json(tool, gw.list_storage(&node).await?),
                None => json(tool, gw.list_storage_all().await),
            }
        }
        "create_snapshot" | "list_snapshots" | "get_snapshot_config" | "delete_snapshot"
        | "rollback_snapshot" => {
            let verb = match tool {
                "create_snapshot" => SnapshotVerb::Create,
                "list_snapshots" => SnapshotVerb::List,
                "get_snapshot_config" => SnapshotVerb::GetConfig,
                "delete_snapshot" => SnapshotVerb::Delete,
                _ => SnapshotVerb::Rollback,
            };
            // Gate first: a closed gate rejects even malformed arguments.
            if verb.is_destructive() {
                gw.gate().admit(tool)?;
            }
            let a: SnapshotToolArgs = args(tool, arguments)?;
            json(
                tool,
                gw.snapshot(&a.node, a.vmid, a.kind, verb, a.snapshot)
                    .await?,
            )
        }
        "create_backup" => {
            let a: CreateBackupArgs = args(tool, arguments)?;
            json(
                tool,
                gw.create_backup(&a.node, a.vmid, &a.storage, &a.mode, &a.compress)
                    .await?,
            )
        }
        "list_backups" => {
            let a: ListBackupsArgs = args(tool, arguments)?;
            json(
                tool,
                gw.list_backups(&a.node, a.storage.as_deref(), a.vmid)
                    .await?,
            )
        }
        "restore_backup" => {
            gw.gate().admit(tool)?;
            let a: RestoreArgs = args(tool, arguments)?;
            let req = RestoreRequest {
                node: a.node,
                archive: a.archive,
                id: a.vmid,
                kind: a.kind,
                storage: a.storage,
                force: a.force,
            };
            json(tool, gw.restore_backup(&req).await?)
        }
        "get_task_status" | "get_task_log" => {
            let a: TaskArgs = args(tool, arguments)?;
            let handle = TaskTracker::handle(&a.upid, a.node.as_deref())?;
            if tool == "get_task_status" {
                json(tool, gw.task_status(&handle).await?)
            } else {
                json(tool, gw.task_log(&handle, a.start, a.limit).await?)
            }
        }
        other => match lifecycle_tool(other) {
            Some((verb, kind)) => {
                let a: ResourceArgs = args(tool, arguments)?;
                let target = ResourceRef::new(a.node, a.vmid, kind);
                json(tool, gw.lifecycle(target, verb).await?)
            }
            None => Err(ToolCallError::UnknownTool(other.to_string())),
        },
    }
}
