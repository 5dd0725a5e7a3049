use serde::Serialize;
use tabled::Tabled;

use proxgate_core::aggregate::NodeScoped;
use proxgate_core::node::ClusterNode;
use proxgate_core::resource::ResourceSummary;
use proxgate_core::storage::BackupEntry;
use proxgate_core::task::TaskStatus;

use crate::tools::ToolSpec;
use crate::ui;

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn gib(bytes: Option<u64>) -> String {
    bytes
        .map(|b| format!("{:.1} GiB", b as f64 / (1024.0 * 1024.0 * 1024.0)))
        .unwrap_or_else(|| "-".to_string())
}

/// Display row for `nodes`.
#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    #[tabled(rename = "NODE")]
    pub node: String,
    #[tabled(rename = "STATUS")]
    pub status: String,
    #[tabled(rename = "CPU")]
    pub cpu: String,
    #[tabled(rename = "MEM")]
    pub mem: String,
    #[tabled(rename = "UPTIME")]
    pub uptime: String,
}

impl From<&ClusterNode> for NodeRow {
    fn from(n: &ClusterNode) -> Self {
        Self {
            node: n.name.clone(),
            status: ui::state(&n.status.to_string()),
            cpu: opt(n.cpu.map(|c| format!("{:.1}%", c * 100.0))),
            mem: format!("{} / {}", gib(n.mem), gib(n.maxmem)),
            uptime: opt(n.uptime),
        }
    }
}

/// Display row for `resources`.
#[derive(Debug, Serialize, Tabled)]
pub struct ResourceRow {
    #[tabled(rename = "NODE")]
    pub node: String,
    #[tabled(rename = "ID")]
    pub vmid: u32,
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "STATUS")]
    pub status: String,
    #[tabled(rename = "CPUS")]
    pub cpus: String,
    #[tabled(rename = "MAX MEM")]
    pub maxmem: String,
}

impl From<&NodeScoped<ResourceSummary>> for ResourceRow {
    fn from(s: &NodeScoped<ResourceSummary>) -> Self {
        let r = &s.item;
        Self {
            node: s.node.clone(),
            vmid: r.vmid,
            name: opt(r.name.clone()),
            status: ui::state(&r.status.to_string()),
            cpus: opt(r.cpus),
            maxmem: gib(r.maxmem),
        }
    }
}

/// Display row for `backups`.
#[derive(Debug, Serialize, Tabled)]
pub struct BackupRow {
    #[tabled(rename = "STORAGE")]
    pub storage: String,
    #[tabled(rename = "VOLID")]
    pub volid: String,
    #[tabled(rename = "ID")]
    pub vmid: String,
    #[tabled(rename = "SIZE")]
    pub size: String,
    #[tabled(rename = "CREATED")]
    pub ctime: String,
}

impl From<&BackupEntry> for BackupRow {
    fn from(b: &BackupEntry) -> Self {
        Self {
            storage: b.storage.clone(),
            volid: b.volid.clone(),
            vmid: opt(b.vmid),
            size: gib(b.size),
            ctime: opt(b.ctime),
        }
    }
}

/// Display row for `task`.
#[derive(Debug, Serialize, Tabled)]
pub struct TaskRow {
    #[tabled(rename = "UPID")]
    pub upid: String,
    #[tabled(rename = "TYPE")]
    pub task_type: String,
    #[tabled(rename = "STATUS")]
    pub status: String,
    #[tabled(rename = "EXIT")]
    pub exitstatus: String,
}

impl From<&TaskStatus> for TaskRow {
    fn from(t: &TaskStatus) -> Self {
        Self {
            upid: t.upid.clone(),
            task_type: opt(t.task_type.clone()),
            status: t.status.clone(),
            exitstatus: ui::state(&opt(t.exitstatus.clone())),
        }
    }
}

/// Display row for `tools`.
#[derive(Debug, Serialize, Tabled)]
pub struct ToolRow {
    #[tabled(rename = "TOOL")]
    pub name: String,
    #[tabled(rename = "PARAMETERS")]
    pub params: String,
    #[tabled(rename = "DESCRIPTION")]
    pub description: String,
}

impl From<&ToolSpec> for ToolRow {
    fn from(t: &ToolSpec) -> Self {
        Self {
            name: t.name.clone(),
            params: t
                .params
                .iter()
                .map(|p| {
                    if p.required {
                        p.name.to_string()
                    } else {
                        format!("[{}]", p.name)
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
            description: t.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_row_placeholders() {
        let summary: ResourceSummary = serde_json::from_value(serde_json::json!({"vmid": 101})).unwrap();
        let row = ResourceRow::from(&NodeScoped {
            node: "pve1".to_string(),
            item: summary,
        });
        assert_eq!(row.vmid, 101);
        assert_eq!(row.name, "-");
        assert_eq!(row.maxmem, "-");
    }

    #[test]
    fn test_gib_formatting() {
        assert_eq!(gib(Some(2 * 1024 * 1024 * 1024)), "2.0 GiB");
        assert_eq!(gib(None), "-");
    }
}
