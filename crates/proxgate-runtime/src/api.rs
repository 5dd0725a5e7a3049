use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use proxgate_core::error::{GatewayError, Result};
use proxgate_core::node::{ClusterNode, NodeStatus, VersionInfo, validate_node_name};
use proxgate_core::resource::{
    FirewallRule, LifecycleVerb, ResourceConfig, ResourceKind, ResourceRef, ResourceStatus,
    ResourceSummary,
};
use proxgate_core::snapshot::{SnapshotInfo, SnapshotSpec, validate_snapshot_name};
use proxgate_core::storage::{
    BackupMode, Compression, StorageContentEntry, StorageEntry, validate_storage_id,
};
use proxgate_core::task::{ActionOutcome, TaskHandle, TaskLogLine, TaskStatus, validate_upid};

use crate::transport::{ClusterTransport, Method};

/// Typed view of the cluster API. Each method is at most one remote call.
///
/// Caller-supplied path segments (node, storage, snapshot name, UPID) are
/// validated first; a rejected segment costs no remote call.
#[derive(Clone)]
pub struct ClusterApi {
    transport: Arc<dyn ClusterTransport>,
}

impl ClusterApi {
    pub fn new(transport: Arc<dyn ClusterTransport>) -> Self {
        Self { transport }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let data = self.transport.call(method, path, params).await?;
        decode(path, data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(Method::Get, path, &[]).await
    }

    /// Mutating call whose `data` must be a task UPID.
    async fn task(
        &self,
        method: Method,
        node: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<TaskHandle> {
        let data = self.transport.call(method, path, params).await?;
        match ActionOutcome::from_data(node, data) {
            ActionOutcome::Task(handle) => Ok(handle),
            ActionOutcome::Completed { data } => Err(GatewayError::Decode {
                endpoint: path.to_string(),
                message: format!("expected a task UPID, got {}", data),
            }),
        }
    }

    // ---- cluster / nodes ----

    pub async fn version(&self) -> Result<VersionInfo> {
        self.get("/version").await
    }

    pub async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        self.get("/nodes").await
    }

    pub async fn node_status(&self, node: &str) -> Result<NodeStatus> {
        self.get(&format!("{}/status", node_path(node)?)).await
    }

    // ---- resources ----

    pub async fn list_resources(
        &self,
        node: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceSummary>> {
        self.get(&format!("{}/{}", node_path(node)?, kind.api_segment()))
            .await
    }

    pub async fn resource_status(&self, target: &ResourceRef) -> Result<ResourceStatus> {
        self.get(&format!("{}/status/current", resource_path(target)?))
            .await
    }

    pub async fn resource_config(&self, target: &ResourceRef) -> Result<ResourceConfig> {
        self.get(&format!("{}/config", resource_path(target)?)).await
    }

    pub async fn resource_action(
        &self,
        target: &ResourceRef,
        verb: LifecycleVerb,
    ) -> Result<ActionOutcome> {
        let path = format!("{}/status/{}", resource_path(target)?, verb);
        let data = self.transport.call(Method::Post, &path, &[]).await?;
        Ok(ActionOutcome::from_data(&target.node, data))
    }

    pub async fn firewall_rules(&self, target: &ResourceRef) -> Result<Vec<FirewallRule>> {
        self.get(&format!("{}/firewall/rules", resource_path(target)?))
            .await
    }

    // ---- snapshots ----

    pub async fn snapshot_create(
        &self,
        target: &ResourceRef,
        spec: &SnapshotSpec,
    ) -> Result<TaskHandle> {
        let mut params = vec![("snapname", spec.name.clone())];
        if let Some(ref d) = spec.description {
            params.push(("description", d.clone()));
        }
        if spec.vmstate && target.kind == ResourceKind::Vm {
            params.push(("vmstate", "1".to_string()));
        }
        validate_snapshot_name(&spec.name)?;
        let path = format!("{}/snapshot", resource_path(target)?);
        self.task(Method::Post, &target.node, &path, &params).await
    }

    pub async fn snapshot_list(&self, target: &ResourceRef) -> Result<Vec<SnapshotInfo>> {
        self.get(&format!("{}/snapshot", resource_path(target)?)).await
    }

    pub async fn snapshot_config(&self, target: &ResourceRef, name: &str) -> Result<ResourceConfig> {
        validate_snapshot_name(name)?;
        self.get(&format!("{}/snapshot/{}/config", resource_path(target)?, name))
            .await
    }

    pub async fn snapshot_delete(&self, target: &ResourceRef, name: &str) -> Result<TaskHandle> {
        validate_snapshot_name(name)?;
        let path = format!("{}/snapshot/{}", resource_path(target)?, name);
        self.task(Method::Delete, &target.node, &path, &[]).await
    }

    pub async fn snapshot_rollback(&self, target: &ResourceRef, name: &str) -> Result<TaskHandle> {
        validate_snapshot_name(name)?;
        let path = format!("{}/snapshot/{}/rollback", resource_path(target)?, name);
        self.task(Method::Post, &target.node, &path, &[]).await
    }

    // ---- storage / backup ----

    pub async fn list_storage(&self, node: &str) -> Result<Vec<StorageEntry>> {
        self.get(&format!("{}/storage", node_path(node)?)).await
    }

    pub async fn storage_content(
        &self,
        node: &str,
        storage: &str,
    ) -> Result<Vec<StorageContentEntry>> {
        validate_storage_id(storage)?;
        self.get(&format!("{}/storage/{}/content", node_path(node)?, storage))
            .await
    }

    pub async fn vzdump(
        &self,
        node: &str,
        id: u32,
        storage: &str,
        mode: BackupMode,
        compress: Compression,
    ) -> Result<TaskHandle> {
        let params = [
            ("vmid", id.to_string()),
            ("storage", storage.to_string()),
            ("mode", mode.as_str().to_string()),
            ("compress", compress.as_str().to_string()),
        ];
        let path = format!("{}/vzdump", node_path(node)?);
        self.task(Method::Post, node, &path, &params).await
    }

    /// Create `id` from `archive`. VMs take `archive`, containers take
    /// `ostemplate` plus `restore=1`.
    pub async fn restore(
        &self,
        node: &str,
        kind: ResourceKind,
        id: u32,
        archive: &str,
        storage: Option<&str>,
        force: bool,
    ) -> Result<TaskHandle> {
        let mut params = vec![("vmid", id.to_string())];
        match kind {
            ResourceKind::Vm => params.push(("archive", archive.to_string())),
            ResourceKind::Container => {
                params.push(("ostemplate", archive.to_string()));
                params.push(("restore", "1".to_string()));
            }
        }
        if let Some(s) = storage {
            params.push(("storage", s.to_string()));
        }
        if force {
            params.push(("force", "1".to_string()));
        }
        let path = format!("{}/{}", node_path(node)?, kind.api_segment());
        self.task(Method::Post, node, &path, &params).await
    }

    // ---- tasks ----

    pub async fn task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        self.get(&format!("{}/status", task_path(handle)?))
            .await
    }

    pub async fn task_log(
        &self,
        handle: &TaskHandle,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<TaskLogLine>> {
        let mut params = Vec::new();
        if let Some(s) = start {
            params.push(("start", s.to_string()));
        }
        if let Some(l) = limit {
            params.push(("limit", l.to_string()));
        }
        let path = format!("{}/log", task_path(handle)?);
        self.fetch(Method::Get, &path, &params).await
    }
}

fn node_path(node: &str) -> Result<String> {
    validate_node_name(node)?;
    Ok(format!("/nodes/{}", node))
}

fn resource_path(target: &ResourceRef) -> Result<String> {
    validate_node_name(&target.node)?;
    Ok(target.api_path())
}

fn task_path(handle: &TaskHandle) -> Result<String> {
    validate_upid(&handle.upid)?;
    Ok(format!("{}/tasks/{}", node_path(&handle.node)?, handle.upid))
}

fn decode<T: DeserializeOwned>(endpoint: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| GatewayError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}
