use std::sync::Arc;

use proxgate_core::aggregate::AggregateResult;
use proxgate_core::config::GatewayConfig;
use proxgate_core::error::{ConnectivityError, Result};
use proxgate_core::gate::SafetyGate;
use proxgate_core::node::{ClusterNode, NodeStatus, VersionInfo};
use proxgate_core::resource::{
    FirewallRule, ResourceConfig, ResourceKind, ResourceRef, ResourceStatus, ResourceSummary,
};
use proxgate_core::snapshot::SnapshotVerb;
use proxgate_core::storage::StorageEntry;
use proxgate_core::task::{ActionOutcome, TaskHandle, TaskLogLine, TaskStatus};

use crate::aggregator::Aggregator;
use crate::api::ClusterApi;
use crate::backup::{BackupListing, BackupWorkflow, RestoreRequest};
use crate::connection::ConnectionManager;
use crate::directory::NodeDirectory;
use crate::dispatcher::{ActionDispatcher, ActionRequest, DispatchOutcome, SnapshotArgs};
use crate::resolver::ResourceResolver;
use crate::tasks::TaskTracker;
use crate::transport::ClusterTransport;

/// Every gateway operation over one shared connection.
///
/// Cheap to clone; clones share the transport and the gate.
#[derive(Clone)]
pub struct Gateway {
    api: ClusterApi,
    directory: NodeDirectory,
    resolver: ResourceResolver,
    dispatcher: ActionDispatcher,
    aggregator: Aggregator,
    tasks: TaskTracker,
    backups: BackupWorkflow,
}

impl Gateway {
    pub fn new(transport: Arc<dyn ClusterTransport>, gate: SafetyGate) -> Self {
        let api = ClusterApi::new(transport);
        let directory = NodeDirectory::new(api.clone());
        let resolver = ResourceResolver::new(api.clone());
        Self {
            dispatcher: ActionDispatcher::new(api.clone(), resolver.clone(), gate),
            aggregator: Aggregator::new(directory.clone()),
            tasks: TaskTracker::new(api.clone()),
            backups: BackupWorkflow::new(api.clone(), resolver.clone(), gate),
            api,
            directory,
            resolver,
        }
    }

    /// Acquire the connection per `config` (one probe) and wire everything to it.
    pub async fn connect(config: &GatewayConfig) -> std::result::Result<Self, ConnectivityError> {
        let connection = ConnectionManager::acquire(config).await?;
        Ok(Self::new(connection.into_transport(), config.safety_gate()))
    }

    pub fn gate(&self) -> SafetyGate {
        self.dispatcher.gate()
    }

    // ---- cluster ----

    pub async fn version(&self) -> Result<VersionInfo> {
        self.api.version().await
    }

    pub async fn nodes(&self) -> Result<Vec<ClusterNode>> {
        self.directory.list_nodes().await
    }

    pub async fn online_nodes(&self) -> Vec<ClusterNode> {
        self.directory.list_online_nodes().await
    }

    pub async fn node_status(&self, node: &str) -> Result<NodeStatus> {
        self.api.node_status(node).await
    }

    // ---- resources ----

    /// Resources of `kind` across all online nodes.
    pub async fn list_resources(&self, kind: ResourceKind) -> AggregateResult<ResourceSummary> {
        let api = self.api.clone();
        self.aggregator
            .aggregate_flat(move |node| {
                let api = api.clone();
                async move { api.list_resources(&node, kind).await }
            })
            .await
    }

    pub async fn resolve(&self, node: &str, id: u32) -> Result<ResourceRef> {
        self.resolver.resolve(node, id).await
    }

    pub async fn resource_status(&self, target: &ResourceRef) -> Result<ResourceStatus> {
        self.api.resource_status(target).await
    }

    pub async fn resource_config(&self, target: &ResourceRef) -> Result<ResourceConfig> {
        self.api.resource_config(target).await
    }

    pub async fn firewall_rules(
        &self,
        node: &str,
        id: u32,
        kind: Option<ResourceKind>,
    ) -> Result<Vec<FirewallRule>> {
        let target = self.resolver.resolve_or(node, id, kind).await?;
        self.api.firewall_rules(&target).await
    }

    // ---- actions ----

    pub async fn lifecycle(&self, target: ResourceRef, verb: &str) -> Result<ActionOutcome> {
        self.dispatcher
            .dispatch(&ActionRequest::new(target, verb))
            .await
    }

    pub async fn snapshot(
        &self,
        node: &str,
        id: u32,
        kind: Option<ResourceKind>,
        verb: SnapshotVerb,
        args: SnapshotArgs,
    ) -> Result<DispatchOutcome> {
        self.dispatcher.snapshot(node, id, kind, verb, args).await
    }

    // ---- storage / backup ----

    pub async fn list_storage(&self, node: &str) -> Result<Vec<StorageEntry>> {
        self.api.list_storage(node).await
    }

    pub async fn list_storage_all(&self) -> AggregateResult<StorageEntry> {
        let api = self.api.clone();
        self.aggregator
            .aggregate_flat(move |node| {
                let api = api.clone();
                async move { api.list_storage(&node).await }
            })
            .await
    }

    pub async fn create_backup(
        &self,
        node: &str,
        id: u32,
        storage: &str,
        mode: &str,
        compress: &str,
    ) -> Result<TaskHandle> {
        self.backups
            .create_backup(node, id, storage, mode, compress)
            .await
    }

    pub async fn list_backups(
        &self,
        node: &str,
        storage: Option<&str>,
        id: Option<u32>,
    ) -> Result<BackupListing> {
        self.backups.list_backups(node, storage, id).await
    }

    pub async fn restore_backup(&self, req: &RestoreRequest) -> Result<TaskHandle> {
        self.backups.restore_backup(req).await
    }

    // ---- tasks ----

    pub async fn task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        self.tasks.status(handle).await
    }

    pub async fn task_log(
        &self,
        handle: &TaskHandle,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<TaskLogLine>> {
        self.tasks.log(handle, start, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::transport::Method;
    use proxgate_core::error::GatewayError;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_vms_scenario() {
        let mock = MockCluster::new()
            .with_nodes(&[("a", "online"), ("b", "offline"), ("c", "online")])
            .on(
                Method::Get,
                "/nodes/a/qemu",
                json!([{"vmid": 100, "status": "running"}, {"vmid": 101, "status": "stopped"}]),
            )
            .on_error(
                Method::Get,
                "/nodes/c/qemu",
                GatewayError::UpstreamApi {
                    status: Some(500),
                    message: "pveproxy timeout".to_string(),
                },
            )
            .into_arc();
        let gw = Gateway::new(mock.clone(), SafetyGate::disabled());
        let result = gw.list_resources(ResourceKind::Vm).await;

        assert_eq!(result.items.len(), 2);
        assert!(result.items.iter().all(|i| i.node == "a"));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors.contains_key("c"));
        assert_eq!(mock.call_count(), 3);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["items"][0]["node"], "a");
        assert_eq!(json["items"][0]["vmid"], 100);
    }

    #[tokio::test]
    async fn test_firewall_rules_resolve_when_kind_missing() {
        let mock = MockCluster::new()
            .on(Method::Get, "/nodes/pve1/qemu/100/status/current", json!({"status": "running"}))
            .on(
                Method::Get,
                "/nodes/pve1/qemu/100/firewall/rules",
                json!([{"pos": 0, "type": "in", "action": "ACCEPT"}]),
            )
            .into_arc();
        let gw = Gateway::new(mock.clone(), SafetyGate::disabled());
        let rules = gw.firewall_rules("pve1", 100, None).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_gate_shared_by_snapshot_and_restore() {
        let mock = MockCluster::new().into_arc();
        let gw = Gateway::new(mock.clone(), SafetyGate::disabled());
        assert!(!gw.gate().is_enabled());

        let err = gw
            .snapshot(
                "pve1",
                100,
                Some(ResourceKind::Vm),
                SnapshotVerb::Rollback,
                SnapshotArgs::named("before"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "safety_gate_rejected");

        let err = gw
            .restore_backup(&RestoreRequest {
                node: "pve1".to_string(),
                archive: "local:backup/vzdump-qemu-100.vma.zst".to_string(),
                id: 100,
                kind: Some(ResourceKind::Vm),
                storage: None,
                force: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "safety_gate_rejected");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_degraded_list_reports_connectivity_error() {
        use crate::connection::Connection;
        use proxgate_core::aggregate::NODE_LISTING_KEY;
        use proxgate_core::error::{ConnectivityError, ConnectivityKind};

        let down = Connection::Disconnected(ConnectivityError::new(
            ConnectivityKind::ConnectionRefused,
            "connection refused",
        ));
        let gw = Gateway::new(std::sync::Arc::new(down), SafetyGate::disabled());
        for kind in ResourceKind::PROBE_ORDER {
            let result = gw.list_resources(kind).await;
            assert!(result.items.is_empty());
            assert!(result.listing_failed());
            assert!(result.errors[NODE_LISTING_KEY].contains("connection refused"));

            let json = serde_json::to_value(&result).unwrap();
            assert!(json["errors"][NODE_LISTING_KEY].is_string());
        }
    }
}
