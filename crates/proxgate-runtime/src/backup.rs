use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use proxgate_core::error::{GatewayError, Result};
use proxgate_core::gate::SafetyGate;
use proxgate_core::resource::ResourceKind;
use proxgate_core::storage::{BackupEntry, BackupMode, Compression, infer_kind_from_archive};
use proxgate_core::task::TaskHandle;

use crate::api::ClusterApi;
use crate::resolver::ResourceResolver;

/// Backups found on one node, plus the storages that could not be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupListing {
    pub backups: Vec<BackupEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

/// Parameters of a restore. `kind` should be given whenever known; the
/// archive name is only a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub node: String,
    pub archive: String,
    pub id: u32,
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Clone)]
pub struct BackupWorkflow {
    api: ClusterApi,
    resolver: ResourceResolver,
    gate: SafetyGate,
}

impl BackupWorkflow {
    pub fn new(api: ClusterApi, resolver: ResourceResolver, gate: SafetyGate) -> Self {
        Self {
            api,
            resolver,
            gate,
        }
    }

    /// Start a vzdump job. Mode and compression are checked before the
    /// resolver runs, so bad parameters cost no remote calls.
    pub async fn create_backup(
        &self,
        node: &str,
        id: u32,
        storage: &str,
        mode: &str,
        compress: &str,
    ) -> Result<TaskHandle> {
        let mode: BackupMode = mode.parse()?;
        let compress: Compression = compress.parse()?;

        let target = self.resolver.resolve(node, id).await?;
        info!(node, id, kind = %target.kind, storage, mode = mode.as_str(), compress = compress.as_str(), "Starting backup");
        self.api.vzdump(node, id, storage, mode, compress).await
    }

    /// Backup archives on the backup-capable storages of `node`.
    ///
    /// Failing to list storages is an error; failing to read one storage's
    /// content is recorded per storage and the rest are still returned.
    pub async fn list_backups(
        &self,
        node: &str,
        storage: Option<&str>,
        id: Option<u32>,
    ) -> Result<BackupListing> {
        let storages = self.api.list_storage(node).await?;
        let mut listing = BackupListing::default();

        for entry in storages
            .into_iter()
            .filter(|s| s.is_backup_capable())
            .filter(|s| storage.is_none_or(|want| s.storage == want))
        {
            match self.api.storage_content(node, &entry.storage).await {
                Ok(content) => listing.backups.extend(
                    content
                        .into_iter()
                        .filter(|c| c.is_backup())
                        .filter(|c| id.is_none_or(|want| c.vmid == Some(want)))
                        .map(|c| BackupEntry::from_content(&entry.storage, c)),
                ),
                Err(e) => {
                    warn!(node, storage = %entry.storage, error = %e, "Storage content unavailable");
                    listing.errors.insert(entry.storage, e.to_string());
                }
            }
        }
        Ok(listing)
    }

    /// Restore an archive into `id`. Destructive: the gate is checked
    /// before anything else.
    pub async fn restore_backup(&self, req: &RestoreRequest) -> Result<TaskHandle> {
        self.gate.admit("restore_backup")?;

        let kind = match req.kind {
            Some(kind) => kind,
            None => infer_kind_from_archive(&req.archive).ok_or_else(|| {
                GatewayError::InvalidParameter {
                    name: "archive".to_string(),
                    value: req.archive.clone(),
                    expected: "a vzdump-qemu-*/vzdump-lxc-* or .vma*/.tar* archive, or an explicit kind"
                        .to_string(),
                }
            })?,
        };
        if req.kind.is_none() {
            warn!(archive = %req.archive, kind = %kind, "Restore kind inferred from archive name");
        }

        info!(node = %req.node, id = req.id, kind = %kind, archive = %req.archive, "Restoring backup");
        self.api
            .restore(
                &req.node,
                kind,
                req.id,
                &req.archive,
                req.storage.as_deref(),
                req.force,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::transport::Method;
    use serde_json::json;
    use std::sync::Arc;

    const UPID: &str = "UPID:pve1:0000A1B2:0012C3D4:65F0A1B2:vzdump:100:root@pam:";

    fn workflow(mock: Arc<MockCluster>, gate: SafetyGate) -> BackupWorkflow {
        let api = ClusterApi::new(mock);
        BackupWorkflow::new(api.clone(), ResourceResolver::new(api), gate)
    }

    fn restore(archive: &str, kind: Option<ResourceKind>) -> RestoreRequest {
        RestoreRequest {
            node: "pve1".to_string(),
            archive: archive.to_string(),
            id: 300,
            kind,
            storage: None,
            force: false,
        }
    }

    #[tokio::test]
    async fn test_create_backup_on_vm() {
        let mock = MockCluster::new()
            .on(Method::Get, "/nodes/pve1/qemu/100/status/current", json!({"status": "running"}))
            .on(Method::Post, "/nodes/pve1/vzdump", json!(UPID))
            .into_arc();
        let handle = workflow(mock.clone(), SafetyGate::disabled())
            .create_backup("pve1", 100, "local", "snapshot", "zstd")
            .await
            .unwrap();
        assert_eq!(handle, TaskHandle::new("pve1", UPID));

        let dumps = mock.calls_with(Method::Post);
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].param("mode"), Some("snapshot"));
        assert_eq!(dumps[0].param("compress"), Some("zstd"));
        assert_eq!(dumps[0].param("vmid"), Some("100"));
        assert_eq!(dumps[0].param("storage"), Some("local"));
    }

    #[tokio::test]
    async fn test_create_backup_validates_before_resolving() {
        let mock = MockCluster::new().into_arc();
        let wf = workflow(mock.clone(), SafetyGate::disabled());

        let err = wf
            .create_backup("pve1", 100, "local", "live", "zstd")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mode"));
        let err = wf
            .create_backup("pve1", 100, "local", "stop", "xz")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("compress"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_list_backups_filters_storage_type_content_and_id() {
        let mock = MockCluster::new()
            .on(
                Method::Get,
                "/nodes/pve1/storage",
                json!([
                    {"storage": "local", "type": "dir"},
                    {"storage": "local-lvm", "type": "lvmthin"},
                    {"storage": "nas", "type": "nfs"},
                    {"storage": "pbs", "type": "pbs"}
                ]),
            )
            .on(
                Method::Get,
                "/nodes/pve1/storage/local/content",
                json!([
                    {"volid": "local:backup/vzdump-qemu-100.vma.zst", "content": "backup", "vmid": 100},
                    {"volid": "local:backup/vzdump-lxc-200.tar.zst", "content": "backup", "vmid": "200"},
                    {"volid": "local:iso/debian.iso", "content": "iso"}
                ]),
            )
            .on(
                Method::Get,
                "/nodes/pve1/storage/nas/content",
                json!([
                    {"volid": "nas:backup/vzdump-qemu-100-old.vma.gz", "content": "backup", "vmid": 100}
                ]),
            )
            .on_error(
                Method::Get,
                "/nodes/pve1/storage/pbs/content",
                GatewayError::UpstreamApi {
                    status: Some(500),
                    message: "datastore unreachable".to_string(),
                },
            )
            .into_arc();
        let wf = workflow(mock.clone(), SafetyGate::disabled());

        let listing = wf.list_backups("pve1", None, Some(100)).await.unwrap();
        let volids: Vec<&str> = listing.backups.iter().map(|b| b.volid.as_str()).collect();
        assert_eq!(
            volids,
            vec![
                "local:backup/vzdump-qemu-100.vma.zst",
                "nas:backup/vzdump-qemu-100-old.vma.gz"
            ]
        );
        assert_eq!(listing.backups[1].storage, "nas");
        assert!(listing.errors["pbs"].contains("datastore unreachable"));
        // lvmthin cannot hold backups and is never read.
        assert!(mock.calls_to("/nodes/pve1/storage/local-lvm/content").is_empty());
    }

    #[tokio::test]
    async fn test_list_backups_storage_filter() {
        let mock = MockCluster::new()
            .on(
                Method::Get,
                "/nodes/pve1/storage",
                json!([{"storage": "local", "type": "dir"}, {"storage": "nas", "type": "nfs"}]),
            )
            .on(Method::Get, "/nodes/pve1/storage/nas/content", json!([]))
            .into_arc();
        let listing = workflow(mock.clone(), SafetyGate::disabled())
            .list_backups("pve1", Some("nas"), None)
            .await
            .unwrap();
        assert!(listing.backups.is_empty());
        assert!(listing.errors.is_empty());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_restore_rejected_when_gate_disabled() {
        for kind in [None, Some(ResourceKind::Vm)] {
            let mock = MockCluster::new().into_arc();
            let err = workflow(mock.clone(), SafetyGate::disabled())
                .restore_backup(&restore("local:backup/anything", kind))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "safety_gate_rejected");
            assert_eq!(mock.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_restore_explicit_kind_beats_archive_name() {
        let mock = MockCluster::new()
            .on(Method::Post, "/nodes/pve1/lxc", json!(UPID))
            .into_arc();
        // Name says qemu, caller says container.
        workflow(mock.clone(), SafetyGate::enabled())
            .restore_backup(&restore(
                "local:backup/vzdump-qemu-100.vma.zst",
                Some(ResourceKind::Container),
            ))
            .await
            .unwrap();
        assert_eq!(mock.calls()[0].path, "/nodes/pve1/lxc");
    }

    #[tokio::test]
    async fn test_restore_infers_vm_from_archive() {
        let mock = MockCluster::new()
            .on(Method::Post, "/nodes/pve1/qemu", json!(UPID))
            .into_arc();
        let handle = workflow(mock.clone(), SafetyGate::enabled())
            .restore_backup(&restore("local:backup/vzdump-qemu-100.vma.zst", None))
            .await
            .unwrap();
        assert_eq!(handle.upid, UPID);
        assert_eq!(
            mock.calls()[0].param("archive"),
            Some("local:backup/vzdump-qemu-100.vma.zst")
        );
    }

    #[tokio::test]
    async fn test_restore_uninferable_archive() {
        let mock = MockCluster::new().into_arc();
        let err = workflow(mock.clone(), SafetyGate::enabled())
            .restore_backup(&restore("local:backup/mystery.bin", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_parameter");
        assert_eq!(mock.call_count(), 0);
    }
}
