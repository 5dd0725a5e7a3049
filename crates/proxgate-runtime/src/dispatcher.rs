use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use proxgate_core::error::Result;
use proxgate_core::gate::SafetyGate;
use proxgate_core::resource::{ResourceConfig, ResourceKind, ResourceRef, validate_lifecycle};
use proxgate_core::snapshot::{SnapshotInfo, SnapshotSpec, SnapshotVerb, validate_snapshot_name};
use proxgate_core::task::ActionOutcome;

use crate::api::ClusterApi;
use crate::resolver::ResourceResolver;

/// A lifecycle verb aimed at a resolved resource. The verb is untrusted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub target: ResourceRef,
    pub verb: String,
}

impl ActionRequest {
    pub fn new(target: ResourceRef, verb: impl Into<String>) -> Self {
        Self {
            target,
            verb: verb.into(),
        }
    }
}

/// Snapshot call parameters. `name` is required by every verb except `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vmstate: bool,
}

impl SnapshotArgs {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Result of a snapshot dispatch; shape depends on the verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchOutcome {
    Action(ActionOutcome),
    Snapshots(Vec<SnapshotInfo>),
    Config(ResourceConfig),
}

/// Validates verbs and the safety gate, then issues exactly one remote call.
///
/// Rejections happen before any network traffic. Dispatch never waits for
/// the remote task; callers poll through the task tracker.
#[derive(Clone)]
pub struct ActionDispatcher {
    api: ClusterApi,
    resolver: ResourceResolver,
    gate: SafetyGate,
}

impl ActionDispatcher {
    pub fn new(api: ClusterApi, resolver: ResourceResolver, gate: SafetyGate) -> Self {
        Self {
            api,
            resolver,
            gate,
        }
    }

    pub fn gate(&self) -> SafetyGate {
        self.gate
    }

    pub async fn dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome> {
        let target = &request.target;
        let verb = validate_lifecycle(target.kind, &request.verb).inspect_err(|_| {
            warn!(kind = %target.kind, verb = %request.verb, "Verb not allowed for kind");
        })?;
        info!(node = %target.node, id = target.id, kind = %target.kind, verb = %verb, "Dispatching lifecycle action");
        self.api.resource_action(target, verb).await
    }

    /// Snapshot verbs on `(node, id)`. `kind` is probed when absent, but only
    /// after the gate and argument checks pass.
    pub async fn snapshot(
        &self,
        node: &str,
        id: u32,
        kind: Option<ResourceKind>,
        verb: SnapshotVerb,
        args: SnapshotArgs,
    ) -> Result<DispatchOutcome> {
        if verb.is_destructive() {
            self.gate.admit(&format!("{}_snapshot", verb))?;
        }
        let name = if verb.needs_name() {
            let name = args.name.clone().unwrap_or_default();
            validate_snapshot_name(&name)?;
            name
        } else {
            String::new()
        };

        let target = self.resolver.resolve_or(node, id, kind).await?;
        info!(node, id, kind = %target.kind, verb = %verb, snapshot = %name, "Dispatching snapshot action");

        Ok(match verb {
            SnapshotVerb::Create => {
                let spec = SnapshotSpec {
                    name,
                    description: args.description,
                    vmstate: args.vmstate,
                };
                DispatchOutcome::Action(ActionOutcome::Task(
                    self.api.snapshot_create(&target, &spec).await?,
                ))
            }
            SnapshotVerb::List => DispatchOutcome::Snapshots(self.api.snapshot_list(&target).await?),
            SnapshotVerb::GetConfig => {
                DispatchOutcome::Config(self.api.snapshot_config(&target, &name).await?)
            }
            SnapshotVerb::Delete => DispatchOutcome::Action(ActionOutcome::Task(
                self.api.snapshot_delete(&target, &name).await?,
            )),
            SnapshotVerb::Rollback => DispatchOutcome::Action(ActionOutcome::Task(
                self.api.snapshot_rollback(&target, &name).await?,
            )),
        })
    }
}
