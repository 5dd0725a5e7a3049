use tracing::debug;

use proxgate_core::error::{GatewayError, Result};
use proxgate_core::node::validate_node_name;
use proxgate_core::resource::{ResourceKind, ResourceRef};

use crate::api::ClusterApi;

/// Turns a bare (node, id) into a [`ResourceRef`] by ordered probing.
///
/// The result is valid for the current call only; callers re-resolve next
/// time since a migration or re-creation can change the kind.
#[derive(Clone)]
pub struct ResourceResolver {
    api: ClusterApi,
}

impl ResourceResolver {
    pub fn new(api: ClusterApi) -> Self {
        Self { api }
    }

    /// Probe vm status, then container status. One or two calls, always in
    /// that order.
    ///
    /// A connectivity failure aborts immediately: it says nothing about the
    /// resource, and probing the second kind would fail the same way.
    pub async fn resolve(&self, node: &str, id: u32) -> Result<ResourceRef> {
        // A malformed node is a caller error, not a lookup miss.
        validate_node_name(node)?;
        for kind in ResourceKind::PROBE_ORDER {
            let candidate = ResourceRef::new(node, id, kind);
            match self.api.resource_status(&candidate).await {
                Ok(_) => {
                    debug!(node, id, kind = %kind, "Resolved resource kind");
                    return Ok(candidate);
                }
                Err(e @ GatewayError::Connectivity(_)) => return Err(e),
                Err(e) => {
                    debug!(node, id, kind = %kind, error = %e, "Probe missed");
                }
            }
        }
        Err(GatewayError::ResourceNotFound {
            node: node.to_string(),
            id,
        })
    }

    /// Use `kind` when the caller has it; probe only when it does not.
    pub async fn resolve_or(
        &self,
        node: &str,
        id: u32,
        kind: Option<ResourceKind>,
    ) -> Result<ResourceRef> {
        match kind {
            Some(kind) => Ok(ResourceRef::new(node, id, kind)),
            None => self.resolve(node, id).await,
        }
    }
}
