use tracing::{debug, warn};

use proxgate_core::error::Result;
use proxgate_core::node::ClusterNode;

use crate::api::ClusterApi;

/// Node enumeration. Nothing is cached; every call asks the cluster.
#[derive(Clone)]
pub struct NodeDirectory {
    api: ClusterApi,
}

impl NodeDirectory {
    pub fn new(api: ClusterApi) -> Self {
        Self { api }
    }

    /// All nodes, any status. Errors propagate.
    pub async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        self.api.list_nodes().await
    }

    /// Nodes whose status is not `offline`, in cluster order. Errors propagate.
    pub async fn try_list_online_nodes(&self) -> Result<Vec<ClusterNode>> {
        let online: Vec<ClusterNode> = self
            .api
            .list_nodes()
            .await?
            .into_iter()
            .filter(|n| n.is_available())
            .collect();
        debug!(count = online.len(), "Online nodes");
        Ok(online)
    }

    /// Fail-open form of [`Self::try_list_online_nodes`]: a failed listing
    /// yields an empty set and a warning.
    pub async fn list_online_nodes(&self) -> Vec<ClusterNode> {
        match self.try_list_online_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Node listing failed, treating cluster as empty");
                Vec::new()
            }
        }
    }
}
