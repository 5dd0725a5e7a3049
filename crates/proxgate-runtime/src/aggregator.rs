use std::future::Future;

use tracing::{debug, warn};

use proxgate_core::aggregate::AggregateResult;
use proxgate_core::error::Result;

use crate::directory::NodeDirectory;

/// Fan-out of one read query over the online nodes.
///
/// Nodes are visited one after another in enumeration order. Each node gets
/// exactly one attempt; its failure lands in `errors` and never discards
/// what earlier nodes returned.
#[derive(Clone)]
pub struct Aggregator {
    directory: NodeDirectory,
}

impl Aggregator {
    pub fn new(directory: NodeDirectory) -> Self {
        Self { directory }
    }

    /// One item per answering node.
    pub async fn aggregate<T, F, Fut>(&self, query: F) -> AggregateResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.collect(query, |out, node, item| out.push(node, item))
            .await
    }

    /// Per-node lists flattened into one, each element tagged with its node.
    pub async fn aggregate_flat<T, F, Fut>(&self, query: F) -> AggregateResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        self.collect(query, |out, node, items: Vec<T>| {
            for item in items {
                out.push(node, item);
            }
        })
        .await
    }

    async fn collect<R, T, F, Fut, M>(&self, mut query: F, mut merge: M) -> AggregateResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<R>>,
        M: FnMut(&mut AggregateResult<T>, &str, R),
    {
        let mut out = AggregateResult::default();
        let nodes = match self.directory.try_list_online_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                // Still empty, but the caller sees why.
                warn!(error = %e, "Node listing failed, nothing to aggregate");
                out.record_listing_error(e.to_string());
                return out;
            }
        };
        for node in nodes {
            match query(node.name.clone()).await {
                Ok(value) => merge(&mut out, &node.name, value),
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Node query failed");
                    out.record_error(&node.name, e.to_string());
                }
            }
        }
        debug!(
            items = out.items.len(),
            failed = out.errors.len(),
            "Aggregation finished"
        );
        out
    }
}
