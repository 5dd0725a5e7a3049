use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `errors` key for a failed node listing. Parentheses never occur in node
/// names, so it cannot shadow a real node.
pub const NODE_LISTING_KEY: &str = "(node listing)";

/// A value annotated with the node that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeScoped<T> {
    pub node: String,
    #[serde(flatten)]
    pub item: T,
}

/// Best-effort union of a fan-out read.
///
/// `items` holds data only from nodes that answered. A node missing from
/// `items` may still exist; look in `errors`, or it was offline and never asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult<T> {
    pub items: Vec<NodeScoped<T>>,
    pub errors: BTreeMap<String, String>,
}

impl<T> Default for AggregateResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: BTreeMap::new(),
        }
    }
}

impl<T> AggregateResult<T> {
    pub fn push(&mut self, node: &str, item: T) {
        self.items.push(NodeScoped {
            node: node.to_string(),
            item,
        });
    }

    pub fn record_error(&mut self, node: &str, reason: impl Into<String>) {
        self.errors.insert(node.to_string(), reason.into());
    }

    /// The node set itself could not be listed, so nothing was asked.
    pub fn record_listing_error(&mut self, reason: impl Into<String>) {
        self.errors.insert(NODE_LISTING_KEY.to_string(), reason.into());
    }

    pub fn listing_failed(&self) -> bool {
        self.errors.contains_key(NODE_LISTING_KEY)
    }

    /// One or more nodes, or the node listing, failed during the fan-out.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Drop node annotations, keeping enumeration order.
    pub fn into_values(self) -> Vec<T> {
        self.items.into_iter().map(|s| s.item).collect()
    }

    pub fn map<U>(self, mut f: impl FnMut(&str, T) -> U) -> AggregateResult<U> {
        AggregateResult {
            items: self
                .items
                .into_iter()
                .map(|s| {
                    let item = f(&s.node, s.item);
                    NodeScoped { node: s.node, item }
                })
                .collect(),
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_flag() {
        let mut agg: AggregateResult<u32> = AggregateResult::default();
        agg.push("pve1", 1);
        assert!(!agg.is_partial());
        agg.record_error("pve2", "HTTP 595");
        assert!(agg.is_partial());
        assert_eq!(agg.items.len(), 1);
        assert!(!agg.listing_failed());

        let mut empty: AggregateResult<u32> = AggregateResult::default();
        empty.record_listing_error("connection refused");
        assert!(empty.listing_failed());
        assert!(empty.is_partial());
    }

    #[test]
    fn test_serializes_flattened_items() {
        #[derive(Serialize)]
        struct Row {
            vmid: u32,
        }
        let mut agg = AggregateResult::default();
        agg.push("pve1", Row { vmid: 100 });
        agg.record_error("pve3", "connection refused");

        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json["items"][0]["node"], "pve1");
        assert_eq!(json["items"][0]["vmid"], 100);
        assert_eq!(json["errors"]["pve3"], "connection refused");
    }

    #[test]
    fn test_map_keeps_order_and_errors() {
        let mut agg = AggregateResult::default();
        agg.push("a", 1);
        agg.push("b", 2);
        agg.record_error("c", "down");
        let mapped = agg.map(|node, v| format!("{}:{}", node, v * 10));
        assert_eq!(mapped.clone().into_values(), vec!["a:10", "b:20"]);
        assert_eq!(mapped.errors.len(), 1);
    }
}
