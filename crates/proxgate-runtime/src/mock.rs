//! In-memory cluster transport for tests.
//!
//! Routes are matched on exact (method, path). Every call is recorded,
//! matched or not, so tests can assert how many remote calls happened and
//! in which order.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use proxgate_core::error::{GatewayError, Result};

use crate::transport::{ClusterTransport, Method};

/// One observed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Responder = Box<dyn Fn(&[(String, String)]) -> Result<Value> + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    responder: Responder,
}

/// Scripted cluster. Unrouted calls fail like a missing API path.
#[derive(Default)]
pub struct MockCluster {
    routes: Vec<Route>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `method path` with `data`.
    pub fn on(self, method: Method, path: &str, data: Value) -> Self {
        self.on_with(method, path, move |_| Ok(data.clone()))
    }

    /// Fail `method path` with `err`.
    pub fn on_error(self, method: Method, path: &str, err: GatewayError) -> Self {
        self.on_with(method, path, move |_| Err(err.clone()))
    }

    pub fn on_with<F>(mut self, method: Method, path: &str, f: F) -> Self
    where
        F: Fn(&[(String, String)]) -> Result<Value> + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            responder: Box::new(f),
        });
        self
    }

    /// `GET /nodes` with the given (name, status) pairs, in order.
    pub fn with_nodes(self, nodes: &[(&str, &str)]) -> Self {
        let data: Vec<Value> = nodes
            .iter()
            .map(|(name, status)| serde_json::json!({"node": name, "status": status}))
            .collect();
        self.on(Method::Get, "/nodes", Value::Array(data))
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls made with `method`, excluding everything else.
    pub fn calls_with(&self, method: Method) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    /// Calls whose path is exactly `path`.
    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }
}

#[async_trait]
impl ClusterTransport for MockCluster {
    async fn call(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            params: params.clone(),
        });

        match self
            .routes
            .iter()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => (route.responder)(&params),
            None => Err(GatewayError::UpstreamApi {
                status: Some(501),
                message: format!("Method '{} {}' not implemented", method, path),
            }),
        }
    }
}
