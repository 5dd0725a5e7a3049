use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use proxgate_core::config::{ConnectMode, GatewayConfig};
use proxgate_core::error::{ConnectivityError, ConnectivityKind, GatewayError, Result};

use crate::http::ProxmoxHttp;
use crate::transport::{ClusterTransport, Method};

/// The single client handle shared by every tool call.
///
/// `Disconnected` only exists in degraded mode: each call fails with the
/// error the startup probe produced, instead of the process exiting.
#[derive(Clone)]
pub enum Connection {
    Connected(Arc<dyn ClusterTransport>),
    Disconnected(ConnectivityError),
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    pub fn into_transport(self) -> Arc<dyn ClusterTransport> {
        Arc::new(self)
    }
}

#[async_trait]
impl ClusterTransport for Connection {
    async fn call(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Value> {
        match self {
            Self::Connected(t) => t.call(method, path, params).await,
            Self::Disconnected(e) => Err(GatewayError::Connectivity(e.clone())),
        }
    }
}

pub struct ConnectionManager;

impl ConnectionManager {
    /// Build the HTTP client from `config` and probe it once.
    pub async fn acquire(
        config: &GatewayConfig,
    ) -> std::result::Result<Connection, ConnectivityError> {
        let mode = config.gateway.connect_mode;
        match ProxmoxHttp::new(config) {
            Ok(http) => {
                info!(base_url = %http.base_url(), "Connecting to cluster API");
                Self::acquire_with(Arc::new(http), mode).await
            }
            Err(e) => Self::settle(e, mode),
        }
    }

    /// Probe `transport` with exactly one `GET /version`.
    pub async fn acquire_with(
        transport: Arc<dyn ClusterTransport>,
        mode: ConnectMode,
    ) -> std::result::Result<Connection, ConnectivityError> {
        match transport.call(Method::Get, "/version", &[]).await {
            Ok(data) => {
                let version = data
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                info!(version, "Cluster API reachable");
                Ok(Connection::Connected(transport))
            }
            Err(GatewayError::Connectivity(e)) => Self::settle(e, mode),
            // Reached the API but it refused the probe: bad credentials, proxy page.
            Err(other) => Self::settle(
                ConnectivityError::new(ConnectivityKind::Unknown, other.to_string()),
                mode,
            ),
        }
    }

    fn settle(
        e: ConnectivityError,
        mode: ConnectMode,
    ) -> std::result::Result<Connection, ConnectivityError> {
        match mode {
            ConnectMode::Strict => {
                error!(kind = %e.kind, error = %e, "Cluster connectivity probe failed");
                Err(e)
            }
            ConnectMode::Degraded => {
                warn!(kind = %e.kind, error = %e, "Cluster unreachable, starting disconnected");
                Ok(Connection::Disconnected(e))
            }
        }
    }
}
