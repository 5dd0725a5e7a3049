use async_trait::async_trait;
use serde_json::Value;

use proxgate_core::error::Result;

/// HTTP verb of a cluster API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    /// Mutating calls need the CSRF token under ticket auth.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// The remote capability set: one request/response exchange against the
/// cluster API, path relative to `/api2/json`.
///
/// Implementations return the unwrapped `data` member of the response
/// envelope and must be safe to call concurrently.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn call(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Value>;
}
