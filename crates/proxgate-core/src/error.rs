use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::ResourceKind;

/// Failure class for anything that prevented a request from reaching the cluster API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityKind {
    Tls,
    Timeout,
    ConnectionRefused,
    MalformedHost,
    Unknown,
}

impl ConnectivityKind {
    /// What the operator should try next.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Tls => {
                "retry with relaxed TLS verification (PROXMOX_VERIFY_SSL=false or --insecure), or install the cluster CA"
            }
            Self::Timeout => {
                "check that the cluster is reachable from this host, or raise PROXMOX_TIMEOUT_SECS"
            }
            Self::ConnectionRefused => {
                "verify the API port (default 8006) and that pveproxy is running on the target node"
            }
            Self::MalformedHost => {
                "PROXMOX_HOST must be a bare hostname or IP, optionally with :port, without scheme or path"
            }
            Self::Unknown => "inspect the detail above and the cluster's pveproxy log",
        }
    }
}

impl std::fmt::Display for ConnectivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tls => write!(f, "TLS error"),
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::MalformedHost => write!(f, "malformed host"),
            Self::Unknown => write!(f, "unknown connectivity error"),
        }
    }
}

/// A classified connectivity failure with operator-actionable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail} (hint: {})", .kind.hint())]
pub struct ConnectivityError {
    pub kind: ConnectivityKind,
    pub detail: String,
}

impl ConnectivityError {
    pub fn new(kind: ConnectivityKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a transport failure from its flattened message.
    ///
    /// `timed_out` short-circuits to `Timeout`; otherwise the message (usually
    /// the joined error source chain) is matched against known markers.
    pub fn classify(message: &str, timed_out: bool) -> Self {
        let lower = message.to_ascii_lowercase();
        let kind = if timed_out || lower.contains("timed out") || lower.contains("timeout") {
            ConnectivityKind::Timeout
        } else if [
            "certificate",
            "tls",
            "ssl",
            "handshake",
            "unknownissuer",
            "corrupt message",
            "invalidcontenttype",
        ]
        .iter()
        .any(|m| lower.contains(m))
        {
            ConnectivityKind::Tls
        } else if lower.contains("refused") {
            ConnectivityKind::ConnectionRefused
        } else if [
            "dns error",
            "failed to lookup",
            "name or service not known",
            "invalid url",
            "invalid port",
            "relative url",
            "empty host",
        ]
        .iter()
        .any(|m| lower.contains(m))
        {
            ConnectivityKind::MalformedHost
        } else {
            ConnectivityKind::Unknown
        };
        Self::new(kind, message)
    }
}

/// Error taxonomy of the resource action gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error("resource {id} not found on node {node} (probed vm, then container)")]
    ResourceNotFound { node: String, id: u32 },

    #[error("action '{verb}' is not allowed for a {kind}")]
    InvalidAction { kind: ResourceKind, verb: String },

    #[error(
        "'{action}' is destructive and dangerous mode is disabled; restart with --dangerous-mode or PROXMOX_DANGEROUS_MODE=true"
    )]
    SafetyGateRejected { action: String },

    #[error("invalid {name} '{value}': expected one of {expected}")]
    InvalidParameter {
        name: String,
        value: String,
        expected: String,
    },

    #[error("cluster API error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    UpstreamApi {
        status: Option<u16>,
        message: String,
    },

    #[error("unexpected response shape from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Stable machine-readable code, used in tool responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity_error",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::InvalidAction { .. } => "invalid_action",
            Self::SafetyGateRejected { .. } => "safety_gate_rejected",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::UpstreamApi { .. } => "upstream_api_error",
            Self::Decode { .. } => "decode_error",
        }
    }

    /// True for errors decided locally, before any remote call.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidAction { .. }
                | Self::SafetyGateRejected { .. }
                | Self::InvalidParameter { .. }
        )
    }

    pub fn invalid_parameter(name: &str, value: &str, expected: &[&str]) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timeout_flag_wins() {
        let err = ConnectivityError::classify("certificate verify failed", true);
        assert_eq!(err.kind, ConnectivityKind::Timeout);
    }

    #[test]
    fn test_classify_tls() {
        let err = ConnectivityError::classify(
            "error sending request: invalid peer certificate: UnknownIssuer",
            false,
        );
        assert_eq!(err.kind, ConnectivityKind::Tls);
        assert!(err.to_string().contains("relaxed TLS verification"));
    }

    #[test]
    fn test_classify_refused() {
        let err = ConnectivityError::classify(
            "error trying to connect: tcp connect error: Connection refused (os error 111)",
            false,
        );
        assert_eq!(err.kind, ConnectivityKind::ConnectionRefused);
    }

    #[test]
    fn test_classify_malformed_host() {
        let err = ConnectivityError::classify(
            "error trying to connect: dns error: failed to lookup address information",
            false,
        );
        assert_eq!(err.kind, ConnectivityKind::MalformedHost);
    }

    #[test]
    fn test_classify_unknown() {
        let err = ConnectivityError::classify("connection reset by peer", false);
        assert_eq!(err.kind, ConnectivityKind::Unknown);
    }

    #[test]
    fn test_error_codes() {
        let err = GatewayError::InvalidAction {
            kind: ResourceKind::Vm,
            verb: "pause".to_string(),
        };
        assert_eq!(err.code(), "invalid_action");
        assert!(err.is_local_rejection());
        assert_eq!(err.to_string(), "action 'pause' is not allowed for a vm");

        let err = GatewayError::UpstreamApi {
            status: Some(500),
            message: "VM 100 not running".to_string(),
        };
        assert_eq!(err.code(), "upstream_api_error");
        assert!(!err.is_local_rejection());
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_connectivity_converts_into_gateway_error() {
        let err: GatewayError =
            ConnectivityError::new(ConnectivityKind::Timeout, "deadline elapsed").into();
        assert_eq!(err.code(), "connectivity_error");
        assert!(err.to_string().contains("timeout: deadline elapsed"));
    }

    #[test]
    fn test_invalid_parameter_lists_expected() {
        let err = GatewayError::invalid_parameter("compress", "xz", &["lzo", "gzip", "zstd"]);
        assert_eq!(
            err.to_string(),
            "invalid compress 'xz': expected one of lzo, gzip, zstd"
        );
    }
}
