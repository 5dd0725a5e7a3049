use std::error::Error as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use proxgate_core::config::{AuthMethod, GatewayConfig};
use proxgate_core::error::{ConnectivityError, ConnectivityKind, GatewayError, Result};

use crate::transport::{ClusterTransport, Method};

/// Proxmox tickets expire after two hours; refresh before that.
const TICKET_LIFETIME: Duration = Duration::from_secs(110 * 60);

/// Ticket-based session obtained from `POST /access/ticket`.
#[derive(Clone)]
struct Ticket {
    cookie: String,
    csrf: String,
    issued: Instant,
}

impl Ticket {
    fn is_fresh(&self) -> bool {
        self.issued.elapsed() < TICKET_LIFETIME
    }
}

#[derive(Deserialize)]
struct TicketData {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf: String,
}

/// reqwest-backed transport for the Proxmox VE REST API.
///
/// `reqwest::Client` pools connections internally and is `Send + Sync`, so a
/// single instance behind an `Arc` serves concurrent tool calls.
pub struct ProxmoxHttp {
    client: reqwest::Client,
    base_url: String,
    auth: AuthMethod,
    ticket: RwLock<Option<Ticket>>,
}

impl ProxmoxHttp {
    /// Build the client. No network traffic happens here.
    pub fn new(config: &GatewayConfig) -> std::result::Result<Self, ConnectivityError> {
        let base_url = config.base_url()?;
        let auth = config.auth().ok_or_else(|| {
            ConnectivityError::new(ConnectivityKind::Unknown, "no credentials configured")
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("proxgate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.cluster.timeout_secs))
            .danger_accept_invalid_certs(!config.cluster.verify_ssl)
            .build()
            .map_err(|e| classify(&e))?;

        Ok(Self {
            client,
            base_url,
            auth,
            ticket: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Return a valid session ticket, logging in when missing or stale.
    async fn session(&self, user: &str, password: &str) -> Result<Ticket> {
        if let Some(t) = self.ticket.read().await.as_ref()
            && t.is_fresh()
        {
            return Ok(t.clone());
        }

        let mut slot = self.ticket.write().await;
        // Another task may have logged in while we waited for the write lock.
        if let Some(t) = slot.as_ref()
            && t.is_fresh()
        {
            return Ok(t.clone());
        }

        let ticket = self.login(user, password).await?;
        *slot = Some(ticket.clone());
        Ok(ticket)
    }

    async fn login(&self, user: &str, password: &str) -> Result<Ticket> {
        let url = format!("{}/access/ticket", self.base_url);
        debug!(user, "Requesting cluster API ticket");

        let resp = self
            .client
            .post(&url)
            .form(&[("username", user), ("password", password)])
            .send()
            .await
            .map_err(|e| GatewayError::from(classify(&e)))?;

        let data = unwrap_envelope(resp, "/access/ticket").await?;
        let parsed: TicketData =
            serde_json::from_value(data).map_err(|e| GatewayError::Decode {
                endpoint: "/access/ticket".to_string(),
                message: e.to_string(),
            })?;

        info!(user, "Authenticated against cluster API");
        Ok(Ticket {
            cookie: parsed.ticket,
            csrf: parsed.csrf,
            issued: Instant::now(),
        })
    }

    async fn invalidate_session(&self) {
        *self.ticket.write().await = None;
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = match method {
            Method::Get => self.client.get(&url).query(params),
            Method::Post => self.client.post(&url).form(params),
            Method::Delete => self.client.delete(&url).query(params),
        };

        match &self.auth {
            AuthMethod::Token { user, name, value } => {
                req = req.header(
                    "Authorization",
                    format!("PVEAPIToken={}!{}={}", user, name, value),
                );
            }
            AuthMethod::Password { user, password } => {
                let ticket = self.session(user, password).await?;
                req = req.header("Cookie", format!("PVEAuthCookie={}", ticket.cookie));
                if method.is_mutating() {
                    req = req.header("CSRFPreventionToken", ticket.csrf);
                }
            }
        }

        req.send()
            .await
            .map_err(|e| GatewayError::from(classify(&e)))
    }
}

#[async_trait]
impl ClusterTransport for ProxmoxHttp {
    async fn call(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Value> {
        debug!(method = %method, path, "Cluster API request");
        let mut resp = self.send_once(method, path, params).await?;

        // Ticket revoked or expired early: log in again once.
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            && matches!(self.auth, AuthMethod::Password { .. })
        {
            debug!(path, "Session rejected, re-authenticating");
            self.invalidate_session().await;
            resp = self.send_once(method, path, params).await?;
        }

        unwrap_envelope(resp, path).await
    }
}

/// Extract `data` from a success envelope, or turn the failure body into
/// an `UpstreamApi` error with the cluster's own message.
async fn unwrap_envelope(resp: reqwest::Response, path: &str) -> Result<Value> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| GatewayError::from(classify(&e)))?;

    if !status.is_success() {
        return Err(GatewayError::UpstreamApi {
            status: Some(status.as_u16()),
            message: upstream_message(status, &body),
        });
    }

    let envelope: Value = serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
        endpoint: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(match envelope {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        other => other,
    })
}

/// Best available error text: body `message`, per-parameter `errors`, raw body, reason phrase.
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let mut parts = Vec::new();
        if let Some(msg) = map.get("message").and_then(|m| m.as_str()) {
            parts.push(msg.trim().to_string());
        }
        if let Some(Value::Object(errors)) = map.get("errors") {
            for (param, reason) in errors {
                let reason = reason.as_str().map(str::to_string).unwrap_or_else(|| reason.to_string());
                parts.push(format!("{}: {}", param, reason.trim()));
            }
        }
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

/// Classify a reqwest failure by its timeout flag and full source chain.
pub fn classify(e: &reqwest::Error) -> ConnectivityError {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(": ");
        message.push_str(&s.to_string());
        source = s.source();
    }
    if e.is_builder() {
        return ConnectivityError::new(ConnectivityKind::MalformedHost, message);
    }
    ConnectivityError::classify(&message, e.is_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(host: &str) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.cluster.host = host.to_string();
        config.cluster.user = "root@pam".to_string();
        config.cluster.token_name = Some("gw".to_string());
        config.cluster.token_value = Some("secret".to_string());
        config.cluster.timeout_secs = 2;
        config
    }

    #[test]
    fn test_upstream_message_prefers_body_message() {
        let msg = upstream_message(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"data": null, "message": "VM 100 not running\n"}"#,
        );
        assert_eq!(msg, "VM 100 not running");
    }

    #[test]
    fn test_upstream_message_lists_parameter_errors() {
        let msg = upstream_message(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"data": null, "errors": {"vmid": "value must be at least 100"}}"#,
        );
        assert_eq!(msg, "vmid: value must be at least 100");
    }

    #[test]
    fn test_upstream_message_falls_back_to_reason() {
        let msg = upstream_message(reqwest::StatusCode::FORBIDDEN, "");
        assert_eq!(msg, "Forbidden");
    }

    #[test]
    fn test_new_rejects_malformed_host() {
        let err = ProxmoxHttp::new(&config_for("https://pve1")).err().unwrap();
        assert_eq!(err.kind, ConnectivityKind::MalformedHost);
    }

    #[test]
    fn test_new_builds_base_url() {
        let http = ProxmoxHttp::new(&config_for("pve1:8443")).unwrap();
        assert_eq!(http.base_url(), "https://pve1:8443/api2/json");
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        // Bind then drop to get a port that is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let http = ProxmoxHttp::new(&config_for(&format!("127.0.0.1:{}", port))).unwrap();
        let err = http.call(Method::Get, "/version", &[]).await.unwrap_err();
        match err {
            GatewayError::Connectivity(c) => {
                assert_eq!(c.kind, ConnectivityKind::ConnectionRefused)
            }
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plaintext_server_is_tls_error() {
        // A server that answers in plain HTTP breaks the TLS handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 512];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });

        let http = ProxmoxHttp::new(&config_for(&format!("127.0.0.1:{}", port))).unwrap();
        let err = http.call(Method::Get, "/version", &[]).await.unwrap_err();
        match err {
            GatewayError::Connectivity(c) => assert!(
                matches!(c.kind, ConnectivityKind::Tls | ConnectivityKind::Unknown),
                "unexpected kind {:?}: {}",
                c.kind,
                c.detail
            ),
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }
}
