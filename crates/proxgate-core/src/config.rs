use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectivityError, ConnectivityKind};
use crate::gate::SafetyGate;

pub const DEFAULT_PORT: u16 = 8006;

/// Top-level gateway configuration.
///
/// Layers, later wins: defaults, optional TOML file, `PROXMOX_*` environment,
/// CLI overrides. Call [`GatewayConfig::validate`] after the last layer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
}

/// Cluster endpoint and credentials.
#[derive(Clone, Deserialize, Serialize)]
pub struct ClusterSettings {
    /// Hostname or IP, optionally `host:port`. No scheme, no path.
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `user@realm`, e.g. `root@pam`.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub token_value: Option<String>,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Process-level gateway behavior.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewaySettings {
    /// Permit snapshot delete/rollback and restore.
    #[serde(default)]
    pub dangerous_mode: bool,
    #[serde(default)]
    pub connect_mode: ConnectMode,
}

/// What to do when the startup connectivity probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMode {
    /// Abort startup.
    #[default]
    Strict,
    /// Start anyway; every call fails with the probe's connectivity error.
    Degraded,
}

impl std::str::FromStr for ConnectMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "degraded" => Ok(Self::Degraded),
            other => anyhow::bail!("Invalid connect mode '{}': expected strict or degraded", other),
        }
    }
}

/// How requests authenticate against the cluster.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// `POST /access/ticket`, then cookie + CSRF token.
    Password { user: String, password: String },
    /// Stateless `PVEAPIToken` header.
    Token {
        user: String,
        name: String,
        value: String,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token { user, name, .. } => f
                .debug_struct("Token")
                .field("user", user)
                .field("name", name)
                .field("value", &"<redacted>")
                .finish(),
        }
    }
}

/// CLI-level overrides; `None` leaves the lower layer untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub insecure: bool,
    pub timeout_secs: Option<u64>,
    pub dangerous_mode: Option<bool>,
    pub connect_mode: Option<ConnectMode>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_verify_ssl() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: String::new(),
            password: None,
            token_name: None,
            token_value: None,
            verify_ssl: default_verify_ssl(),
            timeout_secs: default_timeout(),
        }
    }
}

impl std::fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token_name", &self.token_name)
            .field("token_value", &self.token_value.as_ref().map(|_| "<redacted>"))
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// `false`, `0`, `f`, `no` (any case) disable; anything else enables.
fn env_flag_default_on(v: &str) -> bool {
    !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "f" | "no")
}

/// `true`, `1`, `t`, `yes`, `on` (any case) enable; anything else disables.
fn env_flag_default_off(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "yes" | "on"
    )
}

/// Split `host[:port]` and reject anything that is not a bare authority.
pub fn parse_host(raw: &str) -> std::result::Result<(String, Option<u16>), ConnectivityError> {
    let host = raw.trim();
    let malformed = |why: &str| {
        ConnectivityError::new(
            ConnectivityKind::MalformedHost,
            format!("'{}' {}", raw, why),
        )
    };

    if host.is_empty() {
        return Err(malformed("is empty"));
    }
    if host.contains("://") {
        return Err(malformed("contains a URL scheme"));
    }
    if host.contains('/') || host.contains('?') || host.contains('#') {
        return Err(malformed("contains a path"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(malformed("contains whitespace"));
    }

    // [v6]:port or [v6]
    if let Some(rest) = host.strip_prefix('[') {
        let (addr, tail) = rest
            .split_once(']')
            .ok_or_else(|| malformed("has an unterminated IPv6 bracket"))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((
                format!("[{}]", addr),
                Some(port.parse().map_err(|_| malformed("has an invalid port"))?),
            )),
            None if tail.is_empty() => Ok((format!("[{}]", addr), None)),
            None => Err(malformed("has trailing characters after the IPv6 address")),
        };
    }

    match host.matches(':').count() {
        0 => Ok((host.to_string(), None)),
        1 => {
            let (name, port) = host.split_once(':').unwrap_or((host, ""));
            if name.is_empty() {
                return Err(malformed("has no hostname"));
            }
            let port = port.parse().map_err(|_| malformed("has an invalid port"))?;
            Ok((name.to_string(), Some(port)))
        }
        // bare IPv6 without brackets
        _ => Ok((format!("[{}]", host), None)),
    }
}

impl GatewayConfig {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read gateway config: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse config from a TOML string. Does not validate.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).with_context(|| "Failed to parse gateway config TOML")
    }

    /// Full layering: file (if any), process environment, overrides, then validation.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROXMOX_*` variables via `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let c = &mut self.cluster;
        if let Some(v) = lookup("PROXMOX_HOST") {
            c.host = v;
        }
        if let Some(v) = lookup("PROXMOX_PORT") {
            c.port = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid PROXMOX_PORT: {}", v))?;
        }
        if let Some(v) = lookup("PROXMOX_USER") {
            c.user = v;
        }
        if let Some(v) = lookup("PROXMOX_PASSWORD") {
            c.password = Some(v);
        }
        if let Some(v) = lookup("PROXMOX_TOKEN_NAME") {
            c.token_name = Some(v);
        }
        if let Some(v) = lookup("PROXMOX_TOKEN_VALUE") {
            c.token_value = Some(v);
        }
        if let Some(v) = lookup("PROXMOX_VERIFY_SSL") {
            c.verify_ssl = env_flag_default_on(&v);
        }
        if let Some(v) = lookup("PROXMOX_TIMEOUT_SECS") {
            c.timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid PROXMOX_TIMEOUT_SECS: {}", v))?;
        }

        let g = &mut self.gateway;
        if let Some(v) = lookup("PROXMOX_DANGEROUS_MODE") {
            g.dangerous_mode = env_flag_default_off(&v);
        }
        if let Some(v) = lookup("PROXMOX_CONNECT_MODE") {
            g.connect_mode = v.parse()?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        if let Some(ref host) = o.host {
            self.cluster.host = host.clone();
        }
        if let Some(port) = o.port {
            self.cluster.port = port;
        }
        if let Some(ref user) = o.user {
            self.cluster.user = user.clone();
        }
        if o.insecure {
            self.cluster.verify_ssl = false;
        }
        if let Some(t) = o.timeout_secs {
            self.cluster.timeout_secs = t;
        }
        if let Some(d) = o.dangerous_mode {
            self.gateway.dangerous_mode = d;
        }
        if let Some(m) = o.connect_mode {
            self.gateway.connect_mode = m;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.cluster;
        if c.host.trim().is_empty() {
            anyhow::bail!("No cluster host configured. Set PROXMOX_HOST or [cluster] host.");
        }
        parse_host(&c.host)?;
        if c.user.trim().is_empty() {
            anyhow::bail!("No cluster user configured. Set PROXMOX_USER (e.g. root@pam).");
        }
        let has_token = c.token_name.is_some() && c.token_value.is_some();
        if !has_token && c.password.is_none() {
            anyhow::bail!(
                "No credentials configured. Set PROXMOX_PASSWORD, or PROXMOX_TOKEN_NAME and PROXMOX_TOKEN_VALUE."
            );
        }
        if c.token_name.is_some() != c.token_value.is_some() {
            anyhow::bail!("PROXMOX_TOKEN_NAME and PROXMOX_TOKEN_VALUE must be set together");
        }
        if c.timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than zero");
        }
        Ok(())
    }

    /// `https://host:port/api2/json`. An explicit port in `host` wins over `port`.
    pub fn base_url(&self) -> std::result::Result<String, ConnectivityError> {
        let (host, port) = parse_host(&self.cluster.host)?;
        Ok(format!(
            "https://{}:{}/api2/json",
            host,
            port.unwrap_or(self.cluster.port)
        ))
    }

    /// API token wins over password when both are present.
    pub fn auth(&self) -> Option<AuthMethod> {
        let c = &self.cluster;
        if let (Some(name), Some(value)) = (&c.token_name, &c.token_value) {
            return Some(AuthMethod::Token {
                user: c.user.clone(),
                name: name.clone(),
                value: value.clone(),
            });
        }
        c.password.as_ref().map(|p| AuthMethod::Password {
            user: c.user.clone(),
            password: p.clone(),
        })
    }

    pub fn safety_gate(&self) -> SafetyGate {
        SafetyGate::new(self.gateway.dangerous_mode)
    }
}
