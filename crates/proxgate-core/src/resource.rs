use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GatewayError;

/// Whether a workload is a full virtual machine or an OS-level container.
///
/// Precedence for ambiguous ids is the declaration order of [`ResourceKind::PROBE_ORDER`].
/// Serialized as `vm`/`container`; parsed (from strings and from serde
/// alike) through [`FromStr`], which also takes the API names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vm,
    Container,
}

impl ResourceKind {
    /// Fixed probe order used by the resolver: vm first, then container.
    pub const PROBE_ORDER: [ResourceKind; 2] = [ResourceKind::Vm, ResourceKind::Container];

    /// Path segment in the Proxmox VE API (`qemu` / `lxc`).
    pub fn api_segment(&self) -> &'static str {
        match self {
            Self::Vm => "qemu",
            Self::Container => "lxc",
        }
    }

    /// Lifecycle verbs this kind accepts.
    pub fn lifecycle_verbs(&self) -> &'static [LifecycleVerb] {
        use LifecycleVerb::*;
        match self {
            Self::Vm => &[Start, Stop, Shutdown, Reboot, Reset, Suspend, Resume],
            Self::Container => &[Start, Stop, Shutdown, Reboot, Suspend, Resume],
        }
    }

    pub fn allows(&self, verb: LifecycleVerb) -> bool {
        self.lifecycle_verbs().contains(&verb)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vm => write!(f, "vm"),
            Self::Container => write!(f, "container"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vm" | "qemu" => Ok(Self::Vm),
            "container" | "ct" | "lxc" => Ok(Self::Container),
            _ => Err(GatewayError::invalid_parameter("kind", s, &["vm", "container"])),
        }
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Power-state verbs, union over all kinds. Membership per kind is [`ResourceKind::lifecycle_verbs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleVerb {
    Start,
    Stop,
    Shutdown,
    Reboot,
    Reset,
    Suspend,
    Resume,
}

impl LifecycleVerb {
    pub const ALL: [LifecycleVerb; 7] = [
        Self::Start,
        Self::Stop,
        Self::Shutdown,
        Self::Reboot,
        Self::Reset,
        Self::Suspend,
        Self::Resume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
            Self::Reboot => "reboot",
            Self::Reset => "reset",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
        }
    }

    /// Match a verb name; `None` for anything outside the known verb set.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl std::fmt::Display for LifecycleVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a requested lifecycle verb against the kind's allowed set.
///
/// Unknown verbs and verbs outside the kind's set both yield `InvalidAction`.
pub fn validate_lifecycle(kind: ResourceKind, verb: &str) -> Result<LifecycleVerb, GatewayError> {
    match LifecycleVerb::parse(verb) {
        Some(v) if kind.allows(v) => Ok(v),
        _ => Err(GatewayError::InvalidAction {
            kind,
            verb: verb.to_string(),
        }),
    }
}

/// Observed run state. Proxmox reports more states than these; the rest map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
    Suspended,
    Paused,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Suspended => write!(f, "suspended"),
            Self::Paused => write!(f, "paused"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A (node, id) pair with its kind resolved for the current call only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub node: String,
    pub id: u32,
    pub kind: ResourceKind,
}

impl ResourceRef {
    pub fn new(node: impl Into<String>, id: u32, kind: ResourceKind) -> Self {
        Self {
            node: node.into(),
            id,
            kind,
        }
    }

    /// API path prefix, e.g. `/nodes/pve1/qemu/100`.
    pub fn api_path(&self) -> String {
        format!("/nodes/{}/{}/{}", self.node, self.kind.api_segment(), self.id)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} on {}", self.kind, self.id, self.node)
    }
}

/// Row from `GET /nodes/{node}/{qemu|lxc}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    #[serde(deserialize_with = "de_id")]
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: RunState,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxdisk: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub template: Option<bool>,
}

/// Response of `GET .../status/current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    #[serde(default)]
    pub status: RunState,
    /// QEMU monitor status; distinguishes paused/suspended from plain running.
    #[serde(default)]
    pub qmpstatus: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub lock: Option<String>,
    #[serde(default)]
    pub ha: Option<serde_json::Value>,
}

/// Resource or snapshot configuration. Keys vary by kind and cluster version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceConfig(pub BTreeMap<String, serde_json::Value>);

impl ResourceConfig {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}

/// Row from `GET .../firewall/rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub pos: u32,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub action: String,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub enable: Option<bool>,
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub dport: Option<String>,
    #[serde(default, rename = "macro")]
    pub macro_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Lenient field decoders. Proxmox emits ids and flags as either numbers or strings.
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(u64),
    Str(String),
}

pub(crate) fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    match NumOrStr::deserialize(d)? {
        NumOrStr::Num(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub(crate) fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    match Option::<NumOrStr>::deserialize(d)? {
        None => Ok(None),
        Some(NumOrStr::Num(n)) => u32::try_from(n).map(Some).map_err(serde::de::Error::custom),
        Some(NumOrStr::Str(s)) if s.is_empty() => Ok(None),
        Some(NumOrStr::Str(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

pub(crate) fn de_opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Num(u64),
        Str(String),
    }
    Ok(match Option::<Flag>::deserialize(d)? {
        None => None,
        Some(Flag::Bool(b)) => Some(b),
        Some(Flag::Num(n)) => Some(n != 0),
        Some(Flag::Str(s)) => Some(s == "1" || s.eq_ignore_ascii_case("true")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_verbs() {
        for verb in ["start", "stop", "shutdown", "reboot", "reset", "suspend", "resume"] {
            assert!(
                validate_lifecycle(ResourceKind::Vm, verb).is_ok(),
                "{} should be allowed for vm",
                verb
            );
        }
    }

    #[test]
    fn test_container_verbs() {
        for verb in ["start", "stop", "shutdown", "reboot", "suspend", "resume"] {
            assert!(validate_lifecycle(ResourceKind::Container, verb).is_ok());
        }
        let err = validate_lifecycle(ResourceKind::Container, "reset").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidAction { .. }));
    }

    #[test]
    fn test_unknown_verb_is_invalid_action() {
        let err = validate_lifecycle(ResourceKind::Vm, "pause").unwrap_err();
        match err {
            GatewayError::InvalidAction { kind, verb } => {
                assert_eq!(kind, ResourceKind::Vm);
                assert_eq!(verb, "pause");
            }
            other => panic!("expected InvalidAction, got {:?}", other),
        }
        // Verb matching is exact.
        assert!(validate_lifecycle(ResourceKind::Vm, "Start").is_err());
    }

    #[test]
    fn test_probe_order_is_vm_then_container() {
        assert_eq!(
            ResourceKind::PROBE_ORDER,
            [ResourceKind::Vm, ResourceKind::Container]
        );
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("vm".parse::<ResourceKind>().unwrap(), ResourceKind::Vm);
        assert_eq!("qemu".parse::<ResourceKind>().unwrap(), ResourceKind::Vm);
        assert_eq!(
            "LXC".parse::<ResourceKind>().unwrap(),
            ResourceKind::Container
        );
        assert!("pod".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_deserializes_like_from_str() {
        for (raw, kind) in [
            ("vm", ResourceKind::Vm),
            ("qemu", ResourceKind::Vm),
            ("container", ResourceKind::Container),
            ("lxc", ResourceKind::Container),
            ("CT", ResourceKind::Container),
        ] {
            let parsed: ResourceKind = serde_json::from_value(serde_json::json!(raw)).unwrap();
            assert_eq!(parsed, kind, "{}", raw);
        }
        let err = serde_json::from_value::<ResourceKind>(serde_json::json!("pod")).unwrap_err();
        assert!(err.to_string().contains("kind"));
        assert_eq!(serde_json::to_value(ResourceKind::Container).unwrap(), "container");
    }

    #[test]
    fn test_api_path() {
        let r = ResourceRef::new("pve1", 100, ResourceKind::Container);
        assert_eq!(r.api_path(), "/nodes/pve1/lxc/100");
        assert_eq!(r.to_string(), "container 100 on pve1");
    }

    #[test]
    fn test_summary_accepts_string_vmid_and_unknown_status() {
        let json = r#"{"vmid": "101", "name": "web", "status": "prelaunch", "template": 1}"#;
        let s: ResourceSummary = serde_json::from_str(json).unwrap();
        assert_eq!(s.vmid, 101);
        assert_eq!(s.status, RunState::Unknown);
        assert_eq!(s.template, Some(true));
    }

    #[test]
    fn test_status_backward_compat() {
        // Older clusters omit most fields
        let s: ResourceStatus = serde_json::from_str(r#"{"status": "stopped"}"#).unwrap();
        assert_eq!(s.status, RunState::Stopped);
        assert_eq!(s.vmid, None);
        assert_eq!(s.qmpstatus, None);
    }

    #[test]
    fn test_firewall_rule_decodes() {
        let json = r#"{"pos": 0, "type": "in", "action": "ACCEPT", "enable": 1, "dport": "22", "proto": "tcp"}"#;
        let rule: FirewallRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type, "in");
        assert_eq!(rule.enable, Some(true));
        assert_eq!(rule.dport.as_deref(), Some("22"));
    }
}
