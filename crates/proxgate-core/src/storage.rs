use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::resource::{ResourceKind, de_opt_bool, de_opt_id};

/// Storage types that can hold vzdump archives.
pub const BACKUP_CAPABLE_TYPES: [&str; 4] = ["dir", "nfs", "cifs", "pbs"];

/// Row from `GET /nodes/{node}/storage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub storage: String,
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Comma-separated content types, e.g. `images,rootdir,backup`.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub shared: Option<bool>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub used: Option<u64>,
    #[serde(default)]
    pub avail: Option<u64>,
}

impl StorageEntry {
    pub fn is_backup_capable(&self) -> bool {
        BACKUP_CAPABLE_TYPES.contains(&self.storage_type.as_str())
    }
}

/// Row from `GET /nodes/{node}/storage/{storage}/content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageContentEntry {
    pub volid: String,
    /// Content type: `backup`, `images`, `iso`, `vztmpl`, ...
    pub content: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub ctime: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub protected: Option<bool>,
}

impl StorageContentEntry {
    pub fn is_backup(&self) -> bool {
        self.content == "backup"
    }
}

/// A backup archive together with the storage it lives on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub storage: String,
    pub volid: String,
    pub vmid: Option<u32>,
    pub format: Option<String>,
    pub size: Option<u64>,
    pub ctime: Option<u64>,
    pub notes: Option<String>,
}

impl BackupEntry {
    pub fn from_content(storage: &str, entry: StorageContentEntry) -> Self {
        Self {
            storage: storage.to_string(),
            volid: entry.volid,
            vmid: entry.vmid,
            format: entry.format,
            size: entry.size,
            ctime: entry.ctime,
            notes: entry.notes,
        }
    }
}

/// vzdump consistency mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    Snapshot,
    Suspend,
    Stop,
}

impl BackupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Suspend => "suspend",
            Self::Stop => "stop",
        }
    }
}

impl std::str::FromStr for BackupMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(Self::Snapshot),
            "suspend" => Ok(Self::Suspend),
            "stop" => Ok(Self::Stop),
            _ => Err(GatewayError::invalid_parameter(
                "mode",
                s,
                &["snapshot", "suspend", "stop"],
            )),
        }
    }
}

/// vzdump archive compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Lzo,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lzo => "lzo",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lzo" => Ok(Self::Lzo),
            "gzip" => Ok(Self::Gzip),
            "zstd" => Ok(Self::Zstd),
            _ => Err(GatewayError::invalid_parameter(
                "compress",
                s,
                &["lzo", "gzip", "zstd"],
            )),
        }
    }
}

/// Guess the resource kind from a backup archive name.
///
/// Heuristic only: vzdump names archives `vzdump-qemu-*` / `vzdump-lxc-*`,
/// and VM archives are `.vma*` while container archives are `.tar*`.
/// Renamed or PBS-hosted archives can defeat it, so callers should prefer an
/// explicit kind whenever they have one.
/// Storage ids: `[A-Za-z0-9][A-Za-z0-9._-]*`.
pub fn validate_storage_id(storage: &str) -> Result<(), GatewayError> {
    let mut chars = storage.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidParameter {
            name: "storage".to_string(),
            value: storage.to_string(),
            expected: "a storage id: letters, digits, '.', '_' or '-'".to_string(),
        })
    }
}

pub fn infer_kind_from_archive(archive: &str) -> Option<ResourceKind> {
    let file = archive
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(archive)
        .to_ascii_lowercase();

    if file.contains("vzdump-qemu-") {
        return Some(ResourceKind::Vm);
    }
    if file.contains("vzdump-lxc-") || file.contains("vzdump-openvz-") {
        return Some(ResourceKind::Container);
    }
    if file.contains(".vma") {
        return Some(ResourceKind::Vm);
    }
    if file.contains(".tar") {
        return Some(ResourceKind::Container);
    }
    // PBS volids: backup/vm/<id>/<time> or backup/ct/<id>/<time>
    if archive.contains(":backup/vm/") {
        return Some(ResourceKind::Vm);
    }
    if archive.contains(":backup/ct/") {
        return Some(ResourceKind::Container);
    }
    None
}
