// ── Types ─────────────────────────────────────────────────────────────────────

use crate::transfer::error::TransferError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_connect_timeout_secs() -> u64 {
    15
}
fn default_data_timeout_secs() -> u64 {
    30
}

// ── Connection ───────────────────────────────────────────────────────────────

/// Wire protocol of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Protocol {
    Ftp,
    Ftps,
    Sftp,
}

impl Protocol {
    pub fn default_port(self, implicit_tls: bool) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Ftps if implicit_tls => 990,
            Protocol::Ftps => 21,
            Protocol::Sftp => 22,
        }
    }
}

impl FromStr for Protocol {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "ftps" => Ok(Protocol::Ftps),
            "sftp" => Ok(Protocol::Sftp),
            other => Err(TransferError::connection(format!(
                "Unsupported protocol '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = TransferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Ftp => "ftp",
            Protocol::Ftps => "ftps",
            Protocol::Sftp => "sftp",
        })
    }
}

/// Everything needed to open one session. Immutable once a session is
/// created from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub protocol: Protocol,
    pub host: String,
    /// 0 selects the protocol default.
    #[serde(default)]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub preserve_timestamps: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Stall timeout: a single chunk read/write that makes no progress for
    /// this long fails the transfer.
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
    /// FTPS only: accept self-signed / untrusted certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// FTPS only: TLS from the first byte instead of `AUTH TLS`.
    #[serde(default)]
    pub implicit_tls: bool,
    #[serde(default)]
    pub label: Option<String>,
}

impl ConnectionConfig {
    pub fn new(protocol: Protocol, host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: 0,
            username: username.into(),
            password: None,
            private_key_path: None,
            passphrase: None,
            preserve_timestamps: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            data_timeout_secs: default_data_timeout_secs(),
            accept_invalid_certs: false,
            implicit_tls: false,
            label: None,
        }
    }

    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            self.protocol.default_port(self.implicit_tls)
        } else {
            self.port
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.effective_port())
    }
}

/// Snapshot of a registered session, safe to hand to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub label: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
}

// ── Directory listing ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryType {
    File,
    Directory,
}

/// One remote directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// `rwxr-xr-x` style string when the server reports one.
    pub permissions: Option<String>,
}

/// Result of `stat` (SFTP only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStat {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub mode: u32,
    pub permissions: String,
}

// ── Transfers ────────────────────────────────────────────────────────────────

/// Direction of a transfer, also the key of a bandwidth cap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Lifecycle status of a transfer item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    Queued,
    Active,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl TransferStatus {
    /// `queued`, `active` and `paused` can still change.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            TransferStatus::Queued | TransferStatus::Active | TransferStatus::Paused
        )
    }

    /// Terminal statuses end the progress stream and are dropped by
    /// `clear_completed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Error | TransferStatus::Cancelled
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStatus::Queued => "queued",
            TransferStatus::Active => "active",
            TransferStatus::Paused => "paused",
            TransferStatus::Completed => "completed",
            TransferStatus::Error => "error",
            TransferStatus::Cancelled => "cancelled",
        })
    }
}

/// What the caller asks the queue to move.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub session_id: String,
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
}

/// A queued transfer and its live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub id: u64,
    pub session_id: String,
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
    /// 0 until probed.
    pub size: u64,
    pub transferred: u64,
    pub status: TransferStatus,
    pub percent: f64,
    pub speed_bps: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-chunk progress report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub transfer_id: u64,
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
    /// Instantaneous speed since the previous report, bytes/sec.
    pub speed: f64,
    /// Effective cap used for this chunk, bytes/sec.
    pub applied_cap: Option<u64>,
}

/// Event on a per-transfer progress stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum TransferEvent {
    Progress(TransferProgress),
    #[serde(rename_all = "camelCase")]
    Status {
        transfer_id: u64,
        status: TransferStatus,
        error: Option<String>,
    },
}

/// Count of items per status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub queued: usize,
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
}

// ── Speed limits ─────────────────────────────────────────────────────────────

/// Caps configured for one session plus the global caps, bytes/sec.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedLimits {
    pub upload: Option<u64>,
    pub download: Option<u64>,
    pub global_upload: Option<u64>,
    pub global_download: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::error::TransferErrorKind;

    #[test]
    fn protocol_parse_is_case_insensitive() {
        assert_eq!("SFTP".parse::<Protocol>().unwrap(), Protocol::Sftp);
        assert_eq!(" ftps ".parse::<Protocol>().unwrap(), Protocol::Ftps);
        let err = "scp".parse::<Protocol>().unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::ConnectionError);
    }

    #[test]
    fn config_deserialises_with_defaults() {
        let cfg: ConnectionConfig = serde_json::from_str(
            r#"{"protocol":"FTP","host":"127.0.0.1","port":1,"username":"u"}"#,
        )
        .unwrap();
        assert_eq!(cfg.protocol, Protocol::Ftp);
        assert_eq!(cfg.effective_port(), 1);
        assert_eq!(cfg.connect_timeout_secs, 15);
        assert!(!cfg.preserve_timestamps);
        assert!(serde_json::from_str::<ConnectionConfig>(
            r#"{"protocol":"gopher","host":"h","username":"u"}"#
        )
        .is_err());
    }

    #[test]
    fn default_ports() {
        let mut cfg = ConnectionConfig::new(Protocol::Ftps, "h", "u");
        assert_eq!(cfg.effective_port(), 21);
        cfg.implicit_tls = true;
        assert_eq!(cfg.effective_port(), 990);
        assert_eq!(ConnectionConfig::new(Protocol::Sftp, "h", "u").address(), "h:22");
    }

    #[test]
    fn status_classes() {
        assert!(TransferStatus::Paused.is_live());
        assert!(!TransferStatus::Paused.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(!TransferStatus::Error.is_live());
    }

    #[test]
    fn entry_serialises_type_field() {
        let e = RemoteEntry {
            name: "a.txt".into(),
            entry_type: EntryType::File,
            size: 3,
            modified_at: None,
            permissions: None,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "file");
        assert_eq!(v["modifiedAt"], serde_json::Value::Null);
    }
}
