//! Engine-wide error type.
//!
//! Every session, registry and queue operation returns [`TransferResult`].
//! Transport errors (FTP replies, ssh2, rustls, local I/O) are mapped into one
//! of the [`TransferErrorKind`] variants at the session boundary, keeping the
//! original message for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised transfer-engine error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferError {
    pub kind: TransferErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferErrorKind {
    /// Auth rejected, handshake timeout, unreachable host, unknown protocol.
    ConnectionError,
    /// Unknown session or transfer id.
    NotFound,
    /// Capability absent for the active protocol variant.
    UnsupportedOperation,
    /// Remote-side failure during an operation or transfer.
    TransferError,
    /// Local filesystem failure unrelated to the remote protocol.
    IoError,
    /// Caller supplied a value the engine cannot act on.
    InvalidArgument,
}

pub type TransferResult<T> = Result<T, TransferError>;

// ── Construction helpers ─────────────────────────────────────────────

impl TransferError {
    pub fn new(kind: TransferErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
            session_id: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::ConnectionError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::NotFound, msg)
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::not_found(format!("Session '{}' not found", id)).with_session(id)
    }

    pub fn transfer_not_found(id: u64) -> Self {
        Self::not_found(format!("Transfer {} not found", id))
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::UnsupportedOperation, msg)
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::TransferError, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::IoError, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::InvalidArgument, msg)
    }

    /// Local I/O error with the offending path in the message.
    pub fn local_io(path: &str, e: std::io::Error) -> Self {
        Self::io(format!("{}: {}", path, e))
    }

    /// Classify an FTP reply code. Anything the server rejects during an
    /// operation is a transfer error; 530 during an operation means the
    /// login went stale and is reported as a connection error.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 | 430 | 530 => TransferErrorKind::ConnectionError,
            _ => TransferErrorKind::TransferError,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
            session_id: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == TransferErrorKind::NotFound
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[{:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[{:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for TransferError {}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<ssh2::Error> for TransferError {
    fn from(e: ssh2::Error) -> Self {
        Self::transfer(format!("SSH: {}", e))
    }
}

impl From<rustls::Error> for TransferError {
    fn from(e: rustls::Error) -> Self {
        Self::connection(format!("TLS: {}", e))
    }
}
