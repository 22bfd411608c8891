//! Session registry: owns every live [`RemoteSession`] keyed by an opaque id.
//!
//! All session access goes through [`SessionRegistry::lookup`]. A handle
//! carries a `closing` flag: once `disconnect` sets it, lookups fail with
//! `NotFound`, running transfers stop at their next chunk boundary, and
//! anything still waiting for the transport lock is turned away.

use crate::transfer::error::{TransferError, TransferErrorKind, TransferResult};
use crate::transfer::ftp::FtpSession;
use crate::transfer::session::RemoteSession;
use crate::transfer::sftp::SftpSession;
use crate::transfer::types::{ConnectionConfig, Protocol, SessionInfo, TransferDirection};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long `disconnect` waits for an in-flight operation to let go of the
/// transport before leaving the close to whoever holds it last.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

// ── Handle ───────────────────────────────────────────────────────────────────

pub struct SessionHandle {
    id: String,
    config: ConnectionConfig,
    connected_at: DateTime<Utc>,
    closing: AtomicBool,
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    transport: AsyncMutex<Box<dyn RemoteSession>>,
}

impl SessionHandle {
    fn new(config: ConnectionConfig, session: Box<dyn RemoteSession>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            connected_at: Utc::now(),
            closing: AtomicBool::new(false),
            bytes_uploaded: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            transport: AsyncMutex::new(session),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Exclusive access to the transport. One physical connection serves one
    /// operation at a time; callers queue here.
    pub async fn lock(&self) -> TransferResult<MutexGuard<'_, Box<dyn RemoteSession>>> {
        if self.is_closing() {
            return Err(TransferError::session_not_found(&self.id));
        }
        let guard = self.transport.lock().await;
        if self.is_closing() {
            return Err(TransferError::session_not_found(&self.id));
        }
        Ok(guard)
    }

    /// Count bytes moved by a transfer.
    pub fn record(&self, direction: TransferDirection, bytes: u64) {
        let counter = match direction {
            TransferDirection::Upload => &self.bytes_uploaded,
            TransferDirection::Download => &self.bytes_downloaded,
        };
        counter.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            protocol: self.config.protocol,
            host: self.config.host.clone(),
            port: self.config.effective_port(),
            username: self.config.username.clone(),
            label: self.config.label.clone(),
            connected_at: self.connected_at,
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("protocol", &self.config.protocol)
            .field("closing", &self.is_closing())
            .finish()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

/// Open the transport for `config` with the protocol's own session type.
async fn open(config: &ConnectionConfig) -> TransferResult<Box<dyn RemoteSession>> {
    Ok(match config.protocol {
        Protocol::Ftp | Protocol::Ftps => Box::new(FtpSession::connect(config).await?),
        Protocol::Sftp => Box::new(SftpSession::connect(config).await?),
    })
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        // A panic while holding the map lock cannot leave it half-updated.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connect and register a new session. Nothing is registered on failure,
    /// and every failure is reported as `ConnectionError`.
    pub async fn connect(&self, config: ConnectionConfig) -> TransferResult<SessionInfo> {
        if config.host.trim().is_empty() {
            return Err(TransferError::invalid("Host must not be empty"));
        }
        info!(
            protocol = %config.protocol,
            address = %config.address(),
            user = %config.username,
            "Connecting"
        );

        let limit = Duration::from_secs(config.connect_timeout_secs.max(1));
        let session = match timeout(limit, open(&config)).await {
            Err(_) => {
                return Err(TransferError::connection(format!(
                    "Connecting to {} timed out after {}s",
                    config.address(),
                    limit.as_secs()
                )))
            }
            Ok(Err(mut e)) => {
                e.kind = TransferErrorKind::ConnectionError;
                warn!(address = %config.address(), error = %e, "Connect failed");
                return Err(e);
            }
            Ok(Ok(session)) => session,
        };

        Ok(self.attach(config, session))
    }

    /// Register an already-open session.
    pub fn attach(&self, config: ConnectionConfig, session: Box<dyn RemoteSession>) -> SessionInfo {
        let handle = Arc::new(SessionHandle::new(config, session));
        let info = handle.info();
        self.map().insert(handle.id.clone(), handle);
        info!(session_id = %info.id, protocol = %info.protocol, "Session registered");
        info
    }

    pub fn lookup(&self, id: &str) -> TransferResult<Arc<SessionHandle>> {
        self.map()
            .get(id)
            .filter(|h| !h.is_closing())
            .cloned()
            .ok_or_else(|| TransferError::session_not_found(id))
    }

    /// Close the transport and drop the entry. In-flight transfers on the
    /// session fail with `NotFound` at their next chunk boundary.
    pub async fn disconnect(&self, id: &str) -> TransferResult<()> {
        let handle = self
            .map()
            .remove(id)
            .ok_or_else(|| TransferError::session_not_found(id))?;
        handle.closing.store(true, Ordering::Release);

        match timeout(DISCONNECT_GRACE, handle.transport.lock()).await {
            Ok(mut transport) => {
                if let Err(e) = transport.close().await {
                    warn!(session_id = id, error = %e, "Close failed");
                }
            }
            // The holder sees the closing flag and drops the last reference.
            Err(_) => debug!(session_id = id, "Transport busy, closing on release"),
        }
        info!(session_id = id, "Session disconnected");
        Ok(())
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self.map().values().map(|h| h.info()).collect();
        out.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
