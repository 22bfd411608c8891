//! High-level orchestrator: owns the session registry, the speed limits and
//! the transfer queue. Exposes the methods that `commands.rs` delegates to.

use crate::transfer::error::TransferResult;
use crate::transfer::limits::{LimitRegistry, SharedLimits};
use crate::transfer::queue::{ProgressStream, QueueConfig, TransferQueue};
use crate::transfer::registry::SessionRegistry;
use crate::transfer::session::RemoteSession;
use crate::transfer::types::*;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Shared handle held by the host. Methods take `&self`; each part guards
/// its own state so a slow remote call never blocks unrelated commands.
pub type TransferServiceState = Arc<TransferService>;

pub struct TransferService {
    sessions: Arc<SessionRegistry>,
    limits: SharedLimits,
    queue: TransferQueue,
}

impl TransferService {
    pub fn new(config: QueueConfig) -> TransferServiceState {
        let sessions = Arc::new(SessionRegistry::new());
        let limits: SharedLimits = Arc::new(Mutex::new(LimitRegistry::new()));
        let queue = TransferQueue::new(config, sessions.clone(), limits.clone());
        Arc::new(Self {
            sessions,
            limits,
            queue,
        })
    }

    fn limits(&self) -> MutexGuard<'_, LimitRegistry> {
        self.limits.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Connection lifecycle ────────────────────────────────────

    pub async fn connect(&self, config: ConnectionConfig) -> TransferResult<SessionInfo> {
        self.sessions.connect(config).await
    }

    /// Register a session opened elsewhere (custom transports, tests).
    pub fn attach(&self, config: ConnectionConfig, session: Box<dyn RemoteSession>) -> SessionInfo {
        self.sessions.attach(config, session)
    }

    pub async fn disconnect(&self, session_id: &str) -> TransferResult<()> {
        self.sessions.disconnect(session_id).await?;
        self.limits().remove_connection(session_id);
        Ok(())
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list()
    }

    pub fn session_info(&self, session_id: &str) -> TransferResult<SessionInfo> {
        Ok(self.sessions.lookup(session_id)?.info())
    }

    /// Disconnect everything. Live transfers fail with `NotFound` at their
    /// next chunk boundary.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.list().into_iter().map(|s| s.id).collect();
        for id in &ids {
            let _ = self.disconnect(id).await;
        }
        info!(sessions = ids.len(), "Transfer service shut down");
    }

    // ─── Remote file operations ──────────────────────────────────

    pub async fn list_directory(&self, session_id: &str, path: &str) -> TransferResult<Vec<RemoteEntry>> {
        let handle = self.sessions.lookup(session_id)?;
        let mut session = handle.lock().await?;
        session
            .list_directory(path)
            .await
            .map_err(|e| e.with_session(session_id))
    }

    pub async fn rename(&self, session_id: &str, from: &str, to: &str) -> TransferResult<()> {
        let handle = self.sessions.lookup(session_id)?;
        let mut session = handle.lock().await?;
        session
            .rename(from, to)
            .await
            .map_err(|e| e.with_session(session_id))
    }

    pub async fn delete(&self, session_id: &str, path: &str) -> TransferResult<()> {
        let handle = self.sessions.lookup(session_id)?;
        let mut session = handle.lock().await?;
        session
            .delete(path)
            .await
            .map_err(|e| e.with_session(session_id))
    }

    pub async fn stat(&self, session_id: &str, path: &str) -> TransferResult<RemoteStat> {
        let handle = self.sessions.lookup(session_id)?;
        let mut session = handle.lock().await?;
        session
            .stat(path)
            .await
            .map_err(|e| e.with_session(session_id))
    }

    pub async fn chmod(&self, session_id: &str, path: &str, mode: u32) -> TransferResult<()> {
        let handle = self.sessions.lookup(session_id)?;
        let mut session = handle.lock().await?;
        session
            .chmod(path, mode)
            .await
            .map_err(|e| e.with_session(session_id))
    }

    pub async fn mkdir(&self, session_id: &str, path: &str) -> TransferResult<()> {
        let handle = self.sessions.lookup(session_id)?;
        let mut session = handle.lock().await?;
        session
            .mkdir(path)
            .await
            .map_err(|e| e.with_session(session_id))
    }

    // ─── Transfers ───────────────────────────────────────────────

    pub fn upload(&self, session_id: &str, local_path: &str, remote_path: &str) -> TransferResult<u64> {
        self.queue.enqueue(TransferRequest {
            session_id: session_id.to_string(),
            direction: TransferDirection::Upload,
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
        })
    }

    pub fn download(&self, session_id: &str, remote_path: &str, local_path: &str) -> TransferResult<u64> {
        self.queue.enqueue(TransferRequest {
            session_id: session_id.to_string(),
            direction: TransferDirection::Download,
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
        })
    }

    pub fn pause_transfer(&self, transfer_id: u64) -> TransferResult<()> {
        self.queue.pause(transfer_id)
    }

    pub fn resume_transfer(&self, transfer_id: u64) -> TransferResult<()> {
        self.queue.resume(transfer_id)
    }

    pub fn cancel_transfer(&self, transfer_id: u64) -> TransferResult<()> {
        self.queue.cancel(transfer_id)
    }

    pub fn get_transfer(&self, transfer_id: u64) -> TransferResult<TransferItem> {
        self.queue.get(transfer_id)
    }

    pub fn list_transfers(&self) -> Vec<TransferItem> {
        self.queue.list()
    }

    pub fn clear_completed_transfers(&self) -> usize {
        self.queue.clear_completed()
    }

    pub fn subscribe_progress(&self, transfer_id: u64) -> TransferResult<ProgressStream> {
        self.queue.subscribe(transfer_id)
    }

    pub fn set_max_concurrent(&self, n: usize) -> TransferResult<()> {
        self.queue.set_max_concurrent(n)
    }

    pub fn queue_counts(&self) -> QueueCounts {
        self.queue.counts()
    }

    // ─── Speed limits ────────────────────────────────────────────

    pub fn set_speed_limit(
        &self,
        session_id: &str,
        direction: TransferDirection,
        cap: Option<u64>,
    ) -> TransferResult<()> {
        self.sessions.lookup(session_id)?;
        self.limits().set_limit(session_id, direction, cap)?;
        info!(session_id, ?direction, ?cap, "Speed limit set");
        Ok(())
    }

    pub fn set_global_speed_limit(&self, direction: TransferDirection, cap: Option<u64>) -> TransferResult<()> {
        self.limits().set_global_limit(direction, cap)?;
        info!(?direction, ?cap, "Global speed limit set");
        Ok(())
    }

    pub fn get_speed_limits(&self, session_id: &str) -> TransferResult<SpeedLimits> {
        self.sessions.lookup(session_id)?;
        Ok(self.limits().limits(session_id))
    }
}
