//! Command surface for hosts.
//!
//! Thin wrappers that take the shared [`TransferServiceState`] and delegate to
//! the service. Every command returns `Result<T, TransferError>` so hosts can
//! serialise the error as-is.

use crate::transfer::error::TransferResult;
use crate::transfer::queue::ProgressStream;
use crate::transfer::service::TransferServiceState;
use crate::transfer::types::*;

// ── Connection / session ─────────────────────────────────────────────────────

pub async fn connect(state: &TransferServiceState, config: ConnectionConfig) -> TransferResult<SessionInfo> {
    state.connect(config).await
}

pub async fn disconnect(state: &TransferServiceState, session_id: String) -> TransferResult<()> {
    state.disconnect(&session_id).await
}

pub async fn list_sessions(state: &TransferServiceState) -> TransferResult<Vec<SessionInfo>> {
    Ok(state.list_sessions())
}

pub async fn shutdown(state: &TransferServiceState) -> TransferResult<()> {
    state.shutdown().await;
    Ok(())
}

// ── Remote operations ────────────────────────────────────────────────────────

pub async fn list_directory(
    state: &TransferServiceState,
    session_id: String,
    path: String,
) -> TransferResult<Vec<RemoteEntry>> {
    state.list_directory(&session_id, &path).await
}

pub async fn rename(
    state: &TransferServiceState,
    session_id: String,
    from: String,
    to: String,
) -> TransferResult<()> {
    state.rename(&session_id, &from, &to).await
}

pub async fn delete(state: &TransferServiceState, session_id: String, path: String) -> TransferResult<()> {
    state.delete(&session_id, &path).await
}

pub async fn chmod(
    state: &TransferServiceState,
    session_id: String,
    path: String,
    mode: u32,
) -> TransferResult<()> {
    state.chmod(&session_id, &path, mode).await
}

pub async fn mkdir(state: &TransferServiceState, session_id: String, path: String) -> TransferResult<()> {
    state.mkdir(&session_id, &path).await
}

pub async fn stat(state: &TransferServiceState, session_id: String, path: String) -> TransferResult<RemoteStat> {
    state.stat(&session_id, &path).await
}

// ── Transfers ────────────────────────────────────────────────────────────────

pub async fn upload(
    state: &TransferServiceState,
    session_id: String,
    local_path: String,
    remote_path: String,
) -> TransferResult<u64> {
    state.upload(&session_id, &local_path, &remote_path)
}

pub async fn download(
    state: &TransferServiceState,
    session_id: String,
    remote_path: String,
    local_path: String,
) -> TransferResult<u64> {
    state.download(&session_id, &remote_path, &local_path)
}

pub async fn pause_transfer(state: &TransferServiceState, transfer_id: u64) -> TransferResult<()> {
    state.pause_transfer(transfer_id)
}

pub async fn resume_transfer(state: &TransferServiceState, transfer_id: u64) -> TransferResult<()> {
    state.resume_transfer(transfer_id)
}

pub async fn cancel_transfer(state: &TransferServiceState, transfer_id: u64) -> TransferResult<()> {
    state.cancel_transfer(transfer_id)
}

pub async fn get_transfer(state: &TransferServiceState, transfer_id: u64) -> TransferResult<TransferItem> {
    state.get_transfer(transfer_id)
}

pub async fn list_transfers(state: &TransferServiceState) -> TransferResult<Vec<TransferItem>> {
    Ok(state.list_transfers())
}

pub async fn clear_completed_transfers(state: &TransferServiceState) -> TransferResult<usize> {
    Ok(state.clear_completed_transfers())
}

pub async fn set_max_concurrent(state: &TransferServiceState, max_concurrent: usize) -> TransferResult<()> {
    state.set_max_concurrent(max_concurrent)
}

pub async fn queue_counts(state: &TransferServiceState) -> TransferResult<QueueCounts> {
    Ok(state.queue_counts())
}

pub fn subscribe_progress(state: &TransferServiceState, transfer_id: u64) -> TransferResult<ProgressStream> {
    state.subscribe_progress(transfer_id)
}

// ── Speed limits ─────────────────────────────────────────────────────────────

pub async fn set_speed_limit(
    state: &TransferServiceState,
    session_id: String,
    direction: TransferDirection,
    bytes_per_sec: Option<u64>,
) -> TransferResult<()> {
    state.set_speed_limit(&session_id, direction, bytes_per_sec)
}

pub async fn set_global_speed_limit(
    state: &TransferServiceState,
    direction: TransferDirection,
    bytes_per_sec: Option<u64>,
) -> TransferResult<()> {
    state.set_global_speed_limit(direction, bytes_per_sec)
}

pub async fn get_speed_limits(state: &TransferServiceState, session_id: String) -> TransferResult<SpeedLimits> {
    state.get_speed_limits(&session_id)
}
