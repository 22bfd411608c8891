//! Transfer queue: FIFO backlog of uploads and downloads run under a
//! concurrency bound, with pause/resume/cancel and per-transfer progress
//! streams.
//!
//! ```text
//! queued  ──(picked, slot free)──▶ active ──(success)──▶ completed
//!    ▲                               │  └───(failure)──▶ error
//!    └──────(resume)── paused ◀─(pause)
//! queued | active | paused ──(cancel)──▶ cancelled
//! ```
//!
//! Every transfer runs in its own tokio task. A task holds a slot from the
//! moment it is picked until its copy loop returns, so a transfer that was
//! paused or cancelled keeps its slot until it reaches the next chunk
//! boundary. Pause and cancel only flip the status; the loop sees the change
//! through its [`ChunkObserver`] and halts.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::limits::SharedLimits;
use crate::transfer::registry::{SessionHandle, SessionRegistry};
use crate::transfer::session::{ChunkControl, ChunkObserver, TransferOutcome};
use crate::transfer::throttle::{chunk_size_for, Throttle, DEFAULT_CHUNK_SIZE};
use crate::transfer::types::{
    QueueCounts, TransferDirection, TransferEvent, TransferItem, TransferProgress,
    TransferRequest, TransferStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

fn default_max_concurrent() -> usize {
    3
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Chunk size for uncapped transfers.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Lazy stream of events for one transfer. Ends after the terminal status.
pub type ProgressStream = UnboundedReceiverStream<TransferEvent>;

// ── State ────────────────────────────────────────────────────────────────────

struct Entry {
    item: TransferItem,
    /// A task is executing this entry.
    running: bool,
    /// Absolute position reached when the copy last halted.
    offset: u64,
    subscribers: Vec<mpsc::UnboundedSender<TransferEvent>>,
}

impl Entry {
    fn emit(&mut self, event: TransferEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn status_event(&self) -> TransferEvent {
        TransferEvent::Status {
            transfer_id: self.item.id,
            status: self.item.status,
            error: self.item.error.clone(),
        }
    }

    fn set_status(&mut self, status: TransferStatus) {
        self.item.status = status;
        if status != TransferStatus::Active {
            self.item.speed_bps = 0.0;
        }
        if status.is_terminal() {
            self.item.completed_at = Some(Utc::now());
        }
        let event = self.status_event();
        self.emit(event);
        if status.is_terminal() {
            // Dropping the senders ends every subscriber's stream.
            self.subscribers.clear();
        }
    }
}

struct QueueState {
    entries: BTreeMap<u64, Entry>,
    next_id: u64,
    max_concurrent: usize,
}

struct Inner {
    state: Mutex<QueueState>,
    sessions: Arc<SessionRegistry>,
    limits: SharedLimits,
    chunk_size: usize,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn effective_cap(&self, session_id: &str, direction: TransferDirection) -> Option<u64> {
        self.limits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .effective_limit(session_id, direction)
    }

    fn is_active(&self, id: u64) -> bool {
        self.state()
            .entries
            .get(&id)
            .map(|e| e.item.status == TransferStatus::Active)
            .unwrap_or(false)
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64 * 100.0).min(100.0)
    }
}

// ── Queue ────────────────────────────────────────────────────────────────────

/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct TransferQueue {
    inner: Arc<Inner>,
}

struct Job {
    id: u64,
    request: TransferRequest,
    offset: u64,
}

impl TransferQueue {
    pub fn new(config: QueueConfig, sessions: Arc<SessionRegistry>, limits: SharedLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    entries: BTreeMap::new(),
                    next_id: 1,
                    max_concurrent: config.max_concurrent.max(1),
                }),
                sessions,
                limits,
                chunk_size: config.chunk_size,
            }),
        }
    }

    /// Append a transfer and return its id. The transfer starts as soon as a
    /// slot is free. Must be called from within a tokio runtime.
    pub fn enqueue(&self, request: TransferRequest) -> TransferResult<u64> {
        if request.local_path.trim().is_empty() || request.remote_path.trim().is_empty() {
            return Err(TransferError::invalid("Local and remote paths are required"));
        }
        self.inner.sessions.lookup(&request.session_id)?;

        let id = {
            let mut state = self.inner.state();
            let id = state.next_id;
            state.next_id += 1;
            let item = TransferItem {
                id,
                session_id: request.session_id,
                direction: request.direction,
                local_path: request.local_path,
                remote_path: request.remote_path,
                size: 0,
                transferred: 0,
                status: TransferStatus::Queued,
                percent: 0.0,
                speed_bps: 0.0,
                error: None,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            };
            debug!(transfer_id = id, direction = ?item.direction, "Transfer queued");
            state.entries.insert(
                id,
                Entry {
                    item,
                    running: false,
                    offset: 0,
                    subscribers: Vec::new(),
                },
            );
            id
        };
        schedule(&self.inner);
        Ok(id)
    }

    /// Halt an active transfer at its next chunk boundary.
    pub fn pause(&self, id: u64) -> TransferResult<()> {
        let mut state = self.inner.state();
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or_else(|| TransferError::transfer_not_found(id))?;
        if entry.item.status != TransferStatus::Active {
            return Err(invalid_state(id, "paused", entry.item.status));
        }
        entry.set_status(TransferStatus::Paused);
        info!(transfer_id = id, transferred = entry.item.transferred, "Transfer paused");
        Ok(())
    }

    /// Put a paused transfer back in line.
    pub fn resume(&self, id: u64) -> TransferResult<()> {
        {
            let mut state = self.inner.state();
            let entry = state
                .entries
                .get_mut(&id)
                .ok_or_else(|| TransferError::transfer_not_found(id))?;
            if entry.item.status != TransferStatus::Paused {
                return Err(invalid_state(id, "resumed", entry.item.status));
            }
            entry.set_status(TransferStatus::Queued);
            info!(transfer_id = id, offset = entry.offset, "Transfer resumed");
        }
        schedule(&self.inner);
        Ok(())
    }

    /// Cancel a live transfer. Partially written files are left in place.
    pub fn cancel(&self, id: u64) -> TransferResult<()> {
        {
            let mut state = self.inner.state();
            let entry = state
                .entries
                .get_mut(&id)
                .ok_or_else(|| TransferError::transfer_not_found(id))?;
            if !entry.item.status.is_live() {
                return Err(invalid_state(id, "cancelled", entry.item.status));
            }
            entry.set_status(TransferStatus::Cancelled);
            info!(transfer_id = id, "Transfer cancelled");
        }
        schedule(&self.inner);
        Ok(())
    }

    /// Drop every completed, failed and cancelled transfer. Returns how many
    /// were removed.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.state();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, e| e.running || !e.item.status.is_terminal());
        before - state.entries.len()
    }

    pub fn get(&self, id: u64) -> TransferResult<TransferItem> {
        self.inner
            .state()
            .entries
            .get(&id)
            .map(|e| e.item.clone())
            .ok_or_else(|| TransferError::transfer_not_found(id))
    }

    /// All transfers in enqueue order.
    pub fn list(&self) -> Vec<TransferItem> {
        self.inner
            .state()
            .entries
            .values()
            .map(|e| e.item.clone())
            .collect()
    }

    /// Progress and status events for one transfer. Subscribing to a
    /// finished transfer yields its final status and ends.
    pub fn subscribe(&self, id: u64) -> TransferResult<ProgressStream> {
        let mut state = self.inner.state();
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or_else(|| TransferError::transfer_not_found(id))?;
        let (tx, rx) = mpsc::unbounded_channel();
        if entry.item.status.is_terminal() {
            let _ = tx.send(entry.status_event());
        } else {
            entry.subscribers.push(tx);
        }
        Ok(UnboundedReceiverStream::new(rx))
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.state().max_concurrent
    }

    /// Change the concurrency bound. Running transfers above a lowered bound
    /// finish normally; no new ones start until the count drops below it.
    pub fn set_max_concurrent(&self, n: usize) -> TransferResult<()> {
        if n == 0 {
            return Err(TransferError::invalid("maxConcurrent must be at least 1"));
        }
        self.inner.state().max_concurrent = n;
        info!(max_concurrent = n, "Concurrency bound changed");
        schedule(&self.inner);
        Ok(())
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.inner.state();
        let mut counts = QueueCounts::default();
        for entry in state.entries.values() {
            match entry.item.status {
                TransferStatus::Queued => counts.queued += 1,
                TransferStatus::Active => counts.active += 1,
                TransferStatus::Paused => counts.paused += 1,
                TransferStatus::Completed => counts.completed += 1,
                TransferStatus::Error => counts.error += 1,
                TransferStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

fn invalid_state(id: u64, verb: &str, status: TransferStatus) -> TransferError {
    TransferError::transfer(format!(
        "Transfer {} cannot be {} while {}",
        id, verb, status
    ))
}

// ── Scheduling ───────────────────────────────────────────────────────────────

/// Start queued transfers, earliest first, while slots are free.
fn schedule(inner: &Arc<Inner>) {
    let jobs = {
        let mut state = inner.state();
        let max = state.max_concurrent;
        let mut running = state.entries.values().filter(|e| e.running).count();
        let mut jobs = Vec::new();
        for entry in state.entries.values_mut() {
            if running >= max {
                break;
            }
            if entry.running || entry.item.status != TransferStatus::Queued {
                continue;
            }
            entry.running = true;
            entry.item.started_at = Some(Utc::now());
            entry.set_status(TransferStatus::Active);
            running += 1;
            jobs.push(Job {
                id: entry.item.id,
                request: TransferRequest {
                    session_id: entry.item.session_id.clone(),
                    direction: entry.item.direction,
                    local_path: entry.item.local_path.clone(),
                    remote_path: entry.item.remote_path.clone(),
                },
                offset: entry.offset,
            });
        }
        jobs
    };

    for job in jobs {
        let inner = inner.clone();
        debug!(transfer_id = job.id, offset = job.offset, "Transfer started");
        tokio::spawn(async move {
            let id = job.id;
            let result = execute(&inner, job).await;
            finish(&inner, id, result);
            schedule(&inner);
        });
    }
}

async fn execute(inner: &Arc<Inner>, job: Job) -> TransferResult<TransferOutcome> {
    let handle = inner.sessions.lookup(&job.request.session_id)?;
    let mut session = handle.lock().await?;
    // Paused or cancelled while waiting for the transport.
    if !inner.is_active(job.id) {
        return Ok(TransferOutcome::Halted(job.offset));
    }

    let request = &job.request;
    let mut observer = QueueObserver::new(inner.clone(), handle.clone(), job.id, request.direction);
    let result = match request.direction {
        TransferDirection::Upload => {
            session
                .upload(&request.local_path, &request.remote_path, job.offset, &mut observer)
                .await
        }
        TransferDirection::Download => {
            session
                .download(&request.remote_path, &request.local_path, job.offset, &mut observer)
                .await
        }
    };
    drop(session);
    handle.record(request.direction, observer.moved);

    if handle.is_closing() {
        return Err(TransferError::session_not_found(handle.id()));
    }
    result.map_err(|e| e.with_session(handle.id()))
}

/// Record how a task ended and free its slot.
fn finish(inner: &Inner, id: u64, result: TransferResult<TransferOutcome>) {
    let mut state = inner.state();
    let Some(entry) = state.entries.get_mut(&id) else {
        return;
    };
    entry.running = false;

    match (entry.item.status, result) {
        (TransferStatus::Cancelled, _) => {
            debug!(transfer_id = id, "Cancelled transfer stopped");
        }
        (_, Ok(TransferOutcome::Finished(position))) => {
            entry.offset = 0;
            entry.item.transferred = position;
            entry.item.size = entry.item.size.max(position);
            entry.item.percent = 100.0;
            entry.item.error = None;
            entry.set_status(TransferStatus::Completed);
            info!(transfer_id = id, bytes = position, "Transfer completed");
        }
        (TransferStatus::Paused | TransferStatus::Queued, Ok(TransferOutcome::Halted(position))) => {
            entry.offset = position;
            entry.item.transferred = position;
            entry.item.percent = percent(position, entry.item.size);
        }
        (_, Ok(TransferOutcome::Halted(position))) => {
            entry.offset = position;
            entry.item.error = Some("Transfer stopped unexpectedly".into());
            entry.set_status(TransferStatus::Error);
            warn!(transfer_id = id, position, "Transfer halted without a pause");
        }
        (_, Err(e)) => {
            warn!(transfer_id = id, error = %e, "Transfer failed");
            entry.item.error = Some(e.message);
            entry.set_status(TransferStatus::Error);
        }
    }
}

// ── Chunk observer ───────────────────────────────────────────────────────────

struct QueueObserver {
    inner: Arc<Inner>,
    handle: Arc<SessionHandle>,
    id: u64,
    direction: TransferDirection,
    throttle: Throttle,
    total: u64,
    transferred: u64,
    /// Bytes moved by this run only.
    moved: u64,
    last_tick: Instant,
}

impl QueueObserver {
    fn new(
        inner: Arc<Inner>,
        handle: Arc<SessionHandle>,
        id: u64,
        direction: TransferDirection,
    ) -> Self {
        let cap = inner.effective_cap(handle.id(), direction);
        Self {
            inner,
            handle,
            id,
            direction,
            throttle: Throttle::new(cap),
            total: 0,
            transferred: 0,
            moved: 0,
            last_tick: Instant::now(),
        }
    }

    fn refresh_cap(&mut self) {
        let cap = self.inner.effective_cap(self.handle.id(), self.direction);
        self.throttle.set_cap(cap);
    }
}

#[async_trait]
impl ChunkObserver for QueueObserver {
    fn chunk_size(&self) -> usize {
        chunk_size_for(self.throttle.cap(), self.inner.chunk_size)
    }

    fn on_start(&mut self, total: u64, offset: u64) {
        self.total = total;
        self.transferred = offset;
        self.last_tick = Instant::now();
        self.refresh_cap();

        let mut state = self.inner.state();
        if let Some(entry) = state.entries.get_mut(&self.id) {
            entry.item.size = total;
            entry.item.transferred = offset;
            entry.item.percent = percent(offset, total);
        }
    }

    async fn throttle(&mut self, len: usize) {
        self.refresh_cap();
        self.throttle.admit(len).await;
    }

    fn on_chunk(&mut self, len: usize) -> ChunkControl {
        self.transferred += len as u64;
        self.moved += len as u64;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        let speed = if elapsed > 0.0 { len as f64 / elapsed } else { 0.0 };

        if self.handle.is_closing() {
            return ChunkControl::Halt;
        }

        let mut state = self.inner.state();
        let Some(entry) = state.entries.get_mut(&self.id) else {
            return ChunkControl::Halt;
        };
        if entry.item.status != TransferStatus::Active {
            return ChunkControl::Halt;
        }

        // An unknown size stays 0 until the transfer finishes.
        let total = if self.total == 0 {
            0
        } else {
            self.total.max(self.transferred)
        };
        entry.item.size = total;
        entry.item.transferred = self.transferred;
        entry.item.percent = percent(self.transferred, total);
        entry.item.speed_bps = speed;
        let progress = TransferProgress {
            transfer_id: self.id,
            percent: entry.item.percent,
            transferred: self.transferred,
            total,
            speed,
            applied_cap: self.throttle.cap(),
        };
        entry.emit(TransferEvent::Progress(progress));
        ChunkControl::Continue
    }
}
