//! # sorng-transfer: FTP / FTPS / SFTP transfer engine
//!
//! One capability-gated session interface over three protocols, bandwidth
//! caps per session and globally, and a bounded FIFO transfer queue with
//! pause, resume, cancel and progress streams.
//!
//! Architecture:
//! - `types`: all data structures, enums, config
//! - `error`: engine error type
//! - `session`: `RemoteSession` trait and the shared chunk loop
//! - `ftp`: FTP/FTPS session (codec, TLS, data channels, listing parser)
//! - `sftp`: SFTP session over ssh2
//! - `throttle`: elapsed-budget rate limiter
//! - `limits`: per-session and global speed caps
//! - `registry`: live sessions keyed by id
//! - `queue`: scheduler with concurrency bound and progress events
//! - `profiles`: saved profile / bookmark / key collaborators
//! - `service`: high-level orchestrator (owns registry, limits, queue)
//! - `commands`: thin wrappers for hosts

pub mod types;
pub mod error;
pub mod session;
pub mod ftp;
pub mod sftp;
pub mod throttle;
pub mod limits;
pub mod registry;
pub mod queue;
pub mod profiles;
pub mod service;
pub mod commands;

// Re-exports for lib.rs consumers
pub use types::*;
pub use error::{TransferError, TransferErrorKind, TransferResult};
pub use session::{ChunkControl, ChunkObserver, RemoteSession, TransferOutcome};
pub use queue::{ProgressStream, QueueConfig};
pub use service::{TransferService, TransferServiceState};
