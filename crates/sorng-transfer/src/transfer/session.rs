//! Protocol-neutral session interface.
//!
//! [`RemoteSession`] is the fixed capability set every protocol variant is
//! driven through. Variants override what they support; everything else falls
//! through to the default methods, which fail fast with
//! `UnsupportedOperation` and never touch the wire.
//!
//! Uploads and downloads are explicit chunk loops that talk to a
//! [`ChunkObserver`] between chunks. The observer owns throttling, progress
//! reporting and the pause/cancel checkpoint; the session only moves bytes.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::{Protocol, RemoteEntry, RemoteStat, TransferDirection};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Answer of the observer after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkControl {
    Continue,
    /// Stop at this boundary, leaving the session usable.
    Halt,
}

/// How a chunked copy ended. Both variants carry the absolute byte position
/// reached, start offset included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Finished(u64),
    Halted(u64),
}

/// Callback surface of a running copy loop.
#[async_trait]
pub trait ChunkObserver: Send {
    /// Bytes to move in the next chunk. May change between chunks.
    fn chunk_size(&self) -> usize;

    /// Called once the total size (0 when the server cannot tell) and the
    /// actual start offset are known. The offset may be lower than requested
    /// when the server cannot resume.
    fn on_start(&mut self, total: u64, offset: u64);

    /// Wait as long as the bandwidth cap requires before `len` bytes go out.
    async fn throttle(&mut self, len: usize);

    /// Record a chunk that has been written to the sink.
    fn on_chunk(&mut self, len: usize) -> ChunkControl;
}

#[async_trait]
pub trait RemoteSession: Send {
    fn protocol(&self) -> Protocol;

    async fn list_directory(&mut self, path: &str) -> TransferResult<Vec<RemoteEntry>>;

    /// Copy `local` to `remote`, starting at byte `offset` of both.
    async fn upload(
        &mut self,
        local: &str,
        remote: &str,
        offset: u64,
        observer: &mut dyn ChunkObserver,
    ) -> TransferResult<TransferOutcome>;

    /// Copy `remote` to `local`, starting at byte `offset` of both.
    async fn download(
        &mut self,
        remote: &str,
        local: &str,
        offset: u64,
        observer: &mut dyn ChunkObserver,
    ) -> TransferResult<TransferOutcome>;

    async fn rename(&mut self, _from: &str, _to: &str) -> TransferResult<()> {
        Err(unsupported(self.protocol(), "rename"))
    }

    async fn delete(&mut self, _path: &str) -> TransferResult<()> {
        Err(unsupported(self.protocol(), "delete"))
    }

    async fn stat(&mut self, _path: &str) -> TransferResult<RemoteStat> {
        Err(unsupported(self.protocol(), "stat"))
    }

    async fn chmod(&mut self, _path: &str, _mode: u32) -> TransferResult<()> {
        Err(unsupported(self.protocol(), "chmod"))
    }

    /// Create `path` and any missing parents. Succeeds if it already exists.
    async fn mkdir(&mut self, _path: &str) -> TransferResult<()> {
        Err(unsupported(self.protocol(), "mkdir"))
    }

    /// Release the transport. Errors are logged by callers, not surfaced.
    async fn close(&mut self) -> TransferResult<()> {
        Ok(())
    }
}

pub(crate) fn unsupported(protocol: Protocol, op: &str) -> TransferError {
    TransferError::unsupported(format!(
        "{} is not supported over {}",
        op,
        protocol.to_string().to_uppercase()
    ))
}

// ── Async chunk loop ─────────────────────────────────────────────────

/// Chunked copy between two async streams.
///
/// `direction` decides which side is local: read failures on an upload and
/// write failures on a download are `IoError`, the remote side is
/// `TransferError`. Each read and each write must make progress within
/// `stall`.
pub(crate) async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    start: u64,
    stall: Duration,
    direction: TransferDirection,
    observer: &mut dyn ChunkObserver,
) -> TransferResult<TransferOutcome>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (read_side, write_side) = match direction {
        TransferDirection::Upload => (Side::Local, Side::Remote),
        TransferDirection::Download => (Side::Remote, Side::Local),
    };

    let mut buf = Vec::new();
    let mut position = start;
    loop {
        let want = observer.chunk_size().max(1);
        if buf.len() != want {
            buf.resize(want, 0);
        }

        let n = match timeout(stall, reader.read(&mut buf)).await {
            Err(_) => return Err(stalled(read_side, "read", stall)),
            Ok(r) => r.map_err(|e| read_side.error("read", e))?,
        };
        if n == 0 {
            break;
        }

        observer.throttle(n).await;

        match timeout(stall, writer.write_all(&buf[..n])).await {
            Err(_) => return Err(stalled(write_side, "write", stall)),
            Ok(r) => r.map_err(|e| write_side.error("write", e))?,
        }
        position += n as u64;

        if observer.on_chunk(n) == ChunkControl::Halt {
            return Ok(TransferOutcome::Halted(position));
        }
    }

    match timeout(stall, writer.flush()).await {
        Err(_) => return Err(stalled(write_side, "flush", stall)),
        Ok(r) => r.map_err(|e| write_side.error("flush", e))?,
    }
    Ok(TransferOutcome::Finished(position))
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Local,
    Remote,
}

impl Side {
    fn error(self, op: &str, e: std::io::Error) -> TransferError {
        match self {
            Side::Local => TransferError::io(format!("Local {} failed: {}", op, e)),
            Side::Remote => TransferError::transfer(format!("Data channel {} failed: {}", op, e)),
        }
    }
}

fn stalled(side: Side, op: &str, after: Duration) -> TransferError {
    let msg = format!("No progress on {} for {}s", op, after.as_secs());
    match side {
        Side::Local => TransferError::io(msg),
        Side::Remote => TransferError::transfer(msg),
    }
}

// ── Shared helpers ───────────────────────────────────────────────────

/// `rwxr-xr-x` rendering of a Unix mode, with a leading type character.
pub fn format_permissions(mode: u32) -> String {
    let mut s = String::with_capacity(10);
    s.push(match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o010000 => 'p',
        0o140000 => 's',
        0o060000 => 'b',
        0o020000 => 'c',
        _ => '-',
    });

    let triplets = [(0o400, 0o200, 0o100, 0o4000), (0o040, 0o020, 0o010, 0o2000)];
    for (r, w, x, special) in triplets {
        s.push(if mode & r != 0 { 'r' } else { '-' });
        s.push(if mode & w != 0 { 'w' } else { '-' });
        s.push(match (mode & special != 0, mode & x != 0) {
            (true, true) => 's',
            (true, false) => 'S',
            (false, true) => 'x',
            (false, false) => '-',
        });
    }

    // Others: sticky bit instead of setuid/setgid.
    s.push(if mode & 0o004 != 0 { 'r' } else { '-' });
    s.push(if mode & 0o002 != 0 { 'w' } else { '-' });
    s.push(match (mode & 0o1000 != 0, mode & 0o001 != 0) {
        (true, true) => 't',
        (true, false) => 'T',
        (false, true) => 'x',
        (false, false) => '-',
    });
    s
}

/// Prefixes of `path`, one per segment: `/a/b/c` → `/a`, `/a/b`, `/a/b/c`.
pub(crate) fn path_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut out = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::error::TransferErrorKind;

    struct Recorder {
        chunk: usize,
        total: Option<u64>,
        chunks: Vec<usize>,
        halt_after: Option<usize>,
    }

    impl Recorder {
        fn new(chunk: usize) -> Self {
            Self {
                chunk,
                total: None,
                chunks: Vec::new(),
                halt_after: None,
            }
        }
    }

    #[async_trait]
    impl ChunkObserver for Recorder {
        fn chunk_size(&self) -> usize {
            self.chunk
        }
        fn on_start(&mut self, total: u64, _offset: u64) {
            self.total = Some(total);
        }
        async fn throttle(&mut self, _len: usize) {}
        fn on_chunk(&mut self, len: usize) -> ChunkControl {
            self.chunks.push(len);
            match self.halt_after {
                Some(n) if self.chunks.len() >= n => ChunkControl::Halt,
                _ => ChunkControl::Continue,
            }
        }
    }

    struct Bare;

    #[async_trait]
    impl RemoteSession for Bare {
        fn protocol(&self) -> Protocol {
            Protocol::Ftp
        }
        async fn list_directory(&mut self, _path: &str) -> TransferResult<Vec<RemoteEntry>> {
            Ok(Vec::new())
        }
        async fn upload(
            &mut self,
            _local: &str,
            _remote: &str,
            offset: u64,
            _observer: &mut dyn ChunkObserver,
        ) -> TransferResult<TransferOutcome> {
            Ok(TransferOutcome::Finished(offset))
        }
        async fn download(
            &mut self,
            _remote: &str,
            _local: &str,
            offset: u64,
            _observer: &mut dyn ChunkObserver,
        ) -> TransferResult<TransferOutcome> {
            Ok(TransferOutcome::Finished(offset))
        }
    }

    #[tokio::test]
    async fn default_capabilities_are_unsupported() {
        let mut s = Bare;
        let err = s.chmod("/x", 0o644).await.unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::UnsupportedOperation);
        assert!(err.message.contains("FTP"));
        assert!(s.stat("/x").await.is_err());
        assert!(s.rename("/a", "/b").await.is_err());
        assert!(s.close().await.is_ok());
    }

    #[tokio::test]
    async fn pump_copies_in_observer_chunks() {
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let mut reader = &data[..];
        let mut sink = Vec::new();
        let mut obs = Recorder::new(4096);
        let out = pump(
            &mut reader,
            &mut sink,
            0,
            Duration::from_secs(5),
            TransferDirection::Upload,
            &mut obs,
        )
        .await
        .unwrap();
        assert_eq!(out, TransferOutcome::Finished(10_000));
        assert_eq!(sink, data);
        assert_eq!(obs.chunks.iter().sum::<usize>(), 10_000);
        assert!(obs.chunks.iter().all(|c| *c <= 4096));
    }

    #[tokio::test]
    async fn pump_halts_at_boundary_and_reports_offset() {
        let data = vec![7u8; 20_000];
        let mut reader = &data[..];
        let mut sink = Vec::new();
        let mut obs = Recorder::new(4096);
        obs.halt_after = Some(2);
        let out = pump(
            &mut reader,
            &mut sink,
            1_000,
            Duration::from_secs(5),
            TransferDirection::Download,
            &mut obs,
        )
        .await
        .unwrap();
        assert_eq!(out, TransferOutcome::Halted(1_000 + sink.len() as u64));
        assert_eq!(obs.chunks.len(), 2);
        assert!(sink.len() < data.len());
    }

    #[test]
    fn permissions_rendering() {
        assert_eq!(format_permissions(0o100644), "-rw-r--r--");
        assert_eq!(format_permissions(0o040755), "drwxr-xr-x");
        assert_eq!(format_permissions(0o104755), "-rwsr-xr-x");
        assert_eq!(format_permissions(0o041777), "drwxrwxrwt");
    }

    #[test]
    fn prefixes_walk_each_segment() {
        assert_eq!(path_prefixes("/a/b/c"), vec!["/a", "/a/b", "/a/b/c"]);
        assert_eq!(path_prefixes("x//y/"), vec!["x", "x/y"]);
        assert!(path_prefixes("/").is_empty());
    }
}
