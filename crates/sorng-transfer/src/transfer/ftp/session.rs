//! FTP / FTPS implementation of [`RemoteSession`].
//!
//! Lifecycle: TCP connect → (implicit TLS) → banner → (`AUTH TLS`) →
//! `PBSZ 0` / `PROT P` → `USER` / `PASS` → `FEAT` → `TYPE I`.
//!
//! `rename`, `stat` and `chmod` are left to the trait defaults.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::ftp::codec::FtpCodec;
use crate::transfer::ftp::data::{DataChannel, DataStream};
use crate::transfer::ftp::parser;
use crate::transfer::ftp::tls;
use crate::transfer::session::{
    path_prefixes, pump, ChunkObserver, RemoteSession, TransferOutcome,
};
use crate::transfer::types::{ConnectionConfig, Protocol, RemoteEntry, TransferDirection};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// How long to wait for the completion reply after abandoning a data
/// connection.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extensions advertised by `FEAT` that change how we talk to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub size: bool,
    pub mdtm: bool,
    pub mfmt: bool,
    pub epsv: bool,
    pub rest_stream: bool,
    pub utf8: bool,
}

impl ServerFeatures {
    pub fn from_feat_lines(lines: &[String]) -> Self {
        let raw: Vec<String> = lines
            .iter()
            .skip(1)
            .filter(|l| !l.starts_with("211"))
            .map(|l| l.trim().to_ascii_uppercase())
            .collect();
        let has = |feat: &str| raw.iter().any(|l| l.starts_with(feat));
        Self {
            mlsd: has("MLSD") || has("MLST"),
            size: has("SIZE"),
            mdtm: has("MDTM"),
            mfmt: has("MFMT"),
            epsv: has("EPSV"),
            rest_stream: has("REST STREAM"),
            utf8: has("UTF8"),
        }
    }
}

pub struct FtpSession {
    codec: FtpCodec,
    config: ConnectionConfig,
    features: ServerFeatures,
    /// Present for FTPS; reused for every data channel.
    tls: Option<TlsConnector>,
    /// Completion replies owed by the server after an abandoned transfer.
    stray_replies: usize,
}

impl FtpSession {
    pub async fn connect(config: &ConnectionConfig) -> TransferResult<Self> {
        let addr = config.address();
        let reply_timeout = Duration::from_secs(config.data_timeout_secs.max(1));

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| TransferError::connection(format!("TCP connect to {}: {}", addr, e)))?;
        tcp.set_nodelay(true).ok();

        let tls = match config.protocol {
            Protocol::Ftps => Some(tls::build_connector(config.accept_invalid_certs)?),
            _ => None,
        };

        let mut codec = match (&tls, config.implicit_tls) {
            (Some(connector), true) => {
                let stream = tls::wrap(connector, &config.host, tcp).await?;
                FtpCodec::from_tls(stream, reply_timeout)
            }
            _ => FtpCodec::from_tcp(tcp, reply_timeout),
        };

        let banner = codec.read_reply().await?;
        if !banner.is_success() {
            return Err(TransferError::connection(format!(
                "Server refused connection: {}",
                banner.text()
            ))
            .with_code(banner.code));
        }

        // ── FTPS ─────────────────────────────────────────────────
        if let Some(connector) = &tls {
            if !codec.is_tls() {
                let reply = codec.execute("AUTH TLS").await?;
                if !reply.is_success() {
                    return Err(TransferError::connection(format!(
                        "AUTH TLS rejected: {}",
                        reply.text()
                    ))
                    .with_code(reply.code));
                }
                codec = tls::upgrade(codec, connector, &config.host).await?;
            }
            codec.expect_ok("PBSZ 0").await?;
            codec.expect_ok("PROT P").await?;
        }

        // ── Login ────────────────────────────────────────────────
        let user = codec.execute(&format!("USER {}", config.username)).await?;
        let login = if user.is_intermediate() {
            let password = config.password.as_deref().unwrap_or("");
            codec.execute(&format!("PASS {}", password)).await?
        } else {
            user
        };
        if !login.is_success() {
            return Err(TransferError::connection(format!("Login failed: {}", login.text()))
                .with_code(login.code));
        }

        // ── FEAT ─────────────────────────────────────────────────
        let features = match codec.execute("FEAT").await {
            Ok(r) if r.is_success() => ServerFeatures::from_feat_lines(&r.lines),
            _ => ServerFeatures::default(),
        };
        if features.utf8 {
            let _ = codec.execute("OPTS UTF8 ON").await;
        }
        codec.expect_ok("TYPE I").await?;

        info!(
            host = %config.host,
            secure = tls.is_some(),
            mlsd = features.mlsd,
            epsv = features.epsv,
            "FTP session ready"
        );

        Ok(Self {
            codec,
            config: config.clone(),
            features,
            tls,
            stray_replies: 0,
        })
    }

    fn stall(&self) -> Duration {
        Duration::from_secs(self.config.data_timeout_secs.max(1))
    }

    async fn open_data(&mut self) -> TransferResult<DataStream> {
        self.settle().await;
        DataChannel {
            host: &self.config.host,
            epsv: self.features.epsv,
            tls: self.tls.as_ref(),
            connect_timeout: Duration::from_secs(self.config.connect_timeout_secs.max(1)),
        }
        .open(&mut self.codec)
        .await
    }

    /// Swallow completion replies left behind by an abandoned transfer.
    async fn settle(&mut self) {
        while self.stray_replies > 0 {
            match timeout(DRAIN_TIMEOUT, self.codec.read_reply()).await {
                Ok(Ok(reply)) => {
                    debug!(code = reply.code, "Discarded late completion reply");
                    self.stray_replies -= 1;
                }
                _ => self.stray_replies = 0,
            }
        }
    }

    /// Read the reply that closes a finished transfer.
    async fn expect_completion(&mut self) -> TransferResult<()> {
        let done = self.codec.read_reply().await?;
        if !done.is_success() {
            return Err(done.into_error());
        }
        Ok(())
    }

    /// After dropping a data connection mid-transfer the server still owes
    /// a 426/226. Read it if it comes quickly, otherwise remember it.
    async fn drain_completion(&mut self) {
        match timeout(DRAIN_TIMEOUT, self.codec.read_reply()).await {
            Ok(Ok(reply)) => debug!(code = reply.code, "Abandoned transfer closed"),
            Ok(Err(e)) => warn!(error = %e, "Control channel error after abandoned transfer"),
            Err(_) => self.stray_replies += 1,
        }
    }

    /// Start a data command. The server must answer 1xx before any data
    /// moves.
    async fn start_transfer(&mut self, cmd: &str) -> TransferResult<()> {
        let reply = self.codec.execute(cmd).await?;
        if !reply.is_preliminary() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn remote_size(&mut self, path: &str) -> Option<u64> {
        if !self.features.size {
            return None;
        }
        match self.codec.execute(&format!("SIZE {}", path)).await {
            Ok(r) if r.is_success() => r.message().trim().parse().ok(),
            _ => None,
        }
    }

    async fn current_dir(&mut self) -> Option<String> {
        let reply = self.codec.execute("PWD").await.ok()?;
        if !reply.is_success() {
            return None;
        }
        parse_pwd(&reply.text())
    }

    async fn push_mtime(&mut self, local: &str, remote: &str) {
        if !self.features.mfmt {
            debug!(remote, "MFMT not advertised; remote mtime left as is");
            return;
        }
        let modified = match fs::metadata(local).await.and_then(|m| m.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) => {
                warn!(local, error = %e, "Cannot read local mtime");
                return;
            }
        };
        let cmd = format!("MFMT {} {}", modified.format("%Y%m%d%H%M%S"), remote);
        match self.codec.execute(&cmd).await {
            Ok(r) if r.is_success() => {}
            Ok(r) => warn!(remote, code = r.code, "MFMT refused"),
            Err(e) => warn!(remote, error = %e, "MFMT failed"),
        }
    }

    async fn pull_mtime(&mut self, remote: &str, local: &str) {
        let reply = match self.codec.execute(&format!("MDTM {}", remote)).await {
            Ok(r) if r.is_success() => r,
            Ok(r) => {
                warn!(remote, code = r.code, "MDTM refused");
                return;
            }
            Err(e) => {
                warn!(remote, error = %e, "MDTM failed");
                return;
            }
        };
        let Some(ts) = parser::parse_mlsd_time(reply.message()) else {
            warn!(remote, reply = reply.message(), "Unparseable MDTM reply");
            return;
        };
        let mtime = FileTime::from_unix_time(ts.timestamp(), 0);
        if let Err(e) = filetime::set_file_mtime(local, mtime) {
            warn!(local, error = %e, "Cannot set local mtime");
        }
    }

    /// Finish or abandon the data connection depending on how the copy
    /// loop ended.
    async fn conclude(
        &mut self,
        mut data: DataStream,
        result: TransferResult<TransferOutcome>,
    ) -> TransferResult<TransferOutcome> {
        match result {
            Ok(TransferOutcome::Finished(n)) => {
                match timeout(self.stall(), data.shutdown()).await {
                    Ok(Err(e)) => debug!(error = %e, "Data channel shutdown"),
                    Err(_) => debug!("Data channel shutdown timed out"),
                    Ok(Ok(())) => {}
                }
                drop(data);
                self.expect_completion().await?;
                Ok(TransferOutcome::Finished(n))
            }
            Ok(TransferOutcome::Halted(n)) => {
                drop(data);
                self.drain_completion().await;
                Ok(TransferOutcome::Halted(n))
            }
            Err(e) => {
                drop(data);
                self.drain_completion().await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    async fn list_directory(&mut self, path: &str) -> TransferResult<Vec<RemoteEntry>> {
        let verb = if self.features.mlsd { "MLSD" } else { "LIST" };
        let cmd = if path.is_empty() {
            verb.to_string()
        } else {
            format!("{} {}", verb, path)
        };

        let mut data = self.open_data().await?;
        self.start_transfer(&cmd).await?;

        let mut raw = Vec::new();
        let read = timeout(self.stall(), data.read_to_end(&mut raw)).await;
        drop(data);
        match read {
            Err(_) => {
                self.drain_completion().await;
                return Err(TransferError::transfer(format!("Listing of '{}' timed out", path)));
            }
            Ok(Err(e)) => {
                self.drain_completion().await;
                return Err(TransferError::transfer(format!("Listing of '{}': {}", path, e)));
            }
            Ok(Ok(_)) => {}
        }
        self.expect_completion().await?;

        Ok(parser::parse_listing(&String::from_utf8_lossy(&raw)))
    }

    async fn upload(
        &mut self,
        local: &str,
        remote: &str,
        offset: u64,
        observer: &mut dyn ChunkObserver,
    ) -> TransferResult<TransferOutcome> {
        let mut file = fs::File::open(local)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| TransferError::local_io(local, e))?
            .len();
        let offset = if offset > total { 0 } else { offset };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| TransferError::local_io(local, e))?;
        }
        observer.on_start(total, offset);

        let mut data = self.open_data().await?;
        let verb = if offset > 0 { "APPE" } else { "STOR" };
        self.start_transfer(&format!("{} {}", verb, remote)).await?;
        debug!(local, remote, offset, verb, "FTP upload started");

        let stall = self.stall();
        let result = pump(
            &mut file,
            &mut data,
            offset,
            stall,
            TransferDirection::Upload,
            observer,
        )
        .await;
        let outcome = self.conclude(data, result).await?;

        if matches!(outcome, TransferOutcome::Finished(_)) && self.config.preserve_timestamps {
            self.push_mtime(local, remote).await;
        }
        Ok(outcome)
    }

    async fn download(
        &mut self,
        remote: &str,
        local: &str,
        offset: u64,
        observer: &mut dyn ChunkObserver,
    ) -> TransferResult<TransferOutcome> {
        let total = self.remote_size(remote).await.unwrap_or(0);

        if offset == 0 {
            if let Some(parent) = Path::new(local).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TransferError::local_io(local, e))?;
            }
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(local)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;

        let mut offset = offset;
        if offset > 0 && !self.features.rest_stream {
            warn!(remote, "REST STREAM not advertised; restarting from zero");
            offset = 0;
        }

        // REST must be the last command before RETR.
        let mut data = self.open_data().await?;
        if offset > 0 {
            let reply = self.codec.execute(&format!("REST {}", offset)).await?;
            if !reply.is_intermediate() {
                warn!(remote, code = reply.code, "REST refused; restarting from zero");
                offset = 0;
            }
        }
        file.set_len(offset)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        observer.on_start(total, offset);

        self.start_transfer(&format!("RETR {}", remote)).await?;
        debug!(remote, local, offset, total, "FTP download started");

        let stall = self.stall();
        let result = pump(
            &mut data,
            &mut file,
            offset,
            stall,
            TransferDirection::Download,
            observer,
        )
        .await;
        drop(file);
        let outcome = self.conclude(data, result).await?;

        if matches!(outcome, TransferOutcome::Finished(_)) && self.config.preserve_timestamps {
            self.pull_mtime(remote, local).await;
        }
        Ok(outcome)
    }

    async fn delete(&mut self, path: &str) -> TransferResult<()> {
        self.settle().await;
        self.codec.expect_ok(&format!("DELE {}", path)).await?;
        Ok(())
    }

    /// FTP has no `mkdir -p`: walk the path, `CWD` into each prefix and
    /// `MKD` the ones that are missing. The working directory is restored
    /// afterwards.
    async fn mkdir(&mut self, path: &str) -> TransferResult<()> {
        self.settle().await;
        let home = self.current_dir().await;

        let mut result = Ok(());
        for prefix in path_prefixes(path) {
            if self.codec.execute(&format!("CWD {}", prefix)).await?.is_success() {
                continue;
            }
            let mkd = self.codec.execute(&format!("MKD {}", prefix)).await?;
            if mkd.is_success() {
                continue;
            }
            // 550 may just mean "exists"; believe it only if CWD now works.
            let exists = mkd.code == 550
                && self.codec.execute(&format!("CWD {}", prefix)).await?.is_success();
            if !exists {
                result = Err(TransferError::transfer(format!(
                    "Cannot create directory '{}': {}",
                    prefix,
                    mkd.message()
                ))
                .with_code(mkd.code));
                break;
            }
        }

        if let Some(home) = home {
            let _ = self.codec.execute(&format!("CWD {}", home)).await;
        }
        result
    }

    async fn close(&mut self) -> TransferResult<()> {
        let _ = timeout(DRAIN_TIMEOUT, self.codec.execute("QUIT")).await;
        Ok(())
    }
}

/// `257 "/some/path" is current directory`
fn parse_pwd(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let rest = &text[start + 1..];
    // Embedded quotes are doubled.
    let mut out = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                out.push('"');
            } else {
                return Some(out);
            }
        } else {
            out.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::error::TransferErrorKind;
    use crate::transfer::ftp::testserver::{FakeFtp, FakeFtpOptions};
    use crate::transfer::session::ChunkControl;

    #[derive(Default)]
    struct Counting {
        total: u64,
        start: u64,
        chunks: usize,
        halt_after: Option<usize>,
    }

    #[async_trait]
    impl ChunkObserver for Counting {
        fn chunk_size(&self) -> usize {
            4096
        }
        fn on_start(&mut self, total: u64, offset: u64) {
            self.total = total;
            self.start = offset;
        }
        async fn throttle(&mut self, _len: usize) {}
        fn on_chunk(&mut self, _len: usize) -> ChunkControl {
            self.chunks += 1;
            match self.halt_after {
                Some(n) if self.chunks >= n => ChunkControl::Halt,
                _ => ChunkControl::Continue,
            }
        }
    }

    fn config_for(server: &FakeFtp) -> ConnectionConfig {
        let mut cfg = ConnectionConfig::new(Protocol::Ftp, "127.0.0.1", "demo");
        cfg.port = server.port();
        cfg.password = Some("secret".into());
        cfg.data_timeout_secs = 5;
        cfg
    }

    #[test]
    fn feat_parsing() {
        let lines: Vec<String> = ["211-Features:", " MLST type*;size*;", " EPSV", " REST STREAM", "211 End"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let f = ServerFeatures::from_feat_lines(&lines);
        assert!(f.mlsd && f.epsv && f.rest_stream);
        assert!(!f.mfmt && !f.size);
    }

    #[test]
    fn pwd_parsing() {
        assert_eq!(parse_pwd(r#"257 "/home/demo" is cwd"#).as_deref(), Some("/home/demo"));
        assert_eq!(parse_pwd(r#"257 "/a ""b""" ok"#).as_deref(), Some(r#"/a "b""#));
        assert_eq!(parse_pwd("257 nothing"), None);
    }

    #[tokio::test]
    async fn rejected_login_is_connection_error() {
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        let mut cfg = config_for(&server);
        cfg.password = Some("wrong".into());
        let err = FtpSession::connect(&cfg).await.err().unwrap();
        assert_eq!(err.kind, TransferErrorKind::ConnectionError);
        assert_eq!(err.code, Some(530));
    }

    #[tokio::test]
    async fn upload_list_download_round_trip() {
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &payload).unwrap();

        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        let mut obs = Counting::default();
        let out = s
            .upload(src.to_str().unwrap(), "/up/data.bin", 0, &mut obs)
            .await
            .unwrap();
        assert_eq!(out, TransferOutcome::Finished(50_000));
        assert_eq!(obs.total, 50_000);
        assert_eq!(server.file("/up/data.bin").unwrap(), payload);

        let listing = s.list_directory("/up").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "data.bin");
        assert_eq!(listing[0].size, 50_000);

        let dst = dir.path().join("nested/out.bin");
        let mut obs = Counting::default();
        let out = s
            .download("/up/data.bin", dst.to_str().unwrap(), 0, &mut obs)
            .await
            .unwrap();
        assert_eq!(out, TransferOutcome::Finished(50_000));
        assert_eq!(obs.total, 50_000);
        assert_eq!(std::fs::read(&dst).unwrap(), payload);

        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn halted_upload_resumes_with_appe() {
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.bin");
        let payload: Vec<u8> = (0..40_000u32).map(|i| (i % 7) as u8).collect();
        std::fs::write(&src, &payload).unwrap();

        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        let mut obs = Counting {
            halt_after: Some(3),
            ..Default::default()
        };
        let out = s
            .upload(src.to_str().unwrap(), "/big.bin", 0, &mut obs)
            .await
            .unwrap();
        let TransferOutcome::Halted(at) = out else {
            panic!("expected halt, got {:?}", out);
        };
        assert!(at > 0 && at < 40_000);
        assert_eq!(obs.chunks, 3);

        server.wait_for_len("/big.bin", at as usize).await;
        let mut obs = Counting::default();
        let out = s
            .upload(src.to_str().unwrap(), "/big.bin", at, &mut obs)
            .await
            .unwrap();
        assert_eq!(out, TransferOutcome::Finished(40_000));
        assert_eq!(server.file("/big.bin").unwrap(), payload);
    }

    #[tokio::test]
    async fn download_resumes_with_rest() {
        let payload: Vec<u8> = (0..30_000u32).map(|i| (i % 13) as u8).collect();
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        server.put("/r.bin", payload.clone());

        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("r.bin");
        std::fs::write(&dst, &payload[..10_000]).unwrap();

        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        let mut obs = Counting::default();
        let out = s
            .download("/r.bin", dst.to_str().unwrap(), 10_000, &mut obs)
            .await
            .unwrap();
        assert_eq!(out, TransferOutcome::Finished(30_000));
        assert_eq!(obs.start, 10_000);
        assert_eq!(std::fs::read(&dst).unwrap(), payload);
    }

    #[tokio::test]
    async fn download_restarts_without_rest_stream() {
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 17) as u8).collect();
        let server = FakeFtp::start(FakeFtpOptions {
            rest_stream: false,
            ..Default::default()
        })
        .await;
        server.put("/r.bin", payload.clone());

        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("r.bin");
        std::fs::write(&dst, b"stale partial data").unwrap();

        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        let mut obs = Counting::default();
        let out = s
            .download("/r.bin", dst.to_str().unwrap(), 5_000, &mut obs)
            .await
            .unwrap();
        assert_eq!(out, TransferOutcome::Finished(20_000));
        assert_eq!(obs.start, 0);
        assert_eq!(std::fs::read(&dst).unwrap(), payload);
    }

    #[tokio::test]
    async fn mkdir_is_recursive_and_idempotent() {
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        s.mkdir("/a/b/c").await.unwrap();
        s.mkdir("/a/b/c").await.unwrap();
        assert!(server.has_dir("/a/b"));
        assert!(server.has_dir("/a/b/c"));
    }

    #[tokio::test]
    async fn unsupported_ops_never_hit_the_wire() {
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        let before = server.command_count();
        let err = s.chmod("/x", 0o644).await.unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::UnsupportedOperation);
        assert!(s.rename("/a", "/b").await.is_err());
        assert!(s.stat("/a").await.is_err());
        assert_eq!(server.command_count(), before);
    }

    #[tokio::test]
    async fn delete_missing_file_is_transfer_error() {
        let server = FakeFtp::start(FakeFtpOptions::default()).await;
        let mut s = FtpSession::connect(&config_for(&server)).await.unwrap();
        let err = s.delete("/nope").await.unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::TransferError);
        assert_eq!(err.code, Some(550));
    }
}
