// ── SFTP session ─────────────────────────────────────────────────────────────
//
// ssh2 is a blocking library. Every call that may touch the network runs on
// tokio's blocking pool; chunked copies hop onto it once per chunk so the
// observer (throttle, pause, cancel) still runs between chunks.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::session::{
    format_permissions, path_prefixes, ChunkControl, ChunkObserver, RemoteSession,
    TransferOutcome,
};
use crate::transfer::types::{ConnectionConfig, EntryType, Protocol, RemoteEntry, RemoteStat};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use filetime::FileTime;
use ssh2::{ErrorCode, FileStat, OpenFlags, OpenType, RenameFlags, Session, Sftp};
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// libssh2 SFTP status codes we react to.
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;

pub struct SftpSession {
    session: Session,
    sftp: Arc<Sftp>,
    config: ConnectionConfig,
}

/// Run a blocking ssh2 call on the blocking pool.
async fn blocking<T, F>(f: F) -> TransferResult<T>
where
    F: FnOnce() -> TransferResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::transfer(format!("SFTP worker failed: {}", e)))?
}

/// Map an ssh2 error, keeping what we were doing in the message.
fn ssh_error(context: &str, e: ssh2::Error) -> TransferError {
    let detail = match e.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE) => "no such file".to_string(),
        ErrorCode::SFTP(FX_PERMISSION_DENIED) => "permission denied".to_string(),
        _ => e.message().to_string(),
    };
    TransferError::transfer(format!("{}: {}", context, detail))
}

fn remote_io(context: &str, e: std::io::Error) -> TransferError {
    TransferError::transfer(format!("{}: {}", context, e))
}

fn timeout_ms(secs: u64) -> u32 {
    u32::try_from(secs.max(1).saturating_mul(1000)).unwrap_or(u32::MAX)
}

impl SftpSession {
    pub async fn connect(config: &ConnectionConfig) -> TransferResult<Self> {
        let config = config.clone();
        blocking(move || Self::connect_blocking(config)).await
    }

    fn connect_blocking(config: ConnectionConfig) -> TransferResult<Self> {
        let addr = config.address();
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs.max(1));

        let targets: Vec<_> = (config.host.as_str(), config.effective_port())
            .to_socket_addrs()
            .map_err(|e| TransferError::connection(format!("Cannot resolve {}: {}", addr, e)))?
            .collect();
        let mut last_err = None;
        let mut tcp = None;
        for target in targets {
            match TcpStream::connect_timeout(&target, connect_timeout) {
                Ok(s) => {
                    tcp = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let tcp = tcp.ok_or_else(|| {
            TransferError::connection(format!(
                "TCP connect to {}: {}",
                addr,
                last_err.map(|e| e.to_string()).unwrap_or_else(|| "no address".into())
            ))
        })?;

        let mut session = Session::new()
            .map_err(|e| TransferError::connection(format!("Cannot create SSH session: {}", e)))?;
        session.set_timeout(timeout_ms(config.connect_timeout_secs));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| TransferError::connection(format!("SSH handshake with {}: {}", addr, e)))?;

        let method = authenticate(&session, &config)?;
        info!(host = %config.host, user = %config.username, method, "SFTP authenticated");

        session.set_timeout(timeout_ms(config.data_timeout_secs));
        let sftp = session
            .sftp()
            .map_err(|e| TransferError::connection(format!("Cannot open SFTP channel: {}", e)))?;

        Ok(Self {
            session,
            sftp: Arc::new(sftp),
            config,
        })
    }

    fn stall(&self) -> Duration {
        Duration::from_secs(self.config.data_timeout_secs.max(1))
    }

    async fn remote_stat(&self, path: &str) -> TransferResult<FileStat> {
        let sftp = self.sftp.clone();
        let path = path.to_string();
        blocking(move || {
            sftp.stat(Path::new(&path))
                .map_err(|e| ssh_error(&format!("stat '{}'", path), e))
        })
        .await
    }

    async fn open_remote(&self, path: &str, write: bool, offset: u64) -> TransferResult<RemoteFile> {
        let sftp = self.sftp.clone();
        let path = path.to_string();
        let file = blocking(move || {
            let mut file = if write {
                let mut flags = OpenFlags::WRITE | OpenFlags::CREATE;
                if offset == 0 {
                    flags |= OpenFlags::TRUNCATE;
                }
                sftp.open_mode(Path::new(&path), flags, 0o644, OpenType::File)
            } else {
                sftp.open(Path::new(&path))
            }
            .map_err(|e| ssh_error(&format!("open '{}'", path), e))?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| remote_io(&format!("seek '{}'", path), e))?;
            }
            Ok(file)
        })
        .await?;
        Ok(RemoteFile(Some(file)))
    }
}

// ── Authentication ───────────────────────────────────────────────────────────

struct PasswordPrompt {
    answer: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.answer.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMethod {
    Password,
    KeyboardInteractive,
    PublicKey,
}

/// Methods to try, in order. With a password: password, then
/// keyboard-interactive answering with it, then the key file. Without one,
/// keyboard-interactive answering "" goes last, after the key file.
fn auth_plan(config: &ConnectionConfig) -> Vec<AuthMethod> {
    let mut plan = Vec::new();
    if config.password.is_some() {
        plan.push(AuthMethod::Password);
        plan.push(AuthMethod::KeyboardInteractive);
    }
    if config.private_key_path.is_some() {
        plan.push(AuthMethod::PublicKey);
    }
    if config.password.is_none() {
        plan.push(AuthMethod::KeyboardInteractive);
    }
    plan
}

/// Walk the auth plan until the server accepts. Returns the method that
/// worked.
fn authenticate(session: &Session, config: &ConnectionConfig) -> TransferResult<&'static str> {
    let user = config.username.as_str();
    let password = config.password.as_deref().unwrap_or("");

    for method in auth_plan(config) {
        match method {
            AuthMethod::Password => {
                if session.userauth_password(user, password).is_ok() && session.authenticated() {
                    return Ok("password");
                }
            }
            AuthMethod::KeyboardInteractive => {
                let mut prompt = PasswordPrompt {
                    answer: password.to_string(),
                };
                if session
                    .userauth_keyboard_interactive(user, &mut prompt)
                    .is_ok()
                    && session.authenticated()
                {
                    return Ok("keyboard-interactive");
                }
            }
            AuthMethod::PublicKey => {
                let Some(key) = config.private_key_path.as_deref() else {
                    continue;
                };
                match session.userauth_pubkey_file(user, None, Path::new(key), config.passphrase.as_deref()) {
                    Ok(()) if session.authenticated() => return Ok("publickey"),
                    Ok(()) => {}
                    Err(e) => debug!(key, error = %e, "Public key rejected"),
                }
            }
        }
    }

    Err(TransferError::connection(format!(
        "Authentication failed for {}@{}",
        user, config.host
    )))
}

// ── Remote file handle ───────────────────────────────────────────────────────

/// An ssh2 file that is only ever touched from the blocking pool.
struct RemoteFile(Option<ssh2::File>);

impl RemoteFile {
    fn take(&mut self) -> TransferResult<ssh2::File> {
        self.0
            .take()
            .ok_or_else(|| TransferError::transfer("Remote file handle already closed"))
    }

    async fn write_chunk(&mut self, buf: Vec<u8>, len: usize) -> TransferResult<Vec<u8>> {
        let mut file = self.take()?;
        let (file, buf) = blocking(move || {
            file.write_all(&buf[..len])
                .map_err(|e| remote_io("SFTP write", e))?;
            Ok((file, buf))
        })
        .await?;
        self.0 = Some(file);
        Ok(buf)
    }

    async fn read_chunk(&mut self, mut buf: Vec<u8>) -> TransferResult<(Vec<u8>, usize)> {
        let mut file = self.take()?;
        let (file, buf, n) = blocking(move || {
            let n = file.read(&mut buf).map_err(|e| remote_io("SFTP read", e))?;
            Ok((file, buf, n))
        })
        .await?;
        self.0 = Some(file);
        Ok((buf, n))
    }

    async fn close(mut self) {
        if let Some(file) = self.0.take() {
            let _ = blocking(move || {
                drop(file);
                Ok(())
            })
            .await;
        }
    }
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        // Closing sends a request and waits for the answer.
        if let Some(file) = self.0.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn_blocking(move || drop(file));
            }
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────────────

fn entry_type_of(stat: &FileStat) -> EntryType {
    if stat.is_dir() {
        EntryType::Directory
    } else {
        EntryType::File
    }
}

fn mtime_of(stat: &FileStat) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(stat.mtime?).ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

fn entry_from_stat(name: String, stat: &FileStat) -> RemoteEntry {
    RemoteEntry {
        name,
        entry_type: entry_type_of(stat),
        size: stat.size.unwrap_or(0),
        modified_at: mtime_of(stat),
        permissions: stat.perm.map(format_permissions),
    }
}

fn stat_to_remote(path: &str, stat: &FileStat) -> RemoteStat {
    let mode = stat.perm.unwrap_or(0);
    RemoteStat {
        path: path.to_string(),
        entry_type: entry_type_of(stat),
        size: stat.size.unwrap_or(0),
        modified_at: mtime_of(stat),
        mode,
        permissions: format_permissions(mode),
    }
}

fn empty_stat() -> FileStat {
    FileStat {
        size: None,
        uid: None,
        gid: None,
        perm: None,
        atime: None,
        mtime: None,
    }
}

// ── RemoteSession ────────────────────────────────────────────────────────────

#[async_trait]
impl RemoteSession for SftpSession {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    async fn list_directory(&mut self, path: &str) -> TransferResult<Vec<RemoteEntry>> {
        let sftp = self.sftp.clone();
        let dir = if path.is_empty() { "." } else { path }.to_string();
        blocking(move || {
            let raw = sftp
                .readdir(Path::new(&dir))
                .map_err(|e| ssh_error(&format!("readdir '{}'", dir), e))?;
            Ok(raw
                .into_iter()
                .filter_map(|(p, stat)| {
                    let name = p.file_name()?.to_string_lossy().to_string();
                    if name == "." || name == ".." {
                        return None;
                    }
                    Some(entry_from_stat(name, &stat))
                })
                .collect())
        })
        .await
    }

    async fn upload(
        &mut self,
        local: &str,
        remote: &str,
        offset: u64,
        observer: &mut dyn ChunkObserver,
    ) -> TransferResult<TransferOutcome> {
        let mut source = fs::File::open(local)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        let meta = source
            .metadata()
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        let total = meta.len();
        let offset = if offset > total { 0 } else { offset };
        if offset > 0 {
            source
                .seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| TransferError::local_io(local, e))?;
        }
        observer.on_start(total, offset);

        let mut sink = self.open_remote(remote, true, offset).await?;
        debug!(local, remote, offset, total, "SFTP upload started");

        let stall = self.stall();
        let mut position = offset;
        let mut buf = Vec::new();
        loop {
            buf.resize(observer.chunk_size().max(1), 0);
            let n = timeout(stall, source.read(&mut buf))
                .await
                .map_err(|_| TransferError::io(format!("{}: no progress for {}s", local, stall.as_secs())))?
                .map_err(|e| TransferError::local_io(local, e))?;
            if n == 0 {
                break;
            }
            observer.throttle(n).await;
            buf = sink.write_chunk(buf, n).await?;
            position += n as u64;
            if observer.on_chunk(n) == ChunkControl::Halt {
                sink.close().await;
                return Ok(TransferOutcome::Halted(position));
            }
        }
        sink.close().await;

        if self.config.preserve_timestamps {
            match meta.modified() {
                Ok(t) => {
                    let secs = DateTime::<Utc>::from(t).timestamp().max(0) as u64;
                    let sftp = self.sftp.clone();
                    let path = remote.to_string();
                    let res = blocking(move || {
                        let stat = FileStat {
                            atime: Some(secs),
                            mtime: Some(secs),
                            ..empty_stat()
                        };
                        sftp.setstat(Path::new(&path), stat)
                            .map_err(|e| ssh_error(&format!("setstat '{}'", path), e))
                    })
                    .await;
                    if let Err(e) = res {
                        warn!(remote, error = %e, "Cannot preserve remote mtime");
                    }
                }
                Err(e) => warn!(local, error = %e, "Cannot read local mtime"),
            }
        }
        Ok(TransferOutcome::Finished(position))
    }

    async fn download(
        &mut self,
        remote: &str,
        local: &str,
        offset: u64,
        observer: &mut dyn ChunkObserver,
    ) -> TransferResult<TransferOutcome> {
        let stat = self.remote_stat(remote).await?;
        let total = stat.size.unwrap_or(0);
        let offset = if offset > total { 0 } else { offset };

        if offset == 0 {
            if let Some(parent) = Path::new(local).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TransferError::local_io(local, e))?;
            }
        }
        let mut sink = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(local)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        sink.set_len(offset)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        sink.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        observer.on_start(total, offset);

        let mut source = self.open_remote(remote, false, offset).await?;
        debug!(remote, local, offset, total, "SFTP download started");

        let stall = self.stall();
        let mut position = offset;
        let mut buf = Vec::new();
        loop {
            buf.resize(observer.chunk_size().max(1), 0);
            let (returned, n) = source.read_chunk(buf).await?;
            buf = returned;
            if n == 0 {
                break;
            }
            observer.throttle(n).await;
            timeout(stall, sink.write_all(&buf[..n]))
                .await
                .map_err(|_| TransferError::io(format!("{}: no progress for {}s", local, stall.as_secs())))?
                .map_err(|e| TransferError::local_io(local, e))?;
            position += n as u64;
            if observer.on_chunk(n) == ChunkControl::Halt {
                source.close().await;
                sink.flush().await.map_err(|e| TransferError::local_io(local, e))?;
                return Ok(TransferOutcome::Halted(position));
            }
        }
        source.close().await;
        sink.flush().await.map_err(|e| TransferError::local_io(local, e))?;
        drop(sink);

        if self.config.preserve_timestamps {
            if let Some(mtime) = stat.mtime.and_then(|m| i64::try_from(m).ok()) {
                if let Err(e) = filetime::set_file_mtime(local, FileTime::from_unix_time(mtime, 0)) {
                    warn!(local, error = %e, "Cannot preserve local mtime");
                }
            }
        }
        Ok(TransferOutcome::Finished(position))
    }

    async fn rename(&mut self, from: &str, to: &str) -> TransferResult<()> {
        let sftp = self.sftp.clone();
        let (from, to) = (from.to_string(), to.to_string());
        blocking(move || {
            sftp.rename(
                Path::new(&from),
                Path::new(&to),
                Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
            )
            .map_err(|e| ssh_error(&format!("rename '{}' -> '{}'", from, to), e))
        })
        .await
    }

    async fn delete(&mut self, path: &str) -> TransferResult<()> {
        let sftp = self.sftp.clone();
        let path = path.to_string();
        blocking(move || {
            let p = Path::new(&path);
            let is_dir = sftp.lstat(p).map(|s| s.is_dir()).unwrap_or(false);
            if is_dir {
                sftp.rmdir(p)
                    .map_err(|e| ssh_error(&format!("rmdir '{}'", path), e))
            } else {
                sftp.unlink(p)
                    .map_err(|e| ssh_error(&format!("delete '{}'", path), e))
            }
        })
        .await
    }

    async fn stat(&mut self, path: &str) -> TransferResult<RemoteStat> {
        let stat = self.remote_stat(path).await?;
        Ok(stat_to_remote(path, &stat))
    }

    async fn chmod(&mut self, path: &str, mode: u32) -> TransferResult<()> {
        let sftp = self.sftp.clone();
        let path = path.to_string();
        blocking(move || {
            let stat = FileStat {
                perm: Some(mode & 0o7777),
                ..empty_stat()
            };
            sftp.setstat(Path::new(&path), stat)
                .map_err(|e| ssh_error(&format!("chmod '{}'", path), e))
        })
        .await
    }

    async fn mkdir(&mut self, path: &str) -> TransferResult<()> {
        let sftp = self.sftp.clone();
        let path = path.to_string();
        blocking(move || {
            for prefix in path_prefixes(&path) {
                let p = Path::new(&prefix);
                if sftp.stat(p).map(|s| s.is_dir()).unwrap_or(false) {
                    continue;
                }
                if let Err(e) = sftp.mkdir(p, 0o755) {
                    // Lost a race with another creator: fine if it is a dir now.
                    if sftp.stat(p).map(|s| s.is_dir()).unwrap_or(false) {
                        continue;
                    }
                    return Err(ssh_error(
                        &format!("mkdir '{}' failed at '{}'", path, prefix),
                        e,
                    ));
                }
            }
            Ok(())
        })
        .await
    }

    async fn close(&mut self) -> TransferResult<()> {
        let session = self.session.clone();
        blocking(move || {
            session
                .disconnect(None, "closing", None)
                .map_err(|e| ssh_error("disconnect", e))
        })
        .await
    }
}
