//! FTP control-channel codec (RFC 959 §4).
//!
//! Sends CRLF-terminated commands and reads single- or multi-line replies
//! over a plain or TLS-wrapped TCP stream. Every reply read is bounded by the
//! codec's reply timeout.

use crate::transfer::error::{TransferError, TransferResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::trace;

/// One server reply: 3-digit code plus every line of text.
#[derive(Debug, Clone)]
pub struct FtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpReply {
    /// All lines joined; the form used in error messages.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Text of the final line after the code.
    pub fn message(&self) -> &str {
        self.lines
            .last()
            .map(|l| l.get(4..).unwrap_or("").trim())
            .unwrap_or("")
    }

    pub fn is_preliminary(&self) -> bool {
        self.code / 100 == 1
    }

    pub fn is_success(&self) -> bool {
        self.code / 100 == 2
    }

    pub fn is_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    pub fn into_error(self) -> TransferError {
        TransferError::from_reply(self.code, &self.text())
    }
}

pub enum ReadHalf {
    Plain(BufReader<OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

pub enum WriteHalf {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

pub struct FtpCodec {
    pub reader: ReadHalf,
    pub writer: WriteHalf,
    peer: Option<SocketAddr>,
    reply_timeout: Duration,
}

impl FtpCodec {
    pub fn from_tcp(stream: TcpStream, reply_timeout: Duration) -> Self {
        let peer = stream.peer_addr().ok();
        let (rd, wr) = stream.into_split();
        Self {
            reader: ReadHalf::Plain(BufReader::new(rd)),
            writer: WriteHalf::Plain(wr),
            peer,
            reply_timeout,
        }
    }

    pub fn from_tls(stream: TlsStream<TcpStream>, reply_timeout: Duration) -> Self {
        let peer = stream.get_ref().0.peer_addr().ok();
        let (rd, wr) = tokio::io::split(stream);
        Self {
            reader: ReadHalf::Tls(BufReader::new(rd)),
            writer: WriteHalf::Tls(wr),
            peer,
            reply_timeout,
        }
    }

    /// Address of the server end of the control connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.writer, WriteHalf::Tls(_))
    }

    pub async fn send_command(&mut self, cmd: &str) -> TransferResult<()> {
        let line = format!("{}\r\n", cmd);
        let res = match &mut self.writer {
            WriteHalf::Plain(w) => w.write_all(line.as_bytes()).await,
            WriteHalf::Tls(w) => w.write_all(line.as_bytes()).await,
        };
        res.map_err(|e| TransferError::connection(format!("Control channel write: {}", e)))?;
        if cmd.starts_with("PASS ") {
            trace!(">>> PASS ****");
        } else {
            trace!(">>> {}", cmd);
        }
        Ok(())
    }

    async fn read_line_raw(&mut self) -> TransferResult<String> {
        let mut buf = String::new();
        let limit = self.reply_timeout;
        let reader = &mut self.reader;
        let read = async {
            match reader {
                ReadHalf::Plain(r) => r.read_line(&mut buf).await,
                ReadHalf::Tls(r) => r.read_line(&mut buf).await,
            }
        };
        let n = tokio::time::timeout(limit, read)
            .await
            .map_err(|_| {
                TransferError::connection(format!(
                    "No reply from server within {}s",
                    limit.as_secs()
                ))
            })?
            .map_err(|e| TransferError::connection(format!("Control channel read: {}", e)))?;
        if n == 0 {
            return Err(TransferError::connection("Server closed the control connection"));
        }
        Ok(buf)
    }

    /// Read a complete reply. Multi-line replies open with `NNN-` and run
    /// until a line starting with `NNN `.
    pub async fn read_reply(&mut self) -> TransferResult<FtpReply> {
        let first = self.read_line_raw().await?;
        let first = first.trim_end_matches(['\r', '\n']).to_string();
        let code = parse_code(&first)?;

        let mut lines = vec![first];
        if lines[0].as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next = next.trim_end_matches(['\r', '\n']).to_string();
                let done = next.starts_with(&terminator);
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let reply = FtpReply { code, lines };
        trace!("<<< {} {}", reply.code, reply.message());
        Ok(reply)
    }

    pub async fn execute(&mut self, cmd: &str) -> TransferResult<FtpReply> {
        self.send_command(cmd).await?;
        self.read_reply().await
    }

    /// Send a command and require a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> TransferResult<FtpReply> {
        let reply = self.execute(cmd).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(reply)
    }
}

fn parse_code(line: &str) -> TransferResult<u16> {
    line.get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (100..600).contains(c))
        .ok_or_else(|| TransferError::connection(format!("Malformed FTP reply: '{}'", line)))
}
