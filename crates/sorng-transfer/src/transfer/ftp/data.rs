//! Passive data channels (RFC 959 PASV, RFC 2428 EPSV).
//!
//! The data socket is TLS-wrapped when the control channel negotiated
//! `PROT P`.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::ftp::codec::FtpCodec;
use crate::transfer::ftp::tls;
use regex::Regex;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

pub enum DataStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for DataStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            // Plenty of servers drop the data connection without
            // close_notify; the completion reply still vouches for the data.
            DataStream::Tls(s) => match Pin::new(s.as_mut()).poll_read(cx, buf) {
                Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Poll::Ready(Ok(())),
                other => other,
            },
        }
    }
}

impl AsyncWrite for DataStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_flush(cx),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Where the data connection goes and how it is secured.
pub struct DataChannel<'a> {
    pub host: &'a str,
    pub epsv: bool,
    pub tls: Option<&'a TlsConnector>,
    pub connect_timeout: Duration,
}

impl DataChannel<'_> {
    /// Negotiate a passive port and connect to it. EPSV is tried first when
    /// the server advertised it; a refusal falls back to PASV.
    pub async fn open(&self, codec: &mut FtpCodec) -> TransferResult<DataStream> {
        let addr = if self.epsv {
            let reply = codec.execute("EPSV").await?;
            if reply.is_success() {
                let port = parse_epsv(&reply.text())?;
                self.epsv_addr(codec, port)
            } else {
                debug!(code = reply.code, "EPSV refused, falling back to PASV");
                self.pasv(codec).await?
            }
        } else {
            self.pasv(codec).await?
        };

        let tcp = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransferError::transfer(format!("Data connection to {} timed out", addr)))?
            .map_err(|e| TransferError::transfer(format!("Data connection to {}: {}", addr, e)))?;
        tcp.set_nodelay(true).ok();

        match self.tls {
            Some(connector) => {
                let tls = tls::wrap(connector, self.host, tcp)
                    .await
                    .map_err(|e| TransferError::transfer(e.message))?;
                Ok(DataStream::Tls(Box::new(tls)))
            }
            None => Ok(DataStream::Plain(tcp)),
        }
    }

    async fn pasv(&self, codec: &mut FtpCodec) -> TransferResult<SocketAddr> {
        let reply = codec.expect_ok("PASV").await?;
        let announced = parse_pasv(&reply.text())?;
        // Servers behind NAT often announce an unusable address; the control
        // peer is always reachable.
        match self.peer_ip(codec) {
            Some(peer)
                if announced.ip().is_unspecified()
                    || (is_private(&announced.ip()) && !is_private(&peer)) =>
            {
                Ok(SocketAddr::new(peer, announced.port()))
            }
            _ => Ok(announced),
        }
    }

    fn epsv_addr(&self, codec: &FtpCodec, port: u16) -> SocketAddr {
        let ip = self
            .peer_ip(codec)
            .unwrap_or(IpAddr::from([127, 0, 0, 1]));
        SocketAddr::new(ip, port)
    }

    fn peer_ip(&self, codec: &FtpCodec) -> Option<IpAddr> {
        codec.peer_addr().map(|a| a.ip())
    }
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
pub fn parse_pasv(text: &str) -> TransferResult<SocketAddr> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").ok())
        .as_ref()
        .ok_or_else(|| TransferError::transfer("PASV pattern unavailable"))?;
    let caps = re
        .captures(text)
        .ok_or_else(|| TransferError::transfer(format!("Cannot parse PASV reply: {}", text)))?;

    let mut nums = [0u8; 6];
    for (i, n) in nums.iter_mut().enumerate() {
        *n = caps[i + 1]
            .parse::<u8>()
            .map_err(|_| TransferError::transfer(format!("PASV value out of range: {}", text)))?;
    }
    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddr::new(ip, port))
}

/// `229 Entering Extended Passive Mode (|||port|)`
pub fn parse_epsv(text: &str) -> TransferResult<u16> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"\(([!-~])([!-~])([!-~])(\d+)([!-~])\)").ok())
        .as_ref()
        .ok_or_else(|| TransferError::transfer("EPSV pattern unavailable"))?;
    let caps = re
        .captures(text)
        .filter(|c| c[1] == c[2] && c[2] == c[3] && c[3] == c[5])
        .ok_or_else(|| TransferError::transfer(format!("Cannot parse EPSV reply: {}", text)))?;
    caps[4]
        .parse::<u16>()
        .map_err(|_| TransferError::transfer(format!("EPSV port out of range: {}", text)))
}
