//! TLS for explicit and implicit FTPS (RFC 4217).
//!
//! One connector is built per session and reused for the control channel
//! and every data channel, so servers that demand TLS session reuse on the
//! data connection accept us.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::ftp::codec::{FtpCodec, ReadHalf, WriteHalf};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::warn;

pub fn build_connector(accept_invalid_certs: bool) -> TransferResult<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    if accept_invalid_certs {
        warn!("FTPS certificate verification disabled");
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertVerifier));
    }

    Ok(TlsConnector::from(Arc::new(config)))
}

fn server_name(host: &str) -> TransferResult<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| TransferError::connection(format!("Invalid TLS server name '{}': {}", host, e)))
}

pub async fn wrap(
    connector: &TlsConnector,
    host: &str,
    tcp: TcpStream,
) -> TransferResult<TlsStream<TcpStream>> {
    connector
        .connect(server_name(host)?, tcp)
        .await
        .map_err(|e| TransferError::connection(format!("TLS handshake with {}: {}", host, e)))
}

/// Replace a plain control connection by a TLS one after `234`.
pub async fn upgrade(
    codec: FtpCodec,
    connector: &TlsConnector,
    host: &str,
) -> TransferResult<FtpCodec> {
    let timeout = codec.reply_timeout();
    let tcp = reunite_plain(codec)?;
    let tls = wrap(connector, host, tcp).await?;
    Ok(FtpCodec::from_tls(tls, timeout))
}

fn reunite_plain(codec: FtpCodec) -> TransferResult<TcpStream> {
    let already = || TransferError::connection("Control connection is already TLS");
    let rd = match codec.reader {
        ReadHalf::Plain(br) => br.into_inner(),
        ReadHalf::Tls(_) => return Err(already()),
    };
    let wr = match codec.writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => return Err(already()),
    };
    rd.reunite(wr)
        .map_err(|e| TransferError::connection(format!("Cannot reunite control stream: {}", e)))
}

// ─── NoCertVerifier (for self-signed certs) ─────────────────────────

#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectors_build_in_both_modes() {
        assert!(build_connector(false).is_ok());
        assert!(build_connector(true).is_ok());
    }

    #[test]
    fn ip_hosts_are_valid_server_names() {
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("ftp.example.com").is_ok());
        assert!(server_name("not a host").is_err());
    }
}
