//! FTP and FTPS sessions.
//!
//! - **RFC 959** command/response codec with multi-line replies
//! - **RFC 4217** explicit (`AUTH TLS`) and implicit FTPS, `PROT P` data
//! - **RFC 2428** EPSV, with PASV fallback
//! - **RFC 3659** MLSD, SIZE, MDTM, REST STREAM; MFMT where advertised
//!
//! Architecture:
//! - `codec`: control channel
//! - `tls`: rustls connector and control-channel upgrade
//! - `data`: passive data channels
//! - `parser`: MLSD / Unix / Windows listing lines
//! - `session`: [`FtpSession`], the `RemoteSession` implementation

pub mod codec;
pub mod data;
pub mod parser;
pub mod session;
pub mod tls;

#[cfg(test)]
pub(crate) mod testserver;

pub use session::{FtpSession, ServerFeatures};
