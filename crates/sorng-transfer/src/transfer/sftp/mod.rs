//! SFTP sessions over `ssh2`.
//!
//! Implements the full capability set: listing, chunked upload/download with
//! resume offsets, rename, delete, stat, chmod and recursive mkdir.

pub mod session;

pub use session::SftpSession;
