//! Error types
//!
//! Only setup paths (binding sockets, opening devices, reading lease
//! tables) return errors. The data path (traffic upserts, frame delivery)
//! is infallible from the caller's point of view; failures there are
//! logged and counted instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::server::ConnectionKey;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying socket or file error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed after a transport failure
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionKey),

    /// A lease table could not be read
    #[error("Failed to read lease table {path}: {source}")]
    LeaseFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
