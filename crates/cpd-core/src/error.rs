//! Error types for CPD.
//!
//! This module provides a unified error type for all CPD operations,
//! with specific error variants for different failure modes.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A specialized `Result` type for CPD operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for CPD.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable network address could be determined at session start
    #[error("no network connection detected")]
    NoNetwork,

    /// File not found at send start
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Path exists but is not a readable regular file
    #[error("not a regular file: {0}")]
    NotAFile(String),

    /// No free local port could be allocated
    #[error("port allocation failed: {0}")]
    PortAllocationFailed(String),

    /// Receiver could not reach the sender
    #[error("failed to connect to {0}")]
    ConnectFailed(SocketAddr),

    /// Connection lost mid-session
    #[error("connection lost during transfer to {0}")]
    ConnectionLost(SocketAddr),

    /// Invalid protocol frame or message sequence
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Streamed byte count disagrees with the declared file size
    #[error("size mismatch: metadata declared {expected} bytes, received {actual}")]
    SizeMismatch {
        /// Size declared in the metadata message
        expected: u64,
        /// Bytes actually received
        actual: u64,
    },

    /// Whole-file checksum verification failed
    #[error("checksum mismatch for '{file}'")]
    ChecksumMismatch {
        /// The file being transferred
        file: String,
    },

    /// Sharing key was rejected
    #[error("invalid sharing key: {0}")]
    InvalidKey(String),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns whether this error is fatal to the whole process.
    ///
    /// On the sender, a lost connection only takes down one peer handler;
    /// everything else aborts the affected invocation.
    #[must_use]
    pub const fn is_fatal_to_session(&self) -> bool {
        !matches!(self, Self::ConnectionLost(_))
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConnectFailed(_) | Self::Timeout(_) | Self::ConnectionLost(_) => Some(
                "1. Make sure both devices are on the same network\n\
                 2. Try another IP address if multiple were provided\n\
                 3. Check if firewalls are blocking the connection",
            ),
            Self::NoNetwork => {
                Some("Connect to a Wi-Fi or wired network before starting a share.")
            }
            Self::InvalidKey(_) => {
                Some("Ask the recipient to run 'cpd key' and share the printed key with you.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failed_has_suggestion() {
        let addr: SocketAddr = "192.168.1.50:4000".parse().unwrap();
        let err = Error::ConnectFailed(addr);
        assert!(err.suggestion().unwrap().contains("same network"));
    }

    #[test]
    fn test_connection_lost_not_fatal_to_session() {
        let addr: SocketAddr = "192.168.1.50:4000".parse().unwrap();
        assert!(!Error::ConnectionLost(addr).is_fatal_to_session());
        assert!(Error::NoNetwork.is_fatal_to_session());
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = Error::SizeMismatch {
            expected: 100,
            actual: 90,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("90"));
    }
}
