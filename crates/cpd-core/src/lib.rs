//! # CPD Core Library
//!
//! `cpd-core` provides the core functionality for CPD, a cross-platform
//! command-line file sharing tool for local networks.
//!
//! One machine exposes a single file (`cpd send`); another fetches it
//! (`cpd receive`) using only an address and port exchanged out of band.
//! There is no central server and no pairing step.
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`mod@file`] - File descriptors, chunking, and naming
//! - [`keys`] - Per-user sharing key store
//! - [`net`] - Local address enumeration and ranking
//! - [`protocol`] - CPDP wire protocol implementation
//! - [`qr`] - QR code generation for the browser download link
//! - [`transfer`] - Transfer session engine (sender and receiver)
//! - [`web`] - Informational HTTP listener (landing page + download)
//!
//! ## Example
//!
//! ```rust,ignore
//! use cpd_core::transfer::{ShareSession, TransferConfig};
//!
//! // Sender side
//! let session = ShareSession::new("document.pdf", TransferConfig::default()).await?;
//! println!("control port: {}", session.control_port());
//! session.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod file;
pub mod keys;
pub mod net;
pub mod protocol;
pub mod qr;
pub mod transfer;
pub mod web;

pub use error::{Error, Result};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for CPDP
pub const PROTOCOL_VERSION: (u8, u8) = (1, 0);

/// Default chunk size for file transfers (1 MB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Interval between keep-alive pings on an idle control connection
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long the receiver waits for the initial connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between sending metadata and the first file chunk,
/// giving the metadata frame time to flush on slow links
pub const PRE_SEND_DELAY: Duration = Duration::from_millis(500);
