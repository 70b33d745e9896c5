//! Transfer session engine for CPD.
//!
//! This module holds both halves of a transfer:
//!
//! - [`ShareSession`] - the sender: binds the control and info listeners,
//!   accepts any number of receivers, and spawns one [`PeerHandler`] per
//!   connection.
//! - [`ReceiveSession`] - the receiver: connects to one sender, drives the
//!   ready/metadata/chunk/ack exchange to completion, and exits.
//!
//! ## Exchange
//!
//! ```text
//! receiver                               sender
//!    │ ─── ready {clientName} ─────────────▶ │
//!    │ ◀── metadata {fileName, fileSize,     │
//!    │       chunkSize, totalChunks,         │
//!    │       checksum} ─────────────────────  │
//!    │ ◀── file chunks (binary frames) ────  │
//!    │ ─── received {savePath} ────────────▶ │
//!    │ ◀──── ping ····· pong ──────────────▶ │  (any time, 30 s interval)
//! ```
//!
//! Peer handlers run independently; a failure on one connection never
//! affects another or the accept loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use xxhash_rust::xxh64::Xxh64;

use crate::config::TransferSettings;
use crate::error::{Error, Result};
use crate::file::{unique_target_path, SharedFile};
use crate::net::{self, RankedAddress};
use crate::protocol::{self, ChunkPayload, FrameKind, Message};
use crate::web;

/// Configuration for a transfer session.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Chunk size in bytes
    pub chunk_size: usize,
    /// Interval between keep-alive pings
    pub keep_alive_interval: Duration,
    /// Receiver connect timeout
    pub connect_timeout: Duration,
    /// Delay between metadata and the first chunk
    pub pre_send_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            keep_alive_interval: crate::KEEP_ALIVE_INTERVAL,
            connect_timeout: crate::CONNECT_TIMEOUT,
            pre_send_delay: crate::PRE_SEND_DELAY,
        }
    }
}

impl From<&TransferSettings> for TransferConfig {
    fn from(settings: &TransferSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            keep_alive_interval: Duration::from_secs(settings.keep_alive_secs),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            pre_send_delay: crate::PRE_SEND_DELAY,
        }
    }
}

/// Per-peer exchange phase.
///
/// One value per connected receiver, owned exclusively by its handler.
/// `Idle` flows back into a new exchange when the peer sends `ready`
/// again on the same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    /// Waiting for the peer to announce itself
    AwaitingReady,
    /// Metadata sent, about to stream
    SentMetadata,
    /// Streaming file chunks
    Sending,
    /// Stream finished, waiting for the receipt acknowledgment
    AwaitingAck,
    /// Exchange complete; a new `ready` starts another
    Idle,
}

/// Events a share session reports to the operator.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A receiver connected to the control channel.
    Connected {
        /// Peer socket address
        peer: SocketAddr,
    },
    /// A receiver announced itself and the stream started.
    TransferStarted {
        /// Peer socket address
        peer: SocketAddr,
        /// Label the receiver identified itself with
        label: String,
    },
    /// A receiver confirmed the file was persisted.
    TransferComplete {
        /// Peer socket address
        peer: SocketAddr,
        /// Label the receiver identified itself with
        label: String,
        /// Save path the receiver reported
        save_path: String,
    },
    /// A control connection ended (cleanly or not).
    Disconnected {
        /// Peer socket address
        peer: SocketAddr,
    },
}

/// A share session (sender side).
///
/// Owns the shared file descriptor and both listeners. [`Self::run`]
/// serves them until the process is externally terminated; a share has no
/// shutdown condition of its own.
pub struct ShareSession {
    file: Arc<SharedFile>,
    config: TransferConfig,
    control_listener: TcpListener,
    info_listener: TcpListener,
    control_port: u16,
    info_port: u16,
    addresses: Vec<RankedAddress>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<PeerEvent>>,
}

impl std::fmt::Debug for ShareSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareSession")
            .field("file", &self.file)
            .field("control_port", &self.control_port)
            .field("info_port", &self.info_port)
            .finish_non_exhaustive()
    }
}

impl ShareSession {
    /// Create a new share session for the file at `path`.
    ///
    /// Captures the file descriptor, allocates the control port and an
    /// info port (preferring `control + 1`), and ranks the local
    /// addresses to advertise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the path does not resolve to a
    /// readable regular file, [`Error::PortAllocationFailed`] if no local
    /// port is free, and [`Error::NoNetwork`] if no address can be
    /// advertised.
    pub async fn new(path: impl Into<PathBuf>, config: TransferConfig) -> Result<Self> {
        let file = Arc::new(SharedFile::from_path(path)?);

        let control_listener = TcpListener::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::PortAllocationFailed(e.to_string()))?;
        let control_port = control_listener
            .local_addr()
            .map_err(|e| Error::PortAllocationFailed(e.to_string()))?
            .port();

        // The info port sits next to the control port when possible, so
        // the two advertised numbers are easy to tell apart by eye.
        let info_listener = match TcpListener::bind(("0.0.0.0", control_port.wrapping_add(1))).await
        {
            Ok(listener) => listener,
            Err(_) => TcpListener::bind("0.0.0.0:0")
                .await
                .map_err(|e| Error::PortAllocationFailed(e.to_string()))?,
        };
        let info_port = info_listener
            .local_addr()
            .map_err(|e| Error::PortAllocationFailed(e.to_string()))?
            .port();

        let addresses = net::advertised_addresses()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            file,
            config,
            control_listener,
            info_listener,
            control_port,
            info_port,
            addresses,
            events_tx,
            events_rx: Some(events_rx),
        })
    }

    /// The shared file descriptor.
    #[must_use]
    pub fn file(&self) -> &SharedFile {
        &self.file
    }

    /// Port of the control channel receivers connect to.
    #[must_use]
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    /// Port of the informational HTTP listener.
    #[must_use]
    pub fn info_port(&self) -> u16 {
        self.info_port
    }

    /// Ranked candidate addresses, best guess first.
    #[must_use]
    pub fn addresses(&self) -> &[RankedAddress] {
        &self.addresses
    }

    /// The primary (most-preferred) advertised address.
    #[must_use]
    pub fn primary_address(&self) -> std::net::Ipv4Addr {
        self.addresses[0].address
    }

    /// Take the peer event receiver. Yields `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.events_rx.take()
    }

    /// Serve the session: info listener plus control accept loop.
    ///
    /// Each accepted control connection gets an independently spawned
    /// [`PeerHandler`]; handling one peer never blocks acceptance of or
    /// service to another. This future only resolves on listener failure;
    /// the operator stops a share by terminating the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop itself fails.
    pub async fn run(self) -> Result<()> {
        let info_state = web::InfoState {
            file: Arc::clone(&self.file),
            address: self.primary_address(),
            control_port: self.control_port,
        };
        let info_listener = self.info_listener;
        tokio::spawn(async move {
            if let Err(e) = web::serve(info_listener, info_state).await {
                tracing::warn!("info listener stopped: {e}");
            }
        });

        loop {
            let (stream, peer) = self.control_listener.accept().await?;
            tracing::info!("connection from {peer}");
            let _ = self.events_tx.send(PeerEvent::Connected { peer });

            let handler = PeerHandler::new(
                Arc::clone(&self.file),
                self.config.clone(),
                peer,
                self.events_tx.clone(),
            );
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.run(stream).await {
                    tracing::warn!("peer {peer}: {e}");
                }
                let _ = events.send(PeerEvent::Disconnected { peer });
            });
        }
    }
}

/// Sender-side state machine for one connected receiver.
///
/// Holds the per-peer session state explicitly (phase, label, byte count)
/// instead of capturing it in connection callbacks. Handlers for the same
/// file share nothing mutable; the descriptor behind the `Arc` is
/// read-only and each handler opens its own file cursor.
pub struct PeerHandler {
    file: Arc<SharedFile>,
    config: TransferConfig,
    peer: SocketAddr,
    label: Option<String>,
    phase: PeerPhase,
    bytes_sent: u64,
    started_at: Option<Instant>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerHandler {
    fn new(
        file: Arc<SharedFile>,
        config: TransferConfig,
        peer: SocketAddr,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            file,
            config,
            peer,
            label: None,
            phase: PeerPhase::AwaitingReady,
            bytes_sent: 0,
            started_at: None,
            events,
        }
    }

    /// Drive the exchange until the connection ends.
    ///
    /// The keep-alive ping runs as a task scoped to this call: it stops
    /// itself when the connection dies and is aborted on every other exit
    /// path, so no timer outlives its connection.
    async fn run<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(writer));

        let keep_alive = tokio::spawn(Self::keep_alive_loop(
            Arc::clone(&writer),
            self.config.keep_alive_interval,
        ));

        let result = self.drive(&mut reader, &writer).await;
        keep_alive.abort();
        result
    }

    async fn keep_alive_loop<S>(writer: Arc<Mutex<WriteHalf<S>>>, interval: Duration)
    where
        S: AsyncWrite + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            let mut writer = writer.lock().await;
            if protocol::write_message(&mut *writer, &Message::Ping)
                .await
                .is_err()
            {
                break;
            }
            tracing::trace!("keep-alive ping sent");
        }
    }

    async fn drive<R, S>(&mut self, reader: &mut R, writer: &Arc<Mutex<WriteHalf<S>>>) -> Result<()>
    where
        R: tokio::io::AsyncReadExt + Unpin,
        S: AsyncWrite + Send,
    {
        loop {
            let (header, payload) = match protocol::read_frame(reader).await {
                Ok(frame) => frame,
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::info!("peer {} closed the connection", self.peer);
                    return Ok(());
                }
                Err(Error::Io(_)) => return Err(Error::ConnectionLost(self.peer)),
                Err(e) => return Err(e),
            };

            match header.kind {
                FrameKind::Text => {
                    let Some(message) = protocol::decode_message(&payload) else {
                        tracing::debug!("ignoring unrecognized text frame from {}", self.peer);
                        continue;
                    };
                    self.handle_message(message, writer).await?;
                }
                FrameKind::FileChunk => {
                    tracing::debug!("ignoring unexpected file chunk from {}", self.peer);
                }
            }
        }
    }

    async fn handle_message<S>(
        &mut self,
        message: Message,
        writer: &Arc<Mutex<WriteHalf<S>>>,
    ) -> Result<()>
    where
        S: AsyncWrite + Send,
    {
        match message {
            Message::Ready { client_name } => match self.phase {
                PeerPhase::AwaitingReady | PeerPhase::Idle => {
                    self.label = Some(client_name);
                    self.send_file(writer).await?;
                }
                _ => {
                    tracing::debug!(
                        "peer {} sent ready in phase {:?}, ignoring",
                        self.peer,
                        self.phase
                    );
                }
            },
            Message::Received {
                client_name,
                save_path,
            } => {
                if self.phase == PeerPhase::AwaitingAck {
                    let label = if client_name.is_empty() {
                        self.label.clone().unwrap_or_default()
                    } else {
                        client_name
                    };
                    tracing::info!("file sent successfully to {label} ({save_path})");
                    let _ = self.events.send(PeerEvent::TransferComplete {
                        peer: self.peer,
                        label,
                        save_path,
                    });
                    self.phase = PeerPhase::Idle;
                } else {
                    tracing::debug!(
                        "peer {} acknowledged in phase {:?}, ignoring",
                        self.peer,
                        self.phase
                    );
                }
            }
            Message::Pong => {
                tracing::trace!("pong from {}", self.peer);
            }
            Message::Ping | Message::Metadata { .. } => {
                tracing::debug!("unexpected {message:?} from {}", self.peer);
            }
        }
        Ok(())
    }

    /// Send metadata and stream the file, moving through
    /// `SentMetadata → Sending → AwaitingAck`.
    async fn send_file<S>(&mut self, writer: &Arc<Mutex<WriteHalf<S>>>) -> Result<()>
    where
        S: AsyncWrite + Send,
    {
        let label = self.label.clone().unwrap_or_default();
        tracing::info!("sending {} to {label}", self.file.display_name);

        let checksum = self.file.checksum(self.config.chunk_size).await?;

        #[allow(clippy::cast_possible_truncation)]
        let metadata = Message::Metadata {
            file_name: self.file.display_name.clone(),
            file_size: self.file.size,
            chunk_size: self.config.chunk_size as u32,
            total_chunks: self.file.chunk_count(self.config.chunk_size),
            checksum,
        };

        {
            let mut writer = writer.lock().await;
            protocol::write_message(&mut *writer, &metadata).await?;
        }
        self.phase = PeerPhase::SentMetadata;
        self.started_at = Some(Instant::now());
        let _ = self.events.send(PeerEvent::TransferStarted {
            peer: self.peer,
            label,
        });

        // Let the metadata frame flush before the stream starts.
        tokio::time::sleep(self.config.pre_send_delay).await;

        self.phase = PeerPhase::Sending;
        self.bytes_sent = 0;
        let mut chunks = self.file.open_chunked(self.config.chunk_size).await?;

        while let Some((sequence, last, data)) = chunks.next_chunk().await? {
            self.bytes_sent += data.len() as u64;
            let chunk = ChunkPayload {
                sequence,
                last,
                data,
            };
            // Lock per chunk so keep-alive pings can interleave.
            let mut writer = writer.lock().await;
            protocol::write_frame(&mut *writer, FrameKind::FileChunk, &chunk.encode()).await?;
        }

        self.phase = PeerPhase::AwaitingAck;
        Ok(())
    }
}

/// Receive-side exchange phase, published over the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Connected, `ready` sent, waiting for metadata
    AwaitingMetadata,
    /// Streaming chunks to disk
    Receiving,
    /// File persisted and acknowledged
    Completed,
}

/// Progress information for a receive session.
#[derive(Debug, Clone)]
pub struct ReceiveProgress {
    /// Current state
    pub state: ReceiveState,
    /// Size declared in metadata (0 until metadata arrives)
    pub expected_size: u64,
    /// Bytes written so far
    pub bytes_received: u64,
}

impl ReceiveProgress {
    /// Overall progress as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.expected_size == 0 {
            0.0
        } else {
            (self.bytes_received as f64 / self.expected_size as f64) * 100.0
        }
    }
}

/// A receive session (receiver side).
///
/// Drives exactly one connection to completion, then the process exits.
pub struct ReceiveSession {
    stream: TcpStream,
    server: SocketAddr,
    file_name: String,
    output_dir: PathBuf,
    config: TransferConfig,
    client_name: String,
    progress_tx: watch::Sender<ReceiveProgress>,
    progress_rx: watch::Receiver<ReceiveProgress>,
}

impl std::fmt::Debug for ReceiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveSession")
            .field("server", &self.server)
            .field("file_name", &self.file_name)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ReceiveSession {
    /// Connect to a sender's control channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no connection is established within
    /// the configured timeout and [`Error::ConnectFailed`] if the
    /// connection attempt itself fails.
    pub async fn connect(
        server: SocketAddr,
        file_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        config: TransferConfig,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(server))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout.as_secs()))?
            .map_err(|_| Error::ConnectFailed(server))?;

        let client_name = hostname::get().map_or_else(
            |_| "unknown-client".to_string(),
            |h| h.to_string_lossy().to_string(),
        );

        let progress = ReceiveProgress {
            state: ReceiveState::AwaitingMetadata,
            expected_size: 0,
            bytes_received: 0,
        };
        let (progress_tx, progress_rx) = watch::channel(progress);

        Ok(Self {
            stream,
            server,
            file_name: file_name.into(),
            output_dir: output_dir.into(),
            config,
            client_name,
            progress_tx,
            progress_rx,
        })
    }

    /// Get a progress receiver for display purposes.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<ReceiveProgress> {
        self.progress_rx.clone()
    }

    /// The label this client announces itself with.
    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Perform the exchange and persist the file.
    ///
    /// Resolves a collision-free target path, sends `ready`, answers
    /// pings, streams chunks to disk as they arrive, reconciles the byte
    /// count and checksum against the metadata, acknowledges with
    /// `received`, and returns the saved path.
    ///
    /// # Errors
    ///
    /// Any transport or verification failure is fatal to the invocation.
    pub async fn receive(mut self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let target = unique_target_path(&self.output_dir, &self.file_name)?;

        protocol::write_message(
            &mut self.stream,
            &Message::Ready {
                client_name: self.client_name.clone(),
            },
        )
        .await?;

        let result = self.exchange(&target).await;
        if result.is_err() {
            // Never leave a partial or unverified file behind.
            let _ = tokio::fs::remove_file(&target).await;
        }
        result?;

        protocol::write_message(
            &mut self.stream,
            &Message::Received {
                client_name: self.client_name.clone(),
                save_path: target.display().to_string(),
            },
        )
        .await?;

        // Give the acknowledgment time to flush before the socket drops.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = self.stream.shutdown().await;

        Ok(target)
    }

    async fn exchange(&mut self, target: &std::path::Path) -> Result<()> {
        let mut incoming: Option<IncomingFile> = None;

        loop {
            let (header, payload) = match protocol::read_frame(&mut self.stream).await {
                Ok(frame) => frame,
                Err(Error::Io(_)) => return Err(Error::ConnectionLost(self.server)),
                Err(e) => return Err(e),
            };

            match header.kind {
                FrameKind::Text => match protocol::decode_message(&payload) {
                    Some(Message::Metadata {
                        file_name,
                        file_size,
                        checksum,
                        ..
                    }) => {
                        tracing::info!(
                            "receiving {file_name} ({})",
                            crate::file::format_size(file_size)
                        );
                        let file = tokio::fs::File::create(target).await?;
                        incoming = Some(IncomingFile {
                            writer: BufWriter::new(file),
                            expected_size: file_size,
                            expected_checksum: checksum,
                            hasher: Xxh64::new(0),
                            bytes_received: 0,
                            next_sequence: 0,
                            started_at: Instant::now(),
                        });
                        self.progress_tx.send_modify(|p| {
                            p.state = ReceiveState::Receiving;
                            p.expected_size = file_size;
                        });
                    }
                    Some(Message::Ping) => {
                        protocol::write_message(&mut self.stream, &Message::Pong).await?;
                    }
                    Some(other) => {
                        tracing::debug!("unexpected {other:?} from sender");
                    }
                    None => {
                        tracing::debug!("ignoring unrecognized text frame from sender");
                    }
                },
                FrameKind::FileChunk => {
                    let Some(file) = incoming.as_mut() else {
                        return Err(Error::ProtocolError(
                            "file chunk before metadata".to_string(),
                        ));
                    };

                    let chunk = ChunkPayload::decode(&payload)?;
                    if chunk.sequence != file.next_sequence {
                        return Err(Error::ProtocolError(format!(
                            "chunk {} out of order, expected {}",
                            chunk.sequence, file.next_sequence
                        )));
                    }
                    file.next_sequence += 1;

                    file.hasher.update(&chunk.data);
                    file.bytes_received += chunk.data.len() as u64;
                    file.writer.write_all(&chunk.data).await?;

                    let bytes = file.bytes_received;
                    self.progress_tx.send_modify(|p| p.bytes_received = bytes);

                    if chunk.last {
                        file.writer.flush().await?;

                        if file.bytes_received != file.expected_size {
                            return Err(Error::SizeMismatch {
                                expected: file.expected_size,
                                actual: file.bytes_received,
                            });
                        }
                        if file.hasher.digest() != file.expected_checksum {
                            return Err(Error::ChecksumMismatch {
                                file: self.file_name.clone(),
                            });
                        }

                        let elapsed = file.started_at.elapsed();
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let throughput = if elapsed.as_secs_f64() > 0.0 {
                            (file.bytes_received as f64 / elapsed.as_secs_f64()) as u64
                        } else {
                            0
                        };
                        tracing::info!(
                            "received {} in {:.1}s ({}/s)",
                            crate::file::format_size(file.bytes_received),
                            elapsed.as_secs_f64(),
                            crate::file::format_size(throughput),
                        );

                        self.progress_tx
                            .send_modify(|p| p.state = ReceiveState::Completed);
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// In-flight file state on the receiving side.
struct IncomingFile {
    writer: BufWriter<tokio::fs::File>,
    expected_size: u64,
    expected_checksum: u64,
    hasher: Xxh64,
    bytes_received: u64,
    next_sequence: u64,
    started_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn test_file(dir: &std::path::Path, content: &[u8]) -> Arc<SharedFile> {
        let path = dir.join("payload.bin");
        std::fs::write(&path, content).unwrap();
        Arc::new(SharedFile::from_path(path).unwrap())
    }

    fn test_config() -> TransferConfig {
        TransferConfig {
            chunk_size: 1024,
            keep_alive_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(1),
            pre_send_delay: Duration::from_millis(10),
        }
    }

    fn spawn_handler(
        file: Arc<SharedFile>,
    ) -> (
        tokio::io::DuplexStream,
        mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let handler = PeerHandler::new(file, test_config(), peer, events_tx);
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(handler.run(server));
        (client, events_rx)
    }

    async fn read_text_message(client: &mut tokio::io::DuplexStream) -> Message {
        loop {
            let (header, payload) = protocol::read_frame(client).await.unwrap();
            if header.kind == FrameKind::Text {
                if let Some(message) = protocol::decode_message(&payload) {
                    return message;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_handler_silent_until_ready() {
        let dir = tempfile::tempdir().unwrap();
        let file = test_file(dir.path(), b"secret content");
        let (mut client, _events) = spawn_handler(file);

        // No ready sent: the handler must stay in AwaitingReady and emit
        // nothing (the 30s keep-alive is far beyond this window).
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(300), client.read(&mut buf)).await;
        assert!(read.is_err(), "handler sent data before ready");
    }

    #[tokio::test]
    async fn test_handler_streams_after_ready() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![0xABu8; 3000]; // three chunks at 1024
        let file = test_file(dir.path(), &content);
        let (mut client, _events) = spawn_handler(file);

        protocol::write_message(
            &mut client,
            &Message::Ready {
                client_name: "test-peer".to_string(),
            },
        )
        .await
        .unwrap();

        let metadata = read_text_message(&mut client).await;
        let Message::Metadata {
            file_size,
            total_chunks,
            ..
        } = metadata
        else {
            panic!("expected metadata, got {metadata:?}");
        };
        assert_eq!(file_size, 3000);
        assert_eq!(total_chunks, 3);

        let mut collected = Vec::new();
        loop {
            let (header, payload) = protocol::read_frame(&mut client).await.unwrap();
            if header.kind != FrameKind::FileChunk {
                continue; // interleaved ping
            }
            let chunk = ChunkPayload::decode(&payload).unwrap();
            collected.extend_from_slice(&chunk.data);
            if chunk.last {
                break;
            }
        }
        assert_eq!(collected, content);
    }

    #[tokio::test]
    async fn test_handler_reports_ack_and_serves_again() {
        let dir = tempfile::tempdir().unwrap();
        let file = test_file(dir.path(), b"tiny");
        let (mut client, mut events) = spawn_handler(file);

        for round in 0..2 {
            protocol::write_message(
                &mut client,
                &Message::Ready {
                    client_name: format!("peer-{round}"),
                },
            )
            .await
            .unwrap();

            // Drain metadata + single chunk.
            let _ = read_text_message(&mut client).await;
            loop {
                let (header, payload) = protocol::read_frame(&mut client).await.unwrap();
                if header.kind == FrameKind::FileChunk
                    && ChunkPayload::decode(&payload).unwrap().last
                {
                    break;
                }
            }

            protocol::write_message(
                &mut client,
                &Message::Received {
                    client_name: format!("peer-{round}"),
                    save_path: "/tmp/tiny".to_string(),
                },
            )
            .await
            .unwrap();

            // Expect a TransferComplete event for this round.
            let complete = tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    match events.recv().await {
                        Some(PeerEvent::TransferComplete { label, .. }) => return label,
                        Some(_) => {}
                        None => panic!("event channel closed"),
                    }
                }
            })
            .await
            .expect("no completion event");
            assert_eq!(complete, format!("peer-{round}"));
        }
    }

    #[tokio::test]
    async fn test_receive_progress_percentage() {
        let progress = ReceiveProgress {
            state: ReceiveState::Receiving,
            expected_size: 200,
            bytes_received: 50,
        };
        assert!((progress.percentage() - 25.0).abs() < f64::EPSILON);
    }
}
