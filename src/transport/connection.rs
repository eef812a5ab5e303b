//! Single-socket transport: reader loop, serialized writes, tag routing.
//!
//! A [`Connection`] owns one TCP socket to LookinServer and drives exactly
//! one reader task plus one writer task. Callers interact through
//! [`Connection::send_request`], which correlates responses to requests via
//! the tag field of the frame header.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► TcpStream (write half)
//! Caller N ─┘                                 │
//!      ▲                                      │ write error fails that tag,
//!      │ oneshot per tag                      │ then tears everything down
//!      │                                      ▼
//!  Pending table ◄──────────────── Reader Task ◄── TcpStream (read half)
//! ```
//!
//! Frames are queued as one contiguous header+payload buffer, so concurrent
//! requests can never interleave bytes on the wire. The pending table is a
//! plain mutex-protected map of tag → oneshot sender; completion is
//! single-shot because the sender is *taken out* of the map by whichever
//! outcome (response, timeout, send failure, teardown) fires first.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{LookinError, Result};
use crate::protocol::{build_frame, Frame, FrameBuffer, RESERVED_TAG};

/// Timeout for the TCP connect itself (discovery already filtered for
/// liveness, so this only guards against a half-dead simulator).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Outbound channel depth. The server answers one client over one socket;
/// deep queues buy nothing.
const OUTBOUND_CAPACITY: usize = 64;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Fresh instance, never connected.
    Idle,
    /// TCP connect in flight.
    Connecting,
    /// Socket up, reader running, requests accepted.
    Ready,
    /// Torn down (disconnect, EOF, read/write error). Terminal.
    Closed,
    /// Connect failed. Terminal.
    Failed,
}

/// A frame queued for the writer task, pre-encoded as one buffer.
struct Outbound {
    tag: u32,
    bytes: Vec<u8>,
}

/// State shared between callers, the reader task, and the writer task.
struct Shared {
    state: Mutex<ConnectionState>,
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Frame>>>>,
    next_tag: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Idle),
            pending: Mutex::new(HashMap::new()),
            next_tag: AtomicU32::new(1),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state mutex poisoned")
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().expect("state mutex poisoned") = next;
    }

    /// Allocate the next tag. Tag 0 is reserved and skipped on wrap.
    fn alloc_tag(&self) -> u32 {
        loop {
            let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
            if tag != RESERVED_TAG {
                return tag;
            }
        }
    }

    /// Insert a pending entry for `tag` and return the receiving end.
    fn register(&self, tag: u32) -> oneshot::Receiver<Result<Frame>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(tag, tx);
        rx
    }

    /// Remove the pending entry for `tag`, if still present.
    fn take(&self, tag: u32) -> Option<oneshot::Sender<Result<Frame>>> {
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(&tag)
    }

    /// Deliver an inbound frame to whoever holds its tag.
    fn route(&self, frame: Frame) {
        match self.take(frame.tag()) {
            Some(tx) => {
                // Receiver may have timed out already; nothing left to do then.
                let _ = tx.send(Ok(frame));
            }
            None => {
                tracing::debug!(
                    tag = frame.tag(),
                    frame_type = frame.frame_type(),
                    "dropping unsolicited frame"
                );
            }
        }
    }

    /// Fail a single pending entry.
    fn fail(&self, tag: u32, err: LookinError) {
        if let Some(tx) = self.take(tag) {
            let _ = tx.send(Err(err));
        }
    }

    /// Transition to `Closed` and fail every remaining pending entry with
    /// `NotConnected`. Idempotent; terminal states stay as they are.
    fn teardown(&self) {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            match *state {
                ConnectionState::Connecting | ConnectionState::Ready => {
                    *state = ConnectionState::Closed;
                }
                ConnectionState::Idle | ConnectionState::Closed | ConnectionState::Failed => {}
            }
        }

        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            pending.drain().collect()
        };
        for (tag, tx) in drained {
            tracing::trace!(tag, "failing pending request on teardown");
            let _ = tx.send(Err(LookinError::NotConnected));
        }
    }
}

/// Live resources of a connected instance.
struct Active {
    outbound: mpsc::Sender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    port: u16,
}

/// One TCP connection to LookinServer.
///
/// A connection is single-use: once it reaches `Closed` or `Failed`, a new
/// instance is required. `connect` on anything but an `Idle` instance fails
/// with `AlreadyConnected`.
pub struct Connection {
    shared: Arc<Shared>,
    active: Mutex<Option<Active>>,
}

impl Connection {
    /// Create a fresh, idle connection.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            active: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Port of the live connection, once `Ready`.
    pub fn port(&self) -> Option<u16> {
        self.active
            .lock()
            .expect("active mutex poisoned")
            .as_ref()
            .map(|a| a.port)
    }

    /// Connect to `127.0.0.1:port` and start the reader and writer tasks.
    pub async fn connect(&self, port: u16) -> Result<()> {
        {
            let mut state = self.shared.state.lock().expect("state mutex poisoned");
            if *state != ConnectionState::Idle {
                return Err(LookinError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.shared.set_state(ConnectionState::Failed);
                return Err(LookinError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                self.shared.set_state(ConnectionState::Failed);
                return Err(LookinError::ConnectionFailed(format!(
                    "connect to {addr} timed out"
                )));
            }
        };

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let reader = tokio::spawn(reader_loop(read_half, self.shared.clone()));
        let writer = tokio::spawn(writer_loop(outbound_rx, write_half, self.shared.clone()));

        self.shared.set_state(ConnectionState::Ready);
        *self.active.lock().expect("active mutex poisoned") = Some(Active {
            outbound: outbound_tx,
            reader,
            writer,
            port,
        });

        tracing::debug!(port, "connected to LookinServer");
        Ok(())
    }

    /// Send one request frame and await its response.
    ///
    /// Resolves with the first of: the matching response frame, the timeout
    /// (`Timeout`), a write failure (`SendError`), or connection teardown
    /// (`NotConnected`). The pending entry is removed exactly once and the
    /// caller is resumed exactly once, whichever outcome wins.
    pub async fn send_request(
        &self,
        frame_type: u32,
        payload: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Frame> {
        let outbound = {
            let active = self.active.lock().expect("active mutex poisoned");
            match active.as_ref() {
                Some(a) if self.shared.state() == ConnectionState::Ready => a.outbound.clone(),
                _ => return Err(LookinError::NotConnected),
            }
        };

        let tag = self.shared.alloc_tag();
        let payload = payload.unwrap_or_default();
        let bytes = build_frame(frame_type, tag, &payload);

        tracing::trace!(tag, frame_type, len = payload.len(), "sending request");
        let rx = self.shared.register(tag);

        if outbound.send(Outbound { tag, bytes }).await.is_err() {
            // Writer task is gone; teardown may have failed the entry already.
            self.shared.take(tag);
            return Err(LookinError::NotConnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without firing: torn down mid-flight.
            Ok(Err(_)) => Err(LookinError::NotConnected),
            Err(_) => {
                self.shared.take(tag);
                tracing::debug!(tag, frame_type, "request timed out");
                Err(LookinError::Timeout)
            }
        }
    }

    /// Tear the connection down and fail every pending request.
    pub fn disconnect(&self) {
        if let Some(active) = self.active.lock().expect("active mutex poisoned").take() {
            active.reader.abort();
            active.writer.abort();
        }
        self.shared.teardown();
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Writer task: drains the outbound queue one frame at a time.
///
/// A failed write resolves that frame's pending entry with `SendError`,
/// then tears the whole connection down.
async fn writer_loop(
    mut rx: mpsc::Receiver<Outbound>,
    mut writer: OwnedWriteHalf,
    shared: Arc<Shared>,
) {
    while let Some(out) = rx.recv().await {
        let result = async {
            writer.write_all(&out.bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::debug!(tag = out.tag, error = %e, "socket write failed");
            shared.fail(out.tag, LookinError::SendError(e.to_string()));
            shared.teardown();
            return;
        }
    }
    // Channel closed: disconnect already ran.
}

/// Reader task: accumulates socket reads and routes complete frames by tag.
///
/// EOF, a read error, or a malformed header ends the loop and tears the
/// connection down, failing all remaining pending entries.
async fn reader_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    let mut frame_buffer = FrameBuffer::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("server closed the connection");
                break;
            }
            Ok(n) => match frame_buffer.push(&buf[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        shared.route(frame);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "protocol violation, closing connection");
                    break;
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "socket read failed");
                break;
            }
        }
    }

    shared.teardown();
}
