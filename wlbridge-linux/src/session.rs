//! Transport session: one framed duplex connection to the server.
//!
//! The write side drains the forwarding queue, wrapping each frame as a `Packet` message. The
//! read side dispatches inbound messages: `Packet` to injection, `Register` to the peer
//! registry, `Error` to the log. The session is lost when the server closes the connection or
//! the stream can no longer be framed; there is no reconnection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use wlbridge_core::protocol::parse_addresses;
use wlbridge_core::wire::{self, LEN_SIZE};
use wlbridge_core::{encode_frame, Decoded, FrameDecodeError, Message, PeerRegistry};

use crate::capture::InjectHandle;
use crate::queue::ForwardReceiver;

/// Why a session ended.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("server closed the connection")]
    Closed,
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unrecoverable framing error: {0}")]
    Framing(FrameDecodeError),
}

/// Routes inbound messages to their handlers.
pub struct Dispatcher {
    registry: Arc<PeerRegistry>,
    inject: InjectHandle,
}

impl Dispatcher {
    pub fn new(registry: Arc<PeerRegistry>, inject: InjectHandle) -> Self {
        Self { registry, inject }
    }

    pub fn dispatch(&self, decoded: Decoded) {
        match decoded {
            Decoded::Message(Message::Error { text }) => {
                tracing::error!(%text, "server returned error");
            }
            Decoded::Message(Message::Packet { bytes }) => self.inject.try_inject(bytes),
            Decoded::Message(Message::Register { addresses }) => {
                tracing::debug!(count = addresses.len(), "received registration");
                let (peers, invalid) = parse_addresses(&addresses);
                for e in invalid {
                    tracing::warn!(error = %e, "skipping address in registration");
                }
                let outcome = self.registry.merge_remote(&peers);
                if !outcome.is_unchanged() {
                    tracing::info!(
                        added = outcome.added.len(),
                        removed = outcome.removed.len(),
                        peers = self.registry.len(),
                        "peer list updated by server"
                    );
                }
            }
            Decoded::Unknown { kind } => {
                tracing::error!(kind, "invalid protocol message type");
            }
        }
    }
}

pub async fn connect(server: &str) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(server).await?;
    tracing::info!(peer = ?stream.peer_addr().ok(), "connected to server");
    Ok(stream)
}

pub struct Session<S> {
    stream: S,
    queue: ForwardReceiver,
    dispatcher: Dispatcher,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, queue: ForwardReceiver, dispatcher: Dispatcher) -> Self {
        Self {
            stream,
            queue,
            dispatcher,
        }
    }

    /// Run until the session ends. `Ok` means the forwarding queue closed and every queued frame
    /// was written; `Err` means the connection was lost. Cancelling `shutdown` closes the queue
    /// and lets the writer drain what is already queued.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SessionError> {
        let (reader, writer) = tokio::io::split(self.stream);
        let mut writer_task = tokio::spawn(write_loop(writer, self.queue, shutdown));
        let reason = tokio::select! {
            reason = read_loop(reader, &self.dispatcher) => reason,
            written = &mut writer_task => match written {
                Ok(Ok(sent)) => {
                    tracing::info!(sent, "forwarding queue closed, session finished");
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(e) => SessionError::Io(std::io::Error::other(e)),
            },
        };
        writer_task.abort();
        Err(reason)
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut queue: ForwardReceiver,
    shutdown: CancellationToken,
) -> Result<u64, SessionError> {
    let mut sent = 0u64;
    let mut closing = false;
    loop {
        let next = tokio::select! {
            next = queue.next() => next,
            _ = shutdown.cancelled(), if !closing => {
                tracing::debug!("closing forwarding queue");
                queue.close();
                closing = true;
                continue;
            }
        };
        let Some(bytes) = next else { break };
        let frame = match encode_frame(&Message::Packet { bytes }) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "could not encode frame, skipping");
                continue;
            }
        };
        writer.write_all(&frame).await?;
        sent += 1;
    }
    writer.flush().await?;
    Ok(sent)
}

/// Read and dispatch messages until the stream ends; returns why it ended.
async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, dispatcher: &Dispatcher) -> SessionError {
    loop {
        let mut len_buf = [0u8; LEN_SIZE];
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            return match e.kind() {
                std::io::ErrorKind::UnexpectedEof => SessionError::Closed,
                _ => SessionError::Io(e),
            };
        }
        let len = match wire::payload_len(len_buf) {
            Ok(len) => len,
            Err(e) => return SessionError::Framing(e),
        };
        let mut payload = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            return SessionError::Io(e);
        }
        match wire::decode_payload(&payload) {
            Ok(decoded) => dispatcher.dispatch(decoded),
            Err(e) => tracing::error!(error = %e, "error deserializing message, skipping"),
        }
    }
}
