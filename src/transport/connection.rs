//! Connection handling for framed payload streams
//!
//! Wraps any ordered async byte stream (TCP, Unix socket, pipe, in-memory
//! duplex) and moves whole payloads over it:
//! - buffered frame decoding with the size guard
//! - clean close vs. truncation on end-of-stream
//! - per-connection statistics

use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{CodecError, FrameDecoder, FrameEncoder, Payload, DEFAULT_MAX_PAYLOAD_SIZE};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    Closed,

    #[error("Framing lost after an earlier error; the stream must be closed")]
    FramingLost,

    #[error("Send channel closed")]
    SendChannelClosed,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Frames can be sent and received
    Open,
    /// A receive or send failed; the position inside the stream is unknown
    Failed,
    /// The write side has been shut down
    Closed,
}

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Payloads sent
    pub payloads_sent: u64,
    /// Payloads received
    pub payloads_received: u64,
    /// Bytes sent, headers included
    pub bytes_sent: u64,
    /// Bytes received, headers included
    pub bytes_received: u64,
}

/// A framed payload stream.
///
/// Not safe to share between tasks: concurrent sends on one stream would
/// interleave frames. Use [`ConnectionHandle`] when several tasks need to
/// write.
pub struct Connection<S> {
    /// The underlying stream
    stream: S,
    /// Frame encoder
    encoder: FrameEncoder,
    /// Frame decoder
    decoder: FrameDecoder,
    /// Read buffer
    read_buf: BytesMut,
    /// Write buffer
    write_buf: BytesMut,
    /// A receive failed mid-stream
    read_failed: bool,
    /// A send failed, possibly after part of a frame went out
    write_failed: bool,
    /// The write side has been shut down
    write_closed: bool,
    /// Statistics
    stats: ConnectionStats,
}

impl<S> Connection<S> {
    /// Create a connection over an established stream
    pub fn new(stream: S) -> Self {
        Self::with_max_payload_size(stream, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a connection that refuses bodies larger than `max_payload_size`,
    /// in both directions
    pub fn with_max_payload_size(stream: S, max_payload_size: usize) -> Self {
        Self {
            stream,
            encoder: FrameEncoder::with_max_payload_size(max_payload_size),
            decoder: FrameDecoder::with_max_payload_size(max_payload_size),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            read_failed: false,
            write_failed: false,
            write_closed: false,
            stats: ConnectionStats::default(),
        }
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        if self.read_failed || self.write_failed {
            ConnectionState::Failed
        } else if self.write_closed {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Give back the stream. Bytes buffered but not yet decoded are dropped.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn fail_read(&mut self, error: ConnectionError) -> ConnectionError {
        tracing::debug!("Receive failed: {}", error);
        self.read_failed = true;
        error
    }

    fn fail_write(&mut self, error: ConnectionError) -> ConnectionError {
        tracing::debug!("Send failed: {}", error);
        self.write_failed = true;
        error
    }
}

impl<S: AsyncRead + Unpin> Connection<S> {
    /// Receive the next payload.
    ///
    /// Returns `Ok(None)` when the peer closes the stream between frames.
    /// After any error, later calls return [`ConnectionError::FramingLost`].
    pub async fn recv(&mut self) -> ConnectionResult<Option<Payload>> {
        if self.read_failed {
            return Err(ConnectionError::FramingLost);
        }

        loop {
            match self.decoder.decode(&mut self.read_buf) {
                Ok(Some(payload)) => {
                    self.stats.payloads_received += 1;
                    return Ok(Some(payload));
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail_read(e.into())),
            }

            let mut buf = [0u8; 4096];
            let n = match self.stream.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => return Err(self.fail_read(e.into())),
            };

            if n == 0 {
                let read = self.read_buf.len();
                return match self.decoder.pending_body() {
                    None if read == 0 => Ok(None), // Clean close
                    None => Err(self.fail_read(CodecError::TruncatedHeader { read }.into())),
                    Some(expected) => {
                        Err(self.fail_read(CodecError::TruncatedBody { expected, read }.into()))
                    }
                };
            }

            self.read_buf.extend_from_slice(&buf[..n]);
            self.stats.bytes_received += n as u64;
        }
    }
}

impl<S: AsyncWrite + Unpin> Connection<S> {
    /// Send one payload, returning the frame size in bytes
    pub async fn send(&mut self, payload: &Payload) -> ConnectionResult<usize> {
        if self.write_closed {
            return Err(ConnectionError::Closed);
        }
        if self.write_failed {
            return Err(ConnectionError::FramingLost);
        }

        // Oversized payloads are refused before anything reaches the stream.
        self.write_buf.clear();
        self.encoder.encode(payload, &mut self.write_buf)?;

        if let Err(e) = self.stream.write_all(&self.write_buf).await {
            return Err(self.fail_write(e.into()));
        }
        if let Err(e) = self.stream.flush().await {
            return Err(self.fail_write(e.into()));
        }

        let written = self.write_buf.len();
        self.stats.payloads_sent += 1;
        self.stats.bytes_sent += written as u64;

        Ok(written)
    }

    /// Shut down the write side. The peer sees end-of-stream after the
    /// last frame sent.
    pub async fn close(&mut self) -> ConnectionResult<()> {
        if self.write_closed {
            return Ok(());
        }

        self.stream.shutdown().await?;
        self.write_closed = true;

        Ok(())
    }
}

/// A cloneable handle that funnels payloads from many tasks into one
/// writer task, so frames on the stream never interleave
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<Payload>,
    connected: Arc<AtomicBool>,
    max_payload_size: usize,
}

impl ConnectionHandle {
    /// Move `writer` into a background task and return a handle feeding it.
    ///
    /// The task ends, shutting the writer down, once every handle is
    /// dropped. Its result carries the final write statistics.
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<ConnectionResult<ConnectionStats>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_max_payload_size(writer, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn spawn_with_max_payload_size<W>(
        writer: W,
        max_payload_size: usize,
    ) -> (Self, JoinHandle<ConnectionResult<ConnectionStats>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Payload>(256);
        let connected = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(write_loop(
            Connection::with_max_payload_size(writer, max_payload_size),
            receiver,
            connected.clone(),
        ));

        let handle = Self {
            sender,
            connected,
            max_payload_size,
        };

        (handle, task)
    }

    /// Queue a payload for sending.
    ///
    /// Oversized payloads are refused here so they cannot take the shared
    /// writer down.
    pub async fn send(&self, payload: Payload) -> ConnectionResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }

        payload.wire_length(self.max_payload_size)?;

        self.sender
            .send(payload)
            .await
            .map_err(|_| ConnectionError::SendChannelClosed)
    }

    /// Check if the writer task is still running
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut conn: Connection<W>,
    mut receiver: mpsc::Receiver<Payload>,
    connected: Arc<AtomicBool>,
) -> ConnectionResult<ConnectionStats> {
    while let Some(payload) = receiver.recv().await {
        if let Err(e) = conn.send(&payload).await {
            tracing::error!("Writer task stopped: {}", e);
            connected.store(false, Ordering::SeqCst);
            return Err(e);
        }
    }

    connected.store(false, Ordering::SeqCst);
    conn.close().await?;

    tracing::debug!("Writer task finished after {} payloads", conn.stats().payloads_sent);
    Ok(conn.stats().clone())
}
