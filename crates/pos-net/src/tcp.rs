//! TCP transport for the control-plane connection.
//!
//! The stream is split into independent read/write halves, each behind an
//! async mutex, so [`TcpSocket`] can implement the `&self` [`Socket`] trait.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::error::NetError;
use crate::message::{strip_delimiter, FRAME_DELIMITER, MESSAGE_MAX_SIZE};
use crate::socket::{AsyncConnector, Socket};

/// A TCP socket carrying newline-delimited frames.
pub struct TcpSocket {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    peer_addr: SocketAddr,
}

impl TcpSocket {
    /// Wrap an already-connected [`tokio::net::TcpStream`].
    pub fn from_stream(stream: tokio::net::TcpStream) -> Result<Self, NetError> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            peer_addr,
        })
    }

    /// Write raw bytes and flush.
    pub async fn send_bytes(&self, data: &[u8]) -> Result<(), NetError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(NetError::from_io)?;
        writer.flush().await.map_err(NetError::from_io)?;
        Ok(())
    }

    /// Read one delimited frame, delimiter stripped.
    pub async fn recv_frame(&self) -> Result<Bytes, NetError> {
        let mut reader = self.reader.lock().await;
        let mut buf = Vec::new();

        // One byte past the limit so an oversized frame is detectable.
        let limit = (MESSAGE_MAX_SIZE + 2) as u64;
        let n = (&mut *reader)
            .take(limit)
            .read_until(FRAME_DELIMITER, &mut buf)
            .await
            .map_err(NetError::from_io)?;

        if n == 0 {
            return Err(NetError::ConnectionClosed);
        }
        if buf.last() != Some(&FRAME_DELIMITER) {
            if buf.len() > MESSAGE_MAX_SIZE {
                return Err(NetError::MessageTooLarge {
                    size: buf.len(),
                    max: MESSAGE_MAX_SIZE,
                });
            }
            // EOF in the middle of a frame.
            return Err(NetError::ConnectionClosed);
        }

        let payload = strip_delimiter(&buf);
        if payload.len() > MESSAGE_MAX_SIZE {
            return Err(NetError::MessageTooLarge {
                size: payload.len(),
                max: MESSAGE_MAX_SIZE,
            });
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    /// Shut down the write half; errors are ignored (peer may be gone).
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocket")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

#[async_trait]
impl Socket for TcpSocket {
    async fn send(&self, frame: Bytes) -> Result<(), NetError> {
        self.send_bytes(&frame).await
    }

    async fn recv(&self) -> Result<Bytes, NetError> {
        self.recv_frame().await
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    async fn close(&self) {
        self.shutdown().await;
    }
}

/// Connector producing [`TcpSocket`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl AsyncConnector<TcpSocket> for TcpConnector {
    async fn connect(&self, addr: &str) -> Result<TcpSocket, NetError> {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(NetError::from_io)?;
        let socket = TcpSocket::from_stream(stream)?;
        tracing::debug!(peer = %socket.peer_addr, "connected to control plane");
        Ok(socket)
    }
}
