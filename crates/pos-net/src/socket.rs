use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::NetError;

/// A connected, frame-oriented channel to the control-plane service.
///
/// `send` writes exactly one frame; `recv` returns exactly one frame with the
/// delimiter stripped. Tests substitute in-memory implementations.
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    /// Send one framed payload.
    async fn send(&self, frame: Bytes) -> Result<(), NetError>;

    /// Receive the next frame.
    ///
    /// `NetError::ConnectionClosed` means the peer went away before a
    /// complete frame arrived.
    async fn recv(&self) -> Result<Bytes, NetError>;

    /// Return the remote peer address.
    fn peer_addr(&self) -> SocketAddr;

    /// Close the socket gracefully.
    async fn close(&self);
}

/// Trait for types that can establish new connections to a remote address.
#[async_trait]
pub trait AsyncConnector<S: Socket>: Send + Sync {
    async fn connect(&self, addr: &str) -> Result<S, NetError>;
}
