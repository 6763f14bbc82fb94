//! Control-plane networking for the PoseidonOS admin CLI.
//!
//! - [`message`] -- request/response documents and newline framing.
//! - [`socket`] -- the [`Socket`] / [`AsyncConnector`] seams the invoker talks through.
//! - [`tcp`] -- Tokio TCP implementation of those traits.

pub mod error;
pub mod message;
pub mod socket;
pub mod tcp;

pub use error::NetError;
pub use message::{ControlPlaneRequest, ControlPlaneResponse, ResponseResult, ResponseStatus};
pub use socket::{AsyncConnector, Socket};
pub use tcp::{TcpConnector, TcpSocket};
