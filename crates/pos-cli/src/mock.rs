//! In-memory control plane for tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pos_net::message::{strip_delimiter, ControlPlaneRequest, UNKNOWN_RID};
use pos_net::{AsyncConnector, ControlPlaneResponse, NetError, Socket};
use serde_json::Value;

use crate::config::{ControlPlaneConfig, RetryConfig};
use crate::invoker::BackendInvoker;

/// What the mock server does on one connection.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Connection refused.
    Refuse,
    /// Accept, then fail the write.
    FailSend,
    /// Answer with this status.
    Reply {
        code: i64,
        description: String,
        data: Option<Value>,
    },
    /// Answer with an unreadable id.
    UnknownRid { code: i64, description: String },
    /// Answer with these bytes.
    Raw(Vec<u8>),
    /// Read the request and never answer.
    Hang,
    /// Read the request and close.
    Drop,
    /// Answer for some other request.
    WrongRid,
}

impl Behavior {
    pub(crate) fn reply(code: i64, description: &str, data: Option<Value>) -> Self {
        Behavior::Reply {
            code,
            description: description.to_string(),
            data,
        }
    }
}

/// Scripted backend shared by the connector and its sockets.
///
/// Each connection takes the next behavior; the last one repeats.
pub(crate) struct MockBackend {
    script: Mutex<VecDeque<Behavior>>,
    connects: AtomicUsize,
    requests: Mutex<Vec<ControlPlaneRequest>>,
}

impl MockBackend {
    pub(crate) fn new(script: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            connects: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<ControlPlaneRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn invoker(self: &Arc<Self>, retry: RetryConfig) -> BackendInvoker<MockSocket> {
        let control_plane = ControlPlaneConfig {
            address: "127.0.0.1:18716".to_string(),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        };
        BackendInvoker::new(
            Arc::new(MockConnector {
                backend: Arc::clone(self),
            }),
            control_plane,
            retry,
        )
    }

    fn next_behavior(&self) -> Behavior {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or(Behavior::Refuse)
        } else {
            script.front().cloned().unwrap_or(Behavior::Refuse)
        }
    }
}

pub(crate) struct MockConnector {
    backend: Arc<MockBackend>,
}

#[async_trait]
impl AsyncConnector<MockSocket> for MockConnector {
    async fn connect(&self, _addr: &str) -> Result<MockSocket, NetError> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        match self.backend.next_behavior() {
            Behavior::Refuse => Err(NetError::ConnectionRefused),
            behavior => Ok(MockSocket {
                backend: Arc::clone(&self.backend),
                behavior,
                received: Mutex::new(None),
            }),
        }
    }
}

pub(crate) struct MockSocket {
    backend: Arc<MockBackend>,
    behavior: Behavior,
    received: Mutex<Option<ControlPlaneRequest>>,
}

impl MockSocket {
    fn answer(&self, rid: &str, code: i64, description: &str, data: Option<Value>) -> Result<Bytes, NetError> {
        let command = self
            .received
            .lock()
            .as_ref()
            .map(|r| r.command.clone())
            .unwrap_or_default();
        let frame = ControlPlaneResponse::new(command, rid, code, description, data).to_frame()?;
        Ok(Bytes::copy_from_slice(strip_delimiter(&frame)))
    }
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&self, frame: Bytes) -> Result<(), NetError> {
        if matches!(self.behavior, Behavior::FailSend) {
            return Err(NetError::ConnectionClosed);
        }
        let request: ControlPlaneRequest = serde_json::from_slice(strip_delimiter(&frame))?;
        self.backend.requests.lock().push(request.clone());
        *self.received.lock() = Some(request);
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, NetError> {
        let rid = self
            .received
            .lock()
            .as_ref()
            .map(|r| r.rid.clone())
            .unwrap_or_default();
        match &self.behavior {
            Behavior::Reply {
                code,
                description,
                data,
            } => self.answer(&rid, *code, description, data.clone()),
            Behavior::UnknownRid { code, description } => self.answer(UNKNOWN_RID, *code, description, None),
            Behavior::WrongRid => self.answer("00000000-0000-0000-0000-000000000000", 0, "DONE", None),
            Behavior::Raw(bytes) => Ok(Bytes::from(bytes.clone())),
            Behavior::Hang => std::future::pending().await,
            Behavior::Drop | Behavior::Refuse | Behavior::FailSend => Err(NetError::ConnectionClosed),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 18716))
    }

    async fn close(&self) {}
}
