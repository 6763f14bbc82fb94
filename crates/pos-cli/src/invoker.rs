//! Forwarding operations to the control plane.
//!
//! Every outcome is one of three kinds, chosen by how far the request got:
//!
//! - nothing was written: [`FailureReason::NotSent`], the operation did not happen;
//! - the server answered with a non-zero status: [`FailureReason::Rejected`];
//! - the request was written but no usable answer came back:
//!   [`BackendOperationResult::Timeout`], the effect is unknown.
//!
//! Only read-only operations are retried, and only when not sent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pos_net::message::ControlPlaneRequest;
use pos_net::{AsyncConnector, ControlPlaneResponse, NetError, Socket};
use serde_json::{Map, Value};

use crate::config::{ControlPlaneConfig, RetryConfig};
use crate::confirm::Clearance;

/// What to send: backend command name, the target it acts on, parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    operation: String,
    target: String,
    params: Map<String, Value>,
    destructive: bool,
}

impl OperationDescriptor {
    pub fn new(operation: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            params: Map::new(),
            destructive: false,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.operation
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn is_destructive(&self) -> bool {
        self.destructive
    }

    /// Set from the command node, never by handlers.
    pub(crate) fn set_destructive(&mut self, destructive: bool) {
        self.destructive = destructive;
    }

    /// The wire request, with a fresh request id.
    pub fn to_request(&self) -> ControlPlaneRequest {
        ControlPlaneRequest::new(self.operation.clone(), self.params.clone())
    }
}

/// The server's answer to a completed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessDetails {
    pub code: i64,
    pub description: String,
    pub data: Option<Value>,
}

/// The operation definitely did not take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Transport failed before the request was written.
    NotSent(String),
    /// The server refused or failed the operation.
    Rejected { code: i64, description: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotSent(why) => write!(f, "not sent: {}", why),
            FailureReason::Rejected { code, description } => {
                write!(f, "{} (code {})", description, code)
            }
        }
    }
}

/// Why the outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutCause {
    NoReply(Duration),
    ConnectionLost(String),
    UnreadableReply(String),
    ServerTimedOut,
}

impl fmt::Display for TimeoutCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutCause::NoReply(after) => write!(f, "no reply within {:.1}s", after.as_secs_f64()),
            TimeoutCause::ConnectionLost(why) => write!(f, "connection lost after the request was sent: {}", why),
            TimeoutCause::UnreadableReply(why) => write!(f, "unreadable reply: {}", why),
            TimeoutCause::ServerTimedOut => f.write_str("the control plane timed out executing the command"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendOperationResult {
    Success(SuccessDetails),
    Failure(FailureReason),
    Timeout(TimeoutCause),
}

impl BackendOperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendOperationResult::Success(_))
    }
}

/// Sends operations over connections made by `connector`, one connection
/// per attempt.
pub struct BackendInvoker<S: Socket> {
    connector: Arc<dyn AsyncConnector<S>>,
    control_plane: ControlPlaneConfig,
    retry: RetryConfig,
}

impl<S: Socket> BackendInvoker<S> {
    pub fn new(
        connector: Arc<dyn AsyncConnector<S>>,
        control_plane: ControlPlaneConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            connector,
            control_plane,
            retry,
        }
    }

    /// Forward `operation` and classify the outcome.
    ///
    /// A destructive operation needs a confirmed clearance and is attempted
    /// at most once.
    pub async fn invoke(&self, operation: &OperationDescriptor, clearance: &Clearance) -> BackendOperationResult {
        if operation.is_destructive() && !clearance.is_confirmed() {
            tracing::error!(
                operation = operation.name(),
                "refusing to send an unconfirmed destructive operation"
            );
            return BackendOperationResult::Failure(FailureReason::NotSent(
                "destructive operation was not confirmed".to_string(),
            ));
        }

        let request = operation.to_request();
        let result = if operation.is_destructive() {
            self.attempt(&request).await
        } else {
            self.attempt_with_retry(&request).await
        };

        match &result {
            BackendOperationResult::Success(details) => {
                tracing::info!(operation = operation.name(), rid = %request.rid, code = details.code, "operation succeeded")
            }
            BackendOperationResult::Failure(reason) => {
                tracing::warn!(operation = operation.name(), rid = %request.rid, %reason, "operation failed")
            }
            BackendOperationResult::Timeout(cause) => {
                tracing::error!(operation = operation.name(), rid = %request.rid, %cause, "operation outcome unknown")
            }
        }
        result
    }

    async fn attempt_with_retry(&self, request: &ControlPlaneRequest) -> BackendOperationResult {
        let mut backoff = self.retry.backoff();
        loop {
            let result = self.attempt(request).await;
            let BackendOperationResult::Failure(FailureReason::NotSent(why)) = &result else {
                return result;
            };
            match backoff.next_wait() {
                Some(wait) => {
                    tracing::warn!(
                        command = %request.command,
                        attempt = backoff.attempts(),
                        wait_ms = wait.as_millis() as u64,
                        reason = %why,
                        "request not sent, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => return result,
            }
        }
    }

    async fn attempt(&self, request: &ControlPlaneRequest) -> BackendOperationResult {
        use BackendOperationResult::{Failure, Timeout};

        let frame = match request.to_frame() {
            Ok(frame) => frame,
            Err(e) => return Failure(FailureReason::NotSent(format!("cannot encode request: {}", e))),
        };

        let address = &self.control_plane.address;
        let connect_timeout = self.control_plane.connect_timeout;
        let socket = match tokio::time::timeout(connect_timeout, self.connector.connect(address)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                return Failure(FailureReason::NotSent(format!("cannot connect to {}: {}", address, e)))
            }
            Err(_) => {
                return Failure(FailureReason::NotSent(format!(
                    "connecting to {} timed out after {:.1}s",
                    address,
                    connect_timeout.as_secs_f64()
                )))
            }
        };

        tracing::info!(command = %request.command, rid = %request.rid, peer = %socket.peer_addr(), "sending request");
        if let Err(e) = socket.send(frame).await {
            socket.close().await;
            return Failure(FailureReason::NotSent(format!("cannot write request: {}", e)));
        }

        let request_timeout = self.control_plane.request_timeout;
        let result = match tokio::time::timeout(request_timeout, socket.recv()).await {
            Err(_) => Timeout(TimeoutCause::NoReply(request_timeout)),
            Ok(Err(e @ NetError::MessageTooLarge { .. })) => Timeout(TimeoutCause::UnreadableReply(e.to_string())),
            Ok(Err(e)) => Timeout(TimeoutCause::ConnectionLost(e.to_string())),
            Ok(Ok(reply)) => Self::classify(request, &reply),
        };
        socket.close().await;
        result
    }

    fn classify(request: &ControlPlaneRequest, reply: &[u8]) -> BackendOperationResult {
        let response = match ControlPlaneResponse::from_frame(reply) {
            Ok(response) => response,
            Err(e) => return BackendOperationResult::Timeout(TimeoutCause::UnreadableReply(e.to_string())),
        };
        tracing::debug!(rid = %response.rid, code = response.code(), description = response.description(), "reply received");

        if !response.answers(&request.rid) {
            return BackendOperationResult::Timeout(TimeoutCause::UnreadableReply(format!(
                "reply is for request {}, expected {}",
                response.rid, request.rid
            )));
        }
        if response.is_success() {
            let code = response.code();
            let description = response.description().to_string();
            return BackendOperationResult::Success(SuccessDetails {
                code,
                description,
                data: response.result.data,
            });
        }
        if response.is_server_timeout() {
            return BackendOperationResult::Timeout(TimeoutCause::ServerTimedOut);
        }
        BackendOperationResult::Failure(FailureReason::Rejected {
            code: response.code(),
            description: response.description().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Behavior, MockBackend};

    fn resetmbr() -> OperationDescriptor {
        let mut op = OperationDescriptor::new("RESETMBR", "all devices");
        op.set_destructive(true);
        op
    }

    fn listwbt() -> OperationDescriptor {
        OperationDescriptor::new("LISTWBT", "white-box tests")
    }

    #[tokio::test]
    async fn test_success_carries_description_and_data() {
        let backend = MockBackend::new(vec![Behavior::reply(0, "DONE", Some(serde_json::json!({"count": 2})))]);
        let invoker = backend.invoker(RetryConfig::none());

        let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
        let BackendOperationResult::Success(details) = result else {
            panic!("expected success, got {:?}", result);
        };
        assert_eq!(details.description, "DONE");
        assert_eq!(details.data.unwrap()["count"], 2);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "RESETMBR");
        assert_eq!(requests[0].requestor, "cli");
    }

    #[tokio::test]
    async fn test_unconfirmed_destructive_never_connects() {
        let backend = MockBackend::new(vec![Behavior::reply(0, "DONE", None)]);
        let invoker = backend.invoker(RetryConfig::none());

        let result = invoker.invoke(&resetmbr(), &Clearance::not_required()).await;
        assert!(matches!(result, BackendOperationResult::Failure(FailureReason::NotSent(_))));
        assert_eq!(backend.connects(), 0);
    }

    #[tokio::test]
    async fn test_rejection_passes_description_verbatim() {
        let backend = MockBackend::new(vec![Behavior::reply(
            2,
            "CLI SERVER IS NOW PROCESSING A COMMAND",
            None,
        )]);
        let invoker = backend.invoker(RetryConfig::none());

        let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
        assert_eq!(
            result,
            BackendOperationResult::Failure(FailureReason::Rejected {
                code: 2,
                description: "CLI SERVER IS NOW PROCESSING A COMMAND".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unparsed_request_rejection_counts() {
        let backend = MockBackend::new(vec![Behavior::UnknownRid {
            code: 11000,
            description: "invalid request".into(),
        }]);
        let invoker = backend.invoker(RetryConfig::none());
        let result = invoker.invoke(&listwbt(), &Clearance::not_required()).await;
        assert!(matches!(
            result,
            BackendOperationResult::Failure(FailureReason::Rejected { code: 11000, .. })
        ));
    }

    #[tokio::test]
    async fn test_refused_is_not_sent() {
        let backend = MockBackend::new(vec![Behavior::Refuse]);
        let invoker = backend.invoker(RetryConfig::none());

        let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
        assert!(matches!(result, BackendOperationResult::Failure(FailureReason::NotSent(_))));
        assert_eq!(backend.connects(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_not_sent() {
        let backend = MockBackend::new(vec![Behavior::FailSend]);
        let invoker = backend.invoker(RetryConfig::none());
        let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
        assert!(matches!(result, BackendOperationResult::Failure(FailureReason::NotSent(_))));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_drop_after_send_is_timeout() {
        let backend = MockBackend::new(vec![Behavior::Drop]);
        let invoker = backend.invoker(RetryConfig::default());

        let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
        assert!(matches!(
            result,
            BackendOperationResult::Timeout(TimeoutCause::ConnectionLost(_))
        ));
        assert_eq!(backend.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reply_is_timeout() {
        let backend = MockBackend::new(vec![Behavior::Hang]);
        let invoker = backend.invoker(RetryConfig::default());

        let result = invoker.invoke(&listwbt(), &Clearance::not_required()).await;
        assert!(matches!(result, BackendOperationResult::Timeout(TimeoutCause::NoReply(_))));
        assert_eq!(backend.connects(), 1);
    }

    #[tokio::test]
    async fn test_bad_replies_are_timeouts() {
        for behavior in [
            Behavior::Raw(b"not json".to_vec()),
            Behavior::WrongRid,
            Behavior::reply(1, "TIMED OUT", None),
        ] {
            let backend = MockBackend::new(vec![behavior]);
            let invoker = backend.invoker(RetryConfig::none());
            let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
            assert!(
                matches!(result, BackendOperationResult::Timeout(_)),
                "got {:?}",
                result
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_retries_when_not_sent() {
        let backend = MockBackend::new(vec![
            Behavior::Refuse,
            Behavior::Refuse,
            Behavior::reply(0, "DONE", None),
        ]);
        let invoker = backend.invoker(RetryConfig::default());

        let result = invoker.invoke(&listwbt(), &Clearance::not_required()).await;
        assert!(result.is_success());
        assert_eq!(backend.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_retry_gives_up() {
        let backend = MockBackend::new(vec![Behavior::Refuse]);
        let invoker = backend.invoker(RetryConfig::default());

        let result = invoker.invoke(&listwbt(), &Clearance::not_required()).await;
        assert!(matches!(result, BackendOperationResult::Failure(FailureReason::NotSent(_))));
        assert_eq!(backend.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_retry_wait_is_capped() {
        let backend = MockBackend::new(vec![Behavior::Refuse]);
        let invoker = backend.invoker(RetryConfig {
            max_attempts: 5,
            init_wait: Duration::MAX,
            max_wait: Duration::from_secs(1),
            total_time: Duration::from_secs(10),
        });

        let result = invoker.invoke(&listwbt(), &Clearance::not_required()).await;
        assert!(matches!(result, BackendOperationResult::Failure(FailureReason::NotSent(_))));
        assert_eq!(backend.connects(), 2);
    }

    #[tokio::test]
    async fn test_destructive_never_retried() {
        let backend = MockBackend::new(vec![Behavior::Refuse, Behavior::reply(0, "DONE", None)]);
        let invoker = backend.invoker(RetryConfig::default());

        let result = invoker.invoke(&resetmbr(), &Clearance::confirmed_for_test()).await;
        assert!(matches!(result, BackendOperationResult::Failure(_)));
        assert_eq!(backend.connects(), 1);
    }

    #[tokio::test]
    async fn test_rejected_read_only_not_retried() {
        let backend = MockBackend::new(vec![Behavior::reply(1, "no such array", None)]);
        let invoker = backend.invoker(RetryConfig::default());
        let result = invoker.invoke(&listwbt(), &Clearance::not_required()).await;
        assert!(matches!(result, BackendOperationResult::Failure(FailureReason::Rejected { .. })));
        assert_eq!(backend.connects(), 1);
    }

    #[test]
    fn test_descriptor_request() {
        let op = OperationDescriptor::new("STOPREBUILDING", "array POSArray").param("name", "POSArray");
        assert!(!op.is_destructive());
        let req = op.to_request();
        assert_eq!(req.command, "STOPREBUILDING");
        assert_eq!(req.param["name"], "POSArray");
    }

    #[test]
    fn test_reason_display() {
        let rejected = FailureReason::Rejected {
            code: 2500,
            description: "array is not rebuilding".into(),
        };
        assert_eq!(rejected.to_string(), "array is not rebuilding (code 2500)");
        assert!(TimeoutCause::NoReply(Duration::from_secs(30)).to_string().contains("30.0s"));
    }
}
