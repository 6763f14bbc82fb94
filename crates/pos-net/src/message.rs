//! Control-plane request and response documents.
//!
//! The CLI server accepts one JSON request per connection and answers with
//! one JSON response. On the wire each document is compact JSON followed by
//! a single `\n`:
//!
//! ```text
//! {"command":"RESETMBR","rid":"<uuid>","requestor":"cli","param":{}}\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NetError;

/// Maximum size of one frame, delimiter excluded.
pub const MESSAGE_MAX_SIZE: usize = 4 * 1024 * 1024;

/// Frame terminator.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Value of the `requestor` field for requests issued by this tool.
pub const REQUESTOR_CLI: &str = "cli";

/// Status code the server uses for a completed command.
pub const STATUS_SUCCESS: i64 = 0;

/// Description the server attaches when its own command deadline expired.
pub const SERVER_TIMED_OUT_DESCRIPTION: &str = "TIMED OUT";

/// `rid` the server echoes when it could not parse the request at all.
pub const UNKNOWN_RID: &str = "UNKNOWN";

/// A request to the control-plane CLI server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneRequest {
    pub command: String,
    pub rid: String,
    pub requestor: String,
    #[serde(default)]
    pub param: Map<String, Value>,
}

impl ControlPlaneRequest {
    /// Build a request with a fresh request id.
    pub fn new(command: impl Into<String>, param: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            rid: uuid::Uuid::new_v4().to_string(),
            requestor: REQUESTOR_CLI.to_string(),
            param,
        }
    }

    /// Serialize and frame the request.
    pub fn to_frame(&self) -> Result<Bytes, NetError> {
        let payload = serde_json::to_vec(self)?;
        encode_frame(&payload)
    }

    /// Pretty JSON form shown by `--json-req`.
    pub fn to_pretty_json(&self) -> Result<String, NetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `result.status` of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub code: i64,
    #[serde(default)]
    pub description: String,
}

/// `result` of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response from the control-plane CLI server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneResponse {
    pub command: String,
    pub rid: String,
    pub result: ResponseResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

impl ControlPlaneResponse {
    /// Parse a response from an unframed payload.
    pub fn from_frame(payload: &[u8]) -> Result<Self, NetError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Build a response, mainly for tests and mock servers.
    pub fn new(
        command: impl Into<String>,
        rid: impl Into<String>,
        code: i64,
        description: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            command: command.into(),
            rid: rid.into(),
            result: ResponseResult {
                status: ResponseStatus {
                    code,
                    description: description.into(),
                },
                data,
            },
            info: None,
        }
    }

    pub fn to_frame(&self) -> Result<Bytes, NetError> {
        let payload = serde_json::to_vec(self)?;
        encode_frame(&payload)
    }

    pub fn code(&self) -> i64 {
        self.result.status.code
    }

    pub fn description(&self) -> &str {
        &self.result.status.description
    }

    pub fn is_success(&self) -> bool {
        self.code() == STATUS_SUCCESS
    }

    /// The server gave up waiting on its own command; the effect is unknown.
    pub fn is_server_timeout(&self) -> bool {
        !self.is_success() && self.description() == SERVER_TIMED_OUT_DESCRIPTION
    }

    /// Whether this response answers the request with id `rid`.
    ///
    /// A failure carrying [`UNKNOWN_RID`] counts as an answer: the server
    /// rejected the request before it could read the id.
    pub fn answers(&self, rid: &str) -> bool {
        self.rid == rid || (!self.is_success() && self.rid == UNKNOWN_RID)
    }
}

/// Append the delimiter to a compact JSON payload.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, NetError> {
    if payload.len() > MESSAGE_MAX_SIZE {
        return Err(NetError::MessageTooLarge {
            size: payload.len(),
            max: MESSAGE_MAX_SIZE,
        });
    }
    if payload.contains(&FRAME_DELIMITER) {
        return Err(NetError::InvalidFrame(
            "payload contains the frame delimiter".to_string(),
        ));
    }

    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.extend_from_slice(payload);
    buf.put_u8(FRAME_DELIMITER);
    Ok(buf.freeze())
}

/// Strip the trailing delimiter (and a `\r` before it) from a raw frame.
pub fn strip_delimiter(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}
