//! Errors produced by a single RPC round trip.

use thiserror::Error;

use crate::status::{Code, Status};

/// Why an RPC call did not produce a response.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The caller's context was cancelled before a reply arrived.
    #[error("call cancelled")]
    Cancelled,

    /// The caller's deadline passed before a reply arrived.
    #[error("call deadline exceeded")]
    DeadlineExceeded,

    /// The connection closed while the call was pending (or before it was sent).
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer answered with an error status.
    #[error("remote error: {0}")]
    Remote(#[source] Status),

    /// The request could not be serialised.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame or response payload could not be deserialised.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// The underlying byte stream failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Maps this error onto the wire failure categories.
    ///
    /// Remote errors report the code the peer sent.
    pub fn code(&self) -> Code {
        match self {
            RpcError::Cancelled => Code::Cancelled,
            RpcError::DeadlineExceeded => Code::DeadlineExceeded,
            RpcError::ConnectionClosed | RpcError::Io(_) => Code::Unavailable,
            RpcError::Remote(status) => status.code,
            RpcError::Encode(_) | RpcError::Decode(_) => Code::Internal,
        }
    }
}
