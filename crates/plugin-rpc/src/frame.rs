//! Wire frames and their codec.
//!
//! Every message on a plugin connection is one [`Frame`], encoded as JSON and
//! framed with a big-endian `u32` length prefix
//! ([`LengthDelimitedCodec`] defaults). Request ids are chosen by the client
//! and echoed by the server, which is what lets one connection carry many
//! concurrent calls.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use plugin_core::CorrelationId;

use crate::error::RpcError;
use crate::status::Status;

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Call metadata forwarded alongside a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Caller's correlation id, restored on the serving side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    /// Time left on the caller's deadline when the request was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// One message on a plugin connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client to server: invoke `method` with `payload`.
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        metadata: Metadata,
        payload: Value,
    },
    /// Server to client: the call succeeded.
    Response { id: u64, payload: Value },
    /// Server to client: the call failed.
    Error { id: u64, status: Status },
    /// Client to server: the caller gave up on `id`.
    Cancel { id: u64 },
}

impl Frame {
    /// Returns the request id this frame belongs to.
    pub fn id(&self) -> u64 {
        match self {
            Frame::Request { id, .. }
            | Frame::Response { id, .. }
            | Frame::Error { id, .. }
            | Frame::Cancel { id } => *id,
        }
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Length-delimited JSON codec for [`Frame`]s.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    /// Creates a codec limited to [`MAX_FRAME_LENGTH`] bytes per frame.
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, RpcError> {
        match self.inner.decode(src)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(RpcError::Decode),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = RpcError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), RpcError> {
        let bytes = serde_json::to_vec(&frame).map_err(RpcError::Encode)?;
        self.inner.encode(Bytes::from(bytes), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    #[test]
    fn request_frame_layout() {
        let frame = Frame::Request {
            id: 7,
            method: "Embedding".into(),
            metadata: Metadata::default(),
            payload: serde_json::json!({ "input": "hi" }),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "request",
                "id": 7,
                "method": "Embedding",
                "metadata": {},
                "payload": { "input": "hi" },
            })
        );
    }

    #[test]
    fn codec_splits_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::Cancel { id: 1 }, &mut buf).unwrap();
        codec
            .encode(
                Frame::Error {
                    id: 2,
                    status: Status::new(Code::NotFound, "missing"),
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Cancel { id: 1 }));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.id(), 2);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = FrameCodec::new();
        let mut full = BytesMut::new();
        codec.encode(Frame::Cancel { id: 9 }, &mut full).unwrap();

        let mut partial = full.split_to(full.len() - 1);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);
        partial.unsplit(full);
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(Frame::Cancel { id: 9 }));
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        let mut inner = LengthDelimitedCodec::new();
        let mut buf = BytesMut::new();
        inner.encode(Bytes::from_static(b"not json"), &mut buf).unwrap();

        let err = FrameCodec::new().decode(&mut buf).unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
