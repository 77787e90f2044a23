//! Calling side of the transport.
//!
//! [`RpcConnection`] is the transport handle the host holds for one plugin
//! connection. It is cheap to clone and safe to share: every call gets its
//! own request id and reply slot, and the background reader routes each reply
//! to the slot with the matching id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use plugin_core::{CallContext, DoneReason};

use crate::error::RpcError;
use crate::frame::{Frame, FrameCodec, Metadata};
use crate::status::Status;

type Reply = Result<Value, Status>;

struct Shared {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    outbound: mpsc::UnboundedSender<Frame>,
    closed: CancellationToken,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, id: u64, reply: Reply) {
        match self.pending().remove(&id) {
            Some(slot) => {
                // The caller may have stopped waiting in the meantime.
                let _ = slot.send(reply);
            }
            None => debug!(id, "discarding reply for a call that is no longer pending"),
        }
    }
}

/// A multiplexed connection to a plugin's [`RpcServer`](crate::RpcServer).
///
/// Dropping the last clone closes the connection.
#[derive(Clone)]
pub struct RpcConnection {
    shared: Arc<Shared>,
    _close_on_drop: Arc<DropGuard>,
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("pending", &self.shared.pending().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RpcConnection {
    /// Wraps `stream` and starts the background reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (sink, frames) = Framed::new(stream, FrameCodec::new()).split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: Mutex::default(),
            outbound,
            closed: CancellationToken::new(),
        });

        tokio::spawn(write_frames(sink, outbound_rx, shared.closed.clone()));
        tokio::spawn(read_frames(frames, Arc::clone(&shared)));

        // The reader task keeps `shared` alive, so closing is tied to the handles instead.
        let close_on_drop = Arc::new(shared.closed.clone().drop_guard());
        Self {
            shared,
            _close_on_drop: close_on_drop,
        }
    }

    /// Calls `method` with `request` and waits for the typed response.
    ///
    /// Returns [`RpcError::Cancelled`] or [`RpcError::DeadlineExceeded`] as soon
    /// as `ctx` is done, after telling the server to stop working on the call.
    pub async fn call<Req, Resp>(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        if ctx.is_cancelled() {
            return Err(RpcError::Cancelled);
        }
        if ctx.remaining() == Some(Duration::ZERO) {
            return Err(RpcError::DeadlineExceeded);
        }
        let payload = serde_json::to_value(request).map_err(RpcError::Encode)?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (slot, reply) = oneshot::channel();
        self.shared.pending().insert(id, slot);
        // Checked after inserting: the reader drains pending slots only after
        // marking the connection closed.
        if self.is_closed() {
            self.shared.pending().remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        let frame = Frame::Request {
            id,
            method: method.to_owned(),
            metadata: Metadata {
                correlation_id: Some(ctx.correlation_id()),
                timeout_ms: ctx
                    .remaining()
                    .map(|left| u64::try_from(left.as_millis()).unwrap_or(u64::MAX)),
            },
            payload,
        };
        if self.shared.outbound.send(frame).is_err() {
            self.shared.pending().remove(&id);
            return Err(RpcError::ConnectionClosed);
        }
        debug!(id, method, correlation_id = %ctx.correlation_id(), "sent request");

        let reply = tokio::select! {
            reply = reply => reply,
            reason = ctx.done() => {
                self.shared.pending().remove(&id);
                let _ = self.shared.outbound.send(Frame::Cancel { id });
                debug!(id, method, ?reason, "abandoned call");
                return Err(match reason {
                    DoneReason::Cancelled => RpcError::Cancelled,
                    DoneReason::DeadlineExceeded => RpcError::DeadlineExceeded,
                });
            }
        };

        match reply {
            Ok(Ok(payload)) => serde_json::from_value(payload).map_err(RpcError::Decode),
            Ok(Err(status)) => Err(RpcError::Remote(status)),
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Returns `true` once the connection has shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Waits until the connection has shut down.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    /// Shuts the connection down. Pending calls fail with
    /// [`RpcError::ConnectionClosed`].
    pub fn close(&self) {
        self.shared.closed.cancel();
    }
}

async fn write_frames<S>(
    mut sink: SplitSink<Framed<S, FrameCodec>, Frame>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    closed: CancellationToken,
) where
    S: AsyncRead + AsyncWrite,
{
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else { break };
        if let Err(err) = sink.send(frame).await {
            warn!(error = %err, "failed to write frame; closing connection");
            closed.cancel();
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_frames<S>(mut frames: SplitStream<Framed<S, FrameCodec>>, shared: Arc<Shared>)
where
    S: AsyncRead + AsyncWrite,
{
    loop {
        let frame = tokio::select! {
            _ = shared.closed.cancelled() => break,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(Frame::Response { id, payload })) => shared.complete(id, Ok(payload)),
            Some(Ok(Frame::Error { id, status })) => shared.complete(id, Err(status)),
            Some(Ok(other)) => warn!(id = other.id(), "ignoring unexpected frame from server"),
            Some(Err(err)) => {
                warn!(error = %err, "failed to read frame; closing connection");
                break;
            }
            None => {
                debug!("server closed connection");
                break;
            }
        }
    }

    shared.closed.cancel();
    let abandoned: Vec<_> = shared.pending().drain().collect();
    if !abandoned.is_empty() {
        debug!(count = abandoned.len(), "failing calls pending on a closed connection");
    }
}
