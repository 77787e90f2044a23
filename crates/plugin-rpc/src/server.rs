//! Serving side of the transport.
//!
//! An [`RpcServer`] maps method names to typed [`Method`] handlers and runs
//! them for every request arriving on a connection. Each request executes in
//! its own task under a context restored from the request metadata, so one
//! slow call never blocks another and a `Cancel` frame (or the forwarded
//! deadline) stops exactly the call it names.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use plugin_core::{CallContext, DoneReason};

use crate::error::RpcError;
use crate::frame::{Frame, FrameCodec, Metadata};
use crate::status::{Code, Status};

/// A typed RPC method.
///
/// Implementations receive the decoded request and a context carrying the
/// caller's correlation id, deadline, and cancellation. Errors are sent to the
/// caller as a [`Status`] that keeps the full `source()` chain.
#[async_trait]
pub trait Method: Send + Sync + 'static {
    /// Decoded request payload.
    type Request: DeserializeOwned + Send + 'static;
    /// Response payload.
    type Response: Serialize + Send + 'static;
    /// Application error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Handles one call.
    async fn call(
        &self,
        ctx: CallContext,
        request: Self::Request,
    ) -> Result<Self::Response, Self::Error>;
}

// ---------------------------------------------------------------------------
// Type erasure
// ---------------------------------------------------------------------------

#[async_trait]
trait ErasedMethod: Send + Sync {
    async fn call(&self, ctx: CallContext, payload: Value) -> Result<Value, Status>;
}

struct Typed<M>(M);

#[async_trait]
impl<M: Method> ErasedMethod for Typed<M> {
    async fn call(&self, ctx: CallContext, payload: Value) -> Result<Value, Status> {
        let request: M::Request = serde_json::from_value(payload)
            .map_err(|err| Status::from_error(Code::InvalidArgument, &err))?;
        let response = self
            .0
            .call(ctx, request)
            .await
            .map_err(|err| Status::from_error(Code::Unknown, &err))?;
        serde_json::to_value(response).map_err(|err| Status::from_error(Code::Internal, &err))
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Method table plus the per-connection request loop.
#[derive(Clone, Default)]
pub struct RpcServer {
    methods: HashMap<String, Arc<dyn ErasedMethod>>,
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RpcServer {
    /// Creates a server with no methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method` under `name`, replacing any previous registration.
    pub fn register<M: Method>(&mut self, name: impl Into<String>, method: M) -> &mut Self {
        let name = name.into();
        if self
            .methods
            .insert(name.clone(), Arc::new(Typed(method)))
            .is_some()
        {
            warn!(method = %name, "replaced an already registered method");
        }
        self
    }

    /// Returns `true` if a method is registered under `name`.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Serves one connection until the peer disconnects or `shutdown` fires.
    ///
    /// In-flight calls are cancelled when the loop exits.
    pub async fn serve_connection<S>(
        &self,
        stream: S,
        shutdown: CancellationToken,
    ) -> Result<(), RpcError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new()).split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = sink.send(frame).await {
                    warn!(error = %err, "failed to write frame; dropping connection writer");
                    break;
                }
            }
        });

        let connection = shutdown.child_token();
        let in_flight: Arc<Mutex<HashMap<u64, CancellationToken>>> = Arc::default();

        let result = loop {
            let frame = tokio::select! {
                _ = connection.cancelled() => break Ok(()),
                frame = frames.next() => frame,
            };

            match frame {
                None => {
                    debug!("client closed connection");
                    break Ok(());
                }
                Some(Err(err)) => break Err(err),
                Some(Ok(Frame::Request {
                    id,
                    method,
                    metadata,
                    payload,
                })) => {
                    let ctx = restore_context(&metadata, &connection);
                    in_flight
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(id, ctx.cancellation_token().clone());

                    let handler = self.methods.get(&method).cloned();
                    let outbound = outbound.clone();
                    let in_flight = Arc::clone(&in_flight);
                    let span = tracing::debug_span!(
                        "rpc_request",
                        id,
                        method = %method,
                        correlation_id = %ctx.correlation_id(),
                    );

                    tokio::spawn(
                        async move {
                            let outcome = match handler {
                                Some(handler) => run_call(handler, ctx, payload).await,
                                None => Err(Status::new(
                                    Code::NotFound,
                                    format!("unknown method '{method}'"),
                                )),
                            };
                            in_flight
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .remove(&id);

                            let frame = match outcome {
                                Ok(payload) => Frame::Response { id, payload },
                                Err(status) => {
                                    debug!(code = %status.code, error = %status, "call failed");
                                    Frame::Error { id, status }
                                }
                            };
                            // The client may already be gone.
                            let _ = outbound.send(frame);
                        }
                        .instrument(span),
                    );
                }
                Some(Ok(Frame::Cancel { id })) => {
                    let token = in_flight
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);
                    match token {
                        Some(token) => {
                            debug!(id, "client cancelled call");
                            token.cancel();
                        }
                        None => debug!(id, "cancel for a call that already finished"),
                    }
                }
                Some(Ok(other)) => {
                    warn!(id = other.id(), "ignoring unexpected frame from client");
                }
            }
        };

        connection.cancel();
        drop(outbound);
        if let Err(err) = writer.await {
            warn!(error = %err, "connection writer task failed");
        }
        result
    }
}

fn restore_context(metadata: &Metadata, connection: &CancellationToken) -> CallContext {
    let mut ctx = CallContext::with_cancellation(connection.child_token());
    if let Some(id) = metadata.correlation_id {
        ctx = ctx.with_correlation_id(id);
    }
    if let Some(timeout_ms) = metadata.timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(timeout_ms));
    }
    ctx
}

/// Runs a handler to completion, or until its context is done.
///
/// The handler runs in a separate task so that a panic becomes an `internal`
/// status instead of a call that never answers.
async fn run_call(
    handler: Arc<dyn ErasedMethod>,
    ctx: CallContext,
    payload: Value,
) -> Result<Value, Status> {
    let handler_ctx = ctx.clone();
    let mut call =
        tokio::spawn(async move { handler.call(handler_ctx, payload).await }.in_current_span());

    tokio::select! {
        joined = &mut call => joined.unwrap_or_else(|err| {
            Err(Status::new(Code::Internal, format!("method handler failed: {err}")))
        }),
        reason = ctx.done() => {
            call.abort();
            Err(match reason {
                DoneReason::Cancelled => Status::new(Code::Cancelled, "call cancelled"),
                DoneReason::DeadlineExceeded => {
                    Status::new(Code::DeadlineExceeded, "call deadline exceeded")
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn any_forwarded_timeout_is_accepted() {
        let metadata = Metadata {
            correlation_id: None,
            timeout_ms: Some(u64::MAX),
        };
        let ctx = restore_context(&metadata, &CancellationToken::new());

        assert!(ctx.remaining().is_some_and(|left| left > Duration::from_secs(86_400)));
        let done = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(done.is_err(), "a far deadline must not fire");
    }

    #[test]
    fn forwarded_metadata_is_restored() {
        let id = plugin_core::CorrelationId::new_random();
        let metadata = Metadata {
            correlation_id: Some(id),
            timeout_ms: Some(5_000),
        };
        let connection = CancellationToken::new();
        let ctx = restore_context(&metadata, &connection);

        assert_eq!(ctx.correlation_id(), id);
        assert!(ctx.remaining().is_some_and(|left| left <= Duration::from_secs(5)));
        connection.cancel();
        assert!(ctx.is_cancelled());
    }
}
