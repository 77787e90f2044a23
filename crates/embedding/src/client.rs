//! Presents a remote embedder as a local [`Embedding`].

use async_trait::async_trait;

use plugin_core::CallContext;
use plugin_rpc::{Code, RpcConnection, RpcError};

use crate::{Embedding, EmbeddingError, EmbeddingRequest, EmbeddingResponse, EMBEDDING_METHOD};

/// Client adapter: each [`Embedding::embed`] call is one round trip over the
/// shared connection.
///
/// No retries, caching, or batching happen here. The connection is borrowed
/// from whoever opened it and is never closed by the adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    connection: RpcConnection,
}

impl EmbeddingClient {
    /// Creates an adapter that calls the peer over `connection`.
    pub fn new(connection: RpcConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Embedding for EmbeddingClient {
    async fn embed(&self, ctx: &CallContext, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            input: input.to_owned(),
        };
        let response: EmbeddingResponse = self
            .connection
            .call(ctx, EMBEDDING_METHOD, &request)
            .await
            .map_err(into_embedding_error)?;
        Ok(response.embedding)
    }
}

/// Maps a failed call onto the local error shape.
///
/// An application failure arrives as the server's `EmbeddingError`, already
/// tagged, so it is rebuilt around the peer's cause instead of being tagged a
/// second time. Every other failure keeps the [`RpcError`] as its cause.
fn into_embedding_error(err: RpcError) -> EmbeddingError {
    match err {
        RpcError::Remote(status) if status.code == Code::Unknown => match status.source {
            Some(cause) => EmbeddingError::new(*cause),
            None => EmbeddingError::new(status),
        },
        other => EmbeddingError::new(other),
    }
}

#[cfg(test)]
mod tests {
    use plugin_rpc::Status;

    use super::*;

    #[test]
    fn remote_application_failure_is_tagged_once() {
        let remote = Status::from_error(Code::Unknown, &EmbeddingError::new("model not loaded"));
        let err = into_embedding_error(RpcError::Remote(remote));

        assert_eq!(err.to_string(), "embedding failed: model not loaded");
        let cause = err.get_ref().downcast_ref::<Status>().unwrap();
        assert_eq!(cause.message, "model not loaded");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn transport_failures_keep_the_rpc_error() {
        let err = into_embedding_error(RpcError::ConnectionClosed);
        assert!(matches!(
            err.get_ref().downcast_ref::<RpcError>(),
            Some(RpcError::ConnectionClosed)
        ));

        let cancelled = Status::new(Code::Cancelled, "call cancelled");
        assert!(into_embedding_error(RpcError::Remote(cancelled)).is_cancelled());
    }
}
