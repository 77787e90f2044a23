//! Serves a local [`Embedding`] implementation as the `Embedding` RPC method.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn, Instrument};

use plugin_core::CallContext;
use plugin_rpc::Method;

use crate::{Embedding, EmbeddingError, EmbeddingRequest, EmbeddingResponse, EMBEDDING_SCOPE};

/// Server adapter binding an [`Embedding`] implementation to the transport.
///
/// Holds nothing but the implementation, so one instance serves any number
/// of concurrent calls.
#[derive(Clone)]
pub struct EmbeddingServer {
    embedding: Arc<dyn Embedding>,
}

impl std::fmt::Debug for EmbeddingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingServer").finish_non_exhaustive()
    }
}

impl EmbeddingServer {
    /// Creates an adapter serving `embedding`.
    pub fn new(embedding: Arc<dyn Embedding>) -> Self {
        Self { embedding }
    }

    /// Handles one `Embedding` request.
    ///
    /// The context always gets the `embedding` logging scope before the
    /// implementation runs. A failure is returned as the implementation's
    /// [`EmbeddingError`], which already carries the tag; no partial response
    /// is produced.
    pub async fn handle_embed(
        &self,
        ctx: CallContext,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, EmbeddingError> {
        let ctx = ctx.with_scope(EMBEDDING_SCOPE);
        let span = ctx.span().clone();

        async {
            match self.embedding.embed(&ctx, &request.input).await {
                Ok(embedding) => {
                    debug!(dimensions = embedding.len(), "embedding computed");
                    Ok(EmbeddingResponse { embedding })
                }
                Err(err) => {
                    warn!(error = %err, "embedding implementation failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Method for EmbeddingServer {
    type Request = EmbeddingRequest;
    type Response = EmbeddingResponse;
    type Error = EmbeddingError;

    async fn call(
        &self,
        ctx: CallContext,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, EmbeddingError> {
        self.handle_embed(ctx, request).await
    }
}
