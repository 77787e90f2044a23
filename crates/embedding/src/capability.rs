//! The embedding capability and its error type.

use async_trait::async_trait;
use thiserror::Error;

use plugin_core::CallContext;
use plugin_rpc::{Code, RpcError, Status};

/// Boxed error accepted as the cause of an [`EmbeddingError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Produces a vector embedding for a text input.
///
/// Implemented by real embedders inside a plugin process and by
/// [`EmbeddingClient`](crate::EmbeddingClient) in the host, so host code cannot
/// tell whether the computation runs locally or behind a process boundary.
///
/// `input` may be empty; validating it is up to the implementation. The length
/// of the returned vector is implementation-defined.
#[async_trait]
pub trait Embedding: Send + Sync {
    /// Returns the embedding for `input`.
    async fn embed(&self, ctx: &CallContext, input: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ---------------------------------------------------------------------------

/// The single error category of the embedding capability.
///
/// Local computation failures, remote failures, and transport failures all
/// surface as this type; the cause is kept as `source()` and can be
/// downcast or walked.
#[derive(Debug, Error)]
#[error("embedding failed: {source}")]
pub struct EmbeddingError {
    #[source]
    source: BoxError,
}

impl EmbeddingError {
    /// Tags `source` as an embedding failure.
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Returns the wrapped cause.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }

    /// Returns `true` if the call was cancelled, locally or by the peer.
    pub fn is_cancelled(&self) -> bool {
        self.transport_code() == Some(Code::Cancelled)
    }

    /// Returns `true` if the call ran past its deadline, locally or at the peer.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.transport_code() == Some(Code::DeadlineExceeded)
    }

    /// Finds the outermost transport failure in the cause chain.
    fn transport_code(&self) -> Option<Code> {
        let source: &(dyn std::error::Error + 'static) = &*self.source;
        let mut current = Some(source);
        while let Some(err) = current {
            if let Some(rpc) = err.downcast_ref::<RpcError>() {
                return Some(rpc.code());
            }
            if let Some(status) = err.downcast_ref::<Status>() {
                return Some(status.code);
            }
            current = err.source();
        }
        None
    }
}
