//! Wire messages of the `Embedding` method.

use serde::{Deserialize, Serialize};

/// Request payload: the text to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub input: String,
}

/// Response payload: the embedding, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}
