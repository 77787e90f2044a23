//! The embedding capability, bridged across a process boundary.
//!
//! A host calls [`Embedding::embed`] on an `Arc<dyn Embedding>` without
//! knowing that the embedder runs in a separate plugin process:
//!
//! ```text
//! host                                   plugin
//! ────                                   ──────
//! Arc<dyn Embedding>                     your Embedding impl
//!   = EmbeddingClient ──RpcConnection──▶ EmbeddingServer
//! ```
//!
//! [`EmbeddingPlugin`] wires both adapters into the `plugin-rpc` framework:
//! the plugin binary serves [`EmbeddingPlugin::serve_config`], the host
//! launches it with [`EmbeddingPlugin::client_config`] and dispenses
//! [`EMBEDDING_PLUGIN`].
//!
//! ## Errors
//!
//! Every failure, whether the implementation's, the peer's, or the
//! transport's, reaches the caller as one [`EmbeddingError`] whose `source()`
//! holds the cause.

pub mod capability;
pub mod client;
pub mod messages;
pub mod plugin;
pub mod server;

pub use capability::{BoxError, Embedding, EmbeddingError};
pub use client::EmbeddingClient;
pub use messages::{EmbeddingRequest, EmbeddingResponse};
pub use plugin::{EmbeddingPlugin, EmbeddingPluginClient};
pub use server::EmbeddingServer;

use plugin_core::ProtocolVersion;
use plugin_rpc::HandshakeConfig;

/// Name the capability is registered and dispensed under.
pub const EMBEDDING_PLUGIN: &str = "embedding";

/// RPC method served by [`EmbeddingServer`].
pub const EMBEDDING_METHOD: &str = "Embedding";

/// Logging scope attached to every served call.
pub const EMBEDDING_SCOPE: &str = "embedding";

/// Application protocol version of the embedding plugin set.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "EMBEDPLUG_PLUGIN";

const MAGIC_COOKIE_VALUE: &str = "5d3e1a8c9b7f42e6a0c4f1d2b3e8a7c6";

/// Handshake values shared by embedding hosts and plugins.
pub fn handshake() -> HandshakeConfig {
    HandshakeConfig {
        protocol_version: ProtocolVersion::new(PROTOCOL_VERSION),
        magic_cookie_key: MAGIC_COOKIE_KEY.to_owned(),
        magic_cookie_value: MAGIC_COOKIE_VALUE.to_owned(),
    }
}
