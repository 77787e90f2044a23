//! Registration of the embedding capability with the plugin framework.
//!
//! | Side | Descriptor | Rpc | Legacy |
//! |------|------------|-----|--------|
//! | plugin | [`EmbeddingPlugin::server`] | attaches [`EmbeddingServer`] | `UnsupportedTransport` |
//! | host | [`EmbeddingPlugin::client`] | dispenses `Arc<dyn Embedding>` | `UnsupportedTransport` |

use std::path::PathBuf;
use std::sync::Arc;

use plugin_core::{PluginError, PluginName, TransportKind};
use plugin_rpc::{
    ClientConfig, ClientFactory, Dispensed, PluginDescriptor, PluginSet, RpcConnection,
    RpcServer, ServeConfig, ServerFactory,
};

use crate::{
    handshake, Embedding, EmbeddingClient, EmbeddingServer, EMBEDDING_METHOD, EMBEDDING_PLUGIN,
};

/// Plugin-side registration: holds the implementation to serve.
pub struct EmbeddingPlugin {
    embedding: Arc<dyn Embedding>,
}

impl EmbeddingPlugin {
    /// Creates a registration serving `embedding`.
    pub fn new(embedding: Arc<dyn Embedding>) -> Self {
        Self { embedding }
    }

    /// Descriptor serving `embedding` from a plugin process.
    pub fn server(embedding: Arc<dyn Embedding>) -> PluginDescriptor {
        PluginDescriptor::Server(Arc::new(Self::new(embedding)))
    }

    /// Descriptor dispensing an [`EmbeddingClient`] in the host.
    pub fn client() -> PluginDescriptor {
        PluginDescriptor::Client(Arc::new(EmbeddingPluginClient))
    }

    /// Plugin set a plugin binary passes to [`plugin_rpc::serve`].
    pub fn serving_set(embedding: Arc<dyn Embedding>) -> PluginSet {
        PluginSet::new().with(PluginName::from_static(EMBEDDING_PLUGIN), Self::server(embedding))
    }

    /// Plugin set a host passes to [`plugin_rpc::PluginClient`].
    pub fn dispensing_set() -> PluginSet {
        PluginSet::new().with(PluginName::from_static(EMBEDDING_PLUGIN), Self::client())
    }

    /// Complete serve configuration for an embedding plugin binary.
    pub fn serve_config(embedding: Arc<dyn Embedding>) -> ServeConfig {
        ServeConfig::new(handshake(), Self::serving_set(embedding))
    }

    /// Complete launch configuration for an embedding plugin at `command`.
    pub fn client_config(command: impl Into<PathBuf>) -> ClientConfig {
        ClientConfig::new(handshake(), Self::dispensing_set(), command)
    }
}

impl ServerFactory for EmbeddingPlugin {
    fn attach(&self, transport: TransportKind, server: &mut RpcServer) -> Result<(), PluginError> {
        match transport {
            TransportKind::Rpc => {
                server.register(
                    EMBEDDING_METHOD,
                    EmbeddingServer::new(Arc::clone(&self.embedding)),
                );
                Ok(())
            }
            TransportKind::Legacy => Err(PluginError::UnsupportedTransport { transport }),
        }
    }
}

/// Host-side registration. Stateless: everything it needs arrives with the connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingPluginClient;

impl ClientFactory for EmbeddingPluginClient {
    fn dispense(
        &self,
        transport: TransportKind,
        connection: RpcConnection,
    ) -> Result<Dispensed, PluginError> {
        match transport {
            TransportKind::Rpc => {
                let embedding: Arc<dyn Embedding> = Arc::new(EmbeddingClient::new(connection));
                Ok(Box::new(embedding))
            }
            TransportKind::Legacy => Err(PluginError::UnsupportedTransport { transport }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use plugin_core::CallContext;

    use super::*;
    use crate::EmbeddingError;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedding for Counting {
        async fn embed(
            &self,
            _ctx: &CallContext,
            _input: &str,
        ) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.0])
        }
    }

    #[test]
    fn legacy_server_path_fails_without_touching_the_implementation() {
        let counting = Arc::new(Counting::default());
        let plugin = EmbeddingPlugin::new(counting.clone());
        let mut server = RpcServer::new();

        for _ in 0..3 {
            let err = plugin.attach(TransportKind::Legacy, &mut server).unwrap_err();
            assert!(matches!(
                err,
                PluginError::UnsupportedTransport {
                    transport: TransportKind::Legacy
                }
            ));
        }
        assert!(!server.has_method(EMBEDDING_METHOD));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rpc_server_path_registers_the_method() {
        let plugin = EmbeddingPlugin::new(Arc::new(Counting::default()));
        let mut server = RpcServer::new();
        plugin.attach(TransportKind::Rpc, &mut server).unwrap();
        assert!(server.has_method(EMBEDDING_METHOD));
    }

    #[tokio::test]
    async fn legacy_client_path_fails() {
        let (client_io, _server_io) = tokio::io::duplex(1024);
        let connection = RpcConnection::spawn(client_io);

        let err = EmbeddingPluginClient
            .dispense(TransportKind::Legacy, connection)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported transport 'legacy': only rpc plugins are supported"
        );
    }

    #[test]
    fn sets_register_under_the_capability_name() {
        let serving = EmbeddingPlugin::serving_set(Arc::new(Counting::default()));
        assert!(matches!(
            serving.get(EMBEDDING_PLUGIN),
            Some(PluginDescriptor::Server(_))
        ));
        let dispensing = EmbeddingPlugin::dispensing_set();
        assert!(matches!(
            dispensing.get(EMBEDDING_PLUGIN),
            Some(PluginDescriptor::Client(_))
        ));
    }
}
