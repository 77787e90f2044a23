//! Plugin descriptors and the explicit plugin set.
//!
//! A capability joins the framework by providing one of two construction
//! hooks, wrapped in a [`PluginDescriptor`]:
//!
//! - [`ServerFactory`] on the plugin side attaches the real implementation to
//!   the [`RpcServer`].
//! - [`ClientFactory`] on the host side builds a proxy over an open
//!   [`RpcConnection`].
//!
//! Both hooks receive the negotiated [`TransportKind`] and decide for
//! themselves whether they can serve it. The mapping from names to descriptors
//! is a plain [`PluginSet`] value built at startup and passed to
//! [`serve`](crate::serve) or [`PluginClient`](crate::PluginClient).

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use plugin_core::{PluginError, PluginName, PluginRole, TransportKind};

use crate::{RpcConnection, RpcServer};

/// A type-erased capability returned by a [`ClientFactory`].
///
/// [`PluginSet::dispense`] downcasts it to the type the caller asks for.
pub type Dispensed = Box<dyn Any + Send>;

/// Plugin-side construction hook.
pub trait ServerFactory: Send + Sync {
    /// Registers the capability's methods on `server` for `transport`.
    fn attach(&self, transport: TransportKind, server: &mut RpcServer) -> Result<(), PluginError>;
}

/// Host-side construction hook.
pub trait ClientFactory: Send + Sync {
    /// Builds the capability proxy over `connection` for `transport`.
    fn dispense(
        &self,
        transport: TransportKind,
        connection: RpcConnection,
    ) -> Result<Dispensed, PluginError>;
}

/// How to construct one side of a capability.
#[derive(Clone)]
pub enum PluginDescriptor {
    /// Serve a local implementation.
    Server(Arc<dyn ServerFactory>),
    /// Consume a remote implementation.
    Client(Arc<dyn ClientFactory>),
}

impl PluginDescriptor {
    /// Returns the side this descriptor constructs.
    pub fn role(&self) -> PluginRole {
        match self {
            PluginDescriptor::Server(_) => PluginRole::Server,
            PluginDescriptor::Client(_) => PluginRole::Client,
        }
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginDescriptor::{}", self.role())
    }
}

// ---------------------------------------------------------------------------

/// Named descriptors known to one side of a connection.
#[derive(Debug, Clone, Default)]
pub struct PluginSet {
    entries: BTreeMap<PluginName, PluginDescriptor>,
}

impl PluginSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `descriptor` under `name` (builder form of [`PluginSet::insert`]).
    #[must_use]
    pub fn with(mut self, name: PluginName, descriptor: PluginDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Adds `descriptor` under `name`, returning any descriptor it replaced.
    pub fn insert(
        &mut self,
        name: PluginName,
        descriptor: PluginDescriptor,
    ) -> Option<PluginDescriptor> {
        self.entries.insert(name, descriptor)
    }

    /// Looks up the descriptor registered under `name`.
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.entries.get(name)
    }

    /// Iterates over registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &PluginName> {
        self.entries.keys()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds an [`RpcServer`] by attaching every descriptor for `transport`.
    ///
    /// Every entry must be a [`PluginDescriptor::Server`]. The first failing
    /// hook aborts the whole build.
    pub fn build_server(&self, transport: TransportKind) -> Result<RpcServer, PluginError> {
        let mut server = RpcServer::new();
        for (name, descriptor) in &self.entries {
            match descriptor {
                PluginDescriptor::Server(factory) => {
                    factory.attach(transport, &mut server)?;
                    tracing::debug!(plugin = %name, %transport, "attached plugin to server");
                }
                PluginDescriptor::Client(_) => {
                    return Err(PluginError::RoleMismatch {
                        name: name.clone(),
                        expected: PluginRole::Server,
                    });
                }
            }
        }
        Ok(server)
    }

    /// Constructs the capability registered under `name` over `connection` and
    /// downcasts it to `T`.
    pub fn dispense<T: 'static>(
        &self,
        name: &str,
        transport: TransportKind,
        connection: RpcConnection,
    ) -> Result<T, PluginError> {
        let (name, descriptor) =
            self.entries
                .get_key_value(name)
                .ok_or_else(|| PluginError::UnknownPlugin {
                    name: name.to_owned(),
                })?;

        let factory = match descriptor {
            PluginDescriptor::Client(factory) => factory,
            PluginDescriptor::Server(_) => {
                return Err(PluginError::RoleMismatch {
                    name: name.clone(),
                    expected: PluginRole::Client,
                });
            }
        };

        factory
            .dispense(transport, connection)?
            .downcast::<T>()
            .map(|capability| *capability)
            .map_err(|_| PluginError::CapabilityMismatch { name: name.clone() })
    }
}
