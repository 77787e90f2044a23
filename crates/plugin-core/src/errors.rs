//! Errors raised while registering, launching, or dispensing plugins.
//!
//! [`PluginError`] covers everything that goes wrong *before* a capability is
//! usable: handshake negotiation, transport selection, and capability lookup.
//! Failures of an individual call are the capability's own error type.

use thiserror::Error;

use crate::{PluginName, TransportKind};

/// Which side of a capability a descriptor was expected to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginRole {
    /// Plugin side: attach the served implementation to the RPC server.
    Server,
    /// Host side: build a proxy over an open connection.
    Client,
}

impl std::fmt::Display for PluginRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginRole::Server => write!(f, "server"),
            PluginRole::Client => write!(f, "client"),
        }
    }
}

// ---------------------------------------------------------------------------

/// Errors that make a registration or connection attempt fail.
///
/// None of these are retried by the framework. Each one aborts the attempt
/// that produced it.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A construction hook was invoked for a transport the capability does not
    /// serve. Only [`TransportKind::Rpc`] is supported.
    #[error("unsupported transport '{transport}': only rpc plugins are supported")]
    UnsupportedTransport {
        /// The transport that was requested.
        transport: TransportKind,
    },

    /// No descriptor is registered under the requested name.
    #[error("unknown plugin '{name}'")]
    UnknownPlugin {
        /// The name that was looked up.
        name: String,
    },

    /// The descriptor registered under `name` constructs the other side.
    #[error("plugin '{name}' cannot be used as a {expected}")]
    RoleMismatch {
        /// Registered plugin name.
        name: PluginName,
        /// The role the caller asked for.
        expected: PluginRole,
    },

    /// The dispensed capability is not of the type the caller asked for.
    #[error("plugin '{name}' dispensed a different capability type than requested")]
    CapabilityMismatch {
        /// Registered plugin name.
        name: PluginName,
    },

    /// The plugin binary was started directly instead of by a host.
    #[error(
        "this binary is a plugin and must be launched by its host (missing or wrong '{key}')"
    )]
    NotLaunchedByHost {
        /// Environment variable holding the magic cookie.
        key: String,
    },

    /// The handshake line was missing, malformed, or announced incompatible versions.
    #[error("plugin handshake failed: {message}")]
    Handshake {
        /// Description of the problem.
        message: String,
    },

    /// The plugin process could not be started.
    #[error("failed to launch plugin: {source}")]
    Launch {
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// Socket or pipe I/O failed while establishing the connection.
    #[error("plugin I/O error: {source}")]
    Io {
        /// Underlying I/O failure.
        #[from]
        source: std::io::Error,
    },
}
