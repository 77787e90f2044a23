//! Host/plugin handshake.
//!
//! The host launches the plugin with a magic cookie in its environment. The
//! plugin checks the cookie, binds a local socket, and announces it with a
//! single line on stdout:
//!
//! ```text
//! CORE-PROTOCOL-VERSION|APP-PROTOCOL-VERSION|NETWORK|ADDRESS|TRANSPORT
//! 1|1|unix|/tmp/plugin-4f0c….sock|rpc
//! ```
//!
//! The host parses the line, checks both versions, and connects. The
//! announced transport is handed to each capability's construction hook
//! unchanged, so a peer announcing `legacy` is rejected by the capability
//! itself rather than by the parser.

use serde::{Deserialize, Serialize};

use plugin_core::{PluginError, ProtocolVersion, TransportKind};

/// Version of the handshake line format itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Values host and plugin must agree on before talking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Application protocol version of the plugin set.
    pub protocol_version: ProtocolVersion,
    /// Environment variable the host sets when launching the plugin.
    pub magic_cookie_key: String,
    /// Value the plugin expects in that variable.
    pub magic_cookie_value: String,
}

impl HandshakeConfig {
    /// Fails with [`PluginError::NotLaunchedByHost`] unless the magic cookie is
    /// present in this process's environment.
    pub fn verify_environment(&self) -> Result<(), PluginError> {
        match std::env::var(&self.magic_cookie_key) {
            Ok(value) if value == self.magic_cookie_value => Ok(()),
            _ => Err(PluginError::NotLaunchedByHost {
                key: self.magic_cookie_key.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------

/// Socket family of the announced address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Unix domain socket; the address is a file-system path.
    Unix,
    /// TCP; the address is `host:port`.
    Tcp,
}

impl Network {
    fn as_str(self) -> &'static str {
        match self {
            Network::Unix => "unix",
            Network::Tcp => "tcp",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unix" => Ok(Network::Unix),
            "tcp" => Ok(Network::Tcp),
            other => Err(handshake_error(format!("unknown network '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------

/// The line a plugin prints to announce where it is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub app_version: ProtocolVersion,
    pub network: Network,
    pub address: String,
    pub transport: TransportKind,
}

impl HandshakeLine {
    /// Checks the announced versions against `config` and returns the
    /// negotiated transport.
    pub fn negotiate(&self, config: &HandshakeConfig) -> Result<TransportKind, PluginError> {
        if self.core_version != CORE_PROTOCOL_VERSION {
            return Err(handshake_error(format!(
                "plugin speaks core protocol {}, host expects {CORE_PROTOCOL_VERSION}",
                self.core_version
            )));
        }
        if self.app_version != config.protocol_version {
            return Err(handshake_error(format!(
                "plugin speaks app protocol {}, host expects {}",
                self.app_version, config.protocol_version
            )));
        }
        Ok(self.transport)
    }
}

impl std::fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.address, self.transport
        )
    }
}

impl std::str::FromStr for HandshakeLine {
    type Err = PluginError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('|').collect();
        let [core, app, network, address, transport] = parts.as_slice() else {
            return Err(handshake_error(format!(
                "expected 5 '|'-separated fields, got {}: {line:?}",
                parts.len()
            )));
        };

        let core_version = core.parse::<u32>().map_err(|err| {
            handshake_error(format!("invalid core protocol version '{core}': {err}"))
        })?;
        let app_version = app
            .parse::<u32>()
            .map(ProtocolVersion::new)
            .map_err(|err| {
                handshake_error(format!("invalid app protocol version '{app}': {err}"))
            })?;
        if address.is_empty() {
            return Err(handshake_error("empty listener address"));
        }

        Ok(HandshakeLine {
            core_version,
            app_version,
            network: network.parse()?,
            address: (*address).to_owned(),
            transport: transport.parse()?,
        })
    }
}

fn handshake_error(message: impl Into<String>) -> PluginError {
    PluginError::Handshake {
        message: message.into(),
    }
}
