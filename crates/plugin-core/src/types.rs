//! Shared value types negotiated during the plugin handshake.
//!
//! [`TransportKind`] is the transport the host and plugin agreed on;
//! [`ProtocolVersion`] is the application protocol version both sides must
//! share before any capability is dispensed.

use serde::{Deserialize, Serialize};

use crate::PluginError;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Transport negotiated between host and plugin.
///
/// Capabilities in this workspace are served over [`TransportKind::Rpc`] only.
/// [`TransportKind::Legacy`] exists so a misconfigured peer that announces the
/// older transport can be parsed and then rejected by the capability's own
/// construction hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Multiplexed request/response RPC over a byte stream.
    Rpc,
    /// The pre-RPC transport. Never supported; always rejected.
    Legacy,
}

impl TransportKind {
    /// Returns the token used for this transport in the handshake line.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Rpc => "rpc",
            TransportKind::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rpc" => Ok(TransportKind::Rpc),
            "legacy" => Ok(TransportKind::Legacy),
            other => Err(PluginError::Handshake {
                message: format!("unknown transport '{other}'"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Application protocol version a plugin set speaks.
///
/// Unlike semantic versions there is no compatibility range: host and plugin
/// must announce exactly the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    /// Creates a new [`ProtocolVersion`].
    pub fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_tokens_parse_back() {
        for kind in [TransportKind::Rpc, TransportKind::Legacy] {
            assert_eq!(kind.as_str().parse::<TransportKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_transport_token_is_a_handshake_error() {
        let err = "grpc2".parse::<TransportKind>().unwrap_err();
        assert!(matches!(err, PluginError::Handshake { .. }));
        assert!(err.to_string().contains("grpc2"));
    }
}
