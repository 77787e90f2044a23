//! embedplug hosting framework and RPC transport.
//!
//! Lets a host process call capabilities implemented in a separately launched
//! plugin process. Capabilities plug in through [`PluginDescriptor`]s; this
//! crate handles everything between the two trait objects.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process launch, handshake, socket setup, framing,
//! request multiplexing, and cancellation forwarding all live here. Capability
//! crates see only [`RpcServer`], [`RpcConnection`], and the descriptor traits.
//!
//! ## Transport
//!
//! One connection per plugin process, carrying length-delimited JSON
//! [`Frame`]s:
//!
//! - Unix domain socket in a temp directory (default on Unix).
//! - TCP on `127.0.0.1` elsewhere.
//!
//! Any `AsyncRead + AsyncWrite` stream works, which is how tests run a
//! server and client in one process over `tokio::io::duplex`.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`frame`] | Wire frames and their codec |
//! | [`status`] | Serialisable error chains |
//! | [`server`] | [`Method`] trait and [`RpcServer`] |
//! | [`connection`] | Multiplexed [`RpcConnection`] |
//! | [`handshake`] | Magic cookie and handshake line |
//! | [`plugin`] | Descriptors and [`PluginSet`] |
//! | [`serve`](mod@serve) | Plugin-side entry point |
//! | [`client`] | Host-side [`PluginClient`] |

pub mod client;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod plugin;
pub mod serve;
pub mod server;
pub mod status;

pub use client::{ClientConfig, PluginClient};
pub use connection::RpcConnection;
pub use error::RpcError;
pub use frame::{Frame, Metadata};
pub use handshake::{HandshakeConfig, HandshakeLine, Network, CORE_PROTOCOL_VERSION};
pub use plugin::{ClientFactory, Dispensed, PluginDescriptor, PluginSet, ServerFactory};
pub use serve::{serve, serve_with_announcer, ServeConfig};
pub use server::{Method, RpcServer};
pub use status::{Code, Status};
