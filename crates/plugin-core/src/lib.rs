//! Port types shared by the embedplug plugin framework and its capabilities.
//!
//! This crate defines the values that flow through every plugin call and
//! every registration attempt. It performs no I/O; the transport and hosting
//! machinery live in `plugin-rpc`, and concrete capabilities (such as
//! `embedding`) build on both.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`context`] | [`CallContext`]: cancellation, deadline, correlation, logging scope |
//! | [`identifiers`] | Newtype identifiers (`PluginName`, `CorrelationId`) |
//! | [`types`] | Handshake values (`TransportKind`, `ProtocolVersion`) |
//! | [`errors`] | [`PluginError`] for registration and connection failures |

pub mod context;
pub mod errors;
pub mod identifiers;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use context::{CallContext, DoneReason};
pub use errors::{PluginError, PluginRole};
pub use identifiers::{CorrelationId, PluginName};
pub use types::{ProtocolVersion, TransportKind};
