//! Newtype identifiers.
//!
//! Names that select a plugin and ids that correlate one call across the
//! process boundary are distinct newtypes so they cannot be swapped for plain
//! strings by accident.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Name under which a capability is registered in a plugin set and
    /// dispensed by the host (e.g. `"embedding"`).
    PluginName
}

impl PluginName {
    /// Creates a plugin name from a compile-time constant.
    ///
    /// Panics if `name` is empty.
    pub fn from_static(name: &'static str) -> Self {
        assert!(!name.is_empty(), "plugin names must not be empty");
        Self(name.to_owned())
    }
}

// ---------------------------------------------------------------------------

/// Identifies one call for log correlation.
///
/// Generated by the caller, forwarded in request metadata, and restored on
/// the serving side so spans on both ends of the boundary share the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a new random correlation id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`CorrelationId`] from an existing UUID (e.g. decoded from metadata).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plugin_name_is_rejected() {
        assert!(PluginName::new("").is_none());
        assert_eq!(PluginName::new("embedding").unwrap().as_str(), "embedding");
    }

    #[test]
    fn plugin_name_borrows_as_str_for_map_lookup() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(PluginName::new("embedding").unwrap(), 1);
        assert_eq!(map.get("embedding"), Some(&1));
    }

    #[test]
    fn correlation_id_survives_json() {
        let id = CorrelationId::new_random();
        let json = serde_json::to_string(&id).unwrap();
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
