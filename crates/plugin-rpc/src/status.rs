//! Wire representation of a failed call.
//!
//! A [`Status`] is sent in place of a response when a call fails. It carries
//! the whole `source()` chain of the error that caused it, so the caller can
//! still walk the original causes after the error has crossed the process
//! boundary.

use serde::{Deserialize, Serialize};

/// Coarse failure category of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// The method ran and returned an application error.
    Unknown,
    /// The request payload could not be decoded for the method.
    InvalidArgument,
    /// No method is registered under the requested name.
    NotFound,
    /// The caller cancelled the call.
    Cancelled,
    /// The call ran past its deadline.
    DeadlineExceeded,
    /// The connection to the peer is gone.
    Unavailable,
    /// The server failed in a way unrelated to the request (e.g. a handler panic).
    Internal,
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::NotFound => "not_found",
            Code::Cancelled => "cancelled",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::Unavailable => "unavailable",
            Code::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------

/// A serialisable error chain.
///
/// The head carries the outermost message; `source` links to the next cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Failure category.
    pub code: Code,
    /// Display text of this link in the chain.
    pub message: String,
    /// The next cause, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<Status>>,
}

impl Status {
    /// Creates a status with no cause.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Captures `err` and every error in its `source()` chain.
    pub fn from_error(code: Code, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut messages = Vec::new();
        let mut current = err.source();
        while let Some(cause) = current {
            messages.push(cause.to_string());
            current = cause.source();
        }

        let source = messages.into_iter().rev().fold(None, |source, message| {
            Some(Box::new(Status {
                code,
                message,
                source,
            }))
        });

        Status {
            code,
            message: err.to_string(),
            source,
        }
    }

    /// Iterates over this status and all of its causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &Status> {
        std::iter::successors(Some(self), |status| status.source.as_deref())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Status {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|status| status as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer: {source}")]
    struct Outer {
        source: std::io::Error,
    }

    #[test]
    fn from_error_keeps_every_cause() {
        let err = Outer {
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"),
        };
        let status = Status::from_error(Code::Unknown, &err);

        let messages: Vec<_> = status.chain().map(|s| s.message.as_str()).collect();
        assert_eq!(messages, ["outer: disk on fire", "disk on fire"]);
        assert!(status.chain().all(|s| s.code == Code::Unknown));
    }

    #[test]
    fn source_chain_is_walkable_as_std_error() {
        let status = Status {
            code: Code::Unknown,
            message: "a".into(),
            source: Some(Box::new(Status::new(Code::Unknown, "b"))),
        };
        let err: &dyn std::error::Error = &status;
        assert_eq!(err.source().unwrap().to_string(), "b");
        assert!(err.source().unwrap().source().is_none());
    }

    #[test]
    fn leaf_status_omits_source_on_the_wire() {
        let json = serde_json::to_value(Status::new(Code::NotFound, "nope")).unwrap();
        assert_eq!(json, serde_json::json!({ "code": "not_found", "message": "nope" }));
    }
}
