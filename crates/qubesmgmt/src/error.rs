//! Error types for qubesmgmt.

use thiserror::Error;

/// Result type alias for qubesmgmt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to qubesd.
///
/// A single round trip through [`AdminClient::call`](crate::AdminClient::call)
/// fails with exactly one of [`Error::Connection`], [`Error::Protocol`] or
/// [`Error::Remote`]. The remaining variants come from the layers above it.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport could not be established or broke before a complete response.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Response bytes (or a listing payload) do not match the expected framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// qubesd explicitly reported a failure.
    #[error("{kind}: {message}")]
    Remote {
        /// Exception kind reported by the daemon.
        kind: String,
        /// Human-readable message, preserved verbatim.
        message: String,
        /// Traceback block, empty when the daemon sent none.
        traceback: String,
    },

    /// Name not present in a collection (or unknown pool driver).
    #[error("not found: {0}")]
    NotFound(String),

    /// Listing names a class with no registered constructor.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// Call rejected before any transport was opened.
    #[error("invalid call: {0}")]
    InvalidCall(String),
}

impl Error {
    /// True for transport-level failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// True for framing and contract violations.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Exception kind of a daemon-reported failure, if this is one.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            Self::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
