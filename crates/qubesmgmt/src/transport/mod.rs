//! Transports that carry one framed call to qubesd and bring back the raw
//! response.
//!
//! Every call opens exactly one transport resource (a socket connection or a
//! helper process) and tears it down before returning. Nothing is pooled.

mod local;
mod remote;

pub use local::LocalTransport;
pub use remote::RemoteTransport;

use crate::call::Call;
use crate::config::ConnectionType;
use crate::error::Result;
use async_trait::async_trait;

/// Delivers one call and returns the complete, undecoded response.
///
/// Implementations map every I/O failure to
/// [`Error::Connection`](crate::Error::Connection). They never interpret the
/// response bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Kind of connection this transport provides.
    fn connection_type(&self) -> ConnectionType;

    /// Perform one round trip and read the response to end-of-stream.
    async fn round_trip(&self, call: &Call) -> Result<Vec<u8>>;
}
