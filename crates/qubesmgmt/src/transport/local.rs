//! Local stream-socket transport, used when running in dom0.

use super::Transport;
use crate::call::Call;
use crate::config::ConnectionType;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Connects to the qubesd socket once per call.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    socket_path: PathBuf,
    source: String,
    timeout: Option<Duration>,
}

impl LocalTransport {
    /// Create a transport for the socket at `socket_path`, framing requests
    /// as coming from `source`.
    pub fn new(socket_path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            source: source.into(),
            timeout: None,
        }
    }

    /// Bound the whole round trip by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the qubesd socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::Connection(format!(
                "cannot connect to {}: {e}",
                self.socket_path.display()
            ))
        })?;

        stream
            .write_all(request)
            .await
            .map_err(|e| Error::Connection(format!("request write failed: {e}")))?;
        // Half-close so qubesd sees end of request.
        stream
            .shutdown()
            .await
            .map_err(|e| Error::Connection(format!("shutdown failed: {e}")))?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .map_err(|e| Error::Connection(format!("response read failed: {e}")))?;
        Ok(response)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Socket
    }

    async fn round_trip(&self, call: &Call) -> Result<Vec<u8>> {
        let request = call.encode(&self.source);
        tracing::trace!(
            path = %self.socket_path.display(),
            request_len = request.len(),
            "Sending request over socket"
        );

        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(&request))
                .await
                .map_err(|_| Error::Connection(format!("no response within {limit:?}")))??,
            None => self.exchange(&request).await?,
        };

        tracing::trace!(response_len = response.len(), "Socket response received");
        Ok(response)
    }
}
