//! Call dispatcher.
//!
//! [`AdminClient`] performs one request/response round trip per call through
//! the transport it was built with, and turns the response into either the
//! payload bytes or a typed error.

use crate::call::Call;
use crate::config::{ClientConfig, ConnectionType};
use crate::error::Result;
use crate::response::Response;
use crate::transport::{LocalTransport, RemoteTransport, Transport};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Handle for issuing calls to qubesd.
///
/// The transport is fixed at construction. Cloning is cheap and clones share
/// the transport; wrapper objects keep a clone for their own later calls.
/// Calls are single-shot: nothing is retried here.
#[derive(Clone)]
pub struct AdminClient {
    transport: Arc<dyn Transport>,
}

impl AdminClient {
    /// Build a client from an explicit configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        tracing::debug!(
            connection = %config.connection,
            timeout = ?config.timeout,
            "Creating admin client"
        );
        let transport: Arc<dyn Transport> = match config.connection {
            ConnectionType::Socket => Arc::new(
                LocalTransport::new(&config.socket_path, &config.source)
                    .with_timeout(config.timeout),
            ),
            ConnectionType::Qrexec => Arc::new(
                RemoteTransport::new(&config.qrexec_client).with_timeout(config.timeout),
            ),
        };
        Self { transport }
    }

    /// Build a client around any transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Kind of connection used by this client.
    pub fn connection_type(&self) -> ConnectionType {
        self.transport.connection_type()
    }

    /// Call `method` on `dest` and return the payload bytes unmodified.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCall`](crate::Error::InvalidCall) if `dest` or
    ///   `method` is empty; no transport is opened.
    /// - [`Error::Connection`](crate::Error::Connection) if the transport
    ///   fails.
    /// - [`Error::Protocol`](crate::Error::Protocol) if the response is not
    ///   framed correctly.
    /// - [`Error::Remote`](crate::Error::Remote) if qubesd reports a failure.
    pub async fn call(
        &self,
        dest: &str,
        method: &str,
        arg: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<Bytes> {
        let call = Call::new(dest, method, arg, payload)?;
        tracing::debug!(dest = %dest, method = %method, arg = ?arg, "qubesd call");

        let raw = self.transport.round_trip(&call).await.inspect_err(|e| {
            tracing::warn!(dest = %dest, method = %method, error = %e, "Transport failed");
        })?;

        let result = Response::decode(raw)?.into_result();
        match &result {
            Ok(payload) => {
                tracing::trace!(method = %method, payload_len = payload.len(), "Call succeeded");
            }
            Err(e) => {
                tracing::debug!(method = %method, error = %e, "qubesd reported an error");
            }
        }
        result
    }
}

impl fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminClient")
            .field("connection", &self.connection_type())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for unit tests.

    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// One recorded call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Recorded {
        pub dest: String,
        pub method: String,
        pub arg: Option<String>,
        pub payload: Option<Vec<u8>>,
    }

    /// Returns queued raw responses per method and records every call.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
        calls: Mutex<Vec<Recorded>>,
    }

    impl MockTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Queue a raw response for `method`. The last queued response
        /// for a method is repeated once the queue drains to it.
        pub fn respond(&self, method: &str, raw: &[u8]) {
            self.responses
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(raw.to_vec());
        }

        /// Queue a successful response carrying `payload`.
        pub fn ok(&self, method: &str, payload: &str) {
            let mut raw = b"0\n".to_vec();
            raw.extend_from_slice(payload.as_bytes());
            self.respond(method, &raw);
        }

        pub fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.method == method)
                .count()
        }

        pub fn client(self: &Arc<Self>) -> AdminClient {
            AdminClient::with_transport(self.clone())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn connection_type(&self) -> ConnectionType {
            ConnectionType::Socket
        }

        async fn round_trip(&self, call: &Call) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(Recorded {
                dest: call.dest().to_string(),
                method: call.method().to_string(),
                arg: call.arg().map(str::to_string),
                payload: call.payload().map(<[u8]>::to_vec),
            });

            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(call.method())
                .ok_or_else(|| Error::Connection(format!("no response for {}", call.method())))?;
            if queue.len() > 1 {
                Ok(queue.pop_front().unwrap_or_default())
            } else {
                queue
                    .front()
                    .cloned()
                    .ok_or_else(|| Error::Connection("empty response queue".into()))
            }
        }
    }
}
