//! qrexec transport, used when running inside a VM.

use super::Transport;
use crate::call::Call;
use crate::config::ConnectionType;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Spawns the qrexec helper once per call.
///
/// The helper is invoked as `<program> <dest> <service>`, where `service` is
/// `method` or `method+arg`. The payload goes to its stdin.
#[derive(Debug, Clone)]
pub struct RemoteTransport {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl RemoteTransport {
    /// Create a transport spawning `program` for each call.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Bound the whole round trip by `timeout`. The helper is killed on expiry.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, call: &Call) -> Result<Output> {
        let service = call.service_name();
        let mut child = Command::new(&self.program)
            .arg(call.dest())
            .arg(&service)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Connection(format!("cannot spawn {}: {e}", self.program.display()))
            })?;

        // stdin is fed concurrently with draining stdout and stderr.
        let stdin = child.stdin.take();
        let feed = async move {
            let (Some(mut stdin), Some(payload)) = (stdin, call.payload()) else {
                return Ok(());
            };
            match stdin.write_all(payload).await {
                Ok(()) => Ok(()),
                // The helper closed stdin early; its exit status decides.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    tracing::warn!(
                        service = %service,
                        payload_len = payload.len(),
                        "qrexec helper did not read the whole payload"
                    );
                    Ok(())
                }
                Err(e) => Err(Error::Connection(format!("cannot send payload: {e}"))),
            }
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| Error::Connection(format!("helper I/O failed: {e}")))?;
        fed?;
        Ok(output)
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Qrexec
    }

    async fn round_trip(&self, call: &Call) -> Result<Vec<u8>> {
        tracing::trace!(
            program = %self.program.display(),
            dest = %call.dest(),
            service = %call.service_name(),
            "Spawning qrexec helper"
        );

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(call))
                .await
                .map_err(|_| Error::Connection(format!("no response within {limit:?}")))??,
            None => self.run(call).await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            tracing::warn!(
                dest = %call.dest(),
                service = %call.service_name(),
                status = ?output.status.code(),
                "qrexec service call failed"
            );
            return Err(Error::Connection(stderr));
        }

        tracing::trace!(response_len = output.stdout.len(), "qrexec response received");
        Ok(output.stdout)
    }
}
