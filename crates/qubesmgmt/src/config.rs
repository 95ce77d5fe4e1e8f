//! Client configuration.
//!
//! Configuration is an explicit value handed to
//! [`AdminClient::from_config`](crate::AdminClient::from_config). Only the
//! outermost composition point should call [`ClientConfig::from_env`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default path of the qubesd socket in dom0.
pub const DEFAULT_QUBESD_SOCKET: &str = "/var/run/qubesd.sock";

/// Default helper program used to reach qubesd from a VM.
pub const DEFAULT_QREXEC_CLIENT: &str = "qrexec-client-vm";

/// Default source domain written into locally framed requests.
pub const DEFAULT_SOURCE: &str = "dom0";

/// How calls reach qubesd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    /// Local stream socket (running in dom0).
    #[default]
    Socket,
    /// qrexec service call through a helper program (running in a VM).
    Qrexec,
}

impl ConnectionType {
    /// Parse from string (case-insensitive). Unknown values fall back to socket.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "qrexec" | "remote" => Self::Qrexec,
            _ => Self::Socket,
        }
    }

    /// Name as reported by [`Qubes::connection_type`](crate::Qubes::connection_type).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Qrexec => "qrexec",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for an [`AdminClient`](crate::AdminClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transport to use.
    pub connection: ConnectionType,

    /// Path to the qubesd socket (socket transport).
    pub socket_path: PathBuf,

    /// Helper program invoked per call (qrexec transport).
    pub qrexec_client: PathBuf,

    /// Source domain written as the first request field (socket transport).
    pub source: String,

    /// Deadline for one whole round trip. `None` means wait forever.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionType::Socket,
            socket_path: PathBuf::from(DEFAULT_QUBESD_SOCKET),
            qrexec_client: PathBuf::from(DEFAULT_QREXEC_CLIENT),
            source: DEFAULT_SOURCE.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Socket configuration pointing at `path`.
    pub fn socket(path: impl Into<PathBuf>) -> Self {
        Self {
            connection: ConnectionType::Socket,
            socket_path: path.into(),
            ..Default::default()
        }
    }

    /// qrexec configuration using `program` as the helper.
    pub fn qrexec(program: impl Into<PathBuf>) -> Self {
        Self {
            connection: ConnectionType::Qrexec,
            qrexec_client: program.into(),
            ..Default::default()
        }
    }

    /// Set the source domain.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `QUBESMGMT_CONNECTION` | `socket` (socket, qrexec) |
    /// | `QUBESD_SOCKET` | `/var/run/qubesd.sock` |
    /// | `QUBESMGMT_QREXEC_CLIENT` | `qrexec-client-vm` |
    /// | `QUBESMGMT_SOURCE` | `dom0` |
    /// | `QUBESMGMT_TIMEOUT_SECS` | unset |
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            connection: std::env::var("QUBESMGMT_CONNECTION")
                .map(|v| ConnectionType::parse(&v))
                .unwrap_or(default.connection),
            socket_path: std::env::var("QUBESD_SOCKET")
                .map(PathBuf::from)
                .unwrap_or(default.socket_path),
            qrexec_client: std::env::var("QUBESMGMT_QREXEC_CLIENT")
                .map(PathBuf::from)
                .unwrap_or(default.qrexec_client),
            source: std::env::var("QUBESMGMT_SOURCE").unwrap_or(default.source),
            timeout: std::env::var("QUBESMGMT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        }
    }
}
