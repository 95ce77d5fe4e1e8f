//! Response decoding.
//!
//! A qubesd response is read to exhaustion before it is decoded. The first
//! line holds a single marker byte:
//!
//! ```text
//! 0\n<payload bytes...>                          success
//! 2\n<kind>\n<message>\n<traceback lines...>     failure
//! ```
//!
//! Anything else, including an empty response, is a framing violation.

use crate::error::{Error, Result};
use bytes::Bytes;

/// Marker byte of a successful response.
pub const SUCCESS_MARKER: u8 = b'0';

/// Marker byte of a daemon-reported failure.
pub const ERROR_MARKER: u8 = b'2';

/// Decoded qubesd response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Call succeeded; payload is returned verbatim.
    Success(Bytes),
    /// Daemon reported an error. Missing fields are empty strings.
    Failure {
        kind: String,
        message: String,
        traceback: String,
    },
}

impl Response {
    /// Decode raw response bytes. Pure: performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an empty response, an unknown marker,
    /// a marker line without its `\n` or longer than the marker, or
    /// non-UTF-8 error fields.
    pub fn decode(raw: impl Into<Bytes>) -> Result<Self> {
        let raw: Bytes = raw.into();
        let Some(&marker) = raw.first() else {
            return Err(Error::Protocol("empty response".into()));
        };

        let body = match raw.get(1).copied() {
            None => return Err(Error::Protocol("unterminated marker line".into())),
            Some(b'\n') => raw.slice(2..),
            Some(_) => {
                return Err(Error::Protocol(format!(
                    "malformed marker line: {:?}",
                    String::from_utf8_lossy(first_line(&raw))
                )))
            }
        };

        match marker {
            SUCCESS_MARKER => Ok(Self::Success(body)),
            ERROR_MARKER => Self::decode_failure(&body),
            other => Err(Error::Protocol(format!(
                "unknown response marker: 0x{other:02x}"
            ))),
        }
    }

    fn decode_failure(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::Protocol(format!("error response is not UTF-8: {e}")))?;

        let mut parts = text.splitn(3, '\n');
        let kind = parts.next().unwrap_or_default().to_string();
        let message = parts.next().unwrap_or_default().to_string();
        let traceback = parts.next().unwrap_or_default();
        let traceback = traceback.strip_suffix('\n').unwrap_or(traceback).to_string();

        Ok(Self::Failure {
            kind,
            message,
            traceback,
        })
    }

    /// Turn a failure into [`Error::Remote`], keep a success payload.
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Failure {
                kind,
                message,
                traceback,
            } => Err(Error::Remote {
                kind,
                message,
                traceback,
            }),
        }
    }
}

fn first_line(raw: &[u8]) -> &[u8] {
    let end = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
    &raw[..end]
}
