//! A single qubesd call and its request framing.

use crate::error::{Error, Result};

/// One request to qubesd. Built fresh for every call and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    dest: String,
    method: String,
    arg: Option<String>,
    payload: Option<Vec<u8>>,
}

impl Call {
    /// Build a call, checking the preconditions of the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCall`] when `dest` or `method` is empty, or
    /// when any framed field contains a NUL byte.
    pub fn new(
        dest: &str,
        method: &str,
        arg: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<Self> {
        if dest.is_empty() {
            return Err(Error::InvalidCall("destination is empty".into()));
        }
        if method.is_empty() {
            return Err(Error::InvalidCall("method is empty".into()));
        }
        for field in [Some(dest), Some(method), arg].into_iter().flatten() {
            if field.contains('\0') {
                return Err(Error::InvalidCall(format!(
                    "field contains NUL byte: {field:?}"
                )));
            }
        }

        Ok(Self {
            dest: dest.to_string(),
            method: method.to_string(),
            arg: arg.map(str::to_string),
            payload: payload.map(<[u8]>::to_vec),
        })
    }

    /// Destination domain.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Method name, e.g. `mgmt.vm.List`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Optional argument.
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    /// Optional raw payload.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// qrexec service name: `method` or `method+arg`.
    pub fn service_name(&self) -> String {
        match &self.arg {
            Some(arg) => format!("{}+{}", self.method, arg),
            None => self.method.clone(),
        }
    }

    /// Frame the request for the socket transport.
    ///
    /// Fields are written as `source`, `method`, `dest`, `arg`, each followed
    /// by one NUL byte. A missing `arg` is skipped entirely. The payload, if
    /// any, follows the framing raw.
    pub fn encode(&self, source: &str) -> Vec<u8> {
        let payload_len = self.payload.as_ref().map_or(0, Vec::len);
        let mut buf = Vec::with_capacity(
            source.len() + self.method.len() + self.dest.len() + payload_len + 8,
        );

        let fields = [
            Some(source),
            Some(self.method.as_str()),
            Some(self.dest.as_str()),
            self.arg.as_deref(),
        ];
        for field in fields.into_iter().flatten() {
            buf.extend_from_slice(field.as_bytes());
            buf.push(0);
        }
        if let Some(payload) = &self.payload {
            buf.extend_from_slice(payload);
        }
        buf
    }
}
