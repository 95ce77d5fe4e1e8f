//! Property get/set facade.
//!
//! Stateless: every access is one call. Method names are formed from a
//! prefix, e.g. `mgmt.vm.property.` + `Get`.

use crate::client::AdminClient;
use crate::error::{Error, Result};

/// Property access for one family of objects.
#[derive(Debug, Clone)]
pub struct PropertyHolder {
    client: AdminClient,
    prefix: &'static str,
}

impl PropertyHolder {
    /// Properties reached through methods starting with `prefix`.
    pub fn new(client: AdminClient, prefix: &'static str) -> Self {
        Self { client, prefix }
    }

    /// Method prefix, e.g. `mgmt.property.`.
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Names of the properties of `dest`.
    pub async fn names(&self, dest: &str) -> Result<Vec<String>> {
        let payload = self.call(dest, "List", None, None).await?;
        Ok(text(&payload)?
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Raw value description of property `name` of `dest`.
    pub async fn get(&self, dest: &str, name: &str) -> Result<String> {
        let payload = self.call(dest, "Get", Some(name), None).await?;
        text(&payload).map(str::to_string)
    }

    /// Set property `name` of `dest` to `value`.
    pub async fn set(&self, dest: &str, name: &str, value: &str) -> Result<()> {
        self.call(dest, "Set", Some(name), Some(value.as_bytes()))
            .await
            .map(|_| ())
    }

    async fn call(
        &self,
        dest: &str,
        op: &str,
        arg: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<bytes::Bytes> {
        let method = format!("{}{}", self.prefix, op);
        self.client.call(dest, &method, arg, payload).await
    }
}

fn text(payload: &[u8]) -> Result<&str> {
    std::str::from_utf8(payload)
        .map_err(|e| Error::Protocol(format!("property payload is not UTF-8: {e}")))
}
