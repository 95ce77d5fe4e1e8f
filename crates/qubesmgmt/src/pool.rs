//! Storage pool wrapper and pool-driver helpers.

use crate::client::AdminClient;
use crate::collection::{ClassRegistry, CollectionSpec, Wrapper};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Class name of storage pools.
pub const POOL_CLASS: &str = "Pool";

/// A storage pool known to qubesd.
#[derive(Debug, Clone)]
pub struct Pool {
    client: AdminClient,
    name: String,
}

impl Pool {
    /// Wrap the pool called `name`.
    pub fn new(client: AdminClient, name: String) -> Self {
        Self { client, name }
    }

    /// Client this pool issues its calls through.
    pub fn client(&self) -> &AdminClient {
        &self.client
    }

    /// Collection description for `mgmt.pool.List`.
    pub fn collection_spec() -> CollectionSpec<Self> {
        CollectionSpec {
            list_method: "mgmt.pool.List",
            fixed_class: Some(POOL_CLASS),
            registry: ClassRegistry::new().register(POOL_CLASS, Pool::new),
        }
    }
}

impl Wrapper for Pool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn class(&self) -> &str {
        POOL_CLASS
    }
}

/// Storage drivers and the ordered parameter names each one accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDrivers {
    drivers: BTreeMap<String, Vec<String>>,
}

impl PoolDrivers {
    /// Parse a `mgmt.pool.ListDrivers` payload: one driver per line, the
    /// driver name followed by its parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not UTF-8, does not
    /// end with a newline, or lists a driver twice.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| Error::Protocol(format!("driver list is not UTF-8: {e}")))?;
        if !text.is_empty() && !text.ends_with('\n') {
            return Err(Error::Protocol("driver list not terminated by newline".into()));
        }

        let mut drivers = BTreeMap::new();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let params: Vec<String> = tokens.map(str::to_string).collect();
            if drivers.insert(name.to_string(), params).is_some() {
                return Err(Error::Protocol(format!("duplicate driver {name:?}")));
            }
        }
        Ok(Self { drivers })
    }

    /// Driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    /// Parameters accepted by `driver`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown driver.
    pub fn parameters(&self, driver: &str) -> Result<Vec<String>> {
        self.drivers
            .get(driver)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pool driver {driver}")))
    }
}

/// Payload of `mgmt.pool.Add`: `name=<name>\n` followed by one
/// `<key>=<value>\n` line per option, keys sorted.
pub fn pool_add_payload<I, K, V>(name: &str, options: I) -> Vec<u8>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let options: BTreeMap<String, String> = options
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    let mut payload = format!("name={name}\n");
    for (key, value) in &options {
        payload.push_str(key);
        payload.push('=');
        payload.push_str(value);
        payload.push('\n');
    }
    payload.into_bytes()
}
