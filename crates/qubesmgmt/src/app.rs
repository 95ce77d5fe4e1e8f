//! Application handle.

use crate::client::AdminClient;
use crate::collection::Collection;
use crate::config::{ClientConfig, ConnectionType};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::label::Label;
use crate::pool::{pool_add_payload, Pool, PoolDrivers};
use crate::property::PropertyHolder;
use tokio::sync::OnceCell;

/// Destination of every application-level call.
const ADMIN_DEST: &str = "dom0";

/// Entry point: domains, labels, storage pools and global properties.
///
/// The pool-driver list is fetched once on first use and kept for the
/// lifetime of the handle. Build a new handle to see driver changes.
pub struct Qubes {
    client: AdminClient,
    /// Domains (VMs).
    pub domains: Collection<Domain>,
    /// Labels.
    pub labels: Collection<Label>,
    /// Storage pools.
    pub pools: Collection<Pool>,
    props: PropertyHolder,
    pool_drivers: OnceCell<PoolDrivers>,
}

impl Qubes {
    /// Handle using the transport described by `config`.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(AdminClient::from_config(config))
    }

    /// Handle around an existing client.
    pub fn with_client(client: AdminClient) -> Self {
        Self {
            domains: Collection::new(client.clone(), Domain::collection_spec()),
            labels: Collection::new(client.clone(), Label::collection_spec()),
            pools: Collection::new(client.clone(), Pool::collection_spec()),
            props: PropertyHolder::new(client.clone(), "mgmt.property."),
            pool_drivers: OnceCell::new(),
            client,
        }
    }

    /// Underlying client.
    pub fn client(&self) -> &AdminClient {
        &self.client
    }

    /// Either `socket` or `qrexec`.
    pub fn connection_type(&self) -> ConnectionType {
        self.client.connection_type()
    }

    /// Names of global properties.
    pub async fn property_names(&self) -> Result<Vec<String>> {
        self.props.names(ADMIN_DEST).await
    }

    /// Raw value description of global property `name`.
    pub async fn property(&self, name: &str) -> Result<String> {
        self.props.get(ADMIN_DEST, name).await
    }

    /// Set global property `name` to `value`.
    pub async fn set_property(&self, name: &str, value: &str) -> Result<()> {
        self.props.set(ADMIN_DEST, name, value).await
    }

    async fn drivers(&self) -> Result<&PoolDrivers> {
        self.pool_drivers
            .get_or_try_init(|| async {
                let payload = self
                    .client
                    .call(ADMIN_DEST, "mgmt.pool.ListDrivers", None, None)
                    .await?;
                let drivers = PoolDrivers::parse(&payload)?;
                tracing::debug!(drivers = ?drivers.names(), "Pool drivers loaded");
                Ok::<_, Error>(drivers)
            })
            .await
    }

    /// Available storage pool drivers.
    pub async fn pool_drivers(&self) -> Result<Vec<String>> {
        Ok(self.drivers().await?.names())
    }

    /// Parameters accepted by `driver` when creating a pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for an unknown driver.
    pub async fn pool_driver_parameters(&self, driver: &str) -> Result<Vec<String>> {
        self.drivers().await?.parameters(driver)
    }

    /// Create storage pool `name` using `driver`, configured by `options`.
    pub async fn add_pool<I, K, V>(&self, name: &str, driver: &str, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let payload = pool_add_payload(name, options);
        tracing::info!(pool = %name, driver = %driver, "Adding storage pool");
        self.client
            .call(ADMIN_DEST, "mgmt.pool.Add", Some(driver), Some(&payload))
            .await
            .map(|_| ())
    }

    /// Remove storage pool `name`.
    pub async fn remove_pool(&self, name: &str) -> Result<()> {
        tracing::info!(pool = %name, "Removing storage pool");
        self.client
            .call(ADMIN_DEST, "mgmt.pool.Remove", Some(name), None)
            .await
            .map(|_| ())
    }
}
