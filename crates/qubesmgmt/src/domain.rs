//! Domain (VM) wrappers.

use crate::client::AdminClient;
use crate::collection::{ClassRegistry, CollectionSpec, Wrapper};
use crate::error::Result;
use crate::property::PropertyHolder;
use std::fmt;
use std::sync::RwLock;

/// Property method prefix for domains.
const VM_PROPERTY_PREFIX: &str = "mgmt.vm.property.";

/// Known domain classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainClass {
    /// dom0.
    AdminVM,
    /// Regular application VM.
    AppVM,
    /// Template providing the root filesystem of AppVMs.
    TemplateVM,
    /// VM with its own root filesystem.
    StandaloneVM,
    /// Disposable VM.
    DispVM,
}

impl DomainClass {
    /// Every known class.
    pub const ALL: [DomainClass; 5] = [
        Self::AdminVM,
        Self::AppVM,
        Self::TemplateVM,
        Self::StandaloneVM,
        Self::DispVM,
    ];

    /// Class name as listed by qubesd.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminVM => "AdminVM",
            Self::AppVM => "AppVM",
            Self::TemplateVM => "TemplateVM",
            Self::StandaloneVM => "StandaloneVM",
            Self::DispVM => "DispVM",
        }
    }
}

impl fmt::Display for DomainClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain known to qubesd.
///
/// The name is the live name: [`rename`](Self::rename) updates it, and the
/// owning collection re-keys the wrapper on its next refresh.
pub struct Domain {
    props: PropertyHolder,
    name: RwLock<String>,
    class: DomainClass,
}

impl Domain {
    fn build(class: DomainClass, client: AdminClient, name: String) -> Self {
        Self {
            props: PropertyHolder::new(client, VM_PROPERTY_PREFIX),
            name: RwLock::new(name),
            class,
        }
    }

    fn admin_vm(client: AdminClient, name: String) -> Self {
        Self::build(DomainClass::AdminVM, client, name)
    }

    fn app_vm(client: AdminClient, name: String) -> Self {
        Self::build(DomainClass::AppVM, client, name)
    }

    fn template_vm(client: AdminClient, name: String) -> Self {
        Self::build(DomainClass::TemplateVM, client, name)
    }

    fn standalone_vm(client: AdminClient, name: String) -> Self {
        Self::build(DomainClass::StandaloneVM, client, name)
    }

    fn disp_vm(client: AdminClient, name: String) -> Self {
        Self::build(DomainClass::DispVM, client, name)
    }

    /// Class registry covering every [`DomainClass`].
    pub fn registry() -> ClassRegistry<Self> {
        ClassRegistry::new()
            .register(DomainClass::AdminVM.as_str(), Self::admin_vm)
            .register(DomainClass::AppVM.as_str(), Self::app_vm)
            .register(DomainClass::TemplateVM.as_str(), Self::template_vm)
            .register(DomainClass::StandaloneVM.as_str(), Self::standalone_vm)
            .register(DomainClass::DispVM.as_str(), Self::disp_vm)
    }

    /// Collection description for `mgmt.vm.List`.
    pub fn collection_spec() -> CollectionSpec<Self> {
        CollectionSpec {
            list_method: "mgmt.vm.List",
            fixed_class: None,
            registry: Self::registry(),
        }
    }

    /// Domain class.
    pub fn domain_class(&self) -> DomainClass {
        self.class
    }

    /// Names of this domain's properties.
    pub async fn property_names(&self) -> Result<Vec<String>> {
        self.props.names(&self.name()).await
    }

    /// Raw value description of property `name`.
    pub async fn property(&self, name: &str) -> Result<String> {
        self.props.get(&self.name(), name).await
    }

    /// Set property `name` to `value`.
    pub async fn set_property(&self, name: &str, value: &str) -> Result<()> {
        self.props.set(&self.name(), name, value).await
    }

    /// Rename the domain. The live name changes only once qubesd accepts it.
    pub async fn rename(&self, new_name: &str) -> Result<()> {
        let old = self.name();
        self.props.set(&old, "name", new_name).await?;
        tracing::info!(old = %old, new = %new_name, "Domain renamed");
        *self.name.write().unwrap_or_else(|e| e.into_inner()) = new_name.to_string();
        Ok(())
    }
}

impl Wrapper for Domain {
    fn name(&self) -> String {
        self.name.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn class(&self) -> &str {
        self.class.as_str()
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name())
            .field("class", &self.class)
            .finish()
    }
}
