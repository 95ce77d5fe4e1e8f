//! Label wrapper.

use crate::client::AdminClient;
use crate::collection::{ClassRegistry, CollectionSpec, Wrapper};

/// Class name of labels.
pub const LABEL_CLASS: &str = "Label";

/// A label known to qubesd.
#[derive(Debug, Clone)]
pub struct Label {
    client: AdminClient,
    name: String,
}

impl Label {
    /// Wrap the label called `name`.
    pub fn new(client: AdminClient, name: String) -> Self {
        Self { client, name }
    }

    /// Client this label issues its calls through.
    pub fn client(&self) -> &AdminClient {
        &self.client
    }

    /// Collection description for `mgmt.label.List`.
    pub fn collection_spec() -> CollectionSpec<Self> {
        CollectionSpec {
            list_method: "mgmt.label.List",
            fixed_class: Some(LABEL_CLASS),
            registry: ClassRegistry::new().register(LABEL_CLASS, Label::new),
        }
    }
}

impl Wrapper for Label {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn class(&self) -> &str {
        LABEL_CLASS
    }
}
