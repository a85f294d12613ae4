use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{
    capability::{CapabilityToken, HostCapabilities, RequiredCapabilities},
    types::FederationResult,
};

/// The application loading the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostApp {
    pub name: String,
    pub version: String,
}

impl HostApp {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Code run when the host activates a plugin.
#[mockall::automock]
#[async_trait]
pub trait PluginActivator: Send + Sync {
    async fn activate(&self, app: &HostApp, capabilities: &HostCapabilities)
        -> FederationResult<()>;
}

/// What a federated module hands to the host's plugin loader.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub id: String,
    pub auto_start: bool,
    pub requires: RequiredCapabilities,
    pub optional: Vec<CapabilityToken>,
    #[serde(skip)]
    activator: Arc<dyn PluginActivator>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, activator: Arc<dyn PluginActivator>) -> Self {
        Self {
            id: id.into(),
            auto_start: false,
            requires: RequiredCapabilities::default(),
            optional: Vec::new(),
            activator,
        }
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn requires(mut self, capabilities: Vec<CapabilityToken>) -> Self {
        self.requires = RequiredCapabilities::new(capabilities);
        self
    }

    pub fn optional(mut self, capabilities: Vec<CapabilityToken>) -> Self {
        self.optional = capabilities;
        self
    }

    /// Checks the required capabilities, then runs the activator.
    pub async fn activate(
        &self,
        app: &HostApp,
        capabilities: &HostCapabilities,
    ) -> FederationResult<()> {
        self.requires.check(&capabilities.provided())?;
        info!("activating {} in {} {}", self.id, app.name, app.version);
        self.activator.activate(app, capabilities).await
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("auto_start", &self.auto_start)
            .field("requires", &self.requires)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}
