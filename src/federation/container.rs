use std::{fmt, sync::Arc};

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{
    context::{CapabilityProvider, SharedContext},
    plugin::PluginDescriptor,
    registry::SharedRegistry,
    types::{FederationError, FederationResult},
};

pub const INDEX_MODULE: &str = "./index";
pub const EXTENSION_MODULE: &str = "./extension";

/// Entry point a host uses to load the kernel plugin at runtime.
///
/// ```text
/// container.init(registry)          store the shared registry (last call wins)
/// container.get("./index")?         a thunk, nothing resolved yet
/// thunk.invoke().await?             resolve packages, define the plugin
///   -> { __esModule: true, default: [PluginDescriptor] }
/// ```
pub struct FederationContainer {
    context: Arc<SharedContext>,
    resolver: Arc<dyn CapabilityProvider>,
}

impl FederationContainer {
    /// A container resolving packages through the registry in `context`.
    pub fn new(context: Arc<SharedContext>) -> Self {
        let resolver: Arc<dyn CapabilityProvider> = context.clone();
        Self { context, resolver }
    }

    /// A container resolving packages through `resolver` instead.
    pub fn with_resolver(context: Arc<SharedContext>, resolver: Arc<dyn CapabilityProvider>) -> Self {
        Self { context, resolver }
    }

    pub fn init(&self, registry: SharedRegistry) {
        info!("federation container initialized");
        self.context.set_registry(registry);
    }

    pub fn get(&self, module_id: &str) -> FederationResult<ModuleThunk> {
        match module_id {
            INDEX_MODULE | EXTENSION_MODULE => Ok(ModuleThunk {
                module_id: module_id.to_string(),
                context: self.context.clone(),
                resolver: self.resolver.clone(),
            }),
            other => Err(FederationError::UnknownModule(other.to_string())),
        }
    }

    pub fn context(&self) -> &Arc<SharedContext> {
        &self.context
    }
}

/// Deferred module body returned by [`FederationContainer::get`].
pub struct ModuleThunk {
    module_id: String,
    context: Arc<SharedContext>,
    resolver: Arc<dyn CapabilityProvider>,
}

impl ModuleThunk {
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    #[instrument(level = "debug", skip(self), fields(module = %self.module_id))]
    pub async fn invoke(self) -> FederationResult<FederatedModule> {
        let plugins = crate::extension::define_plugins(self.resolver.as_ref(), self.context).await?;
        debug!("{} defined {} plugin(s)", self.module_id, plugins.len());
        Ok(FederatedModule::new(plugins))
    }
}

impl fmt::Debug for ModuleThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleThunk")
            .field("module_id", &self.module_id)
            .finish_non_exhaustive()
    }
}

/// Module namespace in the shape plugin loaders expect.
#[derive(Debug, Clone, Serialize)]
pub struct FederatedModule {
    #[serde(rename = "__esModule")]
    pub es_module: bool,
    pub default: Vec<PluginDescriptor>,
}

impl FederatedModule {
    pub fn new(plugins: Vec<PluginDescriptor>) -> Self {
        Self {
            es_module: true,
            default: plugins,
        }
    }
}
