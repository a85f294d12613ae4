use std::{
    any::{type_name, Any},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{config::KernelConfig, event::event_bus::EventBus, settings::DefaultModelSetting};

use super::{
    registry::{normalize, Exports, ModuleValue, SharedRegistry},
    types::{FederationError, FederationResult},
};

/// Resolves a package name to its exports.
///
/// The container only ever talks to this trait, so a test can stand in for
/// the whole host with a stub.
#[mockall::automock]
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn resolve(&self, package: &str) -> FederationResult<Exports>;
}

/// Resolves `package` and downcasts its exports to `T`.
pub async fn resolve_as<T>(provider: &dyn CapabilityProvider, package: &str) -> FederationResult<Arc<T>>
where
    T: Any + Send + Sync,
{
    let exports = provider.resolve(package).await?;
    exports
        .downcast::<T>()
        .map_err(|_| FederationError::ExportMismatch {
            package: package.to_string(),
            expected: type_name::<T>().to_string(),
        })
}

/// State shared by the container, the plugin and every kernel it creates.
///
/// Holds the shared registry (set by `init`, last write wins), an optional
/// fallback registry, the default-model override and the event bus.
pub struct SharedContext {
    registry: RwLock<Option<SharedRegistry>>,
    fallback: Option<SharedRegistry>,
    default_model: DefaultModelSetting,
    event_bus: Arc<EventBus>,
    config: KernelConfig,
}

impl SharedContext {
    pub fn new(config: KernelConfig) -> Self {
        let default_model = DefaultModelSetting::new(None);
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry: RwLock::new(None),
            fallback: None,
            default_model,
            event_bus,
            config,
        }
    }

    /// Registry consulted when `init` was never called.
    pub fn with_fallback(mut self, registry: SharedRegistry) -> Self {
        self.fallback = Some(registry);
        self
    }

    pub fn set_registry(&self, registry: SharedRegistry) {
        debug!("shared registry set: {:?}", registry);
        match self.registry.write() {
            Ok(mut slot) => *slot = Some(registry),
            Err(poisoned) => *poisoned.into_inner() = Some(registry),
        }
    }

    /// The registry set by `init`, else the fallback.
    pub fn registry(&self) -> Option<SharedRegistry> {
        let current = match self.registry.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        current.or_else(|| self.fallback.clone())
    }

    pub fn default_model(&self) -> &DefaultModelSetting {
        &self.default_model
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

#[async_trait]
impl CapabilityProvider for SharedContext {
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, package: &str) -> FederationResult<Exports> {
        let registry = self
            .registry()
            .ok_or_else(|| FederationError::RegistryUnavailable(package.to_string()))?;
        let (version, factory) = registry.select(package)?;
        debug!("resolving {}@{}", package, version);

        match normalize(factory.get()).await {
            ModuleValue::Ready(exports) => Ok(exports),
            other => {
                debug!("{} left as {:?} after normalization", package, other);
                Err(FederationError::UnresolvedExports(package.to_string()))
            }
        }
    }
}
