//! # Kernel plugin
//!
//! Body of the federated module. Invoking the module thunk resolves the
//! inference engine from the shared registry and defines one plugin which,
//! once activated, registers the LLM kernel spec and its factory with the
//! host. Every kernel started by that factory gets its own [`ModelSession`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    engine::{ModelEngine, ENGINE_PACKAGE},
    federation::{
        capability::{CapabilityToken, HostCapabilities},
        context::{resolve_as, CapabilityProvider, SharedContext},
        plugin::{HostApp, PluginActivator, PluginDescriptor},
        types::{FederationError, FederationResult},
    },
    kernel::{
        chat_kernel::ChatKernel,
        context::KernelContext,
        handlers::KernelHandlers,
        kernelspec::{KernelFactory, KernelSpec},
    },
    model::{catalog::ModelCatalog, session::ModelSession},
    settings::SettingsBridge,
};

pub const PLUGIN_ID: &str = "llmkernel:plugin";

/// Resolves the packages the plugin needs and defines it.
///
/// Resolution failures are returned as is and abort the module load.
pub async fn define_plugins(
    resolver: &dyn CapabilityProvider,
    context: Arc<SharedContext>,
) -> FederationResult<Vec<PluginDescriptor>> {
    let engine = resolve_as::<Arc<dyn ModelEngine>>(resolver, ENGINE_PACKAGE).await?;
    let engine: Arc<dyn ModelEngine> = (*engine).clone();
    info!("resolved {} ({})", ENGINE_PACKAGE, engine.name());

    let catalog = Arc::new(ModelCatalog::from_config(&context.config().models));
    let activator = KernelPluginActivator {
        engine,
        catalog,
        context,
        settings: Mutex::new(None),
    };

    Ok(vec![PluginDescriptor::new(PLUGIN_ID, Arc::new(activator))
        .auto_start(true)
        .requires(vec![CapabilityToken::KernelSpecs])
        .optional(vec![CapabilityToken::SettingRegistry])])
}

struct KernelPluginActivator {
    engine: Arc<dyn ModelEngine>,
    catalog: Arc<ModelCatalog>,
    context: Arc<SharedContext>,
    settings: Mutex<Option<SettingsBridge>>,
}

impl KernelPluginActivator {
    fn factory(&self) -> KernelFactory {
        let engine = self.engine.clone();
        let catalog = self.catalog.clone();
        let default_model = self.context.default_model().clone();
        let event_bus = self.context.event_bus();
        let list_limit = self.context.config().models.list_limit;

        Arc::new(move |kernel_context: Arc<dyn KernelContext>| {
            let session = ModelSession::new(
                engine.clone(),
                catalog.clone(),
                default_model.clone(),
                event_bus.clone(),
            );
            info!("starting kernel session {}", session.id());
            let kernel: Arc<dyn KernelHandlers> = Arc::new(ChatKernel::new(
                session,
                kernel_context,
                event_bus.clone(),
                list_limit,
            ));
            kernel
        })
    }
}

#[async_trait]
impl PluginActivator for KernelPluginActivator {
    async fn activate(&self, app: &HostApp, capabilities: &HostCapabilities) -> FederationResult<()> {
        let kernel_specs = capabilities.kernel_specs().ok_or_else(|| {
            FederationError::MissingCapabilities(vec![CapabilityToken::KernelSpecs])
        })?;

        // settings are optional; without them the catalog default applies
        if let Some(registry) = capabilities.setting_registry() {
            match SettingsBridge::connect(
                registry.as_ref(),
                PLUGIN_ID,
                self.context.default_model().clone(),
                self.context.event_bus(),
            )
            .await
            {
                Ok(bridge) => *self.settings.lock().await = Some(bridge),
                Err(e) => warn!("settings unavailable, using catalog default: {}", e),
            }
        }

        let spec = KernelSpec::from_config(&self.context.config().kernel);
        info!("registering kernel {} with {}", spec.name, app.name);
        kernel_specs.register(spec, self.factory())
    }
}
