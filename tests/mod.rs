mod federation_tests;
mod kernel_tests;

use std::sync::Arc;

use lazy_static::lazy_static;
use llmkernel::{
    config::KernelConfig,
    engine::{scripted::ScriptedEngine, ModelEngine, ENGINE_PACKAGE},
    extension::PLUGIN_ID,
    federation::{
        FederatedModule, FederationContainer, HostApp, HostCapabilities, SharedContext, SharedRegistry,
        INDEX_MODULE,
    },
    kernel::{ChannelContext, KernelHandlers, KernelOutput, KernelSpecRegistry},
    settings::{InMemorySettingRegistry, DEFAULT_MODEL_KEY},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    // tracing_subscriberの初期化
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

const RUN_API_TESTS: &str = "RUN_API_TESTS";

lazy_static! {
    pub static ref EXTERNAL_API_TESTS_ENABLED: bool = {
        match std::env::var(RUN_API_TESTS) {
            Ok(_) => true,
            Err(_) => {
                println!("Skipping API tests: RUN_API_TESTS not set");
                false
            }
        }
    };
}

pub fn should_run_external_api_tests() -> bool {
    *EXTERNAL_API_TESTS_ENABLED
}

/// Catalog `models` with `default_model`, everything else default.
pub fn config_with_catalog(models: &[&str], default_model: &str) -> KernelConfig {
    let mut config = KernelConfig::default();
    config.models.catalog = Some(models.iter().map(|m| m.to_string()).collect());
    config.models.default_model = Some(default_model.to_string());
    config
}

/// Registry with `engine` published as the engine package.
pub fn registry_with(engine: Arc<dyn ModelEngine>) -> SharedRegistry {
    let registry = SharedRegistry::new();
    registry.provide(ENGINE_PACKAGE, "1.0.0", engine);
    registry
}

pub struct LoadedKernel {
    pub kernel: Arc<dyn KernelHandlers>,
    pub context: Arc<ChannelContext>,
    pub outputs: UnboundedReceiver<KernelOutput>,
    pub shared: Arc<SharedContext>,
    pub settings: Arc<InMemorySettingRegistry>,
    /// Keeps the activated plugin (and its settings watcher) alive
    pub module: FederatedModule,
}

impl LoadedKernel {
    /// Stream texts emitted so far, in order.
    pub fn drain_stream(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(output) = self.outputs.try_recv() {
            if let KernelOutput::Stream { content, .. } = output {
                texts.push(content.text);
            }
        }
        texts
    }
}

/// Loads the plugin the way a host does and starts one kernel session.
pub async fn load_kernel(
    engine: ScriptedEngine,
    config: KernelConfig,
    default_override: Option<&str>,
) -> LoadedKernel {
    let shared = Arc::new(SharedContext::new(config));
    let container = FederationContainer::new(shared.clone());
    container.init(registry_with(Arc::new(engine)));
    let module = container.get(INDEX_MODULE).unwrap().invoke().await.unwrap();

    let kernel_specs = Arc::new(KernelSpecRegistry::new());
    let settings = Arc::new(InMemorySettingRegistry::new());
    if let Some(model) = default_override {
        settings
            .plugin(PLUGIN_ID)
            .await
            .set(DEFAULT_MODEL_KEY, serde_json::json!(model));
    }
    let capabilities = HostCapabilities::new()
        .with_kernel_specs(kernel_specs.clone())
        .with_setting_registry(settings.clone());
    for plugin in &module.default {
        plugin
            .activate(&HostApp::new("test-host", "0.0.0"), &capabilities)
            .await
            .unwrap();
    }

    let (context, outputs) = ChannelContext::new();
    let context = Arc::new(context);
    let name = shared.config().kernel.name.clone();
    let kernel = kernel_specs.start(&name, context.clone()).unwrap();
    LoadedKernel {
        kernel,
        context,
        outputs,
        shared,
        settings,
        module,
    }
}
