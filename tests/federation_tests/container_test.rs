use std::sync::Arc;

use llmkernel::{
    config::KernelConfig,
    engine::{scripted::ScriptedEngine, ModelEngine, ENGINE_PACKAGE},
    extension::PLUGIN_ID,
    federation::{
        context::MockCapabilityProvider, CapabilityToken, Exports, FederationContainer,
        FederationError, HostApp, HostCapabilities, SharedContext, SharedRegistry,
        EXTENSION_MODULE, INDEX_MODULE,
    },
    kernel::{
        kernelspec::MockKernelSpecs, protocol::ExecuteRequest, ChannelContext, KernelSpecRegistry,
    },
    settings::{MockSettingRegistry, SettingsError},
};
use proptest::prelude::*;

use crate::{config_with_catalog, registry_with};

fn container() -> FederationContainer {
    FederationContainer::new(Arc::new(SharedContext::new(KernelConfig::default())))
}

#[tokio::test]
async fn test_both_aliases_yield_the_plugin() {
    for module_id in [INDEX_MODULE, EXTENSION_MODULE] {
        let container = container();
        container.init(registry_with(Arc::new(ScriptedEngine::echo())));

        let module = container.get(module_id).unwrap().invoke().await.unwrap();
        assert!(module.es_module);
        assert!(!module.default.is_empty());
        assert_eq!(module.default[0].id, PLUGIN_ID);
        assert!(module.default[0].auto_start);

        let json = serde_json::to_value(&module).unwrap();
        assert_eq!(json["__esModule"], true);
        assert_eq!(json["default"][0]["id"], PLUGIN_ID);
    }
}

#[tokio::test]
async fn test_missing_engine_aborts_load() {
    let container = container();
    let registry = SharedRegistry::new();
    registry.provide("@host/other", "1.0.0", ());
    container.init(registry);

    let result = container.get(INDEX_MODULE).unwrap().invoke().await;
    assert_eq!(
        result.err().map(|e| e.to_string()),
        Some(FederationError::PackageNotFound(ENGINE_PACKAGE.to_string()).to_string())
    );
}

#[tokio::test]
async fn test_wrong_engine_type_is_export_mismatch() {
    let container = container();
    let registry = SharedRegistry::new();
    registry.provide(ENGINE_PACKAGE, "1.0.0", "not an engine");
    container.init(registry);

    let result = container.get(INDEX_MODULE).unwrap().invoke().await;
    assert!(matches!(
        result,
        Err(FederationError::ExportMismatch { ref package, .. }) if package == ENGINE_PACKAGE
    ));
}

#[tokio::test]
async fn test_last_init_wins() {
    let first = ScriptedEngine::new(vec!["first"]);
    let second = ScriptedEngine::new(vec!["second"]);
    let container = FederationContainer::new(Arc::new(SharedContext::new(config_with_catalog(
        &["A"],
        "A",
    ))));
    container.init(registry_with(Arc::new(first.clone())));
    container.init(registry_with(Arc::new(second.clone())));

    let module = container.get(INDEX_MODULE).unwrap().invoke().await.unwrap();
    let specs = Arc::new(KernelSpecRegistry::new());
    module.default[0]
        .activate(
            &HostApp::new("host", "1"),
            &HostCapabilities::new().with_kernel_specs(specs.clone()),
        )
        .await
        .unwrap();

    let (context, _outputs) = ChannelContext::new();
    let kernel = specs.start("llm", Arc::new(context)).unwrap();
    kernel
        .execute_request(ExecuteRequest::new("hi"))
        .await;
    assert!(first.created_models().is_empty());
    assert_eq!(second.created_models(), vec!["A"]);
}

#[tokio::test]
async fn test_stub_resolver_replaces_host() {
    let engine: Arc<dyn ModelEngine> = Arc::new(ScriptedEngine::echo());
    let mut resolver = MockCapabilityProvider::new();
    resolver
        .expect_resolve()
        .withf(|package| package == ENGINE_PACKAGE)
        .times(1)
        .returning(move |_| {
            let exports: Exports = Arc::new(engine.clone());
            Ok(exports)
        });

    // no init(): the stub stands in for the registry
    let container = FederationContainer::with_resolver(
        Arc::new(SharedContext::default()),
        Arc::new(resolver),
    );
    let module = container.get(EXTENSION_MODULE).unwrap().invoke().await.unwrap();
    assert_eq!(module.default.len(), 1);
}

#[tokio::test]
async fn test_activation_requires_kernel_specs() {
    let container = container();
    container.init(registry_with(Arc::new(ScriptedEngine::echo())));
    let module = container.get(INDEX_MODULE).unwrap().invoke().await.unwrap();

    let result = module.default[0]
        .activate(&HostApp::new("host", "1"), &HostCapabilities::new())
        .await;
    assert_eq!(
        result,
        Err(FederationError::MissingCapabilities(vec![
            CapabilityToken::KernelSpecs
        ]))
    );
}

#[tokio::test]
async fn test_activation_registers_kernel_spec() {
    let container = container();
    container.init(registry_with(Arc::new(ScriptedEngine::echo())));
    let module = container.get(INDEX_MODULE).unwrap().invoke().await.unwrap();

    let mut specs = MockKernelSpecs::new();
    specs
        .expect_register()
        .withf(|spec, _| spec.name == "llm" && spec.language == "markdown")
        .times(1)
        .returning(|_, _| Ok(()));

    module.default[0]
        .activate(
            &HostApp::new("host", "1"),
            &HostCapabilities::new().with_kernel_specs(Arc::new(specs)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_settings_load_failure_falls_back_to_catalog_default() {
    let engine = ScriptedEngine::new(vec!["ok"]);
    let context = Arc::new(SharedContext::new(config_with_catalog(&["A", "B"], "B")));
    let container = FederationContainer::new(context.clone());
    container.init(registry_with(Arc::new(engine.clone())));
    let module = container.get(INDEX_MODULE).unwrap().invoke().await.unwrap();

    let mut settings = MockSettingRegistry::new();
    settings
        .expect_load()
        .withf(|plugin_id| plugin_id == PLUGIN_ID)
        .times(1)
        .returning(|plugin_id| {
            Err(SettingsError::Load {
                plugin_id: plugin_id.to_string(),
                message: "settings storage is read-only".to_string(),
            })
        });
    let specs = Arc::new(KernelSpecRegistry::new());

    // activation still succeeds without settings
    module.default[0]
        .activate(
            &HostApp::new("host", "1"),
            &HostCapabilities::new()
                .with_kernel_specs(specs.clone())
                .with_setting_registry(Arc::new(settings)),
        )
        .await
        .unwrap();
    assert_eq!(context.default_model().get(), None);

    let (kernel_context, _outputs) = ChannelContext::new();
    let kernel = specs.start("llm", Arc::new(kernel_context)).unwrap();
    kernel.execute_request(ExecuteRequest::new("hello")).await;
    assert_eq!(engine.created_models(), vec!["B"]);
}

proptest! {
    #[test]
    fn test_unknown_module_ids_fail(module_id in "\\PC{0,16}") {
        prop_assume!(module_id != INDEX_MODULE && module_id != EXTENSION_MODULE);
        let result = container().get(&module_id);
        prop_assert!(
            matches!(result, Err(FederationError::UnknownModule(ref id)) if *id == module_id)
        );
    }
}
