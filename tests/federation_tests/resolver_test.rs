use std::sync::Arc;

use llmkernel::federation::{
    resolve_as, CapabilityProvider, Exports, FederationError, ModuleValue, SharedContext,
    SharedRegistry,
};
use proptest::prelude::*;

fn context_with(registry: SharedRegistry) -> SharedContext {
    let context = SharedContext::default();
    context.set_registry(registry);
    context
}

/// Registers `exports` behind the factory shape selected by `form`.
fn register_in_form(registry: &SharedRegistry, package: &str, exports: Exports, form: u8) {
    registry.register(package, "1.0.0", move || {
        let exports = exports.clone();
        match form {
            0 => ModuleValue::Ready(exports),
            1 => ModuleValue::callable(move || ModuleValue::Ready(exports)),
            2 => ModuleValue::pending(async move { ModuleValue::Ready(exports) }),
            _ => ModuleValue::pending(async move {
                ModuleValue::callable(move || ModuleValue::Ready(exports))
            }),
        }
    });
}

#[tokio::test]
async fn test_absent_package_is_not_found() {
    let registry = SharedRegistry::new();
    registry.provide("present", "1.0.0", 1_u8);
    let context = context_with(registry);

    let result = context.resolve("absent").await;
    assert_eq!(
        result.err(),
        Some(FederationError::PackageNotFound("absent".to_string()))
    );
}

#[tokio::test]
async fn test_empty_package_has_no_version() {
    let registry = SharedRegistry::new();
    registry.declare("@host/empty");
    let context = context_with(registry);

    assert_eq!(
        context.resolve("@host/empty").await.err(),
        Some(FederationError::NoVersionAvailable("@host/empty".to_string()))
    );
}

#[tokio::test]
async fn test_first_registered_version_wins() {
    let registry = SharedRegistry::new();
    registry.provide("pkg", "0.9.0", "old");
    registry.provide("pkg", "3.0.0", "new");
    let context = context_with(registry);

    // enumeration order, not the highest version
    let value = resolve_as::<&str>(&context, "pkg").await.unwrap();
    assert_eq!(*value, "old");
}

#[tokio::test]
async fn test_registry_shared_between_clones() {
    let registry = SharedRegistry::new();
    let context = context_with(registry.clone());
    registry.provide("late", "1.0.0", 5_i64);

    let value = resolve_as::<i64>(&context, "late").await.unwrap();
    assert_eq!(*value, 5);
}

proptest! {
    #[test]
    fn test_every_factory_shape_normalizes_to_same_exports(value in any::<u64>(), form in 0u8..4) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let exports: Exports = Arc::new(value);
        let registry = SharedRegistry::new();
        register_in_form(&registry, "pkg", exports.clone(), form);
        let context = context_with(registry);

        let resolved = runtime.block_on(context.resolve("pkg")).unwrap();
        prop_assert!(Arc::ptr_eq(&resolved, &exports));
        prop_assert_eq!(resolved.downcast_ref::<u64>(), Some(&value));
    }

    #[test]
    fn test_missing_package_never_resolves(name in "[a-z@/._-]{1,24}") {
        prop_assume!(name != "pkg");
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let registry = SharedRegistry::new();
        registry.provide("pkg", "1.0.0", ());
        let context = context_with(registry);

        let result = runtime.block_on(context.resolve(&name));
        prop_assert_eq!(result.err(), Some(FederationError::PackageNotFound(name.clone())));
    }
}
