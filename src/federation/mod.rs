//! # Federation
//!
//! Runtime loading of the kernel plugin without static linking.
//!
//! ```text
//! host ──init(registry)──▶ FederationContainer ──▶ SharedContext
//!      ──get("./index")──▶ ModuleThunk
//!      ──invoke()────────▶ resolve(@llmkernel/engine) via CapabilityProvider
//!                          └▶ FederatedModule { __esModule, default: [PluginDescriptor] }
//!      ──activate(app, capabilities)──▶ kernel spec + factory registered
//! ```

pub mod capability;
pub mod container;
pub mod context;
pub mod plugin;
pub mod registry;
pub mod types;

pub use capability::{CapabilityToken, HostCapabilities, RequiredCapabilities};
pub use container::{FederatedModule, FederationContainer, ModuleThunk, EXTENSION_MODULE, INDEX_MODULE};
pub use context::{resolve_as, CapabilityProvider, SharedContext};
pub use plugin::{HostApp, PluginActivator, PluginDescriptor};
pub use registry::{normalize, Exports, ModuleFactory, ModuleValue, SharedRegistry};
pub use types::{FederationError, FederationResult};
