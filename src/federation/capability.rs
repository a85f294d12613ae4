use std::{any::Any, collections::HashMap, collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{kernel::kernelspec::KernelSpecs, settings::SettingRegistry};

use super::{
    registry::Exports,
    types::{FederationError, FederationResult},
};

/// Host services a plugin can ask for at activation.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum CapabilityToken {
    /// Registration of kernel specs and factories
    KernelSpecs,
    /// Per-plugin settings source
    SettingRegistry,
    /// Anything else the host wants to hand out
    Custom(String),
}

impl fmt::Display for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityToken::KernelSpecs => write!(f, "kernel-specs"),
            CapabilityToken::SettingRegistry => write!(f, "setting-registry"),
            CapabilityToken::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Capabilities a plugin cannot be activated without.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequiredCapabilities {
    capabilities: HashSet<CapabilityToken>,
}

impl RequiredCapabilities {
    pub fn new(capabilities: Vec<CapabilityToken>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn supported(&self, provided: &HashSet<CapabilityToken>) -> bool {
        self.capabilities.is_subset(provided)
    }

    /// Fails with the (sorted) list of capabilities missing from `provided`.
    pub fn check(&self, provided: &HashSet<CapabilityToken>) -> FederationResult<()> {
        if self.supported(provided) {
            return Ok(());
        }
        let mut missing: Vec<CapabilityToken> = self
            .capabilities
            .difference(provided)
            .cloned()
            .collect();
        missing.sort();
        Err(FederationError::MissingCapabilities(missing))
    }
}

/// The capabilities a host passes to a plugin's activator.
#[derive(Clone, Default)]
pub struct HostCapabilities {
    kernel_specs: Option<Arc<dyn KernelSpecs>>,
    setting_registry: Option<Arc<dyn SettingRegistry>>,
    custom: HashMap<String, Exports>,
}

impl HostCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel_specs(mut self, kernel_specs: Arc<dyn KernelSpecs>) -> Self {
        self.kernel_specs = Some(kernel_specs);
        self
    }

    pub fn with_setting_registry(mut self, registry: Arc<dyn SettingRegistry>) -> Self {
        self.setting_registry = Some(registry);
        self
    }

    pub fn with_custom<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.custom.insert(name.into(), Arc::new(value));
        self
    }

    pub fn kernel_specs(&self) -> Option<Arc<dyn KernelSpecs>> {
        self.kernel_specs.clone()
    }

    pub fn setting_registry(&self) -> Option<Arc<dyn SettingRegistry>> {
        self.setting_registry.clone()
    }

    pub fn custom(&self, name: &str) -> Option<Exports> {
        self.custom.get(name).cloned()
    }

    pub fn provided(&self) -> HashSet<CapabilityToken> {
        let mut provided: HashSet<CapabilityToken> = self
            .custom
            .keys()
            .map(|name| CapabilityToken::Custom(name.clone()))
            .collect();
        if self.kernel_specs.is_some() {
            provided.insert(CapabilityToken::KernelSpecs);
        }
        if self.setting_registry.is_some() {
            provided.insert(CapabilityToken::SettingRegistry);
        }
        provided
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut provided: Vec<CapabilityToken> = self.provided().into_iter().collect();
        provided.sort();
        f.debug_struct("HostCapabilities")
            .field("provided", &provided)
            .finish()
    }
}
