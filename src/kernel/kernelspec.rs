use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{config::KernelSpecConfig, federation::types::FederationResult};

use super::{context::KernelContext, handlers::KernelHandlers};

/// Language reported to the host. Only drives syntax highlighting.
pub const KERNEL_LANGUAGE: &str = "markdown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub name: String,
    pub display_name: String,
    pub language: String,
    pub argv: Vec<String>,
    pub resources: BTreeMap<String, String>,
}

impl KernelSpec {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            language: KERNEL_LANGUAGE.to_string(),
            argv: Vec::new(),
            resources: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &KernelSpecConfig) -> Self {
        Self::new(&config.name, &config.display_name)
    }
}

/// Builds one kernel per host session.
pub type KernelFactory = Arc<dyn Fn(Arc<dyn KernelContext>) -> Arc<dyn KernelHandlers> + Send + Sync>;

/// Host service kernels are registered with.
#[mockall::automock]
pub trait KernelSpecs: Send + Sync {
    fn register(&self, spec: KernelSpec, factory: KernelFactory) -> FederationResult<()>;
}

/// In-process [`KernelSpecs`]: spec name → (spec, factory).
#[derive(Default)]
pub struct KernelSpecRegistry {
    kernels: DashMap<String, (KernelSpec, KernelFactory)>,
}

impl KernelSpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spec(&self, name: &str) -> Option<KernelSpec> {
        self.kernels.get(name).map(|entry| entry.0.clone())
    }

    /// Starts a kernel session of the registered spec `name`.
    pub fn start(&self, name: &str, context: Arc<dyn KernelContext>) -> Option<Arc<dyn KernelHandlers>> {
        let factory = self.kernels.get(name).map(|entry| entry.1.clone())?;
        Some(factory(context))
    }
}

impl KernelSpecs for KernelSpecRegistry {
    fn register(&self, spec: KernelSpec, factory: KernelFactory) -> FederationResult<()> {
        info!("kernel spec registered: {} ({})", spec.name, spec.display_name);
        self.kernels.insert(spec.name.clone(), (spec, factory));
        Ok(())
    }
}
