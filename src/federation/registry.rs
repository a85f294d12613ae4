//! # Shared registry
//!
//! The host fills a [`SharedRegistry`] before any plugin is loaded:
//! package name → versions (in registration order) → factory.
//!
//! A factory may hand back its exports in three shapes, mirroring what module
//! loaders produce in practice:
//!
//! ```text
//! Ready(exports)                   plain exports
//! Callable(|| ...)                 a function producing the exports
//! Pending(future)                  a future producing one of the above
//! ```
//!
//! [`normalize`] turns any of them into plain exports in at most two steps.

use std::{
    any::Any,
    fmt,
    future::Future,
    sync::Arc,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::debug;

use super::types::{FederationError, FederationResult};

/// Type-erased exports of a package.
pub type Exports = Arc<dyn Any + Send + Sync>;

pub enum ModuleValue {
    Ready(Exports),
    Callable(Box<dyn FnOnce() -> ModuleValue + Send>),
    Pending(BoxFuture<'static, ModuleValue>),
}

impl ModuleValue {
    pub fn ready<T: Any + Send + Sync>(value: T) -> Self {
        ModuleValue::Ready(Arc::new(value))
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: FnOnce() -> ModuleValue + Send + 'static,
    {
        ModuleValue::Callable(Box::new(f))
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = ModuleValue> + Send + 'static,
    {
        ModuleValue::Pending(Box::pin(future))
    }

    pub fn into_exports(self) -> Option<Exports> {
        match self {
            ModuleValue::Ready(exports) => Some(exports),
            _ => None,
        }
    }
}

impl fmt::Debug for ModuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleValue::Ready(_) => write!(f, "ModuleValue::Ready"),
            ModuleValue::Callable(_) => write!(f, "ModuleValue::Callable"),
            ModuleValue::Pending(_) => write!(f, "ModuleValue::Pending"),
        }
    }
}

/// Unwraps a factory result: await if pending, then call if callable.
///
/// Exactly these two steps run, in this order. Plain exports come back
/// untouched, so normalizing twice is the same as normalizing once.
pub async fn normalize(value: ModuleValue) -> ModuleValue {
    let value = match value {
        ModuleValue::Pending(future) => future.await,
        other => other,
    };
    match value {
        ModuleValue::Callable(f) => f(),
        other => other,
    }
}

pub trait ModuleFactory: Send + Sync {
    fn get(&self) -> ModuleValue;
}

impl<F> ModuleFactory for F
where
    F: Fn() -> ModuleValue + Send + Sync,
{
    fn get(&self) -> ModuleValue {
        self()
    }
}

#[derive(Clone)]
struct VersionEntry {
    version: String,
    factory: Arc<dyn ModuleFactory>,
}

/// Package name → ordered versions → factory.
///
/// Cloning is cheap and clones share the same entries.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    packages: Arc<DashMap<String, Vec<VersionEntry>>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `version` of `package`. Re-registering a version replaces its
    /// factory but keeps its position.
    pub fn register<F>(&self, package: &str, version: &str, factory: F)
    where
        F: ModuleFactory + 'static,
    {
        let factory: Arc<dyn ModuleFactory> = Arc::new(factory);
        let mut versions = self.packages.entry(package.to_string()).or_default();
        match versions.iter_mut().find(|entry| entry.version == version) {
            Some(entry) => entry.factory = factory,
            None => versions.push(VersionEntry {
                version: version.to_string(),
                factory,
            }),
        }
        debug!("registered {}@{}", package, version);
    }

    /// Shorthand for a factory that always returns the same plain exports.
    pub fn provide<T>(&self, package: &str, version: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        let exports: Exports = Arc::new(value);
        self.register(package, version, move || ModuleValue::Ready(exports.clone()));
    }

    /// Makes `package` known without any version.
    pub fn declare(&self, package: &str) {
        self.packages.entry(package.to_string()).or_default();
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    /// Versions of `package` in registration order.
    pub fn versions(&self, package: &str) -> Option<Vec<String>> {
        self.packages.get(package).map(|versions| {
            versions
                .iter()
                .map(|entry| entry.version.clone())
                .collect()
        })
    }

    /// The first registered version of `package` and its factory.
    pub fn select(&self, package: &str) -> FederationResult<(String, Arc<dyn ModuleFactory>)> {
        let versions = self
            .packages
            .get(package)
            .ok_or_else(|| FederationError::PackageNotFound(package.to_string()))?;
        let entry = versions
            .first()
            .ok_or_else(|| FederationError::NoVersionAvailable(package.to_string()))?;
        Ok((entry.version.clone(), entry.factory.clone()))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.packages.iter() {
            let versions: Vec<&str> = entry.value().iter().map(|v| v.version.as_str()).collect();
            map.entry(entry.key(), &versions);
        }
        map.finish()
    }
}
