use thiserror::Error;

use super::capability::CapabilityToken;

/// Failures while loading the plugin module.
///
/// None of these are handled inside the crate: they abort the plugin load and
/// surface to whoever called the container.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FederationError {
    #[error("Shared registry unavailable: call init() before resolving {0}")]
    RegistryUnavailable(String),

    #[error("Package not found in shared registry: {0}")]
    PackageNotFound(String),

    #[error("No version available for package: {0}")]
    NoVersionAvailable(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Package {0} did not resolve to plain exports")]
    UnresolvedExports(String),

    #[error("Package {package} does not export {expected}")]
    ExportMismatch { package: String, expected: String },

    #[error("Missing capabilities: {0:?}")]
    MissingCapabilities(Vec<CapabilityToken>),

    #[error("Plugin activation failed: {0}")]
    Activation(String),
}

pub type FederationResult<T> = Result<T, FederationError>;
