//! # Settings bridge
//!
//! The host may offer a settings source. When it does, the kernel plugin reads
//! `defaultModel` from it once at activation and again on every change
//! notification. The value ends up in a [`DefaultModelSetting`] shared with
//! every kernel session; sessions read it only when they lazily pick a model.
//!
//! A missing settings source is not an error: the catalog default is used.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::event::event_bus::{Event, EventBus};

/// Settings key holding the default model override.
pub const DEFAULT_MODEL_KEY: &str = "defaultModel";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings for {plugin_id}: {message}")]
    Load { plugin_id: String, message: String },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Host service that hands out per-plugin settings.
#[mockall::automock]
#[async_trait]
pub trait SettingRegistry: Send + Sync {
    async fn load(&self, plugin_id: &str) -> SettingsResult<Arc<dyn PluginSettings>>;
}

/// Settings of one plugin.
#[mockall::automock]
pub trait PluginSettings: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Fires once per change. Receivers re-read the values they care about.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub default_model: Option<String>,
}

impl SettingsSnapshot {
    /// Reads the snapshot. Anything but a non-blank string means "no override".
    pub fn read(settings: &dyn PluginSettings) -> Self {
        let default_model = settings
            .get(DEFAULT_MODEL_KEY)
            .and_then(|value| value.as_str().map(str::trim).map(str::to_string))
            .filter(|model| !model.is_empty());
        Self { default_model }
    }
}

/// Process-wide default model override, last write wins.
#[derive(Debug, Clone)]
pub struct DefaultModelSetting {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl DefaultModelSetting {
    pub fn new(initial: Option<String>) -> Self {
        let (sender, _) = watch::channel(normalize(initial));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    /// Stores `model` and reports whether the value changed.
    pub fn set(&self, model: Option<String>) -> bool {
        let model = normalize(model);
        let previous = self.sender.send_replace(model.clone());
        previous != model
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            default_model: self.get(),
        }
    }
}

impl Default for DefaultModelSetting {
    fn default() -> Self {
        Self::new(None)
    }
}

fn normalize(model: Option<String>) -> Option<String> {
    model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

/// Keeps a [`DefaultModelSetting`] in sync with a host settings source.
///
/// The watcher task stops when the bridge is dropped or the source closes its
/// change channel.
pub struct SettingsBridge {
    setting: DefaultModelSetting,
    watcher: JoinHandle<()>,
}

impl SettingsBridge {
    pub async fn connect(
        registry: &dyn SettingRegistry,
        plugin_id: &str,
        setting: DefaultModelSetting,
        event_bus: Arc<EventBus>,
    ) -> SettingsResult<Self> {
        let settings = registry.load(plugin_id).await?;
        let mut changes = settings.subscribe();
        apply(settings.as_ref(), &setting, &event_bus);
        info!(
            "settings connected for {} (default model: {:?})",
            plugin_id,
            setting.get()
        );

        let watched = setting.clone();
        let watcher = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        apply(settings.as_ref(), &watched, &event_bus);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("settings source closed");
                        break;
                    }
                }
            }
        });

        Ok(Self { setting, watcher })
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.setting.snapshot()
    }
}

impl Drop for SettingsBridge {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn apply(settings: &dyn PluginSettings, setting: &DefaultModelSetting, event_bus: &EventBus) {
    let snapshot = SettingsSnapshot::read(settings);
    if setting.set(snapshot.default_model.clone()) {
        debug!("default model is now {:?}", snapshot.default_model);
        if let Err(e) = event_bus.sync_publish(Event::DefaultModelChanged {
            model: snapshot.default_model,
        }) {
            warn!("failed to publish default model change: {}", e);
        }
    }
}

/// Settings kept in memory. Backs the terminal host and tests.
pub struct InMemorySettings {
    values: std::sync::RwLock<HashMap<String, Value>>,
    changes: broadcast::Sender<()>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            values: std::sync::RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Stores `value` under `key` and notifies subscribers.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        match self.values.write() {
            Ok(mut values) => {
                values.insert(key.into(), value);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key.into(), value);
            }
        }
        // nobody listening is fine
        let _ = self.changes.send(());
    }
}

impl Default for InMemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginSettings for InMemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.read() {
            Ok(values) => values.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

/// [`SettingRegistry`] over [`InMemorySettings`], one entry per plugin id.
#[derive(Default)]
pub struct InMemorySettingRegistry {
    plugins: RwLock<HashMap<String, Arc<InMemorySettings>>>,
}

impl InMemorySettingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for `plugin_id`, created on first use.
    pub async fn plugin(&self, plugin_id: &str) -> Arc<InMemorySettings> {
        let mut plugins = self.plugins.write().await;
        plugins
            .entry(plugin_id.to_string())
            .or_insert_with(|| Arc::new(InMemorySettings::new()))
            .clone()
    }
}

#[async_trait]
impl SettingRegistry for InMemorySettingRegistry {
    async fn load(&self, plugin_id: &str) -> SettingsResult<Arc<dyn PluginSettings>> {
        let settings: Arc<dyn PluginSettings> = self.plugin(plugin_id).await;
        Ok(settings)
    }
}
