use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    engine::{ChatMessage, EngineError, ModelEngine, ModelHandle, ProgressHook, ProgressReport},
    event::event_bus::{Event, EventBus},
    settings::DefaultModelSetting,
};

use super::catalog::ModelCatalog;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid model: {0}. Use '%ai model' to list available models.")]
    InvalidModel(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// The live model of a session. Name and handle only exist together.
struct ActiveModel {
    name: String,
    handle: Box<dyn ModelHandle>,
}

/// Owns the model handle of exactly one kernel session.
///
/// The model is created lazily by the first [`send`](Self::send) or eagerly
/// by [`set_model`](Self::set_model). Handles are never shared between
/// sessions.
pub struct ModelSession {
    id: Uuid,
    engine: Arc<dyn ModelEngine>,
    catalog: Arc<ModelCatalog>,
    default_setting: DefaultModelSetting,
    event_bus: Arc<EventBus>,
    active: Option<ActiveModel>,
}

impl ModelSession {
    pub fn new(
        engine: Arc<dyn ModelEngine>,
        catalog: Arc<ModelCatalog>,
        default_setting: DefaultModelSetting,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine,
            catalog,
            default_setting,
            event_bus,
            active: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.name.as_str())
    }

    /// Settings override if one is present, otherwise the catalog default.
    pub fn default_model(&self) -> String {
        self.default_setting
            .get()
            .unwrap_or_else(|| self.catalog.default_model().to_string())
    }

    /// Validates `name` and replaces the current handle with a new one bound
    /// to it. On failure the previous state is kept.
    #[instrument(level = "debug", skip(self), fields(session = %self.id))]
    pub async fn initialize_model(&mut self, name: &str) -> SessionResult<()> {
        if !self.catalog.contains(name) {
            return Err(SessionError::InvalidModel(name.to_string()));
        }

        let handle = self.engine.create(name, self.progress_hook()).await?;
        self.active = Some(ActiveModel {
            name: name.to_string(),
            handle,
        });
        info!("model {} initialized for session {}", name, self.id);

        let _ = self.event_bus.sync_publish(Event::ModelLoaded {
            session_id: self.id,
            model: name.to_string(),
        });
        Ok(())
    }

    /// Switches to `name` right away and describes what happened.
    pub async fn set_model(&mut self, name: &str) -> SessionResult<String> {
        let previous = self.model_name().map(str::to_string);
        let default_model = self.default_model();
        self.initialize_model(name).await?;

        Ok(match previous {
            Some(previous) => format!("Model changed from {} to {}.", previous, name),
            None if name != default_model => {
                format!("Model set to {} (changed from default {}).", name, default_model)
            }
            None => format!("Model set to {}.", name),
        })
    }

    /// Sends `prompt` as the only user message and streams the reply.
    ///
    /// `on_chunk` sees every fragment in arrival order before this returns,
    /// and the returned text is exactly the concatenation of those fragments.
    #[instrument(level = "debug", skip(self, prompt, on_chunk), fields(session = %self.id))]
    pub async fn send<F>(&mut self, prompt: &str, mut on_chunk: F) -> SessionResult<String>
    where
        F: FnMut(&str) + Send,
    {
        if self.active.is_none() {
            let name = self.default_model();
            debug!("lazy initialization with {}", name);
            self.initialize_model(&name).await?;
        }
        let active = match &self.active {
            Some(active) => active,
            None => return Err(SessionError::ModelUnavailable("no model initialized".into())),
        };

        let availability = active.handle.availability().await?;
        debug!("{} availability: {}", active.name, availability);
        if availability.needs_download() {
            active.handle.prepare().await.map_err(|e| {
                SessionError::ModelUnavailable(format!("{}: {}", active.name, e))
            })?;
        } else if availability == crate::engine::Availability::Unavailable {
            return Err(SessionError::ModelUnavailable(format!(
                "{} is not supported by the model runtime",
                active.name
            )));
        }

        let mut stream = active
            .handle
            .stream_chat(vec![ChatMessage::user(prompt)])
            .await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            on_chunk(&chunk);
            reply.push_str(&chunk);
        }
        Ok(reply)
    }

    /// Drops the handle. Returns the name of the released model.
    pub fn release(&mut self) -> Option<String> {
        self.active.take().map(|active| {
            debug!("released {} for session {}", active.name, self.id);
            active.name
        })
    }

    fn progress_hook(&self) -> ProgressHook {
        let event_bus = self.event_bus.clone();
        Arc::new(move |report: ProgressReport| {
            let _ = event_bus.sync_publish(Event::progress(report.progress, report.text));
        })
    }
}
