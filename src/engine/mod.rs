//! # Inference engines
//!
//! The kernel never talks to a model runtime directly. It goes through two
//! narrow traits:
//!
//! - [`ModelEngine`]: the runtime itself, shared by every kernel session and
//!   handed to the plugin through the shared registry
//! - [`ModelHandle`]: one model bound to one session, able to report
//!   availability, download its assets and stream a chat completion
//!
//! Two implementations ship with the crate:
//!
//! - [`openai_compat::OpenAICompatEngine`] for a locally running
//!   OpenAI-compatible server (Ollama, llama.cpp server, ...)
//! - [`scripted::ScriptedEngine`], a deterministic in-process engine

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod openai_compat;
pub mod scripted;

/// Package name under which hosts share a [`ModelEngine`] in the registry.
pub const ENGINE_PACKAGE: &str = "@llmkernel/engine";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Availability {
    /// The runtime cannot run this model here (no server, no acceleration, ...)
    Unavailable,
    /// The model exists but its assets have to be fetched first
    Downloadable,
    /// Assets are being fetched by somebody else
    Downloading,
    Available,
}

impl Availability {
    pub fn needs_download(&self) -> bool {
        matches!(self, Availability::Downloadable | Availability::Downloading)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Progress as reported by the runtime, before it is republished as a
/// [`crate::event::event_bus::ProgressEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub progress: f32,
    pub text: String,
}

impl ProgressReport {
    pub fn new(progress: f32, text: impl Into<String>) -> Self {
        Self {
            progress,
            text: text.into(),
        }
    }
}

pub type ProgressHook = Arc<dyn Fn(ProgressReport) + Send + Sync>;

pub type ChunkStream = Pin<Box<dyn Stream<Item = EngineResult<String>> + Send>>;

#[mockall::automock]
#[async_trait]
pub trait ModelEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Creates a handle bound to `model`. `progress` is kept by the handle and
    /// called whenever the runtime reports download or setup progress.
    async fn create(&self, model: &str, progress: ProgressHook)
        -> EngineResult<Box<dyn ModelHandle>>;
}

#[mockall::automock]
#[async_trait]
pub trait ModelHandle: Send + Sync {
    fn model(&self) -> &str;

    async fn availability(&self) -> EngineResult<Availability>;

    /// Downloads missing assets and creates the runtime session. Blocks until done.
    async fn prepare(&self) -> EngineResult<()>;

    /// Starts a streaming completion. Fragments arrive in generation order.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> EngineResult<ChunkStream>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
