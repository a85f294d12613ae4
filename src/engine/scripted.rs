//! Deterministic in-process engine.
//!
//! `ScriptedEngine` answers every prompt with a fixed list of fragments (or
//! echoes the prompt back word by word) and can be told to report a given
//! availability, to walk through fake download steps, or to fail at a chosen
//! point. It records which models were created and which conversations were
//! sent so callers can assert on them.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tracing::debug;

use super::{
    Availability, ChatMessage, ChunkStream, EngineError, EngineResult, ModelEngine, ModelHandle,
    ProgressHook, ProgressReport,
};

#[derive(Debug, Clone, Default)]
enum Reply {
    #[default]
    Echo,
    Fragments(Vec<String>),
}

#[derive(Debug, Clone, Default)]
struct Script {
    reply: Reply,
    availability: Option<Availability>,
    download_steps: usize,
    create_failure: Option<String>,
    download_failure: Option<String>,
    stream_failure: Option<(usize, String)>,
}

#[derive(Debug, Default)]
struct Records {
    created: Mutex<Vec<String>>,
    conversations: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

#[derive(Clone)]
pub struct ScriptedEngine {
    name: String,
    script: Script,
    records: Arc<Records>,
}

impl ScriptedEngine {
    /// Replies with `fragments`, in order, to every prompt.
    pub fn new<S: Into<String>>(fragments: Vec<S>) -> Self {
        Self::with_reply(Reply::Fragments(
            fragments.into_iter().map(Into::into).collect(),
        ))
    }

    /// Streams the prompt back split after each whitespace character.
    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            name: "scripted".to_string(),
            script: Script {
                reply,
                ..Default::default()
            },
            records: Arc::new(Records::default()),
        }
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.script.availability = Some(availability);
        self
    }

    pub fn with_download_steps(mut self, steps: usize) -> Self {
        self.script.download_steps = steps;
        self
    }

    pub fn with_create_failure(mut self, message: impl Into<String>) -> Self {
        self.script.create_failure = Some(message.into());
        self
    }

    pub fn with_download_failure(mut self, message: impl Into<String>) -> Self {
        self.script.download_failure = Some(message.into());
        self
    }

    /// Fails the stream after `after` fragments were delivered.
    pub fn with_stream_failure(mut self, after: usize, message: impl Into<String>) -> Self {
        self.script.stream_failure = Some((after, message.into()));
        self
    }

    /// Models passed to `create`, in call order.
    pub fn created_models(&self) -> Vec<String> {
        self.records
            .created
            .lock()
            .map(|created| created.clone())
            .unwrap_or_default()
    }

    /// `(model, messages)` for every completion request, in call order.
    pub fn conversations(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.records
            .conversations
            .lock()
            .map(|conversations| conversations.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(
        &self,
        model: &str,
        progress: ProgressHook,
    ) -> EngineResult<Box<dyn ModelHandle>> {
        if let Some(message) = &self.script.create_failure {
            return Err(EngineError::Unavailable(message.clone()));
        }
        if let Ok(mut created) = self.records.created.lock() {
            created.push(model.to_string());
        }
        debug!("scripted handle created for {}", model);
        Ok(Box::new(ScriptedHandle {
            model: model.to_string(),
            script: self.script.clone(),
            records: self.records.clone(),
            progress,
            prepared: AtomicBool::new(false),
        }))
    }
}

struct ScriptedHandle {
    model: String,
    script: Script,
    records: Arc<Records>,
    progress: ProgressHook,
    prepared: AtomicBool,
}

#[async_trait]
impl ModelHandle for ScriptedHandle {
    fn model(&self) -> &str {
        &self.model
    }

    async fn availability(&self) -> EngineResult<Availability> {
        if self.prepared.load(Ordering::SeqCst) {
            return Ok(Availability::Available);
        }
        Ok(self.script.availability.unwrap_or(Availability::Available))
    }

    async fn prepare(&self) -> EngineResult<()> {
        let steps = self.script.download_steps;
        for step in 1..=steps {
            (self.progress)(ProgressReport::new(
                step as f32 / steps as f32,
                format!("Fetching {} ({}/{})", self.model, step, steps),
            ));
        }
        if let Some(message) = &self.script.download_failure {
            return Err(EngineError::Download(message.clone()));
        }
        self.prepared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> EngineResult<ChunkStream> {
        let prompt = messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Ok(mut conversations) = self.records.conversations.lock() {
            conversations.push((self.model.clone(), messages));
        }

        let fragments: Vec<String> = match &self.script.reply {
            Reply::Echo => prompt
                .split_inclusive(char::is_whitespace)
                .map(str::to_string)
                .collect(),
            Reply::Fragments(fragments) => fragments.clone(),
        };

        let mut items: Vec<EngineResult<String>> = fragments.into_iter().map(Ok).collect();
        if let Some((after, message)) = &self.script.stream_failure {
            items.truncate(*after);
            items.push(Err(EngineError::Stream(message.clone())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
