//! Engine backed by a local OpenAI-compatible server.
//!
//! Completions and model listing go through `async-openai`. Servers in the
//! Ollama family also expose `POST /api/pull`, which streams NDJSON status
//! lines while a model is downloaded; `prepare` uses it and turns the
//! `completed`/`total` counters into progress reports.

use std::collections::HashSet;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;

use super::{
    Availability, ChatMessage, ChunkStream, EngineError, EngineResult, ModelEngine, ModelHandle,
    ProgressHook, ProgressReport, Role,
};

#[derive(Clone)]
pub struct OpenAICompatEngine {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    base_url: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAICompatEngine {
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let base_url = normalize_base_url(&config.base_url);
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| EngineError::Api(e.to_string()))?;

        let mut openai_config = OpenAIConfig::new().with_api_base(&base_url);
        if let Some(key) = &config.api_key {
            openai_config = openai_config.with_api_key(key.expose_secret());
        }
        let client = Client::with_config(openai_config).with_http_client(http.clone());

        Ok(Self {
            client,
            http,
            base_url,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelEngine for OpenAICompatEngine {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn create(
        &self,
        model: &str,
        progress: ProgressHook,
    ) -> EngineResult<Box<dyn ModelHandle>> {
        Ok(Box::new(OpenAICompatHandle {
            engine: self.clone(),
            model: model.to_string(),
            progress,
        }))
    }
}

struct OpenAICompatHandle {
    engine: OpenAICompatEngine,
    model: String,
    progress: ProgressHook,
}

impl OpenAICompatHandle {
    fn report(&self, progress: f32, text: impl Into<String>) {
        (self.progress)(ProgressReport::new(progress, text));
    }
}

#[async_trait]
impl ModelHandle for OpenAICompatHandle {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(level = "debug", skip(self), fields(model = %self.model))]
    async fn availability(&self) -> EngineResult<Availability> {
        match self.engine.client.models().list().await {
            Ok(list) => {
                let installed: HashSet<String> = list.data.into_iter().map(|m| m.id).collect();
                if installed.contains(&self.model) {
                    Ok(Availability::Available)
                } else {
                    Ok(Availability::Downloadable)
                }
            }
            Err(OpenAIError::Reqwest(e)) => {
                warn!("model server unreachable at {}: {}", self.engine.base_url, e);
                Ok(Availability::Unavailable)
            }
            Err(e) => Err(EngineError::Api(e.to_string())),
        }
    }

    #[instrument(level = "debug", skip(self), fields(model = %self.model))]
    async fn prepare(&self) -> EngineResult<()> {
        let url = format!("{}/api/pull", server_root(&self.engine.base_url));
        let response = self
            .engine
            .http
            .post(url)
            .json(&serde_json::json!({ "model": self.model, "stream": true }))
            .send()
            .await
            .map_err(|e| EngineError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Download(format!(
                "pull of {} failed with status {}",
                self.model,
                response.status()
            )));
        }

        self.report(0.0, format!("Downloading {}", self.model));
        let mut tracker = PullTracker::default();
        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| EngineError::Download(e.to_string()))?;
            for line in lines.push(&bytes) {
                if let Some((progress, text)) = tracker.feed(&line)? {
                    self.report(progress, text);
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let Some((progress, text)) = tracker.feed(&line)? {
                self.report(progress, text);
            }
        }
        self.report(1.0, format!("{} ready", self.model));
        Ok(())
    }

    #[instrument(level = "debug", skip(self, messages), fields(model = %self.model))]
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> EngineResult<ChunkStream> {
        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.into_iter().map(to_request_message).collect(),
            temperature: Some(self.engine.temperature),
            max_completion_tokens: self.engine.max_tokens,
            stream: Some(true),
            ..Default::default()
        };

        let stream = self
            .engine
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| EngineError::Api(e.to_string()))?;

        let fragments = stream.filter_map(|item| async move {
            match item {
                Ok(response) => {
                    let text: String = response
                        .choices
                        .into_iter()
                        .filter_map(|choice| choice.delta.content)
                        .collect();
                    if text.is_empty() {
                        None
                    } else {
                        Some(Ok(text))
                    }
                }
                Err(e) => Some(Err(EngineError::Stream(e.to_string()))),
            }
        });
        Ok(Box::pin(fragments))
    }
}

fn to_request_message(message: ChatMessage) -> ChatCompletionRequestMessage {
    match message.role {
        Role::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(message.content),
            name: None,
        }),
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(message.content),
            name: None,
        }),
        Role::Assistant => {
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    message.content,
                )),
                ..Default::default()
            })
        }
    }
}

/// Keeps a single trailing `/v1` and no trailing slash.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

fn server_root(base_url: &str) -> &str {
    base_url.strip_suffix("/v1").unwrap_or(base_url)
}

/// Splits a byte stream into lines. Bytes are decoded only once a line is
/// complete, so multi-byte characters may straddle chunk boundaries.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..pos]));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// Turns pull status lines into `(progress, text)` pairs.
#[derive(Debug, Default)]
struct PullTracker {
    last_progress: f32,
}

impl PullTracker {
    fn feed(&mut self, line: &str) -> EngineResult<Option<(f32, String)>> {
        if line.is_empty() {
            return Ok(None);
        }
        let status: PullStatus = match serde_json::from_str(line) {
            Ok(status) => status,
            Err(e) => {
                debug!("ignoring malformed pull line {:?}: {}", line, e);
                return Ok(None);
            }
        };
        if let Some(error) = status.error {
            return Err(EngineError::Download(error));
        }
        if let (Some(total), Some(completed)) = (status.total, status.completed) {
            if total > 0 {
                self.last_progress = (completed as f64 / total as f64).clamp(0.0, 1.0) as f32;
            }
        }
        let text = status.status.unwrap_or_default();
        Ok(Some((self.last_progress, text)))
    }
}
