use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Map;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::{
    event::event_bus::{ErrorEvent, ErrorSeverity, Event, EventBus},
    magic::{self, MagicCommand},
    model::session::ModelSession,
};

use super::{
    context::KernelContext,
    handlers::KernelHandlers,
    protocol::*,
};

const SHUT_DOWN_MESSAGE: &str = "Kernel has been shut down";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum KernelState {
    Uninitialized,
    ModelReady,
    /// No further model work is done once here.
    Terminated,
}

/// Kernel that answers cells with a local language model.
///
/// Execute requests on one kernel run one at a time: the session sits behind
/// an async mutex held for the whole request.
pub struct ChatKernel {
    session: Mutex<ModelSession>,
    state: RwLock<KernelState>,
    context: Arc<dyn KernelContext>,
    event_bus: Arc<EventBus>,
    list_limit: usize,
}

impl ChatKernel {
    pub fn new(
        session: ModelSession,
        context: Arc<dyn KernelContext>,
        event_bus: Arc<EventBus>,
        list_limit: usize,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            state: RwLock::new(KernelState::Uninitialized),
            context,
            event_bus,
            list_limit,
        }
    }

    pub async fn state(&self) -> KernelState {
        *self.state.read().await
    }

    pub async fn model_name(&self) -> Option<String> {
        self.session.lock().await.model_name().map(str::to_string)
    }

    async fn run(
        &self,
        session: &mut ModelSession,
        code: &str,
        parent: &Option<MessageHeader>,
    ) -> Result<(), String> {
        if let Some(command) = MagicCommand::parse(code) {
            let text = magic::run(command, session, self.list_limit)
                .await
                .map_err(|e| e.to_string())?;
            self.context.stream(StreamContent::stdout(text), parent.clone());
            return Ok(());
        }

        let context = &self.context;
        session
            .send(code, |chunk| {
                context.stream(StreamContent::stdout(chunk), parent.clone())
            })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn fail(
        &self,
        execution_count: u32,
        message: String,
        parent: Option<MessageHeader>,
        session_id: Option<uuid::Uuid>,
    ) -> ExecuteReply {
        warn!("execute failed: {}", message);
        let content = ErrorContent::generic(message.clone());
        self.context.publish_execute_error(content.clone(), parent);
        let _ = self
            .event_bus
            .publish_error(ErrorEvent {
                error_type: "execute".to_string(),
                message,
                severity: ErrorSeverity::Error,
                session_id,
            })
            .await;
        ExecuteReply::error(execution_count, content)
    }
}

#[async_trait]
impl KernelHandlers for ChatKernel {
    async fn kernel_info_request(&self) -> KernelInfoReply {
        KernelInfoReply {
            status: ReplyStatus::Ok,
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: "llmkernel".to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language_info: LanguageInfo {
                name: "markdown".to_string(),
                version: String::new(),
                mimetype: "text/markdown".to_string(),
                file_extension: ".md".to_string(),
                codemirror_mode: Some("markdown".to_string()),
                pygments_lexer: Some("markdown".to_string()),
                nbconvert_exporter: "markdown".to_string(),
            },
            banner: "Local LLM kernel: each cell is sent to a locally running language model. \
                     Type %ai help for commands."
                .to_string(),
            help_links: Vec::new(),
        }
    }

    #[instrument(level = "debug", skip(self, content))]
    async fn execute_request(&self, content: ExecuteRequest) -> ExecuteReply {
        let execution_count = self.context.execution_count();
        let parent = self.context.parent_header();

        let mut session = self.session.lock().await;
        if self.state().await == KernelState::Terminated {
            return self
                .fail(execution_count, SHUT_DOWN_MESSAGE.to_string(), parent, None)
                .await;
        }

        let result = self.run(&mut session, &content.code, &parent).await;
        if session.is_initialized() {
            *self.state.write().await = KernelState::ModelReady;
        }

        match result {
            Ok(()) => ExecuteReply::ok(execution_count),
            Err(message) => {
                let session_id = Some(session.id());
                drop(session);
                self.fail(execution_count, message, parent, session_id).await
            }
        }
    }

    async fn complete_request(&self, _content: CompleteRequest) -> CompleteReply {
        CompleteReply {
            matches: Vec::new(),
            cursor_start: 0,
            cursor_end: 0,
            metadata: Map::new(),
            status: ReplyStatus::Ok,
        }
    }

    async fn inspect_request(&self, _content: InspectRequest) -> InspectReply {
        InspectReply {
            status: ReplyStatus::Ok,
            found: false,
            data: Map::new(),
            metadata: Map::new(),
        }
    }

    async fn is_complete_request(&self, _content: IsCompleteRequest) -> IsCompleteReply {
        IsCompleteReply {
            status: IsCompleteStatus::Complete,
            indent: None,
        }
    }

    async fn comm_info_request(&self, _content: CommInfoRequest) -> CommInfoReply {
        CommInfoReply {
            status: ReplyStatus::Ok,
            comms: Map::new(),
        }
    }

    async fn history_request(&self, _content: HistoryRequest) -> HistoryReply {
        HistoryReply {
            status: ReplyStatus::Ok,
            history: Vec::new(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn shutdown_request(&self, content: ShutdownRequest) -> ShutdownReply {
        let mut session = self.session.lock().await;
        *self.state.write().await = KernelState::Terminated;
        if let Some(model) = session.release() {
            debug!("released model {}", model);
        }
        info!("kernel session {} shut down", session.id());
        let _ = self
            .event_bus
            .publish(Event::KernelShutdown {
                session_id: session.id(),
            })
            .await;
        if content.restart {
            debug!("restart requested, answering restart=false");
        }
        ShutdownReply {
            status: ReplyStatus::Ok,
            restart: false,
        }
    }

    async fn input_reply(&self, _content: InputReply) {}

    async fn comm_open(&self, _msg: CommOpen) {}

    async fn comm_msg(&self, _msg: CommMsg) {}

    async fn comm_close(&self, _msg: CommClose) {}
}
