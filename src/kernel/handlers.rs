use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::protocol::*;

/// The request handlers a kernel implements for the host runtime.
#[async_trait]
pub trait KernelHandlers: Send + Sync {
    async fn kernel_info_request(&self) -> KernelInfoReply;

    async fn execute_request(&self, content: ExecuteRequest) -> ExecuteReply;

    async fn complete_request(&self, content: CompleteRequest) -> CompleteReply;

    async fn inspect_request(&self, content: InspectRequest) -> InspectReply;

    async fn is_complete_request(&self, content: IsCompleteRequest) -> IsCompleteReply;

    async fn comm_info_request(&self, content: CommInfoRequest) -> CommInfoReply;

    async fn history_request(&self, content: HistoryRequest) -> HistoryReply;

    async fn shutdown_request(&self, content: ShutdownRequest) -> ShutdownReply;

    async fn input_reply(&self, content: InputReply);

    async fn comm_open(&self, msg: CommOpen);

    async fn comm_msg(&self, msg: CommMsg);

    async fn comm_close(&self, msg: CommClose);
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("Invalid {msg_type} content: {source}")]
    InvalidContent {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
}

fn parse<T: DeserializeOwned>(msg_type: &str, content: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(content).map_err(|source| ProtocolError::InvalidContent {
        msg_type: msg_type.to_string(),
        source,
    })
}

fn reply<T: serde::Serialize>(msg_type: &str, reply: T) -> Result<Option<Value>, ProtocolError> {
    serde_json::to_value(reply)
        .map(Some)
        .map_err(|source| ProtocolError::InvalidContent {
            msg_type: msg_type.to_string(),
            source,
        })
}

/// Routes a raw message to the matching handler.
///
/// Returns the reply content, or `None` for messages that have no reply.
pub async fn dispatch(
    kernel: &dyn KernelHandlers,
    msg_type: &str,
    content: Value,
) -> Result<Option<Value>, ProtocolError> {
    match msg_type {
        "kernel_info_request" => reply(msg_type, kernel.kernel_info_request().await),
        "execute_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.execute_request(request).await)
        }
        "complete_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.complete_request(request).await)
        }
        "inspect_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.inspect_request(request).await)
        }
        "is_complete_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.is_complete_request(request).await)
        }
        "comm_info_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.comm_info_request(request).await)
        }
        "history_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.history_request(request).await)
        }
        "shutdown_request" => {
            let request = parse(msg_type, content)?;
            reply(msg_type, kernel.shutdown_request(request).await)
        }
        "input_reply" => {
            kernel.input_reply(parse(msg_type, content)?).await;
            Ok(None)
        }
        "comm_open" => {
            kernel.comm_open(parse(msg_type, content)?).await;
            Ok(None)
        }
        "comm_msg" => {
            kernel.comm_msg(parse(msg_type, content)?).await;
            Ok(None)
        }
        "comm_close" => {
            kernel.comm_close(parse(msg_type, content)?).await;
            Ok(None)
        }
        other => Err(ProtocolError::UnsupportedMessageType(other.to_string())),
    }
}
