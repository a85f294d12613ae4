use thiserror::Error;

use crate::engine::EngineError;
use crate::event::event_bus::EventError;
use crate::federation::types::FederationError;
use crate::kernel::handlers::ProtocolError;
use crate::model::session::SessionError;
use crate::settings::SettingsError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Federation error: {0}")]
    Federation(#[from] FederationError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
