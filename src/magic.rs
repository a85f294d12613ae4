//! # Magic commands
//!
//! A cell whose trimmed text is one of the forms below is answered by the
//! kernel itself instead of being sent to the model:
//!
//! ```text
//! %ai | %ai help          help text
//! %ai model | %ai models  current model and the catalog
//! %ai model <name>        switch to <name> right away
//! ```
//!
//! Anything else, including near misses such as `%ai model a b`, is a prompt.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::model::session::{ModelSession, SessionResult};

lazy_static! {
    static ref MAGIC: Regex = Regex::new(r"^%ai(?:\s+(help|models?)(?:\s+(\S+))?)?$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicCommand {
    Help,
    ShowModels,
    SetModel(String),
}

impl MagicCommand {
    /// `None` means the text is not a magic command.
    pub fn parse(code: &str) -> Option<Self> {
        let captures = MAGIC.captures(code.trim())?;
        let verb = captures.get(1).map(|m| m.as_str());
        let argument = captures.get(2).map(|m| m.as_str().to_string());
        match (verb, argument) {
            (None, _) | (Some("help"), None) => Some(MagicCommand::Help),
            (Some(_), None) => Some(MagicCommand::ShowModels),
            (Some("model"), Some(name)) => Some(MagicCommand::SetModel(name)),
            _ => None,
        }
    }
}

pub const HELP_TEXT: &str = "\
Magic commands:
  %ai model          Show the current model and the available models
  %ai model <name>   Switch to <name>
  %ai help           Show this help";

/// Runs a parsed command against the session.
pub async fn run(
    command: MagicCommand,
    session: &mut ModelSession,
    list_limit: usize,
) -> SessionResult<String> {
    debug!("magic command: {:?}", command);
    match command {
        MagicCommand::Help => Ok(HELP_TEXT.to_string()),
        MagicCommand::ShowModels => Ok(model_status(session, list_limit)),
        MagicCommand::SetModel(name) => session.set_model(&name).await,
    }
}

fn model_status(session: &ModelSession, list_limit: usize) -> String {
    let mut lines = Vec::new();
    match session.model_name() {
        Some(name) => lines.push(format!("Current model: {}", name)),
        None => lines.push(format!(
            "Current model: not yet initialized (default: {})",
            session.default_model()
        )),
    }

    let models = session.catalog().models();
    lines.push(String::new());
    lines.push(format!("Available models ({}):", models.len()));
    for model in models.iter().take(list_limit) {
        lines.push(format!("  {}", model));
    }
    if models.len() > list_limit {
        lines.push(format!("  ... and {} more", models.len() - list_limit));
    }
    lines.push(String::new());
    lines.push("Usage: %ai model <name>".to_string());
    lines.join("\n")
}
