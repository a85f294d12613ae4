//! Model lifecycle: the static catalog and the per-session model owner.

pub mod catalog;
pub mod session;

pub use catalog::ModelCatalog;
pub use session::{ModelSession, SessionError, SessionResult};
