//! Durable, append-only conversation log with checkpoints and token usage.
//!
//! See [`Context`](store::Context) for the storage engine and
//! [`SessionTable`](session::SessionTable) for the work-dir → session
//! bookkeeping layered on top of it.

pub mod record;
pub mod session;
pub mod store;

pub use record::ContextLine;
pub use session::{Session, SessionTable};
pub use store::Context;

use thiserror::Error;

/// Errors raised by the context store and session table.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed context line: {0}")]
    Malformed(String),
    #[error("checkpoint {0} not found")]
    CheckpointNotFound(u32),
    #[error("session metadata error: {0}")]
    Metadata(String),
}
