use thiserror::Error;

use crate::accel::ShortcutConflict;

#[derive(Debug, Error)]
pub enum ExtoolsError {
    #[error("cannot load tool library: {0}")]
    LibraryLoad(String),

    #[error("invalid tool library: {0}")]
    LibraryValidation(String),

    #[error(transparent)]
    ShortcutConflict(#[from] ShortcutConflict),

    #[error("invalid accelerator: {0}")]
    InvalidAccelerator(String),

    #[error("cannot save tool library: {0}")]
    Persist(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}
