//! Error definitions for the bridge

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Invalid hardware event '{0}'")]
    InvalidEvent(String),

    #[error("No action configured for context '{0}'")]
    UnknownContext(String),

    #[error("Duplicate action context '{0}'")]
    DuplicateContext(String),
}
