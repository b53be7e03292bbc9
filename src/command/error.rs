//! Error definitions for the command module

use thiserror::Error;

/// Raised while building command items from their configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Hotkey text without a key, or with an unknown modifier
    #[error("Invalid hotkey '{0}'")]
    InvalidHotkey(String),

    /// External trigger or role with an empty name
    #[error("Missing {field} for {kind} command item")]
    MissingField { kind: String, field: String },
}
