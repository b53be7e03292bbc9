//! Keystroke output
//!
//! Injecting keystrokes into the operating system is platform specific and
//! lives outside this crate; the bridge only talks to [`KeyboardOutput`].

use super::item::Hotkey;
use tracing::info;

pub trait KeyboardOutput: Send + Sync {
    fn key_down(&self, hotkey: &Hotkey);
    fn key_up(&self, hotkey: &Hotkey);
}

/// Writes key edges to the log instead of the OS
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingKeyboard;

impl KeyboardOutput for LoggingKeyboard {
    fn key_down(&self, hotkey: &Hotkey) {
        info!("Key down: {}", hotkey);
    }

    fn key_up(&self, hotkey: &Hotkey) {
        info!("Key up: {}", hotkey);
    }
}
