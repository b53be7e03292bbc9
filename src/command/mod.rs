//! # Command dispatch
//!
//! Turns logical hardware actions into keystrokes and simulator commands.
//!
//! ```text
//! command/
//! ├── item.rs       - CommandItem, ActionKind, Hotkey
//! ├── tracker.rs    - ActiveTriggerTracker, held external inputs
//! ├── dispatcher.rs - CommandDispatcher and PressSession
//! ├── keyboard.rs   - KeyboardOutput seam
//! └── error.rs      - CommandError
//! ```

pub mod dispatcher;
pub mod error;
pub mod item;
pub mod keyboard;
pub mod tracker;

pub use dispatcher::{CommandBindings, CommandDispatcher, CommandEffects, DispatcherSettings, PressSession};
pub use error::CommandError;
pub use item::{ActionKind, CommandItem, CommandKind, Hotkey, RoleRef};
pub use keyboard::{KeyboardOutput, LoggingKeyboard};
pub use tracker::{ActiveTriggerTracker, ExternalInput};

/// Outbound commands the simulator understands
pub trait SimulatorCommands: Send + Sync {
    fn trigger_input_pressed(&self, name: &str);
    fn trigger_input_released(&self, name: &str);
    fn role_started(&self, owner_id: &str, role_name: &str);
    fn role_stopped(&self, owner_id: &str, role_name: &str);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::item::Hotkey;
    use super::{KeyboardOutput, SimulatorCommands};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records simulator commands as `pressed <name>`, `released <name>`,
    /// `role-started <owner> <role>` and `role-stopped <owner> <role>`
    #[derive(Default)]
    pub struct RecordingCommands {
        log: Mutex<Vec<String>>,
    }

    impl RecordingCommands {
        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl SimulatorCommands for RecordingCommands {
        fn trigger_input_pressed(&self, name: &str) {
            self.push(format!("pressed {name}"));
        }

        fn trigger_input_released(&self, name: &str) {
            self.push(format!("released {name}"));
        }

        fn role_started(&self, owner_id: &str, role_name: &str) {
            self.push(format!("role-started {owner_id} {role_name}"));
        }

        fn role_stopped(&self, owner_id: &str, role_name: &str) {
            self.push(format!("role-stopped {owner_id} {role_name}"));
        }
    }

    /// Records key edges as `down <key>` / `up <key>` with the tokio instant
    #[derive(Default)]
    pub struct RecordingKeyboard {
        log: Mutex<Vec<(String, Instant)>>,
    }

    impl RecordingKeyboard {
        pub fn take(&self) -> Vec<(String, Instant)> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        pub fn edges(&self) -> Vec<String> {
            self.take().into_iter().map(|(edge, _)| edge).collect()
        }
    }

    impl KeyboardOutput for RecordingKeyboard {
        fn key_down(&self, hotkey: &Hotkey) {
            self.log
                .lock()
                .unwrap()
                .push((format!("down {hotkey}"), Instant::now()));
        }

        fn key_up(&self, hotkey: &Hotkey) {
            self.log
                .lock()
                .unwrap()
                .push((format!("up {hotkey}"), Instant::now()));
        }
    }
}
