//! Bookkeeping of external inputs that are currently held down
//!
//! Every external trigger press and role start goes through the
//! [`ActiveTriggerTracker`], which forwards it to the simulator and remembers
//! it until the matching release. [`ActiveTriggerTracker::deactivate`]
//! releases whatever is still held.

use super::item::RoleRef;
use super::SimulatorCommands;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalInput {
    Trigger(String),
    Role(RoleRef),
}

pub struct ActiveTriggerTracker {
    commands: Arc<dyn SimulatorCommands>,
    pressed: Mutex<HashSet<ExternalInput>>,
}

impl ActiveTriggerTracker {
    pub fn new(commands: Arc<dyn SimulatorCommands>) -> Self {
        Self {
            commands,
            pressed: Mutex::new(HashSet::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ExternalInput>> {
        self.pressed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn press_trigger(&self, name: &str) {
        self.lock().insert(ExternalInput::Trigger(name.to_string()));
        debug!("Trigger pressed: {}", name);
        self.commands.trigger_input_pressed(name);
    }

    /// Releases a held trigger; one that is not held is not sent again
    pub fn release_trigger(&self, name: &str) {
        if !self.lock().remove(&ExternalInput::Trigger(name.to_string())) {
            debug!("Trigger '{}' is not held, skipping release", name);
            return;
        }
        debug!("Trigger released: {}", name);
        self.commands.trigger_input_released(name);
    }

    pub fn start_role(&self, role: &RoleRef) {
        self.lock().insert(ExternalInput::Role(role.clone()));
        debug!("Role started: {}", role);
        self.commands.role_started(&role.owner_id, &role.role_name);
    }

    pub fn stop_role(&self, role: &RoleRef) {
        if !self.lock().remove(&ExternalInput::Role(role.clone())) {
            debug!("Role '{}' is not active, skipping stop", role);
            return;
        }
        debug!("Role stopped: {}", role);
        self.commands.role_stopped(&role.owner_id, &role.role_name);
    }

    pub fn is_pressed(&self, input: &ExternalInput) -> bool {
        self.lock().contains(input)
    }

    pub fn pressed_count(&self) -> usize {
        self.lock().len()
    }

    /// Releases every input still held and returns how many there were
    ///
    /// Idempotent; a second call finds nothing to release.
    pub fn deactivate(&self) -> usize {
        let held: Vec<ExternalInput> = self.lock().drain().collect();

        for input in &held {
            match input {
                ExternalInput::Trigger(name) => {
                    warn!("Forcing release of trigger '{}' still held at deactivation", name);
                    self.commands.trigger_input_released(name);
                }
                ExternalInput::Role(role) => {
                    warn!("Forcing stop of role '{}' still active at deactivation", role);
                    self.commands.role_stopped(&role.owner_id, &role.role_name);
                }
            }
        }
        held.len()
    }
}
