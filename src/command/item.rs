//! Command items and the action kinds they react to
//!
//! A [`CommandItem`] is one configured effect bound to a hardware action.
//! [`CommandItem::apply`] is the single place where an action kind is matched
//! against an item kind, so adding either forces every combination to be
//! handled.

use super::dispatcher::CommandEffects;
use super::error::CommandError;
use crate::config::{CommandItemConfig, CommandKindConfig};
use crate::expression::{ExpressionError, ExpressionSlot, Labels, PropertyLookup};
use crate::input::QueueEntry;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Win,
}

impl FromStr for Modifier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Ok(Modifier::Ctrl),
            "alt" => Ok(Modifier::Alt),
            "shift" => Ok(Modifier::Shift),
            "win" | "meta" | "super" => Ok(Modifier::Win),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Alt => "Alt",
            Modifier::Shift => "Shift",
            Modifier::Win => "Win",
        };
        write!(f, "{name}")
    }
}

/// A key with optional modifiers, written `Ctrl+Shift+F5`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hotkey {
    pub modifiers: Vec<Modifier>,
    pub key: String,
}

impl FromStr for Hotkey {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CommandError::InvalidHotkey(s.to_string());
        let mut parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|key| !key.is_empty()).ok_or_else(invalid)?;

        let modifiers = parts
            .into_iter()
            .map(|part| part.parse::<Modifier>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            modifiers,
            key: key.to_string(),
        })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{modifier}+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Owner and name of a simulator role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleRef {
    pub owner_id: String,
    pub role_name: String,
}

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.role_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Keypress(Hotkey),
    ExternalTrigger(String),
    ExternalRole(RoleRef),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Keypress(hotkey) => write!(f, "keypress {hotkey}"),
            CommandKind::ExternalTrigger(name) => write!(f, "trigger {name}"),
            CommandKind::ExternalRole(role) => write!(f, "role {role}"),
        }
    }
}

/// Logical hardware action delivered to a command item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Down,
    Up,
    /// Counter-clockwise rotation by the given number of ticks
    DialLeft(u32),
    /// Clockwise rotation by the given number of ticks
    DialRight(u32),
    DialDown,
    DialUp,
    TouchTap,
}

#[derive(Debug)]
pub struct CommandItem {
    pub kind: CommandKind,
    /// Fires on long press instead of short press
    pub long_enabled: bool,
    pub condition: ExpressionSlot,
}

impl CommandItem {
    pub fn new(kind: CommandKind, long_enabled: bool, condition: &str) -> Self {
        Self {
            kind,
            long_enabled,
            condition: ExpressionSlot::from_source(condition, None),
        }
    }

    /// Builds an item from its configuration
    ///
    /// A condition that does not compile is kept as the item's error message
    /// (see [`CommandItem::condition_error`]) and the item stays always
    /// active, with a warning naming the item.
    pub fn from_config(
        config: &CommandItemConfig,
        labels: Option<&Labels>,
    ) -> Result<Self, CommandError> {
        let missing = |kind: &str, field: &str| CommandError::MissingField {
            kind: kind.to_string(),
            field: field.to_string(),
        };

        let kind = match &config.kind {
            CommandKindConfig::Keypress { hotkey } => CommandKind::Keypress(hotkey.parse()?),
            CommandKindConfig::Trigger { name } if name.trim().is_empty() => {
                return Err(missing("trigger", "name"))
            }
            CommandKindConfig::Trigger { name } => {
                CommandKind::ExternalTrigger(name.trim().to_string())
            }
            CommandKindConfig::Role { owner, role } => {
                if owner.trim().is_empty() {
                    return Err(missing("role", "owner"));
                }
                if role.trim().is_empty() {
                    return Err(missing("role", "role"));
                }
                CommandKind::ExternalRole(RoleRef {
                    owner_id: owner.trim().to_string(),
                    role_name: role.trim().to_string(),
                })
            }
        };

        let item = Self {
            kind,
            long_enabled: config.long,
            condition: ExpressionSlot::from_source(&config.condition, labels),
        };
        if let Some(e) = item.condition_error() {
            warn!(
                "Condition '{}' of {} does not compile ({}), the item fires on every press",
                config.condition, item.kind, e
            );
        }
        Ok(item)
    }

    pub fn condition_error(&self) -> Option<&ExpressionError> {
        self.condition.last_error()
    }

    pub fn is_active(&self, lookup: &dyn PropertyLookup) -> bool {
        self.condition.is_active(lookup)
    }

    /// One press-and-release cycle of this item for the dispatch queue
    pub fn queue_entry(&self) -> QueueEntry {
        match &self.kind {
            CommandKind::Keypress(hotkey) => QueueEntry::hotkey(hotkey.clone()),
            CommandKind::ExternalTrigger(name) => QueueEntry::trigger(name.clone()),
            CommandKind::ExternalRole(role) => QueueEntry::role(role.clone()),
        }
    }

    /// Applies `action` to this item
    pub fn apply(&self, action: ActionKind, effects: &CommandEffects) {
        match action {
            ActionKind::Down | ActionKind::DialDown | ActionKind::TouchTap => self.press(effects),
            ActionKind::Up | ActionKind::DialUp => self.release(effects),
            ActionKind::DialLeft(ticks) | ActionKind::DialRight(ticks) => {
                effects.queue.enqueue(self.queue_entry(), ticks)
            }
        }
    }

    fn press(&self, effects: &CommandEffects) {
        match &self.kind {
            CommandKind::Keypress(hotkey) => effects.keyboard.key_down(hotkey),
            CommandKind::ExternalTrigger(name) => effects.tracker.press_trigger(name),
            CommandKind::ExternalRole(role) => effects.tracker.start_role(role),
        }
    }

    fn release(&self, effects: &CommandEffects) {
        match &self.kind {
            CommandKind::Keypress(hotkey) => effects.keyboard.key_up(hotkey),
            CommandKind::ExternalTrigger(name) => effects.tracker.release_trigger(name),
            CommandKind::ExternalRole(role) => effects.tracker.stop_role(role),
        }
    }

    /// Every property this item's condition reads
    pub fn used_properties(&self) -> impl Iterator<Item = &String> {
        self.condition.used_properties().iter()
    }
}
