//! Routing of hardware actions to command items
//!
//! A press without long-press items goes straight to the items that are
//! active at `down`, and the returned [`PressSession`] makes `up` release
//! exactly those. With long-press items present the press is timed by a
//! [`PressTimingClassifier`] whose token is that same active set, and the
//! classifier's signals are handled by a task owned by the dispatcher.
//!
//! [`CommandDispatcher::stop`] ends every pending pause early so each held
//! item is released once, and makes later presses no-ops.

use super::item::{ActionKind, CommandItem};
use super::keyboard::KeyboardOutput;
use super::tracker::ActiveTriggerTracker;
use super::SimulatorCommands;
use crate::expression::PropertyLookup;
use crate::input::{DispatchQueue, PressSignal, PressTimingClassifier};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Items active for one press
pub type ActiveItems = Vec<Arc<CommandItem>>;

/// Command items per logical action
#[derive(Debug, Default)]
pub struct CommandBindings {
    pub press: Vec<Arc<CommandItem>>,
    pub dial_left: Vec<Arc<CommandItem>>,
    pub dial_right: Vec<Arc<CommandItem>>,
    pub touch_tap: Vec<Arc<CommandItem>>,
}

impl CommandBindings {
    fn all(&self) -> impl Iterator<Item = &Arc<CommandItem>> {
        self.press
            .iter()
            .chain(&self.dial_left)
            .chain(&self.dial_right)
            .chain(&self.touch_tap)
    }

    /// Union of the properties read by every item's condition
    pub fn used_properties(&self) -> BTreeSet<String> {
        self.all()
            .flat_map(|item| item.used_properties().cloned())
            .collect()
    }

    fn wants_long_press(&self) -> bool {
        self.press.iter().any(|item| item.long_enabled)
    }
}

/// Everything a command item needs to take effect
#[derive(Clone)]
pub struct CommandEffects {
    pub keyboard: Arc<dyn KeyboardOutput>,
    pub tracker: Arc<ActiveTriggerTracker>,
    pub queue: Arc<DispatchQueue>,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Hold time after which a press counts as long, 0 disables long presses
    pub long_press_ms: u64,
    /// Gap between the down and up edges of a short press or a touch tap
    pub short_press_pause_ms: u64,
    /// Hold time of every queued dial tick
    pub dwell_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            long_press_ms: 500,
            short_press_pause_ms: 40,
            dwell_ms: 40,
        }
    }
}

/// What `down` pressed, to be handed back to `up`
#[must_use = "pass the session to CommandDispatcher::up so the press is released"]
#[derive(Debug)]
pub enum PressSession {
    /// Items pressed immediately; `release` is the matching up action
    Direct {
        items: ActiveItems,
        release: ActionKind,
    },
    /// Press handed to the timing classifier
    Timed,
}

pub struct CommandDispatcher {
    bindings: CommandBindings,
    effects: CommandEffects,
    classifier: PressTimingClassifier<ActiveItems>,
    short_press_pause: Duration,
    stopped: CancellationToken,
    signal_task: JoinHandle<()>,
}

impl CommandDispatcher {
    /// Creates a dispatcher with its own tracker and dispatch queue
    pub fn spawn(
        bindings: CommandBindings,
        commands: Arc<dyn SimulatorCommands>,
        keyboard: Arc<dyn KeyboardOutput>,
        settings: Option<DispatcherSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        let tracker = Arc::new(ActiveTriggerTracker::new(commands));
        let queue = Arc::new(DispatchQueue::spawn(
            Arc::clone(&keyboard),
            Arc::clone(&tracker),
            Duration::from_millis(settings.dwell_ms),
        ));
        let effects = CommandEffects {
            keyboard,
            tracker,
            queue,
        };

        let short_press_pause = Duration::from_millis(settings.short_press_pause_ms);
        let stopped = CancellationToken::new();
        let (classifier, signals) =
            PressTimingClassifier::new(Duration::from_millis(settings.long_press_ms));
        let signal_task = tokio::spawn(run_press_signals(
            signals,
            effects.clone(),
            short_press_pause,
            stopped.clone(),
        ));

        Self {
            bindings,
            effects,
            classifier,
            short_press_pause,
            stopped,
            signal_task,
        }
    }

    pub fn bindings(&self) -> &CommandBindings {
        &self.bindings
    }

    /// Replaces the bound items; presses already in flight keep their items
    pub fn set_bindings(&mut self, bindings: CommandBindings) {
        self.bindings = bindings;
    }

    pub fn tracker(&self) -> &Arc<ActiveTriggerTracker> {
        &self.effects.tracker
    }

    fn active_items(items: &[Arc<CommandItem>], lookup: &dyn PropertyLookup) -> ActiveItems {
        items
            .iter()
            .filter(|item| item.is_active(lookup))
            .cloned()
            .collect()
    }

    fn fire(items: &[Arc<CommandItem>], action: ActionKind, effects: &CommandEffects) {
        for item in items {
            item.apply(action, effects);
        }
    }

    fn split(active: ActiveItems, long: bool) -> ActiveItems {
        active
            .into_iter()
            .filter(|item| item.long_enabled == long)
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    fn press_down(
        &self,
        action: ActionKind,
        release: ActionKind,
        lookup: &dyn PropertyLookup,
    ) -> PressSession {
        if self.is_stopped() {
            debug!("Dispatcher stopped, ignoring press");
            return PressSession::Direct {
                items: Vec::new(),
                release,
            };
        }
        let active = Self::active_items(&self.bindings.press, lookup);

        if self.bindings.wants_long_press() {
            debug!("Timing press of {} active items", active.len());
            self.classifier.down(active);
            return PressSession::Timed;
        }

        let items = Self::split(active, false);
        Self::fire(&items, action, &self.effects);
        PressSession::Direct { items, release }
    }

    pub fn down(&self, lookup: &dyn PropertyLookup) -> PressSession {
        self.press_down(ActionKind::Down, ActionKind::Up, lookup)
    }

    pub fn dial_down(&self, lookup: &dyn PropertyLookup) -> PressSession {
        self.press_down(ActionKind::DialDown, ActionKind::DialUp, lookup)
    }

    /// Releases what the paired `down` pressed
    pub fn up(&self, session: PressSession) {
        match session {
            PressSession::Direct { items, release } => Self::fire(&items, release, &self.effects),
            PressSession::Timed => self.classifier.up(),
        }
    }

    /// Queues `|ticks|` press cycles per active item, negative ticks turn left
    pub fn rotate(&self, ticks: i32, lookup: &dyn PropertyLookup) {
        let count = ticks.unsigned_abs();
        let (items, action) = match ticks {
            _ if self.is_stopped() => return,
            0 => return,
            t if t < 0 => (&self.bindings.dial_left, ActionKind::DialLeft(count)),
            _ => (&self.bindings.dial_right, ActionKind::DialRight(count)),
        };
        let active = Self::active_items(items, lookup);
        Self::fire(&active, action, &self.effects);
    }

    /// Presses the active touch items now and releases them after the pause
    ///
    /// `stop` cuts the pause short.
    pub fn touch_tap(&self, lookup: &dyn PropertyLookup) {
        if self.is_stopped() {
            return;
        }
        let active = Self::active_items(&self.bindings.touch_tap, lookup);
        if active.is_empty() {
            return;
        }

        Self::fire(&active, ActionKind::TouchTap, &self.effects);
        let effects = self.effects.clone();
        let pause = self.short_press_pause;
        let stopped = self.stopped.clone();
        tokio::spawn(async move {
            pause_unless_stopped(pause, &stopped).await;
            Self::fire(&active, ActionKind::Up, &effects);
        });
    }

    /// Force-releases every external input still held
    pub fn deactivate(&self) -> usize {
        self.effects.tracker.deactivate()
    }

    /// Stops the dispatcher and releases everything still held
    ///
    /// Pending short-press and tap pauses end at once and release their
    /// items, a held long press is released here, then the queue stops and
    /// the tracker force-releases what is left. Idempotent.
    pub async fn stop(&self) {
        if !self.stopped.is_cancelled() {
            info!("Stopping command dispatcher");
            self.stopped.cancel();
        }

        if let Some(held) = self.classifier.reset() {
            let items = Self::split(held, true);
            debug!("Releasing long press on {} items at stop", items.len());
            Self::fire(&items, ActionKind::Up, &self.effects);
        }
        self.effects.queue.stop().await;
        self.deactivate();
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.stopped.cancel();
        self.signal_task.abort();
    }
}

async fn pause_unless_stopped(pause: Duration, stopped: &CancellationToken) {
    tokio::select! {
        _ = stopped.cancelled() => {}
        _ = sleep(pause) => {}
    }
}

async fn run_press_signals(
    mut signals: mpsc::UnboundedReceiver<PressSignal<ActiveItems>>,
    effects: CommandEffects,
    short_press_pause: Duration,
    stopped: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            _ = stopped.cancelled() => {
                // a queued long release still owes its up edge
                while let Ok(signal) = signals.try_recv() {
                    if let PressSignal::LongReleased(active) = signal {
                        let items = CommandDispatcher::split(active, true);
                        CommandDispatcher::fire(&items, ActionKind::Up, &effects);
                    }
                }
                break;
            }
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        match signal {
            PressSignal::Short(active) => {
                let items = CommandDispatcher::split(active, false);
                debug!("Short press on {} items", items.len());
                CommandDispatcher::fire(&items, ActionKind::Down, &effects);
                pause_unless_stopped(short_press_pause, &stopped).await;
                CommandDispatcher::fire(&items, ActionKind::Up, &effects);
            }
            PressSignal::LongStarted(active) => {
                let items = CommandDispatcher::split(active, true);
                info!("Long press started on {} items", items.len());
                CommandDispatcher::fire(&items, ActionKind::Down, &effects);
            }
            PressSignal::LongReleased(active) => {
                let items = CommandDispatcher::split(active, true);
                debug!("Long press released on {} items", items.len());
                CommandDispatcher::fire(&items, ActionKind::Up, &effects);
            }
        }
    }
    debug!("Press signal task stopped");
}
