//! Paced press/release queue
//!
//! Dial rotations arrive in bursts. Each tick becomes one [`QueueEntry`]
//! which a single worker task turns into a down, a dwell and an up, strictly
//! in order. A long queue adds latency; entries are never dropped or merged.

use crate::command::item::{Hotkey, RoleRef};
use crate::command::{ActiveTriggerTracker, KeyboardOutput};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One press-and-release cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueEntry {
    pub hotkey: Option<Hotkey>,
    pub trigger: Option<String>,
    pub role: Option<RoleRef>,
}

impl QueueEntry {
    pub fn hotkey(hotkey: Hotkey) -> Self {
        Self {
            hotkey: Some(hotkey),
            ..Default::default()
        }
    }

    pub fn trigger(name: String) -> Self {
        Self {
            trigger: Some(name),
            ..Default::default()
        }
    }

    pub fn role(role: RoleRef) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    fn press(&self, keyboard: &dyn KeyboardOutput, tracker: &ActiveTriggerTracker) {
        if let Some(hotkey) = &self.hotkey {
            keyboard.key_down(hotkey);
        }
        if let Some(trigger) = &self.trigger {
            tracker.press_trigger(trigger);
        }
        if let Some(role) = &self.role {
            tracker.start_role(role);
        }
    }

    fn release(&self, keyboard: &dyn KeyboardOutput, tracker: &ActiveTriggerTracker) {
        if let Some(hotkey) = &self.hotkey {
            keyboard.key_up(hotkey);
        }
        if let Some(trigger) = &self.trigger {
            tracker.release_trigger(trigger);
        }
        if let Some(role) = &self.role {
            tracker.stop_role(role);
        }
    }
}

pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<QueueEntry>,
    tracker: Arc<ActiveTriggerTracker>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchQueue {
    /// Starts the worker task
    pub fn spawn(
        keyboard: Arc<dyn KeyboardOutput>,
        tracker: Arc<ActiveTriggerTracker>,
        dwell: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(run_queue_worker(
            receiver,
            keyboard,
            Arc::clone(&tracker),
            dwell,
            shutdown.clone(),
        ));

        Self {
            sender,
            tracker,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Appends `count` copies of `entry`; never blocks
    pub fn enqueue(&self, entry: QueueEntry, count: u32) {
        if self.shutdown.is_cancelled() {
            warn!("Dispatch queue stopped, dropping {:?}", entry);
            return;
        }
        for _ in 0..count {
            if self.sender.send(entry.clone()).is_err() {
                warn!("Dispatch queue worker is gone, dropping {:?}", entry);
                return;
            }
        }
    }

    /// Stops the worker and releases every external input still held
    ///
    /// Idempotent. An entry interrupted mid-dwell is released by the worker
    /// before it exits.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Dispatch queue worker ended abnormally: {}", e);
            }
            info!("Dispatch queue stopped");
        }

        let released = self.tracker.deactivate();
        if released > 0 {
            debug!("Released {} held inputs on queue stop", released);
        }
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_queue_worker(
    mut entries: mpsc::UnboundedReceiver<QueueEntry>,
    keyboard: Arc<dyn KeyboardOutput>,
    tracker: Arc<ActiveTriggerTracker>,
    dwell: Duration,
    shutdown: CancellationToken,
) {
    debug!("Dispatch queue worker started, dwell {:?}", dwell);

    loop {
        let entry = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            entry = entries.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        entry.press(keyboard.as_ref(), &tracker);
        let interrupted = tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = sleep(dwell) => false,
        };
        entry.release(keyboard.as_ref(), &tracker);

        if interrupted {
            break;
        }
    }

    let dropped = std::iter::from_fn(|| entries.try_recv().ok()).count();
    if dropped > 0 {
        debug!("Dispatch queue discarded {} pending entries", dropped);
    }
    debug!("Dispatch queue worker finished");
}
