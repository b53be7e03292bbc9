//! Short/long press classification
//!
//! ```text
//! Idle --down--> Pressed --up before threshold--> Short --> Idle
//!                   |
//!                   +--threshold elapsed--> LongStarted --up--> LongReleased --> Idle
//! ```
//!
//! Each `down` arms a fresh timer with its own [`CancellationToken`]. The timer
//! checks its token while holding the classifier lock before it pops the
//! token stack, so an `up` that raced with the timer either cancels it or
//! finds the stack already empty, never both.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a press, carrying the token passed to `down`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PressSignal<T> {
    Short(T),
    LongStarted(T),
    LongReleased(T),
}

struct ClassifierState<T> {
    pending: Vec<T>,
    long_held: Option<T>,
    timer: Option<CancellationToken>,
}

pub struct PressTimingClassifier<T> {
    state: Arc<Mutex<ClassifierState<T>>>,
    long_press: Duration,
    signals: mpsc::UnboundedSender<PressSignal<T>>,
}

fn lock<T>(state: &Mutex<ClassifierState<T>>) -> MutexGuard<'_, ClassifierState<T>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit<T>(signals: &mpsc::UnboundedSender<PressSignal<T>>, signal: PressSignal<T>) {
    if signals.send(signal).is_err() {
        debug!("Press signal receiver is gone");
    }
}

impl<T> PressTimingClassifier<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a classifier and the channel its signals arrive on
    ///
    /// A zero threshold disables long presses: every press is short.
    pub fn new(long_press: Duration) -> (Self, mpsc::UnboundedReceiver<PressSignal<T>>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let classifier = Self {
            state: Arc::new(Mutex::new(ClassifierState {
                pending: Vec::new(),
                long_held: None,
                timer: None,
            })),
            long_press,
            signals,
        };
        (classifier, receiver)
    }

    pub fn down(&self, token: T) {
        let mut state = lock(&self.state);
        if let Some(previous) = state.timer.take() {
            previous.cancel();
        }
        state.pending.push(token);

        if self.long_press.is_zero() {
            return;
        }

        let cancel = CancellationToken::new();
        state.timer = Some(cancel.clone());
        drop(state);

        let shared = Arc::clone(&self.state);
        let signals = self.signals.clone();
        let delay = self.long_press;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(delay) => {
                    let mut state = lock(&shared);
                    if cancel.is_cancelled() {
                        return;
                    }
                    state.timer = None;
                    if let Some(token) = state.pending.pop() {
                        debug!("Long press started after {:?}", delay);
                        state.long_held = Some(token.clone());
                        emit(&signals, PressSignal::LongStarted(token));
                    }
                }
            }
        });
    }

    pub fn up(&self) {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        match state.pending.pop() {
            Some(token) => emit(&self.signals, PressSignal::Short(token)),
            None => match state.long_held.take() {
                Some(token) => emit(&self.signals, PressSignal::LongReleased(token)),
                None => warn!("Release without a matching press, ignoring"),
            },
        }
    }

    /// Cancels the pending timer and forgets every press
    ///
    /// Returns the token of a long press that is still held; no signal is
    /// sent for it, the caller releases it.
    pub fn reset(&self) -> Option<T> {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.pending.clear();
        state.long_held.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn quick_release_is_short_press() {
        let (classifier, mut signals) = PressTimingClassifier::new(THRESHOLD);

        classifier.down("a");
        sleep(Duration::from_millis(100)).await;
        classifier.up();

        assert_eq!(signals.recv().await, Some(PressSignal::Short("a")));
        sleep(Duration::from_secs(2)).await;
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn held_press_is_long_press() {
        let (classifier, mut signals) = PressTimingClassifier::new(THRESHOLD);

        classifier.down("a");
        sleep(Duration::from_millis(600)).await;
        assert_eq!(signals.try_recv().ok(), Some(PressSignal::LongStarted("a")));

        classifier.up();
        assert_eq!(signals.try_recv().ok(), Some(PressSignal::LongReleased("a")));
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn quick_cycles_do_not_leak_timers() {
        let (classifier, mut signals) = PressTimingClassifier::new(THRESHOLD);

        classifier.down(1);
        classifier.up();
        sleep(Duration::from_millis(300)).await;
        classifier.down(2);
        sleep(Duration::from_millis(300)).await;
        classifier.up();

        sleep(Duration::from_secs(2)).await;
        let mut received = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            received.push(signal);
        }
        assert_eq!(received, vec![PressSignal::Short(1), PressSignal::Short(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_threshold_is_always_short() {
        let (classifier, mut signals) = PressTimingClassifier::new(Duration::ZERO);

        classifier.down("a");
        sleep(Duration::from_secs(5)).await;
        classifier.up();

        assert_eq!(signals.try_recv().ok(), Some(PressSignal::Short("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_hands_back_held_long_press() {
        let (classifier, mut signals) = PressTimingClassifier::new(THRESHOLD);

        classifier.down("a");
        sleep(Duration::from_millis(600)).await;
        assert_eq!(signals.try_recv().ok(), Some(PressSignal::LongStarted("a")));
        assert_eq!(classifier.reset(), Some("a"));

        classifier.down("b");
        assert_eq!(classifier.reset(), None);
        sleep(Duration::from_secs(2)).await;
        classifier.up();
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stray_release_is_ignored() {
        let (classifier, mut signals) = PressTimingClassifier::<u8>::new(THRESHOLD);
        classifier.up();
        assert!(signals.try_recv().is_err());
    }
}
