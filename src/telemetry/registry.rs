//! Reference-counted subscription registry
//!
//! Keeps one [`Subscription`] per property name (case-insensitive) with the
//! set of receivers interested in it and the last value seen. The registry
//! never performs I/O; every mutating call tells the caller whether a wire
//! command is needed, and the caller sends it after the lock is released.

use super::property_codec::{PropertyLine, TypedValue};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one consumer of property updates
pub type ReceiverId = u64;

/// A property value delivered to a receiver
#[derive(Debug, Clone)]
pub struct PropertyUpdate {
    pub name: String,
    pub value: TypedValue,
    pub received_at: DateTime<Local>,
}

/// Handle a consumer passes to subscribe/unsubscribe
///
/// Cloning the handle keeps the same identity, so subscribing a clone to a
/// property the original already holds is a no-op.
#[derive(Debug, Clone)]
pub struct PropertyReceiver {
    id: ReceiverId,
    sender: mpsc::UnboundedSender<PropertyUpdate>,
}

impl PropertyReceiver {
    pub fn id(&self) -> ReceiverId {
        self.id
    }
}

#[derive(Debug)]
struct Subscription {
    receivers: HashMap<ReceiverId, mpsc::UnboundedSender<PropertyUpdate>>,
    last_update: Option<PropertyUpdate>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    subscriptions: HashMap<String, Subscription>,
    // original spelling per key, used for the wire
    names: HashMap<String, String>,
    connected: bool,
}

/// Outcome of [`SubscriptionRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// First receiver and connected: a wire subscribe must be sent
    SendWire,
    /// Subscription created while disconnected; it is sent on next connect
    Deferred,
    /// Receiver joined an existing subscription (cached value replayed if any)
    Joined,
    /// This receiver already held the subscription
    AlreadySubscribed,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
    next_receiver_id: AtomicU64,
}

/// Subscriptions are keyed case-insensitively by this form of the name
pub fn property_key(name: &str) -> String {
    name.to_lowercase()
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // a panicking receiver must not take the whole client down
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a new receiver handle and the channel its updates arrive on
    pub fn create_receiver(&self) -> (PropertyReceiver, mpsc::UnboundedReceiver<PropertyUpdate>) {
        let id = self.next_receiver_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        (PropertyReceiver { id, sender }, receiver)
    }

    pub fn subscribe(&self, name: &str, receiver: &PropertyReceiver) -> SubscribeOutcome {
        let key = property_key(name);
        let replay;
        let outcome;
        {
            let mut inner = self.lock();
            let connected = inner.connected;
            match inner.subscriptions.get_mut(&key) {
                Some(subscription) => {
                    if subscription.receivers.contains_key(&receiver.id) {
                        return SubscribeOutcome::AlreadySubscribed;
                    }
                    subscription
                        .receivers
                        .insert(receiver.id, receiver.sender.clone());
                    replay = subscription.last_update.clone();
                    outcome = SubscribeOutcome::Joined;
                }
                None => {
                    let mut receivers = HashMap::new();
                    receivers.insert(receiver.id, receiver.sender.clone());
                    inner.subscriptions.insert(
                        key.clone(),
                        Subscription {
                            receivers,
                            last_update: None,
                        },
                    );
                    inner.names.insert(key, name.to_string());
                    replay = None;
                    outcome = if connected {
                        SubscribeOutcome::SendWire
                    } else {
                        SubscribeOutcome::Deferred
                    };
                }
            }
        }

        if let Some(update) = replay {
            debug!(property = %update.name, receiver = receiver.id, "Replaying cached value");
            if receiver.sender.send(update).is_err() {
                debug!(receiver = receiver.id, "Receiver closed before replay");
            }
        }

        outcome
    }

    /// Removes `receiver_id` from `name`
    ///
    /// Returns the wire name to unsubscribe when the last receiver left while
    /// connected.
    pub fn unsubscribe(&self, name: &str, receiver_id: ReceiverId) -> Option<String> {
        let key = property_key(name);
        let mut inner = self.lock();

        let now_empty = match inner.subscriptions.get_mut(&key) {
            Some(subscription) => {
                subscription.receivers.remove(&receiver_id);
                subscription.receivers.is_empty()
            }
            None => return None,
        };

        if !now_empty {
            return None;
        }

        inner.subscriptions.remove(&key);
        let wire_name = inner.names.remove(&key).unwrap_or_else(|| name.to_string());
        if inner.connected {
            Some(wire_name)
        } else {
            None
        }
    }

    /// Removes a receiver from every subscription it holds
    ///
    /// Returns the wire names that must be unsubscribed.
    pub fn remove_receiver(&self, receiver_id: ReceiverId) -> Vec<String> {
        let mut inner = self.lock();

        let emptied: Vec<String> = inner
            .subscriptions
            .iter_mut()
            .filter_map(|(key, subscription)| {
                subscription
                    .receivers
                    .remove(&receiver_id)
                    .filter(|_| subscription.receivers.is_empty())
                    .map(|_| key.clone())
            })
            .collect();

        let mut wire_names = Vec::with_capacity(emptied.len());
        for key in emptied {
            inner.subscriptions.remove(&key);
            if let Some(name) = inner.names.remove(&key) {
                wire_names.push(name);
            }
        }

        if inner.connected {
            wire_names
        } else {
            Vec::new()
        }
    }

    /// Stores the value and fans it out to the current receivers
    ///
    /// Returns `None` when no subscription exists for the property. Receivers
    /// are snapshotted under the lock and notified after it is released.
    pub fn publish(&self, line: PropertyLine) -> Option<usize> {
        let update = PropertyUpdate {
            name: line.name,
            value: line.value,
            received_at: Local::now(),
        };

        let receivers: Vec<(ReceiverId, mpsc::UnboundedSender<PropertyUpdate>)> = {
            let mut inner = self.lock();
            let subscription = inner.subscriptions.get_mut(&property_key(&update.name))?;
            subscription.last_update = Some(update.clone());
            subscription
                .receivers
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, sender) in receivers {
            if sender.send(update.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(property = %update.name, receiver = id, "Receiver channel closed");
            }
        }
        Some(delivered)
    }

    /// Marks the link connected and returns every desired property
    ///
    /// Both happen in one critical section, so a subscribe racing with the
    /// handshake is either in the returned list or sends its own command.
    pub fn mark_connected(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner.connected = true;
        inner.names.values().cloned().collect()
    }

    pub fn mark_disconnected(&self) {
        self.lock().connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn current_value(&self, name: &str) -> Option<TypedValue> {
        self.lock()
            .subscriptions
            .get(&property_key(name))
            .and_then(|subscription| subscription.last_update.as_ref())
            .map(|update| update.value.clone())
    }

    pub fn desired_properties(&self) -> Vec<String> {
        self.lock().names.values().cloned().collect()
    }

    pub fn receiver_count(&self, name: &str) -> usize {
        self.lock()
            .subscriptions
            .get(&property_key(name))
            .map(|subscription| subscription.receivers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::property_codec::parse_property_line;

    #[test]
    fn first_subscriber_sends_wire_only_when_connected() {
        let registry = SubscriptionRegistry::new();
        let (a, _rx_a) = registry.create_receiver();
        let (b, _rx_b) = registry.create_receiver();

        assert_eq!(registry.subscribe("speed", &a), SubscribeOutcome::Deferred);
        registry.mark_connected();
        assert_eq!(registry.subscribe("rpm", &a), SubscribeOutcome::SendWire);
        assert_eq!(registry.subscribe("RPM", &b), SubscribeOutcome::Joined);
        assert_eq!(registry.subscribe("rpm", &b), SubscribeOutcome::AlreadySubscribed);
        assert_eq!(registry.receiver_count("rpm"), 2);
    }

    #[test]
    fn last_unsubscribe_removes_subscription() {
        let registry = SubscriptionRegistry::new();
        registry.mark_connected();
        let (a, _rx_a) = registry.create_receiver();
        let (b, _rx_b) = registry.create_receiver();

        registry.subscribe("Gear", &a);
        registry.subscribe("gear", &b);

        assert_eq!(registry.unsubscribe("gear", a.id()), None);
        assert_eq!(registry.unsubscribe("GEAR", b.id()), Some("Gear".to_string()));
        assert!(registry.desired_properties().is_empty());
        assert_eq!(registry.unsubscribe("gear", b.id()), None);
    }

    #[test]
    fn replays_cached_value_to_late_subscriber() {
        let registry = SubscriptionRegistry::new();
        let (a, _rx_a) = registry.create_receiver();
        let (b, mut rx_b) = registry.create_receiver();

        registry.subscribe("gear", &a);
        let line = parse_property_line("Property gear integer 3").unwrap();
        assert_eq!(registry.publish(line), Some(1));

        registry.subscribe("gear", &b);
        let replayed = rx_b.try_recv().expect("cached value replayed");
        assert_eq!(replayed.value.raw, "3");
    }

    #[test]
    fn publish_for_unknown_property_is_dropped() {
        let registry = SubscriptionRegistry::new();
        let line = parse_property_line("Property nobody integer 1").unwrap();
        assert_eq!(registry.publish(line), None);
    }

    #[test]
    fn remove_receiver_releases_all_its_properties() {
        let registry = SubscriptionRegistry::new();
        registry.mark_connected();
        let (a, _rx_a) = registry.create_receiver();
        let (b, _rx_b) = registry.create_receiver();

        registry.subscribe("speed", &a);
        registry.subscribe("rpm", &a);
        registry.subscribe("rpm", &b);

        let mut released = registry.remove_receiver(a.id());
        released.sort();
        assert_eq!(released, vec!["speed".to_string()]);
        assert_eq!(registry.receiver_count("rpm"), 1);
    }
}
