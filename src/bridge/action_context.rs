//! One hardware action instance
//!
//! An [`ActionContext`] owns the receiver handle for the properties its
//! expressions read, the state condition and title format shown on the
//! device, and the [`CommandDispatcher`] for its command items.

use crate::command::{CommandBindings, CommandDispatcher, CommandItem, KeyboardOutput, PressSession};
use crate::config::{ActionConfig, CommandItemConfig, TimingConfig};
use crate::expression::{ExpressionError, ExpressionSlot, Labels};
use crate::telemetry::{property_key, ConnectionClient, PropertyReceiver};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the device should show for one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayUpdate {
    pub context: String,
    pub state: bool,
    pub title: String,
}

pub struct ActionContext {
    context: String,
    client: Arc<ConnectionClient>,
    receiver: PropertyReceiver,
    subscribed: BTreeSet<String>,
    labels: Labels,
    state: ExpressionSlot,
    title: ExpressionSlot,
    dispatcher: CommandDispatcher,
    press: Option<PressSession>,
    dial_press: Option<PressSession>,
    last_display: Option<(bool, String)>,
    display: mpsc::UnboundedSender<DisplayUpdate>,
    forwarder: JoinHandle<()>,
}

fn build_items(
    context: &str,
    configs: &[CommandItemConfig],
    labels: &Labels,
) -> Vec<Arc<CommandItem>> {
    configs
        .iter()
        .filter_map(|config| match CommandItem::from_config(config, Some(labels)) {
            Ok(item) => Some(Arc::new(item)),
            Err(e) => {
                error!("Skipping command item of action '{}': {}", context, e);
                None
            }
        })
        .collect()
}

fn build_bindings(config: &ActionConfig, labels: &Labels) -> CommandBindings {
    let context = config.context.as_str();
    CommandBindings {
        press: build_items(context, &config.press, labels),
        dial_left: build_items(context, &config.dial_left, labels),
        dial_right: build_items(context, &config.dial_right, labels),
        touch_tap: build_items(context, &config.touch_tap, labels),
    }
}

impl ActionContext {
    /// Builds the context, subscribes its properties and starts forwarding
    /// property changes as the context id on `changed`
    pub fn spawn(
        config: &ActionConfig,
        client: Arc<ConnectionClient>,
        keyboard: Arc<dyn KeyboardOutput>,
        timing: &TimingConfig,
        display: mpsc::UnboundedSender<DisplayUpdate>,
        changed: mpsc::UnboundedSender<String>,
    ) -> Self {
        let context = config.context.clone();
        let labels = config.labels.clone();
        let state = ExpressionSlot::from_source(&config.state, Some(&labels));
        let title = ExpressionSlot::from_source(&config.title, Some(&labels));
        let dispatcher = CommandDispatcher::spawn(
            build_bindings(config, &labels),
            client.clone(),
            keyboard,
            Some(timing.into()),
        );

        let (receiver, mut updates) = client.receiver();
        let forwarder = {
            let context = context.clone();
            tokio::spawn(async move {
                while let Some(update) = updates.recv().await {
                    debug!("Action '{}' got {} = {}", context, update.name, update.value.raw);
                    if changed.send(context.clone()).is_err() {
                        break;
                    }
                }
            })
        };

        let mut action = Self {
            context,
            client,
            receiver,
            subscribed: BTreeSet::new(),
            labels,
            state,
            title,
            dispatcher,
            press: None,
            dial_press: None,
            last_display: None,
            display,
            forwarder,
        };
        action.sync_subscriptions();
        action.refresh();
        info!(
            "Action '{}' ready, watching {} properties",
            action.context,
            action.subscribed.len()
        );
        action
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Lowercased names of the properties this action is subscribed to
    pub fn subscribed_properties(&self) -> &BTreeSet<String> {
        &self.subscribed
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn set_state(&mut self, text: &str) -> Result<(), ExpressionError> {
        let result = self.state.update_with_labels(text, Some(&self.labels));
        self.sync_subscriptions();
        self.refresh();
        result
    }

    pub fn set_title(&mut self, text: &str) -> Result<(), ExpressionError> {
        let result = self.title.update_with_labels(text, Some(&self.labels));
        self.sync_subscriptions();
        self.refresh();
        result
    }

    /// Replaces the command items from `config`
    pub fn set_bindings(&mut self, config: &ActionConfig) {
        self.dispatcher
            .set_bindings(build_bindings(config, &self.labels));
        self.sync_subscriptions();
    }

    /// Subscribes newly used properties and drops the ones no longer used
    ///
    /// Names are compared by their registry key, so `[Speed]` and `[speed]`
    /// share one subscription.
    fn sync_subscriptions(&mut self) {
        let used = self.dispatcher.bindings().used_properties();
        let mut wanted: BTreeMap<String, &str> = BTreeMap::new();
        for name in used
            .iter()
            .chain(self.state.used_properties())
            .chain(self.title.used_properties())
        {
            wanted.entry(property_key(name)).or_insert(name.as_str());
        }

        for (key, name) in &wanted {
            if !self.subscribed.contains(key) {
                self.client.subscribe(name, &self.receiver);
            }
        }
        for key in &self.subscribed {
            if !wanted.contains_key(key) {
                self.client.unsubscribe(key, &self.receiver);
            }
        }
        self.subscribed = wanted.into_keys().collect();
    }

    /// Recomputes state and title, pushing a [`DisplayUpdate`] when either changed
    pub fn refresh(&mut self) -> Option<DisplayUpdate> {
        let lookup = self.client.as_ref();
        let state = self.state.is_active(lookup);
        let title = self.title.display(lookup);

        if self.last_display.as_ref() == Some(&(state, title.clone())) {
            return None;
        }
        self.last_display = Some((state, title.clone()));

        let update = DisplayUpdate {
            context: self.context.clone(),
            state,
            title,
        };
        if self.display.send(update.clone()).is_err() {
            debug!("Display receiver is gone");
        }
        Some(update)
    }

    pub fn down(&mut self) {
        if let Some(stale) = self.press.take() {
            warn!("Action '{}' pressed twice, releasing first press", self.context);
            self.dispatcher.up(stale);
        }
        self.press = Some(self.dispatcher.down(self.client.as_ref()));
    }

    pub fn up(&mut self) {
        match self.press.take() {
            Some(session) => self.dispatcher.up(session),
            None => debug!("Action '{}' released without press", self.context),
        }
    }

    pub fn dial_down(&mut self) {
        if let Some(stale) = self.dial_press.take() {
            warn!("Dial of '{}' pressed twice, releasing first press", self.context);
            self.dispatcher.up(stale);
        }
        self.dial_press = Some(self.dispatcher.dial_down(self.client.as_ref()));
    }

    pub fn dial_up(&mut self) {
        match self.dial_press.take() {
            Some(session) => self.dispatcher.up(session),
            None => debug!("Dial of '{}' released without press", self.context),
        }
    }

    pub fn rotate(&mut self, ticks: i32) {
        self.dispatcher.rotate(ticks, self.client.as_ref());
    }

    pub fn touch_tap(&mut self) {
        self.dispatcher.touch_tap(self.client.as_ref());
    }

    /// Force-releases held external inputs, e.g. after the connection dropped
    pub fn deactivate(&mut self) -> usize {
        self.dispatcher.deactivate()
    }

    /// Releases open presses, stops the dispatcher and drops all subscriptions
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.press.take() {
            self.dispatcher.up(session);
        }
        if let Some(session) = self.dial_press.take() {
            self.dispatcher.up(session);
        }
        self.dispatcher.stop().await;
        self.client.drop_receiver(&self.receiver);
        self.subscribed.clear();
        self.forwarder.abort();
        info!("Action '{}' shut down", self.context);
    }
}
