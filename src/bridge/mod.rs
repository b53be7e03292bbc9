//! # Bridge
//!
//! Wires hardware actions to telemetry and commands.
//!
//! ```text
//! bridge/
//! ├── action_context.rs - one hardware action: subscriptions, display, dispatcher
//! ├── hardware.rs       - HardwareEvent and the console event source
//! └── error.rs          - BridgeError
//! ```
//!
//! [`Bridge::run`] is the single loop that owns every [`ActionContext`]. It
//! reacts to hardware events, to property changes forwarded by the contexts
//! and to connection state changes; on disconnect every dispatcher is
//! deactivated so no external input stays pressed.

pub mod action_context;
pub mod error;
pub mod hardware;

pub use action_context::{ActionContext, DisplayUpdate};
pub use error::BridgeError;
pub use hardware::{spawn_console_source, HardwareEvent};

use crate::command::KeyboardOutput;
use crate::config::AppConfig;
use crate::telemetry::{ConnectionClient, ConnectionState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Bridge {
    client: Arc<ConnectionClient>,
    contexts: HashMap<String, ActionContext>,
    changed: mpsc::UnboundedReceiver<String>,
}

impl Bridge {
    /// Creates one [`ActionContext`] per configured action
    ///
    /// Returns the bridge and the channel display updates arrive on.
    pub fn new(
        config: &AppConfig,
        client: Arc<ConnectionClient>,
        keyboard: Arc<dyn KeyboardOutput>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DisplayUpdate>), BridgeError> {
        let (display_tx, display_rx) = mpsc::unbounded_channel();
        let (changed_tx, changed_rx) = mpsc::unbounded_channel();

        let mut contexts = HashMap::new();
        for action in &config.actions {
            if contexts.contains_key(&action.context) {
                return Err(BridgeError::DuplicateContext(action.context.clone()));
            }
            let context = ActionContext::spawn(
                action,
                client.clone(),
                keyboard.clone(),
                &config.timing,
                display_tx.clone(),
                changed_tx.clone(),
            );
            contexts.insert(action.context.clone(), context);
        }
        info!("Bridge created with {} actions", contexts.len());

        Ok((
            Self {
                client,
                contexts,
                changed: changed_rx,
            },
            display_rx,
        ))
    }

    pub fn context(&self, context: &str) -> Option<&ActionContext> {
        self.contexts.get(context)
    }

    pub fn context_mut(&mut self, context: &str) -> Option<&mut ActionContext> {
        self.contexts.get_mut(context)
    }

    /// Routes a hardware event to its action
    pub fn handle(&mut self, event: HardwareEvent) -> Result<(), BridgeError> {
        let action = self
            .contexts
            .get_mut(event.context())
            .ok_or_else(|| BridgeError::UnknownContext(event.context().to_string()))?;

        match event {
            HardwareEvent::Down { .. } => action.down(),
            HardwareEvent::Up { .. } => action.up(),
            HardwareEvent::DialRotate { ticks, .. } => action.rotate(ticks),
            HardwareEvent::DialDown { .. } => action.dial_down(),
            HardwareEvent::DialUp { .. } => action.dial_up(),
            HardwareEvent::TouchTap { .. } => action.touch_tap(),
        }
        Ok(())
    }

    pub fn on_property_changed(&mut self, context: &str) {
        match self.contexts.get_mut(context) {
            Some(action) => {
                action.refresh();
            }
            None => debug!("Property change for removed action '{}'", context),
        }
    }

    /// Refreshes every display and, on disconnect, deactivates every action
    ///
    /// The client is already marked disconnected when this runs, so forced
    /// trigger releases only clear the trackers and are logged; they do not
    /// reach the server. Role stops still go out over their side connection.
    pub fn on_connection_state(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                info!("Property server connected");
                for action in self.contexts.values_mut() {
                    action.refresh();
                }
            }
            ConnectionState::Disconnected => {
                warn!("Property server disconnected, deactivating all actions");
                for action in self.contexts.values_mut() {
                    action.deactivate();
                    action.refresh();
                }
            }
        }
    }

    /// Runs until `shutdown` fires or the event source closes, then shuts
    /// every action down
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HardwareEvent>,
        shutdown: CancellationToken,
    ) {
        let mut state = self.client.connection_state();
        info!("Bridge running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle(event) {
                            warn!("{}", e);
                        }
                    }
                    None => {
                        info!("Hardware event source closed");
                        break;
                    }
                },
                Some(context) = self.changed.recv() => self.on_property_changed(&context),
                changed = state.changed() => {
                    if changed.is_err() {
                        warn!("Connection state channel closed");
                        break;
                    }
                    let current = *state.borrow_and_update();
                    self.on_connection_state(current);
                }
            }
        }

        self.shutdown().await;
    }

    /// Releases everything held and drops every subscription
    pub async fn shutdown(&mut self) {
        for action in self.contexts.values_mut() {
            action.shutdown().await;
        }
        info!("Bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{LoggingKeyboard, SimulatorCommands};
    use crate::telemetry::ClientSettings;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const CONFIG: &str = r#"
[timing]
long_press_ms = 0

[[action]]
context = "pit"
state = "[speed] > 50"
title = "format([speed], '0') + ' ' + unit"
labels = { unit = "km/h" }

[[action.press]]
type = "trigger"
name = "horn"
"#;

    struct Server {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Server {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
                .await
                .unwrap()
                .unwrap();
            let (read_half, mut writer) = stream.into_split();
            writer
                .write_all(b"SimHub Property Server v1.1\r\n")
                .await
                .unwrap();
            Self {
                lines: BufReader::new(read_half).lines(),
                writer,
            }
        }

        async fn expect_line(&mut self) -> String {
            timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        }

        async fn push(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }
    }

    async fn connected_bridge() -> (Bridge, mpsc::UnboundedReceiver<DisplayUpdate>, Server) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        connected_bridge_on(&listener).await
    }

    async fn connected_bridge_on(
        listener: &TcpListener,
    ) -> (Bridge, mpsc::UnboundedReceiver<DisplayUpdate>, Server) {
        let settings = ClientSettings {
            port: listener.local_addr().unwrap().port(),
            reconnect_delay_ms: 50,
            ..Default::default()
        };
        let client = ConnectionClient::spawn(Some(settings));
        let config = AppConfig::parse(CONFIG).unwrap();
        let (bridge, display) = Bridge::new(&config, client, Arc::new(LoggingKeyboard)).unwrap();

        let mut server = Server::accept(listener).await;
        assert_eq!(server.expect_line().await, "subscribe speed");
        (bridge, display, server)
    }

    async fn next_display(display: &mut mpsc::UnboundedReceiver<DisplayUpdate>) -> DisplayUpdate {
        timeout(Duration::from_secs(5), display.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn property_changes_update_display_once() {
        let (mut bridge, mut display, mut server) = connected_bridge().await;

        let initial = next_display(&mut display).await;
        assert_eq!(initial.title, " km/h");
        assert!(!initial.state);

        server.push("Property speed double 72.4").await;
        let context = timeout(Duration::from_secs(5), bridge.changed.recv())
            .await
            .unwrap()
            .unwrap();
        bridge.on_property_changed(&context);
        assert_eq!(
            next_display(&mut display).await,
            DisplayUpdate {
                context: "pit".to_string(),
                state: true,
                title: "72 km/h".to_string(),
            }
        );

        bridge.on_property_changed("pit");
        assert!(display.try_recv().is_err());
    }

    #[tokio::test]
    async fn routes_presses_and_deactivation_releases_held_trigger() {
        let (mut bridge, _display, mut server) = connected_bridge().await;

        bridge
            .handle(HardwareEvent::Down {
                context: "pit".to_string(),
            })
            .unwrap();
        assert_eq!(server.expect_line().await, "trigger-input-pressed horn");

        assert_eq!(bridge.context_mut("pit").unwrap().deactivate(), 1);
        assert_eq!(server.expect_line().await, "trigger-input-released horn");
        assert_eq!(
            bridge.context("pit").unwrap().dispatcher().tracker().pressed_count(),
            0
        );

        assert_eq!(
            bridge.handle(HardwareEvent::Up {
                context: "nowhere".to_string()
            }),
            Err(BridgeError::UnknownContext("nowhere".to_string()))
        );
    }

    #[tokio::test]
    async fn disconnect_clears_held_triggers_without_sending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut bridge, _display, mut server) = connected_bridge_on(&listener).await;

        bridge
            .handle(HardwareEvent::Down {
                context: "pit".to_string(),
            })
            .unwrap();
        assert_eq!(server.expect_line().await, "trigger-input-pressed horn");

        drop(server);
        let mut state = bridge.client.connection_state();
        timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        bridge.on_connection_state(ConnectionState::Disconnected);
        assert_eq!(
            bridge.context("pit").unwrap().dispatcher().tracker().pressed_count(),
            0
        );

        let mut server = Server::accept(&listener).await;
        assert_eq!(server.expect_line().await, "subscribe speed");
        bridge.client.trigger_input_pressed("marker");
        assert_eq!(server.expect_line().await, "trigger-input-pressed marker");
    }

    #[tokio::test]
    async fn changing_expressions_diffs_subscriptions() {
        let (mut bridge, _display, mut server) = connected_bridge().await;
        let action = bridge.context_mut("pit").unwrap();

        action.set_title("[gear]").unwrap();
        assert_eq!(server.expect_line().await, "subscribe gear");

        assert!(action.set_state("[speed] >").is_err());
        action.set_state("").unwrap();
        assert_eq!(server.expect_line().await, "unsubscribe speed");

        let watched: Vec<&str> = action
            .subscribed_properties()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(watched, vec!["gear"]);

        let rebound = AppConfig::parse(
            r#"
[[action]]
context = "pit"

[[action.touch_tap]]
type = "keypress"
hotkey = "Ctrl+F"
condition = "[fuel] < 5"
"#,
        )
        .unwrap();
        action.set_bindings(&rebound.actions[0]);
        assert_eq!(server.expect_line().await, "subscribe fuel");
        assert_eq!(action.dispatcher().bindings().touch_tap.len(), 1);
        assert!(action.dispatcher().bindings().press.is_empty());
    }

    #[tokio::test]
    async fn differently_cased_names_share_one_subscription() {
        let (mut bridge, _display, mut server) = connected_bridge().await;
        let client = bridge.client.clone();
        let action = bridge.context_mut("pit").unwrap();

        action.set_title("[Speed]").unwrap();
        action.set_title("").unwrap();
        client.trigger_input_pressed("marker");
        assert_eq!(server.expect_line().await, "trigger-input-pressed marker");
        assert_eq!(client.desired_properties(), vec!["speed".to_string()]);

        let watched: Vec<&str> = action
            .subscribed_properties()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(watched, vec!["speed"]);

        action.set_state("[SPEED] > 50 && [Gear] > 0").unwrap();
        assert_eq!(server.expect_line().await, "subscribe Gear");
        action.set_state("").unwrap();
        let mut dropped = vec![server.expect_line().await, server.expect_line().await];
        dropped.sort();
        assert_eq!(dropped, vec!["unsubscribe Gear", "unsubscribe speed"]);
    }

    #[tokio::test]
    async fn shutdown_drops_subscriptions() {
        let (mut bridge, _display, mut server) = connected_bridge().await;
        bridge.shutdown().await;
        assert_eq!(server.expect_line().await, "unsubscribe speed");
    }
}
