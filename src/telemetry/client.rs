//! Reconnecting, multiplexed property client
//!
//! One TCP connection to the property server carries every subscription of
//! every consumer in the process. The connection is driven by a single tokio
//! task walking a statum state machine:
//!
//! ```text
//! Idle ──connect──► Handshaking ──banner ok──► Streaming
//!  ▲                    │                          │
//!  └────── retry after reconnect delay ◄───────────┘
//!               (socket error, EOF, bad banner)
//! ```
//!
//! Consumers never touch the socket. `subscribe`/`unsubscribe` mutate the
//! [`SubscriptionRegistry`] under its mutex and, when a wire command is
//! needed, hand it to the connection task through a channel. On every
//! successful handshake the task re-subscribes exactly the set of currently
//! desired properties.
//!
//! Role start/stop commands use a short-lived second connection per command,
//! processed in order by their own worker task.

use super::error::TelemetryError;
use super::property_codec::{parse_property_line, TypedValue};
use super::registry::{
    PropertyReceiver, PropertyUpdate, SubscribeOutcome, SubscriptionRegistry,
};
use crate::command::SimulatorCommands;
use crate::expression::PropertyLookup;
use statum::{machine, state};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection settings for the property server
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,

    /// Prefix the server's greeting line must start with
    pub banner_prefix: String,

    /// Fixed pause between reconnect attempts
    pub reconnect_delay_ms: u64,

    /// Bound on TCP connect and on waiting for the banner
    pub connect_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18082,
            banner_prefix: "SimHub Property Server".to_string(),
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 3000,
        }
    }
}

impl ClientSettings {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Commands multiplexed over the subscription connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(String),
    Unsubscribe(String),
    TriggerPressed(String),
    TriggerReleased(String),
}

impl ClientCommand {
    pub fn to_wire(&self) -> String {
        match self {
            ClientCommand::Subscribe(name) => format!("subscribe {name}\r\n"),
            ClientCommand::Unsubscribe(name) => format!("unsubscribe {name}\r\n"),
            ClientCommand::TriggerPressed(name) => format!("trigger-input-pressed {name}\r\n"),
            ClientCommand::TriggerReleased(name) => format!("trigger-input-released {name}\r\n"),
        }
    }
}

/// Role commands, each sent over its own short-lived connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleCommand {
    Start { owner_id: String, role_name: String },
    Stop { owner_id: String, role_name: String },
}

impl RoleCommand {
    pub fn to_wire(&self) -> String {
        match self {
            RoleCommand::Start {
                owner_id,
                role_name,
            } => format!("controlmapper-role-pressed {owner_id} {role_name}\r\n"),
            RoleCommand::Stop {
                owner_id,
                role_name,
            } => format!("controlmapper-role-released {owner_id} {role_name}\r\n"),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

// Link lifecycle; a failed link is dropped and a fresh Idle one created
#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Idle,
    Handshaking,
    Streaming,
}

#[machine]
pub struct TelemetryLink<S: LinkState> {
    settings: ClientSettings,
    registry: Arc<SubscriptionRegistry>,
    reader: Option<Lines<BufReader<OwnedReadHalf>>>,
    writer: Option<OwnedWriteHalf>,
}

impl TelemetryLink<Idle> {
    pub fn create(settings: ClientSettings, registry: Arc<SubscriptionRegistry>) -> Self {
        Self::new(settings, registry, None, None)
    }

    pub async fn connect(mut self) -> Result<TelemetryLink<Handshaking>, TelemetryError> {
        debug!("Connecting to property server at {}", self.settings.address());
        let stream = open_stream(&self.settings).await?;
        let (read_half, write_half) = stream.into_split();

        self.reader = Some(BufReader::new(read_half).lines());
        self.writer = Some(write_half);
        Ok(self.transition())
    }
}

impl TelemetryLink<Handshaking> {
    /// Verifies the banner and re-subscribes every desired property
    pub async fn handshake(
        mut self,
        outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<TelemetryLink<Streaming>, TelemetryError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| TelemetryError::HandshakeError("link has no reader".to_string()))?;
        with_timeout(
            self.settings.connect_timeout_ms,
            read_banner(reader, &self.settings.banner_prefix),
        )
        .await?;

        // commands queued for a dead connection; the registry is the truth
        let mut stale = 0;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Discarded {} commands queued before reconnect", stale);
        }

        let desired = self.registry.mark_connected();
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TelemetryError::HandshakeError("link has no writer".to_string()))?;
        for name in &desired {
            writer
                .write_all(ClientCommand::Subscribe(name.clone()).to_wire().as_bytes())
                .await?;
        }

        info!(
            "Connected to property server at {}, subscribed {} properties",
            self.settings.address(),
            desired.len()
        );
        Ok(self.transition())
    }
}

impl TelemetryLink<Streaming> {
    /// Pumps server lines into the registry and commands onto the socket
    ///
    /// Returns `Ok` only on shutdown, after flushing queued commands.
    pub async fn stream(
        mut self,
        outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
        shutdown: &CancellationToken,
    ) -> Result<(), TelemetryError> {
        let (Some(reader), Some(writer)) = (self.reader.as_mut(), self.writer.as_mut()) else {
            return Err(TelemetryError::HandshakeError(
                "streaming link without socket".to_string(),
            ));
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    while let Ok(command) = outbound.try_recv() {
                        writer.write_all(command.to_wire().as_bytes()).await?;
                    }
                    writer.flush().await?;
                    return Ok(());
                }

                line = reader.next_line() => {
                    match line? {
                        Some(line) => handle_line(&self.registry, &line),
                        None => return Err(TelemetryError::ConnectionClosed),
                    }
                }

                command = outbound.recv() => {
                    match command {
                        Some(command) => {
                            debug!("Sending {:?}", command);
                            writer.write_all(command.to_wire().as_bytes()).await?;
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

fn handle_line(registry: &SubscriptionRegistry, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    match parse_property_line(line) {
        Ok(property) => {
            let name = property.name.clone();
            match registry.publish(property) {
                Some(delivered) => {
                    debug!(property = %name, delivered, "Property update");
                }
                None => {
                    // server push racing a local unsubscribe
                    debug!(property = %name, "Dropping update for property without subscription");
                }
            }
        }
        Err(e) => warn!("Dropping line from property server: {}", e),
    }
}

async fn open_stream(settings: &ClientSettings) -> Result<TcpStream, TelemetryError> {
    let stream = with_timeout(settings.connect_timeout_ms, async {
        TcpStream::connect(settings.address())
            .await
            .map_err(TelemetryError::from)
    })
    .await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn with_timeout<T, F>(timeout_ms: u64, future: F) -> Result<T, TelemetryError>
where
    F: Future<Output = Result<T, TelemetryError>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::ConnectTimeout(timeout_ms)),
    }
}

async fn read_banner(
    reader: &mut Lines<BufReader<OwnedReadHalf>>,
    prefix: &str,
) -> Result<(), TelemetryError> {
    match reader.next_line().await? {
        Some(line) if line.starts_with(prefix) => {
            debug!("Server banner: {}", line.trim_end());
            Ok(())
        }
        Some(line) => Err(TelemetryError::HandshakeError(format!(
            "unexpected banner: {}",
            line.trim_end()
        ))),
        None => Err(TelemetryError::ConnectionClosed),
    }
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, new_state: ConnectionState) {
    state_tx.send_if_modified(|current| {
        let changed = *current != new_state;
        *current = new_state;
        changed
    });
}

async fn connect_and_stream(
    settings: &ClientSettings,
    registry: &Arc<SubscriptionRegistry>,
    outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
    state_tx: &watch::Sender<ConnectionState>,
    shutdown: &CancellationToken,
) -> Result<(), TelemetryError> {
    let link = TelemetryLink::create(settings.clone(), Arc::clone(registry))
        .connect()
        .await?;
    let link = link.handshake(outbound).await?;
    set_state(state_tx, ConnectionState::Connected);
    link.stream(outbound, shutdown).await
}

async fn run_connection_loop(
    settings: ClientSettings,
    registry: Arc<SubscriptionRegistry>,
    mut outbound: mpsc::UnboundedReceiver<ClientCommand>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
) {
    info!("Starting property connection loop for {}", settings.address());
    let delay = Duration::from_millis(settings.reconnect_delay_ms);

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => Ok(()),
            result = connect_and_stream(&settings, &registry, &mut outbound, &state_tx, &shutdown) => result,
        };

        registry.mark_disconnected();
        set_state(&state_tx, ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                if shutdown.is_cancelled() {
                    break;
                }
            }
            Err(e) => {
                warn!(
                    "Property server connection failed: {}. Retrying in {}ms",
                    e, settings.reconnect_delay_ms
                );
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Property connection loop stopped");
}

async fn send_role_command(
    settings: &ClientSettings,
    command: &RoleCommand,
) -> Result<(), TelemetryError> {
    let stream = open_stream(settings).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    with_timeout(
        settings.connect_timeout_ms,
        read_banner(&mut reader, &settings.banner_prefix),
    )
    .await?;
    write_half.write_all(command.to_wire().as_bytes()).await?;
    write_half.shutdown().await?;
    Ok(())
}

// Exits once the client (the only sender) is dropped, after draining, so
// role stops issued during teardown still go out.
async fn run_role_worker(settings: ClientSettings, mut commands: mpsc::UnboundedReceiver<RoleCommand>) {
    while let Some(command) = commands.recv().await {
        debug!("Sending role command {:?}", command);
        if let Err(e) = send_role_command(&settings, &command).await {
            warn!("Role command {:?} failed: {}", command, e);
        }
    }
    debug!("Role worker stopped");
}

/// Shared handle to the property server connection
#[derive(Debug)]
pub struct ConnectionClient {
    registry: Arc<SubscriptionRegistry>,
    outbound: mpsc::UnboundedSender<ClientCommand>,
    roles: mpsc::UnboundedSender<RoleCommand>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
}

impl ConnectionClient {
    /// Spawns the connection and role tasks on the current tokio runtime
    ///
    /// The returned client starts disconnected; subscriptions made before the
    /// first handshake are sent as part of it.
    pub fn spawn(settings: Option<ClientSettings>) -> Arc<Self> {
        let settings = settings.unwrap_or_default();
        info!("Spawning ConnectionClient with settings: {:?}", settings);

        let registry = Arc::new(SubscriptionRegistry::new());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (roles_tx, roles_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();

        tokio::spawn(run_connection_loop(
            settings.clone(),
            Arc::clone(&registry),
            outbound_rx,
            state_tx,
            shutdown.clone(),
        ));
        tokio::spawn(run_role_worker(settings, roles_rx));

        Arc::new(Self {
            registry,
            outbound: outbound_tx,
            roles: roles_tx,
            state: state_rx,
            shutdown,
        })
    }

    /// Creates a receiver handle and the channel its updates arrive on
    pub fn receiver(&self) -> (PropertyReceiver, mpsc::UnboundedReceiver<PropertyUpdate>) {
        self.registry.create_receiver()
    }

    pub fn subscribe(&self, name: &str, receiver: &PropertyReceiver) {
        match self.registry.subscribe(name, receiver) {
            SubscribeOutcome::SendWire => {
                self.send(ClientCommand::Subscribe(name.to_string()));
            }
            SubscribeOutcome::Deferred => {
                debug!(property = %name, "Subscription deferred until connected");
            }
            SubscribeOutcome::Joined | SubscribeOutcome::AlreadySubscribed => {}
        }
    }

    pub fn unsubscribe(&self, name: &str, receiver: &PropertyReceiver) {
        if let Some(wire_name) = self.registry.unsubscribe(name, receiver.id()) {
            self.send(ClientCommand::Unsubscribe(wire_name));
        }
    }

    /// Unsubscribes `receiver` from everything it holds
    pub fn drop_receiver(&self, receiver: &PropertyReceiver) {
        for wire_name in self.registry.remove_receiver(receiver.id()) {
            self.send(ClientCommand::Unsubscribe(wire_name));
        }
    }

    pub fn current_value(&self, name: &str) -> Option<TypedValue> {
        self.registry.current_value(name)
    }

    pub fn desired_properties(&self) -> Vec<String> {
        self.registry.desired_properties()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    /// Stops the connection task; idempotent
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down ConnectionClient");
            self.shutdown.cancel();
        }
    }

    fn send(&self, command: ClientCommand) {
        if let Err(e) = self.outbound.send(command) {
            error!("Connection task is gone, dropping {:?}", e.0);
        }
    }

    fn send_trigger(&self, command: ClientCommand) {
        if self.registry.is_connected() {
            self.send(command);
        } else {
            warn!("Not connected to property server, dropping {:?}", command);
        }
    }

    fn send_role(&self, command: RoleCommand) {
        if let Err(e) = self.roles.send(command) {
            error!("Role worker is gone, dropping {:?}", e.0);
        }
    }
}

impl Drop for ConnectionClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl SimulatorCommands for ConnectionClient {
    fn trigger_input_pressed(&self, name: &str) {
        self.send_trigger(ClientCommand::TriggerPressed(name.to_string()));
    }

    fn trigger_input_released(&self, name: &str) {
        self.send_trigger(ClientCommand::TriggerReleased(name.to_string()));
    }

    fn role_started(&self, owner_id: &str, role_name: &str) {
        self.send_role(RoleCommand::Start {
            owner_id: owner_id.to_string(),
            role_name: role_name.to_string(),
        });
    }

    fn role_stopped(&self, owner_id: &str, role_name: &str) {
        self.send_role(RoleCommand::Stop {
            owner_id: owner_id.to_string(),
            role_name: role_name.to_string(),
        });
    }
}

impl PropertyLookup for ConnectionClient {
    fn lookup(&self, name: &str) -> Option<TypedValue> {
        self.current_value(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::net::TcpListener;

    const BANNER: &str = "SimHub Property Server v1.1\r\n";

    struct FakeServer {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl FakeServer {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
                .await
                .expect("client connects")
                .unwrap();
            let (read_half, mut writer) = stream.into_split();
            writer.write_all(BANNER.as_bytes()).await.unwrap();
            Self {
                lines: BufReader::new(read_half).lines(),
                writer,
            }
        }

        async fn expect_line(&mut self) -> String {
            tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("line within timeout")
                .unwrap()
                .expect("connection open")
        }

        async fn push(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }
    }

    async fn listener_and_settings() -> (TcpListener, ClientSettings) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let settings = ClientSettings {
            host: "127.0.0.1".to_string(),
            port,
            reconnect_delay_ms: 50,
            connect_timeout_ms: 2000,
            ..Default::default()
        };
        (listener, settings)
    }

    async fn wait_connected(client: &ConnectionClient) {
        let mut state = client.connection_state();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .expect("connected in time")
        .unwrap();
    }

    async fn recv_update(rx: &mut mpsc::UnboundedReceiver<PropertyUpdate>) -> PropertyUpdate {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("update within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn deferred_subscription_sent_on_handshake() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));
        let (receiver, _rx) = client.receiver();
        client.subscribe("dcp.gd.SpeedKmh", &receiver);

        let mut server = FakeServer::accept(&listener).await;
        assert_eq!(server.expect_line().await, "subscribe dcp.gd.SpeedKmh");
        client.shutdown();
    }

    #[tokio::test]
    async fn ref_counted_subscription_sends_one_unsubscribe() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));
        let mut server = FakeServer::accept(&listener).await;
        wait_connected(&client).await;

        let (a, _rx_a) = client.receiver();
        let (b, _rx_b) = client.receiver();
        let (c, _rx_c) = client.receiver();
        client.subscribe("rpm", &a);
        client.subscribe("rpm", &b);
        client.subscribe("RPM", &c);
        assert_eq!(server.expect_line().await, "subscribe rpm");

        client.unsubscribe("rpm", &b);
        client.unsubscribe("rpm", &a);
        client.trigger_input_pressed("marker");
        assert_eq!(server.expect_line().await, "trigger-input-pressed marker");

        client.unsubscribe("rpm", &c);
        assert_eq!(server.expect_line().await, "unsubscribe rpm");
        client.shutdown();
    }

    #[tokio::test]
    async fn cached_value_replayed_without_round_trip() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));
        let mut server = FakeServer::accept(&listener).await;
        wait_connected(&client).await;

        let (a, mut rx_a) = client.receiver();
        client.subscribe("gear", &a);
        assert_eq!(server.expect_line().await, "subscribe gear");
        server.push("Property gear integer 4").await;
        assert_eq!(recv_update(&mut rx_a).await.value.raw, "4");

        let (b, mut rx_b) = client.receiver();
        client.subscribe("gear", &b);
        let replayed = rx_b.try_recv().expect("replayed synchronously");
        assert_eq!(replayed.value.raw, "4");

        client.trigger_input_pressed("marker");
        assert_eq!(server.expect_line().await, "trigger-input-pressed marker");
        client.shutdown();
    }

    #[tokio::test]
    async fn reconnect_resubscribes_exactly_desired_set() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));
        let mut server = FakeServer::accept(&listener).await;
        wait_connected(&client).await;

        let (receiver, _rx) = client.receiver();
        for name in ["p1", "p2", "p3"] {
            client.subscribe(name, &receiver);
            assert_eq!(server.expect_line().await, format!("subscribe {name}"));
        }
        client.unsubscribe("p2", &receiver);
        assert_eq!(server.expect_line().await, "unsubscribe p2");

        drop(server);

        let mut server = FakeServer::accept(&listener).await;
        let mut resubscribed = HashSet::new();
        resubscribed.insert(server.expect_line().await);
        resubscribed.insert(server.expect_line().await);
        let expected: HashSet<String> = ["subscribe p1", "subscribe p3"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(resubscribed, expected);

        wait_connected(&client).await;
        client.trigger_input_pressed("marker");
        assert_eq!(server.expect_line().await, "trigger-input-pressed marker");
        client.shutdown();
    }

    #[tokio::test]
    async fn bad_lines_do_not_drop_the_connection() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));
        let mut server = FakeServer::accept(&listener).await;
        wait_connected(&client).await;

        let (receiver, mut rx) = client.receiver();
        client.subscribe("speed", &receiver);
        assert_eq!(server.expect_line().await, "subscribe speed");

        server.push("complete nonsense").await;
        server.push("Property ghost integer 1").await;
        server.push("Property speed double abc").await;
        server.push("Property speed double 187.5").await;

        let update = recv_update(&mut rx).await;
        assert_eq!(update.value.raw, "187.5");
        assert!(client.is_connected());
        assert_eq!(
            client.current_value("SPEED").and_then(|v| v.value),
            Some(crate::telemetry::PropertyValue::Double(187.5))
        );
        client.shutdown();
    }

    #[tokio::test]
    async fn wrong_banner_triggers_retry() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));

        let (stream, _) = listener.accept().await.unwrap();
        let (_read_half, mut writer) = stream.into_split();
        writer.write_all(b"HTTP/1.1 400 Bad Request\r\n").await.unwrap();

        let _server = FakeServer::accept(&listener).await;
        wait_connected(&client).await;
        client.shutdown();
    }

    #[tokio::test]
    async fn role_commands_use_side_connection() {
        let (listener, settings) = listener_and_settings().await;
        let client = ConnectionClient::spawn(Some(settings));
        let _main = FakeServer::accept(&listener).await;
        wait_connected(&client).await;

        client.role_started("deck-1", "Pit Limiter");
        let mut side = FakeServer::accept(&listener).await;
        assert_eq!(
            side.expect_line().await,
            "controlmapper-role-pressed deck-1 Pit Limiter"
        );
        client.shutdown();
    }

    #[test]
    fn wire_commands_are_crlf_terminated() {
        assert_eq!(
            ClientCommand::Subscribe("a.b".to_string()).to_wire(),
            "subscribe a.b\r\n"
        );
        assert_eq!(
            ClientCommand::TriggerReleased("x".to_string()).to_wire(),
            "trigger-input-released x\r\n"
        );
        assert_eq!(
            RoleCommand::Stop {
                owner_id: "o".to_string(),
                role_name: "r".to_string()
            }
            .to_wire(),
            "controlmapper-role-released o r\r\n"
        );
    }
}
