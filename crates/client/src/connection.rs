//! Socket.IO connection management
//!
//! A `SocketManager` owns at most one live connection to the backend's
//! `/whatsapp` namespace. Only the owner can connect, reconnect or
//! disconnect; everyone else observes through event receivers, the status
//! watch, or an `Emitter`.
//!
//! Each connection runs two tasks: a reader that decodes frames, answers
//! Engine.IO pings and publishes `ServerEvent`s, and a writer that drains
//! the outbound channel into the socket.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use wadash_protocol::packet::ENGINE_IO_VERSION;
use wadash_protocol::{
    EnginePacket, Handshake, ServerEvent, SocketPacket, SocketPacketKind, DEFAULT_NAMESPACE,
};

use crate::commands::Emitter;
use crate::error::ClientError;
use crate::notify::{Notification, Notifier, Severity};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_CAPACITY: usize = 100;
const EVENT_CAPACITY: usize = 1024;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `http(s)://host[:port]` of the backend.
    pub base_url: String,
    pub namespace: String,
    /// Sent as `auth.token` in the namespace connect packet.
    pub token: Option<String>,
    pub handshake_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            token: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Engine.IO WebSocket endpoint for the configured backend.
    pub fn socket_url(&self) -> Result<String, ClientError> {
        let base = self.base_url.trim().trim_end_matches('/');
        let invalid = |reason: &str| ClientError::InvalidUrl {
            url: self.base_url.clone(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = base
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return Err(invalid("expected http, https, ws or wss")),
        };
        if rest.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(format!(
            "{ws_scheme}://{rest}/socket.io/?EIO={ENGINE_IO_VERSION}&transport=websocket"
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Frames queued for the writer task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(String),
    Close,
}

/// Route from emitters to the live connection's writer.
#[derive(Debug)]
pub(crate) struct Link {
    pub(crate) generation: u64,
    pub(crate) namespace: String,
    pub(crate) outbound: mpsc::Sender<Outbound>,
}

/// Channels that outlive individual connections.
#[derive(Clone)]
struct Shared {
    events: broadcast::Sender<ServerEvent>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    link: Arc<ArcSwapOption<Link>>,
    notifier: Notifier,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        match &*self.link.load() {
            Some(link) => link.generation == generation,
            None => false,
        }
    }
}

struct Connection {
    sid: String,
    outbound: mpsc::Sender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    async fn close(self, namespace: &str) {
        let Connection {
            outbound,
            reader,
            writer,
            ..
        } = self;

        let goodbye = EnginePacket::Message(SocketPacket::disconnect(namespace).encode()).encode();
        let _ = outbound.send(Outbound::Frame(goodbye)).await;
        let _ = outbound.send(Outbound::Close).await;

        reader.abort();
        let _ = reader.await;
        let _ = timeout(WRITER_DRAIN_TIMEOUT, writer).await;
    }
}

pub struct SocketManager {
    config: ConnectionConfig,
    connection: Option<Connection>,
    generation: u64,
    shared: Shared,
}

impl SocketManager {
    pub fn new(config: ConnectionConfig, notifier: Notifier) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config,
            connection: None,
            generation: 0,
            shared: Shared {
                events,
                status: Arc::new(status),
                link: Arc::new(ArcSwapOption::empty()),
                notifier,
            },
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Receive every event decoded from any connection this manager opens.
    /// Subscribe before `connect()` to see the `initial-state` snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && *self.shared.status.borrow() == ConnectionStatus::Connected
    }

    /// Engine.IO session id of the live connection.
    pub fn sid(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.sid.as_str())
    }

    /// Command emitter bound to this manager; stays valid across reconnects.
    pub fn emitter(&self) -> Emitter {
        Emitter::new(self.shared.link.clone(), self.shared.status.subscribe())
    }

    /// Connect, or keep the existing connection if it is still alive.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.is_connected() {
            debug!(
                component = "connection",
                event = "connection.reuse",
                base_url = %self.config.base_url,
                "Reusing live connection"
            );
            return Ok(());
        }

        if let Some(stale) = self.connection.take() {
            stale.close(&self.config.namespace).await;
        }

        self.generation += 1;
        self.shared
            .status
            .send_replace(ConnectionStatus::Connecting);

        match open(&self.config, self.shared.clone(), self.generation).await {
            Ok(connection) => {
                info!(
                    component = "connection",
                    event = "connection.opened",
                    base_url = %self.config.base_url,
                    namespace = %self.config.namespace,
                    sid = %connection.sid,
                    "Connected to backend"
                );
                self.connection = Some(connection);
                Ok(())
            }
            Err(err) => {
                self.shared
                    .status
                    .send_replace(ConnectionStatus::Disconnected);
                self.shared
                    .notifier
                    .notify(Notification::error("Connection error", err.to_string()));
                Err(err)
            }
        }
    }

    /// Drop the current connection (if any) and build a fresh one.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Tear down the connection; the next `connect()` starts from scratch.
    pub async fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        self.shared.link.store(None);
        connection.close(&self.config.namespace).await;
        self.shared
            .status
            .send_replace(ConnectionStatus::Disconnected);
        info!(
            component = "connection",
            event = "connection.closed",
            base_url = %self.config.base_url,
            "Disconnected from backend"
        );
    }
}

async fn open(
    config: &ConnectionConfig,
    shared: Shared,
    generation: u64,
) -> Result<Connection, ClientError> {
    let url = config.socket_url()?;
    let (sink, source, opened, sid) = timeout(config.handshake_timeout, handshake(&url, config))
        .await
        .map_err(|_| ClientError::HandshakeTimeout(config.handshake_timeout))??;

    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    shared.link.store(Some(Arc::new(Link {
        generation,
        namespace: config.namespace.clone(),
        outbound: outbound.clone(),
    })));
    shared.status.send_replace(ConnectionStatus::Connected);

    let liveness = Duration::from_millis(opened.ping_interval + opened.ping_timeout);
    let writer = tokio::spawn(write_loop(sink, outbound_rx));
    let reader = tokio::spawn(read_loop(
        source,
        shared,
        outbound.clone(),
        config.namespace.clone(),
        generation,
        liveness,
    ));

    Ok(Connection {
        sid,
        outbound,
        reader,
        writer,
    })
}

/// Engine.IO open followed by the namespace connect exchange.
async fn handshake(
    url: &str,
    config: &ConnectionConfig,
) -> Result<(WsSink, WsSource, Handshake, String), ClientError> {
    let (ws, _response) = connect_async(url).await?;
    let (mut sink, mut source) = ws.split();

    let opened = loop {
        match next_packet(&mut source).await? {
            EnginePacket::Open(handshake) => break handshake,
            EnginePacket::Noop => continue,
            other => return Err(ClientError::UnexpectedFrame(other.encode())),
        }
    };

    let mut connect = SocketPacket::connect(&config.namespace);
    if let Some(token) = &config.token {
        connect.data = Some(json!({ "token": token }));
    }
    sink.send(Message::text(EnginePacket::Message(connect.encode()).encode()))
        .await?;

    loop {
        match next_packet(&mut source).await? {
            EnginePacket::Ping(body) => {
                sink.send(Message::text(EnginePacket::Pong(body).encode()))
                    .await?;
            }
            EnginePacket::Message(body) => {
                let packet = SocketPacket::decode(&body)?;
                if packet.namespace != config.namespace {
                    continue;
                }
                match packet.kind {
                    SocketPacketKind::Connect => {
                        let sid = packet
                            .data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .unwrap_or(opened.sid.as_str())
                            .to_string();
                        return Ok((sink, source, opened, sid));
                    }
                    SocketPacketKind::ConnectError => {
                        return Err(ClientError::ConnectRefused {
                            namespace: config.namespace.clone(),
                            message: packet
                                .error_message()
                                .unwrap_or_else(|| "connection refused".to_string()),
                        });
                    }
                    _ => continue,
                }
            }
            EnginePacket::Close => return Err(ClientError::ClosedDuringHandshake),
            _ => continue,
        }
    }
}

async fn next_packet(source: &mut WsSource) -> Result<EnginePacket, ClientError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::ClosedDuringHandshake),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn write_loop(mut sink: WsSink, mut outbound_rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            Outbound::Frame(frame) => {
                if let Err(e) = sink.send(Message::text(frame)).await {
                    debug!(
                        component = "connection",
                        event = "connection.send_failed",
                        error = %e,
                        "WebSocket send failed, server gone"
                    );
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}

async fn read_loop(
    mut source: WsSource,
    shared: Shared,
    outbound: mpsc::Sender<Outbound>,
    namespace: String,
    generation: u64,
    liveness: Duration,
) {
    let reason = loop {
        let next = match timeout(liveness, source.next()).await {
            Ok(next) => next,
            Err(_) => break format!("ping timeout: no frame for {}ms", liveness.as_millis()),
        };
        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break "socket closed".to_string(),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(
                    component = "connection",
                    event = "connection.read_error",
                    error = %e,
                    "WebSocket error"
                );
                break format!("transport error: {e}");
            }
        };

        let packet = match EnginePacket::decode(text.as_str()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(
                    component = "connection",
                    event = "connection.frame.parse_failed",
                    error = %e,
                    payload_bytes = text.len(),
                    "Failed to parse frame"
                );
                continue;
            }
        };

        match packet {
            EnginePacket::Ping(body) => {
                let _ = outbound
                    .send(Outbound::Frame(EnginePacket::Pong(body).encode()))
                    .await;
            }
            EnginePacket::Message(body) => {
                if !dispatch(&body, &namespace, &shared) {
                    break "namespace disconnected by server".to_string();
                }
            }
            EnginePacket::Close => break "server closed the session".to_string(),
            _ => {}
        }
    };

    let _ = outbound.send(Outbound::Close).await;

    if shared.is_current(generation) {
        shared.link.store(None);
        shared
            .status
            .send_replace(ConnectionStatus::Disconnected);
        info!(
            component = "connection",
            event = "connection.lost",
            generation,
            reason = %reason,
            "Connection to backend lost"
        );
        shared.notifier.notify(Notification::new(
            Severity::Warning,
            "Disconnected from backend",
            Some(reason),
        ));
    }
}

/// Handle one Socket.IO packet. Returns `false` once the namespace is gone.
fn dispatch(body: &str, namespace: &str, shared: &Shared) -> bool {
    let packet = match SocketPacket::decode(body) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(
                component = "connection",
                event = "connection.packet.parse_failed",
                error = %e,
                "Failed to parse socket.io packet"
            );
            return true;
        }
    };
    if packet.namespace != namespace {
        return true;
    }

    match packet.kind {
        SocketPacketKind::Event => {
            let Some((name, args)) = packet.into_event() else {
                return true;
            };
            match ServerEvent::from_socket(&name, args) {
                Ok(Some(event)) => {
                    debug!(
                        component = "connection",
                        event = "connection.event.received",
                        name = %name,
                        session_id = event.session_id().unwrap_or("")
                    );
                    let _ = shared.events.send(event);
                }
                Ok(None) => debug!(
                    component = "connection",
                    event = "connection.event.ignored",
                    name = %name,
                    "Ignoring unhandled event"
                ),
                Err(e) => warn!(
                    component = "connection",
                    event = "connection.event.decode_failed",
                    name = %name,
                    error = %e,
                    "Failed to decode event payload"
                ),
            }
            true
        }
        SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck => {
            warn!(
                component = "connection",
                event = "connection.binary.unsupported",
                "Binary packets are not supported"
            );
            true
        }
        SocketPacketKind::ConnectError => {
            let message = packet
                .error_message()
                .unwrap_or_else(|| "connection refused".to_string());
            shared
                .notifier
                .notify(Notification::error("Connection error", message));
            true
        }
        SocketPacketKind::Disconnect => false,
        SocketPacketKind::Connect | SocketPacketKind::Ack => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_maps_http_schemes() {
        let config = ConnectionConfig::new("http://localhost:3001/");
        assert_eq!(
            config.socket_url().expect("url"),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );

        let config = ConnectionConfig::new("https://wa.example.com");
        assert_eq!(
            config.socket_url().expect("url"),
            "wss://wa.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_url_rejects_bad_input() {
        assert!(matches!(
            ConnectionConfig::new("localhost:3001").socket_url(),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ConnectionConfig::new("ftp://host").socket_url(),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ConnectionConfig::new("http://").socket_url(),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn new_manager_starts_disconnected() {
        let manager = SocketManager::new(ConnectionConfig::new("http://localhost:1"), Notifier::default());
        assert!(!manager.is_connected());
        assert_eq!(*manager.status().borrow(), ConnectionStatus::Disconnected);
        assert!(manager.sid().is_none());
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_a_no_op() {
        let mut manager =
            SocketManager::new(ConnectionConfig::new("http://localhost:1"), Notifier::default());
        manager.disconnect().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn failed_connect_notifies_and_stays_disconnected() {
        let notifier = Notifier::default();
        let mut notifications = notifier.subscribe();
        let mut config = ConnectionConfig::new("not-a-url");
        config.handshake_timeout = Duration::from_millis(200);
        let mut manager = SocketManager::new(config, notifier);

        let result = manager.connect().await;
        assert!(result.is_err());
        assert_eq!(*manager.status().borrow(), ConnectionStatus::Disconnected);

        let note = notifications.recv().await.expect("notification");
        assert_eq!(note.severity, Severity::Error);
        assert_eq!(note.title, "Connection error");
        assert!(note.detail.unwrap_or_default().contains("not-a-url"));
    }

    #[test]
    fn dispatch_forwards_namespaced_events() {
        let (events, mut rx) = broadcast::channel(8);
        let (status, _) = watch::channel(ConnectionStatus::Connected);
        let shared = Shared {
            events,
            status: Arc::new(status),
            link: Arc::new(ArcSwapOption::empty()),
            notifier: Notifier::default(),
        };

        assert!(dispatch(
            r#"2/whatsapp,["session-update",{"id":"a","status":"ready"}]"#,
            "/whatsapp",
            &shared
        ));
        assert!(dispatch(r#"2/other,["session-update",{"id":"b"}]"#, "/whatsapp", &shared));
        assert!(!dispatch("1/whatsapp,", "/whatsapp", &shared));

        let event = rx.try_recv().expect("one event");
        assert_eq!(event.session_id(), Some("a"));
        assert!(rx.try_recv().is_err());
    }
}
