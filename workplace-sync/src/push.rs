//! Push channel: a Socket.IO client over WebSocket, with Engine.IO
//! long-polling as the fallback transport.
//!
//! The transport task owns the connection and reports everything it sees as
//! [`PushEvent`]s. It never touches notification state; the sync service
//! drains the events and is the only writer.
//!
//! Session flow:
//! 1. WebSocket to `{push_url}/socket.io/?EIO=4&transport=websocket`; if that
//!    cannot be opened, long-polling on `transport=polling`
//! 2. Engine.IO `open` handshake, then Socket.IO connect with `{ "token": … }`
//! 3. On connect ack: `joinRole` (canonical role) and `joinUser` (user id)
//! 4. `notification` events until close, error or shutdown
//!
//! Lost sessions are retried after a fixed delay, up to the configured number
//! of consecutive failures.

use std::future::Future;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::Message, Error as WsError},
};
use url::Url;

use workplace_core::types::{Notification, Role, UserId};

use crate::error::SyncError;
use crate::frame::{EnginePacket, SocketPacket, DEFAULT_NAMESPACE};
use crate::polling::PollingClient;

pub const NOTIFICATION_EVENT: &str = "notification";
pub const JOIN_ROLE_EVENT: &str = "joinRole";
pub const JOIN_USER_EVENT: &str = "joinUser";

/// Time allowed between opening the transport and the Engine.IO handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Upper bound on the heartbeat window a server can ask for.
const MAX_HEARTBEAT_WINDOW: Duration = Duration::from_secs(600);

/// Time allowed for the polling goodbye on shutdown.
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
}

impl ConnectionState {
    pub fn connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Status line shown to users.
    pub fn label(&self) -> &'static str {
        match self.phase {
            ConnectionPhase::Connected => "Connected",
            ConnectionPhase::Connecting => "Connecting",
            ConnectionPhase::Disconnected => "Disconnected (Polling)",
        }
    }
}

/// Everything a transport can report to the sync service.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connecting,
    Connected { socket_id: String },
    Disconnected { reason: String },
    Error(String),
    Notification(Notification),
}

/// Sending side of the push-event queue, stamped with the connection epoch
/// it belongs to. Events from a superseded epoch are ignored by the service.
#[derive(Debug, Clone)]
pub struct PushSender {
    epoch: u64,
    tx: mpsc::Sender<(u64, PushEvent)>,
}

impl PushSender {
    pub(crate) fn new(epoch: u64, tx: mpsc::Sender<(u64, PushEvent)>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub async fn send(&self, event: PushEvent) -> Result<(), SyncError> {
        self.tx
            .send((self.epoch, event))
            .await
            .map_err(|_| SyncError::ChannelClosed("push event queue"))
    }
}

/// Everything the transport task needs to open and authenticate a session.
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub endpoint: Url,
    pub token: String,
    pub role: Role,
    pub user_id: UserId,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Use long-polling when the WebSocket cannot be opened.
    pub polling_fallback: bool,
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

enum Flow {
    Continue,
    End(SessionEnd),
}

#[derive(Debug, Clone, Copy)]
enum Transport {
    WebSocket,
    Polling,
}

impl Transport {
    fn name(self) -> &'static str {
        match self {
            Transport::WebSocket => "websocket",
            Transport::Polling => "polling",
        }
    }

    fn scheme(self, secure: bool) -> &'static str {
        match (self, secure) {
            (Transport::WebSocket, false) => "ws",
            (Transport::WebSocket, true) => "wss",
            (Transport::Polling, false) => "http",
            (Transport::Polling, true) => "https",
        }
    }
}

/// WebSocket URL of the Socket.IO endpoint served at `endpoint`.
pub fn socket_url(endpoint: &Url) -> Result<Url, SyncError> {
    engine_url(endpoint, Transport::WebSocket)
}

/// Long-polling URL of the Socket.IO endpoint served at `endpoint`.
pub fn polling_url(endpoint: &Url) -> Result<Url, SyncError> {
    engine_url(endpoint, Transport::Polling)
}

fn engine_url(endpoint: &Url, transport: Transport) -> Result<Url, SyncError> {
    let secure = match endpoint.scheme() {
        "http" | "ws" => false,
        "https" | "wss" => true,
        other => {
            return Err(SyncError::InvalidEndpoint(format!(
                "unsupported push scheme '{other}'"
            )))
        }
    };
    let mut url = endpoint.clone();
    url.set_scheme(transport.scheme(secure))
        .map_err(|_| SyncError::InvalidEndpoint(format!("cannot use '{endpoint}' as a socket")))?;
    url.set_path("/socket.io/");
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", transport.name());
    Ok(url)
}

/// Time without a ping after which the session counts as lost.
pub fn heartbeat_window(ping_interval_ms: u64, ping_timeout_ms: u64) -> Duration {
    let total = ping_interval_ms.saturating_add(ping_timeout_ms);
    Duration::from_millis(total).min(MAX_HEARTBEAT_WINDOW)
}

/// Drive `transport` on its own task. If it panics, the failure is reported
/// through `events` as an error followed by a disconnect.
pub async fn supervise<F>(transport: F, events: PushSender)
where
    F: Future<Output = ()> + Send + 'static,
{
    let Err(err) = tokio::spawn(transport).await else {
        return;
    };
    if !err.is_panic() {
        return;
    }
    tracing::error!(epoch = events.epoch(), "push channel task panicked");
    let reason = "push channel task failed".to_string();
    let _ = events.send(PushEvent::Error(reason.clone())).await;
    let _ = events.send(PushEvent::Disconnected { reason }).await;
}

/// Run the push channel until shutdown, the service going away, or the
/// reconnect budget running out.
pub async fn run(
    settings: PushSettings,
    events: PushSender,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (socket, polling) = match socket_url(&settings.endpoint)
        .and_then(|socket| Ok((socket, polling_url(&settings.endpoint)?)))
    {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(error = %err, "push channel not started");
            let _ = events.send(PushEvent::Error(err.to_string())).await;
            let _ = events
                .send(PushEvent::Disconnected {
                    reason: err.to_string(),
                })
                .await;
            return;
        }
    };

    let mut failures = 0u32;
    loop {
        if events.send(PushEvent::Connecting).await.is_err() {
            return;
        }

        let mut session = Session::new(&settings, &events);
        let end = open_session(&socket, &polling, &mut session, &mut shutdown).await;
        if session.established {
            failures = 0;
        }

        let reason = match end {
            Ok(SessionEnd::Shutdown) => {
                tracing::debug!(epoch = events.epoch(), "push channel closed by client");
                return;
            }
            Ok(SessionEnd::Lost(reason)) => {
                tracing::info!(reason = %reason, "push channel lost");
                reason
            }
            Err(err) => {
                tracing::warn!(error = %err, "push channel error");
                if events.send(PushEvent::Error(err.to_string())).await.is_err() {
                    return;
                }
                err.to_string()
            }
        };

        if events.send(PushEvent::Disconnected { reason }).await.is_err() {
            return;
        }

        failures = failures.saturating_add(1);
        if failures > settings.reconnect_attempts {
            tracing::warn!(
                attempts = settings.reconnect_attempts,
                "push channel gave up reconnecting; REST remains available",
            );
            return;
        }

        tracing::info!(
            attempt = failures,
            delay_ms = settings.reconnect_delay.as_millis() as u64,
            "reconnecting push channel",
        );
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(settings.reconnect_delay) => {}
        }
    }
}

async fn open_session(
    socket: &Url,
    polling: &Url,
    session: &mut Session<'_>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<SessionEnd, SyncError> {
    let opened = tokio::select! {
        _ = shutdown.recv() => return Ok(SessionEnd::Shutdown),
        opened = connect_async(socket.as_str()) => opened,
    };
    match opened {
        Ok((ws, _)) => websocket_session(ws, session, shutdown).await,
        Err(err) if session.settings.polling_fallback => {
            tracing::info!(error = %err, "websocket unavailable, falling back to long-polling");
            polling_session(PollingClient::new(polling.clone()), session, shutdown).await
        }
        Err(err) => Err(SyncError::Connection(format!("connect to {socket} failed: {err}"))),
    }
}

/// Socket.IO protocol state of one session, shared by both transports.
/// Packets to send back are collected in `out`.
struct Session<'a> {
    settings: &'a PushSettings,
    events: &'a PushSender,
    heartbeat: Option<Duration>,
    deadline: Instant,
    established: bool,
}

impl<'a> Session<'a> {
    fn new(settings: &'a PushSettings, events: &'a PushSender) -> Self {
        Self {
            settings,
            events,
            heartbeat: None,
            deadline: Instant::now() + HANDSHAKE_TIMEOUT,
            established: false,
        }
    }

    async fn on_packet(
        &mut self,
        packet: EnginePacket,
        out: &mut Vec<EnginePacket>,
    ) -> Result<Flow, SyncError> {
        match packet {
            EnginePacket::Open(handshake) => {
                let window = heartbeat_window(handshake.ping_interval, handshake.ping_timeout);
                self.heartbeat = Some(window);
                self.deadline = Instant::now() + window;
                tracing::debug!(
                    sid = %handshake.sid,
                    window_ms = window.as_millis() as u64,
                    "engine handshake received",
                );
                let connect = SocketPacket::Connect {
                    namespace: DEFAULT_NAMESPACE.to_string(),
                    data: Some(json!({ "token": self.settings.token })),
                };
                out.push(connect.into_engine()?);
            }
            EnginePacket::Ping(data) => {
                if let Some(window) = self.heartbeat {
                    self.deadline = Instant::now() + window;
                }
                out.push(EnginePacket::Pong(data));
            }
            EnginePacket::Close => {
                return Ok(Flow::End(SessionEnd::Lost(
                    "server closed the session".to_string(),
                )))
            }
            EnginePacket::Message(body) => return self.on_message(&body, out).await,
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        Ok(Flow::Continue)
    }

    async fn on_message(
        &mut self,
        body: &str,
        out: &mut Vec<EnginePacket>,
    ) -> Result<Flow, SyncError> {
        let packet = match SocketPacket::decode(body) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed socket packet");
                return Ok(Flow::Continue);
            }
        };
        match packet {
            SocketPacket::Connect { namespace, data } if namespace == DEFAULT_NAMESPACE => {
                let socket_id = data
                    .as_ref()
                    .and_then(|data| data.get("sid"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.established = true;
                tracing::info!(socket_id = %socket_id, "push channel connected");
                if self.events.send(PushEvent::Connected { socket_id }).await.is_err() {
                    return Ok(Flow::End(SessionEnd::Shutdown));
                }
                self.join_rooms(out)?;
            }
            SocketPacket::ConnectError { data, .. } => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string());
                return Err(SyncError::Connection(format!(
                    "server refused connection: {message}"
                )));
            }
            SocketPacket::Disconnect { .. } => {
                return Ok(Flow::End(SessionEnd::Lost(
                    "server disconnected the socket".to_string(),
                )))
            }
            SocketPacket::Event { name, args, .. } if name == NOTIFICATION_EVENT => {
                let Some(payload) = args.into_iter().next() else {
                    tracing::warn!("notification event without payload");
                    return Ok(Flow::Continue);
                };
                match serde_json::from_value::<Notification>(payload) {
                    Ok(notification) => {
                        if self
                            .events
                            .send(PushEvent::Notification(notification))
                            .await
                            .is_err()
                        {
                            return Ok(Flow::End(SessionEnd::Shutdown));
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring malformed notification payload");
                    }
                }
            }
            other => {
                tracing::debug!(packet = ?other, "ignoring socket packet");
            }
        }
        Ok(Flow::Continue)
    }

    fn join_rooms(&self, out: &mut Vec<EnginePacket>) -> Result<(), SyncError> {
        let settings = self.settings;
        let role = SocketPacket::event(JOIN_ROLE_EVENT, vec![json!(settings.role.as_str())]);
        out.push(role.into_engine()?);
        let user = SocketPacket::event(JOIN_USER_EVENT, vec![json!(settings.user_id.0)]);
        out.push(user.into_engine()?);
        tracing::debug!(role = %settings.role, user = %settings.user_id, "joining notification rooms");
        Ok(())
    }
}

fn goodbye() -> Result<EnginePacket, SyncError> {
    let packet = SocketPacket::Disconnect {
        namespace: DEFAULT_NAMESPACE.to_string(),
    };
    Ok(packet.into_engine()?)
}

async fn websocket_session<S>(
    ws: S,
    session: &mut Session<'_>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<SessionEnd, SyncError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut write, mut read) = ws.split();
    let mut out = Vec::new();

    loop {
        let message = tokio::select! {
            _ = shutdown.recv() => {
                if let Ok(packet) = goodbye() {
                    let _ = send_packet(&mut write, packet).await;
                }
                let _ = write.close().await;
                return Ok(SessionEnd::Shutdown);
            }
            _ = tokio::time::sleep_until(session.deadline) => {
                return Ok(SessionEnd::Lost("heartbeat timeout".to_string()));
            }
            message = read.next() => message,
        };

        let text = match message {
            None => return Ok(SessionEnd::Lost("connection closed".to_string())),
            Some(Err(err)) => return Err(SyncError::Connection(err.to_string())),
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) => {
                return Ok(SessionEnd::Lost("connection closed by server".to_string()))
            }
            Some(Ok(_)) => continue,
        };

        let packet = match EnginePacket::decode(text.as_str()) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed engine packet");
                continue;
            }
        };

        let flow = session.on_packet(packet, &mut out).await?;
        for packet in out.drain(..) {
            send_packet(&mut write, packet).await?;
        }
        if let Flow::End(end) = flow {
            return Ok(end);
        }
    }
}

async fn send_packet<S>(sink: &mut S, packet: EnginePacket) -> Result<(), SyncError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = packet.encode()?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|err| SyncError::Connection(err.to_string()))
}

async fn polling_session(
    client: PollingClient,
    session: &mut Session<'_>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<SessionEnd, SyncError> {
    let opening = tokio::select! {
        _ = shutdown.recv() => return Ok(SessionEnd::Shutdown),
        _ = tokio::time::sleep_until(session.deadline) => {
            return Ok(SessionEnd::Lost("handshake timeout".to_string()));
        }
        batch = poll(&client) => batch?,
    };
    let sid = opening
        .iter()
        .find_map(|packet| match packet {
            EnginePacket::Open(handshake) => Some(handshake.sid.clone()),
            _ => None,
        })
        .ok_or_else(|| {
            SyncError::Connection("polling handshake did not open a session".to_string())
        })?;
    let client = client.with_sid(&sid);
    tracing::debug!(url = %client.url(), "long-polling session opened");

    let mut batch = opening;
    let mut out = Vec::new();
    loop {
        for packet in batch {
            if let Flow::End(end) = session.on_packet(packet, &mut out).await? {
                return Ok(end);
            }
        }
        if !out.is_empty() {
            let packets = std::mem::take(&mut out);
            let poster = client.clone();
            blocking(move || poster.send(&packets)).await?;
        }

        batch = tokio::select! {
            _ = shutdown.recv() => {
                let poster = client.clone();
                let farewell = blocking(move || poster.send(&[goodbye()?]));
                let _ = tokio::time::timeout(GOODBYE_TIMEOUT, farewell).await;
                return Ok(SessionEnd::Shutdown);
            }
            _ = tokio::time::sleep_until(session.deadline) => {
                return Ok(SessionEnd::Lost("heartbeat timeout".to_string()));
            }
            batch = poll(&client) => batch?,
        };
    }
}

async fn poll(client: &PollingClient) -> Result<Vec<EnginePacket>, SyncError> {
    let client = client.clone();
    blocking(move || client.poll()).await
}

async fn blocking<T, F>(call: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .unwrap_or_else(|err| Err(SyncError::Connection(format!("polling task failed: {err}"))))
}
