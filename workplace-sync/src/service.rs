//! Notification sync service.
//!
//! One task owns the notification collection and the connection state. It
//! drains three queues:
//! - commands from [`NotificationSync`] handles (mpsc + oneshot reply)
//! - push events from the transport, stamped with a connection epoch
//! - REST completions from requests running on the blocking pool
//!
//! REST requests overlap with push events; results are applied when they
//! arrive. Fetches are tagged with a generation number and only the newest
//! one is applied. Observers get a [`Snapshot`] after every change.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use workplace_core::{
    types::{self, Filter, Notification, NotificationId, Session},
    Config,
};

use crate::alert::AlertSink;
use crate::api::{HttpNotificationApi, NotificationApi};
use crate::error::SyncError;
use crate::push::{self, ConnectionPhase, ConnectionState, PushEvent, PushSender, PushSettings};
use crate::store::{NotificationStore, PrependOutcome};

const COMMAND_QUEUE: usize = 64;
const PUSH_QUEUE: usize = 256;

/// Read-only view published to observers after every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub connection: ConnectionState,
    pub last_error: Option<String>,
}

/// Why [`NotificationSync::connect`] did not open a push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingToken,
    /// Production builds never connect to `localhost` and friends.
    LocalEndpointInProduction,
    InvalidEndpoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Started,
    AlreadyActive,
    Skipped(SkipReason),
}

enum Command {
    Connect {
        respond_to: oneshot::Sender<ConnectOutcome>,
    },
    Disconnect {
        respond_to: oneshot::Sender<()>,
    },
    Attach {
        respond_to: oneshot::Sender<PushSender>,
    },
    Fetch {
        filter: Filter,
        respond_to: oneshot::Sender<Result<usize, SyncError>>,
    },
    MarkRead {
        id: NotificationId,
        respond_to: oneshot::Sender<Result<(), SyncError>>,
    },
    Delete {
        id: NotificationId,
        respond_to: oneshot::Sender<Result<(), SyncError>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

enum Completion {
    Fetch {
        generation: u64,
        filter: Filter,
        result: Result<Vec<Notification>, SyncError>,
        respond_to: oneshot::Sender<Result<usize, SyncError>>,
    },
    MarkRead {
        id: NotificationId,
        result: Result<(), SyncError>,
        respond_to: oneshot::Sender<Result<(), SyncError>>,
    },
    Delete {
        id: NotificationId,
        result: Result<(), SyncError>,
        respond_to: oneshot::Sender<Result<(), SyncError>>,
    },
}

struct PushConnection {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Cloneable handle to a running sync service.
///
/// Spawn one per signed-in session; call [`NotificationSync::shutdown`] on
/// logout, which clears the collection and closes the push channel.
#[derive(Clone)]
pub struct NotificationSync {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    session: Arc<Session>,
}

impl NotificationSync {
    /// Spawn the service on the current tokio runtime.
    pub fn spawn(
        config: Config,
        session: Session,
        api: Arc<dyn NotificationApi>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (push_tx, push_rx) = mpsc::channel(PUSH_QUEUE);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let session = Arc::new(session);

        let service = SyncService {
            config,
            session: session.clone(),
            api,
            alerts,
            store: NotificationStore::new(),
            connection: ConnectionState::default(),
            last_error: None,
            epoch: 0,
            push: None,
            push_tx,
            completions_tx,
            fetch_generation: 0,
            snapshot: snapshot_tx,
        };
        tokio::spawn(service.run(commands_rx, push_rx, completions_rx));

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            session,
        }
    }

    /// Spawn with the HTTP client built from `config`.
    pub fn start(
        config: Config,
        session: Session,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, SyncError> {
        let api = HttpNotificationApi::from_config(&config)?;
        Ok(Self::spawn(config, session, Arc::new(api), alerts))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that changes whenever the state does.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Whether the signed-in user may delete `notification`.
    pub fn can_delete(&self, notification: &Notification) -> bool {
        types::can_delete(notification, &self.session)
    }

    /// Open the push channel for this session. Never fails on network
    /// problems; those only show up in the connection state.
    pub async fn connect(&self) -> Result<ConnectOutcome, SyncError> {
        self.request(|respond_to| Command::Connect { respond_to }).await
    }

    /// Close the push channel if open. Idempotent.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.request(|respond_to| Command::Disconnect { respond_to }).await
    }

    /// Replace the built-in WebSocket transport with a caller-driven one.
    ///
    /// Any open connection is closed first. Events sent through the returned
    /// sender are handled exactly like those of the WebSocket transport.
    pub async fn attach_transport(&self) -> Result<PushSender, SyncError> {
        self.request(|respond_to| Command::Attach { respond_to }).await
    }

    /// Fetch with `filter` and replace the whole collection. Returns the
    /// number of notifications received.
    pub async fn fetch_notifications(&self, filter: Filter) -> Result<usize, SyncError> {
        self.request(|respond_to| Command::Fetch { filter, respond_to }).await?
    }

    pub async fn mark_as_read(&self, id: impl Into<NotificationId>) -> Result<(), SyncError> {
        let id = id.into();
        self.request(|respond_to| Command::MarkRead { id, respond_to }).await?
    }

    pub async fn delete_notification(
        &self,
        id: impl Into<NotificationId>,
    ) -> Result<(), SyncError> {
        let id = id.into();
        self.request(|respond_to| Command::Delete { id, respond_to }).await?
    }

    /// Tear the session down: close the push channel and clear the
    /// collection. Later calls on any clone fail with `ChannelClosed`.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.request(|respond_to| Command::Shutdown { respond_to }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SyncError::ChannelClosed("sync command queue"))?;
        rx.await
            .map_err(|_| SyncError::ChannelClosed("sync response"))
    }
}

struct SyncService {
    config: Config,
    session: Arc<Session>,
    api: Arc<dyn NotificationApi>,
    alerts: Arc<dyn AlertSink>,
    store: NotificationStore,
    connection: ConnectionState,
    last_error: Option<String>,
    /// Bumped whenever a transport is started or torn down.
    epoch: u64,
    push: Option<PushConnection>,
    push_tx: mpsc::Sender<(u64, PushEvent)>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    fetch_generation: u64,
    snapshot: watch::Sender<Snapshot>,
}

impl SyncService {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut push_rx: mpsc::Receiver<(u64, PushEvent)>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        tracing::debug!(user = %self.session.user_id, "notification sync started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some((epoch, event)) = push_rx.recv() => self.handle_push(epoch, event),
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }
        self.teardown();
        tracing::debug!(user = %self.session.user_id, "notification sync stopped");
    }

    /// Returns `false` once the service should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { respond_to } => {
                let outcome = self.connect();
                let _ = respond_to.send(outcome);
            }
            Command::Disconnect { respond_to } => {
                self.disconnect();
                let _ = respond_to.send(());
            }
            Command::Attach { respond_to } => {
                self.disconnect();
                self.epoch += 1;
                self.connection.phase = ConnectionPhase::Connecting;
                self.publish();
                let _ = respond_to.send(PushSender::new(self.epoch, self.push_tx.clone()));
            }
            Command::Fetch { filter, respond_to } => self.start_fetch(filter, respond_to),
            Command::MarkRead { id, respond_to } => self.start_mark_read(id, respond_to),
            Command::Delete { id, respond_to } => self.start_delete(id, respond_to),
            Command::Shutdown { respond_to } => {
                self.teardown();
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    fn connect(&mut self) -> ConnectOutcome {
        let Some(token) = self.session.token().map(str::to_string) else {
            tracing::info!("push channel skipped: no access token");
            return ConnectOutcome::Skipped(SkipReason::MissingToken);
        };
        match self.config.push_endpoint_allowed() {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    push_url = %self.config.push_url,
                    "push channel skipped: local endpoint in a production build",
                );
                return ConnectOutcome::Skipped(SkipReason::LocalEndpointInProduction);
            }
            Err(err) => {
                tracing::error!(error = %err, "push channel skipped");
                return ConnectOutcome::Skipped(SkipReason::InvalidEndpoint(err.to_string()));
            }
        }
        if let Some(connection) = &self.push {
            if !connection.task.is_finished() {
                return ConnectOutcome::AlreadyActive;
            }
        }
        let endpoint = match self.config.push_endpoint() {
            Ok(endpoint) => endpoint,
            Err(err) => return ConnectOutcome::Skipped(SkipReason::InvalidEndpoint(err.to_string())),
        };

        self.epoch += 1;
        let settings = PushSettings {
            endpoint,
            token,
            role: self.session.role,
            user_id: self.session.user_id.clone(),
            reconnect_attempts: self.config.reconnect_attempts,
            reconnect_delay: self.config.reconnect_delay(),
            polling_fallback: self.config.push_polling_fallback,
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sender = PushSender::new(self.epoch, self.push_tx.clone());
        let transport = push::run(settings, sender.clone(), shutdown_rx);
        let task = tokio::spawn(push::supervise(transport, sender));
        self.push = Some(PushConnection {
            shutdown: shutdown_tx,
            task,
        });

        self.connection = ConnectionState {
            phase: ConnectionPhase::Connecting,
            socket_id: None,
        };
        self.publish();
        ConnectOutcome::Started
    }

    fn disconnect(&mut self) {
        let had_transport = match self.push.take() {
            Some(connection) => {
                let _ = connection.shutdown.send(());
                tracing::info!("push channel disconnected");
                true
            }
            None => false,
        };
        if had_transport || self.connection.phase != ConnectionPhase::Disconnected {
            self.epoch += 1;
            self.connection = ConnectionState::default();
            self.publish();
        }
    }

    fn handle_push(&mut self, epoch: u64, event: PushEvent) {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "dropping event from a closed transport");
            return;
        }
        match event {
            PushEvent::Connecting => {
                self.connection = ConnectionState {
                    phase: ConnectionPhase::Connecting,
                    socket_id: None,
                };
            }
            PushEvent::Connected { socket_id } => {
                self.connection = ConnectionState {
                    phase: ConnectionPhase::Connected,
                    socket_id: Some(socket_id).filter(|id| !id.is_empty()),
                };
            }
            PushEvent::Disconnected { reason } => {
                tracing::info!(reason = %reason, "push channel disconnected; REST remains available");
                self.connection = ConnectionState::default();
            }
            PushEvent::Error(message) => {
                tracing::warn!(error = %message, "push channel error");
                self.connection = ConnectionState::default();
            }
            PushEvent::Notification(notification) => {
                if !self.connection.connected() {
                    tracing::debug!(id = %notification.id, "dropping notification received while not connected");
                    return;
                }
                self.alerts.alert(&notification.title, &notification.message);
                let id = notification.id.clone();
                let outcome = self.store.prepend(notification, self.config.push_dedup);
                if outcome == PrependOutcome::Replaced {
                    tracing::debug!(id = %id, "push notification replaced a known entry");
                }
            }
        }
        self.publish();
    }

    fn start_fetch(
        &mut self,
        filter: Filter,
        respond_to: oneshot::Sender<Result<usize, SyncError>>,
    ) {
        let Some(token) = self.require_token() else {
            let _ = respond_to.send(Err(missing_token()));
            return;
        };
        self.fetch_generation += 1;
        let generation = self.fetch_generation;
        let api = self.api.clone();
        self.spawn_request(
            move || api.fetch(&token, filter),
            move |result| Completion::Fetch {
                generation,
                filter,
                result,
                respond_to,
            },
        );
    }

    fn start_mark_read(
        &mut self,
        id: NotificationId,
        respond_to: oneshot::Sender<Result<(), SyncError>>,
    ) {
        let Some(token) = self.require_token() else {
            let _ = respond_to.send(Err(missing_token()));
            return;
        };
        let api = self.api.clone();
        let request_id = id.clone();
        self.spawn_request(
            move || api.mark_read(&token, &request_id),
            move |result| Completion::MarkRead {
                id,
                result,
                respond_to,
            },
        );
    }

    fn start_delete(
        &mut self,
        id: NotificationId,
        respond_to: oneshot::Sender<Result<(), SyncError>>,
    ) {
        let Some(token) = self.require_token() else {
            let _ = respond_to.send(Err(missing_token()));
            return;
        };
        let api = self.api.clone();
        let request_id = id.clone();
        self.spawn_request(
            move || api.delete(&token, &request_id),
            move |result| Completion::Delete {
                id,
                result,
                respond_to,
            },
        );
    }

    /// Token for a REST call, recording the failure when there is none.
    fn require_token(&mut self) -> Option<String> {
        let token = self.session.token().map(str::to_string);
        if token.is_none() {
            self.last_error = Some(missing_token().to_string());
            self.publish();
        }
        token
    }

    fn spawn_request<T, Call, Done>(&self, call: Call, done: Done)
    where
        T: Send + 'static,
        Call: FnOnce() -> Result<T, SyncError> + Send + 'static,
        Done: FnOnce(Result<T, SyncError>) -> Completion + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(call)
                .await
                .unwrap_or_else(|err| Err(SyncError::Network(format!("request task failed: {err}"))));
            let _ = completions.send(done(result));
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch {
                generation,
                filter,
                result,
                respond_to,
            } => {
                if generation != self.fetch_generation {
                    tracing::debug!(
                        generation,
                        latest = self.fetch_generation,
                        %filter,
                        "discarding superseded fetch",
                    );
                    let _ = respond_to.send(Err(SyncError::Superseded));
                    return;
                }
                let reply = match result {
                    Ok(notifications) => {
                        let count = notifications.len();
                        self.store.replace_all(notifications);
                        self.last_error = None;
                        tracing::info!(
                            %filter,
                            count,
                            unread = self.store.unread_count(),
                            "notifications fetched",
                        );
                        Ok(count)
                    }
                    Err(err) => {
                        tracing::warn!(%filter, error = %err, "notification fetch failed");
                        self.last_error = Some(err.to_string());
                        Err(err)
                    }
                };
                self.publish();
                let _ = respond_to.send(reply);
            }
            Completion::MarkRead {
                id,
                result,
                respond_to,
            } => {
                let reply = match result {
                    Ok(()) => {
                        if self.store.mark_read(&id).is_none() {
                            tracing::debug!(id = %id, "marked read on server; not in local view");
                        }
                        self.last_error = None;
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "mark as read failed");
                        self.last_error = Some(err.to_string());
                        Err(err)
                    }
                };
                self.publish();
                let _ = respond_to.send(reply);
            }
            Completion::Delete {
                id,
                result,
                respond_to,
            } => {
                let reply = match result {
                    Ok(()) => {
                        if self.store.remove(&id).is_none() {
                            tracing::debug!(id = %id, "deleted on server; not in local view");
                        }
                        self.last_error = None;
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "delete failed");
                        self.last_error = Some(err.to_string());
                        Err(err)
                    }
                };
                self.publish();
                let _ = respond_to.send(reply);
            }
        }
    }

    fn teardown(&mut self) {
        self.disconnect();
        self.store.clear();
        self.last_error = None;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            notifications: self.store.to_vec(),
            unread_count: self.store.unread_count(),
            connection: self.connection.clone(),
            last_error: self.last_error.clone(),
        });
    }
}

fn missing_token() -> SyncError {
    SyncError::Auth("no access token; sign in first".to_string())
}
