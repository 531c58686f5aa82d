//! Sync service behaviour against an in-process mock of the REST API and a
//! caller-driven push transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use workplace_core::{
    types::{Filter, Notification, NotificationId, Priority, Role, Session, UserId},
    Config, Environment,
};
use workplace_sync::{
    ConnectOutcome, ConnectionPhase, NotificationApi, NotificationSync, PushEvent,
    RecordingAlerts, SkipReason, Snapshot, SyncError,
};

// ---------------------------------------------------------------------------
// Mock server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Failure {
    Network,
    Server,
}

#[derive(Default)]
struct MockApi {
    fetch_calls: AtomicUsize,
    mark_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    server: Mutex<Vec<Notification>>,
    by_filter: Mutex<Vec<(Filter, Vec<Notification>)>>,
    slow_filter: Mutex<Option<Filter>>,
    failure: Mutex<Option<Failure>>,
}

impl MockApi {
    fn with_server(notifications: Vec<Notification>) -> Arc<Self> {
        let api = Self::default();
        *api.server.lock().unwrap() = notifications;
        Arc::new(api)
    }

    fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    fn total_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
            + self.mark_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), SyncError> {
        match *self.failure.lock().unwrap() {
            Some(Failure::Network) => Err(SyncError::Network("connection refused".into())),
            Some(Failure::Server) => Err(SyncError::Server("database unavailable".into())),
            None => Ok(()),
        }
    }
}

impl NotificationApi for MockApi {
    fn fetch(&self, _token: &str, filter: Filter) -> Result<Vec<Notification>, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.slow_filter.lock().unwrap() == Some(filter) {
            std::thread::sleep(Duration::from_millis(400));
        }
        self.check_failure()?;
        let by_filter = self.by_filter.lock().unwrap();
        if let Some((_, list)) = by_filter.iter().find(|(f, _)| *f == filter) {
            return Ok(list.clone());
        }
        Ok(self.server.lock().unwrap().clone())
    }

    fn mark_read(&self, _token: &str, id: &NotificationId) -> Result<(), SyncError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        for n in self.server.lock().unwrap().iter_mut().filter(|n| &n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }

    fn delete(&self, _token: &str, id: &NotificationId) -> Result<(), SyncError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.server.lock().unwrap().retain(|n| &n.id != id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn note(id: &str, is_read: bool) -> Notification {
    Notification {
        id: NotificationId::from(id),
        title: format!("Title {id}"),
        message: format!("Message {id}"),
        priority: Priority::Medium,
        is_read,
        created_at: Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
        recipients: None,
    }
}

fn session() -> Session {
    Session::new("u-1", Role::Hr, "token-123")
}

fn config() -> Config {
    Config {
        environment: Environment::Development,
        ..Config::default()
    }
}

fn spawn(api: Arc<MockApi>) -> (NotificationSync, RecordingAlerts) {
    spawn_with(api, config(), session())
}

fn spawn_with(
    api: Arc<MockApi>,
    config: Config,
    session: Session,
) -> (NotificationSync, RecordingAlerts) {
    let alerts = RecordingAlerts::new();
    let sync = NotificationSync::spawn(config, session, api, Arc::new(alerts.clone()));
    (sync, alerts)
}

async fn wait_until(sync: &NotificationSync, pred: impl FnMut(&Snapshot) -> bool) -> Snapshot {
    let mut rx = sync.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("sync service stopped")
        .clone();
    snapshot
}

fn ids(snapshot: &Snapshot) -> Vec<String> {
    snapshot.notifications.iter().map(|n| n.id.0.clone()).collect()
}

// ---------------------------------------------------------------------------
// REST operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_replaces_collection_each_time() {
    let api = MockApi::with_server(vec![note("a", false), note("b", true)]);
    let (sync, _) = spawn(api.clone());

    assert_eq!(sync.fetch_notifications(Filter::All).await.expect("fetch"), 2);
    assert_eq!(ids(&sync.snapshot()), vec!["a", "b"]);

    *api.server.lock().unwrap() = vec![note("c", false)];
    sync.fetch_notifications(Filter::All).await.expect("fetch");
    let snapshot = sync.snapshot();
    assert_eq!(ids(&snapshot), vec!["c"]);
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn today_scenario_mark_read_clears_single_unread() {
    let api = MockApi::default();
    api.by_filter.lock().unwrap().push((
        Filter::Today,
        vec![note("t1", true), note("t2", false), note("t3", true)],
    ));
    let (sync, _) = spawn(Arc::new(api));

    sync.fetch_notifications(Filter::Today).await.expect("fetch");
    assert_eq!(sync.snapshot().unread_count, 1);

    sync.mark_as_read("t2").await.expect("mark read");
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.unread_count, 0);
    let read: Vec<bool> = snapshot.notifications.iter().map(|n| n.is_read).collect();
    assert_eq!(read, vec![true, true, true]);
    assert_eq!(snapshot.notifications[0], note("t1", true));
    assert_eq!(snapshot.notifications[2], note("t3", true));
}

#[tokio::test]
async fn mark_read_on_already_read_entry_keeps_counter() {
    let api = MockApi::with_server(vec![note("a", true), note("b", false)]);
    let (sync, _) = spawn(api);
    sync.fetch_notifications(Filter::All).await.expect("fetch");

    sync.mark_as_read("a").await.expect("mark read");
    assert_eq!(sync.snapshot().unread_count, 1);
}

#[tokio::test]
async fn delete_removes_one_entry_and_adjusts_unread() {
    let api = MockApi::with_server(vec![note("a", false), note("b", true), note("c", false)]);
    let (sync, _) = spawn(api.clone());
    sync.fetch_notifications(Filter::All).await.expect("fetch");

    sync.delete_notification("a").await.expect("delete unread");
    let snapshot = sync.snapshot();
    assert_eq!(ids(&snapshot), vec!["b", "c"]);
    assert_eq!(snapshot.unread_count, 1);

    sync.delete_notification("b").await.expect("delete read");
    let snapshot = sync.snapshot();
    assert_eq!(ids(&snapshot), vec!["c"]);
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(api.delete_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_token_fails_every_rest_call_without_network() {
    let api = MockApi::with_server(vec![note("a", false)]);
    let (sync, _) = spawn_with(api.clone(), config(), Session::new("u-1", Role::Staff, ""));

    assert!(matches!(
        sync.fetch_notifications(Filter::All).await,
        Err(SyncError::Auth(_))
    ));
    assert!(matches!(sync.mark_as_read("a").await, Err(SyncError::Auth(_))));
    assert!(matches!(
        sync.delete_notification("a").await,
        Err(SyncError::Auth(_))
    ));
    assert_eq!(api.total_calls(), 0, "no request may be issued without a token");
    assert!(sync.snapshot().last_error.is_some());

    assert_eq!(
        sync.connect().await.expect("connect"),
        ConnectOutcome::Skipped(SkipReason::MissingToken)
    );
}

#[tokio::test]
async fn failed_fetch_preserves_previous_collection() {
    let api = MockApi::with_server(vec![note("a", false)]);
    let (sync, _) = spawn(api.clone());
    sync.fetch_notifications(Filter::All).await.expect("fetch");

    api.fail_with(Some(Failure::Network));
    let err = sync.fetch_notifications(Filter::All).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)), "got: {err}");
    let snapshot = sync.snapshot();
    assert_eq!(ids(&snapshot), vec!["a"]);
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("connection refused")));

    api.fail_with(None);
    sync.fetch_notifications(Filter::All).await.expect("refresh");
    assert_eq!(sync.snapshot().last_error, None);
}

#[tokio::test]
async fn failed_mark_read_and_delete_leave_state_unchanged() {
    let api = MockApi::with_server(vec![note("a", false)]);
    let (sync, _) = spawn(api.clone());
    sync.fetch_notifications(Filter::All).await.expect("fetch");
    let before = sync.snapshot();

    api.fail_with(Some(Failure::Server));
    assert!(matches!(sync.mark_as_read("a").await, Err(SyncError::Server(_))));
    assert!(matches!(
        sync.delete_notification("a").await,
        Err(SyncError::Server(_))
    ));
    let after = sync.snapshot();
    assert_eq!(after.notifications, before.notifications);
    assert_eq!(after.unread_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn older_fetch_arriving_late_is_discarded() {
    let api = MockApi::default();
    api.by_filter
        .lock()
        .unwrap()
        .push((Filter::All, vec![note("old-1", false), note("old-2", false)]));
    api.by_filter
        .lock()
        .unwrap()
        .push((Filter::Today, vec![note("new", true)]));
    *api.slow_filter.lock().unwrap() = Some(Filter::All);
    let (sync, _) = spawn(Arc::new(api));

    let slow = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.fetch_notifications(Filter::All).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(sync.fetch_notifications(Filter::Today).await.expect("fast"), 1);
    let slow_result = slow.await.expect("join");
    assert!(matches!(slow_result, Err(SyncError::Superseded)));

    let snapshot = sync.snapshot();
    assert_eq!(ids(&snapshot), vec!["new"]);
    assert_eq!(snapshot.unread_count, 0);
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_notification_is_prepended_and_alerted() {
    let api = MockApi::with_server(vec![note("a", true)]);
    let (sync, alerts) = spawn(api);
    sync.fetch_notifications(Filter::All).await.expect("fetch");

    let transport = sync.attach_transport().await.expect("attach");
    transport
        .send(PushEvent::Connected {
            socket_id: "sock-1".into(),
        })
        .await
        .expect("send");
    transport
        .send(PushEvent::Notification(note("b", false)))
        .await
        .expect("send");

    let snapshot = wait_until(&sync, |s| s.notifications.len() == 2).await;
    assert_eq!(ids(&snapshot), vec!["b", "a"]);
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(snapshot.connection.phase, ConnectionPhase::Connected);
    assert_eq!(snapshot.connection.socket_id.as_deref(), Some("sock-1"));
    assert_eq!(alerts.take(), vec![("Title b".into(), "Message b".into())]);
}

#[tokio::test]
async fn push_before_connected_is_dropped() {
    let (sync, alerts) = spawn(MockApi::with_server(vec![]));
    let transport = sync.attach_transport().await.expect("attach");

    transport
        .send(PushEvent::Notification(note("early", false)))
        .await
        .expect("send");
    transport
        .send(PushEvent::Connected {
            socket_id: "s".into(),
        })
        .await
        .expect("send");

    let snapshot = wait_until(&sync, |s| s.connection.connected()).await;
    assert!(snapshot.notifications.is_empty());
    assert!(alerts.take().is_empty());
}

#[tokio::test]
async fn duplicate_push_is_collapsed_when_dedup_enabled() {
    let api = MockApi::with_server(vec![note("a", false)]);
    let (sync, _) = spawn(api);
    sync.fetch_notifications(Filter::All).await.expect("fetch");

    let transport = sync.attach_transport().await.expect("attach");
    transport
        .send(PushEvent::Connected { socket_id: "s".into() })
        .await
        .expect("send");
    transport
        .send(PushEvent::Notification(note("b", false)))
        .await
        .expect("send");
    transport
        .send(PushEvent::Notification(note("a", false)))
        .await
        .expect("send");

    let snapshot = wait_until(&sync, |s| {
        s.notifications.len() == 2 && s.notifications.first().is_some_and(|n| n.id.0 == "a")
    })
    .await;
    assert_eq!(ids(&snapshot), vec!["a", "b"]);
    assert_eq!(snapshot.unread_count, 2);
}

#[tokio::test]
async fn duplicate_push_produces_two_entries_without_dedup() {
    let api = MockApi::with_server(vec![note("a", false)]);
    let config = Config {
        push_dedup: false,
        ..config()
    };
    let (sync, _) = spawn_with(api.clone(), config, session());
    sync.fetch_notifications(Filter::All).await.expect("fetch");

    let transport = sync.attach_transport().await.expect("attach");
    transport
        .send(PushEvent::Connected { socket_id: "s".into() })
        .await
        .expect("send");
    transport
        .send(PushEvent::Notification(note("a", false)))
        .await
        .expect("send");

    let snapshot = wait_until(&sync, |s| s.notifications.len() == 2).await;
    assert_eq!(ids(&snapshot), vec!["a", "a"]);
    assert_eq!(snapshot.unread_count, 2);

    // One request for the id; every copy of it is read afterwards.
    sync.mark_as_read("a").await.expect("mark read");
    let snapshot = sync.snapshot();
    assert_eq!(api.mark_calls.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.notifications.len(), 2);
    assert!(snapshot.notifications.iter().all(|n| n.is_read));
    assert_eq!(snapshot.unread_count, 0);
}

#[tokio::test]
async fn events_from_replaced_transport_are_ignored() {
    let (sync, _) = spawn(MockApi::with_server(vec![]));
    let old = sync.attach_transport().await.expect("attach");
    let new = sync.attach_transport().await.expect("reattach");
    assert!(new.epoch() > old.epoch());

    old.send(PushEvent::Connected { socket_id: "old".into() })
        .await
        .expect("send");
    old.send(PushEvent::Notification(note("stale", false)))
        .await
        .expect("send");
    new.send(PushEvent::Connected { socket_id: "new".into() })
        .await
        .expect("send");
    new.send(PushEvent::Notification(note("fresh", false)))
        .await
        .expect("send");

    let snapshot = wait_until(&sync, |s| !s.notifications.is_empty()).await;
    assert_eq!(ids(&snapshot), vec!["fresh"]);
    assert_eq!(snapshot.connection.socket_id.as_deref(), Some("new"));
}

#[tokio::test]
async fn transport_error_flips_connectivity_without_failing() {
    let (sync, _) = spawn(MockApi::with_server(vec![note("a", false)]));
    let transport = sync.attach_transport().await.expect("attach");
    transport
        .send(PushEvent::Connected { socket_id: "s".into() })
        .await
        .expect("send");
    wait_until(&sync, |s| s.connection.connected()).await;

    transport
        .send(PushEvent::Error("websocket reset".into()))
        .await
        .expect("send");
    let snapshot = wait_until(&sync, |s| !s.connection.connected()).await;
    assert_eq!(snapshot.connection.label(), "Disconnected (Polling)");

    // REST keeps working while the push channel is down.
    assert_eq!(sync.fetch_notifications(Filter::All).await.expect("fetch"), 1);
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn production_build_skips_local_push_endpoint() {
    let config = Config {
        environment: Environment::Production,
        push_url: "http://127.0.0.1:5000".into(),
        ..Config::default()
    };
    let (sync, _) = spawn_with(MockApi::with_server(vec![]), config, session());
    assert_eq!(
        sync.connect().await.expect("connect"),
        ConnectOutcome::Skipped(SkipReason::LocalEndpointInProduction)
    );
    assert_eq!(sync.snapshot().connection.phase, ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (sync, alerts) = spawn(MockApi::with_server(vec![]));
    sync.disconnect().await.expect("first");
    sync.disconnect().await.expect("second");

    let transport = sync.attach_transport().await.expect("attach");
    transport
        .send(PushEvent::Connected { socket_id: "s".into() })
        .await
        .expect("send");
    wait_until(&sync, |s| s.connection.connected()).await;

    sync.disconnect().await.expect("disconnect");
    sync.disconnect().await.expect("again");
    assert_eq!(sync.snapshot().connection.phase, ConnectionPhase::Disconnected);

    transport
        .send(PushEvent::Notification(note("late", false)))
        .await
        .expect("send");

    // The queue is FIFO: once the follow-up lands, the late event was seen.
    let next = sync.attach_transport().await.expect("reattach");
    next.send(PushEvent::Connected { socket_id: "t".into() })
        .await
        .expect("send");
    next.send(PushEvent::Notification(note("follow-up", false)))
        .await
        .expect("send");
    let snapshot = wait_until(&sync, |s| !s.notifications.is_empty()).await;
    assert_eq!(ids(&snapshot), vec!["follow-up"]);
    assert_eq!(
        alerts.take(),
        vec![("Title follow-up".to_string(), "Message follow-up".to_string())]
    );
}

#[tokio::test]
async fn shutdown_clears_collection_and_stops_service() {
    let (sync, _) = spawn(MockApi::with_server(vec![note("a", false)]));
    sync.fetch_notifications(Filter::All).await.expect("fetch");
    let mut rx = sync.subscribe();

    sync.shutdown().await.expect("shutdown");
    assert!(rx.borrow_and_update().notifications.is_empty());
    assert!(matches!(
        sync.fetch_notifications(Filter::All).await,
        Err(SyncError::ChannelClosed(_))
    ));
}

#[tokio::test]
async fn can_delete_follows_recipients() {
    let (sync, _) = spawn(MockApi::with_server(vec![]));
    let mut personal = note("p", false);
    personal.recipients = Some([UserId::from("u-1")].into_iter().collect());
    let broadcast = note("b", false);

    assert!(sync.can_delete(&personal));
    assert!(!sync.can_delete(&broadcast));
}
