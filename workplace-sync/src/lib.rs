//! # workplace-sync
//!
//! Live notification view for the signed-in user: a Socket.IO push channel
//! feeds new notifications, REST stays the source of truth for fetch,
//! mark-read and delete.
//!
//! Spawn a [`NotificationSync`] per session and drive it through the handle;
//! observe state through [`NotificationSync::subscribe`].

pub mod alert;
pub mod api;
pub mod error;
pub mod frame;
pub mod polling;
pub mod push;
pub mod service;
pub mod store;

pub use alert::{AlertSink, RecordingAlerts, TracingAlerts};
pub use api::{HttpNotificationApi, NotificationApi};
pub use error::SyncError;
pub use push::{ConnectionPhase, ConnectionState, PushEvent, PushSender};
pub use service::{ConnectOutcome, NotificationSync, SkipReason, Snapshot};
pub use store::NotificationStore;
