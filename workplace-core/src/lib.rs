//! Workplace core library: domain types, persisted session and configuration.
//!
//! - [`types`]: notifications, roles, filters, sessions
//! - [`session`]: the signed-in user's persisted session
//! - [`config`]: endpoints and sync tuning
//! - [`error`]: [`StoreError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod session;
pub mod types;

pub use config::{Config, Environment};
pub use error::StoreError;
pub use types::{
    can_delete, Filter, Notification, NotificationId, Priority, Role, Session, UserId,
};
