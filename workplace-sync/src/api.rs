//! REST client for the notification endpoints.
//!
//! ```text
//! GET    {base}/notifications?filter=<filter>  -> { success, notifications }
//! PATCH  {base}/notifications/{id}/read        -> { success }
//! DELETE {base}/notifications/{id}             -> { success }
//! ```
//!
//! Every request carries `Authorization: Bearer <token>`. Calls block; the
//! sync service runs them on the blocking pool.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use workplace_core::{
    types::{Filter, Notification, NotificationId},
    Config,
};

use crate::error::SyncError;

/// Server side of notification sync, as seen by the client.
pub trait NotificationApi: Send + Sync + 'static {
    fn fetch(&self, token: &str, filter: Filter) -> Result<Vec<Notification>, SyncError>;

    fn mark_read(&self, token: &str, id: &NotificationId) -> Result<(), SyncError>;

    fn delete(&self, token: &str, id: &NotificationId) -> Result<(), SyncError>;
}

/// Response envelope shared by all notification endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    notifications: Vec<Notification>,
    #[serde(default)]
    message: Option<String>,
}

/// [`NotificationApi`] over HTTP with `ureq`.
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    agent: ureq::Agent,
    base: Url,
}

impl HttpNotificationApi {
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, SyncError> {
        if base.cannot_be_a_base() {
            return Err(SyncError::InvalidEndpoint(format!(
                "'{base}' cannot carry a path"
            )));
        }
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            agent: builder.build(),
            base,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        Self::new(config.api_base()?, config.request_timeout())
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidEndpoint(format!("'{}' cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: ureq::Request, token: &str) -> Result<Envelope, SyncError> {
        let request = request
            .set("Authorization", &format!("Bearer {token}"))
            .set("Content-Type", "application/json");
        let method = request.method().to_string();
        let target = request.url().to_string();

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let detail = response
                    .into_json::<Envelope>()
                    .ok()
                    .and_then(|envelope| envelope.message)
                    .unwrap_or_else(|| format!("HTTP {code}"));
                tracing::warn!(%method, url = %target, status = code, "notification request rejected");
                return Err(match code {
                    401 | 403 => SyncError::Auth(detail),
                    _ => SyncError::Server(detail),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                tracing::warn!(%method, url = %target, error = %transport, "notification request failed");
                return Err(SyncError::Network(transport.to_string()));
            }
        };

        let envelope: Envelope = response
            .into_json()
            .map_err(|err| SyncError::Server(format!("malformed response: {err}")))?;
        if !envelope.success {
            return Err(SyncError::Server(
                envelope
                    .message
                    .unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        tracing::debug!(%method, url = %target, "notification request succeeded");
        Ok(envelope)
    }
}

impl NotificationApi for HttpNotificationApi {
    fn fetch(&self, token: &str, filter: Filter) -> Result<Vec<Notification>, SyncError> {
        let url = self.url(&["notifications"])?;
        let request = self
            .agent
            .get(url.as_str())
            .query("filter", filter.as_str());
        Ok(self.send(request, token)?.notifications)
    }

    fn mark_read(&self, token: &str, id: &NotificationId) -> Result<(), SyncError> {
        let url = self.url(&["notifications", &id.0, "read"])?;
        self.send(self.agent.patch(url.as_str()), token).map(|_| ())
    }

    fn delete(&self, token: &str, id: &NotificationId) -> Result<(), SyncError> {
        let url = self.url(&["notifications", &id.0])?;
        self.send(self.agent.delete(url.as_str()), token).map(|_| ())
    }
}
