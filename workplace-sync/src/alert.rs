//! User-facing alerts (toasts) raised when a push notification arrives.

use std::sync::{Arc, Mutex};

/// Consumer of `(title, message)` alerts.
pub trait AlertSink: Send + Sync + 'static {
    fn alert(&self, title: &str, message: &str);
}

/// Routes alerts into the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn alert(&self, title: &str, message: &str) {
        tracing::info!(title, message, "new notification");
    }
}

/// Keeps every alert in memory; useful for front ends that render a queue.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerts {
    alerts: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return the alerts raised so far.
    pub fn take(&self) -> Vec<(String, String)> {
        match self.alerts.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, title: &str, message: &str) {
        let entry = (title.to_string(), message.to_string());
        match self.alerts.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
