//! Notification sink
//!
//! Fire-and-forget. The executor logs notifier failures and never lets
//! them affect a transition's result.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Event type names.
pub mod events {
    pub const TRANSITIONED: &str = "submission.transitioned";
    pub const JOB_STARTED: &str = "submission.job_started";
    pub const JOB_COMPLETED: &str = "submission.job_completed";
    pub const JOB_ABANDONED: &str = "submission.job_abandoned";
    pub const PUBLISHED: &str = "submission.published";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: String,
    pub metadata: serde_json::Value,
}

impl NotificationEvent {
    pub fn new(event_type: &str, metadata: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification '{event_type}' failed: {reason}")]
pub struct NotifyError {
    pub event_type: String,
    pub reason: String,
}

/// Notification/analytics collaborator.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(event_type = %event.event_type, metadata = %event.metadata, "notification");
        Ok(())
    }
}

/// Keeps every event; can be switched into an outage.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if *self.failing.lock().unwrap() {
            return Err(NotifyError {
                event_type: event.event_type.clone(),
                reason: "notifier outage".to_string(),
            });
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
