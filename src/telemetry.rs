//! Diagnostic telemetry and outcome counters
//!
//! Two independent concerns live here:
//!
//! - Counters recorded through the `metrics` facade. No recorder is
//!   installed by this crate; embedding applications choose one.
//! - [`Telemetry`], a fire-and-forget reporter posting [`LogEntry`] events
//!   to the backend log endpoint. Its failures are logged at `debug` and
//!   otherwise dropped. Deliveries run as tasks on the current runtime, so a
//!   short-lived process calls [`Telemetry::flush`] before the runtime shuts
//!   down.
//!
//! # Metrics
//!
//! - `relaybox_auth_attempts_total{strategy,outcome}`
//! - `relaybox_fetch_total{feed,outcome}`
//! - `relaybox_fetch_discarded_total{feed}`
//! - `relaybox_send_total{kind,outcome}`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::increment_counter;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::types::LogEntry;
use crate::api::RelayApi;
use crate::session::lock;

/// Count one authentication strategy attempt
pub fn record_auth_attempt(strategy: &'static str, outcome: &'static str) {
    increment_counter!(
        "relaybox_auth_attempts_total",
        "strategy" => strategy,
        "outcome" => outcome
    );
}

/// Count one completed feed fetch
pub fn record_fetch(feed: &'static str, outcome: &'static str) {
    increment_counter!("relaybox_fetch_total", "feed" => feed, "outcome" => outcome);
}

/// Count one fetch result dropped because a newer one was already applied
pub fn record_fetch_discarded(feed: &'static str) {
    increment_counter!("relaybox_fetch_discarded_total", "feed" => feed);
}

/// Count one send or reply outcome
pub fn record_send(kind: &'static str, outcome: &'static str) {
    increment_counter!("relaybox_send_total", "kind" => kind, "outcome" => outcome);
}

/// Fire-and-forget reporter for the backend log endpoint
#[derive(Debug, Clone)]
pub struct Telemetry {
    api: Arc<dyn RelayApi>,
    enabled: bool,
    user_id: Option<i64>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Telemetry {
    /// Create a reporter
    ///
    /// # Arguments
    ///
    /// * `api` - Backend used to deliver events
    /// * `enabled` - When false, `report` does nothing
    /// * `user_id` - Attached to every event when known
    pub fn new(api: Arc<dyn RelayApi>, enabled: bool, user_id: Option<i64>) -> Self {
        Self {
            api,
            enabled,
            user_id,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build the entry that `report` would deliver
    pub fn entry(&self, level: &str, event: &str, message: impl Into<String>) -> LogEntry {
        LogEntry {
            event_id: Uuid::new_v4(),
            level: level.to_string(),
            event: event.to_string(),
            message: message.into(),
            user_id: self.user_id,
            timestamp: Utc::now(),
        }
    }

    /// Post an event in the background without waiting for the result
    ///
    /// Does nothing when telemetry is disabled or no Tokio runtime is
    /// running on the current thread.
    pub fn report(&self, level: &str, event: &str, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let entry = self.entry(level, event, message);
        let api = Arc::clone(&self.api);
        let task = handle.spawn(async move {
            if let Err(e) = api.log_event(&entry).await {
                tracing::debug!("Telemetry event {} dropped: {}", entry.event, e);
            }
        });

        let mut pending = lock(&self.pending);
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    /// Number of reports still being delivered
    pub fn pending(&self) -> usize {
        lock(&self.pending)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Wait for outstanding reports, giving up after `timeout`
    ///
    /// Reports still running when the timeout elapses keep running in the
    /// background and are lost if the runtime shuts down.
    pub async fn flush(&self, timeout: Duration) {
        let tasks: Vec<JoinHandle<()>> = lock(&self.pending).drain(..).collect();
        if tasks.is_empty() {
            return;
        }

        let count = tasks.len();
        let drain = async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::debug!("Telemetry task failed: {}", e);
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::debug!("Telemetry flush timed out with {} report(s) queued", count);
        }
    }
}
