//! Outbound message pipeline
//!
//! [`SendPipeline`] validates text, submits it and triggers the follow-up
//! refresh. At most one send or reply is in flight per session: the
//! `sending` flag is taken with a compare-exchange and released by a drop
//! guard, so a second submit while one is pending is skipped rather than
//! queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::types::ActionResponse;
use crate::config::ComposeConfig;
use crate::error::SendError;
use crate::host::Popup;
use crate::session::{lock, SessionContext};
use crate::sync::SyncCoordinator;
use crate::telemetry::record_send;
use crate::view::Feed;

/// Popup text when the server gives no reason for a failure
const DEFAULT_SEND_FAILURE: &str = "Failed to send message";

/// Text being composed, with its advisory length counter
#[derive(Debug, Clone)]
pub struct ComposeBuffer {
    text: String,
    max_length: usize,
    warn_threshold: usize,
}

impl ComposeBuffer {
    pub fn new(config: &ComposeConfig) -> Self {
        Self {
            text: String::new(),
            max_length: config.max_length,
            warn_threshold: config.warn_threshold,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Length in UTF-16 code units, the unit the host counts in
    pub fn len_units(&self) -> usize {
        self.text.encode_utf16().count()
    }

    /// Counter label, e.g. `"5/4096"`
    ///
    /// # Examples
    ///
    /// ```
    /// use relaybox::config::ComposeConfig;
    /// use relaybox::send::ComposeBuffer;
    ///
    /// let mut buffer = ComposeBuffer::new(&ComposeConfig::default());
    /// buffer.set("Hello");
    /// assert_eq!(buffer.counter(), "5/4096");
    /// ```
    pub fn counter(&self) -> String {
        format!("{}/{}", self.len_units(), self.max_length)
    }

    pub fn is_warning(&self) -> bool {
        self.len_units() >= self.warn_threshold
    }

    /// Whether the text is non-empty after trimming
    pub fn is_sendable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Validated outbound text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Trimmed text as submitted
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

impl SendRequest {
    /// # Errors
    ///
    /// Returns [`SendError::ValidationEmpty`] when `text` is blank.
    pub fn new(text: &str) -> Result<Self, SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::ValidationEmpty);
        }
        Ok(Self {
            text: text.to_string(),
            submitted_at: Utc::now(),
        })
    }
}

/// Server acknowledgement of a send or reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentConfirmation {
    /// Id assigned by the server; absent if the server omitted it
    pub message_id: Option<i64>,
    pub request: SendRequest,
}

impl SentConfirmation {
    /// `#<id>`, or an empty string when the server returned no id
    pub fn reference(&self) -> String {
        self.message_id
            .map(|id| format!("#{}", id))
            .unwrap_or_default()
    }
}

/// Why a submit did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    InFlight,
}

/// Result of a submit that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(SentConfirmation),
    Replied(SentConfirmation),
    Skipped(SkipReason),
}

/// Holds the sending flag until dropped
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Message,
    Reply,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Message => "message",
            Action::Reply => "reply",
        }
    }
}

/// Validates and submits outbound text for one session
#[derive(Debug, Clone)]
pub struct SendPipeline {
    context: Arc<SessionContext>,
    sync: SyncCoordinator,
}

impl SendPipeline {
    pub fn new(context: Arc<SessionContext>, sync: SyncCoordinator) -> Self {
        Self { context, sync }
    }

    /// Replace the compose buffer
    pub fn set_input(&self, text: impl Into<String>) {
        lock(&self.context.compose).set(text);
        self.context.publish();
    }

    pub fn input(&self) -> String {
        lock(&self.context.compose).text().to_string()
    }

    pub fn counter(&self) -> String {
        lock(&self.context.compose).counter()
    }

    /// Whether the send affordance is enabled
    pub fn can_send(&self) -> bool {
        !self.context.is_sending() && lock(&self.context.compose).is_sendable()
    }

    /// Submit the compose buffer
    pub async fn submit_input(&self) -> Result<SendOutcome, SendError> {
        let text = self.input();
        self.submit(&text).await
    }

    /// Send `text` as a new message
    ///
    /// On success the compose buffer is cleared and both feeds are refreshed
    /// once. On failure the host shows an error and the buffer is kept.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::ServerRejected`] when the server refuses the
    /// message and [`SendError::NetworkException`] when it cannot be
    /// reached. Blank text and concurrent submits are
    /// [`SendOutcome::Skipped`], not errors.
    pub async fn submit(&self, text: &str) -> Result<SendOutcome, SendError> {
        let Ok(request) = SendRequest::new(text) else {
            tracing::debug!("Ignoring submit of blank text");
            return Ok(SendOutcome::Skipped(SkipReason::Empty));
        };
        let Some(guard) = InFlight::acquire(&self.context.sending) else {
            tracing::debug!("Ignoring submit while a send is in flight");
            return Ok(SendOutcome::Skipped(SkipReason::InFlight));
        };
        self.context.publish();

        let response = self
            .context
            .api
            .send_message(self.context.credential(), &request.text)
            .await;
        let result = match self.verdict(Action::Message, response) {
            Ok(message_id) => {
                lock(&self.context.compose).clear();
                let confirmation = SentConfirmation {
                    message_id,
                    request,
                };
                tracing::info!("Message {} sent", confirmation.reference());
                self.context.host.show_popup(Popup::info(
                    "Sent",
                    match message_id {
                        Some(id) => format!("Message #{} sent!", id),
                        None => "Message sent!".to_string(),
                    },
                ));
                self.sync.refresh_all().await;
                Ok(SendOutcome::Sent(confirmation))
            }
            Err(e) => Err(e),
        };

        drop(guard);
        self.context.publish();
        result
    }

    /// Answer a pending message (admin sessions only)
    ///
    /// Shares the single-flight flag with [`submit`](Self::submit). On
    /// success the inbox feed is refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotPermitted`] for non-admin sessions, otherwise
    /// the same errors as `submit`.
    pub async fn reply(&self, message_id: i64, answer: &str) -> Result<SendOutcome, SendError> {
        if !self.context.session().is_admin {
            return Err(SendError::NotPermitted);
        }
        let Ok(request) = SendRequest::new(answer) else {
            tracing::debug!("Ignoring blank answer to #{}", message_id);
            return Ok(SendOutcome::Skipped(SkipReason::Empty));
        };
        let Some(guard) = InFlight::acquire(&self.context.sending) else {
            tracing::debug!("Ignoring reply while a send is in flight");
            return Ok(SendOutcome::Skipped(SkipReason::InFlight));
        };
        self.context.publish();

        let response = self
            .context
            .api
            .reply(self.context.credential(), message_id, &request.text)
            .await;
        let result = match self.verdict(Action::Reply, response) {
            Ok(_) => {
                tracing::info!("Answer to #{} sent", message_id);
                self.context.host.show_popup(Popup::info(
                    "Sent",
                    format!("Answer to #{} sent!", message_id),
                ));
                self.sync.refresh_one(Feed::Inbox).await;
                Ok(SendOutcome::Replied(SentConfirmation {
                    message_id: Some(message_id),
                    request,
                }))
            }
            Err(e) => Err(e),
        };

        drop(guard);
        self.context.publish();
        result
    }

    /// Turn a server answer into the created id or a reported failure
    fn verdict(
        &self,
        action: Action,
        response: Result<ActionResponse, SendError>,
    ) -> Result<Option<i64>, SendError> {
        let error = match response {
            Ok(response) if response.ok => {
                record_send(action.as_str(), "success");
                return Ok(response.message_id);
            }
            Ok(response) => SendError::ServerRejected(
                response
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SEND_FAILURE.to_string()),
            ),
            Err(e) => e,
        };

        let (outcome, popup) = match &error {
            SendError::ServerRejected(reason) => ("rejected", reason.clone()),
            _ => ("error", DEFAULT_SEND_FAILURE.to_string()),
        };
        tracing::warn!("Failed to send {}: {}", action.as_str(), error);
        record_send(action.as_str(), outcome);
        self.context
            .telemetry
            .report("error", "send_failed", format!("{}: {}", action.as_str(), error));
        self.context.host.show_popup(Popup::error(popup));
        Err(error)
    }
}
