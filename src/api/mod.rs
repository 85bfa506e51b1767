//! Relay backend abstraction and its HTTP implementation
//!
//! The [`RelayApi`] trait is the seam between the sync engine and the
//! backend REST API. [`http::HttpRelayApi`] speaks the real wire protocol;
//! tests substitute a mock.
//!
//! Authentication is not part of this trait: it is driven by the ordered
//! strategies in [`crate::auth`], which share the same `reqwest` client.

use async_trait::async_trait;

use crate::error::{FetchError, SendError};

pub mod http;
pub mod types;

use types::{ActionResponse, InboxRecord, LogEntry, SentRecord, StatsRecord, UserRecord};

/// Operations the client performs against the relay backend once a
/// session is established
///
/// Every call carries the opaque init credential; the backend validates it
/// on each request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayApi: Send + Sync + std::fmt::Debug {
    /// Fetch the sent feed (all of the user's messages, answered or not)
    async fn fetch_sent(&self, credential: &str) -> Result<Vec<SentRecord>, FetchError>;

    /// Fetch the inbox feed (messages with an operator answer)
    async fn fetch_inbox(&self, credential: &str) -> Result<Vec<InboxRecord>, FetchError>;

    /// Submit a new outbound message
    ///
    /// Returns the parsed server verdict; `ok == false` is not an `Err`.
    async fn send_message(&self, credential: &str, text: &str)
        -> Result<ActionResponse, SendError>;

    /// Answer a pending message (admin sessions)
    async fn reply(
        &self,
        credential: &str,
        message_id: i64,
        answer: &str,
    ) -> Result<ActionResponse, SendError>;

    /// Fetch aggregate relay statistics (admin sessions)
    async fn fetch_stats(&self, credential: &str) -> Result<StatsRecord, FetchError>;

    /// Fetch the user list (admin sessions)
    async fn fetch_users(&self, credential: &str) -> Result<Vec<UserRecord>, FetchError>;

    /// Post a diagnostic event; callers ignore the outcome
    async fn log_event(&self, entry: &LogEntry) -> Result<(), FetchError>;
}
