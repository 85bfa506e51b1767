//! Feed synchronization
//!
//! [`SyncCoordinator`] fetches the sent and inbox feeds, merges them into
//! the [`MessageStore`](crate::store::MessageStore) and publishes the
//! result. Fetch failures never escape: they are logged, counted, reported
//! to telemetry and leave the feed in its empty state.
//!
//! Every fetch is stamped with a generation taken from the session
//! counter. A completion whose generation is older than the one already
//! applied to the same feed is discarded, so an out-of-order response can
//! never overwrite newer data.

use std::sync::Arc;

use chrono::Utc;

use crate::error::FetchError;
use crate::session::{lock, SessionContext};
use crate::store::Message;
use crate::telemetry::{record_fetch, record_fetch_discarded};
use crate::view::{Activation, Feed, FeedStatus, Stats, Tab};

/// Loads feeds and keeps the store current
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    context: Arc<SessionContext>,
}

impl SyncCoordinator {
    pub fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    /// Fetch both message feeds concurrently
    ///
    /// Each feed is applied as soon as it completes; one failing does not
    /// affect the other.
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.refresh_one(Feed::Outbox),
            self.refresh_one(Feed::Inbox)
        );
    }

    /// Fetch a single feed and apply it unless a newer result already was
    pub async fn refresh_one(&self, feed: Feed) {
        let ctx = &self.context;
        let generation = ctx.next_generation();
        lock(&ctx.state).view.begin_load(feed.tab());
        ctx.publish();

        tracing::debug!("Fetching {} feed (generation {})", feed.as_str(), generation);
        let result = self.fetch(feed).await;
        self.apply(feed, generation, result);
        ctx.publish();
    }

    /// Apply a completed fetch stamped with `generation`
    fn apply(&self, feed: Feed, generation: u64, result: Result<Vec<Message>, FetchError>) {
        let ctx = &self.context;
        let mut state = lock(&ctx.state);
        state.view.finish_load(feed.tab());

        let slot = state.slot_mut(feed);
        if generation < slot.generation {
            tracing::debug!(
                "Discarding {} feed generation {} (applied: {})",
                feed.as_str(),
                generation,
                slot.generation
            );
            record_fetch_discarded(feed.as_str());
            return;
        }

        slot.generation = generation;
        match result {
            Ok(messages) => {
                tracing::debug!("Loaded {} {} messages", messages.len(), feed.as_str());
                slot.messages = messages;
                slot.status = FeedStatus::Ready;
                record_fetch(feed.as_str(), "success");
            }
            Err(e) => {
                tracing::warn!("Failed to load {} feed: {}", feed.as_str(), e);
                slot.messages.clear();
                slot.status = FeedStatus::Failed(e.to_string());
                record_fetch(feed.as_str(), "failure");
                ctx.telemetry.report(
                    "warn",
                    "fetch_failed",
                    format!("{} feed: {}", feed.as_str(), e),
                );
            }
        }
        state.rebuild_store();
    }

    /// Switch tabs, fetching the tab's data when the load policy asks for it
    ///
    /// Returns `false` if the tab is not available to this session.
    pub async fn activate_tab(&self, tab: Tab) -> bool {
        let activation = lock(&self.context.state).view.activate(tab);
        self.context.publish();

        match activation {
            Activation::Unavailable => false,
            Activation::Activated { load: false } => true,
            Activation::Activated { load: true } => {
                match tab.feed() {
                    Some(feed) => self.refresh_one(feed).await,
                    None => self.refresh_stats().await,
                }
                true
            }
        }
    }

    /// Fetch admin statistics and the user list
    ///
    /// Does nothing for non-admin sessions. A failed user list still shows
    /// the counters; a failed stats call marks the panel failed.
    pub async fn refresh_stats(&self) {
        let ctx = &self.context;
        if !ctx.session().is_admin {
            tracing::debug!("Skipping stats refresh for non-admin session");
            return;
        }

        let generation = ctx.next_generation();
        lock(&ctx.state).view.begin_load(Tab::Stats);
        ctx.publish();

        let credential = ctx.credential();
        let (stats, users) = tokio::join!(
            ctx.api.fetch_stats(credential),
            ctx.api.fetch_users(credential)
        );
        let users = users.unwrap_or_else(|e| {
            tracing::warn!("Failed to load users: {}", e);
            record_fetch("users", "failure");
            Vec::new()
        });

        {
            let mut state = lock(&ctx.state);
            state.view.finish_load(Tab::Stats);

            let slot = &mut state.stats;
            if generation < slot.generation {
                record_fetch_discarded("stats");
            } else {
                slot.generation = generation;
                match stats {
                    Ok(record) => {
                        slot.stats = Some(Stats::from_records(record, users));
                        slot.status = FeedStatus::Ready;
                        record_fetch("stats", "success");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load stats: {}", e);
                        slot.stats = None;
                        slot.status = FeedStatus::Failed(e.to_string());
                        record_fetch("stats", "failure");
                        ctx.telemetry
                            .report("warn", "fetch_failed", format!("stats: {}", e));
                    }
                }
            }
        }
        ctx.publish();
    }

    async fn fetch(&self, feed: Feed) -> Result<Vec<Message>, FetchError> {
        let ctx = &self.context;
        let now = Utc::now();
        let messages = match feed {
            Feed::Outbox => ctx
                .api
                .fetch_sent(ctx.credential())
                .await?
                .into_iter()
                .filter_map(|record| Message::from_sent(record, now))
                .collect(),
            Feed::Inbox => ctx
                .api
                .fetch_inbox(ctx.credential())
                .await?
                .into_iter()
                .filter_map(|record| Message::from_inbox(record, now))
                .collect(),
        };
        Ok(messages)
    }
}
