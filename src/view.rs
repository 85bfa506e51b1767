//! Tab and load state machine plus the published view model
//!
//! [`ViewState`] tracks which tab is active and which loads are in flight.
//! [`ViewModel`] is the immutable snapshot handed to renderers; it is
//! rebuilt from scratch after every state change and never mutated in
//! place.
//!
//! ```text
//!            activate(tab)                      fetch completes
//!   Idle ----------------------> Loading ----------------------> Idle
//!    ^   (never loaded, or eager)                (any outcome)   |
//!    +-----------------------------------------------------------+
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::api::types::{StatsRecord, UserRecord};
use crate::config::LoadPolicy;
use crate::store::Message;

/// Number of users listed on the stats panel
pub const STATS_TOP_USERS: usize = 5;

/// Top-level tabs of the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Inbox,
    Outbox,
    /// Admin sessions only
    Stats,
}

impl Tab {
    /// The message feed shown on this tab, if any
    pub fn feed(&self) -> Option<Feed> {
        match self {
            Tab::Inbox => Some(Feed::Inbox),
            Tab::Outbox => Some(Feed::Outbox),
            Tab::Stats => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Inbox => "Inbox",
            Tab::Outbox => "Sent",
            Tab::Stats => "Stats",
        }
    }
}

/// Message feeds fetched from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// Sent messages (the outbox view is derived from it)
    Outbox,
    /// Answered messages
    Inbox,
}

impl Feed {
    pub fn tab(&self) -> Tab {
        match self {
            Feed::Outbox => Tab::Outbox,
            Feed::Inbox => Tab::Inbox,
        }
    }

    /// Stable name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Outbox => "sent",
            Feed::Inbox => "inbox",
        }
    }
}

/// Whether a panel is waiting for data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
}

/// Outcome of the last applied fetch of a panel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum FeedStatus {
    #[default]
    NotLoaded,
    Ready,
    /// The last fetch failed; the panel shows its empty state
    Failed(String),
}

/// Result of a tab activation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The tab is not available to this session; nothing changed
    Unavailable,
    /// The tab is now active; `load` tells whether its data must be fetched
    Activated { load: bool },
}

#[derive(Debug, Clone, Copy, Default)]
struct LoadSlot {
    in_flight: usize,
    loaded: bool,
}

/// Active tab plus per-tab load tracking
#[derive(Debug, Clone)]
pub struct ViewState {
    active: Tab,
    is_admin: bool,
    policy: LoadPolicy,
    slots: HashMap<Tab, LoadSlot>,
}

impl ViewState {
    /// Initial state for a session role
    ///
    /// Admins start on the inbox, users on their sent messages.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaybox::config::LoadPolicy;
    /// use relaybox::view::{Tab, ViewState};
    ///
    /// assert_eq!(ViewState::new(false, LoadPolicy::Lazy).active(), Tab::Outbox);
    /// assert_eq!(ViewState::new(true, LoadPolicy::Lazy).active(), Tab::Inbox);
    /// ```
    pub fn new(is_admin: bool, policy: LoadPolicy) -> Self {
        Self {
            active: if is_admin { Tab::Inbox } else { Tab::Outbox },
            is_admin,
            policy,
            slots: HashMap::new(),
        }
    }

    pub fn active(&self) -> Tab {
        self.active
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Whether this session may open `tab`
    pub fn is_available(&self, tab: Tab) -> bool {
        tab != Tab::Stats || self.is_admin
    }

    /// Tabs shown to this session, in display order
    pub fn visible_tabs(&self) -> Vec<Tab> {
        [Tab::Inbox, Tab::Outbox, Tab::Stats]
            .into_iter()
            .filter(|tab| self.is_available(*tab))
            .collect()
    }

    /// Switch to `tab` and decide whether its data must be fetched
    pub fn activate(&mut self, tab: Tab) -> Activation {
        if !self.is_available(tab) {
            tracing::warn!("Tab {:?} is not available to this session", tab);
            return Activation::Unavailable;
        }
        self.active = tab;

        let slot = self.slots.get(&tab).copied().unwrap_or_default();
        let load = match self.policy {
            LoadPolicy::Eager => true,
            LoadPolicy::Lazy => !slot.loaded && slot.in_flight == 0,
        };
        Activation::Activated { load }
    }

    /// Record that a fetch for `tab` started
    pub fn begin_load(&mut self, tab: Tab) {
        self.slots.entry(tab).or_default().in_flight += 1;
    }

    /// Record that a fetch for `tab` completed, whatever its outcome
    pub fn finish_load(&mut self, tab: Tab) {
        let slot = self.slots.entry(tab).or_default();
        slot.in_flight = slot.in_flight.saturating_sub(1);
        slot.loaded = true;
    }

    pub fn load_state(&self, tab: Tab) -> LoadState {
        match self.slots.get(&tab) {
            Some(slot) if slot.in_flight > 0 => LoadState::Loading,
            _ => LoadState::Idle,
        }
    }

    /// Whether at least one fetch for `tab` has completed
    pub fn has_loaded(&self, tab: Tab) -> bool {
        self.slots.get(&tab).map(|s| s.loaded).unwrap_or(false)
    }
}

/// One row of the stats panel's user list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub user_id: Option<i64>,
    pub first_name: String,
    pub username: Option<String>,
    pub is_banned: bool,
    pub messages_count: u64,
    pub unanswered_count: u64,
}

/// Aggregate relay statistics shown to admins
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Stats {
    pub total_messages: u64,
    pub messages_today: u64,
    pub total_users: u64,
    pub active_users_today: u64,
    pub answers_sent: u64,
    pub bans_issued: u64,
    /// First [`STATS_TOP_USERS`] users as returned by the server
    pub top_users: Vec<UserSummary>,
}

impl Stats {
    /// Combine the stats and users responses
    ///
    /// `total_users` falls back to the length of the full user list when the
    /// server reports none.
    pub fn from_records(record: StatsRecord, users: Vec<UserRecord>) -> Self {
        let user_count = users.len() as u64;
        Self {
            total_messages: record.total_messages.unwrap_or(0),
            messages_today: record.messages_today.unwrap_or(0),
            total_users: record
                .total_users
                .filter(|n| *n > 0)
                .unwrap_or(user_count),
            active_users_today: record.active_users_today.unwrap_or(0),
            answers_sent: record.answers_sent.unwrap_or(0),
            bans_issued: record.bans_issued.unwrap_or(0),
            top_users: users
                .into_iter()
                .take(STATS_TOP_USERS)
                .map(|u| UserSummary {
                    user_id: u.user_id,
                    first_name: u
                        .first_name
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| "User".to_string()),
                    username: u.username.filter(|s| !s.trim().is_empty()),
                    is_banned: u.is_banned,
                    messages_count: u.messages_count.unwrap_or(0),
                    unanswered_count: u.unanswered_count.unwrap_or(0),
                })
                .collect(),
        }
    }
}

/// Session header: who is signed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub display_name: String,
    pub badge: Option<String>,
    pub is_admin: bool,
}

/// A message list panel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FeedPanel {
    pub load: LoadState,
    pub status: FeedStatus,
    pub messages: Vec<Message>,
}

impl FeedPanel {
    /// Whether the renderer should show the "no messages" placeholder
    pub fn is_empty_state(&self) -> bool {
        self.load == LoadState::Idle && self.messages.is_empty()
    }
}

/// The admin statistics panel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsPanel {
    pub load: LoadState,
    pub status: FeedStatus,
    pub stats: Option<Stats>,
}

/// The compose box under the message lists
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ComposeView {
    /// Hidden for admins, who answer instead of sending
    pub visible: bool,
    pub text: String,
    /// `"<length>/<ceiling>"`
    pub counter: String,
    pub warning: bool,
    pub sending: bool,
    /// Whether the send affordance is enabled
    pub can_send: bool,
}

/// Complete render input, rebuilt after every state change
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ViewModel {
    /// Increases with every published snapshot
    pub revision: u64,
    pub header: Option<Header>,
    pub active_tab: Option<Tab>,
    pub tabs: Vec<Tab>,
    pub outbox: FeedPanel,
    pub inbox: FeedPanel,
    pub stats: StatsPanel,
    pub compose: ComposeView,
}

impl ViewModel {
    /// Panel of a message feed
    pub fn panel(&self, feed: Feed) -> &FeedPanel {
        match feed {
            Feed::Outbox => &self.outbox,
            Feed::Inbox => &self.inbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_tab_unavailable_to_users() {
        let mut view = ViewState::new(false, LoadPolicy::Lazy);
        assert_eq!(view.activate(Tab::Stats), Activation::Unavailable);
        assert_eq!(view.active(), Tab::Outbox);
        assert_eq!(view.visible_tabs(), vec![Tab::Inbox, Tab::Outbox]);
    }

    #[test]
    fn test_admin_sees_stats_tab() {
        let mut view = ViewState::new(true, LoadPolicy::Lazy);
        assert_eq!(view.visible_tabs(), vec![Tab::Inbox, Tab::Outbox, Tab::Stats]);
        assert_eq!(
            view.activate(Tab::Stats),
            Activation::Activated { load: true }
        );
        assert_eq!(view.active(), Tab::Stats);
    }

    #[test]
    fn test_lazy_policy_loads_once() {
        let mut view = ViewState::new(false, LoadPolicy::Lazy);
        assert_eq!(view.activate(Tab::Inbox), Activation::Activated { load: true });

        view.begin_load(Tab::Inbox);
        assert_eq!(view.load_state(Tab::Inbox), LoadState::Loading);
        // A second activation while loading does not start another fetch.
        assert_eq!(view.activate(Tab::Inbox), Activation::Activated { load: false });

        view.finish_load(Tab::Inbox);
        assert_eq!(view.load_state(Tab::Inbox), LoadState::Idle);
        assert!(view.has_loaded(Tab::Inbox));
        assert_eq!(view.activate(Tab::Inbox), Activation::Activated { load: false });
    }

    #[test]
    fn test_eager_policy_always_loads() {
        let mut view = ViewState::new(false, LoadPolicy::Eager);
        view.begin_load(Tab::Outbox);
        view.finish_load(Tab::Outbox);
        assert_eq!(view.activate(Tab::Outbox), Activation::Activated { load: true });
    }

    #[test]
    fn test_overlapping_loads_stay_loading_until_last_finishes() {
        let mut view = ViewState::new(false, LoadPolicy::Lazy);
        view.begin_load(Tab::Outbox);
        view.begin_load(Tab::Outbox);
        view.finish_load(Tab::Outbox);
        assert_eq!(view.load_state(Tab::Outbox), LoadState::Loading);
        view.finish_load(Tab::Outbox);
        assert_eq!(view.load_state(Tab::Outbox), LoadState::Idle);
        // Extra completions never underflow.
        view.finish_load(Tab::Outbox);
        assert_eq!(view.load_state(Tab::Outbox), LoadState::Idle);
    }

    #[test]
    fn test_stats_from_records_fallbacks() {
        let users: Vec<UserRecord> = (1..=7)
            .map(|i| UserRecord {
                user_id: Some(i),
                first_name: if i == 1 { None } else { Some(format!("U{i}")) },
                ..UserRecord::default()
            })
            .collect();
        let stats = Stats::from_records(
            StatsRecord {
                total_messages: Some(12),
                total_users: Some(0),
                ..StatsRecord::default()
            },
            users,
        );
        assert_eq!(stats.total_messages, 12);
        assert_eq!(stats.total_users, 7);
        assert_eq!(stats.top_users.len(), STATS_TOP_USERS);
        assert_eq!(stats.top_users[0].first_name, "User");
    }

    #[test]
    fn test_feed_panel_empty_state() {
        let mut panel = FeedPanel::default();
        assert!(panel.is_empty_state());
        panel.load = LoadState::Loading;
        assert!(!panel.is_empty_state());
    }
}
