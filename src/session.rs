//! Per-session context and the client entry point
//!
//! A [`RelaySession`] exists only after authentication succeeded. It owns
//! one [`SessionContext`] shared by the [`SyncCoordinator`] and the
//! [`SendPipeline`]; there is no process-global state, so independent
//! sessions can live side by side.
//!
//! All mutable state sits behind short-lived `std::sync::Mutex` guards that
//! are never held across an `.await`. Every change ends with
//! [`SessionContext::publish`], which rebuilds the [`ViewModel`] and sends
//! it to subscribers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::api::http::{build_client, HttpRelayApi};
use crate::api::RelayApi;
use crate::auth::{Session, SessionAuthenticator};
use crate::config::Config;
use crate::error::{AuthError, RelayError};
use crate::host::{HostBridge, Popup};
use crate::send::{ComposeBuffer, SendPipeline};
use crate::store::{reconcile, Message, MessageStore};
use crate::sync::SyncCoordinator;
use crate::telemetry::Telemetry;
use crate::view::{
    ComposeView, Feed, FeedPanel, FeedStatus, Header, Stats, StatsPanel, Tab, ViewModel,
    ViewState,
};

/// Last applied fetch of one feed
#[derive(Debug, Clone, Default)]
pub(crate) struct FeedSlot {
    /// Generation of the applied fetch; results older than this are dropped
    pub(crate) generation: u64,
    pub(crate) messages: Vec<Message>,
    pub(crate) status: FeedStatus,
}

/// Last applied stats fetch
#[derive(Debug, Clone, Default)]
pub(crate) struct StatsSlot {
    pub(crate) generation: u64,
    pub(crate) stats: Option<Stats>,
    pub(crate) status: FeedStatus,
}

/// Everything guarded by the session state lock
#[derive(Debug)]
pub(crate) struct SyncState {
    pub(crate) store: MessageStore,
    pub(crate) sent: FeedSlot,
    pub(crate) inbox: FeedSlot,
    pub(crate) stats: StatsSlot,
    pub(crate) view: ViewState,
}

impl SyncState {
    pub(crate) fn slot_mut(&mut self, feed: Feed) -> &mut FeedSlot {
        match feed {
            Feed::Outbox => &mut self.sent,
            Feed::Inbox => &mut self.inbox,
        }
    }

    /// Re-merge both feed snapshots into the store
    pub(crate) fn rebuild_store(&mut self) {
        let merged = reconcile(&self.sent.messages, &self.inbox.messages);
        self.store.replace(Some(merged));
    }

    fn panel(&self, feed: Feed) -> FeedPanel {
        let slot = match feed {
            Feed::Outbox => &self.sent,
            Feed::Inbox => &self.inbox,
        };
        // A failed feed shows its empty state even if the other feed
        // still contributes messages to this view.
        let messages = if matches!(slot.status, FeedStatus::Failed(_)) {
            Vec::new()
        } else {
            let view = match feed {
                Feed::Outbox => self.store.outbox(),
                Feed::Inbox => self.store.inbox(),
            };
            view.into_iter().cloned().collect()
        };
        FeedPanel {
            load: self.view.load_state(feed.tab()),
            status: slot.status.clone(),
            messages,
        }
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by every component of one authenticated session
#[derive(Debug)]
pub struct SessionContext {
    session: Session,
    credential: String,
    pub(crate) api: Arc<dyn RelayApi>,
    pub(crate) host: Arc<dyn HostBridge>,
    pub(crate) telemetry: Telemetry,
    pub(crate) state: Mutex<SyncState>,
    pub(crate) compose: Mutex<ComposeBuffer>,
    pub(crate) sending: AtomicBool,
    generation: AtomicU64,
    revision: AtomicU64,
    publisher: watch::Sender<ViewModel>,
}

impl SessionContext {
    /// Create the context of a freshly authenticated session
    pub fn new(
        session: Session,
        credential: impl Into<String>,
        api: Arc<dyn RelayApi>,
        host: Arc<dyn HostBridge>,
        config: &Config,
    ) -> Self {
        let telemetry = Telemetry::new(Arc::clone(&api), config.telemetry.enabled, session.user_id);
        let view = ViewState::new(session.is_admin, config.sync.load_policy);
        let (publisher, _) = watch::channel(ViewModel::default());

        let context = Self {
            credential: credential.into(),
            api,
            host,
            telemetry,
            state: Mutex::new(SyncState {
                store: MessageStore::new(),
                sent: FeedSlot::default(),
                inbox: FeedSlot::default(),
                stats: StatsSlot::default(),
                view,
            }),
            compose: Mutex::new(ComposeBuffer::new(&config.compose)),
            sending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            revision: AtomicU64::new(0),
            publisher,
            session,
        };
        context.publish();
        context
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn credential(&self) -> &str {
        &self.credential
    }

    /// Stamp for a new fetch; strictly increasing across all feeds
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    /// Build the current view model without publishing it
    pub fn snapshot(&self) -> ViewModel {
        let state = lock(&self.state);
        self.build_model(&state, self.revision.load(Ordering::SeqCst))
    }

    /// Rebuild the view model and hand it to subscribers
    pub fn publish(&self) {
        // The state lock orders concurrent publishers so revisions reach
        // subscribers monotonically.
        let state = lock(&self.state);
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let model = self.build_model(&state, revision);
        tracing::trace!("Publishing view model revision {}", revision);
        self.publisher.send_replace(model);
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.publisher.subscribe()
    }

    fn build_model(&self, state: &SyncState, revision: u64) -> ViewModel {
        let compose = lock(&self.compose);
        let sending = self.is_sending();

        ViewModel {
            revision,
            header: Some(Header {
                display_name: self.session.display_name.clone(),
                badge: self.session.badge(),
                is_admin: self.session.is_admin,
            }),
            active_tab: Some(state.view.active()),
            tabs: state.view.visible_tabs(),
            outbox: state.panel(Feed::Outbox),
            inbox: state.panel(Feed::Inbox),
            stats: StatsPanel {
                load: state.view.load_state(Tab::Stats),
                status: state.stats.status.clone(),
                stats: state.stats.stats.clone(),
            },
            compose: ComposeView {
                visible: !self.session.is_admin,
                text: compose.text().to_string(),
                counter: compose.counter(),
                warning: compose.is_warning(),
                sending,
                can_send: !sending && compose.is_sendable(),
            },
        }
    }
}

/// Entry point: authenticates and opens sessions
#[derive(Debug)]
pub struct RelayClient {
    api: Arc<dyn RelayApi>,
    authenticator: SessionAuthenticator,
    host: Arc<dyn HostBridge>,
    config: Config,
}

impl RelayClient {
    /// Assemble a client from already built parts
    pub fn new(
        api: Arc<dyn RelayApi>,
        authenticator: SessionAuthenticator,
        host: Arc<dyn HostBridge>,
        config: Config,
    ) -> Self {
        Self {
            api,
            authenticator,
            host,
            config,
        }
    }

    /// Build the HTTP backend and strategy chain described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] for an unusable base URL or endpoint,
    /// and [`RelayError::Http`] if the HTTP client cannot be constructed.
    pub fn from_config(config: Config, host: Arc<dyn HostBridge>) -> Result<Self, RelayError> {
        let http = build_client(&config.api)?;
        let api = HttpRelayApi::new(http.clone(), &config.api)?;
        let authenticator = SessionAuthenticator::from_config(http, &config.api, &config.auth)?;
        Ok(Self::new(Arc::new(api), authenticator, host, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Authenticate and run the initial refresh
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] from the strategy chain. The host is shown
    /// an error popup and no session exists afterwards.
    pub async fn connect(&self, credential: &str) -> Result<RelaySession, AuthError> {
        let session = match self.authenticator.authenticate(credential).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Authentication failed: {}", e);
                self.host
                    .show_popup(Popup::error(format!("Authorization error: {}", e)));
                return Err(e);
            }
        };

        let relay = self.open(session, credential);
        relay.start().await;
        Ok(relay)
    }

    /// Open a session for an already authenticated identity without
    /// fetching anything
    pub fn open(&self, session: Session, credential: &str) -> RelaySession {
        RelaySession::new(Arc::new(SessionContext::new(
            session,
            credential,
            Arc::clone(&self.api),
            Arc::clone(&self.host),
            &self.config,
        )))
    }
}

/// An authenticated session and its components
#[derive(Debug, Clone)]
pub struct RelaySession {
    context: Arc<SessionContext>,
    sync: SyncCoordinator,
    sender: SendPipeline,
}

impl RelaySession {
    pub fn new(context: Arc<SessionContext>) -> Self {
        let sync = SyncCoordinator::new(Arc::clone(&context));
        let sender = SendPipeline::new(Arc::clone(&context), sync.clone());
        Self {
            context,
            sync,
            sender,
        }
    }

    /// Initial load after authentication
    ///
    /// Both message feeds are fetched concurrently; admins also get stats.
    pub async fn start(&self) {
        if self.context.session().is_admin {
            tokio::join!(self.sync.refresh_all(), self.sync.refresh_stats());
        } else {
            self.sync.refresh_all().await;
        }
    }

    pub fn session(&self) -> &Session {
        self.context.session()
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn sender(&self) -> &SendPipeline {
        &self.sender
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Current view model
    pub fn view_model(&self) -> ViewModel {
        self.context.publisher.borrow().clone()
    }

    /// Receive every published view model
    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.context.subscribe()
    }

    /// Wait up to `timeout` for queued diagnostic reports to be delivered
    pub async fn flush_telemetry(&self, timeout: std::time::Duration) {
        self.context.telemetry.flush(timeout).await;
    }
}
