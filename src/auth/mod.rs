//! Session authentication
//!
//! [`SessionAuthenticator`] exchanges the opaque init credential supplied
//! by the host platform for a [`Session`]. It walks an ordered list of
//! [`strategy::AuthStrategy`] objects until one of them reaches the server,
//! then trusts the server's verdict: signature validation is the backend's
//! responsibility.
//!
//! # Failure handling
//!
//! - An empty credential fails immediately with
//!   [`AuthError::MissingCredential`]; no request is made.
//! - A strategy that cannot reach the server is logged and the next one is
//!   tried. When all of them fail, the whole list is retried up to
//!   `retry_attempts` more times with exponential backoff, then
//!   [`AuthError::AllStrategiesFailed`] is returned.
//! - A reachable server that answers `ok: false` ends the handshake with
//!   [`AuthError::Rejected`]; other strategies are not tried.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::types::{AuthResponse, UserPayload};
use crate::config::{ApiConfig, AuthConfig};
use crate::error::{AuthError, RelayError};
use crate::telemetry;

pub mod strategy;

use strategy::{build_strategy, AuthStrategy};

/// Fallback display name when the user has neither a first name nor a
/// username
const DEFAULT_DISPLAY_NAME: &str = "User";

/// Authenticated identity and role, immutable for the session lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Option<i64>,
    pub display_name: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub unanswered_count: u32,
}

impl Session {
    /// Build a session from the user descriptor of an auth response
    ///
    /// # Examples
    ///
    /// ```
    /// use relaybox::api::types::UserPayload;
    /// use relaybox::auth::Session;
    ///
    /// let session = Session::from_user(UserPayload {
    ///     username: Some("ann_k".to_string()),
    ///     unanswered: Some(2),
    ///     ..UserPayload::default()
    /// });
    /// assert_eq!(session.display_name, "ann_k");
    /// assert_eq!(session.badge(), Some("2".to_string()));
    /// ```
    pub fn from_user(user: UserPayload) -> Self {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let display_name = non_blank(&user.first_name)
            .or_else(|| non_blank(&user.username))
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Self {
            user_id: user.id,
            display_name,
            username: non_blank(&user.username),
            is_admin: user.is_admin,
            unanswered_count: user.unanswered.unwrap_or(0),
        }
    }

    /// Text of the unanswered badge, shown to non-admins with pending
    /// messages only
    pub fn badge(&self) -> Option<String> {
        (!self.is_admin && self.unanswered_count > 0).then(|| self.unanswered_count.to_string())
    }
}

/// Turn a transport-successful auth response into a session
///
/// # Errors
///
/// Returns [`AuthError::Rejected`] when the server said `ok: false` or sent
/// no user descriptor.
pub fn session_from_response(response: AuthResponse) -> Result<Session, AuthError> {
    if !response.ok {
        return Err(AuthError::Rejected(
            response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Authorization failed".to_string()),
        ));
    }
    response
        .user
        .map(Session::from_user)
        .ok_or_else(|| AuthError::Rejected("auth response carried no user".to_string()))
}

/// Ordered-fallback authenticator
#[derive(Debug)]
pub struct SessionAuthenticator {
    strategies: Vec<Box<dyn AuthStrategy>>,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl SessionAuthenticator {
    /// Create an authenticator trying `strategies` in order, without retries
    pub fn new(strategies: Vec<Box<dyn AuthStrategy>>) -> Self {
        Self {
            strategies,
            retry_attempts: 0,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Retry the whole strategy list `attempts` more times, waiting
    /// `backoff`, `2 * backoff`, `4 * backoff`, ... between rounds
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff = backoff;
        self
    }

    /// Build the configured strategy chain on a shared HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the auth endpoint URL cannot be
    /// resolved.
    pub fn from_config(
        http: reqwest::Client,
        api: &ApiConfig,
        auth: &AuthConfig,
    ) -> Result<Self, RelayError> {
        let url = crate::api::http::parse_base_url(api)?
            .join(&api.endpoints.auth)
            .map_err(|e| RelayError::Config(format!("Invalid auth endpoint: {}", e)))?;

        let strategies = auth
            .strategies
            .iter()
            .map(|kind| build_strategy(*kind, http.clone(), url.clone()))
            .collect();

        Ok(Self::new(strategies)
            .with_retry(auth.retry_attempts, Duration::from_millis(auth.retry_backoff_ms)))
    }

    /// Names of the strategies, in the order they are tried
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Exchange the init credential for a session
    ///
    /// # Errors
    ///
    /// See the module documentation for the failure taxonomy.
    pub async fn authenticate(&self, credential: &str) -> Result<Session, AuthError> {
        if credential.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let mut attempts = 0usize;
        let mut last: Option<AuthError> = None;

        for round in 0..=self.retry_attempts {
            if round > 0 {
                let factor = 1u32 << (round - 1).min(16);
                let delay = self.retry_backoff.saturating_mul(factor);
                tracing::info!(
                    "All auth strategies failed, retrying in {:?} (round {} of {})",
                    delay,
                    round,
                    self.retry_attempts
                );
                tokio::time::sleep(delay).await;
            }

            for strategy in &self.strategies {
                attempts += 1;
                tracing::debug!("Trying auth strategy {}", strategy.name());
                match strategy.attempt(credential).await {
                    Ok(response) => {
                        telemetry::record_auth_attempt(strategy.name(), "success");
                        let session = session_from_response(response)?;
                        tracing::info!(
                            "Authenticated as {} via {} (admin: {})",
                            session.display_name,
                            strategy.name(),
                            session.is_admin
                        );
                        return Ok(session);
                    }
                    Err(e) => {
                        telemetry::record_auth_attempt(strategy.name(), "failure");
                        tracing::warn!("{}", e);
                        last = Some(e);
                    }
                }
            }
        }

        Err(AuthError::AllStrategiesFailed {
            attempts,
            last: Box::new(last.unwrap_or_else(|| AuthError::TransportFailure {
                strategy: "none".to_string(),
                reason: "no auth strategies configured".to_string(),
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted strategy: fails or answers with a fixed response
    #[derive(Debug)]
    struct Scripted {
        name: &'static str,
        response: Option<AuthResponse>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AuthStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, _credential: &str) -> Result<AuthResponse, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .ok_or_else(|| AuthError::TransportFailure {
                    strategy: self.name.to_string(),
                    reason: "HTTP 502 Bad Gateway".to_string(),
                })
        }
    }

    fn ok_response() -> AuthResponse {
        AuthResponse {
            ok: true,
            user: Some(UserPayload {
                id: Some(1),
                first_name: Some("Ann".to_string()),
                unanswered: Some(2),
                ..UserPayload::default()
            }),
            error: None,
        }
    }

    fn scripted(
        name: &'static str,
        response: Option<AuthResponse>,
    ) -> (Box<dyn AuthStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Scripted {
            name,
            response,
            calls: Arc::clone(&calls),
        };
        (Box::new(strategy), calls)
    }

    #[tokio::test]
    async fn test_empty_credential_makes_no_attempt() {
        let (s, calls) = scripted("json_post", Some(ok_response()));
        let auth = SessionAuthenticator::new(vec![s]);

        assert_eq!(auth.authenticate("").await, Err(AuthError::MissingCredential));
        assert_eq!(auth.authenticate("   ").await, Err(AuthError::MissingCredential));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_strategy() {
        let (first, first_calls) = scripted("json_post", None);
        let (second, second_calls) = scripted("query_get", Some(ok_response()));
        let (third, third_calls) = scripted("form_post", Some(ok_response()));
        let auth = SessionAuthenticator::new(vec![first, second, third]);

        let session = auth.authenticate("tok123").await.unwrap();
        assert_eq!(session.display_name, "Ann");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_strategies_failed_reports_last_error() {
        let (first, _) = scripted("json_post", None);
        let (second, _) = scripted("form_post", None);
        let auth = SessionAuthenticator::new(vec![first, second]);

        match auth.authenticate("tok").await {
            Err(AuthError::AllStrategiesFailed { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(
                    *last,
                    AuthError::TransportFailure { ref strategy, .. } if strategy == "form_post"
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retries_whole_chain_with_backoff() {
        let (first, calls) = scripted("json_post", None);
        let auth = SessionAuthenticator::new(vec![first]).with_retry(2, Duration::from_millis(10));

        let started = std::time::Instant::now();
        let result = auth.authenticate("tok").await;

        assert!(matches!(
            result,
            Err(AuthError::AllStrategiesFailed { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms + 20ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_rejection_is_terminal() {
        let rejected = AuthResponse {
            ok: false,
            user: None,
            error: Some("Invalid signature".to_string()),
        };
        let (first, _) = scripted("json_post", Some(rejected));
        let (second, second_calls) = scripted("query_get", Some(ok_response()));
        let auth = SessionAuthenticator::new(vec![first, second]).with_retry(3, Duration::ZERO);

        assert_eq!(
            auth.authenticate("tok").await,
            Err(AuthError::Rejected("Invalid signature".to_string()))
        );
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_strategies_fails_cleanly() {
        let auth = SessionAuthenticator::new(Vec::new());
        assert!(matches!(
            auth.authenticate("tok").await,
            Err(AuthError::AllStrategiesFailed { attempts: 0, .. })
        ));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let session = Session::from_user(UserPayload {
            first_name: Some("  ".to_string()),
            username: None,
            ..UserPayload::default()
        });
        assert_eq!(session.display_name, "User");
    }

    #[test]
    fn test_admin_never_shows_badge() {
        let session = Session::from_user(UserPayload {
            is_admin: true,
            unanswered: Some(9),
            ..UserPayload::default()
        });
        assert_eq!(session.badge(), None);
    }

    #[test]
    fn test_ok_without_user_is_rejected() {
        let response = AuthResponse {
            ok: true,
            user: None,
            error: None,
        };
        assert!(matches!(
            session_from_response(response),
            Err(AuthError::Rejected(_))
        ));
    }

    #[test]
    fn test_from_config_follows_configured_order() {
        let api = ApiConfig::default();
        let auth_config = AuthConfig {
            strategies: vec![
                crate::config::StrategyKind::FormPost,
                crate::config::StrategyKind::QueryGet,
            ],
            ..AuthConfig::default()
        };
        let auth =
            SessionAuthenticator::from_config(reqwest::Client::new(), &api, &auth_config).unwrap();
        assert_eq!(auth.strategy_names(), vec!["form_post", "query_get"]);
    }
}
