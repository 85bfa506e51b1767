//! Authentication transport strategies
//!
//! The three strategies are functionally equivalent: they present the same
//! init credential to the same endpoint and expect the same JSON answer.
//! They differ only in transport shape, so that hosts or proxies that mangle
//! one shape can still authenticate through another.

use async_trait::async_trait;
use url::Url;

use crate::api::types::AuthResponse;
use crate::config::StrategyKind;
use crate::error::AuthError;

/// One way of presenting the init credential to the auth endpoint
#[async_trait]
pub trait AuthStrategy: Send + Sync + std::fmt::Debug {
    /// Stable name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Perform one authentication attempt
    ///
    /// Returns the decoded response body whenever the server answered with
    /// a success status, regardless of the `ok` verdict inside it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TransportFailure`] when the request fails, the
    /// status is not a success, or the body is not an auth response.
    async fn attempt(&self, credential: &str) -> Result<AuthResponse, AuthError>;
}

/// `GET <auth>?initData=<credential>`
#[derive(Debug, Clone)]
pub struct QueryGetStrategy {
    http: reqwest::Client,
    url: Url,
}

/// `POST <auth>` with body `{"initData": <credential>}`
#[derive(Debug, Clone)]
pub struct JsonPostStrategy {
    http: reqwest::Client,
    url: Url,
}

/// `POST <auth>` with body `initData=<credential>` (form-encoded)
#[derive(Debug, Clone)]
pub struct FormPostStrategy {
    http: reqwest::Client,
    url: Url,
}

impl QueryGetStrategy {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

impl JsonPostStrategy {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

impl FormPostStrategy {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

/// Build the strategy object for a configured kind
pub fn build_strategy(kind: StrategyKind, http: reqwest::Client, url: Url) -> Box<dyn AuthStrategy> {
    match kind {
        StrategyKind::QueryGet => Box::new(QueryGetStrategy::new(http, url)),
        StrategyKind::JsonPost => Box::new(JsonPostStrategy::new(http, url)),
        StrategyKind::FormPost => Box::new(FormPostStrategy::new(http, url)),
    }
}

#[async_trait]
impl AuthStrategy for QueryGetStrategy {
    fn name(&self) -> &'static str {
        StrategyKind::QueryGet.as_str()
    }

    async fn attempt(&self, credential: &str) -> Result<AuthResponse, AuthError> {
        let result = self
            .http
            .get(self.url.clone())
            .query(&[("initData", credential)])
            .send()
            .await;
        read_response(self.name(), result).await
    }
}

#[async_trait]
impl AuthStrategy for JsonPostStrategy {
    fn name(&self) -> &'static str {
        StrategyKind::JsonPost.as_str()
    }

    async fn attempt(&self, credential: &str) -> Result<AuthResponse, AuthError> {
        let result = self
            .http
            .post(self.url.clone())
            .json(&serde_json::json!({ "initData": credential }))
            .send()
            .await;
        read_response(self.name(), result).await
    }
}

#[async_trait]
impl AuthStrategy for FormPostStrategy {
    fn name(&self) -> &'static str {
        StrategyKind::FormPost.as_str()
    }

    async fn attempt(&self, credential: &str) -> Result<AuthResponse, AuthError> {
        let result = self
            .http
            .post(self.url.clone())
            .form(&[("initData", credential)])
            .send()
            .await;
        read_response(self.name(), result).await
    }
}

async fn read_response(
    strategy: &str,
    result: reqwest::Result<reqwest::Response>,
) -> Result<AuthResponse, AuthError> {
    let failure = |reason: String| AuthError::TransportFailure {
        strategy: strategy.to_string(),
        reason,
    };

    let response = result.map_err(|e| failure(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(failure(format!("HTTP {}", status)));
    }

    response
        .json::<AuthResponse>()
        .await
        .map_err(|e| failure(format!("malformed auth response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://127.0.0.1:9/api/auth").unwrap()
    }

    #[test]
    fn test_build_strategy_names() {
        let http = reqwest::Client::new();
        for kind in [
            StrategyKind::QueryGet,
            StrategyKind::JsonPost,
            StrategyKind::FormPost,
        ] {
            let strategy = build_strategy(kind, http.clone(), url());
            assert_eq!(strategy.name(), kind.as_str());
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        let strategy = JsonPostStrategy::new(reqwest::Client::new(), url());
        let err = strategy.attempt("tok").await.unwrap_err();
        match err {
            AuthError::TransportFailure { strategy, .. } => assert_eq!(strategy, "json_post"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
