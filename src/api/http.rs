//! HTTP implementation of [`RelayApi`]
//!
//! Feed GETs carry the init credential either as an `initData` query
//! parameter or as the `X-Telegram-Init-Data` header, depending on
//! [`CredentialTransport`]. Mutating calls POST a JSON body that embeds the
//! credential as `initData`.
//!
//! No request has a timeout unless `api.timeout_seconds` is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::api::types::{
    decode_entries, ActionResponse, FeedEnvelope, InboxRecord, LogEntry, ReplyBody, SendBody,
    SentRecord, StatsRecord, UserRecord, UsersEnvelope,
};
use crate::api::RelayApi;
use crate::config::{ApiConfig, CredentialTransport, Endpoints};
use crate::error::{FetchError, RelayError, SendError};

/// Header carrying the init credential on feed requests
pub const INIT_DATA_HEADER: &str = "X-Telegram-Init-Data";

/// Build the shared `reqwest` client for an API configuration
///
/// # Errors
///
/// Returns [`RelayError::Http`] if the TLS backend cannot be initialised.
pub fn build_client(config: &ApiConfig) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("relaybox/", env!("CARGO_PKG_VERSION")));
    if let Some(secs) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Parse the configured base URL
///
/// # Errors
///
/// Returns [`RelayError::Config`] when the URL does not parse.
pub fn parse_base_url(config: &ApiConfig) -> Result<Url, RelayError> {
    Url::parse(&config.base_url)
        .map_err(|e| RelayError::Config(format!("Invalid base URL {}: {}", config.base_url, e)))
}

/// `reqwest`-backed relay API client
///
/// # Examples
///
/// ```
/// use relaybox::api::http::{build_client, HttpRelayApi};
/// use relaybox::config::ApiConfig;
///
/// let config = ApiConfig::default();
/// let api = HttpRelayApi::new(build_client(&config).unwrap(), &config).unwrap();
/// assert_eq!(api.base_url().as_str(), "http://localhost:8080/");
/// ```
#[derive(Debug, Clone)]
pub struct HttpRelayApi {
    http: reqwest::Client,
    base_url: Url,
    endpoints: Endpoints,
    credential_transport: CredentialTransport,
}

impl HttpRelayApi {
    /// Construct a client; no network I/O happens here
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the base URL does not parse.
    pub fn new(http: reqwest::Client, config: &ApiConfig) -> Result<Self, RelayError> {
        Ok(Self {
            http,
            base_url: parse_base_url(config)?,
            endpoints: config.endpoints.clone(),
            credential_transport: config.credential_transport,
        })
    }

    /// Base URL every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base_url
            .join(path)
            .map_err(|e| format!("invalid endpoint {}: {}", path, e))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        credential: &str,
    ) -> Result<T, FetchError> {
        let url = self.endpoint(path).map_err(FetchError::NetworkException)?;
        let mut req = self.http.get(url);
        req = match self.credential_transport {
            CredentialTransport::Query => req.query(&[("initData", credential)]),
            CredentialTransport::Header => req.header(INIT_DATA_HEADER, credential),
        };

        let response = req
            .send()
            .await
            .map_err(|e| FetchError::NetworkException(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("GET {} returned {}", path, status);
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn post_action<B: Serialize + ?Sized + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ActionResponse, SendError> {
        let url = self.endpoint(path).map_err(SendError::NetworkException)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SendError::NetworkException(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SendError::NetworkException(e.to_string()))?;

        let parsed = serde_json::from_str::<ActionResponse>(&text);

        // Error statuses often still carry `{ok: false, error}`; prefer the
        // server's own message when it is there.
        if !status.is_success() {
            return match parsed {
                Ok(resp) if !resp.ok => Ok(resp),
                _ => Err(SendError::NetworkException(format!(
                    "HTTP {} from {}",
                    status, path
                ))),
            };
        }

        parsed.map_err(|e| {
            SendError::NetworkException(format!("malformed response from {}: {}", path, e))
        })
    }
}

#[async_trait]
impl RelayApi for HttpRelayApi {
    async fn fetch_sent(&self, credential: &str) -> Result<Vec<SentRecord>, FetchError> {
        let envelope: FeedEnvelope = self.get_json(&self.endpoints.sent, credential).await?;
        Ok(decode_entries(envelope.messages, "sent"))
    }

    async fn fetch_inbox(&self, credential: &str) -> Result<Vec<InboxRecord>, FetchError> {
        let envelope: FeedEnvelope = self.get_json(&self.endpoints.inbox, credential).await?;
        Ok(decode_entries(envelope.messages, "inbox"))
    }

    async fn send_message(
        &self,
        credential: &str,
        text: &str,
    ) -> Result<ActionResponse, SendError> {
        let body = SendBody {
            init_data: credential,
            text,
        };
        self.post_action(&self.endpoints.send, &body).await
    }

    async fn reply(
        &self,
        credential: &str,
        message_id: i64,
        answer: &str,
    ) -> Result<ActionResponse, SendError> {
        let body = ReplyBody {
            init_data: credential,
            message_id,
            answer,
        };
        self.post_action(&self.endpoints.reply, &body).await
    }

    async fn fetch_stats(&self, credential: &str) -> Result<StatsRecord, FetchError> {
        self.get_json(&self.endpoints.stats, credential).await
    }

    async fn fetch_users(&self, credential: &str) -> Result<Vec<UserRecord>, FetchError> {
        let envelope: UsersEnvelope = self.get_json(&self.endpoints.users, credential).await?;
        Ok(decode_entries(envelope.users, "user"))
    }

    async fn log_event(&self, entry: &LogEntry) -> Result<(), FetchError> {
        let url = self
            .endpoint(&self.endpoints.log)
            .map_err(FetchError::NetworkException)?;
        let response = self
            .http
            .post(url)
            .json(entry)
            .send()
            .await
            .map_err(|e| FetchError::NetworkException(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_api(base_url: &str, transport: CredentialTransport) -> HttpRelayApi {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            credential_transport: transport,
            ..ApiConfig::default()
        };
        HttpRelayApi::new(build_client(&config).unwrap(), &config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let config = ApiConfig {
            base_url: "::not a url::".to_string(),
            ..ApiConfig::default()
        };
        let result = HttpRelayApi::new(build_client(&config).unwrap(), &config);
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_endpoint_resolves_against_base() {
        let api = make_api("http://relay.test:9000", CredentialTransport::Query);
        let url = api.endpoint("/api/messages/sent").unwrap();
        assert_eq!(url.as_str(), "http://relay.test:9000/api/messages/sent");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_exception() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let api = make_api("http://127.0.0.1:9", CredentialTransport::Header);
        let result = api.fetch_sent("tok").await;
        assert!(matches!(result, Err(FetchError::NetworkException(_))));
    }
}
