//! Wire types exchanged with the relay backend
//!
//! Every field the server may omit is optional or defaulted. Feed entries
//! are decoded one by one so a single malformed record never discards the
//! rest of the feed.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Response of the authentication endpoint
///
/// # Examples
///
/// ```
/// use relaybox::api::types::AuthResponse;
///
/// let json = r#"{"ok":true,"user":{"first_name":"Ann","is_admin":false,"unanswered":2}}"#;
/// let resp: AuthResponse = serde_json::from_str(json).unwrap();
/// assert!(resp.ok);
/// assert_eq!(resp.user.unwrap().unanswered, Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Whether the server accepted the credential
    #[serde(default)]
    pub ok: bool,

    /// Authenticated user, present when `ok` is true
    #[serde(default)]
    pub user: Option<UserPayload>,

    /// Server-supplied reason when `ok` is false
    #[serde(default)]
    pub error: Option<String>,
}

/// User descriptor inside [`AuthResponse`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    /// Platform user id
    #[serde(default, alias = "user_id", deserialize_with = "lenient_id")]
    pub id: Option<i64>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Whether the user operates the relay
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_admin: bool,

    /// Number of the user's messages still waiting for an answer
    #[serde(default, deserialize_with = "lenient_count")]
    pub unanswered: Option<u32>,
}

/// Top-level body of a feed response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEnvelope {
    /// Raw feed entries; `null` or missing means empty
    #[serde(default)]
    pub messages: Option<Vec<serde_json::Value>>,
}

/// Entry of the sent feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub message_id: Option<i64>,

    #[serde(default)]
    pub text: Option<String>,

    /// Caption of a media message, used when `text` is absent
    #[serde(default)]
    pub caption: Option<String>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_answered: bool,

    #[serde(default)]
    pub answer_text: Option<String>,

    #[serde(default)]
    pub answered_by_name: Option<String>,

    #[serde(default)]
    pub answered_at: Option<String>,

    /// When the message was relayed to the operators
    #[serde(default)]
    pub forwarded_at: Option<String>,
}

/// Entry of the inbox (answered) feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboxRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub message_id: Option<i64>,

    #[serde(default)]
    pub answer_text: Option<String>,

    #[serde(default)]
    pub answered_by_name: Option<String>,

    #[serde(default)]
    pub answered_at: Option<String>,

    /// Text of the message that was answered
    #[serde(default)]
    pub original_text: Option<String>,

    #[serde(default)]
    pub forwarded_at: Option<String>,
}

/// Body of `send` and `reply` responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub ok: bool,

    /// Server-assigned id of the created message
    #[serde(default, deserialize_with = "lenient_id")]
    pub message_id: Option<i64>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Aggregate counters returned by the stats endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRecord {
    pub total_messages: Option<u64>,
    pub messages_today: Option<u64>,
    pub total_users: Option<u64>,
    pub active_users_today: Option<u64>,
    pub answers_sent: Option<u64>,
    pub bans_issued: Option<u64>,
}

/// Top-level body of the users endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsersEnvelope {
    #[serde(default)]
    pub users: Option<Vec<serde_json::Value>>,
}

/// Entry of the users endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<i64>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_banned: bool,

    #[serde(default)]
    pub messages_count: Option<u64>,

    #[serde(default)]
    pub unanswered_count: Option<u64>,
}

/// Request body of `send`
#[derive(Debug, Clone, Serialize)]
pub struct SendBody<'a> {
    #[serde(rename = "initData")]
    pub init_data: &'a str,
    pub text: &'a str,
}

/// Request body of `reply`
#[derive(Debug, Clone, Serialize)]
pub struct ReplyBody<'a> {
    #[serde(rename = "initData")]
    pub init_data: &'a str,
    pub message_id: i64,
    pub answer: &'a str,
}

/// Diagnostic event posted to the log endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub event_id: Uuid,
    pub level: String,
    pub event: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Decode each raw entry independently, skipping the ones that fail
///
/// # Arguments
///
/// * `values` - Raw entries; `None` decodes as an empty list
/// * `what` - Label used in the warning for skipped entries
pub fn decode_entries<T: DeserializeOwned>(
    values: Option<Vec<serde_json::Value>>,
    what: &str,
) -> Vec<T> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping malformed {} entry: {}", what, e);
                None
            }
        })
        .collect()
}

/// Accept ids sent as numbers or numeric strings
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept counts sent as numbers or numeric strings; anything else, including
/// negative values, decodes as `None`
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept booleans sent as `true`/`false`, `0`/`1` or `null`
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}
