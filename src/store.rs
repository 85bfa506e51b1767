//! Authoritative message set and its derived views
//!
//! [`MessageStore`] owns the reconciled list of messages for the current
//! session. It is only ever replaced wholesale; the `outbox` and `inbox`
//! views are recomputed from the current list on every call, so they are
//! always disjoint, always cover the full set, and never observe a
//! half-applied refresh.
//!
//! Decoding from wire records happens before `replace` (see
//! [`Message::from_sent`] and [`Message::from_inbox`]) so that `replace`
//! stays pure and idempotent.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::api::types::{InboxRecord, SentRecord};

/// Text shown for messages without text (media, stickers, ...)
pub const MEDIA_PLACEHOLDER: &str = "Media message";

/// Answer text shown when the server marks a message answered but omits
/// the answer itself
pub const ANSWER_PLACEHOLDER: &str = "Answer received";

/// Who authored a message; the client only ever relays user messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outbound,
}

/// Operator answer attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Never empty; falls back to [`ANSWER_PLACEHOLDER`]
    pub text: String,
    pub answered_by_name: Option<String>,
    pub answered_at: DateTime<Utc>,
}

/// A relayed message and its answer state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Server-assigned identifier, unique within a session
    pub id: i64,
    pub direction: Direction,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub answer: Option<Answer>,
}

impl Message {
    /// Whether an operator answer exists
    pub fn answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Display reference, e.g. `#42`
    pub fn reference(&self) -> String {
        format!("#{}", self.id)
    }

    /// Decode an entry of the sent feed
    ///
    /// Returns `None` for entries without a usable id. `now` stands in for
    /// a missing answer timestamp.
    pub fn from_sent(record: SentRecord, now: DateTime<Utc>) -> Option<Self> {
        let Some(id) = record.message_id else {
            tracing::warn!("Skipping sent entry without message_id");
            return None;
        };

        let answer = record.is_answered.then(|| Answer {
            text: non_blank(record.answer_text).unwrap_or_else(|| ANSWER_PLACEHOLDER.to_string()),
            answered_by_name: non_blank(record.answered_by_name),
            answered_at: record
                .answered_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(now),
        });

        Some(Self {
            id,
            direction: Direction::Outbound,
            text: non_blank(record.text)
                .or_else(|| non_blank(record.caption))
                .unwrap_or_else(|| MEDIA_PLACEHOLDER.to_string()),
            created_at: record.forwarded_at.as_deref().and_then(parse_timestamp),
            answer,
        })
    }

    /// Decode an entry of the inbox feed; inbox entries are always answered
    pub fn from_inbox(record: InboxRecord, now: DateTime<Utc>) -> Option<Self> {
        let Some(id) = record.message_id else {
            tracing::warn!("Skipping inbox entry without message_id");
            return None;
        };

        Some(Self {
            id,
            direction: Direction::Outbound,
            text: non_blank(record.original_text).unwrap_or_else(|| MEDIA_PLACEHOLDER.to_string()),
            created_at: record.forwarded_at.as_deref().and_then(parse_timestamp),
            answer: Some(Answer {
                text: non_blank(record.answer_text)
                    .unwrap_or_else(|| ANSWER_PLACEHOLDER.to_string()),
                answered_by_name: non_blank(record.answered_by_name),
                answered_at: record
                    .answered_at
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or(now),
            }),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Parse a server timestamp
///
/// Accepts RFC 3339 as well as naive `YYYY-MM-DD HH:MM:SS[.f]` (with `T` or
/// a space as separator), which is read as UTC.
///
/// # Examples
///
/// ```
/// use relaybox::store::parse_timestamp;
///
/// assert!(parse_timestamp("2024-03-01T10:00:00+03:00").is_some());
/// assert!(parse_timestamp("2024-03-01 10:00:00.123").is_some());
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Merge the sent and inbox feeds into one authoritative list
///
/// Sent entries keep server order; an inbox entry with the same id supplies
/// the answer. Inbox entries missing from the sent feed are appended in
/// inbox order. Within each feed the first occurrence of an id wins.
pub fn reconcile(sent: &[Message], inbox: &[Message]) -> Vec<Message> {
    let mut answers: HashMap<i64, &Message> = HashMap::new();
    for message in inbox {
        answers.entry(message.id).or_insert(message);
    }

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(sent.len() + inbox.len());

    for message in sent {
        if !seen.insert(message.id) {
            continue;
        }
        let mut message = message.clone();
        if let Some(answered) = answers.get(&message.id) {
            message.answer = answered.answer.clone();
            if message.created_at.is_none() {
                message.created_at = answered.created_at;
            }
        }
        merged.push(message);
    }

    for message in inbox {
        if seen.insert(message.id) {
            merged.push(message.clone());
        }
    }

    merged
}

/// Holder of the authoritative message set
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set
    ///
    /// `None` is treated as an empty set. Duplicate ids keep their first
    /// occurrence. Never fails.
    pub fn replace(&mut self, raw: Option<Vec<Message>>) {
        let mut seen = HashSet::new();
        self.messages = raw
            .unwrap_or_default()
            .into_iter()
            .filter(|m| {
                let fresh = seen.insert(m.id);
                if !fresh {
                    tracing::debug!("Dropping duplicate message {}", m.id);
                }
                fresh
            })
            .collect();
    }

    /// Sent messages still waiting for an answer, in server order
    pub fn outbox(&self) -> Vec<&Message> {
        self.messages.iter().filter(|m| !m.answered()).collect()
    }

    /// Answered messages, in server order
    pub fn inbox(&self) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.answered()).collect()
    }

    /// The full set, in server order
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: i64) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn pending(id: i64, text: &str) -> Message {
        Message {
            id,
            direction: Direction::Outbound,
            text: text.to_string(),
            created_at: None,
            answer: None,
        }
    }

    fn answered(id: i64, text: &str, answer: &str) -> Message {
        Message {
            answer: Some(Answer {
                text: answer.to_string(),
                answered_by_name: Some("Support".to_string()),
                answered_at: now(),
            }),
            ..pending(id, text)
        }
    }

    fn assert_partition(store: &MessageStore) {
        let outbox: HashSet<i64> = store.outbox().iter().map(|m| m.id).collect();
        let inbox: HashSet<i64> = store.inbox().iter().map(|m| m.id).collect();
        let all: HashSet<i64> = store.all().iter().map(|m| m.id).collect();
        assert!(outbox.is_disjoint(&inbox));
        assert_eq!(&outbox | &inbox, all);
    }

    #[test]
    fn test_views_partition_the_set() {
        let mut store = MessageStore::new();
        store.replace(Some(vec![
            pending(1, "a"),
            answered(2, "b", "yes"),
            pending(3, "c"),
            answered(4, "d", "no"),
        ]));
        assert_partition(&store);
        let outbox: Vec<i64> = store.outbox().iter().map(|m| m.id).collect();
        let inbox: Vec<i64> = store.inbox().iter().map(|m| m.id).collect();
        assert_eq!(outbox, vec![1, 3]);
        assert_eq!(inbox, vec![2, 4]);
    }

    #[test]
    fn test_replace_none_is_empty() {
        let mut store = MessageStore::new();
        store.replace(Some(vec![pending(1, "a")]));
        store.replace(None);
        assert!(store.is_empty());
        assert!(store.outbox().is_empty());
        assert!(store.inbox().is_empty());
        assert_partition(&store);
    }

    #[test]
    fn test_replace_is_idempotent() {
        let payload = vec![pending(5, "x"), answered(6, "y", "z")];
        let mut store = MessageStore::new();

        store.replace(Some(payload.clone()));
        let first_outbox: Vec<Message> = store.outbox().into_iter().cloned().collect();
        let first_inbox: Vec<Message> = store.inbox().into_iter().cloned().collect();

        store.replace(Some(payload));
        let second_outbox: Vec<Message> = store.outbox().into_iter().cloned().collect();
        let second_inbox: Vec<Message> = store.inbox().into_iter().cloned().collect();

        assert_eq!(first_outbox, second_outbox);
        assert_eq!(first_inbox, second_inbox);
    }

    #[test]
    fn test_replace_preserves_server_order_and_drops_duplicates() {
        let mut store = MessageStore::new();
        store.replace(Some(vec![pending(9, "first"), pending(2, "b"), pending(9, "dup")]));
        let ids: Vec<i64> = store.all().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![9, 2]);
        assert_eq!(store.get(9).unwrap().text, "first");
    }

    #[test]
    fn test_from_sent_fills_placeholders() {
        let record = SentRecord {
            message_id: Some(3),
            text: Some("   ".to_string()),
            caption: None,
            is_answered: true,
            answer_text: None,
            answered_at: None,
            ..SentRecord::default()
        };
        let message = Message::from_sent(record, now()).unwrap();
        assert_eq!(message.text, MEDIA_PLACEHOLDER);
        let answer = message.answer.unwrap();
        assert_eq!(answer.text, ANSWER_PLACEHOLDER);
        assert_eq!(answer.answered_at, now());
    }

    #[test]
    fn test_from_sent_prefers_caption_over_placeholder() {
        let record = SentRecord {
            message_id: Some(4),
            caption: Some("photo of the issue".to_string()),
            forwarded_at: Some("2024-04-30T08:15:00".to_string()),
            ..SentRecord::default()
        };
        let message = Message::from_sent(record, now()).unwrap();
        assert_eq!(message.text, "photo of the issue");
        assert!(!message.answered());
        assert_eq!(
            message.created_at,
            Some(Utc.with_ymd_and_hms(2024, 4, 30, 8, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_from_sent_without_id_is_skipped() {
        assert!(Message::from_sent(SentRecord::default(), now()).is_none());
        assert!(Message::from_inbox(InboxRecord::default(), now()).is_none());
    }

    #[test]
    fn test_from_inbox_is_always_answered() {
        let record = InboxRecord {
            message_id: Some(8),
            answer_text: Some("Fixed".to_string()),
            answered_at: Some("2024-04-30 09:00:00".to_string()),
            original_text: Some("It is broken".to_string()),
            ..InboxRecord::default()
        };
        let message = Message::from_inbox(record, now()).unwrap();
        assert!(message.answered());
        assert_eq!(message.text, "It is broken");
        assert_eq!(message.answer.unwrap().text, "Fixed");
    }

    #[test]
    fn test_reconcile_inbox_supplies_answers() {
        let sent = vec![pending(1, "a"), pending(2, "b")];
        let inbox = vec![answered(2, "ignored", "done"), answered(7, "old", "ok")];

        let merged = reconcile(&sent, &inbox);
        let ids: Vec<i64> = merged.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 7]);
        assert_eq!(merged[1].text, "b");
        assert_eq!(merged[1].answer.as_ref().unwrap().text, "done");
        assert!(!merged[0].answered());
    }

    #[test]
    fn test_reconcile_empty_inbox_keeps_sent_state() {
        let sent = vec![pending(1, "a"), answered(2, "b", "yes")];
        let merged = reconcile(&sent, &[]);
        assert_eq!(merged, sent);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T10:00:00+03:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T07:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 07:00:00"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
    }
}
