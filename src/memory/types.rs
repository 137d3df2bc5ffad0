//! Per-wallet memory record definitions.
//!
//! Defines [`ChatMessage`], [`ActivityLogEntry`], [`Contact`], and the
//! [`MemoryAggregate`] that owns them. The aggregate is what gets serialized
//! to the blob store as one snapshot.

use serde::{Deserialize, Serialize};

use crate::intent::types::ActionType;

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Failed,
}

/// Outcome of one ledger dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Transaction reference; empty when the dispatch failed.
    #[serde(default)]
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    pub timestamp: i64,
    pub status: ActivityStatus,
}

/// A named address. Names are unique per wallet, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub address: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Contact names compare with full Unicode case folding, so `Çağrı` and
/// `çağrı` are the same contact.
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Deduplicate contacts by case-insensitive name; the last entry for a name wins
/// but keeps the position of the first.
pub fn dedup_contacts(contacts: Vec<Contact>) -> Vec<Contact> {
    let mut out: Vec<Contact> = Vec::with_capacity(contacts.len());
    for contact in contacts {
        match out
            .iter_mut()
            .find(|c| names_match(&c.name, &contact.name))
        {
            Some(existing) => *existing = contact,
            None => out.push(contact),
        }
    }
    out
}

/// Everything remembered for one wallet identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryAggregate {
    pub wallet_address: String,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub activity_logs: Vec<ActivityLogEntry>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub ai_summary: String,
    #[serde(default)]
    pub last_updated: i64,
    /// Where the last successful commit landed. Never part of the snapshot
    /// itself; absent until the first commit succeeds.
    #[serde(skip)]
    pub pointer: Option<String>,
}

impl MemoryAggregate {
    /// A fresh, never-committed aggregate for `wallet_address`.
    pub fn empty(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            chat_history: Vec::new(),
            activity_logs: Vec::new(),
            contacts: Vec::new(),
            ai_summary: String::new(),
            last_updated: now_millis(),
            pointer: None,
        }
    }

    /// Whether this snapshot belongs to `identity` (addresses compare case-insensitively).
    pub fn belongs_to(&self, identity: &str) -> bool {
        self.wallet_address.eq_ignore_ascii_case(identity)
    }

    /// Last `n` activity entries, oldest first.
    pub fn recent_activity(&self, n: usize) -> &[ActivityLogEntry] {
        let start = self.activity_logs.len().saturating_sub(n);
        &self.activity_logs[start..]
    }

    /// Last `n` chat messages, oldest first.
    pub fn recent_chat(&self, n: usize) -> &[ChatMessage] {
        let start = self.chat_history.len().saturating_sub(n);
        &self.chat_history[start..]
    }
}
