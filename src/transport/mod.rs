//! Messaging transport seam.
//!
//! Identity, encryption, conversation sync and the wire protocol all live
//! behind [`Transport`]. The bot only sees messages, conversations and
//! group membership.

pub mod bridge;
#[cfg(test)]
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::Stream;

pub use bridge::BridgeTransport;
#[cfg(test)]
pub use memory::MemoryTransport;

/// Content type id carried by plain text messages.
pub const TEXT_CONTENT_TYPE: &str = "text";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Lazy, non-restartable message sequence. `None` is a clean end,
/// `Some(Err(_))` a terminal stream failure.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub type_id: String,
}

impl ContentType {
    pub fn text() -> Self {
        Self {
            type_id: TEXT_CONTENT_TYPE.to_string(),
        }
    }
}

/// Inbound message as delivered by the stream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_inbox_id: String,
    pub conversation_id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl Message {
    /// Text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        if self.content_type.type_id != TEXT_CONTENT_TYPE {
            return None;
        }
        self.content.as_str()
    }

    pub fn is_from(&self, inbox_id: &str) -> bool {
        self.sender_inbox_id.eq_ignore_ascii_case(inbox_id)
    }
}

/// Reference to a group conversation. Only group conversations hand these
/// out, so membership operations cannot be aimed at a direct message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GroupHandle {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationKind {
    Direct,
    Group(GroupHandle),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
}

impl Conversation {
    pub fn direct(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::Direct,
        }
    }

    pub fn group(handle: GroupHandle) -> Self {
        Self {
            id: handle.id.clone(),
            kind: ConversationKind::Group(handle),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ConversationKind::Group(_))
    }

    pub fn as_group(&self) -> Option<&GroupHandle> {
        match &self.kind {
            ConversationKind::Group(handle) => Some(handle),
            ConversationKind::Direct => None,
        }
    }
}

/// Group member.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub inbox_id: String,
    #[serde(default)]
    pub account_identifiers: Vec<String>,
}

impl Member {
    pub fn new(inbox_id: impl Into<String>) -> Self {
        Self {
            inbox_id: inbox_id.into(),
            account_identifiers: Vec::new(),
        }
    }

    /// Case-insensitive match against the inbox id or any account identifier.
    pub fn matches(&self, identifier: &str) -> bool {
        self.inbox_id.eq_ignore_ascii_case(identifier)
            || self
                .account_identifiers
                .iter()
                .any(|a| a.eq_ignore_ascii_case(identifier))
    }
}

/// Messaging client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Inbox id of the bot itself.
    fn inbox_id(&self) -> &str;

    /// Pull conversations and groups from the network.
    async fn sync(&self) -> Result<()>;

    /// Open the message stream.
    async fn stream_messages(&self) -> Result<MessageStream>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    async fn send(&self, conversation_id: &str, text: &str) -> Result<()>;

    async fn list_groups(&self) -> Result<Vec<GroupHandle>>;

    async fn create_group(&self, name: &str) -> Result<GroupHandle>;

    async fn list_members(&self, group: &GroupHandle) -> Result<Vec<Member>>;

    async fn add_members(&self, group: &GroupHandle, inbox_ids: &[String]) -> Result<()>;

    async fn list_super_admins(&self, group: &GroupHandle) -> Result<Vec<String>>;

    async fn add_super_admin(&self, group: &GroupHandle, inbox_id: &str) -> Result<()>;
}
