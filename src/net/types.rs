//! Wire types for the remote team-chat protocol.
//!
//! Only the fields this client consumes are modelled. Directory and history
//! responses are parsed entry by entry so that one malformed item never
//! poisons the whole batch.

use serde::{Deserialize, Serialize};

use crate::store::{ConversationRow, HistoryRow, UserRow};

/// Response of the connect endpoint: where to open the socket, and who we are.
#[derive(Debug, Deserialize)]
pub struct HandshakeResponse {
    pub url: String,
    #[serde(rename = "self")]
    pub who: SelfInfo,
}

#[derive(Debug, Deserialize)]
pub struct SelfInfo {
    pub id: String,
}

/// One channel entry of the conversations directory.
#[derive(Debug, Deserialize)]
pub struct ChannelEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub is_im: bool,
    /// Peer user id; only present on direct-message channels.
    #[serde(default)]
    pub user: Option<String>,
}

impl From<ChannelEntry> for ConversationRow {
    fn from(entry: ChannelEntry) -> Self {
        ConversationRow {
            id: entry.id,
            name: entry.name,
            is_member: entry.is_member,
            is_dm: entry.is_im,
            peer: entry.user,
        }
    }
}

/// One member entry of the users directory.
#[derive(Debug, Deserialize)]
pub struct MemberEntry {
    pub id: String,
    pub name: String,
}

impl From<MemberEntry> for UserRow {
    fn from(entry: MemberEntry) -> Self {
        UserRow { id: entry.id, name: entry.name }
    }
}

/// One message of a conversation-history response.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
}

impl From<HistoryEntry> for HistoryRow {
    fn from(entry: HistoryEntry) -> Self {
        HistoryRow {
            kind: entry.kind,
            author: entry.user,
            body: entry.text,
            ts: entry.ts,
        }
    }
}

/// An inbound `type: "message"` socket frame.
#[derive(Debug, Deserialize)]
pub struct MessageFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
}

/// An inbound reply frame confirming a locally sent message.
///
/// Frames with `ok: false` carry an error body instead of `ts`/`text`; the
/// adapter discards them before deserializing into this type.
#[derive(Debug, Deserialize)]
pub struct ReplyFrame {
    pub ok: bool,
    pub reply_to: i64,
    pub ts: String,
    pub text: String,
}

/// The outbound send payload for one pending message.
#[derive(Debug, Serialize)]
pub struct OutboundMessage<'a> {
    pub id: i64,
    pub channel: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
}

impl<'a> OutboundMessage<'a> {
    pub fn new(id: i64, channel: &'a str, text: &'a str) -> Self {
        Self { id, channel, kind: "message", text }
    }
}
