//! HTTP side of the protocol adapter.
//!
//! Every request is a one-shot bearer-authenticated GET spawned as a tokio
//! task; results cross back to the main thread as [`NetEvent`]s. Transport
//! failures are logged and the operation abandoned; nothing here retries.

use std::sync::mpsc;

use serde_json::Value;

use crate::net::types::{ChannelEntry, HandshakeResponse, HistoryEntry, MemberEntry};
use crate::net::NetEvent;
use crate::store::{ConversationRow, HistoryRow, UserRow};

const CONNECT_PATH: &str = "/api/rtm.connect";
const CONVERSATIONS_PATH: &str =
    "/api/conversations.list?types=public_channel,private_channel,mpim,im&limit=1000&exclude_archived=true";
const USERS_PATH: &str = "/api/users.list";
const HISTORY_PATH: &str = "/api/conversations.history?channel=";

/// Bearer-authenticated client for the remote HTTP endpoints.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    async fn get_json(&self, path_and_query: &str) -> Result<Value, reqwest::Error> {
        self.client
            .get(format!("{}{}", self.base_url, path_and_query))
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Extract an array field from a response body, tolerating its absence.
fn entries(body: &Value, field: &str) -> Vec<Value> {
    body.get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Parse the conversations directory, skipping malformed entries.
pub fn parse_channels(body: &Value) -> Vec<ConversationRow> {
    entries(body, "channels")
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ChannelEntry>(value) {
            Ok(entry) => Some(entry.into()),
            Err(e) => {
                log::warn!("skipping malformed channel entry: {e}");
                None
            }
        })
        .collect()
}

/// Parse the users directory, skipping malformed entries.
pub fn parse_members(body: &Value) -> Vec<UserRow> {
    entries(body, "members")
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<MemberEntry>(value) {
            Ok(entry) => Some(entry.into()),
            Err(e) => {
                log::warn!("skipping malformed member entry: {e}");
                None
            }
        })
        .collect()
}

/// Parse a history response, skipping malformed messages.
pub fn parse_history(body: &Value) -> Vec<HistoryRow> {
    entries(body, "messages")
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<HistoryEntry>(value) {
            Ok(entry) => Some(entry.into()),
            Err(e) => {
                log::warn!("skipping malformed history message: {e}");
                None
            }
        })
        .collect()
}

fn post_event(tx: &mpsc::Sender<NetEvent>, event: NetEvent) {
    if tx.send(event).is_err() {
        log::warn!("net event receiver dropped");
    }
}

/// Start the handshake: fetch the socket URL and our own user id.
pub fn spawn_handshake(http: HttpClient, tx: mpsc::Sender<NetEvent>) {
    tokio::spawn(async move {
        let body = match http.get_json(CONNECT_PATH).await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("handshake request failed: {e}");
                return;
            }
        };
        match serde_json::from_value::<HandshakeResponse>(body) {
            Ok(handshake) => post_event(
                &tx,
                NetEvent::Handshake {
                    socket_url: handshake.url,
                    user_id: handshake.who.id,
                },
            ),
            Err(e) => log::warn!("malformed handshake response: {e}"),
        }
    });
}

/// Fetch the conversations directory.
pub fn spawn_conversations_fetch(http: HttpClient, tx: mpsc::Sender<NetEvent>) {
    tokio::spawn(async move {
        match http.get_json(CONVERSATIONS_PATH).await {
            Ok(body) => post_event(&tx, NetEvent::Conversations(parse_channels(&body))),
            Err(e) => log::warn!("conversations fetch failed: {e}"),
        }
    });
}

/// Fetch the users directory.
pub fn spawn_users_fetch(http: HttpClient, tx: mpsc::Sender<NetEvent>) {
    tokio::spawn(async move {
        match http.get_json(USERS_PATH).await {
            Ok(body) => post_event(&tx, NetEvent::Users(parse_members(&body))),
            Err(e) => log::warn!("users fetch failed: {e}"),
        }
    });
}

/// Fetch one conversation's history.
///
/// Failure posts [`NetEvent::HistoryFailed`] so the optimistic
/// `history_fetched` flag can be cleared when retry is configured.
pub fn spawn_history_fetch(http: HttpClient, tx: mpsc::Sender<NetEvent>, conversation: String) {
    tokio::spawn(async move {
        match http.get_json(&format!("{HISTORY_PATH}{conversation}")).await {
            Ok(body) => {
                let messages = parse_history(&body);
                post_event(&tx, NetEvent::History { conversation, messages });
            }
            Err(e) => {
                log::warn!("history fetch for {conversation} failed: {e}");
                post_event(&tx, NetEvent::HistoryFailed { conversation });
            }
        }
    });
}
