//! Protocol adapter: turns socket/HTTP events into store mutations.
//!
//! Network I/O runs on spawned tokio tasks, but those tasks never touch the
//! store. Everything they learn crosses back to the main thread as a
//! [`NetEvent`] over an mpsc channel, and [`NetHandle::apply_event`] applies
//! it there. Store writes made while applying are captured into the change
//! queue and picked up on the next dispatch drain.

pub mod http;
pub mod socket;
pub mod types;

use std::sync::mpsc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::config::Config;
use crate::store::{ConversationRow, HistoryRow, Store, StoreError, UserRow};
use http::HttpClient;
use types::{MessageFrame, ReplyFrame};

/// One unit of inbound network activity, applied on the main thread.
pub enum NetEvent {
    /// Handshake finished: we know the socket URL and our own user id.
    Handshake { socket_url: String, user_id: String },
    /// A socket task came up and handed over its outbound channel.
    SocketOpen { outbound: UnboundedSender<String> },
    /// One text frame from the socket, still unparsed.
    Frame(String),
    SocketClosed,
    Conversations(Vec<ConversationRow>),
    Users(Vec<UserRow>),
    History { conversation: String, messages: Vec<HistoryRow> },
    HistoryFailed { conversation: String },
}

/// The adapter's mutable half: spawners for outbound requests plus the
/// current socket state. Owned by the outer loop, borrowed by reactions.
pub struct NetHandle {
    http: Option<HttpClient>,
    tx: mpsc::Sender<NetEvent>,
    /// The most recently opened socket, not yet confirmed by a `hello`.
    latest_socket: Option<UnboundedSender<String>>,
    /// The socket confirmed for sending by the most recent `hello`.
    active_socket: Option<UnboundedSender<String>>,
    retry_failed_history: bool,
}

impl NetHandle {
    pub fn new(config: &Config, tx: mpsc::Sender<NetEvent>) -> Self {
        let http = config
            .token
            .as_ref()
            .map(|token| HttpClient::new(config.base_url.clone(), token.clone()));
        Self {
            http,
            tx,
            latest_socket: None,
            active_socket: None,
            retry_failed_history: config.retry_failed_history,
        }
    }

    /// Kick off the handshake. Without a token the client stays offline
    /// against whatever the local store already holds.
    pub fn start(&self) {
        match &self.http {
            Some(http) => http::spawn_handshake(http.clone(), self.tx.clone()),
            None => log::warn!("no token configured; running offline"),
        }
    }

    /// Issue the two directory fetches as independent requests.
    pub fn fetch_directory(&self) {
        if let Some(http) = &self.http {
            http::spawn_conversations_fetch(http.clone(), self.tx.clone());
            http::spawn_users_fetch(http.clone(), self.tx.clone());
        }
    }

    /// Issue a one-shot history fetch for a conversation.
    pub fn fetch_history(&self, conversation: &str) {
        if let Some(http) = &self.http {
            http::spawn_history_fetch(http.clone(), self.tx.clone(), conversation.to_string());
        }
    }

    /// The socket currently usable for sending, if any.
    pub fn active_socket(&self) -> Option<UnboundedSender<String>> {
        self.active_socket.clone()
    }

    /// Forget the active socket, e.g. after a failed send.
    pub fn drop_active(&mut self) {
        self.active_socket = None;
    }

    /// Apply one inbound event to the store.
    pub fn apply_event(&mut self, store: &Store, event: NetEvent) -> Result<(), StoreError> {
        match event {
            NetEvent::Handshake { socket_url, user_id } => {
                log::info!("handshake complete, user {user_id}");
                store.set_current_user(&user_id)?;
                socket::spawn_socket(socket_url, self.tx.clone());
            }
            NetEvent::SocketOpen { outbound } => {
                self.latest_socket = Some(outbound);
            }
            NetEvent::SocketClosed => {
                log::warn!("websocket closed; sends will stay pending");
            }
            NetEvent::Frame(text) => self.apply_frame(store, &text)?,
            NetEvent::Conversations(rows) => {
                log::debug!("directory refresh: {} conversations", rows.len());
                store.replace_conversations(&rows)?;
            }
            NetEvent::Users(rows) => {
                log::debug!("directory refresh: {} users", rows.len());
                store.replace_users(&rows)?;
            }
            NetEvent::History { conversation, messages } => {
                log::debug!("history for {conversation}: {} messages", messages.len());
                store.replace_history(&conversation, &messages)?;
            }
            NetEvent::HistoryFailed { conversation } => {
                if self.retry_failed_history {
                    store.set_history_fetched(&conversation, false)?;
                }
            }
        }
        Ok(())
    }

    /// Classify and apply one socket frame.
    ///
    /// Frames with a `reply_to` field correlate a send acknowledgement;
    /// otherwise the `type` field decides. Anything unrecognized is logged
    /// and discarded.
    fn apply_frame(&mut self, store: &Store, text: &str) -> Result<(), StoreError> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("unparseable frame: {e}");
                return Ok(());
            }
        };

        if let Some(reply_to) = value.get("reply_to").and_then(Value::as_i64) {
            if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                log::warn!("send rejected for message {reply_to}");
                return Ok(());
            }
            match serde_json::from_value::<ReplyFrame>(value) {
                Ok(reply) => {
                    let updated = store.apply_reply(reply.reply_to, &reply.ts, &reply.text)?;
                    if updated == 0 {
                        log::warn!("reply for unknown message {}", reply.reply_to);
                    }
                }
                Err(e) => log::warn!("malformed reply frame: {e}"),
            }
            return Ok(());
        }

        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("hello") => {
                // The hello confirms this socket; it becomes the one used for
                // sending, and the directory is refetched.
                self.active_socket = self.latest_socket.clone();
                log::info!("hello received; refreshing directory");
                self.fetch_directory();
            }
            Some("message") => match serde_json::from_value::<MessageFrame>(value) {
                Ok(frame) => store.insert_remote_message(
                    &frame.kind,
                    &frame.channel,
                    frame.user.as_deref(),
                    &frame.text,
                    &frame.ts,
                )?,
                Err(e) => log::warn!("malformed message frame: {e}"),
            },
            Some(other) => log::debug!("unhandled frame type {other}"),
            None => log::debug!("frame with no reply_to or type: {text}"),
        }
        Ok(())
    }
}
