//! The standard reactions.
//!
//! Each reaction filters on the change record's table (and, for key/value
//! records, the key name resolved from the rowid) and is a no-op otherwise.
//! Their registration order lives in [`Dispatcher::standard`] and is part of
//! the contract.
//!
//! [`Dispatcher::standard`]: crate::core::dispatch::Dispatcher::standard

use crate::core::dispatch::Reaction;
use crate::net::types::OutboundMessage;
use crate::net::NetHandle;
use crate::store::change::{ChangeOp, ChangeRecord, Table};
use crate::store::{keys, Mode, Store, StoreError};

/// Resolve the key name of a key/value change record, or `None` when the
/// record is not a key/value change (or the row is already gone).
fn kv_key(store: &Store, change: &ChangeRecord) -> Result<Option<String>, StoreError> {
    if change.table != Table::KeyValue {
        return Ok(None);
    }
    store.kv_key_for_rowid(change.row_id)
}

/// Fetches a conversation's history the first time it is selected.
///
/// The `history_fetched` flag is set optimistically, before the fetch
/// completes; with retry disabled a failed fetch leaves the conversation
/// permanently fetched (the original behavior, kept deliberately).
pub struct HistoryFetcher;

impl Reaction for HistoryFetcher {
    fn name(&self) -> &'static str {
        "history-fetcher"
    }

    fn handle(
        &mut self,
        store: &Store,
        net: &mut NetHandle,
        change: &ChangeRecord,
    ) -> Result<(), StoreError> {
        if kv_key(store, change)?.as_deref() != Some(keys::SELECTED_CONVERSATION) {
            return Ok(());
        }
        let Some(selected) = store.selected_conversation()? else {
            return Ok(());
        };
        // None means the selection dangles (directory refresh removed the
        // conversation); nothing to fetch against.
        if store.history_fetched(&selected)? == Some(false) {
            log::debug!("fetching history for {selected}");
            net.fetch_history(&selected);
            store.set_history_fetched(&selected, true)?;
        }
        Ok(())
    }
}

/// Transmits every pending message once a message insert fires while a socket
/// is active.
///
/// The select/send/clear sequence runs in one transaction, but delivery is
/// at-least-once, not exactly-once: a crash mid-loop re-sends on the next
/// trigger. A failed send abandons the operation, rolling back the
/// pending-clear and dropping the dead socket.
pub struct PendingTransmitter;

impl Reaction for PendingTransmitter {
    fn name(&self) -> &'static str {
        "pending-transmitter"
    }

    fn handle(
        &mut self,
        store: &Store,
        net: &mut NetHandle,
        change: &ChangeRecord,
    ) -> Result<(), StoreError> {
        if change.table != Table::Message || change.op != ChangeOp::Insert {
            return Ok(());
        }
        let Some(socket) = net.active_socket() else {
            return Ok(());
        };

        let tx = store.begin()?;
        let pending = store.pending_messages()?;
        if pending.is_empty() {
            return Ok(());
        }
        for message in &pending {
            let payload = OutboundMessage::new(message.id, &message.conversation, &message.body);
            let payload = match serde_json::to_string(&payload) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("could not serialize message {}: {e}", message.id);
                    continue;
                }
            };
            log::debug!("sending message {}", message.id);
            if socket.send(payload).is_err() {
                // Socket task is gone; leave everything pending for the next
                // active socket. Dropping `tx` rolls the transaction back.
                log::warn!("socket send failed; messages stay pending");
                net.drop_active();
                return Ok(());
            }
        }
        store.clear_pending()?;
        tx.commit()?;
        Ok(())
    }
}

/// Rebuilds the materialized conversation list whenever the conversation
/// table or the search text changes.
pub struct ListRebuilder;

impl Reaction for ListRebuilder {
    fn name(&self) -> &'static str {
        "list-rebuilder"
    }

    fn handle(
        &mut self,
        store: &Store,
        _net: &mut NetHandle,
        change: &ChangeRecord,
    ) -> Result<(), StoreError> {
        let triggered = change.table == Table::Conversation
            || kv_key(store, change)?.as_deref() == Some(keys::SEARCH_BUFFER);
        if !triggered {
            return Ok(());
        }
        let search = store.kv_or(keys::SEARCH_BUFFER, "")?;
        store.rebuild_conversation_list(&search)
    }
}

/// Clears the search buffer and its cursor whenever the mode changes to
/// anything but search.
pub struct SearchResetter;

impl Reaction for SearchResetter {
    fn name(&self) -> &'static str {
        "search-resetter"
    }

    fn handle(
        &mut self,
        store: &Store,
        _net: &mut NetHandle,
        change: &ChangeRecord,
    ) -> Result<(), StoreError> {
        if kv_key(store, change)?.as_deref() != Some(keys::MODE) {
            return Ok(());
        }
        if store.mode()? != Mode::Search {
            store.set_kv(keys::SEARCH_BUFFER, "")?;
            store.set_kv_int(keys::SEARCH_CURSOR, 0)?;
        }
        Ok(())
    }
}
