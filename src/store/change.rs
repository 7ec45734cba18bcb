//! Change capture: every row mutation in the store is recorded, in order,
//! into a shared FIFO queue.
//!
//! The records are produced by SQLite's update hook, which runs synchronously
//! inside the mutating statement: before the statement returns, and whether or
//! not the surrounding transaction commits. The hook must never touch the
//! connection itself; it only appends to the queue. All actual side effects
//! happen later, when the dispatcher replays the queue outside the hook's
//! call stack.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// The kind of row mutation a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// The store tables that participate in change capture.
///
/// SQLite-internal tables (e.g. `sqlite_sequence`) are not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    KeyValue,
    Conversation,
    User,
    Message,
    ConversationList,
}

impl Table {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "kvs" => Some(Table::KeyValue),
            "conversation" => Some(Table::Conversation),
            "user" => Some(Table::User),
            "message" => Some(Table::Message),
            "conversation_list" => Some(Table::ConversationList),
            _ => None,
        }
    }
}

/// One captured row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub op: ChangeOp,
    pub table: Table,
    pub row_id: i64,
}

/// Process-wide FIFO of captured change records.
///
/// Clones share the same underlying queue; one clone lives inside the update
/// hook, the other in the dispatcher.
#[derive(Clone, Default)]
pub struct ChangeQueue {
    inner: Arc<Mutex<VecDeque<ChangeRecord>>>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ChangeRecord) {
        self.inner.lock().expect("change queue poisoned").push_back(record);
    }

    /// Take everything queued so far, leaving the queue empty.
    ///
    /// Records pushed while the returned batch is being processed land in the
    /// next batch, which is what gives the dispatch loop its termination
    /// guarantee: a drain only ever sees the records that existed when it
    /// started.
    pub fn take_batch(&self) -> VecDeque<ChangeRecord> {
        std::mem::take(&mut *self.inner.lock().expect("change queue poisoned"))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("change queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_batch_empties_queue() {
        let queue = ChangeQueue::new();
        queue.push(ChangeRecord {
            op: ChangeOp::Insert,
            table: Table::Message,
            row_id: 1,
        });
        queue.push(ChangeRecord {
            op: ChangeOp::Delete,
            table: Table::User,
            row_id: 2,
        });

        let batch = queue.take_batch();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn take_batch_preserves_fifo_order() {
        let queue = ChangeQueue::new();
        for row_id in 0..5 {
            queue.push(ChangeRecord {
                op: ChangeOp::Update,
                table: Table::KeyValue,
                row_id,
            });
        }

        let ids: Vec<i64> = queue.take_batch().iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pushes_during_batch_land_in_next_batch() {
        let queue = ChangeQueue::new();
        queue.push(ChangeRecord {
            op: ChangeOp::Insert,
            table: Table::Conversation,
            row_id: 1,
        });

        let first = queue.take_batch();
        queue.push(ChangeRecord {
            op: ChangeOp::Insert,
            table: Table::Conversation,
            row_id: 2,
        });

        assert_eq!(first.len(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take_batch()[0].row_id, 2);
    }

    #[test]
    fn unknown_tables_are_not_captured() {
        assert_eq!(Table::from_name("sqlite_sequence"), None);
        assert_eq!(Table::from_name("kvs"), Some(Table::KeyValue));
        assert_eq!(Table::from_name("conversation_list"), Some(Table::ConversationList));
    }
}
