//! SQLite-backed application store.
//!
//! Every piece of application data lives here: the mirrored remote state
//! (conversations, users, messages), the derived conversation list, and the
//! UI/session state in a generic key/value table. All mutations flow through
//! this module so that the update hook in [`change`] can capture them.
//!
//! The connection is owned by the main thread; network tasks never touch it.

pub mod change;

use std::fmt;
use std::path::Path;

use rusqlite::hooks::Action;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use change::{ChangeOp, ChangeQueue, ChangeRecord, Table};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the storage layer.
///
/// These are treated as fatal by the top-level policy: the event loop
/// propagates them out, the terminal is restored and the process exits.
/// Continuing after an unexpected storage error risks acting on
/// inconsistent state.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StoreError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Key/value slot names
// ---------------------------------------------------------------------------

/// Names of the key/value slots holding UI and session state.
pub mod keys {
    pub const MODE: &str = "mode";
    pub const SELECTED_CONVERSATION: &str = "selected_conversation";
    pub const WINDOW_START: &str = "window_start";
    pub const INPUT_BUFFER: &str = "input_buffer";
    pub const INPUT_CURSOR: &str = "input_cursor";
    pub const SEARCH_BUFFER: &str = "search_buffer";
    pub const SEARCH_CURSOR: &str = "search_cursor";
    pub const CURRENT_USER: &str = "current_user";
}

/// Input interpretation mode, persisted in the key/value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Insert,
    Search,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Insert => "insert",
            Mode::Search => "search",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "insert" => Mode::Insert,
            "search" => Mode::Search,
            _ => Mode::Normal,
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One conversation as mirrored from the remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub id: String,
    pub name: String,
    pub is_member: bool,
    pub is_dm: bool,
    /// Peer user id for direct-message conversations.
    pub peer: Option<String>,
}

/// One user as mirrored from the remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: String,
    pub name: String,
}

/// One message from a history fetch, ready for bulk insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub kind: String,
    pub author: Option<String>,
    pub body: String,
    pub ts: String,
}

/// A message row as the renderer consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Resolved author display name, if the author is in the user table.
    pub author_name: Option<String>,
    pub author: Option<String>,
    pub body: String,
    pub acknowledged: bool,
}

/// A locally composed message awaiting transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub id: i64,
    pub conversation: String,
    pub body: String,
}

/// One row of the materialized conversation list.
///
/// `rank` is a dense 0-based ordering by display name; `next_id`/`prev_id`
/// link neighbouring entries and are `None` at the ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub id: String,
    pub display_name: String,
    pub next_id: Option<String>,
    pub prev_id: Option<String>,
    pub rank: i64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
    create table if not exists kvs (key text primary key, value);

    create table if not exists conversation (
        id text,
        name text,
        is_member int,
        is_dm int default 0,
        peer text,
        history_fetched int default 0
    );
    create index if not exists idx_conversation_id on conversation(id);

    create table if not exists user (id text, name text);

    create table if not exists message (
        conversation text,
        kind text,
        author text,
        body text,
        ts text,
        id integer primary key autoincrement,
        pending int default 0,
        acknowledged int default 1
    );

    create table if not exists conversation_list (
        id text primary key,
        display_name text,
        next_id text,
        prev_id text,
        rank int
    );
";

pub struct Store {
    conn: Connection,
    queue: ChangeQueue,
}

impl Store {
    /// Open (or create) the store at `path` and install change capture.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a fresh in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;

        let queue = ChangeQueue::new();
        let hook_queue = queue.clone();
        // The hook runs inside the mutating statement; it must not touch the
        // connection, only enqueue.
        conn.update_hook(Some(
            move |action: Action, _db: &str, table: &str, row_id: i64| {
                let Some(table) = Table::from_name(table) else {
                    return;
                };
                let op = match action {
                    Action::SQLITE_INSERT => ChangeOp::Insert,
                    Action::SQLITE_UPDATE => ChangeOp::Update,
                    Action::SQLITE_DELETE => ChangeOp::Delete,
                    _ => return,
                };
                hook_queue.push(ChangeRecord { op, table, row_id });
            },
        ));

        Ok(Self { conn, queue })
    }

    /// A handle to the change queue shared with the update hook.
    pub fn queue(&self) -> ChangeQueue {
        self.queue.clone()
    }

    /// Begin an explicit transaction on the underlying connection.
    ///
    /// Dropping the returned transaction without committing rolls it back;
    /// captured change records survive the rollback by design.
    pub fn begin(&self) -> Result<Transaction<'_>, StoreError> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // -- key/value slots ----------------------------------------------------

    pub fn set_kv(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "insert into kvs (key, value) values (?1, ?2)
             on conflict (key) do update set value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("select value from kvs where key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn kv_or(&self, key: &str, default: &str) -> Result<String, StoreError> {
        Ok(self.kv(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn set_kv_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "insert into kvs (key, value) values (?1, ?2)
             on conflict (key) do update set value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_int(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("select value from kvs where key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(default))
    }

    /// Resolve the key name of a kvs row from its rowid.
    ///
    /// Change records only carry rowids; reactions that filter on a specific
    /// slot use this to recover the name. Returns `None` when the row no
    /// longer exists (e.g. for delete records).
    pub fn kv_key_for_rowid(&self, row_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("select key from kvs where rowid = ?1", params![row_id], |row| {
                row.get(0)
            })
            .optional()?)
    }

    // -- typed slot accessors -----------------------------------------------

    pub fn mode(&self) -> Result<Mode, StoreError> {
        Ok(Mode::from_str(&self.kv_or(keys::MODE, "normal")?))
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), StoreError> {
        self.set_kv(keys::MODE, mode.as_str())
    }

    pub fn selected_conversation(&self) -> Result<Option<String>, StoreError> {
        self.kv(keys::SELECTED_CONVERSATION)
    }

    pub fn set_selected_conversation(&self, id: &str) -> Result<(), StoreError> {
        self.set_kv(keys::SELECTED_CONVERSATION, id)
    }

    pub fn current_user(&self) -> Result<Option<String>, StoreError> {
        self.kv(keys::CURRENT_USER)
    }

    pub fn set_current_user(&self, id: &str) -> Result<(), StoreError> {
        self.set_kv(keys::CURRENT_USER, id)
    }

    // -- directory ----------------------------------------------------------

    /// Replace the entire conversation table with a fresh directory listing.
    ///
    /// Runs in one transaction so change-queue observers never see a
    /// partially replaced table.
    pub fn replace_conversations(&self, rows: &[ConversationRow]) -> Result<(), StoreError> {
        let tx = self.begin()?;
        // The syntactic WHERE defeats SQLite's truncate optimization, which
        // would otherwise skip the update hook for the deleted rows.
        tx.execute("delete from conversation where true", [])?;
        {
            let mut stmt = tx.prepare(
                "insert into conversation (id, name, is_member, is_dm, peer)
                 values (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![row.id, row.name, row.is_member, row.is_dm, row.peer])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace the entire user table. Same lifecycle as conversations.
    pub fn replace_users(&self, rows: &[UserRow]) -> Result<(), StoreError> {
        let tx = self.begin()?;
        tx.execute("delete from user where true", [])?;
        {
            let mut stmt = tx.prepare("insert into user (id, name) values (?1, ?2)")?;
            for row in rows {
                stmt.execute(params![row.id, row.name])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // -- history flag -------------------------------------------------------

    /// Whether a conversation id is currently in the directory. A directory
    /// refresh can leave the selection pointing at an id that is not.
    pub fn conversation_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.history_fetched(id)?.is_some())
    }

    /// Whether history has been fetched for a conversation.
    ///
    /// `None` when the conversation id is unknown, which a caller must
    /// tolerate: a directory refresh can leave the selection dangling.
    pub fn history_fetched(&self, id: &str) -> Result<Option<bool>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "select history_fetched from conversation where id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_history_fetched(&self, id: &str, fetched: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "update conversation set history_fetched = ?1 where id = ?2",
            params![fetched, id],
        )?;
        Ok(())
    }

    // -- messages -----------------------------------------------------------

    /// Replace a conversation's messages with a freshly fetched history.
    pub fn replace_history(&self, conversation: &str, rows: &[HistoryRow]) -> Result<(), StoreError> {
        let tx = self.begin()?;
        tx.execute("delete from message where conversation = ?1", params![conversation])?;
        {
            let mut stmt = tx.prepare(
                "insert into message (conversation, kind, author, body, ts)
                 values (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![conversation, row.kind, row.author, row.body, row.ts])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert a locally composed message: pending, unacknowledged.
    pub fn insert_local_message(
        &self,
        conversation: &str,
        author: &str,
        body: &str,
        ts: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "insert into message (conversation, kind, author, body, ts, pending, acknowledged)
             values (?1, 'message', ?2, ?3, ?4, 1, 0)",
            params![conversation, author, body, ts],
        )?;
        Ok(())
    }

    /// Insert a message that arrived over the socket: already delivered.
    pub fn insert_remote_message(
        &self,
        kind: &str,
        conversation: &str,
        author: Option<&str>,
        body: &str,
        ts: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "insert into message (conversation, kind, author, body, ts)
             values (?1, ?2, ?3, ?4, ?5)",
            params![conversation, kind, author, body, ts],
        )?;
        Ok(())
    }

    /// Correlate a reply frame with the locally assigned message id:
    /// overwrite timestamp and body from the remote echo and mark the
    /// message acknowledged. Returns the number of rows updated.
    pub fn apply_reply(&self, reply_to: i64, ts: &str, body: &str) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "update message set ts = ?1, body = ?2, acknowledged = 1 where id = ?3",
            params![ts, body, reply_to],
        )?)
    }

    /// All messages still awaiting transmission, oldest first.
    pub fn pending_messages(&self) -> Result<Vec<PendingMessage>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("select id, conversation, body from message where pending = 1 order by id")?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingMessage {
                id: row.get(0)?,
                conversation: row.get(1)?,
                body: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Mark every pending message as transmitted.
    pub fn clear_pending(&self) -> Result<(), StoreError> {
        self.conn
            .execute("update message set pending = 0 where pending = 1", [])?;
        Ok(())
    }

    /// Messages of one conversation in reverse-chronological order, with the
    /// author name resolved against the user table where possible.
    pub fn messages_for(&self, conversation: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let mut stmt = self.conn.prepare(
            "select u.name, m.author, m.body, m.acknowledged
             from message m
             left join user u on u.id = m.author
             where m.conversation = ?1
             order by m.ts desc",
        )?;
        let rows = stmt.query_map(params![conversation], |row| {
            Ok(StoredMessage {
                author_name: row.get(0)?,
                author: row.get(1)?,
                body: row.get(2)?,
                acknowledged: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -- materialized conversation list -------------------------------------

    /// Delete and regenerate the conversation list from the conversation and
    /// user tables.
    ///
    /// Visible rows are member-or-DM conversations whose display name
    /// contains `search` (case-sensitive substring; empty string matches
    /// everything). Display names prefer the DM peer's user name, then the
    /// conversation's own name, then its id. Rank is dense and 0-based over
    /// display-name order; neighbour links are precomputed for O(1) relative
    /// navigation.
    pub fn rebuild_conversation_list(&self, search: &str) -> Result<(), StoreError> {
        let tx = self.begin()?;
        tx.execute("delete from conversation_list where true", [])?;
        tx.execute(
            "insert into conversation_list (id, display_name, next_id, prev_id, rank)
             select id, display_name,
                    lead(id) over w,
                    lag(id) over w,
                    (row_number() over w) - 1
             from (
                 select c.id as id,
                        coalesce(nullif(u.name, ''), nullif(c.name, ''), c.id) as display_name
                 from conversation c
                 left join user u on u.id = c.peer
                 where (c.is_member = 1 or c.is_dm = 1)
                   and (?1 = '' or instr(coalesce(nullif(u.name, ''), nullif(c.name, ''), c.id), ?1) > 0)
             )
             window w as (order by display_name, id)",
            params![search],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_list_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListEntry> {
        Ok(ListEntry {
            id: row.get(0)?,
            display_name: row.get(1)?,
            next_id: row.get(2)?,
            prev_id: row.get(3)?,
            rank: row.get(4)?,
        })
    }

    /// A window of list entries starting at `offset`, in rank order.
    pub fn list_entries(&self, offset: i64, limit: i64) -> Result<Vec<ListEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "select id, display_name, next_id, prev_id, rank
             from conversation_list order by rank limit ?1 offset ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| Self::row_to_list_entry(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_entry(&self, id: &str) -> Result<Option<ListEntry>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "select id, display_name, next_id, prev_id, rank
                 from conversation_list where id = ?1",
                params![id],
                |row| Self::row_to_list_entry(row),
            )
            .optional()?)
    }

    /// The entry at rank 0, if the list is non-empty.
    pub fn first_list_entry(&self) -> Result<Option<ListEntry>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "select id, display_name, next_id, prev_id, rank
                 from conversation_list where rank = 0",
                [],
                |row| Self::row_to_list_entry(row),
            )
            .optional()?)
    }
}
