/// Conversation persistence on an embedded SQLite database.
///
/// One `conversations` row per conversation, one `messages` row per turn.
/// Messages reference their conversation and are removed with it
/// (`ON DELETE CASCADE`). Message order is the order of their surrogate ids.
///
/// The store is constructed explicitly and handed to whoever needs it; tests
/// use [`ConversationStore::open_in_memory`] for isolated instances.
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::StoreError;
use crate::models::{Conversation, Message, Role};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
        ON messages(conversation_id);
";

pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// Open (creating if needed) the database file at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// A private, throwaway database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Insert a new conversation together with its initial messages.
    /// Nothing is written if any part fails.
    pub fn create(&self, mut conversation: Conversation) -> Result<Conversation, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id,
                conversation.title,
                conversation.created_at.timestamp_millis(),
                conversation.updated_at.timestamp_millis(),
            ],
        );
        if let Err(err) = inserted {
            return Err(if is_constraint_violation(&err) {
                StoreError::Duplicate(conversation.id)
            } else {
                StoreError::Sqlite(err)
            });
        }

        insert_pending_messages(&tx, &conversation.id, &mut conversation.messages)?;
        tx.commit()?;
        Ok(conversation)
    }

    /// Upsert the conversation row and append every message not yet stored.
    /// The title of an existing row is left untouched.
    pub fn update(&self, mut conversation: Conversation) -> Result<Conversation, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            params![
                conversation.id,
                conversation.title,
                conversation.created_at.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )?;

        insert_pending_messages(&tx, &conversation.id, &mut conversation.messages)?;
        tx.commit()?;

        conversation.updated_at = now;
        Ok(conversation)
    }

    /// Remove a conversation and, through the foreign key, all its messages.
    #[allow(dead_code)]
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Fetch a conversation with its messages in insertion order.
    pub fn get(&self, id: &str) -> Result<Conversation, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id],
                ConversationRow::from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let messages = load_messages(&conn, &row.id)?;
        row.into_conversation(messages)
    }

    /// The conversation created last, with its messages.
    pub fn get_most_recent(&self) -> Result<Conversation, StoreError> {
        let id: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id FROM conversations ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
        };
        match id {
            Some(id) => self.get(&id),
            None => Err(StoreError::NotFound("no conversations stored".to_string())),
        }
    }

    /// Every conversation without its messages, newest first.
    pub fn get_all(&self) -> Result<Vec<Conversation>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM conversations
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], ConversationRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_conversation(Vec::new())?);
        }
        Ok(out)
    }
}

// ── Row helpers ───────────────────────────────────────────────────────────────

struct ConversationRow {
    id: String,
    title: String,
    created_at: i64,
    updated_at: i64,
}

impl ConversationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn into_conversation(self, messages: Vec<Message>) -> Result<Conversation, StoreError> {
        Ok(Conversation {
            id: self.id,
            title: self.title,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            messages,
        })
    }
}

struct MessageRow {
    id: i64,
    role: String,
    content: String,
    created_at: i64,
    updated_at: i64,
}

fn load_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, role, content, created_at, updated_at FROM messages
         WHERE conversation_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![conversation_id], |row| {
        Ok(MessageRow {
            id: row.get(0)?,
            role: row.get(1)?,
            content: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        let row = row?;
        let role: Role = row.role.parse().map_err(StoreError::InvalidRole)?;
        out.push(Message {
            id: Some(row.id),
            role,
            content: row.content,
            conversation_id: conversation_id.to_string(),
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        });
    }
    Ok(out)
}

/// Insert messages that have no id yet and record the ids SQLite assigns.
fn insert_pending_messages(
    tx: &Transaction<'_>,
    conversation_id: &str,
    messages: &mut [Message],
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(
        "INSERT INTO messages (conversation_id, role, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for message in messages.iter_mut().filter(|m| m.id.is_none()) {
        stmt.execute(params![
            conversation_id,
            message.role.as_str(),
            message.content,
            message.created_at.timestamp_millis(),
            message.updated_at.timestamp_millis(),
        ])?;
        message.id = Some(tx.last_insert_rowid());
        message.conversation_id = conversation_id.to_string();
    }
    Ok(())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or(StoreError::InvalidTimestamp(ms))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
