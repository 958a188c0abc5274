use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use crate::config;
use crate::models::{Conversation, Message, Role};

/// SQLite-backed store for chats and their messages. The connection is
/// shared behind a mutex and every query runs on the blocking pool, so
/// writers are serialized even across concurrent callers.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new() -> Result<Self> {
        let path = config::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE chats (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    model TEXT NOT NULL DEFAULT '',
                    system_prompt TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
                );

                CREATE INDEX idx_chats_updated ON chats(updated_at DESC);
                CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    // --- Chat CRUD ---

    pub async fn create_chat(
        &self,
        title: &str,
        model: &str,
        system_prompt: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.clone();
        let title = title.to_string();
        let model = model.to_string();
        let system_prompt = system_prompt.map(|s| s.to_string());
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO chats (title, model, system_prompt, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![title, model, system_prompt, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    pub async fn get_chat(&self, id: i64) -> Result<Option<Conversation>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, title, model, system_prompt, created_at, updated_at
                 FROM chats WHERE id = ?1",
            )?;
            let result = stmt
                .query_row(params![id], |row| Ok(Self::row_to_conversation(row)))
                .optional()?;
            match result {
                Some(Ok(chat)) => Ok(Some(chat)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn list_chats(&self) -> Result<Vec<Conversation>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, title, model, system_prompt, created_at, updated_at
                 FROM chats ORDER BY updated_at DESC",
            )?;
            let chats = stmt
                .query_map([], |row| Ok(Self::row_to_conversation(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(chats)
        })
        .await?
    }

    pub async fn update_chat_title(&self, id: i64, title: &str) -> Result<()> {
        let conn = self.conn.clone();
        let title = title.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE chats SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_chat(&self, id: i64) -> Result<()> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM chats WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    // --- Message CRUD ---

    /// Append a message and bump the chat's updated_at in one transaction.
    pub async fn add_message(&self, chat_id: i64, role: Role, content: &str) -> Result<Message> {
        let conn = self.conn.clone();
        let content = content.to_string();
        task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let now = Utc::now();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (chat_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chat_id, role.as_str(), content, now.to_rfc3339()],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), chat_id],
            )?;
            tx.commit()?;
            Ok(Message {
                id,
                chat_id,
                role,
                content,
                created_at: now,
            })
        })
        .await?
    }

    pub async fn list_messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, role, content, created_at
                 FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let messages = stmt
                .query_map(params![chat_id], |row| Ok(Self::row_to_message(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await?
    }

    pub async fn clear_messages(&self, chat_id: i64) -> Result<()> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
            Ok(())
        })
        .await?
    }

    // --- Row helpers ---

    fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation> {
        let created_str: String = row.get(4)?;
        let updated_str: String = row.get(5)?;

        Ok(Conversation {
            id: row.get(0)?,
            title: row.get(1)?,
            model: row.get(2)?,
            system_prompt: row.get(3)?,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_str)?.with_timezone(&Utc),
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let role_str: String = row.get(2)?;
        let created_str: String = row.get(4)?;

        Ok(Message {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Unknown role: {}", role_str))?,
            content: row.get(3)?,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
        })
    }
}
