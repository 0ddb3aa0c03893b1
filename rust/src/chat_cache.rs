use rusqlite::{params, Connection, OptionalExtension};

use crate::chat::ChatMessage;

/// Only the newest messages survive a restart.
pub const CHAT_CACHE_LIMIT: usize = 100;

const LAST_FETCHED_AT_KEY: &str = "last_fetched_at";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("chat cache: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CachedChat {
    pub messages: Vec<ChatMessage>,
    pub last_fetched_at: Option<i64>,
}

#[derive(Debug)]
pub struct ChatCache {
    conn: Connection,
}

impl ChatCache {
    pub fn open(data_dir: &str) -> Result<Self, CacheError> {
        let path = std::path::Path::new(data_dir).join("chat_cache.sqlite3");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chat_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    /// Replace the cached snapshot with the newest [`CHAT_CACHE_LIMIT`] messages.
    pub fn save(
        &mut self,
        messages: &[ChatMessage],
        last_fetched_at: Option<i64>,
    ) -> Result<(), CacheError> {
        let start = messages.len().saturating_sub(CHAT_CACHE_LIMIT);
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chat_messages", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chat_messages (seq, id, sender, message, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (seq, m) in messages[start..].iter().enumerate() {
                stmt.execute(params![seq as i64, m.id, m.sender, m.message, m.timestamp])?;
            }
        }
        match last_fetched_at {
            Some(ts) => {
                tx.execute(
                    "INSERT INTO chat_meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![LAST_FETCHED_AT_KEY, ts.to_string()],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM chat_meta WHERE key = ?1",
                    params![LAST_FETCHED_AT_KEY],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load(&self) -> Result<CachedChat, CacheError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, sender, message, timestamp FROM chat_messages ORDER BY seq")?;
        let messages = stmt
            .query_map([], |row| {
                Ok(ChatMessage {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    message: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let last_fetched_at = self
            .conn
            .query_row(
                "SELECT value FROM chat_meta WHERE key = ?1",
                params![LAST_FETCHED_AT_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse::<i64>().ok());

        Ok(CachedChat {
            messages,
            last_fetched_at,
        })
    }
}
