//! SQLite 持久化：对话日志（messages）与用户画像（profiles）
//!
//! 单连接由 Mutex 保护，所有 SQL 在 spawn_blocking 中执行，不阻塞异步运行时。
//! 同时实现 ConversationStore 与 ProfileRepository。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::AgentError;
use crate::memory::{ConversationStore, Message, Profile, ProfileRepository, Role};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id);
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::PersistenceError(format!("{}: {e}", parent.display())))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AgentError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AgentError::PersistenceError("sqlite connection poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| AgentError::PersistenceError(format!("sqlite task failed: {e}")))?
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn append(&self, conversation_id: &str, message: Message) -> Result<usize, AgentError> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation_id,
                    message.role.as_str(),
                    message.content,
                    message.timestamp.to_rfc3339()
                ],
            )?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, AgentError> {
        let conversation_id = conversation_id.to_string();
        // SQLite 中 LIMIT -1 表示不限
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, created_at FROM (
                     SELECT id, role, content, created_at FROM messages
                     WHERE conversation_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id, limit], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                Ok(Message {
                    role: Role::parse(&role),
                    content,
                    timestamp: parse_timestamp(&created_at),
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), AgentError> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ProfileRepository for SqliteStore {
    async fn load(&self, user_id: &str) -> Result<Option<Profile>, AgentError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            document
                .map(|doc| serde_json::from_str::<Profile>(&doc).map_err(AgentError::from))
                .transpose()
        })
        .await
    }

    async fn save(&self, user_id: &str, profile: &Profile) -> Result<(), AgentError> {
        let user_id = user_id.to_string();
        let document = serde_json::to_string(profile)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, document, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
                params![user_id, document, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }
}
