// src/store.rs
//! Conversation persistence on SQLite: conversations, messages, message
//! attachments, and per-user provider keys. Guests never touch this layer.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use sqlx::{Executor, SqlitePool};
use uuid::Uuid;

use crate::message::{Attachment, ChatMessage};

const CREATE_CONVERSATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
"#;

const CREATE_ATTACHMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER,
    file_url TEXT NOT NULL,
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);
"#;

const CREATE_PROFILES: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    openrouter_api_key TEXT
);
"#;

const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_user_id ON conversations(user_id);
CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
CREATE INDEX IF NOT EXISTS idx_attachments_message_id ON attachments(message_id);
"#;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub model: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    role: String,
    content: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    message_id: String,
    filename: String,
    file_type: String,
    file_size: Option<i64>,
    file_url: String,
}

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent, safe to call at every startup.
    pub async fn run_migrations(&self) -> Result<()> {
        self.pool.execute(CREATE_CONVERSATIONS).await?;
        self.pool.execute(CREATE_MESSAGES).await?;
        self.pool.execute(CREATE_ATTACHMENTS).await?;
        self.pool.execute(CREATE_PROFILES).await?;
        self.pool.execute(CREATE_INDICES).await?;
        Ok(())
    }

    /// Look up a conversation, scoped to its owner. Another user's id
    /// behaves as if the conversation does not exist.
    pub async fn find_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_id, title, model FROM conversations WHERE id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        model: &str,
    ) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO conversations (id, user_id, title, model) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(title)
            .bind(model)
            .execute(&self.pool)
            .await?;
        Ok(Conversation {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            model: model.to_string(),
        })
    }

    pub async fn update_conversation_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Full history of a conversation, oldest first, with attachments
    /// reattached to their messages.
    pub async fn load_history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, role, content FROM messages
             WHERE conversation_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let attachment_rows = sqlx::query_as::<_, AttachmentRow>(
            "SELECT a.message_id, a.filename, a.file_type, a.file_size, a.file_url
             FROM attachments a
             JOIN messages m ON m.id = a.message_id
             WHERE m.conversation_id = ?
             ORDER BY a.rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<String, Vec<Attachment>> = HashMap::new();
        for row in attachment_rows {
            by_message.entry(row.message_id).or_default().push(Attachment {
                filename: row.filename,
                file_type: row.file_type,
                file_size: row.file_size.map(|s| s as u64),
                file_url: row.file_url,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| ChatMessage {
                role: row.role,
                content: row.content,
                attachments: by_message.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }

    /// Insert one message and return its id.
    pub async fn save_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO messages (id, conversation_id, role, content) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(conversation_id)
            .bind(role)
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn save_attachments(
        &self,
        message_id: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        for attachment in attachments {
            sqlx::query(
                "INSERT INTO attachments (id, message_id, filename, file_type, file_size, file_url)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(message_id)
            .bind(&attachment.filename)
            .bind(&attachment.file_type)
            .bind(attachment.file_size.map(|s| s as i64))
            .bind(&attachment.file_url)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// The user's stored provider key, if they configured one. A blank
    /// key counts as not configured.
    pub async fn user_api_key(&self, user_id: &str) -> Result<Option<String>> {
        let key: Option<Option<String>> =
            sqlx::query_scalar("SELECT openrouter_api_key FROM profiles WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(key
            .flatten()
            .filter(|k| !k.trim().is_empty()))
    }

    pub async fn set_user_api_key(&self, user_id: &str, api_key: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO profiles (user_id, openrouter_api_key) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET openrouter_api_key = excluded.openrouter_api_key",
        )
        .bind(user_id)
        .bind(api_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
