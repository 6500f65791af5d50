//! Durable conversation and fact storage (SQLite).
//!
//! The store is the single source of truth. The index is a derived cache
//! that can be rebuilt from a full fact scan at any time, so every record
//! here is laid out to support that scan, and fact lookup by conversation
//! id is backed by an index on `facts.conversation_id`.

use crate::error::StoreError;
use crate::types::{Conversation, Fact, Role, Turn};
use anyhow::Context as _;
use sqlx::{Row, SqlitePool};

type Result<T> = std::result::Result<T, StoreError>;

/// Store for conversations and their extracted facts.
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    /// Create a new store over the given SQLite pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the tables if they don't exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create conversations table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                conversation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                name TEXT,
                turn_id TEXT,
                timestamp TIMESTAMP,
                PRIMARY KEY (conversation_id, seq),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create turns table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create facts table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_facts_conversation ON facts(conversation_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist a conversation and its turns atomically.
    ///
    /// This is the durability point: until it returns Ok, no downstream
    /// component may observe the conversation. A duplicate id is rejected,
    /// never overwritten.
    pub async fn put_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| "failed to begin transaction")?;

        sqlx::query("INSERT INTO conversations (id, created_at) VALUES (?, ?)")
            .bind(&conversation.id)
            .bind(conversation.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                let duplicate = matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation());
                if duplicate {
                    StoreError::DuplicateId {
                        id: conversation.id.clone(),
                    }
                } else {
                    StoreError::Sqlx(error)
                }
            })?;

        for (seq, turn) in conversation.turns.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO turns (conversation_id, seq, role, content, name, turn_id, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&conversation.id)
            .bind(seq as i64)
            .bind(turn.role.to_string())
            .bind(&turn.content)
            .bind(&turn.name)
            .bind(&turn.turn_id)
            .bind(turn.timestamp)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to save turn {seq} of {}", conversation.id))?;
        }

        tx.commit()
            .await
            .with_context(|| format!("failed to commit conversation {}", conversation.id))?;

        Ok(())
    }

    /// Load a conversation with its turns, ordered by sequence.
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT id, created_at FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load conversation {id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at = row.try_get("created_at").unwrap_or_else(|_| chrono::Utc::now());

        let turn_rows = sqlx::query(
            r#"
            SELECT role, content, name, turn_id, timestamp
            FROM turns
            WHERE conversation_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load turns for {id}"))?;

        let turns = turn_rows
            .into_iter()
            .map(|row| {
                let role: String = row.try_get("role").unwrap_or_default();
                Turn {
                    role: role.parse().unwrap_or(Role::User),
                    content: row.try_get("content").unwrap_or_default(),
                    name: row.try_get("name").ok().flatten(),
                    turn_id: row.try_get("turn_id").ok().flatten(),
                    timestamp: row.try_get("timestamp").ok().flatten(),
                }
            })
            .collect();

        Ok(Some(Conversation {
            id: id.to_string(),
            turns,
            created_at,
        }))
    }

    /// Persist a single extracted fact.
    ///
    /// An embedding that fails to serialize is dropped with a warning; the
    /// fact itself still persists and remains lexically searchable.
    pub async fn put_fact(&self, fact: &Fact) -> Result<()> {
        let embedding = match fact.embedding.as_ref().map(serde_json::to_string) {
            Some(Ok(raw)) => Some(raw),
            Some(Err(error)) => {
                tracing::warn!(fact_id = %fact.id, %error, "embedding failed to serialize, storing fact without it");
                None
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO facts (id, conversation_id, text, embedding, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fact.id)
        .bind(&fact.conversation_id)
        .bind(&fact.text)
        .bind(embedding)
        .bind(fact.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save fact {}", fact.id))?;

        Ok(())
    }

    /// Get all facts extracted from one conversation.
    pub async fn get_facts(&self, conversation_id: &str) -> Result<Vec<Fact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, text, embedding, created_at
            FROM facts
            WHERE conversation_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to get facts for conversation {conversation_id}"))?;

        Ok(rows.iter().map(row_to_fact).collect())
    }

    /// Load facts by id. Ids absent from the store are silently skipped;
    /// the caller decides whether that is an inconsistency.
    pub async fn get_facts_by_ids(&self, ids: &[String]) -> Result<Vec<Fact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, conversation_id, text, embedding, created_at FROM facts WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| "failed to load facts by id")?;

        Ok(rows.iter().map(row_to_fact).collect())
    }

    /// Full fact scan, used to rebuild the index from scratch.
    pub async fn all_facts(&self) -> Result<Vec<Fact>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, text, embedding, created_at FROM facts ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .with_context(|| "failed to scan facts")?;

        Ok(rows.iter().map(row_to_fact).collect())
    }

    /// Number of stored conversations.
    pub async fn conversation_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversations")
            .fetch_one(&self.pool)
            .await
            .with_context(|| "failed to count conversations")?;
        Ok(row.try_get("n").unwrap_or(0))
    }

    /// Number of stored facts.
    pub async fn fact_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM facts")
            .fetch_one(&self.pool)
            .await
            .with_context(|| "failed to count facts")?;
        Ok(row.try_get("n").unwrap_or(0))
    }
}

/// Helper: Convert a database row to a Fact.
fn row_to_fact(row: &sqlx::sqlite::SqliteRow) -> Fact {
    let id: String = row.try_get("id").unwrap_or_default();

    let embedding: Option<String> = row.try_get("embedding").ok().flatten();
    let embedding = embedding.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(vector) => Some(vector),
        Err(error) => {
            tracing::warn!(fact_id = %id, %error, "stored embedding failed to decode, ignoring it");
            None
        }
    });

    Fact {
        id,
        conversation_id: row.try_get("conversation_id").unwrap_or_default(),
        text: row.try_get("text").unwrap_or_default(),
        embedding,
        created_at: row.try_get("created_at").unwrap_or_else(|_| chrono::Utc::now()),
    }
}
