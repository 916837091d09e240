//! Document records and snapshots.

use sqlx::{Row, SqlitePool};

use super::DbError;

/// A stored document.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub key: String,
    /// Highest server sequence assigned to a change of this document.
    pub server_seq: u64,
    /// Server sequence the stored snapshot covers (0 when none).
    pub snapshot_server_seq: u64,
}

/// Repository over the `documents` table.
pub struct DocumentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a document by key, creating an empty record on first contact.
    pub async fn find_or_create(&self, key: &str) -> Result<DocumentRecord, DbError> {
        if let Some(existing) = self.find_by_key(key).await? {
            return Ok(existing);
        }

        sqlx::query(
            "INSERT INTO documents (doc_key, server_seq, snapshot_server_seq, created_at)
             VALUES (?, 0, 0, ?)
             ON CONFLICT (doc_key) DO NOTHING",
        )
        .bind(key)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        self.find_by_key(key)
            .await?
            .ok_or_else(|| DbError::Corrupt(format!("document {key} vanished after insert")))
    }

    /// Look up a document by key.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<DocumentRecord>, DbError> {
        let row = sqlx::query(
            "SELECT id, doc_key, server_seq, snapshot_server_seq FROM documents WHERE doc_key = ?",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        row.map(|row| {
            let id: i64 = row.try_get("id")?;
            let key: String = row.try_get("doc_key")?;
            let server_seq: i64 = row.try_get("server_seq")?;
            let snapshot_server_seq: i64 = row.try_get("snapshot_server_seq")?;
            Ok(DocumentRecord {
                id,
                key,
                server_seq: server_seq as u64,
                snapshot_server_seq: snapshot_server_seq as u64,
            })
        })
        .transpose()
    }

    /// Persist the document's highest assigned server sequence.
    pub async fn update_server_seq(&self, id: i64, server_seq: u64) -> Result<(), DbError> {
        sqlx::query("UPDATE documents SET server_seq = ? WHERE id = ?")
            .bind(server_seq as i64)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Store a snapshot covering `server_seq`.
    pub async fn store_snapshot(
        &self,
        id: i64,
        snapshot: &[u8],
        server_seq: u64,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE documents SET snapshot = ?, snapshot_server_seq = ? WHERE id = ?")
            .bind(snapshot)
            .bind(server_seq as i64)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Load the stored snapshot, if any, with the server sequence it covers.
    pub async fn load_snapshot(&self, id: i64) -> Result<Option<(Vec<u8>, u64)>, DbError> {
        let row = sqlx::query(
            "SELECT snapshot, snapshot_server_seq FROM documents WHERE id = ? AND snapshot IS NOT NULL",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|row| {
            let snapshot: Vec<u8> = row.try_get("snapshot")?;
            let server_seq: i64 = row.try_get("snapshot_server_seq")?;
            Ok((snapshot, server_seq as u64))
        })
        .transpose()
    }
}
