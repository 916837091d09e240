//! Client records and per-document checkpoints.

use scribe_crdt::{ActorId, Checkpoint};
use sqlx::{Row, SqlitePool};

use super::DbError;

/// Activation state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Activated,
    Deactivated,
}

impl ClientStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
        }
    }

    fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "activated" => Ok(Self::Activated),
            "deactivated" => Ok(Self::Deactivated),
            other => Err(DbError::Corrupt(format!("unknown client status: {other}"))),
        }
    }
}

/// A registered client.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub id: ActorId,
    pub key: String,
    pub status: ClientStatus,
}

impl ClientRecord {
    /// Whether the client may issue requests.
    pub fn is_activated(&self) -> bool {
        self.status == ClientStatus::Activated
    }
}

/// Repository over the `clients` and `client_documents` tables.
pub struct ClientRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ClientRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a client under `key`, or re-activate the existing record for
    /// that key. `fresh_id` is used only when a new record is created.
    pub async fn activate(&self, key: &str, fresh_id: ActorId) -> Result<ClientRecord, DbError> {
        if let Some(existing) = self.find_by_key(key).await? {
            sqlx::query("UPDATE clients SET status = 'activated' WHERE id = ?")
                .bind(existing.id.to_hex())
                .execute(self.pool)
                .await?;
            return Ok(ClientRecord {
                status: ClientStatus::Activated,
                ..existing
            });
        }

        sqlx::query(
            "INSERT INTO clients (id, client_key, status, created_at) VALUES (?, ?, 'activated', ?)",
        )
        .bind(fresh_id.to_hex())
        .bind(key)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        Ok(ClientRecord {
            id: fresh_id,
            key: key.to_string(),
            status: ClientStatus::Activated,
        })
    }

    /// Mark a client deactivated.
    pub async fn deactivate(&self, id: ActorId) -> Result<(), DbError> {
        sqlx::query("UPDATE clients SET status = 'deactivated' WHERE id = ?")
            .bind(id.to_hex())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Look up a client by id.
    pub async fn find(&self, id: ActorId) -> Result<Option<ClientRecord>, DbError> {
        let row = sqlx::query("SELECT id, client_key, status FROM clients WHERE id = ?")
            .bind(id.to_hex())
            .fetch_optional(self.pool)
            .await?;
        row.map(Self::record_from_row).transpose()
    }

    /// Look up a client by its registration key.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<ClientRecord>, DbError> {
        let row = sqlx::query(
            "SELECT id, client_key, status FROM clients WHERE client_key = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;
        row.map(Self::record_from_row).transpose()
    }

    /// Record an attachment, creating the checkpoint row on first attach.
    pub async fn attach(&self, client_id: ActorId, doc_id: i64) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO client_documents (client_id, doc_id, client_seq, server_seq, attached)
             VALUES (?, ?, 0, 0, 1)
             ON CONFLICT (client_id, doc_id) DO UPDATE SET attached = 1",
        )
        .bind(client_id.to_hex())
        .bind(doc_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Clear an attachment; the checkpoint row is kept so a re-attach
    /// resumes where the client left off.
    pub async fn detach(&self, client_id: ActorId, doc_id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE client_documents SET attached = 0 WHERE client_id = ? AND doc_id = ?")
            .bind(client_id.to_hex())
            .bind(doc_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Whether the client currently has the document attached.
    pub async fn is_attached(&self, client_id: ActorId, doc_id: i64) -> Result<bool, DbError> {
        let attached: Option<bool> = sqlx::query_scalar(
            "SELECT attached FROM client_documents WHERE client_id = ? AND doc_id = ?",
        )
        .bind(client_id.to_hex())
        .bind(doc_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(attached.unwrap_or(false))
    }

    /// All documents the client currently has attached.
    pub async fn attached_docs(&self, client_id: ActorId) -> Result<Vec<i64>, DbError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT doc_id FROM client_documents WHERE client_id = ? AND attached = 1",
        )
        .bind(client_id.to_hex())
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }

    /// The client's checkpoint for a document.
    pub async fn checkpoint(&self, client_id: ActorId, doc_id: i64) -> Result<Checkpoint, DbError> {
        let row = sqlx::query(
            "SELECT server_seq, client_seq FROM client_documents WHERE client_id = ? AND doc_id = ?",
        )
        .bind(client_id.to_hex())
        .bind(doc_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => {
                let server_seq: i64 = row.try_get("server_seq")?;
                let client_seq: i64 = row.try_get("client_seq")?;
                Ok(Checkpoint::new(server_seq as u64, client_seq as u32))
            }
            None => Ok(Checkpoint::initial()),
        }
    }

    /// Persist the client's checkpoint for a document.
    pub async fn update_checkpoint(
        &self,
        client_id: ActorId,
        doc_id: i64,
        checkpoint: Checkpoint,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE client_documents SET server_seq = ?, client_seq = ? WHERE client_id = ? AND doc_id = ?",
        )
        .bind(checkpoint.server_seq() as i64)
        .bind(i64::from(checkpoint.client_seq()))
        .bind(client_id.to_hex())
        .bind(doc_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ClientRecord, DbError> {
        let id_hex: String = row.try_get("id")?;
        let key: String = row.try_get("client_key")?;
        let status: String = row.try_get("status")?;
        let id = ActorId::from_hex(&id_hex)
            .map_err(|e| DbError::Corrupt(format!("bad client id {id_hex}: {e}")))?;
        Ok(ClientRecord {
            id,
            key,
            status: ClientStatus::parse(&status)?,
        })
    }
}
