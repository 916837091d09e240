//! The per-document change log.
//!
//! Rows are keyed by `(doc_id, server_seq)`; operations travel as the
//! engine's tagged JSON encoding in a blob column.

use scribe_crdt::{ActorId, Change, ChangeId, Operation};
use sqlx::{Row, SqlitePool};

use super::DbError;

/// Repository over the `changes` table.
pub struct ChangeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChangeRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append changes, each already carrying its assigned server sequence.
    pub async fn insert(&self, doc_id: i64, changes: &[Change]) -> Result<(), DbError> {
        for change in changes {
            let server_seq = change
                .server_seq()
                .ok_or_else(|| DbError::Corrupt("change without server_seq".to_string()))?;
            let operations = serde_json::to_vec(change.operations())
                .map_err(|e| DbError::Corrupt(format!("operations encode failed: {e}")))?;

            sqlx::query(
                "INSERT INTO changes (doc_id, server_seq, client_seq, lamport, actor, message, operations)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(doc_id)
            .bind(server_seq as i64)
            .bind(i64::from(change.id().client_seq()))
            .bind(change.id().lamport() as i64)
            .bind(change.id().actor().to_hex())
            .bind(change.message())
            .bind(operations)
            .execute(self.pool)
            .await?;
        }
        Ok(())
    }

    /// Changes with `server_seq` in `(after, upto]`, optionally excluding one
    /// author, in server-sequence order.
    pub async fn fetch_range(
        &self,
        doc_id: i64,
        after: u64,
        upto: u64,
        exclude_actor: Option<ActorId>,
    ) -> Result<Vec<Change>, DbError> {
        let rows = match exclude_actor {
            Some(actor) => {
                sqlx::query(
                    "SELECT server_seq, client_seq, lamport, actor, message, operations
                     FROM changes
                     WHERE doc_id = ? AND server_seq > ? AND server_seq <= ? AND actor != ?
                     ORDER BY server_seq ASC",
                )
                .bind(doc_id)
                .bind(after as i64)
                .bind(upto as i64)
                .bind(actor.to_hex())
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT server_seq, client_seq, lamport, actor, message, operations
                     FROM changes
                     WHERE doc_id = ? AND server_seq > ? AND server_seq <= ?
                     ORDER BY server_seq ASC",
                )
                .bind(doc_id)
                .bind(after as i64)
                .bind(upto as i64)
                .fetch_all(self.pool)
                .await?
            }
        };

        rows.into_iter().map(Self::change_from_row).collect()
    }

    fn change_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Change, DbError> {
        let server_seq: i64 = row.try_get("server_seq")?;
        let client_seq: i64 = row.try_get("client_seq")?;
        let lamport: i64 = row.try_get("lamport")?;
        let actor_hex: String = row.try_get("actor")?;
        let message: Option<String> = row.try_get("message")?;
        let operations_blob: Vec<u8> = row.try_get("operations")?;

        let actor = ActorId::from_hex(&actor_hex)
            .map_err(|e| DbError::Corrupt(format!("bad actor {actor_hex}: {e}")))?;
        let operations: Vec<Operation> = serde_json::from_slice(&operations_blob)
            .map_err(|e| DbError::Corrupt(format!("operations decode failed: {e}")))?;

        let id = ChangeId::new(client_seq as u32, lamport as u64, actor);
        let mut change = Change::new(id, message, operations);
        change.set_server_seq(server_seq as u64);
        Ok(change)
    }
}
