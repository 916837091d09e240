//! The push-pull merge core.
//!
//! Runs inside the per-document critical section: persist the pushed
//! changes under freshly assigned server sequences, advance the client's
//! checkpoint, compute the changes to pull, take a snapshot when the backlog
//! crosses the threshold, and publish the change event. Serializability of
//! server-sequence assignment per document comes from the caller-held lock.

use std::time::Instant;

use scribe_crdt::{replay_changes, Change, ChangePack, Checkpoint};
use scribe_proto::{DocEvent, DocEventKind};
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::db::{ClientRecord, DocumentRecord};
use crate::error::{ServiceError, ServiceResult};

/// Merge one pack and build the response pack.
pub async fn push_pull(
    backend: &Backend,
    client: &ClientRecord,
    document: &mut DocumentRecord,
    pack: &ChangePack,
    cancel: &CancellationToken,
) -> ServiceResult<ChangePack> {
    let started = Instant::now();
    let request_checkpoint = pack.checkpoint();
    let clients = backend.db.clients();

    let mut checkpoint = clients.checkpoint(client.id, document.id).await?;

    // Push: accept only changes past the acknowledged client sequence, so a
    // replayed pack is a no-op.
    let mut pushed: Vec<Change> = Vec::new();
    for change in pack.changes() {
        if change.id().client_seq() <= checkpoint.client_seq() {
            tracing::debug!(
                client = %client.id,
                client_seq = change.id().client_seq(),
                "change already pushed, skipping"
            );
            continue;
        }
        let mut change = change.clone();
        document.server_seq += 1;
        change.set_server_seq(document.server_seq);
        pushed.push(change);
    }

    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }

    if !pushed.is_empty() {
        backend.db.changes().insert(document.id, &pushed).await?;
        backend
            .db
            .documents()
            .update_server_seq(document.id, document.server_seq)
            .await?;

        let last_client_seq = pushed
            .last()
            .map(|c| c.id().client_seq())
            .unwrap_or_else(|| checkpoint.client_seq());
        checkpoint = checkpoint.forward(&Checkpoint::new(document.server_seq, last_client_seq));
    }

    // Pull: everything past what the client reports having seen, minus its
    // own changes.
    let (snapshot, pulled) = pull_changes(backend, client, document, request_checkpoint).await?;

    // A shipped snapshot covers the document tip even when the own-excluded
    // tail stops short of it; the checkpoint must advance to the tip or the
    // same snapshot ships again on every subsequent sync.
    let response_server_seq = if snapshot.is_some() {
        document.server_seq
    } else {
        pulled
            .iter()
            .filter_map(Change::server_seq)
            .max()
            .unwrap_or(0)
    };
    checkpoint = checkpoint.forward(&Checkpoint::new(response_server_seq, 0));
    clients
        .update_checkpoint(client.id, document.id, checkpoint)
        .await?;

    maybe_snapshot(backend, document).await?;

    if pack.has_changes() {
        backend.pubsub.publish(
            client.id,
            document.key.as_str(),
            DocEvent::new(DocEventKind::DocumentChanged, document.key.clone(), client.id),
        );
    }

    crate::metrics::record_push_pull(
        pack.changes().len(),
        pulled.len(),
        started.elapsed().as_secs_f64(),
    );
    tracing::debug!(
        client = %client.id,
        doc = %document.key,
        pushed = pushed.len(),
        pulled = pulled.len(),
        checkpoint = %checkpoint,
        "push-pull complete"
    );

    Ok(ChangePack::new(
        document.key.clone(),
        checkpoint,
        snapshot,
        pulled,
    ))
}

/// Compute the changes to send back. When the client is far behind and a
/// stored snapshot covers part of the gap, ship the snapshot plus the tail.
async fn pull_changes(
    backend: &Backend,
    client: &ClientRecord,
    document: &DocumentRecord,
    request_checkpoint: Checkpoint,
) -> ServiceResult<(Option<Vec<u8>>, Vec<Change>)> {
    let changes = backend.db.changes();
    let seen = request_checkpoint.server_seq();

    let backlog = document.server_seq.saturating_sub(seen);
    if backlog > backend.config.snapshot_threshold && document.snapshot_server_seq > seen {
        if let Some((snapshot, snapshot_seq)) =
            backend.db.documents().load_snapshot(document.id).await?
        {
            let tail = changes
                .fetch_range(document.id, snapshot_seq, document.server_seq, Some(client.id))
                .await?;
            return Ok((Some(snapshot), tail));
        }
    }

    let pulled = changes
        .fetch_range(document.id, seen, document.server_seq, Some(client.id))
        .await?;
    Ok((None, pulled))
}

/// Take a snapshot when the backlog since the last one crosses the
/// configured threshold: replay from the previous snapshot and store the
/// serialized state.
async fn maybe_snapshot(backend: &Backend, document: &mut DocumentRecord) -> ServiceResult<()> {
    let accumulated = document
        .server_seq
        .saturating_sub(document.snapshot_server_seq);
    if accumulated < backend.config.snapshot_threshold {
        return Ok(());
    }

    let base = backend.db.documents().load_snapshot(document.id).await?;
    let (base_bytes, base_seq) = match &base {
        Some((bytes, seq)) => (Some(bytes.as_slice()), *seq),
        None => (None, 0),
    };

    let replayed = backend
        .db
        .changes()
        .fetch_range(document.id, base_seq, document.server_seq, None)
        .await?;
    let root = replay_changes(base_bytes, &replayed)?;
    let snapshot = scribe_crdt::document::encode_root(&root)?;

    backend
        .db
        .documents()
        .store_snapshot(document.id, &snapshot, document.server_seq)
        .await?;
    document.snapshot_server_seq = document.server_seq;

    crate::metrics::SNAPSHOTS_CREATED.inc();
    tracing::info!(
        doc = %document.key,
        server_seq = document.server_seq,
        "snapshot taken"
    );
    Ok(())
}
