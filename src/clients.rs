//! Client lifecycle and request preconditions.

use rand::RngCore;
use scribe_crdt::{ActorId, ChangePack, ACTOR_ID_LEN};

use crate::backend::Backend;
use crate::db::{ClientRecord, DocumentRecord};
use crate::error::{ServiceError, ServiceResult};

/// Register (or re-activate) a client under a caller-chosen key.
pub async fn activate(backend: &Backend, client_key: &str) -> ServiceResult<ClientRecord> {
    if client_key.is_empty() {
        return Err(ServiceError::InvalidArgument("empty client key".into()));
    }

    let mut bytes = [0u8; ACTOR_ID_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    let fresh_id = ActorId::from_bytes(bytes);

    let record = backend.db.clients().activate(client_key, fresh_id).await?;
    tracing::info!(client = %record.id, key = %client_key, "client activated");
    Ok(record)
}

/// Mark a client inactive and detach every document it has attached.
pub async fn deactivate(backend: &Backend, client_id: ActorId) -> ServiceResult<ClientRecord> {
    let clients = backend.db.clients();
    let record = clients
        .find(client_id)
        .await?
        .ok_or_else(|| ServiceError::ClientNotFound(client_id.to_hex()))?;

    for doc_id in clients.attached_docs(client_id).await? {
        clients.detach(client_id, doc_id).await?;
    }
    clients.deactivate(client_id).await?;

    tracing::info!(client = %client_id, "client deactivated");
    Ok(record)
}

/// Resolve the client and document a pack addresses, enforcing activation
/// and (except during attach) attachment.
pub async fn find_client_and_document(
    backend: &Backend,
    client_id: ActorId,
    pack: &ChangePack,
    for_attach: bool,
) -> ServiceResult<(ClientRecord, DocumentRecord)> {
    if pack.document_key().is_empty() {
        return Err(ServiceError::InvalidArgument("empty document key".into()));
    }

    let clients = backend.db.clients();
    let client = clients
        .find(client_id)
        .await?
        .ok_or_else(|| ServiceError::ClientNotFound(client_id.to_hex()))?;
    if !client.is_activated() {
        return Err(ServiceError::ClientNotActivated(client_id.to_hex()));
    }

    let document = backend
        .db
        .documents()
        .find_or_create(pack.document_key())
        .await?;

    if !for_attach && !clients.is_attached(client_id, document.id).await? {
        return Err(ServiceError::DocumentNotAttached(
            pack.document_key().to_string(),
        ));
    }

    Ok((client, document))
}
