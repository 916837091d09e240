//! Typed request/response shapes for the agent's RPC surface.
//!
//! `attach`, `detach` and `push_pull` all carry a change pack in both
//! directions; `watch_documents` opens a stream whose first item is an
//! initialization frame listing the peers already watching each document.

use std::collections::HashMap;

use scribe_crdt::{ActorId, ChangePack};
use serde::{Deserialize, Serialize};

use crate::event::DocEvent;

/// Register a client identity under a caller-chosen key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateClientRequest {
    /// Caller-chosen key, e.g. a device or user identifier.
    pub client_key: String,
}

/// Response to [`ActivateClientRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateClientResponse {
    /// Echo of the request key.
    pub client_key: String,
    /// The actor id assigned to this client.
    pub client_id: ActorId,
}

/// Mark a client inactive, detaching all of its documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateClientRequest {
    /// The client to deactivate.
    pub client_id: ActorId,
}

/// Response to [`DeactivateClientRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateClientResponse {
    /// The deactivated client.
    pub client_id: ActorId,
}

/// Attach a document to the client, then push-pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachDocumentRequest {
    /// The attaching client.
    pub client_id: ActorId,
    /// Locally authored changes plus the client's checkpoint.
    pub pack: ChangePack,
}

/// Response to [`AttachDocumentRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachDocumentResponse {
    /// Pulled changes and the advanced checkpoint.
    pub pack: ChangePack,
}

/// Detach a document from the client, then push-pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetachDocumentRequest {
    /// The detaching client.
    pub client_id: ActorId,
    /// Final locally authored changes plus the client's checkpoint.
    pub pack: ChangePack,
}

/// Response to [`DetachDocumentRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetachDocumentResponse {
    /// Pulled changes and the advanced checkpoint.
    pub pack: ChangePack,
}

/// Merge pushed changes and pull what the client has not seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPullRequest {
    /// The requesting client.
    pub client_id: ActorId,
    /// Locally authored changes plus the client's checkpoint.
    pub pack: ChangePack,
}

/// Response to [`PushPullRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPullResponse {
    /// Pulled changes and the advanced checkpoint.
    pub pack: ChangePack,
}

/// Open a watch stream over a set of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchDocumentsRequest {
    /// The watching client.
    pub client_id: ActorId,
    /// Keys of the documents to watch.
    pub document_keys: Vec<String>,
}

/// One frame of a watch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum WatchStreamItem {
    /// First frame: the clients already watching each requested document.
    Initialization {
        /// Peers by document key.
        peers_by_doc: HashMap<String, Vec<ActorId>>,
    },
    /// A document event.
    Event(DocEvent),
}
