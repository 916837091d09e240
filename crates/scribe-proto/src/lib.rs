//! # scribe-proto
//!
//! Wire shapes shared by the scribed agent and its clients: the change-pack
//! envelope, document event types, typed request/response shapes for the six
//! RPC methods, and the error kinds surfaced over the wire.
//!
//! The transport itself is not part of this crate; every type here is plain
//! serde data so any RPC layer can carry it.

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod rpc;

pub use error::{ErrorKind, WireError};
pub use event::{DocEvent, DocEventKind};
pub use rpc::{
    ActivateClientRequest, ActivateClientResponse, AttachDocumentRequest, AttachDocumentResponse,
    DeactivateClientRequest, DeactivateClientResponse, DetachDocumentRequest,
    DetachDocumentResponse, PushPullRequest, PushPullResponse, WatchDocumentsRequest,
    WatchStreamItem,
};
