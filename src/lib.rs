//! scribed - collaborative document agent.
//!
//! The agent persists document change logs, merges concurrent edits through
//! the CRDT engine in `scribe-crdt`, and notifies watching clients. This
//! crate wires the merge core to a store, a per-document lock map and a
//! subscription bus; the RPC transport that carries [`service`] requests
//! binds elsewhere.

pub mod backend;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod packs;
pub mod service;

pub use backend::Backend;
pub use config::Config;
pub use db::Database;
pub use error::{ServiceError, ServiceResult};
pub use service::{DocumentService, WatchStream};
