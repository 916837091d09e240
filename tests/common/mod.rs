//! Integration test common infrastructure.
//!
//! Provides an in-process agent over an in-memory store, plus client-side
//! helpers that drive documents through the service the way a client
//! library would.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use scribe_crdt::{ActorId, Document, DocumentStatus};
use scribe_proto::{
    ActivateClientRequest, AttachDocumentRequest, DetachDocumentRequest, PushPullRequest,
};
use scribed::backend::Backend;
use scribed::config::BackendConfig;
use scribed::db::Database;
use scribed::service::DocumentService;
use tokio_util::sync::CancellationToken;

static NEXT_STORE: AtomicU64 = AtomicU64::new(0);

/// An in-process agent instance over its own temporary store.
pub struct TestAgent {
    pub service: DocumentService,
    db_path: PathBuf,
}

impl TestAgent {
    /// Start an agent over a fresh store.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_threshold(10).await
    }

    /// Start an agent with a specific snapshot threshold.
    pub async fn start_with_threshold(snapshot_threshold: u64) -> anyhow::Result<Self> {
        let db_path = std::env::temp_dir().join(format!(
            "scribed-test-{}-{}.db",
            std::process::id(),
            NEXT_STORE.fetch_add(1, Ordering::Relaxed)
        ));
        let db = Database::new(db_path.to_string_lossy().as_ref()).await?;
        let backend = Arc::new(Backend::new(BackendConfig { snapshot_threshold }, db));
        Ok(Self {
            service: DocumentService::new(backend),
            db_path,
        })
    }

    /// Activate a client and return its assigned id.
    pub async fn activate(&self, key: &str) -> anyhow::Result<ActorId> {
        let response = self
            .service
            .activate_client(
                ActivateClientRequest {
                    client_key: key.to_string(),
                },
                CancellationToken::new(),
            )
            .await?;
        Ok(response.client_id)
    }

    /// Attach a document for a client, applying the pulled pack.
    pub async fn attach(&self, client_id: ActorId, doc: &mut Document) -> anyhow::Result<()> {
        doc.set_actor(client_id);
        let response = self
            .service
            .attach_document(
                AttachDocumentRequest {
                    client_id,
                    pack: doc.create_change_pack(),
                },
                CancellationToken::new(),
            )
            .await?;
        doc.apply_change_pack(&response.pack)?;
        doc.set_status(DocumentStatus::Attached);
        Ok(())
    }

    /// Detach a document, pushing any final changes.
    pub async fn detach(&self, client_id: ActorId, doc: &mut Document) -> anyhow::Result<()> {
        let response = self
            .service
            .detach_document(
                DetachDocumentRequest {
                    client_id,
                    pack: doc.create_change_pack(),
                },
                CancellationToken::new(),
            )
            .await?;
        doc.apply_change_pack(&response.pack)?;
        doc.set_status(DocumentStatus::Detached);
        Ok(())
    }

    /// One push-pull round trip: push pending changes, apply what comes
    /// back.
    pub async fn sync(&self, client_id: ActorId, doc: &mut Document) -> anyhow::Result<()> {
        let response = self
            .service
            .push_pull(
                PushPullRequest {
                    client_id,
                    pack: doc.create_change_pack(),
                },
                CancellationToken::new(),
            )
            .await?;
        doc.apply_change_pack(&response.pack)?;
        Ok(())
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}
