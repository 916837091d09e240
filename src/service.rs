//! The agent's typed request surface.
//!
//! One method per RPC; the wire transport that carries them is wired up
//! outside this crate. Handlers run behind a recovery layer that turns
//! panics into internal errors (locks release on unwind), and every request
//! carries a cancellation token checked at I/O boundaries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scribe_crdt::ChangePack;
use scribe_proto::{
    ActivateClientRequest, ActivateClientResponse, AttachDocumentRequest, AttachDocumentResponse,
    DeactivateClientRequest, DeactivateClientResponse, DetachDocumentRequest,
    DetachDocumentResponse, DocEvent, DocEventKind, PushPullRequest, PushPullResponse,
    WatchDocumentsRequest, WatchStreamItem,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, LockGuard};
use crate::clients;
use crate::error::{ServiceError, ServiceResult};
use crate::packs;

/// How long a request waits on the per-document lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of a watch stream's outgoing frame queue.
const WATCH_STREAM_CAPACITY: usize = 32;

/// The document service: activate, deactivate, attach, detach, push-pull,
/// watch.
#[derive(Clone)]
pub struct DocumentService {
    backend: Arc<Backend>,
}

impl DocumentService {
    /// Create a service over the shared backend.
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    /// The shared backend, for tests and transport wiring.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Register a client identity.
    pub async fn activate_client(
        &self,
        request: ActivateClientRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<ActivateClientResponse> {
        let backend = Arc::clone(&self.backend);
        recover("activate_client", async move {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            let record = clients::activate(&backend, &request.client_key).await?;
            Ok(ActivateClientResponse {
                client_key: record.key,
                client_id: record.id,
            })
        })
        .await
    }

    /// Mark a client inactive; all attached documents are detached.
    pub async fn deactivate_client(
        &self,
        request: DeactivateClientRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<DeactivateClientResponse> {
        let backend = Arc::clone(&self.backend);
        recover("deactivate_client", async move {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            let record = clients::deactivate(&backend, request.client_id).await?;
            Ok(DeactivateClientResponse {
                client_id: record.id,
            })
        })
        .await
    }

    /// Add the document to the client's attachment set, then push-pull.
    pub async fn attach_document(
        &self,
        request: AttachDocumentRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<AttachDocumentResponse> {
        let backend = Arc::clone(&self.backend);
        recover("attach_document", async move {
            let _lock = lock_for_pack(&backend, &request.pack).await?;

            let (client, mut document) =
                clients::find_client_and_document(&backend, request.client_id, &request.pack, true)
                    .await?;
            backend.db.clients().attach(client.id, document.id).await?;

            let pack =
                packs::push_pull(&backend, &client, &mut document, &request.pack, &cancel).await?;
            Ok(AttachDocumentResponse { pack })
        })
        .await
    }

    /// Remove the attachment, then push-pull.
    pub async fn detach_document(
        &self,
        request: DetachDocumentRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<DetachDocumentResponse> {
        let backend = Arc::clone(&self.backend);
        recover("detach_document", async move {
            let _lock = lock_for_pack(&backend, &request.pack).await?;

            let (client, mut document) = clients::find_client_and_document(
                &backend,
                request.client_id,
                &request.pack,
                false,
            )
            .await?;
            backend.db.clients().detach(client.id, document.id).await?;
            let pack =
                packs::push_pull(&backend, &client, &mut document, &request.pack, &cancel).await?;

            Ok(DetachDocumentResponse { pack })
        })
        .await
    }

    /// Merge pushed changes, persist, notify, and return what the client has
    /// not seen.
    pub async fn push_pull(
        &self,
        request: PushPullRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<PushPullResponse> {
        let backend = Arc::clone(&self.backend);
        recover("push_pull", async move {
            let _lock = lock_for_pack(&backend, &request.pack).await?;

            let (client, mut document) = clients::find_client_and_document(
                &backend,
                request.client_id,
                &request.pack,
                false,
            )
            .await?;
            let pack =
                packs::push_pull(&backend, &client, &mut document, &request.pack, &cancel).await?;
            Ok(PushPullResponse { pack })
        })
        .await
    }

    /// Open a watch stream over a set of documents. The first frame lists
    /// the peers already watching each document; subsequent frames are
    /// events. Cancelling the token publishes the unwatched events and
    /// releases the subscription.
    pub async fn watch_documents(
        &self,
        request: WatchDocumentsRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<WatchStream> {
        if request.document_keys.is_empty() {
            return Err(ServiceError::InvalidArgument("empty document keys".into()));
        }

        let client = self
            .backend
            .db
            .clients()
            .find(request.client_id)
            .await?
            .ok_or_else(|| ServiceError::ClientNotFound(request.client_id.to_hex()))?;
        if !client.is_activated() {
            return Err(ServiceError::ClientNotActivated(request.client_id.to_hex()));
        }

        let topics = request.document_keys.clone();
        let (mut subscription, peers_by_doc) = self.backend.pubsub.subscribe(client.id, &topics);

        for topic in &topics {
            self.backend.pubsub.publish(
                client.id,
                topic,
                DocEvent::new(DocEventKind::DocumentsWatched, topic.clone(), client.id),
            );
        }

        let (tx, rx) = mpsc::channel(WATCH_STREAM_CAPACITY);
        let backend = Arc::clone(&self.backend);
        let stream_cancel = cancel.clone();
        crate::metrics::WATCH_STREAMS.inc();

        tokio::spawn(async move {
            let client_id = subscription.subscriber();

            if tx
                .send(WatchStreamItem::Initialization { peers_by_doc })
                .await
                .is_err()
            {
                release_watch(&backend, &subscription, client_id);
                return;
            }

            loop {
                tokio::select! {
                    _ = stream_cancel.cancelled() => break,
                    event = subscription.next_event() => {
                        let Some(event) = event else { break };
                        if tx.send(WatchStreamItem::Event(event)).await.is_err() {
                            // Consumer went away; tear the stream down.
                            break;
                        }
                    }
                }
            }

            release_watch(&backend, &subscription, client_id);
        });

        Ok(WatchStream { rx, cancel })
    }
}

/// Consumer side of a watch stream.
pub struct WatchStream {
    rx: mpsc::Receiver<WatchStreamItem>,
    cancel: CancellationToken,
}

impl WatchStream {
    /// Receive the next frame; `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<WatchStreamItem> {
        self.rx.recv().await
    }

    /// Cancel the stream; unwatched events are published before the
    /// subscription is released.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Publish the unwatched events and drop the subscription.
fn release_watch(
    backend: &Backend,
    subscription: &crate::backend::Subscription,
    client_id: scribe_crdt::ActorId,
) {
    for topic in subscription.topics() {
        backend.pubsub.publish(
            client_id,
            topic,
            DocEvent::new(DocEventKind::DocumentsUnwatched, topic.clone(), client_id),
        );
    }
    backend.pubsub.unsubscribe(subscription);
    crate::metrics::WATCH_STREAMS.dec();
}

/// Acquire the per-document push-pull lock, but only when the pack actually
/// carries changes; a pure pull needs no serialization.
async fn lock_for_pack(backend: &Backend, pack: &ChangePack) -> ServiceResult<Option<LockGuard>> {
    if !pack.has_changes() {
        return Ok(None);
    }
    let key = format!("pushpull-{}", pack.document_key());
    match backend.locks.acquire(&key, LOCK_TIMEOUT).await {
        Some(guard) => Ok(Some(guard)),
        None => Err(ServiceError::LockContention(key)),
    }
}

/// Run a handler inside a spawned task so a panic surfaces as an internal
/// error instead of tearing the caller down. Lock guards and subscriptions
/// release during unwind.
async fn recover<F, T>(method: &'static str, handler: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let result = match tokio::spawn(handler).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            tracing::error!(method = %method, "request handler panicked");
            Err(ServiceError::Internal(format!("{method} handler panicked")))
        }
        Err(_) => Err(ServiceError::Cancelled),
    };

    if let Err(error) = &result {
        crate::metrics::record_request_error(method, error.error_code());
        tracing::warn!(method = %method, error = %error, "request failed");
    }
    result
}
