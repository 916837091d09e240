//! Integration tests for the push-pull merge core: idempotent re-push,
//! checkpoint monotonicity, precondition errors and per-document
//! serialization.

mod common;

use common::TestAgent;
use scribe_crdt::{Change, Document};
use scribe_proto::PushPullRequest;
use scribed::error::ServiceError;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_resending_a_pack_is_a_no_op() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate");

    let mut doc = Document::new("idem-doc");
    agent.attach(c1, &mut doc).await.expect("attach");

    doc.update(|root| root.set("k", "v"), None).unwrap();
    let pack = doc.create_change_pack();

    let first = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: c1,
                pack: pack.clone(),
            },
            CancellationToken::new(),
        )
        .await
        .expect("first push");
    let after_first = first.pack.checkpoint();

    // Re-send the identical pack: nothing to pull, server seq unchanged.
    let second = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: c1,
                pack,
            },
            CancellationToken::new(),
        )
        .await
        .expect("second push");

    assert_eq!(second.pack.changes().len(), 0);
    assert_eq!(second.pack.checkpoint().server_seq(), after_first.server_seq());
    assert_eq!(second.pack.checkpoint().client_seq(), after_first.client_seq());
}

#[tokio::test]
async fn test_checkpoint_server_seq_is_non_decreasing() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate");

    let mut doc = Document::new("cp-doc");
    agent.attach(c1, &mut doc).await.expect("attach");

    let mut last = doc.checkpoint().server_seq();
    for i in 0..5 {
        doc.update(|root| root.set("n", i as i32), None).unwrap();
        agent.sync(c1, &mut doc).await.expect("sync");
        let current = doc.checkpoint().server_seq();
        assert!(current >= last);
        last = current;
    }
}

#[tokio::test]
async fn test_pull_never_includes_own_changes() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate");

    let mut doc = Document::new("own-doc");
    agent.attach(c1, &mut doc).await.expect("attach");

    doc.update(|root| root.set("k", "v"), None).unwrap();
    let response = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: c1,
                pack: doc.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await
        .expect("push");

    assert!(response.pack.changes().is_empty());
}

#[tokio::test]
async fn test_push_requires_attachment() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate");

    let mut doc = Document::new("unattached-doc");
    doc.set_actor(c1);
    doc.update(|root| root.set("k", "v"), None).unwrap();

    let result = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: c1,
                pack: doc.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(ServiceError::DocumentNotAttached(_)) => {}
        other => panic!("expected DocumentNotAttached, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_client_is_rejected() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let ghost = scribe_crdt::ActorId::from_bytes([9; scribe_crdt::ACTOR_ID_LEN]);

    let doc = Document::new("ghost-doc");
    let result = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: ghost,
                pack: doc.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(ServiceError::ClientNotFound(_)) => {}
        other => panic!("expected ClientNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deactivated_client_cannot_push() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate");

    let mut doc = Document::new("deact-doc");
    agent.attach(c1, &mut doc).await.expect("attach");

    agent
        .service
        .deactivate_client(
            scribe_proto::DeactivateClientRequest { client_id: c1 },
            CancellationToken::new(),
        )
        .await
        .expect("deactivate");

    doc.update(|root| root.set("k", "v"), None).unwrap();
    let result = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: c1,
                pack: doc.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(ServiceError::ClientNotActivated(_)) => {}
        other => panic!("expected ClientNotActivated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_pushes_assign_contiguous_server_seqs() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    const WRITERS: usize = 6;

    // Each writer attaches its own replica and pushes one change,
    // concurrently against the same document.
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let service = agent.service.clone();
        let client = agent
            .activate(&format!("writer-{i}"))
            .await
            .expect("activate");
        handles.push(tokio::spawn(async move {
            let mut doc = Document::new("contended-doc");
            doc.set_actor(client);
            doc.update(|root| root.set(&format!("k{i}"), i as i32), None)
                .unwrap();
            let response = service
                .attach_document(
                    scribe_proto::AttachDocumentRequest {
                        client_id: client,
                        pack: doc.create_change_pack(),
                    },
                    CancellationToken::new(),
                )
                .await
                .expect("attach+push");
            doc.apply_change_pack(&response.pack).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // A reader attaching afterwards pulls every change; the assigned server
    // sequences must form the contiguous range 1..=WRITERS.
    let reader = agent.activate("reader").await.expect("activate reader");
    let mut doc = Document::new("contended-doc");
    doc.set_actor(reader);
    let response = agent
        .service
        .attach_document(
            scribe_proto::AttachDocumentRequest {
                client_id: reader,
                pack: doc.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await
        .expect("reader attach");

    let mut seqs: Vec<u64> = response
        .pack
        .changes()
        .iter()
        .filter_map(Change::server_seq)
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=WRITERS as u64).collect::<Vec<_>>());

    doc.apply_change_pack(&response.pack).unwrap();
    assert_eq!(doc.marshal().as_object().unwrap().len(), WRITERS);
}
