//! Integration tests for watch streams: initialization peers, change
//! notifications, and watched/unwatched events.

mod common;

use std::time::Duration;

use common::TestAgent;
use scribe_crdt::Document;
use scribe_proto::{DocEventKind, WatchDocumentsRequest, WatchStreamItem};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_change_event_reaches_watcher() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("watcher").await.expect("activate c1");
    let c2 = agent.activate("editor").await.expect("activate c2");

    let mut d1 = Document::new("watched-doc");
    let mut d2 = Document::new("watched-doc");
    agent.attach(c1, &mut d1).await.expect("attach d1");
    agent.attach(c2, &mut d2).await.expect("attach d2");

    let mut stream = agent
        .service
        .watch_documents(
            WatchDocumentsRequest {
                client_id: c1,
                document_keys: vec!["watched-doc".to_string()],
            },
            CancellationToken::new(),
        )
        .await
        .expect("watch");

    // First frame is the initialization peers map.
    let first = timeout(RECV_TIMEOUT, stream.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    match first {
        WatchStreamItem::Initialization { peers_by_doc } => {
            assert!(peers_by_doc.contains_key("watched-doc"));
        }
        other => panic!("expected initialization frame, got {other:?}"),
    }

    // c2 pushes a change; c1's stream must carry the event for the doc.
    d2.update(|root| root.set("key", "value"), None).unwrap();
    agent.sync(c2, &mut d2).await.expect("sync d2");

    let frame = timeout(RECV_TIMEOUT, stream.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    match frame {
        WatchStreamItem::Event(event) => {
            assert_eq!(event.kind, DocEventKind::DocumentChanged);
            assert_eq!(event.document_key, "watched-doc");
            assert_eq!(event.publisher, c2);
        }
        other => panic!("expected change event, got {other:?}"),
    }

    // Pulling after the event converges the watcher.
    agent.sync(c1, &mut d1).await.expect("sync d1");
    assert_eq!(d1.marshal(), d2.marshal());
}

#[tokio::test]
async fn test_watched_and_unwatched_events() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("observer").await.expect("activate c1");
    let c2 = agent.activate("peer").await.expect("activate c2");

    let mut stream1 = agent
        .service
        .watch_documents(
            WatchDocumentsRequest {
                client_id: c1,
                document_keys: vec!["presence-doc".to_string()],
            },
            CancellationToken::new(),
        )
        .await
        .expect("watch c1");
    let first = timeout(RECV_TIMEOUT, stream1.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    assert!(matches!(first, WatchStreamItem::Initialization { .. }));

    // A second watcher appears...
    let cancel2 = CancellationToken::new();
    let mut stream2 = agent
        .service
        .watch_documents(
            WatchDocumentsRequest {
                client_id: c2,
                document_keys: vec!["presence-doc".to_string()],
            },
            cancel2.clone(),
        )
        .await
        .expect("watch c2");

    let frame = timeout(RECV_TIMEOUT, stream1.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    match frame {
        WatchStreamItem::Event(event) => {
            assert_eq!(event.kind, DocEventKind::DocumentsWatched);
            assert_eq!(event.publisher, c2);
        }
        other => panic!("expected watched event, got {other:?}"),
    }

    // Its initialization lists the first watcher as a peer.
    let init2 = timeout(RECV_TIMEOUT, stream2.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    match init2 {
        WatchStreamItem::Initialization { peers_by_doc } => {
            assert_eq!(peers_by_doc["presence-doc"], vec![c1]);
        }
        other => panic!("expected initialization frame, got {other:?}"),
    }

    // ...and cancelling its stream publishes the unwatched event.
    cancel2.cancel();
    let frame = timeout(RECV_TIMEOUT, stream1.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    match frame {
        WatchStreamItem::Event(event) => {
            assert_eq!(event.kind, DocEventKind::DocumentsUnwatched);
            assert_eq!(event.publisher, c2);
        }
        other => panic!("expected unwatched event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_watch_requires_known_client() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let ghost = scribe_crdt::ActorId::from_bytes([7; scribe_crdt::ACTOR_ID_LEN]);

    let result = agent
        .service
        .watch_documents(
            WatchDocumentsRequest {
                client_id: ghost,
                document_keys: vec!["any-doc".to_string()],
            },
            CancellationToken::new(),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_publisher_does_not_receive_own_event() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("self-watcher").await.expect("activate");

    let mut doc = Document::new("self-doc");
    agent.attach(c1, &mut doc).await.expect("attach");

    let mut stream = agent
        .service
        .watch_documents(
            WatchDocumentsRequest {
                client_id: c1,
                document_keys: vec!["self-doc".to_string()],
            },
            CancellationToken::new(),
        )
        .await
        .expect("watch");
    let first = timeout(RECV_TIMEOUT, stream.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    assert!(matches!(first, WatchStreamItem::Initialization { .. }));

    doc.update(|root| root.set("k", "v"), None).unwrap();
    agent.sync(c1, &mut doc).await.expect("sync");

    // No event should arrive for the client's own push.
    let silent = timeout(Duration::from_millis(300), stream.next()).await;
    assert!(silent.is_err(), "publisher received its own event");
}
