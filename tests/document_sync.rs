//! Integration tests for document synchronization through the agent:
//! convergence of concurrent edits, LWW objects, counters and snapshots.

mod common;

use common::TestAgent;
use scribe_crdt::{CounterValue, Document};
use scribe_proto::{AttachDocumentRequest, PushPullRequest};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_concurrent_text_edits_converge() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate c1");
    let c2 = agent.activate("client-2").await.expect("activate c2");

    let mut d1 = Document::new("text-doc");
    let mut d2 = Document::new("text-doc");
    agent.attach(c1, &mut d1).await.expect("attach d1");
    agent.attach(c2, &mut d2).await.expect("attach d2");

    // c1 creates the text element and shares it.
    d1.update(|root| root.set_new_text("t").map(|_| ()), None)
        .unwrap();
    agent.sync(c1, &mut d1).await.expect("sync d1");
    agent.sync(c2, &mut d2).await.expect("sync d2");

    // Concurrent inserts at position 0.
    d1.update(|root| root.text("t")?.edit(0, 0, "hello"), None)
        .unwrap();
    d2.update(|root| root.text("t")?.edit(0, 0, "world"), None)
        .unwrap();

    agent.sync(c1, &mut d1).await.expect("sync d1");
    agent.sync(c2, &mut d2).await.expect("sync d2");
    agent.sync(c1, &mut d1).await.expect("sync d1");

    assert_eq!(d1.marshal(), d2.marshal());
    let text = d1.marshal()["t"].as_str().unwrap().to_string();
    assert_eq!(text.chars().count(), 10);
    assert!(text.contains("hello"));
    assert!(text.contains("world"));
}

#[tokio::test]
async fn test_object_lww_and_remove() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate c1");
    let c2 = agent.activate("client-2").await.expect("activate c2");

    let mut d1 = Document::new("object-doc");
    let mut d2 = Document::new("object-doc");
    agent.attach(c1, &mut d1).await.expect("attach d1");
    agent.attach(c2, &mut d2).await.expect("attach d2");

    // Concurrent sets on the same key.
    d1.update(|root| root.set("k", "1"), None).unwrap();
    d2.update(|root| root.set("k", "2"), None).unwrap();

    agent.sync(c1, &mut d1).await.expect("sync d1");
    agent.sync(c2, &mut d2).await.expect("sync d2");
    agent.sync(c1, &mut d1).await.expect("sync d1");

    // Both replicas agree on one winner.
    assert_eq!(d1.marshal(), d2.marshal());
    let winner = d1.marshal()["k"].as_str().unwrap().to_string();
    assert!(winner == "1" || winner == "2");

    // Removing the key tombstones the winning element everywhere.
    d1.update(|root| root.remove("k"), None).unwrap();
    agent.sync(c1, &mut d1).await.expect("sync d1");
    agent.sync(c2, &mut d2).await.expect("sync d2");

    assert_eq!(d1.marshal(), serde_json::json!({}));
    assert_eq!(d2.marshal(), serde_json::json!({}));
}

#[tokio::test]
async fn test_counter_sums_regardless_of_order() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate c1");
    let c2 = agent.activate("client-2").await.expect("activate c2");

    let mut d1 = Document::new("counter-doc");
    let mut d2 = Document::new("counter-doc");
    agent.attach(c1, &mut d1).await.expect("attach d1");
    agent.attach(c2, &mut d2).await.expect("attach d2");

    d1.update(
        |root| root.set_new_counter("n", CounterValue::Long(0)).map(|_| ()),
        None,
    )
    .unwrap();
    agent.sync(c1, &mut d1).await.expect("sync d1");
    agent.sync(c2, &mut d2).await.expect("sync d2");

    d1.update(|root| root.counter("n")?.increase(3i64), None).unwrap();
    d2.update(|root| root.counter("n")?.increase(5i64), None).unwrap();

    agent.sync(c1, &mut d1).await.expect("sync d1");
    agent.sync(c2, &mut d2).await.expect("sync d2");
    agent.sync(c1, &mut d1).await.expect("sync d1");

    assert_eq!(d1.marshal()["n"], 8);
    assert_eq!(d2.marshal()["n"], 8);
}

#[tokio::test]
async fn test_attach_detach_lifecycle() {
    let agent = TestAgent::start().await.expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate c1");

    let mut doc = Document::new("lifecycle-doc");
    doc.set_actor(c1);
    doc.update(|root| root.set("k1", "k1"), Some("update k1 with k1"))
        .unwrap();

    agent.attach(c1, &mut doc).await.expect("attach");
    assert!(doc.is_attached());
    assert!(!doc.has_local_changes());

    agent.detach(c1, &mut doc).await.expect("detach");
    assert!(!doc.is_attached());

    agent.attach(c1, &mut doc).await.expect("re-attach");
    assert!(doc.is_attached());
    assert_eq!(doc.marshal(), serde_json::json!({"k1": "k1"}));
}

#[tokio::test]
async fn test_late_joiner_catches_up_via_snapshot() {
    // Threshold 3: a dozen edits force snapshots on the server.
    let agent = TestAgent::start_with_threshold(3)
        .await
        .expect("agent failed to start");
    let c1 = agent.activate("client-1").await.expect("activate c1");
    let c2 = agent.activate("client-2").await.expect("activate c2");

    let mut d1 = Document::new("snap-doc");
    agent.attach(c1, &mut d1).await.expect("attach d1");

    d1.update(|root| root.set_new_text("t").map(|_| ()), None)
        .unwrap();
    agent.sync(c1, &mut d1).await.expect("sync");
    for i in 0..12 {
        let pos = d1.marshal()["t"].as_str().unwrap().chars().count();
        d1.update(|root| root.text("t")?.edit(pos, pos, &format!("{i:x}")), None)
            .unwrap();
        agent.sync(c1, &mut d1).await.expect("sync");
    }
    let expected = d1.marshal();

    // A fresh client attaches and must converge, snapshot or not.
    let mut d2 = Document::new("snap-doc");
    agent.attach(c2, &mut d2).await.expect("attach d2");
    agent.sync(c2, &mut d2).await.expect("sync d2");
    assert_eq!(d2.marshal(), expected);
}

#[tokio::test]
async fn test_unacked_edit_survives_snapshot_pull_and_snapshot_ships_once() {
    let agent = TestAgent::start_with_threshold(3)
        .await
        .expect("agent failed to start");
    let writer = agent.activate("snap-writer").await.expect("activate writer");
    let editor = agent.activate("snap-editor").await.expect("activate editor");
    let reader = agent.activate("snap-reader").await.expect("activate reader");

    let mut dw = Document::new("snap-race-doc");
    agent.attach(writer, &mut dw).await.expect("attach writer");
    let mut de = Document::new("snap-race-doc");
    agent.attach(editor, &mut de).await.expect("attach editor");

    // The editor pushes exactly two thresholds' worth of changes, so the
    // stored snapshot ends up covering the document tip.
    for i in 0..6 {
        de.update(|root| root.set(&format!("e{i}"), i as i32), None)
            .unwrap();
        agent.sync(editor, &mut de).await.expect("sync editor");
    }

    // The writer edits locally while far behind; the change stays un-acked.
    dw.update(|root| root.set("w", "writer-edit"), None).unwrap();

    // A fresh reader attaches: the gap is past the threshold, so the pull
    // carries the snapshot and an empty tail.
    let mut dr = Document::new("snap-race-doc");
    dr.set_actor(reader);
    let first = agent
        .service
        .attach_document(
            AttachDocumentRequest {
                client_id: reader,
                pack: dr.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await
        .expect("reader attach");
    assert!(first.pack.snapshot().is_some());
    assert!(first.pack.changes().is_empty());
    dr.apply_change_pack(&first.pack).unwrap();
    assert_eq!(dr.marshal()["e0"], 0);

    // A caught-up reader must not be sent the snapshot again: the next sync
    // pulls an empty pack with the checkpoint already at the tip.
    let second = agent
        .service
        .push_pull(
            PushPullRequest {
                client_id: reader,
                pack: dr.create_change_pack(),
            },
            CancellationToken::new(),
        )
        .await
        .expect("reader resync");
    assert!(second.pack.snapshot().is_none());
    assert!(second.pack.changes().is_empty());
    assert!(first.pack.checkpoint().server_seq() > 0);
    assert_eq!(
        second.pack.checkpoint().server_seq(),
        first.pack.checkpoint().server_seq()
    );

    // The writer now syncs: its pushed change is neither in the snapshot nor
    // in the own-excluded tail, yet it must survive in the writer's view.
    agent.sync(writer, &mut dw).await.expect("sync writer");
    assert_eq!(dw.marshal()["w"], "writer-edit");
    assert_eq!(dw.marshal()["e5"], 5);
    assert!(!dw.has_local_changes());

    // Everyone converges on the same state.
    agent.sync(editor, &mut de).await.expect("sync editor");
    assert_eq!(de.marshal(), dw.marshal());
}
