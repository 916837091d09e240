//! Per-document event fan-out.
//!
//! Topics are document keys. Each subscription owns a bounded queue;
//! publishing never blocks the publisher, and a slow consumer whose queue is
//! full simply loses the event - it reconnects and catches up through
//! push-pull. Subscribers never receive events they published themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use scribe_crdt::ActorId;
use scribe_proto::DocEvent;
use tokio::sync::mpsc;

/// Capacity of one subscription's event queue.
const EVENT_QUEUE_CAPACITY: usize = 128;

struct Subscriber {
    actor: ActorId,
    tx: mpsc::Sender<DocEvent>,
}

/// A live subscription over a set of topics.
pub struct Subscription {
    id: u64,
    subscriber: ActorId,
    topics: Vec<String>,
    rx: mpsc::Receiver<DocEvent>,
}

impl Subscription {
    /// The subscribing client.
    pub fn subscriber(&self) -> ActorId {
        self.subscriber
    }

    /// Topics this subscription covers.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Receive the next event; `None` once unsubscribed and drained.
    pub async fn next_event(&mut self) -> Option<DocEvent> {
        self.rx.recv().await
    }
}

/// Multi-topic, multi-subscriber event bus.
#[derive(Clone, Default)]
pub struct PubSub {
    topics: Arc<DashMap<String, HashMap<u64, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl PubSub {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `actor` to `topics`. Returns the subscription and, per
    /// topic, the actors already subscribed (the "peers map").
    pub fn subscribe(
        &self,
        actor: ActorId,
        topics: &[String],
    ) -> (Subscription, HashMap<String, Vec<ActorId>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let mut peers_by_topic = HashMap::new();
        for topic in topics {
            let mut entry = self.topics.entry(topic.clone()).or_default();
            let peers: Vec<ActorId> = entry.values().map(|s| s.actor).collect();
            peers_by_topic.insert(topic.clone(), peers);
            entry.insert(
                id,
                Subscriber {
                    actor,
                    tx: tx.clone(),
                },
            );
        }

        (
            Subscription {
                id,
                subscriber: actor,
                topics: topics.to_vec(),
                rx,
            },
            peers_by_topic,
        )
    }

    /// Remove a subscription from its topics.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        for topic in &subscription.topics {
            if let Some(mut entry) = self.topics.get_mut(topic) {
                entry.remove(&subscription.id);
            }
            self.topics.remove_if(topic, |_, subs| subs.is_empty());
        }
    }

    /// Deliver `event` to every subscriber of `topic` except the publisher.
    /// Never blocks; full queues drop the event.
    pub fn publish(&self, publisher: ActorId, topic: &str, event: DocEvent) {
        let Some(entry) = self.topics.get(topic) else {
            return;
        };
        for subscriber in entry.values() {
            if subscriber.actor == publisher {
                continue;
            }
            if subscriber.tx.try_send(event.clone()).is_err() {
                crate::metrics::EVENTS_DROPPED.inc();
                tracing::warn!(
                    topic = %topic,
                    subscriber = %subscriber.actor,
                    "event queue full, dropping event"
                );
            }
        }
    }

    /// Actors currently subscribed to a topic.
    pub fn peers(&self, topic: &str) -> Vec<ActorId> {
        self.topics
            .get(topic)
            .map(|subs| subs.values().map(|s| s.actor).collect())
            .unwrap_or_default()
    }
}
