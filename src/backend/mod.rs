//! Shared agent state: store handle, per-document locks and the
//! subscription bus.

mod lock;
mod pubsub;

pub use lock::{LockGuard, LockMap};
pub use pubsub::{PubSub, Subscription};

use crate::config::BackendConfig;
use crate::db::Database;

/// Everything a request handler needs, shared across all requests.
pub struct Backend {
    /// Merge-core tuning.
    pub config: BackendConfig,
    /// Persistent store.
    pub db: Database,
    /// Named mutexes serializing push-pull per document.
    pub locks: LockMap,
    /// Per-document event fan-out.
    pub pubsub: PubSub,
}

impl Backend {
    /// Create a backend over an opened store.
    pub fn new(config: BackendConfig, db: Database) -> Self {
        Self {
            config,
            db,
            locks: LockMap::new(),
            pubsub: PubSub::new(),
        }
    }
}
