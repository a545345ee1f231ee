//! Shared helpers for the behavioral specs.

use rally_store::MemoryStore;
use std::sync::Arc;

/// One store shared by every "connection" in a spec.
pub fn shared_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
