//! Per-owner mutual exclusion.
//!
//! Two simultaneous mutations of the same owner (say, two replace-primary
//! calls) would otherwise race: last row write wins while both cleanup
//! passes chase old blob paths, under-deleting or double-ledgering. The
//! registry hands out one async mutex per (kind, id) so same-owner
//! operations serialize; different owners never contend.
//!
//! This guards a single process. Multi-writer deployments still rely on
//! the in-transaction recheck against committed rows.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use keepsake_core::OwnerKind;

type LockKey = (OwnerKind, Uuid);

/// Registry of per-owner locks.
#[derive(Debug, Default)]
pub struct OwnerLockRegistry {
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl OwnerLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one owner, waiting if another operation on
    /// the same owner is in flight.
    pub async fn lock(&self, kind: OwnerKind, id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.locks.lock().await;
            // Drop locks nobody holds or waits on; the map stays bounded
            // by the number of in-flight operations.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                map.entry((kind, id))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        entry.lock_owned().await
    }

    /// Number of owners currently tracked (held or awaited locks).
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
