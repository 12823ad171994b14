use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::entities::UserId;

/// Slots are pruned once the table grows past this many entries.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Event(Uuid),
    User(UserId),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Event(id) => write!(f, "event {id}"),
            LockKey::User(id) => write!(f, "user {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is busy, retry")]
pub struct LockTimeout(pub LockKey);

/// Held for the duration of a read-check-commit section.
#[derive(Debug)]
pub struct EntityGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Per-entity async mutexes with a bounded wait.
///
/// Locks are always taken in the order event, then user.
#[derive(Debug)]
pub struct EntityLocks {
    slots: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
    wait: Duration,
}

impl EntityLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            wait,
        }
    }

    pub async fn acquire(&self, key: LockKey) -> Result<EntityGuard, LockTimeout> {
        let slot = {
            let mut slots = self.slots.lock().await;
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(key.clone()).or_default().clone()
        };
        match tokio::time::timeout(self.wait, slot.lock_owned()).await {
            Ok(guard) => Ok(EntityGuard { _guard: guard }),
            Err(_) => {
                tracing::debug!(%key, "Timed out waiting for entity lock");
                Err(LockTimeout(key))
            }
        }
    }
}
