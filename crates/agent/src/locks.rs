use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use debrief_core::domain::interview::SessionId;

/// Held for the duration of one mutation of a session.
pub type SessionGuard = OwnedMutexGuard<()>;

/// One async mutex per live session id. Entries are weak so a session nobody
/// is touching costs nothing; dead entries are pruned whenever the map is used.
#[derive(Default)]
pub struct SessionLocks {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the session lock only if it is free.
    pub fn try_acquire(&self, id: &SessionId) -> Option<SessionGuard> {
        self.slot(id).try_lock_owned().ok()
    }

    pub async fn acquire(&self, id: &SessionId) -> SessionGuard {
        self.slot(id).lock_owned().await
    }

    fn slot(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.retain(|_, slot| slot.strong_count() > 0);

        if let Some(existing) = slots.get(id.as_str()).and_then(Weak::upgrade) {
            return existing;
        }

        let slot = Arc::new(AsyncMutex::new(()));
        slots.insert(id.0.clone(), Arc::downgrade(&slot));
        slot
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
