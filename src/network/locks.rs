use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Advisory per-filename locks shared by all sessions of one server.
///
/// Entries are held weakly, so a name's lock disappears once nobody holds or
/// waits for it.
#[derive(Debug, Clone, Default)]
pub struct NameLocks {
    inner: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `name` is free and hold it until the guard drops
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            table.retain(|_, weak| weak.strong_count() > 0);
            match table.get(name).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    table.insert(name.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of names currently locked or waited on
    pub fn active(&self) -> usize {
        let table = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
