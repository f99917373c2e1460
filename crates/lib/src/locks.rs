//! Keyed async locks: operations that target the same channel or chaincode run one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of target key to its lock. Entries nobody holds or waits on are pruned on the next acquire.
pub struct TargetLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for TargetLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`. The returned guard releases it on drop.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut g = self.inner.lock().await;
            g.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            g.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
