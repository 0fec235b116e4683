use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::service::fingerprint::Fingerprint;

/// Serialises jobs that share a fingerprint.
///
/// Jobs with distinct fingerprints never contend. Entries disappear once the
/// last holder or waiter for a fingerprint is gone.
#[derive(Default, Clone)]
pub struct FingerprintLocks {
    inner: Arc<DashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Wait until no other job holds `fingerprint`, then hold it until the
    /// returned guard is dropped.
    pub async fn acquire(&self, fingerprint: &Fingerprint) -> FingerprintGuard {
        let slot = Arc::clone(
            self.inner
                .entry(fingerprint.clone())
                .or_default()
                .value(),
        );
        let guard = slot.lock_owned().await;
        FingerprintGuard {
            guard: Some(guard),
            fingerprint: fingerprint.clone(),
            locks: Arc::clone(&self.inner),
        }
    }

    /// Number of fingerprints currently held or awaited.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct FingerprintGuard {
    guard: Option<OwnedMutexGuard<()>>,
    fingerprint: Fingerprint,
    locks: Arc<DashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl Drop for FingerprintGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.fingerprint, |_, slot| Arc::strong_count(slot) == 1);
    }
}
