//! Capacity reporting for the CSI controller. GetCapacity answers must not
//! hit the pool sources on every call, so a periodically refreshed cache
//! holds the last good capacity snapshot per pool.

#[macro_use]
extern crate tracing;

use api::StoragePool;
use async_trait::async_trait;
use parking_lot::RwLock;
use snafu::Snafu;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// How often the capacity snapshot is rebuilt.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("listing storage pools failed: {message}"))]
    ListPools { message: String },
}

/// Source of the cluster's pool reports.
#[async_trait]
pub trait StoragePoolLister: Send + Sync {
    async fn list(&self) -> Result<Vec<StoragePool>, Error>;
}

/// Capacity entry of one pool, as last observed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapacity {
    pub total: i64,
    pub free: i64,
    pub is_thin: bool,
}

/// The cached capacity snapshot. Refreshes replace the whole snapshot at
/// once; a failed refresh keeps the previous one, stale answers beat no
/// answers for capacity hints.
pub struct CapacityCache {
    lister: Arc<dyn StoragePoolLister>,
    pools: RwLock<HashMap<String, PoolCapacity>>,
}

impl CapacityCache {
    pub fn new(lister: Arc<dyn StoragePoolLister>) -> Arc<Self> {
        Arc::new(Self {
            lister,
            pools: RwLock::new(HashMap::new()),
        })
    }

    /// Rebuild the snapshot from the pool source.
    pub async fn update(&self) {
        let listed = match self.lister.list().await {
            Ok(listed) => listed,
            Err(error) => {
                warn!("capacity refresh failed, keeping snapshot: {error}");
                return;
            }
        };

        let snapshot: HashMap<String, PoolCapacity> = listed
            .iter()
            .map(|pool| {
                (
                    pool.name.clone(),
                    PoolCapacity {
                        total: pool.storage_bytes(),
                        free: pool.free_bytes(),
                        is_thin: pool.is_thin,
                    },
                )
            })
            .collect();
        debug!("capacity snapshot rebuilt, {} pool(s)", snapshot.len());
        *self.pools.write() = snapshot;
    }

    /// Start the periodic refresh loop.
    pub fn spawn_refresher(self: &Arc<Self>) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_PERIOD);
            loop {
                ticker.tick().await;
                cache.update().await;
            }
        });
    }

    /// Capacity of one pool, by pool name.
    pub fn get(&self, name: &str) -> Option<PoolCapacity> {
        self.pools.read().get(name).copied()
    }

    /// Free capacity summed over all known pools, the GetCapacity answer
    /// when no topology narrows the query down.
    pub fn total_free(&self) -> i64 {
        self.pools.read().values().map(|pool| pool.free).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{PoolStatus, StoragePoolStatus};
    use parking_lot::Mutex;

    const GIB: i64 = 1024 * 1024 * 1024;

    /// Lister answering from a mutable script: `None` entries fail.
    #[derive(Default)]
    struct FakeLister {
        answer: Mutex<Option<Vec<StoragePool>>>,
    }

    impl FakeLister {
        fn set(&self, pools: Option<Vec<StoragePool>>) {
            *self.answer.lock() = pools;
        }
    }

    #[async_trait]
    impl StoragePoolLister for FakeLister {
        async fn list(&self) -> Result<Vec<StoragePool>, Error> {
            self.answer.lock().clone().ok_or(Error::ListPools {
                message: "source down".to_string(),
            })
        }
    }

    fn pool(name: &str, total: i64, free: i64) -> StoragePool {
        StoragePool {
            name: name.into(),
            overprovision_ratio: 1.0,
            status: StoragePoolStatus {
                status: PoolStatus::Ready,
                capacity_bytes: total,
                vg_free_size: free,
                vg_virtual_free_size: free,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn refresh_replaces_the_snapshot_wholesale() {
        let lister = Arc::new(FakeLister::default());
        let cache = CapacityCache::new(lister.clone());

        lister.set(Some(vec![
            pool("node-1", 100 * GIB, 60 * GIB),
            pool("node-2", 100 * GIB, 40 * GIB),
        ]));
        cache.update().await;
        assert_eq!(cache.get("node-1").unwrap().free, 60 * GIB);
        assert_eq!(cache.total_free(), 100 * GIB);

        // node-2 disappeared: no leftovers survive the refresh
        lister.set(Some(vec![pool("node-1", 100 * GIB, 50 * GIB)]));
        cache.update().await;
        assert_eq!(cache.get("node-1").unwrap().free, 50 * GIB);
        assert!(cache.get("node-2").is_none());
        assert_eq!(cache.total_free(), 50 * GIB);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_snapshot() {
        let lister = Arc::new(FakeLister::default());
        let cache = CapacityCache::new(lister.clone());

        lister.set(Some(vec![pool("node-1", 100 * GIB, 60 * GIB)]));
        cache.update().await;

        lister.set(None);
        cache.update().await;
        assert_eq!(cache.get("node-1").unwrap().free, 60 * GIB);
        assert_eq!(cache.total_free(), 60 * GIB);
    }

    #[tokio::test]
    async fn thin_pools_report_effective_free_space() {
        let lister = Arc::new(FakeLister::default());
        let cache = CapacityCache::new(lister.clone());

        let mut thin = pool("node-1", 100 * GIB, 80 * GIB);
        thin.is_thin = true;
        thin.status.vg_virtual_free_size = 30 * GIB;
        lister.set(Some(vec![thin]));
        cache.update().await;

        let entry = cache.get("node-1").unwrap();
        assert!(entry.is_thin);
        assert_eq!(entry.free, 30 * GIB);
    }

    #[tokio::test]
    async fn empty_cache_answers_zero() {
        let cache = CapacityCache::new(Arc::new(FakeLister::default()));
        assert_eq!(cache.total_free(), 0);
        assert!(cache.get("node-1").is_none());
    }
}
