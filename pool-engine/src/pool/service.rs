//! Assembly of the node-local pool: backend bootstrap, the engine matching
//! the configured mode, and the SPDK target health watcher.

use api::{
    PoolMode,
    PoolStatus,
    StoragePool,
    StoragePoolSpec,
    StoragePoolStatus,
};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use super::engine::{Error, PoolEngine};
use crate::{
    config::StorageStack,
    lvm::{LvmCli, LvmOps},
    pool::{LvmPoolEngine, SpdkLvsPoolEngine},
    spdk::{SpdkOps, SpdkRpcClient},
};

/// How often the SPDK target liveness is re-checked.
const SPDK_HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// Periodic liveness tracking of the SPDK target. The last observed state
/// is shared with the schedulers via the pool report.
#[derive(Debug, Clone)]
pub struct SpdkWatcher {
    health: Arc<AtomicBool>,
}

impl SpdkWatcher {
    fn new(initial: bool) -> Self {
        Self {
            health: Arc::new(AtomicBool::new(initial)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.load(Ordering::Relaxed)
    }

    /// Start the background probe loop against the given target.
    pub fn spawn(&self, spdk: Arc<dyn SpdkOps>) {
        let health = self.health.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SPDK_HEALTH_CHECK_PERIOD);
            loop {
                ticker.tick().await;
                let alive = spdk.is_alive().await;
                if !alive && health.load(Ordering::Relaxed) {
                    warn!("SPDK target stopped answering liveness probes");
                }
                health.store(alive, Ordering::Relaxed);
            }
        });
    }
}

/// Builds a `PoolService` from the node's storage stack configuration.
#[derive(Default)]
pub struct PoolBuilder {
    stack: StorageStack,
    spdk: Option<Arc<dyn SpdkOps>>,
    engine: Option<Arc<dyn PoolEngine>>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, stack: StorageStack) -> Self {
        self.stack = stack;
        self
    }

    /// Override the SPDK target client, for tests.
    pub fn with_spdk(mut self, spdk: Arc<dyn SpdkOps>) -> Self {
        self.spdk = Some(spdk);
        self
    }

    /// Override the pool engine, for tests.
    pub fn with_engine(mut self, engine: Arc<dyn PoolEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn build(self) -> Result<PoolService, Error> {
        let mode = self.stack.pooling.mode;
        let spdk = self
            .spdk
            .unwrap_or_else(|| Arc::new(SpdkRpcClient::default()));

        let alive = spdk.is_alive().await;
        if !alive && mode == PoolMode::SpdkLvStore {
            // lvstore pools cannot run without their target
            return Err(Error::BackendUnavailable {});
        }
        let watcher = SpdkWatcher::new(alive);

        let engine: Arc<dyn PoolEngine> = match self.engine {
            Some(engine) => engine,
            None => match mode {
                PoolMode::KernelLvm => {
                    let lvm = LvmCli;
                    bootstrap_vg(&lvm, &self.stack).await?;
                    Arc::new(LvmPoolEngine::new(&self.stack.pooling, lvm))
                }
                PoolMode::SpdkLvStore => Arc::new(SpdkLvsPoolEngine::new(
                    self.stack.pooling.name.clone(),
                    spdk.clone(),
                )),
                PoolMode::Unknown => {
                    return Err(Error::Unsupported {
                        operation: "pooling mode Unknown".to_string(),
                    });
                }
            },
        };

        let info = engine.pool_info(&self.stack.pooling.name).await?;
        let capacity = engine.total_and_free_size().await?;

        let pool = StoragePool {
            name: self.stack.pooling.name.clone(),
            is_thin: self.stack.pooling.is_thin,
            overprovision_ratio: self.stack.pooling.ratio(),
            spec: StoragePoolSpec {
                kernel_lvm: info.lvm.unwrap_or_default(),
                spdk_lv_store: info.lvs.unwrap_or_default(),
            },
            status: StoragePoolStatus {
                status: PoolStatus::Ready,
                capacity_bytes: capacity.total as i64,
                vg_free_size: capacity.free as i64,
                vg_virtual_free_size: capacity.virtual_free as i64,
            },
            ..Default::default()
        };
        info!(
            "pool {} ready, total {} free {} virtual-free {}",
            pool.name, capacity.total, capacity.free, capacity.virtual_free
        );

        let service = PoolService {
            mode,
            pool: Mutex::new(pool),
            engine,
            spdk: spdk.clone(),
            watcher,
        };
        service.watcher.spawn(spdk);
        Ok(service)
    }
}

/// Create the volume group from the configured PVs when it does not exist
/// yet. A missing VG with no PVs configured is left to fail later, in
/// pool_info.
async fn bootstrap_vg<L: LvmOps>(
    lvm: &L,
    stack: &StorageStack,
) -> Result<(), Error> {
    let name = &stack.pooling.name;
    let exists = lvm
        .list_vgs()
        .await
        .map_err(|source| Error::Lvm { source })?
        .iter()
        .any(|vg| &vg.name == name);
    if exists {
        return Ok(());
    }

    let disks: Vec<String> = stack
        .pvs
        .iter()
        .filter(|pv| !pv.device_path.is_empty())
        .map(|pv| pv.device_path.clone())
        .collect();
    if disks.is_empty() {
        return Ok(());
    }

    info!("VG {} not found, creating it from {:?}", name, disks);
    lvm.create_vg(name, &disks)
        .await
        .map(|_| ())
        .map_err(|source| Error::Lvm { source })
}

/// The running pool of one node: its engine, its last reported state, and
/// the SPDK target handle.
pub struct PoolService {
    mode: PoolMode,
    pool: Mutex<StoragePool>,
    engine: Arc<dyn PoolEngine>,
    spdk: Arc<dyn SpdkOps>,
    watcher: SpdkWatcher,
}

impl PoolService {
    /// Build the service from a storage stack configuration.
    pub async fn new(stack: StorageStack) -> Result<Self, Error> {
        PoolBuilder::new().with_config(stack).build().await
    }

    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    pub fn pool(&self) -> StoragePool {
        self.pool.lock().clone()
    }

    pub fn engine(&self) -> Arc<dyn PoolEngine> {
        self.engine.clone()
    }

    pub fn spdk_healthy(&self) -> bool {
        self.watcher.is_healthy()
    }

    /// Re-read capacity from the backend and fold it into the pool report.
    pub async fn refresh_status(&self) -> Result<StoragePool, Error> {
        let capacity = self.engine.total_and_free_size().await?;
        let mut pool = self.pool.lock();
        pool.status.status = PoolStatus::Ready;
        pool.status.capacity_bytes = capacity.total as i64;
        pool.status.vg_free_size = capacity.free as i64;
        pool.status.vg_virtual_free_size = capacity.virtual_free as i64;
        Ok(pool.clone())
    }

    /// Expose a volume read-only through the SPDK target.
    pub async fn set_volume_read_only(&self, name: &str) -> Result<(), Error> {
        let full_name = format!("{}/{}", self.pool.lock().name, name);
        self.spdk
            .set_lvol_read_only(&full_name)
            .await
            .map_err(|source| Error::Spdk { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{LvmPv, Pooling},
        lvm::{Error as LvmError, LogicalVolume, VolumeGroup},
    };
    use async_trait::async_trait;

    const GIB: u64 = 1024 * 1024 * 1024;

    /// LvmOps fake for the bootstrap path. Only VG listing and creation
    /// are observed.
    #[derive(Debug, Default)]
    struct FakeLvm {
        vgs: Mutex<Vec<VolumeGroup>>,
        created: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl LvmOps for FakeLvm {
        async fn list_vgs(&self) -> Result<Vec<VolumeGroup>, LvmError> {
            Ok(self.vgs.lock().clone())
        }

        async fn list_lvs(
            &self,
            _vg: &str,
        ) -> Result<Vec<LogicalVolume>, LvmError> {
            Ok(vec![])
        }

        async fn create_vg(
            &self,
            name: &str,
            disks: &[String],
        ) -> Result<VolumeGroup, LvmError> {
            self.created
                .lock()
                .push((name.to_string(), disks.to_vec()));
            let vg = VolumeGroup {
                name: name.to_string(),
                size: 10 * GIB,
                free: 10 * GIB,
                pv_count: disks.len() as u32,
                ..Default::default()
            };
            self.vgs.lock().push(vg.clone());
            Ok(vg)
        }

        async fn create_linear_lv(
            &self,
            _vg: &str,
            _name: &str,
            _size: u64,
        ) -> Result<(), LvmError> {
            Ok(())
        }

        async fn create_striped_lv(
            &self,
            _vg: &str,
            _name: &str,
            _size: u64,
            _stripes: u32,
        ) -> Result<(), LvmError> {
            Ok(())
        }

        async fn create_thin_lv(
            &self,
            _vg: &str,
            _thin_pool: &str,
            _name: &str,
            _size: u64,
        ) -> Result<(), LvmError> {
            Ok(())
        }

        async fn remove_lv(&self, _vg: &str, _name: &str) -> Result<(), LvmError> {
            Ok(())
        }

        async fn resize_lv(
            &self,
            _vg: &str,
            _name: &str,
            _delta_byte: i64,
        ) -> Result<(), LvmError> {
            Ok(())
        }

        async fn create_linear_snapshot(
            &self,
            _vg: &str,
            _snap: &str,
            _origin: &str,
            _size: u64,
        ) -> Result<(), LvmError> {
            Ok(())
        }

        async fn create_striped_snapshot(
            &self,
            _vg: &str,
            _snap: &str,
            _origin: &str,
            _size: u64,
            _stripes: u32,
        ) -> Result<(), LvmError> {
            Ok(())
        }

        async fn merge_snapshot(
            &self,
            _vg: &str,
            _snap: &str,
        ) -> Result<(), LvmError> {
            Ok(())
        }
    }

    fn lvm_stack(pvs: Vec<LvmPv>) -> StorageStack {
        StorageStack {
            pooling: Pooling {
                mode: PoolMode::KernelLvm,
                name: "vg0".into(),
                overprovision_ratio: 1.0,
                ..Default::default()
            },
            pvs,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_creates_missing_vg_from_configured_pvs() {
        let lvm = FakeLvm::default();
        let stack = lvm_stack(vec![LvmPv {
            device_path: "/dev/sdb".into(),
            ..Default::default()
        }]);

        bootstrap_vg(&lvm, &stack).await.unwrap();
        assert_eq!(
            lvm.created.lock().clone(),
            vec![("vg0".to_string(), vec!["/dev/sdb".to_string()])]
        );

        // second run finds the VG and leaves it alone
        bootstrap_vg(&lvm, &stack).await.unwrap();
        assert_eq!(lvm.created.lock().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_without_pvs_is_a_noop() {
        let lvm = FakeLvm::default();
        bootstrap_vg(&lvm, &lvm_stack(vec![])).await.unwrap();
        assert!(lvm.created.lock().is_empty());
        assert!(lvm.vgs.lock().is_empty());
    }
}
