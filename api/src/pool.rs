use crate::volume::{KernelLvm, SpdkLvStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumString};

/// Label key used to lock a pool out of scheduling.
pub const POOL_SCHEDULING_STATUS_LABEL_KEY: &str =
    "local.storage/scheduling-status";

/// Storage backend of a pool.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
pub enum PoolMode {
    #[default]
    Unknown,
    #[strum(serialize = "KernelLVM")]
    #[serde(rename = "KernelLVM")]
    KernelLvm,
    #[strum(serialize = "SpdkLVStore")]
    #[serde(rename = "SpdkLVStore")]
    SpdkLvStore,
}

/// Lifecycle status of a pool.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
pub enum PoolStatus {
    #[default]
    Unknown,
    Ready,
    NotReady,
}

/// Values of `POOL_SCHEDULING_STATUS_LABEL_KEY`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString,
)]
pub enum PoolSchedulingStatus {
    Locked,
}

/// Static backend descriptors of a pool. Exactly one of the two is
/// populated; `StoragePool::mode` is derived from which one carries a name.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePoolSpec {
    #[serde(default)]
    pub kernel_lvm: KernelLvm,
    #[serde(default)]
    pub spdk_lv_store: SpdkLvStore,
}

/// Capacity figures refreshed by the node agent. All values in bytes.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePoolStatus {
    pub status: PoolStatus,
    /// Reported pool capacity, a fallback when neither backend descriptor
    /// carries a size.
    pub capacity_bytes: i64,
    /// Physical free space, reserved volumes excluded.
    pub vg_free_size: i64,
    /// Overcommitted free space for thin pools.
    pub vg_virtual_free_size: i64,
}

/// The per-node pool descriptor shared between the node agent, the scheduler
/// and the CSI capacity tracker.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePool {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub is_thin: bool,
    pub overprovision_ratio: f64,
    pub spec: StoragePoolSpec,
    pub status: StoragePoolStatus,
}

impl StoragePool {
    /// Total space of the pool in bytes, including reserved volumes.
    pub fn vg_total_bytes(&self) -> i64 {
        if self.spec.kernel_lvm.bytes > 0 {
            return self.spec.kernel_lvm.bytes as i64;
        }
        if self.spec.spdk_lv_store.bytes > 0 {
            return self.spec.spdk_lv_store.bytes as i64;
        }
        self.status.capacity_bytes
    }

    /// The capacity reported through the pool status.
    pub fn storage_bytes(&self) -> i64 {
        self.status.capacity_bytes
    }

    /// Physical free space in bytes. Reserved volumes hold allocated space
    /// and are therefore already excluded.
    pub fn vg_free_bytes(&self) -> i64 {
        self.status.vg_free_size
    }

    /// Overcommitted free space in bytes, only meaningful for thin pools.
    pub fn vg_virtual_free_bytes(&self) -> i64 {
        self.status.vg_virtual_free_size
    }

    /// Effective free space: for thin pools the virtual free space may be
    /// exhausted before the physical one, so the minimum of both governs.
    pub fn free_bytes(&self) -> i64 {
        let mut free = self.vg_free_bytes();
        if self.is_thin {
            free = free.min(self.vg_virtual_free_bytes());
        }
        free
    }

    /// Total allocatable space: total minus the reserved volumes.
    pub fn available_bytes(&self) -> i64 {
        let mut size = self.vg_total_bytes();
        for lvol in &self.spec.kernel_lvm.reserved_lvol {
            size -= lvol.size_byte as i64;
        }
        size
    }

    /// A pool takes no new volumes when explicitly locked via label or when
    /// its status is not Ready.
    pub fn is_schedulable(&self) -> bool {
        let label_locked = self
            .labels
            .get(POOL_SCHEDULING_STATUS_LABEL_KEY)
            .map(|val| val == PoolSchedulingStatus::Locked.as_ref())
            .unwrap_or(false);
        let not_ready = self.status.status != PoolStatus::Ready;

        !label_locked && !not_ready
    }

    /// Backend mode, derived from which backend descriptor is populated.
    pub fn mode(&self) -> PoolMode {
        let mut mode = PoolMode::Unknown;
        if !self.spec.kernel_lvm.name.is_empty() {
            mode = PoolMode::KernelLvm;
        }
        if !self.spec.spdk_lv_store.name.is_empty() {
            mode = PoolMode::SpdkLvStore;
        }
        mode
    }
}
