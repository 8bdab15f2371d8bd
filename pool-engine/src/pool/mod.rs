//! Storage pool provisioning on top of the node's backend: a kernel LVM
//! volume group or an SPDK logical volume store.

mod engine;
mod lvm_engine;
mod service;
mod spdk_engine;

pub use engine::{
    Capacity,
    CreateSnapshotRequest,
    CreateVolumeRequest,
    CreateVolumeResponse,
    Error,
    ExpandVolumeRequest,
    PoolEngine,
    StaticInfo,
    VolumeInfo,
};
pub use lvm_engine::{LvmPoolEngine, RESERVED_LVOL_PREFIX};
pub use service::{PoolBuilder, PoolService, SpdkWatcher};
pub use spdk_engine::SpdkLvsPoolEngine;
