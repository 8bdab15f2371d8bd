//! The capability contract shared by the two pool backends.

use api::{KernelLvm, KernelLvol, LvLayout, SpdkLvStore, SpdkLvol};
use async_trait::async_trait;
use snafu::Snafu;

/// Errors surfaced by pool engine operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Pool {pool} not found"))]
    PoolNotFound { pool: String },
    #[snafu(display("Volume {name} not found"))]
    VolumeNotFound { name: String },
    #[snafu(display(
        "Volume {name} exists with size {actual}, but {requested} was \
         requested"
    ))]
    SizeMismatch {
        name: String,
        actual: u64,
        requested: u64,
    },
    #[snafu(display("{operation} is not supported by this pool backend"))]
    Unsupported { operation: String },
    #[snafu(display("{name} is not a snapshot, it has no origin volume"))]
    NotASnapshot { name: String },
    #[snafu(display(
        "Origin volume {origin} of snapshot {snapshot} is open"
    ))]
    OriginOpen { snapshot: String, origin: String },
    #[snafu(display("Unsupported LV layout {layout}"))]
    UnknownLayout { layout: String },
    #[snafu(display("The SPDK target is unavailable"))]
    BackendUnavailable {},
    #[snafu(display("LVM backend error: {source}"))]
    Lvm { source: crate::lvm::Error },
    #[snafu(display("SPDK backend error: {source}"))]
    Spdk { source: crate::spdk::Error },
}

/// Static pool metadata probed from the backend. Exactly one field is
/// populated, matching the engine variant which produced it.
#[derive(Debug, Default, Clone)]
pub struct StaticInfo {
    pub lvm: Option<KernelLvm>,
    pub lvs: Option<SpdkLvStore>,
}

/// Capacity figures, computed fresh from the backend on every call.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Capacity {
    pub total: u64,
    pub free: u64,
    /// Equals `free` unless thin provisioning is enabled.
    pub virtual_free: u64,
    pub data_used_pct: f64,
    pub metadata_used_pct: f64,
}

#[derive(Debug, Default, Clone)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub size_byte: u64,
    /// Filesystem the caller intends to format with. The engine only
    /// threads it through; formatting is the node publish layer's business.
    pub fs_type: Option<String>,
    /// Requested layout. `Unspecified` lets the engine pick.
    pub layout: LvLayout,
}

#[derive(Debug, Default, Clone)]
pub struct CreateVolumeResponse {
    /// for SPDK lvols
    pub uuid: String,
    /// for kernel LVM volumes
    pub dev_path: String,
}

#[derive(Debug, Default, Clone)]
pub struct CreateSnapshotRequest {
    pub snapshot_name: String,
    pub origin_name: String,
    pub size_byte: u64,
}

#[derive(Debug, Default, Clone)]
pub struct ExpandVolumeRequest {
    pub name: String,
    pub target_size: u64,
    pub origin_size: u64,
}

/// A volume as reported by an engine.
#[derive(Debug, Clone)]
pub enum VolumeInfo {
    Lvm(KernelLvol),
    Spdk { lvol: SpdkLvol, size_byte: u64 },
}

impl VolumeInfo {
    pub fn size_byte(&self) -> u64 {
        match self {
            VolumeInfo::Lvm(lvol) => lvol.size_byte,
            VolumeInfo::Spdk {
                size_byte, ..
            } => *size_byte,
        }
    }
}

/// One uniform volume lifecycle over two physically different backends.
/// The variant is selected once at startup from the pooling configuration.
#[async_trait]
pub trait PoolEngine: Send + Sync {
    /// Probe the backend for the named pool.
    async fn pool_info(&self, name: &str) -> Result<StaticInfo, Error>;
    /// Compute total/free/virtual-free, always fresh from the backend.
    async fn total_and_free_size(&self) -> Result<Capacity, Error>;
    /// Create a volume. Idempotent: an existing volume of equal size is a
    /// success, an existing volume of a different size a `SizeMismatch`.
    async fn create_volume(
        &self,
        request: CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse, Error>;
    /// Delete a volume. Deleting an absent volume is a success.
    async fn delete_volume(&self, name: &str) -> Result<(), Error>;
    /// Get a volume; absence is `None`, not an error.
    async fn get_volume(&self, name: &str)
        -> Result<Option<VolumeInfo>, Error>;
    /// Snapshot a volume, with the same idempotency rule as create_volume.
    async fn create_snapshot(
        &self,
        request: CreateSnapshotRequest,
    ) -> Result<(), Error>;
    /// Merge a snapshot back into its origin volume, in place.
    async fn restore_snapshot(&self, snapshot_name: &str) -> Result<(), Error>;
    /// Grow a volume to the target size; a no-op when already big enough.
    async fn expand_volume(
        &self,
        request: ExpandVolumeRequest,
    ) -> Result<(), Error>;
}
