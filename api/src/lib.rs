//! Shared data model for the local storage stack: the per-node `StoragePool`
//! descriptor with its capacity accounting, and the backend specific logical
//! volume records it embeds.
//!
//! The pool descriptor is the one object shared between the node agent which
//! builds it, the scheduler which filters and scores against it, and the
//! CSI capacity tracker which caches it.

mod pool;
mod volume;

pub use pool::{
    PoolMode,
    PoolSchedulingStatus,
    PoolStatus,
    StoragePool,
    StoragePoolSpec,
    StoragePoolStatus,
    POOL_SCHEDULING_STATUS_LABEL_KEY,
};
pub use volume::{KernelLvm, KernelLvol, LvLayout, SpdkLvStore, SpdkLvol};

/// Annotation namespace owned by this storage stack. Pod/PVC annotations
/// carrying this prefix are propagated onto the scheduling volume demand.
pub const ANNOTATION_PREFIX: &str = "local.storage/";

/// PVC annotation holding extra bytes to reserve for future snapshots.
pub const PVC_ANNOTATION_SNAPSHOT_RESERVED_SIZE: &str =
    "local.storage/snapshot-reserved-size";

/// Provisioner name which marks a StorageClass as ours.
pub const PROVISIONER_NAME: &str = "local.storage/provisioner";

/// StorageClass parameter deciding volume placement.
pub const SC_PARAM_POSITION_ADVICE: &str = "positionAdvice";

/// `SC_PARAM_POSITION_ADVICE` value requiring pod and volume to share a node.
pub const POSITION_ADVICE_MUST_LOCAL: &str = "MustLocal";

/// StorageClass parameter selecting thin provisioned volumes.
pub const SC_PARAM_THIN_PROVISION: &str = "thinProvision";
