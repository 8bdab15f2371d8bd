use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Allocation layout of a kernel logical volume, as reported by `lvs` in the
/// `lv_layout` column.
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
pub enum LvLayout {
    #[default]
    #[strum(serialize = "")]
    #[serde(rename = "")]
    Unspecified,
    #[strum(serialize = "linear")]
    #[serde(rename = "linear")]
    Linear,
    #[strum(serialize = "striped")]
    #[serde(rename = "striped")]
    Striped,
    /// A thin pool LV, the backing store for thin volumes.
    #[strum(serialize = "thin,pool")]
    #[serde(rename = "thin,pool")]
    ThinPool,
    /// A thin volume carved out of a thin pool.
    #[strum(serialize = "thin,sparse")]
    #[serde(rename = "thin,sparse")]
    ThinSparse,
}

/// A kernel LVM logical volume.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelLvol {
    pub name: String,
    pub vg_name: String,
    pub dev_path: String,
    pub size_byte: u64,
    pub lv_layout: LvLayout,
}

/// Aggregate metadata of a kernel LVM volume group backing a pool.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelLvm {
    pub name: String,
    pub vg_uuid: String,
    /// Total capacity of the volume group in bytes.
    pub bytes: u64,
    /// Number of physical volumes, also used as the stripe width.
    pub pv_count: u32,
    pub extent_size: u64,
    pub extent_count: u64,
    /// Volumes excluded from allocatable capacity (name prefix convention).
    #[serde(default)]
    pub reserved_lvol: Vec<KernelLvol>,
}

/// An SPDK logical volume.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpdkLvol {
    pub name: String,
    pub lvs_name: String,
    /// Thin provisioning is not supported for SPDK lvols.
    pub thin: bool,
}

/// Metadata of an SPDK logical volume store backing a pool.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpdkLvStore {
    pub name: String,
    pub uuid: String,
    pub base_bdev: String,
    pub cluster_size: u64,
    pub total_data_cluster: u64,
    pub block_size: u64,
    /// Total capacity: cluster_size * total_data_cluster.
    pub bytes: u64,
}
