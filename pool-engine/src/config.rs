//! Static storage stack configuration, supplied once at agent startup.
//!
//! Partial config options are supported i.e you do not have to fully
//! spell out the YAML spec for a given sub component. Serde will fill
//! in the default when missing, which are defined within the individual
//! options.

use api::PoolMode;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, fs, path::Path};

/// Default volume group name for kernel LVM pools.
pub const DEFAULT_LVM_NAME: &str = "localstor-vg";
/// Default lvstore name for SPDK pools.
pub const DEFAULT_LVS_NAME: &str = "localstor_lvstore";

/// Kind of SPDK bdev backing an lvstore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BdevType {
    #[serde(rename = "aioBdev")]
    Aio,
    #[serde(rename = "memBdev")]
    Malloc,
    #[serde(rename = "raidBdev")]
    Raid,
}

/// The full storage stack of one node.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageStack {
    pub pooling: Pooling,
    /// Physical volumes to assemble the volume group from, when it does not
    /// exist yet.
    pub pvs: Vec<LvmPv>,
    /// The bdev backing an SPDK lvstore.
    pub bdev: Option<SpdkBdev>,
}

/// Pool level settings.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pooling {
    pub mode: PoolMode,
    pub name: String,
    pub is_thin: bool,
    pub thin_pool_name: String,
    /// Multiplier applied to physical capacity for thin pools, >= 1.0.
    pub overprovision_ratio: f64,
}

/// A physical volume of the LVM pool.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LvmPv {
    /// Device path of the PV. If empty, a loop device is created from
    /// `file_path`.
    pub device_path: String,
    /// Size of the file backing a loop device PV.
    pub size: u64,
    pub file_path: String,
    pub create_if_not_exist: bool,
}

/// SPDK bdev settings backing an lvstore pool.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpdkBdev {
    #[serde(rename = "type")]
    pub bdev_type: Option<BdevType>,
    pub name: String,
    /// size in byte
    pub size: u64,
    /// for aioBdev
    pub file_path: String,
    pub create_if_not_exist: bool,
}

impl StorageStack {
    /// Load the storage stack configuration from a yaml file.
    pub fn load<P>(file: P) -> Result<StorageStack, serde_yaml::Error>
    where
        P: AsRef<Path> + Display,
    {
        let bytes = fs::read(&file).unwrap_or_default();

        if bytes.is_empty() {
            return Ok(StorageStack::default_lvm());
        }

        serde_yaml::from_slice(&bytes)
    }

    /// A kernel LVM stack with default naming.
    pub fn default_lvm() -> StorageStack {
        StorageStack {
            pooling: Pooling {
                mode: PoolMode::KernelLvm,
                name: DEFAULT_LVM_NAME.to_string(),
                overprovision_ratio: 1.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// An SPDK lvstore stack with default naming.
    pub fn default_lvs() -> StorageStack {
        StorageStack {
            pooling: Pooling {
                mode: PoolMode::SpdkLvStore,
                name: DEFAULT_LVS_NAME.to_string(),
                overprovision_ratio: 1.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl Pooling {
    /// The overprovision ratio, defaulting to no overcommit when left unset.
    pub fn ratio(&self) -> f64 {
        if self.overprovision_ratio < 1.0 {
            1.0
        } else {
            self.overprovision_ratio
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_yaml() {
        let yaml = r#"
pooling:
  mode: KernelLVM
  name: vg0
  isThin: true
  thinPoolName: thin0
  overprovisionRatio: 2.0
pvs:
  - devicePath: /dev/sdb
"#;
        let stack: StorageStack = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(stack.pooling.mode, PoolMode::KernelLvm);
        assert_eq!(stack.pooling.name, "vg0");
        assert!(stack.pooling.is_thin);
        assert_eq!(stack.pooling.thin_pool_name, "thin0");
        assert_eq!(stack.pooling.ratio(), 2.0);
        assert_eq!(stack.pvs.len(), 1);
        assert_eq!(stack.pvs[0].device_path, "/dev/sdb");
    }

    #[test]
    fn ratio_never_below_one() {
        let pooling = Pooling::default();
        assert_eq!(pooling.ratio(), 1.0);
    }
}
