//! Logical Volume Manager (LVM) is a device mapper framework that provides
//! logical volume management for the Linux kernel.
//!  - PV (Physical Volume) is any block device that is configured to be used
//!    by lvm i.e. formatted with the lvm2_member filesystem. Commands
//!    available
//!       - pvcreate -> to create a physical volume out of any block device
//!  - VG (Volume Group) is a collection of PVs that is used as a store to
//!    provision volumes. Commands available
//!       - vgcreate -> to create a volume group with a specific name and
//!         mentioned physical volumes
//!       - vgs -> to list the VGs with their attributes
//!  - LV (Logical Volume) is a block device carved out of VG. Commands
//!    available
//!       - lvcreate -> to create a linear, striped, thin or snapshot volume
//!       - lvresize -> to grow a logical volume by a byte delta
//!       - lvconvert -> among others, to merge a snapshot into its origin
//!       - lvs -> to list the logical volumes with their attributes
//!       - lvremove -> removes the logical volume

/// Helps run LVM commands and decode their json output and reports.
mod cli;
mod error;
/// Logical Volume listing and typed report fields.
mod lv;
/// Volume Group listing and creation.
mod vg;

use async_trait::async_trait;
use cli::LvmCmd;

/// Errors encountered whilst interacting with the LVM module.
pub use error::Error;

pub use lv::LogicalVolume;
pub use vg::VolumeGroup;

/// Validate a value used inside an LVM --select query.
pub(crate) fn is_alphanumeric(field: &str, value: &str) -> Result<(), Error> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(Error::NotAlphanumeric {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// The volume group and logical volume operations the pool engine consumes.
/// A seam over the lvm binaries so engines can be exercised against an
/// in-memory backend.
#[async_trait]
pub trait LvmOps: Send + Sync {
    async fn list_vgs(&self) -> Result<Vec<VolumeGroup>, Error>;
    async fn list_lvs(&self, vg: &str) -> Result<Vec<LogicalVolume>, Error>;
    async fn create_vg(
        &self,
        name: &str,
        disks: &[String],
    ) -> Result<VolumeGroup, Error>;
    async fn create_linear_lv(
        &self,
        vg: &str,
        name: &str,
        size: u64,
    ) -> Result<(), Error>;
    async fn create_striped_lv(
        &self,
        vg: &str,
        name: &str,
        size: u64,
        stripes: u32,
    ) -> Result<(), Error>;
    async fn create_thin_lv(
        &self,
        vg: &str,
        thin_pool: &str,
        name: &str,
        size: u64,
    ) -> Result<(), Error>;
    async fn remove_lv(&self, vg: &str, name: &str) -> Result<(), Error>;
    /// Grow (or shrink) vg/name by the given byte delta.
    async fn resize_lv(
        &self,
        vg: &str,
        name: &str,
        delta_byte: i64,
    ) -> Result<(), Error>;
    async fn create_linear_snapshot(
        &self,
        vg: &str,
        snap: &str,
        origin: &str,
        size: u64,
    ) -> Result<(), Error>;
    async fn create_striped_snapshot(
        &self,
        vg: &str,
        snap: &str,
        origin: &str,
        size: u64,
        stripes: u32,
    ) -> Result<(), Error>;
    /// Merge the snapshot back into its origin volume.
    async fn merge_snapshot(&self, vg: &str, snap: &str) -> Result<(), Error>;
}

/// Production `LvmOps` backed by the lvm2 command line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct LvmCli;

#[async_trait]
impl LvmOps for LvmCli {
    async fn list_vgs(&self) -> Result<Vec<VolumeGroup>, Error> {
        VolumeGroup::list(None).await
    }

    async fn list_lvs(&self, vg: &str) -> Result<Vec<LogicalVolume>, Error> {
        LogicalVolume::list(vg).await
    }

    async fn create_vg(
        &self,
        name: &str,
        disks: &[String],
    ) -> Result<VolumeGroup, Error> {
        VolumeGroup::create(name, disks).await
    }

    async fn create_linear_lv(
        &self,
        vg: &str,
        name: &str,
        size: u64,
    ) -> Result<(), Error> {
        LvmCmd::lv_create()
            .arg(format!("-L{size}b"))
            .args(["-n", name])
            .arg("-y")
            .arg(vg)
            .run()
            .await
    }

    async fn create_striped_lv(
        &self,
        vg: &str,
        name: &str,
        size: u64,
        stripes: u32,
    ) -> Result<(), Error> {
        LvmCmd::lv_create()
            .arg(format!("-L{size}b"))
            .args(["-n", name])
            .arg(format!("-i{stripes}"))
            .arg("-y")
            .arg(vg)
            .run()
            .await
    }

    async fn create_thin_lv(
        &self,
        vg: &str,
        thin_pool: &str,
        name: &str,
        size: u64,
    ) -> Result<(), Error> {
        LvmCmd::lv_create()
            .arg(format!("-V{size}b"))
            .arg("--thin")
            .args(["-n", name])
            .arg("-y")
            .arg(format!("{vg}/{thin_pool}"))
            .run()
            .await
    }

    async fn remove_lv(&self, vg: &str, name: &str) -> Result<(), Error> {
        LvmCmd::lv_remove()
            .arg("-y")
            .arg(format!("{vg}/{name}"))
            .run()
            .await
    }

    async fn resize_lv(
        &self,
        vg: &str,
        name: &str,
        delta_byte: i64,
    ) -> Result<(), Error> {
        LvmCmd::lv_resize()
            .arg(format!("-L{delta_byte:+}b"))
            .arg(format!("{vg}/{name}"))
            .run()
            .await
    }

    async fn create_linear_snapshot(
        &self,
        vg: &str,
        snap: &str,
        origin: &str,
        size: u64,
    ) -> Result<(), Error> {
        LvmCmd::lv_create()
            .arg("-s")
            .args(["-n", snap])
            .arg(format!("-L{size}b"))
            .arg("-y")
            .arg(format!("{vg}/{origin}"))
            .run()
            .await
    }

    async fn create_striped_snapshot(
        &self,
        vg: &str,
        snap: &str,
        origin: &str,
        size: u64,
        stripes: u32,
    ) -> Result<(), Error> {
        LvmCmd::lv_create()
            .arg("-s")
            .args(["-n", snap])
            .arg(format!("-L{size}b"))
            .arg(format!("-i{stripes}"))
            .arg("-y")
            .arg(format!("{vg}/{origin}"))
            .run()
            .await
    }

    async fn merge_snapshot(&self, vg: &str, snap: &str) -> Result<(), Error> {
        LvmCmd::lv_convert()
            .arg("--merge")
            .arg(format!("{vg}/{snap}"))
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_values_are_validated() {
        assert!(is_alphanumeric("vg_name", "vg-0.local_1").is_ok());
        assert!(is_alphanumeric("vg_name", "").is_err());
        assert!(is_alphanumeric("vg_name", "vg0; rm -rf /").is_err());
    }
}
