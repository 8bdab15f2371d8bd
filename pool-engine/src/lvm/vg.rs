use serde::Deserialize;

use super::{
    cli::{de, LvmCmd},
    error::Error,
};

/// Used to decode the json output of the vgs command.
#[derive(Debug, Deserialize)]
struct VolGroups {
    /// Corresponds to the vg field in json output.
    vg: Vec<VolumeGroup>,
}

/// An LVM Volume Group.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct VolumeGroup {
    /// Corresponds to the vg_name field in json output, the name of the
    /// volume group.
    #[serde(rename = "vg_name")]
    pub name: String,
    /// Corresponds to the vg_uuid field in json output, the uuid of the
    /// volume group.
    #[serde(rename = "vg_uuid")]
    pub uuid: String,
    /// Corresponds to the vg_size field in json output, the total capacity of
    /// volume group in bytes.
    #[serde(deserialize_with = "de::number_from_string", rename = "vg_size")]
    pub size: u64,
    /// Corresponds to the vg_free field in json output, the free space on
    /// volume group in bytes.
    #[serde(deserialize_with = "de::number_from_string", rename = "vg_free")]
    pub free: u64,
    /// Corresponds to the pv_count field in json output, the number of
    /// physical volumes backing the volume group.
    #[serde(deserialize_with = "de::number_from_string", rename = "pv_count")]
    pub pv_count: u32,
    /// Corresponds to the vg_extent_size field in json output.
    #[serde(
        deserialize_with = "de::number_from_string",
        rename = "vg_extent_size"
    )]
    pub extent_size: u64,
    /// Corresponds to the vg_extent_count field in json output.
    #[serde(
        deserialize_with = "de::number_from_string",
        rename = "vg_extent_count"
    )]
    pub extent_count: u64,
}

impl VolumeGroup {
    /// Lookup a single volume group by name.
    pub(crate) async fn lookup(name: &str) -> Result<Self, Error> {
        let vgs = Self::list(Some(name)).await?;
        vgs.into_iter().next().ok_or(Error::NotFound {
            query: format!("vg_name={name}"),
        })
    }

    /// List volume groups, optionally selecting by name.
    pub(crate) async fn list(
        name: Option<&str>,
    ) -> Result<Vec<VolumeGroup>, Error> {
        let mut args = vec![
            "--units=b".to_string(),
            "--nosuffix".to_string(),
            "-q".to_string(),
            "--options=vg_name,vg_uuid,vg_size,vg_free,pv_count,\
             vg_extent_size,vg_extent_count"
                .to_string(),
            "--report-format=json".to_string(),
        ];
        if let Some(name) = name {
            super::is_alphanumeric("vg_name", name)?;
            args.push(format!("--select=vg_name={name}"));
        }
        let report: VolGroups =
            LvmCmd::vg_list().args(args.as_slice()).report().await?;

        Ok(report.vg)
    }

    /// Create a volume group from the given disks, initialising them as
    /// physical volumes first.
    pub(crate) async fn create(
        name: &str,
        disks: &[String],
    ) -> Result<VolumeGroup, Error> {
        LvmCmd::pv_create().args(disks).run().await?;
        LvmCmd::vg_create().arg(name).args(disks).run().await?;

        let vg = Self::lookup(name).await?;
        info!("The lvm vg pool '{}' has been created", vg.name);
        Ok(vg)
    }
}
