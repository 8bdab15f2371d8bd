use api::LvLayout;
use serde::Deserialize;
use std::str::FromStr;

use super::{
    cli::{de, LvmCmd},
    error::Error,
};

/// Value of the lv_device_open report field for an open (mounted/attached)
/// logical volume.
pub(crate) const LV_DEVICE_OPEN: &str = "open";

/// Used to decode the json output of the lvs command.
#[derive(Debug, Deserialize)]
struct LogicalVolumes {
    /// Corresponds to the lv field in json output.
    lv: Vec<LogicalVolume>,
}

/// An LVM Logical Volume.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LogicalVolume {
    /// Corresponds to the lv_name field in json output.
    #[serde(rename = "lv_name")]
    pub name: String,
    /// Corresponds to the vg_name field in json output.
    #[serde(rename = "vg_name")]
    pub vg_name: String,
    /// Corresponds to the lv_path field in json output, the device path.
    #[serde(rename = "lv_path")]
    pub dev_path: String,
    /// Corresponds to the lv_size field in json output, in bytes.
    #[serde(deserialize_with = "de::number_from_string", rename = "lv_size")]
    pub size: u64,
    /// Corresponds to the lv_layout field in json output: "linear",
    /// "striped", "thin,pool" or "thin,sparse".
    #[serde(rename = "lv_layout")]
    pub layout: String,
    /// Corresponds to the lv_attr field in json output.
    #[serde(rename = "lv_attr")]
    pub attr: String,
    /// Corresponds to the lv_device_open field: "open" or empty.
    #[serde(rename = "lv_device_open")]
    pub device_open: String,
    /// Corresponds to the origin field, the source volume of a snapshot.
    #[serde(rename = "origin")]
    pub origin: String,
    /// Thin pool data usage in percent, as reported ("12.34" or empty).
    #[serde(rename = "data_percent")]
    pub data_percent: String,
    /// Thin pool metadata usage in percent, as reported.
    #[serde(rename = "metadata_percent")]
    pub metadata_percent: String,
}

impl LogicalVolume {
    /// List all the logical volumes within the given volume group.
    pub(crate) async fn list(vg_name: &str) -> Result<Vec<Self>, Error> {
        super::is_alphanumeric("vg_name", vg_name)?;
        let args = vec![
            "--units=b".to_string(),
            "--nosuffix".to_string(),
            "-q".to_string(),
            "--options=lv_name,vg_name,lv_path,lv_size,lv_layout,lv_attr,\
             lv_device_open,origin,data_percent,metadata_percent"
                .to_string(),
            "--report-format=json".to_string(),
            format!("--select=vg_name={vg_name}"),
        ];
        let report: LogicalVolumes =
            LvmCmd::lv_list().args(args.as_slice()).report().await?;

        Ok(report.lv)
    }

    /// The typed allocation layout of this volume.
    pub fn lv_layout(&self) -> LvLayout {
        LvLayout::from_str(&self.layout).unwrap_or_default()
    }

    /// Whether any consumer currently holds the device open.
    pub fn is_open(&self) -> bool {
        self.device_open == LV_DEVICE_OPEN
    }

    /// Thin pool data usage as a fraction in [0, 1].
    pub fn data_used_rate(&self) -> f64 {
        self.data_percent.parse::<f64>().unwrap_or(0.0) / 100.0
    }

    /// Thin pool metadata usage as a fraction in [0, 1].
    pub fn metadata_used_rate(&self) -> f64 {
        self.metadata_percent.parse::<f64>().unwrap_or(0.0) / 100.0
    }
}
