use crate::lvm::{error, error::Error};

use serde::de::Deserialize;
use snafu::ResultExt;
use std::ffi::OsStr;
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::process::Command;

/// The following commands implement the core LVM functionality.
#[derive(AsRefStr, EnumString, Display)]
enum LvmSubCmd {
    /// Initialize physical volume(s) for use by LVM.
    #[strum(serialize = "pvcreate")]
    PVCreate,
    /// Display information about volume groups.
    #[strum(serialize = "vgs")]
    VGList,
    /// Create a volume group.
    #[strum(serialize = "vgcreate")]
    VGCreate,
    /// Create a logical volume.
    #[strum(serialize = "lvcreate")]
    LVCreate,
    /// Change the logical volume layout, also used to merge snapshots.
    #[strum(serialize = "lvconvert")]
    LVConvert,
    /// Resize the logical volume.
    #[strum(serialize = "lvresize")]
    LVResize,
    /// Remove logical volume(s) from the system.
    #[strum(serialize = "lvremove")]
    LVRemove,
    /// Display information about logical volumes.
    #[strum(serialize = "lvs")]
    LVList,
}

/// LVM wrapper over `Command` with added qol such as error mapping and
/// decoding of json output reports.
pub(super) struct LvmCmd {
    cmd: &'static str,
    cmder: Command,
}

/// Used to decode the json output for lvm commands, example
/// sudo vgs --options=vg_size,vg_free --units=b --nosuffix --report-format=json
///   {
///       "report": [
///           {
///               "vg": [
///                   {"vg_name": "pool", "vg_size":"15372124160",
/// "vg_free":"15372124160"}                ]
///           }
///       ]
///   }
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct LvReport<T> {
    report: Vec<T>,
}

impl LvmCmd {
    /// See `Command` Help.
    pub(super) fn new(cmd: &'static str) -> Self {
        Self {
            cmd,
            cmder: Command::new(cmd),
        }
    }
    /// Prepare a `Command` for `LvmSubCmd::PVCreate`.
    pub(super) fn pv_create() -> Self {
        Self::new(LvmSubCmd::PVCreate.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::VGCreate`.
    pub(super) fn vg_create() -> Self {
        Self::new(LvmSubCmd::VGCreate.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::VGList`.
    pub(super) fn vg_list() -> Self {
        Self::new(LvmSubCmd::VGList.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::LVCreate`.
    pub(super) fn lv_create() -> Self {
        Self::new(LvmSubCmd::LVCreate.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::LVConvert`.
    pub(super) fn lv_convert() -> Self {
        Self::new(LvmSubCmd::LVConvert.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::LVResize`.
    pub(super) fn lv_resize() -> Self {
        Self::new(LvmSubCmd::LVResize.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::LVRemove`.
    pub(super) fn lv_remove() -> Self {
        Self::new(LvmSubCmd::LVRemove.as_ref())
    }
    /// Prepare a `Command` for `LvmSubCmd::LVList`.
    pub(super) fn lv_list() -> Self {
        Self::new(LvmSubCmd::LVList.as_ref())
    }
    /// Runs the LVM command with the provided `Command` arguments et all and
    /// returns an LVM specific report containing an output type `T`.
    /// >> Note: This requires the json output to be specified in args.
    ///
    /// # Errors
    ///
    /// `Error::LvmBinSpawnErr` => Failed to execute or await for completion.
    /// `Error::LvmBinErr` => Completed with an exit code.
    /// `Error::JsonParsing` => StdOut output is not a valid json for `T`.
    /// `Error::ReportMissing` => Output does not contain a report for `T`.
    pub(super) async fn report<T: for<'a> Deserialize<'a>>(
        self,
    ) -> Result<T, Error> {
        let cmd = self.cmd;
        let json_output: LvReport<T> = self.output_json().await?;

        let report: T = json_output.report.into_iter().next().ok_or(
            Error::ReportMissing {
                command: cmd.to_string(),
            },
        )?;

        Ok(report)
    }

    /// Runs the LVM command with the provided `Command` arguments et all and
    /// returns the type `T` object decoded from the output json format.
    /// >> Note: This requires the json output to be specified in args.
    ///
    /// # Errors
    ///
    /// `Error::LvmBinSpawnErr` => Failed to execute or await for completion.
    /// `Error::LvmBinErr` => Completed with an exit code.
    /// `Error::JsonParsing` => StdOut output is not a valid json for `T`.
    pub(super) async fn output_json<T: for<'a> Deserialize<'a>>(
        self,
    ) -> Result<T, Error> {
        let cmd = self.cmd;
        let output = self.output().await?;
        let json_output: T = serde_json::from_slice(output.stdout.as_slice())
            .map_err(|error| Error::JsonParsing {
            command: cmd.to_string(),
            error: error.to_string(),
        })?;

        Ok(json_output)
    }
    /// See help for `Command::arg`.
    pub(super) fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.cmder.arg(arg);
        self
    }
    /// See help for `Command::args`.
    pub(super) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmder.args(args);
        self
    }
    /// Runs the LVM command with the provided `Command` arguments et al.
    ///
    /// # Errors
    ///
    /// `Error::LvmBinSpawnErr` => Failed to execute or await for completion.
    /// `Error::LvmBinErr` => Completed with an exit code.
    pub(super) async fn run(self) -> Result<(), Error> {
        self.output().await.map(|_| ())
    }
    /// Runs the LVM command with the provided `Command` arguments et all and
    /// returns the `std::process::Output` in case of success.
    ///
    /// # Errors
    ///
    /// `Error::LvmBinSpawnErr` => Failed to execute or await for completion.
    /// `Error::LvmBinErr` => Completed with an exit code.
    pub(super) async fn output(
        mut self,
    ) -> Result<std::process::Output, Error> {
        tracing::trace!("{:?}", self.cmder);

        let output = self.cmder.output().await.context(
            error::LvmBinSpawnErrSnafu {
                command: self.cmd.to_string(),
            },
        )?;
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(Error::LvmBinErr {
                command: self.cmd.to_string(),
                error: error.trim_start().to_string(),
            });
        }
        Ok(output)
    }
}

/// Serde deserializer helpers to help decode LVM json output from the cli.
pub(super) mod de {
    use serde::de::{self, Deserialize, Deserializer};
    use std::{fmt::Display, str::FromStr};

    /// Decode a number from a number as a string, example: "10".
    pub(crate) fn number_from_string<'de, T, D>(
        deserializer: D,
    ) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        T::from_str(&s).map_err(de::Error::custom)
    }
}
