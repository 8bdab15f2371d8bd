use snafu::Snafu;

/// Errors which can be encountered whilst using the LVM backend module.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Report missing from {command} output"))]
    ReportMissing { command: String },
    #[snafu(display("Failed to json parse {command} output: {error}"))]
    JsonParsing { command: String, error: String },
    #[snafu(display("{command} command failed: {error}"))]
    LvmBinErr { command: String, error: String },
    #[snafu(display("Failed to spawn/wait for {command} command: {source}"))]
    LvmBinSpawnErr {
        command: String,
        source: std::io::Error,
    },
    #[snafu(display("LVM VolumeGroup {query} not found"))]
    NotFound { query: String },
    #[snafu(display("Invalid character in {field}: {value}"))]
    NotAlphanumeric { field: String, value: String },
}
