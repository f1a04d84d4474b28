#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed tree encoding: {}", .0)]
    Malformed(&'static str),

    #[error("Version out of range: {}, max: {}", .tried, .max)]
    VersionOutOfRange { tried: i128, max: u64 },

    #[error("Node {} lies beyond version {}", .node, .version)]
    NodeBeyondVersion { node: String, version: u64 },

    #[error("Encoding nested deeper than {} levels", .0)]
    TooDeep(u32),
}
