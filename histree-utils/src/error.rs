#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error("digest must be 32 bytes, got {}", .0)]
    InvalidDigestLength(usize),

    #[error("unsupported storage {}, use hash or array", .0)]
    UnsupportedStorage(String),

    #[error("leaf {} is missing", .0)]
    MissingLeaf(u64),
}
