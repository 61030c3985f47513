use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not a valid asset bundle: {0}")]
    InvalidContainer(String),

    #[error("block decompressed to {actual} bytes, expected {expected}")]
    CorruptBlock { expected: usize, actual: usize },

    #[error("unsupported compression mode {mode}")]
    UnsupportedCompression { mode: u32 },

    #[error("no object with path id {path_id}")]
    ObjectNotFound { path_id: i64 },

    #[error("payload bytes not found in container")]
    AssetNotFound,

    #[error("offset {offset:#x} out of range: {reason}")]
    InvalidOffset { offset: u64, reason: &'static str },

    #[error("unexpected end of input at offset {offset:#x} (needed {wanted} more bytes)")]
    Truncated { offset: usize, wanted: usize },

    #[error("malformed data at offset {offset:#x}: {message}")]
    Malformed { offset: usize, message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
