#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("found magic {} instead of \"GGPK\"", String::from_utf8_lossy(.0))]
    BadMagic([u8; 4]),
    #[error("unexpected record tag {} at offset {offset:#x}", String::from_utf8_lossy(.tag))]
    UnexpectedTag { offset: u64, tag: [u8; 4] },
    #[error("corrupt record at offset {offset:#x}: {reason}")]
    CorruptRecord { offset: u64, reason: &'static str },
    #[error("read of {size} bytes at offset {offset:#x} exceeds source length {len}")]
    OutOfBounds { offset: u64, size: u64, len: u64 },
    #[error("invalid {field}: {value}")]
    InvalidHeaderField { field: &'static str, value: i64 },
    #[error("oodle decompression is unavailable (built without the `oodle` feature)")]
    CompressorUnavailable,
    #[error("oodle decompression failed: {0}")]
    CompressorFailed(String),
    #[error("decompressed size mismatch: expected {expected}, got {got}")]
    DecompressedSizeMismatch { expected: u64, got: u64 },
    #[error("unknown path hash algorithm (magic {0:#018x})")]
    UnknownHashAlgorithm(u64),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("bundle is already closed")]
    AlreadyClosed,
}
