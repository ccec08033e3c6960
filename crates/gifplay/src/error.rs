use std::io;

/// Playback related errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced while walking the GIF bitstream. These are total
/// failures: a stream that trips one of these yields no frames at all.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The data is structurally not a GIF, with a short note saying
    /// which check failed.
    #[error("invalid gif: {0}")]
    InvalidFormat(&'static str),

    #[error("unexpected end of gif data")]
    Truncated,

    #[error("unsupported gif version {}", String::from_utf8_lossy(.0))]
    UnsupportedVersion([u8; 3]),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}
