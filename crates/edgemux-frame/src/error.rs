/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x454D \"EM\")")]
    InvalidMagic,

    /// The headers plus body exceed the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The header block does not parse into key/length/value triples.
    #[error("malformed header block: {0}")]
    MalformedHeaders(&'static str),

    /// A required header is absent.
    #[error("missing header {0}")]
    MissingHeader(u32),

    /// A header is present but has the wrong width for its type.
    #[error("header {key} has {len} bytes, expected {expected}")]
    InvalidHeader {
        key: u32,
        len: usize,
        expected: usize,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
