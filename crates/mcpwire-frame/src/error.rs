/// Errors that can occur while framing JSON messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffered bytes can never become valid JSON.
    #[error("malformed JSON message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The outgoing value could not be serialized.
    #[error("failed to encode JSON message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The message grew past the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete JSON value was received.
    #[error("connection closed after {buffered} bytes (incomplete JSON message)")]
    ConnectionClosed { buffered: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
