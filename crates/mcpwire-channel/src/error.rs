use std::time::Duration;

use mcpwire_frame::FrameError;
use mcpwire_transport::TransportError;

/// Errors that can occur during a command exchange.
///
/// Every variant is terminal for the exchange; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Resolution or connect failed, or connect ran out of time.
    #[error("cannot connect to {host}:{port}: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    /// TLS could not be set up locally (CA file, missing feature).
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    /// No complete response arrived within the exchange budget.
    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    /// The peer closed the stream before a complete JSON value arrived.
    #[error("connection closed after {received} bytes without a complete response")]
    IncompleteResponse { received: usize },

    /// The request could not be serialized as JSON.
    #[error("request is not representable as JSON: {0}")]
    Encoding(#[source] serde_json::Error),

    /// The peer sent bytes that can never form valid JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The response grew past the configured size limit.
    #[error("response too large ({size} bytes, max {max})")]
    ResponseTooLarge { size: usize, max: usize },

    /// Any other I/O failure on an established connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for ChannelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed { buffered } => {
                ChannelError::IncompleteResponse { received: buffered }
            }
            FrameError::Malformed(err) => ChannelError::MalformedResponse(err.to_string()),
            FrameError::Encode(err) => ChannelError::Encoding(err),
            FrameError::TooLarge { size, max } => ChannelError::ResponseTooLarge { size, max },
            FrameError::Io(err) => ChannelError::Io(err),
        }
    }
}

impl From<TransportError> for ChannelError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Resolve { ref host, port, .. }
            | TransportError::Connect { ref host, port, .. }
            | TransportError::ConnectTimeout { ref host, port, .. }
            | TransportError::Tls { ref host, port, .. } => ChannelError::Connection {
                host: host.clone(),
                port,
                reason: err.reason(),
            },
            TransportError::TlsConfig(reason) => ChannelError::TlsSetup(reason),
            TransportError::Bind { source, .. } => ChannelError::Io(source),
            TransportError::Accept(source) | TransportError::Io(source) => ChannelError::Io(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
