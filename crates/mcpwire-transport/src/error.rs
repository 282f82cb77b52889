use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host name could not be resolved to any socket address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Every resolved address refused or failed the connection.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// The connection was not established within the allotted time.
    #[error("connect to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// The TLS handshake failed or the peer's certificate was rejected.
    #[error("TLS with {host}:{port} failed: {reason}")]
    Tls {
        host: String,
        port: u16,
        reason: String,
    },

    /// TLS settings or certificate material could not be loaded.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Failed to bind a listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Human-readable reason without the `host:port` prefix.
    ///
    /// Callers that report the endpoint themselves use this to avoid
    /// repeating it.
    pub fn reason(&self) -> String {
        match self {
            TransportError::Resolve { source, .. } => format!("resolve failed: {source}"),
            TransportError::Connect { source, .. } => source.to_string(),
            TransportError::ConnectTimeout { timeout, .. } => {
                format!("connect timed out after {timeout:?}")
            }
            TransportError::Tls { reason, .. } => format!("TLS failed: {reason}"),
            TransportError::TlsConfig(reason) => reason.clone(),
            TransportError::Bind { source, .. } => source.to_string(),
            TransportError::Accept(source) | TransportError::Io(source) => source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
