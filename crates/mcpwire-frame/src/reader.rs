use std::io::{ErrorKind, Read};

use crate::codec::{Decoded, FrameConfig, JsonAccumulator};
use crate::error::{FrameError, Result};

/// Reads one complete JSON value from any `Read` stream.
///
/// Handles partial reads internally. Callers that need a budget per read
/// (see `mcpwire-channel`) drive [`read_chunk`](Self::read_chunk) themselves;
/// everyone else calls [`read_value`](Self::read_value).
pub struct JsonReader<T> {
    inner: T,
    acc: JsonAccumulator,
    chunk: Vec<u8>,
}

impl<T: Read> JsonReader<T> {
    /// Create a new reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            acc: JsonAccumulator::new(config.max_payload_size),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
        }
    }

    /// Read until a complete JSON value arrives (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` if the stream ends first.
    pub fn read_value(&mut self) -> Result<Decoded> {
        loop {
            if let Some(decoded) = self.read_chunk()? {
                return Ok(decoded);
            }
        }
    }

    /// Perform one read and report whether the value is now complete.
    ///
    /// `Interrupted` reads are retried; every other I/O error, including the
    /// `WouldBlock`/`TimedOut` produced by a socket read timeout, is returned
    /// as [`FrameError::Io`]. A zero-byte read is end-of-stream.
    pub fn read_chunk(&mut self) -> Result<Option<Decoded>> {
        let read = loop {
            match self.inner.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if read == 0 {
            return self.acc.finish().map(Some);
        }

        self.acc.push(&self.chunk[..read])
    }

    /// Number of bytes received so far.
    pub fn buffered(&self) -> usize {
        self.acc.buffered()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
