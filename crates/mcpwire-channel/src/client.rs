use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use mcpwire_frame::{
    encode_json, FrameConfig, FrameError, JsonReader, JsonWriter, DEFAULT_MAX_PAYLOAD,
    DEFAULT_READ_CHUNK,
};
use mcpwire_transport::{deadline_after, TlsOptions, WireStream};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ChannelError, Result};

/// Default budget for one exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning for one command exchange.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Budget for the whole exchange: connect, write and every read.
    pub timeout: Duration,
    /// Bytes requested per read.
    pub read_chunk_size: usize,
    /// Largest response accepted before giving up.
    pub max_response_size: usize,
    /// Run the exchange over TLS with these settings.
    pub tls: Option<TlsOptions>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK,
            max_response_size: DEFAULT_MAX_PAYLOAD,
            tls: None,
        }
    }
}

impl ChannelConfig {
    /// Default configuration with a different exchange budget.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_response_size,
            read_chunk_size: self.read_chunk_size,
        }
    }
}

/// Send one request to `host:port` and wait for one JSON response.
pub fn send<T: Serialize + ?Sized>(
    host: &str,
    port: u16,
    request: &T,
    timeout: Duration,
) -> Result<Value> {
    send_with_config(host, port, request, &ChannelConfig::with_timeout(timeout))
}

/// Send one request with explicit configuration.
///
/// The request is serialized before any connection is opened. The connection
/// is closed on every path once the call resolves. Budgets beyond
/// [`mcpwire_transport::MAX_BUDGET`] are clamped to it.
pub fn send_with_config<T: Serialize + ?Sized>(
    host: &str,
    port: u16,
    request: &T,
    config: &ChannelConfig,
) -> Result<Value> {
    let payload = encode_json(request)?;
    let deadline = deadline_after(config.timeout);

    let mut stream =
        mcpwire_transport::connect_with(host, port, config.timeout, config.tls.as_ref())?;
    debug!(host, port, bytes = payload.len(), "sending request");

    let result = exchange(&mut stream, &payload, deadline, config);
    stream.close();
    result
}

fn exchange(
    stream: &mut WireStream,
    payload: &[u8],
    deadline: Instant,
    config: &ChannelConfig,
) -> Result<Value> {
    write_message(stream, payload, deadline, config.timeout)?;

    let mut reader = JsonReader::with_config(&mut *stream, config.frame_config());
    let value = read_message(&mut reader, deadline, config.timeout)?;
    debug!(bytes = reader.buffered(), "received response");
    Ok(value)
}

/// Write `payload` with the write timeout set to whatever budget remains.
pub(crate) fn write_message(
    stream: &mut WireStream,
    payload: &[u8],
    deadline: Instant,
    timeout: Duration,
) -> Result<()> {
    let remaining = remaining(deadline).ok_or(ChannelError::Timeout(timeout))?;
    stream.set_write_timeout(Some(remaining))?;

    let mut writer = JsonWriter::new(&mut *stream);
    match writer.write_bytes(payload) {
        Ok(()) => Ok(()),
        Err(FrameError::Io(err)) if is_timeout(&err) => Err(ChannelError::Timeout(timeout)),
        Err(err) => Err(err.into()),
    }
}

/// Read until one complete JSON value is buffered or `deadline` passes.
///
/// Before every read the socket timeout is narrowed to the remaining budget,
/// so a peer that trickles bytes forever still ends in a timeout.
pub(crate) fn read_message<S>(
    reader: &mut JsonReader<S>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Value>
where
    S: Read + AsWireStream,
{
    loop {
        let remaining = remaining(deadline).ok_or(ChannelError::Timeout(timeout))?;
        reader.get_ref().wire().set_read_timeout(Some(remaining))?;

        match reader.read_chunk() {
            Ok(Some(decoded)) => return Ok(decoded.value),
            Ok(None) => continue,
            Err(FrameError::Io(err)) if is_timeout(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Access to the socket behind a reader, for adjusting timeouts.
pub(crate) trait AsWireStream {
    fn wire(&self) -> &WireStream;
}

impl AsWireStream for WireStream {
    fn wire(&self) -> &WireStream {
        self
    }
}

impl AsWireStream for &mut WireStream {
    fn wire(&self) -> &WireStream {
        self
    }
}

fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    (!left.is_zero()).then_some(left)
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
