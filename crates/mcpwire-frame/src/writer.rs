use std::io::{ErrorKind, Write};

use serde::Serialize;
use tracing::trace;

use crate::codec::{encode_json, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes complete JSON messages to any `Write` stream.
pub struct JsonWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Write> JsonWriter<T> {
    /// Create a new writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Serialize `value` and send it as one message (blocking).
    pub fn write_value<S: Serialize + ?Sized>(&mut self, value: &S) -> Result<()> {
        let bytes = encode_json(value)?;
        self.write_bytes(&bytes)
    }

    /// Send an already-encoded message.
    ///
    /// Loops until every byte is accepted. `Interrupted` is retried; a
    /// write timeout surfaces as [`FrameError::Io`] with the OS error kind.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.config.max_payload_size {
            return Err(FrameError::TooLarge {
                size: bytes.len(),
                max: self.config.max_payload_size,
            });
        }

        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(bytes = bytes.len(), "wrote message");

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::codec::decode_json;

    /// How the scripted peer answers the next `write` or `flush`.
    enum Step {
        Accept(usize),
        Fail(ErrorKind),
    }

    /// A sink that replays a script, then accepts everything.
    #[derive(Default)]
    struct ScriptedPeer {
        writes: VecDeque<Step>,
        flushes: VecDeque<Step>,
        received: Vec<u8>,
        flush_calls: usize,
    }

    impl ScriptedPeer {
        fn with_writes(writes: impl IntoIterator<Item = Step>) -> Self {
            Self {
                writes: writes.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl Write for ScriptedPeer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self.writes.pop_front() {
                Some(Step::Fail(kind)) => Err(kind.into()),
                Some(Step::Accept(limit)) => {
                    let n = limit.min(buf.len());
                    self.received.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                None => {
                    self.received.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flush_calls += 1;
            match self.flushes.pop_front() {
                Some(Step::Fail(kind)) => Err(kind.into()),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn request_is_sent_as_one_json_object() {
        let mut writer = JsonWriter::new(Cursor::new(Vec::<u8>::new()));

        writer
            .write_value(&json!({"command": "delete_group", "token": "t"}))
            .unwrap();

        let wire = writer.into_inner().into_inner();
        let decoded = decode_json(&wire, true).unwrap().unwrap();
        assert_eq!(decoded.value["command"], json!("delete_group"));
        assert_eq!(decoded.consumed, wire.len());
        assert!(!wire.ends_with(b"\n"));
    }

    #[test]
    fn request_over_limit_never_reaches_peer() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = JsonWriter::with_config(ScriptedPeer::default(), cfg);

        let err = writer.write_bytes(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { size: 9, max: 4 }));
        let peer = writer.into_inner();
        assert!(peer.received.is_empty());
        assert_eq!(peer.flush_calls, 0);
    }

    #[test]
    fn slow_peer_receives_whole_request_then_flush() {
        let mut writer = JsonWriter::new(ScriptedPeer::with_writes([
            Step::Accept(1),
            Step::Fail(ErrorKind::Interrupted),
            Step::Accept(3),
        ]));
        writer.write_value(&json!({"groupName": "sales"})).unwrap();

        let peer = writer.into_inner();
        assert_eq!(peer.received, br#"{"groupName":"sales"}"#.to_vec());
        assert_eq!(peer.flush_calls, 1);
    }

    #[test]
    fn interrupted_flush_is_retried() {
        let mut peer = ScriptedPeer::default();
        peer.flushes.push_back(Step::Fail(ErrorKind::Interrupted));
        let mut writer = JsonWriter::new(peer);

        writer.write_value(&json!(null)).unwrap();
        assert_eq!(writer.into_inner().flush_calls, 2);
    }

    #[test]
    fn write_timeout_surfaces_os_kind() {
        let mut writer =
            JsonWriter::new(ScriptedPeer::with_writes([Step::Fail(ErrorKind::WouldBlock)]));
        let err = writer.write_bytes(b"{}").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn peer_accepting_nothing_is_write_zero() {
        let mut writer = JsonWriter::new(ScriptedPeer::with_writes([Step::Accept(0)]));
        let err = writer.write_bytes(b"{}").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WriteZero));
    }
}
