use bytes::BytesMut;
use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{FrameError, Result};

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default size of a single read from the stream: 4 KiB.
pub const DEFAULT_READ_CHUNK: usize = 4 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// A complete JSON value recovered from a byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The first complete JSON value in the buffer.
    pub value: Value,
    /// Bytes up to and including the end of `value`.
    pub consumed: usize,
    /// Non-whitespace bytes that followed `value` and were not parsed.
    pub trailing: usize,
}

/// Try to extract the first complete JSON value from `src`.
///
/// Returns `Ok(None)` while the buffer is empty, whitespace only, or a
/// prefix of a valid document. A bare top-level number that runs to the end
/// of the buffer is treated as incomplete unless `at_eof` is set, because
/// the next chunk may carry more digits.
pub fn decode_json(src: &[u8], at_eof: bool) -> Result<Option<Decoded>> {
    let mut stream = serde_json::Deserializer::from_slice(src).into_iter::<Value>();

    match stream.next() {
        None => Ok(None),
        Some(Ok(value)) => {
            let consumed = stream.byte_offset();
            if !at_eof && consumed == src.len() && value.is_number() {
                return Ok(None);
            }
            let rest = &src[consumed..];
            let trailing = rest
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .map_or(0, |start| rest.len() - start);
            Ok(Some(Decoded {
                value,
                consumed,
                trailing,
            }))
        }
        Some(Err(err)) if err.is_eof() => Ok(None),
        Some(Err(err)) => Err(FrameError::Malformed(err)),
    }
}

/// Serialize `value` as one compact JSON document.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(FrameError::Encode)
}

/// Byte accumulator that recognises the end of a JSON message.
///
/// Feed it chunks as they arrive with [`push`](Self::push); call
/// [`finish`](Self::finish) once the stream reports end-of-stream.
#[derive(Debug)]
pub struct JsonAccumulator {
    buf: BytesMut,
    max_payload_size: usize,
}

impl JsonAccumulator {
    /// Create an accumulator that refuses messages above `max_payload_size`.
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(max_payload_size)),
            max_payload_size,
        }
    }

    /// Append a chunk and check whether a complete value is now buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Decoded>> {
        let size = self.buf.len().saturating_add(chunk.len());
        if size > self.max_payload_size {
            return Err(FrameError::TooLarge {
                size,
                max: self.max_payload_size,
            });
        }
        self.buf.extend_from_slice(chunk);
        trace!(chunk = chunk.len(), buffered = self.buf.len(), "buffered chunk");

        let decoded = decode_json(&self.buf, false)?;
        if let Some(decoded) = &decoded {
            report_trailing(decoded);
        }
        Ok(decoded)
    }

    /// Resolve the buffer at end-of-stream.
    ///
    /// Fails with [`FrameError::ConnectionClosed`] if no complete value was
    /// assembled.
    pub fn finish(&mut self) -> Result<Decoded> {
        match decode_json(&self.buf, true)? {
            Some(decoded) => {
                report_trailing(&decoded);
                Ok(decoded)
            }
            None => Err(FrameError::ConnectionClosed {
                buffered: self.buf.len(),
            }),
        }
    }

    /// Number of bytes buffered so far.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn report_trailing(decoded: &Decoded) {
    if decoded.trailing > 0 {
        warn!(
            consumed = decoded.consumed,
            trailing = decoded.trailing,
            "ignoring bytes after the first complete JSON value"
        );
    }
}

/// Configuration for JSON framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Bytes requested per read. Default: 4 KiB.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // "é" is two bytes in UTF-8, so 1-byte and 7-byte chunking split it.
    const RESPONSE_TEXT: &str =
        r#"{"status":"ok","data":{"groups":["sales","ops"],"count":2,"nested":[{"a":[1,2,{"b":null}]}]},"message":"café \"quoted\" {not a brace}"}"#;
    const RESPONSE: &[u8] = RESPONSE_TEXT.as_bytes();

    fn feed(bytes: &[u8], chunk_size: usize) -> Decoded {
        let mut acc = JsonAccumulator::new(DEFAULT_MAX_PAYLOAD);
        for chunk in bytes.chunks(chunk_size) {
            if let Some(decoded) = acc.push(chunk).unwrap() {
                return decoded;
            }
        }
        acc.finish().unwrap()
    }

    #[test]
    fn fragmentation_does_not_change_result() {
        let whole = feed(RESPONSE, RESPONSE.len());
        let single = feed(RESPONSE, 1);
        let seven = feed(RESPONSE, 7);

        assert_eq!(whole.value, single.value);
        assert_eq!(whole.value, seven.value);
        assert_eq!(whole.consumed, RESPONSE.len());
        assert_eq!(whole.value["data"]["count"], json!(2));
        assert_eq!(
            seven.value["message"],
            json!("caf\u{e9} \"quoted\" {not a brace}")
        );
    }

    #[test]
    fn every_proper_prefix_is_incomplete() {
        for end in 0..RESPONSE.len() {
            assert!(
                decode_json(&RESPONSE[..end], false).unwrap().is_none(),
                "prefix of {end} bytes should be incomplete"
            );
        }
    }

    #[test]
    fn whitespace_only_is_incomplete() {
        assert!(decode_json(b"", false).unwrap().is_none());
        assert!(decode_json(b"  \r\n\t", false).unwrap().is_none());
    }

    #[test]
    fn trailing_bytes_are_counted_not_parsed() {
        let decoded = decode_json(br#"{"a":1}  {"b":2}"#, false).unwrap().unwrap();
        assert_eq!(decoded.value, json!({"a": 1}));
        assert_eq!(decoded.consumed, 7);
        assert_eq!(decoded.trailing, 7);
    }

    #[test]
    fn trailing_whitespace_is_not_reported() {
        let decoded = decode_json(b"{\"a\":1}\r\n", false).unwrap().unwrap();
        assert_eq!(decoded.trailing, 0);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let err = decode_json(b"{\"a\" 1}", false).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));

        let err = decode_json(b"<html>", false).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn bare_number_waits_for_delimiter_or_eof() {
        assert!(decode_json(b"12", false).unwrap().is_none());

        let at_eof = decode_json(b"12", true).unwrap().unwrap();
        assert_eq!(at_eof.value, json!(12));

        let delimited = decode_json(b"123 ", false).unwrap().unwrap();
        assert_eq!(delimited.value, json!(123));
    }

    #[test]
    fn scalar_literals_complete_without_delimiter() {
        let decoded = decode_json(b"true", false).unwrap().unwrap();
        assert_eq!(decoded.value, json!(true));
        assert!(decode_json(b"tru", false).unwrap().is_none());

        let decoded = decode_json(b"\"text\"", false).unwrap().unwrap();
        assert_eq!(decoded.value, json!("text"));
    }

    #[test]
    fn partial_object_at_eof_is_connection_closed() {
        let mut acc = JsonAccumulator::new(DEFAULT_MAX_PAYLOAD);
        assert!(acc.push(br#"{"partial":"#).unwrap().is_none());
        let err = acc.finish().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed { buffered: 11 }));
    }

    #[test]
    fn accumulator_enforces_size_limit() {
        let mut acc = JsonAccumulator::new(8);
        assert!(acc.push(b"[1,2,").unwrap().is_none());
        let err = acc.push(b"3,4,5]").unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { size: 11, max: 8 }));
    }

    #[test]
    fn encode_produces_single_compact_document() {
        let bytes = encode_json(&json!({"command": "list_groups", "token": null})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains('\n'));
        let decoded = decode_json(text.as_bytes(), false).unwrap().unwrap();
        assert_eq!(decoded.value["command"], json!("list_groups"));
    }

    #[test]
    fn encode_rejects_non_string_map_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(vec![1u8], "value");
        let err = encode_json(&map).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber recording WARN and above; return the output.
    fn warnings(f: impl FnOnce()) -> String {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn trailing_bytes_are_logged_once() {
        let logs = warnings(|| {
            let mut acc = JsonAccumulator::new(DEFAULT_MAX_PAYLOAD);
            let decoded = acc.push(br#"{"status":"ok"}{"extra":1}"#).unwrap().unwrap();
            assert_eq!(decoded.trailing, 11);
        });

        assert_eq!(logs.lines().count(), 1, "{logs}");
        assert!(logs.contains("WARN"));
        assert!(logs.contains("ignoring bytes after the first complete JSON value"));
        assert!(logs.contains("consumed=15"));
        assert!(logs.contains("trailing=11"));
    }

    #[test]
    fn clean_response_logs_nothing() {
        let logs = warnings(|| {
            let mut acc = JsonAccumulator::new(DEFAULT_MAX_PAYLOAD);
            assert!(acc.push(br#"{"status":"ok"} "#).unwrap().is_some());
        });
        assert!(logs.is_empty(), "{logs}");
    }
}
