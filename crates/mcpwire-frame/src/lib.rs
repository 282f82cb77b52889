//! Delimiter-free JSON message framing.
//!
//! The mcpwire protocol carries exactly one JSON document in each direction
//! with no length prefix and no terminator. A receiver finds the end of a
//! message by attempting to parse what it has buffered after every chunk:
//! - "more input needed" means keep reading,
//! - a complete value means the message is done (anything after it is
//!   reported, not returned),
//! - any other parse error means the peer sent garbage.
//!
//! [`JsonAccumulator`] holds that logic independent of I/O, so the blocking
//! [`JsonReader`] and async callers share it.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_json, encode_json, Decoded, FrameConfig, JsonAccumulator, DEFAULT_MAX_PAYLOAD,
    DEFAULT_READ_CHUNK,
};
pub use error::{FrameError, Result};
pub use reader::JsonReader;
pub use writer::JsonWriter;
