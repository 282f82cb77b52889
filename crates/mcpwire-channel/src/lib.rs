//! One-shot JSON command exchange over TCP.
//!
//! This is the "just works" layer: build a [`Request`], call [`send`], get the
//! parsed response back or a [`ChannelError`] saying why not. Each call opens
//! its own connection, writes one JSON document, reads until one complete JSON
//! value has arrived, and closes the connection on every path.
//!
//! [`ChannelListener`] is the responding half, used by the stub peer.

#[cfg(feature = "async")]
pub mod async_client;
pub mod client;
pub mod error;
pub mod listener;
pub mod request;

#[cfg(feature = "async")]
pub use async_client::send_async;
pub use client::{send, send_with_config, ChannelConfig, DEFAULT_TIMEOUT};
pub use error::{ChannelError, Result};
pub use listener::{ChannelListener, Exchange};
pub use mcpwire_transport::TlsOptions;
pub use request::{Request, PASSWORD_ARGUMENT};
