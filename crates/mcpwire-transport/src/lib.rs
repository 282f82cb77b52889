//! TCP stream transport for mcpwire.
//!
//! This is the lowest layer of mcpwire. It resolves `host:port`, connects
//! within a bounded time budget, and hands back a [`WireStream`] that the
//! framing layer reads from and writes to. The [`WireListener`] side exists
//! for the reference stub peer and for tests.
//!
//! With the `tls` feature the stream can run over rustls on both sides
//! ([`connect_with`], [`WireListener::with_tls`]). With the `async` feature,
//! [`connect_async`] and [`connect_async_with`] provide the same contract on
//! tokio.

pub mod error;
pub mod stream;
pub mod tcp;
pub mod tls;

pub use error::{Result, TransportError};
pub use stream::WireStream;
pub use tcp::{connect, connect_with, deadline_after, WireListener, MAX_BUDGET};
pub use tls::TlsOptions;

#[cfg(feature = "tls")]
pub use tls::TlsAcceptor;

#[cfg(feature = "async")]
pub use tcp::{connect_async, connect_async_with, AsyncWire};
