use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use mcpwire_frame::{encode_json, JsonReader};
use mcpwire_transport::{deadline_after, WireListener, WireStream};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::{read_message, write_message, ChannelConfig};
use crate::error::Result;

/// Accepts connections and reads one request from each.
///
/// This is the responding half of the exchange, used by the reference stub
/// peer and by tests. It reads with the same framer and the same deadline
/// rules as [`send`](crate::send).
pub struct ChannelListener {
    listener: WireListener,
    config: ChannelConfig,
    next_exchange_id: AtomicU64,
}

impl ChannelListener {
    /// Bind and listen on `addr`.
    pub fn bind(addr: &str) -> Result<Self> {
        Ok(Self {
            listener: WireListener::bind(addr)?,
            config: ChannelConfig::default(),
            next_exchange_id: AtomicU64::new(1),
        })
    }

    /// Override the budget and limits applied to each accepted exchange.
    ///
    /// The budget also bounds each TLS handshake. `config.tls` is a client
    /// setting and is ignored here.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.listener.set_handshake_timeout(config.timeout);
        self.config = config;
        self
    }

    /// Terminate TLS on every accepted connection.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, acceptor: mcpwire_transport::TlsAcceptor) -> Self {
        self.listener = self.listener.with_tls(acceptor);
        self
    }

    /// Accept the next connection and read its request (blocking).
    pub fn accept(&self) -> Result<Exchange> {
        let stream = self.listener.accept()?;
        self.start(stream)
    }

    /// Accept without blocking; `Ok(None)` when nothing is pending.
    ///
    /// Requires [`set_nonblocking`](Self::set_nonblocking). Reading the
    /// request of an accepted connection still blocks for up to the
    /// configured timeout.
    pub fn try_accept(&self) -> Result<Option<Exchange>> {
        match self.listener.try_accept()? {
            Some(stream) => self.start(stream).map(Some),
            None => Ok(None),
        }
    }

    /// Switch between blocking and polling accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    fn start(&self, mut stream: WireStream) -> Result<Exchange> {
        let id = self.next_exchange_id.fetch_add(1, Ordering::Relaxed);
        let deadline = deadline_after(self.config.timeout);

        let request = {
            let mut reader = JsonReader::with_config(&mut stream, self.config.frame_config());
            read_message(&mut reader, deadline, self.config.timeout)
        };
        match request {
            Ok(request) => {
                debug!(id, peer = %stream.peer_addr(), "request received");
                Ok(Exchange {
                    id,
                    stream,
                    request,
                    config: self.config.clone(),
                })
            }
            Err(err) => {
                stream.close();
                Err(err)
            }
        }
    }
}

/// One accepted connection whose request has been read.
///
/// Consumed by [`respond`](Self::respond), [`respond_bytes`](Self::respond_bytes)
/// or [`close`](Self::close); dropping it closes the connection too.
#[derive(Debug)]
pub struct Exchange {
    id: u64,
    stream: WireStream,
    request: Value,
    config: ChannelConfig,
}

impl Exchange {
    /// Sequence number assigned by the listener, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request as received.
    pub fn request(&self) -> &Value {
        &self.request
    }

    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.stream.peer_addr()
    }

    /// Serialize `response`, write it and close the connection.
    pub fn respond<T: Serialize + ?Sized>(self, response: &T) -> Result<()> {
        let payload = encode_json(response)?;
        self.respond_bytes(&payload)
    }

    /// Write raw bytes and close the connection.
    ///
    /// Nothing checks that `payload` is valid JSON, which lets conformance
    /// runs send truncated or malformed responses on purpose.
    pub fn respond_bytes(mut self, payload: &[u8]) -> Result<()> {
        // The reply gets its own budget; a stub may have slept past the first one.
        let deadline = deadline_after(self.config.timeout);
        let result = write_message(&mut self.stream, payload, deadline, self.config.timeout);
        debug!(id = self.id, bytes = payload.len(), ok = result.is_ok(), "response written");
        self.stream.close();
        result
    }

    /// Close the connection without replying.
    pub fn close(self) {
        self.stream.close();
    }
}
