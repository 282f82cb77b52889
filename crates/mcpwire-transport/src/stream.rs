use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// A connected stream, plain TCP or TLS. Implements `Read` and `Write`.
///
/// One `WireStream` carries exactly one request/response exchange. Dropping
/// it closes the socket; [`WireStream::close`] does the same but shuts both
/// directions down first so the peer sees end-of-stream immediately.
pub struct WireStream {
    inner: Inner,
    peer: SocketAddr,
}

enum Inner {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Client(Box<crate::tls::ClientStream>),
    #[cfg(feature = "tls")]
    Server(Box<crate::tls::ServerStream>),
}

impl Inner {
    fn tcp(&self) -> &TcpStream {
        match self {
            Inner::Plain(stream) => stream,
            #[cfg(feature = "tls")]
            Inner::Client(stream) => &stream.sock,
            #[cfg(feature = "tls")]
            Inner::Server(stream) => &stream.sock,
        }
    }
}

impl Read for WireStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            Inner::Plain(stream) => stream.read(buf),
            #[cfg(feature = "tls")]
            Inner::Client(stream) => end_of_stream_on_ragged_close(stream.read(buf)),
            #[cfg(feature = "tls")]
            Inner::Server(stream) => end_of_stream_on_ragged_close(stream.read(buf)),
        }
    }
}

impl Write for WireStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            Inner::Plain(stream) => stream.write(buf),
            #[cfg(feature = "tls")]
            Inner::Client(stream) => stream.write(buf),
            #[cfg(feature = "tls")]
            Inner::Server(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            Inner::Plain(stream) => stream.flush(),
            #[cfg(feature = "tls")]
            Inner::Client(stream) => stream.flush(),
            #[cfg(feature = "tls")]
            Inner::Server(stream) => stream.flush(),
        }
    }
}

/// Peers that close the socket without a TLS close_notify read as a plain
/// end-of-stream. The JSON framer still rejects a truncated response.
#[cfg(feature = "tls")]
fn end_of_stream_on_ragged_close(result: std::io::Result<usize>) -> std::io::Result<usize> {
    match result {
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
        other => other,
    }
}

impl WireStream {
    pub(crate) fn from_tcp(inner: TcpStream, peer: SocketAddr) -> Self {
        Self {
            inner: Inner::Plain(inner),
            peer,
        }
    }

    #[cfg(feature = "tls")]
    pub(crate) fn from_tls_client(inner: crate::tls::ClientStream, peer: SocketAddr) -> Self {
        Self {
            inner: Inner::Client(Box::new(inner)),
            peer,
        }
    }

    #[cfg(feature = "tls")]
    pub(crate) fn from_tls_server(inner: crate::tls::ServerStream, peer: SocketAddr) -> Self {
        Self {
            inner: Inner::Server(Box::new(inner)),
            peer,
        }
    }

    /// Set read timeout on the underlying socket.
    ///
    /// `Some(Duration::ZERO)` is rejected by the OS, so callers must clamp a
    /// spent budget themselves.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.tcp().set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.tcp().set_write_timeout(timeout).map_err(Into::into)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the stream runs over TLS.
    pub fn is_tls(&self) -> bool {
        !matches!(self.inner, Inner::Plain(_))
    }

    /// Shut down both directions and release the socket.
    ///
    /// A TLS stream sends close_notify first. Shutdown errors (typically
    /// `NotConnected` after the peer reset the connection) are not actionable
    /// and are only logged.
    pub fn close(self) {
        let peer = self.peer;
        let tcp = match self.inner {
            Inner::Plain(stream) => stream,
            #[cfg(feature = "tls")]
            Inner::Client(mut stream) => {
                stream.conn.send_close_notify();
                if let Err(err) = stream.flush() {
                    debug!(%peer, error = %err, "close_notify not delivered");
                }
                stream.sock
            }
            #[cfg(feature = "tls")]
            Inner::Server(mut stream) => {
                stream.conn.send_close_notify();
                if let Err(err) = stream.flush() {
                    debug!(%peer, error = %err, "close_notify not delivered");
                }
                stream.sock
            }
        };
        if let Err(err) = tcp.shutdown(Shutdown::Both) {
            debug!(%peer, error = %err, "shutdown on close failed");
        }
        debug!(%peer, "connection closed");
    }
}

impl std::fmt::Debug for WireStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireStream")
            .field("type", &if self.is_tls() { "tls" } else { "tcp" })
            .field("peer", &self.peer)
            .finish()
    }
}
