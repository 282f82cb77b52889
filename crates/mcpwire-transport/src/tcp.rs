use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::WireStream;
use crate::tls::TlsOptions;

/// Budgets longer than this are clamped so deadlines never overflow.
pub const MAX_BUDGET: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[cfg(feature = "tls")]
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The instant `timeout` from now, with `timeout` clamped to [`MAX_BUDGET`].
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(MAX_BUDGET)).unwrap_or(now)
}

/// Budget left until `deadline`, or `None` once it has passed.
pub(crate) fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    (!left.is_zero()).then_some(left)
}

/// Resolve `host:port` and connect to the first address that accepts.
///
/// Resolved addresses are tried in order and share one `timeout` budget. If
/// the budget runs out, or the last attempt itself timed out, the result is
/// [`TransportError::ConnectTimeout`]; any other failure on the last address
/// is reported as [`TransportError::Connect`].
///
/// Name resolution goes through the system resolver, which is not bounded by
/// `timeout`.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<WireStream> {
    connect_with(host, port, timeout, None)
}

/// [`connect`], then a TLS handshake when `tls` is given.
///
/// The handshake shares the connect budget. Handshake and certificate
/// failures are [`TransportError::Tls`]; without the `tls` feature any
/// `Some` is a [`TransportError::TlsConfig`].
pub fn connect_with(
    host: &str,
    port: u16,
    timeout: Duration,
    tls: Option<&TlsOptions>,
) -> Result<WireStream> {
    let deadline = deadline_after(timeout);
    let (stream, addr) = connect_tcp(host, port, deadline, timeout)?;

    match tls {
        None => Ok(WireStream::from_tcp(stream, addr)),
        #[cfg(feature = "tls")]
        Some(options) => {
            let stream =
                crate::tls::client_handshake(stream, host, port, options, deadline, timeout)?;
            Ok(WireStream::from_tls_client(stream, addr))
        }
        #[cfg(not(feature = "tls"))]
        Some(_) => Err(tls_not_compiled()),
    }
}

#[cfg(not(feature = "tls"))]
pub(crate) fn tls_not_compiled() -> TransportError {
    TransportError::TlsConfig("TLS support is not compiled in (enable the `tls` feature)".into())
}

fn connect_tcp(
    host: &str,
    port: u16,
    deadline: Instant,
    timeout: Duration,
) -> Result<(TcpStream, SocketAddr)> {
    let addrs = resolve(host, port)?;
    let timed_out = || TransportError::ConnectTimeout {
        host: host.to_string(),
        port,
        timeout,
    };

    let mut last_err: Option<std::io::Error> = None;
    for addr in addrs {
        let Some(left) = remaining(deadline) else {
            return Err(timed_out());
        };

        match TcpStream::connect_timeout(&addr, left) {
            Ok(stream) => {
                if let Err(err) = stream.set_nodelay(true) {
                    debug!(%addr, error = %err, "failed to set TCP_NODELAY");
                }
                debug!(%addr, "connected");
                return Ok((stream, addr));
            }
            Err(err) => {
                debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    let source = last_err.unwrap_or_else(|| std::io::Error::other("no address attempted"));
    if source.kind() == ErrorKind::TimedOut {
        return Err(timed_out());
    }
    Err(TransportError::Connect {
        host: host.to_string(),
        port,
        source,
    })
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            host: host.to_string(),
            port,
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses found"),
        });
    }
    Ok(addrs)
}

/// Async stream returned by [`connect_async_with`]: plain TCP or TLS.
#[cfg(feature = "async")]
pub trait AsyncWire: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}

#[cfg(feature = "async")]
impl<T> AsyncWire for T where T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}

/// Async counterpart of [`connect`].
///
/// Unlike the blocking version, resolution is also bounded by `timeout`.
#[cfg(feature = "async")]
pub async fn connect_async(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<tokio::net::TcpStream> {
    let deadline = tokio::time::Instant::from_std(deadline_after(timeout));
    connect_async_tcp(host, port, deadline, timeout).await
}

/// Async counterpart of [`connect_with`].
#[cfg(feature = "async")]
pub async fn connect_async_with(
    host: &str,
    port: u16,
    timeout: Duration,
    tls: Option<&TlsOptions>,
) -> Result<Box<dyn AsyncWire>> {
    let deadline = tokio::time::Instant::from_std(deadline_after(timeout));
    let stream = connect_async_tcp(host, port, deadline, timeout).await?;

    match tls {
        None => Ok(Box::new(stream)),
        #[cfg(feature = "tls")]
        Some(options) => {
            let connector = tokio_rustls::TlsConnector::from(crate::tls::client_config(options)?);
            let name = crate::tls::server_name(host, port)?;
            match tokio::time::timeout_at(deadline, connector.connect(name, stream)).await {
                Ok(Ok(stream)) => {
                    debug!(host, port, "TLS established");
                    Ok(Box::new(stream))
                }
                Ok(Err(err)) => Err(TransportError::Tls {
                    host: host.to_string(),
                    port,
                    reason: err.to_string(),
                }),
                Err(_) => Err(TransportError::ConnectTimeout {
                    host: host.to_string(),
                    port,
                    timeout,
                }),
            }
        }
        #[cfg(not(feature = "tls"))]
        Some(_) => Err(tls_not_compiled()),
    }
}

#[cfg(feature = "async")]
async fn connect_async_tcp(
    host: &str,
    port: u16,
    deadline: tokio::time::Instant,
    timeout: Duration,
) -> Result<tokio::net::TcpStream> {
    let timed_out = || TransportError::ConnectTimeout {
        host: host.to_string(),
        port,
        timeout,
    };

    let addrs: Vec<SocketAddr> =
        match tokio::time::timeout_at(deadline, tokio::net::lookup_host((host, port))).await {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(source)) => {
                return Err(TransportError::Resolve {
                    host: host.to_string(),
                    port,
                    source,
                })
            }
            Err(_) => return Err(timed_out()),
        };

    let mut last_err: Option<std::io::Error> = None;
    for addr in addrs {
        match tokio::time::timeout_at(deadline, tokio::net::TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    debug!(%addr, error = %err, "failed to set TCP_NODELAY");
                }
                debug!(%addr, "connected");
                return Ok(stream);
            }
            Ok(Err(err)) => {
                debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
            Err(_) => return Err(timed_out()),
        }
    }

    let source = last_err
        .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no addresses found"));
    Err(TransportError::Connect {
        host: host.to_string(),
        port,
        source,
    })
}

/// Listening TCP socket used by the stub peer, optionally terminating TLS.
pub struct WireListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    #[cfg(feature = "tls")]
    tls: Option<crate::tls::TlsAcceptor>,
    #[cfg(feature = "tls")]
    handshake_timeout: Duration,
}

impl WireListener {
    /// Bind and listen on `addr` (e.g. `127.0.0.1:5000`, or port `0` for an
    /// ephemeral port).
    pub fn bind(addr: &str) -> Result<Self> {
        let bind_err = |source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
            #[cfg(feature = "tls")]
            tls: None,
            #[cfg(feature = "tls")]
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Run a TLS handshake on every accepted connection.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, acceptor: crate::tls::TlsAcceptor) -> Self {
        info!(local_addr = %self.local_addr, "TLS enabled");
        self.tls = Some(acceptor);
        self
    }

    /// Budget for the server side of each TLS handshake. No effect on plain
    /// TCP.
    pub fn set_handshake_timeout(&mut self, timeout: Duration) {
        #[cfg(feature = "tls")]
        {
            self.handshake_timeout = timeout;
        }
        #[cfg(not(feature = "tls"))]
        let _ = timeout;
    }

    /// Accept an incoming connection (blocking).
    ///
    /// With TLS enabled a failed handshake is returned as
    /// [`TransportError::Tls`]; the listener itself stays usable.
    pub fn accept(&self) -> Result<WireStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        self.finish_accept(stream, peer)
    }

    /// Accept without blocking.
    ///
    /// Returns `Ok(None)` when no connection is pending. Requires
    /// [`WireListener::set_nonblocking`]; the accepted stream itself is
    /// always returned in blocking mode.
    pub fn try_accept(&self) -> Result<Option<WireStream>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                debug!(%peer, "accepted connection");
                self.finish_accept(stream, peer).map(Some)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    fn finish_accept(&self, stream: TcpStream, peer: SocketAddr) -> Result<WireStream> {
        #[cfg(feature = "tls")]
        if let Some(acceptor) = &self.tls {
            let stream = acceptor.accept(stream, peer, self.handshake_timeout)?;
            return Ok(WireStream::from_tls_server(stream, peer));
        }
        Ok(WireStream::from_tcp(stream, peer))
    }

    /// Switch the listening socket between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
