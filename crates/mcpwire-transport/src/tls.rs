//! TLS on top of the TCP stream.
//!
//! [`TlsOptions`] is always available so callers can carry the setting
//! around; the handshake itself needs the `tls` feature (rustls with the
//! `ring` provider). Clients trust the bundled Mozilla roots plus an optional
//! CA file. `accept_self_signed` switches certificate and host name checks off
//! for servers running on throwaway certificates.

use std::path::PathBuf;

#[cfg(feature = "tls")]
use std::io::ErrorKind;
#[cfg(feature = "tls")]
use std::net::{SocketAddr, TcpStream};
#[cfg(feature = "tls")]
use std::path::Path;
#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use std::time::{Duration, Instant};

#[cfg(feature = "tls")]
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
#[cfg(feature = "tls")]
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
#[cfg(feature = "tls")]
use rustls::pki_types::pem::PemObject;
#[cfg(feature = "tls")]
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
#[cfg(feature = "tls")]
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, ServerConfig,
    ServerConnection, SignatureScheme, StreamOwned,
};
#[cfg(feature = "tls")]
use tracing::{debug, warn};

#[cfg(feature = "tls")]
use crate::error::{Result, TransportError};
#[cfg(feature = "tls")]
use crate::tcp::remaining;

/// Client-side TLS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Skip certificate chain and host name verification.
    pub accept_self_signed: bool,
    /// PEM bundle of additional trusted CA certificates.
    pub ca_file: Option<PathBuf>,
}

#[cfg(feature = "tls")]
pub(crate) type ClientStream = StreamOwned<ClientConnection, TcpStream>;
#[cfg(feature = "tls")]
pub(crate) type ServerStream = StreamOwned<ServerConnection, TcpStream>;

#[cfg(feature = "tls")]
fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build the rustls client configuration for `options`.
#[cfg(feature = "tls")]
pub fn client_config(options: &TlsOptions) -> Result<Arc<ClientConfig>> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|err| TransportError::TlsConfig(err.to_string()))?;

    let config = if options.accept_self_signed {
        warn!("TLS certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    } else {
        let mut roots: RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
        if let Some(path) = &options.ca_file {
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|err| config_error(path, err))?;
            }
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(Arc::new(config))
}

/// The name the server certificate must match: a DNS name or an IP address.
#[cfg(feature = "tls")]
pub(crate) fn server_name(host: &str, port: u16) -> Result<ServerName<'static>> {
    ServerName::try_from(host)
        .map(|name| name.to_owned())
        .map_err(|err| TransportError::Tls {
            host: host.to_string(),
            port,
            reason: err.to_string(),
        })
}

/// Run the client handshake on a connected socket before `deadline`.
#[cfg(feature = "tls")]
pub(crate) fn client_handshake(
    tcp: TcpStream,
    host: &str,
    port: u16,
    options: &TlsOptions,
    deadline: Instant,
    timeout: Duration,
) -> Result<ClientStream> {
    let failed = |reason: String| TransportError::Tls {
        host: host.to_string(),
        port,
        reason,
    };

    let conn = ClientConnection::new(client_config(options)?, server_name(host, port)?)
        .map_err(|err| failed(err.to_string()))?;
    let mut stream = StreamOwned::new(conn, tcp);
    while stream.conn.is_handshaking() {
        handshake_budget(&stream.sock, deadline)
            .and_then(|()| stream.conn.complete_io(&mut stream.sock).map(drop))
            .map_err(|err| match err.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::ConnectTimeout {
                    host: host.to_string(),
                    port,
                    timeout,
                },
                _ => failed(err.to_string()),
            })?;
    }
    clear_timeouts(&stream.sock)?;

    debug!(host, port, version = ?stream.conn.protocol_version(), "TLS established");
    Ok(stream)
}

/// Narrow both socket timeouts to what is left of the handshake budget.
#[cfg(feature = "tls")]
fn handshake_budget(sock: &TcpStream, deadline: Instant) -> std::io::Result<()> {
    let left = remaining(deadline).ok_or_else(|| std::io::Error::from(ErrorKind::TimedOut))?;
    sock.set_read_timeout(Some(left))?;
    sock.set_write_timeout(Some(left))
}

#[cfg(feature = "tls")]
fn clear_timeouts(sock: &TcpStream) -> Result<()> {
    sock.set_read_timeout(None)?;
    sock.set_write_timeout(None)?;
    Ok(())
}

/// Server-side TLS: certificate chain and private key.
#[cfg(feature = "tls")]
#[derive(Debug, Clone)]
pub struct TlsAcceptor {
    config: Arc<ServerConfig>,
}

#[cfg(feature = "tls")]
impl TlsAcceptor {
    /// Load a PEM certificate chain and a PEM private key (PKCS#1, PKCS#8 or SEC1).
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let certs = load_certs(cert_path)?;
        let key =
            PrivateKeyDer::from_pem_file(key_path).map_err(|err| config_error(key_path, err))?;
        Self::new(certs, key)
    }

    /// Build an acceptor from DER certificates and key.
    pub fn new(certs: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Result<Self> {
        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .and_then(|builder| builder.with_no_client_auth().with_single_cert(certs, key))
            .map_err(|err| TransportError::TlsConfig(err.to_string()))?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Run the server handshake on an accepted socket within `timeout`.
    pub(crate) fn accept(
        &self,
        tcp: TcpStream,
        peer: SocketAddr,
        timeout: Duration,
    ) -> Result<ServerStream> {
        let failed = |reason: String| TransportError::Tls {
            host: peer.ip().to_string(),
            port: peer.port(),
            reason,
        };

        let deadline = crate::tcp::deadline_after(timeout);
        let conn =
            ServerConnection::new(Arc::clone(&self.config)).map_err(|err| failed(err.to_string()))?;
        let mut stream = StreamOwned::new(conn, tcp);
        while stream.conn.is_handshaking() {
            handshake_budget(&stream.sock, deadline)
                .and_then(|()| stream.conn.complete_io(&mut stream.sock).map(drop))
                .map_err(|err| failed(err.to_string()))?;
        }
        clear_timeouts(&stream.sock)?;

        debug!(%peer, version = ?stream.conn.protocol_version(), "TLS accepted");
        Ok(stream)
    }
}

#[cfg(feature = "tls")]
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|certs| certs.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|err| config_error(path, err))?;
    if certs.is_empty() {
        return Err(config_error(path, "no certificates found"));
    }
    Ok(certs)
}

#[cfg(feature = "tls")]
fn config_error(path: &Path, err: impl std::fmt::Display) -> TransportError {
    TransportError::TlsConfig(format!("{}: {err}", path.display()))
}

/// Verifier behind `accept_self_signed`: any certificate, any name.
///
/// Handshake signatures are still checked, so the peer must hold the key for
/// the certificate it presents.
#[cfg(feature = "tls")]
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

#[cfg(feature = "tls")]
impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
