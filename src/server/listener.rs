// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Listener sockets: address parsing, Unix-socket and TCP+TLS setup.
//!
//! Grounded on `original_source/src/frontend/sock.c` (`get_type`,
//! `open_unixsock`, `open_tcp`): directory auto-creation and stale-file
//! removal for Unix sockets, first-successful-bind address iteration for
//! TCP.

use crate::config::TlsConfig;
use crate::Error;
use socket2::{Domain, Socket, Type};
use std::net::ToSocketAddrs;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A parsed `listen` address (spec.md §6: `unix:/abs/path`, `tcp:host:port`,
/// or a bare `host:port` which defaults to TCP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Unix(PathBuf),
    Tcp(String),
}

/// Parses a `listen` address string (spec.md §6).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the address has neither a recognized
/// prefix nor the shape of a bare `host:port`.
pub fn parse_listen_address(s: &str) -> crate::Result<ListenAddress> {
    if let Some(path) = s.strip_prefix("unix:") {
        return Ok(ListenAddress::Unix(PathBuf::from(path)));
    }
    if let Some(addr) = s.strip_prefix("tcp:") {
        return Ok(ListenAddress::Tcp(addr.to_string()));
    }
    if s.contains(':') {
        return Ok(ListenAddress::Tcp(s.to_string()));
    }
    Err(Error::Protocol(format!("cannot parse listen address '{s}'")))
}

/// A bound, listening socket plus whatever protocol-specific setup it needs.
pub enum Listener {
    Unix(UnixListener),
    Tcp {
        socket: std::net::TcpListener,
        tls: Arc<rustls::ServerConfig>,
    },
}

impl Listener {
    /// Opens `address`, creating parent directories and removing a stale
    /// socket file for `unix:` addresses, or binding the first resolvable
    /// address for `tcp:` ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on bind/listen failure, or [`Error::Protocol`]
    /// if a `tcp:` address has no TLS configuration or cannot be resolved.
    pub fn open(address: &ListenAddress, tls: Option<&TlsConfig>) -> crate::Result<Self> {
        match address {
            ListenAddress::Unix(path) => Ok(Self::Unix(open_unix(path)?)),
            ListenAddress::Tcp(addr) => {
                let tls = tls.ok_or_else(|| {
                    Error::Protocol(format!("tcp listener '{addr}' has no [listen.tls] section"))
                })?;
                let socket = open_tcp(addr)?;
                let server_config = build_tls_config(tls)?;
                Ok(Self::Tcp {
                    socket,
                    tls: Arc::new(server_config),
                })
            }
        }
    }
}

fn open_unix(path: &Path) -> crate::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) | Err(_) => {}
    }
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    socket.bind(&socket2::SockAddr::unix(path)?)?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn open_tcp(addr: &str) -> crate::Result<std::net::TcpListener> {
    let mut last_err = None;
    for resolved in addr.to_socket_addrs()? {
        let domain = if resolved.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        match socket.bind(&resolved.into()) {
            Ok(()) => {
                socket.listen(128)?;
                socket.set_nonblocking(true)?;
                return Ok(socket.into());
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .map(Error::from)
        .unwrap_or_else(|| Error::Protocol(format!("address '{addr}' resolved to no candidates"))))
}

fn build_tls_config(tls: &TlsConfig) -> crate::Result<rustls::ServerConfig> {
    use rustls::server::WebPkiClientVerifier;
    use rustls::RootCertStore;

    let certs = load_certs(&tls.cert_file)?;
    let key = load_private_key(&tls.key_file)?;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(&tls.ca_file)? {
        roots
            .add(cert)
            .map_err(|e| Error::Protocol(format!("invalid CA certificate: {e}")))?;
    }

    let mut verifier_builder = WebPkiClientVerifier::builder(Arc::new(roots));
    if let Some(crl_file) = &tls.crl_file {
        verifier_builder = verifier_builder.with_crls(load_crls(crl_file)?);
    }
    let verifier = verifier_builder
        .build()
        .map_err(|e| Error::Protocol(format!("cannot build client verifier: {e}")))?;

    rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| Error::Protocol(format!("invalid TLS cert/key pair: {e}")))
}

fn load_certs(path: &Path) -> crate::Result<Vec<rustls_pki_types::CertificateDer<'static>>> {
    let bytes = std::fs::read(path)?;
    rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Protocol(format!("invalid certificate file {}: {e}", path.display())))
}

/// Loads a PEM-encoded certificate revocation list (spec.md §6: "optionally
/// a CRL"), wired into `WebPkiClientVerifier` so revoked client certs are
/// rejected at handshake time.
fn load_crls(path: &Path) -> crate::Result<Vec<rustls_pki_types::CertificateRevocationListDer<'static>>> {
    let bytes = std::fs::read(path)?;
    rustls_pemfile::crls(&mut bytes.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Protocol(format!("invalid CRL file {}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> crate::Result<rustls_pki_types::PrivateKeyDer<'static>> {
    let bytes = std::fs::read(path)?;
    rustls_pemfile::private_key(&mut bytes.as_slice())
        .map_err(|e| Error::Protocol(format!("invalid key file {}: {e}", path.display())))?
        .ok_or_else(|| Error::Protocol(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_address() {
        assert_eq!(
            parse_listen_address("unix:/run/sysdbd.sock").unwrap(),
            ListenAddress::Unix(PathBuf::from("/run/sysdbd.sock"))
        );
    }

    #[test]
    fn parses_tcp_address() {
        assert_eq!(
            parse_listen_address("tcp:0.0.0.0:12345").unwrap(),
            ListenAddress::Tcp("0.0.0.0:12345".to_string())
        );
    }

    #[test]
    fn bare_address_defaults_to_tcp() {
        assert_eq!(
            parse_listen_address("127.0.0.1:12345").unwrap(),
            ListenAddress::Tcp("127.0.0.1:12345".to_string())
        );
    }

    #[test]
    fn rejects_unrecognized_address() {
        assert!(parse_listen_address("bogus").is_err());
    }

    #[test]
    fn unix_listener_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("nested").join("sysdbd.sock");
        let listener = open_unix(&sock_path).unwrap();
        assert!(sock_path.exists());
        drop(listener);
    }
}
