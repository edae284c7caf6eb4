/*
 * stream.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, an HTTP content codec and transfer library.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Socket and TLS plumbing for the connector: one blocking stream per fetch,
//! plain TCP or rustls over TCP. The root store prefers platform native
//! certificates with the Mozilla roots as fallback; the `Ignore` trust mode
//! swaps in a verifier that accepts any peer certificate. A plain stream can
//! be upgraded to TLS in place, which is how CONNECT tunneling layers the
//! handshake over an established proxy connection.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, StreamOwned};

use super::ConnectorError;

/// TLS protocol pin. Unset, the connector negotiates from rustls's default
/// version set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsProtocol {
    Tls12,
    Tls13,
}

impl TlsProtocol {
    fn versions(self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        static TLS12_ONLY: [&rustls::SupportedProtocolVersion; 1] = [&rustls::version::TLS12];
        static TLS13_ONLY: [&rustls::SupportedProtocolVersion; 1] = [&rustls::version::TLS13];
        match self {
            TlsProtocol::Tls12 => &TLS12_ONLY,
            TlsProtocol::Tls13 => &TLS13_ONLY,
        }
    }
}

/// Peer certificate policy for HTTPS fetches.
#[derive(Debug, Clone)]
pub enum TrustMode {
    /// Platform validation: native certificates, Mozilla roots as fallback.
    Standard,
    /// Accept any peer certificate without validation.
    Ignore,
    /// Caller-supplied verifier.
    Custom(Arc<dyn ServerCertVerifier>),
}

/// Optional client-certificate authentication material (PEM files).
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// One blocking connection: plain TCP or TLS over TCP.
pub enum ConnectorStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl ConnectorStream {
    /// Upgrade a plain stream to TLS on the same connection. For CONNECT
    /// tunnels `host` is the origin server, not the proxy.
    pub fn upgrade_to_tls(
        self,
        host: &str,
        config: Arc<ClientConfig>,
    ) -> Result<ConnectorStream, ConnectorError> {
        let tcp = match self {
            ConnectorStream::Plain(tcp) => tcp,
            ConnectorStream::Tls(_) => return Ok(self),
        };
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| ConnectorError::InvalidAddress(format!("invalid host name {:?}", host)))?;
        let connection =
            ClientConnection::new(config, server_name).map_err(ConnectorError::Tls)?;
        Ok(ConnectorStream::Tls(Box::new(StreamOwned::new(
            connection, tcp,
        ))))
    }
}

impl Read for ConnectorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ConnectorStream::Plain(s) => s.read(buf),
            ConnectorStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for ConnectorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ConnectorStream::Plain(s) => s.write(buf),
            ConnectorStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ConnectorStream::Plain(s) => s.flush(),
            ConnectorStream::Tls(s) => s.flush(),
        }
    }
}

/// Connect with the configured timeout applied to connect, read, and write.
pub fn connect_plain(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error =
        io::Error::new(io::ErrorKind::InvalidInput, format!("no address for {}", host));
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(Some(timeout))?;
                tcp.set_write_timeout(Some(timeout))?;
                return Ok(tcp);
            }
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

/// Root certificate store: platform native certs first, Mozilla roots when
/// none load.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = root_store.add(cert);
        }
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

/// Resolve the TLS client configuration once, from trust mode, optional
/// protocol pin, and optional client identity.
pub fn client_config(
    trust: &TrustMode,
    protocol: Option<TlsProtocol>,
    identity: Option<&ClientIdentity>,
) -> Result<Arc<ClientConfig>, ConnectorError> {
    let base = match protocol {
        Some(p) => ClientConfig::builder_with_protocol_versions(p.versions()),
        None => ClientConfig::builder(),
    };
    let builder = match trust {
        TrustMode::Standard => base.with_root_certificates(build_root_store()),
        TrustMode::Ignore => base
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert)),
        TrustMode::Custom(verifier) => base
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone()),
    };
    let config = match identity {
        Some(identity) => {
            let certs = load_certificates(&identity.certificate)?;
            let key = load_private_key(&identity.key)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(ConnectorError::Tls)?
        }
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConnectorError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(ConnectorError::InvalidAddress(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConnectorError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        ConnectorError::InvalidAddress(format!("no private key in {}", path.display()))
    })
}

/// Verifier for the `Ignore` trust mode: every certificate passes.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_modes_build_configs() {
        assert!(client_config(&TrustMode::Standard, None, None).is_ok());
        assert!(client_config(&TrustMode::Ignore, None, None).is_ok());
    }

    #[test]
    fn protocol_pin_selects_a_single_version() {
        let v12 = TlsProtocol::Tls12.versions();
        assert_eq!(v12.len(), 1);
        assert_eq!(v12[0].version, rustls::ProtocolVersion::TLSv1_2);
        let v13 = TlsProtocol::Tls13.versions();
        assert_eq!(v13.len(), 1);
        assert_eq!(v13[0].version, rustls::ProtocolVersion::TLSv1_3);
    }

    #[test]
    fn protocol_pin_builds_configs() {
        assert!(client_config(&TrustMode::Ignore, Some(TlsProtocol::Tls12), None).is_ok());
        assert!(client_config(&TrustMode::Standard, Some(TlsProtocol::Tls13), None).is_ok());
    }

    #[test]
    fn missing_identity_files_are_reported() {
        let identity = ClientIdentity {
            certificate: PathBuf::from("/does/not/exist.pem"),
            key: PathBuf::from("/does/not/exist.key"),
        };
        assert!(client_config(&TrustMode::Standard, None, Some(&identity)).is_err());
    }
}
