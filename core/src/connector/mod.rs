/*
 * mod.rs
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

//! Outbound HTTP(S) fetch over blocking sockets. A [`Connector`] resolves its
//! TLS configuration once at construction and then serves any number of
//! independent [`fetch`] calls: direct, via a forward proxy (absolute-URI
//! request target), or via CONNECT tunneling for TLS through a proxy. Every
//! response carries a freshly generated `Content-Signature` field; the body
//! is buffered, streamed to a caller sink, or offloaded to a file named
//! after the signature.
//!
//! [`fetch`]: Connector::fetch

mod stream;

pub use stream::{ClientIdentity, ConnectorStream, TlsProtocol, TrustMode};

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rustls::ClientConfig;

use crate::content::{Content, ContentBuilder};
use crate::pace::Pacer;
use crate::signature::{is_valid_signature, next_signature};

/// Response header scan ceiling; a header that does not terminate within this
/// many bytes is a protocol violation.
const MAX_RESPONSE_HEADER: usize = 65_536;

const USER_AGENT: &str = concat!("staffetta/", env!("CARGO_PKG_VERSION"));

/// Forward proxy endpoint.
#[derive(Debug, Clone)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

/// Immutable fetch parameters, resolved once at [`Connector::new`].
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    block_size: usize,
    interrupt_ms: u64,
    timeout_ms: u64,
    http_proxy: Option<ProxyAddress>,
    https_proxy: Option<ProxyAddress>,
    trust: TrustMode,
    tls_protocol: Option<TlsProtocol>,
    identity: Option<ClientIdentity>,
    storage_dir: PathBuf,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            block_size: 8192,
            interrupt_ms: 0,
            timeout_ms: 30_000,
            http_proxy: None,
            https_proxy: None,
            trust: TrustMode::Standard,
            tls_protocol: None,
            identity: None,
            storage_dir: std::env::temp_dir(),
        }
    }
}

impl ConnectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes per I/O block.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Milliseconds slept between blocks; 0 disables pacing.
    pub fn with_interrupt_ms(mut self, interrupt_ms: u64) -> Self {
        self.interrupt_ms = interrupt_ms;
        self
    }

    /// Socket connect/read/write timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.max(1);
        self
    }

    /// Forward proxy for plain HTTP fetches.
    pub fn with_http_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.http_proxy = Some(ProxyAddress {
            host: host.into(),
            port,
        });
        self
    }

    /// CONNECT proxy for HTTPS fetches.
    pub fn with_https_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.https_proxy = Some(ProxyAddress {
            host: host.into(),
            port,
        });
        self
    }

    pub fn with_trust(mut self, trust: TrustMode) -> Self {
        self.trust = trust;
        self
    }

    /// Pin TLS to a single protocol version; unset negotiates from rustls's
    /// default set.
    pub fn with_tls_protocol(mut self, protocol: TlsProtocol) -> Self {
        self.tls_protocol = Some(protocol);
        self
    }

    /// Client-certificate authentication material.
    pub fn with_identity(mut self, certificate: PathBuf, key: PathBuf) -> Self {
        self.identity = Some(ClientIdentity { certificate, key });
        self
    }

    /// Directory for offloaded response bodies.
    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = dir;
        self
    }
}

#[derive(Debug)]
pub enum ConnectorError {
    /// Scheme other than `http`/`https` in the fetch address.
    UnsupportedScheme(String),
    /// Method string is not an HTTP token.
    InvalidMethod(String),
    /// Host missing or unparsable.
    InvalidAddress(String),
    /// Signature failed validation before a storage path was built from it.
    InvalidSignature(String),
    /// The CONNECT proxy refused the tunnel.
    ProxyHandshake(String),
    /// Malformed or truncated response framing.
    Protocol(String),
    Tls(rustls::Error),
    Io(io::Error),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported scheme: {}", scheme)
            }
            ConnectorError::InvalidMethod(method) => {
                write!(f, "invalid HTTP method: {:?}", method)
            }
            ConnectorError::InvalidAddress(detail) => write!(f, "invalid address: {}", detail),
            ConnectorError::InvalidSignature(signature) => {
                write!(f, "invalid signature: {:?}", signature)
            }
            ConnectorError::ProxyHandshake(detail) => {
                write!(f, "proxy refused tunnel: {}", detail)
            }
            ConnectorError::Protocol(detail) => write!(f, "protocol error: {}", detail),
            ConnectorError::Tls(e) => write!(f, "TLS error: {}", e),
            ConnectorError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ConnectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectorError::Tls(e) => Some(e),
            ConnectorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConnectorError {
    fn from(e: io::Error) -> Self {
        ConnectorError::Io(e)
    }
}

/// Request body supplied by the caller.
pub enum RequestBody<'a> {
    None,
    /// Fixed bytes; `Content-Length` is synthesized.
    Bytes(&'a [u8]),
    /// Caller-managed stream; the caller's own headers must declare the
    /// length (or the peer must tolerate close-delimited bodies).
    Stream(&'a mut dyn Read),
}

/// Where the response body goes.
pub enum FetchMode<'a> {
    /// Buffer in memory; the returned [`Content`] carries the body.
    Memory,
    /// Stream to a caller sink; the returned [`Content`] has an empty body.
    Sink {
        sink: &'a mut dyn Write,
        include_header: bool,
    },
    /// Write to `connector-<signature>.content` under the storage directory.
    Offload,
}

struct Target {
    secure: bool,
    host: String,
    port: u16,
    path: String,
}

pub struct Connector {
    config: ConnectorConfig,
    tls: Arc<ClientConfig>,
}

impl Connector {
    /// Resolve TLS trust and identity once; fails fast on unreadable
    /// identity files.
    pub fn new(config: ConnectorConfig) -> Result<Connector, ConnectorError> {
        let tls =
            stream::client_config(&config.trust, config.tls_protocol, config.identity.as_ref())?;
        Ok(Connector { config, tls })
    }

    /// Fetch `address` and return the response as a signed [`Content`].
    ///
    /// `method` defaults to `GET`. `Host`, `User-Agent`, `Accept` and
    /// `Connection: close` are synthesized unless the caller supplies them.
    /// Caller misuse (bad scheme, bad method) is rejected before any I/O.
    pub fn fetch(
        &self,
        address: &str,
        method: Option<&str>,
        headers: &[(&str, &str)],
        body: RequestBody<'_>,
        mode: FetchMode<'_>,
    ) -> Result<Content, ConnectorError> {
        let target = parse_address(address)?;
        let method = method.unwrap_or("GET");
        validate_method(method)?;

        let mut stream = self.open_stream(&target)?;
        let request_target = match (target.secure, &self.config.http_proxy) {
            (false, Some(_)) => {
                format!("http://{}:{}{}", target.host, target.port, target.path)
            }
            _ => target.path.clone(),
        };
        self.write_request(&mut stream, &target, method, &request_target, headers, body)?;

        let header_bytes = read_header(&mut stream, MAX_RESPONSE_HEADER)?;
        let parsed = Content::parse(&header_bytes);
        if !parsed.is_complete() {
            return Err(ConnectorError::Protocol(
                "response header not terminated".to_string(),
            ));
        }
        let declared = parsed.content_length();
        let signature = next_signature();
        let signed = ContentBuilder::from_parsed(&parsed)
            .set_field("Content-Signature", signature.clone());

        let mut pacer = Pacer::new(self.config.interrupt_ms);
        match mode {
            FetchMode::Memory => {
                let mut buffer = Vec::new();
                self.transfer_body(&mut stream, declared, &mut buffer, &mut pacer)?;
                Ok(signed.body(Bytes::from(buffer)).build())
            }
            FetchMode::Sink {
                sink,
                include_header,
            } => {
                let content = signed.build();
                if include_header {
                    sink.write_all(content.raw_header().as_bytes())?;
                    sink.write_all(b"\r\n\r\n")?;
                }
                self.transfer_body(&mut stream, declared, sink, &mut pacer)?;
                sink.flush()?;
                Ok(content)
            }
            FetchMode::Offload => {
                let path = self.storage_file(&signature)?;
                fs::create_dir_all(&self.config.storage_dir)?;
                let mut file = File::create(&path)?;
                self.transfer_body(&mut stream, declared, &mut file, &mut pacer)?;
                file.flush()?;
                Ok(signed.build())
            }
        }
    }

    /// Offload file path for `signature`. The signature is validated before
    /// any path is composed from it.
    pub fn storage_file(&self, signature: &str) -> Result<PathBuf, ConnectorError> {
        if !is_valid_signature(signature) {
            return Err(ConnectorError::InvalidSignature(signature.to_string()));
        }
        Ok(self
            .config
            .storage_dir
            .join(format!("connector-{}.content", signature)))
    }

    /// Delete the offload file for `signature`, if present.
    pub fn remove_storage_file(&self, signature: &str) -> Result<(), ConnectorError> {
        let path = self.storage_file(signature)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Direct connection, forward-proxy connection, or CONNECT tunnel,
    /// upgraded to TLS for https targets.
    fn open_stream(&self, target: &Target) -> Result<ConnectorStream, ConnectorError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        if target.secure {
            let mut stream = match &self.config.https_proxy {
                Some(proxy) => {
                    let tcp = stream::connect_plain(&proxy.host, proxy.port, timeout)?;
                    let mut tunnel = ConnectorStream::Plain(tcp);
                    self.establish_tunnel(&mut tunnel, target)?;
                    tunnel
                }
                None => {
                    ConnectorStream::Plain(stream::connect_plain(&target.host, target.port, timeout)?)
                }
            };
            stream = stream.upgrade_to_tls(&target.host, self.tls.clone())?;
            Ok(stream)
        } else {
            let (host, port) = match &self.config.http_proxy {
                Some(proxy) => (proxy.host.as_str(), proxy.port),
                None => (target.host.as_str(), target.port),
            };
            Ok(ConnectorStream::Plain(stream::connect_plain(
                host, port, timeout,
            )?))
        }
    }

    /// Issue a plaintext CONNECT and discard the proxy's response header.
    fn establish_tunnel(
        &self,
        stream: &mut ConnectorStream,
        target: &Target,
    ) -> Result<(), ConnectorError> {
        let request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n",
            host = target.host,
            port = target.port,
        );
        stream.write_all(request.as_bytes())?;
        stream.flush()?;
        let header_bytes = read_header(stream, MAX_RESPONSE_HEADER)?;
        let response = Content::parse(&header_bytes);
        let status_line = response.start_line().unwrap_or("");
        let status = status_line.split_whitespace().nth(1).unwrap_or("");
        if status != "200" {
            return Err(ConnectorError::ProxyHandshake(status_line.to_string()));
        }
        Ok(())
    }

    fn write_request(
        &self,
        stream: &mut ConnectorStream,
        target: &Target,
        method: &str,
        request_target: &str,
        headers: &[(&str, &str)],
        body: RequestBody<'_>,
    ) -> Result<(), ConnectorError> {
        let has = |name: &str| headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name));
        let mut head = format!("{} {} HTTP/1.1\r\n", method, request_target);
        if !has("Host") {
            let default_port = if target.secure { 443 } else { 80 };
            if target.port == default_port {
                head.push_str(&format!("Host: {}\r\n", target.host));
            } else {
                head.push_str(&format!("Host: {}:{}\r\n", target.host, target.port));
            }
        }
        if !has("User-Agent") {
            head.push_str(&format!("User-Agent: {}\r\n", USER_AGENT));
        }
        if !has("Accept") {
            head.push_str("Accept: */*\r\n");
        }
        if !has("Connection") {
            head.push_str("Connection: close\r\n");
        }
        if let RequestBody::Bytes(bytes) = &body {
            if !has("Content-Length") {
                head.push_str(&format!("Content-Length: {}\r\n", bytes.len()));
            }
        }
        for (name, value) in headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        stream.write_all(head.as_bytes())?;

        let mut pacer = Pacer::new(self.config.interrupt_ms);
        match body {
            RequestBody::None => {}
            RequestBody::Bytes(bytes) => {
                for block in bytes.chunks(self.config.block_size) {
                    stream.write_all(block)?;
                    pacer.pace();
                }
            }
            RequestBody::Stream(reader) => {
                let mut buf = vec![0u8; self.config.block_size];
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    stream.write_all(&buf[..n])?;
                    pacer.pace();
                }
            }
        }
        stream.flush()?;
        Ok(())
    }

    /// Copy the response body to `sink`: exactly `declared` bytes when a
    /// length was announced, otherwise until the peer closes.
    fn transfer_body(
        &self,
        stream: &mut ConnectorStream,
        declared: Option<u64>,
        sink: &mut dyn Write,
        pacer: &mut Pacer,
    ) -> Result<u64, ConnectorError> {
        let mut buf = vec![0u8; self.config.block_size];
        let mut total: u64 = 0;
        loop {
            let want = match declared {
                Some(n) if total >= n => break,
                Some(n) => buf.len().min((n - total) as usize),
                None => buf.len(),
            };
            match stream.read(&mut buf[..want]) {
                Ok(0) => {
                    if let Some(n) = declared {
                        if total < n {
                            return Err(ConnectorError::Protocol(format!(
                                "peer closed after {} of {} body bytes",
                                total, n
                            )));
                        }
                    }
                    break;
                }
                Ok(read) => {
                    sink.write_all(&buf[..read])?;
                    total += read as u64;
                    pacer.pace();
                }
                // A peer that omits close_notify is tolerated for
                // close-delimited bodies.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && declared.is_none() => {
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }
}

/// Scheme/host/port/path split. Only `http`, `https`, or no scheme (taken as
/// `http`) are accepted.
fn parse_address(address: &str) -> Result<Target, ConnectorError> {
    let (secure, rest) = if let Some(rest) = address.strip_prefix("http://") {
        (false, rest)
    } else if let Some(rest) = address.strip_prefix("https://") {
        (true, rest)
    } else if let Some((scheme, _)) = address.split_once("://") {
        return Err(ConnectorError::UnsupportedScheme(scheme.to_string()));
    } else {
        (false, address)
    };
    let (authority, path) = match rest.find(['/', '?']) {
        Some(i) if rest.as_bytes()[i] == b'/' => (&rest[..i], rest[i..].to_string()),
        Some(i) => (&rest[..i], format!("/{}", &rest[i..])),
        None => (rest, "/".to_string()),
    };
    let default_port = if secure { 443 } else { 80 };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => {
            let port = p
                .parse::<u16>()
                .map_err(|_| ConnectorError::InvalidAddress(format!("port {:?}", p)))?;
            (h, port)
        }
        _ => (authority, default_port),
    };
    if host.is_empty() {
        return Err(ConnectorError::InvalidAddress(format!(
            "no host in {:?}",
            address
        )));
    }
    Ok(Target {
        secure,
        host: host.to_string(),
        port,
        path,
    })
}

/// Rejects anything that is not an RFC 7230 token.
fn validate_method(method: &str) -> Result<(), ConnectorError> {
    let token = !method.is_empty()
        && method
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if token {
        Ok(())
    } else {
        Err(ConnectorError::InvalidMethod(method.to_string()))
    }
}

/// Byte-by-byte scan to the first CRLFCRLF, bounded by `limit`.
fn read_header(stream: &mut dyn Read, limit: usize) -> Result<Vec<u8>, ConnectorError> {
    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte)? {
            0 => {
                return Err(ConnectorError::Protocol(
                    "peer closed during response header".to_string(),
                ))
            }
            _ => header.push(byte[0]),
        }
        if header.ends_with(b"\r\n\r\n") {
            return Ok(header);
        }
        if header.len() >= limit {
            return Err(ConnectorError::Protocol(format!(
                "response header exceeds {} bytes",
                limit
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_defaults() {
        let t = parse_address("example.org").unwrap();
        assert!(!t.secure);
        assert_eq!(t.host, "example.org");
        assert_eq!(t.port, 80);
        assert_eq!(t.path, "/");
    }

    #[test]
    fn https_address_with_port_and_path() {
        let t = parse_address("https://example.org:8443/a/b?q=1").unwrap();
        assert!(t.secure);
        assert_eq!(t.port, 8443);
        assert_eq!(t.path, "/a/b?q=1");
    }

    #[test]
    fn query_without_path_gets_a_root_path() {
        let t = parse_address("http://example.org?q=1").unwrap();
        assert_eq!(t.path, "/?q=1");
    }

    #[test]
    fn foreign_scheme_is_rejected() {
        assert!(matches!(
            parse_address("ftp://example.org/x"),
            Err(ConnectorError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(
            parse_address("http:///x"),
            Err(ConnectorError::InvalidAddress(_))
        ));
    }

    #[test]
    fn method_tokens() {
        assert!(validate_method("GET").is_ok());
        assert!(validate_method("PROPFIND").is_ok());
        assert!(validate_method("").is_err());
        assert!(validate_method("GET /").is_err());
        assert!(validate_method("G\u{e9}T").is_err());
    }

    #[test]
    fn pinned_tls_protocol_is_accepted_at_construction() {
        let config = ConnectorConfig::new().with_tls_protocol(TlsProtocol::Tls12);
        assert!(Connector::new(config).is_ok());
    }

    #[test]
    fn storage_path_requires_valid_signature() {
        let connector = Connector::new(
            ConnectorConfig::new().with_storage_dir(PathBuf::from("/tmp/staffetta")),
        )
        .unwrap();
        let path = connector.storage_file("m3k9x00000001").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/tmp/staffetta/connector-m3k9x00000001.content")
        );
        assert!(matches!(
            connector.storage_file("../../etc/passwd"),
            Err(ConnectorError::InvalidSignature(_))
        ));
    }

    #[test]
    fn removing_a_missing_storage_file_is_not_an_error() {
        let connector = Connector::new(
            ConnectorConfig::new().with_storage_dir(std::env::temp_dir()),
        )
        .unwrap();
        connector.remove_storage_file("zz9zz9zz9").unwrap();
    }

    #[test]
    fn read_header_stops_at_terminator() {
        let mut input = io::Cursor::new(b"HTTP/1.1 200 OK\r\nA: 1\r\n\r\nBODY".to_vec());
        let header = read_header(&mut input, MAX_RESPONSE_HEADER).unwrap();
        assert!(header.ends_with(b"\r\n\r\n"));
        assert_eq!(input.position() as usize, header.len());
    }

    #[test]
    fn read_header_bounds_the_scan() {
        let mut input = io::Cursor::new(vec![b'x'; 100]);
        assert!(matches!(
            read_header(&mut input, 50),
            Err(ConnectorError::Protocol(_))
        ));
    }
}
