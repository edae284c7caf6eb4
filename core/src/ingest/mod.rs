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

//! Streaming request-body decoder. Reads an inbound stream bounded by a
//! declared length, slices it at boundary markers into per-part header and
//! payload windows, and routes each part: file-bearing parts stream straight
//! to a storage file, ordinary parts fold into the parameter index in wire
//! order. The boundary token may straddle read-buffer edges, so a trailing
//! window of unconfirmed bytes is retained across reads; decoding is
//! invariant under read chunking.
//!
//! Bodies without a boundary in their content type are scanned as
//! `&`-delimited `name=value` pairs instead.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;


use crate::codec::{self, Coding};
use crate::fragment::{attributes_of, Fragment, FragmentDraft};
use crate::pace::Pacer;
use crate::signature::next_signature;

/// A part header block larger than this aborts the decode.
const MAX_PART_HEADER: usize = 65_536;

/// Engine parameters, resolved once per [`Ingest`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Bytes per read block.
    pub block_size: usize,
    /// Milliseconds slept per block (see [`Pacer`]); zero disables.
    pub interrupt_ms: u64,
    /// Directory for file-bearing part payloads; created when missing.
    pub storage_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            block_size: 8192,
            interrupt_ms: 0,
            storage_dir: std::env::temp_dir(),
        }
    }
}

impl IngestConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn with_interrupt_ms(mut self, interrupt_ms: u64) -> Self {
        self.interrupt_ms = interrupt_ms;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }
}

/// Decode failure. Storage files already written stay on disk; the caller
/// decides whether to clean up.
#[derive(Debug)]
pub enum IngestError {
    /// The stream violates the multipart framing (bad first boundary, junk
    /// after a boundary, oversized part header).
    MalformedFraming(String),
    /// End of stream before the declared length was delivered.
    PeerClosedEarly { consumed: u64, declared: u64 },
    /// The declared length ran out with a part still unterminated.
    LengthExceeded { declared: u64 },
    Io(io::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::MalformedFraming(msg) => {
                write!(f, "malformed multipart framing: {}", msg)
            }
            IngestError::PeerClosedEarly { consumed, declared } => {
                write!(
                    f,
                    "peer closed after {} of {} declared bytes",
                    consumed, declared
                )
            }
            IngestError::LengthExceeded { declared } => {
                write!(
                    f,
                    "multipart structure exceeds the declared length of {} bytes",
                    declared
                )
            }
            IngestError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(e: io::Error) -> Self {
        IngestError::Io(e)
    }
}

/// Decode result: the parameter index plus the file-backed fragments, both
/// in wire order.
#[derive(Debug, Default)]
pub struct Ingested {
    parameters: Vec<(String, Vec<u8>)>,
    files: Vec<Fragment>,
}

impl Ingested {
    /// First value recorded under `name`.
    pub fn parameter(&self, name: &str) -> Option<&[u8]> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// All values recorded under `name`, in arrival order.
    pub fn parameter_values(&self, name: &str) -> Vec<&[u8]> {
        self.parameters
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .collect()
    }

    /// Every parameter in arrival order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parameters
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// File-backed fragments in arrival order.
    pub fn files(&self) -> &[Fragment] {
        &self.files
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingFirstBoundary,
    ReadingPartHeader,
    ReadingPartBody,
    Done,
}

enum PartSink {
    Memory(Vec<u8>),
    File { file: File, path: PathBuf },
}

struct OpenPart {
    draft: FragmentDraft,
    sink: PartSink,
}

/// The streaming decoder. One instance can decode any number of bodies; each
/// decode owns its buffers exclusively for its lifetime.
#[derive(Debug)]
pub struct Ingest {
    config: IngestConfig,
}

impl Ingest {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Decode one request body of exactly `declared_length` bytes. The
    /// content type's `boundary` attribute selects multipart decoding;
    /// without one the body is scanned as `&`-delimited pairs.
    pub fn decode(
        &self,
        reader: &mut dyn Read,
        declared_length: u64,
        content_type: &str,
    ) -> Result<Ingested, IngestError> {
        match boundary_of(content_type) {
            Some(boundary) => {
                if !is_valid_boundary(&boundary) {
                    return Err(IngestError::MalformedFraming(format!(
                        "invalid boundary {:?}",
                        boundary
                    )));
                }
                self.decode_multipart(reader, declared_length, &boundary)
            }
            None => self.decode_simple(reader, declared_length),
        }
    }

    fn decode_multipart(
        &self,
        reader: &mut dyn Read,
        declared_length: u64,
        boundary: &str,
    ) -> Result<Ingested, IngestError> {
        let token = [b"\r\n--", boundary.as_bytes()].concat();
        let mut decoder = Decoder {
            token,
            storage_dir: self.config.storage_dir.clone(),
            declared: declared_length,
            state: State::SeekingFirstBoundary,
            buf: Vec::new(),
            part: None,
            out: Ingested::default(),
        };

        let mut pacer = Pacer::new(self.config.interrupt_ms);
        let mut block = vec![0u8; self.config.block_size.max(1)];
        let mut consumed: u64 = 0;

        loop {
            decoder.advance(consumed == declared_length)?;
            if consumed == declared_length {
                break;
            }
            let want = (declared_length - consumed).min(block.len() as u64) as usize;
            let n = reader.read(&mut block[..want])?;
            if n == 0 {
                if decoder.state == State::Done {
                    break;
                }
                return Err(IngestError::PeerClosedEarly {
                    consumed,
                    declared: declared_length,
                });
            }
            consumed += n as u64;
            decoder.buf.extend_from_slice(&block[..n]);
            pacer.pace();
        }

        if decoder.state != State::Done {
            return Err(IngestError::LengthExceeded {
                declared: declared_length,
            });
        }
        Ok(decoder.out)
    }

    /// `&`-delimited `name=value` scan for bodies without a boundary.
    fn decode_simple(
        &self,
        reader: &mut dyn Read,
        declared_length: u64,
    ) -> Result<Ingested, IngestError> {
        let mut pacer = Pacer::new(self.config.interrupt_ms);
        let mut block = vec![0u8; self.config.block_size.max(1)];
        let mut body = Vec::with_capacity(declared_length.min(1 << 20) as usize);
        let mut consumed: u64 = 0;
        while consumed < declared_length {
            let want = (declared_length - consumed).min(block.len() as u64) as usize;
            let n = reader.read(&mut block[..want])?;
            if n == 0 {
                return Err(IngestError::PeerClosedEarly {
                    consumed,
                    declared: declared_length,
                });
            }
            consumed += n as u64;
            body.extend_from_slice(&block[..n]);
            pacer.pace();
        }

        let mut out = Ingested::default();
        for pair in body.split(|&b| b == b'&') {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = match pair.iter().position(|&b| b == b'=') {
                Some(eq) => (&pair[..eq], &pair[eq + 1..]),
                None => (pair, &[][..]),
            };
            let name = String::from_utf8_lossy(&codec::decode(name, Coding::Mime)).into_owned();
            let value = codec::decode(value, Coding::Mime);
            out.parameters.push((name, value));
        }
        Ok(out)
    }
}

/// Per-decode state: the accumulation buffer holds bytes not yet classified
/// as confirmed payload or boundary; it never retains more than one token
/// length past the last confirmed payload byte while a part body is open.
struct Decoder {
    token: Vec<u8>,
    storage_dir: PathBuf,
    declared: u64,
    state: State,
    buf: Vec<u8>,
    part: Option<OpenPart>,
    out: Ingested,
}

impl Decoder {
    /// Consume as much of the buffer as the current state allows. With
    /// `at_end` set there is no more data coming.
    fn advance(&mut self, at_end: bool) -> Result<(), IngestError> {
        loop {
            match self.state {
                State::SeekingFirstBoundary => {
                    // The opening boundary has no CRLF prefix.
                    let first_len = self.token.len() - 2;
                    let known = self.buf.len().min(first_len);
                    if self.buf[..known] != self.token[2..2 + known] {
                        return Err(IngestError::MalformedFraming(
                            "body does not start with the declared boundary".to_string(),
                        ));
                    }
                    if self.buf.len() < first_len + 2 {
                        if at_end {
                            return Err(IngestError::MalformedFraming(
                                "body ends inside the opening boundary".to_string(),
                            ));
                        }
                        return Ok(());
                    }
                    match &self.buf[first_len..first_len + 2] {
                        b"\r\n" => {
                            self.buf.drain(..first_len + 2);
                            self.state = State::ReadingPartHeader;
                        }
                        b"--" => {
                            self.buf.drain(..first_len + 2);
                            self.state = State::Done;
                        }
                        other => {
                            return Err(IngestError::MalformedFraming(format!(
                                "unexpected bytes {:?} after the opening boundary",
                                other
                            )));
                        }
                    }
                }
                State::ReadingPartHeader => {
                    // A part with no header lines terminates with a bare CRLF.
                    if self.buf.starts_with(b"\r\n") {
                        self.buf.drain(..2);
                        self.open_part(FragmentDraft::parse(b"\r\n\r\n"))?;
                        self.state = State::ReadingPartBody;
                        continue;
                    }
                    match find_token(&self.buf, b"\r\n\r\n") {
                        Some(end) => {
                            let draft = FragmentDraft::parse(&self.buf[..end + 4]);
                            self.buf.drain(..end + 4);
                            self.open_part(draft)?;
                            self.state = State::ReadingPartBody;
                        }
                        None => {
                            if self.buf.len() > MAX_PART_HEADER {
                                return Err(IngestError::MalformedFraming(
                                    "part header exceeds size limit".to_string(),
                                ));
                            }
                            if at_end {
                                return Err(IngestError::LengthExceeded {
                                    declared: self.declared,
                                });
                            }
                            return Ok(());
                        }
                    }
                }
                State::ReadingPartBody => match find_token(&self.buf, &self.token) {
                    Some(pos) => {
                        if self.buf.len() < pos + self.token.len() + 2 {
                            // Full token but the suffix is still in flight:
                            // confirm the payload, keep the token.
                            self.flush_payload(pos)?;
                            self.buf.drain(..pos);
                            if at_end {
                                return Err(IngestError::LengthExceeded {
                                    declared: self.declared,
                                });
                            }
                            return Ok(());
                        }
                        let after = [
                            self.buf[pos + self.token.len()],
                            self.buf[pos + self.token.len() + 1],
                        ];
                        match &after {
                            b"\r\n" => {
                                self.flush_payload(pos)?;
                                self.buf.drain(..pos + self.token.len() + 2);
                                self.close_part()?;
                                self.state = State::ReadingPartHeader;
                            }
                            b"--" => {
                                self.flush_payload(pos)?;
                                self.buf.drain(..pos + self.token.len() + 2);
                                self.close_part()?;
                                self.state = State::Done;
                            }
                            _ => {
                                // Token text inside the payload, not a
                                // boundary: confirm one more byte, rescan.
                                self.flush_payload(pos + 1)?;
                                self.buf.drain(..pos + 1);
                            }
                        }
                    }
                    None => {
                        if at_end {
                            return Err(IngestError::LengthExceeded {
                                declared: self.declared,
                            });
                        }
                        let confirmed = self.buf.len().saturating_sub(self.token.len());
                        if confirmed > 0 {
                            self.flush_payload(confirmed)?;
                            self.buf.drain(..confirmed);
                        }
                        return Ok(());
                    }
                },
                State::Done => {
                    // Epilogue bytes are read and discarded.
                    self.buf.clear();
                    return Ok(());
                }
            }
        }
    }

    fn open_part(&mut self, draft: FragmentDraft) -> Result<(), IngestError> {
        let sink = if draft.is_file() {
            fs::create_dir_all(&self.storage_dir)?;
            let path = self
                .storage_dir
                .join(format!("fragment-{}.part", next_signature()));
            let file = File::create(&path)?;
            PartSink::File { file, path }
        } else {
            PartSink::Memory(Vec::new())
        };
        self.part = Some(OpenPart { draft, sink });
        Ok(())
    }

    fn flush_payload(&mut self, len: usize) -> Result<(), IngestError> {
        if len == 0 {
            return Ok(());
        }
        if let Some(part) = self.part.as_mut() {
            match &mut part.sink {
                PartSink::Memory(buf) => buf.extend_from_slice(&self.buf[..len]),
                PartSink::File { file, .. } => file.write_all(&self.buf[..len])?,
            }
        }
        Ok(())
    }

    fn close_part(&mut self) -> Result<(), IngestError> {
        if let Some(part) = self.part.take() {
            match part.sink {
                PartSink::Memory(content) => {
                    let name = part.draft.name().unwrap_or_default();
                    self.out.parameters.push((name, content));
                }
                PartSink::File { file, path } => {
                    // Close the handle before the fragment is exposed.
                    drop(file);
                    self.out.files.push(part.draft.into_stored(path));
                }
            }
        }
        Ok(())
    }
}

/// Boundary attribute of a content-type value, when declared.
fn boundary_of(content_type: &str) -> Option<String> {
    attributes_of(content_type)
        .into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| String::from_utf8_lossy(&v).into_owned())
}

/// RFC 2046 limits: 1..=70 chars from the boundary character set.
fn is_valid_boundary(boundary: &str) -> bool {
    !boundary.is_empty()
        && boundary.len() <= 70
        && boundary.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&b)
        })
        && !boundary.ends_with(' ')
}

fn find_token(buf: &[u8], token: &[u8]) -> Option<usize> {
    if token.is_empty() || buf.len() < token.len() {
        return None;
    }
    buf.windows(token.len()).position(|w| w == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn test_config() -> IngestConfig {
        IngestConfig::default()
            .with_storage_dir(std::env::temp_dir().join("staffetta-ingest-tests"))
    }

    fn multipart_body(boundary: &str, parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (i, (header, payload)) in parts.iter().enumerate() {
            if i > 0 {
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(header.as_bytes());
            body.extend_from_slice(b"\r\n\r\n");
            body.extend_from_slice(payload);
        }
        body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
        body
    }

    #[test]
    fn two_plain_parts_become_parameters() {
        let body = multipart_body(
            "sep",
            &[
                ("Content-Disposition: form-data; name=\"a\"", b"one"),
                ("Content-Disposition: form-data; name=\"b\"", b"two"),
            ],
        );
        let ingest = Ingest::new(test_config());
        let out = ingest
            .decode(&mut Cursor::new(&body), body.len() as u64, "multipart/form-data; boundary=sep")
            .unwrap();
        assert_eq!(out.parameter("a"), Some(b"one".as_ref()));
        assert_eq!(out.parameter("b"), Some(b"two".as_ref()));
        assert!(out.files().is_empty());
    }

    #[test]
    fn repeated_names_preserve_arrival_order() {
        let body = multipart_body(
            "sep",
            &[
                ("Content-Disposition: form-data; name=\"x\"", b"first"),
                ("Content-Disposition: form-data; name=\"x\"", b"second"),
            ],
        );
        let ingest = Ingest::new(test_config());
        let out = ingest
            .decode(&mut Cursor::new(&body), body.len() as u64, "multipart/form-data; boundary=sep")
            .unwrap();
        assert_eq!(
            out.parameter_values("x"),
            vec![b"first".as_ref(), b"second".as_ref()]
        );
    }

    #[test]
    fn file_part_goes_to_disk_not_parameters() {
        let body = multipart_body(
            "sep",
            &[(
                "Content-Disposition: form-data; name=\"up\"; filename=\"u.bin\"",
                b"\x00\x01binary\xFF",
            )],
        );
        let ingest = Ingest::new(test_config());
        let out = ingest
            .decode(&mut Cursor::new(&body), body.len() as u64, "multipart/form-data; boundary=sep")
            .unwrap();
        assert!(out.parameter("up").is_none());
        assert_eq!(out.files().len(), 1);
        let fragment = &out.files()[0];
        assert_eq!(fragment.filename().as_deref(), Some("u.bin"));
        let stored = fs::read(fragment.storage().unwrap()).unwrap();
        assert_eq!(stored, b"\x00\x01binary\xFF");
        fs::remove_file(fragment.storage().unwrap()).unwrap();
    }

    #[test]
    fn payload_containing_boundary_prefix_survives() {
        let payload = b"text with \r\n--sep-like line inside";
        let body = multipart_body(
            "sep",
            &[("Content-Disposition: form-data; name=\"t\"", payload)],
        );
        let ingest = Ingest::new(test_config());
        let out = ingest
            .decode(&mut Cursor::new(&body), body.len() as u64, "multipart/form-data; boundary=sep")
            .unwrap();
        assert_eq!(out.parameter("t"), Some(payload.as_ref()));
    }

    #[test]
    fn leading_junk_is_a_framing_error() {
        let mut body = b"junk".to_vec();
        body.extend_from_slice(&multipart_body(
            "sep",
            &[("Content-Disposition: form-data; name=\"a\"", b"x")],
        ));
        let ingest = Ingest::new(test_config());
        let err = ingest
            .decode(&mut Cursor::new(&body), body.len() as u64, "multipart/form-data; boundary=sep")
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedFraming(_)));
    }

    #[test]
    fn truncated_stream_is_peer_closed_early() {
        let body = multipart_body(
            "sep",
            &[("Content-Disposition: form-data; name=\"a\"", b"x")],
        );
        let ingest = Ingest::new(test_config());
        let err = ingest
            .decode(
                &mut Cursor::new(&body[..body.len() - 10]),
                body.len() as u64,
                "multipart/form-data; boundary=sep",
            )
            .unwrap_err();
        assert!(matches!(err, IngestError::PeerClosedEarly { .. }));
    }

    #[test]
    fn unterminated_part_at_declared_length_is_length_exceeded() {
        let body = multipart_body(
            "sep",
            &[("Content-Disposition: form-data; name=\"a\"", b"x")],
        );
        // Declare less than the structure needs; the stream happily provides it.
        let declared = (body.len() - 10) as u64;
        let ingest = Ingest::new(test_config());
        let err = ingest
            .decode(&mut Cursor::new(&body), declared, "multipart/form-data; boundary=sep")
            .unwrap_err();
        assert!(matches!(err, IngestError::LengthExceeded { .. }));
    }

    #[test]
    fn empty_multipart_closes_immediately() {
        let body = b"--sep--".to_vec();
        let ingest = Ingest::new(test_config());
        let out = ingest
            .decode(&mut Cursor::new(&body), body.len() as u64, "multipart/form-data; boundary=sep")
            .unwrap();
        assert_eq!(out.parameters().count(), 0);
        assert!(out.files().is_empty());
    }

    #[test]
    fn simple_body_scans_ampersand_pairs() {
        let body = b"a=1&b=two+words&empty=&flag&pct=%41%42";
        let ingest = Ingest::new(test_config());
        let out = ingest
            .decode(
                &mut Cursor::new(&body[..]),
                body.len() as u64,
                "application/x-www-form-urlencoded",
            )
            .unwrap();
        assert_eq!(out.parameter("a"), Some(b"1".as_ref()));
        assert_eq!(out.parameter("b"), Some(b"two words".as_ref()));
        assert_eq!(out.parameter("empty"), Some(b"".as_ref()));
        assert_eq!(out.parameter("flag"), Some(b"".as_ref()));
        assert_eq!(out.parameter("pct"), Some(b"AB".as_ref()));
    }

    #[test]
    fn invalid_boundary_is_rejected() {
        let ingest = Ingest::new(test_config());
        let err = ingest
            .decode(&mut Cursor::new(b""), 0, "multipart/form-data; boundary=\"\"")
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedFraming(_)));
    }
}
