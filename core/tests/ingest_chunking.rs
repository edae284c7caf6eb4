/*
 * ingest_chunking.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration test for the multipart ingest engine. Decodes the same body
 * under different read granularities and verifies that boundary detection is
 * independent of how the stream is chunked.
 *
 * Run with:
 *   cargo test -p staffetta_core --test ingest_chunking
 */

use std::fs;
use std::io::Read;

use staffetta_core::ingest::{Ingest, IngestConfig};

/// Serves at most `chunk` bytes per read call.
struct ChunkedReader<'a> {
    data: &'a [u8],
    pos: usize,
    chunk: usize,
}

impl<'a> ChunkedReader<'a> {
    fn new(data: &'a [u8], chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk,
        }
    }
}

impl Read for ChunkedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf
            .len()
            .min(self.chunk)
            .min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn build_body(boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
    body.extend_from_slice(b"a value with \r\n--bound-ish text inside");
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
    body.extend_from_slice(b"second value");
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"upload\"; filename=\"blob.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n",
    );
    body.extend_from_slice(&[0u8, 1, 2, 3, 255, 254, b'-', b'-', 13, 10]);
    body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
    body
}

#[test]
fn decode_is_invariant_under_read_granularity() {
    let boundary = "bound";
    let body = build_body(boundary);
    let content_type = format!("multipart/form-data; boundary={}", boundary);
    let storage = std::env::temp_dir().join("staffetta-chunking-test");
    let ingest = Ingest::new(
        IngestConfig::default()
            .with_block_size(11)
            .with_storage_dir(&storage),
    );

    let mut decoded = Vec::new();
    for chunk in [1usize, 7, body.len()] {
        let mut reader = ChunkedReader::new(&body, chunk);
        let out = ingest
            .decode(&mut reader, body.len() as u64, &content_type)
            .unwrap();
        decoded.push(out);
    }

    let expected_values = vec![
        b"a value with \r\n--bound-ish text inside".as_ref(),
        b"second value".as_ref(),
    ];
    for out in &decoded {
        assert_eq!(out.parameter_values("title"), expected_values);
        assert!(out.parameter("upload").is_none());
        assert_eq!(out.files().len(), 1);
        let fragment = &out.files()[0];
        assert_eq!(fragment.filename().as_deref(), Some("blob.bin"));
        let stored = fs::read(fragment.storage().unwrap()).unwrap();
        assert_eq!(stored, [0u8, 1, 2, 3, 255, 254, b'-', b'-', 13, 10]);
    }

    for out in &decoded {
        for fragment in out.files() {
            let _ = fs::remove_file(fragment.storage().unwrap());
        }
    }
}

#[test]
fn file_payloads_match_across_granularities() {
    // A payload ending just short of a full boundary token forces the
    // unconfirmed-tail window to carry bytes between reads.
    let boundary = "xYz0";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"f\"; filename=\"t.txt\"\r\n\r\n",
    );
    body.extend_from_slice(b"tail\r\n--xY");
    body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
    let content_type = format!("multipart/form-data; boundary={}", boundary);
    let storage = std::env::temp_dir().join("staffetta-chunking-test");
    let ingest = Ingest::new(IngestConfig::default().with_storage_dir(&storage));

    for chunk in [1usize, 3, body.len()] {
        let mut reader = ChunkedReader::new(&body, chunk);
        let out = ingest
            .decode(&mut reader, body.len() as u64, &content_type)
            .unwrap();
        assert_eq!(out.files().len(), 1);
        let path = out.files()[0].storage().unwrap().to_path_buf();
        assert_eq!(fs::read(&path).unwrap(), b"tail\r\n--xY");
        let _ = fs::remove_file(path);
    }
}
