/*
 * content.rs
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

//! A finished byte buffer shaped as `HEADER-LINES CRLF CRLF BODY`, split into
//! an ordered case-insensitive field index plus raw body bytes. Used both for
//! fetched HTTP responses and for assembling outbound requests. Parsed once,
//! immutable after; [`ContentBuilder`] produces synthesized values.

use bytes::Bytes;

/// A header line longer than this clears the `correct` flag; parsing continues.
pub const MAX_HEADER_LINE: usize = 32_768;

const TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone)]
pub struct Content {
    start_line: Option<String>,
    fields: Vec<(String, String)>,
    raw_header: String,
    body: Bytes,
    complete: bool,
    correct: bool,
}

impl Content {
    /// Split `data` at the first CRLFCRLF. Without a terminator the result is
    /// incomplete: empty body, the whole input retained as unparsed header
    /// text. Never fails.
    pub fn parse(data: &[u8]) -> Content {
        match find_terminator(data) {
            Some(end) => {
                let raw_header = String::from_utf8_lossy(&data[..end]).into_owned();
                let body = Bytes::copy_from_slice(&data[end + TERMINATOR.len()..]);
                let (start_line, fields, correct) = parse_header(&raw_header);
                Content {
                    start_line,
                    fields,
                    raw_header,
                    body,
                    complete: true,
                    correct,
                }
            }
            None => Content {
                start_line: None,
                fields: Vec::new(),
                raw_header: String::from_utf8_lossy(data).into_owned(),
                body: Bytes::new(),
                complete: false,
                correct: false,
            },
        }
    }

    /// True iff a full CRLFCRLF terminator was found.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// True iff complete and no header line exceeded [`MAX_HEADER_LINE`].
    pub fn is_correct(&self) -> bool {
        self.correct
    }

    /// The header text exactly as received (or the entire input when
    /// incomplete).
    pub fn raw_header(&self) -> &str {
        &self.raw_header
    }

    /// First header line when it is not a `Name: value` field (e.g. an HTTP
    /// status line).
    pub fn start_line(&self) -> Option<&str> {
        self.start_line.as_deref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// First value of `name`, case-insensitive. Absent fields yield `None`,
    /// never an error.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of `name` in header order.
    pub fn field_values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All fields in header order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parsed `Content-Length` field, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.field("Content-Length")?.trim().parse().ok()
    }
}

/// Assembles a synthesized [`Content`] (parsed inbound fields, replaced or
/// added fields, body) so the exposed value is built once and immutable.
#[derive(Debug, Default)]
pub struct ContentBuilder {
    start_line: Option<String>,
    fields: Vec<(String, String)>,
    body: Bytes,
}

impl ContentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a parsed header: start line and fields are carried over.
    pub fn from_parsed(content: &Content) -> Self {
        Self {
            start_line: content.start_line.clone(),
            fields: content.fields.clone(),
            body: Bytes::new(),
        }
    }

    pub fn start_line(mut self, line: impl Into<String>) -> Self {
        self.start_line = Some(line.into());
        self
    }

    /// Append a field, keeping any existing same-named fields.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Replace every field of this name (case-insensitive) with a single one.
    pub fn set_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.fields.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Content {
        let mut raw_header = String::new();
        if let Some(line) = &self.start_line {
            raw_header.push_str(line);
        }
        for (name, value) in &self.fields {
            if !raw_header.is_empty() {
                raw_header.push_str("\r\n");
            }
            raw_header.push_str(name);
            raw_header.push_str(": ");
            raw_header.push_str(value);
        }
        let correct = raw_header
            .split("\r\n")
            .all(|line| line.len() <= MAX_HEADER_LINE);
        Content {
            start_line: self.start_line,
            fields: self.fields,
            raw_header,
            body: self.body,
            complete: true,
            correct,
        }
    }
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

fn parse_header(header: &str) -> (Option<String>, Vec<(String, String)>, bool) {
    let mut start_line = None;
    let mut fields = Vec::new();
    let mut correct = true;
    for (index, line) in header.split("\r\n").enumerate() {
        if line.len() > MAX_HEADER_LINE {
            correct = false;
        }
        match line.find(':') {
            Some(colon) if colon > 0 => {
                let name = line[..colon].trim();
                let value = line[colon + 1..].trim();
                fields.push((name.to_string(), value.to_string()));
            }
            _ => {
                if index == 0 && !line.is_empty() {
                    start_line = Some(line.to_string());
                }
            }
        }
    }
    (start_line, fields, correct)
}
