/*
 * fragment.rs
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

//! One decoded multipart part: the same header/body split as [`Content`],
//! applied to a sub-range, plus an attribute index built from `;`-separated
//! parameters of fields such as `Content-Disposition`. A part carrying a
//! `filename` attribute is file-bearing and its payload lives on disk;
//! otherwise the payload is inline. Construction goes through
//! [`FragmentDraft`] so the exposed value is frozen exactly once.

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::codec::{self, Coding};
use crate::content::Content;

/// Parsed part header, before the payload is known. Completed exactly once
/// with [`into_inline`] or [`into_stored`].
///
/// [`into_inline`]: FragmentDraft::into_inline
/// [`into_stored`]: FragmentDraft::into_stored
#[derive(Debug)]
pub struct FragmentDraft {
    header: Content,
    attributes: Vec<(String, Vec<u8>)>,
}

impl FragmentDraft {
    /// Parse one part's header block (the bytes up to and including its
    /// CRLFCRLF terminator). Never fails; see [`Content::parse`].
    pub fn parse(data: &[u8]) -> FragmentDraft {
        let header = Content::parse(data);
        let mut attributes = Vec::new();
        for (_, value) in header.fields() {
            split_attributes(value, &mut attributes);
        }
        FragmentDraft { header, attributes }
    }

    /// True iff the part declares a `filename` attribute.
    pub fn is_file(&self) -> bool {
        self.attribute("filename").is_some()
    }

    /// Declared field name (the `name` attribute), decoded leniently to text.
    pub fn name(&self) -> Option<String> {
        self.attribute("name")
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn filename(&self) -> Option<String> {
        self.attribute("filename")
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Freeze with an inline payload.
    pub fn into_inline(self, content: Bytes) -> Fragment {
        Fragment {
            header: self.header,
            attributes: self.attributes,
            payload: Payload::Inline(content),
        }
    }

    /// Freeze with a disk-backed payload (the storage file is already
    /// written and closed).
    pub fn into_stored(self, path: PathBuf) -> Fragment {
        Fragment {
            header: self.header,
            attributes: self.attributes,
            payload: Payload::Stored(path),
        }
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Inline(Bytes),
    Stored(PathBuf),
}

/// An immutable decoded part. Inline content and disk storage are mutually
/// exclusive: file-backed fragments have empty inline content.
#[derive(Debug, Clone)]
pub struct Fragment {
    header: Content,
    attributes: Vec<(String, Vec<u8>)>,
    payload: Payload,
}

impl Fragment {
    /// Header field lookup, case-insensitive (see [`Content::field`]).
    pub fn field(&self, name: &str) -> Option<&str> {
        self.header.field(name)
    }

    /// First attribute value of this name across all header fields.
    pub fn attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// All attribute values of this name, in header order.
    pub fn attribute_values(&self, name: &str) -> Vec<&[u8]> {
        self.attributes
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .collect()
    }

    pub fn name(&self) -> Option<String> {
        self.attribute("name")
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn filename(&self) -> Option<String> {
        self.attribute("filename")
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn is_file(&self) -> bool {
        matches!(self.payload, Payload::Stored(_))
    }

    /// Inline payload; empty for file-backed fragments.
    pub fn content(&self) -> &[u8] {
        match &self.payload {
            Payload::Inline(bytes) => bytes,
            Payload::Stored(_) => &[],
        }
    }

    /// Storage path; `None` for inline fragments.
    pub fn storage(&self) -> Option<&Path> {
        match &self.payload {
            Payload::Inline(_) => None,
            Payload::Stored(path) => Some(path),
        }
    }
}

/// Attribute list of a single header value (see [`split_attributes`]).
pub(crate) fn attributes_of(value: &str) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    split_attributes(value, &mut out);
    out
}

/// Tokenize one header value on `;` into named attributes. Attribute names
/// are MIME-decoded; values are unquoted (with backslash escapes) and
/// MIME-decoded. Bare tokens become attributes with an empty value.
fn split_attributes(value: &str, out: &mut Vec<(String, Vec<u8>)>) {
    let bytes = value.as_bytes();
    let len = bytes.len();
    let mut pos = 0;
    while pos < len {
        while pos < len && (bytes[pos] == b';' || bytes[pos].is_ascii_whitespace()) {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        let start = pos;
        // Scan to '=' or ';', whichever comes first.
        while pos < len && bytes[pos] != b'=' && bytes[pos] != b';' {
            pos += 1;
        }
        let raw_name = value[start..pos].trim();
        if pos >= len || bytes[pos] == b';' {
            // Bare token (e.g. the disposition type itself).
            if !raw_name.is_empty() {
                out.push((decode_text(raw_name), Vec::new()));
            }
            continue;
        }
        pos += 1; // past '='
        let raw_value = if pos < len && bytes[pos] == b'"' {
            pos += 1;
            let mut v = Vec::new();
            while pos < len {
                let c = bytes[pos];
                if c == b'\\' && pos + 1 < len {
                    v.push(bytes[pos + 1]);
                    pos += 2;
                } else if c == b'"' {
                    pos += 1;
                    break;
                } else {
                    v.push(c);
                    pos += 1;
                }
            }
            v
        } else {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .map(|i| pos + i)
                .unwrap_or(len);
            let v = value[pos..end].trim().as_bytes().to_vec();
            pos = end;
            v
        };
        if !raw_name.is_empty() {
            out.push((decode_text(raw_name), codec::decode(&raw_value, Coding::Mime)));
        }
    }
}

fn decode_text(raw: &str) -> String {
    String::from_utf8_lossy(&codec::decode(raw.as_bytes(), Coding::Mime)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PART: &[u8] = b"Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n";

    #[test]
    fn attributes_from_disposition() {
        let draft = FragmentDraft::parse(PART);
        assert!(draft.is_file());
        assert_eq!(draft.name().as_deref(), Some("avatar"));
        assert_eq!(draft.filename().as_deref(), Some("me.png"));
    }

    #[test]
    fn bare_tokens_are_attributes() {
        let draft = FragmentDraft::parse(PART);
        assert!(draft.attribute("form-data").is_some());
    }

    #[test]
    fn plain_field_is_not_file_bearing() {
        let draft =
            FragmentDraft::parse(b"Content-Disposition: form-data; name=\"age\"\r\n\r\n");
        assert!(!draft.is_file());
        let fragment = draft.into_inline(Bytes::from_static(b"41"));
        assert!(!fragment.is_file());
        assert_eq!(fragment.content(), b"41");
        assert!(fragment.storage().is_none());
    }

    #[test]
    fn stored_fragment_has_empty_inline_content() {
        let draft = FragmentDraft::parse(PART);
        let fragment = draft.into_stored(PathBuf::from("/tmp/fragment-x.part"));
        assert!(fragment.is_file());
        assert!(fragment.content().is_empty());
        assert_eq!(
            fragment.storage(),
            Some(Path::new("/tmp/fragment-x.part"))
        );
    }

    #[test]
    fn attribute_values_are_mime_decoded() {
        let draft = FragmentDraft::parse(
            b"Content-Disposition: form-data; name=\"with%20space\"; note=a+b\r\n\r\n",
        );
        assert_eq!(draft.attribute("name"), Some(b"with space".as_ref()));
        let fragment = draft.into_inline(Bytes::new());
        assert_eq!(fragment.attribute("note"), Some(b"a b".as_ref()));
    }

    #[test]
    fn quoted_value_with_escapes() {
        let draft = FragmentDraft::parse(
            b"Content-Disposition: form-data; filename=\"a\\\"b.txt\"\r\n\r\n",
        );
        assert_eq!(draft.filename().as_deref(), Some("a\"b.txt"));
    }

    #[test]
    fn header_fields_still_reachable() {
        let draft = FragmentDraft::parse(PART);
        let fragment = draft.into_inline(Bytes::new());
        assert_eq!(fragment.field("content-type"), Some("image/png"));
    }
}
