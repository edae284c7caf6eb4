/*
 * dot.rs
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

//! Lexical path normalization. Operates on the byte sequence only, never the
//! filesystem. Backslashes count as slashes, duplicate slashes collapse, `.`
//! disappears, `..` trims back to the previous segment, and a `..` that
//! would climb past the root truncates at the root instead. This is the
//! traversal guard applied when any storage path is composed from
//! caller-influenced input.

/// Normalize a `/`-delimited path lexically. Idempotent.
pub fn normalize(data: &[u8]) -> Vec<u8> {
    let cleaned: Vec<u8> = data
        .iter()
        .map(|&b| if b == b'\\' { b'/' } else { b })
        .collect();
    let absolute = cleaned.first() == Some(&b'/');
    let mut segments: Vec<&[u8]> = Vec::new();
    for segment in cleaned.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = Vec::with_capacity(data.len());
    if absolute {
        out.push(b'/');
    }
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(segment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        String::from_utf8(normalize(s.as_bytes())).unwrap()
    }

    #[test]
    fn resolves_dot_and_dotdot() {
        assert_eq!(norm("/a/./b/../c"), "/a/c");
        assert_eq!(norm("/a/b/c/../../d"), "/a/d");
    }

    #[test]
    fn collapses_duplicate_slashes() {
        assert_eq!(norm("/a//b///c"), "/a/b/c");
    }

    #[test]
    fn backslashes_become_slashes() {
        assert_eq!(norm("\\a\\b"), "/a/b");
    }

    #[test]
    fn never_escapes_the_root() {
        assert_eq!(norm("/../../etc"), "/etc");
        assert_eq!(norm("/.."), "/");
        assert_eq!(norm("../a"), "a");
    }

    #[test]
    fn idempotent() {
        for p in ["/a/./b/../c", "//x//y/..", "a/../../b", "/"] {
            assert_eq!(norm(&norm(p)), norm(p));
        }
    }
}
