/*
 * mime.rs
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

//! Percent-style escaping for form fields and attribute values.
//!
//! The safe set is fixed: `# & * - . / : ~ _ ?` plus ASCII alphanumerics.
//! Everything else encodes as `%XX` uppercase hex. Decoding maps `+` to
//! space and silently drops an unparsable escape introducer.

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes that escape: everything except alphanumerics and the safe set.
const UNSAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'#')
    .remove(b'&')
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b'~')
    .remove(b'_')
    .remove(b'?');

const HEX_DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = i as i8;
        i = i.wrapping_add(1);
    }
    let mut i = 0u8;
    while i < 6 {
        t[(b'A' + i) as usize] = (10 + i) as i8;
        t[(b'a' + i) as usize] = (10 + i) as i8;
        i = i.wrapping_add(1);
    }
    t
};

/// Escape every byte outside the safe set as `%XX`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    percent_encode(data, UNSAFE).to_string().into_bytes()
}

/// Reverse of [`encode`]. `+` becomes space; a `%` that does not introduce
/// two hex digits is dropped and decoding continues at the next byte.
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut pos = 0;
    while pos < data.len() {
        let b = data[pos];
        if b == b'+' {
            out.push(b' ');
            pos += 1;
        } else if b == b'%' {
            if pos + 3 <= data.len() {
                let v1 = HEX_DECODE[data[pos + 1] as usize];
                let v2 = HEX_DECODE[data[pos + 2] as usize];
                if v1 >= 0 && v2 >= 0 {
                    out.push(((v1 as u8) << 4) | v2 as u8);
                    pos += 3;
                    continue;
                }
            }
            // Unparsable escape: drop the introducer, keep going.
            pos += 1;
        } else {
            out.push(b);
            pos += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_bytes_pass_through() {
        let data = b"#&*-./:~_?azAZ09";
        assert_eq!(encode(data), data.to_vec());
    }

    #[test]
    fn unsafe_bytes_escape_uppercase() {
        assert_eq!(encode(b"a b"), b"a%20b".to_vec());
        assert_eq!(encode(b"=\xFF"), b"%3D%FF".to_vec());
    }

    #[test]
    fn plus_decodes_to_space() {
        assert_eq!(decode(b"a+b"), b"a b".to_vec());
    }

    #[test]
    fn escapes_decode_case_insensitively() {
        assert_eq!(decode(b"%2b%2B"), b"++".to_vec());
    }

    #[test]
    fn bad_escape_is_dropped() {
        assert_eq!(decode(b"a%zzb"), b"azzb".to_vec());
        assert_eq!(decode(b"a%4"), b"a4".to_vec());
        assert_eq!(decode(b"a%"), b"a".to_vec());
    }
}
