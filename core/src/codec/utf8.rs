/*
 * utf8.rs
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

//! Byte-level UTF-8 expansion codec.
//!
//! Encoding treats each input byte as a code point of the same numeric value
//! and writes its UTF-8 form, so arbitrary byte buffers pass through, not
//! pre-decoded text. Decoding collapses UTF-8 sequences back to single bytes
//! (the low 8 bits of the code point) and resynchronizes at the next lead
//! byte when a continuation sequence is invalid.

/// Expand each byte to the UTF-8 form of its numeric value.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b < 0x80 {
            out.push(b);
        } else {
            out.push(0xC0 | (b >> 6));
            out.push(0x80 | (b & 0x3F));
        }
    }
    out
}

/// Collapse UTF-8 sequences back to single byte values.
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut pos = 0;
    while pos < data.len() {
        let b = data[pos];
        if b < 0x80 {
            out.push(b);
            pos += 1;
            continue;
        }
        let len = if b >= 0xF0 {
            4
        } else if b >= 0xE0 {
            3
        } else if b >= 0xC0 {
            2
        } else {
            // Stray continuation byte: skip it.
            pos += 1;
            continue;
        };
        let mut code_point = (b as u32) & (0x7F >> len);
        let mut advanced = 1;
        let mut valid = true;
        while advanced < len {
            match data.get(pos + advanced) {
                Some(&c) if c & 0xC0 == 0x80 => {
                    code_point = (code_point << 6) | (c & 0x3F) as u32;
                    advanced += 1;
                }
                _ => {
                    valid = false;
                    break;
                }
            }
        }
        if valid {
            out.push(code_point as u8);
            pos += len;
        } else {
            // Resynchronize at the byte that broke the sequence.
            pos += advanced;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode(b"plain"), b"plain".to_vec());
        assert_eq!(decode(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn high_byte_expands_to_two() {
        assert_eq!(encode(&[0xE9]), vec![0xC3, 0xA9]);
        assert_eq!(decode(&[0xC3, 0xA9]), vec![0xE9]);
    }

    #[test]
    fn invalid_continuation_resynchronizes() {
        // Lead byte followed by ASCII: the lead is abandoned, the ASCII kept.
        assert_eq!(decode(&[0xC3, b'a', b'b']), b"ab".to_vec());
        // Lead byte at end of input.
        assert_eq!(decode(&[b'a', 0xC3]), b"a".to_vec());
    }

    #[test]
    fn stray_continuation_skipped() {
        assert_eq!(decode(&[0x80, b'x']), b"x".to_vec());
    }
}
