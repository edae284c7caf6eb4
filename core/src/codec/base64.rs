/*
 * base64.rs
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

//! Base64 transform, standard alphabet with `=` padding.
//!
//! Decoding is lenient: bytes outside the alphabet, `=` padding included,
//! are treated as absent, and a trailing partial quantum flushes whole
//! bytes only.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DECODE_TABLE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 26 {
        t[(b'A' + i) as usize] = i as i8;
        t[(b'a' + i) as usize] = (26 + i) as i8;
        i = i.wrapping_add(1);
    }
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = (52 + i) as i8;
        i = i.wrapping_add(1);
    }
    t[b'+' as usize] = 62;
    t[b'/' as usize] = 63;
    t
};

/// Standard base64 encoding with padding.
pub fn encode(data: &[u8]) -> Vec<u8> {
    STANDARD.encode(data).into_bytes()
}

/// Lenient base64 decoding: non-alphabet bytes (including `=` padding) are
/// skipped, and remaining bits flush in whole bytes.
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 3 + 3);
    let mut quantum: u32 = 0;
    let mut bits: u32 = 0;
    for &b in data {
        let val = DECODE_TABLE[b as usize];
        if val < 0 {
            continue;
        }
        quantum = (quantum << 6) | val as u32;
        bits += 6;
        if bits == 24 {
            out.push((quantum >> 16) as u8);
            out.push((quantum >> 8) as u8);
            out.push(quantum as u8);
            quantum = 0;
            bits = 0;
        }
    }
    if bits >= 8 {
        out.push((quantum >> (bits - 8)) as u8);
        if bits >= 16 {
            out.push((quantum >> (bits - 16)) as u8);
        }
    }
    out
}
