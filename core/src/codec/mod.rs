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

//! Byte transforms for HTTP content: percent escaping, byte/UTF-8 expansion,
//! base64, and lexical path normalization. All transforms are total; malformed
//! input degrades by dropping or resynchronizing, never by failing, because
//! these paths carry externally supplied data.

mod base64;
mod dot;
mod mime;
mod utf8;

pub use dot::normalize;

/// Transform selector for [`encode`] / [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    /// Identity in both directions.
    None,
    /// Percent escaping of bytes outside the safe ASCII set; `+` means space
    /// on decode.
    Mime,
    /// Each byte expanded to the UTF-8 form of the code point of its value.
    Utf8,
    /// Standard-alphabet base64 with `=` padding.
    Base64,
    /// Lexical path normalization (decode only; encode is identity).
    Dot,
}

/// Apply the encoding transform for `coding`. Never fails.
pub fn encode(data: &[u8], coding: Coding) -> Vec<u8> {
    match coding {
        Coding::None | Coding::Dot => data.to_vec(),
        Coding::Mime => mime::encode(data),
        Coding::Utf8 => utf8::encode(data),
        Coding::Base64 => base64::encode(data),
    }
}

/// Apply the decoding transform for `coding`. Never fails; malformed input is
/// dropped or resynchronized as documented per mode.
pub fn decode(data: &[u8], coding: Coding) -> Vec<u8> {
    match coding {
        Coding::None => data.to_vec(),
        Coding::Mime => mime::decode(data),
        Coding::Utf8 => utf8::decode(data),
        Coding::Base64 => base64::decode(data),
        Coding::Dot => dot::normalize(data),
    }
}
