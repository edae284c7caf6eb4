/*
 * signature.rs
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

//! Process-unique content signatures: a base-36 millisecond timestamp plus a
//! base-36 monotonic disambiguator. Used as the `Content-Signature` response
//! field and as the file-name stem for offloaded payloads, so tokens are
//! restricted to lowercase alphanumerics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use chrono::Utc;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
/// Disambiguator width in base-36 digits; the counter wraps at 36^8.
const COUNTER_DIGITS: usize = 8;
const COUNTER_MODULUS: u64 = 36u64.pow(COUNTER_DIGITS as u32);

/// Monotonic source of unique signature tokens. One instance per process;
/// see [`SignatureSource::global`].
#[derive(Debug)]
pub struct SignatureSource {
    counter: AtomicU64,
}

static GLOBAL: OnceLock<SignatureSource> = OnceLock::new();

impl SignatureSource {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Install the process-wide source. Returns false if one is already
    /// installed (the existing source stays in place).
    pub fn initialize() -> bool {
        GLOBAL.set(SignatureSource::new()).is_ok()
    }

    /// The process-wide source, installed on first use when [`initialize`]
    /// was not called explicitly.
    ///
    /// [`initialize`]: SignatureSource::initialize
    pub fn global() -> &'static SignatureSource {
        GLOBAL.get_or_init(SignatureSource::new)
    }

    /// Next unique token. Safe under concurrent invocation: the counter is a
    /// single atomic sequence, so two calls in the same millisecond still
    /// differ.
    pub fn next(&self) -> String {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let count = self.counter.fetch_add(1, Ordering::Relaxed) % COUNTER_MODULUS;
        let mut token = base36(millis);
        let tail = base36(count);
        for _ in tail.len()..COUNTER_DIGITS {
            token.push('0');
        }
        token.push_str(&tail);
        token
    }
}

impl Default for SignatureSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for `SignatureSource::global().next()`.
pub fn next_signature() -> String {
    SignatureSource::global().next()
}

/// True iff `signature` is non-empty and contains only ASCII alphanumerics.
/// Anything else is rejected before a storage path is built from it.
pub fn is_valid_signature(signature: &str) -> bool {
    !signature.is_empty() && signature.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while value > 0 {
        i -= 1;
        buf[i] = BASE36_DIGITS[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8_lossy(&buf[i..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn tokens_are_alphanumeric() {
        let token = next_signature();
        assert!(is_valid_signature(&token));
    }

    #[test]
    fn sequential_tokens_differ() {
        let source = SignatureSource::new();
        assert_ne!(source.next(), source.next());
    }

    #[test]
    fn concurrent_tokens_differ() {
        let mut handles = Vec::new();
        for _ in 0..8 {
            handles.push(thread::spawn(|| {
                (0..100).map(|_| next_signature()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token), "duplicate signature");
            }
        }
    }

    #[test]
    fn validation_rejects_path_material() {
        assert!(!is_valid_signature(""));
        assert!(!is_valid_signature("../etc"));
        assert!(!is_valid_signature("a/b"));
        assert!(!is_valid_signature("a.b"));
        assert!(is_valid_signature("m3k9x00000001"));
    }

    #[test]
    fn base36_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }
}
