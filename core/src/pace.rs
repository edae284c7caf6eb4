/*
 * pace.rs
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

//! Cooperative inter-block throttle. After each transferred block the owner
//! calls [`Pacer::pace`], which sleeps the configured interrupt when enough
//! wall time has passed since the last sleep. This is a CPU-fairness
//! courtesy toward the rest of the host, not flow control; nothing may rely
//! on it for ordering or correctness.

use std::time::{Duration, Instant};

/// Minimum gap between voluntary sleeps.
const MIN_GAP: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct Pacer {
    interrupt: Duration,
    last: Instant,
}

impl Pacer {
    /// `interrupt_ms == 0` disables pacing entirely.
    pub fn new(interrupt_ms: u64) -> Self {
        Self {
            interrupt: Duration::from_millis(interrupt_ms),
            last: Instant::now(),
        }
    }

    /// Called once per transferred block.
    pub fn pace(&mut self) {
        if self.interrupt.is_zero() {
            return;
        }
        if self.last.elapsed() > MIN_GAP {
            std::thread::sleep(self.interrupt);
            self.last = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interrupt_never_sleeps() {
        let mut pacer = Pacer::new(0);
        let start = Instant::now();
        for _ in 0..10_000 {
            pacer.pace();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn back_to_back_blocks_do_not_stack_sleeps() {
        let mut pacer = Pacer::new(5);
        let start = Instant::now();
        for _ in 0..50 {
            pacer.pace();
        }
        // At most a couple of sleeps can fit in this window.
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
