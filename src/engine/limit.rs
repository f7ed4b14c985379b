/*
  Osprey, a UCI-compatible chess engine.
  Copyright (C) 2024 The Osprey Authors (see AUTHORS.md file)

  Osprey is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  Osprey is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.

  You should have received a copy of the GNU General Public License
  along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! The search timer and the limits imposed on a single search.

use std::time::Instant;

#[derive(Clone, Copy, Debug)]
/// A millisecond stopwatch for one search.
pub struct SearchTimer {
    start: Option<Instant>,
}

impl SearchTimer {
    #[must_use]
    /// Construct a stopped timer.
    pub fn new() -> SearchTimer {
        SearchTimer { start: None }
    }

    /// Start (or restart) the timer.
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
    }

    /// Stop the timer.
    pub fn stop(&mut self) {
        self.start = None;
    }

    #[must_use]
    /// Milliseconds since the timer started, or 0 if it is stopped.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.map_or(0, |s| s.elapsed().as_millis() as u64)
    }
}

impl Default for SearchTimer {
    fn default() -> SearchTimer {
        SearchTimer::new()
    }
}

#[derive(Clone, Copy, Debug, Default)]
/// The limits of one search. Zero fields mean "unlimited"; `infinite`
/// and pondering additionally disable the time checks entirely.
pub struct SearchLimits {
    /// The soft time budget in milliseconds. The driver stops deepening
    /// when exceeding it is inevitable.
    pub time_target: u64,
    /// The hard time ceiling in milliseconds. The search aborts when it is
    /// reached.
    pub time_limit: u64,
    /// Extra time granted while the root is unstable, added to the
    /// target. Mutated by the driver during the search.
    pub time_bonus: u64,
    /// The maximum depth to search, or 0 for no cap.
    pub depth_limit: i32,
    /// The maximum number of nodes to search, or 0 for no cap.
    pub node_limit: u64,
    /// `go infinite`: never stop on time or score.
    pub infinite: bool,
}

impl SearchLimits {
    /// The default number of moves assumed to remain when the clock gives
    /// no `movestogo`.
    const MOVE_HORIZON: u64 = 30;

    #[must_use]
    /// Allocate time for one move from the clock state: a soft target of
    /// the remaining time divided over the horizon plus most of the
    /// increment, and a hard limit well above it but never more than half
    /// the clock.
    pub fn from_clock(
        time_ms: u64,
        increment_ms: u64,
        moves_to_go: Option<u64>,
        movetime_ms: Option<u64>,
    ) -> SearchLimits {
        if let Some(fixed) = movetime_ms {
            return SearchLimits {
                time_target: fixed,
                time_limit: fixed,
                ..SearchLimits::default()
            };
        }
        if time_ms == 0 {
            return SearchLimits::default();
        }
        let horizon = moves_to_go
            .filter(|&m| m > 0)
            .unwrap_or(SearchLimits::MOVE_HORIZON)
            .min(SearchLimits::MOVE_HORIZON);
        let target = (time_ms / horizon + increment_ms * 2 / 3).max(1);
        let limit = (target * 6).min(time_ms / 2).max(1);
        SearchLimits {
            time_target: target,
            time_limit: limit,
            ..SearchLimits::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Test that a fixed movetime pins both thresholds.
    fn movetime_is_exact() {
        let limits = SearchLimits::from_clock(0, 0, None, Some(1500));
        assert_eq!(limits.time_target, 1500);
        assert_eq!(limits.time_limit, 1500);
    }

    #[test]
    /// Test that clock allocation leaves a hard limit above the target but
    /// bounded by half the clock.
    fn clock_allocation_bounds() {
        let limits = SearchLimits::from_clock(60_000, 1_000, None, None);
        assert!(limits.time_target >= 2_000);
        assert!(limits.time_limit >= limits.time_target);
        assert!(limits.time_limit <= 30_000);
    }

    #[test]
    /// Test that an absent clock means no limits.
    fn no_clock_no_limits() {
        let limits = SearchLimits::from_clock(0, 0, None, None);
        assert_eq!(limits.time_target, 0);
        assert_eq!(limits.time_limit, 0);
    }
}
