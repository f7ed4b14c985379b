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

//! Engine configuration, settable through UCI `setoption`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The options recognized by the engine.
pub struct EngineOptions {
    /// Transposition table size in bytes. Rounded down to a power of two
    /// at allocation time.
    pub hash_bytes: usize,
    /// How many root moves to resolve with a full window and report as
    /// separate principal variations.
    pub multi_pv: usize,
    /// Consult an external opening book before searching. No book backend
    /// is bundled, so this is accepted and stored but has no effect.
    pub use_book: bool,
    /// Probe external endgame bitbases. No bitbase backend is bundled, so
    /// this is accepted and stored but has no effect.
    pub use_egbb: bool,
    /// Emit extra `info string` diagnostics and cache statistics.
    pub verbose: bool,
    /// Suppress search progress output until this many milliseconds have
    /// elapsed.
    pub output_delay_ms: u64,
}

impl EngineOptions {
    /// Default transposition table size: 32 MB.
    pub const DEFAULT_HASH_BYTES: usize = 32 * 1024 * 1024;
    /// Default pawn table size: 1 MB.
    pub const PAWN_TABLE_BYTES: usize = 1024 * 1024;
    /// Default PV node-count cache size: 512 KB.
    pub const PV_CACHE_BYTES: usize = 512 * 1024;
}

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            hash_bytes: EngineOptions::DEFAULT_HASH_BYTES,
            multi_pv: 1,
            use_book: false,
            use_egbb: false,
            verbose: false,
            output_delay_ms: 0,
        }
    }
}
