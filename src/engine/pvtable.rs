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

//! The PV node-count cache.
//!
//! At a principal-variation node, the selector records how many nodes each
//! searched move's subtree consumed. When the same position is reached in
//! a later iteration, those counts order the moves: the most expensive
//! subtree is tried first. This ordering dominates every other heuristic
//! at PV nodes.

use crate::base::Move;

#[derive(Clone, Debug, Default)]
/// One slot of the cache: the moves searched at a PV node, with the
/// subtree node count consumed by each, in parallel arrays.
struct PvEntry {
    /// The full position hash. Zero marks an empty slot.
    key: u64,
    moves: Vec<Move>,
    nodes: Vec<u64>,
}

#[derive(Clone, Copy, Debug, Default)]
/// Probe counters, reported under the `verbose` option.
pub struct PvCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub occupied: u64,
}

#[derive(Clone, Debug)]
/// A direct-mapped cache of PV move lists; any key mismatch is an
/// eviction.
pub struct PvCache {
    entries: Vec<PvEntry>,
    mask: u64,
    pub stats: PvCacheStats,
}

/// Nominal bytes per entry, used to convert a byte budget to a slot
/// count.
const ENTRY_BYTES: usize = 1024;

impl PvCache {
    #[must_use]
    /// Construct a cache bounded by `max_bytes`, rounded down to a
    /// power-of-two number of slots.
    pub fn with_size(max_bytes: usize) -> PvCache {
        let mut slots = 1usize;
        while ENTRY_BYTES * slots * 2 <= max_bytes {
            slots *= 2;
        }
        PvCache {
            entries: (0..slots).map(|_| PvEntry::default()).collect(),
            mask: (slots - 1) as u64,
            stats: PvCacheStats::default(),
        }
    }

    /// Clear all entries and statistics.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = PvEntry::default();
        }
        self.stats = PvCacheStats::default();
    }

    #[must_use]
    /// The number of slots in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the move list recorded for a position. The returned moves
    /// were legal when written but the key may have collided, so callers
    /// must re-vet each one.
    pub fn get(&mut self, hash: u64) -> Option<(&[Move], &[u64])> {
        let idx = (hash & self.mask) as usize;
        let key = self.entries[idx].key;
        if key == hash {
            self.stats.hits += 1;
            Some((&self.entries[idx].moves[..], &self.entries[idx].nodes[..]))
        } else {
            if key != 0 {
                self.stats.evictions += 1;
            } else {
                self.stats.misses += 1;
                self.stats.occupied += 1;
            }
            None
        }
    }

    /// Record the searched moves and their subtree node counts for a
    /// position, overwriting whatever occupied the slot.
    pub fn put(&mut self, hash: u64, moves: &[Move], nodes: &[u64]) {
        debug_assert_eq!(moves.len(), nodes.len());
        let idx = (hash & self.mask) as usize;
        let entry = &mut self.entries[idx];
        entry.key = hash;
        entry.moves.clear();
        entry.moves.extend_from_slice(moves);
        entry.nodes.clear();
        entry.nodes.extend_from_slice(nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Piece, Square};

    #[test]
    /// Test that a committed list reads back exactly until evicted.
    fn commit_read_back() {
        let mut cache = PvCache::with_size(1 << 16);
        let moves = vec![
            Move::quiet(Square::E2, Square::E4, Piece::Pawn),
            Move::quiet(Square::G1, Square::F3, Piece::Knight),
        ];
        let nodes = vec![1000, 250];
        cache.put(0xABCD, &moves, &nodes);
        let (got_moves, got_nodes) = cache.get(0xABCD).unwrap();
        assert_eq!(got_moves, moves.as_slice());
        assert_eq!(got_nodes, nodes.as_slice());
    }

    #[test]
    /// Test that a colliding key evicts the previous occupant.
    fn collision_evicts() {
        let mut cache = PvCache::with_size(1 << 16);
        let slots = cache.len() as u64;
        let m = vec![Move::quiet(Square::E2, Square::E4, Piece::Pawn)];
        cache.put(5, &m, &[10]);
        let colliding = 5 + slots;
        cache.put(colliding, &m, &[20]);
        assert!(cache.get(5).is_none());
        let (_, nodes) = cache.get(colliding).unwrap();
        assert_eq!(nodes, &[20]);
    }

    #[test]
    /// Test that overwriting the same key replaces the list.
    fn overwrite_same_key() {
        let mut cache = PvCache::with_size(1 << 16);
        let m1 = vec![Move::quiet(Square::E2, Square::E4, Piece::Pawn)];
        let m2 = vec![
            Move::quiet(Square::D2, Square::D4, Piece::Pawn),
            Move::quiet(Square::C2, Square::C4, Piece::Pawn),
        ];
        cache.put(9, &m1, &[1]);
        cache.put(9, &m2, &[2, 3]);
        let (moves, nodes) = cache.get(9).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(nodes, &[2, 3]);
    }
}
