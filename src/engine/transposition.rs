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

//! The transposition table: a bucketed, age-stamped, always-replace cache
//! of search results keyed by the full position hash.
//!
//! Entries are hints, not facts: a retrieved move may belong to a colliding
//! position, so callers must re-verify its legality before playing it.
//! Mate scores are stored relative to the node that wrote them and restored
//! relative to the node that reads them.

use crate::base::{Board, Move};

use super::evaluate::Eval;

/// Entries per bucket.
const BUCKET_SIZE: usize = 4;

/// Bound bit: the entry's score is a lower bound on the true score.
pub const FLAG_LOWER: u8 = 1;
/// Bound bit: the entry's score is an upper bound on the true score.
pub const FLAG_UPPER: u8 = 2;
/// Both bound bits: the score is exact.
pub const FLAG_EXACT: u8 = FLAG_LOWER | FLAG_UPPER;
/// A null-move search from this position found a mate against the mover.
pub const FLAG_MATE_THREAT: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// One transposition entry. An entry with `flags == 0` is empty.
pub struct TransEntry {
    /// The full hash of the position this entry describes.
    pub key: u64,
    /// The best move found, or `Move::NONE` for fail-low entries.
    pub best_move: Move,
    /// The score, node-relative for mates (see `get`/`put`).
    pub score: Eval,
    /// The draft the entry was searched to. Quiescence entries store 0.
    pub depth: u8,
    /// The search age which wrote the entry.
    pub age: u8,
    /// Bound bits and the mate-threat flag.
    pub flags: u8,
}

impl TransEntry {
    const EMPTY: TransEntry = TransEntry {
        key: 0,
        best_move: Move::NONE,
        score: Eval::DRAW,
        depth: 0,
        age: 0,
        flags: 0,
    };

    #[inline(always)]
    #[must_use]
    /// Is this entry's score a lower bound (or exact)?
    pub const fn is_lower_bound(self) -> bool {
        self.flags & FLAG_LOWER != 0
    }

    #[inline(always)]
    #[must_use]
    /// Is this entry's score an upper bound (or exact)?
    pub const fn is_upper_bound(self) -> bool {
        self.flags & FLAG_UPPER != 0
    }

    #[inline(always)]
    #[must_use]
    /// Did a null-move search here reveal a mate threat?
    pub const fn mate_threat(self) -> bool {
        self.flags & FLAG_MATE_THREAT != 0
    }

    #[inline(always)]
    const fn is_empty(self) -> bool {
        self.flags & FLAG_EXACT == 0
    }
}

#[derive(Clone, Copy, Debug, Default)]
/// Probe counters, reported under the `verbose` option.
pub struct TransTableStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Clone, Debug)]
/// The transposition table. Single-owner: only the search worker touches
/// it, so no synchronization is needed.
pub struct TransTable {
    buckets: Vec<[TransEntry; BUCKET_SIZE]>,
    mask: u64,
    age: u8,
    pub stats: TransTableStats,
}

impl TransTable {
    #[must_use]
    /// Construct a table bounded by `max_bytes`, rounded down to a
    /// power-of-two number of buckets.
    pub fn with_size(max_bytes: usize) -> TransTable {
        let bucket_bytes = std::mem::size_of::<[TransEntry; BUCKET_SIZE]>();
        let mut buckets = 1usize;
        while bucket_bytes * buckets * 2 <= max_bytes {
            buckets *= 2;
        }
        TransTable {
            buckets: vec![[TransEntry::EMPTY; BUCKET_SIZE]; buckets],
            mask: (buckets - 1) as u64,
            age: 1,
            stats: TransTableStats::default(),
        }
    }

    /// Replace the table with a fresh one of the given size.
    pub fn resize(&mut self, max_bytes: usize) {
        *self = TransTable::with_size(max_bytes);
    }

    /// Clear all entries, keeping the allocation.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = [TransEntry::EMPTY; BUCKET_SIZE];
        }
        self.age = 1;
        self.stats = TransTableStats::default();
    }

    /// Advance the age stamp. Called once at the start of each top-level
    /// search; entries from earlier searches become preferred victims.
    pub fn increment_age(&mut self) {
        self.age = self.age.wrapping_add(1);
        if self.age == 0 {
            self.age = 1;
        }
    }

    /// Probe for an entry. A mate score in the returned entry has been
    /// restored to be relative to `ply`.
    pub fn get(&mut self, hash: u64, ply: i32) -> Option<TransEntry> {
        let bucket = &self.buckets[(hash & self.mask) as usize];
        for entry in bucket {
            if !entry.is_empty() && entry.key == hash {
                self.stats.hits += 1;
                let mut found = *entry;
                found.score = found.score.from_table(ply);
                return Some(found);
            }
        }
        self.stats.misses += 1;
        None
    }

    /// Store an entry, always replacing. The victim is chosen in order of
    /// preference: the slot already holding this key, an empty slot, the
    /// stalest older-age slot, and finally the shallowest current-age
    /// slot. A mate score is converted to node-relative form before it is
    /// written.
    pub fn put(&mut self, hash: u64, m: Move, depth: i32, score: Eval, flags: u8, ply: i32) {
        let age = self.age;
        let bucket = &mut self.buckets[(hash & self.mask) as usize];

        // an entry for the same key is always replaced in place
        let mut victim = bucket
            .iter()
            .position(|e| !e.is_empty() && e.key == hash)
            .or_else(|| bucket.iter().position(|e| e.is_empty()));
        if victim.is_none() {
            // stalest age first, then shallowest depth
            let mut best = (0u8, 0u8);
            for (i, entry) in bucket.iter().enumerate() {
                let preference = (age.wrapping_sub(entry.age), u8::MAX - entry.depth);
                if victim.is_none() || preference > best {
                    best = preference;
                    victim = Some(i);
                }
            }
        }
        let victim = victim.unwrap();

        bucket[victim] = TransEntry {
            key: hash,
            best_move: m,
            score: score.to_table(ply),
            depth: depth.max(0).min(u8::MAX as i32) as u8,
            age,
            flags,
        };
    }

    /// Re-seed the table with a principal variation: each step is stored
    /// as an exact entry of decreasing depth, so the next iteration's move
    /// ordering finds the line even if its entries were displaced. The
    /// first step keeps the bound flags of the search result which
    /// produced the line.
    pub fn put_line(&mut self, pos: &mut Board, line: &[Move], depth: i32, score: Eval, flags: u8) {
        let mut undos = Vec::with_capacity(line.len());
        let mut running = score;
        for (i, &m) in line.iter().enumerate() {
            let step_flags = if i == 0 { flags } else { FLAG_EXACT };
            self.put(pos.hash, m, depth - i as i32, running, step_flags, i as i32);
            undos.push(pos.make_move(m));
            running = -running;
        }
        for (&m, undo) in line.iter().zip(undos.iter()).rev() {
            pos.undo_move(m, undo);
        }
    }

    #[must_use]
    /// Does this entry allow a cutoff at the given draft? Lower bounds
    /// raise `alpha`, upper bounds lower `beta`; the cutoff stands when the
    /// window closes.
    pub fn is_cutoff_allowed(
        entry: &TransEntry,
        depth: i32,
        alpha: &mut Eval,
        beta: &mut Eval,
    ) -> bool {
        if depth > entry.depth as i32 {
            return false;
        }
        if entry.is_lower_bound() && entry.score > *alpha {
            *alpha = entry.score;
        }
        if entry.is_upper_bound() && entry.score < *beta {
            *beta = entry.score;
        }
        *alpha >= *beta
    }

    #[must_use]
    /// An estimate of the table's fill rate, in permille, from a sample of
    /// buckets.
    pub fn hashfull(&self) -> u16 {
        let sample = (self.mask + 1).min(250) as usize;
        let mut used = 0usize;
        let mut seen = 0usize;
        for bucket in self.buckets.iter().take(sample) {
            for entry in bucket {
                seen += 1;
                if !entry.is_empty() {
                    used += 1;
                }
            }
        }
        (used * 1000 / seen) as u16
    }

    #[must_use]
    /// The number of buckets in the table.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Piece, Square};

    #[test]
    /// Test that a stored entry reads back unchanged.
    fn put_get_round_trip() {
        let mut tt = TransTable::with_size(1 << 16);
        let m = Move::quiet(Square::E2, Square::E4, Piece::Pawn);
        tt.put(0xDEAD_BEEF, m, 7, Eval::centipawns(42), FLAG_EXACT, 3);
        let entry = tt.get(0xDEAD_BEEF, 3).unwrap();
        assert_eq!(entry.best_move, m);
        assert_eq!(entry.depth, 7);
        assert_eq!(entry.score, Eval::centipawns(42));
        assert!(entry.is_lower_bound() && entry.is_upper_bound());
    }

    #[test]
    /// Test that a probe of an absent key misses.
    fn miss_on_absent_key() {
        let mut tt = TransTable::with_size(1 << 16);
        assert!(tt.get(12345, 0).is_none());
    }

    #[test]
    /// Test that mate scores are stored ply-relative: a mate found at ply 4
    /// and read at ply 2 appears two plies closer.
    fn mate_ply_adjustment() {
        let mut tt = TransTable::with_size(1 << 16);
        let m = Move::quiet(Square::A1, Square::A8, Piece::Rook);
        tt.put(99, m, 5, Eval::mate_in(6), FLAG_EXACT, 4);
        let entry = tt.get(99, 2).unwrap();
        assert_eq!(entry.score, Eval::mate_in(4));
    }

    #[test]
    /// Test that writing the same key twice replaces the old data.
    fn same_key_overwrites() {
        let mut tt = TransTable::with_size(1 << 16);
        let m1 = Move::quiet(Square::E2, Square::E4, Piece::Pawn);
        let m2 = Move::quiet(Square::D2, Square::D4, Piece::Pawn);
        tt.put(7, m1, 3, Eval::centipawns(10), FLAG_LOWER, 0);
        tt.put(7, m2, 9, Eval::centipawns(-10), FLAG_UPPER, 0);
        let entry = tt.get(7, 0).unwrap();
        assert_eq!(entry.best_move, m2);
        assert_eq!(entry.depth, 9);
        assert!(entry.is_upper_bound() && !entry.is_lower_bound());
    }

    #[test]
    /// Test that older-age entries are evicted before deeper current-age
    /// entries.
    fn replacement_prefers_stale() {
        let mut tt = TransTable::with_size(512);
        let slots = tt.len() as u64;
        let m = Move::quiet(Square::E2, Square::E4, Piece::Pawn);
        // fill one bucket with old-age entries
        for i in 0..BUCKET_SIZE as u64 {
            tt.put(i * slots, m, 20, Eval::DRAW, FLAG_EXACT, 0);
        }
        tt.increment_age();
        let fresh = (BUCKET_SIZE as u64) * slots;
        tt.put(fresh, m, 1, Eval::DRAW, FLAG_EXACT, 0);
        assert!(tt.get(fresh, 0).is_some());
    }

    #[test]
    /// Test the cutoff window arithmetic.
    fn cutoff_window() {
        let mut tt = TransTable::with_size(1 << 16);
        let m = Move::quiet(Square::E2, Square::E4, Piece::Pawn);
        tt.put(1, m, 8, Eval::centipawns(120), FLAG_LOWER, 0);
        let entry = tt.get(1, 0).unwrap();

        // too shallow for a deeper request
        let mut alpha = Eval::centipawns(0);
        let mut beta = Eval::centipawns(100);
        assert!(!TransTable::is_cutoff_allowed(&entry, 9, &mut alpha, &mut beta));

        // deep enough: the lower bound pushes alpha past beta
        let mut alpha = Eval::centipawns(0);
        let mut beta = Eval::centipawns(100);
        assert!(TransTable::is_cutoff_allowed(&entry, 8, &mut alpha, &mut beta));
        assert_eq!(alpha, Eval::centipawns(120));

        // an upper-bound entry narrows beta without a cutoff
        tt.put(2, m, 8, Eval::centipawns(50), FLAG_UPPER, 0);
        let entry = tt.get(2, 0).unwrap();
        let mut alpha = Eval::centipawns(0);
        let mut beta = Eval::centipawns(100);
        assert!(!TransTable::is_cutoff_allowed(&entry, 4, &mut alpha, &mut beta));
        assert_eq!(beta, Eval::centipawns(50));
    }

    #[test]
    /// Test that `put_line` seeds every step of a variation and restores
    /// the board.
    fn put_line_seeds_variation() {
        let mut board = Board::new();
        let original = board.clone();
        let e4 = Move::from_uci("e2e4", &board).unwrap();
        let mut after_e4 = board.clone();
        let undo = after_e4.make_move(e4);
        let e5 = Move::from_uci("e7e5", &after_e4).unwrap();
        let after_e4_hash = after_e4.hash;
        after_e4.undo_move(e4, &undo);

        let mut tt = TransTable::with_size(1 << 16);
        tt.put_line(&mut board, &[e4, e5], 6, Eval::centipawns(20), FLAG_EXACT);
        assert_eq!(board, original);

        let root_entry = tt.get(original.hash, 0).unwrap();
        assert_eq!(root_entry.best_move, e4);
        assert_eq!(root_entry.depth, 6);
        let child_entry = tt.get(after_e4_hash, 1).unwrap();
        assert_eq!(child_entry.best_move, e5);
        assert_eq!(child_entry.depth, 5);
        assert_eq!(child_entry.score, Eval::centipawns(-20));
    }
}
