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

//! Staged move selection.
//!
//! A selector walks a fixed sequence of phases determined by its
//! generator: the transposition move first, then a generated batch scored
//! into bands (hash move, mate killer, tactical moves split by exchange
//! outcome, killers, history-ordered quiets), then any deferred moves.
//! Within a batch, the first K picks take the best remaining score by a
//! linear max-scan with a swap to the front; after K picks the rest come
//! in generated order. Every move handed out has been vetted against the
//! current position, so the search can play it without further checks.

use crate::base::{movegen, Board, Move, Piece};

use super::{
    evaluate::material_value,
    history::History,
    pvtable::PvCache,
    MAX_HISTORY,
};

/// Deferral of extended moves is machinery retained from an experiment;
/// the replay path still works but nothing defers while this is false.
pub const DEFER_ENABLED: bool = false;

/// Whether PV nodes preload move ordering from the PV node-count cache.
pub const PV_CACHE_ENABLED: bool = true;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What kind of node a selector serves; picks the phase sequence and the
/// ordered-scan budget.
pub enum Generator {
    /// The root of the search. Moves arrive pre-scored and fully sorted.
    Root = 0,
    /// A full-window interior node.
    Pv,
    /// A zero-window interior node.
    NonPv,
    /// The side to move is in check; only legal evasions are produced.
    /// Substituted automatically for any non-root generator.
    Escape,
    /// Quiescence: captures and promotions only.
    Quiescence,
    /// Quiescence near the horizon: also quiet checking moves.
    QuiescenceChecks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Begin,
    Trans,
    Root,
    Pv,
    NonPv,
    Evasions,
    Qsearch,
    QsearchChecks,
    Deferred,
    End,
}

/// The phase sequence of each generator.
const PHASE_TABLE: [&[Phase]; 6] = [
    &[Phase::Begin, Phase::Root, Phase::End],
    &[Phase::Begin, Phase::Trans, Phase::Pv, Phase::Deferred, Phase::End],
    &[Phase::Begin, Phase::Trans, Phase::NonPv, Phase::Deferred, Phase::End],
    &[Phase::Begin, Phase::Evasions, Phase::Deferred, Phase::End],
    &[Phase::Begin, Phase::Trans, Phase::Qsearch, Phase::Deferred, Phase::End],
    &[Phase::Begin, Phase::Trans, Phase::QsearchChecks, Phase::Deferred, Phase::End],
];

/// How many moves each generator picks by best-score scan before serving
/// the remainder in generated order. Root moves arrive sorted, so zero.
const ORDERED_PICKS: [usize; 6] = [0, 256, 16, 16, 4, 4];

/// The grain separating the selector's score bands.
const GRAIN: i64 = MAX_HISTORY as i64;
const HASH_SCORE: i64 = 1000 * GRAIN;
const KILLER_SCORE: i64 = 700 * GRAIN;
const GOOD_TACTIC_SCORE: i64 = 800 * GRAIN;
const BAD_TACTIC_SCORE: i64 = -800 * GRAIN;

#[derive(Clone, Copy, Debug)]
/// The killer slots a search node hands to its selector: the current
/// ply's killers and mate killer, plus the killers from two plies up.
pub struct NodeKillers {
    pub killers: [Move; 2],
    pub mate_killer: Move,
    pub prev_killers: [Move; 2],
}

#[derive(Clone, Debug)]
/// A staged move selector for one node. Construct it, then call `next`
/// until it returns `None`.
pub struct MoveSelector {
    generator: Generator,
    phase_idx: usize,
    moves: Vec<Move>,
    scores: Vec<i64>,
    /// Index of the next unserved move in the current batch.
    current: usize,
    /// Whether the current batch came from the PV cache, in which case
    /// each move needs a full legality re-check.
    moves_from_cache: bool,
    hash_move: Move,
    /// killers[0..2] are this ply's, killers[2..4] from two plies up.
    killers: [Move; 4],
    mate_killer: Move,
    ordered: usize,
    /// Count of moves handed out so far; the search reads this as its
    /// legal-move counter.
    pub moves_so_far: usize,
    quiet_moves_so_far: usize,
    /// The score of the most recently served move.
    last_score: i64,
    single_reply: bool,
    deferred: Vec<Move>,
    pv_moves: Vec<Move>,
    pv_nodes: Vec<u64>,
}

impl MoveSelector {
    /// Construct a selector for an interior or quiescence node. If the
    /// side to move is in check, the generator is replaced with `Escape`.
    /// The hash move need not be vetted beforehand.
    pub fn new(
        pos: &Board,
        requested: Generator,
        node: Option<&NodeKillers>,
        hash_move: Move,
        history: &History,
        pv_cache: &mut PvCache,
    ) -> MoveSelector {
        debug_assert!(requested != Generator::Root);
        let generator = if movegen::is_check(pos) {
            Generator::Escape
        } else {
            requested
        };
        let (killers, mate_killer) = match node {
            Some(n) => (
                [n.killers[0], n.killers[1], n.prev_killers[0], n.prev_killers[1]],
                n.mate_killer,
            ),
            None => ([Move::NONE; 4], Move::NONE),
        };
        let mut selector = MoveSelector {
            generator,
            phase_idx: 0,
            moves: Vec::new(),
            scores: Vec::new(),
            current: 0,
            moves_from_cache: false,
            hash_move,
            killers,
            mate_killer,
            ordered: ORDERED_PICKS[requested as usize],
            moves_so_far: 0,
            quiet_moves_so_far: 0,
            last_score: 0,
            single_reply: false,
            deferred: Vec::new(),
            pv_moves: Vec::new(),
            pv_nodes: Vec::new(),
        };
        selector.advance_phase(pos, history, pv_cache);
        selector
    }

    /// Construct the root selector from pre-scored moves; they are sorted
    /// once and served in order.
    pub fn new_root(scored: Vec<(Move, i64)>) -> MoveSelector {
        let mut moves: Vec<Move> = Vec::with_capacity(scored.len());
        let mut scores: Vec<i64> = Vec::with_capacity(scored.len());
        for (m, s) in scored {
            let mut i = moves.len();
            while i > 0 && scores[i - 1] < s {
                i -= 1;
            }
            moves.insert(i, m);
            scores.insert(i, s);
        }
        MoveSelector {
            generator: Generator::Root,
            phase_idx: 1,
            moves,
            scores,
            current: 0,
            moves_from_cache: false,
            hash_move: Move::NONE,
            killers: [Move::NONE; 4],
            mate_killer: Move::NONE,
            ordered: ORDERED_PICKS[Generator::Root as usize],
            moves_so_far: 0,
            quiet_moves_so_far: 0,
            last_score: 0,
            single_reply: false,
            deferred: Vec::new(),
            pv_moves: Vec::new(),
            pv_nodes: Vec::new(),
        }
    }

    #[inline(always)]
    fn phase(&self) -> Phase {
        PHASE_TABLE[self.generator as usize][self.phase_idx]
    }

    /// Produce the next move, or `None` when every phase is exhausted.
    /// Each returned move is vetted against `pos`, so it can be played
    /// directly.
    pub fn next(&mut self, pos: &Board, history: &History, pv_cache: &mut PvCache) -> Option<Move> {
        loop {
            match self.phase() {
                Phase::End => return None,
                Phase::Begin => unreachable!("selector served before first phase"),
                Phase::Trans => {
                    while self.current < self.moves.len() {
                        let m = self.moves[self.current];
                        self.current += 1;
                        if m.is_some() && movegen::is_move_legal(pos, m) {
                            self.moves_so_far += 1;
                            self.last_score = HASH_SCORE;
                            return Some(m);
                        }
                    }
                }
                Phase::Root | Phase::Deferred => {
                    if self.current < self.moves.len() {
                        let m = self.moves[self.current];
                        let s = self.scores.get(self.current).copied().unwrap_or(0);
                        self.current += 1;
                        self.accept(m, s);
                        return Some(m);
                    }
                }
                Phase::Evasions => {
                    if let Some(m) = self.pick(pos, false, false) {
                        return Some(m);
                    }
                }
                Phase::Pv | Phase::NonPv => {
                    if let Some(m) = self.pick(pos, true, false) {
                        return Some(m);
                    }
                }
                Phase::Qsearch | Phase::QsearchChecks => {
                    if let Some(m) = self.pick(pos, true, true) {
                        return Some(m);
                    }
                }
            }
            self.advance_phase(pos, history, pv_cache);
        }
    }

    /// Serve one move from the current generated batch: by best score for
    /// the first `ordered` picks, in generated order afterwards.
    fn pick(&mut self, pos: &Board, skip_hash: bool, qsearch_filter: bool) -> Option<Move> {
        if self.current >= self.ordered {
            while self.current < self.moves.len() {
                let m = self.moves[self.current];
                let s = self.scores[self.current];
                self.current += 1;
                if skip_hash && (m == self.hash_move || !self.vet(pos, m)) {
                    continue;
                }
                self.accept(m, s);
                return Some(m);
            }
            return None;
        }
        loop {
            let (m, s) = self.best_pick()?;
            // quiescence only examines promising tactics: anything already
            // classified as a bad exchange is skipped unless it promotes
            // to a queen
            if qsearch_filter && m.promote() != Some(Piece::Queen) && s < GRAIN {
                continue;
            }
            if skip_hash && (m == self.hash_move || !self.vet(pos, m)) {
                continue;
            }
            self.accept(m, s);
            return Some(m);
        }
    }

    /// Swap the best-scoring remaining move to the head of the batch and
    /// serve it.
    fn best_pick(&mut self) -> Option<(Move, i64)> {
        if self.current >= self.moves.len() {
            return None;
        }
        let mut best = self.current;
        for i in self.current + 1..self.moves.len() {
            if self.scores[i] > self.scores[best] {
                best = i;
            }
        }
        self.moves.swap(self.current, best);
        self.scores.swap(self.current, best);
        let picked = (self.moves[self.current], self.scores[self.current]);
        self.current += 1;
        Some(picked)
    }

    /// Can this move be played without leaving the king in check? Moves
    /// loaded from the PV cache additionally need a structural check,
    /// since the cache slot may have collided.
    fn vet(&self, pos: &Board, m: Move) -> bool {
        if self.moves_from_cache {
            movegen::is_move_legal(pos, m)
        } else {
            movegen::leaves_king_safe(pos, m)
        }
    }

    /// Bookkeeping for a served move.
    fn accept(&mut self, m: Move, score: i64) {
        self.moves_so_far += 1;
        if !m.is_capture() && m.promote() != Some(Piece::Queen) {
            self.quiet_moves_so_far += 1;
        }
        self.last_score = score;
    }

    /// Enter the next phase and generate its batch.
    fn advance_phase(&mut self, pos: &Board, history: &History, pv_cache: &mut PvCache) {
        debug_assert!(self.phase() != Phase::End);
        self.phase_idx += 1;
        self.current = 0;
        self.moves_from_cache = false;
        self.moves.clear();
        self.scores.clear();
        match self.phase() {
            Phase::Begin | Phase::Root => unreachable!("invalid phase transition"),
            Phase::End => {}
            Phase::Trans => {
                if self.hash_move.is_some() {
                    self.moves.push(self.hash_move);
                    self.scores.push(HASH_SCORE);
                }
            }
            Phase::Pv => {
                let cached = if PV_CACHE_ENABLED {
                    pv_cache.get(pos.hash).map(|(moves, nodes)| {
                        (moves.to_vec(), nodes.iter().map(|&n| n as i64).collect())
                    })
                } else {
                    None
                };
                match cached {
                    Some((moves, scores)) => {
                        self.moves = moves;
                        self.scores = scores;
                        self.moves_from_cache = true;
                    }
                    None => {
                        self.moves = movegen::pseudo_legal_moves(pos);
                        self.score_moves(pos, history);
                    }
                }
            }
            Phase::NonPv => {
                self.moves = movegen::pseudo_legal_moves(pos);
                self.score_moves(pos, history);
            }
            Phase::Evasions => {
                self.moves = movegen::evasions(pos);
                self.single_reply = self.moves.len() == 1;
                self.score_moves(pos, history);
            }
            Phase::Qsearch => {
                self.moves = movegen::quiescence_moves(pos, false);
                self.score_moves(pos, history);
            }
            Phase::QsearchChecks => {
                self.moves = movegen::quiescence_moves(pos, true);
                self.score_moves(pos, history);
            }
            Phase::Deferred => {
                self.moves = std::mem::take(&mut self.deferred);
                self.scores = vec![0; self.moves.len()];
            }
        }
    }

    /// Assign each move of the current batch its ordering score.
    fn score_moves(&mut self, pos: &Board, history: &History) {
        self.scores.clear();
        self.scores.reserve(self.moves.len());
        for &m in &self.moves {
            let score = if m == self.hash_move {
                HASH_SCORE
            } else if m == self.mate_killer {
                HASH_SCORE - 1
            } else if m.is_capture() || m.promote().is_some() {
                score_tactical(pos, m)
            } else if m == self.killers[0] {
                KILLER_SCORE
            } else if m == self.killers[1] {
                KILLER_SCORE - 1
            } else if m == self.killers[2] {
                KILLER_SCORE - 2
            } else if m == self.killers[3] {
                KILLER_SCORE - 3
            } else {
                i64::from(history.weight(pos.player, m))
            };
            self.scores.push(score);
        }
    }

    #[inline]
    #[must_use]
    /// True when the side to move is in check with exactly one legal
    /// reply; the search extends such nodes.
    pub fn has_single_reply(&self) -> bool {
        self.generator == Generator::Escape && self.single_reply
    }

    #[inline]
    #[must_use]
    /// Is this move a candidate for futility pruning? Only quiet,
    /// non-promoting, non-castling moves qualify.
    pub fn should_try_prune(&self, m: Move) -> bool {
        !m.is_capture() && m.promote().is_none() && !m.is_castle()
    }

    #[must_use]
    /// How many plies to reduce a late move by: one normally, two when the
    /// move scored below zero. Captures, queen promotions, castles, and
    /// the current killers are never reduced, and at least two quiet moves
    /// must have been served first.
    pub fn lmr_reduction(&self, m: Move) -> i32 {
        let reducible = self.quiet_moves_so_far > 2
            && !m.is_capture()
            && m.promote() != Some(Piece::Queen)
            && !m.is_castle()
            && m != self.killers[0]
            && m != self.killers[1];
        if !reducible {
            0
        } else if self.last_score < 0 {
            2
        } else {
            1
        }
    }

    /// Push the most recently served move into the deferral buffer, to be
    /// replayed in the deferred phase. Returns false (and defers nothing)
    /// for transposition or already-deferred moves, for moves scoring
    /// above the history range, or when deferral is disabled.
    pub fn defer(&mut self, m: Move) -> bool {
        self.defer_with(m, DEFER_ENABLED)
    }

    fn defer_with(&mut self, m: Move, enabled: bool) -> bool {
        if !enabled {
            return false;
        }
        if matches!(self.phase(), Phase::Deferred | Phase::Trans) {
            return false;
        }
        if self.last_score > GRAIN {
            return false;
        }
        self.deferred.push(m);
        self.moves_so_far -= 1;
        true
    }

    /// Record the subtree node count of a searched move, to be committed
    /// to the PV cache when this node completes. Escape nodes are never
    /// cached.
    pub fn add_pv_move(&mut self, m: Move, nodes: u64) {
        if self.generator == Generator::Escape {
            return;
        }
        debug_assert!(self.pv_moves.len() + 1 == self.moves_so_far || self.generator == Generator::Root);
        self.pv_moves.push(m);
        self.pv_nodes.push(nodes);
    }

    /// Write the recorded moves and node counts to the PV cache.
    pub fn commit_pv_moves(&self, pos: &Board, pv_cache: &mut PvCache) {
        if self.generator == Generator::Escape {
            return;
        }
        pv_cache.put(pos.hash, &self.pv_moves, &self.pv_nodes);
    }
}

/// Score a capture or promotion: a base of the victim's value against the
/// attacker's, landed in the good or bad band by the exchange outcome.
fn score_tactical(pos: &Board, m: Move) -> i64 {
    let victim = m.capture().map_or(0, material_value);
    let attacker = material_value(m.piece());
    let good = match m.promote() {
        Some(p) if p != Piece::Queen => false,
        Some(_) => true,
        None => attacker <= victim || movegen::static_exchange_sign(pos, m) >= 0,
    };
    let band = if good { GOOD_TACTIC_SCORE } else { BAD_TACTIC_SCORE };
    band + i64::from(6 * victim - attacker + 5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Square;

    fn drain(
        selector: &mut MoveSelector,
        pos: &Board,
        history: &History,
        pv_cache: &mut PvCache,
    ) -> Vec<Move> {
        let mut out = Vec::new();
        while let Some(m) = selector.next(pos, history, pv_cache) {
            out.push(m);
        }
        out
    }

    #[test]
    /// Test that the selector yields every legal move exactly once.
    fn yields_all_legal_moves_once() {
        let pos =
            Board::from_fen("r2q1rk1/ppp2ppp/3b4/4Pb2/4Q3/2PB4/P1P2PPP/R1B1K2R w KQ - 5 12")
                .unwrap();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector =
            MoveSelector::new(&pos, Generator::NonPv, None, Move::NONE, &history, &mut pv_cache);
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        let legal = movegen::legal_moves(&pos);
        assert_eq!(picked.len(), legal.len());
        for m in &legal {
            assert_eq!(picked.iter().filter(|&&p| p == *m).count(), 1);
        }
        assert_eq!(selector.moves_so_far, legal.len());
    }

    #[test]
    /// Test that the hash move is served first and not repeated.
    fn hash_move_first() {
        let pos = Board::new();
        let hash_move = Move::from_uci("e2e4", &pos).unwrap();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector =
            MoveSelector::new(&pos, Generator::NonPv, None, hash_move, &history, &mut pv_cache);
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        assert_eq!(picked[0], hash_move);
        assert_eq!(picked.iter().filter(|&&m| m == hash_move).count(), 1);
        assert_eq!(picked.len(), 20);
    }

    #[test]
    /// Test that an illegal hash move is silently dropped.
    fn bogus_hash_move_dropped() {
        let pos = Board::new();
        let bogus = Move::quiet(Square::E4, Square::E5, Piece::Pawn);
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector =
            MoveSelector::new(&pos, Generator::NonPv, None, bogus, &history, &mut pv_cache);
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        assert_eq!(picked.len(), 20);
        assert!(!picked.contains(&bogus));
    }

    #[test]
    /// Test escape substitution and the single-reply signal.
    fn escape_single_reply() {
        // Kxb2 is the only legal move
        let pos = Board::from_fen("k7/8/8/8/8/8/1q6/K7 w - - 0 1").unwrap();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector =
            MoveSelector::new(&pos, Generator::NonPv, None, Move::NONE, &history, &mut pv_cache);
        assert!(selector.has_single_reply());
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].to_uci(), "a1b2");
    }

    #[test]
    /// Test that quiescence filters out losing captures.
    fn qsearch_filters_bad_tactics() {
        // Qxd5 would lose the queen to the c6 pawn
        let pos = Board::from_fen("4k3/8/2p5/3p4/8/3Q4/8/4K3 w - - 0 1").unwrap();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector = MoveSelector::new(
            &pos,
            Generator::Quiescence,
            None,
            Move::NONE,
            &history,
            &mut pv_cache,
        );
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        assert!(picked.is_empty());
    }

    #[test]
    /// Test that killers order ahead of other quiet moves.
    fn killers_ordered_early() {
        let pos = Board::new();
        let killer = Move::from_uci("b1c3", &pos).unwrap();
        let node = NodeKillers {
            killers: [killer, Move::NONE],
            mate_killer: Move::NONE,
            prev_killers: [Move::NONE; 2],
        };
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector = MoveSelector::new(
            &pos,
            Generator::NonPv,
            Some(&node),
            Move::NONE,
            &history,
            &mut pv_cache,
        );
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        // no captures or hash move at the start position, so the killer
        // leads
        assert_eq!(picked[0], killer);
    }

    #[test]
    /// Test that a PV-cache hit dictates the ordering by node counts.
    fn pv_cache_orders_moves() {
        let pos = Board::new();
        let cheap = Move::from_uci("a2a3", &pos).unwrap();
        let expensive = Move::from_uci("d2d4", &pos).unwrap();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        pv_cache.put(pos.hash, &[cheap, expensive], &[10, 100_000]);
        let mut selector =
            MoveSelector::new(&pos, Generator::Pv, None, Move::NONE, &history, &mut pv_cache);
        let picked = drain(&mut selector, &pos, &history, &mut pv_cache);
        assert_eq!(picked, vec![expensive, cheap]);
    }

    #[test]
    /// Test that the deferral machinery replays moves when enabled.
    fn deferral_replays_moves() {
        let pos = Board::new();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector =
            MoveSelector::new(&pos, Generator::NonPv, None, Move::NONE, &history, &mut pv_cache);
        let first = selector.next(&pos, &history, &mut pv_cache).unwrap();
        let before = selector.moves_so_far;
        assert!(selector.defer_with(first, true));
        assert_eq!(selector.moves_so_far, before - 1);
        let rest = drain(&mut selector, &pos, &history, &mut pv_cache);
        // the deferred move comes back at the end
        assert_eq!(*rest.last().unwrap(), first);
        assert_eq!(rest.len(), 20);
    }

    #[test]
    /// Test that deferral is a no-op through the public entry point while
    /// disabled.
    fn deferral_disabled_by_default() {
        let pos = Board::new();
        let history = History::new();
        let mut pv_cache = PvCache::with_size(1 << 12);
        let mut selector =
            MoveSelector::new(&pos, Generator::NonPv, None, Move::NONE, &history, &mut pv_cache);
        let first = selector.next(&pos, &history, &mut pv_cache).unwrap();
        assert!(!selector.defer(first));
    }
}
