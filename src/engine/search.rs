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

//! The interior alpha-beta search and the quiescence search.
//!
//! Both functions recurse through an owned per-ply node stack held by the
//! `SearchContext`, which also owns every cache, the root move list, the
//! timer, and the statistics. The search is cooperative: it polls the
//! command channel and the clock every `POLL_INTERVAL + 1` nodes, and once
//! aborted every frame unwinds immediately with a sentinel score that the
//! driver discards.

use crate::base::{movegen, Board, Move, Piece};
use crate::uci::send::{EngineInfo, UciMessage};

use super::{
    config::EngineOptions,
    evaluate::{full_eval, material_value, simple_eval, Eval, PAWN_VAL},
    history::History,
    limit::{SearchLimits, SearchTimer},
    pawns::PawnTable,
    pick::{Generator, MoveSelector, NodeKillers},
    pvtable::PvCache,
    transposition::{TransTable, FLAG_EXACT, FLAG_LOWER, FLAG_MATE_THREAT, FLAG_UPPER},
    MAX_SEARCH_DEPTH,
};

use std::sync::mpsc::Receiver;

/// Mask of the node counter; input and the clock are polled when the
/// masked count reaches zero.
pub const POLL_INTERVAL: u64 = 0x3FF;

/* Feature flags. Disabling one restores plain alpha-beta behavior along
that axis without touching the surrounding code. */
pub const NULLMOVE_ENABLED: bool = true;
pub const NULLMOVE_VERIFICATION_ENABLED: bool = true;
pub const IID_ENABLED: bool = true;
pub const RAZORING_ENABLED: bool = true;
pub const FUTILITY_ENABLED: bool = true;
pub const HISTORY_PRUNE_ENABLED: bool = true;
pub const VALUE_PRUNE_ENABLED: bool = true;
pub const QFUTILITY_ENABLED: bool = true;
pub const LMR_ENABLED: bool = true;

const ENABLE_PV_IID: bool = true;
/// Dormant: the non-PV internal-deepening branch is kept but never taken.
const ENABLE_NON_PV_IID: bool = false;
const IID_PV_DEPTH_REDUCTION: i32 = 2;
const IID_NON_PV_DEPTH_REDUCTION: i32 = 2;
const IID_PV_DEPTH_CUTOFF: i32 = 5;
const IID_NON_PV_DEPTH_CUTOFF: i32 = 8;

const NULL_EVAL_MARGIN: i32 = 200;
const NULLMOVE_VERIFICATION_REDUCTION: i32 = 5;
const RAZOR_DEPTH_LIMIT: i32 = 1;
const RAZOR_MARGIN: [i32; RAZOR_DEPTH_LIMIT as usize] = [300];
const FUTILITY_DEPTH_LIMIT: i32 = 3;
const FUTILITY_MARGIN: [i32; FUTILITY_DEPTH_LIMIT as usize] = [100, 300, 500];
const QFUTILITY_MARGIN: i32 = 80;
pub(super) const LMR_DEPTH_LIMIT: i32 = 2;
const LMR_EARLY_MOVES: usize = 2;
const LMR_PV_EARLY_MOVES: usize = 10;
/// Quiet checks are generated in quiescence while the stand-pat score is
/// within this margin of alpha.
const QCHECK_MARGIN: i32 = 150;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What the engine is currently doing. The front-end flips this to
/// `Aborted` (through the command channel) to stop a search.
pub enum EngineStatus {
    Idle,
    Thinking,
    Pondering,
    Aborted,
}

#[derive(Clone, Copy, Debug)]
/// Per-ply search state: the principal variation found at this ply, the
/// killer slots, and the mate killer.
pub struct SearchNode {
    pub pv: [Move; MAX_SEARCH_DEPTH + 1],
    pub killers: [Move; 2],
    pub mate_killer: Move,
}

impl SearchNode {
    #[must_use]
    pub fn new() -> SearchNode {
        SearchNode {
            pv: [Move::NONE; MAX_SEARCH_DEPTH + 1],
            killers: [Move::NONE; 2],
            mate_killer: Move::NONE,
        }
    }

    #[inline(always)]
    fn clear_killers(&mut self) {
        self.killers = [Move::NONE; 2];
        self.mate_killer = Move::NONE;
    }
}

impl Default for SearchNode {
    fn default() -> SearchNode {
        SearchNode::new()
    }
}

#[derive(Clone, Debug)]
/// One root move and everything the driver tracks about it.
pub struct RootMove {
    pub mv: Move,
    /// The score from the current iteration, or `Eval::MIN` if the move
    /// has not been resolved.
    pub score: Eval,
    /// The depth-0 quiescence score, used for initial ordering and the
    /// obvious-move test.
    pub qsearch_score: Eval,
    /// Subtree nodes consumed in the last iteration; orders the next one.
    pub nodes: u64,
    /// The line found under this move.
    pub pv: Vec<Move>,
    /// The deepest ply reached under this move (UCI `seldepth`).
    pub max_depth: usize,
}

#[derive(Clone, Copy, Debug, Default)]
/// Search statistics, printed under the `verbose` option.
pub struct SearchStats {
    pub nodes: u64,
    pub qnodes: u64,
    pub pvnodes: u64,
    pub transposition_cutoffs: u64,
    pub nullmove_cutoffs: u64,
    pub razor_attempts: u64,
    pub razor_prunes: u64,
    pub root_fail_highs: u64,
    pub root_fail_lows: u64,
}

#[derive(Debug)]
/// Everything one search needs, owned in one place: the position, the
/// caches, the per-ply node stack, the root move list, timing, limits,
/// options, statistics, and the command channel.
pub struct SearchContext {
    pub pos: Board,
    pub tt: TransTable,
    pub pawn_table: PawnTable,
    pub pv_cache: PvCache,
    pub history: History,
    pub stack: Vec<SearchNode>,
    pub root_moves: Vec<RootMove>,
    /// Index into `root_moves` of the move currently being searched.
    pub current_root_move: Option<usize>,
    /// The best line of the current iteration, rooted at the position.
    pub pv: [Move; MAX_SEARCH_DEPTH + 1],
    pub best_score: Eval,
    pub timer: SearchTimer,
    pub limits: SearchLimits,
    pub options: EngineOptions,
    pub status: EngineStatus,
    /// Set when a `quit` command arrives mid-search.
    pub quit: bool,
    /// The command channel from the front-end, polled at `open_node`.
    pub input: Option<Receiver<String>>,
    /// Commands received mid-search which the front-end must replay.
    pub pending: Vec<String>,
    pub current_depth: i32,
    /// Ordinal of the root move being searched, starting from 0.
    pub current_move_index: usize,
    /// A zero-window root move just failed high and is being re-searched;
    /// the runaway-time check stands down while this is set.
    pub resolving_fail_high: bool,
    /// Accumulated instability of the root this iteration; scales the
    /// time bonus.
    pub root_indecisiveness: i32,
    /// A candidate move far ahead of its rivals, or `NONE`.
    pub obvious_move: Move,
    pub scores_by_iteration: [Eval; MAX_SEARCH_DEPTH + 1],
    pub stats: SearchStats,
    /// Timestamp of the last periodic progress line.
    last_info_ms: u64,
}

impl SearchContext {
    #[must_use]
    /// Construct a context with freshly allocated caches.
    pub fn new(options: EngineOptions) -> SearchContext {
        SearchContext {
            pos: Board::new(),
            tt: TransTable::with_size(options.hash_bytes),
            pawn_table: PawnTable::with_size(EngineOptions::PAWN_TABLE_BYTES),
            pv_cache: PvCache::with_size(EngineOptions::PV_CACHE_BYTES),
            history: History::new(),
            stack: vec![SearchNode::new(); MAX_SEARCH_DEPTH + 2],
            root_moves: Vec::new(),
            current_root_move: None,
            pv: [Move::NONE; MAX_SEARCH_DEPTH + 1],
            best_score: Eval::MIN,
            timer: SearchTimer::new(),
            limits: SearchLimits::default(),
            options,
            status: EngineStatus::Idle,
            quit: false,
            input: None,
            pending: Vec::new(),
            current_depth: 0,
            current_move_index: 0,
            resolving_fail_high: false,
            root_indecisiveness: 0,
            obvious_move: Move::NONE,
            scores_by_iteration: [Eval::DRAW; MAX_SEARCH_DEPTH + 1],
            stats: SearchStats::default(),
            last_info_ms: 0,
        }
    }

    /// Drop all cached knowledge, as for `ucinewgame`.
    pub fn new_game(&mut self) {
        self.tt.clear();
        self.pawn_table.clear();
        self.pv_cache.clear();
        self.history.clear();
        for node in &mut self.stack {
            *node = SearchNode::new();
        }
    }

    /// Reset the per-search bookkeeping. The caches survive between
    /// searches; only the age stamp distinguishes their entries.
    pub fn prepare_search(&mut self) {
        self.stats = SearchStats::default();
        self.pv = [Move::NONE; MAX_SEARCH_DEPTH + 1];
        self.best_score = Eval::MIN;
        self.current_root_move = None;
        self.current_move_index = 0;
        self.resolving_fail_high = false;
        self.root_indecisiveness = 0;
        self.obvious_move = Move::NONE;
        self.scores_by_iteration = [Eval::DRAW; MAX_SEARCH_DEPTH + 1];
        self.last_info_ms = 0;
        for node in &mut self.stack {
            *node = SearchNode::new();
        }
    }

    #[must_use]
    /// Has enough time elapsed for progress output to be wanted?
    pub fn should_output(&self) -> bool {
        self.timer.elapsed_ms() >= self.options.output_delay_ms
    }
}

/// Should the search stop right now? Checked at poll points only.
pub fn should_stop_searching(ctx: &SearchContext) -> bool {
    if ctx.status == EngineStatus::Aborted {
        return true;
    }
    if ctx.status == EngineStatus::Pondering || ctx.limits.infinite {
        return false;
    }
    let so_far = ctx.timer.elapsed_ms();

    // past the hard limit: stop unconditionally
    if ctx.limits.time_limit != 0 && so_far >= ctx.limits.time_limit {
        return true;
    }

    // past the soft limit with the first move of this depth finished
    let real_target = ctx.limits.time_target + ctx.limits.time_bonus;
    if ctx.limits.time_target != 0 && so_far >= real_target && ctx.current_move_index == 1 {
        return true;
    }

    // far past the soft limit and not in the middle of resolving a fail
    // high: the iteration has run away
    if ctx.limits.time_target != 0 && !ctx.resolving_fail_high && so_far > 4 * real_target {
        return true;
    }

    ctx.limits.node_limit != 0 && ctx.stats.nodes >= ctx.limits.node_limit
}

/// Drain the command channel. Only the commands meaningful mid-search are
/// handled here; everything else is queued for the front-end.
fn check_input(ctx: &mut SearchContext) {
    loop {
        let line = match ctx.input.as_ref().map(|rx| rx.try_recv()) {
            Some(Ok(line)) => line,
            _ => return,
        };
        match line.trim() {
            "stop" => ctx.status = EngineStatus::Aborted,
            "quit" => {
                ctx.quit = true;
                ctx.status = EngineStatus::Aborted;
            }
            "isready" => println!("{}", UciMessage::ReadyOk),
            "ponderhit" => {
                if ctx.status == EngineStatus::Pondering {
                    ctx.status = EngineStatus::Thinking;
                }
            }
            _ => ctx.pending.push(line),
        }
    }
}

/// Count a node; at poll boundaries, check the clock and the channel and
/// emit the periodic progress line. Also clears the killer slots the
/// children of this node will share.
fn open_node(ctx: &mut SearchContext, ply: usize) {
    ctx.stats.nodes += 1;
    if ctx.stats.nodes & POLL_INTERVAL == 0 {
        if should_stop_searching(ctx) {
            ctx.status = EngineStatus::Aborted;
        }
        check_input(ctx);
        let so_far = ctx.timer.elapsed_ms();
        if so_far < 1000 {
            ctx.last_info_ms = 0;
        } else if so_far - ctx.last_info_ms > 1000 {
            ctx.last_info_ms = so_far;
            let nps = ctx.stats.nodes * 1000 / so_far;
            let mut info = vec![
                EngineInfo::Time(so_far),
                EngineInfo::Nodes(ctx.stats.nodes),
            ];
            if ctx.options.verbose {
                info.push(EngineInfo::QNodes(ctx.stats.qnodes));
                info.push(EngineInfo::PvNodes(ctx.stats.pvnodes));
            }
            info.push(EngineInfo::NodeSpeed(nps));
            info.push(EngineInfo::HashFull(ctx.tt.hashfull()));
            println!("{}", UciMessage::Info(&info));
        }
    }
    ctx.stack[ply + 1].clear_killers();
}

fn open_qnode(ctx: &mut SearchContext, ply: usize) {
    ctx.stats.qnodes += 1;
    open_node(ctx, ply);
}

/// Should this node's depth be extended by a ply? `pos` is the position
/// *after* the move was played.
fn extend(pos: &Board, m: Move, single_reply: bool) -> i32 {
    if movegen::is_check(pos) || single_reply {
        return 1;
    }
    // a pawn arriving on its seventh rank is about to promote
    let to = m.to_square();
    if m.piece() == Piece::Pawn && m.promote().is_none() && (to.rank() == 6 || to.rank() == 1) {
        return 1;
    }
    0
}

/// The root-move extension: single-reply never applies at the root.
pub(super) fn extend_root(pos: &Board, m: Move) -> i32 {
    extend(pos, m, false)
}

/// Copy the line found under root move `m` into the context's principal
/// variation.
pub(super) fn update_root_pv(ctx: &mut SearchContext, m: Move) {
    ctx.pv[0] = m;
    let mut i = 1;
    while i <= MAX_SEARCH_DEPTH {
        ctx.pv[i] = ctx.stack[1].pv[i];
        if ctx.pv[i].is_none() {
            break;
        }
        i += 1;
    }
    debug_assert!(check_line(&ctx.pos, &ctx.pv));
}

/// Null moves are unsound when the side to move has only king and pawns
/// (zugzwang), or is in check.
fn is_nullmove_allowed(pos: &Board) -> bool {
    if movegen::is_check(pos) {
        return false;
    }
    !(pos.num_pieces[0] == 1 && pos.num_pieces[1] == 1)
}

/// Internal iterative deepening is worthwhile only well above the
/// horizon, and (by the flag) only at PV nodes.
fn is_iid_allowed(full_window: bool, depth: i32) -> bool {
    if full_window {
        ENABLE_PV_IID && depth > IID_PV_DEPTH_CUTOFF
    } else {
        ENABLE_NON_PV_IID && depth > IID_NON_PV_DEPTH_CUTOFF
    }
}

/// Assemble the killer slots a node at `ply` hands to its selector:
/// its own, plus those from two plies shallower.
fn node_killers(ctx: &SearchContext, ply: usize) -> NodeKillers {
    let node = &ctx.stack[ply];
    let prev_killers = if ply >= 2 {
        ctx.stack[ply - 2].killers
    } else {
        [Move::NONE; 2]
    };
    NodeKillers {
        killers: node.killers,
        mate_killer: node.mate_killer,
        prev_killers,
    }
}

/// Copy the child's line after `m` into this ply's principal variation.
pub(super) fn update_pv(stack: &mut [SearchNode], ply: usize, m: Move) {
    let (head, tail) = stack.split_at_mut(ply + 1);
    let dst = &mut head[ply].pv;
    let src = &tail[0].pv;
    dst[ply] = m;
    let mut i = ply + 1;
    while i <= MAX_SEARCH_DEPTH {
        dst[i] = src[i];
        if src[i].is_none() {
            break;
        }
        i += 1;
    }
}

/// Is every move of `line` legal when played out from `pos`? Only used
/// inside debug assertions.
fn check_line(pos: &Board, line: &[Move]) -> bool {
    let mut scratch = pos.clone();
    for &m in line.iter().take_while(|m| m.is_some()) {
        if !movegen::is_move_legal(&scratch, m) {
            return false;
        }
        scratch.make_move(m);
    }
    true
}

/// Search an interior node. Returns a score in `[-MATE, MATE]`, or a
/// meaningless sentinel once the search has been aborted.
pub fn search(
    ctx: &mut SearchContext,
    ply: usize,
    mut alpha: Eval,
    mut beta: Eval,
    depth: i32,
) -> Eval {
    ctx.stack[ply].pv[ply] = Move::NONE;
    if ctx.status == EngineStatus::Aborted {
        return Eval::DRAW;
    }
    if alpha > Eval::mate_in(ply as i32) {
        // a shorter mate is already guaranteed
        return alpha;
    }
    if depth <= 0 || ply >= MAX_SEARCH_DEPTH - 1 {
        return quiesce(ctx, ply, alpha, beta, 0.min(depth));
    }
    if ctx.pos.is_draw() {
        return Eval::DRAW;
    }
    let full_window = beta.cp() - alpha.cp() > 1;

    // bound the score by the mates reachable from this ply
    let orig_alpha = alpha;
    alpha = alpha.max(Eval::mated_in(ply as i32));
    beta = beta.min(Eval::mate_in(ply as i32));
    if alpha >= beta {
        return alpha;
    }

    let mut hash_move = Move::NONE;
    let mut mate_threat = false;
    if let Some(entry) = ctx.tt.get(ctx.pos.hash, ply as i32) {
        hash_move = entry.best_move;
        mate_threat = entry.mate_threat();
        if !full_window && TransTable::is_cutoff_allowed(&entry, depth, &mut alpha, &mut beta) {
            ctx.stack[ply].pv[ply] = hash_move;
            ctx.stack[ply].pv[ply + 1] = Move::NONE;
            ctx.stats.transposition_cutoffs += 1;
            return alpha.max(entry.score);
        }
    }

    open_node(ctx, ply);
    if full_window {
        ctx.stats.pvnodes += 1;
    }
    let lazy_score = simple_eval(&ctx.pos);

    if NULLMOVE_ENABLED
        && depth != 1
        && !mate_threat
        && !full_window
        && ctx.pos.prev_move != Move::NULL
        && lazy_score + NULL_EVAL_MARGIN > beta
        && !beta.is_mating_score()
        && is_nullmove_allowed(&ctx.pos)
    {
        let undo = ctx.pos.make_null_move();
        let mut null_r = 2 + (depth + 2) / 4;
        if (lazy_score - beta).cp() > PAWN_VAL {
            null_r += 1;
        }
        let mut null_score = -search(ctx, ply + 1, -beta, -beta + 1, depth - null_r);
        ctx.pos.undo_null_move(&undo);
        if null_score.is_mated_score() {
            // doing nothing gets us mated: remember the threat
            mate_threat = true;
        }
        if null_score >= beta {
            if NULLMOVE_VERIFICATION_ENABLED {
                let rdepth = depth - NULLMOVE_VERIFICATION_REDUCTION;
                if rdepth > 0 {
                    null_score = search(ctx, ply, alpha, beta, rdepth);
                }
            }
            ctx.stats.nullmove_cutoffs += 1;
            if null_score >= beta {
                return beta;
            }
        }
    } else if RAZORING_ENABLED
        && ctx.pos.prev_move != Move::NULL
        && !full_window
        && depth <= RAZOR_DEPTH_LIMIT
        && hash_move.is_none()
        && !beta.is_mating_score()
        && lazy_score + RAZOR_MARGIN[(depth - 1) as usize] < beta
    {
        ctx.stats.razor_attempts += 1;
        let qscore = quiesce(ctx, ply, alpha, beta, 0);
        if depth == 1 || qscore < beta {
            ctx.stats.razor_prunes += 1;
            return qscore;
        }
    }

    if IID_ENABLED && hash_move.is_none() && is_iid_allowed(full_window, depth) {
        let iid_depth = if full_window {
            depth - IID_PV_DEPTH_REDUCTION
        } else {
            (depth / 2).min(depth - IID_NON_PV_DEPTH_REDUCTION)
        };
        debug_assert!(iid_depth > 0);
        search(ctx, ply, alpha, beta, iid_depth);
        hash_move = ctx.stack[ply].pv[ply];
        ctx.stack[ply].pv[ply] = Move::NONE;
    }

    let killers = node_killers(ctx, ply);
    let generator = if full_window {
        Generator::Pv
    } else {
        Generator::NonPv
    };
    let mut selector = MoveSelector::new(
        &ctx.pos,
        generator,
        Some(&killers),
        hash_move,
        &ctx.history,
        &mut ctx.pv_cache,
    );
    let single_reply = selector.has_single_reply();
    let mut searched_moves: Vec<Move> = Vec::new();
    let mut eval_score = lazy_score;

    while let Some(m) = selector.next(&ctx.pos, &ctx.history, &mut ctx.pv_cache) {
        let num_legal_moves = selector.moves_so_far;
        if num_legal_moves == 2 {
            // the first move usually cuts; only pay for the real
            // evaluation once a second move is reached
            eval_score = full_eval(&ctx.pos, &mut ctx.pawn_table);
        }
        let nodes_before = ctx.stats.nodes;
        let undo = ctx.pos.make_move(m);
        let ext = extend(&ctx.pos, m, single_reply);
        if ext > 0 && selector.defer(m) {
            ctx.pos.undo_move(m, &undo);
            continue;
        }

        let mut score;
        if num_legal_moves == 1 {
            score = -search(ctx, ply + 1, -beta, -alpha, depth + ext - 1);
        } else {
            let prune_futile = FUTILITY_ENABLED
                && !full_window
                && ext == 0
                && !mate_threat
                && depth <= FUTILITY_DEPTH_LIMIT
                && !movegen::is_check(&ctx.pos)
                && num_legal_moves >= (depth + 2) as usize
                && selector.should_try_prune(m);
            if prune_futile {
                let mover = !ctx.pos.player;
                if HISTORY_PRUNE_ENABLED && ctx.history.is_prune_allowed(mover, m, depth) {
                    ctx.pos.undo_move(m, &undo);
                    if full_window {
                        selector.add_pv_move(m, 0);
                    }
                    continue;
                }
                if VALUE_PRUNE_ENABLED
                    && eval_score
                        + m.capture().map_or(0, material_value)
                        + FUTILITY_MARGIN[(depth - 1) as usize]
                        < beta + 2 * num_legal_moves as i32
                {
                    ctx.pos.undo_move(m, &undo);
                    if full_window {
                        selector.add_pv_move(m, 0);
                    }
                    continue;
                }
            }

            let move_is_late = if full_window {
                num_legal_moves > LMR_PV_EARLY_MOVES
            } else {
                num_legal_moves > LMR_EARLY_MOVES
            };
            let try_lmr = LMR_ENABLED
                && move_is_late
                && ext == 0
                && !mate_threat
                && depth > LMR_DEPTH_LIMIT
                && !movegen::is_check(&ctx.pos);
            let lmr_reduction = if try_lmr { selector.lmr_reduction(m) } else { 0 };
            if lmr_reduction > 0 {
                score = -search(ctx, ply + 1, -alpha - 1, -alpha, depth - lmr_reduction - 1);
            } else {
                // force the zero-window search below
                score = alpha + 1;
            }
            if score > alpha {
                score = -search(ctx, ply + 1, -alpha - 1, -alpha, depth + ext - 1);
                if score > alpha && full_window {
                    score = -search(ctx, ply + 1, -beta, -alpha, depth + ext - 1);
                }
            }
        }

        searched_moves.push(m);
        ctx.pos.undo_move(m, &undo);
        if full_window {
            selector.add_pv_move(m, ctx.stats.nodes - nodes_before);
        }

        if score > alpha {
            alpha = score;
            update_pv(&mut ctx.stack, ply, m);
            debug_assert!(check_line(&ctx.pos, &ctx.stack[ply].pv[ply..]));
            if score >= beta {
                let mover = ctx.pos.player;
                if !m.is_capture() && m.promote().is_none() {
                    ctx.history.record_success(mover, m, depth);
                    for &prior in &searched_moves[..searched_moves.len() - 1] {
                        if !prior.is_capture() && prior.promote().is_none() {
                            ctx.history.record_failure(mover, prior);
                        }
                    }
                    let node = &mut ctx.stack[ply];
                    if m != node.killers[0] {
                        node.killers[1] = node.killers[0];
                        node.killers[0] = m;
                    }
                }
                if score.is_mating_score() {
                    ctx.stack[ply].mate_killer = m;
                }
                let mut flags = FLAG_LOWER;
                if mate_threat {
                    flags |= FLAG_MATE_THREAT;
                }
                ctx.tt.put(ctx.pos.hash, m, depth, beta, flags, ply as i32);
                if full_window && ctx.status != EngineStatus::Aborted {
                    // flush the unsearched moves so the cached list stays
                    // aligned with this node's move set
                    while let Some(rest) = selector.next(&ctx.pos, &ctx.history, &mut ctx.pv_cache)
                    {
                        selector.add_pv_move(rest, 0);
                    }
                    selector.commit_pv_moves(&ctx.pos, &mut ctx.pv_cache);
                }
                ctx.stack[ply].pv[ply] = Move::NONE;
                return beta;
            }
        }
    }

    let num_legal_moves = selector.moves_so_far;
    if full_window && ctx.status != EngineStatus::Aborted {
        selector.commit_pv_moves(&ctx.pos, &mut ctx.pv_cache);
    }
    if num_legal_moves == 0 {
        ctx.stack[ply].pv[ply] = Move::NONE;
        if movegen::is_check(&ctx.pos) {
            return Eval::mated_in(ply as i32);
        }
        return Eval::DRAW;
    }

    let mut flags = if alpha == orig_alpha {
        FLAG_UPPER
    } else {
        FLAG_EXACT
    };
    if mate_threat {
        flags |= FLAG_MATE_THREAT;
    }
    let best = if alpha == orig_alpha {
        Move::NONE
    } else {
        ctx.stack[ply].pv[ply]
    };
    ctx.tt.put(ctx.pos.hash, best, depth, alpha, flags, ply as i32);
    alpha
}

/// Search a position until it is quiet: captures and promotions only,
/// plus quiet checks near the horizon, with a stand-pat floor from the
/// static evaluation.
pub fn quiesce(
    ctx: &mut SearchContext,
    ply: usize,
    mut alpha: Eval,
    mut beta: Eval,
    depth: i32,
) -> Eval {
    if let Some(idx) = ctx.current_root_move {
        if ply > ctx.root_moves[idx].max_depth {
            ctx.root_moves[idx].max_depth = ply;
        }
    }
    ctx.stack[ply].pv[ply] = Move::NONE;
    if ctx.status == EngineStatus::Aborted {
        return Eval::DRAW;
    }
    if alpha > Eval::mate_in(ply as i32 - 1) {
        return alpha;
    }
    if ctx.pos.is_draw() {
        return Eval::DRAW;
    }
    let full_window = beta.cp() - alpha.cp() > 1;
    let orig_alpha = alpha;

    let mut hash_move = Move::NONE;
    if let Some(entry) = ctx.tt.get(ctx.pos.hash, ply as i32) {
        hash_move = entry.best_move;
        if TransTable::is_cutoff_allowed(&entry, depth, &mut alpha, &mut beta) {
            ctx.stack[ply].pv[ply] = hash_move;
            ctx.stack[ply].pv[ply + 1] = Move::NONE;
            ctx.stats.transposition_cutoffs += 1;
            return alpha.max(entry.score);
        }
    }

    let eval = full_eval(&ctx.pos, &mut ctx.pawn_table);
    let mut score = eval;
    if ply >= MAX_SEARCH_DEPTH - 1 {
        return score;
    }
    open_qnode(ctx, ply);
    let in_check = movegen::is_check(&ctx.pos);
    if !in_check {
        if alpha < score {
            alpha = score;
        }
        if alpha >= beta {
            return beta;
        }
    }

    let allow_futility = QFUTILITY_ENABLED
        && !full_window
        && !in_check
        && ctx.pos.num_pieces[ctx.pos.player as usize] > 2;
    let generator = if depth >= 0 && eval + QCHECK_MARGIN >= alpha {
        Generator::QuiescenceChecks
    } else {
        Generator::Quiescence
    };
    let killers = node_killers(ctx, ply);
    let mut selector = MoveSelector::new(
        &ctx.pos,
        generator,
        Some(&killers),
        hash_move,
        &ctx.history,
        &mut ctx.pv_cache,
    );
    let mut num_qmoves = 0;
    while let Some(m) = selector.next(&ctx.pos, &ctx.history, &mut ctx.pv_cache) {
        num_qmoves += 1;
        if allow_futility
            && m.promote() != Some(Piece::Queen)
            && eval + m.capture().map_or(0, material_value) + QFUTILITY_MARGIN < alpha
        {
            continue;
        }
        let undo = ctx.pos.make_move(m);
        score = -quiesce(ctx, ply + 1, -beta, -alpha, depth - 1);
        ctx.pos.undo_move(m, &undo);
        if score > alpha {
            alpha = score;
            update_pv(&mut ctx.stack, ply, m);
            debug_assert!(check_line(&ctx.pos, &ctx.stack[ply].pv[ply..]));
            if score >= beta {
                ctx.tt.put(ctx.pos.hash, m, depth, beta, FLAG_LOWER, ply as i32);
                return beta;
            }
        }
    }
    if num_qmoves == 0 && in_check {
        return Eval::mated_in(ply as i32);
    }
    if alpha == orig_alpha {
        ctx.tt
            .put(ctx.pos.hash, Move::NONE, depth, alpha, FLAG_UPPER, ply as i32);
    } else {
        ctx.tt.put(
            ctx.pos.hash,
            ctx.stack[ply].pv[ply],
            depth,
            alpha,
            FLAG_EXACT,
            ply as i32,
        );
    }
    alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a context around a position with small caches.
    fn context_for(fen: &str) -> SearchContext {
        let mut ctx = SearchContext::new(EngineOptions {
            hash_bytes: 1 << 20,
            ..EngineOptions::default()
        });
        ctx.pos = Board::from_fen(fen).unwrap();
        ctx.status = EngineStatus::Thinking;
        ctx
    }

    #[test]
    /// Test that a depth-0 search is exactly the quiescence value.
    fn depth_zero_is_quiescence() {
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/3PP3/8/PPP2PPP/RNBQKBNR b KQkq - 0 2";
        let mut ctx = context_for(fen);
        let a = search(&mut ctx, 1, Eval::MIN, Eval::MAX, 0);
        let mut ctx = context_for(fen);
        let b = quiesce(&mut ctx, 1, Eval::MIN, Eval::MAX, 0);
        assert_eq!(a, b);
    }

    #[test]
    /// Test that a checkmated side returns the mate score.
    fn checkmate_is_mated() {
        // fool's mate: black has just delivered mate
        let mut ctx = context_for(
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
        );
        let score = search(&mut ctx, 1, Eval::MIN, Eval::MAX, 3);
        assert_eq!(score, Eval::mated_in(1));
    }

    #[test]
    /// Test that a stalemated side returns the draw score.
    fn stalemate_is_draw() {
        let mut ctx = context_for("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let score = search(&mut ctx, 1, Eval::MIN, Eval::MAX, 3);
        assert_eq!(score, Eval::DRAW);
    }

    #[test]
    /// Test that the search finds a mate in one.
    fn finds_mate_in_one() {
        let mut ctx = context_for("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
        let score = search(&mut ctx, 1, Eval::MIN, Eval::MAX, 2);
        assert_eq!(score, Eval::mate_in(2));
        assert_eq!(ctx.stack[1].pv[1].to_uci(), "a1a8");
    }

    #[test]
    /// Test that the search finds a hanging queen at shallow depth.
    fn wins_hanging_queen() {
        // white to move can just take the undefended queen on d5
        let mut ctx = context_for("4k3/8/8/3q4/8/8/8/3RK3 w - - 0 1");
        let score = search(&mut ctx, 1, Eval::MIN, Eval::MAX, 4);
        assert!(score > Eval::centipawns(400));
    }

    #[test]
    /// Test that an aborted search unwinds immediately.
    fn abort_unwinds() {
        let mut ctx = context_for("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        ctx.status = EngineStatus::Aborted;
        let nodes_before = ctx.stats.nodes;
        let score = search(&mut ctx, 1, Eval::MIN, Eval::MAX, 8);
        assert_eq!(score, Eval::DRAW);
        assert_eq!(ctx.stats.nodes, nodes_before);
    }

    #[test]
    /// Test that quiescence in check searches evasions and detects mate.
    fn quiescence_mate_detection() {
        // back-rank mate already delivered
        let mut ctx = context_for("R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1");
        let score = quiesce(&mut ctx, 1, Eval::MIN, Eval::MAX, 0);
        assert_eq!(score, Eval::mated_in(1));
    }
}
