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

//! The iterative-deepening driver and the root search.
//!
//! The driver searches the root to increasing depths, steering each
//! iteration with an aspiration window around the previous score and
//! re-seeding the transposition table with the principal variation it
//! finds. Root moves are ordered by the subtree node counts of the last
//! iteration, and per-move results feed the obvious-move and time-bonus
//! heuristics that decide when to stop.

use crate::base::{movegen, Move};
use crate::uci::send::{EngineInfo, UciMessage};

use super::{
    evaluate::Eval,
    pick::MoveSelector,
    search::{
        extend_root, quiesce, search, should_stop_searching, update_root_pv, EngineStatus,
        RootMove, SearchContext, LMR_DEPTH_LIMIT, LMR_ENABLED,
    },
    transposition::{FLAG_EXACT, FLAG_LOWER, FLAG_UPPER},
    MAX_SEARCH_DEPTH,
};

/// Allow the driver to stop early when one root move dwarfs the rest.
const OBVIOUS_MOVE_ENABLED: bool = true;
/// How far ahead of every rival a move must be to count as obvious.
const OBVIOUS_MOVE_MARGIN: i32 = 200;
/// Half-width of the root aspiration window.
const ASPIRATION_WINDOW: i32 = 40;
/// Root moves beyond this many are candidates for late-move reduction.
const ROOT_LMR_EARLY_MOVES: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// How one root-search pass ended.
enum RootResult {
    Aborted,
    FailLow,
    FailHigh,
    Exact,
}

/// Search the root position with iterative deepening and print the best
/// move. This is the engine's main entry point; it returns when the
/// search completes, is stopped, or runs out of time.
pub fn deepening_search(ctx: &mut SearchContext, ponder: bool) {
    ctx.status = if ponder {
        EngineStatus::Pondering
    } else {
        EngineStatus::Thinking
    };
    ctx.prepare_search();
    ctx.tt.increment_age();
    ctx.timer.start();

    // a pre-supplied list (UCI searchmoves) restricts the root
    if ctx.root_moves.is_empty() {
        init_root_moves(ctx);
    }
    if ctx.root_moves.is_empty() {
        // mated or stalemated: there is nothing to search
        println!(
            "{}",
            UciMessage::BestMove {
                m: Move::NONE,
                ponder: None
            }
        );
        ctx.timer.stop();
        ctx.status = EngineStatus::Idle;
        return;
    }
    find_obvious_move(ctx);

    let mut id_score = Eval::MIN;
    ctx.best_score = Eval::MIN;
    let mut consecutive_fail_highs = 0u32;
    let mut consecutive_fail_lows = 0u32;
    let depth_limit = if ctx.limits.depth_limit > 0 {
        ctx.limits.depth_limit.min(MAX_SEARCH_DEPTH as i32 - 1)
    } else {
        MAX_SEARCH_DEPTH as i32 - 1
    };

    ctx.current_depth = 2.min(depth_limit);
    loop {
        let depth = ctx.current_depth;
        if ctx.should_output() {
            println!("{}", UciMessage::Info(&[EngineInfo::Depth(depth)]));
        }

        // aspiration window around the last iteration's score
        let mut alpha = Eval::MIN;
        let mut beta = Eval::MAX;
        let last_score = ctx.scores_by_iteration[(depth - 1) as usize];
        if depth > 5 && ctx.options.multi_pv == 1 {
            if consecutive_fail_lows <= 1 {
                alpha = last_score - ASPIRATION_WINDOW;
            }
            if consecutive_fail_highs <= 1 {
                beta = last_score + ASPIRATION_WINDOW;
            }
            if ctx.options.verbose {
                println!(
                    "info string root window is ({}, {})",
                    alpha.cp(),
                    beta.cp()
                );
            }
        }
        ctx.root_indecisiveness = 0;

        let mut result = root_search(ctx, alpha, beta);
        // resolve a failed window immediately with the bound thrown open
        loop {
            match result {
                RootResult::FailLow if alpha > Eval::MIN => {
                    consecutive_fail_lows += 1;
                    consecutive_fail_highs = 0;
                    ctx.root_indecisiveness += 3;
                    alpha = Eval::MIN;
                    result = root_search(ctx, alpha, beta);
                }
                RootResult::FailHigh if beta < Eval::MAX => {
                    consecutive_fail_highs += 1;
                    consecutive_fail_lows = 0;
                    ctx.root_indecisiveness += 3;
                    beta = Eval::MAX;
                    result = root_search(ctx, alpha, beta);
                }
                _ => break,
            }
        }
        if result == RootResult::Aborted {
            break;
        }
        if result == RootResult::Exact {
            consecutive_fail_lows = 0;
            consecutive_fail_highs = 0;
        }

        // replace any displaced pv entries in the hash table
        if ctx.pv[0].is_some() {
            let flags = match result {
                RootResult::FailLow => FLAG_UPPER,
                RootResult::FailHigh => FLAG_LOWER,
                _ => FLAG_EXACT,
            };
            let line: Vec<Move> = ctx
                .pv
                .iter()
                .copied()
                .take_while(|m| m.is_some())
                .collect();
            let (tt, pos) = (&mut ctx.tt, &mut ctx.pos);
            tt.put_line(pos, &line, depth, ctx.best_score, flags);
        }

        if ctx.pv[0] != ctx.obvious_move {
            ctx.obvious_move = Move::NONE;
        }

        id_score = ctx.best_score;
        ctx.scores_by_iteration[depth as usize] = id_score;

        if !should_deepen(ctx) {
            ctx.current_depth += 1;
            break;
        }
        ctx.current_depth += 1;
        if ctx.current_depth > depth_limit {
            break;
        }
    }
    ctx.timer.stop();
    if ctx.status == EngineStatus::Pondering {
        wait_while_pondering(ctx);
    }

    ctx.current_depth -= 1;
    ctx.best_score = id_score;
    if ctx.options.verbose {
        print_search_stats(ctx);
    }

    let mut best = ctx.pv[0];
    if best.is_none() {
        // the first iteration was cut short; fall back to the best
        // shallow estimate
        best = ctx
            .root_moves
            .iter()
            .max_by_key(|rm| rm.qsearch_score)
            .map_or(Move::NONE, |rm| rm.mv);
    }
    let ponder_move = ctx.pv[1];
    println!(
        "{}",
        UciMessage::BestMove {
            m: best,
            ponder: if best.is_some() && ponder_move.is_some() {
                Some(ponder_move)
            } else {
                None
            }
        }
    );
    ctx.status = EngineStatus::Idle;
}

/// Build the root move list: every legal move, seeded with a depth-0
/// quiescence score for initial ordering and obvious-move detection.
fn init_root_moves(ctx: &mut SearchContext) {
    let legal = movegen::legal_moves(&ctx.pos);
    seed_root_moves(ctx, &legal);
}

/// Install an explicit root move list (the UCI `searchmoves` restriction).
/// Illegal moves are dropped; each survivor gets its quiescence seed
/// score.
pub fn seed_root_moves(ctx: &mut SearchContext, moves: &[Move]) {
    ctx.root_moves.clear();
    for &m in moves {
        if !movegen::is_move_legal(&ctx.pos, m) {
            continue;
        }
        let undo = ctx.pos.make_move(m);
        let qsearch_score = -quiesce(ctx, 1, Eval::MIN, Eval::MAX, 0);
        ctx.pos.undo_move(m, &undo);
        ctx.root_moves.push(RootMove {
            mv: m,
            score: Eval::MIN,
            qsearch_score,
            nodes: 0,
            pv: vec![m],
            max_depth: 0,
        });
    }
}

/// Look for a root move ahead of all rivals by at least the obvious-move
/// margin. If one exists and keeps leading the iterations, the driver may
/// stop early and just play it.
fn find_obvious_move(ctx: &mut SearchContext) {
    let mut best_score = Eval::MIN;
    for rm in &ctx.root_moves {
        if rm.qsearch_score > best_score {
            best_score = rm.qsearch_score;
            ctx.obvious_move = rm.mv;
        }
    }
    for rm in &ctx.root_moves {
        if rm.mv == ctx.obvious_move {
            continue;
        }
        if rm.qsearch_score + OBVIOUS_MOVE_MARGIN > best_score {
            if ctx.options.verbose && ctx.status != EngineStatus::Pondering {
                println!("info string no obvious move");
            }
            ctx.obvious_move = Move::NONE;
            return;
        }
    }
    if ctx.options.verbose && ctx.status != EngineStatus::Pondering {
        println!(
            "info string candidate obvious move {}",
            ctx.obvious_move.to_uci()
        );
    }
}

/// One pass over the root moves with the given window.
fn root_search(ctx: &mut SearchContext, mut alpha: Eval, beta: Eval) -> RootResult {
    let orig_alpha = alpha;
    ctx.best_score = alpha;
    let depth = ctx.current_depth;
    let hash_move = ctx
        .tt
        .get(ctx.pos.hash, 0)
        .map_or(Move::NONE, |e| e.best_move);

    // root ordering: the hash move leads; shallow iterations use the
    // quiescence estimates, multi-PV uses the previous scores, and
    // otherwise the last iteration's subtree sizes decide
    let scored: Vec<(Move, i64)> = ctx
        .root_moves
        .iter()
        .map(|rm| {
            let score = if rm.mv == hash_move {
                i64::MAX
            } else if depth <= 2 {
                i64::from(rm.qsearch_score.cp())
            } else if ctx.options.multi_pv > 1 {
                i64::from(rm.score.cp())
            } else {
                rm.nodes as i64
            };
            (rm.mv, score)
        })
        .collect();
    let mut selector = MoveSelector::new_root(scored);

    ctx.current_move_index = 0;
    ctx.resolving_fail_high = false;
    let mut index = 0usize;
    while let Some(m) = selector.next(&ctx.pos, &ctx.history, &mut ctx.pv_cache) {
        ctx.current_move_index = index;
        ctx.current_root_move = ctx.root_moves.iter().position(|rm| rm.mv == m);
        if alpha >= beta {
            // already failing high; mark the rest unresolved and move on
            if let Some(i) = ctx.current_root_move {
                ctx.root_moves[i].score = Eval::MIN;
            }
            index += 1;
            continue;
        }
        if ctx.should_output() {
            println!(
                "{}",
                UciMessage::Info(&[
                    EngineInfo::CurrMove(m),
                    EngineInfo::CurrMoveNumber(index + 1),
                ])
            );
        }
        let nodes_before = ctx.stats.nodes;
        let undo = ctx.pos.make_move(m);
        let ext = extend_root(&ctx.pos, m);
        let mut score;
        if index < ctx.options.multi_pv {
            // resolve the first moves with a full window
            alpha = Eval::MIN;
            score = -search(ctx, 1, -beta, -alpha, depth + ext - 1);
        } else {
            let try_lmr = LMR_ENABLED
                && index > ROOT_LMR_EARLY_MOVES
                && ext == 0
                && depth > LMR_DEPTH_LIMIT
                && !movegen::is_check(&ctx.pos);
            let lmr_reduction = if try_lmr { selector.lmr_reduction(m) } else { 0 };
            if lmr_reduction > 0 {
                score = -search(ctx, 1, -alpha - 1, -alpha, depth - lmr_reduction - 1);
            } else {
                score = -search(ctx, 1, -alpha - 1, -alpha, depth + ext - 1);
            }
            if score > alpha {
                if ctx.options.verbose && ctx.should_output() {
                    println!("info string fail high, research {}", m.to_uci());
                }
                ctx.resolving_fail_high = true;
                score = -search(ctx, 1, -beta, -alpha, depth + ext - 1);
            }
        }
        if score <= alpha {
            // unresolved under this window; sort it to the back next time
            score = Eval::MIN;
        } else if index >= ctx.options.multi_pv {
            ctx.root_indecisiveness += 1;
        }
        store_root_data(ctx, m, score, nodes_before);
        ctx.pos.undo_move(m, &undo);
        if ctx.status == EngineStatus::Aborted {
            return RootResult::Aborted;
        }
        if score > alpha {
            alpha = score;
            if score > ctx.best_score {
                ctx.best_score = score;
            }
            update_root_pv(ctx, m);
            print_multipv(ctx);
        }
        ctx.resolving_fail_high = false;
        index += 1;
    }

    if alpha == orig_alpha {
        if ctx.options.verbose && ctx.should_output() {
            println!(
                "info string root search failed low, window was ({}, {})",
                orig_alpha.cp(),
                beta.cp()
            );
        }
        ctx.stats.root_fail_lows += 1;
        RootResult::FailLow
    } else if alpha >= beta {
        if ctx.options.verbose && ctx.should_output() {
            println!(
                "info string root search failed high, window was ({}, {})",
                orig_alpha.cp(),
                beta.cp()
            );
        }
        ctx.stats.root_fail_highs += 1;
        RootResult::FailHigh
    } else {
        RootResult::Exact
    }
}

/// Record a searched root move: its score, subtree size, and line.
fn store_root_data(ctx: &mut SearchContext, m: Move, score: Eval, nodes_before: u64) {
    let nodes = ctx.stats.nodes - nodes_before;
    let line: Vec<Move> = std::iter::once(m)
        .chain(
            ctx.stack[1].pv[1..]
                .iter()
                .copied()
                .take_while(|mv| mv.is_some()),
        )
        .collect();
    if let Some(i) = ctx.root_moves.iter().position(|rm| rm.mv == m) {
        let rm = &mut ctx.root_moves[i];
        rm.nodes = nodes;
        rm.score = score;
        rm.pv = line;
    }
}

/// Decide whether to start another iteration, granting bonus time when
/// the root looks unstable or the score is dropping.
fn should_deepen(ctx: &mut SearchContext) -> bool {
    if should_stop_searching(ctx) {
        return false;
    }
    if ctx.limits.infinite || ctx.status == EngineStatus::Pondering {
        return true;
    }
    let so_far = ctx.timer.elapsed_ms();

    // allocate more search time when the root position is unclear
    if ctx.current_depth < 6 {
        ctx.limits.time_bonus = 0;
    } else {
        ctx.limits.time_bonus = ctx
            .limits
            .time_bonus
            .max(ctx.limits.time_target * ctx.root_indecisiveness.max(0) as u64 / 2);
    }
    let real_target = ctx.limits.time_target + ctx.limits.time_bonus;

    // if we're much more than halfway through our time, we won't make it
    // through the first move of the next iteration anyway
    if ctx.limits.time_target != 0
        && (real_target as i64 - so_far as i64) < (real_target * 60 / 100) as i64
    {
        return false;
    }

    // quit once the mate score has been stable for three iterations
    let depth = ctx.current_depth as usize;
    if depth >= 4
        && ctx.scores_by_iteration[depth].is_mate()
        && ctx.scores_by_iteration[depth - 1].is_mate()
        && ctx.scores_by_iteration[depth - 2].is_mate()
    {
        return false;
    }

    if ctx.limits.depth_limit == 0
        && ctx.limits.node_limit == 0
        && OBVIOUS_MOVE_ENABLED
        && ctx.current_depth >= 6
        && ctx.obvious_move.is_some()
    {
        return false;
    }

    if (ctx.limits.time_target != 0 && so_far < real_target / 3) || ctx.current_depth < 5 {
        return true;
    }
    let it_score = ctx.scores_by_iteration[depth].cp();
    let last_it_score = ctx.scores_by_iteration[depth - 1].cp();
    if it_score >= last_it_score {
        return true;
    }
    ctx.limits.time_bonus = if it_score >= last_it_score - 25 {
        ctx.limits.time_bonus.max(ctx.limits.time_target)
    } else if it_score >= last_it_score - 50 {
        ctx.limits.time_bonus.max(ctx.limits.time_target * 3)
    } else {
        ctx.limits.time_bonus.max(ctx.limits.time_target * 7)
    };
    true
}

/// Report the resolved principal variations, best first.
fn print_multipv(ctx: &SearchContext) {
    if !ctx.should_output() {
        return;
    }
    let mut order: Vec<usize> = (0..ctx.root_moves.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(ctx.root_moves[i].score));
    let elapsed = ctx.timer.elapsed_ms();
    for (rank, &i) in order.iter().take(ctx.options.multi_pv).enumerate() {
        let rm = &ctx.root_moves[i];
        if rm.score == Eval::MIN {
            continue;
        }
        let mut info = vec![
            EngineInfo::Depth(ctx.current_depth),
            EngineInfo::SelDepth(rm.max_depth),
        ];
        if ctx.options.multi_pv > 1 {
            info.push(EngineInfo::MultiPv(rank + 1));
        }
        info.push(EngineInfo::Score(rm.score));
        info.push(EngineInfo::Nodes(ctx.stats.nodes));
        info.push(EngineInfo::Time(elapsed));
        info.push(EngineInfo::Pv(&rm.pv));
        println!("{}", UciMessage::Info(&info));
    }
}

/// Dump cache and search statistics as `info string` lines.
fn print_search_stats(ctx: &SearchContext) {
    let s = &ctx.stats;
    println!(
        "info string nodes {} qnodes {} pvnodes {} tt-cutoffs {} null-cutoffs {} razor {}/{}",
        s.nodes, s.qnodes, s.pvnodes, s.transposition_cutoffs, s.nullmove_cutoffs, s.razor_prunes,
        s.razor_attempts
    );
    println!(
        "info string time target {} limit {} elapsed {}",
        ctx.limits.time_target,
        ctx.limits.time_limit,
        ctx.timer.elapsed_ms()
    );
    println!(
        "info string transposition entries {} hashfull {} hits {} misses {}",
        ctx.tt.len(),
        ctx.tt.hashfull(),
        ctx.tt.stats.hits,
        ctx.tt.stats.misses
    );
    let p = &ctx.pawn_table.stats;
    println!(
        "info string pawn hash entries {} hits {} misses {} evictions {}",
        ctx.pawn_table.len(),
        p.hits,
        p.misses,
        p.evictions
    );
    let c = &ctx.pv_cache.stats;
    println!(
        "info string pv cache entries {} filled {} evictions {} hits {} misses {}",
        ctx.pv_cache.len(),
        c.occupied,
        c.evictions,
        c.hits,
        c.misses
    );
}

/// After a completed ponder search, hold until the front-end releases us
/// with `ponderhit` or `stop`.
fn wait_while_pondering(ctx: &mut SearchContext) {
    loop {
        let line = match ctx.input.as_ref().map(|rx| rx.recv()) {
            Some(Ok(line)) => line,
            _ => return,
        };
        match line.trim() {
            "stop" | "ponderhit" => return,
            "quit" => {
                ctx.quit = true;
                return;
            }
            "isready" => println!("{}", UciMessage::ReadyOk),
            _ => ctx.pending.push(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Board;
    use crate::engine::config::EngineOptions;

    /// Run a fixed-depth search on a FEN and return the context.
    fn run_to_depth(fen: &str, depth: i32) -> SearchContext {
        let mut ctx = SearchContext::new(EngineOptions {
            hash_bytes: 1 << 21,
            output_delay_ms: 60_000,
            ..EngineOptions::default()
        });
        ctx.pos = Board::from_fen(fen).unwrap();
        ctx.limits.depth_limit = depth;
        deepening_search(&mut ctx, false);
        ctx
    }

    #[test]
    /// A depth-1 search of the start position returns a sane score and a
    /// legal best move.
    fn startpos_depth_one() {
        let ctx = run_to_depth("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 1);
        assert!(ctx.pv[0].is_some());
        assert!(ctx.best_score.cp().abs() <= 50);
        let legal = movegen::legal_moves(&Board::new());
        assert_eq!(legal.len(), 20);
        assert!(legal.contains(&ctx.pv[0]));
    }

    #[test]
    /// King and rook force mate quickly; the score must be at worst mate
    /// in five plies.
    fn king_rook_mate() {
        let ctx = run_to_depth("k7/8/1K6/8/8/8/8/R7 w - - 0 1", 6);
        assert!(ctx.best_score.is_mating_score());
        assert!(ctx.best_score >= Eval::mate_in(5));
        assert!(ctx.pv[0].is_some());
    }

    #[test]
    /// King and pawn against king is winning, and the engine starts with
    /// one of the winning first moves.
    fn king_pawn_endgame() {
        let ctx = run_to_depth("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1", 14);
        assert!(ctx.best_score > Eval::DRAW);
        let first = ctx.pv[0].to_uci();
        assert!(
            ["e2e4", "e2e3", "e1d2", "e1f2", "e1e2"].contains(&first.as_str()),
            "unexpected first move {first}"
        );
    }

    #[test]
    /// A stalemated opponent produces no move at all.
    fn stalemate_reports_no_move() {
        let ctx = run_to_depth("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 6);
        assert!(ctx.root_moves.is_empty());
        assert!(ctx.pv[0].is_none());
    }

    #[test]
    /// Mate in one is scored exactly and reported as the principal
    /// variation.
    fn mate_in_one_exact() {
        let ctx = run_to_depth("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 2);
        assert_eq!(ctx.best_score, Eval::mate_in(1));
        assert_eq!(ctx.pv[0].to_uci(), "a1a8");
    }

    #[test]
    /// Two identical searches from cleared caches agree exactly.
    fn deterministic_replay() {
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/8/PPPP1PPP/RNBQK1NR w KQkq - 2 3";
        let a = run_to_depth(fen, 4);
        let b = run_to_depth(fen, 4);
        assert_eq!(a.best_score, b.best_score);
        assert_eq!(a.pv, b.pv);
    }

    #[test]
    /// The previous iteration's subtree sizes order the next root pass.
    fn root_move_nodes_recorded() {
        let ctx = run_to_depth(
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/8/PPPP1PPP/RNBQK1NR w KQkq - 2 3",
            4,
        );
        assert!(ctx.root_moves.iter().any(|rm| rm.nodes > 0));
        // every root move carries its own pv head
        for rm in &ctx.root_moves {
            assert_eq!(rm.pv[0], rm.mv);
        }
    }
}
