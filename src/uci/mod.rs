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

//! The UCI front-end loop.
//!
//! A dedicated thread reads stdin and forwards complete lines over a
//! channel. When the engine is idle, the loop blocks on that channel; when
//! a search is running, the search itself polls the same channel from
//! `open_node`, handling `stop`/`quit`/`ponderhit`/`isready` in place and
//! queueing everything else for this loop to replay afterwards.

pub mod parse;
pub mod send;

use crate::base::{movegen, Board, Color, Move};
use crate::engine::{
    config::EngineOptions,
    deepen::{deepening_search, seed_root_moves},
    limit::SearchLimits,
    search::SearchContext,
};

use parse::{GoOptions, UciCommand};
use send::{OptionType, UciMessage};

use std::{
    io::BufRead,
    sync::mpsc::{channel, Receiver},
    thread,
};

/// The engine name reported to the GUI.
const NAME: &str = concat!("Osprey ", env!("CARGO_PKG_VERSION"));
/// The author line reported to the GUI.
const AUTHOR: &str = "the Osprey authors";

/// Run the UCI loop until `quit` or end of input.
pub fn run() {
    let (tx, rx) = channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    });

    let mut ctx = SearchContext::new(EngineOptions::default());
    ctx.input = Some(rx);

    loop {
        let Some(line) = next_line(&mut ctx) else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse::parse_line(&line) {
            Ok(command) => {
                if !handle_command(&mut ctx, command) {
                    break;
                }
            }
            Err(reason) => println!("info string {reason}"),
        }
        if ctx.quit {
            break;
        }
    }
}

/// Get the next command line: first anything queued during the last
/// search, then fresh input. `None` when stdin has closed.
fn next_line(ctx: &mut SearchContext) -> Option<String> {
    if !ctx.pending.is_empty() {
        return Some(ctx.pending.remove(0));
    }
    let rx: &Receiver<String> = ctx.input.as_ref()?;
    rx.recv().ok()
}

/// Execute one command. Returns false when the engine should exit.
fn handle_command(ctx: &mut SearchContext, command: UciCommand) -> bool {
    match command {
        UciCommand::Uci => {
            println!(
                "{}",
                UciMessage::Id {
                    name: Some(NAME),
                    author: Some(AUTHOR),
                }
            );
            print_options(&ctx.options);
            println!("{}", UciMessage::UciOk);
        }
        UciCommand::Debug(on) => ctx.options.verbose = on,
        UciCommand::IsReady => println!("{}", UciMessage::ReadyOk),
        UciCommand::SetOption { name, value } => set_option(ctx, &name, value.as_deref()),
        UciCommand::NewGame => ctx.new_game(),
        UciCommand::Position { fen, moves } => setup_position(ctx, fen.as_deref(), &moves),
        UciCommand::Go(opts) => go(ctx, &opts),
        // not searching: nothing to stop or convert
        UciCommand::Stop | UciCommand::PonderHit => {}
        UciCommand::Quit => return false,
    }
    true
}

/// Describe the recognized options to the GUI.
fn print_options(options: &EngineOptions) {
    let table: [(&str, OptionType); 6] = [
        (
            "Hash",
            OptionType::Spin {
                default: (EngineOptions::DEFAULT_HASH_BYTES / (1024 * 1024)) as i64,
                min: 1,
                max: 4096,
            },
        ),
        (
            "MultiPV",
            OptionType::Spin {
                default: 1,
                min: 1,
                max: 64,
            },
        ),
        ("UseBook", OptionType::Check(options.use_book)),
        ("UseEGBB", OptionType::Check(options.use_egbb)),
        ("Verbose", OptionType::Check(options.verbose)),
        (
            "OutputDelay",
            OptionType::Spin {
                default: 0,
                min: 0,
                max: 60_000,
            },
        ),
    ];
    for (name, opt) in table {
        println!("{}", UciMessage::Option { name, opt });
    }
}

/// Apply a `setoption`. Names are matched case-insensitively, ignoring
/// spaces and underscores, so `multi_pv` and `MultiPV` both work.
fn set_option(ctx: &mut SearchContext, name: &str, value: Option<&str>) {
    let key: String = name
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();
    let truthy = matches!(value, Some("true") | Some("on") | Some("1"));
    match key.as_str() {
        "hash" => {
            if let Some(mb) = value.and_then(|v| v.parse::<usize>().ok()) {
                ctx.options.hash_bytes = mb.max(1) * 1024 * 1024;
                ctx.tt.resize(ctx.options.hash_bytes);
            }
        }
        "multipv" => {
            if let Some(k) = value.and_then(|v| v.parse::<usize>().ok()) {
                ctx.options.multi_pv = k.max(1);
            }
        }
        "usebook" => ctx.options.use_book = truthy,
        "useegbb" => ctx.options.use_egbb = truthy,
        "verbose" => ctx.options.verbose = truthy,
        "outputdelay" => {
            if let Some(ms) = value.and_then(|v| v.parse::<u64>().ok()) {
                ctx.options.output_delay_ms = ms;
            }
        }
        _ => println!("info string unrecognized option `{name}`"),
    }
}

/// Install a position and play out its move list.
fn setup_position(ctx: &mut SearchContext, fen: Option<&str>, moves: &[String]) {
    let board = match fen {
        None => Ok(Board::new()),
        Some(fen) => Board::from_fen(fen),
    };
    match board {
        Ok(board) => ctx.pos = board,
        Err(reason) => {
            println!("info string invalid position: {reason}");
            return;
        }
    }
    for coord in moves {
        let m = match Move::from_uci(coord, &ctx.pos) {
            Ok(m) if movegen::is_move_legal(&ctx.pos, m) => m,
            _ => {
                println!("info string illegal move `{coord}` in position command");
                return;
            }
        };
        ctx.pos.make_move(m);
    }
}

/// Configure limits from a `go` command and run the search.
fn go(ctx: &mut SearchContext, opts: &GoOptions) {
    let (time, increment) = match ctx.pos.player {
        Color::White => (opts.wtime, opts.winc),
        Color::Black => (opts.btime, opts.binc),
    };
    let mut limits = SearchLimits::from_clock(
        time.unwrap_or(0),
        increment.unwrap_or(0),
        opts.moves_to_go,
        opts.movetime,
    );
    limits.depth_limit = opts.depth.unwrap_or(0);
    limits.node_limit = opts.nodes.unwrap_or(0);
    limits.infinite = opts.infinite;
    ctx.limits = limits;

    ctx.root_moves.clear();
    if !opts.search_moves.is_empty() {
        let mut restricted = Vec::new();
        for coord in &opts.search_moves {
            if let Ok(m) = Move::from_uci(coord, &ctx.pos) {
                restricted.push(m);
            }
        }
        seed_root_moves(ctx, &restricted);
    }

    deepening_search(ctx, opts.ponder);
}
