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

//! Messages sent from the engine to the GUI, rendered through `Display`.

use crate::base::Move;
use crate::engine::evaluate::Eval;

use std::fmt::{self, Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
/// The set of messages the engine can send to the GUI.
pub enum UciMessage<'a> {
    /// The engine identifies itself, after receiving `uci`.
    Id {
        name: Option<&'a str>,
        author: Option<&'a str>,
    },
    /// Sent after `Id` and the option list to complete the handshake.
    UciOk,
    /// The engine has processed all pending input.
    ReadyOk,
    /// Describe a configurable option to the GUI.
    Option { name: &'a str, opt: OptionType<'a> },
    /// The search has finished. `Move::NONE` renders as `0000`, which is
    /// what a mated or stalemated engine reports.
    BestMove { m: Move, ponder: Option<Move> },
    /// Progress information about the running search.
    Info(&'a [EngineInfo<'a>]),
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// One field of an `info` line.
pub enum EngineInfo<'a> {
    /// The iteration depth.
    Depth(i32),
    /// The deepest ply reached under the reported line.
    SelDepth(usize),
    /// Milliseconds searched so far.
    Time(u64),
    /// Nodes searched so far.
    Nodes(u64),
    /// Quiescence nodes searched so far (verbose only).
    QNodes(u64),
    /// Full-window nodes searched so far (verbose only).
    PvNodes(u64),
    /// Which numbered principal variation a score line belongs to.
    MultiPv(usize),
    /// The score of the reported line.
    Score(Eval),
    /// The root move currently being searched.
    CurrMove(Move),
    /// The 1-based ordinal of the current root move.
    CurrMoveNumber(usize),
    /// Transposition table fill rate, in permille.
    HashFull(u16),
    /// Nodes searched per second.
    NodeSpeed(u64),
    /// The principal variation itself.
    Pv(&'a [Move]),
    /// Free-form text; must not contain newlines.
    String(&'a str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The type of a UCI option.
pub enum OptionType<'a> {
    /// An integer in a range.
    Spin { default: i64, min: i64, max: i64 },
    /// Free text.
    String(Option<&'a str>),
    /// A boolean.
    Check(bool),
}

impl Display for UciMessage<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UciMessage::Id { name, author } => {
                if let Some(n) = name {
                    write!(f, "id name {n}")?;
                }
                if let Some(a) = author {
                    if name.is_some() {
                        writeln!(f)?;
                    }
                    write!(f, "id author {a}")?;
                }
                Ok(())
            }
            UciMessage::UciOk => write!(f, "uciok"),
            UciMessage::ReadyOk => write!(f, "readyok"),
            UciMessage::Option { name, opt } => {
                write!(f, "option name {name} ")?;
                match opt {
                    OptionType::Spin { default, min, max } => {
                        write!(f, "type spin default {default} min {min} max {max}")
                    }
                    OptionType::String(s) => {
                        write!(f, "type string")?;
                        if let Some(s) = s {
                            write!(f, " default {s}")?;
                        }
                        Ok(())
                    }
                    OptionType::Check(default) => {
                        write!(f, "type check default {default}")
                    }
                }
            }
            UciMessage::BestMove { m, ponder } => {
                write!(f, "bestmove {}", m.to_uci())?;
                if let Some(p) = ponder {
                    write!(f, " ponder {}", p.to_uci())?;
                }
                Ok(())
            }
            UciMessage::Info(fields) => {
                write!(f, "info")?;
                for field in *fields {
                    match field {
                        EngineInfo::Depth(d) => write!(f, " depth {d}")?,
                        EngineInfo::SelDepth(d) => write!(f, " seldepth {d}")?,
                        EngineInfo::Time(ms) => write!(f, " time {ms}")?,
                        EngineInfo::Nodes(n) => write!(f, " nodes {n}")?,
                        EngineInfo::QNodes(n) => write!(f, " qnodes {n}")?,
                        EngineInfo::PvNodes(n) => write!(f, " pvnodes {n}")?,
                        EngineInfo::MultiPv(k) => write!(f, " multipv {k}")?,
                        EngineInfo::Score(eval) => write!(f, " score {eval}")?,
                        EngineInfo::CurrMove(m) => write!(f, " currmove {}", m.to_uci())?,
                        EngineInfo::CurrMoveNumber(k) => write!(f, " currmovenumber {k}")?,
                        EngineInfo::HashFull(permille) => write!(f, " hashfull {permille}")?,
                        EngineInfo::NodeSpeed(nps) => write!(f, " nps {nps}")?,
                        EngineInfo::Pv(line) => {
                            write!(f, " pv")?;
                            for m in *line {
                                write!(f, " {}", m.to_uci())?;
                            }
                        }
                        EngineInfo::String(s) => write!(f, " string {s}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Board, Piece, Square};

    #[test]
    /// Test a composed info line.
    fn info_line_composed() {
        let line = [
            Move::quiet(Square::E2, Square::E4, Piece::Pawn),
            Move::quiet(Square::E7, Square::E5, Piece::Pawn),
        ];
        let info = [
            EngineInfo::Depth(7),
            EngineInfo::SelDepth(12),
            EngineInfo::Score(Eval::centipawns(33)),
            EngineInfo::Nodes(40_123),
            EngineInfo::Time(850),
            EngineInfo::Pv(&line),
        ];
        assert_eq!(
            format!("{}", UciMessage::Info(&info)),
            "info depth 7 seldepth 12 score cp 33 nodes 40123 time 850 pv e2e4 e7e5"
        );
    }

    #[test]
    /// Test that mate scores render in the `mate` form.
    fn info_mate_score() {
        let info = [EngineInfo::Score(Eval::mate_in(3))];
        assert_eq!(
            format!("{}", UciMessage::Info(&info)),
            "info score mate 2"
        );
    }

    #[test]
    /// Test the progress line fields used by the periodic report.
    fn info_progress_line() {
        let info = [
            EngineInfo::Time(2000),
            EngineInfo::Nodes(1_000_000),
            EngineInfo::NodeSpeed(500_000),
            EngineInfo::HashFull(372),
        ];
        assert_eq!(
            format!("{}", UciMessage::Info(&info)),
            "info time 2000 nodes 1000000 nps 500000 hashfull 372"
        );
    }

    #[test]
    /// Test best-move rendering with and without a ponder move.
    fn bestmove_rendering() {
        let b = Board::new();
        let m = Move::from_uci("e2e4", &b).unwrap();
        assert_eq!(
            format!("{}", UciMessage::BestMove { m, ponder: None }),
            "bestmove e2e4"
        );
        let mut after = b.clone();
        after.make_move(m);
        let reply = Move::from_uci("e7e5", &after).unwrap();
        assert_eq!(
            format!(
                "{}",
                UciMessage::BestMove {
                    m,
                    ponder: Some(reply)
                }
            ),
            "bestmove e2e4 ponder e7e5"
        );
        assert_eq!(
            format!(
                "{}",
                UciMessage::BestMove {
                    m: Move::NONE,
                    ponder: None
                }
            ),
            "bestmove 0000"
        );
    }

    #[test]
    /// Test option rendering.
    fn option_rendering() {
        assert_eq!(
            format!(
                "{}",
                UciMessage::Option {
                    name: "Hash",
                    opt: OptionType::Spin {
                        default: 32,
                        min: 1,
                        max: 1024
                    }
                }
            ),
            "option name Hash type spin default 32 min 1 max 1024"
        );
        assert_eq!(
            format!(
                "{}",
                UciMessage::Option {
                    name: "Verbose",
                    opt: OptionType::Check(false)
                }
            ),
            "option name Verbose type check default false"
        );
    }
}
