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

//! Parsing of commands sent from the GUI to the engine.
//!
//! Moves are kept as coordinate strings here: a `position` line's moves
//! can only be interpreted against the evolving board, which belongs to
//! the engine loop.

#[derive(Clone, Debug, PartialEq, Eq)]
/// A parsed GUI-to-engine command.
pub enum UciCommand {
    Uci,
    Debug(bool),
    IsReady,
    SetOption {
        name: String,
        value: Option<String>,
    },
    NewGame,
    /// Set up a position from a FEN (or the start position when `None`)
    /// and a list of coordinate moves played from it.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    Go(GoOptions),
    Stop,
    PonderHit,
    Quit,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
/// The parameters of a `go` command.
pub struct GoOptions {
    /// Restrict the root to these coordinate moves.
    pub search_moves: Vec<String>,
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub moves_to_go: Option<u64>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    pub movetime: Option<u64>,
    pub infinite: bool,
    pub ponder: bool,
}

/// The result of parsing one line. Per the UCI protocol, errors should be
/// logged or ignored, never fatal.
pub type UciParseResult = Result<UciCommand, String>;

/// Parse a single line of GUI input.
pub fn parse_line(line: &str) -> UciParseResult {
    let mut tokens = line.split_ascii_whitespace();
    let first = tokens.next().ok_or("line contains no tokens")?;
    match first {
        "uci" => Ok(UciCommand::Uci),
        "debug" => match tokens.next() {
            Some("on") | None => Ok(UciCommand::Debug(true)),
            Some("off") => Ok(UciCommand::Debug(false)),
            _ => Err("unrecognized debug setting".into()),
        },
        "isready" => Ok(UciCommand::IsReady),
        "setoption" => parse_set_option(&mut tokens),
        "ucinewgame" => Ok(UciCommand::NewGame),
        "position" => parse_position(&mut tokens),
        "go" => parse_go(&mut tokens),
        "stop" => Ok(UciCommand::Stop),
        "ponderhit" => Ok(UciCommand::PonderHit),
        "quit" => Ok(UciCommand::Quit),
        _ => Err(format!("unrecognized UCI command `{first}`")),
    }
}

/// Parse a `setoption` line after its leading token. The name may span
/// several tokens, up to the `value` keyword.
fn parse_set_option(tokens: &mut dyn Iterator<Item = &str>) -> UciParseResult {
    let name_tok = tokens
        .next()
        .ok_or("reached end of line while looking for `name`")?;
    if name_tok != "name" {
        return Err(format!("expected token `name`, got `{name_tok}`"));
    }

    let mut name = String::new();
    loop {
        let tok = match tokens.next() {
            Some(tok) => tok,
            None => return Ok(UciCommand::SetOption { name, value: None }),
        };
        if tok == "value" {
            break;
        }
        if !name.is_empty() {
            name += " ";
        }
        name += tok;
    }

    let mut value = String::new();
    for tok in tokens {
        if !value.is_empty() {
            value += " ";
        }
        value += tok;
    }
    Ok(UciCommand::SetOption {
        name,
        value: Some(value),
    })
}

/// Parse a `position` line after its leading token.
fn parse_position(tokens: &mut dyn Iterator<Item = &str>) -> UciParseResult {
    let fen = match tokens.next().ok_or("reached end of line parsing position")? {
        "startpos" => None,
        "fen" => {
            let mut fen = String::new();
            loop {
                match tokens.next() {
                    None => {
                        return Ok(UciCommand::Position {
                            fen: Some(fen),
                            moves: Vec::new(),
                        })
                    }
                    Some("moves") => {
                        return Ok(UciCommand::Position {
                            fen: Some(fen),
                            moves: tokens.map(String::from).collect(),
                        })
                    }
                    Some(tok) => {
                        if !fen.is_empty() {
                            fen += " ";
                        }
                        fen += tok;
                    }
                }
            }
        }
        other => return Err(format!("expected `startpos` or `fen`, got `{other}`")),
    };

    match tokens.next() {
        None => Ok(UciCommand::Position {
            fen,
            moves: Vec::new(),
        }),
        Some("moves") => Ok(UciCommand::Position {
            fen,
            moves: tokens.map(String::from).collect(),
        }),
        Some(other) => Err(format!("expected `moves`, got `{other}`")),
    }
}

/// Parse a `go` line after its leading token.
fn parse_go(tokens: &mut dyn Iterator<Item = &str>) -> UciParseResult {
    let mut opts = GoOptions::default();
    let mut tokens = tokens.peekable();
    while let Some(tok) = tokens.next() {
        match tok {
            "searchmoves" => {
                while let Some(&candidate) = tokens.peek() {
                    // a coordinate move is 4 or 5 characters starting with
                    // a file letter; anything else ends the list
                    if candidate.len() >= 4
                        && candidate.len() <= 5
                        && candidate.starts_with(|c: char| ('a'..='h').contains(&c))
                    {
                        opts.search_moves.push(candidate.into());
                        tokens.next();
                    } else {
                        break;
                    }
                }
            }
            "wtime" => opts.wtime = Some(parse_number(tokens.next())?),
            "btime" => opts.btime = Some(parse_number(tokens.next())?),
            "winc" => opts.winc = Some(parse_number(tokens.next())?),
            "binc" => opts.binc = Some(parse_number(tokens.next())?),
            "movestogo" => opts.moves_to_go = Some(parse_number(tokens.next())?),
            "depth" => opts.depth = Some(parse_number(tokens.next())? as i32),
            "nodes" => opts.nodes = Some(parse_number(tokens.next())?),
            "movetime" => opts.movetime = Some(parse_number(tokens.next())?),
            "infinite" => opts.infinite = true,
            "ponder" => opts.ponder = true,
            "mate" => {
                // accepted for compatibility; treated as a depth request
                let full_moves = parse_number(tokens.next())?;
                opts.depth = Some((2 * full_moves) as i32);
            }
            _ => return Err(format!("unrecognized go option `{tok}`")),
        }
    }
    Ok(UciCommand::Go(opts))
}

fn parse_number(token: Option<&str>) -> Result<u64, String> {
    let tok = token.ok_or("expected a number, reached end of line")?;
    if let Ok(n) = tok.parse::<u64>() {
        return Ok(n);
    }
    // clocks can legitimately report negative times; clamp them to zero
    tok.parse::<i64>()
        .map(|_| 0)
        .map_err(|_| format!("expected a number, got `{tok}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Test parsing of simple keyword commands.
    fn simple_commands() {
        assert_eq!(parse_line("uci"), Ok(UciCommand::Uci));
        assert_eq!(parse_line("isready"), Ok(UciCommand::IsReady));
        assert_eq!(parse_line("ucinewgame"), Ok(UciCommand::NewGame));
        assert_eq!(parse_line("stop"), Ok(UciCommand::Stop));
        assert_eq!(parse_line("ponderhit"), Ok(UciCommand::PonderHit));
        assert_eq!(parse_line("quit"), Ok(UciCommand::Quit));
        assert!(parse_line("flarp").is_err());
        assert!(parse_line("   ").is_err());
    }

    #[test]
    /// Test parsing a multi-token option name and value.
    fn set_option() {
        assert_eq!(
            parse_line("setoption name Clear Hash"),
            Ok(UciCommand::SetOption {
                name: "Clear Hash".into(),
                value: None
            })
        );
        assert_eq!(
            parse_line("setoption name Hash value 128"),
            Ok(UciCommand::SetOption {
                name: "Hash".into(),
                value: Some("128".into())
            })
        );
    }

    #[test]
    /// Test parsing position commands.
    fn position_commands() {
        assert_eq!(
            parse_line("position startpos"),
            Ok(UciCommand::Position {
                fen: None,
                moves: Vec::new()
            })
        );
        assert_eq!(
            parse_line("position startpos moves e2e4 e7e5"),
            Ok(UciCommand::Position {
                fen: None,
                moves: vec!["e2e4".into(), "e7e5".into()]
            })
        );
        assert_eq!(
            parse_line("position fen 7k/5Q2/6K1/8/8/8/8/8 b - - 0 1"),
            Ok(UciCommand::Position {
                fen: Some("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1".into()),
                moves: Vec::new()
            })
        );
    }

    #[test]
    /// Test parsing a fully loaded go command.
    fn go_command() {
        let cmd = parse_line(
            "go wtime 300000 btime 295000 winc 2000 binc 2000 movestogo 40 depth 20",
        )
        .unwrap();
        let UciCommand::Go(opts) = cmd else {
            panic!("expected a go command");
        };
        assert_eq!(opts.wtime, Some(300_000));
        assert_eq!(opts.btime, Some(295_000));
        assert_eq!(opts.winc, Some(2_000));
        assert_eq!(opts.moves_to_go, Some(40));
        assert_eq!(opts.depth, Some(20));
        assert!(!opts.infinite);
    }

    #[test]
    /// Test parsing go with searchmoves and infinite.
    fn go_searchmoves() {
        let cmd = parse_line("go infinite searchmoves e2e4 d2d4").unwrap();
        let UciCommand::Go(opts) = cmd else {
            panic!("expected a go command");
        };
        assert!(opts.infinite);
        assert_eq!(opts.search_moves, vec!["e2e4".to_string(), "d2d4".to_string()]);
    }
}
