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

//! The board: piece placement, game state, and incremental make/undo.
//!
//! Every `make_move` returns an `Undo` token; pairing it with `undo_move`
//! restores the position exactly, including both Zobrist hashes, the
//! 50-move counter, and the piece counts. The search relies on this
//! round-trip on every exit path.

use nohash_hasher::IntMap;

use super::{zobrist, Bitboard, CastleRights, Color, Move, Piece, Square};

use std::{
    fmt::{Display, Formatter},
    ops::Index,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// A chess position, along with the repetition history needed to adjudicate
/// draws.
pub struct Board {
    /// The squares occupied by White and Black pieces, respectively.
    sides: [Bitboard; 2],
    /// The squares occupied by each piece type, in `Piece` order.
    pieces: [Bitboard; Piece::NUM_TYPES],
    /// The color of the player to move.
    pub player: Color,
    /// The square a pawn may capture onto en passant, if any.
    pub en_passant_square: Option<Square>,
    /// The castling rights of both players.
    pub castle_rights: CastleRights,
    /// Plies since the last capture or pawn move.
    pub fifty: u8,
    /// The Zobrist hash of the full position.
    pub hash: u64,
    /// The Zobrist hash of the pawns alone, keying the pawn table.
    pub pawn_hash: u64,
    /// The squares of the white and black kings.
    pub king_sqs: [Square; 2],
    /// Non-pawn piece counts (including the king) per side.
    pub num_pieces: [u8; 2],
    /// Pawn counts per side.
    pub num_pawns: [u8; 2],
    /// The move which produced this position. `Move::NULL` after a null
    /// move, `Move::NONE` at a freshly set up position.
    pub prev_move: Move,
    /// Occurrence counts of position hashes along the path to this
    /// position, for repetition detection.
    repetitions: IntMap<u64, u8>,
}

#[derive(Clone, Debug)]
/// The irreversible state saved by `make_move`, consumed by `undo_move`.
pub struct Undo {
    en_passant_square: Option<Square>,
    castle_rights: CastleRights,
    fifty: u8,
    hash: u64,
    pawn_hash: u64,
    prev_move: Move,
}

impl Board {
    #[must_use]
    /// Construct a board in the conventional starting position.
    pub fn new() -> Board {
        Board::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
            .expect("start position FEN is valid")
    }

    /// Construct a board from a FEN string. The halfmove clock and fullmove
    /// number fields are optional.
    ///
    /// # Errors
    ///
    /// Returns an `Err` describing the problem if the FEN is malformed or
    /// describes a position without exactly one king per side.
    pub fn from_fen(fen: &str) -> Result<Board, String> {
        let mut board = Board {
            sides: [Bitboard::EMPTY; 2],
            pieces: [Bitboard::EMPTY; Piece::NUM_TYPES],
            player: Color::White,
            en_passant_square: None,
            castle_rights: CastleRights::NO_RIGHTS,
            fifty: 0,
            hash: 0,
            pawn_hash: 0,
            king_sqs: [Square::A1; 2],
            num_pieces: [0; 2],
            num_pawns: [0; 2],
            prev_move: Move::NONE,
            repetitions: IntMap::default(),
        };

        let mut fields = fen.split_ascii_whitespace();
        let placement = fields.next().ok_or("empty FEN")?;
        let mut rank = 7usize;
        let mut file = 0usize;
        for chr in placement.chars() {
            match chr {
                '/' => {
                    if file != 8 || rank == 0 {
                        return Err("malformed FEN board array".into());
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => file += chr as usize - '0' as usize,
                _ => {
                    let piece = Piece::from_code(chr.to_ascii_uppercase())
                        .ok_or_else(|| format!("unrecognized piece character `{chr}`"))?;
                    let color = if chr.is_uppercase() {
                        Color::White
                    } else {
                        Color::Black
                    };
                    let sq = Square::new(rank, file).ok_or("FEN rank overflows the board")?;
                    board.add_piece(sq, piece, color);
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err("FEN board array ended early".into());
        }

        board.player = match fields.next().ok_or("missing player-to-move field")? {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err("unrecognized player to move".into()),
        };
        if board.player == Color::Black {
            board.hash ^= zobrist::black_to_move_key();
        }

        let castles = fields.next().ok_or("missing castle rights field")?;
        if castles != "-" {
            for chr in castles.chars() {
                board.castle_rights |= match chr {
                    'K' => CastleRights::king_castle(Color::White),
                    'Q' => CastleRights::queen_castle(Color::White),
                    'k' => CastleRights::king_castle(Color::Black),
                    'q' => CastleRights::queen_castle(Color::Black),
                    _ => return Err("unrecognized castle rights character".into()),
                };
            }
        }
        for bit in 0..4 {
            if board.castle_rights.0 & 1 << bit != 0 {
                board.hash ^= zobrist::castle_key(bit);
            }
        }

        let ep = fields.next().ok_or("missing en passant field")?;
        if ep != "-" {
            board.en_passant_square = Some(Square::from_algebraic(ep)?);
            board.hash ^= zobrist::ep_key(board.en_passant_square);
        }

        if let Some(halfmove) = fields.next() {
            board.fifty = halfmove
                .parse()
                .map_err(|_| "malformed halfmove clock".to_string())?;
        }

        for color in [Color::White, Color::Black] {
            let king_bb = board[Piece::King] & board[color];
            if !king_bb.has_single_bit() {
                return Err("position must have exactly one king per side".into());
            }
            board.king_sqs[color as usize] = king_bb.first_square();
        }

        board.repetitions.insert(board.hash, 1);
        Ok(board)
    }

    #[inline(always)]
    #[must_use]
    /// Get the set of all occupied squares.
    pub fn occupancy(&self) -> Bitboard {
        self[Color::White] | self[Color::Black]
    }

    #[inline(always)]
    #[must_use]
    /// Get the squares occupied by pieces of one type and color.
    pub fn pieces_of(&self, piece: Piece, color: Color) -> Bitboard {
        self[piece] & self[color]
    }

    #[must_use]
    /// Get the type of the piece occupying a square, if any.
    pub fn type_at_square(&self, sq: Square) -> Option<Piece> {
        for pt in Piece::ALL_TYPES {
            if self[pt].contains(sq) {
                return Some(pt);
            }
        }
        None
    }

    #[must_use]
    /// Get the color of the piece occupying a square, if any.
    pub fn color_at_square(&self, sq: Square) -> Option<Color> {
        if self[Color::White].contains(sq) {
            Some(Color::White)
        } else if self[Color::Black].contains(sq) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Apply a move to the board. The move must be legal. Returns the token
    /// which `undo_move` consumes to restore the previous position.
    pub fn make_move(&mut self, m: Move) -> Undo {
        let undo = Undo {
            en_passant_square: self.en_passant_square,
            castle_rights: self.castle_rights,
            fifty: self.fifty,
            hash: self.hash,
            pawn_hash: self.pawn_hash,
            prev_move: self.prev_move,
        };

        let player = self.player;
        let opponent = !player;
        let from = m.from_square();
        let to = m.to_square();

        if m.is_en_passant() {
            let captured_sq = Square::new(from.rank(), to.file()).unwrap();
            self.remove_piece(captured_sq, Piece::Pawn, opponent);
        } else if let Some(victim) = m.capture() {
            self.remove_piece(to, victim, opponent);
        }

        self.remove_piece(from, m.piece(), player);
        match m.promote() {
            Some(p) => self.add_piece(to, p, player),
            None => self.add_piece(to, m.piece(), player),
        }

        if m.is_castle() {
            let kingside = to.file() == 6;
            let rook_from = Square::new(from.rank(), if kingside { 7 } else { 0 }).unwrap();
            let rook_to = Square::new(from.rank(), if kingside { 5 } else { 3 }).unwrap();
            self.remove_piece(rook_from, Piece::Rook, player);
            self.add_piece(rook_to, Piece::Rook, player);
        }

        let mut rights_to_remove = if m.piece() == Piece::King {
            CastleRights::color_rights(player)
        } else {
            CastleRights::NO_RIGHTS
        };
        rights_to_remove |= rook_home_rights(from) | rook_home_rights(to);
        self.remove_castle_rights(rights_to_remove);

        self.hash ^= zobrist::ep_key(self.en_passant_square);
        self.en_passant_square =
            if m.piece() == Piece::Pawn && from.file() == to.file() && from.chebyshev_to(to) == 2 {
                Square::new((from.rank() + to.rank()) / 2, from.file())
            } else {
                None
            };
        self.hash ^= zobrist::ep_key(self.en_passant_square);

        self.fifty = if m.piece() == Piece::Pawn || m.is_capture() {
            0
        } else {
            self.fifty + 1
        };

        self.player = opponent;
        self.hash ^= zobrist::black_to_move_key();

        if m.piece() == Piece::King {
            self.king_sqs[player as usize] = to;
        }
        self.prev_move = m;

        *self.repetitions.entry(self.hash).or_insert(0) += 1;
        undo
    }

    /// Undo a move previously applied with `make_move`, restoring the
    /// position exactly.
    pub fn undo_move(&mut self, m: Move, undo: &Undo) {
        if let Some(n) = self.repetitions.get_mut(&self.hash) {
            *n -= 1;
            if *n == 0 {
                self.repetitions.remove(&self.hash);
            }
        }

        let mover = !self.player;
        let victim_color = self.player;
        let from = m.from_square();
        let to = m.to_square();

        if m.is_castle() {
            let kingside = to.file() == 6;
            let rook_from = Square::new(from.rank(), if kingside { 7 } else { 0 }).unwrap();
            let rook_to = Square::new(from.rank(), if kingside { 5 } else { 3 }).unwrap();
            self.remove_piece(rook_to, Piece::Rook, mover);
            self.add_piece(rook_from, Piece::Rook, mover);
        }

        match m.promote() {
            Some(p) => self.remove_piece(to, p, mover),
            None => self.remove_piece(to, m.piece(), mover),
        }
        self.add_piece(from, m.piece(), mover);

        if m.is_en_passant() {
            let captured_sq = Square::new(from.rank(), to.file()).unwrap();
            self.add_piece(captured_sq, Piece::Pawn, victim_color);
        } else if let Some(victim) = m.capture() {
            self.add_piece(to, victim, victim_color);
        }

        if m.piece() == Piece::King {
            self.king_sqs[mover as usize] = from;
        }
        self.player = mover;

        self.en_passant_square = undo.en_passant_square;
        self.castle_rights = undo.castle_rights;
        self.fifty = undo.fifty;
        self.hash = undo.hash;
        self.pawn_hash = undo.pawn_hash;
        self.prev_move = undo.prev_move;
    }

    /// Pass the move to the opponent. The resulting position has
    /// `prev_move == Move::NULL`, which the search uses to forbid
    /// consecutive null moves. Null moves do not enter the repetition
    /// history.
    pub fn make_null_move(&mut self) -> Undo {
        let undo = Undo {
            en_passant_square: self.en_passant_square,
            castle_rights: self.castle_rights,
            fifty: self.fifty,
            hash: self.hash,
            pawn_hash: self.pawn_hash,
            prev_move: self.prev_move,
        };
        self.hash ^= zobrist::ep_key(self.en_passant_square);
        self.en_passant_square = None;
        self.player = !self.player;
        self.hash ^= zobrist::black_to_move_key();
        self.fifty += 1;
        self.prev_move = Move::NULL;
        undo
    }

    /// Undo a null move previously applied with `make_null_move`.
    pub fn undo_null_move(&mut self, undo: &Undo) {
        self.player = !self.player;
        self.en_passant_square = undo.en_passant_square;
        self.castle_rights = undo.castle_rights;
        self.fifty = undo.fifty;
        self.hash = undo.hash;
        self.pawn_hash = undo.pawn_hash;
        self.prev_move = undo.prev_move;
    }

    #[must_use]
    /// Is this position drawn by rule: the 50-move rule, repetition, or
    /// insufficient mating material? A single prior repetition along the
    /// path counts as a draw.
    pub fn is_draw(&self) -> bool {
        if self.fifty >= 100 {
            return true;
        }
        if self.repetitions.get(&self.hash).copied().unwrap_or(0) >= 2 {
            return true;
        }
        self[Piece::Pawn].is_empty()
            && self[Piece::Rook].is_empty()
            && self[Piece::Queen].is_empty()
            && (self[Piece::Knight] | self[Piece::Bishop]).len() <= 1
    }

    #[inline(always)]
    /// Add a piece to an empty square, updating hashes and counts.
    fn add_piece(&mut self, sq: Square, piece: Piece, color: Color) {
        let mask = Bitboard::from(sq);
        self.pieces[piece as usize] |= mask;
        self.sides[color as usize] |= mask;
        let key = zobrist::square_key(sq, piece, color);
        self.hash ^= key;
        if piece == Piece::Pawn {
            self.pawn_hash ^= key;
            self.num_pawns[color as usize] += 1;
        } else {
            self.num_pieces[color as usize] += 1;
        }
    }

    #[inline(always)]
    /// Remove a piece of a known type and color, updating hashes and
    /// counts.
    fn remove_piece(&mut self, sq: Square, piece: Piece, color: Color) {
        let mask = !Bitboard::from(sq);
        self.pieces[piece as usize] &= mask;
        self.sides[color as usize] &= mask;
        let key = zobrist::square_key(sq, piece, color);
        self.hash ^= key;
        if piece == Piece::Pawn {
            self.pawn_hash ^= key;
            self.num_pawns[color as usize] -= 1;
        } else {
            self.num_pieces[color as usize] -= 1;
        }
    }

    /// Remove castle rights and keep the hash in step.
    fn remove_castle_rights(&mut self, rights: CastleRights) {
        let removed = rights & self.castle_rights;
        for bit in 0..4 {
            if removed.0 & 1 << bit != 0 {
                self.hash ^= zobrist::castle_key(bit);
            }
        }
        self.castle_rights &= !removed;
    }

    #[cfg(test)]
    /// Recompute the full hash from scratch, for validation.
    pub(crate) fn fresh_hash(&self) -> u64 {
        let mut hash = 0;
        for color in [Color::White, Color::Black] {
            for piece in Piece::ALL_TYPES {
                for sq in self.pieces_of(piece, color) {
                    hash ^= zobrist::square_key(sq, piece, color);
                }
            }
        }
        if self.player == Color::Black {
            hash ^= zobrist::black_to_move_key();
        }
        for bit in 0..4 {
            if self.castle_rights.0 & 1 << bit != 0 {
                hash ^= zobrist::castle_key(bit);
            }
        }
        hash ^ zobrist::ep_key(self.en_passant_square)
    }
}

/// The castle right that is lost when a rook leaves (or is captured on) its
/// home square.
fn rook_home_rights(sq: Square) -> CastleRights {
    match sq {
        Square::A1 => CastleRights::queen_castle(Color::White),
        Square::H1 => CastleRights::king_castle(Color::White),
        Square::A8 => CastleRights::queen_castle(Color::Black),
        Square::H8 => CastleRights::king_castle(Color::Black),
        _ => CastleRights::NO_RIGHTS,
    }
}

impl Index<Piece> for Board {
    type Output = Bitboard;
    #[inline(always)]
    fn index(&self, piece: Piece) -> &Bitboard {
        &self.pieces[piece as usize]
    }
}

impl Index<Color> for Board {
    type Output = Bitboard;
    #[inline(always)]
    fn index(&self, color: Color) -> &Bitboard {
        &self.sides[color as usize]
    }
}

impl Default for Board {
    fn default() -> Board {
        Board::new()
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let sq = Square::new(rank, file).unwrap();
                match (self.type_at_square(sq), self.color_at_square(sq)) {
                    (Some(p), Some(Color::White)) => write!(f, "{} ", p.code())?,
                    (Some(p), Some(_)) => write!(f, "{} ", p.code().to_lowercase())?,
                    _ => write!(f, ". ")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::movegen;

    /// Check that making and undoing `m` leaves the board untouched.
    fn make_undo_helper(fen: &str, uci: &str) {
        let mut board = Board::from_fen(fen).unwrap();
        let original = board.clone();
        let m = Move::from_uci(uci, &board).unwrap();
        let undo = board.make_move(m);
        assert_eq!(board.hash, board.fresh_hash());
        board.undo_move(m, &undo);
        assert_eq!(board, original);
    }

    #[test]
    /// Test make/undo for a plain pawn push.
    fn undo_pawn_push() {
        make_undo_helper(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "e2e4",
        );
    }

    #[test]
    /// Test make/undo for a capture.
    fn undo_capture() {
        make_undo_helper(
            "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
            "e4d5",
        );
    }

    #[test]
    /// Test make/undo for an en passant capture.
    fn undo_en_passant() {
        make_undo_helper(
            "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3",
            "e5d6",
        );
    }

    #[test]
    /// Test make/undo for both castles.
    fn undo_castle() {
        make_undo_helper(
            "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1",
            "e1g1",
        );
        make_undo_helper(
            "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R b KQkq - 0 1",
            "e8c8",
        );
    }

    #[test]
    /// Test make/undo for a capturing promotion.
    fn undo_promotion() {
        make_undo_helper(
            "r1b1kbnr/pPqppppp/2n5/8/8/8/P1PPPPPP/RNBQKBNR w KQkq - 1 5",
            "b7a8q",
        );
    }

    #[test]
    /// Test that a null move round-trips.
    fn undo_null() {
        let mut board =
            Board::from_fen("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2")
                .unwrap();
        let original = board.clone();
        let undo = board.make_null_move();
        assert_eq!(board.prev_move, Move::NULL);
        assert_eq!(board.en_passant_square, None);
        board.undo_null_move(&undo);
        assert_eq!(board, original);
    }

    #[test]
    /// Test that moving a rook from its home square removes the matching
    /// castle right.
    fn rook_move_loses_right() {
        let mut board =
            Board::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let m = Move::from_uci("a1b1", &board).unwrap();
        board.make_move(m);
        assert!(!board.castle_rights.is_queenside_castle_legal(Color::White));
        assert!(board.castle_rights.is_kingside_castle_legal(Color::White));
    }

    #[test]
    /// Test that a repeated position registers as a draw.
    fn repetition_draw() {
        let mut board = Board::new();
        let moves = ["g1f3", "g8f6", "f3g1", "f6g8"];
        for uci in moves {
            let m = Move::from_uci(uci, &board).unwrap();
            board.make_move(m);
        }
        // back to the start position for the second time
        assert!(board.is_draw());
    }

    #[test]
    /// Test the insufficient-material rule.
    fn insufficient_material() {
        assert!(Board::from_fen("8/8/4k3/8/8/2K5/8/8 w - - 0 1").unwrap().is_draw());
        assert!(Board::from_fen("8/8/4k3/8/8/2KB4/8/8 w - - 0 1")
            .unwrap()
            .is_draw());
        assert!(!Board::from_fen("8/8/4k3/8/8/2KR4/8/8 w - - 0 1")
            .unwrap()
            .is_draw());
    }

    #[test]
    /// Test that piece counts track captures and promotions.
    fn counts_track_material() {
        let mut board =
            Board::from_fen("r1b1kbnr/pPqppppp/2n5/8/8/8/P1PPPPPP/RNBQKBNR w KQkq - 1 5").unwrap();
        let pawns_before = board.num_pawns[Color::White as usize];
        let pieces_before = board.num_pieces[Color::White as usize];
        let m = Move::from_uci("b7a8q", &board).unwrap();
        board.make_move(m);
        assert_eq!(board.num_pawns[Color::White as usize], pawns_before - 1);
        assert_eq!(board.num_pieces[Color::White as usize], pieces_before + 1);
        // black started with eight non-pawn pieces and lost the a8 rook
        assert_eq!(board.num_pieces[Color::Black as usize], 7);
    }

    #[test]
    /// Test that the start position has the expected legal move count, tying
    /// the board to the generator.
    fn startpos_sanity() {
        let board = Board::new();
        assert_eq!(movegen::legal_moves(&board).len(), 20);
    }
}
