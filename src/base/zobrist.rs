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

//! Zobrist hashing keys.
//!
//! The board maintains two incrementally updated hashes: the full position
//! hash, which keys the transposition table and the PV node-count cache,
//! and a pawns-only hash, which keys the pawn-structure table. Both are
//! built from the same square keys.

use once_cell::sync::Lazy;

use super::{Color, Piece, Square};

struct ZobristKeys {
    /// Keys for a piece of a given color on a given square, indexed
    /// `[color][piece][square]`.
    squares: [[[u64; 64]; Piece::NUM_TYPES]; 2],
    /// One key per castle-right bit.
    castle: [u64; 4],
    /// One key per en passant file.
    ep_file: [u64; 8],
    /// The key for Black to move.
    black_to_move: u64,
}

/// The seed is arbitrary but fixed, so hashes are stable between runs.
static KEYS: Lazy<ZobristKeys> = Lazy::new(|| {
    let rng = fastrand::Rng::with_seed(0x39A5_BF0C_02D4_E851);
    let mut keys = ZobristKeys {
        squares: [[[0; 64]; Piece::NUM_TYPES]; 2],
        castle: [0; 4],
        ep_file: [0; 8],
        black_to_move: 0,
    };
    for color_keys in &mut keys.squares {
        for piece_keys in color_keys.iter_mut() {
            for key in piece_keys.iter_mut() {
                *key = rng.u64(..);
            }
        }
    }
    for key in &mut keys.castle {
        *key = rng.u64(..);
    }
    for key in &mut keys.ep_file {
        *key = rng.u64(..);
    }
    keys.black_to_move = rng.u64(..);
    keys
});

#[inline(always)]
#[must_use]
/// Get the key for a piece of the given color on the given square.
pub fn square_key(sq: Square, piece: Piece, color: Color) -> u64 {
    KEYS.squares[color as usize][piece as usize][sq as usize]
}

#[inline(always)]
#[must_use]
/// Get the key for one castle-right bit, indexed 0 to 3.
pub fn castle_key(bit: usize) -> u64 {
    KEYS.castle[bit]
}

#[inline(always)]
#[must_use]
/// Get the key for an en passant square, or 0 if there is none.
pub fn ep_key(ep_square: Option<Square>) -> u64 {
    match ep_square {
        Some(sq) => KEYS.ep_file[sq.file()],
        None => 0,
    }
}

#[inline(always)]
#[must_use]
/// Get the key for the player to move being Black.
pub fn black_to_move_key() -> u64 {
    KEYS.black_to_move
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Test that keys are stable and nonzero.
    fn keys_are_stable() {
        let k1 = square_key(Square::E4, Piece::Knight, Color::White);
        let k2 = square_key(Square::E4, Piece::Knight, Color::White);
        assert_eq!(k1, k2);
        assert_ne!(k1, 0);
        assert_ne!(k1, square_key(Square::E4, Piece::Knight, Color::Black));
    }

    #[test]
    /// Test that the absent en passant square hashes to zero, so toggling it
    /// in and out is a no-op.
    fn absent_ep_is_zero() {
        assert_eq!(ep_key(None), 0);
        assert_ne!(ep_key(Some(Square::E3)), 0);
    }
}
