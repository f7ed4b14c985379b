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

//! Board representation and move generation primitives shared by the whole
//! engine.

mod bitboard;
pub use bitboard::Bitboard;

mod board;
pub use board::{Board, Undo};

mod castling;
pub use castling::CastleRights;

mod color;
pub use color::Color;

mod direction;
pub use direction::Direction;

pub mod movegen;

mod moves;
pub use moves::Move;

mod piece;
pub use piece::Piece;

mod square;
pub use square::Square;

pub mod zobrist;
