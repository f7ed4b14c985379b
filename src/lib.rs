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

//! Osprey, a UCI-compatible chess engine.
//!
//! The crate is split into three parts: `base` contains the board
//! representation and move generation primitives, `engine` contains the
//! search core (caches, move selection, alpha-beta, and the deepening
//! driver), and `uci` contains the text front-end which drives the engine
//! over the Universal Chess Interface.

pub mod base;
pub mod engine;
pub mod uci;
