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

//! Directions of movement, as square index offsets.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// A step on the board, expressed as a signed offset on square indices.
/// Steps which would wrap around the edge of the board must be filtered by
/// a distance check at the point of use.
pub struct Direction(pub i8);

impl Direction {
    /// One square towards the eighth rank.
    pub const NORTH: Direction = Direction(8);
    /// One square towards the first rank.
    pub const SOUTH: Direction = Direction(-8);
    /// One square towards the H file.
    pub const EAST: Direction = Direction(1);
    /// One square towards the A file.
    pub const WEST: Direction = Direction(-1);
    /// A diagonal step north and east.
    pub const NORTHEAST: Direction = Direction(9);
    /// A diagonal step north and west.
    pub const NORTHWEST: Direction = Direction(7);
    /// A diagonal step south and east.
    pub const SOUTHEAST: Direction = Direction(-7);
    /// A diagonal step south and west.
    pub const SOUTHWEST: Direction = Direction(-9);

    /// The steps a knight can make.
    pub const KNIGHT_STEPS: [Direction; 8] = [
        Direction(17),
        Direction(15),
        Direction(10),
        Direction(6),
        Direction(-6),
        Direction(-10),
        Direction(-15),
        Direction(-17),
    ];

    /// The steps a king can make.
    pub const KING_STEPS: [Direction; 8] = [
        Direction::NORTH,
        Direction::NORTHEAST,
        Direction::EAST,
        Direction::SOUTHEAST,
        Direction::SOUTH,
        Direction::SOUTHWEST,
        Direction::WEST,
        Direction::NORTHWEST,
    ];
}
