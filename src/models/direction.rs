use crate::errors::ControlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Approach direction of a lane at an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Fixed order used by the emergency scan and the green cycle.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "NORTH",
            Direction::South => "SOUTH",
            Direction::East => "EAST",
            Direction::West => "WEST",
        }
    }

    /// Single-letter approach code carried in coordination messages.
    pub fn short_code(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
        }
    }

    pub fn from_short_code(code: &str) -> Result<Self, ControlError> {
        match code {
            "N" => Ok(Direction::North),
            "S" => Ok(Direction::South),
            "E" => Ok(Direction::East),
            "W" => Ok(Direction::West),
            other => Err(ControlError::InvalidDirection(other.to_string())),
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }

    /// Next direction in the green cycle.
    pub fn next(self) -> Self {
        Direction::ALL[(self.index() + 1) % Direction::ALL.len()]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts exactly the canonical tags `NORTH`, `SOUTH`, `EAST`, `WEST`.
impl FromStr for Direction {
    type Err = ControlError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "NORTH" => Ok(Direction::North),
            "SOUTH" => Ok(Direction::South),
            "EAST" => Ok(Direction::East),
            "WEST" => Ok(Direction::West),
            other => Err(ControlError::InvalidDirection(other.to_string())),
        }
    }
}

/// Intended movement through the intersection. Carried as a tag only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Movement {
    Straight,
    Left,
    Right,
}

impl Movement {
    pub fn as_str(self) -> &'static str {
        match self {
            Movement::Straight => "STRAIGHT",
            Movement::Left => "LEFT",
            Movement::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Movement {
    type Err = ControlError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "STRAIGHT" => Ok(Movement::Straight),
            "LEFT" => Ok(Movement::Left),
            "RIGHT" => Ok(Movement::Right),
            other => Err(ControlError::InvalidMovement(other.to_string())),
        }
    }
}
