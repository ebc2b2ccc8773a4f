use crate::models::direction::Direction;
use crate::models::vehicle::VehicleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Emergency,
    NorthGreen,
    SouthGreen,
    EastGreen,
    WestGreen,
}

impl Phase {
    pub fn green(direction: Direction) -> Self {
        match direction {
            Direction::North => Phase::NorthGreen,
            Direction::South => Phase::SouthGreen,
            Direction::East => Phase::EastGreen,
            Direction::West => Phase::WestGreen,
        }
    }

    /// Direction given right of way, `None` during an emergency.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Phase::Emergency => None,
            Phase::NorthGreen => Some(Direction::North),
            Phase::SouthGreen => Some(Direction::South),
            Phase::EastGreen => Some(Direction::East),
            Phase::WestGreen => Some(Direction::West),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction() {
            Some(direction) => write!(f, "{}_GREEN", direction),
            None => f.write_str("EMERGENCY"),
        }
    }
}

/// Record of one vehicle leaving its lane through the intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingRecord {
    pub intersection: String,
    pub vehicle_id: VehicleId,
    pub class: String,
    pub direction: Direction,
    pub phase: Phase,
    pub emergency: bool,
    pub origin: String,
    pub destination: String,
    /// Milliseconds since the controller was created.
    pub at_ms: u64,
}

/// What a controller reports to observers while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerEvent {
    PhaseChanged {
        intersection: String,
        phase: Phase,
        cycle: u64,
    },
    VehicleCrossed(CrossingRecord),
    ConsistencyViolation {
        intersection: String,
        vehicle_id: VehicleId,
    },
}
