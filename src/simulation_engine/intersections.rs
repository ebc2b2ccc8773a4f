use crate::errors::ControlResult;
use crate::global_variables::DEFAULT_LANE_CAPACITY;
use crate::models::direction::Direction;
use crate::models::vehicle::{VehicleHandle, VehicleId};
use crate::simulation_engine::lanes::PriorityLane;
use crate::simulation_engine::parking::ResourcePool;
use log::warn;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The four approach lanes of one intersection, plus the parking lot that
/// may be attached to it.
///
/// All four lanes sit behind a single mutex: any read or write of any lane
/// excludes every other lane access. The scheduling loop can therefore check
/// one lane and act on another without a second lock.
#[derive(Debug)]
pub struct IntersectionManager {
    name: String,
    lanes: Mutex<[PriorityLane; 4]>,
    parking: Option<Arc<ResourcePool>>,
}

/// Result of [`IntersectionManager::remove_if_head`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadRemoval {
    /// Was at the head of this lane and has been popped.
    Removed(Direction),
    /// Still queued in this lane, but a later, higher-priority arrival now
    /// sits in front of it. Nothing was removed.
    Displaced(Direction),
    /// Not in any lane.
    Missing,
}

/// Diagnostic copy of one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneSnapshot {
    pub direction: Direction,
    pub vehicles: Vec<QueuedVehicle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedVehicle {
    pub id: VehicleId,
    pub class: String,
    pub priority: i32,
    pub arrival_time: u64,
}

/// Non-authoritative dump of all four lanes, for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntersectionSnapshot {
    pub intersection: String,
    pub lanes: Vec<LaneSnapshot>,
}

impl IntersectionSnapshot {
    pub fn lane(&self, direction: Direction) -> &LaneSnapshot {
        &self.lanes[direction.index()]
    }

    pub fn total_waiting(&self) -> usize {
        self.lanes.iter().map(|lane| lane.vehicles.len()).sum()
    }
}

impl IntersectionManager {
    pub fn new(name: impl Into<String>, parking: Option<Arc<ResourcePool>>) -> Self {
        Self::with_lane_capacity(name, DEFAULT_LANE_CAPACITY, parking)
    }

    pub fn with_lane_capacity(
        name: impl Into<String>,
        lane_capacity: usize,
        parking: Option<Arc<ResourcePool>>,
    ) -> Self {
        Self {
            name: name.into(),
            lanes: Mutex::new(std::array::from_fn(|_| PriorityLane::new(lane_capacity))),
            parking,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parking_pool(&self) -> Option<&Arc<ResourcePool>> {
        self.parking.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, [PriorityLane; 4]> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the vehicle on the given approach. `false` means the lane is full.
    pub fn add_vehicle(&self, direction: Direction, vehicle: VehicleHandle) -> bool {
        self.lock()[direction.index()].push(vehicle)
    }

    pub fn get_next_vehicle(&self, direction: Direction) -> Option<VehicleHandle> {
        self.lock()[direction.index()].front().cloned()
    }

    pub fn remove_vehicle(&self, direction: Direction) -> Option<VehicleHandle> {
        self.lock()[direction.index()].pop()
    }

    pub fn has_vehicle(&self, direction: Direction) -> bool {
        !self.lock()[direction.index()].is_empty()
    }

    pub fn lane_len(&self, direction: Direction) -> usize {
        self.lock()[direction.index()].len()
    }

    pub fn total_waiting(&self) -> usize {
        self.lock().iter().map(PriorityLane::len).sum()
    }

    // Tag-based entry points. An unknown tag is reported and nothing changes.

    pub fn add_vehicle_by_tag(&self, tag: &str, vehicle: VehicleHandle) -> ControlResult<bool> {
        let direction = self.parse_tag(tag)?;
        Ok(self.add_vehicle(direction, vehicle))
    }

    pub fn get_next_vehicle_by_tag(&self, tag: &str) -> ControlResult<Option<VehicleHandle>> {
        let direction = self.parse_tag(tag)?;
        Ok(self.get_next_vehicle(direction))
    }

    pub fn remove_vehicle_by_tag(&self, tag: &str) -> ControlResult<Option<VehicleHandle>> {
        let direction = self.parse_tag(tag)?;
        Ok(self.remove_vehicle(direction))
    }

    pub fn has_vehicle_by_tag(&self, tag: &str) -> ControlResult<bool> {
        let direction = self.parse_tag(tag)?;
        Ok(self.has_vehicle(direction))
    }

    fn parse_tag(&self, tag: &str) -> ControlResult<Direction> {
        tag.parse::<Direction>().map_err(|e| {
            warn!("[{}] Invalid direction: {:?}", self.name, tag);
            e
        })
    }

    /// First lane head, in NORTH, SOUTH, EAST, WEST order, that is an
    /// emergency vehicle. No tie-break across directions beyond that order.
    pub fn first_emergency_head(&self) -> Option<(Direction, VehicleHandle)> {
        let lanes = self.lock();
        Direction::ALL.iter().find_map(|&direction| {
            lanes[direction.index()]
                .front()
                .filter(|v| v.is_emergency())
                .map(|v| (direction, Arc::clone(v)))
        })
    }

    /// Pops `vehicle` from whichever lane holds it at the head, within one
    /// critical section.
    pub fn remove_if_head(&self, vehicle: &VehicleHandle) -> HeadRemoval {
        let mut lanes = self.lock();
        for direction in Direction::ALL {
            let lane = &mut lanes[direction.index()];
            if lane.front().is_some_and(|head| Arc::ptr_eq(head, vehicle)) {
                lane.pop();
                return HeadRemoval::Removed(direction);
            }
            if lane.contains(vehicle) {
                return HeadRemoval::Displaced(direction);
            }
        }
        HeadRemoval::Missing
    }

    pub fn snapshot(&self) -> IntersectionSnapshot {
        let lanes = self.lock();
        IntersectionSnapshot {
            intersection: self.name.clone(),
            lanes: Direction::ALL
                .iter()
                .map(|&direction| LaneSnapshot {
                    direction,
                    vehicles: lanes[direction.index()]
                        .iter()
                        .map(|v| QueuedVehicle {
                            id: v.id(),
                            class: v.class().to_string(),
                            priority: v.priority(),
                            arrival_time: v.arrival_time(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
