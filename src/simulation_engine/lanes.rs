use crate::global_variables::DEFAULT_LANE_CAPACITY;
use crate::models::vehicle::{VehicleHandle, VehicleId};
use log::info;

/// The queue of vehicles waiting on one approach of an intersection.
///
/// Vehicles are kept sorted ascending by `(priority, arrival_time)`, so the
/// head is always the next vehicle to cross. Vehicles with an equal key keep
/// the order in which they were pushed (FIFO among equals).
#[derive(Debug, Clone)]
pub struct PriorityLane {
    /// Sorted queue; index 0 is the head.
    vehicles: Vec<VehicleHandle>,
    /// Maximum number of waiting vehicles.
    capacity: usize,
}

impl Default for PriorityLane {
    fn default() -> Self {
        Self::new(DEFAULT_LANE_CAPACITY)
    }
}

impl PriorityLane {
    pub fn new(capacity: usize) -> Self {
        Self {
            vehicles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Checks if a new vehicle can join the lane.
    pub fn can_add_vehicle(&self) -> bool {
        self.vehicles.len() < self.capacity
    }

    /// Inserts the vehicle at its sorted position.
    ///
    /// Returns `false`, leaving the lane untouched, when the lane is full.
    pub fn push(&mut self, vehicle: VehicleHandle) -> bool {
        if !self.can_add_vehicle() {
            info!(
                "Lane full ({} vehicles). {} not added.",
                self.capacity, vehicle
            );
            return false;
        }
        // Insert after every vehicle whose key is <= the new key.
        let key = vehicle.sort_key();
        let position = self.vehicles.partition_point(|queued| queued.sort_key() <= key);
        self.vehicles.insert(position, vehicle);
        true
    }

    pub fn front(&self) -> Option<&VehicleHandle> {
        self.vehicles.first()
    }

    /// Removes and returns the head. Popping an empty lane is a no-op.
    pub fn pop(&mut self) -> Option<VehicleHandle> {
        if self.vehicles.is_empty() {
            return None;
        }
        Some(self.vehicles.remove(0))
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehicleHandle> {
        self.vehicles.iter()
    }

    /// Identity check, not id equality.
    pub fn contains(&self, vehicle: &VehicleHandle) -> bool {
        self.vehicles.iter().any(|queued| std::sync::Arc::ptr_eq(queued, vehicle))
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.iter().map(|v| v.id()).collect()
    }
}
