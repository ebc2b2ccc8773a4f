use crate::errors::ControlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub type VehicleId = i32;

/// Shared handle to a vehicle. Lanes, the controller and the actor all hold
/// clones of the same handle; none of them owns the vehicle exclusively.
pub type VehicleHandle = Arc<Vehicle>;

/// Vehicle classes known to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Ambulance,
    Firetruck,
    Bus,
    Car,
    Tractor,
    Bike,
    Truck,
    Van,
}

impl VehicleClass {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleClass::Ambulance => "ambulance",
            VehicleClass::Firetruck => "firetruck",
            VehicleClass::Bus => "bus",
            VehicleClass::Car => "car",
            VehicleClass::Tractor => "tractor",
            VehicleClass::Bike => "bike",
            VehicleClass::Truck => "truck",
            VehicleClass::Van => "van",
        }
    }

    pub fn is_emergency(self) -> bool {
        matches!(self, VehicleClass::Ambulance | VehicleClass::Firetruck)
    }

    /// 1 is served first.
    pub fn priority(self) -> i32 {
        match self {
            VehicleClass::Ambulance | VehicleClass::Firetruck => 1,
            VehicleClass::Bus => 2,
            _ => 3,
        }
    }

    pub fn can_park(self) -> bool {
        matches!(
            self,
            VehicleClass::Car | VehicleClass::Bus | VehicleClass::Tractor | VehicleClass::Bike
        )
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = ControlError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "ambulance" => Ok(VehicleClass::Ambulance),
            "firetruck" => Ok(VehicleClass::Firetruck),
            "bus" => Ok(VehicleClass::Bus),
            "car" => Ok(VehicleClass::Car),
            "tractor" => Ok(VehicleClass::Tractor),
            "bike" => Ok(VehicleClass::Bike),
            "truck" => Ok(VehicleClass::Truck),
            "van" => Ok(VehicleClass::Van),
            _ => Err(ControlError::UnknownVehicleClass(tag.to_string())),
        }
    }
}

/// A vehicle waiting at, crossing, or parking near an intersection.
///
/// Priority and the emergency / parking flags are derived from the class once,
/// at construction. The only mutable state is the pending-reservation flag.
#[derive(Debug)]
pub struct Vehicle {
    id: VehicleId,
    class: VehicleClass,
    origin: String,
    destination: String,
    priority: i32,
    arrival_time: u64,
    is_emergency: bool,
    can_park: bool,
    parking_reserved: AtomicBool,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        class: VehicleClass,
        origin: impl Into<String>,
        destination: impl Into<String>,
        arrival_time: u64,
    ) -> Self {
        Self {
            id,
            class,
            origin: origin.into(),
            destination: destination.into(),
            priority: class.priority(),
            arrival_time,
            is_emergency: class.is_emergency(),
            can_park: class.can_park(),
            parking_reserved: AtomicBool::new(false),
        }
    }

    /// Convenience for building a shared handle directly.
    pub fn handle(
        id: VehicleId,
        class: VehicleClass,
        origin: impl Into<String>,
        destination: impl Into<String>,
        arrival_time: u64,
    ) -> VehicleHandle {
        Arc::new(Self::new(id, class, origin, destination, arrival_time))
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn class(&self) -> VehicleClass {
        self.class
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn arrival_time(&self) -> u64 {
        self.arrival_time
    }

    pub fn is_emergency(&self) -> bool {
        self.is_emergency
    }

    pub fn can_park(&self) -> bool {
        self.can_park
    }

    /// Lane ordering key: lower sorts first.
    pub fn sort_key(&self) -> (i32, u64) {
        (self.priority, self.arrival_time)
    }

    /// Whether the vehicle is heading to a different intersection.
    pub fn is_transit(&self) -> bool {
        self.origin != self.destination
    }

    pub fn has_parking_reservation(&self) -> bool {
        self.parking_reserved.load(Ordering::Acquire)
    }

    pub(crate) fn set_parking_reservation(&self, reserved: bool) {
        self.parking_reserved.store(reserved, Ordering::Release);
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vehicle {} ({})", self.id, self.class)
    }
}

/// Hands out strictly increasing logical arrival stamps.
#[derive(Debug, Default)]
pub struct ArrivalClock {
    next: AtomicU64,
}

impl ArrivalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn stamp(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_and_flags_follow_class() {
        let ambulance = Vehicle::new(1, VehicleClass::Ambulance, "F10", "F11", 0);
        assert_eq!(ambulance.priority(), 1);
        assert!(ambulance.is_emergency());
        assert!(!ambulance.can_park());

        let bus = Vehicle::new(2, VehicleClass::Bus, "F10", "F10", 0);
        assert_eq!(bus.priority(), 2);
        assert!(!bus.is_emergency());
        assert!(bus.can_park());

        let truck = Vehicle::new(3, VehicleClass::Truck, "F10", "F10", 0);
        assert_eq!(truck.priority(), 3);
        assert!(!truck.can_park());

        for class in [VehicleClass::Car, VehicleClass::Tractor, VehicleClass::Bike] {
            let v = Vehicle::new(4, class, "F11", "F11", 0);
            assert_eq!(v.priority(), 3);
            assert!(v.can_park());
        }
    }

    #[test]
    fn class_tags_parse_case_insensitively() {
        assert_eq!("FireTruck".parse::<VehicleClass>().unwrap(), VehicleClass::Firetruck);
        assert_eq!("bike".parse::<VehicleClass>().unwrap(), VehicleClass::Bike);
        assert!(matches!(
            "hovercraft".parse::<VehicleClass>(),
            Err(ControlError::UnknownVehicleClass(_))
        ));
    }

    #[test]
    fn transit_compares_origin_and_destination() {
        assert!(Vehicle::new(1, VehicleClass::Ambulance, "F10", "F11", 0).is_transit());
        assert!(!Vehicle::new(2, VehicleClass::Ambulance, "F10", "F10", 0).is_transit());
    }

    #[test]
    fn arrival_clock_is_strictly_increasing() {
        let clock = ArrivalClock::starting_at(7);
        assert_eq!(clock.stamp(), 7);
        assert_eq!(clock.stamp(), 8);
        assert_eq!(clock.stamp(), 9);
    }
}
