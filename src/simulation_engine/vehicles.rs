use crate::models::vehicle::{VehicleHandle, VehicleId};
use crate::simulation_engine::parking::ResourcePool;
use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Invoked once per vehicle when it asks for intersection access. Returns
/// whether the vehicle was admitted (queued on a lane).
pub type AccessCallback = Arc<dyn Fn(&VehicleHandle) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorTiming {
    /// Wall time of one logical arrival tick.
    pub arrival_tick: Duration,
    /// How long a parked vehicle stays in the lot.
    pub parking_occupancy: Duration,
}

/// What happened to one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActorOutcome {
    pub vehicle_id: VehicleId,
    pub admitted: bool,
    pub reserved: bool,
    pub parked: bool,
}

/// Drives one vehicle: arrival, optional parking reservation, access request,
/// then parking if a reservation is still pending.
pub struct VehicleActor {
    vehicle: VehicleHandle,
    lots: Vec<Arc<ResourcePool>>,
    on_access: Option<AccessCallback>,
    timing: ActorTiming,
}

impl VehicleActor {
    pub fn new(vehicle: VehicleHandle, timing: ActorTiming) -> Self {
        Self {
            vehicle,
            lots: Vec::new(),
            on_access: None,
            timing,
        }
    }

    /// Lots the vehicle may use; only the one labelled with its origin is tried.
    pub fn with_lots(mut self, lots: Vec<Arc<ResourcePool>>) -> Self {
        self.lots = lots;
        self
    }

    pub fn with_access(mut self, on_access: AccessCallback) -> Self {
        self.on_access = Some(on_access);
        self
    }

    pub fn vehicle(&self) -> &VehicleHandle {
        &self.vehicle
    }

    fn local_lot(&self) -> Option<Arc<ResourcePool>> {
        self.lots
            .iter()
            .find(|lot| lot.label() == self.vehicle.origin())
            .cloned()
    }

    pub async fn run(self) -> ActorOutcome {
        let vehicle = &self.vehicle;
        let ticks = u32::try_from(vehicle.arrival_time()).unwrap_or(u32::MAX);
        sleep(self.timing.arrival_tick * ticks).await;
        info!(
            "[Vehicle] {} -> {} has arrived at its intersection",
            vehicle.origin(),
            vehicle
        );

        let lot = self.local_lot();
        let mut outcome = ActorOutcome {
            vehicle_id: vehicle.id(),
            ..ActorOutcome::default()
        };
        if let Some(lot) = &lot {
            if vehicle.can_park() && !vehicle.is_emergency() {
                outcome.reserved = lot.try_reserve_waiting_slot(vehicle);
            }
        }

        outcome.admitted = match &self.on_access {
            Some(on_access) => on_access(vehicle),
            None => {
                info!(
                    "[Vehicle] {} -> {} has crossed intersection {}",
                    vehicle.origin(),
                    vehicle,
                    vehicle.destination()
                );
                true
            }
        };

        if let Some(lot) = &lot {
            if !outcome.admitted {
                cancel_parking_reservation(vehicle, lot);
            } else if vehicle.has_parking_reservation() {
                outcome.parked =
                    occupy_reserved_parking(vehicle, lot, self.timing.parking_occupancy).await;
            }
        }
        outcome
    }

    pub fn spawn(self) -> JoinHandle<ActorOutcome> {
        tokio::spawn(self.run())
    }
}

/// Turns a pending reservation into a stay in the lot, or gives the waiting
/// slot back if the lot is full. Returns whether the vehicle parked.
pub async fn occupy_reserved_parking(
    vehicle: &VehicleHandle,
    lot: &ResourcePool,
    occupancy: Duration,
) -> bool {
    if !vehicle.has_parking_reservation() {
        return false;
    }
    if lot.acquire_parking_spot(vehicle) {
        info!(
            "[Vehicle] {} -> {} has parked at parking lot {}",
            vehicle.origin(),
            vehicle,
            lot.label()
        );
        sleep(occupancy).await;
        lot.leave_parking(vehicle);
        true
    } else {
        lot.release_waiting_slot(vehicle);
        false
    }
}

/// Abandons a pending reservation, if any.
pub fn cancel_parking_reservation(vehicle: &VehicleHandle, lot: &ResourcePool) {
    if vehicle.has_parking_reservation() {
        lot.release_waiting_slot(vehicle);
    }
}
