use crate::models::vehicle::Vehicle;
use log::{info, warn};
use tokio::sync::Semaphore;

/// Parking lot attached to an intersection.
///
/// Two independent permit pools bound the lot itself and the antechamber of
/// vehicles committed to trying it. Every operation is a single
/// non-blocking attempt: when a pool is empty the caller is told so
/// immediately and decides what to do next.
///
/// Permits are taken with `try_acquire` and immediately forgotten, then handed
/// back with `add_permits`, so a reservation is not tied to a guard's lifetime
/// and can be released from a different task than the one that took it.
#[derive(Debug)]
pub struct ResourcePool {
    label: String,
    parking_permits: Semaphore,
    waiting_permits: Semaphore,
    parking_capacity: usize,
    waiting_capacity: usize,
}

impl ResourcePool {
    pub fn new(label: impl Into<String>, parking_capacity: usize, waiting_capacity: usize) -> Self {
        let label = label.into();
        info!(
            "[ParkingLot] {} initialized with {} parking spots and {} waiting spots",
            label, parking_capacity, waiting_capacity
        );
        Self {
            label,
            parking_permits: Semaphore::new(parking_capacity),
            waiting_permits: Semaphore::new(waiting_capacity),
            parking_capacity,
            waiting_capacity,
        }
    }

    /// Stage one: take a place in the antechamber.
    ///
    /// Fails at once for emergency vehicles, for classes that may not park,
    /// and when the antechamber is full. On success the vehicle is marked as
    /// holding a pending reservation.
    pub fn try_reserve_waiting_slot(&self, vehicle: &Vehicle) -> bool {
        if vehicle.is_emergency() {
            info!(
                "[ParkingLot] {} -> {} is an emergency vehicle and cannot request parking",
                self.label, vehicle
            );
            return false;
        }
        if !vehicle.can_park() {
            info!("[ParkingLot] {} -> {} cannot park here", self.label, vehicle);
            return false;
        }
        match self.waiting_permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                vehicle.set_parking_reservation(true);
                info!(
                    "[ParkingLot] {} -> {} obtained a waiting spot",
                    self.label, vehicle
                );
                true
            }
            Err(_) => {
                info!(
                    "[ParkingLot] {} waiting queue full. {} cannot enter waiting queue",
                    self.label, vehicle
                );
                false
            }
        }
    }

    /// Stage two: move from the antechamber into the lot.
    ///
    /// On success the vehicle's waiting permit is given back. On failure no
    /// permit changes; the caller still holds its waiting slot and is expected
    /// to call [`ResourcePool::release_waiting_slot`].
    pub fn acquire_parking_spot(&self, vehicle: &Vehicle) -> bool {
        match self.parking_permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.give_back(&self.waiting_permits, self.waiting_capacity, "waiting");
                vehicle.set_parking_reservation(false);
                info!(
                    "[ParkingLot] {} -> {} obtained a parking spot",
                    self.label, vehicle
                );
                true
            }
            Err(_) => {
                info!(
                    "[ParkingLot] {} -> {} could not obtain a parking spot",
                    self.label, vehicle
                );
                false
            }
        }
    }

    /// Gives back one antechamber slot, after a failed acquisition or an
    /// abandoned reservation.
    pub fn release_waiting_slot(&self, vehicle: &Vehicle) {
        self.give_back(&self.waiting_permits, self.waiting_capacity, "waiting");
        vehicle.set_parking_reservation(false);
        info!(
            "[ParkingLot] {} -> {} released a waiting spot",
            self.label, vehicle
        );
    }

    /// A parked vehicle departs.
    pub fn leave_parking(&self, vehicle: &Vehicle) {
        self.give_back(&self.parking_permits, self.parking_capacity, "parking");
        info!(
            "[ParkingLot] {} -> {} has left the parking lot",
            self.label, vehicle
        );
    }

    // A release with nothing held is a caller bug; it is dropped so the pool
    // never exceeds its capacity.
    fn give_back(&self, permits: &Semaphore, capacity: usize, kind: &str) {
        if permits.available_permits() >= capacity {
            warn!(
                "[ParkingLot] {} ignored a {} release with no {} permit held",
                self.label, kind, kind
            );
            return;
        }
        permits.add_permits(1);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parking_capacity(&self) -> usize {
        self.parking_capacity
    }

    pub fn waiting_capacity(&self) -> usize {
        self.waiting_capacity
    }

    pub fn available_parking(&self) -> usize {
        self.parking_permits.available_permits()
    }

    pub fn available_waiting(&self) -> usize {
        self.waiting_permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::vehicle::VehicleClass;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn car(id: i32) -> Vehicle {
        Vehicle::new(id, VehicleClass::Car, "F10", "F10", 0)
    }

    #[test]
    fn two_stage_reservation_with_one_spot() {
        let pool = ResourcePool::new("F10", 1, 1);
        let a = car(1);
        let b = car(2);

        assert!(pool.try_reserve_waiting_slot(&a));
        assert!(a.has_parking_reservation());
        assert!(pool.acquire_parking_spot(&a));
        assert!(!a.has_parking_reservation());
        assert_eq!(pool.available_waiting(), 1);
        assert_eq!(pool.available_parking(), 0);

        assert!(pool.try_reserve_waiting_slot(&b));
        assert_eq!(pool.available_waiting(), 0);
        assert!(!pool.acquire_parking_spot(&b));
        // Failed acquisition leaves permits alone.
        assert_eq!(pool.available_waiting(), 0);
        assert!(b.has_parking_reservation());

        pool.release_waiting_slot(&b);
        assert_eq!(pool.available_waiting(), pool.waiting_capacity());
        assert!(!b.has_parking_reservation());

        pool.leave_parking(&a);
        assert_eq!(pool.available_parking(), 1);
    }

    #[test]
    fn emergency_vehicles_never_reserve() {
        let pool = ResourcePool::new("F11", 100, 100);
        for class in [VehicleClass::Ambulance, VehicleClass::Firetruck] {
            let v = Vehicle::new(9, class, "F11", "F11", 0);
            assert!(!pool.try_reserve_waiting_slot(&v));
            assert!(!v.has_parking_reservation());
        }
        assert_eq!(pool.available_waiting(), 100);
    }

    #[test]
    fn ineligible_classes_are_rejected() {
        let pool = ResourcePool::new("F11", 5, 5);
        let truck = Vehicle::new(3, VehicleClass::Truck, "F11", "F11", 0);
        assert!(!pool.try_reserve_waiting_slot(&truck));
        assert_eq!(pool.available_waiting(), 5);
    }

    #[test]
    fn full_antechamber_rejects_immediately() {
        let pool = ResourcePool::new("F10", 1, 2);
        assert!(pool.try_reserve_waiting_slot(&car(1)));
        assert!(pool.try_reserve_waiting_slot(&car(2)));
        let third = car(3);
        assert!(!pool.try_reserve_waiting_slot(&third));
        assert!(!third.has_parking_reservation());
    }

    #[test]
    fn abandoned_reservation_leaves_no_leak() {
        let pool = ResourcePool::new("F10", 0, 3);
        let v = car(1);
        let before = pool.available_waiting();
        assert!(pool.try_reserve_waiting_slot(&v));
        assert!(!pool.acquire_parking_spot(&v));
        pool.release_waiting_slot(&v);
        assert_eq!(pool.available_waiting(), before);
    }

    #[test]
    fn over_release_does_not_exceed_capacity() {
        let pool = ResourcePool::new("F10", 2, 2);
        let v = car(1);
        pool.release_waiting_slot(&v);
        pool.leave_parking(&v);
        assert_eq!(pool.available_waiting(), 2);
        assert_eq!(pool.available_parking(), 2);
    }

    #[test]
    fn concurrent_grants_never_exceed_capacity() {
        const PARKING: usize = 3;
        const WAITING: usize = 5;
        const THREADS: usize = 32;

        let pool = Arc::new(ResourcePool::new("F10", PARKING, WAITING));
        let parked = Arc::new(AtomicUsize::new(0));
        let waiting = Arc::new(AtomicUsize::new(0));
        let max_parked = Arc::new(AtomicUsize::new(0));
        let max_waiting = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let pool = Arc::clone(&pool);
                let parked = Arc::clone(&parked);
                let waiting = Arc::clone(&waiting);
                let max_parked = Arc::clone(&max_parked);
                let max_waiting = Arc::clone(&max_waiting);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let v = car(i as i32);
                    barrier.wait();
                    for _ in 0..200 {
                        if !pool.try_reserve_waiting_slot(&v) {
                            continue;
                        }
                        let now = waiting.fetch_add(1, Ordering::SeqCst) + 1;
                        max_waiting.fetch_max(now, Ordering::SeqCst);
                        // Leave the antechamber count before the pool frees the slot.
                        waiting.fetch_sub(1, Ordering::SeqCst);
                        if pool.acquire_parking_spot(&v) {
                            let now = parked.fetch_add(1, Ordering::SeqCst) + 1;
                            max_parked.fetch_max(now, Ordering::SeqCst);
                            parked.fetch_sub(1, Ordering::SeqCst);
                            pool.leave_parking(&v);
                        } else {
                            pool.release_waiting_slot(&v);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(max_parked.load(Ordering::SeqCst) <= PARKING);
        assert!(max_waiting.load(Ordering::SeqCst) <= WAITING);
        assert_eq!(pool.available_parking(), PARKING);
        assert_eq!(pool.available_waiting(), WAITING);
    }
}
