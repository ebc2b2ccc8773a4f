use crate::control_system::events::{ControllerEvent, CrossingRecord, Phase};
use crate::models::direction::Direction;
use crate::models::vehicle::VehicleHandle;
use crate::simulation_engine::intersections::{HeadRemoval, IntersectionManager};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Duration, Instant};

/// Fixed delays of the scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    /// How long each direction stays green.
    pub phase_duration: Duration,
    /// How long one vehicle takes to clear the intersection.
    pub crossing_delay: Duration,
}

impl PhaseTiming {
    pub fn new(phase_duration: Duration, crossing_delay: Duration) -> Self {
        Self {
            phase_duration,
            crossing_delay,
        }
    }
}

/// What one scheduling iteration did.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub phase: Phase,
    pub crossed: Option<VehicleHandle>,
}

/// Totals handed back when the loop stops.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerReport {
    pub intersection: String,
    pub crossings: Vec<CrossingRecord>,
    pub cycles_completed: u64,
    pub emergency_crossings: usize,
    pub consistency_violations: usize,
}

/// Signal controller for one intersection.
///
/// Each iteration first scans the four lane heads (NORTH, SOUTH, EAST, WEST)
/// for an emergency vehicle. The first one found is crossed with every light
/// red, and the next iteration scans again, so emergencies keep preempting the
/// cycle for as long as any is at a lane head. A steady stream of emergency
/// arrivals therefore starves every other vehicle.
///
/// Without an emergency the loop serves the next green phase of the
/// NORTH, SOUTH, EAST, WEST cycle: at most one vehicle from that lane crosses,
/// then the phase holds for its full duration. After a preemption the cycle
/// resumes where it left off.
pub struct PhaseController {
    intersection: Arc<IntersectionManager>,
    timing: PhaseTiming,
    phase: Phase,
    next_green: Direction,
    lights: [bool; 4],
    cycle: u64,
    running: Arc<AtomicBool>,
    started: Instant,
    events: Option<UnboundedSender<ControllerEvent>>,
    report: ControllerReport,
}

impl PhaseController {
    pub fn new(intersection: Arc<IntersectionManager>, timing: PhaseTiming) -> Self {
        let report = ControllerReport {
            intersection: intersection.name().to_string(),
            ..ControllerReport::default()
        };
        Self {
            intersection,
            timing,
            phase: Phase::NorthGreen,
            next_green: Direction::North,
            lights: [false; 4],
            cycle: 1,
            running: Arc::new(AtomicBool::new(true)),
            started: Instant::now(),
            events: None,
            report,
        }
    }

    /// Publish phase changes, crossings and violations to `events`.
    pub fn with_events(mut self, events: UnboundedSender<ControllerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_green(&self, direction: Direction) -> bool {
        self.lights[direction.index()]
    }

    pub fn timing(&self) -> PhaseTiming {
        self.timing
    }

    pub fn intersection(&self) -> &Arc<IntersectionManager> {
        &self.intersection
    }

    pub fn report(&self) -> &ControllerReport {
        &self.report
    }

    /// Flag the loop checks once per iteration. Clearing it stops the loop
    /// after the current phase or crossing completes.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Head of the first lane, in fixed direction order, holding an
    /// emergency vehicle.
    pub fn check_emergency(&self) -> Option<VehicleHandle> {
        self.intersection
            .first_emergency_head()
            .map(|(_, vehicle)| vehicle)
    }

    /// One scheduling iteration: an emergency crossing, or one green phase.
    pub async fn step(&mut self) -> StepOutcome {
        if let Some(vehicle) = self.check_emergency() {
            info!(
                "[{}] EMERGENCY phase: giving priority to {}",
                self.intersection.name(),
                vehicle
            );
            self.enter_phase(Phase::Emergency);
            let crossed = self.cross_vehicle(&vehicle).await;
            if crossed {
                self.report.emergency_crossings += 1;
            }
            return StepOutcome {
                phase: Phase::Emergency,
                crossed: crossed.then_some(vehicle),
            };
        }

        let direction = self.next_green;
        let phase = Phase::green(direction);
        self.enter_phase(phase);

        let mut crossed = None;
        if let Some(vehicle) = self.intersection.get_next_vehicle(direction) {
            if self.cross_vehicle(&vehicle).await {
                crossed = Some(vehicle);
            }
        }

        sleep(self.timing.phase_duration).await;
        self.lights[direction.index()] = false;
        debug!("[{}] Phase: {} lane RED", self.intersection.name(), direction);

        self.next_green = direction.next();
        if direction == Direction::West {
            debug!("[{}] === End of cycle {} ===", self.intersection.name(), self.cycle);
            self.report.cycles_completed += 1;
            self.cycle += 1;
        }

        StepOutcome { phase, crossed }
    }

    /// Removes `vehicle` from the lane whose head it is, then waits out the
    /// crossing delay. Returns whether it crossed.
    ///
    /// A vehicle that is still queued behind a newer, higher-priority arrival
    /// is left for a later iteration. A vehicle that is in no lane at all was
    /// removed out of band: that is logged as a consistency violation and the
    /// crossing is skipped.
    pub async fn cross_vehicle(&mut self, vehicle: &VehicleHandle) -> bool {
        let name = self.intersection.name().to_string();
        match self.intersection.remove_if_head(vehicle) {
            HeadRemoval::Removed(direction) => {
                info!(
                    "[{}] {} is crossing from {} to {} via {}",
                    name,
                    vehicle,
                    vehicle.origin(),
                    vehicle.destination(),
                    direction
                );
                sleep(self.timing.crossing_delay).await;
                let record = CrossingRecord {
                    intersection: name,
                    vehicle_id: vehicle.id(),
                    class: vehicle.class().to_string(),
                    direction,
                    phase: self.phase,
                    emergency: vehicle.is_emergency(),
                    origin: vehicle.origin().to_string(),
                    destination: vehicle.destination().to_string(),
                    at_ms: self.started.elapsed().as_millis() as u64,
                };
                self.publish(ControllerEvent::VehicleCrossed(record.clone()));
                self.report.crossings.push(record);
                true
            }
            HeadRemoval::Displaced(direction) => {
                debug!(
                    "[{}] {} is no longer at the head of {}; crossing deferred",
                    name, vehicle, direction
                );
                false
            }
            HeadRemoval::Missing => {
                warn!(
                    "[{}] Warning: {} not found at the front of any lane; skipping removal",
                    name, vehicle
                );
                self.report.consistency_violations += 1;
                self.publish(ControllerEvent::ConsistencyViolation {
                    intersection: name,
                    vehicle_id: vehicle.id(),
                });
                false
            }
        }
    }

    /// Loops [`PhaseController::step`] until the stop flag is cleared.
    pub async fn run(mut self) -> ControllerReport {
        info!("[{}] Controller loop started", self.intersection.name());
        while self.running.load(Ordering::Acquire) {
            self.step().await;
        }
        info!("[{}] Controller loop stopped", self.intersection.name());
        self.report
    }

    /// Runs the loop on its own task.
    pub fn spawn(self) -> ControllerHandle {
        let running = self.stop_flag();
        let join = tokio::spawn(self.run());
        ControllerHandle { running, join }
    }

    fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.lights = [false; 4];
        if let Some(direction) = phase.direction() {
            self.lights[direction.index()] = true;
        }
        debug!("[{}] Phase: {}", self.intersection.name(), phase);
        self.publish(ControllerEvent::PhaseChanged {
            intersection: self.intersection.name().to_string(),
            phase,
            cycle: self.cycle,
        });
    }

    fn publish(&self, event: ControllerEvent) {
        if let Some(events) = &self.events {
            // Observers are optional; a dropped receiver just stops the stream.
            let _ = events.send(event);
        }
    }
}

/// A running controller task.
pub struct ControllerHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<ControllerReport>,
}

impl ControllerHandle {
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Requests a stop and waits for the loop to finish its current iteration.
    pub async fn stop(self) -> Result<ControllerReport, JoinError> {
        self.request_stop();
        self.join.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::vehicle::{Vehicle, VehicleClass};
    use tokio::sync::mpsc;

    fn timing() -> PhaseTiming {
        PhaseTiming::new(Duration::from_secs(5), Duration::from_secs(2))
    }

    fn setup() -> (Arc<IntersectionManager>, PhaseController) {
        let manager = Arc::new(IntersectionManager::new("F10", None));
        let controller = PhaseController::new(Arc::clone(&manager), timing());
        (manager, controller)
    }

    fn vehicle(id: i32, class: VehicleClass, arrival: u64) -> VehicleHandle {
        Vehicle::handle(id, class, "F10", "F11", arrival)
    }

    #[tokio::test(start_paused = true)]
    async fn lone_emergency_crosses_without_waiting_for_phase() {
        let (manager, mut controller) = setup();
        let ambulance = vehicle(1, VehicleClass::Ambulance, 0);
        manager.add_vehicle(Direction::North, ambulance.clone());

        let start = Instant::now();
        let outcome = controller.step().await;

        assert_eq!(outcome.phase, Phase::Emergency);
        assert!(Arc::ptr_eq(outcome.crossed.as_ref().unwrap(), &ambulance));
        assert_eq!(start.elapsed(), timing().crossing_delay);
        assert!(Direction::ALL.iter().all(|&d| !controller.is_green(d)));
        assert_eq!(manager.total_waiting(), 0);
        assert_eq!(controller.report().emergency_crossings, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn normal_cycle_serves_one_vehicle_per_phase_in_order() {
        let (manager, mut controller) = setup();
        manager.add_vehicle(Direction::North, vehicle(1, VehicleClass::Car, 1));
        manager.add_vehicle(Direction::North, vehicle(2, VehicleClass::Car, 2));
        manager.add_vehicle(Direction::East, vehicle(3, VehicleClass::Bus, 3));

        let mut served = Vec::new();
        for _ in 0..4 {
            let outcome = controller.step().await;
            served.push((outcome.phase, outcome.crossed.map(|v| v.id())));
        }

        assert_eq!(
            served,
            vec![
                (Phase::NorthGreen, Some(1)),
                (Phase::SouthGreen, None),
                (Phase::EastGreen, Some(3)),
                (Phase::WestGreen, None),
            ]
        );
        // Vehicle 2 waits for the next cycle.
        assert_eq!(manager.lane_len(Direction::North), 1);
        assert_eq!(controller.report().cycles_completed, 1);

        let outcome = controller.step().await;
        assert_eq!(outcome.phase, Phase::NorthGreen);
        assert_eq!(outcome.crossed.unwrap().id(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_holds_for_full_duration_even_when_empty() {
        let (_manager, mut controller) = setup();
        let start = Instant::now();
        let outcome = controller.step().await;
        assert_eq!(outcome.phase, Phase::NorthGreen);
        assert!(outcome.crossed.is_none());
        assert_eq!(start.elapsed(), timing().phase_duration);
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_preempts_mid_cycle_then_cycle_resumes() {
        let (manager, mut controller) = setup();
        manager.add_vehicle(Direction::South, vehicle(1, VehicleClass::Car, 1));
        manager.add_vehicle(Direction::East, vehicle(2, VehicleClass::Car, 2));

        assert_eq!(controller.step().await.phase, Phase::NorthGreen);

        // Emergency shows up on WEST while SOUTH is next in the cycle.
        manager.add_vehicle(Direction::West, vehicle(9, VehicleClass::Firetruck, 3));
        let outcome = controller.step().await;
        assert_eq!(outcome.phase, Phase::Emergency);
        assert_eq!(outcome.crossed.unwrap().id(), 9);

        let outcome = controller.step().await;
        assert_eq!(outcome.phase, Phase::SouthGreen);
        assert_eq!(outcome.crossed.unwrap().id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_stream_starves_normal_lanes() {
        let (manager, mut controller) = setup();
        let car = vehicle(100, VehicleClass::Car, 0);
        manager.add_vehicle(Direction::South, car.clone());

        for id in 0..50 {
            // A new emergency arrives before every scan.
            manager.add_vehicle(Direction::North, vehicle(id, VehicleClass::Ambulance, id as u64));
            let outcome = controller.step().await;
            assert_eq!(outcome.phase, Phase::Emergency);
        }

        assert!(manager
            .get_next_vehicle(Direction::South)
            .is_some_and(|head| Arc::ptr_eq(&head, &car)));
        assert_eq!(controller.report().emergency_crossings, 50);
        assert_eq!(controller.report().cycles_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn vehicle_removed_out_of_band_is_a_consistency_violation() {
        let (manager, mut controller) = setup();
        let car = vehicle(1, VehicleClass::Car, 0);
        manager.add_vehicle(Direction::North, car.clone());
        manager.remove_vehicle(Direction::North);

        let start = Instant::now();
        assert!(!controller.cross_vehicle(&car).await);
        assert_eq!(controller.report().consistency_violations, 1);
        // Skipped crossings do not wait out the crossing delay.
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The loop keeps going afterwards.
        manager.add_vehicle(Direction::North, vehicle(2, VehicleClass::Car, 1));
        assert_eq!(controller.step().await.crossed.unwrap().id(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn displaced_vehicle_is_deferred_not_flagged() {
        let (manager, mut controller) = setup();
        let car = vehicle(1, VehicleClass::Car, 5);
        manager.add_vehicle(Direction::East, car.clone());
        manager.add_vehicle(Direction::East, vehicle(2, VehicleClass::Bus, 6));

        assert!(!controller.cross_vehicle(&car).await);
        assert_eq!(controller.report().consistency_violations, 0);
        assert_eq!(manager.lane_len(Direction::East), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_published_in_order() {
        let (manager, controller) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = controller.with_events(tx);
        manager.add_vehicle(Direction::North, vehicle(7, VehicleClass::Car, 0));

        controller.step().await;

        match rx.recv().await.unwrap() {
            ControllerEvent::PhaseChanged { phase, cycle, .. } => {
                assert_eq!(phase, Phase::NorthGreen);
                assert_eq!(cycle, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ControllerEvent::VehicleCrossed(record) => {
                assert_eq!(record.vehicle_id, 7);
                assert_eq!(record.direction, Direction::North);
                assert_eq!(record.phase, Phase::NorthGreen);
                assert_eq!(record.at_ms, 2_000);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_observed_within_one_iteration() {
        let (manager, controller) = setup();
        manager.add_vehicle(Direction::North, vehicle(1, VehicleClass::Car, 0));
        manager.add_vehicle(Direction::South, vehicle(2, VehicleClass::Car, 1));

        let handle = controller.spawn();
        // Lands inside the first phase (crossing 2s + green 5s).
        sleep(Duration::from_secs(3)).await;
        let report = handle.stop().await.unwrap();

        assert_eq!(report.crossings.len(), 1);
        assert_eq!(report.crossings[0].vehicle_id, 1);
        assert_eq!(manager.lane_len(Direction::South), 1);
    }
}
