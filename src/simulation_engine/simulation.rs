// simulation.rs
use crate::communication::amqp_link::start_coordination_mirror;
use crate::communication::coordination_link::{
    coordination_link, spawn_link_writer, spawn_listener, ListenerReport,
};
use crate::communication::messages::CoordinationMessage;
use crate::config::SimulationConfig;
use crate::control_system::events::ControllerEvent;
use crate::control_system::traffic_light_controller::{
    ControllerHandle, ControllerReport, PhaseController, PhaseTiming,
};
use crate::errors::{ControlError, ControlResult};
use crate::global_variables::{coordination_queue, INTERSECTION_F10, INTERSECTION_F11};
use crate::models::direction::{Direction, Movement};
use crate::models::vehicle::{Vehicle, VehicleClass, VehicleHandle, VehicleId};
use crate::monitoring::traffic_monitoring_system::{spawn_event_recorder, NoticeRecorder};
use crate::shared_data::{current_timestamp, SimulationSummary, SiteSummary};
use crate::simulation_engine::intersections::IntersectionManager;
use crate::simulation_engine::parking::ResourcePool;
use crate::simulation_engine::vehicles::{ActorOutcome, ActorTiming, VehicleActor};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// A vehicle and the approach lane it joins at its origin.
#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub vehicle: VehicleHandle,
    pub lane: Direction,
}

/// Vehicles generated at one intersection.
#[derive(Debug, Clone)]
pub struct Fleet {
    pub site: String,
    pub entries: Vec<FleetEntry>,
}

impl Fleet {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, vehicle: VehicleHandle, lane: Direction) {
        self.entries.push(FleetEntry { vehicle, lane });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ten-vehicle demo fleet of F10 (ids 1..=10) or F11 (ids 101..=110).
/// Any other site gets an empty fleet.
pub fn default_fleet(site: &str) -> Fleet {
    use Direction::{East, North, South, West};
    use VehicleClass::{Ambulance, Bike, Bus, Car, Firetruck, Tractor};

    let defs: &[(VehicleId, VehicleClass, &str, u64, Direction)] = match site {
        INTERSECTION_F10 => &[
            (1, Ambulance, INTERSECTION_F11, 1, North),
            (2, Firetruck, INTERSECTION_F11, 2, East),
            (3, Firetruck, INTERSECTION_F11, 3, North),
            (4, Bike, INTERSECTION_F10, 2, West),
            (5, Car, INTERSECTION_F10, 4, South),
            (6, Firetruck, INTERSECTION_F11, 5, South),
            (7, Bus, INTERSECTION_F11, 6, East),
            (8, Ambulance, INTERSECTION_F11, 3, South),
            (9, Tractor, INTERSECTION_F10, 7, West),
            (10, Car, INTERSECTION_F11, 8, North),
        ],
        INTERSECTION_F11 => &[
            (101, Ambulance, INTERSECTION_F10, 1, South),
            (102, Firetruck, INTERSECTION_F11, 2, East),
            (103, Bike, INTERSECTION_F11, 3, West),
            (104, Firetruck, INTERSECTION_F10, 2, East),
            (105, Firetruck, INTERSECTION_F10, 4, South),
            (106, Firetruck, INTERSECTION_F10, 5, North),
            (107, Ambulance, INTERSECTION_F11, 6, South),
            (108, Bus, INTERSECTION_F10, 7, West),
            (109, Car, INTERSECTION_F10, 8, North),
            (110, Tractor, INTERSECTION_F11, 9, East),
        ],
        _ => &[],
    };

    let mut fleet = Fleet::new(site);
    for &(id, class, destination, arrival, lane) in defs {
        fleet.push(Vehicle::handle(id, class, site, destination, arrival), lane);
    }
    fleet
}

const RANDOM_CLASSES: [VehicleClass; 8] = [
    VehicleClass::Ambulance,
    VehicleClass::Firetruck,
    VehicleClass::Bus,
    VehicleClass::Car,
    VehicleClass::Tractor,
    VehicleClass::Bike,
    VehicleClass::Truck,
    VehicleClass::Van,
];

/// `n` vehicles with ids `1..=n`, random class, lane and arrival tick in
/// `0..n`, each heading either to `peer` or staying at `site`. The same seed
/// always yields the same fleet.
pub fn random_fleet(site: &str, peer: &str, n: usize, seed: u64) -> Fleet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fleet = Fleet::new(site);
    for i in 0..n {
        let class = RANDOM_CLASSES[rng.random_range(0..RANDOM_CLASSES.len())];
        let destination = if rng.random_bool(0.5) { peer } else { site };
        let arrival = rng.random_range(0..n.max(1) as u64);
        let lane = Direction::ALL[rng.random_range(0..Direction::ALL.len())];
        let id = VehicleId::try_from(i + 1).unwrap_or(VehicleId::MAX);
        fleet.push(Vehicle::handle(id, class, site, destination, arrival), lane);
    }
    fleet
}

/// Where an admitted emergency transit is announced.
#[derive(Clone)]
struct Announcer {
    site: String,
    outbox: UnboundedSender<CoordinationMessage>,
    mirror: Option<UnboundedSender<CoordinationMessage>>,
    sent: Arc<AtomicUsize>,
}

impl Announcer {
    fn announce(&self, vehicle: &Vehicle, lane: Direction) {
        let message = match CoordinationMessage::for_transit(vehicle, lane, Movement::Straight) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] Cannot announce {}: {}", self.site, vehicle, e);
                return;
            }
        };
        info!(
            "[{}] Notifying peer controller about emergency vehicle {} from {} to {}",
            self.site,
            vehicle.id(),
            vehicle.origin(),
            vehicle.destination()
        );
        if let Some(mirror) = &self.mirror {
            if mirror.send(message.clone()).is_err() {
                debug!("[{}] Coordination mirror is gone", self.site);
            }
        }
        if self.outbox.send(message).is_ok() {
            self.sent.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!("[{}] Coordination link writer is gone", self.site);
        }
    }
}

/// Everything one intersection runs during a dual-intersection simulation.
struct Site {
    name: String,
    pool: Arc<ResourcePool>,
    manager: Arc<IntersectionManager>,
    controller: ControllerHandle,
    announcer: Announcer,
    writer: JoinHandle<usize>,
    listener: JoinHandle<ListenerReport>,
    mirror: Option<JoinHandle<amiquip::Result<()>>>,
}

fn spawn_actors(site: &Site, fleet: Fleet, timing: ActorTiming) -> Vec<JoinHandle<ActorOutcome>> {
    info!("[{}] Spawning {} vehicle tasks", site.name, fleet.len());
    fleet
        .entries
        .into_iter()
        .map(|FleetEntry { vehicle, lane }| {
            let manager = Arc::clone(&site.manager);
            let announcer = site.announcer.clone();
            let name = site.name.clone();
            VehicleActor::new(vehicle, timing)
                .with_lots(vec![Arc::clone(&site.pool)])
                .with_access(Arc::new(move |vehicle: &VehicleHandle| {
                    info!(
                        "[{}] {} requesting intersection access via lane {}",
                        name, vehicle, lane
                    );
                    let admitted = manager.add_vehicle(lane, Arc::clone(vehicle));
                    if admitted && vehicle.is_emergency() && vehicle.is_transit() {
                        announcer.announce(vehicle, lane);
                    }
                    admitted
                }))
                .spawn()
        })
        .collect()
}

/// Runs both intersections of `config` side by side until every vehicle of
/// `fleets` has been handled, then drains, stops the controllers, closes the
/// links and reports.
///
/// Fleets are matched to intersections by site name; a fleet for an unknown
/// site is a configuration error. Emergency vehicles heading to the other
/// intersection are announced to it over the coordination link once they are
/// queued. With `report_dir` set, crossings and received notices are also
/// appended to CSV files there.
pub async fn run_dual_intersection(
    config: &SimulationConfig,
    fleets: Vec<Fleet>,
) -> ControlResult<SimulationSummary> {
    config.validate()?;
    let names = [config.intersections[0].clone(), config.intersections[1].clone()];
    for fleet in &fleets {
        if !names.contains(&fleet.site) {
            return Err(ControlError::Config(format!(
                "fleet for unknown intersection {}",
                fleet.site
            )));
        }
    }
    if let Some(dir) = &config.report_dir {
        std::fs::create_dir_all(dir)?;
    }
    let started_at = current_timestamp();
    info!(
        "[Main] Starting dual-intersection traffic simulation ({}, {})",
        names[0], names[1]
    );

    let (event_tx, event_rx) = unbounded_channel::<ControllerEvent>();
    let recorder = config
        .report_dir
        .clone()
        .map(|dir| spawn_event_recorder(dir, event_rx));

    let (a_to_b_tx, a_to_b_rx) = coordination_link();
    let (b_to_a_tx, b_to_a_rx) = coordination_link();
    let timing = PhaseTiming::new(config.phase_duration(), config.crossing_delay());

    let mut sites = Vec::with_capacity(2);
    for (index, (sender, receiver)) in [(a_to_b_tx, b_to_a_rx), (b_to_a_tx, a_to_b_rx)]
        .into_iter()
        .enumerate()
    {
        let name = names[index].clone();
        let peer = names[1 - index].clone();
        info!("[{}] Controller starting", name);

        let pool = Arc::new(ResourcePool::new(
            name.clone(),
            config.parking_capacity,
            config.waiting_capacity,
        ));
        let manager = Arc::new(IntersectionManager::with_lane_capacity(
            name.clone(),
            config.lane_capacity,
            Some(Arc::clone(&pool)),
        ));
        let mut controller = PhaseController::new(Arc::clone(&manager), timing);
        if recorder.is_some() {
            controller = controller.with_events(event_tx.clone());
        }

        let (outbox, outbox_rx) = unbounded_channel();
        let writer = spawn_link_writer(format!("{}->{}", name, peer), sender, outbox_rx);
        let listener = spawn_listener(
            name.clone(),
            receiver,
            NoticeRecorder::new(config.report_dir.clone()),
        );
        let (mirror_tap, mirror) = match &config.amqp_url {
            Some(url) => {
                let (tap, publisher) =
                    start_coordination_mirror(url.clone(), coordination_queue(&name, &peer));
                (Some(tap), Some(publisher))
            }
            None => (None, None),
        };

        sites.push(Site {
            announcer: Announcer {
                site: name.clone(),
                outbox,
                mirror: mirror_tap,
                sent: Arc::new(AtomicUsize::new(0)),
            },
            name,
            pool,
            manager,
            controller: controller.spawn(),
            writer,
            listener,
            mirror,
        });
    }
    drop(event_tx);

    let actor_timing = ActorTiming {
        arrival_tick: config.arrival_tick(),
        parking_occupancy: config.parking_occupancy(),
    };
    let mut actors: Vec<Vec<JoinHandle<ActorOutcome>>> = vec![Vec::new(), Vec::new()];
    let mut vehicle_counts = [0usize; 2];
    for fleet in fleets {
        let index = if fleet.site == sites[0].name { 0 } else { 1 };
        vehicle_counts[index] += fleet.len();
        actors[index].extend(spawn_actors(&sites[index], fleet, actor_timing));
    }

    let mut outcomes: Vec<Vec<ActorOutcome>> = vec![Vec::new(), Vec::new()];
    for (index, handles) in actors.into_iter().enumerate() {
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes[index].push(outcome),
                Err(e) => warn!("[{}] Vehicle task failed: {}", sites[index].name, e),
            }
        }
        info!("[{}] All vehicle tasks have finished", sites[index].name);
    }

    for site in &sites {
        let snapshot = site.manager.snapshot();
        info!(
            "[{}] Final intersection state: {}",
            site.name,
            serde_json::to_string(&snapshot)?
        );
    }

    sleep(config.drain()).await;

    let mut summary = SimulationSummary {
        started_at,
        sites: Vec::with_capacity(2),
    };
    let mut listeners = Vec::with_capacity(2);
    for (index, site) in sites.into_iter().enumerate() {
        let Site {
            name,
            pool,
            manager,
            controller,
            announcer,
            writer,
            listener,
            mirror,
        } = site;

        let controller = controller.stop().await.unwrap_or_else(|e| {
            warn!("[{}] Controller task failed: {}", name, e);
            ControllerReport {
                intersection: name.clone(),
                ..ControllerReport::default()
            }
        });
        let notices_sent = announcer.sent.load(Ordering::Relaxed);
        // Last outbox and mirror senders; the writer closes the link after this.
        drop(announcer);
        let notices_delivered = writer.await.unwrap_or_else(|e| {
            warn!("[{}] Link writer failed: {}", name, e);
            0
        });
        if let Some(mirror) = mirror {
            match mirror.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{}] Coordination mirror failed: {}", name, e),
                Err(e) => warn!("[{}] Coordination mirror task failed: {}", name, e),
            }
        }

        let site_outcomes = &outcomes[index];
        summary.sites.push(SiteSummary {
            intersection: name.clone(),
            vehicles: vehicle_counts[index],
            admitted: site_outcomes.iter().filter(|o| o.admitted).count(),
            rejected: site_outcomes.iter().filter(|o| !o.admitted).count(),
            reserved: site_outcomes.iter().filter(|o| o.reserved).count(),
            parked: site_outcomes.iter().filter(|o| o.parked).count(),
            notices_sent,
            notices_delivered,
            still_waiting: manager.total_waiting(),
            parking_available: pool.available_parking(),
            waiting_available: pool.available_waiting(),
            controller,
            listener: ListenerReport {
                name,
                ..ListenerReport::default()
            },
        });
        listeners.push(listener);
    }

    // Both writers have closed their links, so every listener sees the end.
    for (site, listener) in summary.sites.iter_mut().zip(listeners) {
        match listener.await {
            Ok(report) => site.listener = report,
            Err(e) => warn!("[{}] Listener task failed: {}", site.intersection, e),
        }
    }

    if let Some(recorder) = recorder {
        match recorder.await {
            Ok(tally) => debug!("[Main] Event recorder finished: {:?}", tally),
            Err(e) => warn!("[Main] Event recorder failed: {}", e),
        }
    }
    info!("[Main] Simulation finished");
    Ok(summary)
}
