// controller_demo_main.rs
//
// Two controllers, F10 and F11, coordinating one emergency vehicle over a
// coordination link.
use junction_control::communication::coordination_link::{
    coordination_link, CoordinationReceiver, CoordinationSender,
};
use junction_control::communication::messages::CoordinationMessage;
use junction_control::control_system::traffic_light_controller::{PhaseController, PhaseTiming};
use junction_control::global_variables::{INTERSECTION_F10, INTERSECTION_F11};
use junction_control::models::direction::{Direction, Movement};
use junction_control::models::vehicle::{Vehicle, VehicleClass};
use junction_control::simulation_engine::intersections::IntersectionManager;
use log::{error, info};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::time::Duration;

async fn run_f10(mut to_peer: CoordinationSender<DuplexStream>) {
    let name = INTERSECTION_F10;
    let intersection = Arc::new(IntersectionManager::new(name, None));
    let mut controller = PhaseController::new(
        Arc::clone(&intersection),
        PhaseTiming::new(Duration::from_secs(2), Duration::from_secs(2)),
    );

    let ambulance = Vehicle::handle(1, VehicleClass::Ambulance, name, INTERSECTION_F11, 0);
    intersection.add_vehicle(Direction::North, Arc::clone(&ambulance));

    match CoordinationMessage::for_transit(&ambulance, Direction::North, Movement::Straight) {
        Ok(message) => {
            info!(
                "[{}] Sending emergency intent for vehicle {} from {} to {}",
                name,
                message.vehicle_id(),
                message.origin(),
                message.destination()
            );
            if !to_peer.send(&message).await {
                error!("[{}] Failed to send emergency intent", name);
            }
        }
        Err(e) => error!("[{}] Cannot build emergency intent: {}", name, e),
    }

    // Preempt locally and cross.
    if let Some(vehicle) = controller.check_emergency() {
        controller.cross_vehicle(&vehicle).await;
    }
    info!("[{}] Emergency vehicle has crossed. Exiting controller.", name);
    to_peer.close().await;
}

async fn run_f11(mut from_peer: CoordinationReceiver<DuplexStream>) {
    let name = INTERSECTION_F11;
    match from_peer.receive().await {
        Ok(incoming) => {
            info!(
                "[{}] Received intent: vehicle {}, emergency={}, from {} to {}",
                name,
                incoming.vehicle_id(),
                if incoming.is_emergency() { "yes" } else { "no" },
                incoming.origin(),
                incoming.destination()
            );
            if incoming.is_emergency() {
                info!(
                    "[{}] Clearing paths for incoming emergency from {} to {}",
                    name,
                    incoming.origin(),
                    incoming.destination()
                );
            }
        }
        Err(e) => error!("[{}] Failed to receive message: {}", name, e),
    }
    info!("[{}] Controller exiting.", name);
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let (f10_to_f11, f11_from_f10) = coordination_link();
    let f10 = tokio::spawn(run_f10(f10_to_f11));
    let f11 = tokio::spawn(run_f11(f11_from_f10));

    let (f10, f11) = tokio::join!(f10, f11);
    if let Err(e) = f10.and(f11) {
        error!("Controller task failed: {}", e);
    }
    info!("Controller demo completed.");
}
