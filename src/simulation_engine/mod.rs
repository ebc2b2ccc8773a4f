// simulation_engine/mod.rs
pub mod intersections;
pub mod lanes;
pub mod parking;
pub mod simulation;
pub mod vehicles;

pub use simulation::{default_fleet, random_fleet, run_dual_intersection, Fleet, FleetEntry};
