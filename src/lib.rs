pub mod communication;
pub mod config;
pub mod control_system;
pub mod errors;
pub mod global_variables;
pub mod models;
pub mod monitoring;
pub mod shared_data;
pub mod simulation_engine;
