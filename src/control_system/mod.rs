pub mod events;
pub mod traffic_light_controller;
