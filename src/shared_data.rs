// src/shared_data.rs

use crate::communication::coordination_link::ListenerReport;
use crate::control_system::traffic_light_controller::ControllerReport;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, 0 if the clock is before it.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Outcome of one intersection over a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteSummary {
    pub intersection: String,
    pub vehicles: usize,
    pub admitted: usize,
    pub rejected: usize,
    pub reserved: usize,
    pub parked: usize,
    /// Emergency transits announced to the peer.
    pub notices_sent: usize,
    /// Of those, how many made it onto the link.
    pub notices_delivered: usize,
    /// Vehicles still queued when the controller stopped.
    pub still_waiting: usize,
    pub parking_available: usize,
    pub waiting_available: usize,
    pub controller: ControllerReport,
    pub listener: ListenerReport,
}

/// Outcome of a dual-intersection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub started_at: u64,
    pub sites: Vec<SiteSummary>,
}

impl SimulationSummary {
    pub fn site(&self, intersection: &str) -> Option<&SiteSummary> {
        self.sites.iter().find(|s| s.intersection == intersection)
    }

    pub fn total_crossings(&self) -> usize {
        self.sites.iter().map(|s| s.controller.crossings.len()).sum()
    }
}
