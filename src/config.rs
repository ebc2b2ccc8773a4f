use crate::errors::{ControlError, ControlResult};
use crate::global_variables::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for a dual-intersection run, loaded from JSON.
///
/// Every field has a default, so a partial file (or `{}`) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Intersection codes. The driver wires the first two together.
    pub intersections: Vec<String>,
    pub parking_capacity: usize,
    pub waiting_capacity: usize,
    pub lane_capacity: usize,
    pub phase_duration_ms: u64,
    pub crossing_delay_ms: u64,
    pub parking_occupancy_ms: u64,
    /// Wall time represented by one logical arrival tick.
    pub arrival_tick_ms: u64,
    /// How long controllers keep serving after the last vehicle actor ends.
    pub drain_ms: u64,
    /// Where the CSV log, report and chart go. No monitoring output if unset.
    pub report_dir: Option<PathBuf>,
    /// Mirror coordination messages to RabbitMQ when set.
    pub amqp_url: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            intersections: vec![INTERSECTION_F10.to_string(), INTERSECTION_F11.to_string()],
            parking_capacity: DEFAULT_PARKING_CAPACITY,
            waiting_capacity: DEFAULT_WAITING_CAPACITY,
            lane_capacity: DEFAULT_LANE_CAPACITY,
            phase_duration_ms: DEFAULT_PHASE_DURATION_MS,
            crossing_delay_ms: DEFAULT_CROSSING_DELAY_MS,
            parking_occupancy_ms: DEFAULT_PARKING_OCCUPANCY_MS,
            arrival_tick_ms: DEFAULT_ARRIVAL_TICK_MS,
            drain_ms: DEFAULT_DRAIN_MS,
            report_dir: None,
            amqp_url: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> ControlResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> ControlResult<Self> {
        let config: SimulationConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ControlResult<()> {
        if self.intersections.len() != 2 {
            return Err(ControlError::Config(format!(
                "exactly two intersections are coordinated, got {}",
                self.intersections.len()
            )));
        }
        if self.intersections[0] == self.intersections[1] {
            return Err(ControlError::Config(
                "intersection codes must be distinct".to_string(),
            ));
        }
        let capacities = [
            ("parking_capacity", self.parking_capacity),
            ("waiting_capacity", self.waiting_capacity),
            ("lane_capacity", self.lane_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ControlError::Config(format!("{} must be positive", name)));
            }
        }
        let durations = [
            ("phase_duration_ms", self.phase_duration_ms),
            ("crossing_delay_ms", self.crossing_delay_ms),
            ("arrival_tick_ms", self.arrival_tick_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ControlError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn phase_duration(&self) -> Duration {
        Duration::from_millis(self.phase_duration_ms)
    }

    pub fn crossing_delay(&self) -> Duration {
        Duration::from_millis(self.crossing_delay_ms)
    }

    pub fn parking_occupancy(&self) -> Duration {
        Duration::from_millis(self.parking_occupancy_ms)
    }

    pub fn arrival_tick(&self) -> Duration {
        Duration::from_millis(self.arrival_tick_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = SimulationConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.phase_duration(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let config =
            SimulationConfig::from_json_str(r#"{ "parking_capacity": 2, "drain_ms": 10 }"#)
                .unwrap();
        assert_eq!(config.parking_capacity, 2);
        assert_eq!(config.drain(), Duration::from_millis(10));
        assert_eq!(config.waiting_capacity, DEFAULT_WAITING_CAPACITY);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = SimulationConfig::from_json_str(r#"{ "waiting_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
    }

    #[test]
    fn single_intersection_is_rejected() {
        let err = SimulationConfig::from_json_str(r#"{ "intersections": ["F10"] }"#).unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
    }

    #[test]
    fn bad_json_surfaces_as_json_error() {
        let err = SimulationConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ControlError::Json(_)));
    }
}
