use crate::communication::coordination_link::{PeerNotice, PeerNotificationHandler};
use crate::control_system::events::{ControllerEvent, CrossingRecord};
use crate::errors::{ControlError, ControlResult};
use crate::global_variables::{COORDINATION_CSV, CROSSINGS_CHART_PNG, CROSSINGS_CSV};
use crate::models::direction::Direction;
use crate::shared_data::current_timestamp;
use log::{info, warn};
use plotters::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingCsvRecord {
    pub timestamp: u64,
    pub intersection: String,
    pub vehicle_id: i32,
    pub class: String,
    pub direction: String,
    pub phase: String,
    pub emergency: bool,
    pub origin: String,
    pub destination: String,
    pub at_ms: u64,
}

impl From<&CrossingRecord> for CrossingCsvRecord {
    fn from(record: &CrossingRecord) -> Self {
        Self {
            timestamp: current_timestamp(),
            intersection: record.intersection.clone(),
            vehicle_id: record.vehicle_id,
            class: record.class.clone(),
            direction: record.direction.to_string(),
            phase: record.phase.to_string(),
            emergency: record.emergency,
            origin: record.origin.clone(),
            destination: record.destination.clone(),
            at_ms: record.at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationCsvRecord {
    pub timestamp: u64,
    pub receiver: String,
    pub vehicle_id: i32,
    pub priority: i32,
    pub emergency: bool,
    pub class: String,
    pub origin: String,
    pub destination: String,
    pub approach: String,
    pub movement: String,
}

impl From<&PeerNotice> for CoordinationCsvRecord {
    fn from(notice: &PeerNotice) -> Self {
        let message = &notice.message;
        Self {
            timestamp: current_timestamp(),
            receiver: notice.receiver.clone(),
            vehicle_id: message.vehicle_id(),
            priority: message.priority(),
            emergency: message.is_emergency(),
            class: message.class().to_string(),
            origin: message.origin().to_string(),
            destination: message.destination().to_string(),
            approach: message.approach().to_string(),
            movement: message.movement().to_string(),
        }
    }
}

/// Appends one record, writing the header only when the file is new.
fn log_to_csv<T: Serialize>(path: &Path, record: &T) -> ControlResult<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// A file that does not exist yet reads as no records.
fn read_csv<T: DeserializeOwned>(path: &Path) -> ControlResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

pub fn log_crossing(dir: &Path, record: &CrossingRecord) -> ControlResult<()> {
    log_to_csv(&dir.join(CROSSINGS_CSV), &CrossingCsvRecord::from(record))
}

pub fn log_peer_notice(dir: &Path, notice: &PeerNotice) -> ControlResult<()> {
    log_to_csv(&dir.join(COORDINATION_CSV), &CoordinationCsvRecord::from(notice))
}

pub fn read_crossings(dir: &Path) -> ControlResult<Vec<CrossingCsvRecord>> {
    read_csv(&dir.join(CROSSINGS_CSV))
}

pub fn read_coordination(dir: &Path) -> ControlResult<Vec<CoordinationCsvRecord>> {
    read_csv(&dir.join(COORDINATION_CSV))
}

/// Peer notification handler that appends every notice to `coordination.csv`.
/// Without a directory it only counts.
#[derive(Debug, Clone, Default)]
pub struct NoticeRecorder {
    dir: Option<PathBuf>,
    recorded: usize,
}

impl NoticeRecorder {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, recorded: 0 }
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl PeerNotificationHandler for NoticeRecorder {
    fn on_notice(&mut self, notice: &PeerNotice) {
        self.recorded += 1;
        if let Some(dir) = &self.dir {
            if let Err(e) = log_peer_notice(dir, notice) {
                warn!("Error logging coordination notice: {}", e);
            }
        }
    }
}

/// Counts of what an event stream carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventTally {
    pub phase_changes: usize,
    pub crossings: usize,
    pub violations: usize,
}

/// Consumes controller events until every sender is dropped, appending each
/// crossing to `crossings.csv` in `dir`.
pub fn spawn_event_recorder(
    dir: PathBuf,
    mut events: UnboundedReceiver<ControllerEvent>,
) -> JoinHandle<EventTally> {
    tokio::spawn(async move {
        let mut tally = EventTally::default();
        while let Some(event) = events.recv().await {
            match event {
                ControllerEvent::PhaseChanged { .. } => tally.phase_changes += 1,
                ControllerEvent::VehicleCrossed(record) => {
                    tally.crossings += 1;
                    if let Err(e) = log_crossing(&dir, &record) {
                        warn!("Error logging crossing of vehicle {}: {}", record.vehicle_id, e);
                    }
                }
                ControllerEvent::ConsistencyViolation {
                    intersection,
                    vehicle_id,
                } => {
                    tally.violations += 1;
                    warn!(
                        "[Monitor] {} reported vehicle {} missing from its lanes",
                        intersection, vehicle_id
                    );
                }
            }
        }
        tally
    })
}

/// Totals read back from the CSV logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringReport {
    pub crossings: usize,
    pub emergency_crossings: usize,
    pub crossings_by_intersection: BTreeMap<String, usize>,
    pub crossings_by_direction: BTreeMap<String, usize>,
    pub notices: usize,
    pub notices_by_receiver: BTreeMap<String, usize>,
}

pub fn generate_report(dir: &Path) -> ControlResult<MonitoringReport> {
    let crossings = read_crossings(dir)?;
    let notices = read_coordination(dir)?;

    let mut report = MonitoringReport {
        crossings: crossings.len(),
        notices: notices.len(),
        ..MonitoringReport::default()
    };
    for record in &crossings {
        if record.emergency {
            report.emergency_crossings += 1;
        }
        *report
            .crossings_by_intersection
            .entry(record.intersection.clone())
            .or_default() += 1;
        *report
            .crossings_by_direction
            .entry(record.direction.clone())
            .or_default() += 1;
    }
    for notice in &notices {
        *report
            .notices_by_receiver
            .entry(notice.receiver.clone())
            .or_default() += 1;
    }

    info!("Report Summary:");
    info!(
        "Crossings: {} records ({} emergency)",
        report.crossings, report.emergency_crossings
    );
    for (intersection, count) in &report.crossings_by_intersection {
        info!("  {}: {} crossings", intersection, count);
    }
    info!("Coordination notices: {} records", report.notices);
    Ok(report)
}

fn chart_error<E: std::fmt::Display>(e: E) -> ControlError {
    ControlError::Chart(e.to_string())
}

/// Bar chart of crossings per approach direction, all intersections together.
/// Returns the path of the PNG written into `dir`.
pub fn render_crossing_chart(dir: &Path) -> ControlResult<PathBuf> {
    let crossings = read_crossings(dir)?;
    let mut counts = [0u32; 4];
    for record in &crossings {
        if let Ok(direction) = record.direction.parse::<Direction>() {
            counts[direction.index()] += 1;
        }
    }
    let max = counts.iter().copied().max().unwrap_or(0);

    fs::create_dir_all(dir)?;
    let path = dir.join(CROSSINGS_CHART_PNG);
    let root = BitMapBackend::new(&path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Crossings per approach", ("sans-serif", 20))
        .margin(40)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d((0u32..4u32).into_segmented(), 0u32..max + 1)
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Approach")
        .y_desc("Crossings")
        .x_label_formatter(&|segment| match segment {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => Direction::ALL
                .get(*i as usize)
                .map(|d| d.as_str().to_string())
                .unwrap_or_default(),
            SegmentValue::Last => String::new(),
        })
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.filled())
                .margin(20)
                .data(counts.iter().enumerate().map(|(i, c)| (i as u32, *c))),
        )
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    info!("Crossing chart saved to {}", path.display());
    Ok(dir.join(CROSSINGS_CHART_PNG))
}
