// main.rs
use junction_control::config::SimulationConfig;
use junction_control::global_variables::{INTERSECTION_F10, INTERSECTION_F11};
use junction_control::monitoring::traffic_monitoring_system::{
    generate_report, render_crossing_chart,
};
use junction_control::simulation_engine::{default_fleet, run_dual_intersection};
use log::{error, info, warn};
use std::process::ExitCode;

/// Runs the F10/F11 demo. An optional first argument names a JSON config file.
#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimulationConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Cannot load config {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => SimulationConfig::default(),
    };

    let fleets = vec![
        default_fleet(INTERSECTION_F10),
        default_fleet(INTERSECTION_F11),
    ];
    let summary = match run_dual_intersection(&config, fleets).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for site in &summary.sites {
        info!(
            "[{}] {} crossings ({} emergency), {} still waiting, {} parked, {} notices sent, {} received",
            site.intersection,
            site.controller.crossings.len(),
            site.controller.emergency_crossings,
            site.still_waiting,
            site.parked,
            site.notices_sent,
            site.listener.received
        );
    }

    if let Some(dir) = &config.report_dir {
        if let Err(e) = generate_report(dir) {
            warn!("Error generating report: {}", e);
        }
        if let Err(e) = render_crossing_chart(dir) {
            warn!("Error rendering crossing chart: {}", e);
        }
    }
    ExitCode::SUCCESS
}
