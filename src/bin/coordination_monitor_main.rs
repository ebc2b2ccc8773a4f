// coordination_monitor_main.rs
//
// Follows the mirrored coordination queues of a running simulation and logs
// every notice to CSV. Usage: coordination_monitor_main [report_dir] [amqp_url]
use junction_control::communication::amqp_link::listen_coordination_queue;
use junction_control::global_variables::{
    coordination_queue, AMQP_URL, INTERSECTION_F10, INTERSECTION_F11,
};
use junction_control::monitoring::traffic_monitoring_system::{generate_report, NoticeRecorder};
use log::{error, info};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let dir = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));
    let amqp_url = args.next().unwrap_or_else(|| AMQP_URL.to_string());
    if let Err(e) = std::fs::create_dir_all(&dir) {
        error!("Cannot create {}: {}", dir.display(), e);
        return;
    }

    let routes = [
        (INTERSECTION_F10, INTERSECTION_F11),
        (INTERSECTION_F11, INTERSECTION_F10),
    ];
    let mut listeners = Vec::new();
    for (from, to) in routes {
        let url = amqp_url.clone();
        let recorder = NoticeRecorder::new(Some(dir.clone()));
        listeners.push(tokio::task::spawn_blocking(move || {
            let queue = coordination_queue(from, to);
            if let Err(e) = listen_coordination_queue(&url, &queue, to, recorder) {
                error!("Error in coordination listener for {}: {}", queue, e);
            }
        }));
    }

    for listener in listeners {
        if let Err(e) = listener.await {
            error!("Coordination listener task failed: {}", e);
        }
    }

    match generate_report(&dir) {
        Ok(report) => info!("Monitored {} coordination notices", report.notices),
        Err(e) => error!("Error generating report: {}", e),
    }
}
