use junction_control::config::SimulationConfig;
use junction_control::control_system::events::Phase;
use junction_control::global_variables::{INTERSECTION_F10, INTERSECTION_F11};
use junction_control::monitoring::traffic_monitoring_system::{
    generate_report, read_coordination, read_crossings,
};
use junction_control::simulation_engine::{default_fleet, random_fleet, run_dual_intersection};

fn demo_fleets() -> Vec<junction_control::simulation_engine::Fleet> {
    vec![default_fleet(INTERSECTION_F10), default_fleet(INTERSECTION_F11)]
}

#[tokio::test(start_paused = true)]
async fn demo_run_announces_every_emergency_transit_to_the_peer() {
    let summary = run_dual_intersection(&SimulationConfig::default(), demo_fleets())
        .await
        .unwrap();

    let f10 = summary.site(INTERSECTION_F10).unwrap();
    let f11 = summary.site(INTERSECTION_F11).unwrap();

    assert_eq!(f10.notices_sent, 5);
    assert_eq!(f11.notices_sent, 4);
    assert_eq!(f10.notices_delivered, 5);
    assert_eq!(f11.notices_delivered, 4);

    // Each listener hears what its peer announced.
    assert_eq!(f11.listener.received, 5);
    assert_eq!(f11.listener.emergencies, 5);
    assert_eq!(f10.listener.received, 4);
    assert!(f10.listener.failure.is_none());
    assert!(f11.listener.failure.is_none());
}

#[tokio::test(start_paused = true)]
async fn demo_run_conserves_vehicles_and_permits() {
    let config = SimulationConfig::default();
    let summary = run_dual_intersection(&config, demo_fleets()).await.unwrap();

    for site in &summary.sites {
        assert_eq!(site.vehicles, 10);
        assert_eq!(site.admitted, 10);
        assert_eq!(site.rejected, 0);
        // Admitted vehicles either crossed or are still queued.
        assert_eq!(site.controller.crossings.len() + site.still_waiting, site.admitted);
        assert_eq!(site.controller.consistency_violations, 0);
        // Every reservation ended, parked or not.
        assert_eq!(site.parking_available, config.parking_capacity);
        assert_eq!(site.waiting_available, config.waiting_capacity);
        assert!(site.parked <= site.reserved);
    }
    // F10 has five vehicles that may park, F11 four.
    assert_eq!(summary.site(INTERSECTION_F10).unwrap().reserved, 5);
    assert_eq!(summary.site(INTERSECTION_F11).unwrap().reserved, 4);
}

#[tokio::test(start_paused = true)]
async fn only_emergency_vehicles_cross_during_emergency_phases() {
    let summary = run_dual_intersection(&SimulationConfig::default(), demo_fleets())
        .await
        .unwrap();
    assert!(summary.total_crossings() > 0);

    for site in &summary.sites {
        for record in &site.controller.crossings {
            assert_eq!(record.intersection, site.intersection);
            assert_eq!(record.emergency, record.phase == Phase::Emergency);
            if let Some(direction) = record.phase.direction() {
                assert_eq!(record.direction, direction);
            }
        }
        let times: Vec<_> = site.controller.crossings.iter().map(|r| r.at_ms).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test(start_paused = true)]
async fn report_dir_collects_crossings_and_notices() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimulationConfig {
        report_dir: Some(dir.path().to_path_buf()),
        ..SimulationConfig::default()
    };
    let summary = run_dual_intersection(&config, demo_fleets()).await.unwrap();

    assert_eq!(read_crossings(dir.path()).unwrap().len(), summary.total_crossings());
    let notices = read_coordination(dir.path()).unwrap();
    assert_eq!(notices.len(), 9);
    assert!(notices.iter().all(|n| n.emergency && n.movement == "STRAIGHT"));

    let report = generate_report(dir.path()).unwrap();
    assert_eq!(report.notices_by_receiver[INTERSECTION_F11], 5);
    assert_eq!(report.notices_by_receiver[INTERSECTION_F10], 4);
}

#[tokio::test(start_paused = true)]
async fn small_lanes_turn_vehicles_away() {
    let config = SimulationConfig {
        lane_capacity: 1,
        ..SimulationConfig::default()
    };
    let fleets = vec![
        random_fleet(INTERSECTION_F10, INTERSECTION_F11, 40, 3),
        random_fleet(INTERSECTION_F11, INTERSECTION_F10, 40, 4),
    ];
    let summary = run_dual_intersection(&config, fleets).await.unwrap();

    for site in &summary.sites {
        assert_eq!(site.admitted + site.rejected, 40);
        assert!(site.rejected > 0);
        assert!(site.still_waiting <= 4);
        assert_eq!(site.waiting_available, config.waiting_capacity);
        assert_eq!(site.parking_available, config.parking_capacity);
    }
}
