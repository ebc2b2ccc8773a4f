// benches/bench_emergency_scan.rs
use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, Criterion, PlotConfiguration,
};
use junction_control::models::direction::Direction;
use junction_control::models::vehicle::{Vehicle, VehicleClass};
use junction_control::simulation_engine::intersections::IntersectionManager;
use std::time::Duration;

// Every lane holds `per_lane` cars; only the WEST head is an emergency, so the
// scan visits all four heads.
fn loaded_intersection(per_lane: usize) -> IntersectionManager {
    let manager = IntersectionManager::with_lane_capacity("F10", per_lane + 1, None);
    let mut id = 0;
    for direction in Direction::ALL {
        for _ in 0..per_lane {
            id += 1;
            manager.add_vehicle(
                direction,
                Vehicle::handle(id, VehicleClass::Car, "F10", "F11", id as u64),
            );
        }
    }
    manager.add_vehicle(
        Direction::West,
        Vehicle::handle(id + 1, VehicleClass::Firetruck, "F10", "F11", 0),
    );
    manager
}

fn bench_emergency_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("emergency_scan");

    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    for &size in [50, 100, 200].iter() {
        let manager = loaded_intersection(size);
        group.bench_function(format!("first_emergency_head_{}", size), |b| {
            b.iter(|| black_box(manager.first_emergency_head()));
        });
        group.bench_function(format!("snapshot_{}", size), |b| {
            b.iter(|| black_box(manager.snapshot()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_emergency_scan);
criterion_main!(benches);
