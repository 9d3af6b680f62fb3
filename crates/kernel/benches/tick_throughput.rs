//! Tick throughput at increasing particle counts.
//!
//! Run with: cargo bench -p droplet-kernel --bench tick_throughput
//! Add `--features gpu` to time the GPU backend as well.

use std::time::Instant;

use droplet_kernel::{
    CpuKernel, FluidPhase, FluidSimulation, PartitionTable, SimulationDomain, SimulationKernel,
    SolverSettings,
};

fn water() -> FluidPhase {
    FluidPhase {
        name: "water".to_string(),
        target_density: 10.0,
        pressure_multiplier: 20.0,
        near_pressure_multiplier: 2.0,
        viscosity_multiplier: 0.1,
        max_speed: 10.0,
        max_force: 50.0,
        gravity: 9.8,
        smoothing_radius: None,
    }
}

fn build(kernel: Box<dyn SimulationKernel + Send>, n: usize) -> FluidSimulation {
    // Keep roughly constant density as the count grows.
    let side = (n as f32 / 150.0).cbrt().max(1.0) * 2.0;
    let domain = SimulationDomain {
        spawn_centre: [0.0; 3],
        spawn_size: [side; 3],
        limit_size: [side * 1.5; 3],
    };
    FluidSimulation::initialize(kernel, domain, SolverSettings::default(), PartitionTable::single(water(), n))
        .expect("benchmark scene is valid")
}

fn time_ticks(label: &str, mut sim: FluidSimulation, ticks: usize) {
    let dt = sim.settings().time_step;
    // Warmup
    for _ in 0..2 {
        sim.tick(dt);
    }
    let start = Instant::now();
    for _ in 0..ticks {
        sim.tick(dt);
    }
    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "{:>6} {:>10} {:>8} {:>12.1} {:>10.3}",
        label,
        sim.live_count(),
        ticks,
        ticks as f64 / elapsed,
        elapsed * 1000.0 / ticks as f64
    );
}

fn main() {
    println!("=== Droplet Tick Throughput ===\n");
    println!(
        "{:>6} {:>10} {:>8} {:>12} {:>10}",
        "Backend", "Particles", "Ticks", "ticks/s", "ms/tick"
    );

    // (particles, ticks) -- fewer ticks at larger counts
    let configs = [(1_225, 100), (4_096, 50), (8_100, 25), (32_768, 10)];

    for &(n, ticks) in &configs {
        let kernel = CpuKernel::new(n).expect("capacity is non-zero");
        time_ticks("cpu", build(Box::new(kernel), n), ticks);

        #[cfg(feature = "gpu")]
        if droplet_kernel::gpu_available() {
            let kernel = droplet_kernel::GpuKernel::new(n).expect("GPU adapter was reported");
            time_ticks("gpu", build(Box::new(kernel), n), ticks);
        }
    }
}
