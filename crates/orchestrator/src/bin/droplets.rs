//! Headless droplet runner
//!
//! Usage: `droplets <scene.json> [frames]`
//!
//! Loads a scene, replays its scripted commands at their frames, and logs
//! population and per-phase density statistics while the session runs.

use std::process::ExitCode;

use droplet_orchestrator::{create_session, SceneConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FRAMES: u64 = 600;
const FRAME_DT: f32 = 1.0 / 60.0;
const STATS_EVERY: u64 = 60;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "droplets=info,droplet_kernel=info,droplet_orchestrator=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(scene_path) = args.next() else {
        eprintln!("usage: droplets <scene.json> [frames]");
        return ExitCode::from(2);
    };
    let frames = match args.next().map(|f| f.parse::<u64>()) {
        None => DEFAULT_FRAMES,
        Some(Ok(frames)) => frames,
        Some(Err(e)) => {
            eprintln!("invalid frame count: {e}");
            return ExitCode::from(2);
        }
    };

    let config = match SceneConfig::load(&scene_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let mut session = match create_session(&config) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(scene = %config.name, "session not started: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut script = config.script.clone();
    script.sort_by_key(|c| c.frame);
    let mut script = script.into_iter().peekable();

    for frame in 0..frames {
        while let Some(scripted) = script.next_if(|c| c.frame <= frame) {
            session.queue(scripted.command);
        }
        let report = session.advance(FRAME_DT);

        if report.spawned > 0 || report.removed > 0 {
            tracing::info!(
                frame,
                spawned = report.spawned,
                removed = report.removed,
                live = report.live_count,
                "population changed"
            );
        }
        if frame % STATS_EVERY == 0 || frame + 1 == frames {
            for stats in session.phase_stats() {
                tracing::info!(
                    frame,
                    phase = %stats.name,
                    count = stats.count,
                    mean_density = stats.mean_density,
                    mean_speed = stats.mean_speed,
                    "phase stats"
                );
            }
        }
    }

    session.teardown();
    ExitCode::SUCCESS
}
