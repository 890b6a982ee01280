mod autopilot;
mod circuit;
mod countdown;
mod effects_backend;
mod net;
mod physics;
mod state;

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::autopilot::RaceEvent;
use crate::circuit::CircuitConfig;
use crate::state::{RaceResults, RaceState};

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "race-pilot",
    version,
    about = "Autonomous race cars on a rapier circuit, with a spectator WebSocket feed"
)]
struct Opts {
    // OPTIONS -------------------------------------------------------------------------------------
    /// Circuit JSON file (OPTIONAL: if not set, uses the built-in two-car rectangle)
    #[clap(short, long)]
    circuit: Option<PathBuf>,

    /// Fixed simulation rate in Hz
    #[clap(short, long, default_value = "60")]
    tick_hz: u32,

    /// Stop after this many simulated seconds even if cars are still racing
    #[clap(short, long)]
    duration: Option<f32>,

    /// Address of the spectator WebSocket feed
    #[clap(short, long, default_value = "0.0.0.0:9001")]
    listen: String,

    /// Write the final standings to this JSON file
    #[clap(short, long)]
    results: Option<PathBuf>,
}

fn export_results(path: &Path, results: &RaceResults) -> anyhow::Result<()> {
    let fh = File::create(path).context(format!("Failed to create results file {}!", path.display()))?;
    serde_json::to_writer_pretty(fh, results)
        .context(format!("Failed to write results file {}!", path.display()))?;
    log::info!("Results written to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    if opts.tick_hz == 0 {
        anyhow::bail!("--tick-hz must be at least 1");
    }

    // PRE-PROCESSING ------------------------------------------------------------------------------
    let circuit = match &opts.circuit {
        Some(path) => {
            log::info!("Reading circuit from {}", path.display());
            CircuitConfig::load(path)?
        }
        None => CircuitConfig::default(),
    };

    let state = Arc::new(Mutex::new(
        RaceState::build(&circuit).context("Failed to set up the race!")?,
    ));

    // Spectator feed
    let feed = {
        let state = Arc::clone(&state);
        let addr = opts.listen.clone();
        tokio::spawn(async move {
            if let Err(e) = net::start_websocket_server(addr, state).await {
                log::error!("Spectator feed stopped: {:#}", e);
            }
        })
    };

    // EXECUTION -----------------------------------------------------------------------------------
    // Fixed timestep
    let dt = 1.0 / opts.tick_hz as f32;
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
        }

        let mut race = state.lock().await;
        let updates = race.step(dt);

        // first finisher: results are ready, write what we have so far
        let results_ready = updates
            .iter()
            .any(|u| matches!(u.event, RaceEvent::Finished { results_ready: true, .. }));
        if results_ready {
            if let Some(path) = &opts.results {
                if let Err(e) = export_results(path, &race.results()) {
                    log::error!("{:#}", e);
                }
            }
        }

        race.broadcast_updates(&updates);
        race.broadcast_snapshot();

        if race.session().is_complete() {
            log::info!("All cars finished after {:.1}s", race.session().elapsed());
            break;
        }
        if let Some(limit) = opts.duration {
            if race.session().elapsed() >= limit {
                log::info!("Stopping after {:.1}s of race clock", limit);
                break;
            }
        }
    }

    feed.abort();

    // POST-PROCESSING -----------------------------------------------------------------------------
    let results = state.lock().await.results();
    if results.standings.is_empty() {
        log::warn!("Nobody finished");
    }
    if let Some(path) = &opts.results {
        export_results(path, &results)?;
    }

    Ok(())
}
