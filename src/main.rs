// Headless scenario runner: load a scenario file, tick it for a fixed number
// of steps (or until an event pauses it), print where everything ended up.

use std::process::ExitCode;

use particle_lab::io;
use particle_lab::simulation::Simulation;

const DEFAULT_TICKS: u64 = 1000;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: particle_lab <scenario.json[.gz]> [ticks]");
        return ExitCode::FAILURE;
    };
    let ticks = match args.next() {
        Some(raw) => match raw.parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("invalid tick count: {raw}");
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_TICKS,
    };

    let scenario = match io::load_scenario(&path) {
        Ok(scenario) => scenario,
        Err(err) => {
            log::error!("failed to load {path}: {err}");
            eprintln!("failed to load {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut sim = Simulation::from_scenario(scenario);
    log::info!(
        "loaded {path}: {} particles, dt={}, gravity={}, friction={}",
        sim.particles.len(),
        sim.settings.delta_t,
        sim.settings.gravity,
        sim.settings.friction
    );

    let mut executed = 0u64;
    let mut paused_by = Vec::new();
    for _ in 0..ticks {
        let effects = sim.step();
        executed += 1;
        for (particle_id, event_id) in &effects.events_fired {
            log::info!("event {event_id} fired on particle {particle_id} at frame {}", sim.frame);
        }
        for (particle_id, color) in &effects.color_changes {
            log::debug!("particle {particle_id} recolored to {color}");
        }
        if effects.pause_requested {
            paused_by.extend(effects.events_fired.iter().copied());
            break;
        }
    }

    println!(
        "ran {executed} ticks (t = {:.4} s)",
        executed as f64 * sim.settings.delta_t
    );
    if !paused_by.is_empty() {
        for (particle_id, event_id) in &paused_by {
            println!("paused by event {event_id} on particle {particle_id}");
        }
    }
    for particle in &sim.particles {
        let Some(state) = sim.state(particle.id) else {
            continue;
        };
        println!(
            "particle {}: pos ({:.4}, {:.4}, {:.4})  vel ({:.4}, {:.4}, {:.4})",
            particle.id,
            state.pos.x,
            state.pos.y,
            state.pos.z,
            state.vel.x,
            state.vel.y,
            state.vel.z
        );
    }

    ExitCode::SUCCESS
}
