// simulation/core.rs
// The Simulation owns the particle list, the runtime-state arena, and the
// global settings, and advances everything one fixed timestep per call.

use std::collections::HashMap;

use rayon::prelude::*;
use smallvec::SmallVec;

use super::{events, integrator};
use crate::config::Settings;
use crate::io::SavedScenario;
use crate::particle::{ActionKind, ParticleConfig, ParticleId};
use crate::profile_scope;
use crate::state::{RuntimeState, StateArena};

/// Everything a tick asks of the caller, returned as a batch instead of
/// callbacks. Color changes are already applied to the owned configs and
/// repeated here for the renderer; the pause request only takes effect when
/// the caller's next scheduling decision honors it.
#[derive(Clone, Debug, Default)]
pub struct TickEffects {
    pub pause_requested: bool,
    /// `(particle id, event id)` per event that latched this tick.
    pub events_fired: SmallVec<[(ParticleId, u64); 4]>,
    pub color_changes: SmallVec<[(ParticleId, String); 4]>,
}

#[derive(Clone, Debug, Default)]
struct ParticleOutcome {
    pause: bool,
    fired: SmallVec<[(ParticleId, u64); 2]>,
    colors: SmallVec<[(ParticleId, String); 2]>,
}

pub struct Simulation {
    pub particles: Vec<ParticleConfig>,
    pub states: StateArena,
    pub settings: Settings,
    pub frame: usize,
}

impl Simulation {
    pub fn new(settings: Settings) -> Self {
        Self {
            particles: Vec::new(),
            states: StateArena::new(),
            settings,
            frame: 0,
        }
    }

    /// Build a simulation from a loaded scenario document. Every particle
    /// gets a fresh runtime state; persisted event latches are kept as
    /// saved and only a reset clears them.
    pub fn from_scenario(scenario: SavedScenario) -> Self {
        let mut sim = Self::new(scenario.settings);
        for particle in scenario.particulas {
            sim.add_particle(particle);
        }
        sim
    }

    /// Replace settings and particles with a loaded scenario, reseeding all
    /// runtime state. Persisted event latches are kept as saved, same as
    /// `from_scenario`. Called only with an already-parsed document, so a
    /// malformed file can never leave the simulation half-applied.
    pub fn load_scenario(&mut self, scenario: SavedScenario) {
        self.settings = scenario.settings;
        self.particles = scenario.particulas;
        self.states.rebuild(&self.particles);
        self.frame = 0;
    }

    pub fn scenario(&self) -> SavedScenario {
        SavedScenario {
            settings: self.settings,
            particulas: self.particles.clone(),
        }
    }

    pub fn add_particle(&mut self, particle: ParticleConfig) {
        self.states.create(&particle);
        self.particles.push(particle);
    }

    pub fn remove_particle(&mut self, id: ParticleId) -> bool {
        let before = self.particles.len();
        self.particles.retain(|p| p.id != id);
        self.states.destroy(id);
        self.particles.len() != before
    }

    /// Edit a particle's configuration. Any edit reinitializes the runtime
    /// state from the (possibly new) initial conditions, which also covers
    /// toggling between kinematic and dynamic mode.
    pub fn update_particle(
        &mut self,
        id: ParticleId,
        edit: impl FnOnce(&mut ParticleConfig),
    ) -> bool {
        let Some(particle) = self.particles.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        edit(particle);
        if particle.id != id {
            // The edit renamed the particle; drop the state keyed by the
            // old id so the arena does not accumulate orphans.
            self.states.destroy(id);
        }
        self.states.reset(particle);
        true
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Reseed every runtime state and clear every event latch.
    pub fn reset(&mut self) {
        for particle in &mut self.particles {
            for event in &mut particle.events {
                event.triggered = false;
            }
        }
        self.states.rebuild(&self.particles);
        self.frame = 0;
    }

    pub fn state(&self, id: ParticleId) -> Option<&RuntimeState> {
        self.states.get(id)
    }

    /// Advance every particle by one timestep and evaluate its events.
    ///
    /// Each particle reads only its own previous state and config, so the
    /// work fans out over particles; the formula cache is the only shared
    /// structure and it is read-mostly.
    pub fn step(&mut self) -> TickEffects {
        profile_scope!("sim_step");
        let dt = self.settings.delta_t;
        let gravity = self.settings.gravity;
        let friction = self.settings.friction;

        let mut by_id: HashMap<ParticleId, &mut RuntimeState> =
            self.states.iter_mut().map(|(id, s)| (*id, s)).collect();
        let mut jobs: Vec<(&mut ParticleConfig, &mut RuntimeState)> = self
            .particles
            .iter_mut()
            .filter_map(|p| by_id.remove(&p.id).map(|s| (p, s)))
            .collect();

        let outcomes: Vec<ParticleOutcome> = jobs
            .par_iter_mut()
            .map(|(particle, state)| {
                integrator::advance(particle, state, dt, gravity, friction);
                run_events(particle, state)
            })
            .collect();

        self.frame += 1;

        let mut effects = TickEffects::default();
        for outcome in outcomes {
            effects.pause_requested |= outcome.pause;
            effects.events_fired.extend(outcome.fired);
            effects.color_changes.extend(outcome.colors);
        }
        effects
    }
}

/// Evaluate one particle's events against its just-updated state, latch and
/// execute whatever fires. Actions run in order; a later color change wins.
fn run_events(particle: &mut ParticleConfig, state: &RuntimeState) -> ParticleOutcome {
    let mut outcome = ParticleOutcome::default();
    let id = particle.id;

    for event in &mut particle.events {
        if !events::event_fires(event, state.pos, state.vel, state.t) {
            continue;
        }
        event.triggered = true;
        outcome.fired.push((id, event.id));
        for action in &event.actions {
            match action.kind {
                ActionKind::Pause => outcome.pause = true,
                ActionKind::ChangeColor => {
                    if let Some(color) = &action.payload {
                        outcome.colors.push((id, color.clone()));
                    }
                }
            }
        }
    }
    for (_, color) in &outcome.colors {
        particle.color = color.clone();
    }
    outcome
}
