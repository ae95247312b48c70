// state.rs
// Engine-owned runtime state, one record per active particle, kept in an
// arena keyed by particle id. Creating, resetting, or editing a particle
// reseeds its record from the authoring-time initial conditions.

use std::collections::hash_map;
use std::collections::HashMap;
use std::collections::VecDeque;

use ultraviolet::DVec3;

use crate::config::{TRAIL_CAPACITY, TRAIL_INTERVAL};
use crate::particle::{ParticleConfig, ParticleId};

/// Mutable per-particle record, advanced once per tick.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    pub pos: DVec3,
    pub vel: DVec3,
    /// Previous-step acceleration; input to the next Verlet position step.
    pub acc: DVec3,
    /// Elapsed simulation time for this particle.
    pub t: f64,
    /// Decimated position history, oldest first.
    pub trail: VecDeque<DVec3>,
    pub frame_count: u64,
}

impl RuntimeState {
    /// Fresh state seeded from the particle's initial conditions: the trail
    /// starts with the initial position as its single point.
    pub fn seeded(config: &ParticleConfig) -> Self {
        let pos = DVec3::from(config.p0);
        let mut trail = VecDeque::with_capacity(TRAIL_CAPACITY);
        trail.push_back(pos);
        Self {
            pos,
            vel: DVec3::from(config.v0),
            acc: DVec3::zero(),
            t: 0.0,
            trail,
            frame_count: 0,
        }
    }

    /// Record the current position every `TRAIL_INTERVAL` ticks, dropping the
    /// oldest point once the window is full. Call after `frame_count` has
    /// been incremented for the tick.
    pub fn record_trail(&mut self) {
        if self.frame_count % TRAIL_INTERVAL != 0 {
            return;
        }
        if self.trail.len() >= TRAIL_CAPACITY {
            self.trail.pop_front();
        }
        self.trail.push_back(self.pos);
    }

    pub fn speed(&self) -> f64 {
        self.vel.mag()
    }
}

/// Arena of runtime states, exclusively owned by the engine. The id keys are
/// opaque: stable and unique, nothing more.
#[derive(Default)]
pub struct StateArena {
    states: HashMap<ParticleId, RuntimeState>,
}

impl StateArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or re-create) the state for a particle.
    pub fn create(&mut self, config: &ParticleConfig) {
        self.states.insert(config.id, RuntimeState::seeded(config));
    }

    /// Reseed an existing particle's state from its initial conditions.
    pub fn reset(&mut self, config: &ParticleConfig) {
        self.create(config);
    }

    pub fn destroy(&mut self, id: ParticleId) -> bool {
        self.states.remove(&id).is_some()
    }

    /// Drop every state and reseed one per config, in lock-step with the
    /// given particle list.
    pub fn rebuild(&mut self, configs: &[ParticleConfig]) {
        self.states.clear();
        for config in configs {
            self.create(config);
        }
    }

    pub fn get(&self, id: ParticleId) -> Option<&RuntimeState> {
        self.states.get(&id)
    }

    pub fn get_mut(&mut self, id: ParticleId) -> Option<&mut RuntimeState> {
        self.states.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, ParticleId, RuntimeState> {
        self.states.iter()
    }

    pub fn iter_mut(&mut self) -> hash_map::IterMut<'_, ParticleId, RuntimeState> {
        self.states.iter_mut()
    }
}
