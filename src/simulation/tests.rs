// Engine-level tests: whole-tick behavior through the Simulation facade.

use ultraviolet::DVec3;

use super::Simulation;
use crate::config::{Settings, STANDARD_GRAVITY, TRAIL_CAPACITY, TRAIL_INTERVAL};
use crate::io::SavedScenario;
use crate::particle::{
    ActionKind, Condition, ConditionLogic, ConditionOp, ConditionVar, EventAction, ParticleConfig,
    ParticleEvent,
};

fn settings(gravity: bool, friction: f64, dt: f64) -> Settings {
    Settings {
        gravity,
        friction,
        delta_t: dt,
        ..Settings::default()
    }
}

fn falling_dynamic(id: u64, z0: f64) -> ParticleConfig {
    let mut p = ParticleConfig::new(id, [0.0, 0.0, z0]);
    p.is_massless = false;
    p.mass = 1.0;
    p
}

fn ground_pause_event(id: u64) -> ParticleEvent {
    ParticleEvent {
        id,
        name: "ground".to_string(),
        conditions: vec![Condition {
            variable: ConditionVar::Z,
            operator: ConditionOp::Le,
            value: 0.0,
        }],
        condition_logic: ConditionLogic::And,
        actions: vec![EventAction { kind: ActionKind::Pause, payload: None }],
        triggered: false,
        enabled: true,
    }
}

#[test]
fn massless_projectile_matches_analytic_solution_exactly() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    let mut p = ParticleConfig::new(1, [0.0, 0.0, 50.0]);
    p.v0 = [3.0, 0.0, 10.0];
    sim.add_particle(p);

    for _ in 0..100 {
        sim.step();
        let state = sim.state(1).unwrap();
        let t = state.t;
        let z = 50.0 + 10.0 * t - 0.5 * STANDARD_GRAVITY * t * t;
        assert!((state.pos.x - 3.0 * t).abs() < 1e-12);
        assert!((state.pos.z - z.max(0.0)).abs() < 1e-12);
    }
}

#[test]
fn event_latch_fires_exactly_once_on_ground_contact() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    let mut p = falling_dynamic(1, 2.0);
    p.events.push(ground_pause_event(10));
    sim.add_particle(p);

    let mut fire_ticks = Vec::new();
    for tick in 0..500 {
        let effects = sim.step();
        if !effects.events_fired.is_empty() {
            assert_eq!(effects.events_fired.as_slice(), &[(1, 10)]);
            assert!(effects.pause_requested);
            fire_ticks.push(tick);
        } else {
            assert!(!effects.pause_requested);
        }
        // Latch state is visible to the caller for UI display.
        let triggered = sim.particles[0].events[0].triggered;
        assert_eq!(triggered, !fire_ticks.is_empty());
    }
    assert_eq!(fire_ticks.len(), 1, "event must fire exactly once");
    // It fired on the first tick that ended at z = 0, and the particle was
    // above ground on the tick before.
    let state = sim.state(1).unwrap();
    assert_eq!(state.pos.z, 0.0);
}

#[test]
fn event_fires_within_tolerance_before_exact_contact() {
    // z == 0 with the 0.01 tolerance: a particle parked just above the
    // ground satisfies it immediately.
    let mut sim = Simulation::new(settings(false, 0.0, 0.01));
    let mut p = ParticleConfig::new(1, [0.0, 0.0, 0.005]);
    let mut event = ground_pause_event(1);
    event.conditions[0].operator = ConditionOp::Eq;
    p.events.push(event);
    sim.add_particle(p);

    let effects = sim.step();
    assert_eq!(effects.events_fired.len(), 1);
}

#[test]
fn change_color_action_mutates_the_particle() {
    let mut sim = Simulation::new(settings(false, 0.0, 0.01));
    let mut p = ParticleConfig::new(1, [0.0; 3]);
    p.color = "#111111".to_string();
    p.events.push(ParticleEvent {
        id: 5,
        name: String::new(),
        conditions: vec![Condition {
            variable: ConditionVar::T,
            operator: ConditionOp::Ge,
            value: 0.05,
        }],
        condition_logic: ConditionLogic::Or,
        actions: vec![EventAction {
            kind: ActionKind::ChangeColor,
            payload: Some("#ff0000".to_string()),
        }],
        triggered: false,
        enabled: true,
    });
    sim.add_particle(p);

    let mut seen_change = false;
    for _ in 0..10 {
        let effects = sim.step();
        for (id, color) in &effects.color_changes {
            assert_eq!(*id, 1);
            assert_eq!(color, "#ff0000");
            seen_change = true;
        }
    }
    assert!(seen_change);
    assert_eq!(sim.particles[0].color, "#ff0000");
}

#[test]
fn disabled_event_never_fires() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    let mut p = falling_dynamic(1, 1.0);
    let mut event = ground_pause_event(1);
    event.enabled = false;
    p.events.push(event);
    sim.add_particle(p);

    for _ in 0..300 {
        let effects = sim.step();
        assert!(effects.events_fired.is_empty());
        assert!(!effects.pause_requested);
    }
}

#[test]
fn trail_decimates_and_caps() {
    let mut sim = Simulation::new(settings(false, 0.0, 0.01));
    let mut p = ParticleConfig::new(1, [0.0; 3]);
    p.v0 = [1.0, 0.0, 0.0];
    sim.add_particle(p);

    for _ in 0..1500 {
        sim.step();
    }
    let state = sim.state(1).unwrap();
    assert_eq!(state.trail.len(), TRAIL_CAPACITY);
    // Every entry is a 5th-tick sample, oldest first: consecutive samples
    // are TRAIL_INTERVAL ticks of x-velocity 1 apart.
    let step = TRAIL_INTERVAL as f64 * 0.01;
    for pair in state.trail.iter().collect::<Vec<_>>().windows(2) {
        assert!((pair[1].x - pair[0].x - step).abs() < 1e-9);
    }
}

#[test]
fn reset_reseeds_states_and_clears_latches() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    let mut p = falling_dynamic(1, 1.0);
    p.events.push(ground_pause_event(3));
    sim.add_particle(p);

    while sim.step().events_fired.is_empty() {}
    assert!(sim.particles[0].events[0].triggered);

    sim.reset();
    assert!(!sim.particles[0].events[0].triggered);
    let state = sim.state(1).unwrap();
    assert_eq!(state.pos, DVec3::new(0.0, 0.0, 1.0));
    assert_eq!(state.t, 0.0);
    assert_eq!(state.frame_count, 0);
    assert_eq!(state.trail.len(), 1);
    assert_eq!(sim.frame, 0);

    // The event can fire again after the reset.
    while sim.step().events_fired.is_empty() {}
}

#[test]
fn loaded_scenarios_keep_persisted_latches() {
    // A scenario saved mid-run carries already-fired latches; both load
    // paths must keep them, so a pause event does not re-fire on resume.
    let mut particle = falling_dynamic(1, 0.0);
    let mut event = ground_pause_event(10);
    event.triggered = true;
    particle.events.push(event);
    let scenario = SavedScenario {
        settings: settings(true, 0.0, 0.01),
        particulas: vec![particle],
    };

    let mut fresh = Simulation::from_scenario(scenario.clone());
    assert!(fresh.particles[0].events[0].triggered);
    assert!(fresh.step().events_fired.is_empty());

    let mut reused = Simulation::new(Settings::default());
    reused.load_scenario(scenario);
    assert!(reused.particles[0].events[0].triggered);
    assert!(reused.step().events_fired.is_empty());

    // Only a reset re-arms the event, and it then fires again on contact.
    reused.reset();
    assert!(!reused.particles[0].events[0].triggered);
    assert_eq!(reused.step().events_fired.len(), 1);
}

#[test]
fn update_particle_id_change_leaves_no_orphan_state() {
    let mut sim = Simulation::new(Settings::default());
    sim.add_particle(ParticleConfig::new(1, [0.0; 3]));
    assert!(sim.update_particle(1, |p| p.id = 2));
    assert!(sim.state(1).is_none());
    assert!(sim.state(2).is_some());
    assert_eq!(sim.states.len(), 1);
}

#[test]
fn set_settings_takes_effect_next_tick() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    sim.add_particle(falling_dynamic(1, 10.0));
    sim.step();
    let z_after_fall = sim.state(1).unwrap().pos.z;
    assert!(z_after_fall < 10.0);

    sim.set_settings(settings(false, 0.0, 0.01));
    assert!(!sim.settings.gravity);
    // One more tick drains the carried-over acceleration; after that the
    // velocity must hold steady.
    sim.step();
    let vel_z = sim.state(1).unwrap().vel.z;
    sim.step();
    assert_eq!(sim.state(1).unwrap().vel.z, vel_z);
}

#[test]
fn update_particle_reinitializes_state() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    sim.add_particle(falling_dynamic(1, 5.0));
    for _ in 0..50 {
        sim.step();
    }
    assert!(sim.state(1).unwrap().t > 0.0);

    // Switching integration mode is an edit like any other: full reseed.
    let updated = sim.update_particle(1, |p| {
        p.is_massless = true;
        p.p0 = [1.0, 1.0, 1.0];
    });
    assert!(updated);
    let state = sim.state(1).unwrap();
    assert_eq!(state.t, 0.0);
    assert_eq!(state.pos, DVec3::new(1.0, 1.0, 1.0));
    assert_eq!(state.acc, DVec3::zero());

    assert!(!sim.update_particle(99, |_| {}));
}

#[test]
fn remove_particle_destroys_state() {
    let mut sim = Simulation::new(Settings::default());
    sim.add_particle(ParticleConfig::new(1, [0.0; 3]));
    sim.add_particle(ParticleConfig::new(2, [0.0; 3]));
    assert!(sim.remove_particle(1));
    assert!(!sim.remove_particle(1));
    assert!(sim.state(1).is_none());
    assert!(sim.state(2).is_some());
    assert_eq!(sim.particles.len(), 1);
}

#[test]
fn particles_tick_independently() {
    // One grounded dynamic particle with friction and one kinematic flyer:
    // neither observes the other.
    let mut sim = Simulation::new(settings(true, 0.3, 0.01));
    let mut slider = falling_dynamic(1, 0.0);
    slider.v0 = [2.0, 0.0, 0.0];
    sim.add_particle(slider);
    let mut flyer = ParticleConfig::new(2, [0.0, 0.0, 100.0]);
    flyer.v0 = [0.0, 5.0, 0.0];
    sim.add_particle(flyer);

    let mut solo = Simulation::new(settings(true, 0.3, 0.01));
    let mut slider = falling_dynamic(1, 0.0);
    slider.v0 = [2.0, 0.0, 0.0];
    solo.add_particle(slider);

    for _ in 0..200 {
        sim.step();
        solo.step();
    }
    let paired = sim.state(1).unwrap();
    let alone = solo.state(1).unwrap();
    assert_eq!(paired.pos, alone.pos);
    assert_eq!(paired.vel, alone.vel);

    let flyer_state = sim.state(2).unwrap();
    assert!((flyer_state.pos.y - 5.0 * flyer_state.t).abs() < 1e-12);
}

#[test]
fn zero_mass_particle_is_floored_not_divided_by_zero() {
    let mut sim = Simulation::new(settings(true, 0.0, 0.01));
    let mut p = falling_dynamic(1, 10.0);
    p.mass = 0.0;
    sim.add_particle(p);
    for _ in 0..100 {
        sim.step();
    }
    let state = sim.state(1).unwrap();
    assert!(state.pos.z.is_finite());
    assert!(state.vel.z.is_finite());
    assert!(state.pos.z < 10.0);
}

#[test]
fn pause_is_a_request_not_an_abort() {
    // Two particles whose events both fire on the same tick: the pause
    // request from the first must not stop the second from updating.
    let mut sim = Simulation::new(settings(false, 0.0, 0.01));
    for id in [1u64, 2] {
        let mut p = ParticleConfig::new(id, [0.0; 3]);
        p.v0 = [1.0, 0.0, 0.0];
        p.events.push(ParticleEvent {
            id: 1,
            name: String::new(),
            conditions: vec![Condition {
                variable: ConditionVar::T,
                operator: ConditionOp::Ge,
                value: 0.005,
            }],
            condition_logic: ConditionLogic::And,
            actions: vec![EventAction { kind: ActionKind::Pause, payload: None }],
            triggered: false,
            enabled: true,
        });
        sim.add_particle(p);
    }
    let effects = sim.step();
    assert!(effects.pause_requested);
    assert_eq!(effects.events_fired.len(), 2);
    // Both particles completed the tick.
    for id in [1u64, 2] {
        assert_eq!(sim.state(id).unwrap().frame_count, 1);
        assert!((sim.state(id).unwrap().pos.x - 0.01).abs() < 1e-12);
    }
}
