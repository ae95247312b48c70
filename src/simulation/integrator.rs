//! Per-particle integration: one tick for one particle.
//!
//! Kinematic particles get a closed-form position (no error accumulation);
//! dynamic particles get a Velocity-Verlet step over their summed applied
//! forces, with ground contact and friction folded into the new
//! acceleration. Both modes share the final ground clamp and trail/time
//! bookkeeping.

use ultraviolet::DVec3;

use super::contact;
use crate::config::{REST_EPSILON, STANDARD_GRAVITY};
use crate::formula;
use crate::particle::{Force, Motion, ParticleConfig};
use crate::state::RuntimeState;

/// Advance one particle's state by `dt`. Reads only this particle's previous
/// state, so ticks fan out safely across particles.
pub fn advance(
    config: &ParticleConfig,
    state: &mut RuntimeState,
    dt: f64,
    gravity_enabled: bool,
    friction_coeff: f64,
) {
    let t_new = state.t + dt;
    let g = if gravity_enabled { STANDARD_GRAVITY } else { 0.0 };

    match config.motion() {
        Motion::Kinematic { fx, fy, fz } => kinematic_step(config, state, t_new, g, fx, fy, fz),
        Motion::Dynamic { mass, forces } => {
            verlet_step(state, t_new, dt, g, mass, forces, friction_coeff)
        }
    }

    // Safety net for both modes: never end a tick below the ground.
    if state.pos.z <= 0.0 {
        state.pos.z = 0.0;
        if state.vel.z < 0.0 {
            state.vel.z = 0.0;
        }
    }

    state.t = t_new;
    state.frame_count += 1;
    state.record_trail();
}

/// Closed-form kinematics. The offset formulas read the previous tick's
/// position, not the one being computed; saved scenarios depend on this
/// ordering, so it stays one step lagged even though the dynamic mode
/// evaluates forces at the new position.
fn kinematic_step(
    config: &ParticleConfig,
    state: &mut RuntimeState,
    t_new: f64,
    g: f64,
    fx: &str,
    fy: &str,
    fz: &str,
) {
    let prev = state.pos;
    let p0 = DVec3::from(config.p0);
    let v0 = DVec3::from(config.v0);

    state.pos = DVec3::new(
        p0.x + formula::eval(fx, t_new, prev.x, prev.y, prev.z) + v0.x * t_new,
        p0.y + formula::eval(fy, t_new, prev.x, prev.y, prev.z) + v0.y * t_new,
        p0.z + formula::eval(fz, t_new, prev.x, prev.y, prev.z) + v0.z * t_new
            - 0.5 * g * t_new * t_new,
    );
    // Velocity stays as seeded; acceleration is reported for display only.
    state.acc = DVec3::new(0.0, 0.0, -g);
}

/// Velocity-Verlet with ground contact:
/// position from the previous acceleration, forces at the new position,
/// velocity from the trapezoidal average of old and new acceleration.
fn verlet_step(
    state: &mut RuntimeState,
    t_new: f64,
    dt: f64,
    g: f64,
    mass: f64,
    forces: &[Force],
    friction_coeff: f64,
) {
    let a_prev = state.acc;
    let vel_prev = state.vel;

    let mut pos = state.pos + vel_prev * dt + a_prev * (0.5 * dt * dt);

    let sum_f = sum_applied_forces(forces, t_new, pos);

    let contact = contact::resolve(pos.z, sum_f, vel_prev, mass, g, friction_coeff, dt);
    if contact.on_ground {
        pos.z = 0.0;
    }

    let resultant = DVec3::new(
        sum_f.x + contact.friction_x,
        sum_f.y + contact.friction_y,
        sum_f.z,
    );
    let mut a_new = resultant / mass - DVec3::new(0.0, 0.0, g);
    if contact.supported() {
        // The ground cannot pull the particle down past resting contact.
        a_new.z = a_new.z.max(0.0);
    }

    let mut vel = vel_prev + (a_prev + a_new) * (0.5 * dt);
    if contact.supported() {
        let v_hor = vel.x.hypot(vel.y);
        let force_hor = resultant.x.hypot(resultant.y);
        // Full stop once friction has eaten both the motion and the drive,
        // so the particle does not drift at numerical-noise speeds.
        if v_hor < REST_EPSILON && force_hor < REST_EPSILON {
            vel.x = 0.0;
            vel.y = 0.0;
        }
        if vel.z < 0.0 {
            vel.z = 0.0;
        }
    }

    state.pos = pos;
    state.vel = vel;
    state.acc = a_new;
}

/// Sum every configured force's per-axis formulas at `(t, pos)`.
fn sum_applied_forces(forces: &[Force], t: f64, pos: DVec3) -> DVec3 {
    let mut sum = DVec3::zero();
    for force in forces {
        sum.x += formula::eval(&force.vec[0], t, pos.x, pos.y, pos.z);
        sum.y += formula::eval(&force.vec[1], t, pos.x, pos.y, pos.z);
        sum.z += formula::eval(&force.vec[2], t, pos.x, pos.y, pos.z);
    }
    sum
}
