//! Trigger-condition evaluation against a particle's just-updated state.
//!
//! Each event is a small `{enabled, triggered}` machine: disabled events are
//! never looked at, and a triggered event stays inert until a reset clears
//! the latch. Firing and action execution are driven from the tick loop in
//! `core.rs`; this module only answers "does this event fire now".

use ultraviolet::DVec3;

use crate::config::CONDITION_TOLERANCE;
use crate::particle::{Condition, ConditionLogic, ConditionOp, ConditionVar, ParticleEvent};

/// Map a condition variable to the corresponding post-update scalar.
pub fn scalar(variable: ConditionVar, pos: DVec3, vel: DVec3, t: f64) -> f64 {
    match variable {
        ConditionVar::X => pos.x,
        ConditionVar::Y => pos.y,
        ConditionVar::Z => pos.z,
        ConditionVar::T => t,
        ConditionVar::Vx => vel.x,
        ConditionVar::Vy => vel.y,
        ConditionVar::Vz => vel.z,
        ConditionVar::V => vel.mag(),
    }
}

/// Equality carries an absolute tolerance so a discretely sampled trajectory
/// can actually hit it; inequality is its exact negation.
pub fn condition_holds(cond: &Condition, pos: DVec3, vel: DVec3, t: f64) -> bool {
    let actual = scalar(cond.variable, pos, vel, t);
    match cond.operator {
        ConditionOp::Eq => (actual - cond.value).abs() < CONDITION_TOLERANCE,
        ConditionOp::Ne => (actual - cond.value).abs() >= CONDITION_TOLERANCE,
        ConditionOp::Gt => actual > cond.value,
        ConditionOp::Lt => actual < cond.value,
        ConditionOp::Ge => actual >= cond.value,
        ConditionOp::Le => actual <= cond.value,
    }
}

/// Whether an event fires against the given state. Events with no conditions
/// never fire.
pub fn event_fires(event: &ParticleEvent, pos: DVec3, vel: DVec3, t: f64) -> bool {
    if !event.enabled || event.triggered || event.conditions.is_empty() {
        return false;
    }
    match event.condition_logic {
        ConditionLogic::And => event
            .conditions
            .iter()
            .all(|c| condition_holds(c, pos, vel, t)),
        ConditionLogic::Or => event
            .conditions
            .iter()
            .any(|c| condition_holds(c, pos, vel, t)),
    }
}
