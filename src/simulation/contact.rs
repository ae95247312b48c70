//! Ground contact and friction resolution for the dynamic integrator.
//!
//! The ground is the fixed plane z = 0. The normal force exists only while
//! the net non-normal vertical force would push the particle through the
//! plane; friction is bounded by `coefficient * normal` and never induces or
//! reverses motion on its own.

use ultraviolet::DVec3;

use crate::config::SPEED_EPSILON;

/// Outcome of the contact test for one Verlet step.
#[derive(Clone, Copy, Debug, Default)]
pub struct Contact {
    pub on_ground: bool,
    /// Normal force magnitude; zero while airborne or lifting off.
    pub normal: f64,
    /// Horizontal friction force to add to the applied-force sum.
    pub friction_x: f64,
    pub friction_y: f64,
}

impl Contact {
    /// True when the ground is actively supporting the particle, which is
    /// what gates the acceleration/velocity clamps.
    pub fn supported(&self) -> bool {
        self.on_ground && self.normal > 0.0
    }
}

/// Resolve ground contact for a particle whose Verlet position step landed at
/// height `pos_z`, given the summed applied forces and the pre-update
/// velocity. The caller clamps `pos.z` to 0 when `on_ground` is set.
pub fn resolve(
    pos_z: f64,
    sum_f: DVec3,
    vel_prev: DVec3,
    mass: f64,
    g: f64,
    friction_coeff: f64,
    dt: f64,
) -> Contact {
    let on_ground = pos_z <= 0.0;
    if !on_ground {
        return Contact::default();
    }

    let weight = mass * g;
    // Normal only pushes back: a net upward force means lift-off.
    let net_z = sum_f.z - weight;
    let normal = net_z.min(0.0).abs();

    let mut contact = Contact {
        on_ground: true,
        normal,
        friction_x: 0.0,
        friction_y: 0.0,
    };
    if normal <= 0.0 || friction_coeff <= 0.0 {
        return contact;
    }

    let friction_max = friction_coeff * normal;
    let force_hor = sum_f.x.hypot(sum_f.y);
    let v_hor = vel_prev.x.hypot(vel_prev.y);

    if v_hor > SPEED_EPSILON {
        // Kinetic: oppose the current horizontal velocity. The mass*v/dt
        // term lets friction arrest all residual motion within one tick
        // instead of overshooting past zero.
        let applied = friction_max.min(force_hor + mass * v_hor / dt);
        contact.friction_x = -vel_prev.x / v_hor * applied;
        contact.friction_y = -vel_prev.y / v_hor * applied;
    } else if force_hor > SPEED_EPSILON {
        // Static: oppose the applied force, cancelling up to but never
        // exceeding it.
        let applied = friction_max.min(force_hor);
        contact.friction_x = -sum_f.x / force_hor * applied;
        contact.friction_y = -sum_f.y / force_hor * applied;
    }
    contact
}
