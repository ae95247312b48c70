// particle.rs
// Authoring-time particle data: initial conditions, formulas, forces, events.
// These records deserialize in the exact shape the scenario files use; the
// engine-owned runtime state lives in state.rs.

use serde::{Deserialize, Serialize};

use crate::config::MASS_FLOOR;

pub type ParticleId = u64;

/// One applied force: a formula per axis, evaluated at the particle's current
/// runtime state each tick. Only dynamic (massed) particles use these.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Force {
    pub id: u64,
    pub vec: [String; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionVar {
    #[serde(rename = "x")]
    X,
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "z")]
    Z,
    #[serde(rename = "t")]
    T,
    #[serde(rename = "vx")]
    Vx,
    #[serde(rename = "vy")]
    Vy,
    #[serde(rename = "vz")]
    Vz,
    #[serde(rename = "v")]
    V,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "!=")]
    Ne,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Condition {
    pub variable: ConditionVar,
    pub operator: ConditionOp,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionLogic {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl Default for ConditionLogic {
    fn default() -> Self {
        ConditionLogic::And
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "pause")]
    Pause,
    #[serde(rename = "changeColor")]
    ChangeColor,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// For `ChangeColor`, the new color.
    #[serde(default)]
    pub payload: Option<String>,
}

/// A one-shot trigger: when its conditions hold against the just-updated
/// state, the latch flips and the actions run once. Inert until the latch is
/// cleared by a reset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticleEvent {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "conditionLogic", default)]
    pub condition_logic: ConditionLogic,
    #[serde(default)]
    pub actions: Vec<EventAction>,
    #[serde(default)]
    pub triggered: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Integration mode, derived from the configured `isMassless` flag so the
/// integrator can match exhaustively instead of probing optional fields.
pub enum Motion<'a> {
    /// Position is a closed-form function of time: per-axis offset formulas
    /// on top of `p0 + v0*t` (plus the gravity term on z).
    Kinematic { fx: &'a str, fy: &'a str, fz: &'a str },
    /// Velocity-Verlet over the summed applied forces.
    Dynamic { mass: f64, forces: &'a [Force] },
}

/// Authoring-time particle record. Field names follow the persisted scenario
/// schema (`p0_fis`, `isMassless`, ...); runtime-only fields that old saves
/// carry (`curr_fis`, `trail_three`, `enSuelo`, ...) are ignored on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticleConfig {
    pub id: ParticleId,
    #[serde(rename = "p0_fis")]
    pub p0: [f64; 3],
    #[serde(rename = "v0_fis", default)]
    pub v0: [f64; 3],
    #[serde(default = "default_formula")]
    pub fx: String,
    #[serde(default = "default_formula")]
    pub fy: String,
    #[serde(default = "default_formula")]
    pub fz: String,
    #[serde(default = "default_mass")]
    pub mass: f64,
    #[serde(rename = "isMassless", default)]
    pub is_massless: bool,
    #[serde(default)]
    pub forces: Vec<Force>,
    #[serde(default)]
    pub events: Vec<ParticleEvent>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_formula() -> String {
    "0".to_string()
}

fn default_mass() -> f64 {
    1.0
}

fn default_color() -> String {
    "#ffffff".to_string()
}

impl ParticleConfig {
    /// A kinematic particle at rest at `p0`, matching the editor's defaults
    /// for a freshly added particle.
    pub fn new(id: ParticleId, p0: [f64; 3]) -> Self {
        Self {
            id,
            p0,
            v0: [0.0; 3],
            fx: default_formula(),
            fy: default_formula(),
            fz: default_formula(),
            mass: default_mass(),
            is_massless: true,
            forces: Vec::new(),
            events: Vec::new(),
            color: default_color(),
        }
    }

    pub fn motion(&self) -> Motion<'_> {
        if self.is_massless {
            Motion::Kinematic {
                fx: &self.fx,
                fy: &self.fy,
                fz: &self.fz,
            }
        } else {
            Motion::Dynamic {
                mass: self.effective_mass(),
                forces: &self.forces,
            }
        }
    }

    /// Configured mass, floored to keep the force-to-acceleration division
    /// finite for zero/negative/NaN entries.
    pub fn effective_mass(&self) -> f64 {
        if self.mass > 0.0 {
            self.mass
        } else {
            MASS_FLOOR
        }
    }
}
