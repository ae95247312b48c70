// Centralized configuration for engine parameters

use serde::{Deserialize, Serialize};

// ====================
// Physical Constants
// ====================
/// Standard gravity in m/s^2, applied along -z when gravity is enabled.
pub const STANDARD_GRAVITY: f64 = 9.80665;
/// Substitute mass for particles configured with zero/negative/NaN mass.
pub const MASS_FLOOR: f64 = 0.001;

// ====================
// Integration Parameters
// ====================
/// Default timestep in seconds when a scenario does not specify one.
pub const DEFAULT_DT: f64 = 0.01;
/// Horizontal speed below which a particle counts as stationary for the
/// kinetic/static friction branch.
pub const SPEED_EPSILON: f64 = 1e-9;
/// Residual speed/force threshold for the full-stop check on ground contact.
pub const REST_EPSILON: f64 = 1e-6;

// ====================
// Trail Parameters
// ====================
/// Maximum recorded trail positions per particle (sliding window).
pub const TRAIL_CAPACITY: usize = 200;
/// Record a trail point every N ticks.
pub const TRAIL_INTERVAL: u64 = 5;

// ====================
// Event Parameters
// ====================
/// Absolute tolerance for the == and != condition operators.
pub const CONDITION_TOLERANCE: f64 = 0.01;

/// Global simulation settings, persisted as the `settings` block of a saved
/// scenario. `path` and `axes` are display toggles the engine round-trips but
/// never reads.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_gravity")]
    pub gravity: bool,
    #[serde(default = "default_friction")]
    pub friction: f64,
    #[serde(rename = "deltaT", default = "default_delta_t")]
    pub delta_t: f64,
    #[serde(default = "default_path")]
    pub path: bool,
    #[serde(default = "default_axes")]
    pub axes: bool,
}

fn default_gravity() -> bool {
    true
}

fn default_friction() -> f64 {
    0.2
}

fn default_delta_t() -> f64 {
    DEFAULT_DT
}

fn default_path() -> bool {
    true
}

fn default_axes() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            friction: default_friction(),
            delta_t: default_delta_t(),
            path: default_path(),
            axes: default_axes(),
        }
    }
}
