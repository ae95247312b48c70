// simulation/mod.rs
// Re-exports and module declarations for simulation submodules

pub mod contact;
pub mod core;
pub mod events;
pub mod integrator;
pub use self::core::{Simulation, TickEffects};

#[cfg(test)]
mod tests;
