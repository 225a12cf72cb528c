mod bank;
mod sca_world;
mod setups;
mod steps;

pub use bank::ScriptedBank;
pub use sca_world::{ScaSystem, ScaWorld};
