// Bench simulation: governor core against a simulated motor

pub mod plant;
pub mod simulation;

pub use plant::Plant;
pub use simulation::Simulation;
