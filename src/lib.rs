//! Agent-based simulation of enhanced biological phosphorus removal in a
//! sequencing batch reactor.
//!
//! Agents are lumps of phosphate-accumulating (PAO), glycogen-accumulating
//! (GAO) or ordinary heterotrophic (OHO) organisms. Each timestep every agent
//! takes up or releases substrate according to its variant's kinetics, and
//! the [`reactor::Reactor`] applies the fill, draw and aeration of the current
//! phase. The number of agents per variant stays fixed: an agent that grows
//! past its division threshold splits into a record reclaimed from the
//! smallest agents.

pub mod agent;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod gao;
pub mod oho;
pub mod pao;
pub mod population;
pub mod random;
pub mod reactor;
pub mod trajectory;
pub mod variant;

pub use engine::Engine;
pub use error::{SimError, SimResult};
