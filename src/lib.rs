//! Opinion polarization on a spatial scale-free network.
//!
//! A run grows a spatial preferential-attachment graph, pins a few
//! fixed-opinion influencers, evolves everyone else under bounded-confidence
//! averaging with stubbornness, influence and exposure, and finally extracts
//! "ghettos": connected clusters that agree and live close together.

pub mod config;
pub mod dynamics;
pub mod error;
pub mod export;
pub mod generate;
pub mod ghettos;
pub mod network;
pub mod seeding;
pub mod simulation;
pub mod spatial;

pub use config::SimConfig;
pub use dynamics::{OpinionEngine, Polarization, StepReport, bounded_confidence_update};
pub use error::{Result, SimError};
pub use generate::GraphBuilder;
pub use ghettos::{DisjointSet, Ghetto, GhettoDetector, detect_ghettos};
pub use network::{Agent, Network};
pub use seeding::{InfluencerSeeder, Influencers};
pub use simulation::{RunSummary, Simulation};
pub use spatial::KdTree;

/// Runs the whole pipeline and writes its CSV files to `config.output.dir`.
pub fn run(config: &SimConfig) -> Result<RunSummary> {
    let mut sim = Simulation::new(config)?;
    let dir = sim.config().output.dir.clone();
    sim.run_to(&dir)
}
