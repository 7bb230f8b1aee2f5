//! One run: generation, influencer seeding, `steps` update rounds, then ghetto
//! detection on the final state.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::SimConfig;
use crate::dynamics::{OpinionEngine, Polarization, StepReport};
use crate::error::Result;
use crate::export::{EDGES_FILE, GHETTOS_FILE, SnapshotWriter, write_edges, write_ghettos};
use crate::generate::GraphBuilder;
use crate::ghettos::{Ghetto, detect_ghettos};
use crate::network::Network;
use crate::seeding::{InfluencerSeeder, Influencers};

/// Written next to `edges.csv` when the topology can change during a run.
pub const FINAL_EDGES_FILE: &str = "edges_final.csv";

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub nodes: usize,
    pub initial_edges: usize,
    pub final_edges: usize,
    pub steps: u64,
    pub influencers: Influencers,
    pub ghettos: Vec<Ghetto>,
    pub polarization: Polarization,
    pub snapshots_written: usize,
    pub snapshots_skipped: usize,
}

pub struct Simulation {
    config: SimConfig,
    pub network: Network,
    pub influencers: Influencers,
    engine: OpinionEngine,
    initial_edges: usize,
}

impl Simulation {
    /// Builds the network and seeds influencers. The configuration is
    /// sanitized first.
    pub fn new(config: &SimConfig) -> Result<Self> {
        let config = config.sanitized();
        let mut rng = SmallRng::seed_from_u64(config.seed);

        let mut network = GraphBuilder::new(&config.graph).generate(&config.agents, &mut rng);
        let influencers = InfluencerSeeder::new(&config.influencers).seed(&mut network, &mut rng)?;

        Ok(Self::assemble(config, network, influencers))
    }

    /// Runs the dynamics on a prepared network; no generation or seeding.
    pub fn from_network(config: &SimConfig, network: Network) -> Self {
        Self::assemble(config.sanitized(), network, Influencers::default())
    }

    fn assemble(config: SimConfig, network: Network, influencers: Influencers) -> Self {
        let engine = OpinionEngine::from_config(&config);
        let initial_edges = network.edge_count();
        Simulation {
            config,
            network,
            influencers,
            engine,
            initial_edges,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn steps_taken(&self) -> u64 {
        self.engine.steps_taken()
    }

    pub fn step(&mut self) -> StepReport {
        self.engine.step(&mut self.network)
    }

    /// Runs the remaining scheduled rounds without writing anything.
    pub fn run(&mut self) -> Vec<StepReport> {
        let remaining = self.config.steps.saturating_sub(self.steps_taken());
        (0..remaining).map(|_| self.step()).collect()
    }

    pub fn ghettos(&self) -> Vec<Ghetto> {
        detect_ghettos(&self.network, &self.config.ghettos)
    }

    fn topology_changes(&self) -> bool {
        self.config.weights.adaptive || self.config.dynamics.rewiring_prob > 0.0
    }

    /// Full run with CSV output under `dir`: `edges.csv`, one
    /// `nodes_step_<t>.csv` per snapshot step and `ghettos.csv`.
    pub fn run_to(&mut self, dir: &Path) -> Result<RunSummary> {
        fs::create_dir_all(dir)?;
        let weighted = self.config.graph.weighted;
        write_edges(&dir.join(EDGES_FILE), &self.network, weighted)?;

        let output = &self.config.output;
        let mut writer = output
            .write_snapshots
            .then(|| SnapshotWriter::spawn(dir.to_path_buf(), output.channel_capacity, output.skip_when_busy));
        let interval = output.snapshot_interval.max(1);
        let steps = self.config.steps;

        for t in self.steps_taken()..=steps {
            if let Some(writer) = writer.as_mut() {
                if t == steps {
                    writer.submit_required(t, &self.network)?;
                } else if t % interval == 0 {
                    writer.submit(t, &self.network)?;
                }
            }
            if t == steps {
                break;
            }
            self.step();
        }

        let (written, skipped) = match writer {
            Some(writer) => {
                let skipped = writer.skipped();
                (writer.finish()?, skipped)
            }
            None => (0, 0),
        };

        if self.topology_changes() {
            write_edges(&dir.join(FINAL_EDGES_FILE), &self.network, weighted)?;
        }
        let ghettos = self.ghettos();
        write_ghettos(&dir.join(GHETTOS_FILE), &ghettos)?;

        let summary = RunSummary {
            nodes: self.network.len(),
            initial_edges: self.initial_edges,
            final_edges: self.network.edge_count(),
            steps: self.steps_taken(),
            influencers: self.influencers.clone(),
            ghettos,
            polarization: Polarization::measure(&self.network),
            snapshots_written: written,
            snapshots_skipped: skipped,
        };
        info!(
            dir = %dir.display(),
            steps = summary.steps,
            snapshots = summary.snapshots_written,
            ghettos = summary.ghettos.len(),
            mean_abs_opinion = summary.polarization.mean_abs_opinion,
            "run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.graph.nodes = 120;
        config.steps = 15;
        config.influencers.positive = 4;
        config.influencers.negative = 4;
        config.influencers.neutral = 2;
        config
    }

    #[test]
    fn new_seeds_requested_influencers() {
        let sim = Simulation::new(&small_config()).unwrap();
        assert_eq!(sim.network.len(), 120);
        assert_eq!(sim.influencers.len(), 10);
        for &v in &sim.influencers.positive {
            assert_eq!(sim.network.agent(v).opinion, 1.0);
        }
    }

    #[test]
    fn run_stops_after_configured_steps() {
        let mut sim = Simulation::new(&small_config()).unwrap();
        assert_eq!(sim.run().len(), 15);
        assert!(sim.run().is_empty());
        assert_eq!(sim.steps_taken(), 15);
    }

    #[test]
    fn run_to_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        config.output.snapshot_interval = 4;
        let mut sim = Simulation::new(&config).unwrap();
        let summary = sim.run_to(dir.path()).unwrap();

        assert_eq!(summary.steps, 15);
        // steps 0, 4, 8, 12 and the final 15
        assert_eq!(summary.snapshots_written, 5);
        assert!(dir.path().join("nodes_step_15.csv").exists());
        assert!(!dir.path().join("nodes_step_14.csv").exists());
        assert!(dir.path().join(EDGES_FILE).exists());
        assert!(dir.path().join(GHETTOS_FILE).exists());
        assert!(!dir.path().join(FINAL_EDGES_FILE).exists());

        let rows = crate::export::read_ghettos(&dir.path().join(GHETTOS_FILE)).unwrap();
        let members: usize = summary.ghettos.iter().map(|g| g.len()).sum();
        assert_eq!(rows.len(), members);
    }

    #[test]
    fn zero_fallback_still_connects_every_node() {
        let mut config = small_config();
        config.graph.radius = 0.0;
        config.graph.fallback_neighbors = 0;
        let sim = Simulation::new(&config).unwrap();
        assert_eq!(sim.config().graph.fallback_neighbors, 1);
        for u in 0..sim.network.len() {
            assert!(sim.network.degree(u) >= 1, "node {u} is isolated");
        }
    }

    #[test]
    fn adaptive_runs_record_final_topology() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        config.graph.weighted = true;
        config.weights.adaptive = true;
        config.weights.allow_removal = true;
        config.output.write_snapshots = false;
        let mut sim = Simulation::new(&config).unwrap();
        let summary = sim.run_to(dir.path()).unwrap();

        assert_eq!(summary.snapshots_written, 0);
        assert!(dir.path().join(FINAL_EDGES_FILE).exists());
        assert!(summary.final_edges <= summary.initial_edges);
    }
}
