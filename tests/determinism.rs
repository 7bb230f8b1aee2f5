//! Determinism verification tests
//!
//! A fixed seed and configuration must reproduce the same graph, opinion
//! trajectories, ghettos and output files.

use opinion_ghettos::config::{InfluencerSelection, NeighborSearch, SimConfig};
use opinion_ghettos::{Ghetto, Simulation};

fn config(seed: u64) -> SimConfig {
    let mut config = SimConfig::default();
    config.seed = seed;
    config.steps = 40;
    config.graph.nodes = 300;
    config.graph.weighted = true;
    config.weights.adaptive = true;
    config.dynamics.rewiring_prob = 0.02;
    config.influencers.positive = 8;
    config.influencers.negative = 8;
    config.influencers.neutral = 2;
    config
}

fn trajectory(config: &SimConfig) -> (Vec<(usize, usize, f64)>, Vec<Vec<f64>>, Vec<Ghetto>) {
    let mut sim = Simulation::new(config).unwrap();
    let edges = sim.network.edges();
    let mut opinions = Vec::new();
    for _ in 0..config.steps {
        sim.step();
        opinions.push(sim.network.agents().map(|a| a.opinion).collect());
    }
    (edges, opinions, sim.ghettos())
}

#[test]
fn same_seed_reproduces_the_run() {
    let a = trajectory(&config(42));
    let b = trajectory(&config(42));
    assert_eq!(a.0, b.0, "edge sets differ");
    assert_eq!(a.1, b.1, "opinion trajectories differ");
    assert_eq!(a.2, b.2, "ghettos differ");
}

#[test]
fn different_seeds_produce_different_graphs() {
    let a = trajectory(&config(42));
    let b = trajectory(&config(43));
    assert_ne!(a.0, b.0);
}

#[test]
fn serial_and_parallel_runs_agree() {
    let parallel = config(7);
    let mut serial = config(7);
    serial.dynamics.parallel = false;
    assert_eq!(trajectory(&parallel).1, trajectory(&serial).1);
}

#[test]
fn search_mode_does_not_change_the_run() {
    let kd = config(11);
    let mut brute = config(11);
    brute.graph.search = NeighborSearch::BruteForce;
    assert_eq!(trajectory(&kd), trajectory(&brute));
}

#[test]
fn balanced_selection_is_deterministic() {
    let mut cfg = config(5);
    cfg.influencers.selection = InfluencerSelection::BalancedDegree;
    let a = Simulation::new(&cfg).unwrap().influencers;
    let b = Simulation::new(&cfg).unwrap().influencers;
    assert_eq!(a, b);
}

#[test]
fn output_files_are_identical_across_runs() {
    let dirs = [tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap()];
    let mut cfg = config(99);
    cfg.steps = 10;
    for dir in &dirs {
        Simulation::new(&cfg).unwrap().run_to(dir.path()).unwrap();
    }
    for name in ["edges.csv", "edges_final.csv", "ghettos.csv", "nodes_step_0.csv", "nodes_step_10.csv"] {
        let a = std::fs::read(dirs[0].path().join(name)).unwrap();
        let b = std::fs::read(dirs[1].path().join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}
