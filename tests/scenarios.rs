//! End-to-end behaviour of the generation, dynamics and clustering stages.

use rand::SeedableRng;
use rand::rngs::SmallRng;

use opinion_ghettos::config::{DynamicsConfig, GhettoConfig, GraphConfig, SimConfig, WeightConfig};
use opinion_ghettos::{Agent, GhettoDetector, GraphBuilder, Network, OpinionEngine, Simulation, detect_ghettos};

fn agent(x: f64, y: f64, opinion: f64, stubbornness: f64) -> Agent {
    Agent {
        x,
        y,
        opinion,
        stubbornness,
        influence: 1.0,
        exposure: 1.0,
    }
}

fn dynamics(tolerance: f64, stubborn_growth: f64) -> DynamicsConfig {
    DynamicsConfig {
        tolerance,
        stubborn_growth,
        ..DynamicsConfig::default()
    }
}

/// Four corners of the unit square, everything within radius: a tree.
#[test]
fn corners_of_unit_square_form_a_tree() {
    let corners = vec![
        agent(0.0, 0.0, 0.0, 0.5),
        agent(1.0, 0.0, 0.0, 0.5),
        agent(1.0, 1.0, 0.0, 0.5),
        agent(0.0, 1.0, 0.0, 0.5),
    ];
    let cfg = GraphConfig {
        nodes: 4,
        attachment_count: 1,
        radius: 2.0,
        ..GraphConfig::default()
    };
    let net = GraphBuilder::new(&cfg).connect(corners, &mut SmallRng::seed_from_u64(0));

    assert_eq!(net.edge_count(), 3);
    for i in 1..4 {
        let earlier = net.neighbors(i).filter(|&(v, _)| v < i).count();
        assert_eq!(earlier, 1, "node {i} should link to exactly one earlier node");
    }
    for u in 0..4 {
        assert!(net.degree(u) >= 1);
    }
}

/// A moderate node between two opposed influencers never reaches either pole.
#[test]
fn middle_node_between_opposed_influencers_stays_inside() {
    let mut plus = agent(0.0, 0.0, 1.0, 1.0);
    plus.pin(1.0);
    let mut minus = agent(0.2, 0.0, -1.0, 1.0);
    minus.pin(-1.0);
    let mut net = Network::new(vec![plus, agent(0.1, 0.0, 0.3, 0.5), minus]);
    net.add_edge(0, 1, 1.0);
    net.add_edge(1, 2, 1.0);

    let mut engine = OpinionEngine::new(dynamics(0.4, 0.0), WeightConfig::default(), None, 42);
    for _ in 0..500 {
        engine.step(&mut net);
        let middle = net.agent(1).opinion;
        assert!(middle > -1.0 && middle < 1.0, "middle node reached {middle}");
        assert_eq!(net.agent(0).opinion, 1.0);
        assert_eq!(net.agent(2).opinion, -1.0);
    }
    assert!(net.agent(1).opinion.abs() < 0.01);
}

/// A tight ring of like-minded neighbours is reported as one ghetto.
#[test]
fn like_minded_ring_is_one_ghetto() {
    let opinions = [0.50, 0.51, 0.49, 0.505, 0.495];
    let agents = opinions
        .iter()
        .enumerate()
        .map(|(i, &op)| agent(0.5 + 0.01 * i as f64, 0.5, op, 0.5))
        .collect();
    let mut net = Network::new(agents);
    for i in 0..5 {
        net.add_edge(i, (i + 1) % 5, 1.0);
    }

    let ghettos = detect_ghettos(&net, &GhettoConfig::default());
    assert_eq!(ghettos.len(), 1);
    let mut members = ghettos[0].members.clone();
    members.sort_unstable();
    assert_eq!(members, vec![0, 1, 2, 3, 4]);
}

/// A node without edges keeps its opinion.
#[test]
fn isolated_node_keeps_its_opinion() {
    let mut net = Network::new(vec![
        agent(0.9, 0.9, 0.37, 0.3),
        agent(0.1, 0.1, -0.5, 0.3),
        agent(0.2, 0.1, 0.5, 0.3),
    ]);
    net.add_edge(1, 2, 1.0);

    let mut engine = OpinionEngine::new(dynamics(0.25, 0.003), WeightConfig::default(), None, 3);
    for _ in 0..200 {
        engine.step(&mut net);
        assert_eq!(net.agent(0).opinion, 0.37);
    }
}

fn adaptive_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.seed = 2024;
    config.steps = 60;
    config.graph.nodes = 250;
    config.graph.weighted = true;
    config.weights.adaptive = true;
    config.weights.allow_removal = true;
    config.dynamics.rewiring_prob = 0.05;
    config.influencers.positive = 10;
    config.influencers.negative = 10;
    config.influencers.neutral = 3;
    config
}

#[test]
fn invariants_hold_through_every_phase() {
    let config = adaptive_config();
    let mut sim = Simulation::new(&config).unwrap();
    let (min_w, max_w) = (config.weights.min_weight, config.weights.max_weight);

    let mut previous: Vec<Agent> = sim.network.agents().copied().collect();
    for _ in 0..config.steps {
        sim.step();
        let net = &sim.network;

        for (u, v, w) in net.edges() {
            assert!(u < v);
            assert_eq!(net.weight(u, v), net.weight(v, u));
            assert!((min_w..=max_w).contains(&w), "weight {w} out of bounds");
        }
        for (before, after) in previous.iter().zip(net.agents()) {
            assert!((-1.0..=1.0).contains(&after.opinion));
            if before.is_fixed() {
                assert_eq!(before.opinion, after.opinion);
            } else {
                assert!(after.stubbornness >= before.stubbornness);
                assert!(after.stubbornness <= 1.0);
            }
        }
        previous = net.agents().copied().collect();
    }
}

#[test]
fn partition_covers_every_node_exactly_once() {
    let mut sim = Simulation::new(&adaptive_config()).unwrap();
    sim.run();

    let mut detector = GhettoDetector::new(sim.config().ghettos.clone());
    detector.detect(&sim.network);
    let groups = detector.partition();

    let mut seen = vec![0usize; sim.network.len()];
    for group in &groups {
        for &u in group {
            seen[u] += 1;
        }
    }
    assert!(seen.iter().all(|&count| count == 1));

    let ghettos = detector.ghettos(&sim.network);
    assert_eq!(ghettos.len(), groups.iter().filter(|g| g.len() >= 5).count());
    for (i, ghetto) in ghettos.iter().enumerate() {
        assert_eq!(ghetto.id, i);
        assert!(ghetto.len() >= 5);
    }
}

#[test]
fn influencer_neighbourhoods_lean_their_way() {
    let mut config = SimConfig::default();
    config.graph.nodes = 400;
    config.steps = 150;
    config.influencers.positive = 20;
    config.influencers.negative = 20;
    let mut sim = Simulation::new(&config).unwrap();
    sim.run();

    let net = &sim.network;
    let pinned: Vec<usize> = sim
        .influencers
        .positive
        .iter()
        .chain(&sim.influencers.negative)
        .copied()
        .collect();
    let leaning = |sources: &[usize], others: &[usize]| -> f64 {
        let near: Vec<usize> = (0..net.len())
            .filter(|u| !pinned.contains(u))
            .filter(|&u| net.neighbors(u).any(|(v, _)| sources.contains(&v)))
            .filter(|&u| !net.neighbors(u).any(|(v, _)| others.contains(&v)))
            .collect();
        near.iter().map(|&u| net.agent(u).opinion).sum::<f64>() / near.len().max(1) as f64
    };

    let positive_side = leaning(&sim.influencers.positive, &sim.influencers.negative);
    let negative_side = leaning(&sim.influencers.negative, &sim.influencers.positive);
    assert!(positive_side > 0.0);
    assert!(negative_side < 0.0);
}
