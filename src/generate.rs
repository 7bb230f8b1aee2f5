//! Spatial preferential-attachment network generation.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::{AgentConfig, GraphConfig, NeighborSearch, Span};
use crate::network::{Agent, Network};
use crate::spatial::{KdTree, nearest, scan_range};

/// Uniform draw from `[lo, hi)`; a collapsed span yields `lo`.
pub(crate) fn sample_span<R: Rng + ?Sized>(rng: &mut R, span: Span) -> f64 {
    if span[1] > span[0] {
        rng.gen_range(span[0]..span[1])
    } else {
        span[0]
    }
}

/// Draws `n` agents uniformly over the unit square with attributes from `config`.
pub fn random_agents<R: Rng + ?Sized>(n: usize, config: &AgentConfig, rng: &mut R) -> Vec<Agent> {
    (0..n)
        .map(|_| Agent {
            x: rng.gen_range(0.0..1.0),
            y: rng.gen_range(0.0..1.0),
            opinion: sample_span(rng, config.opinion),
            stubbornness: sample_span(rng, config.stubbornness),
            influence: sample_span(rng, config.influence),
            exposure: sample_span(rng, config.exposure),
        })
        .collect()
}

pub struct GraphBuilder<'a> {
    config: &'a GraphConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a GraphConfig) -> Self {
        GraphBuilder { config }
    }

    /// Builds a network of `config.nodes` freshly drawn agents.
    pub fn generate<R: Rng + ?Sized>(&self, agents: &AgentConfig, rng: &mut R) -> Network {
        let population = random_agents(self.config.nodes, agents, rng);
        self.connect(population, rng)
    }

    /// Wires the given agents together; ids follow the order of `agents`.
    pub fn connect<R: Rng + ?Sized>(&self, agents: Vec<Agent>, rng: &mut R) -> Network {
        let n = agents.len();
        let mut net = Network::new(agents);
        if n == 0 {
            return net;
        }
        let m = self.config.attachment_count.clamp(1, n);
        let m0 = self.config.seed_size.clamp(1, n);
        let positions = net.positions();

        for i in 0..m0 {
            for j in 0..i {
                let w = self.edge_weight(self.config.seed_weight, rng);
                net.add_edge(i, j, w);
            }
        }

        let mut fallbacks = 0usize;
        for i in m0..n {
            let [x, y] = positions[i];
            let existing = &positions[..i];

            let nearby = match self.config.search {
                NeighborSearch::KdTree => {
                    let mut hits = KdTree::build(existing).query_range(x, y, self.config.radius);
                    hits.sort_unstable();
                    hits
                }
                NeighborSearch::BruteForce => scan_range(existing, x, y, self.config.radius),
            };

            // (preference, candidate)
            let mut candidates: Vec<(usize, usize)> =
                nearby.into_iter().map(|j| (net.degree(j) + 1, j)).collect();
            if candidates.is_empty() {
                fallbacks += 1;
                candidates = nearest(existing, x, y, self.config.fallback_neighbors)
                    .into_iter()
                    .map(|j| (1, j))
                    .collect();
            }

            // Stable: equal preferences keep candidate order.
            candidates.sort_by(|a, b| b.0.cmp(&a.0));
            for &(_, j) in candidates.iter().take(m) {
                let w = self.edge_weight(self.config.attachment_weight, rng);
                net.add_edge(i, j, w);
            }
        }
        debug!(fallbacks, "nodes attached through nearest-neighbour fallback");

        if self.config.edge_keep_ratio < 1.0 {
            prune_edges(&mut net, self.config.edge_keep_ratio, rng);
        }

        info!(
            nodes = net.len(),
            edges = net.edge_count(),
            "generated spatial preferential-attachment network"
        );
        net
    }

    fn edge_weight<R: Rng + ?Sized>(&self, span: Span, rng: &mut R) -> f64 {
        if self.config.weighted {
            sample_span(rng, span)
        } else {
            1.0
        }
    }
}

/// Keeps a random `keep_ratio` share of the edges and drops the rest.
pub fn prune_edges<R: Rng + ?Sized>(net: &mut Network, keep_ratio: f64, rng: &mut R) {
    let mut edges = net.edges();
    edges.shuffle(rng);
    let keep = (edges.len() as f64 * keep_ratio.clamp(0.0, 1.0)) as usize;
    for &(u, v, _) in &edges[keep..] {
        net.remove_edge(u, v);
    }
    debug!(kept = keep, dropped = edges.len() - keep, "pruned edges");
}
