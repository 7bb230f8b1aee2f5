//! Bounded-confidence opinion dynamics.
//!
//! Each call to [`OpinionEngine::step`] is one synchronous round: every new
//! opinion is computed from the previous round's committed state, then all of
//! them are written back at once. Exposure sampling draws from an independent
//! stream per `(step, node)`, so the parallel and serial paths agree bit for bit.
//! Weight adaptation and rewiring mutate the adjacency and always run serially
//! after the commit.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{DynamicsConfig, SimConfig, Span, WeightConfig};
use crate::generate::sample_span;
use crate::network::Network;

/// |opinion| above this counts as polarized in [`Polarization`].
pub const POLARIZED_THRESHOLD: f64 = 0.5;

const REWIRE_STREAM: u64 = 0x5EED_0F_2E_3172;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Polarization {
    pub mean_opinion: f64,
    pub mean_abs_opinion: f64,
    pub polarized_fraction: f64,
}

impl Polarization {
    pub fn measure(net: &Network) -> Self {
        let n = net.len();
        if n == 0 {
            return Self::default();
        }
        let (mut sum, mut abs, mut polarized) = (0.0, 0.0, 0usize);
        for a in net.agents() {
            sum += a.opinion;
            abs += a.opinion.abs();
            if a.opinion.abs() > POLARIZED_THRESHOLD {
                polarized += 1;
            }
        }
        Polarization {
            mean_opinion: sum / n as f64,
            mean_abs_opinion: abs / n as f64,
            polarized_fraction: polarized as f64 / n as f64,
        }
    }
}

/// Outcome of one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Index of the round just completed, starting at 1
    pub step: u64,
    /// Nodes whose opinion was recomputed
    pub updated: usize,
    pub max_delta: f64,
    pub newly_converged: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    pub polarization: Polarization,
}

/// Blends `opinion` toward `neighbor_avg`, discounting far-off averages.
pub fn bounded_confidence_update(opinion: f64, stubbornness: f64, neighbor_avg: f64, tolerance: f64) -> f64 {
    let diff = (neighbor_avg - opinion).abs();
    let confidence = if diff <= tolerance {
        1.0
    } else {
        1.0 / (1.0 + 2.0 * (diff - tolerance))
    };
    let updated = stubbornness * opinion
        + (1.0 - stubbornness) * (confidence * neighbor_avg + (1.0 - confidence) * opinion);
    updated.clamp(-1.0, 1.0)
}

/// New opinion for one node, and whether any neighbour was heard this round.
#[derive(Debug, Clone, Copy)]
struct Update {
    opinion: f64,
    sampled: bool,
}

pub struct OpinionEngine {
    dynamics: DynamicsConfig,
    weights: WeightConfig,
    /// Initial weight span for rewired edges; `None` on unweighted graphs
    rewire_weight: Option<Span>,
    seed: u64,
    step: u64,
    converged: Vec<bool>,
    rng: SmallRng,
}

impl OpinionEngine {
    pub fn new(dynamics: DynamicsConfig, weights: WeightConfig, rewire_weight: Option<Span>, seed: u64) -> Self {
        OpinionEngine {
            dynamics,
            weights,
            rewire_weight,
            seed,
            step: 0,
            converged: Vec::new(),
            rng: SmallRng::seed_from_u64(seed ^ REWIRE_STREAM),
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        let rewire_weight = config.graph.weighted.then_some(config.graph.attachment_weight);
        Self::new(config.dynamics.clone(), config.weights.clone(), rewire_weight, config.seed)
    }

    pub fn steps_taken(&self) -> u64 {
        self.step
    }

    pub fn is_converged(&self, u: usize) -> bool {
        self.converged.get(u).copied().unwrap_or(false)
    }

    /// Advances every opinion by one round, then runs the adaptive phases.
    pub fn step(&mut self, net: &mut Network) -> StepReport {
        let n = net.len();
        if self.converged.len() != n {
            self.converged.resize(n, false);
        }

        let updates: Vec<Option<Update>> = {
            let snapshot: &Network = net;
            let compute = |u: usize| self.next_opinion(snapshot, u);
            if self.dynamics.parallel {
                (0..n).into_par_iter().map(compute).collect()
            } else {
                (0..n).map(compute).collect()
            }
        };

        let mut report = StepReport {
            step: self.step + 1,
            ..StepReport::default()
        };
        for (u, update) in updates.into_iter().enumerate() {
            let Some(Update { opinion, sampled }) = update else { continue };
            let agent = net.agent_mut(u);
            let delta = (opinion - agent.opinion).abs();
            agent.opinion = opinion;
            report.updated += 1;
            report.max_delta = report.max_delta.max(delta);
            // A round with no sampled neighbour says nothing about convergence.
            if self.dynamics.freeze_converged && sampled && delta < self.dynamics.convergence_epsilon {
                self.converged[u] = true;
                report.newly_converged += 1;
            }
        }

        let growth = self.dynamics.stubborn_growth;
        for agent in net.agents_mut() {
            if !agent.is_fixed() {
                agent.stubbornness = (agent.stubbornness + growth).min(1.0);
            }
        }

        if self.weights.adaptive {
            report.edges_removed = self.modify_weights(net);
        }
        if self.dynamics.rewiring_prob > 0.0 {
            report.edges_added = self.rewire_edges(net);
        }

        self.step += 1;
        report.polarization = Polarization::measure(net);
        debug!(
            step = report.step,
            updated = report.updated,
            max_delta = report.max_delta,
            edges = net.edge_count(),
            mean_abs_opinion = report.polarization.mean_abs_opinion,
            "opinion step"
        );
        report
    }

    // None when the node does not update this round.
    fn next_opinion(&self, net: &Network, u: usize) -> Option<Update> {
        let agent = net.agent(u);
        if agent.is_fixed() || self.converged[u] {
            return None;
        }

        let mut rng = SmallRng::seed_from_u64(stream_seed(self.seed, self.step, u));
        let exposure = agent.exposure.clamp(0.0, 1.0);
        let (mut weighted_sum, mut weight_total) = (0.0, 0.0);
        for (v, w) in net.neighbors(u) {
            if !rng.gen_bool(exposure) {
                continue;
            }
            let q = net.agent(v);
            weighted_sum += w * q.opinion * q.influence;
            weight_total += w * q.influence;
        }

        if weight_total <= 0.0 {
            return Some(Update {
                opinion: agent.opinion,
                sampled: false,
            });
        }
        let neighbor_avg = weighted_sum / weight_total;
        Some(Update {
            opinion: bounded_confidence_update(agent.opinion, agent.stubbornness, neighbor_avg, self.dynamics.tolerance),
            sampled: true,
        })
    }

    /// Strengthens edges between agreeing nodes and weakens the rest. Returns
    /// the number of edges removed; removal happens only after the full scan.
    pub fn modify_weights(&mut self, net: &mut Network) -> usize {
        let w = &self.weights;
        let tolerance = self.dynamics.tolerance;
        let mut doomed = Vec::new();

        for (u, v, weight) in net.edges() {
            let diff = (net.agent(u).opinion - net.agent(v).opinion).abs();
            let next = if diff <= tolerance {
                weight + w.agreement_growth * (1.0 - diff)
            } else {
                weight - w.disagreement_decay * (diff - tolerance)
            };
            if w.allow_removal && next < w.min_weight {
                doomed.push((u, v));
                continue;
            }
            net.set_weight(u, v, next.clamp(w.min_weight, w.max_weight));
        }

        for &(u, v) in &doomed {
            net.remove_edge(u, v);
        }
        doomed.len()
    }

    /// Lets each node, with probability `rewiring_prob`, befriend a random
    /// like-minded stranger. Returns the number of edges created.
    pub fn rewire_edges(&mut self, net: &mut Network) -> usize {
        let n = net.len();
        if n < 2 {
            return 0;
        }
        let p = self.dynamics.rewiring_prob.clamp(0.0, 1.0);
        let mut added = 0;

        for u in 0..n {
            if !self.rng.gen_bool(p) {
                continue;
            }
            let mut v = self.rng.gen_range(0..n - 1);
            if v >= u {
                v += 1;
            }
            if net.has_edge(u, v) {
                continue;
            }
            if (net.agent(u).opinion - net.agent(v).opinion).abs() > self.dynamics.tolerance {
                continue;
            }
            let weight = match self.rewire_weight {
                Some(span) => sample_span(&mut self.rng, span).clamp(self.weights.min_weight, self.weights.max_weight),
                None => 1.0,
            };
            if net.add_edge(u, v, weight) {
                added += 1;
            }
        }
        added
    }
}

fn stream_seed(seed: u64, step: u64, node: usize) -> u64 {
    let mut z = seed
        ^ step.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (node as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
