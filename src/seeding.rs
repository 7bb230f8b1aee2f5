//! Selection of fixed-opinion influencer nodes.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::config::{InfluencerConfig, InfluencerSelection};
use crate::error::{Result, SimError};
use crate::network::Network;

/// Ids pinned at +1, -1 and 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Influencers {
    pub positive: Vec<usize>,
    pub negative: Vec<usize>,
    pub neutral: Vec<usize>,
}

impl Influencers {
    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len() + self.neutral.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, net: &mut Network) {
        for &v in &self.positive {
            net.agent_mut(v).pin(1.0);
        }
        for &v in &self.negative {
            net.agent_mut(v).pin(-1.0);
        }
        for &v in &self.neutral {
            net.agent_mut(v).pin(0.0);
        }
    }
}

pub struct InfluencerSeeder<'a> {
    config: &'a InfluencerConfig,
}

impl<'a> InfluencerSeeder<'a> {
    pub fn new(config: &'a InfluencerConfig) -> Self {
        InfluencerSeeder { config }
    }

    /// Seeds according to the configuration: the two-influencer setup when a
    /// pair is requested, otherwise the configured counts.
    pub fn seed<R: Rng + ?Sized>(&self, net: &mut Network, rng: &mut R) -> Result<Influencers> {
        let chosen = if let Some([a, b]) = self.config.pair {
            seed_pair(net, Some((a, b)), rng)?
        } else if self.config.pair_random {
            seed_pair(net, None, rng)?
        } else {
            match self.config.selection {
                InfluencerSelection::Uniform => seed_uniform(
                    net,
                    self.config.positive,
                    self.config.negative,
                    self.config.neutral,
                    rng,
                ),
                InfluencerSelection::BalancedDegree => seed_balanced_degree(
                    net,
                    self.config.positive,
                    self.config.negative,
                    self.config.neutral,
                    self.config.degree_tolerance_ratio,
                    rng,
                ),
            }
        };
        info!(
            positive = chosen.positive.len(),
            negative = chosen.negative.len(),
            neutral = chosen.neutral.len(),
            "seeded influencers"
        );
        Ok(chosen)
    }
}

/// Picks distinct nodes uniformly at random and pins them.
pub fn seed_uniform<R: Rng + ?Sized>(
    net: &mut Network,
    positive: usize,
    negative: usize,
    neutral: usize,
    rng: &mut R,
) -> Influencers {
    let mut idx: Vec<usize> = (0..net.len()).collect();
    idx.shuffle(rng);

    let mut rest = idx.into_iter();
    let chosen = Influencers {
        positive: rest.by_ref().take(positive).collect(),
        negative: rest.by_ref().take(negative).collect(),
        neutral: rest.by_ref().take(neutral).collect(),
    };
    chosen.apply(net);
    chosen
}

/// Draws positive and negative influencers from nodes of similar degree, so
/// neither side starts with a structural advantage. Neutral influencers come
/// from the remaining nodes.
pub fn seed_balanced_degree<R: Rng + ?Sized>(
    net: &mut Network,
    positive: usize,
    negative: usize,
    neutral: usize,
    tolerance_ratio: f64,
    rng: &mut R,
) -> Influencers {
    let n = net.len();
    if n == 0 {
        return Influencers::default();
    }
    let degrees: Vec<usize> = (0..n).map(|u| net.degree(u)).collect();
    let max_degree = degrees.iter().copied().max().unwrap_or(0);
    let target = degrees[rng.gen_range(0..n)];

    let mut band = ((tolerance_ratio * target as f64) as usize).max(1);
    let mut candidates: Vec<usize> = loop {
        let within: Vec<usize> = (0..n).filter(|&u| degrees[u].abs_diff(target) <= band).collect();
        if within.len() >= positive + negative || band >= max_degree {
            break within;
        }
        band *= 2;
    };
    candidates.shuffle(rng);

    let mut picked = candidates.into_iter();
    let pos: Vec<usize> = picked.by_ref().take(positive).collect();
    let neg: Vec<usize> = picked.by_ref().take(negative).collect();
    let remaining: Vec<usize> = (0..n).filter(|u| !pos.contains(u) && !neg.contains(u)).collect();
    let neu: Vec<usize> = remaining.choose_multiple(rng, neutral).copied().collect();

    let chosen = Influencers {
        positive: pos,
        negative: neg,
        neutral: neu,
    };
    chosen.apply(net);
    chosen
}

/// Two-influencer setup: every opinion is reset to 0, then one node is pinned
/// at +1 and another at -1. With no explicit pair both ids are drawn at random.
pub fn seed_pair<R: Rng + ?Sized>(
    net: &mut Network,
    pair: Option<(usize, usize)>,
    rng: &mut R,
) -> Result<Influencers> {
    let n = net.len();
    let (pos, neg) = match pair {
        Some((a, b)) if a != b && a < n && b < n => (a, b),
        Some((a, b)) => return Err(SimError::InvalidInfluencerPair(a, b, n)),
        None if n < 2 => return Err(SimError::InvalidInfluencerPair(0, 0, n)),
        None => {
            let a = rng.gen_range(0..n);
            let mut b = rng.gen_range(0..n);
            while b == a {
                b = rng.gen_range(0..n);
            }
            (a, b)
        }
    };

    for agent in net.agents_mut() {
        agent.opinion = 0.0;
    }
    let chosen = Influencers {
        positive: vec![pos],
        negative: vec![neg],
        neutral: Vec::new(),
    };
    chosen.apply(net);
    Ok(chosen)
}
