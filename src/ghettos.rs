use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;

use crate::config::GhettoConfig;
use crate::network::{Agent, Network};

/// Union-find over `0..n` with union by size and path compression.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merges the sets holding `a` and `b`; the larger set's root survives,
    /// `a`'s root on ties. Returns `false` if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let mut a = self.find(a);
        let mut b = self.find(b);
        if a == b {
            return false;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
        true
    }

    pub fn set_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.size[root]
    }
}

/// -1, 0 or +1, with |opinion| < `neutral_band` counted as 0.
pub fn sign_group(opinion: f64, neutral_band: f64) -> i8 {
    if opinion.abs() < neutral_band {
        0
    } else if opinion > 0.0 {
        1
    } else {
        -1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ghetto {
    pub id: usize,
    pub members: Vec<usize>,
    pub mean_opinion: f64,
}

impl Ghetto {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn sign(&self, neutral_band: f64) -> i8 {
        sign_group(self.mean_opinion, neutral_band)
    }
}

/// Partitions a final network into opinion-homogeneous, spatially local
/// clusters. Reads the network only.
pub struct GhettoDetector {
    config: GhettoConfig,
    /// Set representative per node after [`GhettoDetector::detect`]
    pub labels: Vec<usize>,
}

impl GhettoDetector {
    pub fn new(config: GhettoConfig) -> Self {
        GhettoDetector {
            config,
            labels: Vec::new(),
        }
    }

    /// Neighbours merge when they share a sign group, hold close opinions
    /// and live within `radius` of each other.
    pub fn should_merge(&self, a: &Agent, b: &Agent) -> bool {
        let band = self.config.neutral_band;
        sign_group(a.opinion, band) == sign_group(b.opinion, band)
            && (a.opinion - b.opinion).abs() < self.config.tolerance
            && a.distance_sq(b) < self.config.radius * self.config.radius
    }

    pub fn detect(&mut self, net: &Network) {
        let mut dsu = DisjointSet::new(net.len());
        for (u, v, _) in net.edges() {
            if self.should_merge(net.agent(u), net.agent(v)) {
                dsu.union(u, v);
            }
        }
        self.labels = (0..net.len()).map(|u| dsu.find(u)).collect();
    }

    /// Every set, unfiltered, ordered by its smallest member.
    pub fn partition(&self) -> Vec<Vec<usize>> {
        let mut slot: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (node, &root) in self.labels.iter().enumerate() {
            let idx = *slot.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[idx].push(node);
        }
        groups
    }

    /// Sets of at least `min_size` members, numbered in discovery order.
    pub fn ghettos(&self, net: &Network) -> Vec<Ghetto> {
        let kept: Vec<Vec<usize>> = self
            .partition()
            .into_iter()
            .filter(|g| g.len() >= self.config.min_size)
            .collect();

        kept.into_par_iter()
            .enumerate()
            .map(|(id, members)| {
                let total: f64 = members.iter().map(|&u| net.agent(u).opinion).sum();
                let mean_opinion = total / members.len() as f64;
                Ghetto {
                    id,
                    members,
                    mean_opinion,
                }
            })
            .collect()
    }
}

/// Runs detection on `net` and returns the surviving ghettos.
pub fn detect_ghettos(net: &Network, config: &GhettoConfig) -> Vec<Ghetto> {
    let mut detector = GhettoDetector::new(config.clone());
    detector.detect(net);
    let ghettos = detector.ghettos(net);

    let band = config.neutral_band;
    let positive = ghettos.iter().filter(|g| g.sign(band) > 0).count();
    let negative = ghettos.iter().filter(|g| g.sign(band) < 0).count();
    info!(
        ghettos = ghettos.len(),
        positive,
        negative,
        neutral = ghettos.len() - positive - negative,
        min_size = config.min_size,
        "detected ghettos"
    );
    ghettos
}
