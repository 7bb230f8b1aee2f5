//! Run configuration.
//!
//! Every section carries defaults so a TOML file only needs the values it
//! changes. Out-of-range values are clamped by [`SimConfig::sanitized`], never
//! rejected.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

/// Smallest tolerance accepted by the opinion and ghetto predicates.
pub const MIN_TOLERANCE: f64 = 1e-6;

/// Half-open sampling interval `[lo, hi)` written as a two-element array.
pub type Span = [f64; 2];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every random stream in the run
    pub seed: u64,
    /// Number of update rounds; snapshots cover steps `0..=steps`
    pub steps: u64,
    pub graph: GraphConfig,
    pub agents: AgentConfig,
    pub influencers: InfluencerConfig,
    pub dynamics: DynamicsConfig,
    pub weights: WeightConfig,
    pub ghettos: GhettoConfig,
    pub output: OutputConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 6942069,
            steps: 300,
            graph: GraphConfig::default(),
            agents: AgentConfig::default(),
            influencers: InfluencerConfig::default(),
            dynamics: DynamicsConfig::default(),
            weights: WeightConfig::default(),
            ghettos: GhettoConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// How candidate neighbours are found during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborSearch {
    KdTree,
    BruteForce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Node count N
    pub nodes: usize,
    /// Edges each new node creates (m)
    pub attachment_count: usize,
    /// Size of the fully connected core built before attachment (m0)
    pub seed_size: usize,
    /// Spatial attachment radius
    pub radius: f64,
    /// Nearest nodes used when nothing lies within `radius`
    pub fallback_neighbors: usize,
    pub search: NeighborSearch,
    /// Draw edge weights from the spans below instead of using 1.0
    pub weighted: bool,
    pub attachment_weight: Span,
    pub seed_weight: Span,
    /// Fraction of generated edges kept after a random pruning pass
    pub edge_keep_ratio: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            nodes: 1000,
            attachment_count: 2,
            seed_size: 1,
            radius: 0.12,
            fallback_neighbors: 20,
            search: NeighborSearch::KdTree,
            weighted: false,
            attachment_weight: [0.3, 1.0],
            seed_weight: [0.5, 1.0],
            edge_keep_ratio: 1.0,
        }
    }
}

/// Sampling ranges for the initial node attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub opinion: Span,
    pub stubbornness: Span,
    pub influence: Span,
    pub exposure: Span,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            opinion: [-0.1, 0.1],
            stubbornness: [0.4, 0.8],
            influence: [0.5, 1.0],
            exposure: [0.7, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfluencerSelection {
    Uniform,
    BalancedDegree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluencerConfig {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub selection: InfluencerSelection,
    /// Degree band, relative to the target degree, for balanced selection
    pub degree_tolerance_ratio: f64,
    /// Explicit `[positive, negative]` ids for the two-influencer setup
    pub pair: Option<[usize; 2]>,
    /// Two-influencer setup with randomly drawn ids
    pub pair_random: bool,
}

impl Default for InfluencerConfig {
    fn default() -> Self {
        Self {
            positive: 40,
            negative: 40,
            neutral: 0,
            selection: InfluencerSelection::Uniform,
            degree_tolerance_ratio: 0.1,
            pair: None,
            pair_random: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    /// Bounded-confidence threshold
    pub tolerance: f64,
    /// Per-step stubbornness increment
    pub stubborn_growth: f64,
    /// Stop recomputing nodes whose opinion moved less than `convergence_epsilon`
    pub freeze_converged: bool,
    pub convergence_epsilon: f64,
    /// Per-node, per-step probability of attempting a new edge
    pub rewiring_prob: f64,
    /// Compute new opinions on the rayon pool
    pub parallel: bool,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.25,
            stubborn_growth: 0.003,
            freeze_converged: false,
            convergence_epsilon: 1e-6,
            rewiring_prob: 0.0,
            parallel: true,
        }
    }
}

/// Adaptive edge-weight policy. Only active on weighted graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub adaptive: bool,
    pub agreement_growth: f64,
    pub disagreement_decay: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Drop edges whose weight would fall below `min_weight`
    pub allow_removal: bool,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            adaptive: false,
            agreement_growth: 0.05,
            disagreement_decay: 0.05,
            min_weight: 0.05,
            max_weight: 1.0,
            allow_removal: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GhettoConfig {
    /// Maximum opinion gap between merged neighbours
    pub tolerance: f64,
    /// Maximum spatial distance between merged neighbours
    pub radius: f64,
    /// Clusters below this size are dropped from the output
    pub min_size: usize,
    /// |opinion| below this counts as the neutral sign group
    pub neutral_band: f64,
}

impl Default for GhettoConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.1,
            radius: 0.12,
            min_size: 5,
            neutral_band: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub write_snapshots: bool,
    pub snapshot_interval: u64,
    /// Queue depth between the simulation and the writer thread
    pub channel_capacity: usize,
    /// Drop snapshots instead of waiting when the writer falls behind
    pub skip_when_busy: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            write_snapshots: true,
            snapshot_interval: 1,
            channel_capacity: 4,
            skip_when_busy: false,
        }
    }
}

impl SimConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns a copy with every value forced into its valid range.
    pub fn sanitized(&self) -> Self {
        let mut c = self.clone();

        if c.graph.nodes == 0 {
            warn!("graph.nodes must be at least 1, using 1");
            c.graph.nodes = 1;
        }
        let n = c.graph.nodes;
        c.graph.attachment_count = clamp_count("graph.attachment_count", c.graph.attachment_count, n);
        c.graph.seed_size = clamp_count("graph.seed_size", c.graph.seed_size, n);
        if c.graph.fallback_neighbors == 0 {
            warn!("graph.fallback_neighbors must be at least 1, using 1");
            c.graph.fallback_neighbors = 1;
        }
        c.graph.radius = clamp_value("graph.radius", c.graph.radius, 0.0, f64::MAX);
        c.graph.edge_keep_ratio = clamp_value("graph.edge_keep_ratio", c.graph.edge_keep_ratio, 0.0, 1.0);
        c.graph.attachment_weight = clamp_span("graph.attachment_weight", c.graph.attachment_weight, 0.0, f64::MAX);
        c.graph.seed_weight = clamp_span("graph.seed_weight", c.graph.seed_weight, 0.0, f64::MAX);

        c.agents.opinion = clamp_span("agents.opinion", c.agents.opinion, -1.0, 1.0);
        c.agents.stubbornness = clamp_span("agents.stubbornness", c.agents.stubbornness, 0.0, 1.0);
        c.agents.influence = clamp_span("agents.influence", c.agents.influence, 0.0, 1.0);
        c.agents.exposure = clamp_span("agents.exposure", c.agents.exposure, 0.0, 1.0);

        let inf = &mut c.influencers;
        let mut excess = (inf.positive + inf.negative + inf.neutral).saturating_sub(n);
        if excess > 0 {
            warn!(nodes = n, "influencer counts exceed node count, trimming");
            for count in [&mut inf.neutral, &mut inf.negative, &mut inf.positive] {
                let cut = excess.min(*count);
                *count -= cut;
                excess -= cut;
            }
        }
        inf.degree_tolerance_ratio =
            clamp_value("influencers.degree_tolerance_ratio", inf.degree_tolerance_ratio, 0.0, f64::MAX);

        let d = &mut c.dynamics;
        d.tolerance = clamp_value("dynamics.tolerance", d.tolerance, MIN_TOLERANCE, f64::MAX);
        d.stubborn_growth = clamp_value("dynamics.stubborn_growth", d.stubborn_growth, 0.0, 1.0);
        d.convergence_epsilon = clamp_value("dynamics.convergence_epsilon", d.convergence_epsilon, 0.0, f64::MAX);
        d.rewiring_prob = clamp_value("dynamics.rewiring_prob", d.rewiring_prob, 0.0, 1.0);

        let w = &mut c.weights;
        w.agreement_growth = clamp_value("weights.agreement_growth", w.agreement_growth, 0.0, f64::MAX);
        w.disagreement_decay = clamp_value("weights.disagreement_decay", w.disagreement_decay, 0.0, f64::MAX);
        [w.min_weight, w.max_weight] = clamp_span("weights", [w.min_weight, w.max_weight], 0.0, f64::MAX);
        if w.adaptive && !c.graph.weighted {
            warn!("weights.adaptive has no effect on an unweighted graph");
            w.adaptive = false;
        }

        let g = &mut c.ghettos;
        g.tolerance = clamp_value("ghettos.tolerance", g.tolerance, MIN_TOLERANCE, f64::MAX);
        g.radius = clamp_value("ghettos.radius", g.radius, 0.0, f64::MAX);
        g.neutral_band = clamp_value("ghettos.neutral_band", g.neutral_band, 0.0, 1.0);
        if g.min_size == 0 {
            warn!("ghettos.min_size must be at least 1, using 1");
            g.min_size = 1;
        }

        if c.output.snapshot_interval == 0 {
            warn!("output.snapshot_interval must be at least 1, using 1");
            c.output.snapshot_interval = 1;
        }
        c.output.channel_capacity = c.output.channel_capacity.max(1);

        c
    }
}

fn clamp_count(name: &str, value: usize, n: usize) -> usize {
    let clamped = value.clamp(1, n);
    if clamped != value {
        warn!(field = name, value, clamped, "count outside [1, N], clamping");
    }
    clamped
}

fn clamp_value(name: &str, value: f64, lo: f64, hi: f64) -> f64 {
    let clamped = if value.is_nan() { lo } else { value.clamp(lo, hi) };
    if clamped != value {
        warn!(field = name, value, clamped, "value out of range, clamping");
    }
    clamped
}

fn clamp_span(name: &str, span: Span, lo: f64, hi: f64) -> Span {
    let mut a = clamp_value(name, span[0], lo, hi);
    let mut b = clamp_value(name, span[1], lo, hi);
    if a > b {
        warn!(field = name, "range bounds reversed, swapping");
        std::mem::swap(&mut a, &mut b);
    }
    [a, b]
}
