use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

/// Per-node state. Position is fixed after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Agent {
    pub x: f64,
    pub y: f64,
    pub opinion: f64,
    pub stubbornness: f64,
    pub influence: f64,
    pub exposure: f64,
}

impl Agent {
    /// A node with stubbornness 1.0 never updates its opinion.
    pub fn is_fixed(&self) -> bool {
        self.stubbornness >= 1.0
    }

    pub fn pin(&mut self, opinion: f64) {
        self.opinion = opinion;
        self.stubbornness = 1.0;
        self.influence = 1.0;
        self.exposure = 1.0;
    }

    pub fn distance_sq(&self, other: &Agent) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Undirected weighted social graph. Node ids are `0..len()` and never change;
/// each edge is stored once, so both directions always report the same weight.
#[derive(Debug, Clone, Default)]
pub struct Network {
    graph: UnGraph<Agent, f64>,
}

impl Network {
    pub fn new(agents: Vec<Agent>) -> Self {
        let mut graph = UnGraph::with_capacity(agents.len(), agents.len() * 2);
        for agent in agents {
            graph.add_node(agent);
        }
        Network { graph }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn agent(&self, id: usize) -> &Agent {
        &self.graph[NodeIndex::new(id)]
    }

    pub fn agent_mut(&mut self, id: usize) -> &mut Agent {
        &mut self.graph[NodeIndex::new(id)]
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.graph.raw_nodes().iter().map(|n| &n.weight)
    }

    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> + '_ {
        self.graph.node_weights_mut()
    }

    pub fn positions(&self) -> Vec<[f64; 2]> {
        self.agents().map(|a| [a.x, a.y]).collect()
    }

    pub fn degree(&self, id: usize) -> usize {
        self.graph.edges(NodeIndex::new(id)).count()
    }

    /// `(neighbour, weight)` pairs for `id`, in adjacency order.
    pub fn neighbors(&self, id: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let a = NodeIndex::new(id);
        self.graph.edges(a).map(move |e| {
            let other = if e.source() == a { e.target() } else { e.source() };
            (other.index(), *e.weight())
        })
    }

    pub fn weight(&self, u: usize, v: usize) -> Option<f64> {
        self.find_edge(u, v).map(|e| self.graph[e])
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.find_edge(u, v).is_some()
    }

    /// Adds `u -- v`. Self-loops and duplicates are ignored and return `false`.
    pub fn add_edge(&mut self, u: usize, v: usize, weight: f64) -> bool {
        if u == v || self.has_edge(u, v) {
            return false;
        }
        self.graph.add_edge(NodeIndex::new(u), NodeIndex::new(v), weight);
        true
    }

    pub fn set_weight(&mut self, u: usize, v: usize, weight: f64) -> bool {
        match self.find_edge(u, v) {
            Some(e) => {
                self.graph[e] = weight;
                true
            }
            None => false,
        }
    }

    pub fn remove_edge(&mut self, u: usize, v: usize) -> bool {
        match self.find_edge(u, v) {
            Some(e) => self.graph.remove_edge(e).is_some(),
            None => false,
        }
    }

    /// Every edge once as `(u, v, weight)` with `u < v`, sorted by `(u, v)`.
    pub fn edges(&self) -> Vec<(usize, usize, f64)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                let (a, b) = (e.source().index(), e.target().index());
                (a.min(b), a.max(b), *e.weight())
            })
            .collect();
        edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        edges
    }

    fn find_edge(&self, u: usize, v: usize) -> Option<EdgeIndex> {
        if u >= self.len() || v >= self.len() {
            return None;
        }
        self.graph.find_edge(NodeIndex::new(u), NodeIndex::new(v))
    }
}
