//! Flat CSV snapshots consumed by the plotting scripts, plus a reader that
//! rebuilds a network from them.
//!
//! Per-step node snapshots are written on a background thread fed through a
//! bounded channel so file I/O stays out of the update loop.

use crossbeam_channel::{Sender, TrySendError, bounded};
use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::ghettos::Ghetto;
use crate::network::{Agent, Network};

pub const EDGES_FILE: &str = "edges.csv";
pub const GHETTOS_FILE: &str = "ghettos.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub opinion: f64,
    pub stubbornness: f64,
    pub influence: f64,
    #[serde(default = "full_weight")]
    pub exposure: f64,
}

#[derive(Debug, Serialize)]
struct EdgeRecord {
    u: usize,
    v: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct WeightedEdgeRecord {
    u: usize,
    v: usize,
    #[serde(default = "full_weight")]
    weight: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GhettoRecord {
    pub ghetto_id: usize,
    pub node: usize,
}

fn full_weight() -> f64 {
    1.0
}

pub fn snapshot_path(dir: &Path, step: u64) -> PathBuf {
    dir.join(format!("nodes_step_{step}.csv"))
}

pub fn node_records(net: &Network) -> Vec<NodeRecord> {
    net.agents()
        .enumerate()
        .map(|(id, a)| NodeRecord {
            id,
            x: a.x,
            y: a.y,
            opinion: a.opinion,
            stubbornness: a.stubbornness,
            influence: a.influence,
            exposure: a.exposure,
        })
        .collect()
}

pub fn write_nodes(path: &Path, records: &[NodeRecord]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per undirected edge with `u < v`; the weight column only on
/// weighted graphs.
pub fn write_edges(path: &Path, net: &Network, weighted: bool) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    let edges = net.edges();
    if edges.is_empty() {
        writer.write_record(if weighted { &["u", "v", "weight"][..] } else { &["u", "v"][..] })?;
    }
    for (u, v, weight) in edges {
        if weighted {
            writer.serialize(WeightedEdgeRecord { u, v, weight })?;
        } else {
            writer.serialize(EdgeRecord { u, v })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_ghettos(path: &Path, ghettos: &[Ghetto]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    if ghettos.is_empty() {
        writer.write_record(["ghetto_id", "node"])?;
    }
    for ghetto in ghettos {
        for &node in &ghetto.members {
            writer.serialize(GhettoRecord {
                ghetto_id: ghetto.id,
                node,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn read_ghettos(path: &Path) -> Result<Vec<GhettoRecord>> {
    let mut rows = Vec::new();
    for row in Reader::from_path(path)?.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Rebuilds a network from an edge list and one node snapshot. Node ids must
/// cover `0..N` exactly; a missing exposure column or weight column reads as 1.0.
pub fn load_network(edges_path: &Path, nodes_path: &Path) -> Result<Network> {
    let mut records: Vec<NodeRecord> = Vec::new();
    for row in Reader::from_path(nodes_path)?.deserialize() {
        records.push(row?);
    }
    records.sort_by_key(|r| r.id);
    for (expected, record) in records.iter().enumerate() {
        if record.id != expected {
            return Err(SimError::UnknownNode(expected.min(record.id)));
        }
    }

    let agents = records
        .into_iter()
        .map(|r| Agent {
            x: r.x,
            y: r.y,
            opinion: r.opinion,
            stubbornness: r.stubbornness,
            influence: r.influence,
            exposure: r.exposure,
        })
        .collect();
    let mut net = Network::new(agents);

    for row in Reader::from_path(edges_path)?.deserialize() {
        let edge: WeightedEdgeRecord = row?;
        for id in [edge.u, edge.v] {
            if id >= net.len() {
                return Err(SimError::UnknownNode(id));
            }
        }
        net.add_edge(edge.u, edge.v, edge.weight);
    }
    debug!(nodes = net.len(), edges = net.edge_count(), "loaded network from snapshot");
    Ok(net)
}

struct Snapshot {
    step: u64,
    rows: Vec<NodeRecord>,
}

/// Background writer for `nodes_step_<t>.csv` files.
pub struct SnapshotWriter {
    sender: Option<Sender<Snapshot>>,
    handle: Option<JoinHandle<Result<usize>>>,
    skip_when_busy: bool,
    skipped: usize,
}

impl SnapshotWriter {
    pub fn spawn(dir: PathBuf, capacity: usize, skip_when_busy: bool) -> Self {
        let (sender, receiver) = bounded::<Snapshot>(capacity.max(1));
        let handle = thread::spawn(move || -> Result<usize> {
            let mut written = 0;
            for snapshot in receiver {
                write_nodes(&snapshot_path(&dir, snapshot.step), &snapshot.rows)?;
                written += 1;
            }
            Ok(written)
        });
        SnapshotWriter {
            sender: Some(sender),
            handle: Some(handle),
            skip_when_busy,
            skipped: 0,
        }
    }

    /// Queues the current node state for `step`. Returns `false` when the
    /// snapshot was dropped because the writer is busy.
    pub fn submit(&mut self, step: u64, net: &Network) -> Result<bool> {
        let blocking = !self.skip_when_busy;
        self.send(step, net, blocking)
    }

    /// Queues a snapshot that must reach disk, waiting for room even in
    /// best-effort mode.
    pub fn submit_required(&mut self, step: u64, net: &Network) -> Result<()> {
        self.send(step, net, true).map(|_| ())
    }

    fn send(&mut self, step: u64, net: &Network, blocking: bool) -> Result<bool> {
        let Some(sender) = &self.sender else {
            return Err(SimError::SnapshotWriterClosed);
        };
        let snapshot = Snapshot {
            step,
            rows: node_records(net),
        };

        let sent = if blocking {
            sender.send(snapshot).map(|_| true).map_err(|_| ())
        } else {
            match sender.try_send(snapshot) {
                Ok(()) => Ok(true),
                Err(TrySendError::Full(_)) => {
                    warn!(step, "snapshot writer busy, skipping snapshot");
                    self.skipped += 1;
                    Ok(false)
                }
                Err(TrySendError::Disconnected(_)) => Err(()),
            }
        };

        match sent {
            Ok(queued) => Ok(queued),
            // The thread only exits early on a write error; surface it.
            Err(()) => match self.join() {
                Err(e) => Err(e),
                Ok(_) => Err(SimError::SnapshotWriterClosed),
            },
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Flushes pending snapshots and returns how many files were written.
    pub fn finish(mut self) -> Result<usize> {
        self.join()
    }

    fn join(&mut self) -> Result<usize> {
        self.sender.take();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SimError::SnapshotWriterClosed)?,
            None => Err(SimError::SnapshotWriterClosed),
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
