//! Bipartite graph container and edge-list staging.
//!
//! The graph is a plain edge list over global node ids together with a
//! node-type vector that splits the ids into the two sides. The search
//! controller stages the edge list to a tab-separated temp file whenever a
//! partition engine needs to consume it; removal of a stale staged file is
//! logged and recovered, never propagated.

use anyhow::{ensure, Context, Result};
use log::warn;
use ndarray::Array2;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::SearchError;

/// Which side of the bipartite graph a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Row side (type-a).
    A,
    /// Column side (type-b).
    B,
}

/// An undirected bipartite graph given as an edge list over global node ids.
#[derive(Debug, Clone)]
pub struct BipartiteGraph {
    edges: Vec<(usize, usize)>,
    types: Vec<NodeType>,
    degrees: Vec<usize>,
    na: usize,
    nb: usize,
}

impl BipartiteGraph {
    /// Build a graph from an edge list and a node-type vector.
    ///
    /// * `edges` - one entry per edge, endpoints are indices into `types`
    /// * `types` - side membership of every node
    pub fn new(edges: Vec<(usize, usize)>, types: Vec<NodeType>) -> Result<Self> {
        let n = types.len();
        let na = types.iter().filter(|t| **t == NodeType::A).count();
        let nb = n - na;

        let mut degrees = vec![0usize; n];
        for &(u, v) in &edges {
            ensure!(
                u < n && v < n,
                "edge ({}, {}) references a node outside 0..{}",
                u,
                v,
                n
            );
            degrees[u] += 1;
            degrees[v] += 1;
        }

        Ok(BipartiteGraph {
            edges,
            types,
            degrees,
            na,
            nb,
        })
    }

    /// Number of type-a nodes.
    pub fn na(&self) -> usize {
        self.na
    }

    /// Number of type-b nodes.
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Total number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.types.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Average degree, `2E / (na + nb)`.
    pub fn average_degree(&self) -> f64 {
        2.0 * self.num_edges() as f64 / self.num_nodes() as f64
    }

    /// The edge list.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Per-node degrees.
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Side membership of every node.
    pub fn types(&self) -> &[NodeType] {
        &self.types
    }

    /// Build the `k x k` affinity matrix from a membership vector.
    ///
    /// Every edge is counted from both endpoints, so the total mass of the
    /// returned matrix is `2E`.
    pub fn affinity_matrix(&self, mb: &[usize], k: usize) -> Result<Array2<u64>> {
        ensure!(
            mb.len() == self.num_nodes(),
            "membership length {} does not match node count {}",
            mb.len(),
            self.num_nodes()
        );
        let mut m = Array2::<u64>::zeros((k, k));
        for &(u, v) in &self.edges {
            let (r, s) = (mb[u], mb[v]);
            ensure!(r < k && s < k, "group index out of range for k = {}", k);
            m[[r, s]] += 1;
            m[[s, r]] += 1;
        }
        Ok(m)
    }

    /// Per-side group sizes under a membership vector.
    ///
    /// Type-a nodes must live in groups `0..ka` and type-b nodes in
    /// `ka..ka+kb`; a membership that mixes sides is a broken engine
    /// contract and is rejected.
    pub fn group_sizes(&self, mb: &[usize], ka: usize, kb: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let mut nr_a = vec![0usize; ka];
        let mut nr_b = vec![0usize; kb];
        for (node, &g) in mb.iter().enumerate() {
            match self.types[node] {
                NodeType::A => {
                    ensure!(g < ka, "type-a node {} assigned to column group {}", node, g);
                    nr_a[g] += 1;
                }
                NodeType::B => {
                    ensure!(
                        g >= ka && g < ka + kb,
                        "type-b node {} assigned to row group {}",
                        node,
                        g
                    );
                    nr_b[g - ka] += 1;
                }
            }
        }
        Ok((nr_a, nr_b))
    }

    /// Check the node-count preconditions shared by every search run.
    pub fn check_sides(&self) -> Result<()> {
        if self.na == 0 {
            return Err(SearchError::EmptySide { side: 'a' }.into());
        }
        if self.nb == 0 {
            return Err(SearchError::EmptySide { side: 'b' }.into());
        }
        if self.num_nodes() != self.na + self.nb {
            return Err(SearchError::NodeCountMismatch {
                n: self.num_nodes(),
                na: self.na,
                nb: self.nb,
            }
            .into());
        }
        Ok(())
    }
}

/// Staged tab-separated edge list consumed by partition engines.
///
/// The file lives in a per-run temp directory and is rewritten whenever it
/// has been discarded; discarding a file that is already gone is expected
/// under retries and only logged.
pub struct EdgelistStage {
    _dir: TempDir,
    path: PathBuf,
    fresh: bool,
}

impl EdgelistStage {
    /// Create the staging area (no file is written yet).
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("creating edge-list staging directory")?;
        let path = dir.path().join("edgelist.tsv");
        Ok(EdgelistStage {
            _dir: dir,
            path,
            fresh: false,
        })
    }

    /// Path of the staged file, writing it first if it is stale.
    pub fn ensure(&mut self, graph: &BipartiteGraph) -> Result<&Path> {
        if !self.fresh {
            let file = fs::File::create(&self.path)
                .with_context(|| format!("staging edge list at {}", self.path.display()))?;
            let mut buf = BufWriter::new(file);
            for &(u, v) in graph.edges() {
                writeln!(buf, "{}\t{}", u, v)?;
            }
            buf.flush()?;
            self.fresh = true;
        }
        Ok(&self.path)
    }

    /// Remove the staged file; a missing file is logged, not an error.
    pub fn discard(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("removing staged edge list: {}", e);
        }
        self.fresh = false;
    }

    /// Discard and immediately rewrite the staged file.
    pub fn restage(&mut self, graph: &BipartiteGraph) -> Result<&Path> {
        self.discard();
        self.ensure(graph)
    }
}
