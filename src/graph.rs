//! Directed graph with in- and out-adjacency, used for the qualitative
//! (graph-based) part of model checking.

use crate::bitset::BitSet;

/// An edge of the underlying graph of a model.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    /// Matrix row of the distribution the edge belongs to.
    pub row: usize,
    pub probability: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BidirectionalGraph {
    out_edges: Vec<Vec<Edge>>,
    in_edges: Vec<Vec<Edge>>,
}

impl BidirectionalGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            out_edges: vec![Vec::new(); node_count],
            in_edges: vec![Vec::new(); node_count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.out_edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out_edges.iter().map(Vec::len).sum()
    }

    pub fn add_edge(&mut self, edge: Edge) {
        let needed = edge.source.max(edge.target) + 1;
        if needed > self.out_edges.len() {
            self.out_edges.resize(needed, Vec::new());
            self.in_edges.resize(needed, Vec::new());
        }
        self.out_edges[edge.source].push(edge);
        self.in_edges[edge.target].push(edge);
    }

    pub fn out_edges(&self, node: usize) -> &[Edge] {
        &self.out_edges[node]
    }

    pub fn in_edges(&self, node: usize) -> &[Edge] {
        &self.in_edges[node]
    }

    /// All nodes from which one of `targets` can be reached, including the targets themselves.
    ///
    /// The search walks edges backwards. Nodes for which `ignore_node` holds are neither
    /// added nor walked through, and edges for which `ignore_edge` holds are not followed.
    pub fn ancestors<N, E>(&self, targets: &BitSet, ignore_node: N, ignore_edge: E) -> BitSet
    where
        N: Fn(usize) -> bool,
        E: Fn(&Edge) -> bool,
    {
        let mut found = BitSet::new(self.node_count());
        let mut stack = Vec::with_capacity(targets.len());
        for target in targets {
            if target < self.node_count() && found.insert(target) {
                stack.push(target);
            }
        }

        while let Some(node) = stack.pop() {
            for edge in self.in_edges(node) {
                if ignore_edge(edge) || ignore_node(edge.source) {
                    continue;
                }
                if found.insert(edge.source) {
                    stack.push(edge.source);
                }
            }
        }

        found
    }
}
