
/*!
This module provides the partial-order alignment graph: a DAG of per-base nodes with
weighted edges counting how strongly each transition is supported by the aligned reads.
Nodes and edges live in dense arenas and are addressed by integer id; a topological rank
array is rebuilt after every mutation so the alignment engine can sweep the graph in
dependency order.

# Example usage
```rust
use poa_polish::graph::AlignmentGraph;

let graph = AlignmentGraph::from_backbone(b"ACGT", &[1, 1, 1, 1]);
let (consensus, coverage) = graph.generate_consensus();
assert_eq!(consensus, b"ACGT");
assert_eq!(coverage, vec![1, 1, 1, 1]);
```
*/

use std::collections::VecDeque;

use crate::aligner::Alignment;

pub type NodeId = usize;
pub type EdgeId = usize;

/// One graph position holding a single base code.
#[derive(Clone, Debug)]
pub struct Node {
    /// Upper-cased base byte at this position
    code: u8,
    /// Edges ending here, in insertion order
    in_edges: Vec<EdgeId>,
    /// Edges starting here, in insertion order
    out_edges: Vec<EdgeId>,
    /// Other nodes occupying the same alignment column
    aligned_nodes: Vec<NodeId>,
    /// Number of sequences whose alignment passed through this node
    coverage: u32,
}

/// A weighted transition between two nodes.
#[derive(Clone, Debug)]
pub struct Edge {
    begin: NodeId,
    end: NodeId,
    /// Accumulated per-base weights of every sequence using this transition
    weight: i64,
}

/// A partial-order alignment graph over dense node/edge arenas.
#[derive(Clone, Debug, Default)]
pub struct AlignmentGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Topological order, rebuilt after every mutation
    rank_to_node: Vec<NodeId>,
    /// Inverse of `rank_to_node`
    node_to_rank: Vec<usize>,
    /// Number of sequences folded into the graph, backbone included
    sequence_count: u32,
}

impl AlignmentGraph {
    /// Creates an empty graph.
    pub fn new() -> AlignmentGraph {
        Default::default()
    }

    /// Creates a graph seeded with a backbone sequence as a chain of nodes.
    /// An empty backbone is a caller error and aborts.
    /// # Arguments
    /// * `bases` - the backbone bases
    /// * `weights` - per-base weights, same length as `bases`
    pub fn from_backbone(bases: &[u8], weights: &[u32]) -> AlignmentGraph {
        assert!(!bases.is_empty(), "Window backbone must not be empty.");
        assert_eq!(bases.len(), weights.len());

        let mut graph = AlignmentGraph::new();
        let mut prev = graph.add_node(bases[0]);
        graph.nodes[prev].coverage = 1;
        for (base, &weight) in bases.iter().zip(weights.iter()).skip(1) {
            let node = graph.add_node(*base);
            graph.nodes[node].coverage = 1;
            graph.add_edge(prev, node, weight as i64);
            prev = node;
        }
        graph.sequence_count = 1;
        graph.topological_sort();
        graph
    }

    /// Adds an unconnected node and returns its id.
    fn add_node(&mut self, code: u8) -> NodeId {
        self.nodes.push(Node {
            code,
            in_edges: vec![],
            out_edges: vec![],
            aligned_nodes: vec![],
            coverage: 0,
        });
        self.nodes.len() - 1
    }

    /// Adds `weight` onto the `begin -> end` transition, creating the edge on first use.
    fn add_edge(&mut self, begin: NodeId, end: NodeId, weight: i64) {
        for &edge_id in self.nodes[begin].out_edges.iter() {
            if self.edges[edge_id].end == end {
                self.edges[edge_id].weight += weight;
                return;
            }
        }
        self.edges.push(Edge { begin, end, weight });
        let edge_id = self.edges.len() - 1;
        self.nodes[begin].out_edges.push(edge_id);
        self.nodes[end].in_edges.push(edge_id);
    }

    /// Folds an aligned sequence into the graph. Match pairs reuse the aligned node when
    /// the codes agree, otherwise another node from the same column, otherwise a fresh
    /// node registered into that column; insertions create unassociated nodes; deletions
    /// create nothing. Every traversed transition gains the weight of the consumed base.
    /// # Arguments
    /// * `alignment` - the alignment of `bases` against this graph
    /// * `bases` - the sequence being folded in
    /// * `weights` - per-base weights, same length as `bases`
    pub fn add_alignment(&mut self, alignment: &Alignment, bases: &[u8], weights: &[u32]) {
        assert_eq!(bases.len(), weights.len());

        let mut prev: Option<NodeId> = None;
        let mut touched = false;
        for &(opt_node, opt_seq) in alignment.pairs().iter() {
            let seq_index = match opt_seq {
                Some(j) => j,
                // a deletion consumes only the graph
                None => continue
            };
            let code = bases[seq_index];

            let current = match opt_node {
                None => self.add_node(code),
                Some(node_id) => {
                    if self.nodes[node_id].code == code {
                        node_id
                    } else if let Some(&aligned) = self.nodes[node_id].aligned_nodes.iter()
                        .find(|&&a| self.nodes[a].code == code) {
                        aligned
                    } else {
                        // new branch in an existing column
                        let new_id = self.add_node(code);
                        let mut column = self.nodes[node_id].aligned_nodes.clone();
                        column.push(node_id);
                        for &member in column.iter() {
                            self.nodes[member].aligned_nodes.push(new_id);
                        }
                        self.nodes[new_id].aligned_nodes = column;
                        new_id
                    }
                }
            };

            self.nodes[current].coverage += 1;
            if let Some(p) = prev {
                self.add_edge(p, current, weights[seq_index] as i64);
            }
            prev = Some(current);
            touched = true;
        }

        if touched {
            self.sequence_count += 1;
            self.topological_sort();
        }
    }

    /// Rebuilds the topological rank arrays with Kahn's algorithm. Seeds are taken in
    /// ascending id order and propagation is FIFO, so the order is deterministic.
    fn topological_sort(&mut self) {
        let node_count = self.nodes.len();
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.in_edges.len()).collect();

        let mut queue: VecDeque<NodeId> = (0..node_count).filter(|&u| in_degree[u] == 0).collect();
        self.rank_to_node.clear();
        while let Some(u) = queue.pop_front() {
            self.rank_to_node.push(u);
            for &edge_id in self.nodes[u].out_edges.iter() {
                let v = self.edges[edge_id].end;
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    queue.push_back(v);
                }
            }
        }
        assert_eq!(self.rank_to_node.len(), node_count, "Alignment graph contains a cycle.");

        self.node_to_rank = vec![0; node_count];
        for (rank, &u) in self.rank_to_node.iter().enumerate() {
            self.node_to_rank[u] = rank;
        }
    }

    /// Computes the consensus sequence via a heaviest-path sweep: each node scores the best
    /// `predecessor score + edge weight` over its in-edges, ties broken by greater edge
    /// weight then earlier edge insertion, and the walk backtracks from the best-scoring
    /// node in the graph. Returns the consensus bytes and the per-position coverage counts.
    pub fn generate_consensus(&self) -> (Vec<u8>, Vec<u32>) {
        if self.nodes.is_empty() {
            return (vec![], vec![]);
        }

        let mut scores: Vec<i64> = vec![0; self.nodes.len()];
        let mut predecessors: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for &u in self.rank_to_node.iter() {
            let mut best: Option<(i64, i64, NodeId)> = None;
            for &edge_id in self.nodes[u].in_edges.iter() {
                let edge = &self.edges[edge_id];
                let candidate = (scores[edge.begin] + edge.weight, edge.weight);
                let better = match best {
                    None => true,
                    Some((score, weight, _)) => {
                        candidate.0 > score || (candidate.0 == score && candidate.1 > weight)
                    }
                };
                if better {
                    best = Some((candidate.0, candidate.1, edge.begin));
                }
            }
            if let Some((score, _, pred)) = best {
                scores[u] = score;
                predecessors[u] = Some(pred);
            }
        }

        // global best end node, earliest rank on ties
        let mut end = self.rank_to_node[0];
        for &u in self.rank_to_node.iter() {
            if scores[u] > scores[end] {
                end = u;
            }
        }

        let mut consensus = vec![];
        let mut coverage = vec![];
        let mut walker = Some(end);
        while let Some(u) = walker {
            consensus.push(self.nodes[u].code);
            coverage.push(self.nodes[u].coverage);
            walker = predecessors[u];
        }
        consensus.reverse();
        coverage.reverse();
        (consensus, coverage)
    }

    /// Extracts the nodes whose topological rank falls between the ranks of backbone
    /// nodes `begin` and `end` (backbone node ids equal backbone positions), remapping
    /// the edges among them. Returns the subgraph and a vec translating subgraph node
    /// ids back to ids in this graph.
    /// # Arguments
    /// * `begin` - backbone position opening the range, inclusive
    /// * `end` - backbone position closing the range, inclusive
    pub fn subgraph(&self, begin: NodeId, end: NodeId) -> (AlignmentGraph, Vec<NodeId>) {
        let first_rank = self.node_to_rank[begin];
        let last_rank = self.node_to_rank[end];
        assert!(first_rank <= last_rank);

        let mut sub = AlignmentGraph::new();
        let mut to_parent = Vec::with_capacity(last_rank - first_rank + 1);
        let mut to_sub = vec![usize::MAX; self.nodes.len()];
        for rank in first_rank..=last_rank {
            let u = self.rank_to_node[rank];
            let new_id = sub.add_node(self.nodes[u].code);
            sub.nodes[new_id].coverage = self.nodes[u].coverage;
            to_sub[u] = new_id;
            to_parent.push(u);
        }
        for rank in first_rank..=last_rank {
            let u = self.rank_to_node[rank];
            for &edge_id in self.nodes[u].in_edges.iter() {
                let edge = &self.edges[edge_id];
                if to_sub[edge.begin] != usize::MAX {
                    sub.add_edge(to_sub[edge.begin], to_sub[u], edge.weight);
                }
            }
        }
        sub.sequence_count = self.sequence_count;
        sub.topological_sort();
        (sub, to_parent)
    }

    /// Translates an alignment computed against a subgraph into this graph's node ids.
    /// # Arguments
    /// * `alignment` - the subgraph-local alignment
    /// * `to_parent` - the mapping returned by [`AlignmentGraph::subgraph`]
    pub fn update_alignment(&self, alignment: Alignment, to_parent: &[NodeId]) -> Alignment {
        let pairs = alignment.pairs().iter()
            .map(|&(opt_node, opt_seq)| (opt_node.map(|n| to_parent[n]), opt_seq))
            .collect();
        Alignment::new(pairs, alignment.score())
    }

    // getters
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sequence_count(&self) -> u32 {
        self.sequence_count
    }

    pub fn code(&self, u: NodeId) -> u8 {
        self.nodes[u].code
    }

    pub fn coverage(&self, u: NodeId) -> u32 {
        self.nodes[u].coverage
    }

    pub fn aligned_nodes(&self, u: NodeId) -> &[NodeId] {
        &self.nodes[u].aligned_nodes
    }

    /// Node ids in topological order
    pub fn rank_to_node(&self) -> &[NodeId] {
        &self.rank_to_node
    }

    pub fn rank_of(&self, u: NodeId) -> usize {
        self.node_to_rank[u]
    }

    /// Iterates the predecessor node ids of `u` in edge insertion order
    pub fn predecessors(&self, u: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[u].in_edges.iter().map(|&e| self.edges[e].begin)
    }

    pub fn is_sink(&self, u: NodeId) -> bool {
        self.nodes[u].out_edges.is_empty()
    }

    pub fn has_predecessors(&self, u: NodeId) -> bool {
        !self.nodes[u].in_edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an all-match alignment of a sequence against the backbone chain.
    fn chain_alignment(length: usize) -> Alignment {
        let pairs = (0..length).map(|i| (Some(i), Some(i))).collect();
        Alignment::new(pairs, 0)
    }

    #[test]
    fn test_backbone_consensus() {
        let graph = AlignmentGraph::from_backbone(b"ACGTACGT", &[1; 8]);
        assert_eq!(graph.node_count(), 8);
        assert_eq!(graph.edge_count(), 7);
        let (consensus, coverage) = graph.generate_consensus();
        assert_eq!(consensus, b"ACGTACGT");
        assert_eq!(coverage, vec![1; 8]);
    }

    #[test]
    fn test_add_matching_sequence() {
        let mut graph = AlignmentGraph::from_backbone(b"ACGT", &[1; 4]);
        graph.add_alignment(&chain_alignment(4), b"ACGT", &[1; 4]);

        // no new nodes, doubled coverage
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.sequence_count(), 2);
        let (consensus, coverage) = graph.generate_consensus();
        assert_eq!(consensus, b"ACGT");
        assert_eq!(coverage, vec![2; 4]);
    }

    #[test]
    fn test_mismatch_creates_column_branch() {
        let mut graph = AlignmentGraph::from_backbone(b"ACGT", &[1; 4]);
        // two reads voting T at position 1 outvote the backbone's C
        graph.add_alignment(&chain_alignment(4), b"ATGT", &[1; 4]);
        graph.add_alignment(&chain_alignment(4), b"ATGT", &[1; 4]);

        // one extra node in column 1, registered both ways
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.aligned_nodes(1), &[4]);
        assert_eq!(graph.aligned_nodes(4), &[1]);

        let (consensus, _) = graph.generate_consensus();
        assert_eq!(consensus, b"ATGT");
    }

    #[test]
    fn test_coverage_invariant() {
        let mut graph = AlignmentGraph::from_backbone(b"ACGT", &[1; 4]);
        graph.add_alignment(&chain_alignment(4), b"ATGT", &[1; 4]);
        graph.add_alignment(&chain_alignment(4), b"ACGT", &[1; 4]);

        let total = graph.sequence_count();
        // per column, the coverage over all members equals the sequences that
        // aligned there and never exceeds the total sequence count
        for u in 0..4 {
            let mut column_coverage = graph.coverage(u);
            for &a in graph.aligned_nodes(u).iter() {
                column_coverage += graph.coverage(a);
            }
            assert_eq!(column_coverage, total);
        }
    }

    #[test]
    fn test_insertion_node() {
        let mut graph = AlignmentGraph::from_backbone(b"ACGT", &[1; 4]);
        // AC[A]GT: insertion between positions 1 and 2
        let pairs = vec![
            (Some(0), Some(0)),
            (Some(1), Some(1)),
            (None, Some(2)),
            (Some(2), Some(3)),
            (Some(3), Some(4)),
        ];
        graph.add_alignment(&Alignment::new(pairs, 0), b"ACAGT", &[1; 5]);
        assert_eq!(graph.node_count(), 5);
        // the insertion node sits on its own, not in any column
        assert!(graph.aligned_nodes(4).is_empty());
    }

    #[test]
    fn test_subgraph_round_trip() {
        let mut graph = AlignmentGraph::from_backbone(b"ACGTACGT", &[1; 8]);
        graph.add_alignment(&chain_alignment(8), b"ACGTACGT", &[1; 8]);

        let (sub, to_parent) = graph.subgraph(2, 5);
        assert_eq!(sub.node_count(), 4);
        let (sub_consensus, _) = sub.generate_consensus();
        assert_eq!(sub_consensus, b"GTAC");

        // a subgraph-local all-match alignment translates back to parent ids 2..=5
        let local = Alignment::new((0..4).map(|i| (Some(i), Some(i))).collect(), 0);
        let translated = graph.update_alignment(local, &to_parent);
        let nodes: Vec<NodeId> = translated.pairs().iter().map(|p| p.0.unwrap()).collect();
        assert_eq!(nodes, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_deterministic_ranks() {
        let build = || {
            let mut graph = AlignmentGraph::from_backbone(b"ACGT", &[1; 4]);
            graph.add_alignment(&chain_alignment(4), b"AGGT", &[1; 4]);
            graph.rank_to_node().to_vec()
        };
        assert_eq!(build(), build());
    }

    #[test]
    #[should_panic]
    fn test_empty_backbone_aborts() {
        let _ = AlignmentGraph::from_backbone(b"", &[]);
    }
}
