
/*!
This module provides the window abstraction: a slice of a target sequence together with
the read pieces (layers) that overlap it. Each window builds its own alignment graph,
folds the layers in sorted order, and reports the heaviest-path consensus. Layers that
reach both window flanks are aligned against the full graph; interior layers are aligned
against the banded subgraph spanning their placement to keep the quadratic fill small.
*/

use itertools::Itertools;
use log::warn;

use crate::aligner::AlignmentEngine;
use crate::graph::AlignmentGraph;

/// Sequencing technology the window's layers come from. Long-read windows may trim
/// weakly supported consensus flanks, short-read windows never do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowKind {
    ShortRead,
    LongRead,
}

/// A read piece placed on the window backbone. `begin`/`end` are backbone-local
/// coordinates, end exclusive.
#[derive(Clone, Debug)]
struct Layer {
    bases: Vec<u8>,
    weights: Vec<u32>,
    begin: usize,
    end: usize,
}

/// One consensus unit: a backbone slice plus its overlapping layers.
#[derive(Clone, Debug)]
pub struct Window {
    /// Index of the target sequence this window belongs to
    id: u64,
    /// Position of this window on the target
    rank: u32,
    kind: WindowKind,
    backbone: Vec<u8>,
    backbone_weights: Vec<u32>,
    layers: Vec<Layer>,
}

impl Window {
    /// Creates a window over a backbone slice.
    /// # Arguments
    /// * `id` - index of the owning target sequence
    /// * `rank` - index of this window on the target
    /// * `kind` - the sequencing technology of the layers
    /// * `backbone` - the target slice the window covers
    /// * `backbone_weights` - per-base weights for the backbone slice
    pub fn new(
        id: u64,
        rank: u32,
        kind: WindowKind,
        backbone: Vec<u8>,
        backbone_weights: Vec<u32>,
    ) -> Window {
        assert_eq!(backbone.len(), backbone_weights.len());
        Window {
            id,
            rank,
            kind,
            backbone,
            backbone_weights,
            layers: vec![],
        }
    }

    /// Places a read piece on the window. Degenerate (empty) pieces are ignored;
    /// placements outside the backbone are caller errors and abort.
    /// # Arguments
    /// * `bases` - the read piece
    /// * `weights` - per-base weights, same length as `bases`
    /// * `begin` - placement start on the backbone, inclusive
    /// * `end` - placement end on the backbone, exclusive
    pub fn add_layer(&mut self, bases: &[u8], weights: &[u32], begin: usize, end: usize) {
        if bases.is_empty() {
            return;
        }
        assert_eq!(bases.len(), weights.len());
        assert!(
            begin < end && end <= self.backbone.len(),
            "Layer placement [{}, {}) escapes window of length {}.",
            begin,
            end,
            self.backbone.len()
        );
        self.layers.push(Layer {
            bases: bases.to_vec(),
            weights: weights.to_vec(),
            begin,
            end,
        });
    }

    /// Builds the consensus over the backbone and all layers. With fewer than three
    /// sequences in total the backbone is returned unchanged and the flag is false.
    /// Layers within 1% of both window flanks go through the full graph, the rest
    /// through the subgraph between their placement bounds. For long-read windows with
    /// `trim` set, consensus flanks supported by fewer than half the layers are cut off;
    /// if that would empty the consensus the window is left untrimmed and flagged as
    /// possibly chimeric.
    pub fn generate_consensus(&self, engine: &AlignmentEngine, trim: bool) -> (Vec<u8>, bool) {
        if self.layers.len() + 1 < 3 {
            return (self.backbone.clone(), false);
        }

        let mut graph = AlignmentGraph::from_backbone(&self.backbone, &self.backbone_weights);
        let offset = (0.01 * self.backbone.len() as f64) as usize;
        for layer in self.layers.iter().sorted_by_key(|l| (l.begin, l.end)) {
            if layer.begin < offset && layer.end > self.backbone.len() - offset {
                let alignment = engine.align(&layer.bases, &graph);
                graph.add_alignment(&alignment, &layer.bases, &layer.weights);
            } else {
                let (subgraph, to_parent) = graph.subgraph(layer.begin, layer.end - 1);
                let alignment = engine.align(&layer.bases, &subgraph);
                let alignment = graph.update_alignment(alignment, &to_parent);
                graph.add_alignment(&alignment, &layer.bases, &layer.weights);
            }
        }

        let (mut consensus, coverage) = graph.generate_consensus();
        if self.kind == WindowKind::LongRead && trim {
            let threshold = (self.layers.len() / 2) as u32;
            let begin = coverage.iter().position(|&c| c >= threshold);
            let end = coverage.iter().rposition(|&c| c >= threshold);
            match (begin, end) {
                (Some(begin), Some(end)) if begin < end => {
                    consensus = consensus[begin..=end].to_vec();
                }
                _ => {
                    warn!(
                        "Window {} of sequence {} might be chimeric.",
                        self.rank, self.id
                    );
                }
            }
        }
        (consensus, true)
    }

    // getters
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn backbone(&self) -> &[u8] {
        &self.backbone
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner_config::AlignmentType;

    fn engine() -> AlignmentEngine {
        AlignmentEngine::new(AlignmentType::Global, Default::default()).unwrap()
    }

    fn window(kind: WindowKind, backbone: &[u8]) -> Window {
        Window::new(0, 0, kind, backbone.to_vec(), vec![1; backbone.len()])
    }

    #[test]
    fn test_too_few_layers_keeps_backbone() {
        let mut w = window(WindowKind::ShortRead, b"ACGTACGT");
        w.add_layer(b"ACGTACGT", &[1; 8], 0, 8);
        let (consensus, polished) = w.generate_consensus(&engine(), false);
        assert_eq!(consensus, b"ACGTACGT");
        assert!(!polished);
    }

    #[test]
    fn test_layers_outvote_backbone_error() {
        // the backbone carries a G where every read shows T
        let mut w = window(WindowKind::ShortRead, b"ACGTAGGTACGT");
        for _ in 0..3 {
            w.add_layer(b"ACGTATGTACGT", &[2; 12], 0, 12);
        }
        let (consensus, polished) = w.generate_consensus(&engine(), false);
        assert!(polished);
        assert_eq!(consensus, b"ACGTATGTACGT");
    }

    #[test]
    fn test_degenerate_layer_ignored() {
        let mut w = window(WindowKind::ShortRead, b"ACGT");
        w.add_layer(b"", &[], 0, 4);
        assert_eq!(w.layer_count(), 0);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_layer_aborts() {
        let mut w = window(WindowKind::ShortRead, b"ACGT");
        w.add_layer(b"ACGTT", &[1; 5], 0, 5);
    }

    #[test]
    fn test_consensus_is_deterministic() {
        let mut w = window(WindowKind::ShortRead, b"ACGTAGGTACGTAAACCGT");
        w.add_layer(b"ACGTATGTACGTAACCGT", &[3; 18], 0, 19);
        w.add_layer(b"ACGTATGTACGGTAAACCGT", &[2; 20], 0, 19);
        w.add_layer(b"ACTTATGTACGTAAACCGT", &[1; 19], 0, 19);
        let (first, _) = w.generate_consensus(&engine(), false);
        let (second, _) = w.generate_consensus(&engine(), false);
        assert_eq!(first, second);
    }

    #[test_log::test]
    fn test_long_read_trimming() {
        let backbone = b"AAAACCCCGGGGTTTTACGT";
        let mut w = window(WindowKind::LongRead, backbone);
        // five layers supporting only the middle of the backbone
        for _ in 0..5 {
            w.add_layer(&backbone[5..15], &[1; 10], 5, 15);
        }
        let (consensus, polished) = w.generate_consensus(&engine(), true);
        assert!(polished);
        assert_eq!(consensus, &backbone[5..15]);

        // without trimming the full backbone survives
        let (untrimmed, _) = w.generate_consensus(&engine(), false);
        assert_eq!(untrimmed, backbone);
    }
}
