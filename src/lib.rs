/*!
# poa_polish
This library provides assembly polishing through partial-order alignment consensus: draft
sequences are split into fixed-length windows, the reads overlapping each window are
folded into an alignment graph, and the heaviest path through the graph replaces the
draft.

Key benefits:
* Window-level consensus keeps the quadratic alignment fill small regardless of target length
* Three alignment objectives and three gap models, selected from the penalty relations
* Interchangeable scalar and blocked matrix fills with identical scores

Performance notes:
* Matrices are filled in 16-bit scores whenever a pre-alignment bound allows it
* Finding breakpoints and building window consensi both spread over a worker pool

# Example usage
```rust
use poa_polish::aligner::AlignmentEngine;
use poa_polish::aligner_config::AlignmentType;
use poa_polish::graph::AlignmentGraph;

let backbone = b"ACCGT".to_vec();
let reads = [
    b"ACGT".to_vec(),
    b"ACCGT".to_vec(), // this matches the backbone
    b"ACCGGT".to_vec()
];

// fold all the reads into the graph
let engine = AlignmentEngine::new(AlignmentType::Global, Default::default()).unwrap();
let mut graph = AlignmentGraph::from_backbone(&backbone, &vec![1; backbone.len()]);
for read in reads.iter() {
    let alignment = engine.align(read, &graph);
    graph.add_alignment(&alignment, read, &vec![1; read.len()]);
}

// the backbone is its own best supported spelling here
let (consensus, _coverage) = graph.generate_consensus();
assert_eq!(consensus, backbone);
```
*/

/// Graph-to-sequence alignment engine
pub mod aligner;
/// Configuration for the alignment engine
pub mod aligner_config;
/// Blocked row-pass matrix fill
pub mod blocked_aligner;
/// Utility for generating examples
pub mod example_gen;
/// Partial-order alignment graph
pub mod graph;
/// Overlap records and breakpoint finding
pub mod overlap;
/// End-to-end polishing pipeline
pub mod pipeline;
/// Configuration for the polishing pipeline
pub mod polish_config;
/// Cell-by-cell reference matrix fill
pub mod scalar_aligner;
/// Sequence records with cached reverse complements
pub mod sequence;
/// Basic pair-wise alignment utilities
pub mod sequence_alignment;
/// Window partition and per-window consensus
pub mod window;
