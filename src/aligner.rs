
/*!
This module provides the alignment engine that aligns a sequence against a partial-order
alignment graph. The dynamic program generalizes Needleman-Wunsch over the graph's
topological ranks: every node owns a matrix row and recurrences reach back through all of
its predecessor rows, with a virtual row 0 standing in for "nothing consumed yet". Three
objectives (global, local, semi-global) and three gap models (linear, affine, convex) are
supported, the matrices are filled in `i16` when a pre-alignment bound proves the scores
fit and in `i32` otherwise, and two interchangeable fill backends produce identical
scores.

# Example usage
```rust
use poa_polish::aligner::{AlignmentEngine, Backend};
use poa_polish::aligner_config::{AlignerConfig, AlignmentType};
use poa_polish::graph::AlignmentGraph;

let engine = AlignmentEngine::new(AlignmentType::Global, AlignerConfig::default()).unwrap();
let graph = AlignmentGraph::from_backbone(b"ACGT", &[1; 4]);
let alignment = engine.align(b"ACGT", &graph);
assert_eq!(alignment.score(), 12);
```
*/

use crate::aligner_config::{AlignerConfig, AlignmentType, GapModel};
use crate::blocked_aligner;
use crate::graph::{AlignmentGraph, NodeId};
use crate::scalar_aligner;

/// The result of aligning a sequence against a graph: ordered (node, sequence position)
/// pairs where `None` on either side marks a gap, plus the alignment score.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Alignment {
    pairs: Vec<(Option<NodeId>, Option<usize>)>,
    score: i64,
}

impl Alignment {
    pub fn new(pairs: Vec<(Option<NodeId>, Option<usize>)>, score: i64) -> Alignment {
        Alignment { pairs, score }
    }

    pub fn pairs(&self) -> &[(Option<NodeId>, Option<usize>)] {
        &self.pairs
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Numeric width the matrices are filled in. Additions saturate so the sentinel never
/// wraps around.
pub(crate) trait Score: Copy + Ord + std::fmt::Debug {
    /// Sentinel for unreachable cells, far enough from the true minimum that adding a
    /// penalty cannot wrap
    const MIN_SCORE: Self;
    const ZERO: Self;
    fn from_i32(value: i32) -> Self;
    fn to_i64(self) -> i64;
    fn add(self, other: Self) -> Self;
}

impl Score for i16 {
    const MIN_SCORE: Self = i16::MIN / 2;
    const ZERO: Self = 0;
    fn from_i32(value: i32) -> Self {
        value as i16
    }
    fn to_i64(self) -> i64 {
        self as i64
    }
    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl Score for i32 {
    const MIN_SCORE: Self = i32::MIN / 2;
    const ZERO: Self = 0;
    fn from_i32(value: i32) -> Self {
        value
    }
    fn to_i64(self) -> i64 {
        self as i64
    }
    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

/// The dynamic programming matrices, row-major with `width` columns. `o` and `q` are the
/// secondary vertical/horizontal gap matrices and stay empty outside the convex model.
pub(crate) struct DpState<S> {
    pub h: Vec<S>,
    pub f: Vec<S>,
    pub e: Vec<S>,
    pub o: Vec<S>,
    pub q: Vec<S>,
    pub width: usize,
}

impl<S: Score> DpState<S> {
    fn new(rows: usize, width: usize, convex: bool) -> DpState<S> {
        let cells = rows * width;
        DpState {
            h: vec![S::MIN_SCORE; cells],
            f: vec![S::MIN_SCORE; cells],
            e: vec![S::MIN_SCORE; cells],
            o: if convex { vec![S::MIN_SCORE; cells] } else { vec![] },
            q: if convex { vec![S::MIN_SCORE; cells] } else { vec![] },
            width,
        }
    }
}

/// Scoring parameters resolved for one alignment run.
pub(crate) struct FillParams<S> {
    pub match_score: S,
    pub mismatch_score: S,
    pub gap_open: S,
    pub gap_extend: S,
    pub second_gap_open: Option<S>,
    pub second_gap_extend: Option<S>,
    /// clamp every cell at zero
    pub local: bool,
}

impl<S: Score> FillParams<S> {
    pub fn substitution(&self, graph_code: u8, query_code: u8) -> S {
        if graph_code == query_code {
            self.match_score
        } else {
            self.mismatch_score
        }
    }
}

/// Graph topology resolved into matrix-row terms: `row_nodes[i - 1]` is the node owning
/// row `i`, and `pred_rows[i - 1]` its predecessor rows, `[0]` for rank sources.
pub(crate) struct FillContext<'a> {
    pub graph: &'a AlignmentGraph,
    pub query: &'a [u8],
    pub row_nodes: &'a [NodeId],
    pub pred_rows: &'a [Vec<usize>],
}

/// Which matrix-fill implementation to run. Both produce identical scores; `Scalar` is
/// the straightforward cell-by-cell reference, `Blocked` sweeps whole rows per
/// predecessor so the compiler can vectorize the independent lanes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backend {
    Scalar,
    #[default]
    Blocked,
}

/// Traceback replay state, one variant per matrix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Replay {
    H,
    F,
    E,
    O,
    Q,
}

/// A configured aligner, reusable across alignments.
#[derive(Clone, Copy, Debug)]
pub struct AlignmentEngine {
    alignment_type: AlignmentType,
    config: AlignerConfig,
    gap_model: GapModel,
    backend: Backend,
}

impl AlignmentEngine {
    /// Creates an engine with the default blocked backend. The gap model is derived from
    /// the penalty relations in `config`.
    /// # Arguments
    /// * `alignment_type` - the alignment objective
    /// * `config` - the scoring parameters
    /// # Errors
    /// * if `config` fails validation
    pub fn new(
        alignment_type: AlignmentType,
        config: AlignerConfig,
    ) -> Result<AlignmentEngine, Box<dyn std::error::Error>> {
        config.validate()?;
        Ok(AlignmentEngine {
            alignment_type,
            config,
            gap_model: config.gap_model(),
            backend: Default::default(),
        })
    }

    /// Replaces the fill backend.
    pub fn with_backend(mut self, backend: Backend) -> AlignmentEngine {
        self.backend = backend;
        self
    }

    pub fn alignment_type(&self) -> AlignmentType {
        self.alignment_type
    }

    pub fn gap_model(&self) -> GapModel {
        self.gap_model
    }

    /// Aligns `bases` against `graph`. An empty sequence or graph yields an empty
    /// alignment. Scores are computed in `i16` when `(ranks + n + 2) * max_penalty`
    /// proves they fit, otherwise in `i32`.
    pub fn align(&self, bases: &[u8], graph: &AlignmentGraph) -> Alignment {
        if bases.is_empty() || graph.is_empty() {
            return Default::default();
        }

        let bound = (graph.node_count() + bases.len() + 2) as i64 * self.config.max_penalty();
        if bound <= (i16::MAX / 2) as i64 {
            self.align_width::<i16>(bases, graph)
        } else {
            self.align_width::<i32>(bases, graph)
        }
    }

    fn align_width<S: Score>(&self, bases: &[u8], graph: &AlignmentGraph) -> Alignment {
        let row_nodes = graph.rank_to_node();
        let pred_rows: Vec<Vec<usize>> = row_nodes
            .iter()
            .map(|&u| {
                if graph.has_predecessors(u) {
                    graph.predecessors(u).map(|p| graph.rank_of(p) + 1).collect()
                } else {
                    vec![0]
                }
            })
            .collect();
        let context = FillContext {
            graph,
            query: bases,
            row_nodes,
            pred_rows: &pred_rows,
        };
        let params = self.resolve_params::<S>();

        let rows = row_nodes.len() + 1;
        let width = bases.len() + 1;
        let mut state = DpState::<S>::new(rows, width, self.gap_model == GapModel::Convex);
        self.initialize_first_row(&mut state, bases.len(), &params);

        match self.backend {
            Backend::Scalar => scalar_aligner::fill(&mut state, &context, &params, self.alignment_type),
            Backend::Blocked => blocked_aligner::fill(&mut state, &context, &params, self.alignment_type),
        }

        let (end_row, end_column) = self.find_end_cell(&state, &context);
        let score = state.h[end_row * width + end_column].to_i64();
        let pairs = self.traceback(&state, &context, &params, (end_row, end_column));
        Alignment::new(pairs, score)
    }

    /// Maps the configured penalties onto the gap matrices: linear runs as affine with
    /// open == extend, convex adds the secondary pair.
    fn resolve_params<S: Score>(&self) -> FillParams<S> {
        let (gap_open, gap_extend, second_gap_open, second_gap_extend) = match self.gap_model {
            GapModel::Linear => (self.config.gap_open, self.config.gap_open, None, None),
            GapModel::Affine => (self.config.gap_open, self.config.gap_extend, None, None),
            GapModel::Convex => (
                self.config.gap_open,
                self.config.gap_extend,
                self.config.second_gap_open,
                self.config.second_gap_extend,
            ),
        };
        FillParams {
            match_score: S::from_i32(self.config.match_score),
            mismatch_score: S::from_i32(self.config.mismatch_score),
            gap_open: S::from_i32(gap_open),
            gap_extend: S::from_i32(gap_extend),
            second_gap_open: second_gap_open.map(S::from_i32),
            second_gap_extend: second_gap_extend.map(S::from_i32),
            local: self.alignment_type == AlignmentType::Local,
        }
    }

    /// Seeds the virtual row 0. Global charges leading query gaps, local and semi-global
    /// leave them free.
    fn initialize_first_row<S: Score>(&self, state: &mut DpState<S>, n: usize, params: &FillParams<S>) {
        state.h[0] = S::ZERO;
        match self.alignment_type {
            AlignmentType::Global => {
                let mut gap = params.gap_open;
                let mut second_gap = params.second_gap_open;
                for j in 1..=n {
                    let mut best = gap;
                    if let Some(g) = second_gap {
                        best = best.max(g);
                        second_gap = Some(g.add(params.second_gap_extend.unwrap()));
                    }
                    state.h[j] = best;
                    gap = gap.add(params.gap_extend);
                }
            }
            AlignmentType::Local | AlignmentType::SemiGlobal => {
                for j in 1..=n {
                    state.h[j] = S::ZERO;
                }
            }
        }
    }

    /// Picks the traceback start: global scans the last column of sink rows, semi-global
    /// additionally every cell of sink rows and the last column of every row, local the
    /// whole matrix. Ties keep the earliest rank, then the smallest column.
    fn find_end_cell<S: Score>(&self, state: &DpState<S>, context: &FillContext) -> (usize, usize) {
        let width = state.width;
        let n = width - 1;
        let mut best = match self.alignment_type {
            AlignmentType::Local => (S::ZERO, 0, 0),
            _ => (S::MIN_SCORE, 0, 0),
        };
        let mut consider = |value: S, row: usize, column: usize| {
            if value > best.0 {
                best = (value, row, column);
            }
        };
        match self.alignment_type {
            AlignmentType::Global => {
                for (rank, &u) in context.row_nodes.iter().enumerate() {
                    if context.graph.is_sink(u) {
                        consider(state.h[(rank + 1) * width + n], rank + 1, n);
                    }
                }
            }
            AlignmentType::SemiGlobal => {
                for rank in 0..context.row_nodes.len() {
                    consider(state.h[(rank + 1) * width + n], rank + 1, n);
                }
                for (rank, &u) in context.row_nodes.iter().enumerate() {
                    if context.graph.is_sink(u) {
                        for j in 0..=n {
                            consider(state.h[(rank + 1) * width + j], rank + 1, j);
                        }
                    }
                }
            }
            AlignmentType::Local => {
                for row in 1..=context.row_nodes.len() {
                    for j in 1..=n {
                        consider(state.h[row * width + j], row, j);
                    }
                }
            }
        }
        (best.1, best.2)
    }

    /// Recovers the pair list by replaying the recurrences from the end cell, preferring
    /// diagonal over vertical over horizontal moves.
    fn traceback<S: Score>(
        &self,
        state: &DpState<S>,
        context: &FillContext,
        params: &FillParams<S>,
        end: (usize, usize),
    ) -> Vec<(Option<NodeId>, Option<usize>)> {
        let width = state.width;
        let (mut row, mut column) = end;
        let mut pairs = vec![];
        let mut replay = Replay::H;
        loop {
            match replay {
                Replay::H => {
                    let here = state.h[row * width + column];
                    if params.local && here == S::ZERO {
                        break;
                    }
                    if row == 0 && column == 0 {
                        break;
                    }
                    if self.alignment_type == AlignmentType::SemiGlobal && (row == 0 || column == 0) {
                        break;
                    }
                    if row == 0 {
                        // leading insertions charged on the virtual row
                        pairs.push((None, Some(column - 1)));
                        column -= 1;
                        continue;
                    }
                    let node = context.row_nodes[row - 1];
                    if column > 0 {
                        let score =
                            params.substitution(context.graph.code(node), context.query[column - 1]);
                        let diagonal = context.pred_rows[row - 1]
                            .iter()
                            .find(|&&p| state.h[p * width + column - 1].add(score) == here)
                            .copied();
                        if let Some(p) = diagonal {
                            pairs.push((Some(node), Some(column - 1)));
                            row = p;
                            column -= 1;
                            continue;
                        }
                    }
                    if state.f[row * width + column] == here {
                        replay = Replay::F;
                    } else if !state.o.is_empty() && state.o[row * width + column] == here {
                        replay = Replay::O;
                    } else if column > 0 && state.e[row * width + column] == here {
                        replay = Replay::E;
                    } else if column > 0 && !state.q.is_empty() && state.q[row * width + column] == here
                    {
                        replay = Replay::Q;
                    } else {
                        unreachable!("Traceback lost its path.");
                    }
                }
                Replay::F | Replay::O => {
                    let (matrix, open, extend) = if replay == Replay::F {
                        (&state.f, params.gap_open, params.gap_extend)
                    } else {
                        (&state.o, params.second_gap_open.unwrap(), params.second_gap_extend.unwrap())
                    };
                    let here = matrix[row * width + column];
                    let node = context.row_nodes[row - 1];
                    let mut moved = false;
                    for &p in context.pred_rows[row - 1].iter() {
                        if state.h[p * width + column].add(open) == here {
                            pairs.push((Some(node), None));
                            row = p;
                            replay = Replay::H;
                            moved = true;
                            break;
                        }
                        if matrix[p * width + column].add(extend) == here {
                            pairs.push((Some(node), None));
                            row = p;
                            moved = true;
                            break;
                        }
                    }
                    assert!(moved, "Traceback lost its path.");
                }
                Replay::E | Replay::Q => {
                    let (matrix, open, extend) = if replay == Replay::E {
                        (&state.e, params.gap_open, params.gap_extend)
                    } else {
                        (&state.q, params.second_gap_open.unwrap(), params.second_gap_extend.unwrap())
                    };
                    let here = matrix[row * width + column];
                    if state.h[row * width + column - 1].add(open) == here {
                        pairs.push((None, Some(column - 1)));
                        column -= 1;
                        replay = Replay::H;
                    } else if matrix[row * width + column - 1].add(extend) == here {
                        pairs.push((None, Some(column - 1)));
                        column -= 1;
                    } else {
                        unreachable!("Traceback lost its path.");
                    }
                }
            }
        }
        pairs.reverse();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner_config::AlignerConfigBuilder;

    fn engine(alignment_type: AlignmentType) -> AlignmentEngine {
        AlignmentEngine::new(alignment_type, Default::default()).unwrap()
    }

    fn backbone(bases: &[u8]) -> AlignmentGraph {
        AlignmentGraph::from_backbone(bases, &vec![1; bases.len()])
    }

    #[test]
    fn test_global_exact_match() {
        let graph = backbone(b"ACGTACGT");
        let alignment = engine(AlignmentType::Global).align(b"ACGTACGT", &graph);
        assert_eq!(alignment.score(), 24);
        assert_eq!(alignment.pairs().len(), 8);
        for (j, &(opt_node, opt_seq)) in alignment.pairs().iter().enumerate() {
            assert_eq!(opt_node, Some(j));
            assert_eq!(opt_seq, Some(j));
        }
    }

    #[test]
    fn test_global_deletion() {
        let graph = backbone(b"ACGT");
        let alignment = engine(AlignmentType::Global).align(b"AGT", &graph);
        // A-GT: three matches and one opened gap
        assert_eq!(alignment.score(), 3 * 3 - 4);
        assert_eq!(
            alignment.pairs(),
            &[
                (Some(0), Some(0)),
                (Some(1), None),
                (Some(2), Some(1)),
                (Some(3), Some(2)),
            ]
        );
    }

    #[test]
    fn test_global_insertion() {
        let graph = backbone(b"ACGT");
        let alignment = engine(AlignmentType::Global).align(b"ACGGT", &graph);
        assert_eq!(alignment.score(), 4 * 3 - 4);
        let inserted: Vec<_> = alignment.pairs().iter().filter(|p| p.0.is_none()).collect();
        assert_eq!(inserted.len(), 1);
    }

    #[test]
    fn test_local_ignores_flanks() {
        let graph = backbone(b"TTTTACGTACGTTTTT");
        let alignment = engine(AlignmentType::Local).align(b"GGGACGTACGTGGG", &graph);
        // only the shared core is reported
        assert_eq!(alignment.score(), 8 * 3);
        assert_eq!(alignment.pairs().len(), 8);
        assert!(alignment.pairs().iter().all(|p| p.0.is_some() && p.1.is_some()));
    }

    #[test]
    fn test_semi_global_suffix_prefix() {
        let graph = backbone(b"TTTTACGT");
        let alignment = engine(AlignmentType::SemiGlobal).align(b"ACGTCCCC", &graph);
        // graph suffix overlaps query prefix, both overhangs free
        assert_eq!(alignment.score(), 4 * 3);
        assert_eq!(alignment.pairs().len(), 4);
    }

    #[test]
    fn test_empty_inputs() {
        let graph = backbone(b"ACGT");
        assert!(engine(AlignmentType::Global).align(b"", &graph).is_empty());
        let empty = AlignmentGraph::new();
        assert!(engine(AlignmentType::Global).align(b"ACGT", &empty).is_empty());
    }

    #[test]
    fn test_convex_prefers_long_gaps() {
        let affine_config = AlignerConfigBuilder::default()
            .match_score(3)
            .mismatch_score(-5)
            .gap_open(-8)
            .gap_extend(-6)
            .build()
            .unwrap();
        let convex_config = AlignerConfigBuilder::default()
            .match_score(3)
            .mismatch_score(-5)
            .gap_open(-8)
            .gap_extend(-6)
            .second_gap_open(Some(-10))
            .second_gap_extend(Some(-2))
            .build()
            .unwrap();
        let affine = AlignmentEngine::new(AlignmentType::Global, affine_config).unwrap();
        let convex = AlignmentEngine::new(AlignmentType::Global, convex_config).unwrap();
        assert_eq!(affine.gap_model(), GapModel::Affine);
        assert_eq!(convex.gap_model(), GapModel::Convex);

        let graph = backbone(b"ACGTACGTACGTACGT");
        let query = b"ACGTACGT";
        // the eight-base deletion is cheaper on the secondary pair
        let affine_score = affine.align(query, &graph).score();
        let convex_score = convex.align(query, &graph).score();
        assert!(convex_score > affine_score);
        assert_eq!(convex_score, 8 * 3 - (10 + 7 * 2));
    }

    #[test]
    fn test_backends_agree() {
        let graph = {
            let mut graph = backbone(b"ACGTTACGATTAGCAT");
            let noisy = engine(AlignmentType::Global).align(b"ACGTTACCATTAGAT", &graph);
            graph.add_alignment(&noisy, b"ACGTTACCATTAGAT", &[2; 15]);
            graph
        };
        let configs = [
            AlignerConfig::default(),
            AlignerConfigBuilder::default()
                .gap_open(-8)
                .gap_extend(-6)
                .build()
                .unwrap(),
            AlignerConfigBuilder::default()
                .gap_open(-8)
                .gap_extend(-6)
                .second_gap_open(Some(-10))
                .second_gap_extend(Some(-2))
                .build()
                .unwrap(),
        ];
        for config in configs {
            for alignment_type in [AlignmentType::Global, AlignmentType::Local, AlignmentType::SemiGlobal] {
                let scalar = AlignmentEngine::new(alignment_type, config)
                    .unwrap()
                    .with_backend(Backend::Scalar);
                let blocked = AlignmentEngine::new(alignment_type, config)
                    .unwrap()
                    .with_backend(Backend::Blocked);
                let query = b"ACGTTACGATTAGAT";
                assert_eq!(
                    scalar.align(query, &graph).score(),
                    blocked.align(query, &graph).score()
                );
            }
        }
    }

    #[test]
    fn test_consensus_round_trip() {
        let truth = b"ACGTTAGCATCGGATCGATT";
        let reads: [&[u8]; 3] = [
            b"ACGTTAGCATCGGATCGATT",
            b"ACGTTAGCATCGGATCGATT",
            b"ACGTTAGCATCGGTCGATT",
        ];
        let mut graph = backbone(b"ACGTTACCATCGGTCGATT");
        let aligner = engine(AlignmentType::Global);
        for read in reads {
            let alignment = aligner.align(read, &graph);
            graph.add_alignment(&alignment, read, &vec![1; read.len()]);
        }
        let (consensus, _) = graph.generate_consensus();
        assert_eq!(consensus, truth);
    }
}
