
/*!
This module provides the reference matrix fill: one cell at a time, every recurrence
evaluated in place. It is the easiest implementation to audit and the blocked backend is
held to its scores.
*/

use crate::aligner::{DpState, FillContext, FillParams, Score};
use crate::aligner_config::AlignmentType;

/// Fills all matrices row by row in topological order. Row 0 must already be seeded.
pub(crate) fn fill<S: Score>(
    state: &mut DpState<S>,
    context: &FillContext,
    params: &FillParams<S>,
    alignment_type: AlignmentType,
) {
    let width = state.width;
    let convex = !state.o.is_empty();

    for row in 1..=context.row_nodes.len() {
        let node = context.row_nodes[row - 1];
        let code = context.graph.code(node);
        let preds = &context.pred_rows[row - 1];
        let offset = row * width;

        // column 0 takes vertical moves only
        let mut f_best = S::MIN_SCORE;
        let mut o_best = S::MIN_SCORE;
        for &p in preds.iter() {
            let pred_offset = p * width;
            f_best = f_best
                .max(state.h[pred_offset].add(params.gap_open))
                .max(state.f[pred_offset].add(params.gap_extend));
            if convex {
                o_best = o_best
                    .max(state.h[pred_offset].add(params.second_gap_open.unwrap()))
                    .max(state.o[pred_offset].add(params.second_gap_extend.unwrap()));
            }
        }
        state.f[offset] = f_best;
        if convex {
            state.o[offset] = o_best;
        }
        state.h[offset] = match alignment_type {
            AlignmentType::Global => f_best.max(o_best),
            AlignmentType::Local | AlignmentType::SemiGlobal => S::ZERO,
        };

        for j in 1..width {
            let score = params.substitution(code, context.query[j - 1]);
            let mut h_best = S::MIN_SCORE;
            let mut f_best = S::MIN_SCORE;
            let mut o_best = S::MIN_SCORE;
            for &p in preds.iter() {
                let pred_offset = p * width;
                h_best = h_best.max(state.h[pred_offset + j - 1].add(score));
                f_best = f_best
                    .max(state.h[pred_offset + j].add(params.gap_open))
                    .max(state.f[pred_offset + j].add(params.gap_extend));
                if convex {
                    o_best = o_best
                        .max(state.h[pred_offset + j].add(params.second_gap_open.unwrap()))
                        .max(state.o[pred_offset + j].add(params.second_gap_extend.unwrap()));
                }
            }
            let e_best = state.h[offset + j - 1]
                .add(params.gap_open)
                .max(state.e[offset + j - 1].add(params.gap_extend));

            state.f[offset + j] = f_best;
            state.e[offset + j] = e_best;
            let mut h = h_best.max(f_best).max(e_best);
            if convex {
                let q_best = state.h[offset + j - 1]
                    .add(params.second_gap_open.unwrap())
                    .max(state.q[offset + j - 1].add(params.second_gap_extend.unwrap()));
                state.o[offset + j] = o_best;
                state.q[offset + j] = q_best;
                h = h.max(o_best).max(q_best);
            }
            if params.local {
                h = h.max(S::ZERO);
            }
            state.h[offset + j] = h;
        }
    }
}
