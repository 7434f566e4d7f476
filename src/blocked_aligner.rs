
/*!
This module provides the blocked matrix fill. Instead of finishing one cell before the
next, each row is computed in whole-row passes: a substitution profile is built for the
row's base, then every predecessor row contributes its vertical and diagonal candidates
across all columns at once, and only the inherently sequential horizontal-gap scan runs
cell by cell. The per-predecessor passes have no loop-carried dependency, which lets the
compiler turn them into wide lanes. Scores are identical to the scalar backend.
*/

use crate::aligner::{DpState, FillContext, FillParams, Score};
use crate::aligner_config::AlignmentType;

pub(crate) fn fill<S: Score>(
    state: &mut DpState<S>,
    context: &FillContext,
    params: &FillParams<S>,
    alignment_type: AlignmentType,
) {
    let width = state.width;
    let convex = !state.o.is_empty();
    let mut profile: Vec<S> = vec![S::ZERO; width];
    let mut diagonal: Vec<S> = vec![S::MIN_SCORE; width];

    for row in 1..=context.row_nodes.len() {
        let node = context.row_nodes[row - 1];
        let code = context.graph.code(node);
        let preds = &context.pred_rows[row - 1];
        let offset = row * width;

        for j in 1..width {
            profile[j] = params.substitution(code, context.query[j - 1]);
        }
        for value in diagonal.iter_mut() {
            *value = S::MIN_SCORE;
        }

        // every predecessor row is already final, so the row splits off cleanly
        let (h_done, h_rest) = state.h.split_at_mut(offset);
        let h_row = &mut h_rest[..width];
        let (f_done, f_rest) = state.f.split_at_mut(offset);
        let f_row = &mut f_rest[..width];
        for &p in preds.iter() {
            let h_pred = &h_done[p * width..p * width + width];
            let f_pred = &f_done[p * width..p * width + width];
            for j in 0..width {
                f_row[j] = f_row[j]
                    .max(h_pred[j].add(params.gap_open))
                    .max(f_pred[j].add(params.gap_extend));
            }
            for j in 1..width {
                diagonal[j] = diagonal[j].max(h_pred[j - 1].add(profile[j]));
            }
        }
        if convex {
            let second_open = params.second_gap_open.unwrap();
            let second_extend = params.second_gap_extend.unwrap();
            let (o_done, o_rest) = state.o.split_at_mut(offset);
            let o_row = &mut o_rest[..width];
            for &p in preds.iter() {
                let h_pred = &h_done[p * width..p * width + width];
                let o_pred = &o_done[p * width..p * width + width];
                for j in 0..width {
                    o_row[j] = o_row[j]
                        .max(h_pred[j].add(second_open))
                        .max(o_pred[j].add(second_extend));
                }
            }
        }

        // horizontal gaps carry across the row, so this pass stays sequential
        let e_row = &mut state.e[offset..offset + width];
        h_row[0] = match alignment_type {
            AlignmentType::Global => {
                let mut h = f_row[0];
                if convex {
                    h = h.max(state.o[offset]);
                }
                h
            }
            AlignmentType::Local | AlignmentType::SemiGlobal => S::ZERO,
        };
        if convex {
            let second_open = params.second_gap_open.unwrap();
            let second_extend = params.second_gap_extend.unwrap();
            let q_row = &mut state.q[offset..offset + width];
            for j in 1..width {
                let e_best = h_row[j - 1]
                    .add(params.gap_open)
                    .max(e_row[j - 1].add(params.gap_extend));
                e_row[j] = e_best;
                let q_best = h_row[j - 1]
                    .add(second_open)
                    .max(q_row[j - 1].add(second_extend));
                q_row[j] = q_best;
                let mut h = diagonal[j]
                    .max(f_row[j])
                    .max(e_best)
                    .max(state.o[offset + j])
                    .max(q_best);
                if params.local {
                    h = h.max(S::ZERO);
                }
                h_row[j] = h;
            }
        } else {
            for j in 1..width {
                let e_best = h_row[j - 1]
                    .add(params.gap_open)
                    .max(e_row[j - 1].add(params.gap_extend));
                e_row[j] = e_best;
                let mut h = diagonal[j].max(f_row[j]).max(e_best);
                if params.local {
                    h = h.max(S::ZERO);
                }
                h_row[j] = h;
            }
        }
    }
}
