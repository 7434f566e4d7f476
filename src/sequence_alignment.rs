
/*!
Pair-wise alignment utilities built on edit-distance wavefronts.
The polishing pipeline uses these to derive a global edit path between an overlapping
read span and its target span when the overlap record carries no CIGAR string.

# Example usage
```rust
use poa_polish::sequence_alignment::{edit_distance, edit_path, EditOp};

let target = b"ACGTACGT";
let query = b"ACGACGT";
assert_eq!(edit_distance(target, query), 1);

let (distance, ops) = edit_path(target, query);
assert_eq!(distance, 1);
// one target base is deleted, everything else matches
assert_eq!(ops.iter().filter(|&&op| op == EditOp::Deletion).count(), 1);
assert_eq!(ops.iter().filter(|&&op| op == EditOp::Match).count(), 7);
```
*/

/// A single step of an edit script. Match and Mismatch consume both sequences,
/// Insertion and Clip consume only the query, Deletion consumes only the target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EditOp {
    Match,
    Mismatch,
    Insertion,
    Deletion,
    /// Soft-clipped query bases (SAM `S`); never produced by `edit_path`
    Clip,
}

/// Sentinel for a wavefront slot that no path has reached yet
const UNREACHED: (usize, usize) = (usize::MAX, usize::MAX);

/// Returns the full global edit distance between a target and a query using
/// edit-distance wavefronts.
/// # Arguments
/// * `target` - the target bytes
/// * `query` - the query bytes
/// # Examples
/// ```rust
/// use poa_polish::sequence_alignment::edit_distance;
/// assert_eq!(edit_distance(b"ACGT", b"ACGT"), 0);
/// assert_eq!(edit_distance(b"ACGT", b"AGGT"), 1);
/// assert_eq!(edit_distance(b"ACGT", b"AT"), 2);
/// ```
pub fn edit_distance(target: &[u8], query: &[u8]) -> usize {
    edit_path(target, query).0
}

/// Computes the global edit distance between a target and a query along with one
/// optimal edit script. Runs in O((|t|+|q|) * d) time and memory, so it stays cheap
/// for the low-error long-read overlaps the pipeline feeds it.
/// # Arguments
/// * `target` - the target bytes; `EditOp::Deletion` consumes these
/// * `query` - the query bytes; `EditOp::Insertion` consumes these
pub fn edit_path(target: &[u8], query: &[u8]) -> (usize, Vec<EditOp>) {
    let l1 = target.len();
    let l2 = query.len();

    // each round e holds furthest-reaching (target, query) positions after the
    // match snake, indexed by diagonal: slot w in round e is diagonal w - e
    // where the diagonal of a cell (i, j) is i - j
    let mut fronts: Vec<Vec<(usize, usize)>> = Vec::new();
    let mut curr: Vec<(usize, usize)> = vec![(0, 0)];
    let mut edits = 0;

    loop {
        // extend every reached slot along its diagonal while the symbols match
        for cell in curr.iter_mut() {
            if *cell == UNREACHED {
                continue;
            }
            let (mut i, mut j) = *cell;
            while i < l1 && j < l2 && target[i] == query[j] {
                i += 1;
                j += 1;
            }
            *cell = (i, j);
        }
        fronts.push(curr);

        if fronts[edits].iter().any(|&(i, j)| i == l1 && j == l2) {
            break;
        }

        // seed the next wavefront with a deletion, mismatch, and insertion from
        // every reached slot; same-diagonal collisions keep the furthest cell
        let prev = &fronts[edits];
        let mut next = vec![UNREACHED; prev.len() + 2];
        for (w, &(i, j)) in prev.iter().enumerate() {
            if (i, j) == UNREACHED {
                continue;
            }
            if i < l1 {
                propose(&mut next[w + 2], (i + 1, j));
            }
            if i < l1 && j < l2 {
                propose(&mut next[w + 1], (i + 1, j + 1));
            }
            if j < l2 {
                propose(&mut next[w], (i, j + 1));
            }
        }
        curr = next;
        edits += 1;
    }

    (edits, backtrack(&fronts, edits, l1, l2))
}

/// Keeps the furthest-reaching of two cells on the same diagonal
fn propose(slot: &mut (usize, usize), candidate: (usize, usize)) {
    if *slot == UNREACHED || candidate.0 > slot.0 {
        *slot = candidate;
    }
}

/// Replays the wavefronts backwards from (l1, l2) to recover one optimal edit script.
fn backtrack(fronts: &[Vec<(usize, usize)>], total_edits: usize, l1: usize, l2: usize) -> Vec<EditOp> {
    let mut ops: Vec<EditOp> = Vec::with_capacity(l1.max(l2));
    let mut i = l1;
    let mut j = l2;

    for e in (1..=total_edits).rev() {
        // slot of the current diagonal i - j in round e
        let w = (i as isize - j as isize + e as isize) as usize;
        let prev = &fronts[e - 1];

        // candidate sources in round e-1: the edit result must land on the current
        // diagonal at or before (i, j); the forward pass took the furthest of them
        let mut best: Option<(usize, usize, usize, EditOp)> = None;
        let mut consider = |src: (usize, usize), result: (usize, usize), op: EditOp| {
            if src == UNREACHED || result.0 > i || result.1 > j {
                return;
            }
            if best.map_or(true, |b| result.0 > b.2) {
                best = Some((src.0, src.1, result.0, op));
            }
        };
        if w >= 1 && w - 1 < prev.len() {
            let src = prev[w - 1];
            consider(src, (src.0.wrapping_add(1), src.1.wrapping_add(1)), EditOp::Mismatch);
        }
        if w >= 2 && w - 2 < prev.len() {
            let src = prev[w - 2];
            consider(src, (src.0.wrapping_add(1), src.1), EditOp::Deletion);
        }
        if w < prev.len() {
            let src = prev[w];
            consider(src, (src.0, src.1.wrapping_add(1)), EditOp::Insertion);
        }

        let (si, sj, ei, op) = best.expect("wavefront backtrack lost its source");
        for _ in 0..(i - ei) {
            ops.push(EditOp::Match);
        }
        ops.push(op);
        i = si;
        j = sj;
    }

    // round 0 is a pure match snake from the origin
    for _ in 0..i {
        ops.push(EditOp::Match);
    }
    ops.reverse();
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Applies an edit script to a target and checks that it rebuilds the query,
    /// returning the number of edit operations it contained.
    fn check_script(target: &[u8], query: &[u8], ops: &[EditOp]) -> usize {
        let mut rebuilt = vec![];
        let mut i = 0;
        let mut j = 0;
        let mut edits = 0;
        for op in ops.iter() {
            match op {
                EditOp::Match => {
                    assert_eq!(target[i], query[j]);
                    rebuilt.push(target[i]);
                    i += 1;
                    j += 1;
                }
                EditOp::Mismatch => {
                    assert_ne!(target[i], query[j]);
                    rebuilt.push(query[j]);
                    i += 1;
                    j += 1;
                    edits += 1;
                }
                EditOp::Insertion => {
                    rebuilt.push(query[j]);
                    j += 1;
                    edits += 1;
                }
                EditOp::Deletion => {
                    i += 1;
                    edits += 1;
                }
                EditOp::Clip => panic!("edit_path never emits clips")
            }
        }
        assert_eq!(i, target.len());
        assert_eq!(j, query.len());
        assert_eq!(rebuilt, query);
        edits
    }

    #[test]
    fn test_identical() {
        let (distance, ops) = edit_path(b"ACGTACGT", b"ACGTACGT");
        assert_eq!(distance, 0);
        assert_eq!(ops, vec![EditOp::Match; 8]);
    }

    #[test]
    fn test_single_edits() {
        // substitution
        let (d, ops) = edit_path(b"ACGTACGT", b"ACGAACGT");
        assert_eq!(d, 1);
        assert_eq!(check_script(b"ACGTACGT", b"ACGAACGT", &ops), 1);

        // deletion from the target
        let (d, ops) = edit_path(b"ACGTACGT", b"ACGACGT");
        assert_eq!(d, 1);
        assert_eq!(check_script(b"ACGTACGT", b"ACGACGT", &ops), 1);

        // insertion into the query
        let (d, ops) = edit_path(b"ACGTACGT", b"ACGTTACGT");
        assert_eq!(d, 1);
        assert_eq!(check_script(b"ACGTACGT", b"ACGTTACGT", &ops), 1);
    }

    #[test]
    fn test_empty_inputs() {
        let (d, ops) = edit_path(b"ACGT", b"");
        assert_eq!(d, 4);
        assert_eq!(ops, vec![EditOp::Deletion; 4]);

        let (d, ops) = edit_path(b"", b"ACGT");
        assert_eq!(d, 4);
        assert_eq!(ops, vec![EditOp::Insertion; 4]);

        let (d, ops) = edit_path(b"", b"");
        assert_eq!(d, 0);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_distance_matches_script() {
        let cases: [(&[u8], &[u8]); 4] = [
            (b"AAAAAAAAAA", b"AAAATAAAAA"),
            (b"ACGTACGTACGT", b"ACGTACGT"),
            (b"GATTACA", b"GCATGCA"),
            (b"TTTTT", b"GGGGG"),
        ];
        for (target, query) in cases.iter() {
            let (d, ops) = edit_path(target, query);
            assert_eq!(d, check_script(target, query, &ops));
            assert_eq!(d, edit_distance(target, query));
        }
    }
}
