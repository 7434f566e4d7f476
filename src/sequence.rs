
/*!
This module provides the SequenceRecord type, an immutable named base sequence with optional
per-base quality. Records are owned by the pipeline's sequence table and referenced by index
from windows and overlaps; the reverse complement (and reversed quality) are materialized at
most once and cached.

# Example usage
```rust
use poa_polish::sequence::SequenceRecord;

let record = SequenceRecord::new("read1".to_string(), b"acgtn".to_vec(), None).unwrap();
assert_eq!(record.bases(), b"ACGTN");
assert_eq!(record.reverse_complement(), b"NACGT");
```
*/

use simple_error::bail;
use std::sync::OnceLock;

/// An immutable named sequence plus optional per-base Phred quality.
#[derive(Debug, Default)]
pub struct SequenceRecord {
    /// Record name, unique within a sequence table
    name: String,
    /// Upper-cased nucleotide codes
    bases: Vec<u8>,
    /// Optional Phred+33 quality string, same length as `bases`
    quality: Option<Vec<u8>>,
    /// One-time cache of the reverse complement
    rc: OnceLock<Vec<u8>>,
    /// One-time cache of the reversed quality string
    reversed_quality: OnceLock<Vec<u8>>,
}

impl SequenceRecord {
    /// Creates a new record, upper-casing the bases.
    /// # Arguments
    /// * `name` - the record name
    /// * `bases` - the base sequence; upper-cased on construction
    /// * `quality` - optional Phred+33 quality, must match `bases` in length
    /// # Errors
    /// * if a quality string is provided with a different length than the bases
    pub fn new(name: String, mut bases: Vec<u8>, quality: Option<Vec<u8>>) -> Result<SequenceRecord, Box<dyn std::error::Error>> {
        if let Some(q) = quality.as_ref() {
            if q.len() != bases.len() {
                bail!("Sequence \"{}\" has {} bases but {} quality values.", name, bases.len(), q.len());
            }
        }
        bases.make_ascii_uppercase();

        Ok(SequenceRecord {
            name,
            bases,
            quality,
            rc: OnceLock::new(),
            reversed_quality: OnceLock::new(),
        })
    }

    /// Returns the reverse complement, materializing it on first use.
    pub fn reverse_complement(&self) -> &[u8] {
        self.rc.get_or_init(|| {
            self.bases.iter().rev().map(|&b| complement(b)).collect()
        })
    }

    /// Returns the reversed quality string if quality is present, materializing it on first use.
    pub fn reversed_quality(&self) -> Option<&[u8]> {
        self.quality.as_ref()?;
        Some(self.reversed_quality.get_or_init(|| {
            self.quality.as_ref().unwrap().iter().rev().cloned().collect()
        }).as_slice())
    }

    /// Returns the mean Phred score over `range`, or None when the record carries no quality.
    /// # Arguments
    /// * `begin` - first base of the range
    /// * `end` - one past the last base of the range
    /// * `reverse` - if true, reads from the reversed quality string
    pub fn mean_quality(&self, begin: usize, end: usize, reverse: bool) -> Option<f64> {
        let quality = if reverse {
            self.reversed_quality()?
        } else {
            self.quality.as_deref()?
        };
        if begin >= end || end > quality.len() {
            return None;
        }
        let total: u64 = quality[begin..end].iter()
            .map(|&q| q.saturating_sub(33) as u64)
            .sum();
        Some(total as f64 / (end - begin) as f64)
    }

    /// Returns per-base alignment weights for `range`: the Phred score (minimum 1) when quality
    /// is present, otherwise all ones.
    /// # Arguments
    /// * `begin` - first base of the range
    /// * `end` - one past the last base of the range
    /// * `reverse` - if true, reads from the reversed quality string
    pub fn base_weights(&self, begin: usize, end: usize, reverse: bool) -> Vec<u32> {
        let opt_quality = if reverse {
            self.reversed_quality()
        } else {
            self.quality.as_deref()
        };
        match opt_quality {
            Some(quality) => quality[begin..end].iter()
                .map(|&q| (q.saturating_sub(33) as u32).max(1))
                .collect(),
            None => vec![1; end - begin]
        }
    }

    // getters
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn quality(&self) -> Option<&[u8]> {
        self.quality.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// Complements a single upper-cased nucleotide code; anything outside ACGT maps to N.
fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_and_rc() {
        let record = SequenceRecord::new("r".to_string(), b"acGTt".to_vec(), None).unwrap();
        assert_eq!(record.bases(), b"ACGTT");
        assert_eq!(record.reverse_complement(), b"AACGT");
        // second call hits the cache and must be identical
        assert_eq!(record.reverse_complement(), b"AACGT");
    }

    #[test]
    fn test_quality_length_mismatch() {
        let result = SequenceRecord::new("r".to_string(), b"ACGT".to_vec(), Some(b"!!!".to_vec()));
        assert!(result.is_err());
    }

    #[test]
    fn test_mean_quality() {
        // Phred+33: b'+' = 10, b'5' = 20
        let record = SequenceRecord::new("r".to_string(), b"ACGT".to_vec(), Some(b"++55".to_vec())).unwrap();
        assert_eq!(record.mean_quality(0, 4, false), Some(15.0));
        assert_eq!(record.mean_quality(0, 2, false), Some(10.0));
        // reversed quality flips the order
        assert_eq!(record.mean_quality(0, 2, true), Some(20.0));
        // no quality -> None
        let bare = SequenceRecord::new("r".to_string(), b"ACGT".to_vec(), None).unwrap();
        assert_eq!(bare.mean_quality(0, 4, false), None);
    }

    #[test]
    fn test_base_weights() {
        let record = SequenceRecord::new("r".to_string(), b"ACGT".to_vec(), Some(b"!+5!".to_vec())).unwrap();
        // b'!' is Phred 0, clamped to 1
        assert_eq!(record.base_weights(0, 4, false), vec![1, 10, 20, 1]);
        let bare = SequenceRecord::new("r".to_string(), b"ACGT".to_vec(), None).unwrap();
        assert_eq!(bare.base_weights(1, 3, false), vec![1, 1]);
    }
}
