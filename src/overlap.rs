
/*!
This module provides the overlap record shared by all three input formats (PAF, MHAP,
SAM) and the breakpoint finder that chops each overlap into window-sized pieces. An
overlap that arrives without a base-level alignment gets one lazily from the edit-path
wavefront; the resulting script is walked once, recording where the alignment crosses
each window boundary on the target, so the pipeline can later slice the query without
ever re-aligning. Reverse-strand query coordinates are kept in reverse-complement space
throughout, matching the cached reverse-complement the pieces are sliced from.
*/

use simple_error::bail;

use crate::sequence::SequenceRecord;
use crate::sequence_alignment::{edit_path, EditOp};

/// Relative orientation of query and target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strand {
    Forward,
    Reverse,
}

/// A pairing of a query (read) interval with a target (backbone) interval.
/// Coordinates are zero-based, end exclusive, on the forward strand of each sequence.
#[derive(Clone, Debug)]
pub struct Overlap {
    query_name: String,
    query_id: Option<usize>,
    query_begin: u32,
    query_end: u32,
    query_length: u32,
    target_name: String,
    target_id: Option<usize>,
    target_begin: u32,
    target_end: u32,
    target_length: u32,
    strand: Strand,
    /// Base-level alignment, computed lazily when the source format carries none
    cigar: Option<String>,
    /// Flattened (target position, query position) pairs, two per touched window:
    /// the first and one-past-the-last match inside that window
    breaking_points: Option<Vec<(u32, u32)>>,
}

fn parse_field<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, Box<dyn std::error::Error>> {
    match field.parse::<T>() {
        Ok(value) => Ok(value),
        Err(_) => bail!("Unparsable {} field \"{}\" in overlap record.", what, field)
    }
}

/// Checks that a CIGAR string holds only supported operations so later walks cannot
/// stumble. `*` (absent) is handled by the caller.
fn validate_cigar(cigar: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut digits = 0;
    for c in cigar.chars() {
        match c {
            '0'..='9' => digits += 1,
            'M' | '=' | 'X' | 'I' | 'D' | 'N' | 'S' | 'H' | 'P' => {
                if digits == 0 {
                    bail!("CIGAR operation '{}' is missing its length.", c);
                }
                digits = 0;
            }
            _ => bail!("Unsupported CIGAR operation '{}'.", c)
        }
    }
    if digits > 0 {
        bail!("CIGAR string ends mid-length.");
    }
    Ok(())
}

/// Iterates `(length, operation)` runs of a pre-validated CIGAR string.
fn cigar_runs(cigar: &str) -> impl Iterator<Item = (u32, char)> + '_ {
    let mut chars = cigar.chars().peekable();
    std::iter::from_fn(move || {
        let mut length = 0u32;
        for c in chars.by_ref() {
            if let Some(digit) = c.to_digit(10) {
                length = length * 10 + digit;
            } else {
                return Some((length, c));
            }
        }
        None
    })
}

impl Overlap {
    /// Creates an overlap from already-known coordinates, as an overlapper would
    /// report them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query_name: String,
        query_length: u32,
        query_begin: u32,
        query_end: u32,
        strand: Strand,
        target_name: String,
        target_length: u32,
        target_begin: u32,
        target_end: u32,
    ) -> Overlap {
        Overlap {
            query_name,
            query_id: None,
            query_begin,
            query_end,
            query_length,
            target_name,
            target_id: None,
            target_begin,
            target_end,
            target_length,
            strand,
            cigar: None,
            breaking_points: None,
        }
    }

    /// Parses one PAF line.
    /// # Errors
    /// * if the line has fewer than 12 tab-separated fields or a malformed field
    pub fn from_paf(line: &str) -> Result<Overlap, Box<dyn std::error::Error>> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            bail!("PAF record has {} fields, expected at least 12.", fields.len());
        }
        let strand = match fields[4] {
            "+" => Strand::Forward,
            "-" => Strand::Reverse,
            other => bail!("Unknown PAF strand \"{}\".", other)
        };
        Ok(Overlap {
            query_name: fields[0].to_string(),
            query_id: None,
            query_length: parse_field(fields[1], "query length")?,
            query_begin: parse_field(fields[2], "query begin")?,
            query_end: parse_field(fields[3], "query end")?,
            target_name: fields[5].to_string(),
            target_id: None,
            target_length: parse_field(fields[6], "target length")?,
            target_begin: parse_field(fields[7], "target begin")?,
            target_end: parse_field(fields[8], "target end")?,
            strand,
            cigar: None,
            breaking_points: None,
        })
    }

    /// Parses one MHAP line.
    /// # Errors
    /// * if the line has fewer than 12 space-separated fields or a malformed field
    pub fn from_mhap(line: &str) -> Result<Overlap, Box<dyn std::error::Error>> {
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() < 12 {
            bail!("MHAP record has {} fields, expected at least 12.", fields.len());
        }
        let query_reversed: u32 = parse_field(fields[4], "query orientation")?;
        let target_reversed: u32 = parse_field(fields[8], "target orientation")?;
        Ok(Overlap {
            query_name: fields[0].to_string(),
            query_id: None,
            query_begin: parse_field(fields[5], "query begin")?,
            query_end: parse_field(fields[6], "query end")?,
            query_length: parse_field(fields[7], "query length")?,
            target_name: fields[1].to_string(),
            target_id: None,
            target_begin: parse_field(fields[9], "target begin")?,
            target_end: parse_field(fields[10], "target end")?,
            target_length: parse_field(fields[11], "target length")?,
            strand: if query_reversed != target_reversed {
                Strand::Reverse
            } else {
                Strand::Forward
            },
            cigar: None,
            breaking_points: None,
        })
    }

    /// Parses one SAM alignment line. Header and unmapped records yield `None`.
    /// Soft-clip-derived query coordinates are normalized to the orientation the
    /// breakpoint walk expects, so reverse-strand records line up with the cached
    /// reverse-complement; hard-clipped bases are absent from the record and count
    /// toward nothing.
    /// # Errors
    /// * if a mapped record has fewer than 11 fields, a malformed field, or an
    ///   unsupported CIGAR operation
    pub fn from_sam(line: &str) -> Result<Option<Overlap>, Box<dyn std::error::Error>> {
        if line.starts_with('@') {
            return Ok(None);
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            bail!("SAM record has {} fields, expected at least 11.", fields.len());
        }
        let flag: u32 = parse_field(fields[1], "flag")?;
        if flag & 0x4 != 0 {
            return Ok(None);
        }
        let position: u32 = parse_field(fields[3], "position")?;
        if position == 0 {
            bail!("Mapped SAM record is missing its position.");
        }
        let cigar = fields[5];
        if cigar == "*" {
            bail!("Mapped SAM record is missing its CIGAR string.");
        }
        validate_cigar(cigar)?;

        let mut query_length = 0;
        let mut target_span = 0;
        let mut leading_clip = 0;
        let mut trailing_clip = 0;
        let mut seen_real_op = false;
        for (length, op) in cigar_runs(cigar) {
            match op {
                'M' | '=' | 'X' => {
                    query_length += length;
                    target_span += length;
                    seen_real_op = true;
                }
                'I' => {
                    query_length += length;
                    seen_real_op = true;
                }
                'D' | 'N' => target_span += length,
                'S' => {
                    query_length += length;
                    if seen_real_op {
                        trailing_clip += length;
                    } else {
                        leading_clip += length;
                    }
                }
                // hard-clipped bases are absent from the record's sequence
                'H' => {}
                _ => {}
            }
        }

        let reversed = flag & 0x10 != 0;
        let target_begin = position - 1;
        Ok(Some(Overlap {
            query_name: fields[0].to_string(),
            query_id: None,
            // clips are recorded in alignment orientation, forward coordinates flip them
            query_begin: if reversed { trailing_clip } else { leading_clip },
            query_end: if reversed {
                query_length - leading_clip
            } else {
                query_length - trailing_clip
            },
            query_length,
            target_name: fields[2].to_string(),
            target_id: None,
            target_begin,
            target_end: target_begin + target_span,
            // unknown from the record alone, filled in on resolve
            target_length: 0,
            strand: if reversed { Strand::Reverse } else { Strand::Forward },
            cigar: Some(cigar.to_string()),
            breaking_points: None,
        }))
    }

    /// Binds this overlap to its resolved sequence indices.
    /// # Errors
    /// * if either coordinate range is inverted
    /// * if a length stated in the overlap record disagrees with the actual sequence
    pub fn resolve(
        &mut self,
        query_id: usize,
        query_length: usize,
        target_id: usize,
        target_length: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if self.query_begin > self.query_end || self.target_begin > self.target_end {
            bail!(
                "Overlap of \"{}\" and \"{}\" has an inverted coordinate range.",
                self.query_name,
                self.target_name
            );
        }
        if self.query_length != 0 && self.query_length as usize != query_length {
            bail!(
                "Overlap claims query \"{}\" has length {} but the sequence has {}.",
                self.query_name,
                self.query_length,
                query_length
            );
        }
        if self.target_length != 0 && self.target_length as usize != target_length {
            bail!(
                "Overlap claims target \"{}\" has length {} but the sequence has {}.",
                self.target_name,
                self.target_length,
                target_length
            );
        }
        self.query_id = Some(query_id);
        self.query_length = query_length as u32;
        self.target_id = Some(target_id);
        self.target_length = target_length as u32;
        Ok(())
    }

    /// Longer of the two spans.
    pub fn length(&self) -> u32 {
        let query_span = self.query_end - self.query_begin;
        let target_span = self.target_end - self.target_begin;
        query_span.max(target_span)
    }

    /// Span disagreement: `1 - min(spans) / max(spans)`.
    pub fn error(&self) -> f64 {
        let query_span = (self.query_end - self.query_begin) as f64;
        let target_span = (self.target_end - self.target_begin) as f64;
        1.0 - query_span.min(target_span) / query_span.max(target_span)
    }

    /// Splits the overlap at every window boundary the alignment crosses on the target.
    /// Without a stored CIGAR the overlapping substrings are aligned first. Calling this
    /// again is a no-op.
    /// # Arguments
    /// * `queries` - the read set, indexed by resolved query id
    /// * `targets` - the backbone set, indexed by resolved target id
    /// * `window_length` - the window size the target is partitioned into
    pub fn find_breaking_points(
        &mut self,
        queries: &[SequenceRecord],
        targets: &[SequenceRecord],
        window_length: u32,
    ) {
        if self.breaking_points.is_some() {
            return;
        }
        let query_id = self.query_id.expect("Overlap ids must be resolved first.");
        let target_id = self.target_id.expect("Overlap ids must be resolved first.");

        if self.cigar.is_none() {
            let query = &queries[query_id];
            let target = &targets[target_id];
            let query_piece = match self.strand {
                Strand::Forward => {
                    &query.bases()[self.query_begin as usize..self.query_end as usize]
                }
                Strand::Reverse => {
                    let begin = (self.query_length - self.query_end) as usize;
                    let end = (self.query_length - self.query_begin) as usize;
                    &query.reverse_complement()[begin..end]
                }
            };
            let target_piece =
                &target.bases()[self.target_begin as usize..self.target_end as usize];
            let (_, script) = edit_path(target_piece, query_piece);
            self.cigar = Some(script_to_cigar(&script));
        }

        // window boundaries the target interval crosses, as last positions
        let mut window_ends: Vec<u32> = (0..self.target_end)
            .step_by(window_length as usize)
            .filter(|&w| w > self.target_begin)
            .map(|w| w - 1)
            .collect();
        window_ends.push(self.target_end - 1);

        let mut breaking_points = vec![];
        let mut window = 0;
        let mut first_match = (0, 0);
        let mut last_match = (0, 0);
        let mut found_first = false;
        let mut query_position = match self.strand {
            Strand::Forward => self.query_begin as i64 - 1,
            Strand::Reverse => (self.query_length - self.query_end) as i64 - 1,
        };
        let mut target_position = self.target_begin as i64 - 1;
        for (length, op) in cigar_runs(self.cigar.as_ref().unwrap()) {
            match op {
                'M' | '=' | 'X' => {
                    for _ in 0..length {
                        query_position += 1;
                        target_position += 1;
                        if !found_first {
                            found_first = true;
                            first_match = (target_position as u32, query_position as u32);
                        }
                        last_match = (target_position as u32 + 1, query_position as u32 + 1);
                        if target_position as u32 == window_ends[window] {
                            breaking_points.push(first_match);
                            breaking_points.push(last_match);
                            found_first = false;
                            window += 1;
                        }
                    }
                }
                'I' => query_position += length as i64,
                // the cursor already starts past the leading clip
                'S' | 'H' => {}
                'D' | 'N' => target_position += length as i64,
                _ => {}
            }
        }
        // the script has served its purpose, keep only the window coordinates
        self.cigar = None;
        self.breaking_points = Some(breaking_points);
    }

    // getters
    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn query_id(&self) -> Option<usize> {
        self.query_id
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target_id(&self) -> Option<usize> {
        self.target_id
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn query_length(&self) -> u32 {
        self.query_length
    }

    pub fn breaking_points(&self) -> Option<&[(u32, u32)]> {
        self.breaking_points.as_deref()
    }
}

/// Compresses a per-base edit script into a CIGAR string.
fn script_to_cigar(script: &[EditOp]) -> String {
    let mut cigar = String::new();
    let mut run: Option<(char, u32)> = None;
    for op in script.iter() {
        let symbol = match op {
            EditOp::Match => '=',
            EditOp::Mismatch => 'X',
            EditOp::Insertion => 'I',
            EditOp::Deletion => 'D',
            EditOp::Clip => 'S',
        };
        run = match run {
            Some((current, length)) if current == symbol => Some((current, length + 1)),
            Some((current, length)) => {
                cigar.push_str(&format!("{}{}", length, current));
                Some((symbol, 1))
            }
            None => Some((symbol, 1))
        };
    }
    if let Some((current, length)) = run {
        cigar.push_str(&format!("{}{}", length, current));
    }
    cigar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, bases: &[u8]) -> SequenceRecord {
        SequenceRecord::new(name.to_string(), bases.to_vec(), None).unwrap()
    }

    #[test]
    fn test_parse_paf() {
        let line = "read1\t100\t10\t90\t+\tctg1\t200\t50\t130\t70\t80\t60";
        let overlap = Overlap::from_paf(line).unwrap();
        assert_eq!(overlap.query_name(), "read1");
        assert_eq!(overlap.target_name(), "ctg1");
        assert_eq!(overlap.strand(), Strand::Forward);
        assert_eq!(overlap.length(), 80);
        assert!((overlap.error() - 0.0).abs() < 1e-9);

        assert!(Overlap::from_paf("read1\t100\t10").is_err());
        assert!(Overlap::from_paf("read1\t100\t10\t90\t?\tctg1\t200\t50\t130\t70\t80\t60").is_err());
    }

    #[test]
    fn test_parse_mhap() {
        let line = "1 2 0.05 42 0 10 90 100 1 50 130 200";
        let overlap = Overlap::from_mhap(line).unwrap();
        assert_eq!(overlap.query_name(), "1");
        assert_eq!(overlap.target_name(), "2");
        assert_eq!(overlap.strand(), Strand::Reverse);
    }

    #[test]
    fn test_parse_sam() {
        assert!(Overlap::from_sam("@SQ\tSN:ctg1\tLN:200").unwrap().is_none());
        // unmapped
        assert!(Overlap::from_sam("r\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*").unwrap().is_none());

        let line = "read1\t0\tctg1\t51\t60\t5S80M15S\t*\t0\t0\tAAAAA\t*";
        let overlap = Overlap::from_sam(line).unwrap().unwrap();
        assert_eq!(overlap.query_length(), 100);
        assert_eq!(overlap.strand(), Strand::Forward);
        assert_eq!(overlap.length(), 80);

        assert!(Overlap::from_sam("read1\t0\tctg1\t51\t60\t80Z\t*\t0\t0\tA\t*").is_err());
    }

    #[test]
    fn test_sam_hard_clip_resolves() {
        // hard-clipped bases are not in the read, only the 20 aligned bases count
        let line = "read1\t0\tctg1\t1\t60\t5H20M\t*\t0\t0\tAAAA\t*";
        let mut overlap = Overlap::from_sam(line).unwrap().unwrap();
        assert_eq!(overlap.query_length(), 20);
        assert!(overlap.resolve(0, 20, 0, 20).is_ok());
        assert_eq!(overlap.length(), 20);
    }

    #[test]
    fn test_error_from_spans() {
        let line = "read1\t100\t0\t90\t+\tctg1\t200\t0\t100\t70\t80\t60";
        let overlap = Overlap::from_paf(line).unwrap();
        assert!((overlap.error() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_checks_lengths() {
        let line = "read1\t10\t0\t10\t+\tctg1\t20\t0\t10\t10\t10\t60";
        let mut overlap = Overlap::from_paf(line).unwrap();
        assert!(overlap.resolve(0, 10, 0, 21).is_err());
        assert!(overlap.resolve(0, 10, 0, 20).is_ok());
        assert_eq!(overlap.query_id(), Some(0));
    }

    #[test]
    fn test_resolve_rejects_inverted_spans() {
        let line = "read1\t100\t90\t10\t+\tctg1\t200\t50\t130\t70\t80\t60";
        let mut overlap = Overlap::from_paf(line).unwrap();
        assert!(overlap.resolve(0, 100, 0, 200).is_err());
    }

    #[test]
    fn test_breaking_points_forward() {
        let target = record("ctg", b"ACGTAACCGGTTACGTACGT");
        let query = record("read", &target.bases()[0..10].to_vec());
        let line = "read\t10\t0\t10\t+\tctg\t20\t0\t10\t10\t10\t60";
        let mut overlap = Overlap::from_paf(line).unwrap();
        overlap.resolve(0, 10, 0, 20).unwrap();

        let queries = vec![query];
        let targets = vec![target];
        overlap.find_breaking_points(&queries, &targets, 5);
        let points = overlap.breaking_points().unwrap().to_vec();
        assert_eq!(points, vec![(0, 0), (5, 5), (5, 5), (10, 10)]);

        // a second call leaves the result untouched
        overlap.find_breaking_points(&queries, &targets, 5);
        assert_eq!(overlap.breaking_points().unwrap(), points.as_slice());
    }

    #[test]
    fn test_breaking_points_sam_soft_clips() {
        let target = record("ctg", b"ACGTAACCGGTTACGTACGT");
        // five clipped bases, then the read matches the whole target
        let mut read_bases = b"TTTTT".to_vec();
        read_bases.extend_from_slice(target.bases());
        let query = record("read", &read_bases);
        let line = format!(
            "read\t0\tctg\t1\t60\t5S20M\t*\t0\t0\t{}\t*",
            std::str::from_utf8(&read_bases).unwrap()
        );
        let mut overlap = Overlap::from_sam(&line).unwrap().unwrap();
        overlap.resolve(0, 25, 0, 20).unwrap();

        overlap.find_breaking_points(&[query], &[target], 10);
        let points = overlap.breaking_points().unwrap();
        // query offsets start after the clip and never escape the read
        assert_eq!(points, &[(0, 5), (10, 15), (10, 15), (20, 25)]);
        assert!(points.iter().all(|&(_, q)| q <= 25));
    }

    #[test]
    fn test_breaking_points_reverse() {
        let target = record("ctg", b"ACGTAACCGG");
        // the read is the reverse complement of the whole target
        let query = record("read", b"CCGGTTACGT");
        let line = "read\t10\t0\t10\t-\tctg\t10\t0\t10\t10\t10\t60";
        let mut overlap = Overlap::from_paf(line).unwrap();
        overlap.resolve(0, 10, 0, 10).unwrap();

        overlap.find_breaking_points(&[query], &[target], 5);
        assert_eq!(
            overlap.breaking_points().unwrap(),
            &[(0, 0), (5, 5), (5, 5), (10, 10)]
        );
    }

    #[test]
    fn test_script_to_cigar() {
        use EditOp::*;
        let script = vec![Match, Match, Mismatch, Match, Insertion, Insertion, Deletion];
        assert_eq!(script_to_cigar(&script), "2=1X1=2I1D");
    }
}
