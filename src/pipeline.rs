
/*!
This module provides the polishing pipeline. A `Polisher` loads the target sequences,
the reads, and their overlaps, splits every target into fixed-length windows, routes
each overlapping read piece into its window, runs the window consensus over a worker
pool, and stitches the per-window consensi back into polished sequences.

# Example usage
```no_run
use poa_polish::pipeline::Polisher;
use poa_polish::polish_config::PolishConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut polisher = Polisher::new(PolishConfig::default())?;
    polisher.initialize("contigs.fasta", "reads.fastq", "overlaps.paf")?;
    for record in polisher.polish(false)? {
        println!(">{}\n{}", record.name(), std::str::from_utf8(record.bases())?);
    }
    Ok(())
}
```
*/

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use itertools::Itertools;
use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use simple_error::bail;

use crate::aligner::AlignmentEngine;
use crate::aligner_config::AlignmentType;
use crate::overlap::{Overlap, Strand};
use crate::polish_config::PolishConfig;
use crate::sequence::SequenceRecord;
use crate::window::{Window, WindowKind};

/// What the targets are: assembled contigs keep only the best placement per read,
/// raw fragments keep every overlap and prefix their polished output with "r".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PolishMode {
    #[default]
    Contigs,
    Fragments,
}

/// Input file formats recognized by the pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputFormat {
    Fasta,
    Fastq,
    Paf,
    Mhap,
    Sam,
}

/// Infers the format of `path` from its extension.
/// # Errors
/// * if the extension is missing or unknown
pub fn detect_format(path: &Path) -> Result<InputFormat, Box<dyn std::error::Error>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("fa") | Some("fasta") => Ok(InputFormat::Fasta),
        Some("fq") | Some("fastq") => Ok(InputFormat::Fastq),
        Some("paf") => Ok(InputFormat::Paf),
        Some("mhap") => Ok(InputFormat::Mhap),
        Some("sam") => Ok(InputFormat::Sam),
        _ => bail!("Cannot infer the format of \"{}\" from its extension.", path.display())
    }
}

/// Parses FASTA/FASTQ records from a reader, sniffing the format from the content.
/// Record names are the first whitespace-separated header token.
pub(crate) fn parse_sequences<R: std::io::Read + Send + 'static>(
    reader: R,
) -> Result<Vec<SequenceRecord>, Box<dyn std::error::Error>> {
    let mut records = vec![];
    let mut reader = needletail::parse_fastx_reader(reader)?;
    while let Some(record) = reader.next() {
        let record = record?;
        let name = match record.id().split(|b| b.is_ascii_whitespace()).next() {
            Some(token) if !token.is_empty() => String::from_utf8(token.to_vec())?,
            _ => bail!("Sequence record is missing a name.")
        };
        records.push(SequenceRecord::new(
            name,
            record.seq().to_vec(),
            record.qual().map(Vec::from),
        )?);
    }
    Ok(records)
}

fn read_sequences(path: &Path) -> Result<Vec<SequenceRecord>, Box<dyn std::error::Error>> {
    match detect_format(path)? {
        InputFormat::Fasta | InputFormat::Fastq => {
            parse_sequences(BufReader::new(File::open(path)?))
        }
        _ => bail!("\"{}\" is not a sequence file.", path.display())
    }
}

fn read_overlaps(path: &Path) -> Result<Vec<Overlap>, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    let format = detect_format(path)?;
    let mut overlaps = vec![];
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match format {
            InputFormat::Paf => overlaps.push(Overlap::from_paf(&line)?),
            InputFormat::Mhap => overlaps.push(Overlap::from_mhap(&line)?),
            InputFormat::Sam => {
                if let Some(overlap) = Overlap::from_sam(&line)? {
                    overlaps.push(overlap);
                }
            }
            _ => bail!("\"{}\" is not an overlap file.", path.display())
        }
    }
    Ok(overlaps)
}

/// Builds a name-to-index map, keeping the first occurrence of byte-identical
/// duplicates and rejecting conflicting ones.
fn index_by_name(records: &[SequenceRecord]) -> Result<FxHashMap<String, usize>, Box<dyn std::error::Error>> {
    let mut lookup: FxHashMap<String, usize> = Default::default();
    for (index, record) in records.iter().enumerate() {
        if let Some(&previous) = lookup.get(record.name()) {
            if records[previous].bases() != record.bases() {
                bail!("Conflicting sequences share the name \"{}\".", record.name());
            }
        } else {
            lookup.insert(record.name().to_string(), index);
        }
    }
    Ok(lookup)
}

/// The polishing pipeline.
pub struct Polisher {
    config: PolishConfig,
    engine: AlignmentEngine,
    pool: rayon::ThreadPool,
    sequences: Vec<SequenceRecord>,
    targets: Vec<SequenceRecord>,
    overlaps: Vec<Overlap>,
    windows: Vec<Window>,
    /// Index of each target's first window in `windows`, plus a final sentinel
    window_offsets: Vec<usize>,
}

impl Polisher {
    /// Creates a polisher with its aligner and worker pool.
    /// # Errors
    /// * if the configuration is invalid or the pool cannot be built
    pub fn new(config: PolishConfig) -> Result<Polisher, Box<dyn std::error::Error>> {
        config.validate()?;
        let engine = AlignmentEngine::new(AlignmentType::Global, config.aligner_config()?)?
            .with_backend(config.backend);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()?;
        Ok(Polisher {
            config,
            engine,
            pool,
            sequences: vec![],
            targets: vec![],
            overlaps: vec![],
            windows: vec![],
            window_offsets: vec![],
        })
    }

    /// Loads the three input files and partitions the targets into windows.
    /// # Arguments
    /// * `target_path` - FASTA/FASTQ file with the sequences to polish
    /// * `sequences_path` - FASTA/FASTQ file with the reads
    /// * `overlaps_path` - PAF/MHAP/SAM file with read-to-target overlaps
    /// # Errors
    /// * on unreadable or malformed inputs, or overlaps naming unknown sequences
    pub fn initialize<P: AsRef<Path>>(
        &mut self,
        target_path: P,
        sequences_path: P,
        overlaps_path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let targets = read_sequences(target_path.as_ref())?;
        let sequences = read_sequences(sequences_path.as_ref())?;
        let overlaps = read_overlaps(overlaps_path.as_ref())?;
        self.initialize_from(targets, sequences, overlaps)
    }

    /// In-memory variant of [`Polisher::initialize`].
    pub fn initialize_from(
        &mut self,
        targets: Vec<SequenceRecord>,
        sequences: Vec<SequenceRecord>,
        mut overlaps: Vec<Overlap>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if targets.is_empty() {
            bail!("No target sequences were given.");
        }
        if sequences.is_empty() {
            bail!("No read sequences were given.");
        }
        let target_lookup = index_by_name(&targets)?;
        let sequence_lookup = index_by_name(&sequences)?;

        // bind overlaps to sequence indices, dropping self overlaps and bad placements
        let mut resolved: Vec<Overlap> = vec![];
        for mut overlap in overlaps.drain(..) {
            if overlap.query_name() == overlap.target_name() {
                continue;
            }
            let Some(&query_id) = sequence_lookup.get(overlap.query_name()) else {
                bail!("Overlap names unknown read \"{}\".", overlap.query_name());
            };
            let Some(&target_id) = target_lookup.get(overlap.target_name()) else {
                bail!("Overlap names unknown target \"{}\".", overlap.target_name());
            };
            overlap.resolve(
                query_id,
                sequences[query_id].len(),
                target_id,
                targets[target_id].len(),
            )?;
            if overlap.length() == 0 || overlap.error() > self.config.error_threshold {
                continue;
            }
            resolved.push(overlap);
        }
        debug!("{} overlaps kept after filtering", resolved.len());

        if self.config.mode == PolishMode::Contigs {
            // a read belongs to one place on the assembly, keep its longest placement
            let mut best: FxHashMap<usize, Overlap> = Default::default();
            for overlap in resolved.drain(..) {
                let id = overlap.query_id().unwrap();
                match best.get(&id) {
                    Some(kept) if kept.length() >= overlap.length() => {}
                    _ => {
                        best.insert(id, overlap);
                    }
                }
            }
            resolved = best.into_values().sorted_by_key(|o| o.query_id()).collect();
        }

        // the parallel phase slices cached reverse complements, build them up front
        for overlap in resolved.iter() {
            if overlap.strand() == Strand::Reverse {
                let query = &sequences[overlap.query_id().unwrap()];
                query.reverse_complement();
                query.reversed_quality();
            }
        }

        let window_length = self.config.window_length;
        self.pool.install(|| {
            resolved
                .par_iter_mut()
                .for_each(|overlap| overlap.find_breaking_points(&sequences, &targets, window_length));
        });

        self.windows.clear();
        self.window_offsets = vec![0];
        for (id, target) in targets.iter().enumerate() {
            let length = target.len() as u32;
            let kind = if target.len() < 1000 {
                WindowKind::ShortRead
            } else {
                WindowKind::LongRead
            };
            let count = (length + window_length - 1) / window_length;
            for rank in 0..count {
                let begin = (rank * window_length) as usize;
                let end = target.len().min(begin + window_length as usize);
                self.windows.push(Window::new(
                    id as u64,
                    rank,
                    kind,
                    target.bases()[begin..end].to_vec(),
                    target.base_weights(begin, end, false),
                ));
            }
            self.window_offsets.push(self.windows.len());
        }

        for overlap in resolved.iter() {
            self.route_overlap(overlap, &sequences)?;
        }

        self.targets = targets;
        self.sequences = sequences;
        self.overlaps = resolved;
        Ok(())
    }

    /// Slices one overlap along its breaking points and layers the pieces onto their
    /// windows. Undersized pieces and pieces of poor mean quality are skipped.
    fn route_overlap(
        &mut self,
        overlap: &Overlap,
        sequences: &[SequenceRecord],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let window_length = self.config.window_length;
        let Some(points) = overlap.breaking_points() else {
            bail!("Overlap of read \"{}\" has no breaking points.", overlap.query_name());
        };
        let query = &sequences[overlap.query_id().unwrap()];
        let target_id = overlap.target_id().unwrap();
        let reverse = overlap.strand() == Strand::Reverse;

        for pair in points.chunks_exact(2) {
            let (first, last) = (pair[0], pair[1]);
            let piece_length = (last.1 - first.1) as usize;
            if (piece_length as f64) < 0.02 * window_length as f64 {
                continue;
            }
            if let Some(mean) = query.mean_quality(first.1 as usize, last.1 as usize, reverse) {
                if mean < self.config.quality_threshold {
                    continue;
                }
            }

            let bases = if reverse {
                &query.reverse_complement()[first.1 as usize..last.1 as usize]
            } else {
                &query.bases()[first.1 as usize..last.1 as usize]
            };
            let weights = query.base_weights(first.1 as usize, last.1 as usize, reverse);

            let rank = first.0 / window_length;
            let window = &mut self.windows[self.window_offsets[target_id] + rank as usize];
            let begin = (first.0 - rank * window_length) as usize;
            let end = (last.0 - rank * window_length) as usize;
            window.add_layer(bases, &weights, begin, end);
        }
        Ok(())
    }

    /// Runs the window consensus over the worker pool and stitches the results back into
    /// one record per target, annotated with its length (`LN`), mean layer coverage
    /// (`RC`) and polished window ratio (`XC`). Fragment targets get an "r" name prefix.
    /// # Arguments
    /// * `drop_unpolished` - omit targets with no polished window at all
    /// # Errors
    /// * if called before `initialize`
    pub fn polish(&mut self, drop_unpolished: bool) -> Result<Vec<SequenceRecord>, Box<dyn std::error::Error>> {
        if self.windows.is_empty() {
            bail!("The polisher has not been initialized.");
        }
        let engine = self.engine;
        let trim = self.config.trim;
        let results: Vec<(Vec<u8>, bool)> = self.pool.install(|| {
            self.windows
                .par_iter()
                .map(|window| window.generate_consensus(&engine, trim))
                .collect()
        });

        let prefix = match self.config.mode {
            PolishMode::Contigs => "",
            PolishMode::Fragments => "r",
        };
        let mut polished = vec![];
        for (id, target) in self.targets.iter().enumerate() {
            let range = self.window_offsets[id]..self.window_offsets[id + 1];
            let window_count = range.len();
            let polished_windows = results[range.clone()].iter().filter(|r| r.1).count();
            if drop_unpolished && polished_windows == 0 {
                debug!("dropping unpolished target \"{}\"", target.name());
                continue;
            }
            let mut bases = vec![];
            for (consensus, _) in results[range.clone()].iter() {
                bases.extend_from_slice(consensus);
            }
            let total_layers: usize = self.windows[range].iter().map(|w| w.layer_count()).sum();
            let name = format!(
                "{}{} LN:i:{} RC:i:{} XC:f:{:.6}",
                prefix,
                target.name(),
                bases.len(),
                total_layers / window_count,
                polished_windows as f64 / window_count as f64
            );
            polished.push(SequenceRecord::new(name, bases, None)?);
        }
        if polished.is_empty() {
            warn!("no polished sequences were produced");
        }
        Ok(polished)
    }

    // getters
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn overlap_count(&self) -> usize {
        self.overlaps.len()
    }
}
