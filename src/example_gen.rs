
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::overlap::{Overlap, Strand};
use crate::sequence::SequenceRecord;

const ALPHABET: &[u8; 4] = b"ACGT";

/// A generated polishing scenario: a ground truth, a noisy draft of it, noisy reads
/// with qualities, and full-length overlaps placing every read on the draft.
pub struct PolishTestData {
    pub truth: Vec<u8>,
    pub target: SequenceRecord,
    pub reads: Vec<SequenceRecord>,
    pub overlaps: Vec<Overlap>,
}

/// Creates a test set we can verify is working: the draft target is one more noisy
/// sample of the truth, so polishing it with the reads should pull it back towards
/// the truth.
/// # Arguments
/// * `seq_len` - the length of the ground truth
/// * `num_reads` - the number of reads to sample from the truth
/// * `error_rate` - overall error rate, assumes mismatch, insertion, and deletion are equally likely sub-components of this error rate
/// * `seed` - seed for the random generator
pub fn generate_polish_test(
    seq_len: usize,
    num_reads: usize,
    error_rate: f64,
    seed: u64,
) -> PolishTestData {
    assert!((0.0..=1.0).contains(&error_rate));

    let mut rng = StdRng::seed_from_u64(seed);
    let base_distribution = Uniform::new(0, ALPHABET.len() as u8);

    let truth: Vec<u8> = (0..seq_len)
        .map(|_i| ALPHABET[rng.sample(base_distribution) as usize])
        .collect();

    let target_bases = sample_noisy(&truth, error_rate, &mut rng);
    let target = SequenceRecord::new("draft".to_string(), target_bases, None)
        .expect("generated draft is well formed");
    let target_length = target.len() as u32;

    let mut reads = vec![];
    let mut overlaps = vec![];
    for i in 0..num_reads {
        let bases = sample_noisy(&truth, error_rate, &mut rng);
        // flat confident qualities, comfortably above the layering threshold
        let quality = vec![b'I'; bases.len()];
        let read = SequenceRecord::new(format!("read{}", i), bases, Some(quality))
            .expect("generated read is well formed");
        overlaps.push(Overlap::new(
            read.name().to_string(),
            read.len() as u32,
            0,
            read.len() as u32,
            Strand::Forward,
            target.name().to_string(),
            target_length,
            0,
            target_length,
        ));
        reads.push(read);
    }

    PolishTestData {
        truth,
        target,
        reads,
        overlaps,
    }
}

/// Copies `truth` with mismatches, insertions, and deletions sprinkled in at
/// `error_rate`.
fn sample_noisy(truth: &[u8], error_rate: f64, rng: &mut StdRng) -> Vec<u8> {
    let base_distribution = Uniform::new(0, ALPHABET.len() as u8);
    let basem1_distribution = Uniform::new(0, ALPHABET.len() as u8 - 1);
    let error_distribution = Uniform::new(0.0, 1.0);
    let error_type_distribution = Uniform::new(0, 3);

    let mut seq = vec![];
    let mut truth_index = 0;
    while truth_index < truth.len() {
        let c = truth[truth_index];
        let is_error = rng.sample(error_distribution) < error_rate;
        if is_error {
            let error_type = rng.sample(error_type_distribution);
            match error_type {
                0 => {
                    // substition
                    let code = ALPHABET.iter().position(|&b| b == c).unwrap() as u8;
                    let sub_offset = rng.sample(basem1_distribution);
                    seq.push(ALPHABET[((code + 1 + sub_offset) % ALPHABET.len() as u8) as usize]);
                    truth_index += 1;
                },
                1 => {
                    // deletion
                    truth_index += 1;
                },
                2 => {
                    //insertion
                    seq.push(ALPHABET[rng.sample(base_distribution) as usize]);
                },
                _ => panic!("no impl")
            }
        } else {
            seq.push(c);
            truth_index += 1;
        }
    }
    seq
}
