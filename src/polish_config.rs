
/*!
This module provides the configuration for the polishing pipeline, with defaults tuned
for noisy long reads.
*/

use simple_error::bail;

use crate::aligner::Backend;
use crate::aligner_config::{AlignerConfig, AlignerConfigBuilder};
use crate::pipeline::PolishMode;

/// Configuration values for the polishing pipeline.
#[derive(derive_builder::Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct PolishConfig {
    /// Length of the windows each target is partitioned into
    pub window_length: u32,
    /// Mean quality below which a read piece is not layered onto a window
    pub quality_threshold: f64,
    /// Overlap error above which the overlap is dropped
    pub error_threshold: f64,
    /// Whether long-read windows trim weakly supported consensus flanks
    pub trim: bool,
    /// Score for matching bases
    pub match_score: i32,
    /// Score for mismatching bases
    pub mismatch_score: i32,
    /// Penalty for opening a gap
    pub gap_open: i32,
    /// Penalty for extending a gap
    pub gap_extend: i32,
    /// Matrix fill backend handed to every window aligner
    pub backend: Backend,
    /// Number of worker threads for breakpoint finding and window consensus
    pub num_threads: usize,
    /// Whether targets are assembled contigs or raw fragments
    pub mode: PolishMode,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            window_length: 500,
            quality_threshold: 10.0,
            error_threshold: 0.3,
            trim: true,
            match_score: 3,
            mismatch_score: -5,
            gap_open: -4,
            gap_extend: -4,
            backend: Default::default(),
            num_threads: 1,
            mode: Default::default(),
        }
    }
}

impl PolishConfig {
    /// Checks the pipeline-level values and the embedded alignment scores.
    /// # Errors
    /// * if any value is out of its allowed range
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.window_length == 0 {
            bail!("Window length must be non-zero.");
        }
        if !(0.0..=1.0).contains(&self.error_threshold) {
            bail!("Error threshold must be within [0.0, 1.0].");
        }
        if self.quality_threshold < 0.0 {
            bail!("Quality threshold must not be negative.");
        }
        if self.num_threads == 0 {
            bail!("At least one worker thread is required.");
        }
        self.aligner_config()?.validate()
    }

    /// The alignment scores as an aligner configuration.
    /// # Errors
    /// * if the builder rejects the values
    pub fn aligner_config(&self) -> Result<AlignerConfig, Box<dyn std::error::Error>> {
        let config = AlignerConfigBuilder::default()
            .match_score(self.match_score)
            .mismatch_score(self.mismatch_score)
            .gap_open(self.gap_open)
            .gap_extend(self.gap_extend)
            .build()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(PolishConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        let config = PolishConfigBuilder::default()
            .window_length(0_u32)
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = PolishConfigBuilder::default()
            .error_threshold(1.5)
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = PolishConfigBuilder::default()
            .mismatch_score(2)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
