
/*!
Contains scoring configuration for the graph alignment engine.
Typical usage is to use the builder to construct the config, e.g.
```
use poa_polish::aligner_config::{AlignerConfig, AlignerConfigBuilder};
let config: AlignerConfig = AlignerConfigBuilder::default()
    .gap_open(-8)
    .gap_extend(-6)
    .build()
    .unwrap();
```
*/

use simple_error::bail;

/// Enumeration of the supported alignment objectives.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AlignmentType {
    /// End-to-end alignment of the sequence through the graph (Needleman-Wunsch)
    #[default]
    Global,
    /// Best-scoring local path, gaps free outside it (Smith-Waterman)
    Local,
    /// Gaps before and after the sequence are free (overlap alignment)
    SemiGlobal
}

/// Enumeration of the gap cost structures. The model is never chosen by name; it falls
/// out of the numeric relationship between the configured penalties, see [`AlignerConfig::gap_model`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GapModel {
    /// A gap of length k costs `k * open`
    Linear,
    /// A gap of length k costs `open + (k - 1) * extend`
    Affine,
    /// The cheaper of two affine tracks, modeling long-gap-cheap cost curves
    Convex
}

/**
Scoring configuration for the graph alignment engine. Gap open and extend penalties must
be non-positive; the secondary pair is optional and only engages the convex model when it
is cheaper for long gaps.
```
use poa_polish::aligner_config::{AlignerConfig, AlignerConfigBuilder, GapModel};
let config: AlignerConfig = AlignerConfigBuilder::default().build().unwrap();
assert_eq!(config.gap_model(), GapModel::Linear);
```
*/
#[derive(derive_builder::Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct AlignerConfig {
    /// Score for a matching base, must be positive
    pub match_score: i32,
    /// Score for a mismatching base, must be non-positive
    pub mismatch_score: i32,
    /// Primary gap open penalty, must be non-positive
    pub gap_open: i32,
    /// Primary gap extend penalty, must be non-positive
    pub gap_extend: i32,
    /// Secondary gap open penalty for the convex model
    pub second_gap_open: Option<i32>,
    /// Secondary gap extend penalty for the convex model
    pub second_gap_extend: Option<i32>
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            // these three follow the usual long-read polishing defaults
            match_score: 3,
            mismatch_score: -5,
            gap_open: -4,
            // equal to gap_open, so the default model is linear
            gap_extend: -4,
            // no secondary track unless a caller asks for convex costs
            second_gap_open: None,
            second_gap_extend: None
        }
    }
}

impl AlignerConfig {
    /// Checks the sign constraints on all scores.
    /// # Errors
    /// * if the match score is not positive
    /// * if the mismatch score or any gap penalty is positive
    /// * if only one half of the secondary gap pair is set
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.match_score <= 0 {
            bail!("Match score must be positive, got {}.", self.match_score);
        }
        if self.mismatch_score > 0 {
            bail!("Mismatch score must be non-positive, got {}.", self.mismatch_score);
        }
        if self.gap_open > 0 || self.gap_extend > 0 {
            bail!("Gap penalties must be non-positive, got open {} extend {}.", self.gap_open, self.gap_extend);
        }
        match (self.second_gap_open, self.second_gap_extend) {
            (None, None) => {}
            (Some(q), Some(c)) => {
                if q > 0 || c > 0 {
                    bail!("Secondary gap penalties must be non-positive, got open {} extend {}.", q, c);
                }
            }
            _ => bail!("Secondary gap open and extend must be set together.")
        }
        Ok(())
    }

    /// Returns the gap model selected by the numeric relationship between the penalties:
    /// open >= extend collapses to linear; a secondary pair that opens deeper but extends
    /// cheaper than the primary engages the convex model; anything else is affine.
    pub fn gap_model(&self) -> GapModel {
        if self.gap_open >= self.gap_extend {
            return GapModel::Linear;
        }
        if let (Some(q), Some(c)) = (self.second_gap_open, self.second_gap_extend) {
            if self.gap_open >= q && self.gap_extend <= c {
                return GapModel::Convex;
            }
        }
        GapModel::Affine
    }

    /// Returns the largest absolute score used anywhere in the recurrence,
    /// for the pre-alignment overflow bound.
    pub fn max_penalty(&self) -> i64 {
        let mut penalty = self.match_score.unsigned_abs().max(self.mismatch_score.unsigned_abs());
        penalty = penalty.max(self.gap_open.unsigned_abs()).max(self.gap_extend.unsigned_abs());
        if let (Some(q), Some(c)) = (self.second_gap_open, self.second_gap_extend) {
            penalty = penalty.max(q.unsigned_abs()).max(c.unsigned_abs());
        }
        penalty as i64
    }
}
