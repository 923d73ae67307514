use num_traits::Float;
use thousands::*;

use crate::error::{Result, RrcfError};
use crate::forest::RcForest;
use crate::shingle::shingle;

///////////////////
// Configuration //
///////////////////

/// Sizing parameters for the forest
///
/// Defaults follow the established values for streaming robust random cut
/// forests on scalar telemetry: 100 trees, shingles of 18 samples, and a
/// 256-point sliding window per tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RrcfParams {
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Width of each shingle (the dimensionality of the forest's points)
    pub shingle_size: usize,
    /// Maximum leaves per tree (sliding window length)
    pub tree_size: usize,
    /// Master seed; fixes every tree's randomness
    pub seed: u64,
}

impl Default for RrcfParams {
    fn default() -> Self {
        RrcfParams {
            num_trees: 100,
            shingle_size: 18,
            tree_size: 256,
            seed: 42,
        }
    }
}

impl RrcfParams {
    /// Rejects unusable sizing before any processing starts
    ///
    /// A `shingle_size` larger than the stream is not a configuration error;
    /// it simply produces an empty output.
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(RrcfError::InvalidConfig {
                name: "num_trees",
                value: self.num_trees,
            });
        }
        if self.shingle_size == 0 {
            return Err(RrcfError::InvalidConfig {
                name: "shingle_size",
                value: self.shingle_size,
            });
        }
        if self.tree_size == 0 {
            return Err(RrcfError::InvalidConfig {
                name: "tree_size",
                value: self.tree_size,
            });
        }
        Ok(())
    }
}

////////////
// Output //
////////////

/// One scored sample of the input series
///
/// The score is attached to the timestamp at the **start** of the shingle
/// that produced it; the last `shingle_size - 1` input timestamps therefore
/// receive no score. Window-end alignment would be equally defensible, but
/// window-start is what the source behaviour does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredPoint<T> {
    /// Timestamp of the sample (window start)
    pub timestamp: i64,
    /// Original value at that timestamp
    pub value: T,
    /// Averaged collusive displacement of the shingle starting here
    pub score: T,
}

/// Anything that can score a timestamped series
///
/// Alternative scorers (forecast residuals, reconstruction errors, rolling
/// baselines) substitute for the forest by implementing this trait: the
/// downstream flagging logic only needs a numeric series aligned to the
/// original timestamps.
pub trait SeriesScorer<T> {
    /// Scores the series, one output entry per scored timestamp
    fn score_series(&self, series: &[(i64, T)]) -> Result<Vec<ScoredPoint<T>>>;
}

///////////////////
// Stream scorer //
///////////////////

/// Orchestrates shingling, the forest pass, and timestamp alignment
///
/// Feeds the value series through the shingler, drives every tree's
/// insert/evict/score cycle over the resulting points, and zips the averaged
/// scores back onto the window-start timestamps.
pub struct StreamScorer {
    params: RrcfParams,
    verbose: bool,
}

impl StreamScorer {
    /// Creates a scorer, validating the parameters up front
    ///
    /// ### Params
    ///
    /// * `params` - Forest sizing; rejected here, before any processing, if
    ///   any sizing field is zero
    pub fn new(params: RrcfParams) -> Result<Self> {
        params.validate()?;
        Ok(StreamScorer {
            params,
            verbose: false,
        })
    }

    /// Enables or disables progress output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The validated parameters
    pub fn params(&self) -> &RrcfParams {
        &self.params
    }
}

impl<T> SeriesScorer<T> for StreamScorer
where
    T: Float + Send + Sync,
{
    fn score_series(&self, series: &[(i64, T)]) -> Result<Vec<ScoredPoint<T>>> {
        let values: Vec<T> = series.iter().map(|&(_, v)| v).collect();
        let points: Vec<Vec<T>> = shingle(&values, self.params.shingle_size).collect();
        if points.is_empty() {
            return Ok(Vec::new());
        }
        if self.verbose {
            println!(
                "Shingled {} samples into {} points of width {}",
                series.len().separate_with_underscores(),
                points.len().separate_with_underscores(),
                self.params.shingle_size
            );
        }

        let mut forest = RcForest::new(
            self.params.num_trees,
            self.params.tree_size,
            self.params.shingle_size,
            self.params.seed,
        );
        let scores = forest.score_points(&points, self.verbose)?;

        Ok(series
            .iter()
            .zip(scores)
            .map(|(&(timestamp, value), score)| ScoredPoint {
                timestamp,
                value,
                score,
            })
            .collect())
    }
}

///////////
// Tests //
///////////
