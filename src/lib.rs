//! Streaming anomaly scoring for numeric series with robust random cut
//! forests: an ensemble of randomized, axis-aligned partition trees
//! maintained online over a sliding window, scoring each point by its
//! collusive displacement as it arrives.

use num_traits::Float;

pub mod bbox;
pub mod error;
pub mod forest;
pub mod scorer;
pub mod shingle;
pub mod synthetic;
pub mod tree;

pub use crate::bbox::BoundingBox;
pub use crate::error::{Result, RrcfError};
pub use crate::forest::RcForest;
pub use crate::scorer::{RrcfParams, ScoredPoint, SeriesScorer, StreamScorer};
pub use crate::shingle::shingle;
pub use crate::tree::RandomCutTree;

/// Scores a timestamped series end to end
///
/// Convenience wrapper: validates the parameters, shingles the values,
/// runs the forest, and aligns the averaged scores back onto the
/// window-start timestamps.
///
/// ### Params
///
/// * `series` - Ordered `(timestamp, value)` pairs
/// * `params` - Forest sizing
///
/// ### Returns
///
/// One `ScoredPoint` per shingle, in input order
pub fn score_series<T>(series: &[(i64, T)], params: &RrcfParams) -> Result<Vec<ScoredPoint<T>>>
where
    T: Float + Send + Sync,
{
    StreamScorer::new(*params)?.score_series(series)
}

/// Scores a bare value series end to end
///
/// Like [`score_series`] but without timestamps: returns one averaged
/// anomaly score per shingle, where score `i` belongs to the window starting
/// at `values[i]`.
///
/// ### Params
///
/// * `values` - Ordered scalar values
/// * `params` - Forest sizing
///
/// ### Returns
///
/// The score series, of length `max(0, n - shingle_size + 1)`
pub fn score_values<T>(values: &[T], params: &RrcfParams) -> Result<Vec<T>>
where
    T: Float + Send + Sync,
{
    params.validate()?;
    let points: Vec<Vec<T>> = shingle(values, params.shingle_size).collect();
    if points.is_empty() {
        return Ok(Vec::new());
    }
    let mut forest = RcForest::new(
        params.num_trees,
        params.tree_size,
        params.shingle_size,
        params.seed,
    );
    forest.score_points(&points, false)
}
