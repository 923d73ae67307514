use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thousands::*;

use crate::error::Result;
use crate::tree::RandomCutTree;

/// Runs one tree's full insert/evict/score pass over a point stream
///
/// Within a tree the stream is inherently sequential: the shape is a function
/// of the full insertion history, so points are processed in strict index
/// order. Eviction fires before an insert would push the tree past capacity,
/// and a point's score is taken immediately after its insertion and never
/// revisited.
fn stream_pass<T>(
    tree: &mut RandomCutTree<T>,
    points: &[Vec<T>],
    tree_size: usize,
) -> Result<Vec<T>>
where
    T: Float,
{
    let mut scores = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        if tree.leaf_count() >= tree_size {
            if let Some(oldest) = index.checked_sub(tree_size) {
                if tree.contains_index(oldest) {
                    tree.forget(oldest)?;
                }
            }
        }
        tree.insert(point, index)?;
        scores.push(tree.codisp(index)?);
    }
    Ok(scores)
}

////////////
// Forest //
////////////

/// A fixed ensemble of independent random cut trees over a sliding window
///
/// Trees share configuration but no state: each owns its nodes, its index
/// map, and its generator, seeded once from the master seed. Scores from the
/// individual trees are averaged to reduce the variance of any single
/// randomized partition.
///
/// Eviction is strict FIFO by stream index: once a tree is at `tree_size`
/// leaves, the arrival of index `i` first removes index `i - tree_size`, so
/// no tree ever exceeds its capacity and total memory stays bounded at
/// O(num_trees × tree_size × dimension).
pub struct RcForest<T> {
    trees: Vec<RandomCutTree<T>>,
    tree_size: usize,
    num_trees: usize,
}

impl<T> RcForest<T>
where
    T: Float + Send + Sync,
{
    /// Creates a forest of empty trees
    ///
    /// ### Params
    ///
    /// * `num_trees` - Ensemble size
    /// * `tree_size` - Maximum leaves per tree (sliding window length)
    /// * `dim` - Dimensionality of the points (the shingle width)
    /// * `seed` - Master seed; per-tree seeds are drawn from it once, so a
    ///   fixed master seed fixes every tree's behaviour regardless of how the
    ///   trees are later scheduled
    pub fn new(num_trees: usize, tree_size: usize, dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..num_trees).map(|_| rng.random()).collect();
        let trees = seeds
            .into_iter()
            .map(|tree_seed| RandomCutTree::new(dim, tree_seed))
            .collect();

        RcForest {
            trees,
            tree_size,
            num_trees,
        }
    }

    /// Ensemble size
    #[inline(always)]
    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// Maximum leaves per tree
    #[inline(always)]
    pub fn tree_size(&self) -> usize {
        self.tree_size
    }

    /// Read access to the individual trees
    pub fn trees(&self) -> &[RandomCutTree<T>] {
        &self.trees
    }

    /// Whether any tree still stores the given stream index
    pub fn contains_index(&self, index: usize) -> bool {
        self.trees.iter().any(|tree| tree.contains_index(index))
    }

    /// Processes one point through every tree and returns its final score
    ///
    /// Per tree: evict the window's oldest index if the tree is at capacity,
    /// insert, and take the collusive displacement immediately. The returned
    /// value is the average over all trees and is final the moment this call
    /// returns; it is never recomputed as later points reshape the trees
    /// (one-pass streaming, trading smoothing for real-time emission).
    ///
    /// ### Params
    ///
    /// * `point` - The shingled point
    /// * `index` - Its stream index; must increase strictly across calls
    ///
    /// ### Returns
    ///
    /// The averaged anomaly score for this index
    pub fn process(&mut self, point: &[T], index: usize) -> Result<T> {
        let mut total = T::zero();
        for tree in &mut self.trees {
            if tree.leaf_count() >= self.tree_size {
                if let Some(oldest) = index.checked_sub(self.tree_size) {
                    if tree.contains_index(oldest) {
                        tree.forget(oldest)?;
                    }
                }
            }
            tree.insert(point, index)?;
            total = total + tree.codisp(index)?;
        }
        Ok(total / T::from(self.num_trees).unwrap())
    }

    /// Scores a whole point stream, one parallel pass per tree
    ///
    /// Trees never share mutable state, so each runs its full stream pass in
    /// its own task; the per-tree score vectors are reduced by element-wise
    /// mean at the end. For the same seeds this produces exactly the same
    /// scores as feeding every point through `process`.
    ///
    /// ### Params
    ///
    /// * `points` - The shingled stream, in index order
    /// * `verbose` - Print progress information
    ///
    /// ### Returns
    ///
    /// One averaged score per point, in stream order
    pub fn score_points(&mut self, points: &[Vec<T>], verbose: bool) -> Result<Vec<T>> {
        if verbose {
            println!(
                "Scoring {} shingled points with {} trees (window {})",
                points.len().separate_with_underscores(),
                self.num_trees.separate_with_underscores(),
                self.tree_size.separate_with_underscores()
            );
        }
        let start = Instant::now();
        let counter = Arc::new(AtomicUsize::new(0));

        let tree_size = self.tree_size;
        let num_trees = self.num_trees;
        let per_tree: Vec<Vec<T>> = self
            .trees
            .par_iter_mut()
            .map(|tree| {
                let scores = stream_pass(tree, points, tree_size)?;
                if verbose {
                    let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 25 == 0 || done == num_trees {
                        println!("  Completed {} / {} trees", done, num_trees);
                    }
                }
                Ok(scores)
            })
            .collect::<Result<Vec<Vec<T>>>>()?;

        let divisor = T::from(self.num_trees).unwrap();
        let mut averaged = vec![T::zero(); points.len()];
        for scores in &per_tree {
            for (acc, score) in averaged.iter_mut().zip(scores) {
                *acc = *acc + *score;
            }
        }
        for acc in averaged.iter_mut() {
            *acc = *acc / divisor;
        }

        if verbose {
            println!("Forest pass completed in {:.2?}", start.elapsed());
        }
        Ok(averaged)
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seeded_points(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn test_trees_are_independent() {
        let forest = RcForest::<f64>::new(4, 16, 2, 42);
        assert_eq!(forest.num_trees(), 4);
        assert_eq!(forest.trees().len(), 4);
        for tree in forest.trees() {
            assert!(tree.is_empty());
            assert_eq!(tree.dim(), 2);
        }
    }

    #[test]
    fn test_fifo_eviction_keeps_trees_at_capacity() {
        let tree_size = 8;
        let points = seeded_points(50, 2, 3);
        let mut forest = RcForest::new(3, tree_size, 2, 42);
        for (i, p) in points.iter().enumerate() {
            forest.process(p, i).unwrap();
            for tree in forest.trees() {
                assert!(tree.leaf_count() <= tree_size);
            }
        }
        // exactly the newest window survives
        for i in 0..50 {
            let expected = i >= 50 - tree_size;
            assert_eq!(forest.contains_index(i), expected, "index {}", i);
        }
    }

    #[test]
    fn test_scores_survive_eviction() {
        let points = seeded_points(40, 2, 5);
        let mut forest = RcForest::new(2, 8, 2, 42);
        let mut scores = Vec::new();
        for (i, p) in points.iter().enumerate() {
            scores.push(forest.process(p, i).unwrap());
        }
        assert_eq!(scores.len(), 40);
        assert!(!forest.contains_index(0));
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let points = seeded_points(60, 3, 7);
        let mut sequential = RcForest::new(4, 16, 3, 99);
        let mut parallel = RcForest::new(4, 16, 3, 99);

        let seq_scores: Vec<f64> = points
            .iter()
            .enumerate()
            .map(|(i, p)| sequential.process(p, i).unwrap())
            .collect();
        let par_scores = parallel.score_points(&points, false).unwrap();

        assert_eq!(seq_scores.len(), par_scores.len());
        for (s, p) in seq_scores.iter().zip(&par_scores) {
            assert_relative_eq!(*s, *p);
        }
    }

    #[test]
    fn test_same_seed_reproducible() {
        let points = seeded_points(30, 2, 11);
        let mut a = RcForest::new(5, 16, 2, 1);
        let mut b = RcForest::new(5, 16, 2, 1);
        let scores_a = a.score_points(&points, false).unwrap();
        let scores_b = b.score_points(&points, false).unwrap();
        assert_eq!(scores_a, scores_b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let points = seeded_points(30, 2, 11);
        let mut a = RcForest::new(5, 16, 2, 1);
        let mut b = RcForest::new(5, 16, 2, 2);
        let scores_a = a.score_points(&points, false).unwrap();
        let scores_b = b.score_points(&points, false).unwrap();
        assert_ne!(scores_a, scores_b);
    }

    #[test]
    fn test_outlier_scores_above_baseline() {
        // a noisy stream with one large spike in the middle
        let mut rng = StdRng::seed_from_u64(21);
        let mut values: Vec<f64> = (0..64).map(|_| rng.random_range(-1.0..1.0)).collect();
        values[40] = 25.0;
        let points: Vec<Vec<f64>> = values.windows(4).map(|w| w.to_vec()).collect();

        let mut forest = RcForest::new(8, 32, 4, 42);
        let scores = forest.score_points(&points, false).unwrap();

        // the spike enters the window at shingle 37 (= 40 - 4 + 1)
        let spike_score = scores[37..=40].iter().cloned().fold(f64::MIN, f64::max);
        let baseline = scores[10..30].iter().cloned().fold(f64::MIN, f64::max);
        assert!(
            spike_score > baseline,
            "spike {} should out-score baseline {}",
            spike_score,
            baseline
        );
    }
}
