use num_traits::Float;

//////////////////
// Bounding box //
//////////////////

/// Axis-aligned bounding box over a set of d-dimensional points
///
/// Holds the element-wise minimum and maximum of the covered points. Boxes
/// only grow through `extend`; shrinking a box after a deletion is done by
/// rebuilding it from the surviving children, never in place.
///
/// A box may have zero span in every dimension (all covered points
/// identical); cut sampling treats that as a defined edge case rather than an
/// error.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox<T> {
    min: Vec<T>,
    max: Vec<T>,
}

impl<T> BoundingBox<T>
where
    T: Float,
{
    /// Creates the degenerate box covering a single point
    ///
    /// ### Params
    ///
    /// * `point` - Coordinates of the point
    ///
    /// ### Returns
    ///
    /// A box with `min == max == point`
    pub fn from_point(point: &[T]) -> Self {
        BoundingBox {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Number of dimensions
    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.min.len()
    }

    /// Per-dimension minima
    #[inline(always)]
    pub fn min(&self) -> &[T] {
        &self.min
    }

    /// Per-dimension maxima
    #[inline(always)]
    pub fn max(&self) -> &[T] {
        &self.max
    }

    /// Grows the box in place so that it also covers `point`
    pub fn extend(&mut self, point: &[T]) {
        for (m, x) in self.min.iter_mut().zip(point) {
            if *x < *m {
                *m = *x;
            }
        }
        for (m, x) in self.max.iter_mut().zip(point) {
            if *x > *m {
                *m = *x;
            }
        }
    }

    /// Box covering both input boxes
    ///
    /// ### Params
    ///
    /// * `a` - First box
    /// * `b` - Second box
    ///
    /// ### Returns
    ///
    /// The element-wise min/max across both boxes
    pub fn merge(a: &Self, b: &Self) -> Self {
        let min = a
            .min
            .iter()
            .zip(&b.min)
            .map(|(&x, &y)| x.min(y))
            .collect();
        let max = a
            .max
            .iter()
            .zip(&b.max)
            .map(|(&x, &y)| x.max(y))
            .collect();
        BoundingBox { min, max }
    }

    /// Box covering this box and one extra point
    ///
    /// Same semantics as merging with the point's degenerate box; used on
    /// every level of a tree descent during insertion.
    pub fn merge_point(&self, point: &[T]) -> Self {
        let mut merged = self.clone();
        merged.extend(point);
        merged
    }

    /// Per-dimension extents (`max - min`)
    ///
    /// Used to weight cut-dimension sampling.
    pub fn span(&self) -> Vec<T> {
        self.max
            .iter()
            .zip(&self.min)
            .map(|(&hi, &lo)| hi - lo)
            .collect()
    }

    /// Sum of the per-dimension extents
    ///
    /// Zero exactly when every covered point is identical.
    pub fn total_span(&self) -> T {
        self.max
            .iter()
            .zip(&self.min)
            .map(|(&hi, &lo)| hi - lo)
            .fold(T::zero(), |acc, s| acc + s)
    }

    /// Closed-interval membership test per dimension
    pub fn contains(&self, point: &[T]) -> bool {
        self.min
            .iter()
            .zip(&self.max)
            .zip(point)
            .all(|((&lo, &hi), &x)| lo <= x && x <= hi)
    }
}

///////////
// Tests //
///////////
