use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::bbox::BoundingBox;
use crate::error::{Result, RrcfError};

/// Handle into the tree's node arena
pub(crate) type NodeId = usize;

/// Tree node representation for the random cut tree
///
/// Each node is either a leaf (one stored point and its stream index) or a
/// branch (an axis-aligned cut with exactly two children). Children are
/// addressed by arena handle; the parent handle supports the upward box and
/// count maintenance after inserts and deletions without reference cycles.
#[derive(Clone, Debug)]
enum Node<T> {
    /// Terminal node holding one point of the stream
    Leaf {
        point: Vec<T>,
        index: usize,
        parent: Option<NodeId>,
    },
    /// Internal node splitting its bounding box with a random cut
    ///
    /// The left child holds points with coordinate below the cut value on the
    /// cut dimension, the right child holds the rest.
    Branch {
        cut_dim: usize,
        cut_value: T,
        left: NodeId,
        right: NodeId,
        bbox: BoundingBox<T>,
        leaf_count: usize,
        parent: Option<NodeId>,
    },
}

impl<T> Node<T> {
    #[inline(always)]
    fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf { parent, .. } => *parent,
            Node::Branch { parent, .. } => *parent,
        }
    }

    #[inline(always)]
    fn set_parent(&mut self, new_parent: Option<NodeId>) {
        match self {
            Node::Leaf { parent, .. } => *parent = new_parent,
            Node::Branch { parent, .. } => *parent = new_parent,
        }
    }

    #[inline(always)]
    fn leaf_count(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Branch { leaf_count, .. } => *leaf_count,
        }
    }
}

/////////////////////
// Random cut tree //
/////////////////////

/// A single randomized binary space-partition tree over a changing point set
///
/// Supports online insertion, deletion by stream index, and collusive
/// displacement scoring, each in expected O(log n) for n stored points. The
/// shape is randomized by the cuts rather than rebalanced, so pathological
/// depths are possible but rare; that is a property of the construction, not
/// corrected here.
///
/// Nodes live in an arena indexed by handle, with released slots recycled
/// through a free list, so a tree capped at `s` leaves never holds more than
/// `2s` slots. Each tree owns its generator; two trees with the same seed and
/// the same insertion history are identical.
pub struct RandomCutTree<T> {
    nodes: Vec<Node<T>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    leaves: FxHashMap<usize, NodeId>,
    dim: usize,
    rng: StdRng,
}

impl<T> RandomCutTree<T>
where
    T: Float,
{
    /// Creates an empty tree
    ///
    /// ### Params
    ///
    /// * `dim` - Dimensionality of the points this tree will store; must be
    ///   at least 1
    /// * `seed` - Seed for this tree's own generator; trees never share
    ///   randomness
    pub fn new(dim: usize, seed: u64) -> Self {
        RandomCutTree {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: FxHashMap::default(),
            dim,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of points currently stored
    #[inline(always)]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree holds no points
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Whether the given stream index is currently stored
    #[inline(always)]
    pub fn contains_index(&self, index: usize) -> bool {
        self.leaves.contains_key(&index)
    }

    /// Dimensionality of the stored points
    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Inserts a point under the given stream index
    ///
    /// ### Params
    ///
    /// * `point` - The point coordinates; width must match the tree
    /// * `index` - The stream position the point represents; must not already
    ///   be present
    ///
    /// ### Algorithm details
    ///
    /// Descends from the root. At each level the box covering the subtree and
    /// the new point is formed, a cut dimension is sampled with probability
    /// proportional to that dimension's extent in the combined box, and a cut
    /// value is sampled uniformly within that extent. A cut that falls
    /// outside the existing subtree's box separates the new point from every
    /// stored point: a fresh branch is spliced in at this level with the new
    /// leaf on the separated side, and ancestors above it have their boxes
    /// widened and their counts bumped. A cut inside the subtree's box does
    /// not separate, and the descent continues into the child chosen by the
    /// branch's own recorded cut.
    ///
    /// When the combined box has zero total span (the new point coincides
    /// with every stored point) the dimension is chosen uniformly and the cut
    /// collapses to the shared coordinate, which separates immediately with
    /// the new leaf on the left. Exact duplicates therefore still get their
    /// own leaf, and insertion always terminates.
    pub fn insert(&mut self, point: &[T], index: usize) -> Result<()> {
        if point.len() != self.dim {
            return Err(RrcfError::DimensionMismatch {
                expected: self.dim,
                got: point.len(),
            });
        }
        if self.leaves.contains_key(&index) {
            return Err(RrcfError::DuplicateIndex { index });
        }

        let Some(mut current) = self.root else {
            let leaf = self.alloc(Node::Leaf {
                point: point.to_vec(),
                index,
                parent: None,
            });
            self.root = Some(leaf);
            self.leaves.insert(index, leaf);
            return Ok(());
        };

        loop {
            let subtree_box = self.node_bbox(current);
            let combined = subtree_box.merge_point(point);
            let (cut_dim, cut_value) = self.sample_cut(&combined);

            if cut_value <= subtree_box.min()[cut_dim] {
                // the new point alone lies below the cut
                self.splice_new_branch(current, point, index, cut_dim, cut_value, combined, true);
                return Ok(());
            }
            if cut_value > subtree_box.max()[cut_dim] {
                // the new point alone lies at or above the cut
                self.splice_new_branch(current, point, index, cut_dim, cut_value, combined, false);
                return Ok(());
            }

            current = match &self.nodes[current] {
                Node::Branch {
                    cut_dim: d,
                    cut_value: v,
                    left,
                    right,
                    ..
                } => {
                    if point[*d] < *v {
                        *left
                    } else {
                        *right
                    }
                }
                // a leaf's box is a single coordinate per dimension, so one
                // of the two separation conditions above always fires first
                Node::Leaf { .. } => unreachable!("cut cannot fall inside a zero-width box"),
            };
        }
    }

    /// Removes the point stored under the given stream index
    ///
    /// The leaf's sibling is spliced into the grandparent (or becomes the new
    /// root), and every ancestor's box is rebuilt from its surviving children
    /// on the way back up. A missing index is a contract violation: it means
    /// eviction bookkeeping no longer matches actual tree contents.
    pub fn forget(&mut self, index: usize) -> Result<()> {
        let leaf = match self.leaves.remove(&index) {
            Some(id) => id,
            None => return Err(RrcfError::MissingIndex { index }),
        };

        let Some(parent) = self.nodes[leaf].parent() else {
            self.root = None;
            self.release(leaf);
            return Ok(());
        };

        let (left, right) = self.children(parent);
        let grandparent = self.nodes[parent].parent();
        let sibling = if left == leaf { right } else { left };

        self.nodes[sibling].set_parent(grandparent);
        match grandparent {
            None => self.root = Some(sibling),
            Some(g) => self.replace_child(g, parent, sibling),
        }

        // removal can shrink any dimension, so ancestor boxes are rebuilt
        // from their children instead of shrunk in place
        let mut cursor = grandparent;
        while let Some(id) = cursor {
            let (l, r) = self.children(id);
            let rebuilt = BoundingBox::merge(&self.node_bbox(l), &self.node_bbox(r));
            let (bbox, leaf_count, up) = self.branch_parts_mut(id);
            *bbox = rebuilt;
            *leaf_count -= 1;
            cursor = up;
        }

        self.release(parent);
        self.release(leaf);
        Ok(())
    }

    /// Collusive displacement of the point stored under `index`
    ///
    /// Walks from the leaf towards the root; at each level the ratio of the
    /// sibling subtree's size to the size of the subtree containing the leaf
    /// measures how many points a removal would displace relative to the
    /// group claiming the point. The score is the maximum ratio along the
    /// path: a large value at a shallow level means the point, or a small
    /// colluding cluster around it, is cheap to isolate.
    ///
    /// A tree holding only this point scores 0. With two or more points the
    /// score is at least 1, and every ratio is below the tree's leaf count.
    pub fn codisp(&self, index: usize) -> Result<T> {
        let leaf = match self.leaves.get(&index) {
            Some(id) => *id,
            None => return Err(RrcfError::MissingIndex { index }),
        };

        let mut node = leaf;
        let mut best = T::zero();
        while let Some(parent) = self.nodes[node].parent() {
            let (left, right) = self.children(parent);
            let sibling = if left == node { right } else { left };
            let displaced = T::from(self.nodes[sibling].leaf_count()).unwrap();
            let colluders = T::from(self.nodes[node].leaf_count()).unwrap();
            best = best.max(displaced / colluders);
            node = parent;
        }
        Ok(best)
    }

    /////////////
    // Helpers //
    /////////////

    /// Samples a cut for the given box: a dimension weighted by extent and a
    /// value uniform within that dimension's range
    ///
    /// A box with zero total span falls back to a uniform dimension choice
    /// with the cut at the shared coordinate, keeping the sampling
    /// well-defined instead of dividing by zero.
    fn sample_cut(&mut self, bbox: &BoundingBox<T>) -> (usize, T) {
        let spans = bbox.span();
        let total = bbox.total_span();
        if total <= T::zero() {
            let dim = self.rng.random_range(0..bbox.dim());
            return (dim, bbox.min()[dim]);
        }

        let r = T::from(self.rng.random_range(0.0..total.to_f64().unwrap())).unwrap();
        let mut cumulative = T::zero();
        let mut last = 0;
        for (dim, span) in spans.iter().enumerate() {
            if *span <= T::zero() {
                continue;
            }
            last = dim;
            cumulative = cumulative + *span;
            if cumulative > r {
                let cut = (bbox.min()[dim] + (cumulative - r)).min(bbox.max()[dim]);
                return (dim, cut);
            }
        }
        // rounding can leave r at the very top of the cumulative span
        (last, bbox.max()[last])
    }

    /// Splices a new branch in at `at`, with the new point as one child and
    /// the old subtree as the other, then widens boxes and bumps counts on
    /// the path above
    #[allow(clippy::too_many_arguments)]
    fn splice_new_branch(
        &mut self,
        at: NodeId,
        point: &[T],
        index: usize,
        cut_dim: usize,
        cut_value: T,
        bbox: BoundingBox<T>,
        leaf_on_left: bool,
    ) {
        let parent = self.nodes[at].parent();
        let leaf_count = self.nodes[at].leaf_count() + 1;

        let leaf = self.alloc(Node::Leaf {
            point: point.to_vec(),
            index,
            parent: None,
        });
        let (left, right) = if leaf_on_left { (leaf, at) } else { (at, leaf) };
        let branch = self.alloc(Node::Branch {
            cut_dim,
            cut_value,
            left,
            right,
            bbox,
            leaf_count,
            parent,
        });
        self.nodes[leaf].set_parent(Some(branch));
        self.nodes[at].set_parent(Some(branch));
        match parent {
            None => self.root = Some(branch),
            Some(p) => self.replace_child(p, at, branch),
        }

        let mut cursor = parent;
        while let Some(id) = cursor {
            let (bbox, leaf_count, up) = self.branch_parts_mut(id);
            bbox.extend(point);
            *leaf_count += 1;
            cursor = up;
        }

        self.leaves.insert(index, leaf);
    }

    /// Box covering the subtree rooted at `id`
    fn node_bbox(&self, id: NodeId) -> BoundingBox<T> {
        match &self.nodes[id] {
            Node::Leaf { point, .. } => BoundingBox::from_point(point),
            Node::Branch { bbox, .. } => bbox.clone(),
        }
    }

    fn children(&self, id: NodeId) -> (NodeId, NodeId) {
        match &self.nodes[id] {
            Node::Branch { left, right, .. } => (*left, *right),
            Node::Leaf { .. } => unreachable!("leaves have no children"),
        }
    }

    fn branch_parts_mut(&mut self, id: NodeId) -> (&mut BoundingBox<T>, &mut usize, Option<NodeId>) {
        match &mut self.nodes[id] {
            Node::Branch {
                bbox,
                leaf_count,
                parent,
                ..
            } => (bbox, leaf_count, *parent),
            Node::Leaf { .. } => unreachable!("interior nodes are always branches"),
        }
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if let Node::Branch { left, right, .. } = &mut self.nodes[parent] {
            if *left == old {
                *left = new;
            } else if *right == old {
                *right = new;
            }
        }
    }

    /// Takes a slot from the free list or grows the arena
    fn alloc(&mut self, node: Node<T>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Returns a slot to the free list
    ///
    /// Slot contents stay in place until the slot is reused; no live handle
    /// ever points at a released slot.
    fn release(&mut self, id: NodeId) {
        self.free.push(id);
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Recursively checks parent handles, stored leaf counts, and stored
    /// boxes against recomputed values; returns the subtree's count and box
    fn check_subtree(
        tree: &RandomCutTree<f64>,
        id: NodeId,
        expected_parent: Option<NodeId>,
    ) -> (usize, BoundingBox<f64>) {
        match &tree.nodes[id] {
            Node::Leaf { point, parent, .. } => {
                assert_eq!(*parent, expected_parent, "leaf parent handle out of sync");
                (1, BoundingBox::from_point(point))
            }
            Node::Branch {
                left,
                right,
                bbox,
                leaf_count,
                parent,
                ..
            } => {
                assert_eq!(*parent, expected_parent, "branch parent handle out of sync");
                let (lc, lb) = check_subtree(tree, *left, Some(id));
                let (rc, rb) = check_subtree(tree, *right, Some(id));
                let rebuilt = BoundingBox::merge(&lb, &rb);
                assert_eq!(lc + rc, *leaf_count, "stored leaf count out of sync");
                assert_eq!(&rebuilt, bbox, "stored box does not cover the subtree");
                (lc + rc, rebuilt)
            }
        }
    }

    /// Full structural invariant check: counts, boxes, parent handles, and
    /// agreement between the index map and the actual leaves
    fn check_invariants(tree: &RandomCutTree<f64>) {
        match tree.root {
            None => assert!(tree.leaves.is_empty()),
            Some(root) => {
                let (count, _) = check_subtree(tree, root, None);
                assert_eq!(count, tree.leaves.len());
                for (&index, &leaf) in &tree.leaves {
                    match &tree.nodes[leaf] {
                        Node::Leaf { index: stored, .. } => assert_eq!(*stored, index),
                        Node::Branch { .. } => panic!("index {} maps to a branch", index),
                    }
                }
            }
        }
    }

    fn seeded_points(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn test_single_point() {
        let mut tree = RandomCutTree::<f64>::new(3, 42);
        assert!(tree.is_empty());
        tree.insert(&[1.0, 2.0, 3.0], 0).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert!(tree.contains_index(0));
        // nothing to displace with one stored point
        assert_relative_eq!(tree.codisp(0).unwrap(), 0.0);
        check_invariants(&tree);
    }

    #[test]
    fn test_invariants_across_inserts() {
        let points = seeded_points(60, 3, 7);
        let mut tree = RandomCutTree::new(3, 42);
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, i).unwrap();
            check_invariants(&tree);
        }
        assert_eq!(tree.leaf_count(), 60);
    }

    #[test]
    fn test_invariants_across_forgets() {
        let points = seeded_points(40, 2, 11);
        let mut tree = RandomCutTree::new(2, 42);
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, i).unwrap();
        }
        for i in 0..40 {
            tree.forget(i).unwrap();
            assert!(!tree.contains_index(i));
            check_invariants(&tree);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_insert_forget_round_trip() {
        let points = seeded_points(20, 3, 3);
        let mut tree = RandomCutTree::new(3, 42);
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, i).unwrap();
        }
        let root_box_before = tree.node_bbox(tree.root.unwrap());
        let count_before = tree.leaf_count();

        tree.insert(&[5.0, -5.0, 5.0], 99).unwrap();
        tree.forget(99).unwrap();

        assert_eq!(tree.leaf_count(), count_before);
        for i in 0..20 {
            assert!(tree.contains_index(i));
        }
        assert_eq!(tree.node_bbox(tree.root.unwrap()), root_box_before);
        check_invariants(&tree);
    }

    #[test]
    fn test_codisp_flags_outlier() {
        let mut points = seeded_points(40, 3, 5);
        points.push(vec![10.0, 10.0, 10.0]);
        let mut tree = RandomCutTree::new(3, 42);
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, i).unwrap();
        }

        let outlier_score = tree.codisp(40).unwrap();
        let inlier_score = tree.codisp(0).unwrap();
        assert!(
            outlier_score > inlier_score,
            "outlier {} should out-score inlier {}",
            outlier_score,
            inlier_score
        );
    }

    #[test]
    fn test_codisp_bounds() {
        let points = seeded_points(50, 2, 9);
        let mut tree = RandomCutTree::new(2, 42);
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, i).unwrap();
        }
        let n = tree.leaf_count() as f64;
        for i in 0..50 {
            let score = tree.codisp(i).unwrap();
            assert!(score >= 1.0, "codisp {} below 1 in a populated tree", score);
            assert!(score < n, "codisp {} not below leaf count {}", score, n);
        }
    }

    #[test]
    fn test_exact_duplicates_each_get_a_leaf() {
        let mut tree = RandomCutTree::new(2, 42);
        for i in 0..5 {
            tree.insert(&[1.5, -0.5], i).unwrap();
        }
        assert_eq!(tree.leaf_count(), 5);
        check_invariants(&tree);
        for i in 0..5 {
            assert!(tree.codisp(i).unwrap().is_finite());
        }
        tree.forget(2).unwrap();
        tree.forget(0).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        check_invariants(&tree);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut tree = RandomCutTree::new(1, 42);
        tree.insert(&[1.0], 0).unwrap();
        assert_eq!(
            tree.insert(&[2.0], 0),
            Err(RrcfError::DuplicateIndex { index: 0 })
        );
    }

    #[test]
    fn test_missing_index_is_contract_violation() {
        let mut tree = RandomCutTree::<f64>::new(1, 42);
        assert_eq!(tree.forget(3), Err(RrcfError::MissingIndex { index: 3 }));
        assert_eq!(tree.codisp(3), Err(RrcfError::MissingIndex { index: 3 }));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut tree = RandomCutTree::new(3, 42);
        assert_eq!(
            tree.insert(&[1.0, 2.0], 0),
            Err(RrcfError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn test_arena_slots_are_recycled() {
        let capacity = 16;
        let points = seeded_points(200, 2, 13);
        let mut tree = RandomCutTree::new(2, 42);
        for (i, p) in points.iter().enumerate() {
            if tree.leaf_count() >= capacity {
                tree.forget(i - capacity).unwrap();
            }
            tree.insert(p, i).unwrap();
        }
        // at most `capacity` leaves plus `capacity - 1` branches may be live
        assert!(tree.leaf_count() <= capacity);
        assert!(
            tree.nodes.len() <= 2 * capacity,
            "arena grew to {} slots for {} leaves",
            tree.nodes.len(),
            capacity
        );
        check_invariants(&tree);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let points = seeded_points(30, 3, 17);
        let mut a = RandomCutTree::new(3, 123);
        let mut b = RandomCutTree::new(3, 123);
        for (i, p) in points.iter().enumerate() {
            a.insert(p, i).unwrap();
            b.insert(p, i).unwrap();
        }
        for i in 0..30 {
            assert_eq!(a.codisp(i).unwrap(), b.codisp(i).unwrap());
        }
    }
}
