use thiserror::Error;

/// Errors surfaced by the forest and its orchestration layer
///
/// Configuration problems are rejected before any processing starts; the
/// index-related variants signal contract violations inside a tree (eviction
/// bookkeeping out of sync with actual tree contents) and are never silently
/// swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RrcfError {
    /// A sizing parameter failed validation
    #[error("invalid configuration: `{name}` must be greater than zero (got {value})")]
    InvalidConfig { name: &'static str, value: usize },

    /// The index is not present in the tree
    #[error("index {index} is not present in the tree")]
    MissingIndex { index: usize },

    /// The index is already present in the tree
    #[error("index {index} is already present in the tree")]
    DuplicateIndex { index: usize },

    /// A point's width does not match the tree's dimensionality
    #[error("point has {got} dimensions, tree expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, RrcfError>;

///////////
// Tests //
///////////
