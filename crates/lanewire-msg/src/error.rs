/// Errors from building or interpreting a message layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// A node's data does not fit in the length bits of a layout word.
    #[error("node of {len} bytes exceeds layout limit of {max} bytes")]
    NodeTooLarge { len: usize, max: usize },

    /// The layout ended while a node still expected children or siblings.
    #[error("layout truncated after {nodes} nodes")]
    Truncated { nodes: usize },

    /// Entries remain after the root's subtree is complete.
    #[error("layout has trailing entries from index {index}")]
    TrailingEntries { index: usize },

    /// The first entry claims a sibling; a message has exactly one root.
    #[error("root node is marked as having a sibling")]
    RootHasSibling,

    /// A layout needs at least one node.
    #[error("layout is empty")]
    EmptyLayout,

    /// Total payload bytes exceed the configured maximum.
    #[error("message payload of {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// A node buffer could not be allocated.
    #[error("failed to allocate {len} bytes for a node buffer")]
    AllocationFailed { len: usize },

    /// The caller-supplied node count disagrees with the tree.
    #[error("expected {expected} nodes, message has {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, LayoutError>;
