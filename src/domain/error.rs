//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::{NodeId, TreeId, TreeState, TreeType};

/// Domain errors represent violations of tree invariants and the state machine.
/// These are independent of storage and transport concerns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("tree not found: {0}")]
    TreeNotFound(TreeId),

    #[error("node not found: {node_id} in tree {tree_id}")]
    NodeNotFound { tree_id: TreeId, node_id: NodeId },

    #[error("no node named '{name}' in tree {tree_id}")]
    NameNotFound { tree_id: TreeId, name: String },

    #[error("illegal state transition for tree {tree_id}: {from} -> {to}")]
    InvalidTransition {
        tree_id: TreeId,
        from: TreeState,
        to: TreeState,
    },

    #[error("constraint violated at '{path}': {reason}")]
    ConstraintViolation { path: String, reason: String },

    #[error("index {index} already used by '{name}' under node {parent_id}")]
    IndexCollision {
        parent_id: NodeId,
        name: String,
        index: u32,
    },

    #[error("tree {tree_id} is not mutable: {reason}")]
    NotMutable { tree_id: TreeId, reason: String },

    #[error("batch rejected at item {position}: {source}")]
    PartialBatchFailure {
        position: usize,
        #[source]
        source: Box<DomainError>,
    },

    #[error("tree {tree_id} is a {actual} tree, expected {expected}")]
    WrongTreeType {
        tree_id: TreeId,
        expected: TreeType,
        actual: TreeType,
    },

    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// True for the not-found family of errors.
    pub fn is_not_found(&self) -> bool {
        match self {
            DomainError::TreeNotFound(_)
            | DomainError::NodeNotFound { .. }
            | DomainError::NameNotFound { .. } => true,
            DomainError::PartialBatchFailure { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
