//! Reference resolution and constraint checking

use std::collections::HashSet;

use crate::domain::arena::TreeArena;
use crate::domain::entities::{LeafValue, Node, NodeId, NodeKind};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::record::TreeRecord;

/// Follow `>>path` references from `node` until a literal is found.
///
/// Chains longer than `max_depth` and cycles are constraint violations.
pub fn resolve_value(record: &TreeRecord, node: &Node, max_depth: usize) -> DomainResult<String> {
    let origin = record.qualified_name(node.node_id)?;
    let violation = |reason: String| DomainError::ConstraintViolation {
        path: origin.clone(),
        reason,
    };

    let mut seen: HashSet<NodeId> = HashSet::from([node.node_id]);
    let mut current = node;
    for _ in 0..=max_depth {
        match &current.kind {
            NodeKind::Group { .. } => {
                return Err(violation(format!(
                    "reference target '{}' is a group",
                    record.qualified_name(current.node_id)?
                )))
            }
            NodeKind::Leaf {
                value: LeafValue::Literal(value),
                ..
            } => return Ok(value.clone()),
            NodeKind::Leaf {
                value: LeafValue::Reference(path),
                ..
            } => {
                current = record
                    .resolve_path(path)
                    .map_err(|_| violation(format!("unresolved reference '>>{path}'")))?;
                if !seen.insert(current.node_id) {
                    return Err(violation(format!("reference cycle through '>>{path}'")));
                }
            }
        }
    }
    Err(violation(format!(
        "reference chain longer than {max_depth}"
    )))
}

/// Check every leaf below `top`, depth-first; the first failure is returned.
pub fn check_constraints(record: &TreeRecord, top: NodeId, max_depth: usize) -> DomainResult<()> {
    let arena = TreeArena::from_record(record, top)?;
    for leaf in arena.leaf_nodes() {
        let value = resolve_value(record, leaf, max_depth)?;
        if let NodeKind::Leaf {
            constraint: Some(constraint),
            ..
        } = &leaf.kind
        {
            constraint
                .check(&value)
                .map_err(|reason| DomainError::ConstraintViolation {
                    path: record.qualified_name(leaf.node_id).unwrap_or_default(),
                    reason,
                })?;
        }
    }
    Ok(())
}
