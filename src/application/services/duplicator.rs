//! Node duplicator service
//!
//! Copies a subtree next to the original under a new sibling index.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::services::node_store::ensure_mutable;
use crate::application::services::NodeStore;
use crate::application::ApplicationResult;
use crate::domain::{CopyMode, DomainError, Node, NodeId, TreeId};
use crate::infrastructure::TreeStore;

pub struct NodeDuplicator {
    store: Arc<TreeStore>,
    nodes: Arc<NodeStore>,
}

impl NodeDuplicator {
    pub fn new(store: Arc<TreeStore>, nodes: Arc<NodeStore>) -> Self {
        Self { store, nodes }
    }

    /// Duplicate `org_node` and its subtree as a sibling with `index = new_index`.
    #[instrument(level = "debug", skip(self))]
    pub fn dup_node(
        &self,
        tree_id: TreeId,
        org_node: NodeId,
        new_index: u32,
    ) -> ApplicationResult<NodeId> {
        let new_id = self.store.mutate(tree_id, |rec| {
            ensure_mutable(rec)?;
            let original = rec.node(org_node)?.clone();
            if original.is_root() {
                return Err(DomainError::InvalidNode("the root node cannot be duplicated".into()));
            }
            rec.check_slot(0, original.parent_id, &original.name, new_index)?;

            let snapshot = rec.clone();
            let created = rec.copy_subtree(
                &snapshot,
                org_node,
                original.parent_id,
                Some(new_index),
                CopyMode::Structure,
            )?;
            created
                .first()
                .copied()
                .ok_or_else(|| DomainError::InvalidNode("duplicate produced no node".into()))
        })?;
        info!(tree_id, org_node, new_index, new_id, "duplicated node");
        Ok(new_id)
    }

    pub fn delete_node(&self, node: &Node) -> ApplicationResult<usize> {
        self.nodes.delete_node(node)
    }

    pub fn delete_node_list(&self, nodes: &[Node]) -> ApplicationResult<usize> {
        self.nodes.delete_node_list(nodes)
    }
}
