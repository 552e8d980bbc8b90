//! Node store service
//!
//! Single entry point for reading and writing node records. Every mutation
//! is checked against the owning tree's state and applied atomically.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::ApplicationResult;
use crate::domain::state::{allows_node_edits, is_terminal};
use crate::domain::{
    DomainError, DomainResult, NamePattern, Node, NodeId, NodeKind, TreeId, TreeRecord, TreeType,
};
use crate::infrastructure::TreeStore;

/// Reject node edits once a tree has moved past `specified`.
pub(crate) fn ensure_mutable(record: &TreeRecord) -> DomainResult<()> {
    if allows_node_edits(record.info.state) {
        Ok(())
    } else {
        Err(DomainError::NotMutable {
            tree_id: record.tree_id(),
            reason: format!("tree is {}", record.info.state),
        })
    }
}

/// Template topology only changes through duplication and deletion.
fn ensure_topology_kept(record: &TreeRecord, node: &Node) -> DomainResult<()> {
    if record.info.tree_type != TreeType::Template {
        return Ok(());
    }
    let fixed = |reason: String| DomainError::InvalidNode(format!("template structure is fixed: {reason}"));
    let current = record
        .node(node.node_id)
        .map_err(|_| fixed(format!("node {} does not exist", node.node_id)))?;
    if current.parent_id != node.parent_id || current.name != node.name {
        return Err(fixed(format!("node {} cannot be moved or renamed", node.node_id)));
    }
    if current.is_leaf() != node.is_leaf() {
        return Err(fixed(format!("node {} cannot change kind", node.node_id)));
    }
    Ok(())
}

/// Service owning all node-level reads and writes.
pub struct NodeStore {
    store: Arc<TreeStore>,
}

impl NodeStore {
    pub fn new(store: Arc<TreeStore>) -> Self {
        Self { store }
    }

    pub fn get_node(&self, tree_id: TreeId, node_id: NodeId) -> ApplicationResult<Node> {
        self.store.read(tree_id, |rec| rec.node(node_id).cloned())
    }

    /// Descendants of `node_id` up to `depth` levels, ordered by (parent, index, name).
    pub fn get_children(
        &self,
        tree_id: TreeId,
        node_id: NodeId,
        depth: usize,
    ) -> ApplicationResult<Vec<Node>> {
        self.store
            .read(tree_id, |rec| rec.descendants(node_id, depth))
    }

    /// Nodes whose qualified name matches a `%` wildcard pattern, by node id.
    pub fn get_nodes_matching(
        &self,
        tree_id: TreeId,
        pattern: &str,
    ) -> ApplicationResult<Vec<Node>> {
        let pattern = NamePattern::new(pattern)?;
        self.store.read(tree_id, |rec| {
            let mut matches = Vec::new();
            for node in rec.nodes() {
                if pattern.is_match(&rec.qualified_name(node.node_id)?) {
                    matches.push(node.clone());
                }
            }
            Ok(matches)
        })
    }

    /// Insert or update one node.
    #[instrument(level = "debug", skip(self, node), fields(tree_id = node.tree_id, node_id = node.node_id))]
    pub fn save_node(&self, node: &Node) -> ApplicationResult<()> {
        self.store.mutate(node.tree_id, |rec| {
            ensure_mutable(rec)?;
            ensure_topology_kept(rec, node)?;
            rec.upsert_node(node.clone())?;
            Ok(())
        })
    }

    /// Save a batch of nodes: all of them or none.
    #[instrument(level = "debug", skip(self, nodes), fields(count = nodes.len()))]
    pub fn save_node_list(&self, nodes: &[Node]) -> ApplicationResult<()> {
        let tree_ids = self.batch_trees(nodes.iter().map(|n| n.tree_id))?;
        self.store.mutate_many(&tree_ids, |records| {
            for (position, node) in nodes.iter().enumerate() {
                let wrap = |source: DomainError| DomainError::PartialBatchFailure {
                    position,
                    source: Box::new(source),
                };
                let rec = records
                    .get_mut(&node.tree_id)
                    .ok_or_else(|| wrap(DomainError::TreeNotFound(node.tree_id)))?;
                ensure_mutable(rec).map_err(wrap)?;
                ensure_topology_kept(rec, node).map_err(wrap)?;
                rec.upsert_node(node.clone()).map_err(wrap)?;
            }
            Ok(())
        })?;
        debug!("saved {} nodes", nodes.len());
        Ok(())
    }

    /// Delete a node and its subtree; returns the number of removed nodes.
    pub fn delete_node(&self, node: &Node) -> ApplicationResult<usize> {
        self.store.mutate(node.tree_id, |rec| {
            ensure_mutable(rec)?;
            remove_non_root(rec, node.node_id)
        })
    }

    /// Delete several subtrees atomically. Nodes already removed by an
    /// earlier entry's cascade are skipped.
    pub fn delete_node_list(&self, nodes: &[Node]) -> ApplicationResult<usize> {
        let tree_ids = self.batch_trees(nodes.iter().map(|n| n.tree_id))?;
        self.store.mutate_many(&tree_ids, |records| {
            for (position, node) in nodes.iter().enumerate() {
                let rec = records.get(&node.tree_id);
                let known = rec.map(|r| r.contains(node.node_id)).unwrap_or(false);
                if !known {
                    return Err(DomainError::PartialBatchFailure {
                        position,
                        source: Box::new(DomainError::NodeNotFound {
                            tree_id: node.tree_id,
                            node_id: node.node_id,
                        }),
                    });
                }
            }

            let mut removed = 0;
            for (position, node) in nodes.iter().enumerate() {
                let wrap = |source: DomainError| DomainError::PartialBatchFailure {
                    position,
                    source: Box::new(source),
                };
                let rec = records
                    .get_mut(&node.tree_id)
                    .ok_or_else(|| wrap(DomainError::TreeNotFound(node.tree_id)))?;
                ensure_mutable(rec).map_err(wrap)?;
                if rec.contains(node.node_id) {
                    removed += remove_non_root(rec, node.node_id).map_err(wrap)?;
                }
            }
            Ok(removed)
        })
    }

    /// Create a node with a fresh id under `parent_id` (0 creates the root).
    /// Templates only grow through duplication.
    pub fn add_node(
        &self,
        tree_id: TreeId,
        parent_id: NodeId,
        name: &str,
        index: u32,
        kind: NodeKind,
        description: &str,
    ) -> ApplicationResult<NodeId> {
        self.store.mutate(tree_id, |rec| {
            ensure_mutable(rec)?;
            if rec.info.tree_type == TreeType::Template {
                return Err(DomainError::InvalidNode(
                    "template structure is fixed: use dup_node to add instances".into(),
                ));
            }
            rec.add_node(parent_id, name, index, kind, description)
        })
    }

    /// Mark a subtree historical so that pruning may remove it.
    ///
    /// Allowed on running trees; refused once a tree reached a terminal state.
    pub fn supersede_node(&self, tree_id: TreeId, node_id: NodeId) -> ApplicationResult<usize> {
        self.store.mutate(tree_id, |rec| {
            if is_terminal(rec.info.state) {
                return Err(DomainError::NotMutable {
                    tree_id,
                    reason: format!("tree is {}", rec.info.state),
                });
            }
            if rec.node(node_id)?.is_root() {
                return Err(DomainError::InvalidNode("the root cannot be superseded".into()));
            }
            rec.supersede_subtree(node_id)
        })
    }

    /// Distinct trees touched by a batch; the first unknown tree fails the batch.
    fn batch_trees(
        &self,
        tree_ids: impl Iterator<Item = TreeId>,
    ) -> ApplicationResult<BTreeSet<TreeId>> {
        let known: BTreeSet<TreeId> = self.store.tree_ids().into_iter().collect();
        let mut seen = BTreeSet::new();
        for (position, tree_id) in tree_ids.enumerate() {
            if !known.contains(&tree_id) {
                return Err(DomainError::PartialBatchFailure {
                    position,
                    source: Box::new(DomainError::TreeNotFound(tree_id)),
                }
                .into());
            }
            seen.insert(tree_id);
        }
        Ok(seen)
    }
}

fn remove_non_root(rec: &mut TreeRecord, node_id: NodeId) -> DomainResult<usize> {
    if rec.node(node_id)?.is_root() {
        return Err(DomainError::InvalidNode(
            "the root node cannot be deleted, delete the tree instead".into(),
        ));
    }
    rec.remove_subtree(node_id)
}
