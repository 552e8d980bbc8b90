//! Query engine: side-effect free reads

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::services::NodeStore;
use crate::application::ApplicationResult;
use crate::domain::{
    Classification, DomainError, Node, NodeId, StateChange, TreeArena, TreeId, TreeInfo,
    TreeType,
};
use crate::infrastructure::TreeStore;

pub struct QueryEngine {
    store: Arc<TreeStore>,
    nodes: Arc<NodeStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<TreeStore>, nodes: Arc<NodeStore>) -> Self {
        Self { store, nodes }
    }

    pub fn get_tree_info(&self, tree_id: TreeId) -> ApplicationResult<TreeInfo> {
        self.store.read(tree_id, |rec| Ok(rec.info.clone()))
    }

    /// All trees matching the optional filters, by tree id.
    pub fn get_tree_list(
        &self,
        tree_type: Option<TreeType>,
        classification: Option<Classification>,
    ) -> ApplicationResult<Vec<TreeInfo>> {
        let mut trees = Vec::new();
        for tree_id in self.store.tree_ids() {
            // a tree deleted since listing the ids is simply skipped
            let info = match self.get_tree_info(tree_id) {
                Ok(info) => info,
                Err(e) if e.domain().is_some_and(DomainError::is_not_found) => continue,
                Err(e) => return Err(e),
            };
            if tree_type.is_some_and(|t| t != info.tree_type) {
                continue;
            }
            if classification.is_some_and(|c| c != info.classification) {
                continue;
            }
            trees.push(info);
        }
        Ok(trees)
    }

    pub fn get_top_node(&self, tree_id: TreeId) -> ApplicationResult<Node> {
        self.store.read(tree_id, |rec| {
            rec.root()
                .cloned()
                .ok_or_else(|| DomainError::InvalidNode(format!("tree {tree_id} has no root")))
        })
    }

    pub fn get_node(&self, tree_id: TreeId, node_id: NodeId) -> ApplicationResult<Node> {
        self.nodes.get_node(tree_id, node_id)
    }

    pub fn get_item_list(
        &self,
        tree_id: TreeId,
        top_node: NodeId,
        depth: usize,
    ) -> ApplicationResult<Vec<Node>> {
        self.nodes.get_children(tree_id, top_node, depth)
    }

    pub fn get_items_matching(&self, tree_id: TreeId, pattern: &str) -> ApplicationResult<Vec<Node>> {
        self.nodes.get_nodes_matching(tree_id, pattern)
    }

    /// Qualified dotted name of a node.
    pub fn get_qualified_name(&self, tree_id: TreeId, node_id: NodeId) -> ApplicationResult<String> {
        self.store.read(tree_id, |rec| rec.qualified_name(node_id))
    }

    /// Arena snapshot of a subtree for ordered traversal and display.
    pub fn get_subtree(&self, tree_id: TreeId, top_node: NodeId) -> ApplicationResult<TreeArena> {
        self.store
            .read(tree_id, |rec| TreeArena::from_record(rec, top_node))
    }

    /// State transitions within `[since, until]`, oldest first.
    ///
    /// `tree_id = None` collects the audit trail of every tree.
    pub fn get_state_list(
        &self,
        tree_id: Option<TreeId>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> ApplicationResult<Vec<StateChange>> {
        let tree_ids = match tree_id {
            Some(id) => vec![id],
            None => self.store.tree_ids(),
        };

        let mut changes = Vec::new();
        for id in tree_ids {
            let history = match self.store.read(id, |rec| Ok(rec.history.clone())) {
                Ok(history) => history,
                Err(e) if tree_id.is_none() && e.domain().is_some_and(DomainError::is_not_found) => {
                    continue
                }
                Err(e) => return Err(e),
            };
            changes.extend(history.into_iter().filter(|c| {
                since.map_or(true, |s| c.timestamp >= s) && until.map_or(true, |u| c.timestamp <= u)
            }));
        }
        changes.sort_by(|a, b| (a.timestamp, a.tree_id).cmp(&(b.timestamp, b.tree_id)));
        Ok(changes)
    }
}
