//! Instantiator service
//!
//! Expands template trees into hierarchical trees and prunes superseded
//! history from long-running trees.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::services::new_tree_info;
use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::constraints::check_constraints;
use crate::domain::state::allows_instantiation;
use crate::domain::{
    CopyMode, DomainError, NodeId, TreeArena, TreeId, TreeRecord, TreeType, ROOT_PARENT,
};
use crate::infrastructure::TreeStore;

pub struct Instantiator {
    store: Arc<TreeStore>,
    settings: Arc<Settings>,
}

impl Instantiator {
    pub fn new(store: Arc<TreeStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Expand a template into a hierarchical tree.
    ///
    /// Each group with `instances = n` becomes `n` siblings; the root keeps
    /// its index. A group duplicated in the template continues the numbering
    /// of its earlier copies, so `Beam` (n=2) and `Beam[1]` (n=3) yield
    /// `Beam[1]..Beam[5]`. Constraints are checked first.
    #[instrument(level = "debug", skip(self))]
    pub fn instanciate_tree(&self, template: TreeId) -> ApplicationResult<TreeId> {
        let max_depth = self.settings.max_reference_depth;
        let source = self.store.read(template, |rec| {
            if rec.info.tree_type != TreeType::Template {
                return Err(DomainError::WrongTreeType {
                    tree_id: template,
                    expected: TreeType::Template,
                    actual: rec.info.tree_type,
                });
            }
            if !allows_instantiation(rec.info.state) {
                return Err(DomainError::NotMutable {
                    tree_id: template,
                    reason: format!("template is {} and cannot be instantiated", rec.info.state),
                });
            }
            let root = rec
                .root()
                .ok_or_else(|| DomainError::InvalidNode(format!("tree {template} has no root")))?;
            check_constraints(rec, root.node_id, max_depth)?;
            Ok(rec.clone())
        })?;
        let root = source
            .root()
            .ok_or_else(|| DomainError::InvalidNode(format!("tree {template} has no root")))?;

        let tree_id = self.store.allocate_tree_id();
        let mut info = new_tree_info(
            tree_id,
            TreeType::Hierarchical,
            source.info.classification,
            &self.settings.user,
            Some(template),
            source.info.description.clone(),
        );
        info.campaign = source.info.campaign.clone();
        let mut record = TreeRecord::new(info);
        record.copy_subtree(
            &source,
            root.node_id,
            ROOT_PARENT,
            Some(root.index),
            CopyMode::Expand,
        )?;
        debug!(tree_id, nodes = record.len(), "hierarchical tree assembled");

        self.store.insert(record)?;
        info!(template, tree_id, "instantiated tree");
        Ok(tree_id)
    }

    /// Remove superseded nodes deeper than `pruning_level` (root = 0).
    ///
    /// Returns how many nodes were removed; zero is not an error.
    #[instrument(level = "debug", skip(self))]
    pub fn prune_tree(&self, tree_id: TreeId, pruning_level: usize) -> ApplicationResult<usize> {
        let removed = self.store.mutate(tree_id, |rec| {
            let Some(root) = rec.root().map(|r| r.node_id) else {
                return Ok(0);
            };
            let arena = TreeArena::from_record(rec, root)?;
            // pre-order: an ancestor is always listed before its descendants
            let candidates: Vec<NodeId> = arena
                .iter()
                .filter(|(_, n)| n.data.superseded && n.depth > pruning_level)
                .map(|(_, n)| n.data.node_id)
                .collect();

            let mut removed = 0;
            for node_id in candidates {
                if rec.contains(node_id) {
                    removed += rec.remove_subtree(node_id)?;
                }
            }
            Ok(removed)
        })?;
        info!(tree_id, pruning_level, removed, "pruned tree");
        Ok(removed)
    }
}
