//! Template builder service
//!
//! Derives structure-only template trees from component trees and branches
//! existing templates. The new tree is assembled off to the side and only
//! becomes visible once complete.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::services::new_tree_info;
use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::{
    Classification, CopyMode, DomainError, NodeId, TreeId, TreeRecord, TreeType, ROOT_PARENT,
};
use crate::infrastructure::TreeStore;

pub struct TemplateBuilder {
    store: Arc<TreeStore>,
    settings: Arc<Settings>,
}

impl TemplateBuilder {
    pub fn new(store: Arc<TreeStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Build a template tree from the component subtree rooted at `top_node`.
    ///
    /// Every component node is copied once; `instances` is kept as the
    /// planned replication factor.
    #[instrument(level = "debug", skip(self))]
    pub fn build_template_tree(
        &self,
        component_tree: TreeId,
        top_node: NodeId,
        classification: Classification,
    ) -> ApplicationResult<TreeId> {
        let source = self.store.read(component_tree, |rec| {
            if rec.info.tree_type != TreeType::Component {
                return Err(DomainError::WrongTreeType {
                    tree_id: component_tree,
                    expected: TreeType::Component,
                    actual: rec.info.tree_type,
                });
            }
            let top = rec.node(top_node)?;
            if !top.is_leaf() && rec.children(top_node).is_empty() {
                return Err(DomainError::InvalidNode(format!(
                    "node {top_node} is not a component root: group without children"
                )));
            }
            Ok(rec.clone())
        })?;

        let tree_id = self.store.allocate_tree_id();
        let description = source.node(top_node)?.description.clone();
        let mut record = TreeRecord::new(new_tree_info(
            tree_id,
            TreeType::Template,
            classification,
            &self.settings.user,
            Some(component_tree),
            description,
        ));
        record.copy_subtree(&source, top_node, ROOT_PARENT, None, CopyMode::Structure)?;
        debug!(tree_id, nodes = record.len(), "template assembled");

        self.store.insert(record)?;
        info!(tree_id, component_tree, top_node, "built template tree");
        Ok(tree_id)
    }

    /// Deep-copy a template tree into a new template.
    #[instrument(level = "debug", skip(self))]
    pub fn copy_template_tree(&self, tree_id: TreeId) -> ApplicationResult<TreeId> {
        let source = self.store.read(tree_id, |rec| {
            if rec.info.tree_type != TreeType::Template {
                return Err(DomainError::WrongTreeType {
                    tree_id,
                    expected: TreeType::Template,
                    actual: rec.info.tree_type,
                });
            }
            Ok(rec.clone())
        })?;
        let root = source
            .root()
            .map(|r| r.node_id)
            .ok_or_else(|| DomainError::InvalidNode(format!("tree {tree_id} has no root")))?;

        let new_id = self.store.allocate_tree_id();
        let mut info = new_tree_info(
            new_id,
            TreeType::Template,
            source.info.classification,
            &self.settings.user,
            Some(tree_id),
            source.info.description.clone(),
        );
        info.campaign = source.info.campaign.clone();
        let mut record = TreeRecord::new(info);
        record.copy_subtree(&source, root, ROOT_PARENT, None, CopyMode::Structure)?;

        self.store.insert(record)?;
        info!(source = tree_id, tree_id = new_id, "copied template tree");
        Ok(new_id)
    }
}
