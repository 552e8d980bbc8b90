//! Tree classifier service
//!
//! Owns tree-level metadata: state transitions (with audit trail),
//! classification, description and MoM cross-references, constraint checks
//! and tree deletion.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::constraints::check_constraints;
use crate::domain::state::{allows_deletion, check_transition};
use crate::domain::{
    Classification, DomainError, NodeId, StateChange, TreeId, TreeState,
};
use crate::infrastructure::TreeStore;

pub struct TreeClassifier {
    store: Arc<TreeStore>,
    settings: Arc<Settings>,
}

impl TreeClassifier {
    pub fn new(store: Arc<TreeStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Move a tree to `new_state`; returns the previous state.
    ///
    /// Entering `approved` requires all constraints of the tree to hold.
    #[instrument(level = "debug", skip(self))]
    pub fn set_tree_state(&self, tree_id: TreeId, new_state: TreeState) -> ApplicationResult<TreeState> {
        let max_depth = self.settings.max_reference_depth;
        let user = self.settings.user.clone();
        let old = self.store.mutate(tree_id, |rec| {
            let old = rec.info.state;
            check_transition(tree_id, old, new_state)?;
            if new_state == TreeState::Approved {
                let root = rec
                    .root()
                    .map(|r| r.node_id)
                    .ok_or_else(|| DomainError::InvalidNode(format!("tree {tree_id} has no root")))?;
                check_constraints(rec, root, max_depth)?;
            }
            rec.info.state = new_state;
            rec.record_state_change(StateChange {
                tree_id,
                mom_id: rec.info.mom_id,
                from: old,
                to: new_state,
                user,
                timestamp: Utc::now(),
            });
            Ok(old)
        })?;
        info!(tree_id, from = %old, to = %new_state, "tree state changed");
        Ok(old)
    }

    /// Delete a tree and all of its nodes. Only obsolete trees may go.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_tree(&self, tree_id: TreeId) -> ApplicationResult<()> {
        let removed = self.store.remove(tree_id, |rec| {
            if allows_deletion(rec.info.state) {
                Ok(())
            } else {
                Err(DomainError::NotMutable {
                    tree_id,
                    reason: "tree is not obsolete".into(),
                })
            }
        })?;
        info!(tree_id, nodes = removed.len(), "tree deleted");
        Ok(())
    }

    pub fn set_classification(
        &self,
        tree_id: TreeId,
        classification: Classification,
    ) -> ApplicationResult<()> {
        let old = self.store.mutate(tree_id, |rec| {
            let old = rec.info.classification;
            rec.info.classification = classification;
            Ok(old)
        })?;
        info!(
            tree_id,
            from = %old,
            to = %classification,
            user = %self.settings.user,
            "classification changed"
        );
        Ok(())
    }

    pub fn set_description(&self, tree_id: TreeId, description: &str) -> ApplicationResult<()> {
        self.store.mutate(tree_id, |rec| {
            rec.info.description = description.to_string();
            Ok(())
        })
    }

    /// Store the external scheduling system's id and campaign for a tree.
    pub fn set_mom_info(
        &self,
        tree_id: TreeId,
        mom_id: Option<u32>,
        campaign: &str,
    ) -> ApplicationResult<()> {
        self.store.mutate(tree_id, |rec| {
            rec.info.mom_id = mom_id;
            rec.info.campaign = campaign.to_string();
            Ok(())
        })?;
        info!(tree_id, ?mom_id, campaign, "MoM info updated");
        Ok(())
    }

    /// Validate references and value constraints below `top_node`.
    pub fn check_tree_constraints(&self, tree_id: TreeId, top_node: NodeId) -> ApplicationResult<()> {
        let max_depth = self.settings.max_reference_depth;
        self.store
            .read(tree_id, |rec| check_constraints(rec, top_node, max_depth))
    }
}
