//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services share the tree store and are themselves concrete structs,
//! not traits.

mod classifier;
mod component;
mod duplicator;
mod instantiator;
pub(crate) mod node_store;
mod paramset;
mod query;
mod template;

use chrono::Utc;

use crate::domain::{Classification, TreeId, TreeInfo, TreeState, TreeType};

pub use classifier::TreeClassifier;
pub use component::ComponentLoader;
pub use duplicator::NodeDuplicator;
pub use instantiator::Instantiator;
pub use node_store::NodeStore;
pub use paramset::ParamSetService;
pub use query::QueryEngine;
pub use template::TemplateBuilder;

/// Metadata for a freshly created tree: being specified, created now.
pub(crate) fn new_tree_info(
    tree_id: TreeId,
    tree_type: TreeType,
    classification: Classification,
    creator: &str,
    original_tree: Option<TreeId>,
    description: String,
) -> TreeInfo {
    TreeInfo {
        tree_id,
        tree_type,
        classification,
        state: TreeState::BeingSpecified,
        creator: creator.to_string(),
        creation_date: Utc::now(),
        campaign: String::new(),
        mom_id: None,
        description,
        original_tree,
    }
}
