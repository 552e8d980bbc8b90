//! Component loader service
//!
//! Creates component trees from TOML component definitions.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::services::new_tree_info;
use crate::application::{ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{ComponentDef, DomainResult, NodeId, TreeId, TreeRecord, TreeType, ROOT_PARENT};
use crate::infrastructure::traits::FileSystem;
use crate::infrastructure::TreeStore;

pub struct ComponentLoader {
    fs: Arc<dyn FileSystem>,
    store: Arc<TreeStore>,
    settings: Arc<Settings>,
}

impl ComponentLoader {
    pub fn new(fs: Arc<dyn FileSystem>, store: Arc<TreeStore>, settings: Arc<Settings>) -> Self {
        Self { fs, store, settings }
    }

    /// Parse a component document and store it as a new component tree.
    #[instrument(level = "debug", skip(self, content))]
    pub fn load(&self, content: &str) -> ApplicationResult<TreeId> {
        let def = ComponentDef::parse(content)?;

        let tree_id = self.store.allocate_tree_id();
        let mut record = TreeRecord::new(new_tree_info(
            tree_id,
            TreeType::Component,
            self.settings.default_classification,
            &self.settings.user,
            None,
            def.description.clone(),
        ));
        add_definition(&mut record, &def, ROOT_PARENT)?;

        self.store.insert(record)?;
        info!(tree_id, root = %def.name, nodes = def.node_count(), "loaded component tree");
        Ok(tree_id)
    }

    pub fn load_file(&self, path: &Path) -> ApplicationResult<TreeId> {
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read component file", path)?;
        self.load(&content)
    }
}

fn add_definition(record: &mut TreeRecord, def: &ComponentDef, parent: NodeId) -> DomainResult<NodeId> {
    let node_id = record.add_node(parent, &def.name, 0, def.kind.clone(), &def.description)?;
    for child in &def.children {
        add_definition(record, child, node_id)?;
    }
    Ok(node_id)
}
