//! Parameter-set export and import

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::services::NodeStore;
use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::{paramset, DomainError, LeafValue, Node, NodeId, NodeKind, TreeId};
use crate::infrastructure::traits::FileSystem;
use crate::infrastructure::TreeStore;

pub struct ParamSetService {
    fs: Arc<dyn FileSystem>,
    store: Arc<TreeStore>,
    nodes: Arc<NodeStore>,
}

impl ParamSetService {
    pub fn new(fs: Arc<dyn FileSystem>, store: Arc<TreeStore>, nodes: Arc<NodeStore>) -> Self {
        Self { fs, store, nodes }
    }

    /// Render the leaves below `top_node` as `name=limits` lines.
    pub fn export(&self, tree_id: TreeId, top_node: NodeId) -> ApplicationResult<String> {
        self.store
            .read(tree_id, |rec| paramset::export(rec, top_node))
    }

    pub fn export_to_file(
        &self,
        tree_id: TreeId,
        top_node: NodeId,
        path: &Path,
    ) -> ApplicationResult<usize> {
        let content = self.export(tree_id, top_node)?;
        self.fs
            .ensure_parent(path)
            .with_path_context("create parent directory", path)?;
        self.fs
            .write(path, &content)
            .with_path_context("write parameter set", path)?;
        let lines = content.lines().count();
        info!(tree_id, top_node, lines, "exported {}", path.display());
        Ok(lines)
    }

    /// Apply a parameter set to the leaves of `tree_id`, all or nothing.
    ///
    /// Every key must name an existing leaf by its qualified name.
    pub fn import(&self, tree_id: TreeId, content: &str) -> ApplicationResult<usize> {
        let lines = paramset::parse(content)?;
        let updates: Vec<Node> = self.store.read(tree_id, |rec| {
            let mut updates = Vec::with_capacity(lines.len());
            for line in &lines {
                let mut node = rec.resolve_exact(&line.key)?.clone();
                match &mut node.kind {
                    NodeKind::Leaf { value, .. } => *value = LeafValue::from_limits(&line.value),
                    NodeKind::Group { .. } => {
                        return Err(DomainError::InvalidNode(format!(
                            "'{}' is a group, not a parameter",
                            line.key
                        )))
                    }
                }
                updates.push(node);
            }
            Ok(updates)
        })?;
        debug!(tree_id, count = updates.len(), "applying parameter set");
        self.nodes.save_node_list(&updates)?;
        Ok(updates.len())
    }

    pub fn import_from_file(&self, tree_id: TreeId, path: &Path) -> ApplicationResult<usize> {
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read parameter set", path)?;
        let count = self.import(tree_id, &content)?;
        info!(tree_id, count, "imported {}", path.display());
        Ok(count)
    }
}
