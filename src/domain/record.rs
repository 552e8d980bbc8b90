//! Tree record: one tree's metadata, nodes and state history
//!
//! All structural invariants (single root, parent must be a group,
//! unique `(parent, name, index)`) are enforced here. Callers mutate a
//! cloned record and only commit it when the whole operation succeeded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::arena::TreeArena;
use crate::domain::entities::{
    Node, NodeId, NodeKind, StateChange, TreeId, TreeInfo, ROOT_PARENT,
};
use crate::domain::error::{DomainError, DomainResult};

/// How [`TreeRecord::copy_subtree`] treats groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// One copy per node, indices preserved
    Structure,
    /// Every group expanded to `instances` siblings. Same-named groups under
    /// one parent are numbered consecutively from 1, in (index, name) order.
    Expand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub info: TreeInfo,
    nodes: BTreeMap<NodeId, Node>,
    next_node_id: NodeId,
    #[serde(default)]
    pub history: Vec<StateChange>,
}

impl TreeRecord {
    pub fn new(info: TreeInfo) -> Self {
        Self {
            info,
            nodes: BTreeMap::new(),
            next_node_id: 1,
            history: Vec::new(),
        }
    }

    pub fn tree_id(&self) -> TreeId {
        self.info.tree_id
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: NodeId) -> DomainResult<&Node> {
        self.nodes
            .get(&node_id)
            .ok_or(DomainError::NodeNotFound {
                tree_id: self.tree_id(),
                node_id,
            })
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.values().find(|n| n.is_root())
    }

    /// Direct children ordered by (index, name).
    pub fn children(&self, parent_id: NodeId) -> Vec<&Node> {
        let mut children: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.parent_id == parent_id && n.node_id != parent_id)
            .collect();
        children.sort_by(|a, b| (a.index, &a.name).cmp(&(b.index, &b.name)));
        children
    }

    /// Descendants of `top` up to `depth` levels, ordered by (parent_id, index, name).
    pub fn descendants(&self, top: NodeId, depth: usize) -> DomainResult<Vec<Node>> {
        self.node(top)?;
        let mut result = Vec::new();
        let mut frontier = vec![top];
        for _ in 0..depth {
            let mut next = Vec::new();
            for parent in frontier {
                for child in self.children(parent) {
                    next.push(child.node_id);
                    result.push(child.clone());
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        result.sort_by(|a, b| {
            (a.parent_id, a.index, &a.name).cmp(&(b.parent_id, b.index, &b.name))
        });
        Ok(result)
    }

    /// Qualified dotted name from the root, e.g. `Observation.Beamformer[2].Filter`.
    pub fn qualified_name(&self, node_id: NodeId) -> DomainResult<String> {
        let mut segments = Vec::new();
        let mut current = self.node(node_id)?;
        loop {
            segments.push(current.segment());
            if current.is_root() {
                break;
            }
            current = self.node(current.parent_id)?;
            if segments.len() > self.nodes.len() {
                return Err(DomainError::InvalidNode(format!(
                    "parent cycle at node {node_id}"
                )));
            }
        }
        segments.reverse();
        Ok(segments.join("."))
    }

    /// Find the node at a qualified path.
    ///
    /// A segment without `[index]` matches the same-named sibling with the
    /// lowest index, so template paths keep resolving after instantiation.
    pub fn resolve_path(&self, path: &str) -> DomainResult<&Node> {
        self.resolve(path, false)
    }

    /// Find the node whose qualified name is exactly `path`; a segment
    /// without `[index]` only matches index 0.
    pub fn resolve_exact(&self, path: &str) -> DomainResult<&Node> {
        self.resolve(path, true)
    }

    fn resolve(&self, path: &str, exact: bool) -> DomainResult<&Node> {
        let not_found = || DomainError::NameNotFound {
            tree_id: self.tree_id(),
            name: path.to_string(),
        };
        let mut segments = path.split('.').map(parse_segment);
        let matches = |node: &Node, name: &str, index: Option<u32>| {
            node.name == name
                && match (index, exact) {
                    (Some(i), _) => node.index == i,
                    (None, true) => node.index == 0,
                    (None, false) => true,
                }
        };

        let (root_name, root_index) = segments.next().ok_or_else(not_found)??;
        let root = self.root().ok_or_else(not_found)?;
        if !matches(root, root_name, root_index) {
            return Err(not_found());
        }

        let mut current = root;
        for segment in segments {
            let (name, index) = segment?;
            current = self
                .children(current.node_id)
                .into_iter()
                .find(|c| matches(c, name, index))
                .ok_or_else(not_found)?;
        }
        Ok(current)
    }

    pub fn allocate_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Check that `(parent, name, index)` is free for `node_id`.
    pub fn check_slot(
        &self,
        node_id: NodeId,
        parent_id: NodeId,
        name: &str,
        index: u32,
    ) -> DomainResult<()> {
        let taken = self.nodes.values().any(|n| {
            n.node_id != node_id && n.parent_id == parent_id && n.name == name && n.index == index
        });
        if taken {
            return Err(DomainError::IndexCollision {
                parent_id,
                name: name.to_string(),
                index,
            });
        }
        Ok(())
    }

    /// Insert or replace a node after validating structural invariants.
    pub fn upsert_node(&mut self, mut node: Node) -> DomainResult<NodeId> {
        node.tree_id = self.tree_id();
        if node.node_id == ROOT_PARENT {
            return Err(DomainError::InvalidNode(
                "node id 0 is reserved for the root sentinel".into(),
            ));
        }
        if node.name.is_empty() || node.name.contains(['.', '[', ']', '=']) {
            return Err(DomainError::InvalidNode(format!(
                "invalid node name '{}'",
                node.name
            )));
        }

        if let NodeKind::Leaf { value, .. } = &node.kind {
            // parameter-set files hold one value per line
            if value.to_limits().contains(['\n', '\r']) {
                return Err(DomainError::InvalidNode(format!(
                    "value of '{}' contains a line break",
                    node.name
                )));
            }
        }

        if node.is_root() {
            if let Some(root) = self.root() {
                if root.node_id != node.node_id {
                    return Err(DomainError::InvalidNode(format!(
                        "tree {} already has root node {}",
                        self.tree_id(),
                        root.node_id
                    )));
                }
            }
        } else {
            let parent = self.node(node.parent_id)?;
            if parent.is_leaf() {
                return Err(DomainError::InvalidNode(format!(
                    "parent {} of '{}' is a leaf",
                    parent.node_id, node.name
                )));
            }
            if node.parent_id == node.node_id || self.is_ancestor(node.node_id, node.parent_id) {
                return Err(DomainError::InvalidNode(format!(
                    "moving node {} under {} would create a cycle",
                    node.node_id, node.parent_id
                )));
            }
        }

        if node.is_leaf() && !self.children(node.node_id).is_empty() {
            return Err(DomainError::InvalidNode(format!(
                "node {} has children and cannot become a leaf",
                node.node_id
            )));
        }
        self.check_slot(node.node_id, node.parent_id, &node.name, node.index)?;

        if node.node_id >= self.next_node_id {
            self.next_node_id = node.node_id + 1;
        }
        let node_id = node.node_id;
        trace!(tree_id = self.tree_id(), node_id, "upsert node");
        self.nodes.insert(node_id, node);
        Ok(node_id)
    }

    /// Add a new node under `parent_id` with a freshly allocated id.
    pub fn add_node(
        &mut self,
        parent_id: NodeId,
        name: &str,
        index: u32,
        kind: NodeKind,
        description: &str,
    ) -> DomainResult<NodeId> {
        let node = Node {
            tree_id: self.tree_id(),
            node_id: self.next_node_id,
            parent_id,
            name: name.to_string(),
            index,
            kind,
            description: description.to_string(),
            superseded: false,
        };
        let node_id = self.upsert_node(node)?;
        Ok(node_id)
    }

    /// True if `ancestor` lies on the parent chain of `node_id`.
    fn is_ancestor(&self, ancestor: NodeId, node_id: NodeId) -> bool {
        let mut current = self.nodes.get(&node_id);
        let mut steps = 0;
        while let Some(node) = current {
            if node.node_id == ancestor {
                return true;
            }
            if node.is_root() || steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&node.parent_id);
            steps += 1;
        }
        false
    }

    /// Remove a node and all of its descendants; returns the number removed.
    pub fn remove_subtree(&mut self, node_id: NodeId) -> DomainResult<usize> {
        let arena = TreeArena::from_record(self, node_id)?;
        let doomed: Vec<NodeId> = arena
            .iter_postorder()
            .map(|(_, node)| node.data.node_id)
            .collect();
        for id in &doomed {
            self.nodes.remove(id);
        }
        trace!(tree_id = self.tree_id(), node_id, removed = doomed.len(), "remove subtree");
        Ok(doomed.len())
    }

    /// Mark a node and its descendants as superseded.
    pub fn supersede_subtree(&mut self, node_id: NodeId) -> DomainResult<usize> {
        let arena = TreeArena::from_record(self, node_id)?;
        let ids: Vec<NodeId> = arena.iter().map(|(_, n)| n.data.node_id).collect();
        for id in &ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.superseded = true;
            }
        }
        Ok(ids.len())
    }

    /// Copy the subtree `top` of `source` into this record under `parent_id`.
    ///
    /// The copied top node gets `top_index` (or its own index when `None`);
    /// every copied node receives a fresh id. With [`CopyMode::Expand`]
    /// groups below the top are replicated `instances` times. Returns the ids
    /// of the copies made for `top`.
    pub fn copy_subtree(
        &mut self,
        source: &TreeRecord,
        top: NodeId,
        parent_id: NodeId,
        top_index: Option<u32>,
        mode: CopyMode,
    ) -> DomainResult<Vec<NodeId>> {
        let arena = TreeArena::from_record(source, top)?;
        let root_idx = arena
            .root()
            .ok_or_else(|| DomainError::InvalidNode("empty subtree".into()))?;
        self.copy_arena_node(&arena, root_idx, parent_id, top_index, mode)
    }

    fn copy_arena_node(
        &mut self,
        arena: &TreeArena,
        idx: generational_arena::Index,
        parent_id: NodeId,
        index_override: Option<u32>,
        mode: CopyMode,
    ) -> DomainResult<Vec<NodeId>> {
        let source = arena
            .get_node(idx)
            .ok_or_else(|| DomainError::InvalidNode("stale arena index".into()))?;

        let indices: Vec<u32> = match (index_override, mode, &source.data.kind) {
            (Some(index), _, _) => vec![index],
            (None, CopyMode::Expand, NodeKind::Group { instances }) => {
                let start = self.next_sibling_index(parent_id, &source.data.name);
                (start..start + *instances).collect()
            }
            (None, _, _) => vec![source.data.index],
        };

        let mut created = Vec::with_capacity(indices.len());
        for index in indices {
            let mut node = source.data.clone();
            node.node_id = self.allocate_node_id();
            node.parent_id = parent_id;
            node.index = index;
            node.superseded = false;
            let new_id = self.upsert_node(node)?;
            for &child in &source.children {
                self.copy_arena_node(arena, child, new_id, None, mode)?;
            }
            created.push(new_id);
        }
        Ok(created)
    }

    /// One past the highest index among `name` siblings under `parent_id`, or 1.
    fn next_sibling_index(&self, parent_id: NodeId, name: &str) -> u32 {
        self.nodes
            .values()
            .filter(|n| n.parent_id == parent_id && n.name == name && !n.is_root())
            .map(|n| n.index + 1)
            .max()
            .unwrap_or(1)
    }

    pub fn record_state_change(&mut self, change: StateChange) {
        self.history.push(change);
    }
}

/// Split `name[3]` into `("name", Some(3))`.
fn parse_segment(segment: &str) -> DomainResult<(&str, Option<u32>)> {
    match segment.strip_suffix(']').and_then(|s| s.split_once('[')) {
        Some((name, index)) => {
            let index = index
                .parse()
                .map_err(|_| DomainError::Parse(format!("bad index in segment '{segment}'")))?;
            Ok((name, Some(index)))
        }
        None => Ok((segment, None)),
    }
}
