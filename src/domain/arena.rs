use generational_arena::{Arena, Index};
use std::collections::HashMap;
use std::fmt;
use termtree::Tree;
use tracing::instrument;

use crate::domain::entities::{Node, NodeId};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::record::TreeRecord;

/// Arena node holding a snapshot of one tree node.
#[derive(Debug)]
pub struct ArenaNode {
    /// Node record as it was when the arena was built
    pub data: Node,
    /// Index of parent node in the arena, None for the top node
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, ordered by (index, name)
    pub children: Vec<Index>,
    /// Distance from the arena's top node
    pub depth: usize,
}

impl fmt::Display for ArenaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.is_leaf() {
            true => write!(f, "{}={}", self.data.segment(), self.data.limits()),
            false => write!(f, "{} (x{})", self.data.segment(), self.data.instances()),
        }
    }
}

/// Arena snapshot of a (sub)tree, used for ordered traversals.
///
/// Uses generational arena for memory-safe node references and O(1) lookups.
/// Each arena covers one subtree of a single [`TreeRecord`].
#[derive(Debug)]
pub struct TreeArena {
    /// Arena storage for all snapshot nodes
    arena: Arena<ArenaNode>,
    /// Index of the top node, None for empty arenas
    root: Option<Index>,
}

impl Default for TreeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    /// Snapshot the subtree of `record` rooted at `top`.
    #[instrument(level = "trace", skip(record))]
    pub fn from_record(record: &TreeRecord, top: NodeId) -> DomainResult<Self> {
        let top_node = record.node(top)?;

        let mut by_parent: HashMap<NodeId, Vec<&Node>> = HashMap::new();
        for node in record.nodes() {
            by_parent.entry(node.parent_id).or_default().push(node);
        }
        for siblings in by_parent.values_mut() {
            siblings.sort_by(|a, b| (a.index, &a.name).cmp(&(b.index, &b.name)));
        }

        let mut tree = Self::new();
        let top_idx = tree.insert_node(top_node.clone(), None);
        let mut stack = vec![top_idx];
        while let Some(current) = stack.pop() {
            let node_id = tree.arena[current].data.node_id;
            if let Some(children) = by_parent.get(&node_id) {
                for child in children {
                    let child_idx = tree.insert_node((*child).clone(), Some(current));
                    stack.push(child_idx);
                }
            }
        }
        Ok(tree)
    }

    #[instrument(level = "trace", skip(self, data), fields(node_id = data.node_id))]
    pub fn insert_node(&mut self, data: Node, parent: Option<Index>) -> Index {
        let depth = parent
            .and_then(|p| self.arena.get(p))
            .map(|p| p.depth + 1)
            .unwrap_or(0);
        let node = ArenaNode {
            data,
            parent,
            children: Vec::new(),
            depth,
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.root = Some(node_idx);
        }

        node_idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&ArenaNode> {
        self.arena.get(idx)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Depth-first pre-order traversal, children in (index, name) order.
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    /// Post-order traversal: every node after all of its descendants.
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Leaf nodes in depth-first order.
    pub fn leaf_nodes(&self) -> Vec<&Node> {
        self.iter()
            .filter(|(_, node)| node.data.is_leaf())
            .map(|(_, node)| &node.data)
            .collect()
    }

    /// Segments from the arena's top node down to `idx`, joined with '.'.
    pub fn relative_name(&self, idx: Index) -> DomainResult<String> {
        let mut segments = Vec::new();
        let mut current = Some(idx);
        while let Some(i) = current {
            let node = self
                .get_node(i)
                .ok_or_else(|| DomainError::InvalidNode("stale arena index".into()))?;
            segments.push(node.data.segment());
            current = node.parent;
        }
        segments.reverse();
        Ok(segments.join("."))
    }

    /// Render the arena for terminal display.
    pub fn to_tree_string(&self) -> Tree<String> {
        fn build_tree(arena: &TreeArena, node_idx: Index, parent_tree: &mut Tree<String>) {
            if let Some(node) = arena.get_node(node_idx) {
                for &child_idx in &node.children {
                    if let Some(child) = arena.get_node(child_idx) {
                        let mut child_tree = Tree::new(child.to_string());
                        build_tree(arena, child_idx, &mut child_tree);
                        parent_tree.push(child_tree);
                    }
                }
            }
        }

        match self.root().and_then(|idx| self.get_node(idx).map(|n| (idx, n))) {
            Some((root_idx, root)) => {
                let mut tree = Tree::new(root.to_string());
                build_tree(self, root_idx, &mut tree);
                tree
            }
            None => Tree::new("Empty tree".to_string()),
        }
    }
}

pub struct TreeIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a TreeArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push(root);
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a ArenaNode);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a TreeArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push((root, false));
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a ArenaNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
