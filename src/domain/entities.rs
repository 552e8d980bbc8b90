//! Domain entities: trees, nodes and their classification codes

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Process-wide unique tree identifier.
pub type TreeId = u32;

/// Node identifier, unique within its tree.
pub type NodeId = u32;

/// `parent_id` value of a tree's root node.
pub const ROOT_PARENT: NodeId = 0;

/// Prefix marking a leaf value as a reference to another node.
pub const REFERENCE_PREFIX: &str = ">>";

/// Kind of tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeType {
    /// Base definitions of all buildable node types
    Component,
    /// Structure-only derivation, one copy per node
    Template,
    /// Fully instantiated tree, every group expanded
    Hierarchical,
}

impl TreeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeType::Component => "component",
            TreeType::Template => "template",
            TreeType::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for TreeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TreeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "component" | "vc" => Ok(TreeType::Component),
            "template" | "vt" => Ok(TreeType::Template),
            "hierarchical" | "vh" => Ok(TreeType::Hierarchical),
            other => Err(DomainError::Parse(format!("unknown tree type: {other}"))),
        }
    }
}

/// Workflow tag, independent of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Development,
    Test,
    Operational,
    Example,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Development => "development",
            Classification::Test => "test",
            Classification::Operational => "operational",
            Classification::Example => "example",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Classification::Development),
            "test" => Ok(Classification::Test),
            "operational" | "ops" => Ok(Classification::Operational),
            "example" => Ok(Classification::Example),
            other => Err(DomainError::Parse(format!("unknown classification: {other}"))),
        }
    }
}

/// Lifecycle state of a tree. See [`crate::domain::state`] for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeState {
    BeingSpecified,
    Specified,
    Approved,
    Active,
    Finished,
    Aborted,
    Obsolete,
}

impl TreeState {
    pub const ALL: [TreeState; 7] = [
        TreeState::BeingSpecified,
        TreeState::Specified,
        TreeState::Approved,
        TreeState::Active,
        TreeState::Finished,
        TreeState::Aborted,
        TreeState::Obsolete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TreeState::BeingSpecified => "being_specified",
            TreeState::Specified => "specified",
            TreeState::Approved => "approved",
            TreeState::Active => "active",
            TreeState::Finished => "finished",
            TreeState::Aborted => "aborted",
            TreeState::Obsolete => "obsolete",
        }
    }
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TreeState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        TreeState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| DomainError::Parse(format!("unknown tree state: {}", s.trim())))
    }
}

/// Tree-level metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeInfo {
    pub tree_id: TreeId,
    pub tree_type: TreeType,
    pub classification: Classification,
    pub state: TreeState,
    pub creator: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub campaign: String,
    #[serde(default)]
    pub mom_id: Option<u32>,
    #[serde(default)]
    pub description: String,
    /// Template (or component tree) this tree was derived from. Weak reference by id.
    #[serde(default)]
    pub original_tree: Option<TreeId>,
}

/// Value carried by a leaf node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafValue {
    Literal(String),
    /// Late-bound link to another node, by qualified path from the root
    Reference(String),
}

impl LeafValue {
    /// Parse a `limits` string: `>>path` is a reference, anything else a literal.
    pub fn from_limits(limits: &str) -> Self {
        match limits.strip_prefix(REFERENCE_PREFIX) {
            Some(path) => LeafValue::Reference(path.to_string()),
            None => LeafValue::Literal(limits.to_string()),
        }
    }

    pub fn to_limits(&self) -> String {
        match self {
            LeafValue::Literal(value) => value.clone(),
            LeafValue::Reference(path) => format!("{REFERENCE_PREFIX}{path}"),
        }
    }
}

/// Value constraint attached to a leaf definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Inclusive numeric range; either bound may be open
    Range { min: Option<f64>, max: Option<f64> },
    /// Value must be one of the listed literals
    Choice(Vec<String>),
}

impl Constraint {
    /// Check a resolved value, returning a reason on failure.
    pub fn check(&self, value: &str) -> Result<(), String> {
        match self {
            Constraint::Range { min, max } => {
                let number: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("value '{value}' is not numeric"))?;
                if let Some(min) = min {
                    if number < *min {
                        return Err(format!("value {number} below minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        return Err(format!("value {number} above maximum {max}"));
                    }
                }
                Ok(())
            }
            Constraint::Choice(choices) => {
                if choices.iter().any(|c| c == value) {
                    Ok(())
                } else {
                    Err(format!(
                        "value '{value}' not in [{}]",
                        choices.join(", ")
                    ))
                }
            }
        }
    }
}

/// Leaf-with-value vs. group-with-children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Group {
        /// Planned (template) or actual (hierarchical) number of copies
        instances: u32,
    },
    Leaf {
        value: LeafValue,
        #[serde(default)]
        constraint: Option<Constraint>,
    },
}

impl NodeKind {
    pub fn group(instances: u32) -> Self {
        NodeKind::Group { instances }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        NodeKind::Leaf {
            value: LeafValue::Literal(value.into()),
            constraint: None,
        }
    }

    pub fn reference(path: impl Into<String>) -> Self {
        NodeKind::Leaf {
            value: LeafValue::Reference(path.into()),
            constraint: None,
        }
    }
}

/// A single node of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub tree_id: TreeId,
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub name: String,
    pub index: u32,
    pub kind: NodeKind,
    #[serde(default)]
    pub description: String,
    /// Historical marker; superseded nodes are candidates for pruning
    #[serde(default)]
    pub superseded: bool,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    /// Planned/actual copy count; leaves report 1.
    pub fn instances(&self) -> u32 {
        match self.kind {
            NodeKind::Group { instances } => instances,
            NodeKind::Leaf { .. } => 1,
        }
    }

    /// Textual payload: literal value or `>>path`; empty for groups.
    pub fn limits(&self) -> String {
        match &self.kind {
            NodeKind::Leaf { value, .. } => value.to_limits(),
            NodeKind::Group { .. } => String::new(),
        }
    }

    /// Path segment used in qualified names: `name` or `name[index]`.
    pub fn segment(&self) -> String {
        if self.index == 0 {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, self.index)
        }
    }
}

/// Audit record of a tree state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub tree_id: TreeId,
    pub mom_id: Option<u32>,
    pub from: TreeState,
    pub to: TreeState,
    pub user: String,
    pub timestamp: DateTime<Utc>,
}
