//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::{Classification, NodeId, TreeId, TreeState, TreeType};

/// Observation tree database: component, template and configuration trees
#[derive(Parser, Debug)]
#[command(name = "otdb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Turn debugging information on (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Store directory (default: from config)
    #[arg(short = 'S', long, global = true, value_hint = ValueHint::DirPath)]
    pub store: Option<PathBuf>,

    /// User recorded for created trees and state changes
    #[arg(long, global = true, env = "OTDB_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load component definitions
    Component {
        #[command(subcommand)]
        command: ComponentCommands,
    },

    /// Build and copy template trees
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Instantiate a template into a hierarchical tree
    Instantiate {
        /// Template tree id
        template: TreeId,
    },

    /// Tree metadata, state and maintenance
    Tree {
        #[command(subcommand)]
        command: TreeCommands,
    },

    /// Read and edit nodes
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Export and import parameter sets
    Parset {
        #[command(subcommand)]
        command: ParsetCommands,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ComponentCommands {
    /// Create a component tree from a TOML definition
    Load {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// Build a template from a component subtree
    Build {
        /// Component tree id
        tree: TreeId,
        /// Component node (id or qualified name, default: root)
        #[arg(short, long)]
        node: Option<String>,
        /// Classification of the new template
        #[arg(short, long, default_value = "development")]
        classification: Classification,
    },
    /// Deep-copy a template
    Copy {
        /// Template tree id
        tree: TreeId,
    },
}

#[derive(Subcommand, Debug)]
pub enum TreeCommands {
    /// List trees
    List {
        /// Only trees of this type (component, template, hierarchical)
        #[arg(short = 't', long = "type")]
        tree_type: Option<TreeType>,
        /// Only trees with this classification
        #[arg(short, long)]
        classification: Option<Classification>,
    },
    /// Show tree metadata
    Info { tree: TreeId },
    /// Print a (sub)tree
    Show {
        tree: TreeId,
        /// Top node (id or qualified name, default: root)
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Change the lifecycle state
    State { tree: TreeId, state: TreeState },
    /// Change the classification
    Classify {
        tree: TreeId,
        classification: Classification,
    },
    /// Set the description
    Describe { tree: TreeId, description: String },
    /// Set scheduling system id and campaign
    Mom {
        tree: TreeId,
        #[arg(long)]
        mom_id: Option<u32>,
        #[arg(long, default_value = "")]
        campaign: String,
    },
    /// Validate references and constraints
    Check {
        tree: TreeId,
        /// Top node (id or qualified name, default: root)
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Delete an obsolete tree
    Delete { tree: TreeId },
    /// Show state changes
    History {
        /// Only this tree (default: all trees)
        tree: Option<TreeId>,
        /// RFC 3339 lower bound
        #[arg(long)]
        since: Option<String>,
        /// RFC 3339 upper bound
        #[arg(long)]
        until: Option<String>,
    },
    /// Remove superseded nodes below a depth
    Prune {
        tree: TreeId,
        /// Keep superseded nodes at or above this depth (default: from config)
        #[arg(short, long)]
        level: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Show one node
    Get { tree: TreeId, node: String },
    /// List descendants up to a depth
    Children {
        tree: TreeId,
        node: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Find nodes by qualified name, '%' matches anything
    Find { tree: TreeId, pattern: String },
    /// Add a node
    Add {
        tree: TreeId,
        /// Parent node (id or qualified name), omit to create the root
        #[arg(short, long)]
        parent: Option<String>,
        name: String,
        #[arg(short, long, default_value_t = 0)]
        index: u32,
        /// Create a group with this instance count
        #[arg(long, conflicts_with = "value")]
        instances: Option<u32>,
        /// Leaf value (`>>` prefix for a reference)
        #[arg(long)]
        value: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Update a node
    Set {
        tree: TreeId,
        node: String,
        /// New leaf value (`>>` prefix for a reference)
        #[arg(long)]
        value: Option<String>,
        /// New group instance count
        #[arg(long)]
        instances: Option<u32>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Duplicate a subtree with a new index
    Dup {
        tree: TreeId,
        node: String,
        index: u32,
    },
    /// Delete nodes with their subtrees
    Delete {
        tree: TreeId,
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Mark a subtree as superseded
    Supersede { tree: TreeId, node: String },
}

#[derive(Subcommand, Debug)]
pub enum ParsetCommands {
    /// Write `name=value` lines for all leaves
    Export {
        tree: TreeId,
        /// Top node (id or qualified name, default: root)
        #[arg(short, long)]
        node: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// Apply a parameter set to existing leaves
    Import {
        tree: TreeId,
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,
}

/// Node argument: a numeric id or a qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Id(NodeId),
    Name(String),
}

impl NodeRef {
    pub fn parse(arg: &str) -> Self {
        match arg.parse::<NodeId>() {
            Ok(id) => NodeRef::Id(id),
            Err(_) => NodeRef::Name(arg.to_string()),
        }
    }
}
