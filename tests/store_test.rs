//! Tests for the persistent TreeStore and layered settings
//!
//! - committed trees survive reopening the store directory
//! - failed operations leave no files behind
//! - store-local `.otdb.toml` overrides compiled defaults

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use otdb::config::{store_config_path, Settings};
use otdb::domain::{Classification, LeafValue, Node, NodeKind, TreeId, TreeState, TreeType};
use otdb::infrastructure::traits::{FileSystem, RealFileSystem};
use otdb::infrastructure::{ServiceContainer, TreeStore};
use otdb::util::testing::{init_test_setup, test_settings};

const COMPONENT: &str = r#"
[Observation]

[Observation.Beamformer]
_instances = 4
Filter = "off"
"#;

fn open(dir: &Path) -> ServiceContainer {
    init_test_setup();
    ServiceContainer::new(test_settings(dir)).unwrap()
}

fn tree_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("tree-"))
        .collect();
    names.sort();
    names
}

// ============================================================
// persistence
// ============================================================

#[test]
fn given_committed_trees_when_reopening_store_then_trees_are_restored() {
    let temp = TempDir::new().unwrap();
    let (component, template, tree) = {
        let ctx = open(temp.path());
        let component = ctx.components.load(COMPONENT).unwrap();
        let root = ctx.query.get_top_node(component).unwrap();
        let template = ctx
            .templates
            .build_template_tree(component, root.node_id, Classification::Test)
            .unwrap();
        let tree = ctx.instantiator.instanciate_tree(template).unwrap();
        ctx.classifier
            .set_tree_state(tree, TreeState::Specified)
            .unwrap();
        (component, template, tree)
    };

    let ctx = open(temp.path());

    let types: Vec<TreeType> = ctx
        .query
        .get_tree_list(None, None)
        .unwrap()
        .iter()
        .map(|i| i.tree_type)
        .collect();
    assert_eq!(
        types,
        vec![TreeType::Component, TreeType::Template, TreeType::Hierarchical]
    );
    assert_eq!(
        ctx.query.get_tree_info(tree).unwrap().state,
        TreeState::Specified
    );
    assert_eq!(ctx.query.get_state_list(Some(tree), None, None).unwrap().len(), 1);
    assert_eq!(
        ctx.query.get_items_matching(tree, "Observation.Beamformer[%].Filter").unwrap().len(),
        4
    );
    assert_eq!(
        ctx.query.get_tree_info(template).unwrap().original_tree,
        Some(component)
    );
}

#[test]
fn given_reopened_store_when_creating_tree_then_ids_are_not_reused() {
    let temp = TempDir::new().unwrap();
    let first = open(temp.path()).components.load(COMPONENT).unwrap();

    let second = open(temp.path()).components.load(COMPONENT).unwrap();

    assert!(second > first);
    assert_eq!(
        tree_files(temp.path()),
        vec![format!("tree-{first}.json"), format!("tree-{second}.json")]
    );
}

#[test]
fn given_deleted_tree_when_reopening_then_file_is_gone() {
    let temp = TempDir::new().unwrap();
    let ctx = open(temp.path());
    let tree = ctx.components.load(COMPONENT).unwrap();
    ctx.classifier
        .set_tree_state(tree, TreeState::Obsolete)
        .unwrap();

    ctx.classifier.delete_tree(tree).unwrap();

    assert!(tree_files(temp.path()).is_empty());
    assert!(open(temp.path()).query.get_tree_list(None, None).unwrap().is_empty());
}

#[test]
fn given_failed_instantiation_when_listing_store_then_no_partial_tree_file() {
    let temp = TempDir::new().unwrap();
    let ctx = open(temp.path());
    let component = ctx.components.load(COMPONENT).unwrap();

    // component trees cannot be instantiated
    assert!(ctx.instantiator.instanciate_tree(component).is_err());

    assert_eq!(tree_files(temp.path()), vec![format!("tree-{component}.json")]);
}

#[test]
fn given_corrupt_tree_file_when_opening_then_error() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("tree-1.json"), "{ not json").unwrap();

    let result = ServiceContainer::new(test_settings(temp.path()));

    assert!(result.is_err());
}

/// Real filesystem whose atomic writes to tree 2 fail once armed.
#[derive(Default)]
struct FailingTreeTwo {
    armed: AtomicBool,
}

impl FileSystem for FailingTreeTwo {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        RealFileSystem.read_to_string(path)
    }
    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        RealFileSystem.write(path, content)
    }
    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string());
        if self.armed.load(Ordering::SeqCst) && name.is_some_and(|n| n.starts_with("tree-2.")) {
            return Err(io::Error::other("disk full"));
        }
        RealFileSystem.write_atomic(path, content)
    }
    fn exists(&self, path: &Path) -> bool {
        RealFileSystem.exists(path)
    }
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        RealFileSystem.create_dir_all(path)
    }
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        RealFileSystem.remove_file(path)
    }
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        RealFileSystem.rename(from, to)
    }
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        RealFileSystem.list_files(dir)
    }
}

fn level(ctx: &ServiceContainer, tree: TreeId) -> Node {
    ctx.query.get_items_matching(tree, "Obs.Level").unwrap().remove(0)
}

#[test]
fn given_batch_across_trees_when_one_file_write_fails_then_no_file_changes() {
    let temp = TempDir::new().unwrap();
    let fs = Arc::new(FailingTreeTwo::default());
    let store = TreeStore::open(fs.clone(), temp.path()).unwrap();
    let ctx = ServiceContainer::with_deps(test_settings(temp.path()), fs.clone(), store);
    let trees = [
        ctx.components.load("[Obs]\nLevel = \"old\"\n").unwrap(),
        ctx.components.load("[Obs]\nLevel = \"old\"\n").unwrap(),
    ];
    assert_eq!(trees, [1, 2]);
    let changed: Vec<Node> = trees
        .iter()
        .map(|&tree| {
            let mut node = level(&ctx, tree);
            node.kind = NodeKind::Leaf {
                value: LeafValue::Literal("new".into()),
                constraint: None,
            };
            node
        })
        .collect();
    fs.armed.store(true, Ordering::SeqCst);

    let result = ctx.nodes.save_node_list(&changed);

    assert!(result.is_err());
    let reopened = open(temp.path());
    for tree in trees {
        assert_eq!(level(&reopened, tree).limits(), "old");
    }
    assert_eq!(
        tree_files(temp.path()),
        vec!["tree-1.json".to_string(), "tree-2.json".to_string()]
    );
}

// ============================================================
// settings
// ============================================================

#[test]
fn given_store_config_when_loading_settings_then_overrides_defaults() {
    let temp = TempDir::new().unwrap();
    fs::write(
        store_config_path(temp.path()),
        "prune_level = 3\nmax_reference_depth = 2\ndefault_classification = \"operational\"\n",
    )
    .unwrap();

    let settings = Settings::load(Some(temp.path())).unwrap();

    assert_eq!(settings.store_dir, temp.path());
    assert_eq!(settings.prune_level, 3);
    assert_eq!(settings.max_reference_depth, 2);
    assert_eq!(settings.default_classification, Classification::Operational);
}

#[test]
fn given_default_classification_when_loading_component_then_tree_uses_it() {
    let temp = TempDir::new().unwrap();
    let mut settings = test_settings(temp.path());
    settings.default_classification = Classification::Example;
    let ctx = ServiceContainer::new(settings).unwrap();

    let tree = ctx.components.load(COMPONENT).unwrap();

    assert_eq!(
        ctx.query.get_tree_info(tree).unwrap().classification,
        Classification::Example
    );
}

#[test]
fn given_settings_when_rendering_toml_then_round_trips() {
    let temp = TempDir::new().unwrap();
    let settings = test_settings(temp.path());

    let rendered = settings.to_toml().unwrap();
    let parsed: Settings = toml::from_str(&rendered).unwrap();

    assert_eq!(parsed, settings);
}
