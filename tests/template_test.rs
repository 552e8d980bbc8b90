//! Tests for ComponentLoader, TemplateBuilder, NodeDuplicator and Instantiator
//!
//! Covers the component -> template -> hierarchical pipeline:
//! - a template mirrors the component subtree with planned instance counts
//! - duplication copies a subtree shape under a new index
//! - instantiation expands every group into `instances` indexed siblings

use otdb::application::ApplicationError;
use otdb::domain::{
    Classification, DomainError, Node, NodeId, NodeKind, TreeId, TreeState, TreeType,
};
use otdb::infrastructure::ServiceContainer;
use otdb::util::testing::memory_container;

const BEAMFORMER: &str = r#"
[Observation]
_description = "observation"

[Observation.Beamformer]
_instances = 4
Filter = "off"
"#;

const STATION: &str = r#"
[Station]

[Station.Antenna]
_instances = 3
Gain = { value = 5, min = 0, max = 10 }
Mode = { value = "lba", choices = ["lba", "hba"] }

[Station.Antenna.Tile]
_instances = 2
Delay = "0.5"

[Station.Clock]
Rate = "200"
"#;

fn node_id(ctx: &ServiceContainer, tree: TreeId, path: &str) -> NodeId {
    ctx.store
        .read(tree, |rec| rec.resolve_path(path).map(|n| n.node_id))
        .unwrap()
}

fn build_template(ctx: &ServiceContainer, definition: &str) -> TreeId {
    let component = ctx.components.load(definition).unwrap();
    let root = ctx.query.get_top_node(component).unwrap();
    ctx.templates
        .build_template_tree(component, root.node_id, Classification::Test)
        .unwrap()
}

/// Names, kinds, values and relative structure of a subtree, ids left out.
fn shape(ctx: &ServiceContainer, tree: TreeId, top: NodeId) -> Vec<(String, bool, String)> {
    let arena = ctx.query.get_subtree(tree, top).unwrap();
    arena
        .iter()
        .map(|(idx, node)| {
            let name = arena.relative_name(idx).unwrap();
            // drop the top segment so a duplicate with another index compares equal
            let relative = name.split_once('.').map(|(_, r)| r.to_string()).unwrap_or_default();
            (relative, node.data.is_leaf(), node.data.limits())
        })
        .collect()
}

// ============================================================
// ComponentLoader
// ============================================================

#[test]
fn given_component_definition_when_loading_then_creates_component_tree() {
    let ctx = memory_container();

    let tree = ctx.components.load(STATION).unwrap();

    let info = ctx.query.get_tree_info(tree).unwrap();
    assert_eq!(info.tree_type, TreeType::Component);
    assert_eq!(info.state, TreeState::BeingSpecified);
    assert_eq!(info.creator, "tester");
    let gain = ctx
        .query
        .get_node(tree, node_id(&ctx, tree, "Station.Antenna.Gain"))
        .unwrap();
    assert_eq!(gain.limits(), "5");
}

#[test]
fn given_invalid_document_when_loading_then_no_tree_is_created() {
    let ctx = memory_container();

    let result = ctx.components.load("[A]\n[B]\n");

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::Parse(_)))
    ));
    assert!(ctx.query.get_tree_list(None, None).unwrap().is_empty());
}

// ============================================================
// TemplateBuilder
// ============================================================

#[test]
fn given_beamformer_component_when_building_template_then_keeps_planned_instances() {
    let ctx = memory_container();

    let template = build_template(&ctx, BEAMFORMER);

    let info = ctx.query.get_tree_info(template).unwrap();
    assert_eq!(info.tree_type, TreeType::Template);
    assert_eq!(info.classification, Classification::Test);
    let beamformers = ctx
        .query
        .get_items_matching(template, "Observation.Beamformer%")
        .unwrap();
    let groups: Vec<&Node> = beamformers.iter().filter(|n| !n.is_leaf()).collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].instances(), 4);
}

#[test]
fn given_template_when_building_template_from_it_then_wrong_tree_type() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);
    let root = ctx.query.get_top_node(template).unwrap();

    let result = ctx
        .templates
        .build_template_tree(template, root.node_id, Classification::Test);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::WrongTreeType { .. }))
    ));
}

#[test]
fn given_template_when_copying_then_new_template_has_same_shape() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);

    let copy = ctx.templates.copy_template_tree(template).unwrap();

    assert_ne!(copy, template);
    assert_eq!(
        ctx.query.get_tree_info(copy).unwrap().original_tree,
        Some(template)
    );
    let original_root = ctx.query.get_top_node(template).unwrap().node_id;
    let copy_root = ctx.query.get_top_node(copy).unwrap().node_id;
    assert_eq!(
        shape(&ctx, template, original_root),
        shape(&ctx, copy, copy_root)
    );
}

#[test]
fn given_template_when_adding_node_then_rejected() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);
    let root = ctx.query.get_top_node(template).unwrap();

    let result = ctx
        .nodes
        .add_node(template, root.node_id, "Extra", 0, NodeKind::literal("1"), "");

    assert!(result.is_err());
}

#[test]
fn given_template_when_renaming_node_then_rejected() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);
    let mut node = ctx
        .query
        .get_node(template, node_id(&ctx, template, "Observation.Beamformer"))
        .unwrap();
    node.name = "Correlator".into();

    let result = ctx.nodes.save_node(&node);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidNode(_)))
    ));
}

// ============================================================
// NodeDuplicator
// ============================================================

#[test]
fn given_template_node_when_duplicating_then_subtree_shape_is_identical() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);
    let antenna = node_id(&ctx, template, "Station.Antenna");

    let copy = ctx.duplicator.dup_node(template, antenna, 7).unwrap();

    let node = ctx.query.get_node(template, copy).unwrap();
    let original = ctx.query.get_node(template, antenna).unwrap();
    assert_eq!(node.index, 7);
    assert_eq!(node.name, original.name);
    assert_eq!(node.parent_id, original.parent_id);
    assert_ne!(node.node_id, original.node_id);
    assert_eq!(shape(&ctx, template, antenna), shape(&ctx, template, copy));
    assert_eq!(
        ctx.query.get_qualified_name(template, copy).unwrap(),
        "Station.Antenna[7]"
    );
}

#[test]
fn given_duplicated_index_when_duplicating_again_then_index_collision() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);
    let antenna = node_id(&ctx, template, "Station.Antenna");
    ctx.duplicator.dup_node(template, antenna, 2).unwrap();
    let before = ctx.store.read(template, |rec| Ok(rec.len())).unwrap();

    let result = ctx.duplicator.dup_node(template, antenna, 2);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::IndexCollision { index: 2, .. }))
    ));
    let after = ctx.store.read(template, |rec| Ok(rec.len())).unwrap();
    assert_eq!(before, after);
}

#[test]
fn given_duplicate_when_deleting_then_only_copy_is_removed() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);
    let antenna = node_id(&ctx, template, "Station.Antenna");
    let before = ctx.store.read(template, |rec| Ok(rec.len())).unwrap();
    let copy = ctx.duplicator.dup_node(template, antenna, 1).unwrap();
    let copy_node = ctx.query.get_node(template, copy).unwrap();

    let removed = ctx.duplicator.delete_node(&copy_node).unwrap();

    assert!(removed > 1);
    assert_eq!(ctx.store.read(template, |rec| Ok(rec.len())).unwrap(), before);
    assert!(ctx.query.get_node(template, antenna).is_ok());
}

// ============================================================
// Instantiator
// ============================================================

#[test]
fn given_beamformer_template_when_instantiating_then_four_beamformers_with_filter() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);

    let tree = ctx.instantiator.instanciate_tree(template).unwrap();

    let info = ctx.query.get_tree_info(tree).unwrap();
    assert_eq!(info.tree_type, TreeType::Hierarchical);
    assert_eq!(info.original_tree, Some(template));
    let root = ctx.query.get_top_node(tree).unwrap();
    let beamformers = ctx.query.get_item_list(tree, root.node_id, 1).unwrap();
    assert_eq!(beamformers.len(), 4);
    for (expected_index, beamformer) in (1..=4).zip(&beamformers) {
        assert_eq!(beamformer.name, "Beamformer");
        assert_eq!(beamformer.index, expected_index);
        let children = ctx
            .query
            .get_item_list(tree, beamformer.node_id, 1)
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Filter");
        assert_eq!(children[0].limits(), "off");
    }
}

#[test]
fn given_nested_groups_when_instantiating_then_every_level_is_expanded() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);

    let tree = ctx.instantiator.instanciate_tree(template).unwrap();

    let root = ctx.query.get_top_node(tree).unwrap();
    let antennas: Vec<Node> = ctx
        .query
        .get_item_list(tree, root.node_id, 1)
        .unwrap()
        .into_iter()
        .filter(|n| n.name == "Antenna")
        .collect();
    assert_eq!(
        antennas.iter().map(|n| n.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    let tiles = ctx
        .query
        .get_items_matching(tree, "Station.Antenna[%].Tile[%]")
        .unwrap();
    assert_eq!(tiles.len(), 6);
    let delays = ctx.query.get_items_matching(tree, "%.Delay").unwrap();
    assert_eq!(delays.len(), 6);
    assert!(delays.iter().all(|d| d.limits() == "0.5"));
    // single-instance group keeps one copy, indexed 1
    let clocks = ctx.query.get_items_matching(tree, "Station.Clock%").unwrap();
    assert_eq!(clocks.iter().filter(|n| !n.is_leaf()).count(), 1);
    assert_eq!(
        ctx.query.get_qualified_name(tree, node_id(&ctx, tree, "Station.Clock.Rate")).unwrap(),
        "Station.Clock[1].Rate"
    );
}

#[test]
fn given_duplicated_template_node_when_instantiating_then_copies_are_numbered_consecutively() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);
    let beamformer = node_id(&ctx, template, "Observation.Beamformer");
    let copy = ctx.duplicator.dup_node(template, beamformer, 5).unwrap();
    let mut copy = ctx.query.get_node(template, copy).unwrap();
    copy.kind = NodeKind::group(2);
    ctx.nodes.save_node(&copy).unwrap();

    let tree = ctx.instantiator.instanciate_tree(template).unwrap();

    let root = ctx.query.get_top_node(tree).unwrap();
    let beamformers = ctx.query.get_item_list(tree, root.node_id, 1).unwrap();
    assert_eq!(
        beamformers.iter().map(|n| n.index).collect::<Vec<_>>(),
        (1..=6).collect::<Vec<u32>>()
    );
    let filters = ctx
        .query
        .get_items_matching(tree, "Observation.Beamformer[%].Filter")
        .unwrap();
    assert_eq!(filters.len(), 6);
}

#[test]
fn given_many_duplicates_when_instantiating_then_succeeds() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);
    let antenna = node_id(&ctx, template, "Station.Antenna");
    for index in [2, 9] {
        ctx.duplicator.dup_node(template, antenna, index).unwrap();
    }

    let tree = ctx.instantiator.instanciate_tree(template).unwrap();

    let root = ctx.query.get_top_node(tree).unwrap();
    let antennas: Vec<u32> = ctx
        .query
        .get_item_list(tree, root.node_id, 1)
        .unwrap()
        .into_iter()
        .filter(|n| n.name == "Antenna")
        .map(|n| n.index)
        .collect();
    assert_eq!(antennas, (1..=9).collect::<Vec<u32>>());
    let tiles = ctx
        .query
        .get_items_matching(tree, "Station.Antenna[%].Tile[%]")
        .unwrap();
    assert_eq!(tiles.len(), 18);
}

#[test]
fn given_violated_constraint_when_instantiating_then_no_tree_is_created() {
    let ctx = memory_container();
    let template = build_template(&ctx, STATION);
    let mut gain = ctx
        .query
        .get_node(template, node_id(&ctx, template, "Station.Antenna.Gain"))
        .unwrap();
    if let NodeKind::Leaf { value, .. } = &mut gain.kind {
        *value = otdb::domain::LeafValue::Literal("42".into());
    }
    ctx.nodes.save_node(&gain).unwrap();
    let trees_before = ctx.query.get_tree_list(None, None).unwrap().len();

    let result = ctx.instantiator.instanciate_tree(template);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::ConstraintViolation { .. }))
    ));
    assert_eq!(ctx.query.get_tree_list(None, None).unwrap().len(), trees_before);
}

#[test]
fn given_component_tree_when_instantiating_then_wrong_tree_type() {
    let ctx = memory_container();
    let component = ctx.components.load(BEAMFORMER).unwrap();

    let result = ctx.instantiator.instanciate_tree(component);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::WrongTreeType {
            expected: TreeType::Template,
            actual: TreeType::Component,
            ..
        }))
    ));
}

#[test]
fn given_obsolete_template_when_instantiating_then_not_mutable() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);
    ctx.classifier
        .set_tree_state(template, TreeState::Obsolete)
        .unwrap();

    let result = ctx.instantiator.instanciate_tree(template);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::NotMutable { .. }))
    ));
}

#[test]
fn given_parallel_duplications_when_indices_differ_then_all_succeed() {
    let ctx = memory_container();
    let template = build_template(&ctx, BEAMFORMER);
    let beamformer = node_id(&ctx, template, "Observation.Beamformer");

    let created: Vec<NodeId> = std::thread::scope(|s| {
        let handles: Vec<_> = (1..=8)
            .map(|index| {
                let ctx = &ctx;
                s.spawn(move || ctx.duplicator.dup_node(template, beamformer, index).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(created.len(), 8);
    let root = ctx.query.get_top_node(template).unwrap();
    let copies = ctx.query.get_item_list(template, root.node_id, 1).unwrap();
    assert_eq!(
        copies.iter().map(|n| n.index).collect::<Vec<_>>(),
        (0..=8).collect::<Vec<u32>>()
    );
}
