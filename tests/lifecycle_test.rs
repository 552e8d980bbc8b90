//! Tests for TreeClassifier and the tree lifecycle
//!
//! - state transitions follow the fixed state table, with an audit trail
//! - a tree can only be deleted once it is obsolete
//! - node edits stop once a tree leaves specification

use chrono::Utc;
use rstest::rstest;

use otdb::application::ApplicationError;
use otdb::domain::{
    Classification, DomainError, LeafValue, NodeKind, TreeId, TreeState, ROOT_PARENT,
};
use otdb::infrastructure::ServiceContainer;
use otdb::util::testing::memory_container;

/// A component tree with one leaf constrained to 0..=5.
fn tree_with_leaf(ctx: &ServiceContainer, value: &str) -> TreeId {
    ctx.components
        .load(&format!(
            "[Obs]\nLevel = {{ value = \"{value}\", min = 0, max = 5 }}\n"
        ))
        .unwrap()
}

fn walk_to(ctx: &ServiceContainer, tree: TreeId, path: &[TreeState]) {
    for state in path {
        ctx.classifier.set_tree_state(tree, *state).unwrap();
    }
}

fn active_path() -> Vec<TreeState> {
    vec![
        TreeState::Specified,
        TreeState::Approved,
        TreeState::Active,
    ]
}

// ============================================================
// set_tree_state()
// ============================================================

#[test]
fn given_active_tree_when_returning_to_being_specified_then_invalid_transition() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    walk_to(&ctx, tree, &active_path());

    let result = ctx.classifier.set_tree_state(tree, TreeState::BeingSpecified);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidTransition {
            from: TreeState::Active,
            to: TreeState::BeingSpecified,
            ..
        }))
    ));
    assert_eq!(
        ctx.query.get_tree_info(tree).unwrap().state,
        TreeState::Active
    );
}

#[rstest]
#[case(vec![])]
#[case(vec![TreeState::Specified])]
#[case(vec![TreeState::Specified, TreeState::Approved])]
#[case(vec![TreeState::Specified, TreeState::Approved, TreeState::Active])]
#[case(vec![TreeState::Specified, TreeState::Approved, TreeState::Active, TreeState::Finished])]
#[case(vec![TreeState::Specified, TreeState::Approved, TreeState::Active, TreeState::Aborted])]
fn given_any_state_when_setting_obsolete_then_succeeds(#[case] path: Vec<TreeState>) {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    walk_to(&ctx, tree, &path);

    let old = ctx
        .classifier
        .set_tree_state(tree, TreeState::Obsolete)
        .unwrap();

    assert_eq!(old, *path.last().unwrap_or(&TreeState::BeingSpecified));
    assert_eq!(
        ctx.query.get_tree_info(tree).unwrap().state,
        TreeState::Obsolete
    );
}

#[test]
fn given_being_specified_tree_when_skipping_to_active_then_invalid_transition() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");

    let result = ctx.classifier.set_tree_state(tree, TreeState::Active);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidTransition { .. }))
    ));
}

#[test]
fn given_violated_constraint_when_approving_then_stays_specified() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "9");
    walk_to(&ctx, tree, &[TreeState::Specified]);

    let result = ctx.classifier.set_tree_state(tree, TreeState::Approved);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::ConstraintViolation { .. }))
    ));
    assert_eq!(
        ctx.query.get_tree_info(tree).unwrap().state,
        TreeState::Specified
    );
}

#[test]
fn given_transitions_when_listing_history_then_audit_trail_in_order() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    let other = tree_with_leaf(&ctx, "2");
    let start = Utc::now();
    walk_to(&ctx, tree, &active_path());
    walk_to(&ctx, other, &[TreeState::Obsolete]);

    let changes = ctx.query.get_state_list(Some(tree), Some(start), None).unwrap();
    let all = ctx.query.get_state_list(None, None, None).unwrap();

    let steps: Vec<(TreeState, TreeState)> = changes.iter().map(|c| (c.from, c.to)).collect();
    assert_eq!(
        steps,
        vec![
            (TreeState::BeingSpecified, TreeState::Specified),
            (TreeState::Specified, TreeState::Approved),
            (TreeState::Approved, TreeState::Active),
        ]
    );
    assert!(changes.iter().all(|c| c.user == "tester" && c.tree_id == tree));
    assert_eq!(all.len(), 4);
}

#[test]
fn given_future_window_when_listing_history_then_empty() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    walk_to(&ctx, tree, &[TreeState::Specified]);

    let later = Utc::now() + chrono::Duration::hours(1);
    let changes = ctx.query.get_state_list(Some(tree), Some(later), None).unwrap();

    assert!(changes.is_empty());
}

// ============================================================
// delete_tree()
// ============================================================

#[rstest]
#[case(vec![])]
#[case(vec![TreeState::Specified])]
#[case(vec![TreeState::Specified, TreeState::Approved, TreeState::Active])]
fn given_non_obsolete_tree_when_deleting_then_not_mutable_and_unchanged(
    #[case] path: Vec<TreeState>,
) {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    walk_to(&ctx, tree, &path);
    let before = ctx.store.read(tree, |rec| Ok(rec.clone())).unwrap();

    let result = ctx.classifier.delete_tree(tree);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::NotMutable { .. }))
    ));
    let after = ctx.store.read(tree, |rec| Ok(rec.clone())).unwrap();
    assert_eq!(before, after);
}

#[test]
fn given_obsolete_tree_when_deleting_then_gone() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    walk_to(&ctx, tree, &[TreeState::Obsolete]);

    ctx.classifier.delete_tree(tree).unwrap();

    let result = ctx.query.get_tree_info(tree);
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::TreeNotFound(id))) if id == tree
    ));
}

#[test]
fn given_unknown_tree_when_deleting_then_tree_not_found() {
    let ctx = memory_container();

    let result = ctx.classifier.delete_tree(99);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::TreeNotFound(99)))
    ));
}

// ============================================================
// metadata
// ============================================================

#[test]
fn given_tree_when_changing_metadata_then_info_reflects_it() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");

    ctx.classifier
        .set_classification(tree, Classification::Operational)
        .unwrap();
    ctx.classifier.set_description(tree, "LBA survey").unwrap();
    ctx.classifier
        .set_mom_info(tree, Some(4711), "cycle-0")
        .unwrap();

    let info = ctx.query.get_tree_info(tree).unwrap();
    assert_eq!(info.classification, Classification::Operational);
    assert_eq!(info.description, "LBA survey");
    assert_eq!(info.mom_id, Some(4711));
    assert_eq!(info.campaign, "cycle-0");
    let operational = ctx
        .query
        .get_tree_list(None, Some(Classification::Operational))
        .unwrap();
    assert_eq!(operational.len(), 1);
}

#[test]
fn given_active_tree_when_saving_node_then_not_mutable() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    walk_to(&ctx, tree, &active_path());
    let mut level = ctx
        .store
        .read(tree, |rec| rec.resolve_path("Obs.Level").cloned())
        .unwrap();
    if let NodeKind::Leaf { value, .. } = &mut level.kind {
        *value = LeafValue::Literal("2".into());
    }

    let result = ctx.nodes.save_node(&level);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::NotMutable { .. }))
    ));
}

#[test]
fn given_tree_when_checking_constraints_then_reports_first_violation() {
    let ctx = memory_container();
    let tree = tree_with_leaf(&ctx, "1");
    let root = ctx.query.get_top_node(tree).unwrap();
    ctx.nodes
        .add_node(tree, root.node_id, "Link", 0, NodeKind::reference("Obs.Missing"), "")
        .unwrap();

    let result = ctx.classifier.check_tree_constraints(tree, root.node_id);

    match result {
        Err(ApplicationError::Domain(DomainError::ConstraintViolation { path, .. })) => {
            assert_eq!(path, "Obs.Link")
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
    assert_eq!(root.parent_id, ROOT_PARENT);
}
