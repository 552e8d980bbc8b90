//! Tree state machine
//!
//! ```text
//! being_specified -> specified -> approved -> active -> finished
//!                                                    \-> aborted
//! any state -> obsolete
//! ```

use crate::domain::entities::{TreeId, TreeState};
use crate::domain::error::{DomainError, DomainResult};

/// States reachable from `from` in one transition.
pub fn allowed_transitions(from: TreeState) -> &'static [TreeState] {
    use TreeState::*;
    match from {
        BeingSpecified => &[Specified, Obsolete],
        Specified => &[Approved, Obsolete],
        Approved => &[Active, Obsolete],
        Active => &[Finished, Aborted, Obsolete],
        Finished => &[Obsolete],
        Aborted => &[Obsolete],
        Obsolete => &[Obsolete],
    }
}

pub fn is_transition_allowed(from: TreeState, to: TreeState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Validate a requested transition.
pub fn check_transition(tree_id: TreeId, from: TreeState, to: TreeState) -> DomainResult<()> {
    if is_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition { tree_id, from, to })
    }
}

/// Node content may only change while a tree is still being specified.
pub fn allows_node_edits(state: TreeState) -> bool {
    matches!(state, TreeState::BeingSpecified | TreeState::Specified)
}

/// No further work happens on a tree in a terminal state.
pub fn is_terminal(state: TreeState) -> bool {
    matches!(
        state,
        TreeState::Finished | TreeState::Aborted | TreeState::Obsolete
    )
}

pub fn allows_deletion(state: TreeState) -> bool {
    state == TreeState::Obsolete
}

/// A template can be instantiated until it is put to rest.
pub fn allows_instantiation(state: TreeState) -> bool {
    matches!(
        state,
        TreeState::BeingSpecified | TreeState::Specified | TreeState::Approved
    )
}
