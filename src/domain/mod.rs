//! Domain layer: tree entities, structural invariants and the state machine
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod component;
pub mod constraints;
pub mod entities;
pub mod error;
pub mod paramset;
pub mod pattern;
pub mod record;
pub mod state;

pub use arena::{ArenaNode, TreeArena};
pub use component::ComponentDef;
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use pattern::NamePattern;
pub use record::{CopyMode, TreeRecord};
