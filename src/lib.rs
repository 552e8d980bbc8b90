//! Observation tree database
//!
//! Maintains component, template and hierarchical configuration trees:
//! component definitions become templates, templates are instantiated into
//! hierarchical trees, and every tree moves through a guarded lifecycle.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
