//! Parameter-set text format
//!
//! One line per leaf: `<qualified.dotted.name>=<limits>`, newline separated,
//! in depth-first order. Values are written verbatim, no escaping.

use crate::domain::arena::TreeArena;
use crate::domain::entities::NodeId;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::record::TreeRecord;

/// A single `key=value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLine {
    pub key: String,
    pub value: String,
}

/// Render the leaves of the subtree `top` of `record`.
pub fn export(record: &TreeRecord, top: NodeId) -> DomainResult<String> {
    let arena = TreeArena::from_record(record, top)?;
    let prefix = match record.node(top)?.is_root() {
        true => String::new(),
        false => {
            let parent = record.node(top)?.parent_id;
            format!("{}.", record.qualified_name(parent)?)
        }
    };

    let mut out = String::new();
    for (idx, node) in arena.iter() {
        if !node.data.is_leaf() {
            continue;
        }
        out.push_str(&prefix);
        out.push_str(&arena.relative_name(idx)?);
        out.push('=');
        out.push_str(&node.data.limits());
        out.push('\n');
    }
    Ok(out)
}

/// Parse parameter-set text. Blank lines and `#` comments are skipped;
/// the key ends at the first `=`, the rest of the line is the value.
pub fn parse(text: &str) -> DomainResult<Vec<ParamLine>> {
    let mut lines = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            DomainError::Parse(format!("line {}: missing '=' in '{}'", lineno + 1, line))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DomainError::Parse(format!("line {}: empty key", lineno + 1)));
        }
        lines.push(ParamLine {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(lines)
}
