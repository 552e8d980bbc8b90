//! Component definition documents
//!
//! A component tree is described in TOML. The single top-level table is the
//! root group; nested tables are groups, scalars are leaf literals and
//! inline tables with a `value` key are leaves carrying a constraint:
//!
//! ```toml
//! [Observation]
//! _description = "observation root"
//!
//! [Observation.Beamformer]
//! _instances = 4
//! Filter = { value = "off", choices = ["on", "off"] }
//! Gain = { value = 3, min = 0, max = 10 }
//! Source = ">>Observation.Beamformer.Filter"
//! ```

use toml::{Table, Value};

use crate::domain::entities::{Constraint, LeafValue, NodeKind};
use crate::domain::error::{DomainError, DomainResult};

const INSTANCES_KEY: &str = "_instances";
const DESCRIPTION_KEY: &str = "_description";

/// Parsed definition of one component node and its children.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDef {
    pub name: String,
    pub kind: NodeKind,
    pub description: String,
    pub children: Vec<ComponentDef>,
}

impl ComponentDef {
    /// Parse a component document.
    pub fn parse(content: &str) -> DomainResult<Self> {
        let table: Table = content
            .parse()
            .map_err(|e: toml::de::Error| DomainError::Parse(e.to_string()))?;
        let mut entries = table.into_iter();
        let (name, value) = entries
            .next()
            .ok_or_else(|| DomainError::Parse("empty component document".into()))?;
        if entries.next().is_some() {
            return Err(DomainError::Parse(
                "component document must have exactly one top-level table".into(),
            ));
        }
        Self::from_value(name, value)
    }

    /// Number of nodes in this definition, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ComponentDef::node_count).sum::<usize>()
    }

    fn from_value(name: String, value: Value) -> DomainResult<Self> {
        match value {
            Value::Table(table) if !table.contains_key("value") => Self::group(name, table),
            Value::Table(table) => Self::constrained_leaf(name, table),
            scalar => Ok(Self {
                kind: NodeKind::Leaf {
                    value: LeafValue::from_limits(&scalar_to_string(&name, &scalar)?),
                    constraint: None,
                },
                name,
                description: String::new(),
                children: Vec::new(),
            }),
        }
    }

    fn group(name: String, table: Table) -> DomainResult<Self> {
        let mut instances = 1u32;
        let mut description = String::new();
        let mut children = Vec::new();
        for (key, value) in table {
            match key.as_str() {
                INSTANCES_KEY => {
                    instances = value
                        .as_integer()
                        .and_then(|i| u32::try_from(i).ok())
                        .ok_or_else(|| {
                            DomainError::Parse(format!("{name}: {INSTANCES_KEY} must be >= 0"))
                        })?;
                }
                DESCRIPTION_KEY => description = scalar_to_string(&name, &value)?,
                _ => children.push(Self::from_value(key, value)?),
            }
        }
        Ok(Self {
            name,
            kind: NodeKind::group(instances),
            description,
            children,
        })
    }

    fn constrained_leaf(name: String, table: Table) -> DomainResult<Self> {
        let get_f64 = |key: &str| -> DomainResult<Option<f64>> {
            match table.get(key) {
                None => Ok(None),
                Some(Value::Integer(i)) => Ok(Some(*i as f64)),
                Some(Value::Float(f)) => Ok(Some(*f)),
                Some(_) => Err(DomainError::Parse(format!("{name}: '{key}' must be numeric"))),
            }
        };
        let value = table
            .get("value")
            .map(|v| scalar_to_string(&name, v))
            .transpose()?
            .unwrap_or_default();
        let (min, max) = (get_f64("min")?, get_f64("max")?);
        let constraint = match table.get("choices") {
            Some(Value::Array(items)) => Some(Constraint::Choice(
                items
                    .iter()
                    .map(|v| scalar_to_string(&name, v))
                    .collect::<DomainResult<_>>()?,
            )),
            Some(_) => {
                return Err(DomainError::Parse(format!("{name}: 'choices' must be an array")))
            }
            None if min.is_some() || max.is_some() => Some(Constraint::Range { min, max }),
            None => None,
        };
        let description = table
            .get("description")
            .map(|v| scalar_to_string(&name, v))
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            name,
            kind: NodeKind::Leaf {
                value: LeafValue::from_limits(&value),
                constraint,
            },
            description,
            children: Vec::new(),
        })
    }
}

fn scalar_to_string(name: &str, value: &Value) -> DomainResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Datetime(d) => Ok(d.to_string()),
        Value::Array(_) | Value::Table(_) => Err(DomainError::Parse(format!(
            "{name}: expected a scalar value"
        ))),
    }
}
