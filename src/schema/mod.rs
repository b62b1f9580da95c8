//! Inferred schema and its YAML rendering

mod builder;

pub use builder::SchemaBuilder;

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::config::Markers;
use crate::walker::Scalar;

/// Leaf of the schema tree
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Read, but no value is known
    Undefined,
    Error,
    /// "more elements like the previous one"
    ListMarker,
    Scalar(Scalar),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Leaf(Leaf),
    Mapping(SchemaMapping),
    /// Element descriptions: a merged mapping first when there is one,
    /// then distinct leaves in first-seen order
    List(Vec<SchemaNode>),
}

impl SchemaNode {
    pub fn as_mapping(&self) -> Option<&SchemaMapping> {
        match self {
            SchemaNode::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SchemaNode]> {
        match self {
            SchemaNode::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_yaml_value(&self, markers: &Markers) -> Value {
        match self {
            SchemaNode::Leaf(leaf) => leaf_to_yaml(leaf, markers),
            SchemaNode::Mapping(mapping) => mapping.to_yaml_value(markers),
            SchemaNode::List(items) => Value::Sequence(
                items.iter().map(|item| item.to_yaml_value(markers)).collect(),
            ),
        }
    }
}

fn leaf_to_yaml(leaf: &Leaf, markers: &Markers) -> Value {
    match leaf {
        Leaf::Undefined => Value::String(markers.undefined.clone()),
        Leaf::Error => Value::String(markers.error.clone()),
        Leaf::ListMarker => Value::String(markers.list.clone()),
        Leaf::Scalar(Scalar::Str(s)) => Value::String(s.clone()),
        Leaf::Scalar(Scalar::Int(n)) => Value::Number((*n).into()),
        Leaf::Scalar(Scalar::Float(n)) => Value::Number((*n).into()),
        Leaf::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
        Leaf::Scalar(Scalar::None) => Value::Null,
    }
}

/// Key → shape, sorted by key
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaMapping(pub BTreeMap<String, SchemaNode>);

impl SchemaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&SchemaNode> {
        self.0.get(key)
    }

    /// Follow a chain of mapping keys
    pub fn lookup(&self, path: &[&str]) -> Option<&SchemaNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.0.get(*first)?;
        for key in rest {
            node = node.as_mapping()?.0.get(*key)?;
        }
        Some(node)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_yaml_value(&self, markers: &Markers) -> Value {
        let mut mapping = serde_yaml::Mapping::new();
        for (key, node) in &self.0 {
            mapping.insert(Value::String(key.clone()), node.to_yaml_value(markers));
        }
        Value::Mapping(mapping)
    }

    /// Block-style YAML document
    pub fn to_yaml_string(&self, markers: &Markers) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_yaml_value(markers))
    }
}
