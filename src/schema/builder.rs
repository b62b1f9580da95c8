//! Folds observations into one schema

use std::fmt;

use crate::walker::{Diagnostic, DiagnosticKind, InferredValue, Observation};

use super::{Leaf, SchemaMapping, SchemaNode};

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Undefined => write!(f, "undefined"),
            Leaf::Error => write!(f, "error"),
            Leaf::ListMarker => write!(f, "list marker"),
            Leaf::Scalar(s) => write!(f, "{}", s),
        }
    }
}

/// Accumulates observations into a [`SchemaMapping`]
///
/// Each observation becomes a single-branch tree (its path wrapping its
/// value) that is merged into the schema so far:
///
/// - mapping with mapping: union of keys, shared keys merged recursively
/// - either side a list: one list holding the merged mapping of all mapping
///   elements (if any) followed by the distinct leaves in first-seen order
/// - leaf with leaf: the incoming leaf wins; differing leaves are reported
///   as [`DiagnosticKind::ScalarConflict`]
/// - mapping with leaf: the mapping is kept, so keys never depend on order
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    root: SchemaMapping,
    diagnostics: Vec<Diagnostic>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema, discarding diagnostics
    pub fn build(observations: impl IntoIterator<Item = Observation>) -> SchemaMapping {
        let mut builder = Self::new();
        builder.extend(observations);
        builder.finish().0
    }

    pub fn add(&mut self, observation: Observation) {
        let mut root = std::mem::take(&mut self.root);
        let mut path = Vec::new();
        self.insert(&mut root, observation, &mut path);
        self.root = root;
    }

    pub fn extend(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for observation in observations {
            self.add(observation);
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn finish(self) -> (SchemaMapping, Vec<Diagnostic>) {
        tracing::debug!(
            keys = self.root.len(),
            conflicts = self.diagnostics.len(),
            "schema built"
        );
        (self.root, self.diagnostics)
    }

    /// Merge one observation into `into`; `path` is the key path of `into`
    fn insert(
        &mut self,
        into: &mut SchemaMapping,
        observation: Observation,
        path: &mut Vec<String>,
    ) {
        let segments = observation.path.0;
        let Some((first, rest)) = segments.split_first() else {
            return;
        };

        let depth = path.len();
        path.extend(segments.iter().cloned());
        let mut node = self.value_to_node(observation.value, path);
        path.truncate(depth + 1);

        for segment in rest.iter().rev() {
            let mut mapping = SchemaMapping::new();
            mapping.0.insert(segment.clone(), node);
            node = SchemaNode::Mapping(mapping);
        }

        self.merge_entry(into, first.clone(), node, path);
        path.truncate(depth);
    }

    fn value_to_node(&mut self, value: InferredValue, path: &mut Vec<String>) -> SchemaNode {
        match value {
            InferredValue::Unresolved => SchemaNode::Leaf(Leaf::Undefined),
            InferredValue::Error => SchemaNode::Leaf(Leaf::Error),
            InferredValue::ListMarker => SchemaNode::Leaf(Leaf::ListMarker),
            InferredValue::Scalar(s) => SchemaNode::Leaf(Leaf::Scalar(s)),
            InferredValue::Nested(observations) => {
                let mut mapping = SchemaMapping::new();
                for observation in observations {
                    self.insert(&mut mapping, observation, path);
                }
                SchemaNode::Mapping(mapping)
            }
            InferredValue::Sequence(items) => {
                let nodes = items
                    .into_iter()
                    .map(|item| self.value_to_node(item, path))
                    .collect();
                self.list_from_parts(nodes, path)
            }
        }
    }

    /// Insert `incoming` under `key`; `path` already ends with `key`
    fn merge_entry(
        &mut self,
        into: &mut SchemaMapping,
        key: String,
        incoming: SchemaNode,
        path: &mut Vec<String>,
    ) {
        let merged = match into.0.remove(&key) {
            Some(existing) => self.merge(existing, incoming, path),
            None => incoming,
        };
        into.0.insert(key, merged);
    }

    fn merge(
        &mut self,
        existing: SchemaNode,
        incoming: SchemaNode,
        path: &mut Vec<String>,
    ) -> SchemaNode {
        match (existing, incoming) {
            (SchemaNode::Mapping(a), SchemaNode::Mapping(b)) => {
                SchemaNode::Mapping(self.merge_mappings(a, b, path))
            }
            (SchemaNode::Leaf(old), SchemaNode::Leaf(new)) => {
                if old != new {
                    self.conflict(path, &old, &new);
                }
                SchemaNode::Leaf(new)
            }
            (SchemaNode::Mapping(m), SchemaNode::Leaf(_))
            | (SchemaNode::Leaf(_), SchemaNode::Mapping(m)) => SchemaNode::Mapping(m),
            // At least one side is a list
            (existing, incoming) => self.list_from_parts(vec![existing, incoming], path),
        }
    }

    fn merge_mappings(
        &mut self,
        mut into: SchemaMapping,
        from: SchemaMapping,
        path: &mut Vec<String>,
    ) -> SchemaMapping {
        for (key, node) in from.0 {
            path.push(key.clone());
            self.merge_entry(&mut into, key, node, path);
            path.pop();
        }
        into
    }

    /// Normalise list elements: merged mapping first, then distinct leaves
    fn list_from_parts(&mut self, nodes: Vec<SchemaNode>, path: &mut Vec<String>) -> SchemaNode {
        let mut mapping: Option<SchemaMapping> = None;
        let mut leaves: Vec<Leaf> = Vec::new();
        for node in nodes {
            self.collect_list_part(node, &mut mapping, &mut leaves, path);
        }

        let mut items = Vec::new();
        if let Some(mapping) = mapping.filter(|m| !m.is_empty()) {
            items.push(SchemaNode::Mapping(mapping));
        }
        items.extend(leaves.into_iter().map(SchemaNode::Leaf));
        SchemaNode::List(items)
    }

    fn collect_list_part(
        &mut self,
        node: SchemaNode,
        mapping: &mut Option<SchemaMapping>,
        leaves: &mut Vec<Leaf>,
        path: &mut Vec<String>,
    ) {
        match node {
            SchemaNode::List(items) => {
                for item in items {
                    self.collect_list_part(item, mapping, leaves, path);
                }
            }
            SchemaNode::Mapping(m) => {
                *mapping = Some(match mapping.take() {
                    Some(acc) => self.merge_mappings(acc, m, path),
                    None => m,
                });
            }
            SchemaNode::Leaf(leaf) => {
                if !leaves.contains(&leaf) {
                    leaves.push(leaf);
                }
            }
        }
    }

    fn conflict(&mut self, path: &[String], old: &Leaf, new: &Leaf) {
        let key = path.join(".");
        tracing::trace!(key = %key, %old, %new, "scalar conflict");
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::ScalarConflict,
            format!("{}: {} replaced by {}", key, old, new),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::{KeyPath, Scalar};
    use pretty_assertions::assert_eq;

    fn path(segments: &[&str]) -> KeyPath {
        segments.iter().copied().collect()
    }

    fn unresolved(segments: &[&str]) -> Observation {
        Observation::new(path(segments), InferredValue::Unresolved)
    }

    fn undefined() -> SchemaNode {
        SchemaNode::Leaf(Leaf::Undefined)
    }

    fn list_marker() -> SchemaNode {
        SchemaNode::Leaf(Leaf::ListMarker)
    }

    fn records(children: Vec<Observation>) -> InferredValue {
        InferredValue::Sequence(vec![InferredValue::Nested(children), InferredValue::ListMarker])
    }

    #[test]
    fn test_single_branch_tree() {
        let schema = SchemaBuilder::build(vec![unresolved(&["a", "b", "c"])]);
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(schema.lookup(&["a", "b", "c"]), Some(&undefined()));
    }

    #[test]
    fn test_mappings_merge_recursively() {
        let schema = SchemaBuilder::build(vec![
            unresolved(&["user", "name"]),
            unresolved(&["user", "address", "city"]),
            unresolved(&["user", "address", "zip"]),
            unresolved(&["site"]),
        ]);
        let user = schema.get("user").and_then(SchemaNode::as_mapping).unwrap();
        assert_eq!(user.keys().collect::<Vec<_>>(), vec!["address", "name"]);
        assert_eq!(schema.lookup(&["user", "address", "zip"]), Some(&undefined()));
        assert_eq!(schema.get("site"), Some(&undefined()));
    }

    #[test]
    fn test_list_of_records() {
        let schema = SchemaBuilder::build(vec![Observation::new(
            path(&["items"]),
            records(vec![unresolved(&["name"]), unresolved(&["age"])]),
        )]);
        let items = schema.get("items").and_then(SchemaNode::as_list).unwrap();
        assert_eq!(items.len(), 2);
        let element = items[0].as_mapping().unwrap();
        assert_eq!(element.keys().collect::<Vec<_>>(), vec!["age", "name"]);
        assert_eq!(items[1], list_marker());
    }

    #[test]
    fn test_list_of_scalars_stays_scalar() {
        let schema = SchemaBuilder::build(vec![Observation::new(
            path(&["tags"]),
            InferredValue::Sequence(vec![InferredValue::Unresolved, InferredValue::ListMarker]),
        )]);
        assert_eq!(
            schema.get("tags"),
            Some(&SchemaNode::List(vec![undefined(), list_marker()]))
        );
    }

    #[test]
    fn test_list_merge_collapses_duplicates() {
        let scalars = Observation::new(
            path(&["tags"]),
            InferredValue::Sequence(vec![InferredValue::Unresolved, InferredValue::ListMarker]),
        );
        let schema = SchemaBuilder::build(vec![unresolved(&["tags"]), scalars.clone(), scalars]);
        assert_eq!(
            schema.get("tags"),
            Some(&SchemaNode::List(vec![undefined(), list_marker()]))
        );
    }

    #[test]
    fn test_list_merge_mapping_first() {
        let schema = SchemaBuilder::build(vec![
            Observation::new(
                path(&["xs"]),
                InferredValue::Sequence(vec![InferredValue::Unresolved, InferredValue::ListMarker]),
            ),
            Observation::new(path(&["xs"]), records(vec![unresolved(&["a"])])),
            Observation::new(path(&["xs"]), records(vec![unresolved(&["b"])])),
        ]);
        let items = schema.get("xs").and_then(SchemaNode::as_list).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0].as_mapping().unwrap().keys().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(items[1], undefined());
        assert_eq!(items[2], list_marker());
    }

    #[test]
    fn test_scalar_conflict_last_wins() {
        let mut builder = SchemaBuilder::new();
        builder.add(Observation::new(
            path(&["port"]),
            InferredValue::Scalar(Scalar::Int(80)),
        ));
        builder.add(Observation::new(
            path(&["port"]),
            InferredValue::Scalar(Scalar::Int(8080)),
        ));
        let (schema, diagnostics) = builder.finish();
        assert_eq!(
            schema.get("port"),
            Some(&SchemaNode::Leaf(Leaf::Scalar(Scalar::Int(8080))))
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ScalarConflict);
        assert_eq!(diagnostics[0].message, "port: 80 replaced by 8080");
    }

    #[test]
    fn test_equal_leaves_do_not_conflict() {
        let mut builder = SchemaBuilder::new();
        builder.extend(vec![unresolved(&["a"]), unresolved(&["a"])]);
        assert!(builder.diagnostics().is_empty());
    }

    #[test]
    fn test_keys_independent_of_order() {
        let forward =
            SchemaBuilder::build(vec![unresolved(&["user"]), unresolved(&["user", "name"])]);
        let backward =
            SchemaBuilder::build(vec![unresolved(&["user", "name"]), unresolved(&["user"])]);
        assert_eq!(forward, backward);
        assert_eq!(forward.lookup(&["user", "name"]), Some(&undefined()));
    }

    #[test]
    fn test_nested_value_builds_mapping() {
        let schema = SchemaBuilder::build(vec![Observation::new(
            path(&["cfg"]),
            InferredValue::Nested(vec![
                Observation::new(path(&["db", "port"]), InferredValue::Scalar(Scalar::Int(5432))),
                Observation::new(path(&["name"]), InferredValue::Scalar(Scalar::Str("app".into()))),
            ]),
        )]);
        assert_eq!(
            schema.lookup(&["cfg", "db", "port"]),
            Some(&SchemaNode::Leaf(Leaf::Scalar(Scalar::Int(5432))))
        );
        assert!(schema.lookup(&["cfg", "name"]).is_some());
    }

    #[test]
    fn test_conflict_path_inside_nested_value() {
        let mut builder = SchemaBuilder::new();
        builder.add(Observation::new(
            path(&["cfg"]),
            InferredValue::Nested(vec![Observation::new(
                path(&["mode"]),
                InferredValue::Scalar(Scalar::Str("a".into())),
            )]),
        ));
        builder.add(Observation::new(
            path(&["cfg", "mode"]),
            InferredValue::Scalar(Scalar::Str("b".into())),
        ));
        let (_, diagnostics) = builder.finish();
        assert_eq!(diagnostics[0].message, "cfg.mode: \"a\" replaced by \"b\"");
    }
}
