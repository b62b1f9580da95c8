//! Core types produced by the syntax-tree walker

use std::fmt;

use crate::parser::ast::Const;

/// Chain of nested lookups, outermost first: `user.address.city`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct KeyPath(pub Vec<String>);

impl KeyPath {
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Append a segment at the innermost end
    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    /// The remainder after `prefix`, if this path starts with it
    pub fn strip_prefix(&self, prefix: &[String]) -> Option<KeyPath> {
        self.0
            .strip_prefix(prefix)
            .map(|rest| KeyPath(rest.to_vec()))
    }
}

impl<S: Into<String>> FromIterator<S> for KeyPath {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        KeyPath(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A concrete literal value seen in a template
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl From<&Const> for Scalar {
    fn from(c: &Const) -> Self {
        match c {
            Const::Str(s) => Scalar::Str(s.clone()),
            Const::Int(n) => Scalar::Int(*n),
            Const::Float(n) => Scalar::Float(*n),
            Const::Bool(b) => Scalar::Bool(*b),
            Const::None => Scalar::None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "{:?}", s),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{:?}", n),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::None => write!(f, "none"),
        }
    }
}

/// What is known about the value found at a key path
#[derive(Debug, Clone, PartialEq)]
pub enum InferredValue {
    /// Read, but nothing is known about its value
    Unresolved,
    /// Structurally invalid usage
    Error,
    /// Stands for "more elements like the previous one"
    ListMarker,
    Scalar(Scalar),
    /// A mapping described by further observations relative to this key
    Nested(Vec<Observation>),
    /// A list shape: element descriptions followed by `ListMarker`
    Sequence(Vec<InferredValue>),
}

/// One usage of an external variable
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub path: KeyPath,
    pub value: InferredValue,
}

impl Observation {
    pub fn new(path: KeyPath, value: InferredValue) -> Self {
        Self { path, value }
    }

    /// `name` read with no known value
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::new(KeyPath::single(name), InferredValue::Unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix() {
        let path: KeyPath = ["item", "name"].into_iter().collect();
        assert_eq!(
            path.strip_prefix(&["item".to_string()]),
            Some(KeyPath::single("name"))
        );
        assert_eq!(path.strip_prefix(&["other".to_string()]), None);
        assert_eq!(path.strip_prefix(&path.0), Some(KeyPath::default()));
    }

    #[test]
    fn test_key_path_display() {
        let path: KeyPath = ["a", "b", "c"].into_iter().collect();
        assert_eq!(path.to_string(), "a.b.c");
    }

    #[test]
    fn test_scalar_from_const() {
        assert_eq!(Scalar::from(&Const::Int(3)), Scalar::Int(3));
        assert_eq!(Scalar::from(&Const::Str("x".into())), Scalar::Str("x".into()));
        assert_eq!(Scalar::from(&Const::None).to_string(), "none");
    }
}
