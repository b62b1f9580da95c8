//! Template graph resolution - discovers every template reachable from a root

use std::collections::{BTreeMap, BTreeSet};

use crate::parser::ast::{Const, Expr, Span, Spanned, Stmt, Template};
use crate::parser::parse;
use crate::source::TemplateSource;
use crate::walker::{Diagnostic, DiagnosticKind};
use crate::SchemaError;

/// Names of every template reachable from the root, root included
pub type KnownTemplates = BTreeSet<String>;

/// A template reference found in `include`, `extends` or `import`
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateReference {
    /// A string constant naming the template
    Static {
        name: String,
        /// `include ... ignore missing`
        optional: bool,
        span: Span,
    },
    /// Any other expression; the rendering is kept for diagnostics
    Dynamic { expr: String, span: Span },
}

/// A loaded and parsed template
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub name: String,
    pub text: String,
    pub tree: Template,
}

/// Every reachable template, parsed
#[derive(Debug, Clone)]
pub struct TemplateGraph {
    root: String,
    templates: BTreeMap<String, ParsedTemplate>,
    diagnostics: Vec<Diagnostic>,
}

impl TemplateGraph {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn known_templates(&self) -> KnownTemplates {
        self.templates.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ParsedTemplate> {
        self.templates.get(name)
    }

    /// Templates in name order
    pub fn templates(&self) -> impl Iterator<Item = &ParsedTemplate> {
        self.templates.values()
    }

    /// Dynamic references and missing optional includes
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Load `root` and everything it references, transitively
///
/// Each template is loaded and parsed exactly once, so reference cycles
/// terminate. A missing template or a syntax error anywhere aborts the
/// resolution; a partial graph is never returned.
pub fn resolve<S>(root: &str, source: &S) -> Result<TemplateGraph, SchemaError>
where
    S: TemplateSource + ?Sized,
{
    let mut resolver = Resolver {
        source,
        templates: BTreeMap::new(),
        diagnostics: Vec::new(),
    };
    resolver.visit(root)?;

    tracing::debug!(
        root,
        templates = resolver.templates.len(),
        "resolved template graph"
    );

    Ok(TemplateGraph {
        root: root.to_string(),
        templates: resolver.templates,
        diagnostics: resolver.diagnostics,
    })
}

struct Resolver<'s, S: ?Sized> {
    source: &'s S,
    templates: BTreeMap<String, ParsedTemplate>,
    diagnostics: Vec<Diagnostic>,
}

impl<S: TemplateSource + ?Sized> Resolver<'_, S> {
    fn visit(&mut self, name: &str) -> Result<(), SchemaError> {
        let text = self.source.get_source(name)?;
        let tree = parse(&text).map_err(|errors| SchemaError::Syntax {
            template: name.to_string(),
            text: text.clone(),
            errors,
        })?;
        let references = find_referenced_templates(&tree);

        // Known before descending, so cycles stop here
        self.templates.insert(
            name.to_string(),
            ParsedTemplate {
                name: name.to_string(),
                text,
                tree,
            },
        );

        for reference in references {
            match reference {
                TemplateReference::Static {
                    name: target,
                    optional,
                    span,
                } => {
                    if self.templates.contains_key(&target) {
                        continue;
                    }
                    tracing::trace!(from = name, to = %target, "following reference");
                    match self.visit(&target) {
                        Err(SchemaError::SourceNotFound { name: missing })
                            if optional && missing == target =>
                        {
                            self.diagnostics.push(
                                Diagnostic::new(
                                    DiagnosticKind::MissingOptional,
                                    format!("optional template {} not found", target),
                                )
                                .with_template(name)
                                .with_span(span),
                            );
                        }
                        other => other?,
                    }
                }
                TemplateReference::Dynamic { expr, span } => {
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DynamicReference,
                            format!("template name is not a constant: {}", expr),
                        )
                        .with_template(name)
                        .with_span(span),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Collect template references from a parsed template
///
/// Statement bodies are searched at every depth (loops, conditionals,
/// macros, blocks); expressions are not.
pub fn find_referenced_templates(template: &Template) -> Vec<TemplateReference> {
    let mut references = Vec::new();
    collect_from_body(&template.body, &mut references);
    references
}

fn collect_from_body(body: &[Spanned<Stmt>], references: &mut Vec<TemplateReference>) {
    for stmt in body {
        match &stmt.node {
            Stmt::Include {
                template,
                ignore_missing,
                ..
            } => collect_names(template, *ignore_missing, references),
            Stmt::Extends { template }
            | Stmt::Import { template, .. }
            | Stmt::FromImport { template, .. } => collect_names(template, false, references),
            Stmt::For { body, else_, .. } => {
                collect_from_body(body, references);
                collect_from_body(else_, references);
            }
            Stmt::If {
                body, elif_, else_, ..
            } => {
                collect_from_body(body, references);
                for branch in elif_ {
                    collect_from_body(&branch.body, references);
                }
                collect_from_body(else_, references);
            }
            Stmt::AssignBlock { body, .. }
            | Stmt::Macro { body, .. }
            | Stmt::CallBlock { body, .. }
            | Stmt::FilterBlock { body, .. }
            | Stmt::With { body, .. }
            | Stmt::Block { body, .. }
            | Stmt::Autoescape { body, .. } => collect_from_body(body, references),
            Stmt::Output(_) | Stmt::Assign { .. } => {}
        }
    }
}

/// A template name expression: a string, or a list/tuple of strings
fn collect_names(expr: &Spanned<Expr>, optional: bool, references: &mut Vec<TemplateReference>) {
    match &expr.node {
        Expr::Const(Const::Str(name)) => references.push(TemplateReference::Static {
            name: name.clone(),
            optional,
            span: expr.span.clone(),
        }),
        Expr::List(items) | Expr::Tuple { items, .. } => {
            for item in items {
                match &item.node {
                    Expr::Const(Const::Str(_)) => collect_names(item, optional, references),
                    other => references.push(TemplateReference::Dynamic {
                        expr: other.to_string(),
                        span: item.span.clone(),
                    }),
                }
            }
        }
        other => references.push(TemplateReference::Dynamic {
            expr: other.to_string(),
            span: expr.span.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn names(graph: &TemplateGraph) -> Vec<String> {
        graph.known_templates().into_iter().collect()
    }

    #[test]
    fn test_single_template() {
        let source = MemorySource::new().with_template("root.html", "{{ x }}");
        let graph = resolve("root.html", &source).expect("Should resolve");
        assert_eq!(names(&graph), vec!["root.html"]);
        assert_eq!(graph.root(), "root.html");
        assert!(graph.get("root.html").is_some());
    }

    #[test]
    fn test_transitive_references() {
        let source = MemorySource::new()
            .with_template("page.html", "{% extends 'base.html' %}{% import 'macros.html' as m %}")
            .with_template("base.html", "{% include 'nav.html' %}")
            .with_template("nav.html", "{% from 'macros.html' import link %}")
            .with_template("macros.html", "{% macro link(u) %}{{ u }}{% endmacro %}");
        let graph = resolve("page.html", &source).expect("Should resolve");
        assert_eq!(
            names(&graph),
            vec!["base.html", "macros.html", "nav.html", "page.html"]
        );
    }

    #[test]
    fn test_reference_inside_autoescape() {
        let source = MemorySource::new()
            .with_template(
                "root.html",
                "{% autoescape false %}{% include 'inner.html' %}{% endautoescape %}",
            )
            .with_template("inner.html", "{{ x }}");
        let graph = resolve("root.html", &source).expect("Should resolve");
        assert_eq!(names(&graph), vec!["inner.html", "root.html"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let source = MemorySource::new()
            .with_template("a.html", "{% include 'b.html' %}")
            .with_template("b.html", "{% include 'a.html' %}{% include 'b.html' %}");
        let graph = resolve("a.html", &source).expect("Should resolve");
        assert_eq!(names(&graph), vec!["a.html", "b.html"]);
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let source = MemorySource::new().with_template("root.html", "{% include 'nope.html' %}");
        let result = resolve("root.html", &source);
        assert!(matches!(
            result,
            Err(SchemaError::SourceNotFound { name }) if name == "nope.html"
        ));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let source = MemorySource::new();
        assert!(matches!(
            resolve("root.html", &source),
            Err(SchemaError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_ignore_missing_is_tolerated() {
        let source = MemorySource::new().with_template(
            "root.html",
            "{% include 'optional.html' ignore missing %}{{ x }}",
        );
        let graph = resolve("root.html", &source).expect("Should resolve");
        assert_eq!(names(&graph), vec!["root.html"]);
        assert_eq!(graph.diagnostics().len(), 1);
        assert_eq!(graph.diagnostics()[0].kind, DiagnosticKind::MissingOptional);
        assert_eq!(graph.diagnostics()[0].template.as_deref(), Some("root.html"));
    }

    #[test]
    fn test_missing_inside_optional_is_still_fatal() {
        let source = MemorySource::new()
            .with_template("root.html", "{% include 'opt.html' ignore missing %}")
            .with_template("opt.html", "{% include 'gone.html' %}");
        assert!(matches!(
            resolve("root.html", &source),
            Err(SchemaError::SourceNotFound { name }) if name == "gone.html"
        ));
    }

    #[test]
    fn test_syntax_error_names_template() {
        let source = MemorySource::new()
            .with_template("root.html", "{% include 'broken.html' %}")
            .with_template("broken.html", "{% if x %}never closed");
        match resolve("root.html", &source) {
            Err(SchemaError::Syntax {
                template, errors, ..
            }) => {
                assert_eq!(template, "broken.html");
                assert!(!errors.is_empty());
            }
            other => panic!("Expected Syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_reference_is_reported() {
        let source = MemorySource::new()
            .with_template(
                "root.html",
                "{% include theme ~ '.html' %}{% include ['a.html', other] %}",
            )
            .with_template("a.html", "");
        let graph = resolve("root.html", &source).expect("Should resolve");
        assert_eq!(names(&graph), vec!["a.html", "root.html"]);
        let kinds: Vec<DiagnosticKind> = graph.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::DynamicReference, DiagnosticKind::DynamicReference]
        );
    }

    #[test]
    fn test_references_inside_bodies() {
        let tree = parse(concat!(
            "{% for x in xs %}{% include 'row.html' %}{% endfor %}",
            "{% if a %}{% elif b %}{% include 'elif.html' %}{% else %}{% include 'else.html' %}{% endif %}",
            "{% block body %}{% include 'block.html' %}{% endblock %}",
            "{% macro m() %}{% include 'macro.html' %}{% endmacro %}",
        ))
        .expect("Should parse");
        let found: Vec<String> = find_referenced_templates(&tree)
            .into_iter()
            .filter_map(|r| match r {
                TemplateReference::Static { name, .. } => Some(name),
                TemplateReference::Dynamic { .. } => None,
            })
            .collect();
        assert_eq!(
            found,
            vec!["row.html", "elif.html", "else.html", "block.html", "macro.html"]
        );
    }
}
