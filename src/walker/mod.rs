//! Syntax-tree walker
//!
//! Walks a parsed template and reports every place an external variable is
//! read as an [`Observation`]: a key path plus what is known about the value
//! found there. Constructs the walker does not model produce no observation
//! and are reported as [`Diagnostic`]s instead.
//!
//! # Example
//!
//! ```rust
//! use jinja_schema::parser::parse;
//! use jinja_schema::walker::{KeyPath, Walker};
//!
//! let template = parse("{{ user.name }}").unwrap();
//! let observations = Walker::default().walk(&template);
//! assert_eq!(observations[0].path, ["user", "name"].into_iter().collect::<KeyPath>());
//! ```

mod diagnostics;
mod types;

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use types::{InferredValue, KeyPath, Observation, Scalar};

use std::fmt;

use crate::parser::ast::*;

/// Name Jinja binds inside every `for` body
const LOOP_HELPER: &str = "loop";

/// Switches for the walker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Treat `{% block %}` as a plain container
    pub descend_blocks: bool,
}

/// Collects observations from template trees
///
/// Diagnostics accumulate across calls to [`Walker::walk`].
#[derive(Debug, Default)]
pub struct Walker {
    options: WalkOptions,
    template: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Walker {
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            template: None,
            diagnostics: Vec::new(),
        }
    }

    /// Name used to tag diagnostics from subsequent walks
    pub fn set_template(&mut self, name: impl Into<String>) {
        self.template = Some(name.into());
    }

    /// Walk a whole template
    pub fn walk(&mut self, template: &Template) -> Vec<Observation> {
        let observations = self.walk_body(&template.body);
        tracing::debug!(
            template = self.template.as_deref().unwrap_or("<anonymous>"),
            observations = observations.len(),
            "walked template"
        );
        observations
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn walk_body(&mut self, body: &[Spanned<Stmt>]) -> Vec<Observation> {
        let mut observations = Vec::new();
        for stmt in body {
            observations.extend(self.walk_stmt(stmt));
        }
        observations
    }

    fn walk_stmt(&mut self, stmt: &Spanned<Stmt>) -> Vec<Observation> {
        match &stmt.node {
            Stmt::Output(items) => {
                let mut observations = Vec::new();
                for item in items {
                    observations.extend(self.walk_expr(item));
                }
                observations
            }
            Stmt::For {
                target,
                iter,
                filter,
                recursive: _,
                body,
                else_,
            } => self.walk_for(target, iter, filter.as_ref(), body, else_),
            Stmt::If {
                test,
                body,
                elif_,
                else_,
            } => {
                let mut observations = self.walk_test(test);
                observations.extend(self.walk_body(body));
                for branch in elif_ {
                    observations.extend(self.walk_test(&branch.test));
                    observations.extend(self.walk_body(&branch.body));
                }
                observations.extend(self.walk_body(else_));
                observations
            }
            Stmt::Assign { target, node } => self.walk_assign(target, node, &stmt.span),
            // References are followed by the resolver; the bodies are walked on their own
            Stmt::Include { .. }
            | Stmt::Extends { .. }
            | Stmt::Import { .. }
            | Stmt::FromImport { .. } => Vec::new(),
            Stmt::Block { body, .. } if self.options.descend_blocks => self.walk_body(body),
            Stmt::Autoescape { enabled, body } => {
                let mut observations = self.walk_expr(enabled);
                observations.extend(self.walk_body(body));
                observations
            }
            Stmt::AssignBlock { .. }
            | Stmt::Macro { .. }
            | Stmt::CallBlock { .. }
            | Stmt::FilterBlock { .. }
            | Stmt::With { .. }
            | Stmt::Block { .. } => {
                self.unclassified(stmt.node.kind_name(), stmt.node.summary(), &stmt.span);
                Vec::new()
            }
        }
    }

    fn walk_expr(&mut self, expr: &Spanned<Expr>) -> Vec<Observation> {
        match &expr.node {
            Expr::Name {
                name,
                ctx: Ctx::Load,
            } => vec![Observation::unresolved(name.clone())],
            Expr::Name {
                ctx: Ctx::Store, ..
            } => Vec::new(),
            Expr::Getattr { node, attr } => {
                let mut observations = self.walk_attr_base(node);
                for observation in &mut observations {
                    observation.path.push(attr.clone());
                }
                observations
            }
            Expr::Const(_) | Expr::TemplateData(_) => Vec::new(),
            Expr::NsRef { .. }
            | Expr::Getitem { .. }
            | Expr::Slice { .. }
            | Expr::Tuple { .. }
            | Expr::List(_)
            | Expr::Dict(_)
            | Expr::Compare { .. }
            | Expr::BinExpr { .. }
            | Expr::UnaryExpr { .. }
            | Expr::Concat(_)
            | Expr::CondExpr { .. }
            | Expr::Filter { .. }
            | Expr::Test { .. }
            | Expr::Call { .. } => {
                self.unclassified(expr.node.kind_name(), &expr.node, &expr.span);
                Vec::new()
            }
        }
    }

    /// The object an attribute is read from
    fn walk_attr_base(&mut self, node: &Spanned<Expr>) -> Vec<Observation> {
        match &node.node {
            // Reading through an assignment target
            Expr::Name {
                name,
                ctx: Ctx::Store,
            } => vec![Observation::new(
                KeyPath::single(name.clone()),
                InferredValue::Error,
            )],
            _ => self.walk_expr(node),
        }
    }

    /// Test of an `if`/`elif` or a loop filter
    fn walk_test(&mut self, test: &Spanned<Expr>) -> Vec<Observation> {
        match &test.node {
            Expr::Compare { expr, .. } => self.walk_expr(expr),
            Expr::UnaryExpr {
                op: UnaryOp::Not,
                node,
            } => self.walk_test(node),
            Expr::BinExpr {
                op: BinOp::And | BinOp::Or,
                left,
                right,
            } => {
                let mut observations = self.walk_test(left);
                observations.extend(self.walk_test(right));
                observations
            }
            // `x is defined`
            Expr::Test { node, .. } => self.walk_expr(node),
            _ => self.walk_expr(test),
        }
    }

    fn walk_for(
        &mut self,
        target: &Spanned<Expr>,
        iter: &Spanned<Expr>,
        filter: Option<&Spanned<Expr>>,
        body: &[Spanned<Stmt>],
        else_: &[Spanned<Stmt>],
    ) -> Vec<Observation> {
        let iterables = self.walk_expr(iter);
        let targets = self.target_names(target);

        let mut inner = Vec::new();
        if let Some(filter) = filter {
            inner.extend(self.walk_test(filter));
        }
        inner.extend(self.walk_body(body));

        let mut observations = Vec::new();
        let mut children = Vec::new();
        for observation in inner {
            let rest = targets
                .iter()
                .find_map(|t| observation.path.strip_prefix(std::slice::from_ref(t)));
            match rest {
                // Reading the loop variable itself says nothing about its keys
                Some(rest) if rest.is_empty() => {}
                Some(rest) => children.push(Observation::new(rest, observation.value)),
                None => match observation.path.first() {
                    None | Some(LOOP_HELPER) => {}
                    Some(_) => observations.push(observation),
                },
            }
        }
        observations.extend(self.walk_body(else_));

        for iterable in iterables {
            let element = if children.is_empty() {
                iterable.value
            } else {
                InferredValue::Nested(children.clone())
            };
            observations.push(Observation::new(
                iterable.path,
                InferredValue::Sequence(vec![element, InferredValue::ListMarker]),
            ));
        }
        observations
    }

    /// Names bound by a loop target: `x`, or `k, v`
    fn target_names(&mut self, target: &Spanned<Expr>) -> Vec<String> {
        match &target.node {
            Expr::Name { name, .. } => vec![name.clone()],
            Expr::Tuple { items, .. } => {
                let mut names = Vec::new();
                for item in items {
                    names.extend(self.target_names(item));
                }
                names
            }
            other => {
                self.unclassified(other.kind_name(), other, &target.span);
                Vec::new()
            }
        }
    }

    fn walk_assign(
        &mut self,
        target: &Spanned<Expr>,
        node: &Spanned<Expr>,
        span: &Span,
    ) -> Vec<Observation> {
        let Expr::Name {
            name,
            ctx: Ctx::Store,
        } = &target.node
        else {
            self.unclassified(
                "Assign",
                format!("set {} = {}", target.node, node.node),
                span,
            );
            return Vec::new();
        };

        let value = self.assigned_value(node);
        vec![Observation::new(KeyPath::single(name.clone()), value)]
    }

    fn assigned_value(&mut self, node: &Spanned<Expr>) -> InferredValue {
        match &node.node {
            Expr::Const(c) => InferredValue::Scalar(Scalar::from(c)),
            // Carried through as a placeholder naming the source variable
            Expr::Name {
                name,
                ctx: Ctx::Load,
            } => InferredValue::Scalar(Scalar::Str(name.clone())),
            Expr::Dict(pairs) => InferredValue::Nested(self.dict_observations(pairs)),
            other => {
                self.unclassified(other.kind_name(), other, &node.span);
                InferredValue::Unresolved
            }
        }
    }

    fn dict_observations(&mut self, pairs: &[Pair]) -> Vec<Observation> {
        let mut observations = Vec::new();
        for pair in pairs {
            let key = match &pair.key.node {
                Expr::Const(Const::Str(s)) => s.clone(),
                Expr::Const(c) => c.to_string(),
                other => {
                    let rendering = format!("{}: {}", other, pair.value.node);
                    self.unclassified("Pair", rendering, &pair.key.span);
                    continue;
                }
            };
            let value = self.assigned_value(&pair.value);
            observations.push(Observation::new(KeyPath::single(key), value));
        }
        observations
    }

    fn unclassified(&mut self, kind: &str, rendering: impl fmt::Display, span: &Span) {
        let message = format!("ignoring {}: {}", kind, rendering);
        tracing::trace!(template = ?self.template, "{}", message);
        let mut diagnostic =
            Diagnostic::new(DiagnosticKind::UnclassifiedConstruct, message).with_span(span.clone());
        if let Some(template) = &self.template {
            diagnostic = diagnostic.with_template(template.clone());
        }
        self.diagnostics.push(diagnostic);
    }
}
