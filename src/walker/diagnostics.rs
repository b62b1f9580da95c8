//! Non-fatal findings collected while resolving, walking and merging.

use std::fmt;

use crate::parser::ast::Span;

/// A note about something the inference could not model exactly
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Template the finding belongs to, when known
    pub template: Option<String>,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Location inside `template`, when the finding points at a node
    pub span: Option<Span>,
}

/// Category of diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A statement or expression kind the walker does not model
    UnclassifiedConstruct,
    /// A template reference that is not a string constant
    DynamicReference,
    /// `include ... ignore missing` of a template that does not exist
    MissingOptional,
    /// Two different scalar values observed for the same key
    ScalarConflict,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::UnclassifiedConstruct => write!(f, "unclassified"),
            DiagnosticKind::DynamicReference => write!(f, "dynamic-reference"),
            DiagnosticKind::MissingOptional => write!(f, "missing-optional"),
            DiagnosticKind::ScalarConflict => write!(f, "scalar-conflict"),
        }
    }
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            template: None,
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        match (&self.template, &self.span) {
            (Some(template), Some(span)) => {
                write!(f, " {}@{}..{}", template, span.start, span.end)?
            }
            (Some(template), None) => write!(f, " {}", template)?,
            (None, Some(span)) => write!(f, " @{}..{}", span.start, span.end)?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)
    }
}
