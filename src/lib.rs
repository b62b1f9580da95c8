//! jinja-schema - infer the data a Jinja template expects
//!
//! This library follows `include`/`extends`/`import` from a root template,
//! parses every template it finds, walks the trees for variable reads and
//! folds them into one hierarchical schema, without rendering anything.
//!
//! # Example
//!
//! ```rust
//! use jinja_schema::infer;
//! use jinja_schema::source::MemorySource;
//!
//! let source = MemorySource::new().with_template(
//!     "page.html",
//!     "{% for item in items %}{{ item.name }}{% endfor %}{{ user.email }}",
//! );
//! let inference = infer("page.html", &source).unwrap();
//!
//! assert!(inference.schema.lookup(&["user", "email"]).is_some());
//! assert!(inference.schema.get("items").unwrap().as_list().is_some());
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod schema;
pub mod source;
pub mod template;
pub mod walker;

pub use config::{InferConfig, Markers, Settings};
pub use error::ParseError;
pub use parser::{parse, Template};
pub use schema::{Leaf, SchemaBuilder, SchemaMapping, SchemaNode};
pub use source::{FileSystemSource, MemorySource, SourceError, TemplateSource};
pub use template::{resolve, KnownTemplates, TemplateGraph};
pub use walker::{Diagnostic, DiagnosticKind, Observation, WalkOptions, Walker};

use thiserror::Error;

/// Errors that abort an inference
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A referenced template does not exist
    #[error("template not found: {name}")]
    SourceNotFound { name: String },

    /// A template exists but could not be loaded
    #[error(transparent)]
    Source(SourceError),

    /// A template failed to parse
    #[error("syntax error in template {template}: {}", format_parse_errors(.errors))]
    Syntax {
        template: String,
        /// Source text, for rendering the errors with context
        text: String,
        errors: Vec<ParseError>,
    },
}

impl From<SourceError> for SchemaError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound { name } => SchemaError::SourceNotFound { name },
            other => SchemaError::Source(other),
        }
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of inferring the schema of a template graph
#[derive(Debug, Clone)]
pub struct Inference {
    /// Every template that contributed
    pub templates: KnownTemplates,
    pub schema: SchemaMapping,
    /// Resolver, walker and merge findings, in that order
    pub diagnostics: Vec<Diagnostic>,
    /// Markers used when rendering the schema
    pub markers: Markers,
}

impl Inference {
    /// Render the schema as YAML using the configured markers
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        self.schema.to_yaml_string(&self.markers)
    }
}

/// Infer the schema of `root` with default configuration
pub fn infer<S>(root: &str, source: &S) -> Result<Inference, SchemaError>
where
    S: TemplateSource + ?Sized,
{
    infer_with_config(root, source, &InferConfig::default())
}

/// Infer the schema of `root` with custom configuration
///
/// # Example
///
/// ```rust
/// use jinja_schema::{infer_with_config, InferConfig, MemorySource};
///
/// let source = MemorySource::new()
///     .with_template("child.html", "{% extends 'base.html' %}{% block main %}{{ title }}{% endblock %}")
///     .with_template("base.html", "{% block main %}{% endblock %}");
///
/// let config = InferConfig::new().with_descend_blocks(true);
/// let inference = infer_with_config("child.html", &source, &config).unwrap();
/// assert_eq!(inference.templates.len(), 2);
/// assert!(inference.schema.get("title").is_some());
/// ```
pub fn infer_with_config<S>(
    root: &str,
    source: &S,
    config: &InferConfig,
) -> Result<Inference, SchemaError>
where
    S: TemplateSource + ?Sized,
{
    let graph = template::resolve(root, source)?;

    let mut walker = Walker::new(WalkOptions {
        descend_blocks: config.descend_blocks,
    });
    let mut builder = SchemaBuilder::new();
    for parsed in graph.templates() {
        walker.set_template(parsed.name.as_str());
        builder.extend(walker.walk(&parsed.tree));
    }
    let (schema, conflicts) = builder.finish();

    let mut diagnostics = graph.diagnostics().to_vec();
    diagnostics.extend(walker.into_diagnostics());
    diagnostics.extend(conflicts);

    tracing::debug!(
        root,
        templates = graph.templates().count(),
        diagnostics = diagnostics.len(),
        "inference complete"
    );

    Ok(Inference {
        templates: graph.known_templates(),
        schema,
        diagnostics,
        markers: config.markers.clone(),
    })
}
