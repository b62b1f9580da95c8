//! Template graph: the root template plus everything it references
//!
//! `include`, `extends`, `import` and `from ... import` statements are
//! followed through a [`TemplateSource`](crate::source::TemplateSource)
//! until no new template names turn up.

mod resolver;

pub use resolver::{
    find_referenced_templates, resolve, KnownTemplates, ParsedTemplate, TemplateGraph,
    TemplateReference,
};
