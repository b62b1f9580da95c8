//! Template source providers
//!
//! A [`TemplateSource`] maps a template name (as written in `include`,
//! `extends` and `import` statements) to its source text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while loading template text
#[derive(Debug, Error)]
pub enum SourceError {
    /// No search location has a template with this name
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// The template exists but could not be read
    #[error("error reading template {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies template text by name
pub trait TemplateSource {
    fn get_source(&self, name: &str) -> Result<String, SourceError>;
}

impl<T: TemplateSource + ?Sized> TemplateSource for &T {
    fn get_source(&self, name: &str) -> Result<String, SourceError> {
        (**self).get_source(name)
    }
}

/// Loads templates from an ordered list of directories
#[derive(Debug, Clone, Default)]
pub struct FileSystemSource {
    search_paths: Vec<PathBuf>,
}

impl FileSystemSource {
    pub fn new<P: Into<PathBuf>>(search_paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Directories searched, in order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Turn a template name into a relative path
    ///
    /// Names always use `/`. Segments that are empty or `.` are dropped and
    /// any `..` makes the name unloadable.
    fn split_template_path(name: &str) -> Option<PathBuf> {
        let mut path = PathBuf::new();
        for segment in name.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s if s.contains(std::path::MAIN_SEPARATOR) => return None,
                s => path.push(s),
            }
        }
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }

    /// Resolve a template name to the first existing file
    pub fn resolve_path(&self, name: &str) -> Option<PathBuf> {
        let relative = Self::split_template_path(name)?;
        self.search_paths
            .iter()
            .map(|base| base.join(&relative))
            .find(|candidate| candidate.is_file())
    }
}

impl TemplateSource for FileSystemSource {
    fn get_source(&self, name: &str) -> Result<String, SourceError> {
        let path = self.resolve_path(name).ok_or_else(|| SourceError::NotFound {
            name: name.to_string(),
        })?;
        tracing::trace!(template = name, path = %path.display(), "loading template");
        read_template(name, &path)
    }
}

fn read_template(name: &str, path: &Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        name: name.to_string(),
        source,
    })
}

/// Templates held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    templates: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl<N: Into<String>, S: Into<String>> FromIterator<(N, S)> for MemorySource {
    fn from_iter<T: IntoIterator<Item = (N, S)>>(iter: T) -> Self {
        Self {
            templates: iter
                .into_iter()
                .map(|(name, source)| (name.into(), source.into()))
                .collect(),
        }
    }
}

impl TemplateSource for MemorySource {
    fn get_source(&self, name: &str) -> Result<String, SourceError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "jinja-schema-source-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn test_memory_source_lookup() {
        let source = MemorySource::new().with_template("a.html", "{{ x }}");
        assert_eq!(source.get_source("a.html").unwrap(), "{{ x }}");
        assert!(matches!(
            source.get_source("b.html"),
            Err(SourceError::NotFound { name }) if name == "b.html"
        ));
    }

    #[test]
    fn test_memory_source_from_iter() {
        let source: MemorySource = [("a", "1"), ("b", "2")].into_iter().collect();
        assert!(source.contains("a"));
        assert_eq!(source.get_source("b").unwrap(), "2");
    }

    #[test]
    fn test_split_rejects_parent_segments() {
        assert!(FileSystemSource::split_template_path("../secret").is_none());
        assert!(FileSystemSource::split_template_path("a/../../b").is_none());
        assert!(FileSystemSource::split_template_path("").is_none());
        assert_eq!(
            FileSystemSource::split_template_path("./a//b.html"),
            Some(PathBuf::from("a").join("b.html"))
        );
    }

    #[test]
    fn test_file_system_search_order() {
        let first = temp_dir("first");
        let second = temp_dir("second");
        std::fs::write(second.join("page.html"), "second").unwrap();
        std::fs::write(second.join("only.html"), "only").unwrap();
        std::fs::write(first.join("page.html"), "first").unwrap();

        let source = FileSystemSource::new([&first, &second]);
        assert_eq!(source.get_source("page.html").unwrap(), "first");
        assert_eq!(source.get_source("only.html").unwrap(), "only");
        assert!(matches!(
            source.get_source("missing.html"),
            Err(SourceError::NotFound { .. })
        ));

        std::fs::remove_dir_all(&first).ok();
        std::fs::remove_dir_all(&second).ok();
    }

    #[test]
    fn test_file_system_rejects_escape() {
        let dir = temp_dir("escape");
        let source = FileSystemSource::new([dir.join("inner")]);
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("outside.html"), "nope").unwrap();

        assert!(matches!(
            source.get_source("../outside.html"),
            Err(SourceError::NotFound { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
