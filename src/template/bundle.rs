//! File bundles: template files attached to a unit at build time
//!
//! Patterns use shell glob syntax where `*` never crosses a `/`. A pattern
//! that is malformed or matches nothing is a hard error.

use std::collections::BTreeMap;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use thiserror::Error;

use super::registry::{new_template, Template, TemplateError, Variant};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("invalid pattern {pattern:?} at offset {pos}: {message}")]
    InvalidPattern {
        pattern: String,
        pos: usize,
        message: String,
    },

    #[error("template: pattern matches no files: {pattern:?}")]
    NoMatch { pattern: String },

    #[error("template: no files named in call to ParseFS")]
    NoPatterns,

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

/// Failure to load templates from a bundle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFsError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// The file-bundle listing: relative path to contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    files: BTreeMap<String, String>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths matched by `pattern`, in lexical order
    pub fn glob(&self, pattern: &str) -> Result<Vec<&str>, BundleError> {
        let compiled = Pattern::new(pattern).map_err(|e| BundleError::InvalidPattern {
            pattern: pattern.to_string(),
            pos: e.pos,
            message: e.msg.to_string(),
        })?;
        Ok(self
            .files
            .keys()
            .filter(|path| compiled.matches_with(path, MATCH_OPTIONS))
            .map(String::as_str)
            .collect())
    }

    /// Paths matched by any of `patterns`; every pattern must match something
    pub fn matches(&self, patterns: &[String]) -> Result<Vec<&str>, BundleError> {
        if patterns.is_empty() {
            return Err(BundleError::NoPatterns);
        }
        let mut paths = Vec::new();
        for pattern in patterns {
            let found = self.glob(pattern)?;
            if found.is_empty() {
                return Err(BundleError::NoMatch {
                    pattern: pattern.clone(),
                });
            }
            paths.extend(found);
        }
        Ok(paths)
    }

    pub fn contents(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Parse every file matched by `patterns` as a tree named by its base name
    ///
    /// Without a `base` handle, the result is named after the first file.
    pub fn parse_fs(
        &self,
        base: Option<&dyn Template>,
        variant: Variant,
        patterns: &[String],
    ) -> Result<Box<dyn Template>, ParseFsError> {
        let paths = self.matches(patterns)?;
        let mut current: Option<Box<dyn Template>> = None;
        for path in paths {
            let name = base_name(path);
            let text = self.contents(path).unwrap_or_default();
            if current.is_none() && base.is_none() {
                current = Some(new_template(variant, name));
            }
            let holder: &dyn Template = match (current.as_deref(), base) {
                (Some(t), _) => t,
                (None, Some(b)) => b,
                (None, None) => return Err(BundleError::NoPatterns.into()),
            };
            let owner = holder.name().to_string();
            let parsed = holder.new_template(name).parse(text)?;
            current = Some(parsed.new_template(&owner));
        }
        current.ok_or(ParseFsError::Bundle(BundleError::NoPatterns))
    }

    /// Load files under `root` matching `patterns` from disk
    pub fn from_dir(root: &Path, patterns: &[String]) -> Result<Self, BundleError> {
        let mut bundle = Bundle::new();
        for pattern in patterns {
            let full = root.join(pattern);
            let full = full.to_string_lossy();
            let entries = glob::glob_with(&full, MATCH_OPTIONS).map_err(|e| BundleError::InvalidPattern {
                pattern: pattern.clone(),
                pos: e.pos,
                message: e.msg.to_string(),
            })?;
            for entry in entries {
                let path = entry.map_err(|e| BundleError::Io {
                    path: e.path().display().to_string(),
                    message: e.to_string(),
                })?;
                if !path.is_file() {
                    continue;
                }
                let contents = std::fs::read_to_string(&path).map_err(|e| BundleError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                let relative = path.strip_prefix(root).unwrap_or(&path);
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                bundle.insert(key, contents);
            }
        }
        Ok(bundle)
    }
}

/// Last path element
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> Bundle {
        Bundle::new()
            .with_file("templates/index.gohtml", "{{template \"nav\" .}}{{.Title}}")
            .with_file("templates/nav.gohtml", "{{.User}}")
            .with_file("templates/partials/footer.gohtml", "{{.Year}}")
            .with_file("README.md", "# docs")
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let b = bundle();
        assert_eq!(
            b.glob("templates/*.gohtml").unwrap(),
            vec!["templates/index.gohtml", "templates/nav.gohtml"]
        );
        assert_eq!(b.glob("templates/*/*.gohtml").unwrap(), vec!["templates/partials/footer.gohtml"]);
    }

    #[test]
    fn test_invalid_and_unmatched_patterns_are_errors() {
        let b = bundle();
        assert!(matches!(b.glob("templates/[.gohtml"), Err(BundleError::InvalidPattern { .. })));
        assert_eq!(
            b.matches(&["missing/*.txt".to_string()]),
            Err(BundleError::NoMatch {
                pattern: "missing/*.txt".to_string()
            })
        );
        assert_eq!(b.matches(&[]), Err(BundleError::NoPatterns));
    }

    #[test]
    fn test_parse_fs_names_trees_by_base_name() {
        let b = bundle();
        let t = b
            .parse_fs(None, Variant::Html, &["templates/*.gohtml".to_string()])
            .unwrap();
        assert_eq!(t.name(), "index.gohtml");
        assert_eq!(t.variant(), Variant::Html);
        assert!(t.lookup("nav.gohtml").is_some());
        assert!(t.lookup("index.gohtml").is_some());
    }

    #[test]
    fn test_parse_fs_on_existing_handle_keeps_its_name() {
        let b = bundle();
        let base = new_template(Variant::Text, "root").parse("{{.X}}").unwrap();
        let t = b
            .parse_fs(Some(base.as_ref()), Variant::Text, &["templates/nav.gohtml".to_string()])
            .unwrap();
        assert_eq!(t.name(), "root");
        assert!(t.lookup("root").is_some());
        assert!(t.lookup("nav.gohtml").is_some());
    }

    #[test]
    fn test_parse_fs_reports_template_errors() {
        let b = Bundle::new().with_file("bad.tmpl", "{{.X");
        let err = b
            .parse_fs(None, Variant::Text, &["*.tmpl".to_string()])
            .unwrap_err();
        assert!(matches!(err, ParseFsError::Template(_)));
    }
}
