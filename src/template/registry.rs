//! Template registries: named parse trees behind one capability trait
//!
//! A registry value models a template handle of either engine variant. Every
//! operation returns an updated handle; handles created from one another
//! share a [`Forest`] of trees the way associated templates do.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::functions::Builtin;
use crate::diagnostic::line_col;
use crate::error::ParseError;
use crate::parser::{self, Delims, Origin, Tree};

/// Errors that can occur during registry operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    /// Template text failed to parse
    #[error("template: {name}:{line}: {}", first_message(.errors))]
    Parse {
        name: String,
        line: usize,
        errors: Vec<ParseError>,
        /// Text that failed to parse, for rendering
        text: Arc<str>,
    },

    /// Unknown `Option` setting
    #[error("unrecognized option: {option}")]
    InvalidOption { option: String },
}

fn first_message(errors: &[ParseError]) -> String {
    errors.first().map(|e| e.to_string()).unwrap_or_default()
}

impl TemplateError {
    /// Render parse errors with source context
    pub fn format(&self) -> String {
        match self {
            TemplateError::Parse {
                name, errors, text, ..
            } => errors
                .iter()
                .map(|e| e.format(text, name))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

/// Engine variant: plain text or contextually escaped HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Text,
    Html,
}

impl Variant {
    /// The variant provided by a template package import path
    pub fn from_package(path: &str) -> Option<Variant> {
        match path {
            "text/template" => Some(Variant::Text),
            "html/template" => Some(Variant::Html),
            _ => None,
        }
    }

    pub fn package(self) -> &'static str {
        match self {
            Variant::Text => "text/template",
            Variant::Html => "html/template",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.package())
    }
}

/// Anything that can find a tree by name
pub trait TreeFinder {
    fn find_tree(&self, name: &str) -> Option<Arc<Tree>>;
}

/// A [`TreeFinder`] backed by a closure, for registries assembled elsewhere
pub struct FindTreeFn<F>(pub F);

impl<F> TreeFinder for FindTreeFn<F>
where
    F: Fn(&str) -> Option<Arc<Tree>>,
{
    fn find_tree(&self, name: &str) -> Option<Arc<Tree>> {
        (self.0)(name)
    }
}

/// Trees and function names shared by associated templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    trees: BTreeMap<String, Arc<Tree>>,
    funcs: BTreeSet<String>,
}

impl Forest {
    /// Add a tree; an empty tree never replaces an existing non-empty one.
    /// Returns whether the tree was stored.
    pub fn add(&mut self, tree: Tree) -> bool {
        if tree.is_empty() && self.trees.get(&tree.name).is_some_and(|t| !t.is_empty()) {
            return false;
        }
        self.trees.insert(tree.name.clone(), Arc::new(tree));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tree>> {
        self.trees.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Whether a template may call `name`
    pub fn is_function(&self, name: &str) -> bool {
        Builtin::from_name(name).is_some() || self.funcs.contains(name)
    }
}

impl TreeFinder for Forest {
    fn find_tree(&self, name: &str) -> Option<Arc<Tree>> {
        self.trees.get(name).cloned()
    }
}

/// Per-handle state: the handle's name, delimiters and shared forest
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateState {
    name: String,
    delims: Delims,
    forest: Arc<Forest>,
}

impl TemplateState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delims: Delims::default(),
            forest: Arc::new(Forest::default()),
        }
    }
}

/// The capability shared by both engine variants
///
/// Implementors only provide access to their state; every operation is
/// defined here so both variants behave identically for checking.
pub trait Template: fmt::Debug {
    fn variant(&self) -> Variant;

    fn state(&self) -> &TemplateState;

    /// Wrap a state in a handle of the same variant
    fn wrap(&self, state: TemplateState) -> Box<dyn Template>;

    fn name(&self) -> &str {
        &self.state().name
    }

    fn forest(&self) -> &Forest {
        &self.state().forest
    }

    /// A new handle named `name` sharing this handle's forest and delimiters
    fn new_template(&self, name: &str) -> Box<dyn Template> {
        let mut state = self.state().clone();
        state.name = name.to_string();
        self.wrap(state)
    }

    fn parse(&self, text: &str) -> Result<Box<dyn Template>, TemplateError> {
        self.parse_at(text, Origin::Text)
    }

    /// Parse text whose positions are reported relative to `origin`
    fn parse_at(&self, text: &str, origin: Origin) -> Result<Box<dyn Template>, TemplateError> {
        let state = self.state();
        let forest = &state.forest;
        let is_function = |name: &str| forest.is_function(name);
        let trees = parser::parse(&state.name, text, &state.delims, &is_function).map_err(|errors| {
            let offset = errors.first().map_or(0, |e| e.span().start);
            TemplateError::Parse {
                name: state.name.clone(),
                line: line_col(text, offset).0,
                errors,
                text: Arc::from(text),
            }
        })?;

        let mut next = state.clone();
        let forest = Arc::make_mut(&mut next.forest);
        for mut tree in trees {
            tree.origin = origin.clone();
            forest.add(tree);
        }
        Ok(self.wrap(next))
    }

    /// Make function names callable from templates parsed afterwards
    fn funcs(&self, names: &[String]) -> Box<dyn Template> {
        let mut next = self.state().clone();
        Arc::make_mut(&mut next.forest)
            .funcs
            .extend(names.iter().cloned());
        self.wrap(next)
    }

    /// Validate execution options; they do not affect checking
    fn option(&self, options: &[String]) -> Result<Box<dyn Template>, TemplateError> {
        for option in options {
            let valid = match option.split_once('=') {
                Some(("missingkey", value)) => {
                    matches!(value, "default" | "invalid" | "zero" | "error")
                }
                _ => false,
            };
            if !valid {
                return Err(TemplateError::InvalidOption {
                    option: option.clone(),
                });
            }
        }
        Ok(self.wrap(self.state().clone()))
    }

    /// Set the action delimiters for subsequent parses
    fn delims(&self, left: &str, right: &str) -> Box<dyn Template> {
        let mut next = self.state().clone();
        next.delims = Delims::new(left, right);
        self.wrap(next)
    }

    /// The associated template called `name`, if it has been defined
    fn lookup(&self, name: &str) -> Option<Box<dyn Template>> {
        self.forest().get(name)?;
        Some(self.new_template(name))
    }

    /// Associate `tree` under `name`, returning the handle for `name`
    fn add_parse_tree(&self, name: &str, mut tree: Tree) -> Box<dyn Template> {
        let mut next = self.state().clone();
        next.name = name.to_string();
        tree.name = name.to_string();
        Arc::make_mut(&mut next.forest).add(tree);
        self.wrap(next)
    }

    /// This handle's own tree
    fn tree(&self) -> Option<Arc<Tree>> {
        self.forest().find_tree(self.name())
    }
}

impl Clone for Box<dyn Template> {
    fn clone(&self) -> Self {
        self.wrap(self.state().clone())
    }
}

impl TreeFinder for dyn Template {
    fn find_tree(&self, name: &str) -> Option<Arc<Tree>> {
        self.forest().find_tree(name)
    }
}

/// Handle for the plain-text engine
#[derive(Debug, Clone, PartialEq)]
pub struct TextTemplate(TemplateState);

impl TextTemplate {
    pub fn new(name: &str) -> Self {
        Self(TemplateState::new(name))
    }
}

impl Template for TextTemplate {
    fn variant(&self) -> Variant {
        Variant::Text
    }

    fn state(&self) -> &TemplateState {
        &self.0
    }

    fn wrap(&self, state: TemplateState) -> Box<dyn Template> {
        Box::new(TextTemplate(state))
    }
}

/// Handle for the HTML engine; escaping is not modeled by the checker
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlTemplate(TemplateState);

impl HtmlTemplate {
    pub fn new(name: &str) -> Self {
        Self(TemplateState::new(name))
    }
}

impl Template for HtmlTemplate {
    fn variant(&self) -> Variant {
        Variant::Html
    }

    fn state(&self) -> &TemplateState {
        &self.0
    }

    fn wrap(&self, state: TemplateState) -> Box<dyn Template> {
        Box::new(HtmlTemplate(state))
    }
}

/// Create an empty template handle of the given variant
pub fn new_template(variant: Variant, name: &str) -> Box<dyn Template> {
    match variant {
        Variant::Text => Box::new(TextTemplate::new(name)),
        Variant::Html => Box::new(HtmlTemplate::new(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let t = new_template(Variant::Text, "page")
            .parse(r#"{{define "row"}}{{.Name}}{{end}}{{template "row" .}}"#)
            .unwrap();
        assert_eq!(t.name(), "page");
        assert!(t.tree().is_some());
        let row = t.lookup("row").expect("row defined");
        assert_eq!(row.name(), "row");
        assert!(t.lookup("missing").is_none());
        assert_eq!(t.forest().names().collect::<Vec<_>>(), vec!["page", "row"]);
    }

    #[test]
    fn test_new_template_is_not_defined_until_parsed() {
        let t = new_template(Variant::Html, "root");
        let child = t.new_template("child");
        assert_eq!(child.variant(), Variant::Html);
        assert!(child.lookup("child").is_none());
        let child = child.parse("hi").unwrap();
        assert!(child.lookup("child").is_some());
    }

    #[test]
    fn test_empty_parse_keeps_existing_tree() {
        let t = new_template(Variant::Text, "a").parse("{{.X}}").unwrap();
        let t = t.parse("  \n").unwrap();
        assert!(!t.tree().unwrap().is_empty());
        let t = t.parse("{{.Y}}").unwrap();
        assert!(t.tree().unwrap().text.contains(".Y"));
    }

    #[test]
    fn test_delims_apply_to_later_parses() {
        let t = new_template(Variant::Text, "a")
            .delims("<<", ">>")
            .parse("<<.X>> {{.Y}}")
            .unwrap();
        let tree = t.tree().unwrap();
        assert_eq!(tree.root.len(), 2);
    }

    #[test]
    fn test_funcs_make_names_parseable() {
        let t = new_template(Variant::Text, "a");
        let err = t.parse("{{upper .}}").unwrap_err();
        assert_eq!(err.to_string(), r#"template: a:1: function "upper" not defined"#);
        let t = t.funcs(&["upper".to_string()]).parse("{{upper .}}");
        assert!(t.is_ok());
    }

    #[test]
    fn test_option_validation() {
        let t = new_template(Variant::Text, "a");
        assert!(t.option(&["missingkey=zero".to_string()]).is_ok());
        assert_eq!(
            t.option(&["missingkey=maybe".to_string()]).unwrap_err(),
            TemplateError::InvalidOption {
                option: "missingkey=maybe".to_string()
            }
        );
    }

    #[test]
    fn test_add_parse_tree() {
        let source = new_template(Variant::Text, "src").parse("{{.Z}}").unwrap();
        let tree = source.tree().unwrap().as_ref().clone();
        let t = new_template(Variant::Text, "dst").add_parse_tree("copy", tree);
        assert_eq!(t.name(), "copy");
        assert_eq!(t.tree().unwrap().name, "copy");
    }

    #[test]
    fn test_find_tree_fn() {
        let t = new_template(Variant::Text, "a").parse("x").unwrap();
        let finder = FindTreeFn(|name: &str| t.forest().find_tree(name));
        assert!(finder.find_tree("a").is_some());
        assert!(finder.find_tree("b").is_none());
    }
}
