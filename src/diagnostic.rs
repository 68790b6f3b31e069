//! Diagnostics reported by the checker

use std::fmt;
use std::sync::Arc;

use ariadne::{Color, Label, Report, ReportKind, Source};
use serde::Serialize;

use crate::parser::ast::{Origin, Span, Tree};

/// A resolved source position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// 1-based line and 0-based byte column of `offset` in `text`
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let column = match before.iter().rposition(|&b| b == b'\n') {
        Some(newline) => offset - newline - 1,
        None => offset,
    };
    (line, column)
}

impl Tree {
    /// Resolve a span of this tree's text to a location
    ///
    /// Externally loaded text reports `parse_name:line:col` with a 0-based
    /// byte column; inline literals map into the host file with 1-based
    /// columns.
    pub fn location(&self, span: &Span) -> Location {
        let (line, column) = line_col(&self.text, span.start);
        match &self.origin {
            Origin::Text => Location::new(self.parse_name.clone(), line, column),
            Origin::Source {
                file,
                line: first_line,
                column: first_column,
            } => {
                let column = if line == 1 {
                    first_column + column
                } else {
                    column + 1
                };
                Location::new(file.clone(), first_line + line - 1, column)
            }
        }
    }
}

/// A structural problem found while checking a template
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub location: Location,
    pub message: String,
    /// Span into the template text, when the diagnostic came from a tree
    pub span: Option<Span>,
    /// The template text `span` indexes into
    pub source: Option<Arc<str>>,
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.message == other.message
    }
}

impl Eq for Diagnostic {}

impl std::hash::Hash for Diagnostic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.location.hash(state);
        self.message.hash(state);
    }
}

impl Diagnostic {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            span: None,
            source: None,
        }
    }

    /// A diagnostic at `span` of `tree`
    pub fn in_tree(tree: &Tree, span: &Span, message: impl Into<String>) -> Self {
        Self {
            location: tree.location(span),
            message: message.into(),
            span: Some(span.clone()),
            source: Some(tree.text.clone()),
        }
    }

    /// Render with source context using ariadne when the text is known
    pub fn format(&self) -> String {
        let (Some(span), Some(source)) = (&self.span, &self.source) else {
            return self.to_string();
        };
        let filename = self.location.file.as_str();
        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, span.clone()))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source.as_ref())), &mut buf);
        if written.is_err() {
            return self.to_string();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(text: &str, origin: Origin) -> Tree {
        Tree {
            name: "inner".to_string(),
            parse_name: "example".to_string(),
            root: Vec::new(),
            text: Arc::from(text),
            origin,
        }
    }

    #[test]
    fn test_line_col() {
        assert_eq!(line_col("abc", 1), (1, 1));
        assert_eq!(line_col("a\nbc", 3), (2, 1));
        assert_eq!(line_col("a\n", 2), (2, 0));
        assert_eq!(line_col("a", 10), (1, 1));
    }

    #[test]
    fn test_text_origin_uses_parse_name() {
        let t = tree("\n{{define \"x\"}}\n\t{{.Missing}}", Origin::Text);
        let offset = t.text.find(".Missing").unwrap();
        assert_eq!(t.location(&(offset..offset + 8)).to_string(), "example:3:3");
    }

    #[test]
    fn test_source_origin_maps_into_host_file() {
        let origin = Origin::Source {
            file: "main.go".to_string(),
            line: 10,
            column: 20,
        };
        let t = tree("ab{{.X}}\n{{.Y}}", origin);
        assert_eq!(t.location(&(4..6)).to_string(), "main.go:10:24");
        assert_eq!(t.location(&(11..13)).to_string(), "main.go:11:3");
    }

    #[test]
    fn test_diagnostic_display_and_equality() {
        let t = tree("{{.X}}", Origin::Text);
        let a = Diagnostic::in_tree(&t, &(2..4), "X not found on int");
        let b = Diagnostic::new(Location::new("example", 1, 2), "X not found on int");
        assert_eq!(a.to_string(), "example:1:2: X not found on int");
        assert_eq!(a, b);
        assert!(a.format().contains("X not found on int"));
    }
}
