//! Parse tree types for templates

use std::sync::Arc;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// A node with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Where the text of a tree came from, for mapping positions back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Origin {
    /// Externally loaded text; positions are reported as `name:line:col`
    #[default]
    Text,
    /// A literal in host source; positions are mapped into that file.
    /// `line`/`column` (1-based) locate the first byte of the template text.
    Source {
        file: String,
        line: usize,
        column: usize,
    },
}

/// An immutable named parse tree
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// Name the tree is registered under
    pub name: String,
    /// Name of the top-level template whose text contained this tree
    pub parse_name: String,
    pub root: Vec<Spanned<Node>>,
    /// Full text the tree was parsed from; spans index into it
    pub text: Arc<str>,
    pub origin: Origin,
}

impl Tree {
    /// A tree with no actions, only whitespace text and comments
    pub fn is_empty(&self) -> bool {
        self.root.iter().all(|n| match &n.node {
            Node::Text(text) => text.trim().is_empty(),
            Node::Comment(_) => true,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Comment(String),
    /// `{{pipeline}}`
    Action(Pipeline),
    If(Branch),
    With(Branch),
    Range(Branch),
    /// `{{template "name" pipeline}}`
    Template(TemplateCall),
    /// `{{block "name" pipeline}}...{{end}}`, before its body is extracted
    /// into a tree of its own
    Block(TemplateCall, Vec<Spanned<Node>>),
    Break,
    Continue,
}

/// Shared shape of `if`, `with` and `range`
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pipe: Pipeline,
    pub list: Vec<Spanned<Node>>,
    pub else_list: Option<Vec<Spanned<Node>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCall {
    pub name: Spanned<String>,
    pub pipe: Option<Pipeline>,
}

/// Commands joined by `|`, with optional variable declarations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    /// Declared or assigned variables, including the `$`
    pub decl: Vec<Spanned<String>>,
    /// `=` rather than `:=`
    pub is_assign: bool,
    pub commands: Vec<Spanned<Command>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Spanned<Arg>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Int,
    Float,
    Complex,
    /// Character constant
    Rune,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Dot,
    Nil,
    Bool(bool),
    Number { text: String, kind: NumberKind },
    String(String),
    /// `.A.B`
    Field(Vec<String>),
    /// `$x.A.B`; `fields` is empty for a bare variable
    Variable { name: String, fields: Vec<String> },
    /// A function name
    Identifier(String),
    /// Parenthesized pipeline
    Pipeline(Pipeline),
    /// `(pipeline).A.B` or `fn.A`
    Chain { base: Box<Spanned<Arg>>, fields: Vec<String> },
}

impl NumberKind {
    /// Classify a numeric literal as written
    pub fn classify(text: &str) -> Option<NumberKind> {
        let digits = text.trim_start_matches(['+', '-']).replace('_', "");
        if let Some(real) = digits.strip_suffix('i') {
            return Self::classify(real).map(|_| NumberKind::Complex);
        }
        let lower = digits.to_ascii_lowercase();
        let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
            (16, hex.to_string())
        } else if let Some(bin) = lower.strip_prefix("0b") {
            (2, bin.to_string())
        } else if let Some(oct) = lower.strip_prefix("0o") {
            (8, oct.to_string())
        } else {
            (10, lower.clone())
        };
        if body.is_empty() {
            return None;
        }
        if u128::from_str_radix(&body, radix).is_ok() {
            return Some(NumberKind::Int);
        }
        if radix == 10 && body.parse::<f64>().is_ok() {
            return Some(NumberKind::Float);
        }
        if radix == 16 && (body.contains('p') || body.contains('.')) {
            return Some(NumberKind::Float);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(root: Vec<Spanned<Node>>) -> Tree {
        Tree {
            name: "t".to_string(),
            parse_name: "t".to_string(),
            root,
            text: Arc::from(""),
            origin: Origin::Text,
        }
    }

    #[test]
    fn test_number_classification() {
        assert_eq!(NumberKind::classify("42"), Some(NumberKind::Int));
        assert_eq!(NumberKind::classify("-0x1F"), Some(NumberKind::Int));
        assert_eq!(NumberKind::classify("1_000"), Some(NumberKind::Int));
        assert_eq!(NumberKind::classify("3.14"), Some(NumberKind::Float));
        assert_eq!(NumberKind::classify("1e-3"), Some(NumberKind::Float));
        assert_eq!(NumberKind::classify("2i"), Some(NumberKind::Complex));
        assert_eq!(NumberKind::classify("0x"), None);
        assert_eq!(NumberKind::classify("12abc"), None);
    }

    #[test]
    fn test_empty_tree() {
        assert!(tree(vec![
            Spanned::new(Node::Text(" \n\t".to_string()), 0..3),
            Spanned::new(Node::Comment("x".to_string()), 3..10),
        ])
        .is_empty());
        assert!(!tree(vec![Spanned::new(Node::Text("hi".to_string()), 0..2)]).is_empty());
        assert!(!tree(vec![Spanned::new(Node::Action(Pipeline::default()), 0..2)]).is_empty());
    }
}
