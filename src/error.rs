//! Error types for template parsing

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::parser::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    #[error("function {name:?} not defined")]
    UndefinedFunction { span: Span, name: String },

    /// Well-formed syntax used where it is not allowed
    #[error("{message}")]
    Misplaced { span: Span, message: String },
}

impl ParseError {
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            span,
            message: message.into(),
            expected: Vec::new(),
        }
    }

    pub fn misplaced(span: Span, message: impl Into<String>) -> Self {
        ParseError::Misplaced {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. }
            | ParseError::UndefinedFunction { span, .. }
            | ParseError::Misplaced { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let span = self.span().clone();
        let label = match self {
            ParseError::Syntax {
                message, expected, ..
            } if !expected.is_empty() => {
                format!("{}\nExpected: {}", message, expected.join(", "))
            }
            other => other.to_string(),
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(self.to_string())
            .with_label(
                Label::new((filename, span))
                    .with_message(label)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);
        if written.is_err() {
            return self.to_string();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                format!("unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Text(_) => "text".to_string(),
        Token::Comment(_) => "comment".to_string(),
        Token::Open => "left delimiter".to_string(),
        Token::Close => "right delimiter".to_string(),
        Token::If => "keyword 'if'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::End => "keyword 'end'".to_string(),
        Token::Range => "keyword 'range'".to_string(),
        Token::With => "keyword 'with'".to_string(),
        Token::Template => "keyword 'template'".to_string(),
        Token::Define => "keyword 'define'".to_string(),
        Token::Block => "keyword 'block'".to_string(),
        Token::Break => "keyword 'break'".to_string(),
        Token::Continue => "keyword 'continue'".to_string(),
        Token::Bool(b) => format!("bool {}", b),
        Token::Nil => "nil".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Field(names) | Token::Chain(names) => format!("field .{}", names.join(".")),
        Token::Variable(name) => format!("variable {}", name),
        Token::Ident(name) => format!("identifier '{}'", name),
        Token::String(s) => format!("string {:?}", s),
        Token::Char(c) => format!("character '{}'", c),
        Token::Number(n) => format!("number {}", n),
        Token::Pipe => "'|'".to_string(),
        Token::Declare => "':='".to_string(),
        Token::Assign => "'='".to_string(),
        Token::Comma => "','".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_includes_source_line() {
        let err = ParseError::syntax(2..7, "unexpected keyword 'end'");
        let rendered = err.format("a {{end}}", "page.tmpl");
        assert!(rendered.contains("page.tmpl"));
        assert!(rendered.contains("unexpected keyword 'end'"));
    }

    #[test]
    fn test_undefined_function_message() {
        let err = ParseError::UndefinedFunction {
            span: 0..4,
            name: "shout".to_string(),
        };
        assert_eq!(err.to_string(), r#"function "shout" not defined"#);
    }
}
