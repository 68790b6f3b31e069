//! Lexer for template text
//!
//! Template text is split into literal text and actions by the (configurable)
//! delimiters; action bodies are tokenized with logos. Trim markers (`{{- ` and
//! ` -}}`) strip adjacent whitespace from the surrounding text.

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Action delimiter pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delims {
    pub left: String,
    pub right: String,
}

impl Default for Delims {
    fn default() -> Self {
        Self {
            left: "{{".to_string(),
            right: "}}".to_string(),
        }
    }
}

impl Delims {
    /// Build a delimiter pair; empty strings select the defaults
    pub fn new(left: &str, right: &str) -> Self {
        let default = Self::default();
        Self {
            left: if left.is_empty() { default.left } else { left.to_string() },
            right: if right.is_empty() { default.right } else { right.to_string() },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text between actions
    Text(String),
    /// A `{{/* ... */}}` comment
    Comment(String),
    /// Left action delimiter
    Open,
    /// Right action delimiter
    Close,

    If,
    Else,
    End,
    Range,
    With,
    Template,
    Define,
    Block,
    Break,
    Continue,

    Bool(bool),
    Nil,
    Dot,
    /// `.A.B` field chain
    Field(Vec<String>),
    /// Field chain directly attached to a variable or parenthesized pipeline
    Chain(Vec<String>),
    /// `$` or `$name`
    Variable(String),
    Ident(String),
    /// Unquoted string literal
    String(String),
    /// Character literal, without the quotes
    Char(String),
    /// Numeric literal as written
    Number(String),

    Pipe,
    Declare,
    Assign,
    Comma,
    LParen,
    RParen,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum Lexeme {
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("range")]
    Range,
    #[token("with")]
    With,
    #[token("template")]
    Template,
    #[token("define")]
    Define,
    #[token("block")]
    Block,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    #[token(".")]
    Dot,
    #[regex(r"(\.[\p{L}_][\p{L}\p{Nd}_]*)+", |lex| lex.slice()[1..].split('.').map(str::to_string).collect::<Vec<_>>())]
    Field(Vec<String>),
    #[regex(r"\$[\p{L}\p{Nd}_]*", |lex| lex.slice().to_string())]
    Variable(String),
    #[regex(r"[\p{L}_][\p{L}\p{Nd}_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unquote(lex.slice()))]
    String(String),
    #[regex(r"`[^`]*`", |lex| { let s = lex.slice(); s[1..s.len()-1].to_string() })]
    RawString(String),
    #[regex(r"'([^'\\\n]|\\[^\n][^'\n]*)'", |lex| { let s = lex.slice(); s[1..s.len()-1].to_string() })]
    Char(String),
    #[regex(r"[+-]?([0-9][0-9a-zA-Z_]*(\.[0-9a-zA-Z_]*)?|\.[0-9][0-9a-zA-Z_]*)([eEpP][+-][0-9_]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[token("|")]
    Pipe,
    #[token(":=")]
    Declare,
    #[token("=")]
    Assign,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

impl From<Lexeme> for Token {
    fn from(lexeme: Lexeme) -> Self {
        match lexeme {
            Lexeme::If => Token::If,
            Lexeme::Else => Token::Else,
            Lexeme::End => Token::End,
            Lexeme::Range => Token::Range,
            Lexeme::With => Token::With,
            Lexeme::Template => Token::Template,
            Lexeme::Define => Token::Define,
            Lexeme::Block => Token::Block,
            Lexeme::Break => Token::Break,
            Lexeme::Continue => Token::Continue,
            Lexeme::True => Token::Bool(true),
            Lexeme::False => Token::Bool(false),
            Lexeme::Nil => Token::Nil,
            Lexeme::Dot => Token::Dot,
            Lexeme::Field(names) => Token::Field(names),
            Lexeme::Variable(name) => Token::Variable(name),
            Lexeme::Ident(name) => Token::Ident(name),
            Lexeme::String(s) | Lexeme::RawString(s) => Token::String(s),
            Lexeme::Char(c) => Token::Char(c),
            Lexeme::Number(n) => Token::Number(n),
            Lexeme::Pipe => Token::Pipe,
            Lexeme::Declare => Token::Declare,
            Lexeme::Assign => Token::Assign,
            Lexeme::Comma => Token::Comma,
            Lexeme::LParen => Token::LParen,
            Lexeme::RParen => Token::RParen,
        }
    }
}

/// Decode an interpreted string literal including its quotes
fn unquote(literal: &str) -> Option<String> {
    let inner = literal.get(1..literal.len().checked_sub(1)?)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'x' => hex_escape(&mut chars, 2)?,
            'u' => hex_escape(&mut chars, 4)?,
            'U' => hex_escape(&mut chars, 8)?,
            d @ '0'..='7' => {
                let mut value = d.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                char::from_u32(value)?
            }
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn hex_escape(chars: &mut impl Iterator<Item = char>, digits: usize) -> Option<char> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    char::from_u32(value)
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Lex template text into tokens with spans
pub fn lex(input: &str, delims: &Delims) -> Result<Vec<(Token, Span)>, ParseError> {
    let left = delims.left.as_str();
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    loop {
        let Some(found) = input[pos..].find(left) else {
            push_text(&mut tokens, input, pos..input.len(), trim_next, false);
            break;
        };
        let open = pos + found;
        let mut body = open + left.len();
        let trim_left = bytes.get(body) == Some(&b'-')
            && bytes.get(body + 1).copied().is_some_and(is_space);
        push_text(&mut tokens, input, pos..open, trim_next, trim_left);
        if trim_left {
            body += 2;
        }

        if input[body..].starts_with("/*") {
            let (comment, close, trim_right) = lex_comment(input, body, delims)?;
            tokens.push((Token::Comment(input[body + 2..comment].to_string()), open..close));
            pos = close;
            trim_next = trim_right;
            continue;
        }

        let (end, close, trim_right) = find_close(input, body, delims)?;
        tokens.push((Token::Open, open..open + left.len()));
        lex_action(&mut tokens, input, body..end)?;
        tokens.push((Token::Close, end..close));
        pos = close;
        trim_next = trim_right;
    }

    Ok(tokens)
}

fn push_text(tokens: &mut Vec<(Token, Span)>, input: &str, span: Span, trim_start: bool, trim_end: bool) {
    let mut start = span.start;
    let mut end = span.end;
    let bytes = input.as_bytes();
    if trim_start {
        while start < end && is_space(bytes[start]) {
            start += 1;
        }
    }
    if trim_end {
        while end > start && is_space(bytes[end - 1]) {
            end -= 1;
        }
    }
    if start < end {
        tokens.push((Token::Text(input[start..end].to_string()), start..end));
    }
}

/// Find the end of the comment starting at `body` (which points at `/*`).
/// Returns (offset of `*/`, offset after the right delimiter, trim right).
fn lex_comment(input: &str, body: usize, delims: &Delims) -> Result<(usize, usize, bool), ParseError> {
    let Some(found) = input[body + 2..].find("*/") else {
        return Err(ParseError::syntax(body..input.len(), "unclosed comment"));
    };
    let comment_end = body + 2 + found;
    let after = comment_end + 2;
    let rest = &input[after..];
    if rest.starts_with(delims.right.as_str()) {
        return Ok((comment_end, after + delims.right.len(), false));
    }
    let bytes = rest.as_bytes();
    if bytes.len() > 2
        && is_space(bytes[0])
        && bytes[1] == b'-'
        && rest[2..].starts_with(delims.right.as_str())
    {
        return Ok((comment_end, after + 2 + delims.right.len(), true));
    }
    Err(ParseError::syntax(
        comment_end..after,
        "comment ends before closing delimiter",
    ))
}

/// Find the right delimiter of the action whose body starts at `body`,
/// skipping over quoted literals.
/// Returns (end of body, offset after the right delimiter, trim right).
fn find_close(input: &str, body: usize, delims: &Delims) -> Result<(usize, usize, bool), ParseError> {
    let right = delims.right.as_str();
    let bytes = input.as_bytes();
    let mut i = body;
    while i < bytes.len() {
        let rest = &input[i..];
        if is_space(bytes[i])
            && bytes.get(i + 1) == Some(&b'-')
            && input.get(i + 2..).is_some_and(|r| r.starts_with(right))
        {
            return Ok((i, i + 2 + right.len(), true));
        }
        if rest.starts_with(right) {
            return Ok((i, i + right.len(), false));
        }
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None | Some(b'\n') => {
                            return Err(ParseError::syntax(body..i, "unterminated quoted string"));
                        }
                        Some(b'\\') => i += 2,
                        Some(&b) if b == quote => break,
                        Some(_) => i += 1,
                    }
                }
                i += 1;
            }
            b'`' => {
                let Some(found) = input[i + 1..].find('`') else {
                    return Err(ParseError::syntax(i..input.len(), "unterminated raw quoted string"));
                };
                i += found + 2;
            }
            _ => i += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    Err(ParseError::syntax(body..input.len(), "unclosed action"))
}

fn lex_action(tokens: &mut Vec<(Token, Span)>, input: &str, body: Span) -> Result<(), ParseError> {
    let offset = body.start;
    let mut prev_end: Option<usize> = None;
    let mut prev_attachable = false;
    for (lexeme, span) in Lexeme::lexer(&input[body]).spanned() {
        let span = span.start + offset..span.end + offset;
        let lexeme = lexeme.map_err(|()| {
            ParseError::syntax(
                span.clone(),
                format!("unexpected {:?} in action", &input[span.clone()]),
            )
        })?;
        let adjacent = prev_end == Some(span.start);
        let attachable = matches!(lexeme, Lexeme::Variable(_) | Lexeme::RParen | Lexeme::Ident(_));
        let token = match lexeme {
            Lexeme::Field(names) if adjacent && prev_attachable => Token::Chain(names),
            other => Token::from(other),
        };
        prev_attachable = attachable || matches!(token, Token::Chain(_));
        prev_end = Some(span.end);
        tokens.push((token, span));
    }
    Ok(())
}
