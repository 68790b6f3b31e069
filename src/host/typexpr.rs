//! Parser for Go-style type expressions
//!
//! Used to declare host types from text (manifest files, tests):
//! `*Person`, `[]string`, `[4]int`, `map[string][]*Item`, `chan int`,
//! `func(string, ...any) (string, error)`, `interface{}`, `any`, `error`.

use logos::Logos;
use thiserror::Error;

use super::types::{Signature, TypeId, TypeTable};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeExprError {
    #[error("unexpected {found} at offset {offset} in type expression")]
    Unexpected { found: String, offset: usize },

    #[error("unexpected end of type expression")]
    UnexpectedEnd,

    #[error("unknown type name '{0}'")]
    UnknownType(String),

    #[error("invalid character at offset {offset} in type expression")]
    InvalidCharacter { offset: usize },

    #[error("'...' is only allowed on the final parameter")]
    MisplacedEllipsis,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum TypeToken {
    #[token("*")]
    Star,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,
    #[token("...")]
    Ellipsis,
    #[token("map")]
    Map,
    #[token("chan")]
    Chan,
    #[token("func")]
    Func,
    #[token("interface")]
    Interface,
    #[token("struct")]
    Struct,
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),
    #[regex(r"[\p{L}_][\p{L}\p{Nd}_]*(\.[\p{L}_][\p{L}\p{Nd}_]*)?", |lex| lex.slice().to_string(), priority = 1)]
    Name(String),
}

/// Look up a predeclared type name
pub fn predeclared(name: &str) -> Option<TypeId> {
    let id = match name {
        "bool" => TypeId::BOOL,
        "int" => TypeId::INT,
        "int8" => TypeId::INT8,
        "int16" => TypeId::INT16,
        "int32" | "rune" => TypeId::INT32,
        "int64" => TypeId::INT64,
        "uint" => TypeId::UINT,
        "uint8" | "byte" => TypeId::UINT8,
        "uint16" => TypeId::UINT16,
        "uint32" => TypeId::UINT32,
        "uint64" => TypeId::UINT64,
        "uintptr" => TypeId::UINTPTR,
        "float32" => TypeId::FLOAT32,
        "float64" => TypeId::FLOAT64,
        "complex64" => TypeId::COMPLEX64,
        "complex128" => TypeId::COMPLEX128,
        "string" => TypeId::STRING,
        "any" => TypeId::ANY,
        "error" => TypeId::ERROR,
        _ => return None,
    };
    Some(id)
}

/// Parse a type expression, resolving non-predeclared names with `resolve`
pub fn parse_type(
    table: &mut TypeTable,
    source: &str,
    resolve: &dyn Fn(&str) -> Option<TypeId>,
) -> Result<TypeId, TypeExprError> {
    let mut tokens = Vec::new();
    for (token, span) in TypeToken::lexer(source).spanned() {
        match token {
            Ok(t) => tokens.push((t, span.start)),
            Err(()) => return Err(TypeExprError::InvalidCharacter { offset: span.start }),
        }
    }
    let mut parser = TypeParser {
        tokens,
        pos: 0,
        table,
        resolve,
    };
    let ty = parser.parse_type()?;
    match parser.peek() {
        None => Ok(ty),
        Some((token, offset)) => Err(TypeExprError::Unexpected {
            found: format!("{:?}", token),
            offset,
        }),
    }
}

struct TypeParser<'a> {
    tokens: Vec<(TypeToken, usize)>,
    pos: usize,
    table: &'a mut TypeTable,
    resolve: &'a dyn Fn(&str) -> Option<TypeId>,
}

impl TypeParser<'_> {
    fn peek(&self) -> Option<(TypeToken, usize)> {
        self.tokens.get(self.pos).cloned()
    }

    fn next(&mut self) -> Result<(TypeToken, usize), TypeExprError> {
        let token = self.peek().ok_or(TypeExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: TypeToken) -> Result<(), TypeExprError> {
        let (token, offset) = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(TypeExprError::Unexpected {
                found: format!("{:?}", token),
                offset,
            })
        }
    }

    fn eat(&mut self, expected: &TypeToken) -> bool {
        if matches!(self.peek(), Some((ref t, _)) if t == expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.peek(),
            Some((
                TypeToken::Star
                    | TypeToken::BracketOpen
                    | TypeToken::Map
                    | TypeToken::Chan
                    | TypeToken::Func
                    | TypeToken::Interface
                    | TypeToken::Struct
                    | TypeToken::Name(_),
                _
            ))
        )
    }

    fn parse_type(&mut self) -> Result<TypeId, TypeExprError> {
        let (token, offset) = self.next()?;
        match token {
            TypeToken::Star => {
                let elem = self.parse_type()?;
                Ok(self.table.pointer(elem))
            }
            TypeToken::BracketOpen => {
                if self.eat(&TypeToken::BracketClose) {
                    let elem = self.parse_type()?;
                    return Ok(self.table.slice(elem));
                }
                let (len_token, len_offset) = self.next()?;
                let TypeToken::Int(len) = len_token else {
                    return Err(TypeExprError::Unexpected {
                        found: format!("{:?}", len_token),
                        offset: len_offset,
                    });
                };
                self.expect(TypeToken::BracketClose)?;
                let elem = self.parse_type()?;
                Ok(self.table.array(len, elem))
            }
            TypeToken::Map => {
                self.expect(TypeToken::BracketOpen)?;
                let key = self.parse_type()?;
                self.expect(TypeToken::BracketClose)?;
                let value = self.parse_type()?;
                Ok(self.table.map(key, value))
            }
            TypeToken::Chan => {
                let elem = self.parse_type()?;
                Ok(self.table.chan(elem))
            }
            TypeToken::Func => {
                let signature = self.parse_signature()?;
                Ok(self.table.func(signature))
            }
            TypeToken::Interface => {
                self.expect(TypeToken::BraceOpen)?;
                self.expect(TypeToken::BraceClose)?;
                Ok(TypeId::ANY)
            }
            TypeToken::Struct => {
                self.expect(TypeToken::BraceOpen)?;
                self.expect(TypeToken::BraceClose)?;
                Ok(self.table.structure(Vec::new()))
            }
            TypeToken::Name(name) => predeclared(&name)
                .or_else(|| (self.resolve)(&name))
                .ok_or(TypeExprError::UnknownType(name)),
            other => Err(TypeExprError::Unexpected {
                found: format!("{:?}", other),
                offset,
            }),
        }
    }

    /// Parse `(params) results` after a `func` keyword or method name
    fn parse_signature(&mut self) -> Result<Signature, TypeExprError> {
        self.expect(TypeToken::ParenOpen)?;
        let mut params = Vec::new();
        let mut variadic = false;
        while !self.eat(&TypeToken::ParenClose) {
            if variadic {
                return Err(TypeExprError::MisplacedEllipsis);
            }
            if self.eat(&TypeToken::Ellipsis) {
                let elem = self.parse_type()?;
                params.push(self.table.slice(elem));
                variadic = true;
            } else {
                params.push(self.parse_type()?);
            }
            if !self.eat(&TypeToken::Comma) {
                self.expect(TypeToken::ParenClose)?;
                break;
            }
        }

        let mut results = Vec::new();
        if self.eat(&TypeToken::ParenOpen) {
            while !self.eat(&TypeToken::ParenClose) {
                results.push(self.parse_type()?);
                if !self.eat(&TypeToken::Comma) {
                    self.expect(TypeToken::ParenClose)?;
                    break;
                }
            }
        } else if self.starts_type() {
            results.push(self.parse_type()?);
        }

        Ok(Signature {
            params,
            variadic,
            results,
        })
    }
}

/// Parse a method or function signature written without the `func` keyword,
/// e.g. `(string) (int, error)`
pub fn parse_signature(
    table: &mut TypeTable,
    source: &str,
    resolve: &dyn Fn(&str) -> Option<TypeId>,
) -> Result<Signature, TypeExprError> {
    let source = source.trim();
    let source = source.strip_prefix("func").unwrap_or(source);
    let ty = parse_type(table, &format!("func{}", source), resolve)?;
    Ok(table.signature(ty).cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_names(_: &str) -> Option<TypeId> {
        None
    }

    #[test]
    fn test_basic_and_composite() {
        let mut table = TypeTable::new();
        let ty = parse_type(&mut table, "map[string][]*int", &no_names).unwrap();
        assert_eq!(table.display(ty).to_string(), "map[string][]*int");

        let arr = parse_type(&mut table, "[3]byte", &no_names).unwrap();
        assert_eq!(table.display(arr).to_string(), "[3]uint8");

        let ch = parse_type(&mut table, "chan rune", &no_names).unwrap();
        assert_eq!(table.display(ch).to_string(), "chan int32");
    }

    #[test]
    fn test_func_types() {
        let mut table = TypeTable::new();
        let ty = parse_type(&mut table, "func(string, ...any) (string, error)", &no_names).unwrap();
        let sig = table.signature(ty).unwrap().clone();
        assert!(sig.variadic);
        assert_eq!(sig.params, vec![TypeId::STRING, TypeId::ANY_SLICE]);
        assert_eq!(sig.results, vec![TypeId::STRING, TypeId::ERROR]);

        let none = parse_type(&mut table, "func()", &no_names).unwrap();
        assert!(table.signature(none).unwrap().results.is_empty());
    }

    #[test]
    fn test_signature_without_keyword() {
        let mut table = TypeTable::new();
        let sig = parse_signature(&mut table, "(int) bool", &no_names).unwrap();
        assert_eq!(sig.params, vec![TypeId::INT]);
        assert_eq!(sig.results, vec![TypeId::BOOL]);
    }

    #[test]
    fn test_resolver_names() {
        let mut table = TypeTable::new();
        let person = table.declare_named("example.com/app", "Person");
        let resolve = move |name: &str| (name == "Person").then_some(person);
        let ty = parse_type(&mut table, "*Person", &resolve).unwrap();
        assert_eq!(table.display(ty).to_string(), "*example.com/app.Person");
        assert_eq!(
            parse_type(&mut table, "Unknown", &resolve),
            Err(TypeExprError::UnknownType("Unknown".to_string()))
        );
    }

    #[test]
    fn test_errors() {
        let mut table = TypeTable::new();
        assert_eq!(
            parse_type(&mut table, "[]", &no_names),
            Err(TypeExprError::UnexpectedEnd)
        );
        assert!(matches!(
            parse_type(&mut table, "func(...int, string)", &no_names),
            Err(TypeExprError::MisplacedEllipsis)
        ));
        assert!(matches!(
            parse_type(&mut table, "int int", &no_names),
            Err(TypeExprError::Unexpected { .. })
        ));
    }
}
