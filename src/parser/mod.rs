//! Parser for template text

pub mod ast;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use grammar::parse;
pub use lexer::Delims;
