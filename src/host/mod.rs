//! Host type system
//!
//! The types templates are checked against: an interned arena of basic,
//! composite and named types with Go's member lookup, assignability and
//! interface satisfaction rules.

pub mod lookup;
pub mod types;
pub mod typexpr;

pub use lookup::{LookupError, Member};
pub use types::{BasicKind, Field, Kind, Method, NamedType, Signature, TypeId, TypeKind, TypeTable};
pub use typexpr::{parse_signature, parse_type, TypeExprError};
