//! Static type checking of template trees
//!
//! The checker mirrors template execution, but every value is replaced by its
//! host type. Nested `{{template}}` calls are followed through a
//! [`TreeFinder`](crate::template::TreeFinder); a template already on the
//! active call path is not entered again.

mod call;
mod eval;
mod scope;

pub use eval::{check_template, CallRecord, CheckOutput, Checker};
pub use scope::Scope;
