//! Template registries, function tables and file bundles
//!
//! A registry is built the way a host program builds one: create a handle
//! with [`new_template`], then parse text, register functions, change
//! delimiters or load files from a [`Bundle`]. Each step returns a new handle.
//!
//! ```rust
//! use template_check::template::{new_template, Template, Variant};
//!
//! let t = new_template(Variant::Html, "page")
//!     .parse(r#"{{define "row"}}{{.Name}}{{end}}<ul>{{range .}}{{template "row" .}}{{end}}</ul>"#)
//!     .unwrap();
//! assert!(t.lookup("row").is_some());
//! ```

mod bundle;
mod functions;
mod registry;

pub use bundle::{base_name, Bundle, BundleError, ParseFsError};
pub use functions::{Builtin, Function, Functions, SignatureError};
pub use registry::{
    new_template, FindTreeFn, Forest, HtmlTemplate, Template, TemplateError, TemplateState,
    TextTemplate, TreeFinder, Variant,
};
