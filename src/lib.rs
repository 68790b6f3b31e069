//! Template Check - static type checking for Go-style templates
//!
//! This library verifies that template text will not fail when rendered
//! against a value of a known host type, without executing anything. It
//! replays how a program assembles its templates, then walks each rendered
//! tree against the static type of the data passed to it.
//!
//! # Example
//!
//! ```rust
//! use template_check::{check_template, Field, Functions, Template, TypeId, TypeTable, Variant};
//!
//! let mut types = TypeTable::new();
//! let person = types.declare_named("example.com/app", "Person");
//! let fields = types.structure(vec![Field::new("Name", TypeId::STRING)]);
//! types.set_underlying(person, fields);
//!
//! let ts = template_check::new_template(Variant::Text, "greeting")
//!     .parse("Hello, {{.Name}}! {{.Age}}")
//!     .unwrap();
//! let tree = ts.tree().unwrap();
//! let diagnostics = check_template(&types, ts.forest(), &Functions::builtins(), &tree, person);
//! assert_eq!(diagnostics[0].to_string(), "greeting:1:20: Age not found on example.com/app.Person");
//! ```

pub mod check;
pub mod diagnostic;
pub mod error;
pub mod host;
pub mod manifest;
pub mod parser;
pub mod template;
pub mod unit;

use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

pub use check::{check_template, CallRecord, CheckOutput, Checker};
pub use diagnostic::{Diagnostic, Location};
pub use error::ParseError;
pub use host::{Field, Method, Signature, TypeId, TypeTable};
pub use manifest::{Manifest, ManifestError};
pub use parser::Tree;
pub use template::{
    new_template, Bundle, BundleError, FindTreeFn, Forest, Functions, Template, TemplateError, TreeFinder, Variant,
};
pub use unit::{ResolveError, Unit};

/// Errors that end a check
#[derive(Debug, Error)]
pub enum CheckError {
    /// The analysis could not run
    #[error("resolution failed: {}", join(.0))]
    Resolution(Vec<ResolveError>),

    /// The analysis ran and found problems
    #[error("type check failed: {}", join(.0))]
    TypeCheck(Vec<Diagnostic>),
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Configuration for checking a unit
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Functions every template starts with
    pub functions: Functions,
    /// Also check `Execute(w, data)` calls
    pub execute_calls: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            functions: Functions::builtins(),
            execute_calls: true,
        }
    }
}

impl CheckConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default function table
    pub fn with_functions(mut self, functions: Functions) -> Self {
        self.functions = functions;
        self
    }

    /// Enable or disable checking of `Execute` calls
    pub fn with_execute_calls(mut self, execute_calls: bool) -> Self {
        self.execute_calls = execute_calls;
        self
    }
}

/// Everything found while checking one unit
#[derive(Debug, Default)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
    /// Hard resolution errors
    pub errors: Vec<ResolveError>,
    /// Render and nested template calls that were checked
    pub calls: Vec<CallRecord>,
}

impl Report {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty() && self.errors.is_empty()
    }

    /// Resolution errors take precedence over diagnostics
    pub fn into_result(self) -> Result<Vec<CallRecord>, CheckError> {
        if !self.errors.is_empty() {
            return Err(CheckError::Resolution(self.errors));
        }
        if !self.diagnostics.is_empty() {
            return Err(CheckError::TypeCheck(self.diagnostics));
        }
        Ok(self.calls)
    }
}

/// Check every render call in a compiled unit
///
/// Receivers whose construction cannot be replayed are skipped, as are
/// render calls naming templates the receiver does not define.
///
/// # Example
///
/// ```rust
/// use template_check::{check_unit, CheckConfig, Field, TypeId, Unit, Variant};
/// use template_check::unit::{Expr, Stmt};
///
/// let mut unit = Unit::new("example.com/app");
/// let person = unit.types.declare_named("example.com/app", "Person");
/// let fields = unit.types.structure(vec![Field::new("Name", TypeId::STRING)]);
/// unit.types.set_underlying(person, fields);
///
/// let tmpl = unit.template_type(Variant::Text);
/// let ts = unit.object();
/// let new = Expr::package_call("text/template", "New", vec![Expr::string("a")], tmpl);
/// let parse = Expr::method_call(new, "Parse", vec![Expr::string("{{.Name}}")], tmpl);
/// let render = Expr::method_call(
///     Expr::ident("ts", ts, tmpl),
///     "ExecuteTemplate",
///     vec![Expr::opaque(TypeId::ANY), Expr::string("a"), Expr::opaque(person)],
///     TypeId::ERROR,
/// );
/// unit.add_file("main.go", vec![
///     Stmt::Var { name: "ts".into(), object: ts, value: Some(parse) },
///     Stmt::Expr(render),
/// ]);
///
/// let report = check_unit(&unit, &CheckConfig::default());
/// assert!(report.is_ok());
/// assert_eq!(report.calls.len(), 1);
/// ```
#[tracing::instrument(level = "debug", skip_all, fields(package = %unit.package))]
pub fn check_unit(unit: &Unit, config: &CheckConfig) -> Report {
    let pending = unit::scan(unit, config.execute_calls);
    let receivers: BTreeSet<_> = pending.iter().map(|call| call.receiver).collect();
    let resolution = unit::resolve(unit, &receivers, &config.functions);

    let mut report = Report {
        errors: resolution.errors,
        ..Report::default()
    };
    let mut seen = HashSet::new();
    for diagnostic in resolution.diagnostics {
        if seen.insert(diagnostic.clone()) {
            report.diagnostics.push(diagnostic);
        }
    }

    for call in &pending {
        let Some(entry) = resolution.entries.get(&call.receiver) else {
            tracing::debug!(pos = %call.pos, "skipping render call on unresolved receiver");
            continue;
        };
        let name = call.template.as_deref().unwrap_or_else(|| entry.template.name());
        let Some(tree) = entry.template.forest().find_tree(name) else {
            tracing::debug!(pos = %call.pos, template = name, "skipping render call on undefined template");
            continue;
        };

        let mut checker = Checker::new(&unit.types, entry.template.forest(), &entry.functions);
        checker.record(call.pos.clone(), name, call.data);
        checker.check(&tree, call.data);
        let output = checker.finish();
        for diagnostic in output.diagnostics {
            if seen.insert(diagnostic.clone()) {
                report.diagnostics.push(diagnostic);
            }
        }
        report.calls.extend(output.calls);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Expr, ObjectId, Stmt};

    struct Fixture {
        unit: Unit,
        tmpl: TypeId,
        person: TypeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut unit = Unit::new("github.com/typelate/check_test");
            let person = unit.types.declare_named("github.com/typelate/check_test", "Person");
            let fields = unit.types.structure(vec![Field::new("Name", TypeId::STRING)]);
            unit.types.set_underlying(person, fields);
            let tmpl = unit.template_type(Variant::Text);
            Self { unit, tmpl, person }
        }

        fn declare(&mut self, text: &str) -> ObjectId {
            let ts = self.unit.object();
            let new = Expr::package_call("text/template", "New", vec![Expr::string("example")], self.tmpl);
            let parse = Expr::method_call(new, "Parse", vec![Expr::raw_string(text).at("main.go", 5, 40)], self.tmpl);
            self.unit.add_file(
                "main.go",
                vec![Stmt::Var {
                    name: "ts".to_string(),
                    object: ts,
                    value: Some(parse),
                }],
            );
            ts
        }

        fn render(&mut self, ts: ObjectId, name: &str, line: usize) {
            let call = Expr::method_call(
                Expr::ident("ts", ts, self.tmpl),
                "ExecuteTemplate",
                vec![Expr::opaque(TypeId::ANY), Expr::string(name), Expr::opaque(self.person)],
                TypeId::ERROR,
            )
            .at("main.go", line, 2);
            self.unit.add_file("main.go", vec![Stmt::Expr(call)]);
        }
    }

    #[test]
    fn test_check_unit_reports_unknown_field() {
        let mut f = Fixture::new();
        let ts = f.declare("\n\n  {{.UnknownField}}");
        f.render(ts, "example", 9);
        let report = f.unit_report();
        assert_eq!(report.diagnostics.len(), 1);
        let err = report.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "type check failed: main.go:7:5: UnknownField not found on github.com/typelate/check_test.Person"
        );
    }

    #[test]
    fn test_duplicate_render_calls_report_once() {
        let mut f = Fixture::new();
        let ts = f.declare("{{.Age}}");
        f.render(ts, "example", 9);
        f.render(ts, "example", 10);
        let report = f.unit_report();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.calls.len(), 2);
    }

    #[test]
    fn test_unknown_template_name_is_skipped() {
        let mut f = Fixture::new();
        let ts = f.declare("{{.Age}}");
        f.render(ts, "missing", 9);
        let report = f.unit_report();
        assert!(report.is_ok());
        assert!(report.calls.is_empty());
    }

    #[test]
    fn test_hard_errors_take_precedence() {
        let report = Report {
            diagnostics: vec![Diagnostic::new(Location::new("a", 1, 1), "x")],
            errors: vec![ResolveError::Bundle {
                pos: Location::new("main.go", 3, 4),
                source: BundleError::NoPatterns,
            }],
            calls: Vec::new(),
        };
        assert!(matches!(report.into_result(), Err(CheckError::Resolution(_))));
    }

    impl Fixture {
        fn unit_report(&self) -> Report {
            check_unit(&self.unit, &CheckConfig::new())
        }
    }
}
