//! Template assembly resolution
//!
//! Replays the construction chain of each template variable without running
//! the host program. Only a fixed set of package functions and methods is
//! understood; a chain using anything else leaves its variable unresolved and
//! render calls on it are skipped. The exception is a file-bundle pattern
//! that is malformed or matches nothing, which is reported as a hard error.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use super::{Callee, Expr, ExprKind, ObjectId, Stmt, Unit};
use crate::diagnostic::{Diagnostic, Location};
use crate::parser::Origin;
use crate::template::{
    new_template, BundleError, Functions, ParseFsError, SignatureError, Template, TemplateError,
    Variant,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// A bundle pattern is malformed or matches nothing
    #[error("{pos}: {source}")]
    Bundle {
        pos: Location,
        #[source]
        source: BundleError,
    },

    #[error("{pos}: unsupported call to {name}")]
    Unsupported { pos: Location, name: String },

    #[error("{pos}: argument must be a string literal")]
    NotLiteral { pos: Location },

    #[error("{pos}: value cannot be determined statically")]
    Unresolvable { pos: Location },

    #[error("{pos}: {name} is assigned after its declaration")]
    Reassigned { pos: Location, name: String },

    #[error("{pos}: {name} is defined in terms of itself")]
    Cycle { pos: Location, name: String },

    #[error("{pos}: {source}")]
    Template {
        pos: Location,
        #[source]
        source: TemplateError,
    },
}

impl ResolveError {
    /// Hard errors mean the analysis could not run
    pub fn is_hard(&self) -> bool {
        matches!(self, ResolveError::Bundle { .. })
    }

    fn from_parse_fs(pos: &Location, error: ParseFsError) -> Self {
        match error {
            ParseFsError::Bundle(source) => ResolveError::Bundle {
                pos: pos.clone(),
                source,
            },
            ParseFsError::Template(source) => ResolveError::Template {
                pos: pos.clone(),
                source,
            },
        }
    }
}

/// Where the trees of a resolved template came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    /// Positions of `Parse` calls with literal text
    pub parse_calls: Vec<Location>,
    /// Bundle files loaded by `ParseFS`
    pub bundle_files: Vec<String>,
}

/// A resolved template variable
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub template: Box<dyn Template>,
    pub functions: Functions,
    pub provenance: Provenance,
}

/// The outcome of resolving a unit's template variables
#[derive(Debug, Default)]
pub struct Resolution {
    pub entries: HashMap<ObjectId, ResolvedEntry>,
    /// Hard errors only; soft failures are logged and dropped
    pub errors: Vec<ResolveError>,
    /// Functions rejected at registration
    pub diagnostics: Vec<Diagnostic>,
}

/// Methods that update their receiver in place
const MUTATING_METHODS: [&str; 6] = ["Parse", "ParseFS", "Funcs", "Delims", "Option", "AddParseTree"];

/// Resolve every variable in `receivers`
pub fn resolve(unit: &Unit, receivers: &BTreeSet<ObjectId>, defaults: &Functions) -> Resolution {
    let mut resolver = Resolver::new(unit, defaults);
    for receiver in receivers {
        resolver.resolve_object(*receiver);
    }
    resolver.revisit();
    resolver.finish()
}

struct Declaration<'u> {
    name: &'u str,
    value: &'u Expr,
}

/// In-flight state of one chain evaluation
struct Chain {
    functions: Functions,
    provenance: Provenance,
}

struct Resolver<'u> {
    unit: &'u Unit,
    defaults: &'u Functions,
    declarations: HashMap<ObjectId, Declaration<'u>>,
    reassigned: HashSet<ObjectId>,
    resolved: HashMap<ObjectId, Option<ResolvedEntry>>,
    in_progress: HashSet<ObjectId>,
    errors: Vec<ResolveError>,
    diagnostics: Vec<Diagnostic>,
}

impl<'u> Resolver<'u> {
    fn new(unit: &'u Unit, defaults: &'u Functions) -> Self {
        let mut declarations = HashMap::new();
        let mut reassigned = HashSet::new();
        for stmt in unit.stmts() {
            match stmt {
                Stmt::Var {
                    name,
                    object,
                    value: Some(value),
                } => {
                    declarations.insert(*object, Declaration { name, value });
                }
                Stmt::Assign { object, .. } => {
                    reassigned.insert(*object);
                }
                _ => {}
            }
        }
        Self {
            unit,
            defaults,
            declarations,
            reassigned,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
            errors: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn finish(self) -> Resolution {
        Resolution {
            entries: self
                .resolved
                .into_iter()
                .filter_map(|(object, entry)| entry.map(|e| (object, e)))
                .collect(),
            errors: self.errors,
            diagnostics: self.diagnostics,
        }
    }

    fn resolve_object(&mut self, object: ObjectId) -> Option<ResolvedEntry> {
        if let Some(done) = self.resolved.get(&object) {
            return done.clone();
        }
        let result = self.evaluate_object(object);
        match result {
            Ok(entry) => {
                self.resolved.insert(object, Some(entry.clone()));
                Some(entry)
            }
            Err(error) => {
                self.fail(object, error);
                self.resolved.insert(object, None);
                None
            }
        }
    }

    fn fail(&mut self, object: ObjectId, error: ResolveError) {
        let name = self.declarations.get(&object).map_or("?", |d| d.name);
        if error.is_hard() {
            tracing::warn!(receiver = name, %error, "template resolution failed");
            self.errors.push(error);
        } else {
            tracing::debug!(receiver = name, %error, "receiver left unresolved");
        }
    }

    fn evaluate_object(&mut self, object: ObjectId) -> Result<ResolvedEntry, ResolveError> {
        let Some(declaration) = self.declarations.get(&object) else {
            return Err(ResolveError::Unresolvable {
                pos: Location::new("", 0, 0),
            });
        };
        let (name, value) = (declaration.name, declaration.value);
        if self.reassigned.contains(&object) {
            return Err(ResolveError::Reassigned {
                pos: value.pos.clone(),
                name: name.to_string(),
            });
        }
        if !self.in_progress.insert(object) {
            return Err(ResolveError::Cycle {
                pos: value.pos.clone(),
                name: name.to_string(),
            });
        }
        let mut chain = Chain {
            functions: self.defaults.clone(),
            provenance: Provenance::default(),
        };
        let result = self.evaluate(value, &mut chain);
        self.in_progress.remove(&object);
        Ok(ResolvedEntry {
            template: result?,
            functions: chain.functions,
            provenance: chain.provenance,
        })
    }

    /// Apply later mutating calls on resolved variables, in source order
    fn revisit(&mut self) {
        let unit = self.unit;
        for expr in unit.exprs() {
            let Some((object, call)) = mutation_of(expr) else {
                continue;
            };
            let Some(Some(entry)) = self.resolved.get(&object) else {
                continue;
            };
            let mut chain = Chain {
                functions: entry.functions.clone(),
                provenance: Provenance::default(),
            };
            let base = entry.template.clone();
            let ExprKind::Call {
                callee: Callee::Method { name, .. },
                args,
            } = &call.kind
            else {
                continue;
            };
            match self.apply_method(base, name, args, call, &mut chain) {
                Ok(template) => {
                    if let Some(Some(entry)) = self.resolved.get_mut(&object) {
                        entry.template = template;
                        entry.functions = chain.functions;
                        entry.provenance.parse_calls.extend(chain.provenance.parse_calls);
                        entry.provenance.bundle_files.extend(chain.provenance.bundle_files);
                    }
                }
                Err(error) => self.fail(object, error),
            }
        }
    }

    fn evaluate(&mut self, expr: &Expr, chain: &mut Chain) -> Result<Box<dyn Template>, ResolveError> {
        match &expr.kind {
            ExprKind::Ident {
                object: Some(object), ..
            } => {
                let entry = self.resolve_object(*object).ok_or_else(|| ResolveError::Unresolvable {
                    pos: expr.pos.clone(),
                })?;
                chain.functions.extend(&entry.functions);
                Ok(entry.template)
            }
            ExprKind::Call {
                callee: Callee::Package { path, name },
                args,
            } => {
                let variant = Variant::from_package(path).ok_or_else(|| unsupported(expr, name))?;
                self.apply_function(variant, name, args, expr, chain)
            }
            ExprKind::Call {
                callee: Callee::Method { receiver, name },
                args,
            } => {
                if self.unit.template_variant(receiver.ty).is_none() {
                    return Err(unsupported(expr, name));
                }
                let base = self.evaluate(receiver, chain)?;
                self.apply_method(base, name, args, expr, chain)
            }
            _ => Err(ResolveError::Unresolvable { pos: expr.pos.clone() }),
        }
    }

    fn apply_function(
        &mut self,
        variant: Variant,
        name: &str,
        args: &[Expr],
        call: &Expr,
        chain: &mut Chain,
    ) -> Result<Box<dyn Template>, ResolveError> {
        match (name, args) {
            ("New", [template_name]) => Ok(new_template(variant, literal(template_name)?)),
            ("Must", [inner]) => self.evaluate(inner, chain),
            ("ParseFS", [_, patterns @ ..]) => {
                let patterns = literals(patterns)?;
                self.parse_fs(None, variant, &patterns, call, chain)
            }
            _ => Err(unsupported(call, name)),
        }
    }

    fn apply_method(
        &mut self,
        base: Box<dyn Template>,
        name: &str,
        args: &[Expr],
        call: &Expr,
        chain: &mut Chain,
    ) -> Result<Box<dyn Template>, ResolveError> {
        let template_error = |source| ResolveError::Template {
            pos: call.pos.clone(),
            source,
        };
        match (name, args) {
            ("New", [template_name]) => Ok(base.new_template(literal(template_name)?)),
            ("Parse", [text]) => {
                let source = literal(text)?;
                chain.provenance.parse_calls.push(text.pos.clone());
                base.parse_at(source, literal_origin(text)).map_err(template_error)
            }
            ("Funcs", [mapping]) => {
                let names = self.register_funcs(mapping, chain)?;
                Ok(base.funcs(&names))
            }
            ("Option", options) => {
                let options = literals(options)?;
                base.option(&options).map_err(template_error)
            }
            ("Delims", [left, right]) => Ok(base.delims(literal(left)?, literal(right)?)),
            ("Lookup", [template_name]) => base
                .lookup(literal(template_name)?)
                .ok_or_else(|| ResolveError::Unresolvable { pos: call.pos.clone() }),
            ("ParseFS", [_, patterns @ ..]) => {
                let patterns = literals(patterns)?;
                let variant = base.variant();
                self.parse_fs(Some(base.as_ref()), variant, &patterns, call, chain)
            }
            ("AddParseTree", [template_name, tree]) => {
                let name = literal(template_name)?;
                let ExprKind::Field { base: owner, name: field } = &tree.kind else {
                    return Err(ResolveError::Unresolvable { pos: tree.pos.clone() });
                };
                if field != "Tree" {
                    return Err(ResolveError::Unresolvable { pos: tree.pos.clone() });
                }
                let owner = self.evaluate(owner, chain)?;
                let parsed = owner
                    .tree()
                    .ok_or_else(|| ResolveError::Unresolvable { pos: tree.pos.clone() })?;
                Ok(base.add_parse_tree(name, parsed.as_ref().clone()))
            }
            ("Clone", []) => Ok(base),
            _ => Err(unsupported(call, name)),
        }
    }

    fn parse_fs(
        &mut self,
        base: Option<&dyn Template>,
        variant: Variant,
        patterns: &[String],
        call: &Expr,
        chain: &mut Chain,
    ) -> Result<Box<dyn Template>, ResolveError> {
        let bundle = &self.unit.bundle;
        let files = bundle
            .matches(patterns)
            .map_err(|source| ResolveError::Bundle {
                pos: call.pos.clone(),
                source,
            })?;
        chain
            .provenance
            .bundle_files
            .extend(files.into_iter().map(str::to_string));
        bundle
            .parse_fs(base, variant, patterns)
            .map_err(|error| ResolveError::from_parse_fs(&call.pos, error))
    }

    /// Register every entry of a function map; returns the names to declare
    fn register_funcs(&mut self, mapping: &Expr, chain: &mut Chain) -> Result<Vec<String>, ResolveError> {
        let source = match &mapping.kind {
            ExprKind::Ident {
                object: Some(object), ..
            } if !self.reassigned.contains(object) => match self.declarations.get(object) {
                Some(declaration) => declaration.value,
                None => mapping,
            },
            _ => mapping,
        };
        let ExprKind::FuncMap(entries) = &source.kind else {
            return Err(ResolveError::Unresolvable { pos: mapping.pos.clone() });
        };

        let mut names = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let name = literal(key)?;
            if let Err(error) = chain.functions.register_type(&self.unit.types, name, value.ty) {
                self.reject(&value.pos, error);
            }
            names.push(name.to_string());
        }
        Ok(names)
    }

    fn reject(&mut self, pos: &Location, error: SignatureError) {
        let diagnostic = Diagnostic::new(pos.clone(), error.to_string());
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }
}

fn unsupported(call: &Expr, name: &str) -> ResolveError {
    ResolveError::Unsupported {
        pos: call.pos.clone(),
        name: name.to_string(),
    }
}

fn literal(expr: &Expr) -> Result<&str, ResolveError> {
    expr.literal().ok_or_else(|| ResolveError::NotLiteral { pos: expr.pos.clone() })
}

fn literals(exprs: &[Expr]) -> Result<Vec<String>, ResolveError> {
    exprs.iter().map(|e| literal(e).map(str::to_string)).collect()
}

/// Template positions inside a literal start one column after its quote
fn literal_origin(text: &Expr) -> Origin {
    Origin::Source {
        file: text.pos.file.clone(),
        line: text.pos.line,
        column: text.pos.column + 1,
    }
}

/// `v.Method(...)` for a mutating method on variable `v`
///
/// Calls wrapped in `Must` are reached by the expression walk itself.
fn mutation_of(expr: &Expr) -> Option<(ObjectId, &Expr)> {
    let ExprKind::Call {
        callee: Callee::Method { receiver, name },
        ..
    } = &expr.kind
    else {
        return None;
    };
    if !MUTATING_METHODS.contains(&name.as_str()) {
        return None;
    }
    match &receiver.kind {
        ExprKind::Ident {
            object: Some(object), ..
        } => Some((*object, expr)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Signature, TypeId};
    use crate::template::Bundle;

    const TEXT: &str = "text/template";

    struct Builder {
        unit: Unit,
        tmpl: TypeId,
    }

    impl Builder {
        fn new() -> Self {
            let mut unit = Unit::new("example.com/app");
            let tmpl = unit.template_type(Variant::Text);
            Self { unit, tmpl }
        }

        fn new_call(&self, name: &str) -> Expr {
            Expr::package_call(TEXT, "New", vec![Expr::string(name)], self.tmpl)
        }

        fn method(&self, receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
            Expr::method_call(receiver, name, args, self.tmpl)
        }

        fn must(&self, inner: Expr) -> Expr {
            Expr::package_call(TEXT, "Must", vec![inner], self.tmpl)
        }

        fn var(&mut self, name: &str, value: Expr) -> ObjectId {
            let object = self.unit.object();
            self.unit.add_file(
                "main.go",
                vec![Stmt::Var {
                    name: name.to_string(),
                    object,
                    value: Some(value),
                }],
            );
            object
        }

        fn ident(&self, name: &str, object: ObjectId) -> Expr {
            Expr::ident(name, object, self.tmpl)
        }

        fn resolve(&self, receivers: &[ObjectId]) -> Resolution {
            let receivers = receivers.iter().copied().collect();
            resolve(&self.unit, &receivers, &Functions::builtins())
        }
    }

    #[test]
    fn test_new_then_parse() {
        let mut b = Builder::new();
        let parse = b.method(b.new_call("a"), "Parse", vec![Expr::raw_string("{{.Name}}").at("main.go", 4, 30)]);
        let ts = b.var("ts", b.must(parse));
        let resolution = b.resolve(&[ts]);
        let entry = &resolution.entries[&ts];
        assert_eq!(entry.template.name(), "a");
        let tree = entry.template.tree().unwrap();
        assert_eq!(tree.location(&(2..7)).to_string(), "main.go:4:33");
        assert_eq!(entry.provenance.parse_calls, vec![Location::new("main.go", 4, 30)]);
    }

    #[test]
    fn test_delims_apply_to_later_parse() {
        let mut b = Builder::new();
        let delims = b.method(b.new_call("a"), "Delims", vec![Expr::string("[["), Expr::string("]]")]);
        let parse = b.method(delims, "Parse", vec![Expr::string("[[.X]]")]);
        let ts = b.var("ts", parse);
        let resolution = b.resolve(&[ts]);
        let tree = resolution.entries[&ts].template.tree().unwrap();
        assert_eq!(tree.root.len(), 1);
    }

    #[test]
    fn test_unsupported_step_leaves_receiver_unresolved() {
        let mut b = Builder::new();
        let files = b.method(b.new_call("a"), "ParseFiles", vec![Expr::string("a.tmpl")]);
        let ts = b.var("ts", files);
        let dynamic = b.method(b.new_call("b"), "Parse", vec![Expr::opaque(TypeId::STRING)]);
        let other = b.var("other", dynamic);
        let resolution = b.resolve(&[ts, other]);
        assert!(resolution.entries.is_empty());
        assert!(resolution.errors.is_empty());
    }

    #[test]
    fn test_parse_fs_loads_bundle_files() {
        let mut b = Builder::new();
        b.unit.bundle = Bundle::new()
            .with_file("templates/index.gohtml", "{{template \"nav.gohtml\" .}}")
            .with_file("templates/nav.gohtml", "{{.User}}");
        let fs = Expr::opaque(TypeId::ANY);
        let load = Expr::package_call(TEXT, "ParseFS", vec![fs, Expr::string("templates/*.gohtml")], b.tmpl);
        let ts = b.var("ts", b.must(load));
        let resolution = b.resolve(&[ts]);
        let entry = &resolution.entries[&ts];
        assert_eq!(entry.template.name(), "index.gohtml");
        assert!(entry.template.lookup("nav.gohtml").is_some());
        assert_eq!(
            entry.provenance.bundle_files,
            vec!["templates/index.gohtml", "templates/nav.gohtml"]
        );
    }

    #[test]
    fn test_unmatched_pattern_is_hard_error() {
        let mut b = Builder::new();
        let fs = Expr::opaque(TypeId::ANY);
        let load = Expr::package_call(TEXT, "ParseFS", vec![fs, Expr::string("missing/*.tmpl")], b.tmpl)
            .at("main.go", 9, 12);
        let ts = b.var("ts", b.must(load));
        let resolution = b.resolve(&[ts]);
        assert!(resolution.entries.is_empty());
        assert_eq!(resolution.errors.len(), 1);
        assert!(resolution.errors[0].is_hard());
        assert_eq!(
            resolution.errors[0].to_string(),
            r#"main.go:9:12: template: pattern matches no files: "missing/*.tmpl""#
        );
    }

    #[test]
    fn test_funcs_registers_signatures() {
        let mut b = Builder::new();
        let upper = b.unit.types.func(Signature::new(vec![TypeId::STRING], vec![TypeId::STRING]));
        let pair = b
            .unit
            .types
            .func(Signature::new(vec![], vec![TypeId::STRING, TypeId::INT]));
        let mapping = Expr::func_map(
            vec![
                (Expr::string("upper"), Expr::opaque(upper)),
                (Expr::string("pair"), Expr::opaque(pair).at("main.go", 7, 10)),
            ],
            TypeId::ANY,
        );
        let funcs = b.method(b.new_call("a"), "Funcs", vec![mapping]);
        let parse = b.method(funcs, "Parse", vec![Expr::string("{{upper .}}")]);
        let ts = b.var("ts", parse);
        let resolution = b.resolve(&[ts]);
        let entry = &resolution.entries[&ts];
        assert!(entry.functions.is_defined("upper"));
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(
            resolution.diagnostics[0].to_string(),
            r#"main.go:7:10: can't install function "pair": second result must be error, not int"#
        );
    }

    #[test]
    fn test_variable_receivers_and_revisits() {
        let mut b = Builder::new();
        let base = b.var("base", b.new_call("base"));
        let child = b.method(b.ident("base", base), "New", vec![Expr::string("child")]);
        let child = b.method(child, "Parse", vec![Expr::string("{{.X}}")]);
        let page = b.var("page", child);
        let later = b.method(b.ident("base", base), "Parse", vec![Expr::string("{{.Y}}")]);
        b.unit.add_file("later.go", vec![Stmt::Expr(b.must(later))]);

        let resolution = b.resolve(&[page, base]);
        let page = &resolution.entries[&page];
        assert_eq!(page.template.name(), "child");
        let base = &resolution.entries[&base];
        assert_eq!(base.template.name(), "base");
        assert!(base.template.tree().unwrap().text.contains(".Y"));
    }

    #[test]
    fn test_reassigned_and_cyclic_receivers_are_unresolved() {
        let mut b = Builder::new();
        let ts = b.var("ts", b.new_call("a"));
        b.unit.add_file(
            "main.go",
            vec![Stmt::Assign {
                object: ts,
                value: Expr::opaque(b.tmpl),
            }],
        );
        let a = b.unit.object();
        let loop_a = b.method(b.ident("a", a), "New", vec![Expr::string("x")]);
        b.unit.add_file(
            "loop.go",
            vec![Stmt::Var {
                name: "a".to_string(),
                object: a,
                value: Some(loop_a),
            }],
        );
        let resolution = b.resolve(&[ts, a]);
        assert!(resolution.entries.is_empty());
        assert!(resolution.errors.is_empty());
    }
}
