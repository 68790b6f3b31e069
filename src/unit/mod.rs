//! Compiled units: the host program as seen by the checker
//!
//! A [`Unit`] is a type-checked package reduced to what template resolution
//! needs: declarations and assignments of variables, call expressions with
//! static types, string literals with their positions, and the file bundle
//! attached to the package. Front ends for a concrete host language lower
//! their syntax trees into this form.

pub mod resolver;
pub mod scan;

use std::collections::HashMap;

use crate::diagnostic::Location;
use crate::host::{TypeId, TypeTable};
use crate::template::{Bundle, Variant};

pub use resolver::{resolve, Provenance, Resolution, ResolveError, ResolvedEntry};
pub use scan::{scan, PendingCall};

/// Identity of a declared variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// An expression with its static type and position
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// [`TypeId::INVALID`] when unknown
    pub ty: TypeId,
    pub pos: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A use of a variable; `object` is `None` for unresolved identifiers
    Ident { name: String, object: Option<ObjectId> },
    /// A string literal; `raw` for back-quoted literals
    Str { value: String, raw: bool },
    Call { callee: Callee, args: Vec<Expr> },
    /// `base.name` where `name` is not a package member
    Field { base: Box<Expr>, name: String },
    /// A function-map composite literal: name literal to function value
    FuncMap(Vec<(Expr, Expr)>),
    /// Anything the checker does not look into
    Other(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// `pkg.Name(...)` for the package imported from `path`
    Package { path: String, name: String },
    /// `receiver.Name(...)`
    Method { receiver: Box<Expr>, name: String },
    /// Calls through any other expression
    Other(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TypeId) -> Self {
        Self {
            kind,
            ty,
            pos: Location::new("", 0, 0),
        }
    }

    /// Set the position (1-based line and column)
    pub fn at(mut self, file: &str, line: usize, column: usize) -> Self {
        self.pos = Location::new(file, line, column);
        self
    }

    pub fn ident(name: &str, object: ObjectId, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Ident {
                name: name.to_string(),
                object: Some(object),
            },
            ty,
        )
    }

    pub fn string(value: &str) -> Self {
        Self::new(
            ExprKind::Str {
                value: value.to_string(),
                raw: false,
            },
            TypeId::UNTYPED_STRING,
        )
    }

    pub fn raw_string(value: &str) -> Self {
        Self::new(
            ExprKind::Str {
                value: value.to_string(),
                raw: true,
            },
            TypeId::UNTYPED_STRING,
        )
    }

    pub fn package_call(path: &str, name: &str, args: Vec<Expr>, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::Package {
                    path: path.to_string(),
                    name: name.to_string(),
                },
                args,
            },
            ty,
        )
    }

    pub fn method_call(receiver: Expr, name: &str, args: Vec<Expr>, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::Method {
                    receiver: Box::new(receiver),
                    name: name.to_string(),
                },
                args,
            },
            ty,
        )
    }

    pub fn field(base: Expr, name: &str, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Field {
                base: Box::new(base),
                name: name.to_string(),
            },
            ty,
        )
    }

    pub fn func_map(entries: Vec<(Expr, Expr)>, ty: TypeId) -> Self {
        Self::new(ExprKind::FuncMap(entries), ty)
    }

    /// An opaque expression of type `ty`
    pub fn opaque(ty: TypeId) -> Self {
        Self::new(ExprKind::Other(Vec::new()), ty)
    }

    /// The literal value, if this is a string literal
    pub fn literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Visit this expression and every nested one, outermost first
    pub fn walk<'e>(&'e self, visit: &mut dyn FnMut(&'e Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Ident { .. } | ExprKind::Str { .. } => {}
            ExprKind::Call { callee, args } => {
                match callee {
                    Callee::Method { receiver, .. } | Callee::Other(receiver) => receiver.walk(visit),
                    Callee::Package { .. } => {}
                }
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::Field { base, .. } => base.walk(visit),
            ExprKind::FuncMap(entries) => {
                for (key, value) in entries {
                    key.walk(visit);
                    value.walk(visit);
                }
            }
            ExprKind::Other(children) => {
                for child in children {
                    child.walk(visit);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `var name = value` or `name := value`
    Var {
        name: String,
        object: ObjectId,
        value: Option<Expr>,
    },
    /// `name = value`
    Assign { object: ObjectId, value: Expr },
    Expr(Expr),
    /// A function body or nested block
    Block(Vec<Stmt>),
}

impl Stmt {
    /// Visit every statement, depth first in source order
    pub fn walk<'s>(&'s self, visit: &mut dyn FnMut(&'s Stmt)) {
        visit(self);
        if let Stmt::Block(stmts) = self {
            for stmt in stmts {
                stmt.walk(visit);
            }
        }
    }

    /// Top-level expressions of this statement
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        let expr = match self {
            Stmt::Var { value, .. } => value.as_ref(),
            Stmt::Assign { value, .. } => Some(value),
            Stmt::Expr(expr) => Some(expr),
            Stmt::Block(_) => None,
        };
        expr.into_iter()
    }
}

/// One source file of a unit
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub stmts: Vec<Stmt>,
}

/// A compiled unit: one type-checked package
#[derive(Debug, Clone)]
pub struct Unit {
    pub package: String,
    pub types: TypeTable,
    pub files: Vec<SourceFile>,
    pub bundle: Bundle,
    objects: u32,
    template_types: HashMap<Variant, TypeId>,
}

impl Unit {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            types: TypeTable::new(),
            files: Vec::new(),
            bundle: Bundle::new(),
            objects: 0,
            template_types: HashMap::new(),
        }
    }

    pub fn with_bundle(mut self, bundle: Bundle) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn add_file(&mut self, name: impl Into<String>, stmts: Vec<Stmt>) {
        self.files.push(SourceFile {
            name: name.into(),
            stmts,
        });
    }

    /// Allocate a new variable identity
    pub fn object(&mut self) -> ObjectId {
        self.objects += 1;
        ObjectId(self.objects)
    }

    /// `*Template` of the given engine variant
    pub fn template_type(&mut self, variant: Variant) -> TypeId {
        if let Some(ty) = self.template_types.get(&variant) {
            return *ty;
        }
        let named = self.types.declare_named(variant.package(), "Template");
        let empty = self.types.structure(Vec::new());
        self.types.set_underlying(named, empty);
        let pointer = self.types.pointer(named);
        self.template_types.insert(variant, pointer);
        pointer
    }

    /// The engine variant when `ty` is a template handle type
    pub fn template_variant(&self, ty: TypeId) -> Option<Variant> {
        let named = self.types.named_type(self.types.indirect(ty))?;
        if named.name != "Template" {
            return None;
        }
        Variant::from_package(&named.package)
    }

    /// Every statement of every file, in source order
    pub fn stmts(&self) -> impl Iterator<Item = &Stmt> {
        let mut all = Vec::new();
        for file in &self.files {
            for stmt in &file.stmts {
                stmt.walk(&mut |s| all.push(s));
            }
        }
        all.into_iter()
    }

    /// Every expression of every statement, outermost first in source order
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        let mut all = Vec::new();
        for stmt in self.stmts() {
            for expr in stmt.exprs() {
                expr.walk(&mut |e| all.push(e));
            }
        }
        all.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_type_is_recognised() {
        let mut unit = Unit::new("example.com/app");
        let html = unit.template_type(Variant::Html);
        assert_eq!(unit.template_type(Variant::Html), html);
        assert_eq!(unit.template_variant(html), Some(Variant::Html));
        assert_eq!(unit.template_variant(TypeId::STRING), None);
        assert_eq!(unit.types.display(html).to_string(), "*html/template.Template");
    }

    #[test]
    fn test_exprs_visits_nested_calls_in_order() {
        let mut unit = Unit::new("example.com/app");
        let ts = unit.object();
        let inner = Expr::method_call(Expr::ident("ts", ts, TypeId::ANY), "Parse", vec![Expr::string("x")], TypeId::ANY);
        let outer = Expr::package_call("text/template", "Must", vec![inner], TypeId::ANY);
        unit.add_file(
            "main.go",
            vec![Stmt::Block(vec![Stmt::Expr(outer), Stmt::Assign {
                object: ts,
                value: Expr::opaque(TypeId::ANY),
            }])],
        );
        let kinds: Vec<&str> = unit
            .exprs()
            .map(|e| match &e.kind {
                ExprKind::Call { .. } => "call",
                ExprKind::Ident { .. } => "ident",
                ExprKind::Str { .. } => "str",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["call", "call", "ident", "str", "other"]);
    }
}
