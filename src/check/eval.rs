//! Type checking evaluator
//!
//! Walks a parse tree with an explicit [`Scope`] and computes the static type
//! of every pipeline instead of its value. Problems are collected as
//! [`Diagnostic`]s; once a subtree has reported one, it yields
//! [`TypeId::INVALID`] and its dependents stay quiet.

use std::collections::HashSet;

use serde::Serialize;

use super::scope::Scope;
use crate::diagnostic::{Diagnostic, Location};
use crate::host::{Kind, LookupError, Member, TypeId, TypeKind, TypeTable};
use crate::parser::{Arg, Branch, Command, Node, NumberKind, Pipeline, Span, Spanned, TemplateCall, Tree};
use crate::template::{Function, Functions, TreeFinder};

/// A checked template invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub location: Location,
    pub template: String,
    pub data: String,
}

/// Diagnostics and the invocation log of one checking pass
#[derive(Debug, Clone, Default)]
pub struct CheckOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub calls: Vec<CallRecord>,
}

/// The checker state for one pass over a template forest
pub struct Checker<'a> {
    pub(super) types: &'a TypeTable,
    finder: &'a dyn TreeFinder,
    pub(super) functions: &'a Functions,
    diagnostics: Vec<Diagnostic>,
    reported: HashSet<Diagnostic>,
    /// Trees on the active call path
    active: Vec<String>,
    /// Trees already checked with a given dot
    checked: HashSet<(String, TypeId)>,
    calls: Vec<CallRecord>,
}

impl<'a> Checker<'a> {
    pub fn new(types: &'a TypeTable, finder: &'a dyn TreeFinder, functions: &'a Functions) -> Self {
        Self {
            types,
            finder,
            functions,
            diagnostics: Vec::new(),
            reported: HashSet::new(),
            active: Vec::new(),
            checked: HashSet::new(),
            calls: Vec::new(),
        }
    }

    /// Check `tree` executed with data of type `data`
    pub fn check(&mut self, tree: &Tree, data: TypeId) {
        if !self.checked.insert((tree.name.clone(), data)) {
            return;
        }
        self.active.push(tree.name.clone());
        let mut scope = Scope::new(data);
        self.walk_list(tree, &tree.root, &mut scope);
        self.active.pop();
    }

    /// Log an invocation made from outside any template
    pub fn record(&mut self, location: Location, template: &str, data: TypeId) {
        self.calls.push(CallRecord {
            location,
            template: template.to_string(),
            data: self.types.display(data).to_string(),
        });
    }

    pub fn finish(self) -> CheckOutput {
        CheckOutput {
            diagnostics: self.diagnostics,
            calls: self.calls,
        }
    }

    pub(super) fn report(&mut self, tree: &Tree, span: &Span, message: impl Into<String>) {
        let diagnostic = Diagnostic::in_tree(tree, span, message);
        if self.reported.insert(diagnostic.clone()) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub(super) fn display(&self, ty: TypeId) -> String {
        self.types.display(ty).to_string()
    }

    fn walk_list(&mut self, tree: &Tree, list: &[Spanned<Node>], scope: &mut Scope) {
        for node in list {
            self.walk(tree, node, scope);
        }
    }

    fn walk(&mut self, tree: &Tree, node: &Spanned<Node>, scope: &mut Scope) {
        match &node.node {
            Node::Text(_) | Node::Comment(_) | Node::Break | Node::Continue => {}
            Node::Action(pipe) => {
                let ty = self.pipeline(tree, pipe, scope);
                if pipe.decl.is_empty() {
                    self.check_printable(tree, pipe, ty);
                }
            }
            Node::If(branch) => self.walk_if_or_with(tree, branch, false, scope),
            Node::With(branch) => self.walk_if_or_with(tree, branch, true, scope),
            Node::Range(branch) => self.walk_range(tree, branch, scope),
            Node::Template(call) => self.walk_template(tree, call, scope),
            Node::Block(call, body) => {
                // Blocks are normally extracted at parse time; check in place otherwise.
                let dot = match &call.pipe {
                    Some(pipe) => self.pipeline(tree, pipe, scope),
                    None => scope.dot(),
                };
                scope.scoped(dot, |scope| self.walk_list(tree, body, scope));
            }
        }
    }

    fn walk_if_or_with(&mut self, tree: &Tree, branch: &Branch, rebind: bool, scope: &mut Scope) {
        let outer = scope.dot();
        scope.scoped(outer, |scope| {
            let ty = self.pipeline(tree, &branch.pipe, scope);
            if !self.types.is_emptiness_testable(ty) {
                let span = pipeline_span(&branch.pipe);
                self.report(
                    tree,
                    &span,
                    format!("type {} cannot be tested for truthiness", self.display(ty)),
                );
            }
            let body_dot = if rebind { ty } else { outer };
            scope.scoped(body_dot, |scope| self.walk_list(tree, &branch.list, scope));
            if let Some(else_list) = &branch.else_list {
                scope.scoped(outer, |scope| self.walk_list(tree, else_list, scope));
            }
        });
    }

    fn walk_range(&mut self, tree: &Tree, branch: &Branch, scope: &mut Scope) {
        let outer = scope.dot();
        scope.scoped(outer, |scope| {
            let ty = self.commands(tree, &branch.pipe, scope);
            let span = pipeline_span(&branch.pipe);
            let (key, elem) = match self.iteration(ty) {
                Some(pair) => pair,
                None => {
                    self.report(tree, &span, format!("range can't iterate over {}", self.display(ty)));
                    (TypeId::INVALID, TypeId::INVALID)
                }
            };
            let single_valued = key.is_invalid() && !elem.is_invalid();
            let bindings: Vec<TypeId> = match branch.pipe.decl.len() {
                0 => Vec::new(),
                1 => vec![elem],
                _ if single_valued => {
                    self.report(
                        tree,
                        &branch.pipe.decl[1].span,
                        format!("range over {} permits only one iteration variable", self.display(ty)),
                    );
                    vec![elem, TypeId::INVALID]
                }
                _ => vec![key, elem],
            };
            scope.scoped(elem, |scope| {
                for (var, ty) in branch.pipe.decl.iter().zip(bindings) {
                    self.bind(tree, var, ty, branch.pipe.is_assign, scope);
                }
                self.walk_list(tree, &branch.list, scope);
            });
            if let Some(else_list) = &branch.else_list {
                scope.scoped(outer, |scope| self.walk_list(tree, else_list, scope));
            }
        });
    }

    /// Key and element types produced by ranging over `ty`
    ///
    /// Iterations that produce a single value report an invalid key.
    fn iteration(&self, ty: TypeId) -> Option<(TypeId, TypeId)> {
        if ty.is_invalid() {
            return Some((TypeId::INVALID, TypeId::INVALID));
        }
        let types = self.types;
        let base = types.indirect(ty);
        match types.underlying_kind(base) {
            Kind::Invalid => Some((TypeId::INVALID, TypeId::INVALID)),
            Kind::Sequence | Kind::Map => Some((types.key(base)?, types.elem(base)?)),
            Kind::Channel => Some((TypeId::INVALID, types.elem(base)?)),
            Kind::Interface => Some((TypeId::ANY, TypeId::ANY)),
            Kind::Basic => {
                let kind = types.basic_kind(base).filter(|kind| kind.is_integer())?;
                let count = if kind.is_untyped() { types.default_type(kind) } else { base };
                Some((TypeId::INVALID, count))
            }
            Kind::Function => {
                let sig = types.signature(base)?;
                let [yield_fn] = sig.params.as_slice() else {
                    return None;
                };
                if !sig.results.is_empty() {
                    return None;
                }
                let yield_sig = types.signature(*yield_fn)?;
                if !matches!(yield_sig.results.as_slice(), [result] if *result == TypeId::BOOL) {
                    return None;
                }
                match yield_sig.params.as_slice() {
                    [value] => Some((TypeId::INVALID, *value)),
                    [key, value] => Some((*key, *value)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn walk_template(&mut self, tree: &Tree, call: &TemplateCall, scope: &mut Scope) {
        let dot = match &call.pipe {
            Some(pipe) => scope.scoped(scope.dot(), |scope| self.pipeline(tree, pipe, scope)),
            None => scope.dot(),
        };
        let name = call.name.node.as_str();
        let Some(target) = self.finder.find_tree(name) else {
            tracing::debug!(template = name, "skipping call to unknown template");
            return;
        };
        if self.active.iter().any(|active| active == name) {
            tracing::debug!(template = name, "recursive template call not re-checked");
            return;
        }
        self.calls.push(CallRecord {
            location: tree.location(&call.name.span),
            template: name.to_string(),
            data: self.display(dot),
        });
        self.check(&target, dot);
    }

    fn bind(&mut self, tree: &Tree, var: &Spanned<String>, ty: TypeId, is_assign: bool, scope: &mut Scope) {
        if !is_assign {
            scope.declare(&var.node, ty);
        } else if !scope.assign(&var.node, ty) {
            self.report(
                tree,
                &var.span,
                format!("undefined variable {:?} in assignment", var.node),
            );
        }
    }

    /// Evaluate a pipeline and bind its declared variables
    pub(super) fn pipeline(&mut self, tree: &Tree, pipe: &Pipeline, scope: &mut Scope) -> TypeId {
        let ty = self.commands(tree, pipe, scope);
        for var in &pipe.decl {
            self.bind(tree, var, ty, pipe.is_assign, scope);
        }
        ty
    }

    fn commands(&mut self, tree: &Tree, pipe: &Pipeline, scope: &mut Scope) -> TypeId {
        let mut piped = None;
        for command in &pipe.commands {
            piped = Some(self.command(tree, command, piped, scope));
        }
        piped.unwrap_or(TypeId::INVALID)
    }

    fn command(
        &mut self,
        tree: &Tree,
        command: &Spanned<Command>,
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> TypeId {
        let Some((first, args)) = command.node.args.split_first() else {
            return TypeId::INVALID;
        };
        match &first.node {
            Arg::Identifier(name) => self.call_function(tree, name, &first.span, args, piped, scope),
            Arg::Field(fields) => {
                let dot = scope.dot();
                self.field_chain(tree, &first.span, dot, fields, args, piped, scope)
            }
            Arg::Variable { name, fields } if !fields.is_empty() => {
                let base = self.variable(tree, name, &first.span, scope);
                self.field_chain(tree, &first.span, base, fields, args, piped, scope)
            }
            Arg::Chain { base, fields } => {
                let base = self.operand(tree, base, scope);
                self.field_chain(tree, &first.span, base, fields, args, piped, scope)
            }
            Arg::Nil => {
                self.report(tree, &first.span, "nil is not a command");
                TypeId::INVALID
            }
            _ => {
                if !args.is_empty() || piped.is_some() {
                    let text = span_text(tree, &first.span);
                    self.report(tree, &first.span, format!("can't give argument to non-function {}", text));
                    for arg in args {
                        self.operand(tree, arg, scope);
                    }
                    return TypeId::INVALID;
                }
                self.operand(tree, first, scope)
            }
        }
    }

    /// Type of an argument position
    pub(super) fn operand(&mut self, tree: &Tree, arg: &Spanned<Arg>, scope: &mut Scope) -> TypeId {
        match &arg.node {
            Arg::Dot => scope.dot(),
            Arg::Nil => TypeId::UNTYPED_NIL,
            Arg::Bool(_) => TypeId::UNTYPED_BOOL,
            Arg::String(_) => TypeId::UNTYPED_STRING,
            Arg::Number { kind, .. } => match kind {
                NumberKind::Int => TypeId::UNTYPED_INT,
                NumberKind::Float => TypeId::UNTYPED_FLOAT,
                NumberKind::Complex => TypeId::UNTYPED_COMPLEX,
                NumberKind::Rune => TypeId::UNTYPED_RUNE,
            },
            Arg::Field(fields) => {
                let dot = scope.dot();
                self.field_chain(tree, &arg.span, dot, fields, &[], None, scope)
            }
            Arg::Variable { name, fields } => {
                let base = self.variable(tree, name, &arg.span, scope);
                self.field_chain(tree, &arg.span, base, fields, &[], None, scope)
            }
            Arg::Identifier(name) => self.call_function(tree, name, &arg.span, &[], None, scope),
            Arg::Pipeline(pipe) => self.pipeline(tree, pipe, scope),
            Arg::Chain { base, fields } => {
                let base = self.operand(tree, base, scope);
                self.field_chain(tree, &arg.span, base, fields, &[], None, scope)
            }
        }
    }

    fn variable(&mut self, tree: &Tree, name: &str, span: &Span, scope: &Scope) -> TypeId {
        match scope.lookup(name) {
            Some(ty) => ty,
            None => {
                self.report(tree, span, format!("undefined variable {:?}", name));
                TypeId::INVALID
            }
        }
    }

    /// Resolve `.A.B.C` from `base`; only the last element receives arguments
    #[allow(clippy::too_many_arguments)]
    fn field_chain(
        &mut self,
        tree: &Tree,
        span: &Span,
        base: TypeId,
        fields: &[String],
        args: &[Spanned<Arg>],
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> TypeId {
        let Some((last, path)) = fields.split_last() else {
            return base;
        };
        let mut current = base;
        for name in path {
            current = self.member(tree, span, current, name, &[], None, scope);
        }
        self.member(tree, span, current, last, args, piped, scope)
    }

    #[allow(clippy::too_many_arguments)]
    fn member(
        &mut self,
        tree: &Tree,
        span: &Span,
        receiver: TypeId,
        name: &str,
        args: &[Spanned<Arg>],
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> TypeId {
        let found = self.types.lookup_member(receiver, name);
        let shown = self.display(self.types.indirect(receiver));
        let message = match found {
            Ok(Member::Method(signature)) => {
                let result = self.check_call(tree, name, span, &signature, args, piped, scope);
                return self.method_result(tree, span, name, &signature.results, result);
            }
            Ok(Member::Field(ty)) | Ok(Member::MapValue(ty)) => {
                if args.is_empty() && piped.is_none() {
                    return ty;
                }
                format!("{} has arguments but cannot be invoked as function", name)
            }
            Err(LookupError::Invalid) => {
                self.skip_args(tree, args, scope);
                return TypeId::INVALID;
            }
            Err(LookupError::NotFound) | Err(LookupError::Unconstrained) => {
                format!("{} not found on {}", name, shown)
            }
            Err(LookupError::Ambiguous { .. }) => format!("ambiguous selector {} on {}", name, shown),
            Err(LookupError::NonStringKey(key)) => format!(
                "can't use field {} on {}: map key type {} is not string",
                name,
                shown,
                self.display(key)
            ),
        };
        self.report(tree, span, message);
        self.skip_args(tree, args, scope);
        TypeId::INVALID
    }

    /// Evaluate arguments only for the diagnostics they carry
    pub(super) fn skip_args(&mut self, tree: &Tree, args: &[Spanned<Arg>], scope: &mut Scope) {
        for arg in args {
            self.operand(tree, arg, scope);
        }
    }

    /// Validate how many values a method returns, at the call site
    fn method_result(&mut self, tree: &Tree, span: &Span, name: &str, results: &[TypeId], result: TypeId) -> TypeId {
        match results {
            [_] => result,
            [_, second] if self.types.is_error_like(*second) => result,
            [_, second] => {
                let message = format!(
                    "invalid method signature for {}: second return value should be error; is {}",
                    name,
                    self.display(*second)
                );
                self.report(tree, span, message);
                TypeId::INVALID
            }
            other => {
                self.report(
                    tree,
                    span,
                    format!("can't call method {:?} with {} results", name, other.len()),
                );
                TypeId::INVALID
            }
        }
    }

    fn call_function(
        &mut self,
        tree: &Tree,
        name: &str,
        span: &Span,
        args: &[Spanned<Arg>],
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> TypeId {
        let functions = self.functions;
        match functions.lookup(name) {
            Some(Function::Declared(signature)) => self.check_call(tree, name, span, signature, args, piped, scope),
            Some(Function::Builtin(builtin)) => self.call_builtin(tree, builtin, span, args, piped, scope),
            Some(Function::Rejected) => {
                self.skip_args(tree, args, scope);
                TypeId::INVALID
            }
            None => {
                self.report(tree, span, format!("function {:?} not defined", name));
                self.skip_args(tree, args, scope);
                TypeId::INVALID
            }
        }
    }

    fn check_printable(&mut self, tree: &Tree, pipe: &Pipeline, ty: TypeId) {
        if ty.is_invalid() || self.types.is_error_like(ty) || self.types.is_stringer(ty) {
            return;
        }
        let value = self.types.indirect(ty);
        if matches!(
            self.types.get(self.types.underlying(value)),
            TypeKind::Chan(_) | TypeKind::Func(_)
        ) {
            let span = pipeline_span(pipe);
            let text = span_text(tree, &span);
            self.report(
                tree,
                &span,
                format!("can't print {} of type {}", text, self.display(ty)),
            );
        }
    }
}

/// Span covering every command of a pipeline
pub(super) fn pipeline_span(pipe: &Pipeline) -> Span {
    let start = pipe
        .decl
        .first()
        .map(|d| d.span.start)
        .or_else(|| pipe.commands.first().map(|c| c.span.start))
        .unwrap_or_default();
    let end = pipe.commands.last().map_or(start, |c| c.span.end);
    start..end.max(start)
}

pub(super) fn span_text(tree: &Tree, span: &Span) -> String {
    tree.text.get(span.clone()).unwrap_or_default().to_string()
}

/// Check one tree against `data` using `finder` for nested templates
pub fn check_template(
    types: &TypeTable,
    finder: &dyn TreeFinder,
    functions: &Functions,
    tree: &Tree,
    data: TypeId,
) -> Vec<Diagnostic> {
    let mut checker = Checker::new(types, finder, functions);
    checker.check(tree, data);
    checker.finish().diagnostics
}

