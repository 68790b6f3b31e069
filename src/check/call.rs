//! Call checking: declared signatures and the builtin functions

use super::eval::Checker;
use super::scope::Scope;
use crate::host::{BasicKind, Kind, Signature, TypeId, TypeKind};
use crate::parser::{Arg, Span, Spanned, Tree};
use crate::template::Builtin;

/// An evaluated argument: its type and where it was written
type Operand = (TypeId, Span);

/// Comparison classes; values of different classes never compare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Bool,
    Integer,
    Float,
    Complex,
    String,
}

impl Checker<'_> {
    fn operands(
        &mut self,
        tree: &Tree,
        span: &Span,
        args: &[Spanned<Arg>],
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> Vec<Operand> {
        let mut operands: Vec<Operand> = args
            .iter()
            .map(|arg| (self.operand(tree, arg, scope), arg.span.clone()))
            .collect();
        if let Some(ty) = piped {
            operands.push((ty, span.clone()));
        }
        operands
    }

    /// Check a call against a declared signature; the piped value is the last argument
    #[allow(clippy::too_many_arguments)]
    pub(super) fn check_call(
        &mut self,
        tree: &Tree,
        name: &str,
        span: &Span,
        signature: &Signature,
        args: &[Spanned<Arg>],
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> TypeId {
        let operands = self.operands(tree, span, args, piped, scope);
        if self.check_signature(tree, name, span, signature, &operands) {
            signature.results.first().copied().unwrap_or(TypeId::INVALID)
        } else {
            TypeId::INVALID
        }
    }

    /// Arity and assignability of `operands`; `false` once anything was reported
    fn check_signature(
        &mut self,
        tree: &Tree,
        name: &str,
        span: &Span,
        signature: &Signature,
        operands: &[Operand],
    ) -> bool {
        let params = signature.params.len();
        let got = operands.len();
        if signature.variadic && got + 1 < params {
            self.report(
                tree,
                span,
                format!("wrong number of args for {}: want at least {} got {}", name, params - 1, got),
            );
            return false;
        }
        if !signature.variadic && got != params {
            self.report(
                tree,
                span,
                format!("wrong number of args for {}: want {} got {}", name, params, got),
            );
            return false;
        }

        let mut ok = true;
        for (i, (ty, at)) in operands.iter().enumerate() {
            let expected = if signature.variadic && i + 1 >= params {
                signature
                    .params
                    .last()
                    .and_then(|tail| self.types.elem(*tail))
                    .unwrap_or(TypeId::ANY)
            } else {
                signature.params[i]
            };
            if !self.types.assignable(*ty, expected) {
                let message = format!(
                    "wrong argument type for {}: expected {}; got {}",
                    name,
                    self.display(expected),
                    self.display(*ty)
                );
                self.report(tree, at, message);
                ok = false;
            }
        }
        ok
    }

    pub(super) fn call_builtin(
        &mut self,
        tree: &Tree,
        builtin: Builtin,
        span: &Span,
        args: &[Spanned<Arg>],
        piped: Option<TypeId>,
        scope: &mut Scope,
    ) -> TypeId {
        let operands = self.operands(tree, span, args, piped, scope);
        let name = builtin.name();
        let got = operands.len();
        let max = builtin.max_args();
        if got < builtin.min_args() || max.is_some_and(|max| got > max) {
            let want = match max {
                Some(max) if max == builtin.min_args() => format!("{}", max),
                Some(max) => format!("{} to {}", builtin.min_args(), max),
                None => format!("at least {}", builtin.min_args()),
            };
            self.report(
                tree,
                span,
                format!("wrong number of args for {}: want {} got {}", name, want, got),
            );
            return TypeId::INVALID;
        }
        if operands.iter().any(|(ty, _)| ty.is_invalid()) {
            return self.builtin_fallback(builtin);
        }

        match builtin {
            Builtin::And | Builtin::Or => {
                let first = operands[0].0;
                if operands.iter().all(|(ty, _)| *ty == first) {
                    self.concrete(first)
                } else {
                    TypeId::ANY
                }
            }
            Builtin::Not => TypeId::BOOL,
            Builtin::Len => {
                let (ty, at) = &operands[0];
                if !self.types.has_len(*ty) {
                    self.report(tree, at, format!("len of type {}", self.display(*ty)));
                    return TypeId::INVALID;
                }
                TypeId::INT
            }
            Builtin::Index => self.index(tree, &operands),
            Builtin::Slice => self.slice(tree, &operands),
            Builtin::Call => self.indirect_call(tree, span, &operands),
            Builtin::Printf => {
                let (ty, at) = &operands[0];
                if !self.types.assignable(*ty, TypeId::STRING) {
                    let message = format!(
                        "wrong argument type for printf: expected string; got {}",
                        self.display(*ty)
                    );
                    self.report(tree, at, message);
                }
                TypeId::STRING
            }
            Builtin::Print | Builtin::Println | Builtin::Html | Builtin::Js | Builtin::Urlquery => TypeId::STRING,
            Builtin::Eq | Builtin::Ne => {
                let (first, _) = &operands[0];
                for (ty, at) in &operands[1..] {
                    self.comparable(tree, name, *first, *ty, at, false);
                }
                TypeId::BOOL
            }
            Builtin::Lt | Builtin::Le | Builtin::Gt | Builtin::Ge => {
                let (first, _) = &operands[0];
                let (second, at) = &operands[1];
                self.comparable(tree, name, *first, *second, at, true);
                TypeId::BOOL
            }
        }
    }

    /// Result type of a builtin whose arguments already failed
    fn builtin_fallback(&self, builtin: Builtin) -> TypeId {
        match builtin {
            Builtin::Not
            | Builtin::Eq
            | Builtin::Ne
            | Builtin::Lt
            | Builtin::Le
            | Builtin::Gt
            | Builtin::Ge => TypeId::BOOL,
            Builtin::Len => TypeId::INT,
            Builtin::Print
            | Builtin::Printf
            | Builtin::Println
            | Builtin::Html
            | Builtin::Js
            | Builtin::Urlquery => TypeId::STRING,
            _ => TypeId::INVALID,
        }
    }

    /// Untyped literal types take their default type once they are values
    fn concrete(&self, ty: TypeId) -> TypeId {
        match self.types.basic_kind(ty) {
            Some(kind) if kind.is_untyped() => self.types.default_type(kind),
            _ => ty,
        }
    }

    fn index(&mut self, tree: &Tree, operands: &[Operand]) -> TypeId {
        let (mut item, _) = operands[0];
        for (key, at) in &operands[1..] {
            let base = self.types.indirect(item);
            if self.types.underlying_kind(base) == Kind::Interface {
                return TypeId::ANY;
            }
            let Some(expected_key) = self.types.key(base) else {
                self.report(tree, at, format!("can't index item of type {}", self.display(item)));
                return TypeId::INVALID;
            };
            let key_ok = if expected_key == TypeId::INT {
                self.is_integer(*key)
            } else {
                self.types.assignable(*key, expected_key)
            };
            if !key_ok {
                let message = format!(
                    "can't index {} with {}; index should be {}",
                    self.display(item),
                    self.display(*key),
                    self.display(expected_key)
                );
                self.report(tree, at, message);
                return TypeId::INVALID;
            }
            item = self.types.elem(base).unwrap_or(TypeId::INVALID);
        }
        item
    }

    fn slice(&mut self, tree: &Tree, operands: &[Operand]) -> TypeId {
        let (item, at) = &operands[0];
        let base = self.types.indirect(*item);
        let result = match self.types.get(self.types.underlying(base)) {
            TypeKind::Interface(_) => TypeId::ANY,
            TypeKind::Slice(_) => base,
            TypeKind::Array(..) => TypeId::ANY,
            TypeKind::Basic(BasicKind::String | BasicKind::UntypedString) => {
                if operands.len() == 4 {
                    self.report(tree, at, "cannot 3-index slice a string");
                    return TypeId::INVALID;
                }
                self.concrete(base)
            }
            _ => {
                self.report(tree, at, format!("can't slice item of type {}", self.display(*item)));
                return TypeId::INVALID;
            }
        };
        for (index, at) in &operands[1..] {
            if !self.is_integer(*index) {
                self.report(
                    tree,
                    at,
                    format!("cannot index slice/array with type {}", self.display(*index)),
                );
                return TypeId::INVALID;
            }
        }
        result
    }

    fn indirect_call(&mut self, tree: &Tree, span: &Span, operands: &[Operand]) -> TypeId {
        let (callee, at) = &operands[0];
        if self.types.is_interface(*callee) {
            return TypeId::ANY;
        }
        let Some(signature) = self.types.signature(*callee).cloned() else {
            let text = super::eval::span_text(tree, at);
            self.report(
                tree,
                at,
                format!("non-function {} of type {}", text, self.display(*callee)),
            );
            return TypeId::INVALID;
        };
        match signature.results.as_slice() {
            [_] => {}
            [_, second] if self.types.is_error_like(*second) => {}
            results => {
                let message = format!(
                    "invalid function signature for {}: {} results, want one result or a result and an error",
                    self.display(*callee),
                    results.len()
                );
                self.report(tree, at, message);
                return TypeId::INVALID;
            }
        }
        let name = super::eval::span_text(tree, at);
        if self.check_signature(tree, &name, span, &signature, &operands[1..]) {
            signature.results.first().copied().unwrap_or(TypeId::INVALID)
        } else {
            TypeId::INVALID
        }
    }

    fn is_integer(&self, ty: TypeId) -> bool {
        if self.types.is_interface(ty) {
            return true;
        }
        self.types.basic_kind(ty).is_some_and(BasicKind::is_integer)
    }

    fn class(&self, ty: TypeId) -> Option<Class> {
        let kind = self.types.basic_kind(ty)?;
        Some(match kind {
            BasicKind::Bool | BasicKind::UntypedBool => Class::Bool,
            BasicKind::String | BasicKind::UntypedString => Class::String,
            k if k.is_integer() => Class::Integer,
            k if k.is_float() => Class::Float,
            k if k.is_complex() => Class::Complex,
            _ => return None,
        })
    }

    /// Report operands of the comparison builtins that can never compare
    fn comparable(&mut self, tree: &Tree, name: &str, left: TypeId, right: TypeId, at: &Span, ordered: bool) {
        if self.types.is_interface(left) || self.types.is_interface(right) {
            return;
        }
        if left == TypeId::UNTYPED_NIL || right == TypeId::UNTYPED_NIL {
            return;
        }
        match (self.class(left), self.class(right)) {
            (Some(a), Some(b)) if a != b => {
                let message = format!(
                    "incompatible types for comparison: {} and {}",
                    self.display(left),
                    self.display(right)
                );
                self.report(tree, at, message);
            }
            (Some(class), Some(_)) => {
                if ordered && matches!(class, Class::Bool | Class::Complex) {
                    self.report(
                        tree,
                        at,
                        format!("invalid type for {}: {}", name, self.display(left)),
                    );
                }
            }
            (None, _) | (_, None) => {
                if ordered {
                    let culprit = if self.class(left).is_none() { left } else { right };
                    self.report(
                        tree,
                        at,
                        format!("invalid type for {}: {}", name, self.display(culprit)),
                    );
                }
            }
        }
    }
}
