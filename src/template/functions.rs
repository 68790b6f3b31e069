//! Function tables: the builtin functions plus signatures registered via `Funcs`

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::host::{Signature, TypeId, TypeTable};

/// Functions every template can call without registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Builtin {
    And,
    Or,
    Not,
    Len,
    Index,
    Slice,
    Call,
    Print,
    Printf,
    Println,
    Html,
    Js,
    Urlquery,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Builtin {
    pub const ALL: [Builtin; 19] = [
        Builtin::And,
        Builtin::Or,
        Builtin::Not,
        Builtin::Len,
        Builtin::Index,
        Builtin::Slice,
        Builtin::Call,
        Builtin::Print,
        Builtin::Printf,
        Builtin::Println,
        Builtin::Html,
        Builtin::Js,
        Builtin::Urlquery,
        Builtin::Eq,
        Builtin::Ne,
        Builtin::Lt,
        Builtin::Le,
        Builtin::Gt,
        Builtin::Ge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Not => "not",
            Builtin::Len => "len",
            Builtin::Index => "index",
            Builtin::Slice => "slice",
            Builtin::Call => "call",
            Builtin::Print => "print",
            Builtin::Printf => "printf",
            Builtin::Println => "println",
            Builtin::Html => "html",
            Builtin::Js => "js",
            Builtin::Urlquery => "urlquery",
            Builtin::Eq => "eq",
            Builtin::Ne => "ne",
            Builtin::Lt => "lt",
            Builtin::Le => "le",
            Builtin::Gt => "gt",
            Builtin::Ge => "ge",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Minimum number of arguments
    pub fn min_args(self) -> usize {
        match self {
            Builtin::And | Builtin::Or | Builtin::Not | Builtin::Len | Builtin::Index => 1,
            Builtin::Slice | Builtin::Call | Builtin::Printf => 1,
            Builtin::Eq => 2,
            Builtin::Ne | Builtin::Lt | Builtin::Le | Builtin::Gt | Builtin::Ge => 2,
            Builtin::Print | Builtin::Println | Builtin::Html | Builtin::Js | Builtin::Urlquery => 0,
        }
    }

    /// Maximum number of arguments, `None` if variadic
    pub fn max_args(self) -> Option<usize> {
        match self {
            Builtin::Not | Builtin::Len => Some(1),
            Builtin::Ne | Builtin::Lt | Builtin::Le | Builtin::Gt | Builtin::Ge => Some(2),
            Builtin::Slice => Some(4),
            _ => None,
        }
    }
}

/// Rejected `Funcs` registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("can't install function {name:?}: {found} is not a function")]
    NotAFunction { name: String, found: String },

    #[error("can't install function {name:?} with {count} results")]
    ResultCount { name: String, count: usize },

    #[error("can't install function {name:?}: second result must be error, not {found}")]
    SecondResultNotError { name: String, found: String },
}

/// A callable resolved by name
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Function<'a> {
    Builtin(Builtin),
    Declared(&'a Signature),
    /// Registered with a malformed signature; calls are not checked
    Rejected,
}

/// The function table of a template set
#[derive(Debug, Clone, PartialEq)]
pub struct Functions {
    signatures: BTreeMap<String, Signature>,
    rejected: BTreeSet<String>,
    builtins: BTreeSet<Builtin>,
}

impl Default for Functions {
    fn default() -> Self {
        Self::builtins()
    }
}

impl Functions {
    /// The default table: every builtin, nothing registered
    pub fn builtins() -> Self {
        Self {
            signatures: BTreeMap::new(),
            rejected: BTreeSet::new(),
            builtins: Builtin::ALL.into_iter().collect(),
        }
    }

    /// A table without builtins
    pub fn empty() -> Self {
        Self {
            signatures: BTreeMap::new(),
            rejected: BTreeSet::new(),
            builtins: BTreeSet::new(),
        }
    }

    /// Register a function of func type `ty`
    pub fn register_type(&mut self, types: &TypeTable, name: &str, ty: TypeId) -> Result<(), SignatureError> {
        match types.signature(ty) {
            Some(signature) => self.register(types, name, signature.clone()),
            None => {
                self.reject(name);
                Err(SignatureError::NotAFunction {
                    name: name.to_string(),
                    found: types.display(ty).to_string(),
                })
            }
        }
    }

    /// Register a signature; it must return one value, or a value and an error
    pub fn register(&mut self, types: &TypeTable, name: &str, signature: Signature) -> Result<(), SignatureError> {
        match signature.results.as_slice() {
            [_] => {}
            [_, second] if types.is_error_like(*second) => {}
            [_, second] => {
                self.reject(name);
                return Err(SignatureError::SecondResultNotError {
                    name: name.to_string(),
                    found: types.display(*second).to_string(),
                });
            }
            other => {
                self.reject(name);
                return Err(SignatureError::ResultCount {
                    name: name.to_string(),
                    count: other.len(),
                });
            }
        }
        self.shadow_builtin(name);
        self.rejected.remove(name);
        self.signatures.insert(name.to_string(), signature);
        Ok(())
    }

    fn reject(&mut self, name: &str) {
        self.shadow_builtin(name);
        self.signatures.remove(name);
        self.rejected.insert(name.to_string());
    }

    fn shadow_builtin(&mut self, name: &str) {
        if let Some(builtin) = Builtin::from_name(name) {
            self.builtins.remove(&builtin);
        }
    }

    /// Resolve a function name
    pub fn lookup(&self, name: &str) -> Option<Function<'_>> {
        if let Some(signature) = self.signatures.get(name) {
            return Some(Function::Declared(signature));
        }
        if self.rejected.contains(name) {
            return Some(Function::Rejected);
        }
        Builtin::from_name(name)
            .filter(|b| self.builtins.contains(b))
            .map(Function::Builtin)
    }

    /// Whether templates may call `name`
    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Names of registered (non-builtin) functions
    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.signatures
            .keys()
            .chain(self.rejected.iter())
            .map(String::as_str)
    }

    /// Merge registrations from `other`, which take precedence
    pub fn extend(&mut self, other: &Functions) {
        for (name, signature) in &other.signatures {
            self.shadow_builtin(name);
            self.rejected.remove(name);
            self.signatures.insert(name.clone(), signature.clone());
        }
        for name in &other.rejected {
            self.reject(name);
        }
    }
}
