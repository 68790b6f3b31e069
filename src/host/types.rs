//! Arena of host-language types
//!
//! Types are stored in a [`TypeTable`] and addressed by [`TypeId`]. Composite
//! types (pointers, slices, maps, functions, ...) are interned, so two
//! structurally identical composites share one id and type identity is plain
//! id equality. Named types are never interned: every declaration is a new,
//! distinct type.

use std::collections::HashMap;
use std::fmt;

/// Handle to a type stored in a [`TypeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Sentinel propagated once a subtree has reported a diagnostic
    pub const INVALID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const INT8: TypeId = TypeId(3);
    pub const INT16: TypeId = TypeId(4);
    pub const INT32: TypeId = TypeId(5);
    pub const INT64: TypeId = TypeId(6);
    pub const UINT: TypeId = TypeId(7);
    pub const UINT8: TypeId = TypeId(8);
    pub const UINT16: TypeId = TypeId(9);
    pub const UINT32: TypeId = TypeId(10);
    pub const UINT64: TypeId = TypeId(11);
    pub const UINTPTR: TypeId = TypeId(12);
    pub const FLOAT32: TypeId = TypeId(13);
    pub const FLOAT64: TypeId = TypeId(14);
    pub const COMPLEX64: TypeId = TypeId(15);
    pub const COMPLEX128: TypeId = TypeId(16);
    pub const STRING: TypeId = TypeId(17);
    pub const UNTYPED_BOOL: TypeId = TypeId(18);
    pub const UNTYPED_INT: TypeId = TypeId(19);
    pub const UNTYPED_RUNE: TypeId = TypeId(20);
    pub const UNTYPED_FLOAT: TypeId = TypeId(21);
    pub const UNTYPED_COMPLEX: TypeId = TypeId(22);
    pub const UNTYPED_STRING: TypeId = TypeId(23);
    pub const UNTYPED_NIL: TypeId = TypeId(24);
    /// The unconstrained interface type (`any`, `interface{}`)
    pub const ANY: TypeId = TypeId(25);
    /// The predeclared `error` interface
    pub const ERROR: TypeId = TypeId(26);
    /// `[]any`, the variadic tail of most builtins
    pub const ANY_SLICE: TypeId = TypeId(29);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_invalid(self) -> bool {
        self == TypeId::INVALID
    }
}

/// Basic (predeclared, unnamed at the type level) kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedComplex,
    UntypedString,
    UntypedNil,
}

impl BasicKind {
    const ALL: [BasicKind; 24] = [
        BasicKind::Bool,
        BasicKind::Int,
        BasicKind::Int8,
        BasicKind::Int16,
        BasicKind::Int32,
        BasicKind::Int64,
        BasicKind::Uint,
        BasicKind::Uint8,
        BasicKind::Uint16,
        BasicKind::Uint32,
        BasicKind::Uint64,
        BasicKind::Uintptr,
        BasicKind::Float32,
        BasicKind::Float64,
        BasicKind::Complex64,
        BasicKind::Complex128,
        BasicKind::String,
        BasicKind::UntypedBool,
        BasicKind::UntypedInt,
        BasicKind::UntypedRune,
        BasicKind::UntypedFloat,
        BasicKind::UntypedComplex,
        BasicKind::UntypedString,
        BasicKind::UntypedNil,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UntypedBool => "untyped bool",
            BasicKind::UntypedInt => "untyped int",
            BasicKind::UntypedRune => "untyped rune",
            BasicKind::UntypedFloat => "untyped float",
            BasicKind::UntypedComplex => "untyped complex",
            BasicKind::UntypedString => "untyped string",
            BasicKind::UntypedNil => "untyped nil",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BasicKind::Int
                | BasicKind::Int8
                | BasicKind::Int16
                | BasicKind::Int32
                | BasicKind::Int64
                | BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BasicKind::Float32 | BasicKind::Float64 | BasicKind::UntypedFloat
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            BasicKind::Complex64 | BasicKind::Complex128 | BasicKind::UntypedComplex
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    pub fn is_untyped(self) -> bool {
        matches!(
            self,
            BasicKind::UntypedBool
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
                | BasicKind::UntypedFloat
                | BasicKind::UntypedComplex
                | BasicKind::UntypedString
                | BasicKind::UntypedNil
        )
    }
}

/// A struct field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    /// Embedded fields promote their own fields and methods
    pub embedded: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: false,
        }
    }

    /// An embedded field, named after its type
    pub fn embedded(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: true,
        }
    }
}

/// A function or method signature
///
/// A variadic signature stores its tail as a slice type in the last parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    pub params: Vec<TypeId>,
    pub variadic: bool,
    pub results: Vec<TypeId>,
}

impl Signature {
    pub fn new(params: Vec<TypeId>, results: Vec<TypeId>) -> Self {
        Self {
            params,
            variadic: false,
            results,
        }
    }

    pub fn variadic(params: Vec<TypeId>, results: Vec<TypeId>) -> Self {
        Self {
            params,
            variadic: true,
            results,
        }
    }
}

/// A named method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    pub name: String,
    pub signature: Signature,
}

impl Method {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

/// A declared (named) type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Import path of the declaring package; empty for predeclared types
    pub package: String,
    pub name: String,
    /// `None` until the declaration is completed
    pub underlying: Option<TypeId>,
    pub methods: Vec<Method>,
}

/// Stored representation of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Invalid,
    Basic(BasicKind),
    Named(NamedType),
    Pointer(TypeId),
    Slice(TypeId),
    Array(u64, TypeId),
    Map(TypeId, TypeId),
    Chan(TypeId),
    Struct(Vec<Field>),
    /// Flattened method set, sorted by name
    Interface(Vec<Method>),
    Func(Signature),
}

/// Coarse kind discrimination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Invalid,
    Basic,
    Struct,
    Pointer,
    Interface,
    Map,
    Sequence,
    Channel,
    Function,
    Named,
}

/// The host type system: an arena of types plus the predeclared universe
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table holding the predeclared types
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            interned: HashMap::new(),
        };
        table.push(TypeKind::Invalid);
        for kind in BasicKind::ALL {
            table.intern(TypeKind::Basic(kind));
        }
        let any = table.intern(TypeKind::Interface(Vec::new()));
        debug_assert_eq!(any, TypeId::ANY);

        let error = table.push(TypeKind::Named(NamedType {
            package: String::new(),
            name: "error".to_string(),
            underlying: None,
            methods: Vec::new(),
        }));
        debug_assert_eq!(error, TypeId::ERROR);
        let error_method = Signature::new(Vec::new(), vec![TypeId::STRING]);
        table.func(error_method.clone());
        let error_iface = table.intern(TypeKind::Interface(vec![Method::new("Error", error_method)]));
        table.set_underlying(TypeId::ERROR, error_iface);

        let any_slice = table.slice(TypeId::ANY);
        debug_assert_eq!(any_slice, TypeId::ANY_SLICE);
        table
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(kind);
        id
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(id) = self.interned.get(&kind) {
            return *id;
        }
        let id = self.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    /// Get the stored representation of a type
    pub fn get(&self, id: TypeId) -> &TypeKind {
        self.types.get(id.index()).unwrap_or(&TypeKind::Invalid)
    }

    pub fn basic(&self, kind: BasicKind) -> TypeId {
        // Basics are pushed in declaration order right after the sentinel.
        let index = BasicKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        TypeId(index as u32 + 1)
    }

    pub fn pointer(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer(elem))
    }

    pub fn slice(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Slice(elem))
    }

    pub fn array(&mut self, len: u64, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Array(len, elem))
    }

    pub fn map(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(TypeKind::Map(key, value))
    }

    pub fn chan(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Chan(elem))
    }

    pub fn func(&mut self, signature: Signature) -> TypeId {
        self.intern(TypeKind::Func(signature))
    }

    pub fn structure(&mut self, fields: Vec<Field>) -> TypeId {
        self.intern(TypeKind::Struct(fields))
    }

    /// Create an interface type; the method set is flattened and sorted
    pub fn interface(&mut self, mut methods: Vec<Method>) -> TypeId {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        methods.dedup_by(|a, b| a.name == b.name);
        self.intern(TypeKind::Interface(methods))
    }

    /// Declare a new named type whose underlying type is set later
    pub fn declare_named(&mut self, package: impl Into<String>, name: impl Into<String>) -> TypeId {
        self.push(TypeKind::Named(NamedType {
            package: package.into(),
            name: name.into(),
            underlying: None,
            methods: Vec::new(),
        }))
    }

    /// Declare a named type with a known underlying type
    pub fn named(
        &mut self,
        package: impl Into<String>,
        name: impl Into<String>,
        underlying: TypeId,
    ) -> TypeId {
        let id = self.declare_named(package, name);
        self.set_underlying(id, underlying);
        id
    }

    pub fn set_underlying(&mut self, named: TypeId, underlying: TypeId) {
        if let Some(TypeKind::Named(n)) = self.types.get_mut(named.index()) {
            n.underlying = Some(underlying);
        }
    }

    pub fn add_method(&mut self, named: TypeId, method: Method) {
        if let Some(TypeKind::Named(n)) = self.types.get_mut(named.index()) {
            n.methods.retain(|m| m.name != method.name);
            n.methods.push(method);
        }
    }

    /// Strip named types down to their underlying representation
    pub fn underlying(&self, id: TypeId) -> TypeId {
        let mut current = id;
        // Named chains are short; the bound guards against malformed tables.
        for _ in 0..self.types.len() {
            match self.get(current) {
                TypeKind::Named(n) => match n.underlying {
                    Some(u) if u != current => current = u,
                    _ => return TypeId::INVALID,
                },
                _ => return current,
            }
        }
        TypeId::INVALID
    }

    pub fn kind(&self, id: TypeId) -> Kind {
        match self.get(id) {
            TypeKind::Invalid => Kind::Invalid,
            TypeKind::Basic(_) => Kind::Basic,
            TypeKind::Named(_) => Kind::Named,
            TypeKind::Pointer(_) => Kind::Pointer,
            TypeKind::Slice(_) | TypeKind::Array(..) => Kind::Sequence,
            TypeKind::Map(..) => Kind::Map,
            TypeKind::Chan(_) => Kind::Channel,
            TypeKind::Struct(_) => Kind::Struct,
            TypeKind::Interface(_) => Kind::Interface,
            TypeKind::Func(_) => Kind::Function,
        }
    }

    /// Kind of the underlying type
    pub fn underlying_kind(&self, id: TypeId) -> Kind {
        self.kind(self.underlying(id))
    }

    pub fn basic_kind(&self, id: TypeId) -> Option<BasicKind> {
        match self.get(self.underlying(id)) {
            TypeKind::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn named_type(&self, id: TypeId) -> Option<&NamedType> {
        match self.get(id) {
            TypeKind::Named(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_named(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeKind::Named(_))
    }

    /// Element type of pointers, sequences, maps and channels
    pub fn elem(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.underlying(id)) {
            TypeKind::Pointer(e) | TypeKind::Slice(e) | TypeKind::Array(_, e) | TypeKind::Chan(e) => {
                Some(*e)
            }
            TypeKind::Map(_, v) => Some(*v),
            TypeKind::Basic(BasicKind::String) => Some(TypeId::UINT8),
            _ => None,
        }
    }

    /// Key type of maps; sequences are keyed by `int`
    pub fn key(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.underlying(id)) {
            TypeKind::Map(k, _) => Some(*k),
            TypeKind::Slice(_) | TypeKind::Array(..) => Some(TypeId::INT),
            TypeKind::Basic(BasicKind::String) => Some(TypeId::INT),
            _ => None,
        }
    }

    pub fn signature(&self, id: TypeId) -> Option<&Signature> {
        match self.get(self.underlying(id)) {
            TypeKind::Func(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        matches!(self.get(self.underlying(id)), TypeKind::Interface(_))
    }

    /// Whether this is the unconstrained interface type
    pub fn is_empty_interface(&self, id: TypeId) -> bool {
        matches!(self.get(self.underlying(id)), TypeKind::Interface(m) if m.is_empty())
    }

    /// Methods declared by an interface type
    pub fn interface_methods(&self, id: TypeId) -> &[Method] {
        match self.get(self.underlying(id)) {
            TypeKind::Interface(m) => m,
            _ => &[],
        }
    }

    /// Strip every level of pointer indirection
    pub fn indirect(&self, id: TypeId) -> TypeId {
        let mut current = id;
        for _ in 0..self.types.len() {
            match self.get(self.underlying(current)) {
                TypeKind::Pointer(e) => current = *e,
                _ => return current,
            }
        }
        current
    }

    /// Whether a value of this type supports the template truth test
    pub fn is_emptiness_testable(&self, id: TypeId) -> bool {
        match self.get(self.underlying(id)) {
            TypeKind::Invalid => true,
            TypeKind::Basic(_) => true,
            TypeKind::Pointer(_)
            | TypeKind::Slice(_)
            | TypeKind::Array(..)
            | TypeKind::Map(..)
            | TypeKind::Chan(_)
            | TypeKind::Interface(_)
            | TypeKind::Func(_) => true,
            TypeKind::Struct(_) | TypeKind::Named(_) => false,
        }
    }

    /// Whether a value of this type has a length
    pub fn has_len(&self, id: TypeId) -> bool {
        match self.get(self.underlying(id)) {
            TypeKind::Basic(kind) => matches!(kind, BasicKind::String | BasicKind::UntypedString),
            TypeKind::Slice(_) | TypeKind::Array(..) | TypeKind::Map(..) | TypeKind::Chan(_) => true,
            TypeKind::Pointer(e) => matches!(self.get(self.underlying(*e)), TypeKind::Array(..)),
            TypeKind::Interface(_) | TypeKind::Invalid => true,
            _ => false,
        }
    }

    /// Whether `ty` is `error` or implements it
    pub fn is_error_like(&self, ty: TypeId) -> bool {
        ty == TypeId::ERROR || self.implements(ty, TypeId::ERROR)
    }

    /// Whether `ty` has a `String() string` method
    pub fn is_stringer(&self, ty: TypeId) -> bool {
        let sig = Signature::new(Vec::new(), vec![TypeId::STRING]);
        self.has_method(ty, "String", &sig)
    }

    fn has_method(&self, ty: TypeId, name: &str, sig: &Signature) -> bool {
        if self.is_interface(ty) {
            return self
                .interface_methods(ty)
                .iter()
                .any(|m| m.name == name && &m.signature == sig);
        }
        match self.lookup_member(ty, name) {
            Ok(super::lookup::Member::Method(found)) => &found == sig,
            _ => false,
        }
    }

    /// Whether every method of interface `iface` is in the method set of `ty`
    pub fn implements(&self, ty: TypeId, iface: TypeId) -> bool {
        if !self.is_interface(iface) {
            return false;
        }
        self.interface_methods(iface)
            .iter()
            .all(|m| self.has_method(ty, &m.name, &m.signature))
    }

    /// Whether a value of type `from` may be passed where `to` is expected
    ///
    /// Besides identity and interface satisfaction this is permissive for the
    /// unconstrained interface on either side, accepts untyped literals of a
    /// compatible kind, and auto-dereferences pointers the way template
    /// execution does.
    pub fn assignable(&self, from: TypeId, to: TypeId) -> bool {
        if from == to || from.is_invalid() || to.is_invalid() {
            return true;
        }
        if self.is_empty_interface(to) || self.is_empty_interface(from) {
            return true;
        }
        if let TypeKind::Basic(kind) = self.get(from) {
            if kind.is_untyped() {
                return self.untyped_assignable(*kind, to);
            }
        }
        if self.is_interface(to) {
            return self.implements(from, to);
        }
        if (!self.is_named(from) || !self.is_named(to)) && self.underlying(from) == self.underlying(to) {
            return true;
        }
        if let TypeKind::Pointer(elem) = self.get(self.underlying(from)) {
            return self.assignable(*elem, to);
        }
        false
    }

    fn untyped_assignable(&self, kind: BasicKind, to: TypeId) -> bool {
        let target = self.get(self.underlying(to));
        match kind {
            BasicKind::UntypedNil => matches!(
                target,
                TypeKind::Pointer(_)
                    | TypeKind::Slice(_)
                    | TypeKind::Map(..)
                    | TypeKind::Chan(_)
                    | TypeKind::Func(_)
                    | TypeKind::Interface(_)
            ),
            _ => {
                if self.is_interface(to) {
                    let default = self.default_type(kind);
                    return self.implements(default, to);
                }
                let TypeKind::Basic(target) = target else {
                    return false;
                };
                match kind {
                    BasicKind::UntypedBool => matches!(target, BasicKind::Bool | BasicKind::UntypedBool),
                    BasicKind::UntypedString => {
                        matches!(target, BasicKind::String | BasicKind::UntypedString)
                    }
                    BasicKind::UntypedInt | BasicKind::UntypedRune => target.is_numeric(),
                    BasicKind::UntypedFloat => target.is_float() || target.is_complex(),
                    BasicKind::UntypedComplex => target.is_complex(),
                    _ => false,
                }
            }
        }
    }

    /// The type an untyped constant takes when nothing else constrains it
    pub fn default_type(&self, kind: BasicKind) -> TypeId {
        match kind {
            BasicKind::UntypedBool => TypeId::BOOL,
            BasicKind::UntypedInt => TypeId::INT,
            BasicKind::UntypedRune => TypeId::INT32,
            BasicKind::UntypedFloat => TypeId::FLOAT64,
            BasicKind::UntypedComplex => TypeId::COMPLEX128,
            BasicKind::UntypedString => TypeId::STRING,
            BasicKind::UntypedNil => TypeId::ANY,
            other => self.basic(other),
        }
    }

    /// Render a type the way Go prints it
    pub fn display(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { table: self, id }
    }

    fn write_type(&self, f: &mut fmt::Formatter<'_>, id: TypeId, depth: usize) -> fmt::Result {
        if depth > 16 {
            return write!(f, "...");
        }
        match self.get(id) {
            TypeKind::Invalid => write!(f, "invalid type"),
            TypeKind::Basic(kind) => write!(f, "{}", kind.name()),
            TypeKind::Named(n) if n.package.is_empty() => write!(f, "{}", n.name),
            TypeKind::Named(n) => write!(f, "{}.{}", n.package, n.name),
            TypeKind::Pointer(e) => {
                write!(f, "*")?;
                self.write_type(f, *e, depth + 1)
            }
            TypeKind::Slice(e) => {
                write!(f, "[]")?;
                self.write_type(f, *e, depth + 1)
            }
            TypeKind::Array(len, e) => {
                write!(f, "[{}]", len)?;
                self.write_type(f, *e, depth + 1)
            }
            TypeKind::Map(k, v) => {
                write!(f, "map[")?;
                self.write_type(f, *k, depth + 1)?;
                write!(f, "]")?;
                self.write_type(f, *v, depth + 1)
            }
            TypeKind::Chan(e) => {
                write!(f, "chan ")?;
                self.write_type(f, *e, depth + 1)
            }
            TypeKind::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    if !field.embedded {
                        write!(f, "{} ", field.name)?;
                    }
                    self.write_type(f, field.ty, depth + 1)?;
                }
                write!(f, "}}")
            }
            TypeKind::Interface(methods) if methods.is_empty() => write!(f, "any"),
            TypeKind::Interface(methods) => {
                write!(f, "interface{{")?;
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", m.name)?;
                    self.write_signature(f, &m.signature, depth + 1)?;
                }
                write!(f, "}}")
            }
            TypeKind::Func(sig) => {
                write!(f, "func")?;
                self.write_signature(f, sig, depth + 1)
            }
        }
    }

    fn write_signature(&self, f: &mut fmt::Formatter<'_>, sig: &Signature, depth: usize) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in sig.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if sig.variadic && i + 1 == sig.params.len() {
                write!(f, "...")?;
                let elem = self.elem(*p).unwrap_or(TypeId::INVALID);
                self.write_type(f, elem, depth)?;
            } else {
                self.write_type(f, *p, depth)?;
            }
        }
        write!(f, ")")?;
        match sig.results.as_slice() {
            [] => Ok(()),
            [single] => {
                write!(f, " ")?;
                self.write_type(f, *single, depth)
            }
            many => {
                write!(f, " (")?;
                for (i, r) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.write_type(f, *r, depth)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// [`fmt::Display`] adapter returned by [`TypeTable::display`]
pub struct TypeDisplay<'a> {
    table: &'a TypeTable,
    id: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.table.write_type(f, self.id, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predeclared_ids() {
        let table = TypeTable::new();
        assert_eq!(table.get(TypeId::STRING), &TypeKind::Basic(BasicKind::String));
        assert_eq!(table.get(TypeId::UNTYPED_NIL), &TypeKind::Basic(BasicKind::UntypedNil));
        assert!(table.is_empty_interface(TypeId::ANY));
        assert!(table.is_interface(TypeId::ERROR));
        assert_eq!(table.get(TypeId::ANY_SLICE), &TypeKind::Slice(TypeId::ANY));
        assert_eq!(table.basic(BasicKind::Float64), TypeId::FLOAT64);
    }

    #[test]
    fn test_composites_are_interned() {
        let mut table = TypeTable::new();
        let a = table.slice(TypeId::INT);
        let b = table.slice(TypeId::INT);
        assert_eq!(a, b);
        let m1 = table.map(TypeId::STRING, a);
        let m2 = table.map(TypeId::STRING, b);
        assert_eq!(m1, m2);
    }

    #[test]
    fn test_kind_key_and_elem() {
        let mut table = TypeTable::new();
        let index = table.map(TypeId::STRING, TypeId::INT);
        let lookup = table.named("example.com/app", "Lookup", index);
        assert_eq!(table.kind(lookup), Kind::Named);
        assert_eq!(table.underlying_kind(lookup), Kind::Map);
        assert_eq!(table.key(lookup), Some(TypeId::STRING));
        assert_eq!(table.elem(lookup), Some(TypeId::INT));

        let grid = table.array(3, TypeId::FLOAT64);
        assert_eq!(table.kind(grid), Kind::Sequence);
        assert_eq!(table.key(grid), Some(TypeId::INT));
        assert_eq!(table.key(TypeId::STRING), Some(TypeId::INT));
        assert_eq!(table.elem(TypeId::STRING), Some(TypeId::UINT8));

        let events = table.chan(TypeId::STRING);
        assert_eq!(table.kind(events), Kind::Channel);
        assert_eq!(table.key(events), None);
        assert_eq!(table.underlying_kind(TypeId::ANY), Kind::Interface);
    }

    #[test]
    fn test_named_types_are_distinct() {
        let mut table = TypeTable::new();
        let a = table.named("example.com/app", "Celsius", TypeId::FLOAT64);
        let b = table.named("example.com/app", "Fahrenheit", TypeId::FLOAT64);
        assert_ne!(a, b);
        assert_eq!(table.underlying(a), TypeId::FLOAT64);
        assert!(!table.assignable(a, b));
        assert!(table.assignable(a, TypeId::FLOAT64));
    }

    #[test]
    fn test_display() {
        let mut table = TypeTable::new();
        let person = table.declare_named("example.com/app", "Person");
        let fields = table.structure(vec![Field::new("Name", TypeId::STRING)]);
        table.set_underlying(person, fields);
        let ptr = table.pointer(person);
        let list = table.slice(ptr);
        let index = table.map(TypeId::STRING, list);
        assert_eq!(table.display(index).to_string(), "map[string][]*example.com/app.Person");

        let sig = Signature::new(vec![TypeId::STRING], vec![TypeId::STRING, TypeId::ERROR]);
        let func = table.func(sig);
        assert_eq!(table.display(func).to_string(), "func(string) (string, error)");

        let printf = table.func(Signature::variadic(
            vec![TypeId::STRING, TypeId::ANY_SLICE],
            vec![TypeId::STRING],
        ));
        assert_eq!(table.display(printf).to_string(), "func(string, ...any) string");
        assert_eq!(table.display(TypeId::ANY).to_string(), "any");
    }

    #[test]
    fn test_untyped_assignability() {
        let table = TypeTable::new();
        assert!(table.assignable(TypeId::UNTYPED_INT, TypeId::FLOAT64));
        assert!(table.assignable(TypeId::UNTYPED_INT, TypeId::INT64));
        assert!(!table.assignable(TypeId::UNTYPED_FLOAT, TypeId::INT));
        assert!(!table.assignable(TypeId::UNTYPED_STRING, TypeId::INT));
        assert!(table.assignable(TypeId::UNTYPED_STRING, TypeId::STRING));
        assert!(!table.assignable(TypeId::UNTYPED_NIL, TypeId::STRING));
        assert!(table.assignable(TypeId::UNTYPED_NIL, TypeId::ERROR));
    }

    #[test]
    fn test_any_is_permissive_both_ways() {
        let table = TypeTable::new();
        assert!(table.assignable(TypeId::ANY, TypeId::STRING));
        assert!(table.assignable(TypeId::INT, TypeId::ANY));
    }

    #[test]
    fn test_error_like() {
        let mut table = TypeTable::new();
        assert!(table.is_error_like(TypeId::ERROR));
        assert!(!table.is_error_like(TypeId::STRING));

        let custom = table.named("example.com/app", "NotFound", TypeId::STRING);
        table.add_method(
            custom,
            Method::new("Error", Signature::new(vec![], vec![TypeId::STRING])),
        );
        assert!(table.is_error_like(custom));
        assert!(table.assignable(custom, TypeId::ERROR));
    }

    #[test]
    fn test_emptiness_testable() {
        let mut table = TypeTable::new();
        let record = table.structure(vec![Field::new("A", TypeId::INT)]);
        let ptr = table.pointer(record);
        assert!(table.is_emptiness_testable(TypeId::BOOL));
        assert!(table.is_emptiness_testable(TypeId::ANY));
        assert!(table.is_emptiness_testable(ptr));
        assert!(!table.is_emptiness_testable(record));
    }
}
