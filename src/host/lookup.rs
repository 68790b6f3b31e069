//! Member resolution: fields, methods and map keys
//!
//! Lookups auto-indirect through any number of pointer levels and follow
//! embedded struct fields breadth-first, so the shallowest candidate wins. At
//! equal depth a field wins over a method; two fields or two methods at the
//! same depth are ambiguous.

use std::collections::HashSet;

use super::types::{BasicKind, Signature, TypeId, TypeKind, TypeTable};

/// A resolved member of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// A struct field (possibly promoted) of the given type
    Field(TypeId),
    /// A method (possibly promoted, or declared by an interface)
    Method(Signature),
    /// A string-keyed map entry of the given value type
    MapValue(TypeId),
}

/// Why a member could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// The base is the invalid-type sentinel; nothing to report
    Invalid,
    NotFound,
    /// Two candidates tie at the shallowest depth
    Ambiguous { depth: usize },
    /// The unconstrained interface permits no member access
    Unconstrained,
    /// Map keys other than strings cannot be addressed as fields
    NonStringKey(TypeId),
}

impl TypeTable {
    /// Resolve `name` on `ty` as a field, method or map key
    pub fn lookup_member(&self, ty: TypeId, name: &str) -> Result<Member, LookupError> {
        if ty.is_invalid() {
            return Err(LookupError::Invalid);
        }
        let root = self.indirect(ty);
        if root.is_invalid() {
            return Err(LookupError::Invalid);
        }
        match self.get(self.underlying(root)) {
            TypeKind::Invalid => Err(LookupError::Invalid),
            TypeKind::Interface(methods) => {
                if methods.is_empty() {
                    return Err(LookupError::Unconstrained);
                }
                methods
                    .iter()
                    .find(|m| m.name == name)
                    .map(|m| Member::Method(m.signature.clone()))
                    .ok_or(LookupError::NotFound)
            }
            TypeKind::Struct(_) => self.lookup_promoted(root, name),
            TypeKind::Map(key, value) => {
                if let Some(sig) = self.declared_method(root, name) {
                    return Ok(Member::Method(sig));
                }
                match self.basic_kind(*key) {
                    Some(BasicKind::String) => Ok(Member::MapValue(*value)),
                    _ => Err(LookupError::NonStringKey(*key)),
                }
            }
            _ => self
                .declared_method(root, name)
                .map(Member::Method)
                .ok_or(LookupError::NotFound),
        }
    }

    fn declared_method(&self, ty: TypeId, name: &str) -> Option<Signature> {
        self.named_type(ty)?
            .methods
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.signature.clone())
    }

    fn lookup_promoted(&self, root: TypeId, name: &str) -> Result<Member, LookupError> {
        let mut level = vec![root];
        let mut seen = HashSet::new();
        let mut depth = 0;

        while !level.is_empty() {
            level.retain(|t| !seen.contains(t));
            seen.extend(level.iter().copied());

            let mut fields = Vec::new();
            let mut methods = Vec::new();
            let mut next = Vec::new();

            for &t in &level {
                if let Some(sig) = self.declared_method(t, name) {
                    methods.push(sig);
                }
                match self.get(self.underlying(t)) {
                    TypeKind::Struct(struct_fields) => {
                        for field in struct_fields {
                            if field.name == name {
                                fields.push(field.ty);
                            }
                            if field.embedded {
                                next.push(self.indirect(field.ty));
                            }
                        }
                    }
                    TypeKind::Interface(iface) if depth > 0 => {
                        methods.extend(
                            iface
                                .iter()
                                .filter(|m| m.name == name)
                                .map(|m| m.signature.clone()),
                        );
                    }
                    _ => {}
                }
            }

            match (fields.as_slice(), methods.as_slice()) {
                ([field], _) => return Ok(Member::Field(*field)),
                ([], [method]) => return Ok(Member::Method(method.clone())),
                ([], []) => {}
                _ => return Err(LookupError::Ambiguous { depth }),
            }

            level = next;
            depth += 1;
        }
        Err(LookupError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::types::{Field, Method};

    const PKG: &str = "example.com/app";

    fn struct_named(table: &mut TypeTable, name: &str, fields: Vec<Field>) -> TypeId {
        let id = table.declare_named(PKG, name);
        let underlying = table.structure(fields);
        table.set_underlying(id, underlying);
        id
    }

    #[test]
    fn test_direct_field_through_pointers() {
        let mut table = TypeTable::new();
        let person = struct_named(&mut table, "Person", vec![Field::new("Name", TypeId::STRING)]);
        let ptr = table.pointer(person);
        let ptr_ptr = table.pointer(ptr);
        assert_eq!(
            table.lookup_member(ptr_ptr, "Name"),
            Ok(Member::Field(TypeId::STRING))
        );
        assert_eq!(table.lookup_member(person, "Age"), Err(LookupError::NotFound));
    }

    #[test]
    fn test_method_on_named_type() {
        let mut table = TypeTable::new();
        let person = struct_named(&mut table, "Person", vec![]);
        let sig = Signature::new(vec![TypeId::STRING], vec![TypeId::STRING]);
        table.add_method(person, Method::new("Greet", sig.clone()));
        let ptr = table.pointer(person);
        assert_eq!(table.lookup_member(ptr, "Greet"), Ok(Member::Method(sig)));
    }

    #[test]
    fn test_promoted_field_shallowest_wins() {
        let mut table = TypeTable::new();
        let base = struct_named(
            &mut table,
            "Base",
            vec![Field::new("ID", TypeId::INT), Field::new("Name", TypeId::INT)],
        );
        let base_ptr = table.pointer(base);
        let page = struct_named(
            &mut table,
            "Page",
            vec![Field::embedded("Base", base_ptr), Field::new("Name", TypeId::STRING)],
        );
        assert_eq!(table.lookup_member(page, "ID"), Ok(Member::Field(TypeId::INT)));
        assert_eq!(
            table.lookup_member(page, "Name"),
            Ok(Member::Field(TypeId::STRING))
        );
    }

    #[test]
    fn test_promoted_tie_is_ambiguous() {
        let mut table = TypeTable::new();
        let a = struct_named(&mut table, "A", vec![Field::new("ID", TypeId::INT)]);
        let b = struct_named(&mut table, "B", vec![Field::new("ID", TypeId::STRING)]);
        let both = struct_named(
            &mut table,
            "Both",
            vec![Field::embedded("A", a), Field::embedded("B", b)],
        );
        assert_eq!(
            table.lookup_member(both, "ID"),
            Err(LookupError::Ambiguous { depth: 1 })
        );
    }

    #[test]
    fn test_field_wins_over_method_at_equal_depth() {
        let mut table = TypeTable::new();
        let a = struct_named(&mut table, "A", vec![Field::new("Title", TypeId::STRING)]);
        let b = struct_named(&mut table, "B", vec![]);
        table.add_method(
            b,
            Method::new("Title", Signature::new(vec![], vec![TypeId::INT])),
        );
        let both = struct_named(
            &mut table,
            "Both",
            vec![Field::embedded("A", a), Field::embedded("B", b)],
        );
        assert_eq!(
            table.lookup_member(both, "Title"),
            Ok(Member::Field(TypeId::STRING))
        );
    }

    #[test]
    fn test_interface_methods_only() {
        let mut table = TypeTable::new();
        let sig = Signature::new(vec![], vec![TypeId::STRING]);
        let iface = table.interface(vec![Method::new("Label", sig.clone())]);
        let named = table.named(PKG, "Labeler", iface);
        assert_eq!(table.lookup_member(named, "Label"), Ok(Member::Method(sig)));
        assert_eq!(table.lookup_member(named, "Name"), Err(LookupError::NotFound));
        assert_eq!(
            table.lookup_member(TypeId::ANY, "Name"),
            Err(LookupError::Unconstrained)
        );
    }

    #[test]
    fn test_map_keys() {
        let mut table = TypeTable::new();
        let by_name = table.map(TypeId::STRING, TypeId::FLOAT64);
        let by_id = table.map(TypeId::INT, TypeId::FLOAT64);
        assert_eq!(
            table.lookup_member(by_name, "anything"),
            Ok(Member::MapValue(TypeId::FLOAT64))
        );
        assert_eq!(
            table.lookup_member(by_id, "anything"),
            Err(LookupError::NonStringKey(TypeId::INT))
        );
    }

    #[test]
    fn test_invalid_base_is_silent() {
        let table = TypeTable::new();
        assert_eq!(
            table.lookup_member(TypeId::INVALID, "X"),
            Err(LookupError::Invalid)
        );
    }
}
