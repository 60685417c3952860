use crate::codegen::symbol::{Symbol, SymbolKind};
use crate::codegen::types::Type;

/// Where an operand currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttribKind {
    /// Compile-time constant, not emitted yet.
    Constant { value: i32 },
    /// Variable at `offset` in the static segment (global) or the frame.
    Memory,
    /// Array element; base address and index are on the stack.
    ArrayElement,
    /// Record field at `offset`; record address is on the stack.
    RecordField,
    /// Int or bool value on top of the stack.
    StackValue,
    /// Heap reference on top of the stack.
    StackAddress,
}

/// Operand descriptor passed between the front end and the code generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Attrib {
    pub kind: AttribKind,
    pub ty: Type,
    pub global: bool,
    pub constant: bool,
    pub readonly: bool,
    pub offset: i32,
}

impl Attrib {
    fn with_kind(kind: AttribKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            global: false,
            constant: false,
            readonly: false,
            offset: 0,
        }
    }

    /// Integer literal.
    pub fn int(value: i32) -> Self {
        Self::with_kind(AttribKind::Constant { value }, Type::Int)
    }

    /// Boolean literal, represented as 0/1.
    pub fn bool(value: bool) -> Self {
        Self::with_kind(
            AttribKind::Constant {
                value: i32::from(value),
            },
            Type::Bool,
        )
    }

    /// Result of an expression, already on the stack.
    pub fn value(ty: Type) -> Self {
        let kind = if ty.is_reference() {
            AttribKind::StackAddress
        } else {
            AttribKind::StackValue
        };
        Self::with_kind(kind, ty)
    }

    /// Memory operand for a variable, constant or parameter.
    ///
    /// Panics for other symbol kinds or symbols that were never allocated.
    pub fn from_symbol(symbol: &Symbol) -> Self {
        assert!(
            symbol.is_variable(),
            "cannot use {} '{}' as an operand",
            symbol.kind,
            symbol.name
        );
        let Some(offset) = symbol.offset else {
            panic!("{} '{}' has no storage allocated", symbol.kind, symbol.name);
        };
        Self {
            kind: AttribKind::Memory,
            ty: symbol.ty.clone(),
            global: symbol.global,
            constant: symbol.kind == SymbolKind::Constant,
            readonly: symbol.readonly,
            offset,
        }
    }

    pub fn is_on_stack(&self) -> bool {
        matches!(self.kind, AttribKind::StackValue | AttribKind::StackAddress)
    }

    /// Literal value, if this is a compile-time constant.
    pub fn literal(&self) -> Option<i32> {
        match self.kind {
            AttribKind::Constant { value } => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(Attrib::int(-7).literal(), Some(-7));
        assert_eq!(Attrib::bool(true).literal(), Some(1));
        assert!(Attrib::bool(false).ty.is_bool());
        assert!(!Attrib::int(3).is_on_stack());
    }

    #[test]
    fn test_value_kind_follows_type() {
        assert_eq!(Attrib::value(Type::Int).kind, AttribKind::StackValue);
        assert_eq!(
            Attrib::value(Type::array(1, Type::Int)).kind,
            AttribKind::StackAddress
        );
    }

    #[test]
    fn test_from_symbol() {
        let mut c = Symbol::new("c", SymbolKind::Constant, Type::Int)
            .global()
            .readonly();
        c.offset = Some(3);
        let attr = Attrib::from_symbol(&c);
        assert_eq!(attr.kind, AttribKind::Memory);
        assert!(attr.global && attr.constant && attr.readonly);
        assert_eq!(attr.offset, 3);
    }

    #[test]
    #[should_panic(expected = "no storage allocated")]
    fn test_unallocated_symbol_panics() {
        Attrib::from_symbol(&Symbol::new("x", SymbolKind::Variable, Type::Int));
    }

    #[test]
    #[should_panic(expected = "cannot use procedure")]
    fn test_procedure_symbol_panics() {
        Attrib::from_symbol(&Symbol::new("p", SymbolKind::Procedure, Type::Void));
    }
}
