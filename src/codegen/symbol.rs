use std::fmt;

use crate::codegen::types::Type;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Program,
    Procedure,
    Variable,
    Constant,
    Typename,
    Field,
    Parameter,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolKind::Program => "program",
            SymbolKind::Procedure => "procedure",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Typename => "typename",
            SymbolKind::Field => "field",
            SymbolKind::Parameter => "parameter",
        };
        f.write_str(name)
    }
}

/// A name bound in some scope, as handed over by the front end.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub global: bool,
    pub readonly: bool,
    /// Word offset in the frame, static segment or record; assigned while
    /// allocating.
    pub offset: Option<i32>,
    /// Distinguishes re-declarations of the same name in different scopes.
    pub id: u32,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            global: false,
            readonly: false,
            offset: None,
            id: 0,
        }
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Entry label of a procedure or program symbol.
    pub fn label(&self) -> String {
        format!("{}#{}", self.name, self.id)
    }

    /// Epilogue label of a procedure or program symbol.
    pub fn end_label(&self) -> String {
        format!("{}#{}_end", self.name, self.id)
    }

    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Variable | SymbolKind::Constant | SymbolKind::Parameter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_disambiguate_redeclarations() {
        let a = Symbol::new("f", SymbolKind::Procedure, Type::Void).with_id(1);
        let b = Symbol::new("f", SymbolKind::Procedure, Type::Void).with_id(2);
        assert_ne!(a.label(), b.label());
        assert_eq!(a.label(), "f#1");
        assert_eq!(a.end_label(), "f#1_end");
    }

    #[test]
    fn test_builder_flags() {
        let c = Symbol::new("c", SymbolKind::Constant, Type::Int)
            .global()
            .readonly();
        assert!(c.global);
        assert!(c.readonly);
        assert!(c.is_variable());
        assert_eq!(c.offset, None);
        assert!(!Symbol::new("T", SymbolKind::Typename, Type::Int).is_variable());
    }
}
