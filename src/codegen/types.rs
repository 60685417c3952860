use std::fmt;
use std::rc::Rc;

use crate::codegen::predefined::PredefinedProc;
use crate::codegen::symbol::Symbol;

/// Source-language type of a value or symbol.
///
/// Composite types are shared behind `Rc` so operands can be cloned
/// freely while generating code.
#[derive(Debug, Clone)]
pub enum Type {
    Int,
    Bool,
    Void,
    Array(Rc<ArrayType>),
    Record(Rc<RecordType>),
    Procedure(Rc<ProcedureType>),
}

impl Type {
    pub fn array(dim: usize, base: Type) -> Type {
        Type::Array(Rc::new(ArrayType::new(dim, base)))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Type::Record(_))
    }

    /// Whether values of this type live on the heap and are handled by
    /// reference.
    pub fn is_reference(&self) -> bool {
        self.is_array() || self.is_record()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Int, Type::Int) | (Type::Bool, Type::Bool) | (Type::Void, Type::Void) => true,
            (Type::Array(a), Type::Array(b)) => a == b,
            (Type::Record(a), Type::Record(b)) => a == b,
            (Type::Procedure(a), Type::Procedure(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Array(a) => write!(f, "{}{}", a.base, "[]".repeat(a.dim)),
            Type::Record(r) => write!(f, "record {}", r.name),
            Type::Procedure(p) => write!(f, "procedure {}", p.name),
        }
    }
}

// =============================================================================
// Composite types
// =============================================================================

/// `dim`-dimensional array of `base`. Structurally compared.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub dim: usize,
    pub base: Type,
}

impl ArrayType {
    /// Panics if `dim` is zero.
    pub fn new(dim: usize, base: Type) -> Self {
        assert!(dim >= 1, "array type needs at least one dimension");
        Self { dim, base }
    }

    /// The type with the first dimension removed.
    pub fn elem_type(&self) -> Type {
        if self.dim == 1 {
            self.base.clone()
        } else {
            Type::array(self.dim - 1, self.base.clone())
        }
    }
}

/// Record type. Records are compared by name, which also keeps
/// self-referencing records from recursing.
#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: String,
    fields: Vec<Symbol>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: Symbol) {
        self.fields.push(field);
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&Symbol> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[Symbol] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [Symbol] {
        &mut self.fields
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields.len() == other.fields.len()
    }
}

/// Signature of a procedure. Two procedure types are equal when their
/// return and parameter types are; names do not matter.
#[derive(Debug, Clone)]
pub struct ProcedureType {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<(String, Type)>,
    /// Set for the built-in I/O procedures, which are expanded inline.
    pub builtin: Option<PredefinedProc>,
}

impl ProcedureType {
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            return_type,
            params: Vec::new(),
            builtin: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    pub fn is_function(&self) -> bool {
        !self.return_type.is_void()
    }
}

impl PartialEq for ProcedureType {
    fn eq(&self, other: &Self) -> bool {
        self.return_type == other.return_type
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|((_, a), (_, b))| a == b)
    }
}
