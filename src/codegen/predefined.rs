use std::rc::Rc;

use crate::codegen::symbol::{Symbol, SymbolKind};
use crate::codegen::types::{ProcedureType, Type};

/// Built-in I/O procedures. Calls to these are expanded inline instead of
/// emitting a `call`.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedProc {
    /// `void writeint(int i)`
    WriteInt,
    /// `void writebool(bool b)`, prints `True` or `False`
    WriteBool,
    /// `void writeln()`
    WriteLn,
    /// `int readint()`
    ReadInt,
}

impl PredefinedProc {
    pub fn name(self) -> &'static str {
        match self {
            PredefinedProc::WriteInt => "writeint",
            PredefinedProc::WriteBool => "writebool",
            PredefinedProc::WriteLn => "writeln",
            PredefinedProc::ReadInt => "readint",
        }
    }

    pub fn procedure_type(self) -> ProcedureType {
        let ty = match self {
            PredefinedProc::WriteInt => {
                ProcedureType::new(self.name(), Type::Void).with_param("i", Type::Int)
            }
            PredefinedProc::WriteBool => {
                ProcedureType::new(self.name(), Type::Void).with_param("b", Type::Bool)
            }
            PredefinedProc::WriteLn => ProcedureType::new(self.name(), Type::Void),
            PredefinedProc::ReadInt => ProcedureType::new(self.name(), Type::Int),
        };
        ProcedureType {
            builtin: Some(self),
            ..ty
        }
    }

    /// Global procedure symbol to seed the front end's outermost scope with.
    pub fn symbol(self) -> Symbol {
        Symbol::new(
            self.name(),
            SymbolKind::Procedure,
            Type::Procedure(Rc::new(self.procedure_type())),
        )
        .global()
    }
}
