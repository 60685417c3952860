use thiserror::Error;

use crate::codegen::token::Span;

/// A source-level error in the program being compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{span}: error {number}: {kind}", number = .kind.number())]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// What went wrong, with the values the message is formatted from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticErrorKind {
    #[error("expression before '[' is not an array type")]
    SelectorNotArray,

    #[error("array index or dimension is not an integer type")]
    BadArraySelector,

    #[error("expression after '#' is not an array type")]
    ArrayLenNotArray,

    #[error("illegal operand type for unary operator '{op}'")]
    IllegalOp1Type { op: String },

    #[error("illegal operand type for binary operator '{op}'")]
    IllegalOp2Type { op: String },

    #[error("illegal operand type for relational operator '{op}'")]
    IllegalRelOpType { op: String },

    #[error("illegal operand type for equality operator '{op}'")]
    IllegalEqualOpType { op: String },

    #[error("using procedure '{proc_name}' (not a function) in expression")]
    ProcNotFuncExpr { proc_name: String },

    #[error("read-only l-value in assignment")]
    ReadonlyAssign,

    #[error("type mismatch in assignment")]
    TypeMismatchAssign,

    #[error("argument #{index} not applicable to procedure '{proc_name}'")]
    ArgNotApplicable { index: usize, proc_name: String },

    #[error("too few arguments for procedure '{proc_name}'")]
    TooFewArgs { proc_name: String },

    #[error("too many arguments for procedure '{proc_name}'")]
    TooManyArgs { proc_name: String },

    #[error("condition is not a boolean expression")]
    CondNotBool,

    #[error("expression before '.' is not a record type")]
    SelectorNotRecord,

    #[error("invalid field '{field}' of record '{record}'")]
    InvalidRecordField { field: String, record: String },

    #[error("invalid type used with 'new' operator")]
    InvalidNewType,

    #[error("too many array dimensions (at most {max})")]
    TooManyDims { max: usize },
}

impl SemanticErrorKind {
    /// Stable error number shown in diagnostics.
    pub fn number(&self) -> u32 {
        use SemanticErrorKind::*;
        match self {
            SelectorNotArray => 20,
            BadArraySelector => 21,
            ArrayLenNotArray => 22,
            IllegalOp1Type { .. } => 23,
            IllegalOp2Type { .. } => 24,
            IllegalRelOpType { .. } => 25,
            IllegalEqualOpType { .. } => 26,
            ProcNotFuncExpr { .. } => 27,
            ReadonlyAssign => 28,
            TypeMismatchAssign => 29,
            ArgNotApplicable { .. } => 30,
            TooFewArgs { .. } => 32,
            TooManyArgs { .. } => 33,
            CondNotBool => 34,
            SelectorNotRecord => 40,
            InvalidRecordField { .. } => 41,
            InvalidNewType => 42,
            TooManyDims { .. } => 51,
        }
    }

    pub fn at(self, span: Span) -> SemanticError {
        SemanticError::new(self, span)
    }
}
