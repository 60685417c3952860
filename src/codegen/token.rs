use std::fmt;

/// Source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// An operator token as seen by the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<K> {
    pub kind: K,
    pub span: Span,
}

impl<K> Token<K> {
    pub fn new(kind: K, span: Span) -> Self {
        Self { kind, span }
    }
}

impl<K: fmt::Display> Token<K> {
    /// Source text of the operator.
    pub fn image(&self) -> String {
        self.kind.to_string()
    }
}

macro_rules! operator_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $image:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[allow(dead_code)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $($name::$variant => $image),+
                })
            }
        }
    };
}

operator_enum!(
    /// Prefix operators.
    UnaryOp {
        Plus => "+",
        Minus => "-",
        Not => "Not",
    }
);

operator_enum!(
    /// Additive, multiplicative and logical binary operators.
    BinaryOp {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        And => "And",
        Or => "Or",
    }
);

operator_enum!(
    RelOp {
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
    }
);

operator_enum!(
    EqualOp {
        Eq => "==",
        Ne => "!=",
    }
);

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}
