use thiserror::Error;

/// Fault raised while executing an object image.
#[derive(Debug)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    /// Address of the faulting instruction.
    pub pc: usize,
    /// Return addresses of the active calls, innermost last.
    pub call_stack: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    #[error("expression stack underflow")]
    StackUnderflow,

    #[error("expression stack limit exceeded ({max})")]
    StackLimit { max: usize },

    #[error("execution step limit exceeded ({max})")]
    StepLimit { max: usize },

    #[error("call depth limit exceeded ({max}) - possible infinite recursion")]
    CallDepth { max: usize },

    #[error("invalid opcode {byte}")]
    InvalidOpcode { byte: u8 },

    #[error("program counter left the code segment")]
    PcOutOfBounds,

    #[error("division by zero")]
    DivisionByZero,

    #[error("no active stack frame")]
    NoFrame,

    #[error("frame offset {offset} outside frame of {size} words")]
    FrameAccess { offset: i32, size: usize },

    #[error("static address {address} outside data segment")]
    StaticAccess { address: i32 },

    #[error("null reference")]
    NullReference,

    #[error("heap address {address} outside heap")]
    HeapAccess { address: i32 },

    #[error("array index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i32, len: i32 },

    #[error("negative array size {size}")]
    NegativeArraySize { size: i32 },

    #[error("heap exhausted ({max} words)")]
    HeapExhausted { max: usize },

    #[error("invalid integer input {text:?}")]
    BadInput { text: String },

    #[error("end of input")]
    InputEof,

    #[error("trap")]
    Trap,

    #[error("i/o error: {message}")]
    Io { message: String },
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, pc: usize) -> Self {
        RuntimeError {
            kind,
            pc,
            call_stack: Vec::new(),
        }
    }

    pub fn with_call_stack(mut self, call_stack: &[usize]) -> Self {
        self.call_stack = call_stack.to_vec();
        self
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error at {:04}: {}", self.pc, self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, ret) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: returns to {:04}", i, ret)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
