use num_enum::TryFromPrimitive;

use crate::bytecode::codec::OperandWidth;

// =============================================================================
// INSTRUCTION - MJ stack machine opcodes
// =============================================================================

/// One opcode of the target stack machine. The discriminant is the byte
/// written to the code segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    // locals
    Load = 1,
    Load0,
    Load1,
    Load2,
    Load3,
    Store,
    Store0,
    Store1,
    Store2,
    Store3,

    // static data and fields
    GetStatic,
    PutStatic,
    GetField,
    PutField,

    // constants
    Const0,
    Const1,
    Const2,
    Const3,
    Const4,
    Const5,
    ConstM1,
    Const,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,

    // heap
    New,
    NewArray,
    ALoad,
    AStore,
    BALoad,
    BAStore,
    ArrayLength,

    Pop,

    // ==========================================================================
    // Jumps take an absolute s16 code address
    // ==========================================================================
    Jmp,
    Jeq,
    Jne,
    Jlt,
    Jle,
    Jgt,
    Jge,

    // procedures
    Call,
    Return,
    Enter,
    Exit,

    // I/O
    Read,
    Print,
    BRead,
    BPrint,
    Trap,
    SPrint,

    /// Sentinel, never emitted.
    Last,
}

impl Instruction {
    /// Opcode byte, `1..=56`.
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    pub fn from_opcode(byte: u8) -> Option<Instruction> {
        Instruction::try_from(byte).ok()
    }

    /// Explicit operands that follow the opcode byte, in order.
    pub const fn operands(self) -> &'static [OperandWidth] {
        use Instruction::*;
        match self {
            Load | Store | NewArray => &[OperandWidth::S8],
            GetStatic | PutStatic | GetField | PutField | New | SPrint => &[OperandWidth::S16],
            Jmp | Jeq | Jne | Jlt | Jle | Jgt | Jge | Call => &[OperandWidth::S16],
            Const => &[OperandWidth::S32],
            Enter => &[OperandWidth::S8, OperandWidth::S8],
            _ => &[],
        }
    }

    /// Encoded size in bytes, opcode included.
    pub const fn size(self) -> usize {
        let operands = self.operands();
        let mut size = 1;
        let mut i = 0;
        while i < operands.len() {
            size += operands[i].size();
            i += 1;
        }
        size
    }

    /// Conditional jumps: pop `b`, pop `a`, branch when `a <op> b`.
    pub const fn is_conditional_jump(self) -> bool {
        matches!(
            self,
            Instruction::Jeq
                | Instruction::Jne
                | Instruction::Jlt
                | Instruction::Jle
                | Instruction::Jgt
                | Instruction::Jge
        )
    }

    pub const fn mnemonic(self) -> &'static str {
        use Instruction::*;
        match self {
            Load => "load",
            Load0 => "load0",
            Load1 => "load1",
            Load2 => "load2",
            Load3 => "load3",
            Store => "store",
            Store0 => "store0",
            Store1 => "store1",
            Store2 => "store2",
            Store3 => "store3",
            GetStatic => "getstatic",
            PutStatic => "putstatic",
            GetField => "getfield",
            PutField => "putfield",
            Const0 => "const0",
            Const1 => "const1",
            Const2 => "const2",
            Const3 => "const3",
            Const4 => "const4",
            Const5 => "const5",
            ConstM1 => "const_m1",
            Const => "const",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Rem => "rem",
            Neg => "neg",
            Shl => "shl",
            Shr => "shr",
            New => "new",
            NewArray => "newarray",
            ALoad => "aload",
            AStore => "astore",
            BALoad => "baload",
            BAStore => "bastore",
            ArrayLength => "arraylength",
            Pop => "pop",
            Jmp => "jmp",
            Jeq => "jeq",
            Jne => "jne",
            Jlt => "jlt",
            Jle => "jle",
            Jgt => "jgt",
            Jge => "jge",
            Call => "call",
            Return => "return",
            Enter => "enter",
            Exit => "exit",
            Read => "read",
            Print => "print",
            BRead => "bread",
            BPrint => "bprint",
            Trap => "trap",
            SPrint => "sprint",
            Last => "last",
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
