use std::io::Write;

use tracing::{debug, info};

use crate::bytecode::buffer::{CodeBuffer, LabelTable, StaticData, WORD_SIZE};
use crate::bytecode::codec::OperandWidth;
use crate::bytecode::emit_error::ObjectError;
use crate::bytecode::frame::ProcedureFrame;
use crate::bytecode::object::{ObjectImage, SymbolMap};
use crate::bytecode::op::Instruction;

/// Where a word operand lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    /// Current stack frame, s8 word offset.
    Stack,
    /// Static data segment, s16 word offset.
    Static,
    /// Heap object whose address is already on the expression stack,
    /// s16 word offset.
    Heap,
}

// =============================================================================
// BACKEND - raw instruction emission for a stack machine
// =============================================================================

/// Instruction-level interface of a stack machine backend.
///
/// Operands are consumed from and results pushed onto the machine's
/// expression stack; none of these calls take register numbers.
pub trait Backend {
    #[allow(dead_code)]
    fn word_size(&self) -> usize {
        WORD_SIZE
    }

    /// Integer representation of a boolean.
    fn bool_value(&self, value: bool) -> i32 {
        if value { 1 } else { 0 }
    }

    /// Bind `label` to the current code address.
    fn assign_label(&mut self, label: &str);

    /// Resolve all labels and write header, code and static data to `sink`.
    fn write_object_file(&mut self, sink: &mut dyn Write) -> Result<(), ObjectError>;

    /// Reserve zeroed static words; returns their word offset.
    fn alloc_static_data(&mut self, words: usize) -> usize;

    /// Store a NUL-terminated, word-padded string; returns its word offset.
    fn alloc_string_constant(&mut self, text: &str) -> usize;

    /// Reserve frame words in the open procedure; returns their word offset.
    fn alloc_stack(&mut self, words: usize) -> usize;

    /// ( -- addr ) allocate a heap object of `words` words.
    fn alloc_heap(&mut self, words: usize);

    /// ( n -- addr ) allocate a word array of `n` elements.
    fn alloc_array(&mut self);

    /// ( -- value )
    fn load_const(&mut self, value: i32);

    /// ( -- value ), or ( addr -- value ) for [`MemoryRegion::Heap`].
    fn load_word(&mut self, region: MemoryRegion, offset: i32);

    /// ( value -- ), or ( addr value -- ) for [`MemoryRegion::Heap`].
    fn store_word(&mut self, region: MemoryRegion, offset: i32);

    /// ( addr index -- value )
    fn load_array_element(&mut self);

    /// ( addr index value -- )
    fn store_array_element(&mut self);

    /// ( addr -- length )
    fn array_length(&mut self);

    /// ( value -- ) print an integer.
    fn write_integer(&mut self);

    /// ( value -- ) print a single character.
    #[allow(dead_code)]
    fn write_byte(&mut self);

    /// Print the string constant at static word offset `addr`.
    fn write_string(&mut self, addr: usize);

    /// ( -- value )
    fn read_integer(&mut self);

    /// ( -- value )
    fn read_byte(&mut self);

    fn neg(&mut self);
    fn add(&mut self);
    fn sub(&mut self);
    fn mul(&mut self);
    fn div(&mut self);
    fn modulo(&mut self);

    /// Boolean conjunction on 0/1 values.
    fn and(&mut self);
    /// Boolean disjunction on 0/1 values.
    fn or(&mut self);
    /// Boolean negation on 0/1 values.
    fn not(&mut self);

    /// ( a b -- a == b )
    fn is_equal(&mut self);
    /// ( a b -- a != b )
    fn is_not_equal(&mut self);
    /// ( a b -- a < b )
    fn is_less(&mut self);
    /// ( a b -- a <= b )
    fn is_less_or_equal(&mut self);
    /// ( a b -- a > b )
    fn is_greater(&mut self);
    /// ( a b -- a >= b )
    fn is_greater_or_equal(&mut self);

    /// ( cond -- ) jump to `label` if `cond` equals `value`.
    fn branch_if(&mut self, value: bool, label: &str);

    fn jump(&mut self, label: &str);

    /// Arguments must already be on the expression stack.
    fn call_proc(&mut self, label: &str);

    /// Procedure prologue. Panics if a procedure is already open, or if
    /// `is_main` is set and a main procedure already exists.
    fn enter_proc(&mut self, label: &str, n_params: usize, is_main: bool);

    /// Procedure epilogue; `label` marks its first instruction.
    fn exit_proc(&mut self, label: &str);

    /// Frame word offset of parameter `index`.
    fn param_offset(&self, index: usize) -> usize {
        index
    }
}

// =============================================================================
// BACKEND MJ
// =============================================================================

/// Backend emitting binary code for the MJ stack machine.
#[derive(Debug, Default)]
pub struct BackendMj {
    code: CodeBuffer,
    data: StaticData,
    labels: LabelTable,
    current: Option<ProcedureFrame>,
    main_label: Option<String>,
}

impl BackendMj {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &CodeBuffer {
        &self.code
    }

    #[cfg(test)]
    pub fn static_data(&self) -> &StaticData {
        &self.data
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Resolve every label and produce the finished object image.
    pub fn finish(&mut self) -> Result<ObjectImage, ObjectError> {
        if let Some(open) = &self.current {
            return Err(ObjectError::OpenProcedure {
                label: open.label().to_string(),
            });
        }

        let main = self
            .main_label
            .as_deref()
            .ok_or(ObjectError::NoMainProcedure)?;
        let start_pc = self
            .labels
            .address_of(main)
            .ok_or_else(|| ObjectError::UndefinedLabel {
                label: main.to_string(),
            })?;

        self.labels.resolve_all(&mut self.code)?;

        if self.code.len() > u16::MAX as usize + 1 {
            return Err(ObjectError::CodeTooLarge {
                size: self.code.len(),
            });
        }

        Ok(ObjectImage::new(
            self.code.to_bytes()?,
            self.data.as_bytes().to_vec(),
            start_pc as u32,
        ))
    }

    /// Label addresses for the disassembler. Labels are listed whether or
    /// not they have been resolved yet.
    pub fn symbol_map(&self) -> SymbolMap {
        let entry = self
            .main_label
            .as_deref()
            .and_then(|main| self.labels.address_of(main))
            .unwrap_or(0);
        SymbolMap {
            entry: entry as u16,
            labels: self
                .labels
                .definitions()
                .into_iter()
                .map(|(name, addr)| (name, addr as u16))
                .collect(),
        }
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.emit(instruction);
    }

    /// Emit `instruction` followed by one explicit operand.
    ///
    /// Panics when `value` cannot be encoded in `instruction`'s operand.
    fn emit_with(&mut self, instruction: Instruction, value: i32) {
        let width = instruction.operands()[0];
        assert!(
            width.holds(value),
            "operand {} of {} does not fit in {} byte(s)",
            value,
            instruction,
            width.size()
        );
        self.code.emit(instruction);
        self.code.emit_operand(value, width);
    }

    /// Emit `instruction` with an s16 code address taken from `label`,
    /// leaving a registered placeholder if the label is not bound yet.
    fn emit_with_label(&mut self, instruction: Instruction, label: &str) {
        match self.labels.address_of(label) {
            Some(address) => self.emit_with(instruction, address as i32),
            None => {
                self.code.emit(instruction);
                let slot = self.code.emit_placeholder(OperandWidth::S16.size());
                self.labels.reference(label, slot);
            }
        }
    }

    /// Turn a conditional jump into a 0/1 value on the stack:
    ///
    /// ```text
    ///   jcc  T
    ///   const0
    ///   jmp  E
    /// T: const1
    /// E:
    /// ```
    ///
    /// Both targets are backpatched from the addresses actually reached.
    fn compare(&mut self, jump: Instruction) {
        debug_assert!(jump.is_conditional_jump());

        self.emit(jump);
        let to_true = self.code.emit_placeholder(OperandWidth::S16.size());
        self.load_const(0);
        self.emit(Instruction::Jmp);
        let to_end = self.code.emit_placeholder(OperandWidth::S16.size());

        let true_target = self.code.len() as i32;
        self.code.backpatch(to_true, true_target, OperandWidth::S16);
        self.load_const(1);

        let end = self.code.len() as i32;
        self.code.backpatch(to_end, end, OperandWidth::S16);
    }
}

impl Backend for BackendMj {
    fn assign_label(&mut self, label: &str) {
        self.labels.define(label, self.code.len());
    }

    fn write_object_file(&mut self, sink: &mut dyn Write) -> Result<(), ObjectError> {
        let image = self.finish()?;
        image.write_to(sink)?;
        info!(
            "wrote object file: {} code bytes, {} static words, start pc {}",
            image.header.code_size, image.header.data_words, image.header.start_pc
        );
        Ok(())
    }

    fn alloc_static_data(&mut self, words: usize) -> usize {
        self.data.alloc_words(words)
    }

    fn alloc_string_constant(&mut self, text: &str) -> usize {
        self.data.alloc_string(text)
    }

    fn alloc_stack(&mut self, words: usize) -> usize {
        let Some(frame) = self.current.as_mut() else {
            panic!("cannot allocate {} stack word(s) outside of a procedure", words);
        };
        frame.alloc_local(words)
    }

    fn alloc_heap(&mut self, words: usize) {
        self.emit_with(Instruction::New, words as i32);
    }

    fn alloc_array(&mut self) {
        // element size 1: word elements
        self.emit_with(Instruction::NewArray, 1);
    }

    fn load_const(&mut self, value: i32) {
        match value {
            0 => self.emit(Instruction::Const0),
            1 => self.emit(Instruction::Const1),
            2 => self.emit(Instruction::Const2),
            3 => self.emit(Instruction::Const3),
            4 => self.emit(Instruction::Const4),
            5 => self.emit(Instruction::Const5),
            -1 => self.emit(Instruction::ConstM1),
            _ => self.emit_with(Instruction::Const, value),
        }
    }

    fn load_word(&mut self, region: MemoryRegion, offset: i32) {
        match region {
            MemoryRegion::Stack => self.emit_with(Instruction::Load, offset),
            MemoryRegion::Static => self.emit_with(Instruction::GetStatic, offset),
            MemoryRegion::Heap => self.emit_with(Instruction::GetField, offset),
        }
    }

    fn store_word(&mut self, region: MemoryRegion, offset: i32) {
        match region {
            MemoryRegion::Stack => self.emit_with(Instruction::Store, offset),
            MemoryRegion::Static => self.emit_with(Instruction::PutStatic, offset),
            MemoryRegion::Heap => self.emit_with(Instruction::PutField, offset),
        }
    }

    fn load_array_element(&mut self) {
        self.emit(Instruction::ALoad);
    }

    fn store_array_element(&mut self) {
        self.emit(Instruction::AStore);
    }

    fn array_length(&mut self) {
        self.emit(Instruction::ArrayLength);
    }

    fn write_integer(&mut self) {
        // field width
        self.load_const(0);
        self.emit(Instruction::Print);
    }

    fn write_byte(&mut self) {
        self.load_const(0);
        self.emit(Instruction::BPrint);
    }

    fn write_string(&mut self, addr: usize) {
        self.emit_with(Instruction::SPrint, addr as i32);
    }

    fn read_integer(&mut self) {
        self.emit(Instruction::Read);
    }

    fn read_byte(&mut self) {
        self.emit(Instruction::BRead);
    }

    fn neg(&mut self) {
        self.emit(Instruction::Neg);
    }

    fn add(&mut self) {
        self.emit(Instruction::Add);
    }

    fn sub(&mut self) {
        self.emit(Instruction::Sub);
    }

    fn mul(&mut self) {
        self.emit(Instruction::Mul);
    }

    fn div(&mut self) {
        self.emit(Instruction::Div);
    }

    fn modulo(&mut self) {
        self.emit(Instruction::Rem);
    }

    fn and(&mut self) {
        self.emit(Instruction::Mul);
    }

    fn or(&mut self) {
        // a + b >= 1
        self.add();
        self.load_const(1);
        self.is_greater_or_equal();
    }

    fn not(&mut self) {
        // 1 - a
        self.neg();
        self.load_const(1);
        self.add();
    }

    fn is_equal(&mut self) {
        self.compare(Instruction::Jeq);
    }

    fn is_not_equal(&mut self) {
        self.compare(Instruction::Jne);
    }

    fn is_less(&mut self) {
        self.compare(Instruction::Jlt);
    }

    fn is_less_or_equal(&mut self) {
        self.compare(Instruction::Jle);
    }

    fn is_greater(&mut self) {
        self.compare(Instruction::Jgt);
    }

    fn is_greater_or_equal(&mut self) {
        self.compare(Instruction::Jge);
    }

    fn branch_if(&mut self, value: bool, label: &str) {
        let expected = self.bool_value(value);
        self.load_const(expected);
        self.emit_with_label(Instruction::Jeq, label);
    }

    fn jump(&mut self, label: &str) {
        self.emit_with_label(Instruction::Jmp, label);
    }

    fn call_proc(&mut self, label: &str) {
        self.emit_with_label(Instruction::Call, label);
    }

    fn enter_proc(&mut self, label: &str, n_params: usize, is_main: bool) {
        if let Some(open) = &self.current {
            panic!(
                "cannot enter procedure '{}' while '{}' is open: procedures do not nest",
                label,
                open.label()
            );
        }
        if is_main {
            if let Some(main) = &self.main_label {
                panic!(
                    "cannot enter '{}' as main procedure: '{}' already is",
                    label, main
                );
            }
            self.main_label = Some(label.to_string());
        }

        self.assign_label(label);
        self.emit_with(Instruction::Enter, n_params as i32);
        let slot = self.code.emit_placeholder(OperandWidth::S8.size());
        self.current = Some(ProcedureFrame::new(label, n_params, slot));

        debug!("enter {} ({} params{})", label, n_params, if is_main { ", main" } else { "" });
    }

    fn exit_proc(&mut self, label: &str) {
        let Some(frame) = self.current.take() else {
            panic!("cannot exit procedure at '{}': no procedure is open", label);
        };

        let size = frame.frame_size_byte();
        self.code
            .backpatch(frame.frame_size_slot(), size as i32, OperandWidth::S8);

        self.assign_label(label);
        self.emit(Instruction::Exit);
        self.emit(Instruction::Return);

        debug!("exit {} (frame {} words)", frame.label(), size);
    }
}
