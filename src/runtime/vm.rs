use std::io::{self, BufRead, Read as _};

use tracing::{debug, trace};

use crate::bytecode::buffer::WORD_SIZE;
use crate::bytecode::codec::{OperandWidth, bytes_to_int, int_to_bytes};
use crate::bytecode::object::ObjectImage;
use crate::bytecode::op::Instruction;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
    pub max_call_depth: usize,
    pub heap_words: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: None,
            max_stack_size: 10_000,
            max_call_depth: 1000,
            heap_words: 1 << 20,
        }
    }
}

#[derive(Debug)]
struct Frame {
    locals: Vec<i32>,
}

/// Interpreter for MJ object images.
pub struct Vm {
    config: VmConfig,
    code: Vec<u8>,
    data: Vec<u8>,
    /// Word-addressed; word 0 is never handed out so 0 can be null.
    heap: Vec<i32>,
    stack: Vec<i32>,
    frames: Vec<Frame>,
    returns: Vec<usize>,
    pc: usize,
    steps: usize,
    input: Box<dyn BufRead>,
    output: Vec<u8>,
}

type Step = Result<(), RuntimeErrorKind>;

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            code: Vec::new(),
            data: Vec::new(),
            heap: vec![0],
            stack: Vec::new(),
            frames: Vec::new(),
            returns: Vec::new(),
            pc: 0,
            steps: 0,
            input: Box::new(io::empty()),
            output: Vec::new(),
        }
    }

    /// Read `read`/`bread` input from `text`.
    #[cfg(test)]
    pub fn with_input(self, text: &str) -> Self {
        self.with_reader(Box::new(io::Cursor::new(text.as_bytes().to_vec())))
    }

    pub fn with_reader(mut self, input: Box<dyn BufRead>) -> Self {
        self.input = input;
        self
    }

    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    #[cfg(test)]
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Static data word `index`, as left by the last run.
    #[cfg(test)]
    pub fn static_word(&self, index: usize) -> Option<i32> {
        let start = index * WORD_SIZE;
        let bytes = self.data.get(start..start + WORD_SIZE)?;
        Some(bytes_to_int(bytes, OperandWidth::S32))
    }

    fn reset(&mut self, image: &ObjectImage) {
        self.code = image.code.clone();
        self.data = image.data.clone();
        self.heap = vec![0];
        self.stack.clear();
        self.frames.clear();
        self.returns.clear();
        self.pc = image.header.start_pc as usize;
        self.steps = 0;
        self.output.clear();
    }

    /// Execute `image` from its start pc until the outermost procedure
    /// returns.
    pub fn run(&mut self, image: &ObjectImage) -> Result<(), RuntimeError> {
        self.reset(image);
        debug!("running from pc {:04}", self.pc);

        loop {
            let pc = self.pc;
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(kind) => {
                    return Err(RuntimeError::new(kind, pc).with_call_stack(&self.returns));
                }
            }
        }

        debug!("halted after {} steps", self.steps);
        Ok(())
    }

    fn check_limits(&mut self) -> Step {
        self.steps += 1;

        if let Some(max) = self.config.max_steps
            && self.steps > max
        {
            return Err(RuntimeErrorKind::StepLimit { max });
        }

        if self.stack.len() > self.config.max_stack_size {
            return Err(RuntimeErrorKind::StackLimit {
                max: self.config.max_stack_size,
            });
        }

        Ok(())
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    fn fetch(&self) -> Result<(Instruction, Vec<i32>), RuntimeErrorKind> {
        let byte = *self.code.get(self.pc).ok_or(RuntimeErrorKind::PcOutOfBounds)?;
        let instruction = Instruction::from_opcode(byte)
            .filter(|i| *i != Instruction::Last)
            .ok_or(RuntimeErrorKind::InvalidOpcode { byte })?;

        if self.pc + instruction.size() > self.code.len() {
            return Err(RuntimeErrorKind::PcOutOfBounds);
        }

        let mut at = self.pc + 1;
        let mut operands = Vec::with_capacity(instruction.operands().len());
        for width in instruction.operands() {
            operands.push(bytes_to_int(&self.code[at..], *width));
            at += width.size();
        }
        Ok((instruction, operands))
    }

    /// Execute one instruction. Returns `false` once the program halts.
    fn step(&mut self) -> Result<bool, RuntimeErrorKind> {
        self.check_limits()?;

        let (instruction, operands) = self.fetch()?;
        trace!("{:04} {} {:?} stack={:?}", self.pc, instruction, operands, self.stack);

        let next = self.pc + instruction.size();
        self.pc = next;
        let operand = || operands[0];
        // frame offsets are unsigned bytes
        let slot = || operands[0] as u8 as i32;
        // jump and call targets are unsigned 16-bit code addresses
        let target = || operands[0] as u16 as usize;

        use Instruction::*;
        match instruction {
            Load => {
                let v = self.local(slot())?;
                self.push(v);
            }
            Load0 | Load1 | Load2 | Load3 => {
                let v = self.local((instruction.opcode() - Load0.opcode()) as i32)?;
                self.push(v);
            }
            Store => {
                let v = self.pop()?;
                self.set_local(slot(), v)?;
            }
            Store0 | Store1 | Store2 | Store3 => {
                let v = self.pop()?;
                self.set_local((instruction.opcode() - Store0.opcode()) as i32, v)?;
            }
            GetStatic => {
                let v = self.static_at(operand() as u16 as i32)?;
                self.push(v);
            }
            PutStatic => {
                let v = self.pop()?;
                self.set_static(operand() as u16 as i32, v)?;
            }
            GetField => {
                let adr = self.pop()?;
                let v = self.heap_at(adr, operand() as u16 as i32)?;
                self.push(v);
            }
            PutField => {
                let v = self.pop()?;
                let adr = self.pop()?;
                *self.heap_slot(adr, operand() as u16 as i32)? = v;
            }

            Const0 | Const1 | Const2 | Const3 | Const4 | Const5 => {
                self.push((instruction.opcode() - Const0.opcode()) as i32);
            }
            ConstM1 => self.push(-1),
            Const => self.push(operand()),

            Add => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
            Sub => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
            Mul => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
            Div => self.binary(|a, b| {
                if b == 0 {
                    Err(RuntimeErrorKind::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            })?,
            Rem => self.binary(|a, b| {
                if b == 0 {
                    Err(RuntimeErrorKind::DivisionByZero)
                } else {
                    Ok(a.wrapping_rem(b))
                }
            })?,
            Neg => {
                let a = self.pop()?;
                self.push(a.wrapping_neg());
            }
            Shl => self.binary(|a, b| Ok(a.wrapping_shl(b as u32)))?,
            Shr => self.binary(|a, b| Ok(a.wrapping_shr(b as u32)))?,

            New => {
                let adr = self.alloc_heap(operand() as u16 as usize)?;
                self.push(adr);
            }
            NewArray => {
                let n = self.pop()?;
                if n < 0 {
                    return Err(RuntimeErrorKind::NegativeArraySize { size: n });
                }
                let adr = self.alloc_heap(n as usize + 1)?;
                self.heap[adr as usize] = n;
                self.push(adr);
            }
            ALoad | BALoad => {
                let index = self.pop()?;
                let adr = self.pop()?;
                let v = *self.element(adr, index)?;
                self.push(v);
            }
            AStore | BAStore => {
                let v = self.pop()?;
                let index = self.pop()?;
                let adr = self.pop()?;
                let v = if instruction == BAStore { v as u8 as i32 } else { v };
                *self.element(adr, index)? = v;
            }
            ArrayLength => {
                let adr = self.pop()?;
                let len = self.heap_at(adr, 0)?;
                self.push(len);
            }
            Pop => {
                self.pop()?;
            }

            Jmp => self.pc = target(),
            Jeq | Jne | Jlt | Jle | Jgt | Jge => {
                let b = self.pop()?;
                let a = self.pop()?;
                let taken = match instruction {
                    Jeq => a == b,
                    Jne => a != b,
                    Jlt => a < b,
                    Jle => a <= b,
                    Jgt => a > b,
                    _ => a >= b,
                };
                if taken {
                    self.pc = target();
                }
            }
            Call => {
                if self.returns.len() >= self.config.max_call_depth {
                    return Err(RuntimeErrorKind::CallDepth {
                        max: self.config.max_call_depth,
                    });
                }
                self.returns.push(next);
                self.pc = target();
            }
            Return => match self.returns.pop() {
                Some(ret) => self.pc = ret,
                None => return Ok(false),
            },
            Enter => {
                let n_params = operands[0] as u8 as usize;
                let frame_size = operands[1] as u8 as usize;
                let mut locals = vec![0; frame_size.max(n_params)];
                for slot in (0..n_params).rev() {
                    locals[slot] = self.pop()?;
                }
                self.frames.push(Frame { locals });
            }
            Exit => {
                self.frames.pop().ok_or(RuntimeErrorKind::NoFrame)?;
            }

            Read => {
                let v = self.read_int()?;
                self.push(v);
            }
            Print => {
                let width = self.pop()?.max(0) as usize;
                let v = self.pop()?;
                self.write(format!("{:>width$}", v, width = width).as_bytes());
            }
            BRead => {
                let v = self.read_byte()?;
                self.push(v);
            }
            BPrint => {
                let width = self.pop()?.max(0) as usize;
                let v = self.pop()?;
                let c = (v as u8) as char;
                self.write(format!("{:>width$}", c, width = width).as_bytes());
            }
            SPrint => {
                let start = (operand() as u16 as usize) * WORD_SIZE;
                let bytes = self
                    .data
                    .get(start..)
                    .ok_or(RuntimeErrorKind::StaticAccess { address: operand() })?;
                let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                let text = bytes[..len].to_vec();
                self.write(&text);
            }
            Trap => return Err(RuntimeErrorKind::Trap),
            Last => return Err(RuntimeErrorKind::InvalidOpcode { byte: Last.opcode() }),
        }

        Ok(true)
    }

    // =========================================================================
    // Stack and memory
    // =========================================================================

    fn push(&mut self, v: i32) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<i32, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn binary(&mut self, f: impl FnOnce(i32, i32) -> Result<i32, RuntimeErrorKind>) -> Step {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(a, b)?);
        Ok(())
    }

    fn frame_slot(&mut self, offset: i32) -> Result<&mut i32, RuntimeErrorKind> {
        let frame = self.frames.last_mut().ok_or(RuntimeErrorKind::NoFrame)?;
        let size = frame.locals.len();
        usize::try_from(offset)
            .ok()
            .and_then(|i| frame.locals.get_mut(i))
            .ok_or(RuntimeErrorKind::FrameAccess { offset, size })
    }

    fn local(&mut self, offset: i32) -> Result<i32, RuntimeErrorKind> {
        self.frame_slot(offset).map(|v| *v)
    }

    fn set_local(&mut self, offset: i32, v: i32) -> Step {
        *self.frame_slot(offset)? = v;
        Ok(())
    }

    fn static_range(&self, address: i32) -> Result<std::ops::Range<usize>, RuntimeErrorKind> {
        let start = usize::try_from(address)
            .map(|a| a * WORD_SIZE)
            .map_err(|_| RuntimeErrorKind::StaticAccess { address })?;
        if start + WORD_SIZE > self.data.len() {
            return Err(RuntimeErrorKind::StaticAccess { address });
        }
        Ok(start..start + WORD_SIZE)
    }

    fn static_at(&self, address: i32) -> Result<i32, RuntimeErrorKind> {
        let range = self.static_range(address)?;
        Ok(bytes_to_int(&self.data[range], OperandWidth::S32))
    }

    fn set_static(&mut self, address: i32, v: i32) -> Step {
        let range = self.static_range(address)?;
        self.data[range].copy_from_slice(&int_to_bytes(v, OperandWidth::S32));
        Ok(())
    }

    fn alloc_heap(&mut self, words: usize) -> Result<i32, RuntimeErrorKind> {
        let adr = self.heap.len();
        if adr + words > self.config.heap_words {
            return Err(RuntimeErrorKind::HeapExhausted {
                max: self.config.heap_words,
            });
        }
        // a zero-sized object still gets a distinct, non-null address
        self.heap.resize(adr + words.max(1), 0);
        Ok(adr as i32)
    }

    fn heap_slot(&mut self, adr: i32, offset: i32) -> Result<&mut i32, RuntimeErrorKind> {
        if adr == 0 {
            return Err(RuntimeErrorKind::NullReference);
        }
        let address = adr.wrapping_add(offset);
        usize::try_from(address)
            .ok()
            .and_then(|i| self.heap.get_mut(i))
            .ok_or(RuntimeErrorKind::HeapAccess { address })
    }

    fn heap_at(&mut self, adr: i32, offset: i32) -> Result<i32, RuntimeErrorKind> {
        self.heap_slot(adr, offset).map(|v| *v)
    }

    fn element(&mut self, adr: i32, index: i32) -> Result<&mut i32, RuntimeErrorKind> {
        let len = self.heap_at(adr, 0)?;
        if index < 0 || index >= len {
            return Err(RuntimeErrorKind::IndexOutOfBounds { index, len });
        }
        self.heap_slot(adr, index + 1)
    }

    // =========================================================================
    // I/O
    // =========================================================================

    fn write(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    /// First integer on the next input line. Text before it and after it is
    /// ignored.
    fn read_int(&mut self) -> Result<i32, RuntimeErrorKind> {
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(|e| RuntimeErrorKind::Io {
                message: e.to_string(),
            })?;
        if n == 0 {
            return Err(RuntimeErrorKind::InputEof);
        }

        let text = line.trim();
        let bytes = text.as_bytes();
        let bad_input = || RuntimeErrorKind::BadInput {
            text: text.to_string(),
        };
        let start = (0..bytes.len())
            .find(|&i| {
                bytes[i].is_ascii_digit()
                    || (bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
            })
            .ok_or_else(bad_input)?;
        let digits = bytes[start + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        text[start..start + 1 + digits].parse().map_err(|_| bad_input())
    }

    /// Next input byte, or -1 at end of input.
    fn read_byte(&mut self) -> Result<i32, RuntimeErrorKind> {
        let mut byte = [0u8; 1];
        match self.input.read(&mut byte) {
            Ok(0) => Ok(-1),
            Ok(_) => Ok(byte[0] as i32),
            Err(e) => Err(RuntimeErrorKind::Io {
                message: e.to_string(),
            }),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
