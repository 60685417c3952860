use std::collections::HashMap;

use tracing::{debug, trace};

use crate::bytecode::codec::{OperandWidth, int_to_bytes};
use crate::bytecode::emit_error::ObjectError;
use crate::bytecode::op::Instruction;

/// Machine word size in bytes.
pub const WORD_SIZE: usize = 4;

// =============================================================================
// CODE BUFFER
// =============================================================================

/// One byte of code memory. `Placeholder` marks bytes whose value is not
/// known yet; each one is written exactly once by a backpatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Fixed(u8),
    Placeholder,
}

/// Append-only code memory.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    cells: Vec<Cell>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the next byte to be appended.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<Cell> {
        self.cells.get(address).copied()
    }

    pub fn emit(&mut self, instruction: Instruction) {
        trace!("{:04} {}", self.cells.len(), instruction);
        self.cells.push(Cell::Fixed(instruction.opcode()));
    }

    /// Append `value` big-endian, truncated to `width`.
    pub fn emit_operand(&mut self, value: i32, width: OperandWidth) {
        self.cells
            .extend(int_to_bytes(value, width).into_iter().map(Cell::Fixed));
    }

    /// Append `n_bytes` placeholders and return the address of the first.
    pub fn emit_placeholder(&mut self, n_bytes: usize) -> usize {
        let start = self.cells.len();
        self.cells
            .extend(std::iter::repeat_n(Cell::Placeholder, n_bytes));
        start
    }

    /// Overwrite a placeholder region starting at `address`.
    ///
    /// Panics if any byte of the region is already fixed: writing it twice
    /// means two emissions computed the same slot.
    pub fn backpatch(&mut self, address: usize, value: i32, width: OperandWidth) {
        let bytes = int_to_bytes(value, width);
        for (i, byte) in bytes.into_iter().enumerate() {
            match self.cells.get_mut(address + i) {
                Some(cell) if *cell == Cell::Placeholder => *cell = Cell::Fixed(byte),
                Some(_) => {
                    panic!("code buffer has no placeholder at address {}", address + i)
                }
                None => panic!(
                    "backpatch address {} beyond end of code buffer ({} bytes)",
                    address + i,
                    self.cells.len()
                ),
            }
        }
        debug!("backpatched {:04} <- {}", address, value);
    }

    /// The finished code segment.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ObjectError> {
        self.cells
            .iter()
            .enumerate()
            .map(|(address, cell)| match cell {
                Cell::Fixed(b) => Ok(*b),
                Cell::Placeholder => Err(ObjectError::UnresolvedPlaceholder { address }),
            })
            .collect()
    }
}

// =============================================================================
// STATIC DATA
// =============================================================================

/// Globals and string constants. Always a whole number of words long.
#[derive(Debug, Default)]
pub struct StaticData {
    bytes: Vec<u8>,
}

impl StaticData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size in words.
    pub fn words(&self) -> usize {
        self.bytes.len() / WORD_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append `words` zeroed words; returns the word offset of the first.
    pub fn alloc_words(&mut self, words: usize) -> usize {
        let offset = self.words();
        self.bytes
            .extend(std::iter::repeat_n(0u8, words * WORD_SIZE));
        offset
    }

    /// Append `text` NUL-terminated and zero-padded to a word boundary;
    /// returns the word offset of its first byte.
    pub fn alloc_string(&mut self, text: &str) -> usize {
        let offset = self.words();
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
        let padding = (WORD_SIZE - self.bytes.len() % WORD_SIZE) % WORD_SIZE;
        self.bytes.extend(std::iter::repeat_n(0u8, padding));
        offset
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// Label definitions plus every code slot waiting for a label's address.
#[derive(Debug, Default)]
pub struct LabelTable {
    addresses: HashMap<String, usize>,
    references: HashMap<String, Vec<usize>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `address`. Panics if `name` is already bound.
    pub fn define(&mut self, name: &str, address: usize) {
        if let Some(previous) = self.addresses.get(name) {
            panic!(
                "label '{}' already defined at address {}",
                name, previous
            );
        }
        debug!("label {} = {:04}", name, address);
        self.addresses.insert(name.to_string(), address);
    }

    /// Record that the s16 slot at `address` must receive `name`'s address.
    pub fn reference(&mut self, name: &str, address: usize) {
        self.references
            .entry(name.to_string())
            .or_default()
            .push(address);
    }

    pub fn address_of(&self, name: &str) -> Option<usize> {
        self.addresses.get(name).copied()
    }

    /// Defined labels sorted by address, then name.
    pub fn definitions(&self) -> Vec<(String, usize)> {
        let mut defs: Vec<_> = self
            .addresses
            .iter()
            .map(|(name, addr)| (name.clone(), *addr))
            .collect();
        defs.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        defs
    }

    /// Patch every referenced slot with its label's address.
    ///
    /// References are consumed, so calling this again only patches slots
    /// recorded since the previous call. Fails on the first (by name)
    /// referenced label without a definition; nothing is patched then.
    pub fn resolve_all(&mut self, code: &mut CodeBuffer) -> Result<(), ObjectError> {
        let mut names: Vec<&String> = self.references.keys().collect();
        names.sort();

        if let Some(missing) = names
            .iter()
            .find(|name| !self.addresses.contains_key(name.as_str()))
        {
            return Err(ObjectError::UndefinedLabel {
                label: (*missing).clone(),
            });
        }

        for (name, slots) in self.references.drain() {
            let address = self.addresses[&name];
            debug!(
                "resolving {} -> {:04} ({} references)",
                name,
                address,
                slots.len()
            );
            for slot in slots {
                code.backpatch(slot, address as i32, OperandWidth::S16);
            }
        }

        Ok(())
    }
}
