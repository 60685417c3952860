use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::bytecode::buffer::WORD_SIZE;
use crate::bytecode::codec::{OperandWidth, bytes_to_int, int_to_bytes};
use crate::bytecode::emit_error::ObjectError;

/// `"MJ"`
pub const MAGIC: [u8; 2] = [0x4D, 0x4A];

/// Magic + code size + data size + start pc.
pub const HEADER_SIZE: usize = 14;

// =============================================================================
// OBJECT FILE
// =============================================================================

/// Fixed-size object file header. All fields are big-endian on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Code segment size in bytes.
    pub code_size: u32,
    /// Static data segment size in words.
    pub data_words: u32,
    /// Code address execution starts at.
    pub start_pc: u32,
}

impl ObjectHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&MAGIC);
        out.extend(int_to_bytes(self.code_size as i32, OperandWidth::S32));
        out.extend(int_to_bytes(self.data_words as i32, OperandWidth::S32));
        out.extend(int_to_bytes(self.start_pc as i32, OperandWidth::S32));
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ObjectError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ObjectError::truncated(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if bytes[0..2] != MAGIC {
            return Err(ObjectError::BadMagic {
                found: [bytes[0], bytes[1]],
            });
        }
        let field = |at: usize| bytes_to_int(&bytes[at..at + 4], OperandWidth::S32) as u32;
        Ok(Self {
            code_size: field(2),
            data_words: field(6),
            start_pc: field(10),
        })
    }
}

/// A complete, loadable program: header, code segment, static data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectImage {
    pub header: ObjectHeader,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
}

impl ObjectImage {
    /// `data` must be a whole number of words.
    pub fn new(code: Vec<u8>, data: Vec<u8>, start_pc: u32) -> Self {
        debug_assert_eq!(data.len() % WORD_SIZE, 0);
        Self {
            header: ObjectHeader {
                code_size: code.len() as u32,
                data_words: (data.len() / WORD_SIZE) as u32,
                start_pc,
            },
            code,
            data,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header.to_bytes();
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), ObjectError> {
        sink.write_all(&self.to_bytes())?;
        sink.flush()?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ObjectError> {
        let header = ObjectHeader::parse(bytes)?;
        let code_end = HEADER_SIZE + header.code_size as usize;
        let data_end = code_end + header.data_words as usize * WORD_SIZE;

        if bytes.len() < data_end {
            return Err(ObjectError::truncated(format!(
                "header announces {} bytes, file has {}",
                data_end,
                bytes.len()
            )));
        }

        Ok(Self {
            header,
            code: bytes[HEADER_SIZE..code_end].to_vec(),
            data: bytes[code_end..data_end].to_vec(),
        })
    }
}

// =============================================================================
// SYMBOL MAP - label names for the disassembler
// =============================================================================

/// Resolved label addresses, written next to an object file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolMap {
    pub entry: u16,
    /// `(label, code address)`, sorted by address.
    pub labels: Vec<(String, u16)>,
}

impl SymbolMap {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ObjectError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ObjectError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// All labels bound to `address`.
    pub fn names_at(&self, address: usize) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(move |(_, a)| *a as usize == address)
            .map(|(name, _)| name.as_str())
    }
}
