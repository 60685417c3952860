use std::collections::{BTreeSet, HashMap};

use crate::bytecode::buffer::WORD_SIZE;
use crate::bytecode::codec::bytes_to_int;
use crate::bytecode::emit_error::ObjectError;
use crate::bytecode::object::{ObjectImage, SymbolMap};
use crate::bytecode::op::Instruction;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub address: usize,
    pub instruction: Instruction,
    pub operands: Vec<i32>,
}

impl Decoded {
    /// Code address this instruction may transfer control to.
    pub fn target(&self) -> Option<usize> {
        match self.instruction {
            Instruction::Jmp | Instruction::Call => Some(self.operands[0] as u16 as usize),
            i if i.is_conditional_jump() => Some(self.operands[0] as u16 as usize),
            _ => None,
        }
    }
}

/// Decode a whole code segment.
pub fn decode(code: &[u8]) -> Result<Vec<Decoded>, ObjectError> {
    let mut out = Vec::new();
    let mut pc = 0;

    while pc < code.len() {
        let instruction = Instruction::from_opcode(code[pc]).ok_or(ObjectError::UnknownOpcode {
            address: pc,
            byte: code[pc],
        })?;

        let end = pc + instruction.size();
        if end > code.len() {
            return Err(ObjectError::truncated(format!(
                "{} at address {} needs {} bytes, {} left",
                instruction,
                pc,
                instruction.size(),
                code.len() - pc
            )));
        }

        let mut at = pc + 1;
        let mut operands = Vec::with_capacity(instruction.operands().len());
        for width in instruction.operands() {
            let value = bytes_to_int(&code[at..], *width);
            // frame offsets and sizes are unsigned bytes
            let value = match instruction {
                Instruction::Load | Instruction::Store | Instruction::Enter => value as u8 as i32,
                _ => value,
            };
            operands.push(value);
            at += width.size();
        }

        out.push(Decoded {
            address: pc,
            instruction,
            operands,
        });
        pc = end;
    }

    Ok(out)
}

/// Render an object image as an annotated listing.
pub fn disassemble_to_string(
    image: &ObjectImage,
    symbols: Option<&SymbolMap>,
) -> Result<String, ObjectError> {
    let decoded = decode(&image.code)?;
    let targets: BTreeSet<usize> = decoded.iter().filter_map(Decoded::target).collect();

    let mut output = String::new();
    output.push_str(&format!(
        "; code {} bytes, static data {} words, start pc {:04}\n",
        image.header.code_size, image.header.data_words, image.header.start_pc
    ));

    for instr in &decoded {
        if let Some(map) = symbols {
            for name in map.names_at(instr.address) {
                output.push_str(&format!("{}:\n", name));
            }
        }
        if targets.contains(&instr.address) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", instr.address));
        if instr.address == image.header.start_pc as usize {
            output.push_str("» ");
        } else if targets.contains(&instr.address) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_instruction(instr, image, symbols));
        output.push('\n');
    }

    if !image.data.is_empty() {
        output.push_str("; static data\n");
        for (word, chunk) in image.data.chunks(WORD_SIZE).enumerate() {
            output.push_str(&format!(
                "  [{:04}] {:02X} {:02X} {:02X} {:02X}\n",
                word, chunk[0], chunk[1], chunk[2], chunk[3]
            ));
        }
    }

    Ok(output)
}

/// Print the listing to stdout.
pub fn print_image(image: &ObjectImage, symbols: Option<&SymbolMap>) -> Result<(), ObjectError> {
    print!("{}", disassemble_to_string(image, symbols)?);
    Ok(())
}

fn format_instruction(instr: &Decoded, image: &ObjectImage, symbols: Option<&SymbolMap>) -> String {
    let mnemonic = instr.instruction.mnemonic();
    let operands: Vec<String> = instr.operands.iter().map(|v| v.to_string()).collect();
    let mut text = if operands.is_empty() {
        mnemonic.to_string()
    } else {
        format!("{:<12}{}", mnemonic, operands.join(" "))
    };

    if let Some(target) = instr.target() {
        let label = symbols.and_then(|map| map.names_at(target).next());
        match label {
            Some(name) => text.push_str(&format!("  ; → {:04} {}", target, name)),
            None => text.push_str(&format!("  ; → {:04}", target)),
        }
    } else if instr.instruction == Instruction::SPrint
        && let Some(s) = static_string(&image.data, instr.operands[0] as u16 as usize)
    {
        text.push_str(&format!("  ; {:?}", s));
    }

    text
}

/// NUL-terminated string starting at static word `word`.
fn static_string(data: &[u8], word: usize) -> Option<String> {
    let start = word * WORD_SIZE;
    let rest = data.get(start..)?;
    let len = rest.iter().position(|b| *b == 0)?;
    Some(String::from_utf8_lossy(&rest[..len]).into_owned())
}

// =============================================================================
// Statistics
// =============================================================================

/// How often each mnemonic occurs, most frequent first.
pub fn instruction_counts(decoded: &[Decoded]) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for instr in decoded {
        *counts.entry(instr.instruction.mnemonic()).or_insert(0) += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    counts
}
