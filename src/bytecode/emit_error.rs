use thiserror::Error;

/// Failures detected while finalizing or reading an object file.
///
/// Emission-time misuse of the backend (opening nested procedures,
/// overwriting resolved code bytes, ...) is a bug in the caller and panics
/// instead; these variants cover what can only be known at the end.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object error: no main procedure was defined")]
    NoMainProcedure,

    #[error("object error: label '{label}' is referenced but never defined")]
    UndefinedLabel { label: String },

    #[error("object error: code byte at address {address} was never backpatched")]
    UnresolvedPlaceholder { address: usize },

    #[error("object error: procedure '{label}' is still open")]
    OpenProcedure { label: String },

    #[error("object error: code segment of {size} bytes exceeds the 16-bit address space")]
    CodeTooLarge { size: usize },

    #[error("object error: bad magic bytes {found:02X?}, expected 4D 4A")]
    BadMagic { found: [u8; 2] },

    #[error("object error: unknown opcode {byte} at address {address}")]
    UnknownOpcode { address: usize, byte: u8 },

    #[error("object error: truncated object file ({reason})")]
    Truncated { reason: String },

    #[error("object error: malformed symbol map: {0}")]
    SymbolMap(#[from] postcard::Error),

    #[error("object error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectError {
    pub fn truncated(reason: impl Into<String>) -> Self {
        ObjectError::Truncated {
            reason: reason.into(),
        }
    }
}
