// =============================================================================
// CODEC - fixed-width big-endian operand encoding
// =============================================================================

/// Width of an explicit instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    S8,
    S16,
    S32,
}

impl OperandWidth {
    /// Number of bytes the operand occupies in the code segment.
    pub const fn size(self) -> usize {
        match self {
            OperandWidth::S8 => 1,
            OperandWidth::S16 => 2,
            OperandWidth::S32 => 4,
        }
    }

    /// Smallest value representable without loss.
    pub const fn min(self) -> i32 {
        match self {
            OperandWidth::S8 => i8::MIN as i32,
            OperandWidth::S16 => i16::MIN as i32,
            OperandWidth::S32 => i32::MIN,
        }
    }

    /// Largest value representable without loss.
    pub const fn max(self) -> i32 {
        match self {
            OperandWidth::S8 => i8::MAX as i32,
            OperandWidth::S16 => i16::MAX as i32,
            OperandWidth::S32 => i32::MAX,
        }
    }

    /// Whether the encoded bytes carry `value` exactly when read back as
    /// either signed or unsigned.
    pub fn holds(self, value: i32) -> bool {
        let v = value as i64;
        v >= self.min() as i64 && v <= 2 * self.max() as i64 + 1
    }
}

/// Encode `value` big-endian, keeping only the low `width` bytes.
pub fn int_to_bytes(value: i32, width: OperandWidth) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    bytes[4 - width.size()..].to_vec()
}

/// Decode a signed big-endian integer of the given width.
///
/// Panics if `bytes` holds fewer than `width.size()` bytes.
pub fn bytes_to_int(bytes: &[u8], width: OperandWidth) -> i32 {
    match width {
        OperandWidth::S8 => bytes[0] as i8 as i32,
        OperandWidth::S16 => i16::from_be_bytes([bytes[0], bytes[1]]) as i32,
        OperandWidth::S32 => i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// The value `bytes_to_int(int_to_bytes(value, width), width)` yields.
#[allow(dead_code)]
pub fn truncate(value: i32, width: OperandWidth) -> i32 {
    match width {
        OperandWidth::S8 => value as i8 as i32,
        OperandWidth::S16 => value as i16 as i32,
        OperandWidth::S32 => value,
    }
}
