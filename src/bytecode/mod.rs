pub mod buffer;
pub mod codec;
pub mod disasm;
pub mod emit_error;
pub mod emitter;
pub mod frame;
pub mod object;
pub mod op;

pub use emitter::Backend;
pub use object::{ObjectImage, SymbolMap};
