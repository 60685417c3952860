pub mod runtime_error;
pub mod vm;

pub use vm::{Vm, VmConfig};
