pub mod attrib;
pub mod demo;
pub mod generator;
pub mod predefined;
pub mod semantic_error;
pub mod symbol;
pub mod token;
pub mod types;
