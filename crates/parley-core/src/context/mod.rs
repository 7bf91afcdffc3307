mod assembler;

pub use assembler::{AssemblyInput, RequestAssembler};
