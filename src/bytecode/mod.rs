//! Instruction set, program construction and the code-generation
//! conventions shared by every front end.

pub mod builder;
pub mod codegen;
pub mod compile_error;
pub mod disasm;
pub mod image;
pub mod op;
pub mod program;
pub mod validate;

pub use builder::{Label, ProgramBuilder};
pub use codegen::{CONSTRUCTOR, CodeGen};
pub use compile_error::CompileError;
pub use op::{CellIndex, LineIndex, Op, TEMP_COUNT, Temp, TextId};
pub use program::Program;
