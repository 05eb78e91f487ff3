pub mod object;
pub mod pool;
pub mod runtime_error;
pub mod vm;

pub use object::{Heap, ObjectGraph, ObjectTable};
pub use pool::{ProgramKey, ProgramPool, ROOT_TYPE};
pub use runtime_error::{ErrorKind, RuntimeError};
pub use vm::{Vm, VmConfig};
