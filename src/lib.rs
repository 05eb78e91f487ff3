//! Execution core of the cinder scripting language: the dynamically typed
//! [`Value`](lang::Value), a register + stack bytecode, the program pool
//! that resolves methods by object type, and the virtual machine that runs
//! them.

pub mod bytecode;
pub mod lang;
pub mod runtime;
