use crate::bytecode::op::{LineIndex, TextId};
use thiserror::Error;

/// Errors raised while building or validating a program.
///
/// A conforming front end never triggers these; they signal a code generator
/// defect and are reported before any program reaches the pool.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A jump refers to a label that was never placed.
    #[error("compile error: label L{0} is referenced but never defined")]
    UndefinedLabel(u32),

    /// A label was placed twice.
    #[error("compile error: label L{label} defined twice (lines {first} and {second})")]
    LabelRedefined {
        label: u32,
        first: LineIndex,
        second: LineIndex,
    },

    /// A label that this builder did not create.
    #[error("compile error: unknown label L{0}\n  hint: labels must come from new_label() on the same builder")]
    UnknownLabel(u32),

    #[error("compile error: line {line}: jump target {target} is outside the program ({len} lines)")]
    JumpOutOfRange {
        line: LineIndex,
        target: LineIndex,
        len: usize,
    },

    #[error("compile error: label L{label} is placed at line {line}, past the end of the program ({len} lines)")]
    LabelOutOfRange {
        label: u32,
        line: LineIndex,
        len: usize,
    },

    #[error("compile error: line {line}: temporary t{temp} does not exist")]
    TempOutOfRange { line: LineIndex, temp: u8 },

    #[error("compile error: line {line}: text index {index} is outside the text pool ({len} entries)")]
    TextOutOfRange {
        line: LineIndex,
        index: TextId,
        len: usize,
    },

    /// Internal code generator error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}
