use crate::lang::ObjectHandle;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// What went wrong. Every kind is fatal: the driver reports it and stops.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // configuration
    #[error("duplicate function \"{name}\" in object \"{owner}\"")]
    DuplicateProgram { owner: String, name: String },

    #[error("invalid function \"{name}\" in object \"{owner}\": {reason}")]
    InvalidProgram {
        owner: String,
        name: String,
        reason: String,
    },

    // resolution
    #[error("can't find function \"{name}\" in object \"{owner}\"")]
    UnresolvedProgram { owner: String, name: String },

    #[error("no such object: [object @ 0x{0:x}]")]
    UnknownObject(ObjectHandle),

    // execution bounds
    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow: more than {0} values")]
    StackOverflow(usize),

    #[error("stack access out of range: slot {index}, stack holds {len} values")]
    StackOutOfRange { index: i64, len: usize },

    #[error("invalid heap cell address {address}: object has {len} cells")]
    CellOutOfRange { address: f32, len: usize },

    #[error("heap limit exceeded: more than {0} cells")]
    HeapLimitExceeded(usize),

    #[error("temporary t{0} does not exist")]
    TempOutOfRange(u8),

    #[error("text index {0} is outside the text pool")]
    TextOutOfRange(u32),

    #[error("line {0} is outside the program")]
    LineOutOfRange(u32),

    #[error("call depth limit exceeded ({0}) - possible infinite recursion")]
    CallDepthExceeded(usize),

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("i/o error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    /// `Owner.program` frames active at the fault, innermost first.
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_message_names_object_and_function() {
        let err = RuntimeError::new(ErrorKind::UnresolvedProgram {
            owner: "Enemy".to_string(),
            name: "missing".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "runtime error: can't find function \"missing\" in object \"Enemy\""
        );
    }

    #[test]
    fn test_call_stack_is_printed_innermost_first() {
        let err = RuntimeError::new(ErrorKind::StackUnderflow)
            .with_context("Enemy.think")
            .with_context("Application.main");
        let msg = err.to_string();

        assert!(msg.contains("call stack"));
        let inner = msg.find("0: Enemy.think").unwrap();
        let outer = msg.find("1: Application.main").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn test_unknown_object_shows_handle_in_hex() {
        let msg = ErrorKind::UnknownObject(31).to_string();
        assert!(msg.contains("0x1f"));
    }

    #[test]
    fn test_source_is_kind() {
        use std::error::Error;
        let err: RuntimeError = ErrorKind::StackUnderflow.into();
        assert!(err.source().is_some());
    }
}
