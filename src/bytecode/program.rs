use crate::bytecode::op::{LineIndex, Op, TextId};
use serde::{Deserialize, Serialize};

/// A compiled, callable unit of bytecode: one method of one object type.
///
/// Programs are produced by [`ProgramBuilder`](crate::bytecode::ProgramBuilder),
/// which resolves every label before handing the program out. Once built a
/// program is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Number of parameters the program expects.
    arity: u32,

    lines: Vec<Op>,

    /// Text operands (`movs`, `call`), appended without deduplication.
    texts: Vec<String>,

    /// Label id -> the line it was placed before. A label may sit at
    /// `lines.len()` when it closes the program; one never placed is `None`.
    labels: Vec<Option<LineIndex>>,
}

impl Program {
    pub(crate) fn from_parts(
        arity: u32,
        lines: Vec<Op>,
        texts: Vec<String>,
        labels: Vec<Option<LineIndex>>,
    ) -> Self {
        Self {
            arity,
            lines,
            texts,
            labels,
        }
    }

    pub fn arity(&self) -> u32 {
        self.arity
    }

    pub fn lines(&self) -> &[Op] {
        &self.lines
    }

    pub fn line(&self, index: LineIndex) -> Option<&Op> {
        self.lines.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self, id: TextId) -> Option<&str> {
        self.texts.get(id as usize).map(String::as_str)
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn labels(&self) -> &[Option<LineIndex>] {
        &self.labels
    }
}
