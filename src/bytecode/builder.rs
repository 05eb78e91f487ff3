use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{LineIndex, Op, TextId};
use crate::bytecode::program::Program;
use crate::bytecode::validate::check_program;

/// A jump destination handed out by [`ProgramBuilder::new_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Incrementally assembles a [`Program`].
///
/// Labels may be referenced before they are placed. Every jump emitted
/// through [`add_jump`](Self::add_jump) is written with a placeholder target
/// and recorded in a patch list; [`finish`](Self::finish) rewrites all of
/// them once the final line of every label is known.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    arity: u32,
    lines: Vec<Op>,
    texts: Vec<String>,
    labels: Vec<Option<LineIndex>>,
    /// (line of the jump, label it refers to)
    patches: Vec<(usize, Label)>,
}

impl ProgramBuilder {
    pub fn new(arity: u32) -> Self {
        Self {
            arity,
            ..Self::default()
        }
    }

    /// Index the next appended line will get.
    pub fn next_line(&self) -> LineIndex {
        self.lines.len() as LineIndex
    }

    pub fn add_line(&mut self, op: Op) -> LineIndex {
        let line = self.next_line();
        self.lines.push(op);
        line
    }

    /// Append `text` to the text pool and return its index.
    pub fn add_text(&mut self, text: &str) -> TextId {
        let id = self.texts.len() as TextId;
        self.texts.push(text.to_string());
        id
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Place `label` at the next line.
    pub fn add_label(&mut self, label: Label) -> Result<(), CompileError> {
        let here = self.next_line();
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(CompileError::UnknownLabel(label.0))?;

        if let Some(first) = *slot {
            return Err(CompileError::LabelRedefined {
                label: label.0,
                first,
                second: here,
            });
        }

        *slot = Some(here);
        Ok(())
    }

    /// Emit a jump to `label`, e.g. `builder.add_jump(Op::Jne, loop_start)`.
    pub fn add_jump(
        &mut self,
        jump: fn(LineIndex) -> Op,
        label: Label,
    ) -> Result<LineIndex, CompileError> {
        if label.0 as usize >= self.labels.len() {
            return Err(CompileError::UnknownLabel(label.0));
        }

        let op = jump(0);
        if op.jump_target().is_none() {
            return Err(CompileError::internal(format!(
                "add_jump called with non-jump op '{}'",
                op.mnemonic()
            )));
        }

        let line = self.add_line(op);
        self.patches.push((line as usize, label));
        Ok(line)
    }

    /// Resolve every pending jump and freeze the program.
    pub fn finish(mut self) -> Result<Program, CompileError> {
        for (site, label) in std::mem::take(&mut self.patches) {
            let target = self
                .labels
                .get(label.0 as usize)
                .copied()
                .flatten()
                .ok_or(CompileError::UndefinedLabel(label.0))?;

            let slot = self
                .lines
                .get_mut(site)
                .and_then(Op::jump_target_mut)
                .ok_or_else(|| CompileError::internal(format!("patch site {} is not a jump", site)))?;
            *slot = target;
        }

        // unreferenced labels that were never placed are harmless
        let program = Program::from_parts(self.arity, self.lines, self.texts, self.labels);
        check_program(&program)?;
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Temp;

    #[test]
    fn test_forward_reference_is_patched() {
        let mut b = ProgramBuilder::new(0);
        let end = b.new_label();
        b.add_jump(Op::Jmp, end).unwrap();
        b.add_line(Op::Nop);
        b.add_label(end).unwrap();
        b.add_line(Op::Ret);

        let p = b.finish().unwrap();
        assert_eq!(p.lines()[0], Op::Jmp(2));
        assert_eq!(p.labels(), &[Some(2)]);
    }

    #[test]
    fn test_unplaced_label_is_kept_as_none() {
        let mut b = ProgramBuilder::new(0);
        let spare = b.new_label();
        let end = b.new_label();
        b.add_line(Op::Ret);
        b.add_label(end).unwrap();

        let p = b.finish().unwrap();
        assert_eq!(spare.id(), 0);
        assert_eq!(p.labels(), &[None, Some(1)]);
    }

    #[test]
    fn test_backward_reference() {
        let mut b = ProgramBuilder::new(0);
        let top = b.new_label();
        b.add_line(Op::Movf(Temp::T2, 3.0));
        b.add_label(top).unwrap();
        b.add_line(Op::Dec(Temp::T2));
        b.add_jump(Op::Jne, top).unwrap();
        b.add_line(Op::Ret);

        let p = b.finish().unwrap();
        assert_eq!(p.lines()[2], Op::Jne(1));
    }

    #[test]
    fn test_label_referenced_many_times() {
        let mut b = ProgramBuilder::new(0);
        let target = b.new_label();
        b.add_jump(Op::Je, target).unwrap();
        b.add_jump(Op::Jl, target).unwrap();
        b.add_label(target).unwrap();
        b.add_line(Op::Ret);
        b.add_jump(Op::Jmp, target).unwrap();

        let p = b.finish().unwrap();
        assert_eq!(p.lines()[0], Op::Je(2));
        assert_eq!(p.lines()[1], Op::Jl(2));
        assert_eq!(p.lines()[3], Op::Jmp(2));
    }

    #[test]
    fn test_undefined_label() {
        let mut b = ProgramBuilder::new(0);
        let nowhere = b.new_label();
        b.add_jump(Op::Jmp, nowhere).unwrap();
        b.add_line(Op::Ret);

        assert_eq!(b.finish(), Err(CompileError::UndefinedLabel(0)));
    }

    #[test]
    fn test_label_defined_twice() {
        let mut b = ProgramBuilder::new(0);
        let l = b.new_label();
        b.add_label(l).unwrap();
        b.add_line(Op::Nop);
        assert_eq!(
            b.add_label(l),
            Err(CompileError::LabelRedefined {
                label: 0,
                first: 0,
                second: 1
            })
        );
    }

    #[test]
    fn test_foreign_label_rejected() {
        let mut other = ProgramBuilder::new(0);
        other.new_label();
        let foreign = other.new_label();

        let mut b = ProgramBuilder::new(0);
        assert_eq!(b.add_label(foreign), Err(CompileError::UnknownLabel(1)));
        assert_eq!(
            b.add_jump(Op::Jmp, foreign),
            Err(CompileError::UnknownLabel(1))
        );
    }

    #[test]
    fn test_non_jump_rejected() {
        let mut b = ProgramBuilder::new(0);
        let l = b.new_label();
        let result = b.add_jump(|_| Op::Ret, l);
        assert!(matches!(result, Err(CompileError::Internal(_))));
    }

    #[test]
    fn test_texts_are_appended() {
        let mut b = ProgramBuilder::new(2);
        assert_eq!(b.add_text("a"), 0);
        assert_eq!(b.add_text("a"), 1);
        b.add_line(Op::Movs(Temp::T0, 1));
        b.add_line(Op::Ret);

        let p = b.finish().unwrap();
        assert_eq!(p.arity(), 2);
        assert_eq!(p.text(1), Some("a"));
        assert_eq!(p.texts().len(), 2);
    }
}
