use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{LineIndex, TEMP_COUNT};
use crate::bytecode::program::Program;

/// Check that every operand of `program` addresses something that exists.
///
/// Jump targets must name a line of the program, temporaries must be one of
/// the `TEMP_COUNT` registers and text operands must index the text pool.
/// A placed label may also sit just past the last line.
/// Programs that pass this check cannot fault on operand decoding; stack and
/// heap bounds still depend on runtime state.
pub fn check_program(program: &Program) -> Result<(), CompileError> {
    let len = program.len();
    let text_len = program.texts().len();

    for (ip, op) in program.lines().iter().enumerate() {
        let line = ip as LineIndex;

        for temp in op.temps().into_iter().flatten() {
            if temp.index() >= TEMP_COUNT {
                return Err(CompileError::TempOutOfRange { line, temp: temp.0 });
            }
        }

        if let Some(index) = op.text_index() {
            if index as usize >= text_len {
                return Err(CompileError::TextOutOfRange {
                    line,
                    index,
                    len: text_len,
                });
            }
        }

        if let Some(target) = op.jump_target() {
            if target as usize >= len {
                return Err(CompileError::JumpOutOfRange { line, target, len });
            }
        }
    }

    for (label, line) in program.labels().iter().enumerate() {
        if let Some(line) = *line {
            if line as usize > len {
                return Err(CompileError::LabelOutOfRange {
                    label: label as u32,
                    line,
                    len,
                });
            }
        }
    }

    Ok(())
}
