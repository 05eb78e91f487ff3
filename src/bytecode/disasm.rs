use crate::bytecode::op::Op;
use crate::bytecode::program::Program;
use crate::lang::Value;
use crate::runtime::ProgramPool;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

const RULE: &str = "════════════════════════════════════════";

/// Disassembly of every program in the pool, sorted by owner then name.
pub fn disassemble_pool(pool: &ProgramPool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== PROGRAM POOL ({} programs) ===\n", pool.len());

    for (key, program) in pool.entries() {
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, " {} (arity {})", key, program.arity());
        let _ = writeln!(out, " {} lines, {} texts", program.len(), program.texts().len());
        let _ = writeln!(out, "{}", RULE);
        out.push_str(&disassemble(program));
        out.push('\n');
    }

    out
}

/// One line per instruction; lines targeted by a jump are marked with `►`.
/// Each placed label gets its own `Ln:` line before the instruction it names.
pub fn disassemble(program: &Program) -> String {
    let targets = collect_jump_targets(program);
    let labels = collect_labels(program);
    let mut out = String::new();

    for (line, op) in program.lines().iter().enumerate() {
        write_labels(&mut out, &labels, line);

        let marker = if targets.contains(&line) { "►" } else { " " };
        let operands = format_operands(op, program);

        let _ = if operands.is_empty() {
            writeln!(out, "{:04} {} {}", line, marker, op.mnemonic())
        } else {
            writeln!(out, "{:04} {} {:<6}{}", line, marker, op.mnemonic(), operands)
        };
    }
    write_labels(&mut out, &labels, program.len());

    out
}

/// Line -> ids of the labels placed there.
fn collect_labels(program: &Program) -> BTreeMap<usize, Vec<usize>> {
    let mut labels: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (id, line) in program.labels().iter().enumerate() {
        if let Some(line) = line {
            labels.entry(*line as usize).or_default().push(id);
        }
    }
    labels
}

fn write_labels(out: &mut String, labels: &BTreeMap<usize, Vec<usize>>, line: usize) {
    for id in labels.get(&line).into_iter().flatten() {
        let _ = writeln!(out, "       L{}:", id);
    }
}

fn collect_jump_targets(program: &Program) -> BTreeSet<usize> {
    program
        .lines()
        .iter()
        .filter_map(Op::jump_target)
        .map(|t| t as usize)
        .collect()
}

fn format_text(program: &Program, id: u32) -> String {
    match program.text(id) {
        Some(text) => format!("{:?}", text),
        None => format!("<text #{}>", id),
    }
}

fn format_operands(op: &Op, program: &Program) -> String {
    match op {
        Op::Movb(a, b) => format!("{}, {}", a, b),
        Op::Movf(a, n) => format!("{}, {}", a, n),
        Op::Movs(a, id) => format!("{}, {}", a, format_text(program, *id)),
        Op::Movo(a, h) => format!("{}, {}", a, Value::Object(*h)),
        Op::Peek(a, cell) | Op::Poke(a, cell) => format!("{}, [{}]", a, cell),
        Op::Speek(a, offset) | Op::Spoke(a, offset) => format!("{}, sp{:+}", a, offset),
        Op::Call(id, argc) => format!("{}, {}", format_text(program, *id), argc),
        _ => {
            if let Some(target) = op.jump_target() {
                return format!("{:04}", target);
            }
            op.temps()
                .iter()
                .flatten()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}
