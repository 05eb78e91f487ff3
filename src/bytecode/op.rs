use crate::lang::ObjectHandle;
use serde::{Deserialize, Serialize};

/// Index into a program's text pool.
pub type TextId = u32;

/// Index of a line inside a program.
pub type LineIndex = u32;

/// Index of a cell inside an object's heap.
pub type CellIndex = u32;

/// Number of addressable temporaries per frame.
pub const TEMP_COUNT: usize = 4;

/// A temporary register operand.
///
/// By convention `t0` holds the value of the last evaluated expression and
/// marshals call arguments, `t1` is a secondary operand, `t2` holds flags
/// written by comparisons, and `t3` holds the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Temp(pub u8);

impl Temp {
    pub const T0: Temp = Temp(0);
    pub const T1: Temp = Temp(1);
    pub const T2: Temp = Temp(2);
    pub const T3: Temp = Temp(3);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Temp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Nop,

    // I/O
    /// Print `t[a]` followed by a newline.
    Out(Temp),
    /// Read one line of input into `t[a]`.
    In(Temp),

    // data movement
    Movn(Temp),
    Movb(Temp, bool),
    Movf(Temp, f32),
    Movs(Temp, TextId),
    Movo(Temp, ObjectHandle),
    /// `t[a]` = handle of the object running this program.
    Movc(Temp),
    Movt(Temp, Temp),
    Xchg(Temp, Temp),

    // memory
    /// Allocate a heap cell, storing its address in `t[a]`.
    Aloc(Temp),
    /// `t[a] = *(t[b])`
    Load(Temp, Temp),
    /// `*(t[b]) = t[a]`
    Store(Temp, Temp),
    /// `t[a] = *b`
    Peek(Temp, CellIndex),
    /// `*b = t[a]`
    Poke(Temp, CellIndex),

    // stack
    Push(Temp),
    Pop(Temp),
    /// `t[a] = stack[base + b]`
    Speek(Temp, i32),
    /// `stack[base + b] = t[a]`
    Spoke(Temp, i32),

    // arithmetic & logic
    Inc(Temp),
    Dec(Temp),
    Add(Temp, Temp),
    Sub(Temp, Temp),
    Mul(Temp, Temp),
    Div(Temp, Temp),
    /// `t[a] = -t[b]`
    Neg(Temp, Temp),
    /// `t[a] = !t[b]`
    Lnot(Temp, Temp),
    /// `t[a] = ~t[b]`
    Not(Temp, Temp),
    And(Temp, Temp),
    Or(Temp, Temp),
    Xor(Temp, Temp),
    /// `t[a] = text(t[a]) ++ text(t[b])`
    Cat(Temp, Temp),

    // coercion
    Bool(Temp),
    Val(Temp),
    Str(Temp),

    // comparison & type checks, all writing t[2]
    Test(Temp, Temp),
    Tchk(Temp, Temp),
    Tchk0(Temp),
    Tchkb(Temp),
    Tchkn(Temp),
    Tchks(Temp),
    Tchko(Temp),
    Cmp(Temp, Temp),

    // control flow, reading t[2]
    Jmp(LineIndex),
    Je(LineIndex),
    Jne(LineIndex),
    Jg(LineIndex),
    Jge(LineIndex),
    Jl(LineIndex),
    Jle(LineIndex),

    /// Call the program named `text[a]` on the object sitting below the `b`
    /// arguments at the top of the stack. The result lands in `t[0]`.
    Call(TextId, u32),
    /// Return, halting the program.
    Ret,
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::Out(_) => "out",
            Op::In(_) => "in",
            Op::Movn(_) => "movn",
            Op::Movb(..) => "movb",
            Op::Movf(..) => "movf",
            Op::Movs(..) => "movs",
            Op::Movo(..) => "movo",
            Op::Movc(_) => "movc",
            Op::Movt(..) => "movt",
            Op::Xchg(..) => "xchg",
            Op::Aloc(_) => "aloc",
            Op::Load(..) => "load",
            Op::Store(..) => "store",
            Op::Peek(..) => "peek",
            Op::Poke(..) => "poke",
            Op::Push(_) => "push",
            Op::Pop(_) => "pop",
            Op::Speek(..) => "speek",
            Op::Spoke(..) => "spoke",
            Op::Inc(_) => "inc",
            Op::Dec(_) => "dec",
            Op::Add(..) => "add",
            Op::Sub(..) => "sub",
            Op::Mul(..) => "mul",
            Op::Div(..) => "div",
            Op::Neg(..) => "neg",
            Op::Lnot(..) => "lnot",
            Op::Not(..) => "not",
            Op::And(..) => "and",
            Op::Or(..) => "or",
            Op::Xor(..) => "xor",
            Op::Cat(..) => "cat",
            Op::Bool(_) => "bool",
            Op::Val(_) => "val",
            Op::Str(_) => "str",
            Op::Test(..) => "test",
            Op::Tchk(..) => "tchk",
            Op::Tchk0(_) => "tchk0",
            Op::Tchkb(_) => "tchkb",
            Op::Tchkn(_) => "tchkn",
            Op::Tchks(_) => "tchks",
            Op::Tchko(_) => "tchko",
            Op::Cmp(..) => "cmp",
            Op::Jmp(_) => "jmp",
            Op::Je(_) => "je",
            Op::Jne(_) => "jne",
            Op::Jg(_) => "jg",
            Op::Jge(_) => "jge",
            Op::Jl(_) => "jl",
            Op::Jle(_) => "jle",
            Op::Call(..) => "call",
            Op::Ret => "ret",
        }
    }

    /// Temporaries named by this instruction, in operand order.
    pub fn temps(&self) -> [Option<Temp>; 2] {
        use Op::*;
        match *self {
            Out(a) | In(a) | Movn(a) | Movb(a, _) | Movf(a, _) | Movs(a, _) | Movo(a, _)
            | Movc(a) | Aloc(a) | Peek(a, _) | Poke(a, _) | Push(a) | Pop(a) | Speek(a, _)
            | Spoke(a, _) | Inc(a) | Dec(a) | Bool(a) | Val(a) | Str(a) | Tchk0(a)
            | Tchkb(a) | Tchkn(a) | Tchks(a) | Tchko(a) => [Some(a), None],

            Movt(a, b) | Xchg(a, b) | Load(a, b) | Store(a, b) | Add(a, b) | Sub(a, b)
            | Mul(a, b) | Div(a, b) | Neg(a, b) | Lnot(a, b) | Not(a, b) | And(a, b)
            | Or(a, b) | Xor(a, b) | Cat(a, b) | Test(a, b) | Tchk(a, b) | Cmp(a, b) => {
                [Some(a), Some(b)]
            }

            Nop | Jmp(_) | Je(_) | Jne(_) | Jg(_) | Jge(_) | Jl(_) | Jle(_) | Call(..) | Ret => {
                [None, None]
            }
        }
    }

    /// Text-pool index carried by this instruction, if any.
    pub fn text_index(&self) -> Option<TextId> {
        match self {
            Op::Movs(_, id) | Op::Call(id, _) => Some(*id),
            _ => None,
        }
    }

    pub fn jump_target(&self) -> Option<LineIndex> {
        match self {
            Op::Jmp(t) | Op::Je(t) | Op::Jne(t) | Op::Jg(t) | Op::Jge(t) | Op::Jl(t)
            | Op::Jle(t) => Some(*t),
            _ => None,
        }
    }

    /// Mutable access to the jump target, used to patch forward references.
    pub fn jump_target_mut(&mut self) -> Option<&mut LineIndex> {
        match self {
            Op::Jmp(t) | Op::Je(t) | Op::Jne(t) | Op::Jg(t) | Op::Jge(t) | Op::Jl(t)
            | Op::Jle(t) => Some(t),
            _ => None,
        }
    }
}
