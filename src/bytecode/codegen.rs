use crate::bytecode::builder::{Label, ProgramBuilder};
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{Op, Temp};
use crate::bytecode::program::Program;

/// Name under which an object's construction program is registered.
pub const CONSTRUCTOR: &str = "__constructor";

/// Emits the instruction sequences every front end has to produce.
///
/// Two conventions are fixed here:
///
/// - Object programs follow the header/footer protocol: the header jumps to
///   a footer that allocates the object's local cells, and the footer jumps
///   back to the body.
/// - Every literal is a single move into `t0`, so the value of the most
///   recent expression always lives in `t0`.
pub struct CodeGen {
    builder: ProgramBuilder,
}

impl CodeGen {
    pub fn new(arity: u32) -> Self {
        Self {
            builder: ProgramBuilder::new(arity),
        }
    }

    /// Raw access for instructions without a dedicated emitter.
    pub fn builder(&mut self) -> &mut ProgramBuilder {
        &mut self.builder
    }

    pub fn finish(self) -> Result<Program, CompileError> {
        self.builder.finish()
    }

    /// Build a complete object program: header, `body`, footer.
    ///
    /// `local_count` is the number of heap cells the object needs, as
    /// reported by the symbol table.
    pub fn compile_object<F>(local_count: usize, body: F) -> Result<Program, CompileError>
    where
        F: FnOnce(&mut CodeGen) -> Result<(), CompileError>,
    {
        let mut cg = CodeGen::new(0);
        let start = cg.builder.new_label();
        let end = cg.builder.new_label();

        cg.emit_object_header(start, end)?;
        body(&mut cg)?;
        cg.emit_object_footer(start, end, local_count)?;

        cg.finish()
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// ```text
    ///   0:      jmp end
    ///   start:  <body>
    /// ```
    pub fn emit_object_header(&mut self, start: Label, end: Label) -> Result<(), CompileError> {
        self.builder.add_jump(Op::Jmp, end)?;
        self.builder.add_label(start)
    }

    /// Close the body and emit the allocation prologue.
    ///
    /// ```text
    ///           ret
    ///   end:    movf t2, N
    ///           je   start          ; N == 0: allocate nothing
    ///   aloc:   aloc t0
    ///           dec  t2
    ///           jne  aloc
    ///           jmp  start
    /// ```
    pub fn emit_object_footer(
        &mut self,
        start: Label,
        end: Label,
        local_count: usize,
    ) -> Result<(), CompileError> {
        let aloc = self.builder.new_label();

        self.builder.add_line(Op::Ret);
        self.builder.add_label(end)?;
        self.builder.add_line(Op::Movf(Temp::T2, local_count as f32));
        self.builder.add_jump(Op::Je, start)?;
        self.builder.add_label(aloc)?;
        self.builder.add_line(Op::Aloc(Temp::T0));
        self.builder.add_line(Op::Dec(Temp::T2));
        self.builder.add_jump(Op::Jne, aloc)?;
        self.builder.add_jump(Op::Jmp, start)?;
        Ok(())
    }

    // =========================================================================
    // Constants
    // =========================================================================

    pub fn emit_null(&mut self) {
        self.builder.add_line(Op::Movn(Temp::T0));
    }

    pub fn emit_bool(&mut self, value: bool) {
        self.builder.add_line(Op::Movb(Temp::T0, value));
    }

    pub fn emit_number(&mut self, value: f32) {
        self.builder.add_line(Op::Movf(Temp::T0, value));
    }

    pub fn emit_string(&mut self, value: &str) {
        let text = self.builder.add_text(value);
        self.builder.add_line(Op::Movs(Temp::T0, text));
    }

    /// Return the value in `t0` to the caller.
    pub fn emit_return(&mut self) {
        self.builder.add_line(Op::Movt(Temp::T3, Temp::T0));
        self.builder.add_line(Op::Ret);
    }
}
