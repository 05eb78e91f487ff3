use crate::bytecode::codegen::CONSTRUCTOR;
use crate::bytecode::{CellIndex, LineIndex, Op, Program, TEMP_COUNT, Temp};
use crate::lang::{ObjectHandle, Value, ValueKind};
use crate::runtime::object::{Heap, ObjectGraph};
use crate::runtime::pool::ProgramPool;
use crate::runtime::runtime_error::{ErrorKind, Result, RuntimeError};
use std::io::{self, BufRead, Write};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
    /// Per object.
    pub max_heap_cells: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 10_000,
            max_heap_cells: 65_536,
        }
    }
}

/// One activation: the program, where it is, its registers and its owner.
struct Frame<'p> {
    program: &'p Program,
    pc: usize,
    owner: ObjectHandle,
    /// Stack length when the frame was entered; `speek`/`spoke` are relative to it.
    base: usize,
    temps: [Value; TEMP_COUNT],
    /// `Owner.program`, reported in the call stack of an error.
    context: String,
}

impl<'p> Frame<'p> {
    fn new(program: &'p Program, owner: ObjectHandle, base: usize, context: String) -> Self {
        Self {
            program,
            pc: 0,
            owner,
            base,
            temps: Default::default(),
            context,
        }
    }

    fn temp(&self, t: Temp) -> Result<&Value> {
        self.temps
            .get(t.index())
            .ok_or_else(|| ErrorKind::TempOutOfRange(t.0).into())
    }

    fn temp_mut(&mut self, t: Temp) -> Result<&mut Value> {
        self.temps
            .get_mut(t.index())
            .ok_or_else(|| ErrorKind::TempOutOfRange(t.0).into())
    }

    fn flags(&self) -> f32 {
        self.temps[Temp::T2.index()].as_number()
    }

    fn set_flags(&mut self, n: f32) {
        self.temps[Temp::T2.index()].set_number(n);
    }

    fn jump_if(&mut self, taken: bool, target: LineIndex) {
        if taken {
            self.pc = target as usize;
        }
    }

    fn number_op(&mut self, a: Temp, b: Temp, f: impl Fn(f32, f32) -> f32) -> Result<()> {
        let rhs = self.temp(b)?.as_number();
        let lhs = self.temp_mut(a)?;
        let n = f(lhs.as_number(), rhs);
        lhs.set_number(n);
        Ok(())
    }

    fn int_op(&mut self, a: Temp, b: Temp, f: impl Fn(i32, i32) -> i32) -> Result<()> {
        let rhs = to_int(self.temp(b)?);
        let lhs = self.temp_mut(a)?;
        let n = f(to_int(lhs), rhs);
        lhs.set_number(n as f32);
        Ok(())
    }

    fn type_check(&mut self, a: Temp, kind: ValueKind) -> Result<()> {
        let matches = self.temp(a)?.kind() == kind;
        self.set_flags(if matches { 1.0 } else { 0.0 });
        Ok(())
    }
}

/// What the current frame asks the dispatch loop to do after one instruction.
enum Flow<'p> {
    Continue,
    Call(Frame<'p>),
    Return(Value),
}

/// Bitwise operators work on the 32-bit integer part of a number.
fn to_int(v: &Value) -> i32 {
    v.as_number() as i32
}

fn io_error(e: io::Error) -> RuntimeError {
    ErrorKind::Io(e.to_string()).into()
}

/// Executes programs from a [`ProgramPool`] against the objects of a host
/// object graph.
///
/// One `Vm` is one thread of control: a single operand stack shared by all
/// nested calls, and a fresh set of temporaries per call. Heap cells belong
/// to the object a program runs on. Script calls are kept on an explicit
/// frame stack, so call depth is bounded by `max_call_depth` alone.
pub struct Vm<'p, G: ObjectGraph> {
    pool: &'p ProgramPool,
    objects: G,
    stack: Vec<Value>,
    config: VmConfig,
    steps: usize,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
}

impl<'p, G: ObjectGraph> Vm<'p, G> {
    pub fn new(pool: &'p ProgramPool, objects: G) -> Self {
        Self::with_config(pool, objects, VmConfig::default())
    }

    pub fn with_config(pool: &'p ProgramPool, objects: G, config: VmConfig) -> Self {
        Self {
            pool,
            objects,
            stack: Vec::new(),
            config,
            steps: 0,
            output: Box::new(io::stdout()),
            input: Box::new(io::BufReader::new(io::stdin())),
        }
    }

    /// Where `out` writes.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// Where `in` reads from.
    pub fn set_input(&mut self, input: Box<dyn BufRead>) {
        self.input = input;
    }

    pub fn objects(&self) -> &G {
        &self.objects
    }

    /// The host may spawn or despawn objects between calls.
    pub fn objects_mut(&mut self) -> &mut G {
        &mut self.objects
    }

    pub fn into_objects(self) -> G {
        self.objects
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Instructions executed since the last reset.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Clear the step counter and the operand stack, e.g. after a fault or
    /// at the start of a host tick with a per-tick step budget.
    pub fn reset_execution_state(&mut self) {
        self.steps = 0;
        self.stack.clear();
    }

    /// Run the construction program of `handle`'s type, allocating its cells.
    ///
    /// Only a constructor registered for the exact type is used; a type
    /// without one gets no cells.
    pub fn construct(&mut self, handle: ObjectHandle) -> Result<()> {
        let type_name = self.type_name_of(handle)?;

        if !self.pool.exists(&type_name, CONSTRUCTOR) {
            debug!(object = %type_name, handle, "no constructor, nothing to allocate");
            return Ok(());
        }

        let pool = self.pool;
        let program = pool.get(&type_name, CONSTRUCTOR)?;
        let base = self.stack.len();
        let context = format!("{}.{}", type_name, CONSTRUCTOR);
        self.exec(Frame::new(program, handle, base, context))?;

        debug!(
            object = %type_name,
            handle,
            cells = self.objects.heap(handle).map_or(0, Heap::len),
            "object constructed"
        );
        Ok(())
    }

    /// Call method `name` of `handle` from the host, as the `call`
    /// instruction would, and return its result.
    pub fn call(&mut self, handle: ObjectHandle, name: &str, args: &[Value]) -> Result<Value> {
        let mark = self.stack.len();

        let result = self.push(Value::Object(handle)).and_then(|_| {
            for arg in args {
                self.push(arg.clone())?;
            }
            let frame = self.prepare_call(name, args.len())?;
            self.exec(frame)
        });

        self.stack.truncate(mark);
        result
    }

    /// Run `program` directly with `owner` as its object.
    pub fn run(&mut self, program: &'p Program, owner: ObjectHandle) -> Result<Value> {
        let base = self.stack.len();
        self.exec(Frame::new(program, owner, base, "<host>".to_string()))
    }

    // Execution

    fn type_name_of(&self, handle: ObjectHandle) -> Result<String> {
        self.objects
            .type_name(handle)
            .map(str::to_string)
            .ok_or_else(|| ErrorKind::UnknownObject(handle).into())
    }

    /// Resolve `name` on the object sitting below the top `argc` stack
    /// values and build the callee's frame.
    fn prepare_call(&self, name: &str, argc: usize) -> Result<Frame<'p>> {
        let base = self.stack.len();
        if base < argc + 1 {
            return Err(ErrorKind::StackUnderflow.into());
        }

        let handle = self.stack[base - argc - 1].as_handle();
        let type_name = self.type_name_of(handle)?;

        let pool = self.pool;
        let (resolved, program) = pool.resolve(&type_name, name)?;
        trace!(object = %type_name, method = name, resolved, argc, "dispatch");

        let context = format!("{}.{}", type_name, name);
        Ok(Frame::new(program, handle, base, context))
    }

    fn check_limits(&mut self) -> Result<()> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(ErrorKind::StepLimitExceeded(max).into());
            }
        }

        Ok(())
    }

    fn enter(&self, frames: &mut Vec<Frame<'p>>, frame: Frame<'p>) -> Result<()> {
        if frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::new(ErrorKind::CallDepthExceeded(
                self.config.max_call_depth,
            ))
            .with_context(&frame.context));
        }
        frames.push(frame);
        Ok(())
    }

    /// Run `entry` and everything it calls to completion.
    ///
    /// On error the call stack holds every frame still active, innermost
    /// first.
    fn exec(&mut self, entry: Frame<'p>) -> Result<Value> {
        let mut frames = Vec::new();
        self.enter(&mut frames, entry)?;

        self.run_frames(&mut frames).map_err(|e| {
            frames
                .iter()
                .rev()
                .fold(e, |e, frame| e.with_context(&frame.context))
        })
    }

    fn run_frames(&mut self, frames: &mut Vec<Frame<'p>>) -> Result<Value> {
        while let Some(frame) = frames.last_mut() {
            match self.step(frame)? {
                Flow::Continue => {}
                Flow::Call(callee) => self.enter(frames, callee)?,
                Flow::Return(value) => {
                    frames.pop();
                    match frames.last_mut() {
                        Some(caller) => caller.temps[Temp::T0.index()] = value,
                        None => return Ok(value),
                    }
                }
            }
        }

        // only reachable with no entry frame
        Ok(Value::Null)
    }

    /// Execute the instruction at `frame.pc`.
    fn step(&mut self, frame: &mut Frame<'p>) -> Result<Flow<'p>> {
        self.check_limits()?;

        let program = frame.program;
        let op = program
            .lines()
            .get(frame.pc)
            .ok_or(ErrorKind::LineOutOfRange(frame.pc as LineIndex))?;
        frame.pc += 1;

        match op {
            Op::Nop => {}

            // I/O
            Op::Out(a) => {
                let text = frame.temp(*a)?.as_text();
                writeln!(self.output, "{}", text).map_err(io_error)?;
            }
            Op::In(a) => {
                let mut line = String::new();
                self.input.read_line(&mut line).map_err(io_error)?;
                let line = line.trim_end_matches(['\n', '\r']);
                frame.temp_mut(*a)?.set_text(line);
            }

            // Data movement
            Op::Movn(a) => frame.temp_mut(*a)?.set_null(),
            Op::Movb(a, b) => frame.temp_mut(*a)?.set_bool(*b),
            Op::Movf(a, n) => frame.temp_mut(*a)?.set_number(*n),
            Op::Movs(a, id) => {
                let text = program.text(*id).ok_or(ErrorKind::TextOutOfRange(*id))?;
                frame.temp_mut(*a)?.set_text(text);
            }
            Op::Movo(a, h) => frame.temp_mut(*a)?.set_handle(*h),
            Op::Movc(a) => {
                let owner = frame.owner;
                frame.temp_mut(*a)?.set_handle(owner);
            }
            Op::Movt(a, b) => {
                let value = frame.temp(*b)?.clone();
                value.copy_into(frame.temp_mut(*a)?);
            }
            Op::Xchg(a, b) => {
                frame.temp(*a)?;
                frame.temp(*b)?;
                frame.temps.swap(a.index(), b.index());
            }

            // Memory
            Op::Aloc(a) => {
                let limit = self.config.max_heap_cells;
                let heap = self.heap_mut(frame.owner)?;
                if heap.len() >= limit {
                    return Err(ErrorKind::HeapLimitExceeded(limit).into());
                }
                let address = heap.alloc();
                frame.temp_mut(*a)?.set_number(address as f32);
            }
            Op::Load(a, b) => {
                let address = self.cell_address(frame.owner, frame.temp(*b)?.as_number())?;
                let value = self.cell(frame.owner, address)?.clone();
                *frame.temp_mut(*a)? = value;
            }
            Op::Store(a, b) => {
                let address = self.cell_address(frame.owner, frame.temp(*b)?.as_number())?;
                let value = frame.temp(*a)?.clone();
                *self.cell_mut(frame.owner, address)? = value;
            }
            Op::Peek(a, address) => {
                let value = self.cell(frame.owner, *address)?.clone();
                *frame.temp_mut(*a)? = value;
            }
            Op::Poke(a, address) => {
                let value = frame.temp(*a)?.clone();
                *self.cell_mut(frame.owner, *address)? = value;
            }

            // Stack
            Op::Push(a) => {
                let value = frame.temp(*a)?.clone();
                self.push(value)?;
            }
            Op::Pop(a) => {
                let value = self.pop(frame.base)?;
                *frame.temp_mut(*a)? = value;
            }
            Op::Speek(a, offset) => {
                let index = self.stack_index(frame.base, *offset)?;
                let value = self.stack[index].clone();
                *frame.temp_mut(*a)? = value;
            }
            Op::Spoke(a, offset) => {
                let index = self.stack_index(frame.base, *offset)?;
                let value = frame.temp(*a)?.clone();
                self.stack[index] = value;
            }

            // Arithmetic
            Op::Inc(a) => {
                let t = frame.temp_mut(*a)?;
                let n = t.as_number() + 1.0;
                t.set_number(n);
            }
            Op::Dec(a) => {
                let t = frame.temp_mut(*a)?;
                let n = t.as_number() - 1.0;
                t.set_number(n);
            }
            Op::Add(a, b) => frame.number_op(*a, *b, |x, y| x + y)?,
            Op::Sub(a, b) => frame.number_op(*a, *b, |x, y| x - y)?,
            Op::Mul(a, b) => frame.number_op(*a, *b, |x, y| x * y)?,
            // IEEE semantics: x/0 is an infinity or NaN, never a fault
            Op::Div(a, b) => frame.number_op(*a, *b, |x, y| x / y)?,
            Op::Neg(a, b) => {
                let n = -frame.temp(*b)?.as_number();
                frame.temp_mut(*a)?.set_number(n);
            }

            // Logic
            Op::Lnot(a, b) => {
                let v = !frame.temp(*b)?.as_bool();
                frame.temp_mut(*a)?.set_bool(v);
            }
            Op::Not(a, b) => {
                let n = !to_int(frame.temp(*b)?);
                frame.temp_mut(*a)?.set_number(n as f32);
            }
            Op::And(a, b) => frame.int_op(*a, *b, |x, y| x & y)?,
            Op::Or(a, b) => frame.int_op(*a, *b, |x, y| x | y)?,
            Op::Xor(a, b) => frame.int_op(*a, *b, |x, y| x ^ y)?,
            Op::Cat(a, b) => {
                let rhs = frame.temp(*b)?.as_text();
                let t = frame.temp_mut(*a)?;
                let mut text = t.as_text();
                text.push_str(&rhs);
                *t = Value::Text(text);
            }

            // Coercion
            Op::Bool(a) => {
                let t = frame.temp_mut(*a)?;
                let b = t.as_bool();
                t.set_bool(b);
            }
            Op::Val(a) => {
                let t = frame.temp_mut(*a)?;
                let n = t.as_number();
                t.set_number(n);
            }
            Op::Str(a) => {
                let t = frame.temp_mut(*a)?;
                let s = t.as_text();
                *t = Value::Text(s);
            }

            // Comparison
            Op::Test(a, b) => {
                let n = to_int(frame.temp(*a)?) & to_int(frame.temp(*b)?);
                frame.set_flags(n as f32);
            }
            Op::Tchk(a, b) => {
                let kind = frame.temp(*b)?.kind();
                frame.type_check(*a, kind)?;
            }
            Op::Tchk0(a) => frame.type_check(*a, ValueKind::Null)?,
            Op::Tchkb(a) => frame.type_check(*a, ValueKind::Bool)?,
            Op::Tchkn(a) => frame.type_check(*a, ValueKind::Number)?,
            Op::Tchks(a) => frame.type_check(*a, ValueKind::Text)?,
            Op::Tchko(a) => frame.type_check(*a, ValueKind::Object)?,
            Op::Cmp(a, b) => {
                let ordering = frame.temp(*a)?.compare(frame.temp(*b)?);
                frame.set_flags(ordering as i32 as f32);
            }

            // Control flow
            Op::Jmp(t) => frame.jump_if(true, *t),
            Op::Je(t) => frame.jump_if(frame.flags() == 0.0, *t),
            Op::Jne(t) => frame.jump_if(frame.flags() != 0.0, *t),
            Op::Jg(t) => frame.jump_if(frame.flags() > 0.0, *t),
            Op::Jge(t) => frame.jump_if(frame.flags() >= 0.0, *t),
            Op::Jl(t) => frame.jump_if(frame.flags() < 0.0, *t),
            Op::Jle(t) => frame.jump_if(frame.flags() <= 0.0, *t),

            // Calls
            Op::Call(id, argc) => {
                let name = program.text(*id).ok_or(ErrorKind::TextOutOfRange(*id))?;
                return Ok(Flow::Call(self.prepare_call(name, *argc as usize)?));
            }
            Op::Ret => {
                return Ok(Flow::Return(std::mem::take(&mut frame.temps[Temp::T3.index()])));
            }
        }

        Ok(Flow::Continue)
    }

    // Heap

    fn heap(&self, owner: ObjectHandle) -> Result<&Heap> {
        self.objects
            .heap(owner)
            .ok_or_else(|| ErrorKind::UnknownObject(owner).into())
    }

    fn heap_mut(&mut self, owner: ObjectHandle) -> Result<&mut Heap> {
        self.objects
            .heap_mut(owner)
            .ok_or_else(|| ErrorKind::UnknownObject(owner).into())
    }

    /// Turn a number held in a temporary into a cell address of `owner`.
    fn cell_address(&self, owner: ObjectHandle, address: f32) -> Result<CellIndex> {
        let len = self.heap(owner)?.len();
        let valid = address.is_finite()
            && address >= 0.0
            && address.fract() == 0.0
            && (address as usize) < len;

        if valid {
            Ok(address as CellIndex)
        } else {
            Err(ErrorKind::CellOutOfRange { address, len }.into())
        }
    }

    fn cell(&self, owner: ObjectHandle, address: CellIndex) -> Result<&Value> {
        let heap = self.heap(owner)?;
        heap.get(address).ok_or_else(|| {
            ErrorKind::CellOutOfRange {
                address: address as f32,
                len: heap.len(),
            }
            .into()
        })
    }

    fn cell_mut(&mut self, owner: ObjectHandle, address: CellIndex) -> Result<&mut Value> {
        let heap = self.heap_mut(owner)?;
        let len = heap.len();
        heap.get_mut(address).ok_or_else(|| {
            ErrorKind::CellOutOfRange {
                address: address as f32,
                len,
            }
            .into()
        })
    }

    // Stack operations

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(ErrorKind::StackOverflow(self.config.max_stack_size).into());
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value pushed by the current frame.
    fn pop(&mut self, base: usize) -> Result<Value> {
        if self.stack.len() <= base {
            return Err(ErrorKind::StackUnderflow.into());
        }
        self.stack.pop().ok_or_else(|| ErrorKind::StackUnderflow.into())
    }

    fn stack_index(&self, base: usize, offset: i32) -> Result<usize> {
        let index = base as i64 + offset as i64;
        if index < 0 || index >= self.stack.len() as i64 {
            return Err(ErrorKind::StackOutOfRange {
                index,
                len: self.stack.len(),
            }
            .into());
        }
        Ok(index as usize)
    }
}
