//! Per-prototype compilation state: a downward-growing register allocator,
//! a constant pool deduplicated by strict equality, and forward/backward
//! jump patching.
//!
//! Grounded in `examples/scostello-monty/crates/monty/src/bytecode/builder.rs`'s
//! shape (an instruction buffer plus helper methods the compiler calls
//! instead of pushing raw `Instruction`s by hand), adapted from monty's
//! stack-machine builder to this register machine's allocate/free
//! discipline.

use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::prototype::Prototype;
use crate::heap::{Heap, HeapObject};
use crate::value::Value;

/// A single register-file "stack": registers are allocated by bumping
/// `top` and freed by resetting it back down, so temporaries never leak
/// past the expression that created them. `max_size` records the high
/// watermark used as the prototype's frame size.
#[derive(Default)]
pub struct RegisterAllocator {
    top: u32,
    max_size: u32,
}

impl RegisterAllocator {
    #[must_use]
    pub fn mark(&self) -> u32 {
        self.top
    }

    pub fn alloc(&mut self) -> u32 {
        let r = self.top;
        self.top += 1;
        self.max_size = self.max_size.max(self.top);
        r
    }

    pub fn alloc_range(&mut self, count: u32) -> u32 {
        let base = self.top;
        self.top += count;
        self.max_size = self.max_size.max(self.top);
        base
    }

    /// Resets the allocator back to a previous [`RegisterAllocator::mark`],
    /// freeing every register allocated since. `max_size` is never lowered:
    /// it tracks the prototype's required frame size, not the current
    /// depth.
    pub fn free_to(&mut self, mark: u32) {
        self.top = mark;
    }

    #[must_use]
    pub fn high_watermark(&self) -> u32 {
        self.max_size
    }
}

/// A candidate value for the constant pool, compared by strict equality
/// (bitwise for floats, no int/float coercion) rather than `Value`'s own
/// runtime equality rules. Only literal, immutable kinds are ever pooled —
/// arrays/tables/functions are always constructed fresh at runtime by
/// `NEWARRAY`/`NEWTABLE`/`NEWFUNC`.
#[derive(Clone, PartialEq)]
enum ConstValue {
    Int(i64),
    Float(u64),
    Str(String),
    Null,
}

impl Eq for ConstValue {}

pub struct FunctionBuilder {
    pub code: Vec<Instruction>,
    pub lines: Vec<u32>,
    pub registers: RegisterAllocator,
    constants: Vec<ConstValue>,
    pub nested: Vec<std::rc::Rc<Prototype>>,
}

impl Default for FunctionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            registers: RegisterAllocator::default(),
            constants: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn emit(&mut self, op: Opcode, a: i32, b: i32, c: i32, line: u32) -> usize {
        self.code.push(Instruction::new(op, a, b, c));
        self.lines.push(line);
        self.code.len() - 1
    }

    /// Returns the index of a placeholder jump instruction to be filled in
    /// later by [`FunctionBuilder::patch_jump`].
    pub fn emit_jump(&mut self, op: Opcode, a: i32, line: u32) -> usize {
        self.emit(op, a, 0, 0, line)
    }

    /// Backpatches a forward jump emitted by [`FunctionBuilder::emit_jump`]
    /// so it lands just after the instruction stream's current end.
    pub fn patch_jump(&mut self, index: usize) {
        let delta = (self.code.len() - index - 1) as i32;
        match self.code[index].op {
            Opcode::Jump => self.code[index].a = delta,
            Opcode::Branch | Opcode::BranchNot => self.code[index].b = delta,
            other => panic!("patch_jump called on non-jump opcode {other}"),
        }
    }

    /// Emits a jump back to an already-known instruction index, e.g. a
    /// loop's condition check.
    pub fn emit_jump_to(&mut self, op: Opcode, a: i32, target: usize, line: u32) -> usize {
        let index = self.code.len();
        let delta = target as i32 - index as i32 - 1;
        match op {
            Opcode::Jump => self.emit(op, delta, 0, 0, line),
            Opcode::Branch | Opcode::BranchNot => self.emit(op, a, delta, 0, line),
            other => panic!("emit_jump_to called on non-jump opcode {other}"),
        }
    }

    /// Backpatches a jump emitted by [`FunctionBuilder::emit_jump`] to a
    /// specific, already-known instruction index rather than the current
    /// end of the stream — used for `continue` in `do...while`/`for` loops,
    /// whose target (the condition check or step expression) is only known
    /// once the loop body has finished compiling.
    pub fn patch_jump_to_index(&mut self, index: usize, target: usize) {
        let delta = target as i32 - index as i32 - 1;
        match self.code[index].op {
            Opcode::Jump => self.code[index].a = delta,
            Opcode::Branch | Opcode::BranchNot => self.code[index].b = delta,
            other => panic!("patch_jump_to_index called on non-jump opcode {other}"),
        }
    }

    #[must_use]
    pub fn next_index(&self) -> usize {
        self.code.len()
    }

    pub fn const_int(&mut self, value: i64) -> u32 {
        self.pool_const(ConstValue::Int(value))
    }

    pub fn const_float(&mut self, value: f64) -> u32 {
        self.pool_const(ConstValue::Float(value.to_bits()))
    }

    pub fn const_null(&mut self) -> u32 {
        self.pool_const(ConstValue::Null)
    }

    pub fn const_str(&mut self, value: &str) -> u32 {
        self.pool_const(ConstValue::Str(value.to_owned()))
    }

    fn pool_const(&mut self, value: ConstValue) -> u32 {
        if let Some(i) = self.constants.iter().position(|c| *c == value) {
            return i as u32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Materializes the pooled constants into runtime [`Value`]s, heap
    /// allocating exactly one string object per distinct string literal.
    /// Called once, when the prototype is finished compiling — not per
    /// call, since the pool is shared by every closure over this
    /// prototype.
    #[must_use]
    pub fn into_constants(self, heap: &mut Heap) -> Vec<Value> {
        self.constants
            .into_iter()
            .map(|c| match c {
                ConstValue::Int(i) => Value::Int(i),
                ConstValue::Float(bits) => Value::Float(f64::from_bits(bits)),
                ConstValue::Null => Value::Null,
                ConstValue::Str(s) => {
                    let r = heap.alloc(HeapObject::Str(s));
                    heap.add_ref(r);
                    Value::String(r)
                }
            })
            .collect()
    }
}
