//! A compiled function: its instruction stream, constant pool, and nested
//! function prototypes, produced by [`crate::bytecode::compiler::compile`].

use std::rc::Rc;

use crate::ast::UpvalueRef;
use crate::bytecode::op::Instruction;
use crate::value::Value;

pub struct Prototype {
    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
    pub num_params: u32,
    pub num_registers: u32,
    pub upvalues: Vec<UpvalueRef>,
    pub nested: Vec<Rc<Prototype>>,
    /// Source line per instruction, parallel to `code`, used for runtime
    /// error reporting.
    pub lines: Vec<u32>,
    /// Lexical nesting depth this prototype was defined at (0 = top
    /// level). Used at `NEWFUNC` time to tell whether a captured
    /// upvalue's defining frame is the *currently running* closure
    /// (pull straight from its locals) or a further-out ancestor (pull
    /// from the running closure's own upvalues, which must already carry
    /// it by the same chaining the analyzer performed at compile time —
    /// see `analyzer.rs`'s `resolve`).
    pub function_level: u32,
}
