//! The stack-machine execution engine: interprets a [`Prototype`]'s
//! instructions over a per-call register window, managing closures, calls,
//! and returns.
//!
//! Grounded in `examples/original_source/cmm-lang/Context.cpp`'s
//! `executeFunction`/`functionCall_`/`functionReturn_` triad — a `match`
//! over the opcode enum inside one big loop, operating on a vector of
//! `CallInfo` frames — adapted to safe Rust by giving each frame its own
//! register file as a plain `Vec<Value>` rather than indexing into a
//! shared stack through raw pointers, and by using [`crate::heap::Heap`]'s
//! `add_ref`/`release` pair everywhere a `Value` changes hands instead of
//! a hand-rolled smart pointer.

use std::rc::Rc;

use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::prototype::Prototype;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::heap::{Closure, HeapObject, HeapRef, Table};
use crate::value::Value;

/// Where a frame's `RETURN` should deposit its results.
enum ReturnTarget {
    /// Into the caller frame's registers starting at `base`.
    Frame { base: usize },
    /// Into the host-visible communication buffer — the outermost call
    /// made by [`crate::context::Context::run`].
    Buffer,
}

struct CallInfo {
    closure: HeapRef,
    prototype: Rc<Prototype>,
    registers: Vec<Value>,
    pc: usize,
    num_rets: u32,
    return_to: ReturnTarget,
}

/// Runs `closure` (a `Value::Func` heap object) with `args` as its initial
/// register contents, depositing up to `want_rets` results into the host
/// buffer. This is the only entry point [`Context::run`] uses; nested
/// script-to-script calls never re-enter this function — they push a new
/// [`CallInfo`] onto the same stack and let the loop continue, per
/// spec.md §5's reentrancy contract (a native function may only call back
/// into the script by handing a `Func` value to the currently executing
/// frame's own `CALL`, never by invoking `run` again).
pub(crate) fn execute(
    ctx: &mut Context,
    closure: HeapRef,
    args: Vec<Value>,
    want_rets: u32,
) -> Result<(), RuntimeError> {
    let prototype = Rc::clone(&ctx.heap.get_closure(closure).prototype);
    let registers = prepare_registers(&mut ctx.heap, args, &prototype);
    let stack = vec![CallInfo {
        closure,
        prototype,
        registers,
        pc: 0,
        num_rets: want_rets,
        return_to: ReturnTarget::Buffer,
    }];
    let mut m = Machine { ctx, stack };

    loop {
        let frame_index = m.stack.len() - 1;
        let frame = &m.stack[frame_index];
        let next = frame.prototype.code.get(frame.pc).copied();
        let Some(instr) = next else {
            // The compiler always appends a trailing `RETURN 0 0`
            // (spec.md §4.4.5), so code genuinely runs off the end only
            // for a hand-built prototype with no instructions at all;
            // treat it exactly like `RETURN 0 0`.
            if m.do_return(Vec::new())? {
                return Ok(());
            }
            continue;
        };
        if m.step(frame_index, instr)? {
            return Ok(());
        }
    }
}

/// Copies up to `num_params` argument values into a fresh, `Null`-padded
/// register file sized to the prototype's frame, taking a fresh owning
/// reference for each one (the caller's own copy, e.g. a buffer slot or a
/// source register, keeps its separate reference).
fn prepare_registers(heap: &mut crate::heap::Heap, args: Vec<Value>, prototype: &Prototype) -> Vec<Value> {
    let mut registers = vec![Value::Null; prototype.num_registers.max(prototype.num_params) as usize];
    for (i, v) in args.into_iter().take(prototype.num_params as usize).enumerate() {
        heap.add_ref_value(&v);
        registers[i] = v;
    }
    registers
}

struct Machine<'a> {
    ctx: &'a mut Context,
    stack: Vec<CallInfo>,
}

impl Machine<'_> {
    fn frame(&self) -> &CallInfo {
        self.stack.last().expect("execute never runs with an empty stack")
    }

    fn reg(&self, i: i32) -> Value {
        self.frame().registers[i as usize].clone()
    }

    /// Overwrites register `i` with `value`, which must already represent
    /// an owning reference (the caller has already `add_ref`'d it, or it
    /// came from an allocation starting its life at this store). The
    /// previously held value is released.
    fn set_reg(&mut self, i: i32, value: Value) {
        let frame = self.stack.last_mut().expect("non-empty stack");
        let old = std::mem::replace(&mut frame.registers[i as usize], value);
        self.ctx.heap.release_value(&old);
    }

    /// Copies the value in `src` into `dst`, taking a fresh owning
    /// reference (used for `ASSIGN` and anywhere else one register's
    /// current value becomes another's).
    fn copy_reg(&mut self, dst: i32, src: i32) {
        let v = self.reg(src);
        self.ctx.heap.add_ref_value(&v);
        self.set_reg(dst, v);
    }

    fn constant(&self, i: i32) -> Value {
        self.frame().prototype.constants[i as usize].clone()
    }

    fn global_name(&self, const_index: i32) -> HeapRef {
        match self.constant(const_index) {
            Value::String(r) => r,
            other => unreachable!("GETGLOBAL/SETGLOBAL const operand must be a string, found {other:?}"),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, frame_index: usize, instr: Instruction) -> Result<bool, RuntimeError> {
        let Instruction { op, a, b, c } = instr;
        let mut delta = 1;

        match op {
            Opcode::Assign => {
                if a != b {
                    self.copy_reg(a, b);
                }
            }
            Opcode::GetConst => {
                let v = self.constant(b);
                self.ctx.heap.add_ref_value(&v);
                self.set_reg(a, v);
            }
            Opcode::GetGlobal => {
                let name = self.global_name(b);
                let name = self.ctx.heap.get_str(name).to_owned();
                let v = self.ctx.heap.get_table(self.ctx.globals).get_by_name(&name);
                self.ctx.heap.add_ref_value(&v);
                self.set_reg(a, v);
            }
            Opcode::GetUpval => {
                let v = self.ctx.heap.get_closure(self.frame().closure).upvalues[b as usize].clone();
                self.ctx.heap.add_ref_value(&v);
                self.set_reg(a, v);
            }
            Opcode::GetTable => {
                let container = self.reg(b);
                let key = self.reg(c);
                let v = self.index_get(&container, &key)?;
                self.ctx.heap.add_ref_value(&v);
                self.set_reg(a, v);
            }
            Opcode::SetGlobal => {
                let name = self.global_name(a);
                let name = self.ctx.heap.get_str(name).to_owned();
                let value = self.reg(b);
                self.global_set(&name, value);
            }
            Opcode::SetUpval => {
                let value = self.reg(b);
                self.ctx.heap.add_ref_value(&value);
                let closure_ref = self.frame().closure;
                let old = {
                    let slot = &mut self.ctx.heap.get_closure_mut(closure_ref).upvalues[a as usize];
                    std::mem::replace(slot, value)
                };
                self.ctx.heap.release_value(&old);
            }
            Opcode::SetTable => {
                let container = self.reg(a);
                let key = self.reg(b);
                let value = self.reg(c);
                self.index_set(&container, key, value)?;
            }
            Opcode::NewTable => {
                let r = self.ctx.heap.alloc(HeapObject::Table(Table::new()));
                self.ctx.heap.add_ref(r);
                self.set_reg(a, Value::Table(r));
            }
            Opcode::NewArray => {
                let r = self.ctx.heap.alloc(HeapObject::Array(Vec::new()));
                self.ctx.heap.add_ref(r);
                self.set_reg(a, Value::Array(r));
            }
            Opcode::NewFunc => {
                let nested = Rc::clone(&self.frame().prototype.nested[b as usize]);
                let upvalues = self.capture_upvalues(frame_index, &nested);
                let r = self.ctx.heap.alloc(HeapObject::Func(Closure { prototype: nested, upvalues }));
                self.ctx.heap.add_ref(r);
                self.set_reg(a, Value::Func(r));
            }
            Opcode::Add => self.binary_numeric_or_concat(a, b, c)?,
            Opcode::Sub => self.binary_numeric(a, b, c, |x, y| x - y, i64::wrapping_sub)?,
            Opcode::Mul => self.binary_numeric(a, b, c, |x, y| x * y, i64::wrapping_mul)?,
            Opcode::Div => self.binary_div(a, b, c)?,
            Opcode::Mod => self.binary_mod(a, b, c)?,
            Opcode::Unm => self.unary_numeric(a, b, |x| -x, i64::wrapping_neg)?,
            Opcode::BitNot => self.unary_int(a, b, |x| !x)?,
            Opcode::BitAnd => self.binary_int(a, b, c, |x, y| x & y)?,
            Opcode::BitOr => self.binary_int(a, b, c, |x, y| x | y)?,
            Opcode::BitXor => self.binary_int(a, b, c, |x, y| x ^ y)?,
            Opcode::Sl => self.binary_int(a, b, c, |x, y| x.wrapping_shl(y as u32))?,
            Opcode::Sr => self.binary_int(a, b, c, |x, y| x.wrapping_shr(y as u32))?,
            Opcode::Not => {
                let v = self.reg(b);
                self.set_reg(a, Value::Int(i64::from(!v.is_truthy())));
            }
            Opcode::Eq => {
                let (x, y) = (self.reg(b), self.reg(c));
                let r = values_equal(&self.ctx.heap, &x, &y);
                self.set_reg(a, Value::Int(i64::from(r)));
            }
            Opcode::NotEq => {
                let (x, y) = (self.reg(b), self.reg(c));
                let r = values_equal(&self.ctx.heap, &x, &y);
                self.set_reg(a, Value::Int(i64::from(!r)));
            }
            Opcode::Lt => self.compare(a, b, c, |x, y| x < y)?,
            Opcode::Le => self.compare(a, b, c, |x, y| x <= y)?,
            Opcode::Jump => delta = a,
            Opcode::Branch => {
                if self.reg(a).is_truthy() {
                    delta = b;
                }
            }
            Opcode::BranchNot => {
                if !self.reg(a).is_truthy() {
                    delta = b;
                }
            }
            Opcode::Call => {
                let pushed_frame = self.do_call(a, b, c)?;
                if pushed_frame {
                    return Ok(false);
                }
                // A native call runs synchronously and never goes through
                // `do_return`'s pc-advance, so this frame must step past
                // its own `CALL` here instead.
                delta = 1;
            }
            Opcode::Return => {
                let count = b as usize;
                let values = (0..count).map(|i| self.reg(a + i as i32)).collect();
                return self.do_return(values);
            }
            Opcode::Yield => return Err(RuntimeError::YieldUnsupported),
        }

        let frame = self.stack.last_mut().expect("non-empty stack");
        frame.pc = (frame.pc as i64 + i64::from(delta)) as usize;
        Ok(false)
    }

    /// Builds the new closure's upvalue vector for a `NEWFUNC` at the
    /// currently executing frame. For each entry in the nested
    /// prototype's upvalue list: if its defining function is the frame
    /// that is *directly* executing this `NEWFUNC` (its `function_level`
    /// matches the running prototype's own), the value comes straight out
    /// of that frame's locals; otherwise the running closure itself must
    /// already carry it as one of its own upvalues (the analyzer threaded
    /// the capture through every intermediate frame — see
    /// `analyzer.rs::resolve`), so it is re-captured from there instead.
    fn capture_upvalues(&mut self, frame_index: usize, nested: &Prototype) -> Vec<Value> {
        let own_level = self.stack[frame_index].prototype.function_level;
        let closure_ref = self.stack[frame_index].closure;
        let mut upvalues = Vec::with_capacity(nested.upvalues.len());
        for u in &nested.upvalues {
            let v = if u.function_level == own_level {
                self.stack[frame_index].registers[u.register_offset as usize].clone()
            } else {
                self.ctx.heap.get_closure(closure_ref).upvalues[u.register_offset as usize].clone()
            };
            self.ctx.heap.add_ref_value(&v);
            upvalues.push(v);
        }
        upvalues
    }

    fn index_get(&self, container: &Value, key: &Value) -> Result<Value, RuntimeError> {
        match container {
            Value::Table(r) => Ok(self.ctx.heap.get_table(*r).get(&self.ctx.heap, key)),
            Value::Array(r) => match key {
                Value::Int(i) => {
                    let items = self.ctx.heap.get_array(*r);
                    Ok(if *i >= 0 && (*i as usize) < items.len() { items[*i as usize].clone() } else { Value::Null })
                }
                _ => Err(RuntimeError::NonIntegerArrayIndex),
            },
            _ => Err(RuntimeError::NotIndexable),
        }
    }

    fn index_set(&mut self, container: &Value, key: Value, value: Value) -> Result<(), RuntimeError> {
        match container {
            Value::Table(r) => {
                self.table_set(*r, key, value);
                Ok(())
            }
            Value::Array(r) => {
                let Value::Int(i) = key else {
                    return Err(RuntimeError::NonIntegerArrayIndex);
                };
                if i < 0 {
                    // spec.md §3: `set` with a negative index is a no-op
                    // that reports failure; the VM has no channel for a
                    // non-fatal failure signal, so it's silently ignored
                    // (no store, no error), matching the non-raising half
                    // of that contract.
                    return Ok(());
                }
                self.ctx.heap.add_ref_value(&value);
                let items = self.ctx.heap.get_array_mut(*r);
                let i = i as usize;
                if i >= items.len() {
                    items.resize(i + 1, Value::Null);
                }
                let old = std::mem::replace(&mut items[i], value);
                self.ctx.heap.release_value(&old);
                Ok(())
            }
            _ => Err(RuntimeError::NotIndexable),
        }
    }

    fn table_set(&mut self, table: HeapRef, key: Value, value: Value) {
        let old = self.ctx.heap.get_table(table).get(&self.ctx.heap, &key);
        self.ctx.heap.add_ref_value(&key);
        self.ctx.heap.add_ref_value(&value);
        let table_key = crate::heap::TableKey::from_value(&self.ctx.heap, &key);
        self.ctx.heap.get_table_mut(table).set_prehashed(table_key, key, value);
        self.ctx.heap.release_value(&old);
    }

    fn global_set(&mut self, name: &str, value: Value) {
        let old = self.ctx.heap.get_table(self.ctx.globals).get_by_name(name);
        let name_ref = self.ctx.heap.alloc(HeapObject::Str(name.to_owned()));
        let key = Value::String(name_ref);
        self.ctx.heap.add_ref_value(&key);
        self.ctx.heap.add_ref_value(&value);
        let table_key = crate::heap::TableKey::Str(name.to_owned());
        self.ctx.heap.get_table_mut(self.ctx.globals).set_prehashed(table_key, key, value);
        self.ctx.heap.release_value(&old);
    }

    fn binary_numeric_or_concat(&mut self, a: i32, b: i32, c: i32) -> Result<(), RuntimeError> {
        let (x, y) = (self.reg(b), self.reg(c));
        if let (Value::String(xr), Value::String(yr)) = (&x, &y) {
            let mut s = self.ctx.heap.get_str(*xr).to_owned();
            s.push_str(self.ctx.heap.get_str(*yr));
            let r = self.ctx.heap.alloc(HeapObject::Str(s));
            self.ctx.heap.add_ref(r);
            self.set_reg(a, Value::String(r));
            return Ok(());
        }
        self.binary_numeric(a, b, c, |p, q| p + q, i64::wrapping_add)
    }

    fn binary_numeric(
        &mut self,
        a: i32,
        b: i32,
        c: i32,
        float_op: impl Fn(f64, f64) -> f64,
        int_op: impl Fn(i64, i64) -> i64,
    ) -> Result<(), RuntimeError> {
        let (x, y) = (self.reg(b), self.reg(c));
        let result = numeric_pair(&x, &y, int_op, float_op)?;
        self.set_reg(a, result);
        Ok(())
    }

    fn unary_numeric(
        &mut self,
        a: i32,
        b: i32,
        float_op: impl Fn(f64) -> f64,
        int_op: impl Fn(i64) -> i64,
    ) -> Result<(), RuntimeError> {
        let v = self.reg(b);
        let result = match v {
            Value::Int(x) => Value::Int(int_op(x)),
            Value::Float(x) => Value::Float(float_op(x)),
            _ => return Err(RuntimeError::NotANumber),
        };
        self.set_reg(a, result);
        Ok(())
    }

    fn binary_int(&mut self, a: i32, b: i32, c: i32, op: impl Fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let (x, y) = (as_int(&self.reg(b))?, as_int(&self.reg(c))?);
        self.set_reg(a, Value::Int(op(x, y)));
        Ok(())
    }

    fn unary_int(&mut self, a: i32, b: i32, op: impl Fn(i64) -> i64) -> Result<(), RuntimeError> {
        let x = as_int(&self.reg(b))?;
        self.set_reg(a, Value::Int(op(x)));
        Ok(())
    }

    fn binary_div(&mut self, a: i32, b: i32, c: i32) -> Result<(), RuntimeError> {
        let (x, y) = (self.reg(b), self.reg(c));
        if let (Value::Int(_), Value::Int(0)) = (&x, &y) {
            return Err(RuntimeError::DivisionByZero);
        }
        let result = numeric_pair(&x, &y, i64::wrapping_div, |p, q| p / q)?;
        self.set_reg(a, result);
        Ok(())
    }

    /// `%` requires both operands to be integers (spec.md §4.5).
    fn binary_mod(&mut self, a: i32, b: i32, c: i32) -> Result<(), RuntimeError> {
        let (x, y) = (as_int(&self.reg(b))?, as_int(&self.reg(c))?);
        if y == 0 {
            return Err(RuntimeError::DivisionByZero);
        }
        self.set_reg(a, Value::Int(x.wrapping_rem(y)));
        Ok(())
    }

    fn compare(&mut self, a: i32, b: i32, c: i32, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let (x, y) = (self.reg(b), self.reg(c));
        if !x.is_number() || !y.is_number() {
            return Err(RuntimeError::NotANumber);
        }
        let (xf, yf) = (as_f64(&x)?, as_f64(&y)?);
        self.set_reg(a, Value::Int(i64::from(op(xf, yf))));
        Ok(())
    }

    /// `CALL base numArgs numRets`: `reg[base]` holds the callee, its
    /// arguments occupy `reg[base+1 ..= base+numArgs]`.
    /// Returns `true` if a new script frame was pushed (the caller's `pc`
    /// will be advanced later, by [`Machine::do_return`]), or `false` if
    /// the call already completed synchronously (a native call, whose
    /// caller must advance its own `pc` immediately).
    fn do_call(&mut self, base: i32, num_args: i32, num_rets: i32) -> Result<bool, RuntimeError> {
        let callee = self.reg(base);
        let args: Vec<Value> = (0..num_args).map(|i| self.reg(base + 1 + i)).collect();

        match callee {
            Value::Func(closure_ref) => {
                let prototype = Rc::clone(&self.ctx.heap.get_closure(closure_ref).prototype);
                let registers = prepare_registers(&mut self.ctx.heap, args, &prototype);
                self.stack.push(CallInfo {
                    closure: closure_ref,
                    prototype,
                    registers,
                    pc: 0,
                    num_rets: num_rets as u32,
                    return_to: ReturnTarget::Frame { base: base as usize },
                });
                Ok(true)
            }
            Value::CFunc(native) => {
                self.call_native(native, args, base, num_rets)?;
                Ok(false)
            }
            _ => Err(RuntimeError::NotCallable),
        }
    }

    /// Native calls never push a [`CallInfo`]; they run synchronously
    /// inline, swapping the host-visible buffer in as their argument/
    /// return channel, per spec.md §4.5: "copy args into the Context's
    /// buffer ... invoke ... copy up to numRets return values back into
    /// caller registers".
    fn call_native(
        &mut self,
        native: crate::value::NativeFn,
        args: Vec<Value>,
        base: i32,
        num_rets: i32,
    ) -> Result<(), RuntimeError> {
        let saved_buffer = std::mem::replace(&mut self.ctx.buffer, args);
        for v in &self.ctx.buffer {
            self.ctx.heap.add_ref_value(v);
        }

        let result = self.ctx.call_native(native);

        let produced = std::mem::replace(&mut self.ctx.buffer, saved_buffer);
        result?;

        for i in 0..num_rets as usize {
            let v = produced.get(i).cloned().unwrap_or(Value::Null);
            self.ctx.heap.add_ref_value(&v);
            self.set_reg(base + i as i32, v);
        }
        for v in &produced {
            self.ctx.heap.release_value(v);
        }
        Ok(())
    }

    /// Pops the current frame, depositing up to `frame.num_rets` values
    /// into its return target and padding the remainder with `Null`.
    /// Returns `true` once the call stack is empty (execution finished).
    fn do_return(&mut self, values: Vec<Value>) -> Result<bool, RuntimeError> {
        let frame = self.stack.pop().expect("return always has a frame to pop");
        let want = frame.num_rets as usize;

        // Every register this frame held loses the reference it owned;
        // the values actually being handed off to the destination gain a
        // fresh one right after, so a value that happens to be both (the
        // common case: `return someLocal;`) nets out to the same single
        // reference it always had.
        for reg in &frame.registers {
            self.ctx.heap.release_value(reg);
        }
        for v in values.iter().take(want) {
            self.ctx.heap.add_ref_value(v);
        }

        match frame.return_to {
            ReturnTarget::Frame { base } => {
                for i in 0..want {
                    let v = values.get(i).cloned().unwrap_or(Value::Null);
                    self.set_reg_at(base + i, v);
                }
                let caller = self.stack.last_mut().expect("caller frame exists after a non-tail return");
                caller.pc += 1;
                Ok(false)
            }
            ReturnTarget::Buffer => {
                for v in self.ctx.buffer.drain(..) {
                    self.ctx.heap.release_value(&v);
                }
                for i in 0..want {
                    self.ctx.buffer.push(values.get(i).cloned().unwrap_or(Value::Null));
                }
                Ok(true)
            }
        }
    }

    /// Sets a register in whatever frame is now on top of the stack
    /// (i.e. the caller, after `do_return` has already popped the callee).
    fn set_reg_at(&mut self, index: usize, value: Value) {
        let frame = self.stack.last_mut().expect("caller frame exists after a non-tail return");
        let old = std::mem::replace(&mut frame.registers[index], value);
        self.ctx.heap.release_value(&old);
    }
}

fn as_int(v: &Value) -> Result<i64, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i),
        _ => Err(RuntimeError::NotAnInteger),
    }
}

fn as_f64(v: &Value) -> Result<f64, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        _ => Err(RuntimeError::NotANumber),
    }
}

/// `Int op Int -> Int`; any `Float` operand promotes both to `Float`.
fn numeric_pair(
    x: &Value,
    y: &Value,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(Value::Float(float_op(as_f64(x)?, as_f64(y)?)))
        }
        _ => Err(RuntimeError::NotANumber),
    }
}

/// Strict structural equality across all tag pairs: unequal tags are
/// always unequal except for the `Int`/`Float` numeric-tower case,
/// strings compare by content, and everything else (arrays, tables,
/// functions, native functions) compares by identity — spec.md defines no
/// deep-equality operator for heap containers.
fn values_equal(heap: &crate::heap::Heap, x: &Value, y: &Value) -> bool {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Null, Value::Null) => true,
        (Value::String(a), Value::String(b)) => heap.get_str(*a) == heap.get_str(*b),
        (Value::Array(a), Value::Array(b)) | (Value::Table(a), Value::Table(b)) | (Value::Func(a), Value::Func(b)) => {
            a == b
        }
        (Value::CFunc(a), Value::CFunc(b)) => std::ptr::eq(*a as *const (), *b as *const ()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_pair_promotes_to_float_on_mixed_operands() {
        let result = numeric_pair(&Value::Int(1), &Value::Float(2.0), |a, b| a + b, |a, b| a + b).unwrap();
        assert!(matches!(result, Value::Float(f) if f == 3.0));
    }

    #[test]
    fn numeric_pair_stays_integer_for_two_ints() {
        let result = numeric_pair(&Value::Int(4), &Value::Int(2), i64::wrapping_sub, |a, b| a - b).unwrap();
        assert!(matches!(result, Value::Int(2)));
    }
}
