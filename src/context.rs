//! The embedding API: the single type a host program touches.
//!
//! Grounded in `examples/original_source/cmm-lang/Context.h`/`Context.cpp`
//! — one object owning the heap, the globals table, and a fixed-capacity
//! communication buffer used to pass arguments and results across the
//! host/script boundary — and in `examples/scostello-monty`'s convention
//! of a single `run.rs`-style entry point wrapping compile-then-execute.
//! Every public method here maps to one bullet of spec.md §6.

use crate::analyzer::Analyzer;
use crate::bytecode::compiler;
use crate::error::{CompileError, RuntimeError};
use crate::heap::{Closure, Heap, HeapObject, Table};
use crate::parser::Parser;
use crate::value::{NativeFn, Tag, Value};
use crate::vm;

/// The communication buffer never holds more than this many values at
/// once (spec.md §6: "Overflow above 99 entries raises an error" — i.e.
/// capacity 100, indices `0..100`).
const BUFFER_CAPACITY: usize = 100;

/// Owns one script's entire runtime state: its heap, its globals, and the
/// buffer used to shuttle values across the host/script boundary.
///
/// Deliberately does not implement `Clone`, `Send`, or `Sync`: heap
/// objects are plain indices into this `Context`'s own [`Heap`] and are
/// never meant to be shared across contexts or threads (spec.md §5).
pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) globals: crate::heap::HeapRef,
    pub(crate) buffer: Vec<Value>,
    reentrant: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let globals = heap.alloc(HeapObject::Table(Table::new()));
        heap.add_ref(globals);
        Self { heap, globals, buffer: Vec::new(), reentrant: false }
    }

    /// Compiles `source` and pushes the resulting top-level [`Value::Func`]
    /// onto the buffer, replacing whatever the buffer previously held
    /// (`stack_size()` becomes 1 afterward).
    ///
    /// # Errors
    /// Returns a [`CompileError`] from whichever of lexing, parsing, or
    /// semantic analysis fails first.
    pub fn load(&mut self, source: &str) -> Result<(), CompileError> {
        let mut program = Parser::new(source)?.parse_program()?;
        Analyzer::new().analyze(&mut program)?;
        let prototype = compiler::compile(&program, &mut self.heap);

        self.clear();
        let closure_ref = self.heap.alloc(HeapObject::Func(Closure { prototype, upvalues: Vec::new() }));
        self.heap.add_ref(closure_ref);
        self.buffer.push(Value::Func(closure_ref));
        Ok(())
    }

    /// Calls the function at buffer slot 0 with `num_args` arguments taken
    /// from the following `num_args` buffer slots, leaving up to
    /// `num_rets` results in the buffer afterward.
    ///
    /// # Errors
    /// [`RuntimeError::Reentrant`] if this `Context` is already running
    /// (including transitively, from inside a native function callback —
    /// spec.md §5 forbids a native function from calling `run` again).
    /// [`RuntimeError::ArgumentCountMismatch`] if the buffer doesn't hold
    /// exactly `num_args + 1` values, or slot 0 isn't a [`Value::Func`].
    /// Any error the script itself raises while executing.
    pub fn run(&mut self, num_args: u32, num_rets: u32) -> Result<(), RuntimeError> {
        if self.reentrant {
            return Err(RuntimeError::Reentrant);
        }
        if self.buffer.len() != num_args as usize + 1 {
            return Err(RuntimeError::ArgumentCountMismatch);
        }
        let Value::Func(closure_ref) = self.buffer[0] else {
            return Err(RuntimeError::ArgumentCountMismatch);
        };

        let args: Vec<Value> = self.buffer.drain(1..).collect();
        let callee = self.buffer.pop().expect("buffer held exactly slot 0 after draining the rest");
        self.heap.release_value(&callee);

        self.reentrant = true;
        let result = vm::execute(self, closure_ref, args, num_rets);
        // Released on unwind too (spec.md §9's design note calls out the
        // original's failure to do this as a bug to not repeat).
        self.reentrant = false;
        result
    }

    /// Interns `name` and binds it in the globals table to a native
    /// function value.
    pub fn register_cfunction(&mut self, name: &str, f: NativeFn) {
        let name_ref = self.heap.alloc(HeapObject::Str(name.to_owned()));
        self.heap.add_ref(name_ref);
        let key = Value::String(name_ref);
        let table_key = crate::heap::TableKey::Str(name.to_owned());
        self.heap.get_table_mut(self.globals).set_prehashed(table_key, key, Value::CFunc(f));
    }

    /// Runs mark-and-sweep rooted at the globals table plus whatever the
    /// communication buffer currently holds (spec.md glossary: "Root set:
    /// for GC, the globals table (and by extension any strong references
    /// the host currently holds)" — values pushed to the buffer but not
    /// yet stored anywhere are exactly such host-held references).
    pub fn garbage_collect(&mut self) {
        let mut roots = vec![Value::Table(self.globals)];
        roots.extend(self.buffer.iter().cloned());
        self.heap.collect(&roots);
    }

    /// Invoked by [`vm::execute`] for a `CALL` whose callee is a
    /// [`Value::CFunc`]: hands the native function `&mut self` directly so
    /// it can use the buffer primitives below, exactly as a script would
    /// see it through `Context&` in the original embedding.
    pub(crate) fn call_native(&mut self, f: NativeFn) -> Result<(), RuntimeError> {
        f(self)
    }

    // -- communication buffer primitives (spec.md §6) --------------------

    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.buffer.len()
    }

    /// # Errors
    /// [`RuntimeError::BufferIndexOutOfRange`] if `index` is outside
    /// `0..stack_size()`.
    pub fn type_of(&self, index: i64) -> Result<Tag, RuntimeError> {
        Ok(self.value_at(index)?.tag())
    }

    fn value_at(&self, index: i64) -> Result<&Value, RuntimeError> {
        if index < 0 || index as usize >= self.buffer.len() {
            return Err(RuntimeError::BufferIndexOutOfRange { index });
        }
        Ok(&self.buffer[index as usize])
    }

    /// Pops `n` values off the top of the buffer, releasing each one's
    /// heap reference.
    pub fn pop(&mut self, n: usize) {
        let from = self.buffer.len().saturating_sub(n);
        for v in self.buffer.drain(from..) {
            self.heap.release_value(&v);
        }
    }

    /// Empties the buffer entirely, releasing every value's heap
    /// reference.
    pub fn clear(&mut self) {
        self.pop(self.buffer.len());
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.buffer.len() >= BUFFER_CAPACITY {
            return Err(RuntimeError::BufferOverflow);
        }
        self.heap.add_ref_value(&value);
        self.buffer.push(value);
        Ok(())
    }

    /// # Errors
    /// [`RuntimeError::BufferOverflow`] if the buffer is already at its
    /// 100-entry capacity.
    pub fn push_null(&mut self) -> Result<(), RuntimeError> {
        self.push(Value::Null)
    }

    /// # Errors
    /// [`RuntimeError::BufferOverflow`] if the buffer is already at its
    /// 100-entry capacity.
    pub fn push_int(&mut self, v: i64) -> Result<(), RuntimeError> {
        self.push(Value::Int(v))
    }

    /// # Errors
    /// [`RuntimeError::BufferIndexOutOfRange`] / [`RuntimeError::BufferTypeMismatch`].
    pub fn get_int(&self, index: i64) -> Result<i64, RuntimeError> {
        match self.value_at(index)? {
            Value::Int(v) => Ok(*v),
            _ => Err(RuntimeError::BufferTypeMismatch { index, expected: "Int" }),
        }
    }

    /// # Errors
    /// [`RuntimeError::BufferOverflow`] if the buffer is already at its
    /// 100-entry capacity.
    pub fn push_float(&mut self, v: f64) -> Result<(), RuntimeError> {
        self.push(Value::Float(v))
    }

    /// # Errors
    /// [`RuntimeError::BufferIndexOutOfRange`] / [`RuntimeError::BufferTypeMismatch`].
    pub fn get_float(&self, index: i64) -> Result<f64, RuntimeError> {
        match self.value_at(index)? {
            Value::Float(v) => Ok(*v),
            _ => Err(RuntimeError::BufferTypeMismatch { index, expected: "Float" }),
        }
    }

    /// # Errors
    /// [`RuntimeError::BufferOverflow`] if the buffer is already at its
    /// 100-entry capacity.
    pub fn push_string(&mut self, v: &str) -> Result<(), RuntimeError> {
        let r = self.heap.alloc(HeapObject::Str(v.to_owned()));
        self.push(Value::String(r))
    }

    /// # Errors
    /// [`RuntimeError::BufferIndexOutOfRange`] / [`RuntimeError::BufferTypeMismatch`].
    pub fn get_string(&self, index: i64) -> Result<String, RuntimeError> {
        match self.value_at(index)? {
            Value::String(r) => Ok(self.heap.get_str(*r).to_owned()),
            _ => Err(RuntimeError::BufferTypeMismatch { index, expected: "String" }),
        }
    }

    /// Pushes a new, empty table.
    ///
    /// # Errors
    /// [`RuntimeError::BufferOverflow`].
    pub fn push_new_table(&mut self) -> Result<(), RuntimeError> {
        let r = self.heap.alloc(HeapObject::Table(Table::new()));
        self.push(Value::Table(r))
    }

    /// Pushes `table[key]` where `table_index`/`key_index` are buffer
    /// slots.
    ///
    /// # Errors
    /// Index/type errors, or [`RuntimeError::BufferOverflow`].
    pub fn push_table_value(&mut self, table_index: i64, key_index: i64) -> Result<(), RuntimeError> {
        let table_ref = match self.value_at(table_index)? {
            Value::Table(r) => *r,
            _ => return Err(RuntimeError::BufferTypeMismatch { index: table_index, expected: "Table" }),
        };
        let key = self.value_at(key_index)?.clone();
        let v = self.heap.get_table(table_ref).get(&self.heap, &key);
        self.push(v)
    }

    /// `table[key] = value`, all three identified by buffer slot.
    ///
    /// # Errors
    /// Index/type errors.
    pub fn set_table_value(&mut self, table_index: i64, key_index: i64, value_index: i64) -> Result<(), RuntimeError> {
        let table_ref = match self.value_at(table_index)? {
            Value::Table(r) => *r,
            _ => return Err(RuntimeError::BufferTypeMismatch { index: table_index, expected: "Table" }),
        };
        let key = self.value_at(key_index)?.clone();
        let value = self.value_at(value_index)?.clone();
        let old = self.heap.get_table(table_ref).get(&self.heap, &key);
        self.heap.add_ref_value(&key);
        self.heap.add_ref_value(&value);
        let table_key = crate::heap::TableKey::from_value(&self.heap, &key);
        self.heap.get_table_mut(table_ref).set_prehashed(table_key, key, value);
        self.heap.release_value(&old);
        Ok(())
    }

    /// # Errors
    /// Index/type errors.
    pub fn table_size(&self, table_index: i64) -> Result<usize, RuntimeError> {
        match self.value_at(table_index)? {
            Value::Table(r) => Ok(self.heap.get_table(*r).len()),
            _ => Err(RuntimeError::BufferTypeMismatch { index: table_index, expected: "Table" }),
        }
    }

    /// Pushes a new, empty array.
    ///
    /// # Errors
    /// [`RuntimeError::BufferOverflow`].
    pub fn push_new_array(&mut self) -> Result<(), RuntimeError> {
        let r = self.heap.alloc(HeapObject::Array(Vec::new()));
        self.push(Value::Array(r))
    }

    /// Pushes `array[i]` (`Null` if `i` is out of range, matching the
    /// array object's own `get`).
    ///
    /// # Errors
    /// Index/type errors, or [`RuntimeError::BufferOverflow`].
    pub fn push_array_value(&mut self, array_index: i64, i: i64) -> Result<(), RuntimeError> {
        let array_ref = match self.value_at(array_index)? {
            Value::Array(r) => *r,
            _ => return Err(RuntimeError::BufferTypeMismatch { index: array_index, expected: "Array" }),
        };
        let items = self.heap.get_array(array_ref);
        let v = if i >= 0 && (i as usize) < items.len() { items[i as usize].clone() } else { Value::Null };
        self.push(v)
    }

    /// `array[i] = value` (buffer slot `value_index`); extends with
    /// `Null` padding if `i >= array.len()`, a no-op if `i < 0`, matching
    /// spec.md §3's `Array::set`.
    ///
    /// # Errors
    /// Index/type errors.
    pub fn set_array_value(&mut self, array_index: i64, i: i64, value_index: i64) -> Result<(), RuntimeError> {
        let array_ref = match self.value_at(array_index)? {
            Value::Array(r) => *r,
            _ => return Err(RuntimeError::BufferTypeMismatch { index: array_index, expected: "Array" }),
        };
        if i < 0 {
            return Ok(());
        }
        let value = self.value_at(value_index)?.clone();
        self.heap.add_ref_value(&value);
        let items = self.heap.get_array_mut(array_ref);
        let i = i as usize;
        if i >= items.len() {
            items.resize(i + 1, Value::Null);
        }
        let old = std::mem::replace(&mut items[i], value);
        self.heap.release_value(&old);
        Ok(())
    }

    /// # Errors
    /// Index/type errors.
    pub fn array_size(&self, array_index: i64) -> Result<usize, RuntimeError> {
        match self.value_at(array_index)? {
            Value::Array(r) => Ok(self.heap.get_array(*r).len()),
            _ => Err(RuntimeError::BufferTypeMismatch { index: array_index, expected: "Array" }),
        }
    }

    /// Binds the global `name` to the value at buffer slot `index`.
    ///
    /// # Errors
    /// [`RuntimeError::BufferIndexOutOfRange`] if `index` is out of range.
    pub fn set_global(&mut self, index: i64, name: &str) -> Result<(), RuntimeError> {
        let value = self.value_at(index)?.clone();
        let name_ref = self.heap.alloc(HeapObject::Str(name.to_owned()));
        let key = Value::String(name_ref);
        self.heap.add_ref_value(&key);
        self.heap.add_ref_value(&value);
        let old = self.heap.get_table(self.globals).get_by_name(name);
        let table_key = crate::heap::TableKey::Str(name.to_owned());
        self.heap.get_table_mut(self.globals).set_prehashed(table_key, key, value);
        self.heap.release_value(&old);
        Ok(())
    }

    /// Pushes the current value of global `name` (`Null` if unbound).
    ///
    /// # Errors
    /// [`RuntimeError::BufferOverflow`].
    pub fn get_global(&mut self, name: &str) -> Result<(), RuntimeError> {
        let v = self.heap.get_table(self.globals).get_by_name(name);
        self.push(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_arithmetic() {
        let mut ctx = Context::new();
        ctx.load("local x = 1 + 2 * 3; return x;").expect("compiles");
        ctx.run(0, 1).expect("runs");
        assert_eq!(ctx.get_int(0).expect("int result"), 7);
    }

    #[test]
    fn end_to_end_string_concat() {
        let mut ctx = Context::new();
        ctx.load(r#"local s = "foo" + "bar"; return s;"#).expect("compiles");
        ctx.run(0, 1).expect("runs");
        assert_eq!(ctx.get_string(0).expect("string result"), "foobar");
    }

    #[test]
    fn end_to_end_array_indexing() {
        let mut ctx = Context::new();
        ctx.load("local t = {10, 20, 30}; return t[1];").expect("compiles");
        ctx.run(0, 1).expect("runs");
        assert_eq!(ctx.get_int(0).expect("int result"), 20);
    }

    #[test]
    fn end_to_end_recursive_function() {
        let mut ctx = Context::new();
        ctx.load(
            "local function f(n){ if (n<=1) return 1; return n*f(n-1); } return f(5);",
        )
        .expect("compiles");
        ctx.run(0, 1).expect("runs");
        assert_eq!(ctx.get_int(0).expect("int result"), 120);
    }

    #[test]
    fn end_to_end_closure_captures_mutable_upvalue() {
        let mut ctx = Context::new();
        ctx.load(
            "local function make(){ local c = 0; return function(){ c = c + 1; return c; }; } \
             local g = make(); g(); g(); return g();",
        )
        .expect("compiles");
        ctx.run(0, 1).expect("runs");
        assert_eq!(ctx.get_int(0).expect("int result"), 3);
    }

    #[test]
    fn end_to_end_array_and_table_interplay() {
        let mut ctx = Context::new();
        ctx.load(r#"local a = array{1,2,3}; local b = table{"k":1}; b["k"]=b["k"]+a[0]; return b["k"];"#)
            .expect("compiles");
        ctx.run(0, 1).expect("runs");
        assert_eq!(ctx.get_int(0).expect("int result"), 2);
    }

    #[test]
    fn reentrant_run_is_rejected() {
        fn reenter(ctx: &mut Context) -> Result<(), RuntimeError> {
            ctx.run(0, 0)
        }

        let mut ctx = Context::new();
        ctx.register_cfunction("reenter", reenter);
        ctx.load("return reenter();").expect("compiles");
        let err = ctx.run(0, 1).expect_err("reentrant run must fail");
        assert_eq!(err, RuntimeError::Reentrant);
    }

    #[test]
    fn buffer_overflow_is_reported() {
        let mut ctx = Context::new();
        for _ in 0..BUFFER_CAPACITY {
            ctx.push_null().expect("under capacity");
        }
        let err = ctx.push_null().expect_err("buffer is full");
        assert_eq!(err, RuntimeError::BufferOverflow);
    }

    #[test]
    fn garbage_collect_reclaims_a_dropped_cycle() {
        let mut ctx = Context::new();
        ctx.load("local a = table{}; local b = table{}; a[\"b\"] = b; b[\"a\"] = a; return 0;")
            .expect("compiles");
        ctx.run(0, 1).expect("runs");
        ctx.clear();
        ctx.garbage_collect();
        // Only the globals table itself should remain live.
        assert_eq!(ctx.heap.live_count(), 1);
    }
}
