//! The managed heap: a slab of reference-counted, optionally GC-tracked
//! objects, addressed by [`HeapRef`] instead of a raw pointer.
//!
//! `examples/original_source/cmm-lang/Object.h`'s `ObjectManager` keeps an
//! intrusive linked list of `Object`s with a refcount and a GC flag byte
//! (`GCFLAG_UNMARKED` / `GCFLAG_MARKED` / `GCFLAG_INVALID`), and its `Ref<T>`
//! is a hand-rolled `addRef`/`release` smart pointer. A safe Rust port swaps
//! the intrusive list for a `Vec`-backed slab with a free list: `HeapRef` is
//! the slot index, `addRef`/`release` become plain field increments (no
//! smart pointer needed because the VM always holds `&mut Heap` while it
//! runs — see SPEC_FULL.md's non-reentrancy note), and `GCFLAG_INVALID`
//! becomes the slot's `Tombstone` state, preventing a double free when sweep
//! walks into an already-collected member of a cycle.

use ahash::AHashMap;

use crate::bytecode::prototype::Prototype;
use crate::value::Value;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRef(u32);

enum Slot {
    Live { refcount: u32, marked: bool, object: HeapObject },
    /// Freed by refcount reaching zero or by a sweep; reusing the index is
    /// safe only once it's back on the free list, mirroring `GCFLAG_INVALID`
    /// guarding against a second release of the same node.
    Tombstone,
}

pub enum HeapObject {
    Str(String),
    Array(Vec<Value>),
    Table(Table),
    Func(Closure),
}

impl HeapObject {
    fn trace(&self, out: &mut Vec<HeapRef>) {
        match self {
            Self::Str(_) => {}
            Self::Array(items) => out.extend(items.iter().filter_map(Value::heap_ref)),
            Self::Table(t) => {
                for (k, v) in t.entries() {
                    out.extend(k.heap_ref());
                    out.extend(v.heap_ref());
                }
            }
            Self::Func(c) => out.extend(c.upvalues.iter().filter_map(Value::heap_ref)),
        }
    }
}

/// Key type for table storage: values are hashed/compared by content so
/// that two distinct string allocations with the same text are the same
/// key, matching strict-equality semantics (spec.md §3's constant-pool
/// dedup uses the same notion of equality).
#[derive(Clone, PartialEq)]
pub enum TableKey {
    Int(i64),
    /// Floats bit-compared exactly like the constant pool: no NaN
    /// normalization, no int/float coercion.
    Float(u64),
    Null,
    Str(String),
    /// Arrays, tables, and functions key by heap identity: the language has
    /// no structural-equality story for them (spec.md Non-goals: no
    /// compile-time type checking, and no deep-equality operator is
    /// defined), so two distinct objects are always distinct keys even with
    /// identical contents.
    Identity(HeapRef),
    /// `CFunc` has no heap allocation to key off of; its function pointer
    /// value stands in for identity.
    NativeFn(usize),
}

impl Eq for TableKey {}

impl std::hash::Hash for TableKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(i) => i.hash(state),
            Self::Float(bits) => bits.hash(state),
            Self::Null => {}
            Self::Str(s) => s.hash(state),
            Self::Identity(r) => r.hash(state),
            Self::NativeFn(addr) => addr.hash(state),
        }
    }
}

impl TableKey {
    #[must_use]
    pub fn from_value(heap: &Heap, value: &Value) -> Self {
        match value {
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => Self::Float(f.to_bits()),
            Value::Null => Self::Null,
            Value::String(r) => Self::Str(heap.get_str(*r).to_owned()),
            Value::Array(r) | Value::Table(r) | Value::Func(r) => Self::Identity(*r),
            Value::CFunc(f) => Self::NativeFn(*f as usize),
        }
    }
}

#[derive(Default)]
pub struct Table {
    entries: AHashMap<TableKey, (Value, Value)>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, heap: &Heap, key: &Value) -> Value {
        self.entries.get(&TableKey::from_value(heap, key)).map_or(Value::Null, |(_, v)| v.clone())
    }

    /// Looks up a key known to be a string by content, without needing a
    /// heap-allocated [`Value::String`] to query with — used for global
    /// name lookups, where the name only ever exists as a borrowed `&str`
    /// until (if ever) it needs to be stored.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Value {
        self.entries.get(&TableKey::Str(name.to_owned())).map_or(Value::Null, |(_, v)| v.clone())
    }

    pub fn set(&mut self, heap: &Heap, key: Value, value: Value) {
        let table_key = TableKey::from_value(heap, &key);
        self.set_prehashed(table_key, key, value);
    }

    /// Same as [`Table::set`], but takes an already-computed [`TableKey`]
    /// so the caller can hash the key (which needs `&Heap` to read string
    /// contents) before taking a `&mut Heap` borrow to reach this table —
    /// the two borrows can't coexist through `Heap::get_table_mut` and
    /// `Table::set`'s own `heap` parameter at once.
    ///
    /// Returns the displaced `(key, value)` pair, if any — `Table` has no
    /// `&mut Heap` access of its own, so it's the caller's job to release
    /// both halves of whatever this replaced or removed.
    #[must_use]
    pub fn set_prehashed(&mut self, table_key: TableKey, key: Value, value: Value) -> Option<(Value, Value)> {
        if matches!(value, Value::Null) {
            self.entries.remove(&table_key)
        } else {
            self.entries.insert(table_key, (key, value))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(k, v)| (k, v))
    }
}

pub struct Closure {
    pub prototype: Rc<Prototype>,
    pub upvalues: Vec<Value>,
}

/// A hybrid refcounted / mark-and-sweep heap. Every heap allocation starts
/// at refcount 0 (per `Object.h`'s note: "reference count begins from 0")
/// and is freed immediately once its refcount drops back to zero; explicit
/// [`Heap::collect`] runs mark-and-sweep over a root set to reclaim cycles
/// refcounting alone cannot see.
#[derive(Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: HeapObject) -> HeapRef {
        let slot = Slot::Live { refcount: 0, marked: false, object };
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = slot;
            HeapRef(index)
        } else {
            self.slots.push(slot);
            HeapRef((self.slots.len() - 1) as u32)
        }
    }

    fn slot(&self, r: HeapRef) -> &HeapObject {
        match &self.slots[r.0 as usize] {
            Slot::Live { object, .. } => object,
            Slot::Tombstone => panic!("dangling HeapRef({}): object already freed", r.0),
        }
    }

    fn slot_mut(&mut self, r: HeapRef) -> &mut HeapObject {
        match &mut self.slots[r.0 as usize] {
            Slot::Live { object, .. } => object,
            Slot::Tombstone => panic!("dangling HeapRef({}): object already freed", r.0),
        }
    }

    #[must_use]
    pub fn get(&self, r: HeapRef) -> &HeapObject {
        self.slot(r)
    }

    pub fn get_mut(&mut self, r: HeapRef) -> &mut HeapObject {
        self.slot_mut(r)
    }

    #[must_use]
    pub fn get_str(&self, r: HeapRef) -> &str {
        match self.slot(r) {
            HeapObject::Str(s) => s,
            _ => panic!("HeapRef({}) is not a string", r.0),
        }
    }

    #[must_use]
    pub fn get_array(&self, r: HeapRef) -> &[Value] {
        match self.slot(r) {
            HeapObject::Array(items) => items,
            _ => panic!("HeapRef({}) is not an array", r.0),
        }
    }

    pub fn get_array_mut(&mut self, r: HeapRef) -> &mut Vec<Value> {
        match self.slot_mut(r) {
            HeapObject::Array(items) => items,
            _ => panic!("HeapRef({}) is not an array", r.0),
        }
    }

    #[must_use]
    pub fn get_table(&self, r: HeapRef) -> &Table {
        match self.slot(r) {
            HeapObject::Table(t) => t,
            _ => panic!("HeapRef({}) is not a table", r.0),
        }
    }

    pub fn get_table_mut(&mut self, r: HeapRef) -> &mut Table {
        match self.slot_mut(r) {
            HeapObject::Table(t) => t,
            _ => panic!("HeapRef({}) is not a table", r.0),
        }
    }

    #[must_use]
    pub fn get_closure(&self, r: HeapRef) -> &Closure {
        match self.slot(r) {
            HeapObject::Func(c) => c,
            _ => panic!("HeapRef({}) is not a function", r.0),
        }
    }

    pub fn get_closure_mut(&mut self, r: HeapRef) -> &mut Closure {
        match self.slot_mut(r) {
            HeapObject::Func(c) => c,
            _ => panic!("HeapRef({}) is not a function", r.0),
        }
    }

    pub fn add_ref(&mut self, r: HeapRef) {
        if let Slot::Live { refcount, .. } = &mut self.slots[r.0 as usize] {
            *refcount += 1;
        }
    }

    /// Decrements the refcount, freeing the slot immediately at zero. This
    /// cannot see cyclic garbage (an array that (in)directly contains
    /// itself never reaches refcount 0) — that's [`Heap::collect`]'s job.
    pub fn release(&mut self, r: HeapRef) {
        let should_free = match &mut self.slots[r.0 as usize] {
            Slot::Live { refcount, .. } => {
                *refcount = refcount.saturating_sub(1);
                *refcount == 0
            }
            Slot::Tombstone => false,
        };
        if should_free {
            self.free(r);
        }
    }

    fn free(&mut self, r: HeapRef) {
        let children = self.slot(r).trace_children();
        self.slots[r.0 as usize] = Slot::Tombstone;
        self.free_list.push(r.0);
        for child in children {
            self.release(child);
        }
    }

    pub fn add_ref_value(&mut self, value: &Value) {
        if let Some(r) = value.heap_ref() {
            self.add_ref(r);
        }
    }

    pub fn release_value(&mut self, value: &Value) {
        if let Some(r) = value.heap_ref() {
            self.release(r);
        }
    }

    /// Mark-and-sweep pass over a root set (the globals table plus
    /// whatever the VM call stack currently holds live). Anything
    /// unreachable from the roots — necessarily a refcounted cycle, since
    /// acyclic garbage is already gone — is freed.
    pub fn collect(&mut self, roots: &[Value]) {
        for slot in &mut self.slots {
            if let Slot::Live { marked, .. } = slot {
                *marked = false;
            }
        }

        let mut stack: Vec<HeapRef> = roots.iter().filter_map(Value::heap_ref).collect();
        while let Some(r) = stack.pop() {
            let already_marked = matches!(&self.slots[r.0 as usize], Slot::Live { marked: true, .. });
            if already_marked {
                continue;
            }
            if let Slot::Live { marked, .. } = &mut self.slots[r.0 as usize] {
                *marked = true;
            }
            stack.extend(self.slot(r).trace_children());
        }

        let unreached: Vec<u32> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Live { marked: false, .. } => Some(i as u32),
                _ => None,
            })
            .collect();
        for index in unreached {
            // `free` releases each freed object's own children via
            // refcounting; an already-tombstoned child (freed earlier in
            // this same sweep because it was also unreached) is simply
            // skipped by `release`'s `Slot::Tombstone => false` arm.
            if matches!(&self.slots[index as usize], Slot::Live { .. }) {
                self.slots[index as usize] = Slot::Tombstone;
                self.free_list.push(index);
            }
        }
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, Slot::Live { .. })).count()
    }
}

impl HeapObject {
    fn trace_children(&self) -> Vec<HeapRef> {
        let mut out = Vec::new();
        self.trace(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcounting_frees_acyclic_garbage_immediately() {
        let mut heap = Heap::new();
        let r = heap.alloc(HeapObject::Str("hi".into()));
        heap.add_ref(r);
        assert_eq!(heap.live_count(), 1);
        heap.release(r);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn collect_reclaims_a_self_referential_array() {
        let mut heap = Heap::new();
        let r = heap.alloc(HeapObject::Array(Vec::new()));
        heap.add_ref(r);
        heap.get_array_mut(r).push(Value::Array(r));
        heap.add_ref(r); // the array's own slot referencing itself
        assert_eq!(heap.live_count(), 1);

        heap.collect(&[]); // no roots: the cycle is unreachable
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn collect_keeps_objects_reachable_from_roots() {
        let mut heap = Heap::new();
        let r = heap.alloc(HeapObject::Str("kept".into()));
        heap.add_ref(r);
        heap.collect(&[Value::String(r)]);
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn table_keys_strings_by_content() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let a = heap.alloc(HeapObject::Str("key".into()));
        let b = heap.alloc(HeapObject::Str("key".into()));
        table.set(&heap, Value::String(a), Value::Int(1));
        assert_eq!(table.get(&heap, &Value::String(b)).tag(), crate::value::Tag::Int);
    }
}
