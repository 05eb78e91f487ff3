//! The seam between the virtual machine and the host's object graph.
//!
//! The VM only needs to know an object's type name (to resolve methods) and
//! to reach its heap (to run `aloc`/`load`/`store`/`peek`/`poke`). How objects
//! are created, parented and collected is up to the host.

use crate::bytecode::CellIndex;
use crate::lang::{NULL_HANDLE, ObjectHandle, Value};

/// What the VM requires from an object graph.
pub trait ObjectGraph {
    /// Type name of a live object, `None` for dead or unknown handles.
    fn type_name(&self, handle: ObjectHandle) -> Option<&str>;

    fn heap(&self, handle: ObjectHandle) -> Option<&Heap>;

    fn heap_mut(&mut self, handle: ObjectHandle) -> Option<&mut Heap>;
}

/// Local-variable cells owned by one object instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heap {
    cells: Vec<Value>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a null cell and return its address.
    pub fn alloc(&mut self) -> CellIndex {
        self.cells.push(Value::Null);
        (self.cells.len() - 1) as CellIndex
    }

    pub fn get(&self, address: CellIndex) -> Option<&Value> {
        self.cells.get(address as usize)
    }

    pub fn get_mut(&mut self, address: CellIndex) -> Option<&mut Value> {
        self.cells.get_mut(address as usize)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug)]
struct Entry {
    type_name: String,
    heap: Heap,
}

/// Minimal [`ObjectGraph`]: a flat table of objects indexed by handle.
///
/// Handle 0 is never issued.
#[derive(Debug, Default)]
pub struct ObjectTable {
    slots: Vec<Option<Entry>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, type_name: &str) -> ObjectHandle {
        self.slots.push(Some(Entry {
            type_name: type_name.to_string(),
            heap: Heap::new(),
        }));
        self.slots.len() as ObjectHandle
    }

    /// Remove an object. Returns false if the handle was not live.
    pub fn despawn(&mut self, handle: ObjectHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, handle: ObjectHandle) -> Option<&Entry> {
        if handle == NULL_HANDLE {
            return None;
        }
        self.slots.get(handle as usize - 1)?.as_ref()
    }

    fn slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut Option<Entry>> {
        if handle == NULL_HANDLE {
            return None;
        }
        self.slots.get_mut(handle as usize - 1)
    }
}

impl ObjectGraph for ObjectTable {
    fn type_name(&self, handle: ObjectHandle) -> Option<&str> {
        self.entry(handle).map(|e| e.type_name.as_str())
    }

    fn heap(&self, handle: ObjectHandle) -> Option<&Heap> {
        self.entry(handle).map(|e| &e.heap)
    }

    fn heap_mut(&mut self, handle: ObjectHandle) -> Option<&mut Heap> {
        self.slot_mut(handle)?.as_mut().map(|e| &mut e.heap)
    }
}
