use std::collections::HashSet;

use crate::heap::Heap;
use crate::interner::Interner;
use crate::objects::object::{Object, ObjectType};
use crate::table::Table;
use crate::value::{as_object, is_object, Value};

/// Aggregated GC statistics; not load-bearing for correctness, only for
/// `gc_debug` tracing and tests that want to assert a collection happened.
#[derive(Default, Debug, Clone)]
pub struct GcStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
}

impl GcStats {
    fn record(&mut self, freed: usize) {
        self.cycles += 1;
        self.total_freed_bytes += freed;
        self.last_freed_bytes = freed;
    }
}

#[cfg(feature = "gc_debug")]
macro_rules! gc_trace {
    ($($arg:tt)*) => {
        eprintln!("[gc-trace] {}", format_args!($($arg)*));
    };
}
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace {
    ($($arg:tt)*) => {};
}

/// Tri-color mark-sweep collector. Every heap object starts the cycle white
/// (`prepare`); `mark_object` moves a reachable object to gray and enqueues
/// it; `trace_references` drains gray objects to black, marking whatever
/// they point to; anything still white after that is garbage.
pub struct GarbageCollector {
    white_set: HashSet<*mut Object>,
    gray_set: HashSet<*mut Object>,
    black_set: HashSet<*mut Object>,
    stats: GcStats,
}

impl GarbageCollector {
    pub fn new() -> Self {
        GarbageCollector {
            white_set: HashSet::new(),
            gray_set: HashSet::new(),
            black_set: HashSet::new(),
            stats: GcStats::default(),
        }
    }

    pub fn prepare(&mut self, heap: &Heap) {
        self.white_set.clear();
        self.gray_set.clear();
        self.black_set.clear();
        for &ptr in heap.iter() {
            self.white_set.insert(ptr);
        }
    }

    pub fn mark_object(&mut self, ptr: *mut Object) {
        if ptr.is_null() || self.black_set.contains(&ptr) {
            return;
        }
        if self.white_set.remove(&ptr) {
            self.gray_set.insert(ptr);
            gc_trace!("mark ptr={:p}", ptr);
        }
    }

    pub fn mark_value(&mut self, value: &Value) {
        if is_object(value) {
            self.mark_object(as_object(value));
        }
    }

    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key.as_object_ptr());
            self.mark_value(value);
        }
    }

    pub fn trace_references(&mut self) {
        while !self.gray_set.is_empty() {
            let obj = *self.gray_set.iter().next().unwrap();
            self.gray_set.remove(&obj);
            self.black_set.insert(obj);
            unsafe {
                self.blacken_object(obj);
            }
        }
    }

    unsafe fn blacken_object(&mut self, object: *mut Object) {
        match (*object).obj_type {
            ObjectType::Closure => {
                let closure = (*object).as_closure();
                self.mark_object(closure.function.as_object_ptr());
                for upvalue in &closure.upvalues {
                    self.mark_object(upvalue.as_object_ptr());
                }
            }
            ObjectType::Function => {
                let function = (*object).as_function();
                self.mark_object(function.name.map(|n| n.as_object_ptr()).unwrap_or(std::ptr::null_mut()));
                for constant in &function.chunk.constants {
                    self.mark_value(constant);
                }
            }
            ObjectType::Upvalue => {
                if let crate::objects::object_upvalue::UpvalueState::Closed(value) = &(*object).as_upvalue().state {
                    self.mark_value(value);
                }
            }
            ObjectType::Class => {
                let class = (*object).as_class();
                self.mark_object(class.name.as_object_ptr());
                for (name, closure) in &class.methods {
                    self.mark_object(name.as_object_ptr());
                    self.mark_object(closure.as_object_ptr());
                }
            }
            ObjectType::Instance => {
                let instance = (*object).as_instance();
                self.mark_object(instance.class.as_object_ptr());
                self.mark_table(&instance.fields);
            }
            ObjectType::BoundMethod => {
                let bound = (*object).as_bound_method();
                self.mark_value(&bound.receiver);
                self.mark_object(bound.method.as_object_ptr());
            }
            ObjectType::Native => {
                self.mark_object((*object).as_native().name.as_object_ptr());
            }
            ObjectType::String => {}
        }
    }

    /// Destroys every still-white object, routing each one through the
    /// interner first so it never retains a dangling entry.
    pub fn sweep(&mut self, heap: &mut Heap, interner: &mut Interner) -> usize {
        let white = std::mem::take(&mut self.white_set);
        let mut freed = 0;
        for &ptr in &white {
            unsafe {
                freed += (*ptr).deep_size();
            }
            interner.forget(ptr);
            unsafe {
                drop(Box::from_raw(ptr));
            }
            gc_trace!("sweep ptr={:p}", ptr);
        }
        heap.objects_mut().retain(|ptr| !white.contains(ptr));
        heap.account_freed(freed);
        self.stats.record(freed);
        freed
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_class::ObjectClass;
    use crate::objects::object_closure::ObjectClosure;
    use crate::objects::object_function::{FunctionKind, ObjectFunction};
    use crate::objects::object_string::ObjectString;
    use crate::value::make_object_value;

    #[test]
    fn unreachable_objects_are_collected() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let keep = heap.make(ObjectString::new("keep"));
        heap.make(ObjectString::new("drop-me"));

        let mut gc = GarbageCollector::new();
        gc.prepare(&heap);
        gc.mark_object(keep.as_object_ptr());
        gc.trace_references();
        let freed = gc.sweep(&mut heap, &mut interner);

        assert!(freed > 0);
        assert_eq!(heap.object_count(), 1);
    }

    #[test]
    fn closure_keeps_its_function_alive() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let name = heap.make(ObjectString::new("f"));
        let function = heap.make(ObjectFunction::new(0, Some(name), FunctionKind::Function));
        let closure = heap.make(ObjectClosure::new(function));
        heap.make(ObjectFunction::new(0, None, FunctionKind::Function)); // unreachable

        let mut gc = GarbageCollector::new();
        gc.prepare(&heap);
        gc.mark_object(closure.as_object_ptr());
        gc.trace_references();
        gc.sweep(&mut heap, &mut interner);

        // closure + function + name string survive; the stray function does not.
        assert_eq!(heap.object_count(), 3);
    }

    #[test]
    fn class_keeps_its_methods_alive() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let class_name = heap.make(ObjectString::new("C"));
        let mut class = ObjectClass::new(class_name);
        let method_name = heap.make(ObjectString::new("m"));
        let method_fn = heap.make(ObjectFunction::new(0, Some(method_name), FunctionKind::Method));
        let method_closure = heap.make(ObjectClosure::new(method_fn));
        class.set_method(method_name, method_closure);
        let class_ref = heap.make(class);
        let unreachable_name = heap.make(ObjectString::new("orphan"));
        let _ = make_object_value(unreachable_name.as_object_ptr());

        let mut gc = GarbageCollector::new();
        gc.prepare(&heap);
        gc.mark_object(class_ref.as_object_ptr());
        gc.trace_references();
        gc.sweep(&mut heap, &mut interner);

        // class, its name, the method closure+function+name, and the class's
        // own interned name all survive; the unrelated orphan string does not.
        assert_eq!(gc.stats().cycles, 1);
        assert!(gc.stats().last_freed_bytes > 0);
    }
}
