use std::collections::HashMap;

use crate::objects::object::GcRef;
use crate::objects::object_string::ObjectString;
use crate::value::Value;

/// A map keyed by interned strings. Because every key is pointer-unique
/// (see `crate::interner`), hashing and comparing the key is just an
/// address comparison — used for both the VM's global variables and each
/// instance's field set.
pub struct Table {
    entries: HashMap<GcRef<ObjectString>, Value>,
}

impl Table {
    pub fn new() -> Self {
        Table {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: GcRef<ObjectString>) -> Option<Value> {
        self.entries.get(&key).copied()
    }

    /// Returns `true` if this inserted a brand-new key (clox's semantics for
    /// `define_global`/`set_global` bookkeeping).
    pub fn set(&mut self, key: GcRef<ObjectString>, value: Value) -> bool {
        self.entries.insert(key, value).is_none()
    }

    pub fn delete(&mut self, key: GcRef<ObjectString>) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn contains(&self, key: GcRef<ObjectString>) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GcRef<ObjectString>, &Value)> {
        self.entries.iter()
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use crate::value::make_number_value;

    #[test]
    fn set_reports_whether_key_is_new() {
        let mut heap = Heap::new();
        let key = heap.make(ObjectString::new("x"));
        let mut table = Table::new();
        assert!(table.set(key, make_number_value(1.0)));
        assert!(!table.set(key, make_number_value(2.0)));
        assert_eq!(table.get(key).unwrap(), make_number_value(2.0));
    }
}
