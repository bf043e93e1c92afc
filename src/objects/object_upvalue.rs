use crate::objects::object::{Object, ObjectType};
use crate::value::Value;

/// An open upvalue tracks a *slot index* on the VM's value stack rather than
/// a raw pointer, since the stack can in principle move; a closed upvalue
/// owns its captured value directly. The transition from open to closed
/// happens at most once, when the owning local goes out of scope.
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub state: UpvalueState,
}

impl ObjectUpvalue {
    pub fn new(stack_index: usize) -> Self {
        ObjectUpvalue {
            object: Object::new(ObjectType::Upvalue),
            state: UpvalueState::Open(stack_index),
        }
    }

    pub fn stack_index(&self) -> Option<usize> {
        match self.state {
            UpvalueState::Open(index) => Some(index),
            UpvalueState::Closed(_) => None,
        }
    }

    pub fn close(&mut self, value: Value) {
        self.state = UpvalueState::Closed(value);
    }
}
