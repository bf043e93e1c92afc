use crate::objects::object::{GcRef, Object, ObjectType};
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_upvalue::ObjectUpvalue;

#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: GcRef<ObjectFunction>,
    pub upvalues: Vec<GcRef<ObjectUpvalue>>,
}

impl ObjectClosure {
    pub fn new(function: GcRef<ObjectFunction>) -> Self {
        let upvalue_count = function.upvalue_count;
        ObjectClosure {
            object: Object::new(ObjectType::Closure),
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        }
    }
}
