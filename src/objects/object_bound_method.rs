use crate::objects::object::{Object, ObjectType};
use crate::objects::object_closure::ObjectClosure;
use crate::value::Value;

#[repr(C)]
pub struct ObjectBoundMethod {
    pub object: Object,
    pub receiver: Value,
    pub method: crate::objects::object::GcRef<ObjectClosure>,
}

impl ObjectBoundMethod {
    pub fn new(receiver: Value, method: crate::objects::object::GcRef<ObjectClosure>) -> Self {
        ObjectBoundMethod {
            object: Object::new(ObjectType::BoundMethod),
            receiver,
            method,
        }
    }
}
