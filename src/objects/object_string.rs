use crate::objects::object::{Object, ObjectType};

#[repr(C)]
pub struct ObjectString {
    pub object: Object,
    pub content: Box<str>,
}

impl ObjectString {
    pub fn new(content: &str) -> Self {
        ObjectString {
            object: Object::new(ObjectType::String),
            content: content.into(),
        }
    }
}
