use crate::objects::object::{GcRef, Object, ObjectType};
use crate::objects::object_class::ObjectClass;
use crate::table::Table;

#[repr(C)]
pub struct ObjectInstance {
    pub object: Object,
    pub class: GcRef<ObjectClass>,
    pub fields: Table,
}

impl ObjectInstance {
    pub fn new(class: GcRef<ObjectClass>) -> Self {
        ObjectInstance {
            object: Object::new(ObjectType::Instance),
            class,
            fields: Table::new(),
        }
    }
}
