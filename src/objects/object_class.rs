use crate::objects::object::{GcRef, Object, ObjectType};
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_string::ObjectString;

#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: GcRef<ObjectString>,
    /// Insertion-ordered name -> method map. Classes rarely carry more than
    /// a handful of methods, so a linear scan beats the bookkeeping of a
    /// second index.
    pub methods: Vec<(GcRef<ObjectString>, GcRef<ObjectClosure>)>,
}

impl ObjectClass {
    pub fn new(name: GcRef<ObjectString>) -> Self {
        ObjectClass {
            object: Object::new(ObjectType::Class),
            name,
            methods: Vec::new(),
        }
    }

    pub fn find_method(&self, name: GcRef<ObjectString>) -> Option<GcRef<ObjectClosure>> {
        self.methods
            .iter()
            .rev()
            .find(|(method_name, _)| *method_name == name)
            .map(|(_, closure)| *closure)
    }

    pub fn set_method(&mut self, name: GcRef<ObjectString>, closure: GcRef<ObjectClosure>) {
        if let Some(slot) = self.methods.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = closure;
        } else {
            self.methods.push((name, closure));
        }
    }

    /// Copies the superclass's methods into this class, as if each had been
    /// declared here directly. Running before the subclass's own `method`
    /// declarations lets subclass methods override inherited ones.
    pub fn inherit_from(&mut self, superclass: &ObjectClass) {
        for (name, closure) in &superclass.methods {
            self.set_method(*name, *closure);
        }
    }
}
