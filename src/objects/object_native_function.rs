use crate::objects::object::{GcRef, NativeObject, Object, ObjectType};
use crate::objects::object_string::ObjectString;
use crate::value::Value;

#[repr(C)]
pub struct ObjectNativeFunction {
    pub object: Object,
    pub name: GcRef<ObjectString>,
    pub arity: u8,
    pub native: Box<dyn NativeObject>,
}

impl ObjectNativeFunction {
    pub fn new(name: GcRef<ObjectString>, arity: u8, native: impl NativeObject + 'static) -> Self {
        Self::from_boxed(name, arity, Box::new(native))
    }

    /// Builds from an already-boxed native, which is what the `NATIVES`
    /// registry table hands back from its `make` constructor.
    pub fn from_boxed(name: GcRef<ObjectString>, arity: u8, native: Box<dyn NativeObject>) -> Self {
        ObjectNativeFunction {
            object: Object::new(ObjectType::Native),
            name,
            arity,
            native,
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        self.native.run(args)
    }
}
