use crate::chunk::Chunk;
use crate::objects::object::{GcRef, Object, ObjectType};
use crate::objects::object_string::ObjectString;

#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// `None` for the top-level script; every `fun`/method has a name.
    pub name: Option<GcRef<ObjectString>>,
    pub kind: FunctionKind,
}

/// Distinguishes `init` methods, which implicitly return `this`, from
/// ordinary functions and methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: Option<GcRef<ObjectString>>, kind: FunctionKind) -> Self {
        ObjectFunction {
            object: Object::new(ObjectType::Function),
            arity,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
            kind,
        }
    }
}
