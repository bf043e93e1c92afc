use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::objects::object_bound_method::ObjectBoundMethod;
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_instance::ObjectInstance;
use crate::objects::object_native_function::ObjectNativeFunction;
use crate::objects::object_string::ObjectString;
use crate::objects::object_upvalue::ObjectUpvalue;
use crate::value::Value;

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    Function,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
    Native,
}

/// Common header every heap object starts with. Every concrete object type
/// places this as its first field (`#[repr(C)]`) so a `*mut Object` and a
/// `*mut ObjectString` (etc.) share an address and can be cast between each
/// other once `obj_type` has been checked.
#[repr(C)]
pub struct Object {
    pub obj_type: ObjectType,
}

impl Object {
    pub fn new(obj_type: ObjectType) -> Self {
        Object { obj_type }
    }

    /// Human-readable rendering used by `print` and string concatenation of
    /// non-string operands (error messages only; `+` itself stays strict).
    pub fn format(&self) -> String {
        unsafe {
            match self.obj_type {
                ObjectType::String => self.as_string().content.to_string(),
                ObjectType::Function => match &self.as_function().name {
                    Some(name) => format!("<fn {}>", name.content),
                    None => "<script>".to_string(),
                },
                ObjectType::Closure => match &self.as_closure().function.name {
                    Some(name) => format!("<fn {}>", name.content),
                    None => "<script>".to_string(),
                },
                ObjectType::Upvalue => "upvalue".to_string(),
                ObjectType::Class => self.as_class().name.content.to_string(),
                ObjectType::Instance => format!("{} instance", self.as_instance().class.name.content),
                ObjectType::BoundMethod => match &self.as_bound_method().method.function.name {
                    Some(name) => format!("<fn {}>", name.content),
                    None => "<script>".to_string(),
                },
                ObjectType::Native => "<native fn>".to_string(),
            }
        }
    }

    /// Approximate heap footprint, used to drive the collector's allocation
    /// threshold. Doesn't need to be exact, only monotonic with real growth.
    pub fn deep_size(&self) -> usize {
        unsafe {
            match self.obj_type {
                ObjectType::String => {
                    std::mem::size_of::<ObjectString>() + self.as_string().content.len()
                }
                ObjectType::Function => {
                    let f = self.as_function();
                    std::mem::size_of::<ObjectFunction>()
                        + f.chunk.code.len()
                        + f.chunk.constants.len() * std::mem::size_of::<Value>()
                }
                ObjectType::Closure => {
                    std::mem::size_of::<ObjectClosure>()
                        + self.as_closure().upvalues.len() * std::mem::size_of::<*mut Object>()
                }
                ObjectType::Upvalue => std::mem::size_of::<ObjectUpvalue>(),
                ObjectType::Class => {
                    std::mem::size_of::<ObjectClass>()
                        + self.as_class().methods.len() * std::mem::size_of::<(usize, usize)>()
                }
                ObjectType::Instance => {
                    std::mem::size_of::<ObjectInstance>()
                        + self.as_instance().fields.len() * std::mem::size_of::<(usize, Value)>()
                }
                ObjectType::BoundMethod => std::mem::size_of::<ObjectBoundMethod>(),
                ObjectType::Native => std::mem::size_of::<ObjectNativeFunction>(),
            }
        }
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::String`.
    pub unsafe fn as_string(&self) -> &ObjectString {
        &*(self as *const Object as *const ObjectString)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Function`.
    pub unsafe fn as_function(&self) -> &ObjectFunction {
        &*(self as *const Object as *const ObjectFunction)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Function`.
    pub unsafe fn as_function_mut(&mut self) -> &mut ObjectFunction {
        &mut *(self as *mut Object as *mut ObjectFunction)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Closure`.
    pub unsafe fn as_closure(&self) -> &ObjectClosure {
        &*(self as *const Object as *const ObjectClosure)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Closure`.
    pub unsafe fn as_closure_mut(&mut self) -> &mut ObjectClosure {
        &mut *(self as *mut Object as *mut ObjectClosure)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Upvalue`.
    pub unsafe fn as_upvalue(&self) -> &ObjectUpvalue {
        &*(self as *const Object as *const ObjectUpvalue)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Upvalue`.
    pub unsafe fn as_upvalue_mut(&mut self) -> &mut ObjectUpvalue {
        &mut *(self as *mut Object as *mut ObjectUpvalue)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Class`.
    pub unsafe fn as_class(&self) -> &ObjectClass {
        &*(self as *const Object as *const ObjectClass)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Class`.
    pub unsafe fn as_class_mut(&mut self) -> &mut ObjectClass {
        &mut *(self as *mut Object as *mut ObjectClass)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Instance`.
    pub unsafe fn as_instance(&self) -> &ObjectInstance {
        &*(self as *const Object as *const ObjectInstance)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Instance`.
    pub unsafe fn as_instance_mut(&mut self) -> &mut ObjectInstance {
        &mut *(self as *mut Object as *mut ObjectInstance)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::BoundMethod`.
    pub unsafe fn as_bound_method(&self) -> &ObjectBoundMethod {
        &*(self as *const Object as *const ObjectBoundMethod)
    }

    /// # Safety
    /// `self.obj_type` must be `ObjectType::Native`.
    pub unsafe fn as_native(&self) -> &ObjectNativeFunction {
        &*(self as *const Object as *const ObjectNativeFunction)
    }
}

/// A callable implemented in Rust rather than compiled bytecode.
pub trait NativeObject {
    fn run(&self, args: &[Value]) -> Result<Value, String>;
}

/// A small, `Copy` handle to a heap object. Equality and hashing are by
/// address, matching the interpreter's "string equality is pointer
/// identity" rule and letting `Table` key on interned names cheaply.
pub struct GcRef<T> {
    ptr: NonNull<T>,
    _marker: PhantomData<*const T>,
}

impl<T> GcRef<T> {
    /// # Safety
    /// `ptr` must point at a live, correctly typed heap allocation.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        GcRef {
            ptr: NonNull::new_unchecked(ptr),
            _marker: PhantomData,
        }
    }

    pub fn as_ptr(self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub fn as_object_ptr(self) -> *mut Object {
        self.ptr.as_ptr() as *mut Object
    }
}

impl<T> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for GcRef<T> {}

impl<T> PartialEq for GcRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}
impl<T> Eq for GcRef<T> {}

impl<T> Hash for GcRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.as_ptr().hash(state);
    }
}

impl<T> std::ops::Deref for GcRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> std::ops::DerefMut for GcRef<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcRef({:p})", self.ptr.as_ptr())
    }
}
