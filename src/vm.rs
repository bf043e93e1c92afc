use crate::call_frame::CallFrame;
use crate::chunk::OpCode;
use crate::compiler::Parser;
use crate::error::RunError;
use crate::gc::GarbageCollector;
use crate::heap::Heap;
use crate::interner::Interner;
use crate::natives::NATIVES;
use crate::objects::object::{GcRef, ObjectType};
use crate::objects::object_bound_method::ObjectBoundMethod;
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_instance::ObjectInstance;
use crate::objects::object_native_function::ObjectNativeFunction;
use crate::objects::object_string::ObjectString;
use crate::objects::object_upvalue::{ObjectUpvalue, UpvalueState};
use crate::table::Table;
use crate::value::{
    as_number, as_object, format_value, is_falsey, is_number, is_object, is_object_type,
    make_bool_value, make_nil_value, make_number_value, make_object_value, values_equal, Value,
};

const FRAMES_MAX: usize = 64;

/// The stack-based bytecode interpreter. Owns the whole runtime: the value
/// stack, the call-frame stack, global variables, every heap-allocated
/// object, and the collector that reclaims them. A `Vm` is reused across
/// calls to `interpret`, which is what lets the REPL keep state between
/// lines.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    open_upvalues: Vec<GcRef<ObjectUpvalue>>,
    heap: Heap,
    interner: Interner,
    gc: GarbageCollector,
    init_string: GcRef<ObjectString>,
    trace: bool,
}

impl Vm {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let init_string = interner.get(&mut heap, "init");

        let mut vm = Vm {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            heap,
            interner,
            gc: GarbageCollector::new(),
            init_string,
            trace: false,
        };
        vm.register_natives();
        vm
    }

    /// Enables the runtime `--debug` execution trace: every instruction and
    /// the stack contents before it runs.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Installs every entry in the `natives` registry as a global.
    fn register_natives(&mut self) {
        for def in NATIVES.iter() {
            let name_ref = self.interner.get(&mut self.heap, def.name);
            let native_object = ObjectNativeFunction::from_boxed(name_ref, def.arity, (def.make)());
            let native_ref = self.heap.make(native_object);
            self.globals.set(name_ref, make_object_value(native_ref.as_object_ptr()));
        }
    }

    /// Compiles and runs one program against this VM's persistent state.
    pub fn interpret(&mut self, source: &str) -> Result<(), RunError> {
        let function = {
            let mut parser = Parser::new(&mut self.heap, &mut self.interner);
            parser.compile(source)
        }
        .ok_or(RunError::Compile)?;

        let closure = self.heap.make(ObjectClosure::new(function));
        self.push(make_object_value(closure.as_object_ptr()));
        self.call(closure, 0).map_err(|message| self.runtime_error(message))?;

        self.run()
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let byte = frame.closure.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.current_frame().closure.function.chunk.constants[index]
    }

    fn read_string(&mut self) -> GcRef<ObjectString> {
        let value = self.read_constant();
        unsafe { GcRef::from_raw(as_object(&value) as *mut ObjectString) }
    }

    fn trace_execution(&self) {
        print!("          ");
        for value in &self.stack {
            print!("[ {} ]", format_value(value));
        }
        println!();
        let frame = self.current_frame();
        crate::debug::disassemble_instruction(&frame.closure.function.chunk, frame.ip);
    }

    fn run(&mut self) -> Result<(), RunError> {
        loop {
            #[cfg(feature = "debug_trace_execution")]
            self.trace_execution();
            if self.trace {
                self.trace_execution();
            }

            if self.heap.should_collect() {
                self.collect_garbage();
            }

            let instruction = self.read_byte();
            match OpCode::from_byte(instruction) {
                Some(OpCode::Constant) => {
                    let value = self.read_constant();
                    self.push(value);
                }
                Some(OpCode::Nil) => self.push(make_nil_value()),
                Some(OpCode::True) => self.push(make_bool_value(true)),
                Some(OpCode::False) => self.push(make_bool_value(false)),
                Some(OpCode::Pop) => {
                    self.pop();
                }
                Some(OpCode::GetLocal) => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base;
                    self.push(self.stack[base + slot]);
                }
                Some(OpCode::SetLocal) => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base;
                    self.stack[base + slot] = *self.peek(0);
                }
                Some(OpCode::GetGlobal) => {
                    let name = self.read_string();
                    match self.globals.get(name) {
                        Some(value) => self.push(value),
                        None => {
                            let message = format!("Undefined variable '{}'.", name.content);
                            return Err(self.runtime_error(message));
                        }
                    }
                }
                Some(OpCode::DefineGlobal) => {
                    let name = self.read_string();
                    let value = *self.peek(0);
                    self.globals.set(name, value);
                    self.pop();
                }
                Some(OpCode::SetGlobal) => {
                    let name = self.read_string();
                    let value = *self.peek(0);
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        let message = format!("Undefined variable '{}'.", name.content);
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::GetUpvalue) => {
                    let slot = self.read_byte() as usize;
                    let upvalue = self.current_frame().closure.upvalues[slot];
                    let value = match upvalue.state {
                        UpvalueState::Open(index) => self.stack[index],
                        UpvalueState::Closed(value) => value,
                    };
                    self.push(value);
                }
                Some(OpCode::SetUpvalue) => {
                    let slot = self.read_byte() as usize;
                    let mut upvalue = self.current_frame().closure.upvalues[slot];
                    let value = *self.peek(0);
                    match upvalue.state {
                        UpvalueState::Open(index) => self.stack[index] = value,
                        UpvalueState::Closed(_) => upvalue.close(value),
                    }
                }
                Some(OpCode::GetProperty) => {
                    let receiver = *self.peek(0);
                    if !is_object_type(&receiver, ObjectType::Instance) {
                        return Err(self.runtime_error("Only instances have properties.".to_string()));
                    }
                    let name = self.read_string();
                    let field = unsafe { (*as_object(&receiver)).as_instance().fields.get(name) };
                    match field {
                        Some(value) => {
                            self.pop();
                            self.push(value);
                        }
                        None => {
                            let class = unsafe { (*as_object(&receiver)).as_instance().class };
                            if let Err(message) = self.bind_method(class, name) {
                                return Err(self.runtime_error(message));
                            }
                        }
                    }
                }
                Some(OpCode::SetProperty) => {
                    let receiver = *self.peek(1);
                    if !is_object_type(&receiver, ObjectType::Instance) {
                        return Err(self.runtime_error("Only instances have fields.".to_string()));
                    }
                    let name = self.read_string();
                    let value = *self.peek(0);
                    unsafe {
                        (*as_object(&receiver)).as_instance_mut().fields.set(name, value);
                    }
                    self.pop();
                    self.pop();
                    self.push(value);
                }
                Some(OpCode::GetSuper) => {
                    let name = self.read_string();
                    let superclass_value = self.pop();
                    let superclass =
                        unsafe { GcRef::<ObjectClass>::from_raw(as_object(&superclass_value) as *mut ObjectClass) };
                    if let Err(message) = self.bind_method(superclass, name) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Equal) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(make_bool_value(values_equal(&a, &b)));
                }
                Some(OpCode::Greater) => {
                    if let Err(message) = self.binary_compare(|a, b| a > b) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Less) => {
                    if let Err(message) = self.binary_compare(|a, b| a < b) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Add) => {
                    if let Err(message) = self.add() {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Subtract) => {
                    if let Err(message) = self.binary_number(|a, b| a - b) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Multiply) => {
                    if let Err(message) = self.binary_number(|a, b| a * b) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Divide) => {
                    if let Err(message) = self.binary_number(|a, b| a / b) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Not) => {
                    let value = self.pop();
                    self.push(make_bool_value(is_falsey(&value)));
                }
                Some(OpCode::Negate) => {
                    if !is_number(self.peek(0)) {
                        return Err(self.runtime_error("Operand must be a number.".to_string()));
                    }
                    let value = -as_number(&self.pop());
                    self.push(make_number_value(value));
                }
                Some(OpCode::Print) => {
                    let value = self.pop();
                    println!("{}", format_value(&value));
                }
                Some(OpCode::Jump) => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip += offset as usize;
                }
                Some(OpCode::JumpIfFalse) => {
                    let offset = self.read_short();
                    if is_falsey(self.peek(0)) {
                        self.current_frame_mut().ip += offset as usize;
                    }
                }
                Some(OpCode::Loop) => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip -= offset as usize;
                }
                Some(OpCode::Call) => {
                    let arg_count = self.read_byte();
                    let callee = *self.peek(arg_count as usize);
                    if let Err(message) = self.call_value(callee, arg_count) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Invoke) => {
                    let method = self.read_string();
                    let arg_count = self.read_byte();
                    if let Err(message) = self.invoke(method, arg_count) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::SuperInvoke) => {
                    let method = self.read_string();
                    let arg_count = self.read_byte();
                    let superclass_value = self.pop();
                    let superclass =
                        unsafe { GcRef::<ObjectClass>::from_raw(as_object(&superclass_value) as *mut ObjectClass) };
                    if let Err(message) = self.invoke_from_class(superclass, method, arg_count) {
                        return Err(self.runtime_error(message));
                    }
                }
                Some(OpCode::Closure) => {
                    let value = self.read_constant();
                    let function =
                        unsafe { GcRef::<ObjectFunction>::from_raw(as_object(&value) as *mut ObjectFunction) };
                    let mut closure = ObjectClosure::new(function);
                    for _ in 0..function.upvalue_count {
                        let is_local = self.read_byte();
                        let index = self.read_byte() as usize;
                        if is_local == 1 {
                            let base = self.current_frame().stack_base;
                            let upvalue = self.capture_upvalue(base + index);
                            closure.upvalues.push(upvalue);
                        } else {
                            let upvalue = self.current_frame().closure.upvalues[index];
                            closure.upvalues.push(upvalue);
                        }
                    }
                    let closure_ref = self.heap.make(closure);
                    self.push(make_object_value(closure_ref.as_object_ptr()));
                }
                Some(OpCode::CloseUpvalue) => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                Some(OpCode::Return) => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("no active call frame");
                    self.close_upvalues(frame.stack_base);
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.stack_base);
                    self.push(result);
                }
                Some(OpCode::Class) => {
                    let name = self.read_string();
                    let class_ref = self.heap.make(ObjectClass::new(name));
                    self.push(make_object_value(class_ref.as_object_ptr()));
                }
                Some(OpCode::Inherit) => {
                    let superclass_value = *self.peek(1);
                    if !is_object_type(&superclass_value, ObjectType::Class) {
                        return Err(self.runtime_error("Superclass must be a class.".to_string()));
                    }
                    let subclass_value = *self.peek(0);
                    unsafe {
                        let superclass = (*as_object(&superclass_value)).as_class() as *const ObjectClass;
                        (*as_object(&subclass_value)).as_class_mut().inherit_from(&*superclass);
                    }
                    self.pop();
                }
                Some(OpCode::Method) => {
                    let name = self.read_string();
                    self.define_method(name);
                }
                None => {
                    return Err(self.runtime_error(format!("Unknown opcode {}.", instruction)));
                }
            }
        }
    }

    fn define_method(&mut self, name: GcRef<ObjectString>) {
        let method_value = *self.peek(0);
        let method = unsafe { GcRef::<ObjectClosure>::from_raw(as_object(&method_value) as *mut ObjectClosure) };
        let class_value = *self.peek(1);
        unsafe {
            (*as_object(&class_value)).as_class_mut().set_method(name, method);
        }
        self.pop();
    }

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), String> {
        if is_object(&callee) {
            let object_ptr = as_object(&callee);
            let obj_type = unsafe { (*object_ptr).obj_type };
            match obj_type {
                ObjectType::BoundMethod => {
                    let (method, receiver) = unsafe {
                        let bound = (*object_ptr).as_bound_method();
                        (bound.method, bound.receiver)
                    };
                    let slot = self.stack.len() - arg_count as usize - 1;
                    self.stack[slot] = receiver;
                    return self.call(method, arg_count);
                }
                ObjectType::Class => {
                    let class = unsafe { GcRef::<ObjectClass>::from_raw(object_ptr as *mut ObjectClass) };
                    let instance_ref = self.heap.make(ObjectInstance::new(class));
                    let slot = self.stack.len() - arg_count as usize - 1;
                    self.stack[slot] = make_object_value(instance_ref.as_object_ptr());
                    if let Some(initializer) = class.find_method(self.init_string) {
                        return self.call(initializer, arg_count);
                    } else if arg_count != 0 {
                        return Err(format!("Expected 0 arguments but got {}.", arg_count));
                    }
                    return Ok(());
                }
                ObjectType::Closure => {
                    let closure = unsafe { GcRef::<ObjectClosure>::from_raw(object_ptr as *mut ObjectClosure) };
                    return self.call(closure, arg_count);
                }
                ObjectType::Native => {
                    let native = unsafe { (*object_ptr).as_native() };
                    let start = self.stack.len() - arg_count as usize;
                    let result = native.invoke(&self.stack[start..]);
                    self.stack.truncate(start - 1);
                    return match result {
                        Ok(value) => {
                            self.push(value);
                            Ok(())
                        }
                        Err(message) => Err(message),
                    };
                }
                _ => {}
            }
        }
        Err("Can only call functions and classes.".to_string())
    }

    fn call(&mut self, closure: GcRef<ObjectClosure>, arg_count: u8) -> Result<(), String> {
        if arg_count as usize != closure.function.arity as usize {
            return Err(format!(
                "Expected {} arguments but got {}.",
                closure.function.arity, arg_count
            ));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err("Stack overflow.".to_string());
        }
        let stack_base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame::new(closure, stack_base));
        Ok(())
    }

    fn invoke(&mut self, name: GcRef<ObjectString>, arg_count: u8) -> Result<(), String> {
        let receiver = *self.peek(arg_count as usize);
        if !is_object_type(&receiver, ObjectType::Instance) {
            return Err("Only instances have methods.".to_string());
        }
        let instance = unsafe { (*as_object(&receiver)).as_instance() };
        if let Some(value) = instance.fields.get(name) {
            let slot = self.stack.len() - arg_count as usize - 1;
            self.stack[slot] = value;
            return self.call_value(value, arg_count);
        }
        let class = instance.class;
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: GcRef<ObjectClass>,
        name: GcRef<ObjectString>,
        arg_count: u8,
    ) -> Result<(), String> {
        match class.find_method(name) {
            Some(method) => self.call(method, arg_count),
            None => Err(format!("Undefined property '{}'.", name.content)),
        }
    }

    fn bind_method(&mut self, class: GcRef<ObjectClass>, name: GcRef<ObjectString>) -> Result<(), String> {
        let method = class
            .find_method(name)
            .ok_or_else(|| format!("Undefined property '{}'.", name.content))?;
        let receiver = self.pop();
        let bound_ref = self.heap.make(ObjectBoundMethod::new(receiver, method));
        self.push(make_object_value(bound_ref.as_object_ptr()));
        Ok(())
    }

    fn capture_upvalue(&mut self, stack_index: usize) -> GcRef<ObjectUpvalue> {
        if let Some(existing) = self
            .open_upvalues
            .iter()
            .find(|upvalue| upvalue.stack_index() == Some(stack_index))
        {
            return *existing;
        }
        let upvalue_ref = self.heap.make(ObjectUpvalue::new(stack_index));
        self.open_upvalues.push(upvalue_ref);
        self.open_upvalues
            .sort_by(|a, b| b.stack_index().unwrap_or(0).cmp(&a.stack_index().unwrap_or(0)));
        upvalue_ref
    }

    fn close_upvalues(&mut self, from_index: usize) {
        let mut i = 0;
        while i < self.open_upvalues.len() {
            let mut upvalue = self.open_upvalues[i];
            if let Some(index) = upvalue.stack_index() {
                if index >= from_index {
                    let value = self.stack[index];
                    upvalue.close(value);
                    self.open_upvalues.remove(i);
                    continue;
                }
            }
            i += 1;
        }
    }

    fn binary_number(&mut self, op: fn(f64, f64) -> f64) -> Result<(), String> {
        if !is_number(self.peek(0)) || !is_number(self.peek(1)) {
            return Err("Operands must be numbers.".to_string());
        }
        let b = as_number(&self.pop());
        let a = as_number(&self.pop());
        self.push(make_number_value(op(a, b)));
        Ok(())
    }

    fn binary_compare(&mut self, op: fn(f64, f64) -> bool) -> Result<(), String> {
        if !is_number(self.peek(0)) || !is_number(self.peek(1)) {
            return Err("Operands must be numbers.".to_string());
        }
        let b = as_number(&self.pop());
        let a = as_number(&self.pop());
        self.push(make_bool_value(op(a, b)));
        Ok(())
    }

    fn add(&mut self) -> Result<(), String> {
        if is_object_type(self.peek(0), ObjectType::String) && is_object_type(self.peek(1), ObjectType::String) {
            let b = self.pop();
            let a = self.pop();
            let combined = unsafe {
                let a_content = &(*as_object(&a)).as_string().content;
                let b_content = &(*as_object(&b)).as_string().content;
                format!("{}{}", a_content, b_content)
            };
            let handle = self.interner.get(&mut self.heap, &combined);
            self.push(make_object_value(handle.as_object_ptr()));
            Ok(())
        } else if is_number(self.peek(0)) && is_number(self.peek(1)) {
            let b = as_number(&self.pop());
            let a = as_number(&self.pop());
            self.push(make_number_value(a + b));
            Ok(())
        } else {
            Err("Operands must be two numbers or two strings.".to_string())
        }
    }

    fn runtime_error(&mut self, message: String) -> RunError {
        eprintln!("{}", message);
        for frame in self.frames.iter().rev() {
            let function = frame.closure.function;
            let line = function.chunk.line_at(frame.ip.saturating_sub(1));
            match &function.name {
                Some(name) => eprintln!("[line {}] in {}()", line, name.content),
                None => eprintln!("[line {}] in script", line),
            }
        }
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        RunError::Runtime(message)
    }

    fn collect_garbage(&mut self) {
        self.gc.prepare(&self.heap);
        self.mark_roots();
        self.gc.trace_references();
        self.gc.sweep(&mut self.heap, &mut self.interner);
    }

    fn mark_roots(&mut self) {
        for value in self.stack.clone() {
            self.gc.mark_value(&value);
        }
        let frame_closures: Vec<_> = self.frames.iter().map(|frame| frame.closure.as_object_ptr()).collect();
        for ptr in frame_closures {
            self.gc.mark_object(ptr);
        }
        let upvalue_ptrs: Vec<_> = self.open_upvalues.iter().map(|u| u.as_object_ptr()).collect();
        for ptr in upvalue_ptrs {
            self.gc.mark_object(ptr);
        }
        self.gc.mark_table(&self.globals);
        self.gc.mark_object(self.init_string.as_object_ptr());
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_arithmetic_and_prints() {
        let mut vm = Vm::new();
        assert!(vm.interpret("print 1 + 2 * 3;").is_ok());
    }

    #[test]
    fn globals_persist_across_interpret_calls() {
        let mut vm = Vm::new();
        vm.interpret("var x = 10;").unwrap();
        assert!(vm.interpret("print x + 1;").is_ok());
    }

    #[test]
    fn closures_capture_their_upvalue() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "fun makeCounter() {
                var count = 0;
                fun increment() {
                    count = count + 1;
                    return count;
                }
                return increment;
            }
            var counter = makeCounter();
            print counter();
            print counter();",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn classes_support_inheritance_and_super() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "class Animal {
                speak() { return \"...\"; }
            }
            class Dog < Animal {
                speak() { return super.speak(); }
            }
            var d = Dog();
            print d.speak();",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn initializer_runs_and_binds_fields() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "class Point {
                init(x, y) { this.x = x; this.y = y; }
            }
            var p = Point(1, 2);
            print p.x + p.y;",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        let mut vm = Vm::new();
        assert!(vm.interpret("print missing;").is_err());
    }

    #[test]
    fn calling_a_non_callable_is_a_runtime_error() {
        let mut vm = Vm::new();
        assert!(vm.interpret("var x = 1; x();").is_err());
    }
}
