use crate::chunk::{Chunk, OpCode};
use crate::value::format_value;

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

/// Prints one instruction and returns the offset of the next. Exposed
/// publicly so the VM's `--debug` execution trace can reuse it per step.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.line_at(offset));
    }

    let byte = chunk.code[offset];
    match OpCode::from_byte(byte) {
        Some(OpCode::Constant) => constant_instruction("OP_CONSTANT", chunk, offset),
        Some(OpCode::Nil) => simple_instruction("OP_NIL", offset),
        Some(OpCode::True) => simple_instruction("OP_TRUE", offset),
        Some(OpCode::False) => simple_instruction("OP_FALSE", offset),
        Some(OpCode::Pop) => simple_instruction("OP_POP", offset),
        Some(OpCode::GetLocal) => byte_instruction("OP_GET_LOCAL", chunk, offset),
        Some(OpCode::SetLocal) => byte_instruction("OP_SET_LOCAL", chunk, offset),
        Some(OpCode::GetGlobal) => constant_instruction("OP_GET_GLOBAL", chunk, offset),
        Some(OpCode::DefineGlobal) => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        Some(OpCode::SetGlobal) => constant_instruction("OP_SET_GLOBAL", chunk, offset),
        Some(OpCode::GetUpvalue) => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        Some(OpCode::SetUpvalue) => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        Some(OpCode::GetProperty) => constant_instruction("OP_GET_PROPERTY", chunk, offset),
        Some(OpCode::SetProperty) => constant_instruction("OP_SET_PROPERTY", chunk, offset),
        Some(OpCode::GetSuper) => constant_instruction("OP_GET_SUPER", chunk, offset),
        Some(OpCode::Equal) => simple_instruction("OP_EQUAL", offset),
        Some(OpCode::Greater) => simple_instruction("OP_GREATER", offset),
        Some(OpCode::Less) => simple_instruction("OP_LESS", offset),
        Some(OpCode::Add) => simple_instruction("OP_ADD", offset),
        Some(OpCode::Subtract) => simple_instruction("OP_SUBTRACT", offset),
        Some(OpCode::Multiply) => simple_instruction("OP_MULTIPLY", offset),
        Some(OpCode::Divide) => simple_instruction("OP_DIVIDE", offset),
        Some(OpCode::Not) => simple_instruction("OP_NOT", offset),
        Some(OpCode::Negate) => simple_instruction("OP_NEGATE", offset),
        Some(OpCode::Print) => simple_instruction("OP_PRINT", offset),
        Some(OpCode::Jump) => jump_instruction("OP_JUMP", 1, chunk, offset),
        Some(OpCode::JumpIfFalse) => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        Some(OpCode::Loop) => jump_instruction("OP_LOOP", -1, chunk, offset),
        Some(OpCode::Call) => byte_instruction("OP_CALL", chunk, offset),
        Some(OpCode::Invoke) => invoke_instruction("OP_INVOKE", chunk, offset),
        Some(OpCode::SuperInvoke) => invoke_instruction("OP_SUPER_INVOKE", chunk, offset),
        Some(OpCode::Closure) => closure_instruction(chunk, offset),
        Some(OpCode::CloseUpvalue) => simple_instruction("OP_CLOSE_UPVALUE", offset),
        Some(OpCode::Return) => simple_instruction("OP_RETURN", offset),
        Some(OpCode::Class) => constant_instruction("OP_CLASS", chunk, offset),
        Some(OpCode::Inherit) => simple_instruction("OP_INHERIT", offset),
        Some(OpCode::Method) => constant_instruction("OP_METHOD", chunk, offset),
        None => {
            println!("Unknown opcode {}", byte);
            offset + 1
        }
    }
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.code[offset + 1] as usize;
    println!("{:<16} {:>4} '{}'", name, constant, format_value(&chunk.constants[constant]));
    offset + 2
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{:<16} {:>4}", name, slot);
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = (hi << 8) | lo;
    let target = offset as i32 + 3 + sign * jump as i32;
    println!("{:<16} {:>4} -> {}", name, offset, target);
    offset + 3
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.code[offset + 1] as usize;
    let argument_count = chunk.code[offset + 2];
    println!(
        "{:<16} ({} args) {:>4} '{}'",
        name,
        argument_count,
        constant,
        format_value(&chunk.constants[constant])
    );
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let mut offset = offset + 1;
    let constant = chunk.code[offset] as usize;
    offset += 1;
    println!("{:<16} {:>4} '{}'", "OP_CLOSURE", constant, format_value(&chunk.constants[constant]));

    if let crate::value::ValueType::Object = chunk.constants[constant].value_type {
        let object = crate::value::as_object(&chunk.constants[constant]);
        if unsafe { (*object).obj_type } == crate::objects::object::ObjectType::Function {
            let function = unsafe { (*object).as_function() };
            for _ in 0..function.upvalue_count {
                let is_local = chunk.code[offset];
                let index = chunk.code[offset + 1];
                println!(
                    "{:04}      |                     {} {}",
                    offset,
                    if is_local == 1 { "local" } else { "upvalue" },
                    index
                );
                offset += 2;
            }
        }
    }

    offset
}
