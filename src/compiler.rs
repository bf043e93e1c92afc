use std::io::Write;

use crate::chunk::{Chunk, OpCode};
use crate::heap::Heap;
use crate::interner::Interner;
use crate::objects::object::GcRef;
use crate::objects::object_function::{FunctionKind, ObjectFunction};
use crate::objects::object_string::ObjectString;
use crate::scanner::{Scanner, Token, TokenType};
use crate::value::{make_number_value, make_object_value, Value};

struct Local<'a> {
    name: Token<'a>,
    depth: i32,
    is_captured: bool,
}

#[derive(Clone)]
struct Upvalue {
    index: usize,
    is_local: bool,
}

struct ClassCompiler {
    has_superclass: bool,
}

struct Compiler<'a> {
    function: ObjectFunction,
    kind: FunctionKind,
    locals: Vec<Local<'a>>,
    upvalues: Vec<Upvalue>,
    scope_depth: i32,
}

impl<'a> Compiler<'a> {
    fn new(kind: FunctionKind, name: Option<GcRef<ObjectString>>) -> Self {
        let reserved = if kind == FunctionKind::Function || kind == FunctionKind::Script {
            Token { token_type: TokenType::Eof, value: "", line: 0 }
        } else {
            Token { token_type: TokenType::This, value: "this", line: 0 }
        };
        Compiler {
            function: ObjectFunction::new(0, name, kind),
            kind,
            locals: vec![Local { name: reserved, depth: 0, is_captured: false }],
            upvalues: vec![],
            scope_depth: 0,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl From<u8> for Precedence {
    fn from(value: u8) -> Self {
        match value {
            0 => Precedence::None,
            1 => Precedence::Assignment,
            2 => Precedence::Or,
            3 => Precedence::And,
            4 => Precedence::Equality,
            5 => Precedence::Comparison,
            6 => Precedence::Term,
            7 => Precedence::Factor,
            8 => Precedence::Unary,
            9 => Precedence::Call,
            10 => Precedence::Primary,
            _ => unreachable!("invalid precedence value: {}", value),
        }
    }
}

type ParserFn = fn(&mut Parser<'_>, can_assign: bool);

#[derive(Debug, Clone, Copy)]
struct ParseRule {
    prefix: Option<ParserFn>,
    infix: Option<ParserFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<ParserFn>, infix: Option<ParserFn>, precedence: Precedence) -> Self {
        ParseRule { prefix, infix, precedence }
    }
}

const RULES: [ParseRule; TokenType::Eof as usize + 1] = {
    let mut rules = [ParseRule::new(None, None, Precedence::None); TokenType::Eof as usize + 1];
    rules[TokenType::LeftParen as usize] = ParseRule::new(
        Some(|parser, _| parser.grouping()),
        Some(|parser, can_assign| parser.call(can_assign)),
        Precedence::Call,
    );
    rules[TokenType::Dot as usize] =
        ParseRule::new(None, Some(|parser, can_assign| parser.dot(can_assign)), Precedence::Call);
    rules[TokenType::Minus as usize] = ParseRule::new(
        Some(|parser, _| parser.unary()),
        Some(|parser, _| parser.binary()),
        Precedence::Term,
    );
    rules[TokenType::Plus as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Term);
    rules[TokenType::Slash as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Factor);
    rules[TokenType::Star as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Factor);
    rules[TokenType::Number as usize] = ParseRule::new(Some(|parser, _| parser.number()), None, Precedence::None);
    rules[TokenType::String as usize] = ParseRule::new(Some(|parser, _| parser.string()), None, Precedence::None);
    rules[TokenType::False as usize] = ParseRule::new(Some(|parser, _| parser.literal()), None, Precedence::None);
    rules[TokenType::True as usize] = ParseRule::new(Some(|parser, _| parser.literal()), None, Precedence::None);
    rules[TokenType::Nil as usize] = ParseRule::new(Some(|parser, _| parser.literal()), None, Precedence::None);
    rules[TokenType::Bang as usize] = ParseRule::new(Some(|parser, _| parser.unary()), None, Precedence::None);
    rules[TokenType::BangEqual as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Equality);
    rules[TokenType::EqualEqual as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Equality);
    rules[TokenType::Greater as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Comparison);
    rules[TokenType::GreaterEqual as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Comparison);
    rules[TokenType::Less as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Comparison);
    rules[TokenType::LessEqual as usize] =
        ParseRule::new(None, Some(|parser, _| parser.binary()), Precedence::Comparison);
    rules[TokenType::Identifier as usize] =
        ParseRule::new(Some(|parser, can_assign| parser.variable(can_assign)), None, Precedence::None);
    rules[TokenType::And as usize] = ParseRule::new(None, Some(|parser, _| parser.and()), Precedence::And);
    rules[TokenType::Or as usize] = ParseRule::new(None, Some(|parser, _| parser.or()), Precedence::Or);
    rules[TokenType::This as usize] = ParseRule::new(Some(|parser, _| parser.this()), None, Precedence::None);
    rules[TokenType::Super as usize] = ParseRule::new(Some(|parser, _| parser.super_()), None, Precedence::None);
    rules
};

pub struct Parser<'a> {
    current: Token<'a>,
    previous: Token<'a>,
    scanner: Option<Box<Scanner<'a>>>,
    has_error: bool,
    panic_mode: bool,
    compilers: Vec<Compiler<'a>>,
    classes: Vec<ClassCompiler>,
    heap: &'a mut Heap,
    interner: &'a mut Interner,
}

impl<'a> Parser<'a> {
    pub fn new(heap: &'a mut Heap, interner: &'a mut Interner) -> Box<Parser<'a>> {
        let mut parser = Box::new(Parser {
            current: Token { token_type: TokenType::Eof, value: "", line: 0 },
            previous: Token { token_type: TokenType::Eof, value: "", line: 0 },
            scanner: None,
            has_error: false,
            panic_mode: false,
            compilers: vec![],
            classes: vec![],
            heap,
            interner,
        });
        parser.compilers.push(Compiler::new(FunctionKind::Script, None));
        parser
    }

    pub fn had_error(&self) -> bool {
        self.has_error
    }

    pub fn compile(&mut self, source: &'a str) -> Option<GcRef<ObjectFunction>> {
        self.scanner = Some(Scanner::new(source));
        self.current = Token { token_type: TokenType::Eof, value: "", line: 0 };
        self.previous = Token { token_type: TokenType::Eof, value: "", line: 0 };

        self.advance();
        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::Eof, "Expect end of expression.");

        let function = self.end_compiler();
        if self.has_error {
            None
        } else {
            Some(self.heap.make(function))
        }
    }

    fn current_compiler(&self) -> &Compiler<'a> {
        self.compilers.last().expect("no active compiler")
    }

    fn current_compiler_mut(&mut self) -> &mut Compiler<'a> {
        self.compilers.last_mut().expect("no active compiler")
    }

    fn specific_compiler_mut(&mut self, index: usize) -> &mut Compiler<'a> {
        self.compilers.get_mut(index).expect("compiler index out of range")
    }

    fn current_chunk(&self) -> &Chunk {
        &self.current_compiler().function.chunk
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_compiler_mut().function.chunk
    }

    fn current_locals(&self) -> &Vec<Local<'a>> {
        &self.current_compiler().locals
    }

    fn current_locals_mut(&mut self) -> &mut Vec<Local<'a>> {
        &mut self.current_compiler_mut().locals
    }

    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            let scanner = self.scanner.as_mut().expect("compiler not initialized");
            self.current = scanner.scan_token();
            if self.current.token_type != TokenType::Error {
                break;
            }
            self.error_at_current(self.current.value);
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }
        self.advance();
        true
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType, message: &'a str) {
        if self.current.token_type == token_type {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line as u32;
        let lexeme = self.previous.value.to_string();
        self.current_chunk_mut().write_byte(byte, line, &lexeme);
    }

    fn emit_bytes(&mut self, byte1: u8, byte2: u8) {
        self.emit_byte(byte1);
        self.emit_byte(byte2);
    }

    fn emit_constant(&mut self, value: Value) {
        let byte = self.make_constant(value);
        self.emit_bytes(OpCode::Constant.to_byte(), byte);
    }

    fn emit_return(&mut self) {
        if self.current_compiler().kind == FunctionKind::Initializer {
            self.emit_bytes(OpCode::GetLocal.to_byte(), 0);
        } else {
            self.emit_byte(OpCode::Nil.to_byte());
        }
        self.emit_byte(OpCode::Return.to_byte());
    }

    fn end_compiler(&mut self) -> ObjectFunction {
        self.emit_return();

        #[cfg(feature = "debug_print_code")]
        if !self.has_error {
            let name = match &self.current_compiler().function.name {
                Some(n) => n.content.to_string(),
                None => "<script>".to_string(),
            };
            crate::debug::disassemble_chunk(self.current_chunk(), &name);
        }

        let compiler = self.compilers.pop().expect("no active compiler");
        compiler.function
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if let Some(index) = self.current_chunk().find_constant(&value) {
            return index as u8;
        }
        let index = self.current_chunk_mut().add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn intern(&mut self, text: &str) -> GcRef<ObjectString> {
        self.interner.get(self.heap, text)
    }

    fn number(&mut self) {
        let value = self.previous.value.parse::<f64>().unwrap_or(0.0);
        self.emit_constant(make_number_value(value));
    }

    fn string(&mut self) {
        let content = &self.previous.value[1..self.previous.value.len() - 1];
        let handle = self.intern(content);
        self.emit_constant(make_object_value(handle.as_object_ptr()));
    }

    fn declaration(&mut self) {
        if self.match_token(TokenType::Class) {
            self.class_declaration();
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else if self.match_token(TokenType::Fun) {
            self.function_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous.clone();
        let name_constant = self.identifier_constant(class_name.clone());
        self.declare_variable();

        self.emit_bytes(OpCode::Class.to_byte(), name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassCompiler { has_superclass: false });

        if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            self.variable(false);
            if Self::identifier_equal(&class_name, &self.previous) {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local(Token { token_type: TokenType::Super, value: "super", line: class_name.line });
            self.define_variable(0);

            self.named_variable(class_name.clone(), false);
            self.emit_byte(OpCode::Inherit.to_byte());
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.method();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_byte(OpCode::Pop.to_byte());

        let class_compiler = self.classes.pop().unwrap();
        if class_compiler.has_superclass {
            self.end_scope();
        }
    }

    fn method(&mut self) {
        self.consume(TokenType::Identifier, "Expect method name.");
        let name = self.previous.clone();
        let name_constant = self.identifier_constant(name.clone());

        let kind = if name.value == "init" { FunctionKind::Initializer } else { FunctionKind::Method };
        self.function(kind);
        self.emit_bytes(OpCode::Method.to_byte(), name_constant);
    }

    fn variable_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil.to_byte());
        }
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn parse_variable(&mut self, message: &'a str) -> u8 {
        self.consume(TokenType::Identifier, message);
        self.declare_variable();
        if self.current_compiler().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.clone())
    }

    fn declare_variable(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }

        let variable_name = self.previous.clone();
        let scope_depth = self.current_compiler().scope_depth;
        let mut err = false;
        for local in self.current_locals().iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if Self::identifier_equal(&variable_name, &local.name) {
                err = true;
                break;
            }
        }
        if err {
            self.error("Variable with this name already declared in this scope.");
        }
        self.add_local(variable_name);
    }

    fn add_local(&mut self, name: Token<'a>) {
        if self.current_locals().len() >= u8::MAX as usize {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_locals_mut().push(Local { name, depth: -1, is_captured: false });
    }

    fn function_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.intern(self.previous.value);
        self.compilers.push(Compiler::new(kind, Some(name)));

        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                if self.current_compiler().function.arity == 255 {
                    self.error("Can't have more than 255 parameters.");
                } else {
                    self.current_compiler_mut().function.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);

                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        let upvalues = self.current_compiler().upvalues.clone();
        let mut function = self.end_compiler();
        function.upvalue_count = upvalues.len();
        let function_ref = self.heap.make(function);
        let constant = self.make_constant(make_object_value(function_ref.as_object_ptr()));
        self.emit_bytes(OpCode::Closure.to_byte(), constant);

        for upvalue in &upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index as u8);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u32 = 0;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn identifier_constant(&mut self, token: Token<'a>) -> u8 {
        let handle = self.intern(token.value);
        self.make_constant(make_object_value(handle.as_object_ptr()))
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal.to_byte(), global);
    }

    fn mark_initialized(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }
        let depth = self.current_compiler().scope_depth;
        self.current_locals_mut().last_mut().unwrap().depth = depth;
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.clone(), can_assign)
    }

    fn this(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenType::Dot, "Expect '.' after 'super'.");
        self.consume(TokenType::Identifier, "Expect superclass method name.");
        let name_constant = self.identifier_constant(self.previous.clone());

        let this_token = Token { token_type: TokenType::This, value: "this", line: self.previous.line };
        let super_token = Token { token_type: TokenType::Super, value: "super", line: self.previous.line };

        self.named_variable(this_token, false);
        if self.match_token(TokenType::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(super_token, false);
            self.emit_bytes(OpCode::SuperInvoke.to_byte(), name_constant);
            self.emit_byte(arg_count);
        } else {
            self.named_variable(super_token, false);
            self.emit_bytes(OpCode::GetSuper.to_byte(), name_constant);
        }
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let current_index = self.compilers.len() - 1;
        let (mut get_op, mut set_op) = (OpCode::GetLocal, OpCode::SetLocal);
        let mut index = self.resolve_local(current_index, &name);

        if index == -1 {
            index = self.resolve_upvalue(current_index, &name);
            if index == -1 {
                index = self.identifier_constant(name) as i32;
                get_op = OpCode::GetGlobal;
                set_op = OpCode::SetGlobal;
            } else {
                get_op = OpCode::GetUpvalue;
                set_op = OpCode::SetUpvalue;
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(set_op.to_byte(), index as u8);
        } else {
            self.emit_bytes(get_op.to_byte(), index as u8);
        }
    }

    fn resolve_local(&mut self, compiler_index: usize, name: &Token<'a>) -> i32 {
        let compiler = self.specific_compiler_mut(compiler_index);
        for (index, local) in compiler.locals.iter().enumerate().rev() {
            if Self::identifier_equal(name, &local.name) {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return index as i32;
            }
        }
        -1
    }

    fn identifier_equal(left: &Token<'a>, right: &Token<'a>) -> bool {
        left.value == right.value
    }

    fn resolve_upvalue(&mut self, compiler_index: usize, name: &Token<'a>) -> i32 {
        if compiler_index == 0 {
            return -1;
        }

        let local = self.resolve_local(compiler_index - 1, name);
        if local != -1 {
            self.specific_compiler_mut(compiler_index - 1).locals[local as usize].is_captured = true;
            return self.add_upvalue(compiler_index, local, true) as i32;
        }

        let upvalue = self.resolve_upvalue(compiler_index - 1, name);
        if upvalue != -1 {
            return self.add_upvalue(compiler_index, upvalue, false) as i32;
        }

        -1
    }

    fn add_upvalue(&mut self, compiler_index: usize, index: i32, is_local: bool) -> usize {
        let compiler = self.specific_compiler_mut(compiler_index);
        for (i, upvalue) in compiler.upvalues.iter().enumerate() {
            if upvalue.is_local == is_local && upvalue.index == index as usize {
                return i;
            }
        }
        compiler.upvalues.push(Upvalue { index: index as usize, is_local });
        compiler.function.upvalue_count = compiler.upvalues.len();
        compiler.function.upvalue_count - 1
    }

    fn and(&mut self) {
        let line = self.previous.line as u32;
        let end_jump = self.current_chunk_mut().emit_jump(
            OpCode::JumpIfFalse,
            line,
            "and",
        );
        self.emit_byte(OpCode::Pop.to_byte());
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let line = self.previous.line as u32;
        let else_jump =
            self.current_chunk_mut().emit_jump(OpCode::JumpIfFalse, line, "or");
        let end_jump = self.current_chunk_mut().emit_jump(OpCode::Jump, line, "or");

        self.patch_jump(else_jump);
        self.emit_byte(OpCode::Pop.to_byte());

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn patch_jump(&mut self, offset: usize) {
        if let Err(message) = self.current_chunk_mut().patch_jump(offset) {
            self.error_owned(message);
        }
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::Print) {
            self.print_statement();
        } else {
            self.expression_statement();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let line = self.previous.line as u32;
        let then_jump =
            self.current_chunk_mut().emit_jump(OpCode::JumpIfFalse, line, "if");
        self.emit_byte(OpCode::Pop.to_byte());
        self.statement();

        let line = self.previous.line as u32;
        let else_jump = self.current_chunk_mut().emit_jump(OpCode::Jump, line, "if");
        self.patch_jump(then_jump);
        self.emit_byte(OpCode::Pop.to_byte());

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn begin_scope(&mut self) {
        self.current_compiler_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_compiler_mut().scope_depth -= 1;
        let depth = self.current_compiler().scope_depth;

        while let Some(local) = self.current_locals().last() {
            if local.depth <= depth {
                break;
            }
            if self.current_locals().last().unwrap().is_captured {
                self.emit_byte(OpCode::CloseUpvalue.to_byte());
            } else {
                self.emit_byte(OpCode::Pop.to_byte());
            }
            self.current_locals_mut().pop();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn return_statement(&mut self) {
        if self.current_compiler().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.current_compiler().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_byte(OpCode::Return.to_byte());
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print.to_byte());
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().code.len();

        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let line = self.previous.line as u32;
        let exit_jump =
            self.current_chunk_mut().emit_jump(OpCode::JumpIfFalse, line, "while");
        self.emit_byte(OpCode::Pop.to_byte());

        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line as u32;
        if let Err(message) = self.current_chunk_mut().emit_loop(loop_start, line, "loop") {
            self.error_owned(message);
        }
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // no initializer
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");

            let line = self.previous.line as u32;
            exit_jump =
                Some(self.current_chunk_mut().emit_jump(OpCode::JumpIfFalse, line, "for"));
            self.emit_byte(OpCode::Pop.to_byte());
        }

        if !self.match_token(TokenType::RightParen) {
            let line = self.previous.line as u32;
            let body_jump =
                self.current_chunk_mut().emit_jump(OpCode::Jump, line, "for");
            let increment_start = self.current_chunk().code.len();
            self.expression();
            self.emit_byte(OpCode::Pop.to_byte());
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_byte(OpCode::Pop.to_byte());
        }
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn unary(&mut self) {
        let operator_type = self.previous.token_type;
        self.parse_precedence(Precedence::Unary);
        match operator_type {
            TokenType::Bang => self.emit_byte(OpCode::Not.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Negate.to_byte()),
            _ => unreachable!("expected unary operator"),
        }
    }

    fn binary(&mut self) {
        let operator_type = self.previous.token_type;
        let rule = &RULES[operator_type as usize];
        self.parse_precedence((rule.precedence as u8 + 1).into());

        match operator_type {
            TokenType::BangEqual => self.emit_bytes(OpCode::Equal.to_byte(), OpCode::Not.to_byte()),
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal.to_byte()),
            TokenType::Greater => self.emit_byte(OpCode::Greater.to_byte()),
            TokenType::GreaterEqual => self.emit_bytes(OpCode::Less.to_byte(), OpCode::Not.to_byte()),
            TokenType::Less => self.emit_byte(OpCode::Less.to_byte()),
            TokenType::LessEqual => self.emit_bytes(OpCode::Greater.to_byte(), OpCode::Not.to_byte()),
            TokenType::Plus => self.emit_byte(OpCode::Add.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Subtract.to_byte()),
            TokenType::Star => self.emit_byte(OpCode::Multiply.to_byte()),
            TokenType::Slash => self.emit_byte(OpCode::Divide.to_byte()),
            _ => unreachable!("unexpected binary operator: {:?}", operator_type),
        }
    }

    fn literal(&mut self) {
        match self.previous.token_type {
            TokenType::False => self.emit_byte(OpCode::False.to_byte()),
            TokenType::True => self.emit_byte(OpCode::True.to_byte()),
            TokenType::Nil => self.emit_byte(OpCode::Nil.to_byte()),
            other => unreachable!("unexpected literal token: {:?}", other),
        }
    }

    fn call(&mut self, _can_assign: bool) {
        let argument_count = self.argument_list();
        self.emit_bytes(OpCode::Call.to_byte(), argument_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenType::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.clone());

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty.to_byte(), name);
        } else if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke.to_byte(), name);
            self.emit_byte(argument_count);
        } else {
            self.emit_bytes(OpCode::GetProperty.to_byte(), name);
        }
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;
        match RULES[self.previous.token_type as usize].prefix {
            Some(prefix) => prefix(self, can_assign),
            None => {
                self.error("Expect expression.");
                return;
            }
        }

        while precedence as u8 <= RULES[self.current.token_type as usize].precedence as u8 {
            self.advance();
            match RULES[self.previous.token_type as usize].infix {
                Some(infix) => infix(self, can_assign),
                None => {
                    self.error("Expect infix parse function.");
                    return;
                }
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.token_type != TokenType::Eof {
            if self.previous.token_type == TokenType::Semicolon {
                return;
            }

            if matches!(
                self.current.token_type,
                TokenType::Class
                    | TokenType::Fun
                    | TokenType::Var
                    | TokenType::For
                    | TokenType::If
                    | TokenType::While
                    | TokenType::Print
                    | TokenType::Return
            ) {
                return;
            }

            self.advance();
        }
    }

    fn error(&mut self, message: &'static str) {
        self.error_owned(message.to_string());
    }

    fn error_at_current(&mut self, message: &'a str) {
        let owned = message.to_string();
        self.error_at(self.current.clone(), owned);
    }

    fn error_owned(&mut self, message: String) {
        self.error_at(self.previous.clone(), message);
    }

    fn error_at(&mut self, token: Token<'a>, message: String) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.has_error = true;

        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "[line {}] Error", token.line);
        match token.token_type {
            TokenType::Eof => {
                let _ = write!(stderr, " at end");
            }
            TokenType::Error => {}
            _ => {
                let _ = write!(stderr, " at '{}'", token.value);
            }
        }
        let _ = writeln!(stderr, ": {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{as_number, is_number};

    fn compile_ok(source: &str) -> GcRef<ObjectFunction> {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let mut parser = Parser::new(&mut heap, &mut interner);
        parser.compile(source).expect("expected successful compile")
    }

    #[test]
    fn compiles_simple_expression_statement() {
        let function = compile_ok("!(5 - 4 > 3 * 2 == !nil);");
        assert!(is_number(&function.chunk.constants[0]));
        assert_eq!(as_number(&function.chunk.constants[0]), 5.0);
        assert_eq!(function.chunk.code[0], OpCode::Constant.to_byte());
    }

    #[test]
    fn interns_identical_string_literals() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        {
            let mut parser = Parser::new(&mut heap, &mut interner);
            parser.compile("\"hi\";").unwrap();
        }
        {
            let mut parser = Parser::new(&mut heap, &mut interner);
            parser.compile("\"hi\";").unwrap();
        }
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn compiles_function_declaration_with_closure_over_upvalue() {
        let function = compile_ok(
            "fun outer() {
                var x = 1;
                fun inner() { return x; }
                return inner;
            }
            print outer;",
        );
        assert!(function.chunk.code.contains(&OpCode::Closure.to_byte()));
    }

    #[test]
    fn compiles_class_with_method_and_inheritance() {
        let function = compile_ok(
            "class Animal { speak() { return \"...\"; } }
            class Dog < Animal { speak() { return \"woof\"; } }
            print Dog;",
        );
        assert!(function.chunk.code.contains(&OpCode::Class.to_byte()));
        assert!(function.chunk.code.contains(&OpCode::Inherit.to_byte()));
        assert!(function.chunk.code.contains(&OpCode::Method.to_byte()));
    }

    #[test]
    fn rejects_return_from_top_level() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let mut parser = Parser::new(&mut heap, &mut interner);
        let result = parser.compile("return 1;");
        assert!(result.is_none());
    }

    #[test]
    fn rejects_this_outside_class() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let mut parser = Parser::new(&mut heap, &mut interner);
        let result = parser.compile("print this;");
        assert!(result.is_none());
    }
}
