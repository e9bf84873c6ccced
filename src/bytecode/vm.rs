//! The bytecode virtual machine: stack-based execution engine.

use std::rc::Rc;

use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::chunk::Bytecode;
use crate::bytecode::frame::Frame;
use crate::bytecode::instruction::{read_u16, read_u8, OpCode};
use crate::bytecode::value::{Closure, CompiledFunction, HashPair, HashPairs, Value};
use crate::error::RuntimeError;

/// Capacity of the operand stack.
pub const STACK_SIZE: usize = 2048;
/// Number of addressable global slots.
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call depth, the main program included.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// The bytecode VM.
pub struct Vm {
    pub(crate) constants: Vec<Value>,
    /// Value stack; `sp` points at the next free slot.
    pub(crate) stack: Vec<Value>,
    pub(crate) sp: usize,
    /// Global slots, grown on first write.
    pub(crate) globals: Vec<Value>,
    /// Frame being executed.
    pub(crate) frame: Frame,
    /// Suspended callers, innermost last.
    pub(crate) frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, Vec::new())
    }

    /// A VM reading and writing a globals store kept from earlier runs.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main = CompiledFunction {
            instructions: bytecode.instructions,
            name: Some("<main>".to_string()),
            ..CompiledFunction::default()
        };
        let closure = Rc::new(Closure::new(Rc::new(main), Vec::new()));

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frame: Frame::new(closure, 0),
            frames: Vec::with_capacity(64),
        }
    }

    /// The value most recently popped off the stack: the program's result.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack.get(self.sp).cloned().unwrap_or(Value::Null)
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// Current call depth, the main program included.
    pub fn depth(&self) -> usize {
        self.frames.len() + 1
    }

    // --- Stack ---

    pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top value. The slot keeps its value for `last_popped_stack_elem`.
    pub(crate) fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    /// Remove the top `count` values, returning them bottom first.
    fn pop_n(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if count > self.sp {
            return Err(RuntimeError::StackUnderflow);
        }
        let start = self.sp - count;
        let values = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(values)
    }

    // --- Operand decoding ---

    fn read_u16_operand(&mut self, op: OpCode) -> VmResult<usize> {
        let ip = self.frame.ip as usize;
        let code = self.frame.instructions();
        if ip + 2 >= code.len() {
            return Err(RuntimeError::TruncatedInstruction {
                name: op.name(),
                offset: ip,
            });
        }
        let operand = read_u16(code, ip + 1) as usize;
        self.frame.ip += 2;
        Ok(operand)
    }

    fn read_u8_operand(&mut self, op: OpCode) -> VmResult<usize> {
        let ip = self.frame.ip as usize;
        let code = self.frame.instructions();
        if ip + 1 >= code.len() {
            return Err(RuntimeError::TruncatedInstruction {
                name: op.name(),
                offset: ip,
            });
        }
        let operand = read_u8(code, ip + 1) as usize;
        self.frame.ip += 1;
        Ok(operand)
    }

    fn jump_to(&mut self, target: usize) {
        self.frame.ip = target as isize - 1;
    }

    /// Run the dispatch loop until the main program finishes or fails.
    pub fn run(&mut self) -> VmResult<()> {
        loop {
            self.frame.ip += 1;
            let ip = self.frame.ip as usize;

            let byte = match self.frame.instructions().get(ip) {
                Some(byte) => *byte,
                None if self.frames.is_empty() => return Ok(()),
                None => {
                    self.return_from_frame(Value::Null)?;
                    continue;
                }
            };
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16_operand(op)?;
                    let value = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::InvalidConstant(index))?;
                    self.push(value)?;
                }
                OpCode::True => self.push(Value::Boolean(true))?,
                OpCode::False => self.push(Value::Boolean(false))?,
                OpCode::Null => self.push(Value::Null)?,
                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                OpCode::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Integer(n) => self.push(Value::Integer(n.wrapping_neg()))?,
                        other => return Err(RuntimeError::UnsupportedNegation(other.type_name())),
                    }
                }
                OpCode::Bang => {
                    let operand = self.pop()?;
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                OpCode::JumpNotTruthy => {
                    let target = self.read_u16_operand(op)?;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.jump_to(target);
                    }
                }
                OpCode::Jump => {
                    let target = self.read_u16_operand(op)?;
                    self.jump_to(target);
                }

                OpCode::SetGlobal => {
                    let index = self.read_u16_operand(op)?;
                    let value = self.pop()?;
                    if index >= self.globals.len() {
                        self.globals.resize(index + 1, Value::Null);
                    }
                    self.globals[index] = value;
                }
                OpCode::GetGlobal => {
                    let index = self.read_u16_operand(op)?;
                    let value = self.globals.get(index).cloned().unwrap_or(Value::Null);
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = self.frame.base_pointer + self.read_u8_operand(op)?;
                    let value = self.pop()?;
                    match self.stack.get_mut(slot) {
                        Some(local) => *local = value,
                        None => return Err(RuntimeError::StackOverflow),
                    }
                }
                OpCode::GetLocal => {
                    let slot = self.frame.base_pointer + self.read_u8_operand(op)?;
                    let value = self
                        .stack
                        .get(slot)
                        .cloned()
                        .ok_or(RuntimeError::StackOverflow)?;
                    self.push(value)?;
                }
                OpCode::GetBuiltin => {
                    let index = self.read_u8_operand(op)?;
                    let builtin = BUILTINS
                        .get(index)
                        .ok_or(RuntimeError::UnknownBuiltin(index))?;
                    self.push(Value::Builtin(builtin))?;
                }
                OpCode::GetFree => {
                    let index = self.read_u8_operand(op)?;
                    let value = self
                        .frame
                        .closure
                        .free
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::InvalidFreeIndex(index))?;
                    self.push(value)?;
                }
                OpCode::CurrentClosure => {
                    let closure = Rc::clone(&self.frame.closure);
                    self.push(Value::Closure(closure))?;
                }

                OpCode::Array => {
                    let count = self.read_u16_operand(op)?;
                    let elements = self.pop_n(count)?;
                    self.push(Value::array(elements))?;
                }
                OpCode::Hash => {
                    let pairs = self.read_u16_operand(op)?;
                    let values = self.pop_n(pairs * 2)?;
                    let hash = build_hash(values)?;
                    self.push(hash)?;
                }
                OpCode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    let value = execute_index(&left, &index)?;
                    self.push(value)?;
                }

                OpCode::Call => {
                    let argc = self.read_u8_operand(op)?;
                    self.execute_call(argc)?;
                }
                OpCode::ReturnValue => {
                    let value = self.pop()?;
                    if self.frames.is_empty() {
                        return self.return_from_main(value);
                    }
                    self.return_from_frame(value)?;
                }
                OpCode::Return => {
                    if self.frames.is_empty() {
                        return self.return_from_main(Value::Null);
                    }
                    self.return_from_frame(Value::Null)?;
                }
                OpCode::Closure => {
                    let const_index = self.read_u16_operand(op)?;
                    let num_free = self.read_u8_operand(op)?;
                    self.push_closure(const_index, num_free)?;
                }
            }
        }
    }

    /// A `return` in the main program ends it with `value` as the result.
    fn return_from_main(&mut self, value: Value) -> VmResult<()> {
        self.sp = 0;
        self.stack[0] = value;
        Ok(())
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let value = match op {
                    OpCode::Add => l.wrapping_add(*r),
                    OpCode::Sub => l.wrapping_sub(*r),
                    OpCode::Mul => l.wrapping_mul(*r),
                    OpCode::Div => {
                        if *r == 0 {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        l.wrapping_div(*r)
                    }
                    _ => return Err(unknown_operator(op, &left, &right)),
                };
                Value::Integer(value)
            }
            (Value::String(l), Value::String(r)) if op == OpCode::Add => {
                let mut joined = String::with_capacity(l.len() + r.len());
                joined.push_str(l);
                joined.push_str(r);
                Value::string(joined)
            }
            (Value::String(_), Value::String(_)) => {
                return Err(unknown_operator(op, &left, &right));
            }
            _ => {
                return Err(RuntimeError::UnsupportedBinaryTypes {
                    left: left.type_name(),
                    right: right.type_name(),
                })
            }
        };

        self.push(result)
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (op, &left, &right) {
            (OpCode::GreaterThan, Value::Integer(l), Value::Integer(r)) => l > r,
            (OpCode::Equal, _, _) => left == right,
            (OpCode::NotEqual, _, _) => left != right,
            _ => return Err(unknown_operator(op, &left, &right)),
        };

        self.push(Value::Boolean(result))
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> VmResult<()> {
        let func = match self.constants.get(const_index) {
            Some(Value::CompiledFunction(func)) => Rc::clone(func),
            Some(other) => return Err(RuntimeError::NotAFunction(other.type_name())),
            None => return Err(RuntimeError::InvalidConstant(const_index)),
        };
        let free = self.pop_n(num_free)?;
        self.push(Value::Closure(Rc::new(Closure::new(func, free))))
    }
}

fn operator_symbol(op: OpCode) -> &'static str {
    match op {
        OpCode::Add => "+",
        OpCode::Sub => "-",
        OpCode::Mul => "*",
        OpCode::Div => "/",
        OpCode::Equal => "==",
        OpCode::NotEqual => "!=",
        OpCode::GreaterThan => ">",
        other => other.name(),
    }
}

fn unknown_operator(op: OpCode, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::UnknownOperator {
        op: operator_symbol(op),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Build a hash from alternating keys and values.
fn build_hash(values: Vec<Value>) -> VmResult<Value> {
    let mut pairs = HashPairs::with_capacity_and_hasher(values.len() / 2, Default::default());
    let mut values = values.into_iter();

    while let (Some(key), Some(value)) = (values.next(), values.next()) {
        let hash_key = key
            .hash_key()
            .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
        pairs.insert(hash_key, HashPair { key, value });
    }

    Ok(Value::Hash(Rc::new(pairs)))
}

/// `left[index]`; missing elements and keys are null.
fn execute_index(left: &Value, index: &Value) -> VmResult<Value> {
    match (left, index) {
        (Value::Array(elements), Value::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| elements.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::Hash(pairs), key) => {
            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            Ok(pairs
                .get(&hash_key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Value::Null))
        }
        _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::bytecode::compiler::Compiler;
    use crate::bytecode::instruction::make;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn compile(source: &str) -> Bytecode {
        Compiler::compile(&parse(source)).unwrap()
    }

    fn try_run(source: &str) -> VmResult<Value> {
        let mut vm = Vm::new(compile(source));
        vm.run()?;
        Ok(vm.last_popped_stack_elem())
    }

    fn run(source: &str) -> Value {
        match try_run(source) {
            Ok(value) => value,
            Err(err) => panic!("vm error for {}: {}", source, err),
        }
    }

    fn run_err(source: &str) -> RuntimeError {
        match try_run(source) {
            Ok(value) => panic!("expected an error for {}, got {}", source, value),
            Err(err) => err,
        }
    }

    fn ints(values: &[i64]) -> Value {
        Value::array(values.iter().map(|n| Value::Integer(*n)).collect())
    }

    #[test]
    fn test_integer_arithmetic() {
        let cases = [
            ("1", 1),
            ("1 + 2", 3),
            ("1 - 2", -1),
            ("4 / 2", 2),
            ("50 / 2 * 2 + 10 - 5", 55),
            ("5 * (2 + 10)", 60),
            ("-5", -5),
            ("-50 + 100 + -50", 0),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
            ("7 / 2", 3),
            ("-7 / 2", -3),
        ];
        for (source, expected) in cases {
            assert_eq!(run(source), Value::Integer(expected), "source: {}", source);
        }
    }

    #[test]
    fn test_arithmetic_matches_host_integers() {
        let operands = [0i64, 1, -1, 7, -13, 1024, 99_999];
        for a in operands {
            for b in operands {
                let (sa, sb) = (format!("({})", a), format!("({})", b));
                assert_eq!(run(&format!("{} + {}", sa, sb)), Value::Integer(a + b));
                assert_eq!(run(&format!("{} - {}", sa, sb)), Value::Integer(a - b));
                assert_eq!(run(&format!("{} * {}", sa, sb)), Value::Integer(a * b));
                if b != 0 {
                    assert_eq!(run(&format!("{} / {}", sa, sb)), Value::Integer(a / b));
                } else {
                    assert_eq!(
                        run_err(&format!("{} / {}", sa, sb)),
                        RuntimeError::DivisionByZero
                    );
                }
            }
        }
    }

    #[test]
    fn test_overflow_wraps() {
        assert_eq!(
            run("9223372036854775807 + 1"),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_boolean_expressions() {
        let cases = [
            ("true", true),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 1", true),
            ("1 != 2", true),
            ("true == true", true),
            ("true != false", true),
            ("(1 < 2) == true", true),
            ("(1 > 2) == true", false),
            ("!true", false),
            ("!!5", true),
            ("!(if (false) { 5; })", true),
            (r#""a" == "a""#, true),
            (r#""a" != "b""#, true),
            ("[1, 2] == [1, 2]", true),
            ("1 == true", false),
            ("1 != true", true),
        ];
        for (source, expected) in cases {
            assert_eq!(run(source), Value::Boolean(expected), "source: {}", source);
        }
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(run("if (true) { 10 }"), Value::Integer(10));
        assert_eq!(run("if (true) { 10 } else { 20 }"), Value::Integer(10));
        assert_eq!(run("if (false) { 10 } else { 20 }"), Value::Integer(20));
        assert_eq!(run("if (1) { 10 }"), Value::Integer(10));
        assert_eq!(run("if (1 > 2) { 10 }"), Value::Null);
        assert_eq!(run("if (false) { 10 }"), Value::Null);
        assert_eq!(run("if ((if (false) { 10 })) { 10 } else { 20 }"), Value::Integer(20));
        assert_eq!(run("if (true) { let a = 5; }"), Value::Null);
    }

    #[test]
    fn test_global_let_statements() {
        assert_eq!(run("let one = 1; one"), Value::Integer(1));
        assert_eq!(run("let one = 1; let two = 2; one + two"), Value::Integer(3));
        assert_eq!(run("let one = 1; let two = one + one; one + two"), Value::Integer(3));
        assert_eq!(run("let x = 5; let x = x * 2; x"), Value::Integer(10));
    }

    #[test]
    fn test_string_expressions() {
        assert_eq!(run(r#""monkey""#), Value::string("monkey"));
        assert_eq!(run(r#""mon" + "key" + "banana""#), Value::string("monkeybanana"));
        assert_eq!(
            run_err(r#""a" - "b""#),
            RuntimeError::UnknownOperator {
                op: "-",
                left: "STRING",
                right: "STRING"
            }
        );
    }

    #[test]
    fn test_collections() {
        assert_eq!(run("[]"), ints(&[]));
        assert_eq!(run("[1 + 2, 3 * 4, 5 + 6]"), ints(&[3, 12, 11]));
        assert_eq!(run("{1: 2, 2: 3}").to_string(), "{1: 2, 2: 3}");
        assert_eq!(run("{1 + 1: 2 * 2, 3 + 3: 4 * 4}").to_string(), "{2: 4, 6: 16}");
        assert_eq!(
            run_err("{[1]: 2}"),
            RuntimeError::UnusableHashKey("ARRAY")
        );
    }

    #[test]
    fn test_index_expressions() {
        let cases = [
            ("[1, 2, 3][1]", Value::Integer(2)),
            ("[[1, 1, 1]][0][0]", Value::Integer(1)),
            ("[][0]", Value::Null),
            ("[1, 2, 3][10]", Value::Null),
            ("[1][-1]", Value::Null),
            ("{1: 1, 2: 2}[1]", Value::Integer(1)),
            ("{1: 1}[0]", Value::Null),
            ("{}[0]", Value::Null),
            (r#"{"one": 1, true: 2}[true]"#, Value::Integer(2)),
        ];
        for (source, expected) in cases {
            assert_eq!(run(source), expected, "source: {}", source);
        }
        assert_eq!(run_err("1[0]"), RuntimeError::IndexNotSupported("INTEGER"));
        assert_eq!(run_err("{}[fn() {}]"), RuntimeError::UnusableHashKey("CLOSURE"));
    }

    #[test]
    fn test_calling_functions() {
        let cases = [
            ("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", Value::Integer(15)),
            ("let a = fn() { 1 }; let b = fn() { a() + 1 }; b();", Value::Integer(2)),
            ("let early = fn() { return 99; 100; }; early();", Value::Integer(99)),
            ("let noReturn = fn() { }; noReturn();", Value::Null),
            (
                "let returnsOne = fn() { 1; }; let returnsOneReturner = fn() { returnsOne; }; returnsOneReturner()();",
                Value::Integer(1),
            ),
            ("let identity = fn(a) { a; }; identity(4);", Value::Integer(4)),
            ("let sum = fn(a, b) { a + b; }; sum(1, 2);", Value::Integer(3)),
            (
                "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
                Value::Integer(10),
            ),
            (
                "let globalNum = 10; let sum = fn(a, b) { let c = a + b; c + globalNum; }; \
                 let outer = fn() { sum(1, 2) + sum(3, 4) + globalNum; }; outer() + globalNum;",
                Value::Integer(50),
            ),
        ];
        for (source, expected) in cases {
            assert_eq!(run(source), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_repeated_parameter_name_binds_last_argument() {
        assert_eq!(run("fn(a, a) { a }(1, 2)"), Value::Integer(2));
        assert_eq!(
            run("let f = fn(a, b, a) { a - b }; f(10, 3, 20);"),
            Value::Integer(17)
        );
    }

    #[test]
    fn test_wrong_arity() {
        assert_eq!(
            run_err("fn() { 1; }(1);"),
            RuntimeError::WrongArity { want: 0, got: 1 }
        );
        assert_eq!(
            run_err("fn(a) { a; }();"),
            RuntimeError::WrongArity { want: 1, got: 0 }
        );
        assert_eq!(
            run_err("fn(a, b) { a + b; }(1);"),
            RuntimeError::WrongArity { want: 2, got: 1 }
        );
    }

    #[test]
    fn test_calling_non_callable() {
        assert_eq!(run_err("1();"), RuntimeError::NotCallable("INTEGER"));
        assert_eq!(run_err(r#""f"();"#), RuntimeError::NotCallable("STRING"));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(run(r#"len("")"#), Value::Integer(0));
        assert_eq!(run(r#"len("hello world")"#), Value::Integer(11));
        assert_eq!(run("len([1, 2, 3])"), Value::Integer(3));
        assert_eq!(
            run("len(1)"),
            Value::error("argument to `len` not supported, got INTEGER")
        );
        assert_eq!(run("first([1, 2, 3])"), Value::Integer(1));
        assert_eq!(run("last([1, 2, 3])"), Value::Integer(3));
        assert_eq!(run("rest([1, 2, 3])"), ints(&[2, 3]));
        assert_eq!(run("rest([])"), Value::Null);
        assert_eq!(run("push([], 1)"), ints(&[1]));
        assert_eq!(run("let a = [1]; push(a, 2); a"), ints(&[1]));
        assert_eq!(
            run("push(1, 1)"),
            Value::error("argument to `push` must be ARRAY, got INTEGER")
        );
    }

    #[test]
    fn test_builtin_result_feeds_expressions() {
        assert_eq!(run("len([1, 2]) + len(rest([1, 2]))"), Value::Integer(3));
        assert_eq!(run("let f = fn(a) { len(a) }; f([1, 2, 3])"), Value::Integer(3));
    }

    #[test]
    fn test_closures() {
        let cases = [
            (
                "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
                99,
            ),
            (
                "let newAdder = fn(a, b) { fn(c) { a + b + c }; }; let adder = newAdder(1, 2); adder(8);",
                11,
            ),
            (
                "let newAdder = fn(a, b) { let c = a + b; fn(d) { c + d }; }; let adder = newAdder(1, 2); adder(8);",
                11,
            ),
            (
                "let newAdderOuter = fn(a, b) { let c = a + b; fn(d) { let e = d + c; fn(f) { e + f; }; }; }; \
                 let newAdderInner = newAdderOuter(1, 2); let adder = newAdderInner(3); adder(8);",
                14,
            ),
            (
                "let a = 1; let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d }; }; }; \
                 let newAdderInner = newAdderOuter(2); let adder = newAdderInner(3); adder(8);",
                14,
            ),
            (
                "let newClosure = fn(a, b) { let one = fn() { a; }; let two = fn() { b; }; fn() { one() + two(); }; }; \
                 let closure = newClosure(9, 90); closure();",
                99,
            ),
        ];
        for (source, expected) in cases {
            assert_eq!(run(source), Value::Integer(expected), "source: {}", source);
        }
    }

    #[test]
    fn test_captures_are_independent() {
        let source = "let newAdder = fn(x) { fn(y) { x + y } }; \
                      let addTwo = newAdder(2); let addTen = newAdder(10); \
                      [addTwo(3), addTwo(3), addTen(3), addTwo(1)]";
        assert_eq!(run(source), ints(&[5, 5, 13, 3]));
    }

    #[test]
    fn test_recursive_functions() {
        let cases = [
            (
                "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } }; countDown(1);",
                0,
            ),
            (
                "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } }; \
                 let wrapper = fn() { countDown(1); }; wrapper();",
                0,
            ),
            (
                "let wrapper = fn() { let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } }; \
                 countDown(1); }; wrapper();",
                0,
            ),
        ];
        for (source, expected) in cases {
            assert_eq!(run(source), Value::Integer(expected), "source: {}", source);
        }
    }

    #[test]
    fn test_recursive_fibonacci() {
        let source = "let fibonacci = fn(x) { \
                          if (x == 0) { return 0; } else { \
                              if (x == 1) { return 1; } else { fibonacci(x - 1) + fibonacci(x - 2); } \
                          } \
                      }; \
                      fibonacci(15);";
        assert_eq!(run(source), Value::Integer(610));
    }

    #[test]
    fn test_unbounded_recursion_is_fatal() {
        let err = run_err("let f = fn(n) { f(n + 1) }; f(0);");
        assert!(err.is_fatal(), "got {:?}", err);
    }

    #[test]
    fn test_frame_limit() {
        // One local slot per call keeps the stack below its limit.
        let err = run_err("let f = fn() { f() }; f();");
        assert_eq!(err, RuntimeError::FrameOverflow(MAX_FRAMES));
    }

    #[test]
    fn test_locals_start_null() {
        let source = "let f = fn(set) { if (set) { let x = 1; } else { let y = 2; }; x }; f(false)";
        assert_eq!(run("let f = fn() { let x = 7; x }; f()"), Value::Integer(7));
        assert_eq!(run(source), Value::Null);
    }

    #[test]
    fn test_top_level_return() {
        assert_eq!(run("return 7; 8;"), Value::Integer(7));
        assert_eq!(run("1; if (true) { return 2; }; 3;"), Value::Integer(2));
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(
            run_err("1 + true"),
            RuntimeError::UnsupportedBinaryTypes {
                left: "INTEGER",
                right: "BOOLEAN"
            }
        );
        assert_eq!(
            run_err("true > false"),
            RuntimeError::UnknownOperator {
                op: ">",
                left: "BOOLEAN",
                right: "BOOLEAN"
            }
        );
        assert_eq!(run_err("-true"), RuntimeError::UnsupportedNegation("BOOLEAN"));
    }

    #[test]
    fn test_globals_survive_between_runs() {
        let mut first = Compiler::new();
        first.compile_program(&parse("let a = 10;")).unwrap();
        let (bytecode, symbols) = first.into_parts();
        let mut vm = Vm::new(bytecode.clone());
        vm.run().unwrap();
        let globals = vm.into_globals();

        let mut second = Compiler::new_with_state(symbols, bytecode.constants);
        second.compile_program(&parse("a * 2")).unwrap();
        let mut vm = Vm::with_globals(second.bytecode(), globals);
        vm.run().unwrap();
        assert_eq!(vm.last_popped_stack_elem(), Value::Integer(20));
        assert_eq!(vm.globals()[0], Value::Integer(10));
    }

    #[test]
    fn test_corrupt_bytecode_is_reported() {
        let bytecode = Bytecode {
            instructions: vec![vec![250u8]].into_iter().collect(),
            constants: vec![],
        };
        assert_eq!(Vm::new(bytecode).run(), Err(RuntimeError::UnknownOpcode(250)));

        let bytecode = Bytecode {
            instructions: vec![make(OpCode::Constant, &[0])].into_iter().collect(),
            constants: vec![],
        };
        assert_eq!(Vm::new(bytecode).run(), Err(RuntimeError::InvalidConstant(0)));

        let bytecode = Bytecode {
            instructions: vec![vec![OpCode::Jump as u8, 0]].into_iter().collect(),
            constants: vec![],
        };
        assert!(Vm::new(bytecode).run().unwrap_err().is_fatal());

        let bytecode = Bytecode {
            instructions: vec![make(OpCode::Pop, &[])].into_iter().collect(),
            constants: vec![],
        };
        assert_eq!(Vm::new(bytecode).run(), Err(RuntimeError::StackUnderflow));
    }
}
