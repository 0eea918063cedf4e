//! The bytecode virtual machine.

use tracing::{debug, trace};

use crate::compiler;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::prelude::{Chunk, OpCode, Value};

/// How many values fit on the value stack. Pushing one more is a runtime error.
pub const STACK_MAX: usize = 256;

/// Maintains state for the virtual machine.
pub struct VM {
    /// Instruction pointer --- index into the chunk for the next opcode to be executed
    ip: usize,
    /// Value stack -- modified as elements are pushed and popped from the stack.
    stack: Vec<Value>,
}

/// Fetches the next bytecode in the chunk, **AND** increments the instruction pointer.
///
/// Note: use [current_ip] to get the "current" value of the instruction pointer being executed
/// right now.
macro_rules! next_bytecode {
    ($self: ident, $chunk: ident) => {{
        let byte = $chunk.get($self.ip);
        $self.ip += 1;
        byte
    }};
}

/// Gets the offset of the last byte fetched with [next_bytecode].
macro_rules! current_ip {
    ($self: ident) => {
        $self.ip.saturating_sub(1)
    };
}

type Step<T> = std::result::Result<T, RuntimeErrorKind>;

impl VM {
    /// Compiles the source code and runs it, returning the value of the expression.
    ///
    /// ```
    /// # use lox_arith::vm::VM;
    /// # use lox_arith::value::Value;
    /// let mut vm = VM::default();
    /// assert_eq!(Value::Number(-2.0), vm.interpret("2 * -3 + 4").unwrap());
    /// assert_eq!(Value::Number(9.0), vm.interpret("(1 + 2) ^ 2").unwrap());
    /// ```
    pub fn interpret(&mut self, source: &str) -> crate::Result<Value> {
        self.stack.clear();
        let chunk = compiler::compile(source)?;
        Ok(self.execute(&chunk)?)
    }

    /// Runs an already compiled [Chunk] from its first instruction.
    ///
    /// Malformed bytecode is reported as a [RuntimeError] rather than a panic. Whatever happens,
    /// a failed run leaves the stack empty.
    pub fn execute(&mut self, chunk: &Chunk) -> Result<Value, RuntimeError> {
        self.ip = 0;
        self.stack.clear();

        self.run(chunk).map_err(|kind| {
            let line = chunk.line_number_for(current_ip!(self));
            self.stack.clear();
            debug!(%kind, ?line, "runtime error");
            RuntimeError { kind, line }
        })
    }

    /// The values currently on the stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// The main opcode interpreter loop.
    fn run(&mut self, chunk: &Chunk) -> Step<Value> {
        use OpCode::*;

        loop {
            if cfg!(feature = "trace_execution") {
                use crate::debug::disassemble_instruction;

                // Prints the current stack:
                print!("        ");
                for value in self.stack.iter() {
                    print!("[ {value} ]")
                }
                println!();

                // Print the next instruction:
                disassemble_instruction(chunk, self.ip);
            }

            let byte = next_bytecode!(self, chunk)
                .ok_or(RuntimeErrorKind::EndOfChunk)?
                .byte();
            let opcode = OpCode::try_from(byte).map_err(RuntimeErrorKind::UnknownOpcode)?;

            match opcode {
                Constant => {
                    let index = next_bytecode!(self, chunk)
                        .ok_or(RuntimeErrorKind::TruncatedInstruction)?
                        .as_constant_index();
                    self.push_constant(chunk, index)?;
                }
                ConstantLong => {
                    let index = chunk
                        .read_u24(self.ip)
                        .ok_or(RuntimeErrorKind::TruncatedInstruction)?;
                    self.ip += 3;
                    self.push_constant(chunk, index)?;
                }
                Add => self.binary_op(|a, b| a + b)?,
                Subtract => self.binary_op(|a, b| a - b)?,
                Multiply => self.binary_op(|a, b| a * b)?,
                Divide => self.binary_op(|a, b| a / b)?,
                Exponentiate => self.binary_op(f64::powf)?,
                Negate => self.unary_op(|a| -a)?,
                Factorial => self.unary_op(factorial)?,
                BranchIfFalsy => {
                    let distance = self.read_jump(chunk)?;
                    if self.pop()?.is_falsy() {
                        self.ip += distance;
                    }
                }
                Jump => {
                    let distance = self.read_jump(chunk)?;
                    self.ip += distance;
                }
                Return => {
                    let return_value = self.pop()?;
                    trace!(%return_value, "return");
                    return Ok(return_value);
                }
            }
        }
    }

    /// Reads the two-byte operand of a jump, leaving the ip just past it.
    fn read_jump(&mut self, chunk: &Chunk) -> Step<usize> {
        let distance = chunk
            .read_u16(self.ip)
            .ok_or(RuntimeErrorKind::TruncatedInstruction)?;
        self.ip += 2;
        Ok(distance as usize)
    }

    fn push_constant(&mut self, chunk: &Chunk, index: usize) -> Step<()> {
        let constant = chunk
            .constants()
            .get(index)
            .ok_or(RuntimeErrorKind::InvalidConstant(index))?;
        self.push(constant)
    }

    /// Applies a binary operation to the top two operands of the stack.
    ///
    /// Both operands are checked before either is popped.
    fn binary_op<F>(&mut self, op: F) -> Step<()>
    where
        F: Fn(f64, f64) -> f64,
    {
        let (Some(a), Some(b)) = (self.peek(1)?.as_number(), self.peek(0)?.as_number()) else {
            return Err(RuntimeErrorKind::OperandsMustBeNumbers);
        };

        self.pop()?;
        self.pop()?;
        self.push(op(a, b).into())
    }

    /// Replaces the top of the stack with the result of a numeric operation.
    fn unary_op<F>(&mut self, op: F) -> Step<()>
    where
        F: Fn(f64) -> f64,
    {
        let Some(a) = self.peek(0)?.as_number() else {
            return Err(RuntimeErrorKind::OperandMustBeNumber);
        };

        self.pop()?;
        self.push(op(a).into())
    }

    /// Pushes a [Value] on to the value stack.
    fn push(&mut self, value: Value) -> Step<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops and returns the top [Value] on the value stack.
    #[inline(always)]
    fn pop(&mut self) -> Step<Value> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /// Returns the value `distance` slots down from the top of the stack, without popping it.
    #[inline]
    fn peek(&self, distance: usize) -> Step<Value> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|index| self.stack.get(index))
            .copied()
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }
}

impl Default for VM {
    fn default() -> Self {
        // Create a VM with the value stack pre-allocated to its maximum size.
        VM {
            ip: 0,
            stack: Vec::with_capacity(STACK_MAX),
        }
    }
}

/// The generalized factorial: `n * (n - 1) * (n - 2) * ...` for as long as the factor is at
/// least 2. Works on any real number, so `3.5! = 3.5 * 2.5`.
///
/// ```
/// # use lox_arith::vm::factorial;
/// assert_eq!(120.0, factorial(5.0));
/// assert_eq!(8.75, factorial(3.5));
/// assert_eq!(1.0, factorial(-4.0));
/// assert_eq!(f64::INFINITY, factorial(171.0));
/// ```
pub fn factorial(n: f64) -> f64 {
    // 171! is already too large for an f64.
    const SATURATES_AT: f64 = 171.0;

    if n.is_nan() {
        return n;
    }
    if n >= SATURATES_AT {
        return f64::INFINITY;
    }

    let mut result = 1.0;
    let mut factor = n;
    while factor >= 2.0 {
        result *= factor;
        factor -= 1.0;
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::InterpretationError;

    fn eval(source: &str) -> Value {
        VM::default().interpret(source).unwrap()
    }

    fn runtime_error_of(chunk: &Chunk) -> RuntimeError {
        let mut vm = VM::default();
        let error = vm.execute(chunk).unwrap_err();
        assert!(vm.stack().is_empty());
        error
    }

    #[test]
    fn arithmetic() {
        assert_eq!(Value::Number(-2.0), eval("2 * -3 + 4"));
        assert_eq!(Value::Number(9.0), eval("(1 + 2) ^ 2"));
        assert_eq!(Value::Number(2.0), eval("8 / 2 / 2"));
        assert_eq!(Value::Number(-1.0), eval("1 - 1 - 1"));
        assert_eq!(Value::Number(512.0), eval("2 ^ 3 ^ 2"));
        assert_eq!(Value::Number(-4.0), eval("-2 ^ 2"));
        assert_eq!(Value::Number(64.0), eval("2 ^ 3!"));
        assert_eq!(Value::Number(-6.0), eval("-3!"));
        assert_eq!(Value::Number(f64::INFINITY), eval("1 / 0"));
        assert_eq!(Value::Number(f64::NAN), eval("(-8) ^ 0.5"));
    }

    #[test]
    fn conditionals_pick_one_branch() {
        assert_eq!(Value::Number(2.0), eval("1 ? 2 : 3"));
        assert_eq!(Value::Number(3.0), eval("0 ? 2 : 3"));
        assert_eq!(Value::Number(3.0), eval("-0 ? 2 : 3"));
        assert_eq!(Value::Number(4.0), eval("1 - 1 ? 2 : 3 + 1"));
        // Right-associative: 0 ? 1 : (0 ? 2 : 3)
        assert_eq!(Value::Number(3.0), eval("0 ? 1 : 0 ? 2 : 3"));
    }

    #[test]
    fn untaken_branch_is_never_run() {
        let mut chunk = Chunk::new();
        chunk.write_constant(0.0.into(), 1);
        let else_jump = chunk
            .write_opcode(OpCode::BranchIfFalsy, 1)
            .with_jump_placeholder();
        // This branch would be a type error.
        chunk.write_constant(Value::Nil, 2);
        chunk.write_opcode(OpCode::Negate, 2);
        let end_jump = chunk
            .write_opcode(OpCode::Jump, 2)
            .with_jump_placeholder();
        chunk.patch_jump(else_jump);
        chunk.write_constant(7.0.into(), 3);
        chunk.patch_jump(end_jump);
        chunk.write_opcode(OpCode::Return, 3);

        let mut vm = VM::default();
        assert_eq!(Ok(Value::Number(7.0)), vm.execute(&chunk));
    }

    #[test]
    fn operands_are_type_checked() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1.0.into(), 1);
        chunk.write_constant(Value::Nil, 2);
        chunk.write_opcode(OpCode::Divide, 3);
        chunk.write_opcode(OpCode::Return, 3);

        let error = runtime_error_of(&chunk);
        assert_eq!(RuntimeErrorKind::OperandsMustBeNumbers, error.kind);
        assert_eq!(Some(3), error.line);
        assert_eq!("Operands must be numbers.\n[line 3] in script", error.to_string());

        let mut chunk = Chunk::new();
        chunk.write_constant(Value::Nil, 4);
        chunk.write_opcode(OpCode::Factorial, 5);
        chunk.write_opcode(OpCode::Return, 5);

        let error = runtime_error_of(&chunk);
        assert_eq!(RuntimeErrorKind::OperandMustBeNumber, error.kind);
        assert_eq!(Some(5), error.line);
    }

    #[test]
    fn malformed_chunks_are_runtime_errors() {
        let empty = Chunk::new();
        assert_eq!(RuntimeErrorKind::EndOfChunk, runtime_error_of(&empty).kind);
        assert_eq!(None, runtime_error_of(&empty).line);

        let mut underflow = Chunk::new();
        underflow.write_opcode(OpCode::Add, 1);
        assert_eq!(RuntimeErrorKind::StackUnderflow, runtime_error_of(&underflow).kind);

        let mut missing_constant = Chunk::new();
        missing_constant
            .write_opcode(OpCode::Constant, 1)
            .with_operand(3);
        assert_eq!(
            RuntimeErrorKind::InvalidConstant(3),
            runtime_error_of(&missing_constant).kind
        );

        let mut truncated = Chunk::new();
        truncated.write_opcode(OpCode::ConstantLong, 1).with_operand(0);
        assert_eq!(
            RuntimeErrorKind::TruncatedInstruction,
            runtime_error_of(&truncated).kind
        );

        let mut no_return = Chunk::new();
        no_return.write_constant(1.0.into(), 1);
        assert_eq!(RuntimeErrorKind::EndOfChunk, runtime_error_of(&no_return).kind);
    }

    #[test]
    fn unknown_opcodes_are_reported() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1.0.into(), 1);
        // Smuggle a byte that is not an opcode in after a one-byte instruction.
        chunk.write_opcode(OpCode::Negate, 2).with_operand(0xee);

        let error = runtime_error_of(&chunk);
        assert_eq!(RuntimeErrorKind::UnknownOpcode(0xee), error.kind);
        assert_eq!(Some(2), error.line);
    }

    #[test]
    fn stack_overflow() {
        let mut chunk = Chunk::new();
        for _ in 0..=STACK_MAX {
            chunk.write_constant(1.0.into(), 1);
        }
        chunk.write_opcode(OpCode::Return, 1);
        assert_eq!(RuntimeErrorKind::StackOverflow, runtime_error_of(&chunk).kind);

        // Exponentiation is right-associative, so every operand waits on the stack.
        let source = vec!["1"; STACK_MAX + 10].join(" ^ ");
        let mut vm = VM::default();
        match vm.interpret(&source) {
            Err(InterpretationError::RuntimeError(error)) => {
                assert_eq!(RuntimeErrorKind::StackOverflow, error.kind);
                assert_eq!(Some(1), error.line);
            }
            other => panic!("expected stack overflow, got {other:?}"),
        }
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn vm_is_reusable_after_errors() {
        let mut vm = VM::default();
        assert!(matches!(
            vm.interpret("1 +"),
            Err(InterpretationError::CompileError(_))
        ));
        assert_eq!(Value::Number(3.0), vm.interpret("1 + 2").unwrap());
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn factorial_edge_cases() {
        assert_eq!(1.0, factorial(0.0));
        assert_eq!(1.0, factorial(1.0));
        assert_eq!(1.0, factorial(1.5));
        assert_eq!(2.0, factorial(2.0));
        assert_eq!(3628800.0, factorial(10.0));
        assert!(factorial(f64::NAN).is_nan());
        assert_eq!(f64::INFINITY, factorial(f64::INFINITY));
        assert_eq!(1.0, factorial(f64::NEG_INFINITY));
        assert!(factorial(170.0).is_finite());
        assert_eq!(f64::INFINITY, factorial(1e300));
    }
}
