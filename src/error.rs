//! Provides [InterpretationError], the error that most things return, and the diagnostics it
//! carries.
use std::fmt;

use thiserror::Error;

/// Any error that can occur during interpretation.
#[derive(Debug, Error)]
pub enum InterpretationError {
    /// One or more compile-time errors, such as a syntax error. Nothing was executed.
    #[error("compile-time error")]
    CompileError(Vec<CompileError>),
    /// A runtime error, such as a type error. Execution stopped at the failing instruction.
    #[error("runtime error")]
    RuntimeError(#[from] RuntimeError),
}

/// A single diagnostic reported while compiling.
///
/// ```
/// # use lox_arith::error::{CompileError, ErrorLocation};
/// let error = CompileError {
///     line: 3,
///     location: ErrorLocation::At(")".to_owned()),
///     message: "Expect expression.".to_owned(),
/// };
/// assert_eq!("[line 3] Error at ')': Expect expression.", error.to_string());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub location: ErrorLocation,
    pub message: String,
}

/// Where in the source a [CompileError] was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At the end of the input.
    AtEnd,
    /// At the token with this text.
    At(String),
    /// Reported by the scanner; the message already says what was wrong.
    Lexical,
}

/// An error that stopped the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    /// The source line of the failing instruction; `None` if the chunk has no line for it.
    pub line: Option<usize>,
}

/// What went wrong at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Unknown opcode {0}.")]
    UnknownOpcode(u8),
    #[error("No constant at index {0}.")]
    InvalidConstant(usize),
    #[error("Instruction is missing its operand.")]
    TruncatedInstruction,
    #[error("Reached the end of the chunk without returning.")]
    EndOfChunk,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLocation::AtEnd => write!(f, " at end"),
            ErrorLocation::At(text) => write!(f, " at '{text}'"),
            ErrorLocation::Lexical => Ok(()),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        match self.line {
            Some(line) => write!(f, "[line {line}] in script"),
            None => write!(f, "[line ?] in script"),
        }
    }
}
