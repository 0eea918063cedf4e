//! A single-pass bytecode compiler and stack virtual machine for arithmetic expressions.
//!
//! Source text is scanned, compiled straight into a [Chunk](chunk::Chunk) by a Pratt parser, and
//! run by the [VM](vm::VM):
//!
//! ```
//! use lox_arith::prelude::*;
//!
//! let mut vm = VM::default();
//! assert_eq!(Value::Number(4.0), vm.interpret("1 + 3! / 2").unwrap());
//! assert!(matches!(
//!     vm.interpret("(1 +"),
//!     Err(InterpretationError::CompileError(_))
//! ));
//! ```

pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod error;
pub mod lines;
pub mod scanner;
pub mod value;
pub mod vm;
mod with_try_from_u8;

pub use error::InterpretationError;

/// Result of compiling or interpreting source code.
pub type Result<T> = std::result::Result<T, InterpretationError>;

/// Re-exports common items.
pub mod prelude {
    pub use crate::chunk::{Chunk, OpCode};
    pub use crate::error::InterpretationError;
    pub use crate::value::Value;
    pub use crate::vm::VM;
}
