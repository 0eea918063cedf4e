//! Human-readable listings of bytecode.
//!
//! ```
//! # use lox_arith::compiler::compile;
//! # use lox_arith::debug::Disassembly;
//! let chunk = compile("1 + 2").unwrap();
//! let listing = Disassembly::new(&chunk, "sum").to_string();
//! assert_eq!(
//!     "== sum ==\n\
//!      0000    1 OP_CONSTANT         0 '1'\n\
//!      0002    | OP_CONSTANT         1 '2'\n\
//!      0004    | OP_ADD\n\
//!      0005    | OP_RETURN\n",
//!     listing
//! );
//! ```

use std::fmt;

use crate::chunk::{Chunk, Instruction, OpCode};

/// A [Chunk] listing, rendered through [fmt::Display].
pub struct Disassembly<'a> {
    chunk: &'a Chunk,
    name: &'a str,
}

impl<'a> Disassembly<'a> {
    pub fn new(chunk: &'a Chunk, name: &'a str) -> Self {
        Disassembly { chunk, name }
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.name)?;
        for instruction in self.chunk.instructions() {
            write_instruction(f, self.chunk, instruction)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Prints every instruction in the chunk to stdout.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    print!("{}", Disassembly::new(chunk, name));
}

/// Prints the instruction at `offset` to stdout, and returns the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    let Some(entry) = chunk.get(offset) else {
        println!("{offset:04} <end of chunk>");
        return offset;
    };

    let byte = entry.byte();
    let instruction = Instruction {
        offset,
        opcode: OpCode::try_from(byte),
    };

    let mut line = String::new();
    // Writing to a String cannot fail.
    let _ = write_instruction(&mut line, chunk, instruction);
    println!("{line}");

    offset + instruction.opcode.map_or(1, OpCode::width)
}

/// Writes one instruction, without a trailing newline.
fn write_instruction(
    out: &mut impl fmt::Write,
    chunk: &Chunk,
    instruction: Instruction,
) -> fmt::Result {
    let offset = instruction.offset;
    write!(out, "{offset:04} ")?;

    let line = chunk.line_number_for(offset);
    match line {
        None => write!(out, "   ? ")?,
        Some(_) if offset > 0 && line == chunk.line_number_for(offset - 1) => write!(out, "   | ")?,
        Some(line) => write!(out, "{line:4} ")?,
    }

    let opcode = match instruction.opcode {
        Ok(opcode) => opcode,
        Err(byte) => return write!(out, "Unknown opcode {byte}"),
    };

    use OpCode::*;
    match opcode {
        Constant | ConstantLong => constant_instruction(out, chunk, opcode, offset),
        BranchIfFalsy | Jump => jump_instruction(out, chunk, opcode, offset),
        _ => simple_instruction(out, opcode),
    }
}

fn simple_instruction(out: &mut impl fmt::Write, opcode: OpCode) -> fmt::Result {
    write!(out, "{}", opcode.mnemonic())
}

fn constant_instruction(
    out: &mut impl fmt::Write,
    chunk: &Chunk,
    opcode: OpCode,
    offset: usize,
) -> fmt::Result {
    let name = opcode.mnemonic();
    match chunk.constant_operand(offset) {
        Some((index, value)) => write!(out, "{name:<16} {index:4} '{value}'"),
        None => write!(out, "{name:<16} <invalid operand>"),
    }
}

fn jump_instruction(
    out: &mut impl fmt::Write,
    chunk: &Chunk,
    opcode: OpCode,
    offset: usize,
) -> fmt::Result {
    let name = opcode.mnemonic();
    match chunk.read_u16(offset + 1) {
        Some(distance) => {
            let target = offset + opcode.width() + distance as usize;
            write!(out, "{name:<16} {offset:4} -> {target}")
        }
        None => write!(out, "{name:<16} <invalid operand>"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::compile;
    use crate::value::Value;

    #[test]
    fn conditional_listing() {
        let chunk = compile("0 ?\n1 :\n2").unwrap();
        let listing = Disassembly::new(&chunk, "cond").to_string();
        assert_eq!(
            "== cond ==\n\
             0000    1 OP_CONSTANT         0 '0'\n\
             0002    | OP_BRANCH_IF_FALSY    2 -> 10\n\
             0005    2 OP_CONSTANT         1 '1'\n\
             0007    | OP_JUMP             7 -> 12\n\
             0010    3 OP_CONSTANT         2 '2'\n\
             0012    | OP_RETURN\n",
            listing
        );
    }

    #[test]
    fn long_constants_and_garbage() {
        let mut chunk = Chunk::new();
        chunk
            .write_opcode(OpCode::ConstantLong, 1)
            .with_long_operand(0);
        chunk.write_opcode(OpCode::Negate, 2);
        chunk.add_constant(Value::Nil);

        let listing = Disassembly::new(&chunk, "raw").to_string();
        assert_eq!(
            "== raw ==\n\
             0000    1 OP_CONSTANT_LONG    0 'nil'\n\
             0004    2 OP_NEGATE\n",
            listing
        );

        let mut bad = Chunk::new();
        bad.write_opcode(OpCode::Constant, 1).with_operand(9);
        let listing = Disassembly::new(&bad, "bad").to_string();
        assert_eq!(
            "== bad ==\n0000    1 OP_CONSTANT      <invalid operand>\n",
            listing
        );
    }

    #[test]
    fn listing_has_one_line_per_instruction() {
        let chunk = compile("(1 + 2) * 3 ^ 4! ? -5 : 6 / 7").unwrap();
        let listing = Disassembly::new(&chunk, "x").to_string();
        assert_eq!(chunk.instructions().count() + 1, listing.lines().count());
        assert!(listing.lines().all(|line| !line.contains("Unknown")));
    }

    #[test]
    fn instruction_stepping_matches_widths() {
        let chunk = compile("1 ? 2 : 3").unwrap();
        let mut offset = 0;
        let mut visited = vec![];
        while offset < chunk.len() {
            visited.push(offset);
            offset = disassemble_instruction(&chunk, offset);
        }
        let expected: Vec<_> = chunk.instructions().map(|i| i.offset).collect();
        assert_eq!(expected, visited);
    }
}
