//! Contains a [Chunk] of [OpCode].

use crate::lines::LineTable;
use crate::value::{Value, ValueArray};

extern crate static_assertions as sa;

/// How many constants [OpCode::Constant] can address with its one-byte operand.
pub const MAX_SHORT_CONSTANTS: usize = u8::MAX as usize;

/// How many constants a chunk can hold in total. [OpCode::ConstantLong] has a 24-bit operand.
pub const MAX_CONSTANTS: usize = (1 << 24) - 1;

crate::with_try_from_u8! {
    /// A one-byte operation code.
    #[repr(u8)]
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub enum OpCode {
        /// Push a constant. Operand: 1-byte pool index.
        Constant,
        /// Push a constant. Operand: 3-byte little-endian pool index.
        ConstantLong,
        Add,
        Subtract,
        Multiply,
        Divide,
        Negate,
        Factorial,
        Exponentiate,
        /// Pop the condition; jump forward when it is falsy. Operand: 2-byte little-endian offset.
        BranchIfFalsy,
        /// Jump forward unconditionally. Operand: 2-byte little-endian offset.
        Jump,
        Return,
    }
}

sa::assert_eq_size!(OpCode, u8);

/// A chunk of code, with metadata.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Chunk {
    code: Vec<u8>,
    constants: ValueArray,
    lines: LineTable,
}

/// A valid byte from a chunk. This byte can then be interpreted as required.
#[derive(Clone, Copy)]
pub struct BytecodeEntry<'a> {
    byte: u8,
    provenance: &'a Chunk,
}

/// An [OpCode] that has already been written to the bytestream.
///
/// This opcode can be augmented with an operand.
pub struct WrittenOpcode<'a> {
    line: usize,
    provenance: &'a mut Chunk,
}

/// One decoded instruction, as yielded by [Chunk::instructions()].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Where the opcode byte lives.
    pub offset: usize,
    /// `Err(byte)` when the byte at `offset` is not a valid opcode.
    pub opcode: Result<OpCode, u8>,
}

/// Walks a chunk's bytecode one instruction at a time, stepping over operands.
pub struct Instructions<'a> {
    chunk: &'a Chunk,
    offset: usize,
}

///////////////////////////////////////// Implementation //////////////////////////////////////////

impl OpCode {
    /// How many bytes the instruction takes up, including its operands.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            OpCode::Constant => 2,
            OpCode::ConstantLong => 4,
            OpCode::BranchIfFalsy | OpCode::Jump => 3,
            _ => 1,
        }
    }

    /// The name printed in disassembly listings.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::ConstantLong => "OP_CONSTANT_LONG",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Factorial => "OP_FACTORIAL",
            OpCode::Exponentiate => "OP_EXPONENTIATE",
            OpCode::BranchIfFalsy => "OP_BRANCH_IF_FALSY",
            OpCode::Jump => "OP_JUMP",
            OpCode::Return => "OP_RETURN",
        }
    }
}

impl Chunk {
    /// Return a new, empty [Chunk].
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Get an entry from the bytecode stream.
    ///
    /// Returns `Some(entry)` when the offset is in [0, self.len()).
    pub fn get(&self, offset: usize) -> Option<BytecodeEntry> {
        self.code.get(offset).copied().map(|byte| BytecodeEntry {
            byte,
            provenance: self,
        })
    }

    /// The raw bytecode.
    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The constant pool.
    #[inline]
    pub fn constants(&self) -> &ValueArray {
        &self.constants
    }

    /// The line number table.
    #[inline]
    pub fn lines(&self) -> &LineTable {
        &self.lines
    }

    /// Append a single [OpCode] to the chunk.
    pub fn write_opcode(&mut self, opcode: OpCode, line: usize) -> WrittenOpcode {
        self.write(opcode as u8, line);

        WrittenOpcode {
            line,
            provenance: self,
        }
    }

    /// Adds a constant to the constant pool, and returns its index.
    ///
    /// Returns `None`, leaving the pool untouched, once the pool already holds [MAX_CONSTANTS]
    /// values.
    pub fn add_constant(&mut self, value: Value) -> Option<usize> {
        if self.constants.len() >= MAX_CONSTANTS {
            return None;
        }
        Some(self.constants.write(value))
    }

    /// Adds a constant and writes the instruction that loads it, picking [OpCode::Constant] while
    /// the index fits in one byte and [OpCode::ConstantLong] afterwards.
    ///
    /// Returns the constant's index, or `None` if the constant pool is full.
    ///
    /// ```
    /// # use lox_arith::chunk::{Chunk, OpCode, MAX_SHORT_CONSTANTS};
    /// let mut chunk = Chunk::new();
    /// for i in 0..MAX_SHORT_CONSTANTS {
    ///     chunk.write_constant((i as f64).into(), 1);
    /// }
    /// assert_eq!(2 * MAX_SHORT_CONSTANTS, chunk.len());
    ///
    /// assert_eq!(Some(255), chunk.write_constant(0.5.into(), 1));
    /// let last = chunk.instructions().last().unwrap();
    /// assert_eq!(Ok(OpCode::ConstantLong), last.opcode);
    /// ```
    pub fn write_constant(&mut self, value: Value, line: usize) -> Option<usize> {
        let index = self.add_constant(value)?;
        match u8::try_from(index) {
            Ok(short) if index < MAX_SHORT_CONSTANTS => {
                self.write_opcode(OpCode::Constant, line).with_operand(short)
            }
            _ => self
                .write_opcode(OpCode::ConstantLong, line)
                .with_long_operand(index),
        }
        Some(index)
    }

    /// Decodes the pool index of the constant instruction at `offset`, and looks it up.
    ///
    /// Returns `None` if there is no constant instruction at `offset`, if it is truncated, or if its
    /// index is outside the pool.
    pub fn constant_operand(&self, offset: usize) -> Option<(usize, Value)> {
        let index = match self.get(offset)?.as_opcode()? {
            OpCode::Constant => self.get(offset + 1)?.as_constant_index(),
            OpCode::ConstantLong => self.read_u24(offset + 1)?,
            _ => return None,
        };
        self.constants.get(index).map(|value| (index, value))
    }

    /// Reads a two-byte little-endian operand.
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.code.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a three-byte little-endian operand.
    pub fn read_u24(&self, offset: usize) -> Option<usize> {
        let bytes = self.code.get(offset..offset + 3)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) as usize)
    }

    /// Points the jump whose operand starts at `operand_offset` at the current end of the code.
    ///
    /// Returns the distance jumped, or `None` (leaving the placeholder in place) when the distance
    /// does not fit in the two-byte operand.
    pub fn patch_jump(&mut self, operand_offset: usize) -> Option<u16> {
        let distance = self.code.len().checked_sub(operand_offset + 2)?;
        let distance = u16::try_from(distance).ok()?;
        let [low, high] = distance.to_le_bytes();
        self.code[operand_offset] = low;
        self.code[operand_offset + 1] = high;
        Some(distance)
    }

    /// Returns the line number for whatever is at the given offset.
    pub fn line_number_for(&self, offset: usize) -> Option<usize> {
        self.lines.line_number_for(offset)
    }

    /// Iterates over the instructions in the chunk.
    pub fn instructions(&self) -> Instructions {
        Instructions {
            chunk: self,
            offset: 0,
        }
    }

    /// Returns the length of the byte stream.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if nothing has been appended to the byte stream.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Actually writes to the byte stream.
    fn write(&mut self, payload: u8, line_number: usize) {
        self.code.push(payload);
        self.lines.push(line_number);
    }
}

impl<'a> BytecodeEntry<'a> {
    /// The raw byte.
    #[inline(always)]
    pub fn byte(self) -> u8 {
        self.byte
    }

    /// Returns the byte as an index into the constant pool.
    #[inline(always)]
    pub fn as_constant_index(self) -> usize {
        self.byte as usize
    }

    /// Returns the byte decoded as an [OpCode].
    /// Returns `None` if the byte is not a valid opcode.
    #[inline]
    pub fn as_opcode(self) -> Option<OpCode> {
        self.byte.try_into().ok()
    }

    /// Yanks out a constant from the constant pool, treating this byte as a short index.
    #[inline]
    pub fn resolve_constant(self) -> Option<Value> {
        self.provenance.constants.get(self.as_constant_index())
    }
}

impl<'a> WrittenOpcode<'a> {
    /// Consumes `self` and appends the operand to the byte stream for the last written instruction.
    #[inline]
    pub fn with_operand(self, index: u8) {
        self.provenance.write(index, self.line);
    }

    /// Appends a three-byte little-endian operand. Only the low 24 bits of `index` are kept.
    pub fn with_long_operand(self, index: usize) {
        let [low, middle, high, ..] = index.to_le_bytes();
        for byte in [low, middle, high] {
            self.provenance.write(byte, self.line);
        }
    }

    /// Appends a two-byte jump operand to be filled in later by [Chunk::patch_jump()].
    /// Returns the offset of the operand.
    pub fn with_jump_placeholder(self) -> usize {
        let operand_offset = self.provenance.len();
        self.provenance.write(0xff, self.line);
        self.provenance.write(0xff, self.line);
        operand_offset
    }
}

impl Iterator for Instructions<'_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        let byte = *self.chunk.code.get(self.offset)?;
        let offset = self.offset;
        let opcode = OpCode::try_from(byte);
        self.offset += opcode.map_or(1, OpCode::width);

        Some(Instruction { offset, opcode })
    }
}

impl std::iter::FusedIterator for Instructions<'_> {}
