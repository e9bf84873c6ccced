//! Instruction streams and the compiled bytecode artifact.

use std::ops::Deref;

use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::Value;

/// A flat sequence of encoded instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions {
    /// The raw bytes.
    pub code: Vec<u8>,
}

impl Instructions {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Append an encoded instruction, returning the offset it starts at.
    pub fn write(&mut self, instruction: &[u8]) -> usize {
        let position = self.code.len();
        self.code.extend_from_slice(instruction);
        position
    }

    /// Overwrite the bytes at `position` in place.
    pub fn replace(&mut self, position: usize, instruction: &[u8]) {
        self.code[position..position + instruction.len()].copy_from_slice(instruction);
    }

    pub fn truncate(&mut self, len: usize) {
        self.code.truncate(len);
    }

    pub fn opcode_at(&self, position: usize) -> Option<OpCode> {
        self.code.get(position).copied().and_then(OpCode::from_u8)
    }
}

impl Deref for Instructions {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.code
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(code: Vec<u8>) -> Self {
        Self { code }
    }
}

impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self {
            code: iter.into_iter().flatten().collect(),
        }
    }
}

/// Output of compilation: the top-level instruction stream and its constant pool.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::make;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_and_replace() {
        let mut ins = Instructions::new();
        assert_eq!(ins.write(&make(OpCode::True, &[])), 0);
        let jump = ins.write(&make(OpCode::Jump, &[9999]));
        assert_eq!(jump, 1);
        ins.replace(jump, &make(OpCode::Jump, &[4]));
        assert_eq!(&ins[..], &[OpCode::True as u8, OpCode::Jump as u8, 0, 4][..]);
        assert_eq!(ins.opcode_at(1), Some(OpCode::Jump));
    }

    #[test]
    fn test_collect_concatenates() {
        let ins: Instructions = vec![make(OpCode::Add, &[]), make(OpCode::Constant, &[2])]
            .into_iter()
            .collect();
        assert_eq!(ins.code, vec![OpCode::Add as u8, OpCode::Constant as u8, 0, 2]);
    }
}
