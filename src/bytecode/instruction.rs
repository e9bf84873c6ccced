//! Instruction set: opcodes, operand layout, encoding and decoding.
//!
//! An instruction is one opcode byte followed by its operands, each stored
//! big-endian in a width fixed by the opcode's [`Definition`].

use crate::error::DecodeError;

/// Bytecode instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ============ Constants & Literals ============
    /// Push a constant from the pool: CONSTANT <index:u16>
    Constant = 0,
    /// Push true
    True,
    /// Push false
    False,
    /// Push null
    Null,
    /// Discard the top of the stack
    Pop,

    // ============ Arithmetic ============
    Add,
    Sub,
    Mul,
    Div,

    // ============ Comparison ============
    Equal,
    NotEqual,
    GreaterThan,

    // ============ Unary ============
    /// Numeric negation
    Minus,
    /// Boolean negation
    Bang,

    // ============ Control Flow ============
    /// Jump to an absolute offset if the popped value is falsy: JUMP_NOT_TRUTHY <target:u16>
    JumpNotTruthy,
    /// Jump to an absolute offset: JUMP <target:u16>
    Jump,

    // ============ Bindings ============
    /// GET_GLOBAL <index:u16>
    GetGlobal,
    /// SET_GLOBAL <index:u16>
    SetGlobal,
    /// GET_LOCAL <index:u8>
    GetLocal,
    /// SET_LOCAL <index:u8>
    SetLocal,
    /// GET_BUILTIN <index:u8>
    GetBuiltin,
    /// Push a captured value of the running closure: GET_FREE <index:u8>
    GetFree,
    /// Push the running closure itself
    CurrentClosure,

    // ============ Collections ============
    /// Build an array from the top N values: ARRAY <count:u16>
    Array,
    /// Build a hash from the top 2N values: HASH <pairs:u16>
    Hash,
    /// container[key]
    Index,

    // ============ Functions & Calls ============
    /// CALL <arg_count:u8>
    Call,
    /// Return the top of the stack to the caller
    ReturnValue,
    /// Return null to the caller
    Return,
    /// Wrap a compiled function and N captured values: CLOSURE <const:u16> <free:u8>
    Closure,
}

/// Name and operand widths of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl OpCode {
    /// Every opcode, in byte order.
    pub const ALL: [OpCode; 30] = [
        OpCode::Constant,
        OpCode::True,
        OpCode::False,
        OpCode::Null,
        OpCode::Pop,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Equal,
        OpCode::NotEqual,
        OpCode::GreaterThan,
        OpCode::Minus,
        OpCode::Bang,
        OpCode::JumpNotTruthy,
        OpCode::Jump,
        OpCode::GetGlobal,
        OpCode::SetGlobal,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetBuiltin,
        OpCode::GetFree,
        OpCode::CurrentClosure,
        OpCode::Array,
        OpCode::Hash,
        OpCode::Index,
        OpCode::Call,
        OpCode::ReturnValue,
        OpCode::Return,
        OpCode::Closure,
    ];

    pub fn definition(self) -> Definition {
        let (name, operand_widths): (&'static str, &'static [usize]) = match self {
            OpCode::Constant => ("OpConstant", &[2]),
            OpCode::True => ("OpTrue", &[]),
            OpCode::False => ("OpFalse", &[]),
            OpCode::Null => ("OpNull", &[]),
            OpCode::Pop => ("OpPop", &[]),
            OpCode::Add => ("OpAdd", &[]),
            OpCode::Sub => ("OpSub", &[]),
            OpCode::Mul => ("OpMul", &[]),
            OpCode::Div => ("OpDiv", &[]),
            OpCode::Equal => ("OpEqual", &[]),
            OpCode::NotEqual => ("OpNotEqual", &[]),
            OpCode::GreaterThan => ("OpGreaterThan", &[]),
            OpCode::Minus => ("OpMinus", &[]),
            OpCode::Bang => ("OpBang", &[]),
            OpCode::JumpNotTruthy => ("OpJumpNotTruthy", &[2]),
            OpCode::Jump => ("OpJump", &[2]),
            OpCode::GetGlobal => ("OpGetGlobal", &[2]),
            OpCode::SetGlobal => ("OpSetGlobal", &[2]),
            OpCode::GetLocal => ("OpGetLocal", &[1]),
            OpCode::SetLocal => ("OpSetLocal", &[1]),
            OpCode::GetBuiltin => ("OpGetBuiltin", &[1]),
            OpCode::GetFree => ("OpGetFree", &[1]),
            OpCode::CurrentClosure => ("OpCurrentClosure", &[]),
            OpCode::Array => ("OpArray", &[2]),
            OpCode::Hash => ("OpHash", &[2]),
            OpCode::Index => ("OpIndex", &[]),
            OpCode::Call => ("OpCall", &[1]),
            OpCode::ReturnValue => ("OpReturnValue", &[]),
            OpCode::Return => ("OpReturn", &[]),
            OpCode::Closure => ("OpClosure", &[2, 1]),
        };
        Definition {
            name,
            operand_widths,
        }
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    /// Total operand bytes following the opcode.
    pub fn operand_size(self) -> usize {
        self.definition().operand_widths.iter().sum()
    }

    /// Convert from u8 to OpCode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        Self::ALL.get(byte as usize).copied()
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

/// Encode one instruction. Operands are truncated to their declared width.
pub fn make(op: OpCode, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();
    let mut instruction = Vec::with_capacity(1 + op.operand_size());
    instruction.push(op as u8);

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => {}
        }
    }

    instruction
}

/// Read a big-endian u16 at `offset`.
pub fn read_u16(code: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([code[offset], code[offset + 1]])
}

pub fn read_u8(code: &[u8], offset: usize) -> u8 {
    code[offset]
}

/// Decode the operands of `def` from the start of `code`.
///
/// Returns the operands and the number of bytes read, or `None` when `code`
/// is too short.
pub fn read_operands(def: &Definition, code: &[u8]) -> Option<(Vec<usize>, usize)> {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for width in def.operand_widths {
        if offset + width > code.len() {
            return None;
        }
        match width {
            2 => operands.push(read_u16(code, offset) as usize),
            1 => operands.push(read_u8(code, offset) as usize),
            _ => {}
        }
        offset += width;
    }

    Some((operands, offset))
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: OpCode,
    pub operands: Vec<usize>,
    /// Opcode byte plus operand bytes.
    pub width: usize,
}

/// Decode the instruction starting at `offset`.
pub fn decode(code: &[u8], offset: usize) -> Result<Decoded, DecodeError> {
    let byte = *code.get(offset).ok_or(DecodeError::OutOfBounds {
        offset,
        len: code.len(),
    })?;
    let opcode = OpCode::from_u8(byte).ok_or(DecodeError::UnknownOpcode { byte, offset })?;
    let def = opcode.definition();
    let (operands, read) =
        read_operands(&def, &code[offset + 1..]).ok_or(DecodeError::Truncated {
            name: def.name,
            offset,
        })?;

    Ok(Decoded {
        opcode,
        operands,
        width: 1 + read,
    })
}
