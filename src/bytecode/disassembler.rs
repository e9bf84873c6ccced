//! Bytecode disassembler for debugging.

use std::fmt;

use crate::bytecode::chunk::{Bytecode, Instructions};
use crate::bytecode::instruction::decode;
use crate::bytecode::value::Value;
use crate::error::DecodeError;

/// One line per instruction: `0000 OpConstant 1`.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;

        while offset < self.len() {
            match decode(self, offset) {
                Ok(decoded) => {
                    write!(f, "{:04} {}", offset, decoded.opcode.name())?;
                    for operand in &decoded.operands {
                        write!(f, " {}", operand)?;
                    }
                    writeln!(f)?;
                    offset += decoded.width;
                }
                Err(err @ DecodeError::UnknownOpcode { .. }) => {
                    writeln!(f, "ERROR: {}", err)?;
                    offset += 1;
                }
                Err(err @ (DecodeError::Truncated { .. } | DecodeError::OutOfBounds { .. })) => {
                    writeln!(f, "ERROR: {}", err)?;
                    break;
                }
            }
        }

        Ok(())
    }
}

/// The main instruction stream, the constant pool, then every compiled
/// function found in the pool.
impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== <main> ==")?;
        write!(f, "{}", self.instructions)?;

        if !self.constants.is_empty() {
            writeln!(f, "constants:")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "{:5}: {}", i, constant_str(constant))?;
            }
        }

        for (i, constant) in self.constants.iter().enumerate() {
            if let Value::CompiledFunction(function) = constant {
                writeln!(f)?;
                writeln!(
                    f,
                    "== {} [{}] (params: {}, locals: {}) ==",
                    function.name.as_deref().unwrap_or("<fn>"),
                    i,
                    function.num_parameters,
                    function.num_locals
                )?;
                write!(f, "{}", function.instructions)?;
            }
        }

        Ok(())
    }
}

fn constant_str(constant: &Value) -> String {
    match constant {
        Value::String(s) if s.chars().count() > 20 => {
            format!("\"{}...\"", s.chars().take(20).collect::<String>())
        }
        Value::String(s) => format!("\"{}\"", s),
        Value::CompiledFunction(function) => {
            format!("<fn {}>", function.name.as_deref().unwrap_or("anonymous"))
        }
        other => other.to_string(),
    }
}

/// Disassemble a compiled program into human-readable output.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    bytecode.to_string()
}

/// Print disassembly to stdout.
pub fn print_disassembly(bytecode: &Bytecode) {
    print!("{}", bytecode);
}
