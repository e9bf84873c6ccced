//! Call frames.

use std::rc::Rc;

use crate::bytecode::chunk::Instructions;
use crate::bytecode::value::Closure;

/// One activation of a closure.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Offset of the instruction being executed; -1 before the first fetch.
    pub ip: isize,
    /// Stack index of the first local slot.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}
