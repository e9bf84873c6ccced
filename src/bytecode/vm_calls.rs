//! Function call dispatch for the VM.

use std::rc::Rc;

use crate::bytecode::frame::Frame;
use crate::bytecode::value::{Builtin, Closure, Value};
use crate::bytecode::vm::{Vm, VmResult, MAX_FRAMES, STACK_SIZE};
use crate::error::RuntimeError;

impl Vm {
    /// Call the value sitting below `argc` arguments on the stack.
    pub(crate) fn execute_call(&mut self, argc: usize) -> VmResult<()> {
        if argc >= self.sp {
            return Err(RuntimeError::StackUnderflow);
        }
        let callee = self.stack[self.sp - 1 - argc].clone();

        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Builtin(builtin) => self.call_builtin(builtin, argc),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> VmResult<()> {
        let func = &closure.func;
        if argc != func.num_parameters {
            return Err(RuntimeError::wrong_arity(func.num_parameters, argc));
        }
        if self.depth() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow(MAX_FRAMES));
        }

        let base_pointer = self.sp - argc;
        let locals_end = base_pointer + func.num_locals.max(argc);
        if locals_end > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        // Slots past the arguments may hold values from earlier calls.
        for slot in &mut self.stack[self.sp..locals_end] {
            *slot = Value::Null;
        }

        let caller = std::mem::replace(&mut self.frame, Frame::new(closure, base_pointer));
        self.frames.push(caller);
        self.sp = locals_end;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static Builtin, argc: usize) -> VmResult<()> {
        let args_start = self.sp - argc;
        let result = (builtin.func)(&self.stack[args_start..self.sp]);
        // Drop the arguments and the builtin itself.
        self.sp = args_start - 1;
        self.push(result)
    }

    /// Pop the current frame, discard its callee and locals and push `value`
    /// for the caller.
    pub(crate) fn return_from_frame(&mut self, value: Value) -> VmResult<()> {
        let caller = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
        let finished = std::mem::replace(&mut self.frame, caller);
        self.sp = finished.base_pointer.saturating_sub(1);
        self.push(value)
    }
}
