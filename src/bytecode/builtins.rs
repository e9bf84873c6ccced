//! Host functions exposed to programs through `OpGetBuiltin`.
//!
//! The position of a builtin in [`BUILTINS`] is its slot index; compiled
//! code refers to builtins only by that index, so the order is fixed.

use std::rc::Rc;

use crate::bytecode::value::{Builtin, Value};

pub static BUILTINS: [Builtin; 6] = [
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "rest",
        func: builtin_rest,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
];

/// Find a builtin by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn wrong_arguments(got: usize, want: usize) -> Value {
    Value::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    ))
}

fn expect_array<'a>(name: &str, arg: &'a Value) -> Result<&'a Rc<Vec<Value>>, Value> {
    match arg {
        Value::Array(elements) => Ok(elements),
        other => Err(Value::error(format!(
            "argument to `{}` must be ARRAY, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn builtin_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::String(s) => Value::Integer(s.len() as i64),
        Value::Array(elements) => Value::Integer(elements.len() as i64),
        other => Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Null
}

fn builtin_first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match expect_array("first", &args[0]) {
        Ok(elements) => elements.first().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match expect_array("last", &args[0]) {
        Ok(elements) => elements.last().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match expect_array("rest", &args[0]) {
        Ok(elements) if elements.is_empty() => Value::Null,
        Ok(elements) => Value::array(elements[1..].to_vec()),
        Err(err) => err,
    }
}

fn builtin_push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_arguments(args.len(), 2);
    }
    match expect_array("push", &args[0]) {
        Ok(elements) => {
            let mut pushed = Vec::with_capacity(elements.len() + 1);
            pushed.extend(elements.iter().cloned());
            pushed.push(args[1].clone());
            Value::array(pushed)
        }
        Err(err) => err,
    }
}
