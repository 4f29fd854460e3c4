//! Routine interpreter.
//!
//! Runs a verified routine body over a value stack, appending output bytes to a
//! buffer. Calls between routines are resolved by name through a
//! [`RoutineSource`], so the same interpreter serves the live container and
//! modules loaded back from artifacts.

use std::sync::Arc;

use crate::error::{ExecError, ExecResult};
use crate::value::Value;

use super::{Instr, Routine};

/// Maximum nesting of routine calls within one invocation.
pub const MAX_CALL_DEPTH: usize = 64;

/// Anything that can resolve routines by name.
pub trait RoutineSource {
    /// Name of the module the routines belong to.
    fn module_name(&self) -> &str;

    /// Look up a finished routine.
    fn resolve(&self, name: &str) -> Option<Arc<Routine>>;
}

/// Invoke `name` from `source` with `args`, returning the bytes it wrote.
pub fn invoke(source: &dyn RoutineSource, name: &str, args: &[Value]) -> ExecResult<Vec<u8>> {
    let routine = source
        .resolve(name)
        .ok_or_else(|| ExecError::UnknownRoutine {
            module: source.module_name().into(),
            name: name.into(),
        })?;
    check_args(&routine, args)?;

    let mut out = Vec::new();
    run(source, &routine, args, &mut out, 0)?;
    Ok(out)
}

fn check_args(routine: &Routine, args: &[Value]) -> ExecResult<()> {
    let params = &routine.signature.params;
    if params.len() != args.len() {
        return Err(ExecError::ArityMismatch {
            routine: routine.name.clone(),
            expected: params.len(),
            actual: args.len(),
        });
    }
    for (index, (param, arg)) in params.iter().zip(args).enumerate() {
        if !param.accepts(arg.kind()) {
            return Err(ExecError::ArgumentKind {
                routine: routine.name.clone(),
                index,
                expected: param.to_string(),
                actual: arg.kind().to_string(),
            });
        }
    }
    Ok(())
}

fn run(
    source: &dyn RoutineSource,
    routine: &Routine,
    args: &[Value],
    out: &mut Vec<u8>,
    depth: usize,
) -> ExecResult<()> {
    let mut stack: Vec<Value> = Vec::new();

    for instr in &routine.body {
        match instr {
            Instr::LoadArg(n) => {
                let arg = args
                    .get(usize::from(*n))
                    .ok_or_else(|| corrupted(routine))?;
                stack.push(arg.clone());
            }
            Instr::Const(value) => stack.push(value.clone()),
            Instr::Field(field) => {
                let value = pop(&mut stack, routine)?;
                let fields = match value {
                    Value::Record(fields) => fields,
                    other => return Err(mismatch(routine, instr, "record", &other)),
                };
                let (_, found) = fields
                    .into_iter()
                    .find(|(k, _)| k == field)
                    .ok_or_else(|| ExecError::MissingField {
                        routine: routine.name.clone(),
                        field: field.clone(),
                    })?;
                stack.push(found);
            }
            Instr::Index(i) => {
                let value = pop(&mut stack, routine)?;
                let mut items = match value {
                    Value::List(items) => items,
                    other => return Err(mismatch(routine, instr, "list", &other)),
                };
                let len = items.len();
                let idx = *i as usize;
                if idx >= len {
                    return Err(ExecError::IndexOutOfRange {
                        routine: routine.name.clone(),
                        index: *i,
                        len,
                    });
                }
                stack.push(items.swap_remove(idx));
            }
            Instr::Dup => {
                let top = stack.last().cloned().ok_or_else(|| corrupted(routine))?;
                stack.push(top);
            }
            Instr::Pop => {
                pop(&mut stack, routine)?;
            }
            Instr::WriteRaw(text) => out.extend_from_slice(text.as_bytes()),
            Instr::WriteNull => out.extend_from_slice(b"null"),
            Instr::WriteBool => match pop(&mut stack, routine)? {
                Value::Bool(b) => write_json(&Value::Bool(b), out),
                other => return Err(mismatch(routine, instr, "bool", &other)),
            },
            Instr::WriteInt => match pop(&mut stack, routine)? {
                Value::Int(i) => write_json(&Value::Int(i), out),
                other => return Err(mismatch(routine, instr, "int", &other)),
            },
            Instr::WriteFloat => match pop(&mut stack, routine)? {
                Value::Float(f) => write_json(&Value::Float(f), out),
                other => return Err(mismatch(routine, instr, "float", &other)),
            },
            Instr::WriteStr => match pop(&mut stack, routine)? {
                Value::Str(s) => write_json_str(&s, out),
                other => return Err(mismatch(routine, instr, "str", &other)),
            },
            Instr::WriteValue => {
                let value = pop(&mut stack, routine)?;
                write_json(&value, out);
            }
            Instr::Call(target) => {
                let value = pop(&mut stack, routine)?;
                call(source, target, &value, out, depth)?;
            }
            Instr::CallOrNull(target) => {
                let value = pop(&mut stack, routine)?;
                if value.is_null() {
                    out.extend_from_slice(b"null");
                } else {
                    call(source, target, &value, out, depth)?;
                }
            }
            Instr::ForEach(target) => {
                let value = pop(&mut stack, routine)?;
                let items = match value {
                    Value::List(items) => items,
                    other => return Err(mismatch(routine, instr, "list", &other)),
                };
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    call(source, target, item, out, depth)?;
                }
                out.push(b']');
            }
        }
    }

    if !stack.is_empty() {
        return Err(corrupted(routine));
    }
    Ok(())
}

fn call(
    source: &dyn RoutineSource,
    target: &str,
    value: &Value,
    out: &mut Vec<u8>,
    depth: usize,
) -> ExecResult<()> {
    if depth + 1 >= MAX_CALL_DEPTH {
        return Err(ExecError::CallDepthExceeded {
            routine: target.into(),
            max_depth: MAX_CALL_DEPTH,
        });
    }
    let callee = source
        .resolve(target)
        .ok_or_else(|| ExecError::UnknownRoutine {
            module: source.module_name().into(),
            name: target.into(),
        })?;
    let args = std::slice::from_ref(value);
    check_args(&callee, args)?;
    run(source, &callee, args, out, depth + 1)
}

fn pop(stack: &mut Vec<Value>, routine: &Routine) -> ExecResult<Value> {
    stack.pop().ok_or_else(|| corrupted(routine))
}

fn corrupted(routine: &Routine) -> ExecError {
    ExecError::CorruptedStack {
        routine: routine.name.clone(),
    }
}

fn mismatch(routine: &Routine, instr: &Instr, expected: &str, found: &Value) -> ExecError {
    ExecError::TypeMismatch {
        routine: routine.name.clone(),
        instr: instr.to_string(),
        expected: expected.into(),
        actual: found.kind().to_string(),
    }
}

/// Append `value` as compact JSON.
pub fn write_json(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => out.extend_from_slice(n.to_string().as_bytes()),
            None => out.extend_from_slice(b"null"),
        },
        Value::Str(s) => write_json_str(s, out),
        Value::List(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_json(item, out);
            }
            out.push(b']');
        }
        Value::Record(fields) => {
            out.push(b'{');
            for (i, (key, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_json_str(key, out);
                out.push(b':');
                write_json(item, out);
            }
            out.push(b'}');
        }
    }
}

fn write_json_str(s: &str, out: &mut Vec<u8>) {
    // serde_json's Display for a string value is infallible and escapes per RFC 8259.
    let escaped = serde_json::Value::from(s).to_string();
    out.extend_from_slice(escaped.as_bytes());
}
