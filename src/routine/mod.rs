//! Generated conversion routines.
//!
//! A routine is a verified program over a small stack-machine instruction set.
//! Collaborators that inspect data shapes emit [`Instr`]s through a
//! [`RoutineBuilder`]; once finished, the routine is immutable and can be
//! invoked by name through the module that holds it.
//!
//! Every instruction has a fixed stack effect, so a body is checked once at
//! `finish()` time (and again when an artifact is loaded) instead of on every
//! invocation.

pub mod builder;
pub mod exec;

use serde::{Deserialize, Serialize};

use crate::error::{RoutineError, RoutineResult};
use crate::value::{Value, ValueKind};

pub use builder::RoutineBuilder;
pub use exec::RoutineSource;

/// Parameter kinds a routine accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineSignature {
    pub params: Vec<ValueKind>,
}

impl RoutineSignature {
    pub fn new(params: impl Into<Vec<ValueKind>>) -> Self {
        Self {
            params: params.into(),
        }
    }

    /// Signature of a routine converting a single value of `kind`.
    pub fn unary(kind: ValueKind) -> Self {
        Self { params: vec![kind] }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Display for RoutineSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, kind) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{kind}")?;
        }
        write!(f, ")")
    }
}

/// One instruction of a routine body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Push a copy of argument `n`.
    LoadArg(u16),
    /// Push a constant.
    Const(Value),
    /// Pop a record, push the named field.
    Field(String),
    /// Pop a list, push the element at the index.
    Index(u32),
    Dup,
    Pop,
    /// Append literal text to the output.
    WriteRaw(String),
    WriteNull,
    /// Pop a bool and write it.
    WriteBool,
    /// Pop an int and write it.
    WriteInt,
    /// Pop a float and write it. Non-finite floats are written as `null`.
    WriteFloat,
    /// Pop a string and write it as an escaped JSON string.
    WriteStr,
    /// Pop any value and write it as JSON.
    WriteValue,
    /// Pop a value and pass it to the named routine.
    Call(String),
    /// Like [`Instr::Call`], but writes `null` for a null value.
    CallOrNull(String),
    /// Pop a list and write `[a,b,...]`, converting each element with the named routine.
    ForEach(String),
}

impl Instr {
    /// Stack effect as `(pops, pushes)`.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Self::LoadArg(_) | Self::Const(_) => (0, 1),
            Self::Field(_) | Self::Index(_) => (1, 1),
            Self::Dup => (1, 2),
            Self::Pop => (1, 0),
            Self::WriteRaw(_) | Self::WriteNull => (0, 0),
            Self::WriteBool
            | Self::WriteInt
            | Self::WriteFloat
            | Self::WriteStr
            | Self::WriteValue => (1, 0),
            Self::Call(_) | Self::CallOrNull(_) | Self::ForEach(_) => (1, 0),
        }
    }

    /// Name of the routine this instruction calls, if any.
    pub fn call_target(&self) -> Option<&str> {
        match self {
            Self::Call(name) | Self::CallOrNull(name) | Self::ForEach(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadArg(n) => write!(f, "load_arg {n}"),
            Self::Const(v) => write!(f, "const {v:?}"),
            Self::Field(name) => write!(f, "field {name:?}"),
            Self::Index(i) => write!(f, "index {i}"),
            Self::Dup => write!(f, "dup"),
            Self::Pop => write!(f, "pop"),
            Self::WriteRaw(text) => write!(f, "write_raw {text:?}"),
            Self::WriteNull => write!(f, "write_null"),
            Self::WriteBool => write!(f, "write_bool"),
            Self::WriteInt => write!(f, "write_int"),
            Self::WriteFloat => write!(f, "write_float"),
            Self::WriteStr => write!(f, "write_str"),
            Self::WriteValue => write!(f, "write_value"),
            Self::Call(name) => write!(f, "call {name}"),
            Self::CallOrNull(name) => write!(f, "call_or_null {name}"),
            Self::ForEach(name) => write!(f, "for_each {name}"),
        }
    }
}

/// A finished, verified routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub signature: RoutineSignature,
    pub body: Vec<Instr>,
    /// Position in the module's definition order.
    pub ordinal: u32,
}

impl Routine {
    /// Re-run body verification, e.g. after decoding from an artifact.
    pub fn verify(&self) -> RoutineResult<()> {
        verify_body(&self.name, &self.signature, &self.body)
    }
}

/// Check that a routine name is usable: non-empty ASCII identifier characters.
pub fn validate_routine_name(name: &str) -> RoutineResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'));
    if valid {
        Ok(())
    } else {
        Err(RoutineError::InvalidName { name: name.into() })
    }
}

/// Verify a routine body against its signature.
///
/// Simulates stack depth through the body: it must never underflow and must be
/// zero at the end. Argument loads must stay within the signature's arity.
pub fn verify_body(name: &str, signature: &RoutineSignature, body: &[Instr]) -> RoutineResult<()> {
    if body.is_empty() {
        return Err(RoutineError::EmptyBody { name: name.into() });
    }

    let mut depth = 0usize;
    for (at, instr) in body.iter().enumerate() {
        if let Instr::LoadArg(index) = instr {
            if usize::from(*index) >= signature.arity() {
                return Err(RoutineError::ArgumentOutOfRange {
                    name: name.into(),
                    at,
                    index: *index,
                    arity: signature.arity(),
                });
            }
        }

        let (pops, pushes) = instr.stack_effect();
        depth = depth
            .checked_sub(pops)
            .ok_or_else(|| RoutineError::StackUnderflow {
                name: name.into(),
                at,
                instr: instr.to_string(),
            })?;
        depth += pushes;
    }

    if depth != 0 {
        return Err(RoutineError::UnbalancedStack {
            name: name.into(),
            depth,
        });
    }
    Ok(())
}
