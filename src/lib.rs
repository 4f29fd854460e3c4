// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # dynmod
//!
//! A dynamic module manager: one named, writable container into which a
//! serialization layer generates conversion routines at runtime, one per
//! observed data shape, with an optional on-disk snapshot for inspection or
//! reuse.
//!
//! ## Architecture
//!
//! - **Module** (`module`): the container, its capability, and the manager that owns it
//! - **Routines** (`routine`): verified stack-machine programs and their interpreter
//! - **Artifacts** (`artifact`): `<name>.dmod` snapshots, written atomically, loadable standalone
//! - **Config** (`config`): TOML manager configuration
//!
//! ## Library usage
//!
//! ```no_run
//! use dynmod::module::{Capability, DynamicModuleManager};
//! use dynmod::routine::{Instr, RoutineSignature};
//! use dynmod::value::{Value, ValueKind};
//!
//! let manager = DynamicModuleManager::create("Converters", Capability::RunAndSave).unwrap();
//!
//! let mut encode = manager
//!     .handle()
//!     .define_routine("EncodePoint", RoutineSignature::unary(ValueKind::Record))
//!     .unwrap();
//! encode.emit_all([
//!     Instr::WriteRaw("{\"x\":".into()),
//!     Instr::LoadArg(0),
//!     Instr::Field("x".into()),
//!     Instr::WriteInt,
//!     Instr::WriteRaw("}".into()),
//! ]);
//! encode.finish().unwrap();
//!
//! let point = Value::record([("x", Value::Int(7))]);
//! let json = manager.handle().invoke("EncodePoint", &[point]).unwrap();
//! assert_eq!(json, br#"{"x":7}"#);
//!
//! manager.save().unwrap(); // writes ./Converters.dmod
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod module;
pub mod routine;
pub mod value;
