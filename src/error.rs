//! Rich diagnostic error types for dynmod.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for dynmod.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum DynModError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Routine(#[from] RoutineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Module errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ModuleError {
    #[error("invalid module name \"{name}\": {reason}")]
    #[diagnostic(
        code(dynmod::module::invalid_name),
        help(
            "Module names double as artifact file names. Use 1-128 ASCII letters, \
             digits, '_', '-' or '.', and do not start the name with '.'."
        )
    )]
    InvalidName { name: String, reason: String },

    #[error("module \"{module}\" was created run-only and cannot be saved")]
    #[diagnostic(
        code(dynmod::module::unsupported_operation),
        help(
            "Construct the manager with Capability::RunAndSave to persist generated \
             routines. If you did, the host cannot persist code containers and the \
             manager fell back to run-only; check `requested_capability()`."
        )
    )]
    UnsupportedOperation { module: String },

    #[error("failed to write artifact {path}: {source}")]
    #[diagnostic(
        code(dynmod::module::storage_failure),
        help(
            "Check that the output directory exists, is writable, and that the disk \
             is not full. No partial artifact was left behind and the module is \
             still usable."
        )
    )]
    StorageFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode module \"{module}\": {message}")]
    #[diagnostic(
        code(dynmod::module::encode),
        help("The module image could not be serialized. This is a bug; please report it.")
    )]
    Encode { module: String, message: String },
}

// ---------------------------------------------------------------------------
// Routine definition errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RoutineError {
    #[error("invalid routine name \"{name}\"")]
    #[diagnostic(
        code(dynmod::routine::invalid_name),
        help("Routine names must be non-empty and use ASCII letters, digits, '_', '.' or '$'.")
    )]
    InvalidName { name: String },

    #[error("routine \"{name}\" is already defined in module \"{module}\"")]
    #[diagnostic(
        code(dynmod::routine::duplicate),
        help(
            "Each routine name can be defined once per module and routines are never \
             removed. Generate a distinct name per data shape."
        )
    )]
    DuplicateRoutine { module: String, name: String },

    #[error("routine \"{name}\" has an empty body")]
    #[diagnostic(
        code(dynmod::routine::empty_body),
        help("Emit at least one instruction before calling `finish()`.")
    )]
    EmptyBody { name: String },

    #[error("routine \"{name}\": instruction {at} reads argument {index} but the signature has {arity}")]
    #[diagnostic(
        code(dynmod::routine::bad_argument),
        help("`LoadArg` indices must be below the number of parameters in the signature.")
    )]
    ArgumentOutOfRange {
        name: String,
        at: usize,
        index: u16,
        arity: usize,
    },

    #[error("routine \"{name}\": stack underflow at instruction {at} ({instr})")]
    #[diagnostic(
        code(dynmod::routine::stack_underflow),
        help("The instruction consumes more values than the routine has pushed so far.")
    )]
    StackUnderflow { name: String, at: usize, instr: String },

    #[error("routine \"{name}\" leaves {depth} value(s) on the stack")]
    #[diagnostic(
        code(dynmod::routine::unbalanced_stack),
        help("Every pushed value must be written, passed to a call, or popped before the routine ends.")
    )]
    UnbalancedStack { name: String, depth: usize },
}

// ---------------------------------------------------------------------------
// Execution errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    #[error("routine not found in module \"{module}\": {name}")]
    #[diagnostic(
        code(dynmod::exec::unknown_routine),
        help("No finished routine with this name exists in the module. Define and finish it first.")
    )]
    UnknownRoutine { module: String, name: String },

    #[error("routine \"{routine}\" takes {expected} argument(s), got {actual}")]
    #[diagnostic(
        code(dynmod::exec::arity),
        help("Pass exactly one argument per parameter in the routine's signature.")
    )]
    ArityMismatch {
        routine: String,
        expected: usize,
        actual: usize,
    },

    #[error("routine \"{routine}\" parameter {index} expects {expected}, got {actual}")]
    #[diagnostic(
        code(dynmod::exec::argument_kind),
        help("The argument's kind does not match the routine's signature.")
    )]
    ArgumentKind {
        routine: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("routine \"{routine}\": {instr} expects {expected}, found {actual}")]
    #[diagnostic(
        code(dynmod::exec::type_mismatch),
        help(
            "The value shape seen at run time differs from the shape the routine was \
             generated for. Regenerate the routine for this data shape."
        )
    )]
    TypeMismatch {
        routine: String,
        instr: String,
        expected: String,
        actual: String,
    },

    #[error("routine \"{routine}\": record has no field \"{field}\"")]
    #[diagnostic(
        code(dynmod::exec::missing_field),
        help("The record passed in lacks a field the routine reads.")
    )]
    MissingField { routine: String, field: String },

    #[error("routine \"{routine}\": index {index} out of range for list of length {len}")]
    #[diagnostic(code(dynmod::exec::index_out_of_range))]
    IndexOutOfRange {
        routine: String,
        index: u32,
        len: usize,
    },

    #[error("call depth exceeded maximum of {max_depth} while invoking \"{routine}\"")]
    #[diagnostic(
        code(dynmod::exec::call_depth),
        help(
            "Routines call each other too deeply. Check for a routine that calls itself \
             on a value that never shrinks."
        )
    )]
    CallDepthExceeded { routine: String, max_depth: usize },

    #[error("routine \"{routine}\" ended with a corrupted stack")]
    #[diagnostic(
        code(dynmod::exec::corrupted_stack),
        help("The routine body does not match its verification. This is a bug; please report it.")
    )]
    CorruptedStack { routine: String },
}

// ---------------------------------------------------------------------------
// Artifact errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ArtifactError {
    #[error("cannot read artifact {path}: {source}")]
    #[diagnostic(
        code(dynmod::artifact::io),
        help("Check that the artifact path exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a dynmod artifact")]
    #[diagnostic(
        code(dynmod::artifact::bad_magic),
        help("Artifacts start with the bytes `DMOD`. The file is truncated or of another format.")
    )]
    BadMagic { path: String },

    #[error("{path} uses artifact format version {found}, supported: {supported}")]
    #[diagnostic(
        code(dynmod::artifact::version),
        help("Regenerate the artifact with this version of dynmod.")
    )]
    UnsupportedVersion {
        path: String,
        found: u16,
        supported: u16,
    },

    #[error("cannot decode artifact {path}: {message}")]
    #[diagnostic(
        code(dynmod::artifact::decode),
        help("The artifact payload is corrupt. Save the module again.")
    )]
    Decode { path: String, message: String },

    #[error("artifact {path} contains an invalid routine")]
    #[diagnostic(code(dynmod::artifact::invalid_routine))]
    InvalidRoutine {
        path: String,
        #[source]
        #[diagnostic_source]
        source: RoutineError,
    },

    #[error("artifact {path} defines routine \"{name}\" more than once")]
    #[diagnostic(code(dynmod::artifact::duplicate_routine))]
    DuplicateRoutine { path: String, name: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    #[diagnostic(
        code(dynmod::config::io),
        help("Check that the configuration file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {message}")]
    #[diagnostic(
        code(dynmod::config::parse),
        help(
            "The manager config is TOML with keys `name` (required), \
             `capability` (\"run-only\" or \"run-and-save\") and `output_dir`."
        )
    )]
    Parse { message: String },
}

/// Convenience alias for functions returning dynmod results.
pub type DynModResult<T> = std::result::Result<T, DynModError>;

/// Result type for module lifecycle operations.
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

/// Result type for routine definition.
pub type RoutineResult<T> = std::result::Result<T, RoutineError>;

/// Result type for routine invocation.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Result type for artifact loading.
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
