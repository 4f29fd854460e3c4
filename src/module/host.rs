//! Host capability detection.
//!
//! Some hosts can write generated modules to stable storage, others can only
//! run them in memory. The answer is resolved once, when a manager is created,
//! and carried as a plain value so both paths can be exercised anywhere.

use crate::module::Capability;

/// What the executing host supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProfile {
    /// Whether modules can be materialized to a filesystem.
    pub persistence: bool,
}

impl HostProfile {
    /// Profile of the current host.
    ///
    /// WebAssembly targets have no general-purpose filesystem; everything else
    /// is assumed to persist.
    pub fn detect() -> Self {
        Self {
            persistence: !cfg!(target_family = "wasm"),
        }
    }

    /// A host that can run generated routines but never save them.
    pub fn in_memory_only() -> Self {
        Self { persistence: false }
    }

    /// A host that supports saving.
    pub fn persistent() -> Self {
        Self { persistence: true }
    }

    /// The capability a module actually gets when `requested` is asked for.
    pub fn resolve(self, requested: Capability) -> Capability {
        match requested {
            Capability::RunAndSave if !self.persistence => Capability::RunOnly,
            other => other,
        }
    }
}

impl Default for HostProfile {
    fn default() -> Self {
        Self::detect()
    }
}
