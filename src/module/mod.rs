//! The dynamic module: a named, writable container of generated routines.
//!
//! A [`DynamicModule`] is owned by a [`DynamicModuleManager`] and borrowed by
//! the collaborators that generate routines into it. Routines are only ever
//! added; there is no removal API. The module's capability is fixed when it is
//! created.

pub mod host;
pub mod manager;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::error::{ExecResult, ModuleError, ModuleResult, RoutineError, RoutineResult};
use crate::routine::exec::{self, RoutineSource};
use crate::routine::{Instr, Routine, RoutineBuilder, RoutineSignature, validate_routine_name};
use crate::value::Value;

pub use host::HostProfile;
pub use manager::{ArtifactRef, DynamicModuleManager};

/// Longest accepted module name, in bytes.
pub const MAX_MODULE_NAME_LEN: usize = 128;

/// What a module can do besides running its routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Routines run in memory only.
    #[default]
    RunOnly,
    /// Routines run in memory and the module can be saved as an artifact.
    RunAndSave,
}

impl Capability {
    pub fn can_save(self) -> bool {
        self == Self::RunAndSave
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunOnly => write!(f, "run-only"),
            Self::RunAndSave => write!(f, "run-and-save"),
        }
    }
}

/// Lifecycle marker of a module.
///
/// `Saved` is not terminal: the module stays open for definitions, the state
/// only records that at least one artifact has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    Active,
    Saved,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Saved => write!(f, "Saved"),
        }
    }
}

/// Check that `name` works both as a module identity and as a file base name.
pub fn validate_module_name(name: &str) -> ModuleResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty".to_string())
    } else if name.len() > MAX_MODULE_NAME_LEN {
        Some(format!("name is longer than {MAX_MODULE_NAME_LEN} bytes"))
    } else if name.starts_with('.') {
        Some("name starts with '.'".to_string())
    } else {
        name.chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
            .map(|c| format!("character {c:?} is not allowed"))
    };

    match reason {
        Some(reason) => Err(ModuleError::InvalidName {
            name: name.into(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Container of finished routines.
pub struct DynamicModule {
    name: String,
    capability: Capability,
    routines: DashMap<String, Arc<Routine>>,
    next_ordinal: AtomicU32,
}

impl std::fmt::Debug for DynamicModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicModule")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("routines", &self.routines.len())
            .finish()
    }
}

impl DynamicModule {
    pub(crate) fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            routines: DashMap::new(),
            next_ordinal: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective capability of this module.
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Start defining a new routine.
    ///
    /// The name is checked against finished routines now and again at
    /// `finish()`, so two builders racing on one name end with a single winner.
    pub fn define_routine(
        &self,
        name: impl Into<String>,
        signature: RoutineSignature,
    ) -> RoutineResult<RoutineBuilder<'_>> {
        let name = name.into();
        validate_routine_name(&name)?;
        if self.routines.contains_key(&name) {
            return Err(RoutineError::DuplicateRoutine {
                module: self.name.clone(),
                name,
            });
        }
        Ok(RoutineBuilder::new(self, name, signature))
    }

    pub(crate) fn publish(
        &self,
        name: String,
        signature: RoutineSignature,
        body: Vec<Instr>,
    ) -> RoutineResult<Arc<Routine>> {
        match self.routines.entry(name) {
            Entry::Occupied(entry) => Err(RoutineError::DuplicateRoutine {
                module: self.name.clone(),
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
                let routine = Arc::new(Routine {
                    name: entry.key().clone(),
                    signature,
                    body,
                    ordinal,
                });
                tracing::debug!(
                    module = %self.name,
                    routine = routine.name.as_str(),
                    ordinal,
                    instructions = routine.body.len(),
                    "routine defined"
                );
                entry.insert(Arc::clone(&routine));
                Ok(routine)
            }
        }
    }

    /// Look up a finished routine.
    pub fn routine(&self, name: &str) -> Option<Arc<Routine>> {
        self.routines.get(name).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routines.contains_key(name)
    }

    /// Number of finished routines.
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Finished routines in definition order.
    ///
    /// The table is walked one shard at a time, so this is not a point-in-time
    /// view while other threads are calling `finish()`. A routine finished during
    /// the walk may be missing even though a later one is present, leaving a gap
    /// in the ordinals. With no concurrent definitions the result is exact and
    /// its ordinals run `0..len`.
    pub fn snapshot(&self) -> Vec<Arc<Routine>> {
        let mut routines: Vec<Arc<Routine>> = self
            .routines
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        routines.sort_by_key(|r| r.ordinal);
        routines
    }

    /// Names of finished routines in definition order.
    pub fn routine_names(&self) -> Vec<String> {
        self.snapshot().iter().map(|r| r.name.clone()).collect()
    }

    /// Run a routine and return the bytes it wrote.
    pub fn invoke(&self, name: &str, args: &[Value]) -> ExecResult<Vec<u8>> {
        exec::invoke(self, name, args)
    }
}

impl RoutineSource for DynamicModule {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, name: &str) -> Option<Arc<Routine>> {
        self.routine(name)
    }
}
