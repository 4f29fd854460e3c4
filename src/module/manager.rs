//! Module manager: create, hand out, and save one dynamic module.
//!
//! The manager owns exactly one [`DynamicModule`]. Collaborators borrow it
//! through [`DynamicModuleManager::handle`] to define routines; the embedding
//! application decides if and when to [`save`](DynamicModuleManager::save) it.
//!
//! The manager is `Send + Sync` and meant to be built once and shared (e.g.
//! behind an `Arc`) rather than reached through a global.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::artifact::{self, ModuleImage};
use crate::config::ManagerConfig;
use crate::error::{ModuleError, ModuleResult};

use super::{Capability, DynamicModule, HostProfile, ModuleState, validate_module_name};

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Routines included in the snapshot.
    pub routine_count: usize,
    /// Artifact size in bytes.
    pub bytes: u64,
}

/// Owner of one dynamic module.
pub struct DynamicModuleManager {
    module: DynamicModule,
    requested: Capability,
    output_dir: Option<PathBuf>,
    save_count: AtomicUsize,
    last_artifact: RwLock<Option<ArtifactRef>>,
}

impl std::fmt::Debug for DynamicModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicModuleManager")
            .field("module", &self.module)
            .field("requested", &self.requested)
            .field("output_dir", &self.output_dir)
            .field("save_count", &self.save_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl DynamicModuleManager {
    /// Create a manager for the current host.
    ///
    /// If the host cannot persist modules, a `RunAndSave` request quietly
    /// becomes `RunOnly`; see [`requested_capability`](Self::requested_capability).
    pub fn create(name: &str, capability: Capability) -> ModuleResult<Self> {
        Self::with_host(name, capability, HostProfile::detect())
    }

    /// Create a manager for an explicit host profile.
    pub fn with_host(name: &str, capability: Capability, host: HostProfile) -> ModuleResult<Self> {
        Self::build(name, capability, host, None)
    }

    /// Create a manager from configuration for the current host.
    pub fn from_config(config: &ManagerConfig) -> ModuleResult<Self> {
        Self::from_config_with_host(config, HostProfile::detect())
    }

    /// Create a manager from configuration for an explicit host profile.
    pub fn from_config_with_host(config: &ManagerConfig, host: HostProfile) -> ModuleResult<Self> {
        Self::build(
            &config.name,
            config.capability,
            host,
            config.output_dir.clone(),
        )
    }

    fn build(
        name: &str,
        requested: Capability,
        host: HostProfile,
        output_dir: Option<PathBuf>,
    ) -> ModuleResult<Self> {
        validate_module_name(name)?;

        let capability = host.resolve(requested);
        if capability != requested {
            tracing::debug!(
                module = name,
                %requested,
                effective = %capability,
                "host cannot persist modules, falling back to in-memory only"
            );
        }
        tracing::info!(module = name, %capability, "created dynamic module");

        Ok(Self {
            module: DynamicModule::new(name, capability),
            requested,
            output_dir,
            save_count: AtomicUsize::new(0),
            last_artifact: RwLock::new(None),
        })
    }

    /// The module collaborators define routines in.
    pub fn handle(&self) -> &DynamicModule {
        &self.module
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Capability the module actually has.
    pub fn capability(&self) -> Capability {
        self.module.capability()
    }

    /// Capability asked for at construction, before host fallback.
    pub fn requested_capability(&self) -> Capability {
        self.requested
    }

    /// Configured output directory; `None` means the current directory.
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Path [`save`](Self::save) writes to.
    pub fn artifact_path(&self) -> PathBuf {
        let file_name = artifact::artifact_file_name(self.name());
        match &self.output_dir {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    pub fn state(&self) -> ModuleState {
        if self.save_count() > 0 {
            ModuleState::Saved
        } else {
            ModuleState::Active
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::Acquire)
    }

    /// The most recent successful save, if any.
    pub fn last_artifact(&self) -> Option<ArtifactRef> {
        self.last_artifact
            .read()
            .expect("last_artifact lock poisoned")
            .clone()
    }

    /// Snapshot every finished routine to [`artifact_path`](Self::artifact_path).
    ///
    /// Each call writes a complete snapshot and replaces any earlier artifact.
    /// Blocks on filesystem I/O.
    ///
    /// Routines finished by other threads while the save runs may or may not
    /// be included (see [`DynamicModule::snapshot`]). Quiesce definition first
    /// when the artifact must match an exact set of routines.
    pub fn save(&self) -> ModuleResult<ArtifactRef> {
        self.save_to(&self.artifact_path())
    }

    /// Like [`save`](Self::save), but into `dir` instead of the configured location.
    pub fn save_in(&self, dir: &Path) -> ModuleResult<ArtifactRef> {
        self.save_to(&dir.join(artifact::artifact_file_name(self.name())))
    }

    fn save_to(&self, path: &Path) -> ModuleResult<ArtifactRef> {
        if !self.capability().can_save() {
            return Err(ModuleError::UnsupportedOperation {
                module: self.name().to_string(),
            });
        }

        let image = ModuleImage::from_module(&self.module);
        let bytes = image.encode().map_err(|e| ModuleError::Encode {
            module: self.name().to_string(),
            message: e.to_string(),
        })?;

        if let Err(source) = artifact::write_atomic(path, &bytes) {
            tracing::warn!(
                module = self.name(),
                path = %path.display(),
                error = %source,
                "failed to save module"
            );
            return Err(ModuleError::StorageFailure {
                path: path.display().to_string(),
                source,
            });
        }

        let saved = ArtifactRef {
            path: path.to_path_buf(),
            routine_count: image.routines.len(),
            bytes: bytes.len() as u64,
        };
        *self
            .last_artifact
            .write()
            .expect("last_artifact lock poisoned") = Some(saved.clone());
        self.save_count.fetch_add(1, Ordering::Release);

        tracing::info!(
            module = self.name(),
            path = %path.display(),
            routines = saved.routine_count,
            bytes = saved.bytes,
            "saved module"
        );
        Ok(saved)
    }
}
