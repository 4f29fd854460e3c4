//! Saved module artifacts.
//!
//! An artifact is a snapshot of every finished routine in a module, written as
//! `<name>.dmod`:
//!
//! | Offset | Size | Content |
//! |---|---|---|
//! | 0 | 4 | magic `DMOD` |
//! | 4 | 2 | format version (little-endian) |
//! | 6 | n | bincode-encoded [`ModuleImage`] |
//!
//! Artifacts are written to a temporary file next to the target and renamed
//! into place, so readers never observe a truncated artifact.
//! [`LoadedModule`] reads one back and runs its routines without a manager.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bincode::Options;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{ArtifactError, ArtifactResult, DynModResult, ExecResult};
use crate::module::DynamicModule;
use crate::routine::Routine;
use crate::routine::exec::{self, RoutineSource};
use crate::value::Value;

/// File extension of saved modules.
pub const ARTIFACT_EXTENSION: &str = "dmod";

/// Leading bytes of every artifact.
pub const MAGIC: &[u8; 4] = b"DMOD";

/// Current artifact format version.
pub const FORMAT_VERSION: u16 = 1;

/// Largest payload `decode` will read.
pub const MAX_ARTIFACT_BYTES: u64 = 64 * 1024 * 1024;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Same wire layout as `bincode::serialize`, bounded for reading.
fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_ARTIFACT_BYTES)
}

/// `<name>.dmod`
pub fn artifact_file_name(module_name: &str) -> String {
    format!("{module_name}.{ARTIFACT_EXTENSION}")
}

/// The serialized contents of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleImage {
    pub name: String,
    /// Routines in definition order.
    pub routines: Vec<Routine>,
}

impl ModuleImage {
    /// Snapshot the finished routines of `module`.
    pub fn from_module(module: &DynamicModule) -> Self {
        Self {
            name: module.name().to_string(),
            routines: module
                .snapshot()
                .iter()
                .map(|r| r.as_ref().clone())
                .collect(),
        }
    }

    /// Encode with header.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        let payload = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode an artifact's bytes. `path` is only used in error messages.
    ///
    /// Payloads over [`MAX_ARTIFACT_BYTES`] and constants nested deeper than
    /// [`MAX_VALUE_DEPTH`](crate::value::MAX_VALUE_DEPTH) fail with
    /// [`ArtifactError::Decode`].
    pub fn decode(bytes: &[u8], path: &Path) -> ArtifactResult<Self> {
        let shown = || path.display().to_string();

        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(ArtifactError::BadMagic { path: shown() });
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                path: shown(),
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        payload_options()
            .deserialize(&bytes[HEADER_LEN..])
            .map_err(|e| ArtifactError::Decode {
                path: shown(),
                message: e.to_string(),
            })
    }
}

/// Write `bytes` to `path` atomically: temp file in the same directory, fsync, rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// A module loaded back from an artifact.
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    routines: Vec<Arc<Routine>>,
    by_name: HashMap<String, Arc<Routine>>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("routines", &self.routines.len())
            .finish()
    }
}

impl LoadedModule {
    /// Read, decode, and verify an artifact.
    pub fn load(path: &Path) -> ArtifactResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| ArtifactError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let module = Self::from_bytes(&bytes, path)?;
        tracing::debug!(
            module = %module.name,
            path = %path.display(),
            routines = module.routines.len(),
            "loaded module artifact"
        );
        Ok(module)
    }

    /// Decode and verify artifact bytes already in memory.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> ArtifactResult<Self> {
        let image = ModuleImage::decode(bytes, path)?;

        let mut routines = Vec::with_capacity(image.routines.len());
        let mut by_name = HashMap::with_capacity(image.routines.len());
        for routine in image.routines {
            routine
                .verify()
                .map_err(|source| ArtifactError::InvalidRoutine {
                    path: path.display().to_string(),
                    source,
                })?;
            let routine = Arc::new(routine);
            if by_name
                .insert(routine.name.clone(), Arc::clone(&routine))
                .is_some()
            {
                return Err(ArtifactError::DuplicateRoutine {
                    path: path.display().to_string(),
                    name: routine.name.clone(),
                });
            }
            routines.push(routine);
        }

        Ok(Self {
            name: image.name,
            path: path.to_path_buf(),
            routines,
            by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where this module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Routines in definition order.
    pub fn routines(&self) -> &[Arc<Routine>] {
        &self.routines
    }

    pub fn routine_names(&self) -> Vec<String> {
        self.routines.iter().map(|r| r.name.clone()).collect()
    }

    pub fn routine(&self, name: &str) -> Option<Arc<Routine>> {
        self.by_name.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Run a routine and return the bytes it wrote.
    pub fn invoke(&self, name: &str, args: &[Value]) -> ExecResult<Vec<u8>> {
        exec::invoke(self, name, args)
    }
}

/// Load the artifact at `path` and run one of its routines.
pub fn invoke_saved(path: &Path, routine: &str, args: &[Value]) -> DynModResult<Vec<u8>> {
    let module = LoadedModule::load(path)?;
    Ok(module.invoke(routine, args)?)
}

impl RoutineSource for LoadedModule {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, name: &str) -> Option<Arc<Routine>> {
        self.routine(name)
    }
}
