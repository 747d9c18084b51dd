//! Locating and loading the model-provider library manifest.
//!
//! Resolution is a pure function of the search inputs; only
//! [`LibrarySearch::from_process`] touches the process environment.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::DocumentProvider;
use crate::error::{CoreError, CoreErrorCode};
use crate::model::Bounds;
use crate::names::{NameTable, NameTableSpec};
use crate::provider::{ModelInfo, ModelProvider};

pub const LIBRARY_FILE_NAME: &str = "boxbridge-provider.json";
pub const LIBRARY_ENV_VAR: &str = "BOXBRIDGE_LIBRARY_PATH";
/// Ancestors of the executable directory searched after the directory itself.
pub const EXE_ANCESTOR_DEPTH: usize = 5;

/// Inputs to library resolution, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibrarySearch {
    pub explicit: Option<PathBuf>,
    pub env_value: Option<OsString>,
    pub exe_dir: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
}

impl LibrarySearch {
    /// Captures the environment value, executable directory and working
    /// directory of the running process.
    pub fn from_process(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            env_value: std::env::var_os(LIBRARY_ENV_VAR),
            exe_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            cwd: std::env::current_dir().ok(),
        }
    }
}

/// Every path probed, in order. An explicit or environment entry may name
/// the manifest itself or a directory holding it, so both are listed.
pub fn search_candidates(search: &LibrarySearch) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let configured = [
        search.explicit.clone(),
        search
            .env_value
            .as_ref()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
    ];
    for path in configured.into_iter().flatten() {
        let manifest = path.join(LIBRARY_FILE_NAME);
        out.push(path);
        out.push(manifest);
    }
    if let Some(exe_dir) = &search.exe_dir {
        out.extend(
            exe_dir
                .ancestors()
                .take(EXE_ANCESTOR_DEPTH + 1)
                .map(|dir| dir.join(LIBRARY_FILE_NAME)),
        );
    }
    if let Some(cwd) = &search.cwd {
        out.push(cwd.join(LIBRARY_FILE_NAME));
    }
    out
}

/// First candidate accepted by `is_file`.
pub fn resolve_library_with<F>(search: &LibrarySearch, is_file: F) -> Result<PathBuf, CoreError>
where
    F: Fn(&Path) -> bool,
{
    let candidates = search_candidates(search);
    for candidate in &candidates {
        if is_file(candidate) {
            info!(target: "boxbridge::library", path = %candidate.display(), "library resolved");
            return Ok(candidate.clone());
        }
        debug!(target: "boxbridge::library", path = %candidate.display(), "not found");
    }
    Err(CoreError::new(
        CoreErrorCode::LibraryNotFound,
        format!(
            "could not find {LIBRARY_FILE_NAME}; pass --library or set {LIBRARY_ENV_VAR} ({} locations searched)",
            candidates.len()
        ),
    ))
}

pub fn resolve_library(search: &LibrarySearch) -> Result<PathBuf, CoreError> {
    resolve_library_with(search, Path::is_file)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryManifest {
    pub provider: String,
    /// Supported generations; empty accepts every model.
    #[serde(default)]
    pub generations: Vec<u8>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub names: NameTableSpec,
}

/// A loaded library: the provider it names plus its bounds and name tables.
pub struct ProviderLibrary {
    path: PathBuf,
    manifest: LibraryManifest,
    names: NameTable,
    provider: Box<dyn ModelProvider>,
}

impl fmt::Debug for ProviderLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderLibrary")
            .field("path", &self.path)
            .field("provider", &self.provider.name())
            .field("generations", &self.manifest.generations)
            .field("names", &self.names.len())
            .finish()
    }
}

impl ProviderLibrary {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::LibraryLoad,
                format!("could not read {}: {e}", path.display()),
            )
        })?;
        let manifest: LibraryManifest = serde_json::from_str(&raw).map_err(|e| {
            CoreError::new(
                CoreErrorCode::LibraryLoad,
                format!("malformed library manifest {}: {e}", path.display()),
            )
        })?;
        Self::from_manifest(path, manifest)
    }

    pub fn from_manifest(path: &Path, manifest: LibraryManifest) -> Result<Self, CoreError> {
        let provider: Box<dyn ModelProvider> = match manifest.provider.as_str() {
            DocumentProvider::NAME => Box::new(DocumentProvider::new()),
            other => {
                return Err(CoreError::new(
                    CoreErrorCode::LibraryLoad,
                    format!("unknown model provider '{other}' in {}", path.display()),
                ));
            }
        };
        if let Some(bounds) = manifest.bounds
            && (bounds.max_species < 1 || bounds.max_move < 1)
        {
            return Err(CoreError::new(
                CoreErrorCode::LibraryLoad,
                format!("bounds in {} must be positive", path.display()),
            ));
        }
        let names = NameTable::from_spec(&manifest.names);
        debug!(
            target: "boxbridge::library",
            provider = provider.name(),
            names = names.len(),
            "library loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            names,
            provider,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn provider(&self) -> &dyn ModelProvider {
        self.provider.as_ref()
    }

    pub fn manifest(&self) -> &LibraryManifest {
        &self.manifest
    }

    pub fn bounds(&self) -> Bounds {
        self.manifest.bounds.unwrap_or_default()
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn supports_generation(&self, generation: u8) -> bool {
        self.manifest.generations.is_empty() || self.manifest.generations.contains(&generation)
    }

    /// Rejects models whose reported generation the library does not list.
    /// Models that report no generation pass.
    pub fn check_schema(&self, info: &ModelInfo) -> Result<(), CoreError> {
        match info.generation {
            Some(generation) if !self.supports_generation(generation) => Err(CoreError::new(
                CoreErrorCode::UnsupportedSchema,
                format!(
                    "generation {generation} ({} schema) is not supported by {}",
                    info.schema,
                    self.path.display()
                ),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{LIBRARY_FILE_NAME, LibrarySearch, resolve_library_with, search_candidates};
    use crate::error::CoreErrorCode;

    fn search() -> LibrarySearch {
        LibrarySearch {
            explicit: Some(PathBuf::from("/opt/explicit")),
            env_value: Some("/opt/env".into()),
            exe_dir: Some(PathBuf::from("/a/b/c/d/e/f/g/bin")),
            cwd: Some(PathBuf::from("/work")),
        }
    }

    #[test]
    fn candidates_follow_priority_order() {
        let candidates = search_candidates(&search());
        let expected: Vec<PathBuf> = [
            "/opt/explicit",
            "/opt/explicit/boxbridge-provider.json",
            "/opt/env",
            "/opt/env/boxbridge-provider.json",
            "/a/b/c/d/e/f/g/bin/boxbridge-provider.json",
            "/a/b/c/d/e/f/g/boxbridge-provider.json",
            "/a/b/c/d/e/f/boxbridge-provider.json",
            "/a/b/c/d/e/boxbridge-provider.json",
            "/a/b/c/d/boxbridge-provider.json",
            "/a/b/c/boxbridge-provider.json",
            "/work/boxbridge-provider.json",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(candidates, expected);
    }

    #[test]
    fn empty_env_value_is_ignored() {
        let search = LibrarySearch {
            env_value: Some("".into()),
            ..LibrarySearch::default()
        };
        assert!(search_candidates(&search).is_empty());
    }

    #[test]
    fn explicit_manifest_file_wins() {
        let found = resolve_library_with(&search(), |p| p == Path::new("/opt/explicit"))
            .expect("explicit file");
        assert_eq!(found, PathBuf::from("/opt/explicit"));
    }

    #[test]
    fn falls_through_to_working_directory() {
        let cwd_manifest = Path::new("/work").join(LIBRARY_FILE_NAME);
        let found = resolve_library_with(&search(), |p| p == cwd_manifest).expect("cwd");
        assert_eq!(found, cwd_manifest);
    }

    #[test]
    fn nothing_found_is_library_not_found() {
        let err = resolve_library_with(&search(), |_| false).expect_err("missing");
        assert_eq!(err.code, CoreErrorCode::LibraryNotFound);
    }
}
