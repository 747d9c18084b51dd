//! Durable write of a mutated model.
//!
//! Shapes are tried in a fixed order and the first one that succeeds wins.
//! A failing shape only means "not this one"; the selector reports failure
//! once every shape has been tried. Shapes that produce bytes go through a
//! temporary file and never touch the destination on failure. The path and
//! utility shapes hand the destination to the provider, which may leave it
//! partly written.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreErrorCode};
use crate::model::{ExportError, SaveModel, SaveUtility};

pub use crate::model::ExportSettings;

pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistShape {
    /// Zero-argument export returning the raw bytes.
    Bytes,
    /// Export that takes the destination path itself.
    Path,
    /// External utility taking the model and a path.
    Utility,
    /// Export into a writable sink.
    Stream,
    /// Export parameterized by a discovered settings object.
    Settings,
}

impl PersistShape {
    pub const ORDER: [PersistShape; 5] = [
        Self::Bytes,
        Self::Path,
        Self::Utility,
        Self::Stream,
        Self::Settings,
    ];
}

impl fmt::Display for PersistShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bytes => "bytes",
            Self::Path => "path",
            Self::Utility => "utility",
            Self::Stream => "stream",
            Self::Settings => "settings",
        };
        f.write_str(name)
    }
}

#[derive(Default, Clone, Copy)]
pub struct PersistenceSelector<'a> {
    utility: Option<&'a dyn SaveUtility>,
}

impl fmt::Debug for PersistenceSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceSelector")
            .field("utility", &self.utility.is_some())
            .finish()
    }
}

impl<'a> PersistenceSelector<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_utility(utility: &'a dyn SaveUtility) -> Self {
        Self {
            utility: Some(utility),
        }
    }

    /// Writes `model` to `path` with the first shape that works.
    pub fn persist(&self, model: &dyn SaveModel, path: &Path) -> Result<PersistShape, CoreError> {
        prepare_destination(path);

        for shape in PersistShape::ORDER {
            match self.attempt(shape, model, path) {
                Ok(()) => {
                    info!(
                        target: "boxbridge::persist",
                        %shape,
                        path = %path.display(),
                        "model persisted"
                    );
                    return Ok(shape);
                }
                Err(ExportError::Unsupported) => {
                    debug!(target: "boxbridge::persist", %shape, "shape not offered");
                }
                Err(err) => {
                    debug!(target: "boxbridge::persist", %shape, error = %err, "shape failed");
                }
            }
        }

        warn!(
            target: "boxbridge::persist",
            model = model.type_name(),
            advertised = %advertised_shapes(model, self.utility.is_some()).join(", "),
            path = %path.display(),
            "every persistence shape failed"
        );
        Err(CoreError::new(
            CoreErrorCode::PersistenceFailed,
            format!(
                "could not write {}; close any program holding the file and retry",
                path.display()
            ),
        ))
    }

    fn attempt(
        &self,
        shape: PersistShape,
        model: &dyn SaveModel,
        path: &Path,
    ) -> Result<(), ExportError> {
        match shape {
            PersistShape::Bytes => {
                let bytes = match (model.as_byte_exporter(), self.utility) {
                    (Some(exporter), _) => exporter.export_bytes()?,
                    (None, Some(utility)) => utility.model_bytes(model)?,
                    (None, None) => return Err(ExportError::Unsupported),
                };
                write_atomically(path, |sink| sink.write_all(&bytes).map_err(ExportError::from))
            }
            PersistShape::Path => {
                let exporter = model.as_path_exporter().ok_or(ExportError::Unsupported)?;
                declined_is_failure(exporter.export_to_path(path)?)
            }
            PersistShape::Utility => {
                let utility = self.utility.ok_or(ExportError::Unsupported)?;
                declined_is_failure(utility.write_model(model, path)?)
            }
            PersistShape::Stream => {
                let exporter = model.as_stream_exporter().ok_or(ExportError::Unsupported)?;
                write_atomically(path, |sink| exporter.export_to_writer(sink))
            }
            PersistShape::Settings => {
                let exporter = model
                    .as_settings_exporter()
                    .ok_or(ExportError::Unsupported)?;
                let settings = exporter
                    .default_settings()
                    .or_else(|| exporter.construct_settings())
                    .ok_or(ExportError::Unsupported)?;
                let bytes = exporter.export_with_settings(&settings)?;
                write_atomically(path, |sink| sink.write_all(&bytes).map_err(ExportError::from))
            }
        }
    }
}

fn declined_is_failure(written: bool) -> Result<(), ExportError> {
    if written {
        Ok(())
    } else {
        Err(ExportError::Failed("provider declined to write".to_string()))
    }
}

fn advertised_shapes(model: &dyn SaveModel, has_utility: bool) -> Vec<String> {
    let mut out = Vec::new();
    if model.as_byte_exporter().is_some() {
        out.push(PersistShape::Bytes.to_string());
    }
    if model.as_path_exporter().is_some() {
        out.push(PersistShape::Path.to_string());
    }
    if has_utility {
        out.push(PersistShape::Utility.to_string());
    }
    if model.as_stream_exporter().is_some() {
        out.push(PersistShape::Stream.to_string());
    }
    if model.as_settings_exporter().is_some() {
        out.push(PersistShape::Settings.to_string());
    }
    if out.is_empty() {
        out.push("none".to_string());
    }
    out
}

pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Writes through a sibling temporary file and renames it over `path`.
/// The temporary file never outlives the call.
fn write_atomically<F>(path: &Path, fill: F) -> Result<(), ExportError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), ExportError>,
{
    let tmp = temp_path(path);
    let result = fill_temp(&tmp, fill).and_then(|()| fs::rename(&tmp, path).map_err(Into::into));
    if result.is_err()
        && let Err(err) = fs::remove_file(&tmp)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!(
            target: "boxbridge::persist",
            path = %tmp.display(),
            error = %err,
            "could not remove temporary file"
        );
    }
    result
}

fn fill_temp<F>(tmp: &Path, fill: F) -> Result<(), ExportError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), ExportError>,
{
    let mut file = File::create(tmp)?;
    let sink: &mut dyn Write = &mut file;
    fill(sink)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Creates the parent directory and clears the read-only bit of an existing
/// destination. Failures are left for the write itself to report.
fn prepare_destination(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && !parent.exists()
        && let Err(err) = fs::create_dir_all(parent)
    {
        debug!(
            target: "boxbridge::persist",
            path = %parent.display(),
            error = %err,
            "could not create destination directory"
        );
    }
    if path.exists()
        && let Err(err) = ensure_writable(path)
    {
        debug!(
            target: "boxbridge::persist",
            path = %path.display(),
            error = %err,
            "could not clear read-only attribute"
        );
    }
}

/// Clears the read-only attribute of `path` if it is set.
pub fn ensure_writable(path: &Path) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    if !permissions.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{PersistShape, temp_path};

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/saves/game.sav")),
            Path::new("/saves/game.sav.tmp")
        );
    }

    #[test]
    fn shape_order_is_fixed() {
        let names: Vec<String> = PersistShape::ORDER.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["bytes", "path", "utility", "stream", "settings"]);
    }
}
