//! Slot relocation within one model and transfer between two models.
//!
//! Every mutation walks the same steps: locate the source, locate the first
//! free destination, write the destination, clear the source, back up every
//! file about to be overwritten, then persist. Any failure before the backup
//! step leaves the files on disk untouched.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{CoreError, CoreErrorCode};
use crate::extract::{IDENTITY_FIELD, unwrap_occupied};
use crate::model::{Bounds, Coordinate, FieldValue, RecordBox, SaveModel};
use crate::persist::{PersistShape, PersistenceSelector, ensure_writable};
use crate::probe::SlotAccessors;

pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Relocate,
    Transfer,
}

/// Where a transferred record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Roster(usize),
    Container { container: usize, position: usize },
}

impl Origin {
    pub fn coordinate(&self) -> Coordinate {
        match *self {
            Self::Roster(position) => Coordinate::roster(position),
            Self::Container {
                container,
                position,
            } => Coordinate::slot(container, position),
        }
    }
}

/// Printed on stdout after a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub status: String,
    pub op: MutationKind,
    #[serde(rename = "box")]
    pub container: i32,
    pub slot: usize,
}

impl Acknowledgement {
    pub fn ok(op: MutationKind, destination: Coordinate) -> Self {
        Self {
            status: "ok".to_string(),
            op,
            container: destination.container,
            slot: destination.position,
        }
    }

    pub fn destination(&self) -> Coordinate {
        Coordinate {
            container: self.container,
            position: self.slot,
        }
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Copies `path` to its `.bak` sibling, overwriting an older backup.
pub fn backup_file(path: &Path) -> Result<PathBuf, CoreError> {
    let backup = backup_path(path);
    let backup_failed = |err: std::io::Error| {
        CoreError::new(
            CoreErrorCode::PersistenceFailed,
            format!("could not back up {}: {err}", path.display()),
        )
    };
    ensure_writable(path).map_err(backup_failed)?;
    if backup.exists() {
        ensure_writable(&backup).map_err(backup_failed)?;
    }
    fs::copy(path, &backup).map_err(backup_failed)?;
    debug!(
        target: "boxbridge::mutate",
        path = %path.display(),
        backup = %backup.display(),
        "backup written"
    );
    Ok(backup)
}

fn restore_backup(path: &Path) -> std::io::Result<()> {
    let backup = backup_path(path);
    if path.exists() {
        ensure_writable(path)?;
    }
    fs::copy(&backup, path).map(|_| ())
}

/// The in-memory half of a relocation: moves the record at `from` to the
/// first free destination and returns that destination.
pub fn relocate_in_model(
    model: &mut dyn SaveModel,
    from: Coordinate,
    bounds: &Bounds,
) -> Result<Coordinate, CoreError> {
    let accessors = SlotAccessors::detect(model);
    if !accessors.can_read() {
        return Err(no_accessor("no container read accessor"));
    }
    if !accessors.can_write() {
        return Err(no_accessor("no container write accessor"));
    }
    if from.is_roster() || !accessors.layout().contains(from) {
        return Err(CoreError::new(
            CoreErrorCode::InvalidArgument,
            format!("{from} is outside the model's containers"),
        ));
    }

    let record = read_occupied(model, &accessors, from, bounds)?;
    let destination = first_free(model, &accessors, bounds)?;
    write_destination(model, &accessors, destination, record)?;
    clear_source(model, &accessors, from)?;
    info!(target: "boxbridge::mutate", %from, to = %destination, "record relocated");
    Ok(destination)
}

/// The in-memory half of a transfer. The source is cleared only after the
/// destination write succeeded.
pub fn transfer_between_models(
    src: &mut dyn SaveModel,
    dst: &mut dyn SaveModel,
    origin: Origin,
    bounds: &Bounds,
) -> Result<Coordinate, CoreError> {
    let src_accessors = SlotAccessors::detect(src);
    let dst_accessors = SlotAccessors::detect(dst);
    if !dst_accessors.can_read() || !dst_accessors.can_write() {
        return Err(no_accessor("destination model has no container accessors"));
    }

    let from = origin.coordinate();
    match origin {
        Origin::Roster(_) => {
            if !src_accessors.can_read_roster() {
                return Err(no_accessor("source model has no roster read accessor"));
            }
        }
        Origin::Container { .. } => {
            if !src_accessors.can_read() {
                return Err(no_accessor("source model has no container read accessor"));
            }
            if !src_accessors.layout().contains(from) {
                return Err(CoreError::new(
                    CoreErrorCode::InvalidArgument,
                    format!("{from} is outside the source model's containers"),
                ));
            }
        }
    }

    let record = read_occupied(src, &src_accessors, from, bounds)?;
    let destination = first_free(dst, &dst_accessors, bounds)?;
    write_destination(dst, &dst_accessors, destination, record)?;
    clear_source(src, &src_accessors, from)?;
    info!(target: "boxbridge::mutate", %from, to = %destination, "record transferred");
    Ok(destination)
}

fn no_accessor(message: &str) -> CoreError {
    CoreError::new(CoreErrorCode::NoAccessor, message)
}

fn read_occupied(
    model: &dyn SaveModel,
    accessors: &SlotAccessors,
    at: Coordinate,
    bounds: &Bounds,
) -> Result<RecordBox, CoreError> {
    let slot = accessors.read(model, at).map_err(|err| {
        CoreError::new(
            CoreErrorCode::NoAccessor,
            format!("could not read {at}: {err}"),
        )
    })?;
    match slot {
        Some(slot) if unwrap_occupied(slot.as_ref(), bounds).is_some() => Ok(slot),
        _ => Err(CoreError::new(
            CoreErrorCode::EmptySource,
            format!("{at} is empty"),
        )),
    }
}

/// Lexicographically first empty coordinate, never in the quarantine container.
fn first_free(
    model: &dyn SaveModel,
    accessors: &SlotAccessors,
    bounds: &Bounds,
) -> Result<Coordinate, CoreError> {
    for candidate in accessors.layout().destination_scan() {
        match accessors.read(model, candidate) {
            Ok(None) => return Ok(candidate),
            Ok(Some(slot)) if unwrap_occupied(slot.as_ref(), bounds).is_none() => {
                return Ok(candidate);
            }
            Ok(Some(_)) => {}
            Err(err) => {
                debug!(
                    target: "boxbridge::mutate",
                    %candidate,
                    error = %err,
                    "unreadable destination candidate skipped"
                );
            }
        }
    }
    Err(CoreError::new(
        CoreErrorCode::NoFreeDestination,
        "no free destination slot",
    ))
}

fn write_destination(
    model: &mut dyn SaveModel,
    accessors: &SlotAccessors,
    destination: Coordinate,
    record: RecordBox,
) -> Result<(), CoreError> {
    accessors
        .write(model, destination, Some(record))
        .map_err(|err| {
            CoreError::new(
                CoreErrorCode::NoAccessor,
                format!("could not write {destination}: {err}"),
            )
        })
}

/// Writes the empty sentinel at `at`. When the setter refuses the sentinel,
/// the slot's own record is blanked and written back instead.
fn clear_source(
    model: &mut dyn SaveModel,
    accessors: &SlotAccessors,
    at: Coordinate,
) -> Result<(), CoreError> {
    let sentinel = match accessors.write(model, at, None) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    debug!(
        target: "boxbridge::mutate",
        %at,
        error = %sentinel,
        "empty sentinel rejected, blanking identity instead"
    );

    let cleared = accessors
        .read(model, at)
        .ok()
        .flatten()
        .and_then(|mut record| {
            record
                .set_field(IDENTITY_FIELD, FieldValue::int(0))
                .ok()
                .map(|()| record)
        });
    let Some(record) = cleared else {
        return Err(CoreError::new(
            CoreErrorCode::NoAccessor,
            format!("could not clear {at}: {sentinel}"),
        ));
    };
    accessors.write(model, at, Some(record)).map_err(|err| {
        CoreError::new(
            CoreErrorCode::NoAccessor,
            format!("could not clear {at}: {err}"),
        )
    })
}

/// Runs mutations end to end: in-memory change, backups, persistence.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutationEngine<'a> {
    bounds: Bounds,
    persistence: PersistenceSelector<'a>,
}

impl<'a> MutationEngine<'a> {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            persistence: PersistenceSelector::new(),
        }
    }

    pub fn with_persistence(mut self, persistence: PersistenceSelector<'a>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Moves the record at `from` to the first free slot of the same model
    /// and writes the model back to `path`.
    pub fn relocate(
        &self,
        model: &mut dyn SaveModel,
        path: &Path,
        from: Coordinate,
    ) -> Result<Acknowledgement, CoreError> {
        let destination = relocate_in_model(model, from, &self.bounds)?;
        backup_file(path)?;
        self.persist(model, path)?;
        Ok(Acknowledgement::ok(MutationKind::Relocate, destination))
    }

    /// Moves a record from `src` into the first free container slot of `dst`
    /// and writes both models back.
    ///
    /// Both files are backed up before either is written. If the second write
    /// fails, both files are restored from their backups.
    pub fn transfer(
        &self,
        src: &mut dyn SaveModel,
        src_path: &Path,
        dst: &mut dyn SaveModel,
        dst_path: &Path,
        origin: Origin,
    ) -> Result<Acknowledgement, CoreError> {
        if same_file(src_path, dst_path) {
            return Err(CoreError::new(
                CoreErrorCode::InvalidArgument,
                "source and destination must be different files",
            ));
        }

        let destination = transfer_between_models(src, dst, origin, &self.bounds)?;
        backup_file(src_path)?;
        backup_file(dst_path)?;
        self.persist(src, src_path)?;
        if let Err(err) = self.persist(dst, dst_path) {
            let failures: Vec<String> = [src_path, dst_path]
                .into_iter()
                .filter_map(|path| rollback(path).err())
                .collect();
            if failures.is_empty() {
                return Err(err);
            }
            return Err(CoreError::new(
                CoreErrorCode::PersistenceFailed,
                format!("{}; {}", err.message, failures.join("; ")),
            ));
        }
        Ok(Acknowledgement::ok(MutationKind::Transfer, destination))
    }

    fn persist(&self, model: &dyn SaveModel, path: &Path) -> Result<PersistShape, CoreError> {
        self.persistence.persist(model, path)
    }
}

/// Puts `path` back from its backup after a failed transfer. A path-shaped
/// export may already have written part of the file in place.
fn rollback(path: &Path) -> Result<(), String> {
    match restore_backup(path) {
        Ok(()) => {
            info!(
                target: "boxbridge::mutate",
                path = %path.display(),
                "restored from backup"
            );
            Ok(())
        }
        Err(err) => {
            error!(
                target: "boxbridge::mutate",
                path = %path.display(),
                error = %err,
                "could not restore from backup"
            );
            Err(format!(
                "restoring {} from {} also failed: {err}",
                path.display(),
                backup_path(path).display()
            ))
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
