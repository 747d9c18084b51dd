//! Capability interfaces a model-provider adapter implements.
//!
//! A loaded save is an opaque [`SaveModel`]. Everything beyond the base trait
//! is optional: adapters opt into container access, roster access and the
//! various persistence shapes by overriding the matching `as_*` hook. The
//! engine never assumes a capability exists; it asks, and falls back when the
//! answer is `None`.

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{CoreError, CoreErrorCode};
use crate::value::{ParamKind, Scalar};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(Scalar),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn int(value: i64) -> Self {
        Self::Int(Scalar::I64(value))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(scalar) => Some(scalar.as_i64()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Record,
    Int,
    Text,
    Unit,
}

/// Signature of one invocable operation, as advertised by a model or record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSig {
    pub name: String,
    pub params: Vec<ParamKind>,
    pub returns: ReturnKind,
}

impl OperationSig {
    pub fn new(name: impl Into<String>, params: Vec<ParamKind>, returns: ReturnKind) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
        }
    }

    /// Rejects arguments that are not exactly the declared integer kinds.
    /// Trailing `Record` parameters are carried out of band and not checked.
    pub fn check_args(&self, args: &[Scalar]) -> Result<(), CallError> {
        let scalar_params: Vec<ParamKind> = self
            .params
            .iter()
            .copied()
            .filter(|p| p.is_integer_like())
            .collect();
        if scalar_params.len() != args.len() {
            return Err(CallError::Arity {
                operation: self.name.clone(),
                expected: scalar_params.len(),
                got: args.len(),
            });
        }
        for (index, (arg, param)) in args.iter().zip(scalar_params).enumerate() {
            if !arg.fits_exactly(param) {
                return Err(CallError::ShapeRejected {
                    operation: self.name.clone(),
                    index,
                    expected: param,
                    got: *arg,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("no operation named {0}")]
    UnknownOperation(String),
    #[error("{operation} takes {expected} scalar arguments, got {got}")]
    Arity {
        operation: String,
        expected: usize,
        got: usize,
    },
    #[error("{operation} rejected argument {index}: expected {expected:?}, got {got}")]
    ShapeRejected {
        operation: String,
        index: usize,
        expected: ParamKind,
        got: Scalar,
    },
    #[error("{operation}: coordinate out of range")]
    OutOfRange { operation: String },
    #[error("{operation} failed: {reason}")]
    Rejected { operation: String, reason: String },
}

impl CallError {
    pub fn is_shape_rejection(&self) -> bool {
        matches!(self, Self::ShapeRejected { .. })
    }
}

/// One game-entity slot object. May be a non-null placeholder: occupancy is
/// decided from the identity field, never from presence alone.
pub trait Record: fmt::Debug {
    fn type_name(&self) -> &str;

    fn field(&self, name: &str) -> Option<FieldValue>;

    fn field_names(&self) -> Vec<String>;

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CallError>;

    fn operations(&self) -> Vec<OperationSig> {
        Vec::new()
    }

    fn call(&self, operation: &str, _args: &[Scalar]) -> Result<FieldValue, CallError> {
        Err(CallError::UnknownOperation(operation.to_string()))
    }

    /// Inner member for slot wrappers that hold the real record.
    fn inner(&self, _member: &str) -> Option<&dyn Record> {
        None
    }

    fn clone_record(&self) -> RecordBox;
}

pub type RecordBox = Box<dyn Record>;

impl Clone for RecordBox {
    fn clone(&self) -> Self {
        self.clone_record()
    }
}

pub trait RecordContainer {
    fn name(&self) -> Option<String> {
        None
    }

    /// Slot list exposed under `member`, `None` when the member is absent.
    fn slots(&self, member: &str) -> Option<Vec<Option<&dyn Record>>>;
}

pub trait ContainerRecordStore {
    /// Aggregate container collection reachable at `path` (e.g. `Boxes`).
    fn collection(&self, path: &str) -> Option<Vec<&dyn RecordContainer>>;
}

pub trait RosterStore {
    fn roster(&self, member: &str) -> Option<Vec<Option<&dyn Record>>>;
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("shape not supported by this model")]
    Unsupported,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export failed: {0}")]
    Failed(String),
}

/// Options object some providers require before they will serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportSettings {
    pub include_header: bool,
    pub include_footer: bool,
}

pub trait ByteExporter {
    fn export_bytes(&self) -> Result<Vec<u8>, ExportError>;
}

pub trait PathExporter {
    /// `Ok(false)` means the provider declined to write.
    fn export_to_path(&self, path: &Path) -> Result<bool, ExportError>;
}

pub trait StreamExporter {
    fn export_to_writer(&self, sink: &mut dyn Write) -> Result<(), ExportError>;
}

pub trait SettingsExporter {
    /// Shared default instance, when the provider publishes one.
    fn default_settings(&self) -> Option<ExportSettings> {
        None
    }

    /// Parameterless construction, tried when no default instance exists.
    fn construct_settings(&self) -> Option<ExportSettings> {
        None
    }

    fn export_with_settings(&self, settings: &ExportSettings) -> Result<Vec<u8>, ExportError>;
}

/// Static helper collaborator some providers ship alongside the model type.
pub trait SaveUtility {
    fn write_model(&self, _model: &dyn SaveModel, _path: &Path) -> Result<bool, ExportError> {
        Err(ExportError::Unsupported)
    }

    fn model_bytes(&self, _model: &dyn SaveModel) -> Result<Vec<u8>, ExportError> {
        Err(ExportError::Unsupported)
    }
}

pub trait SaveModel: fmt::Debug {
    fn type_name(&self) -> &str;

    fn property(&self, name: &str) -> Option<FieldValue>;

    fn operations(&self) -> Vec<OperationSig>;

    /// Invokes a record-returning operation. `Ok(None)` is a null slot.
    fn get(&self, operation: &str, args: &[Scalar]) -> Result<Option<RecordBox>, CallError>;

    /// Invokes a record-accepting operation; `None` writes the empty sentinel.
    fn set(
        &mut self,
        operation: &str,
        args: &[Scalar],
        record: Option<RecordBox>,
    ) -> Result<(), CallError>;

    fn text(&self, operation: &str, _args: &[Scalar]) -> Result<Option<String>, CallError> {
        Err(CallError::UnknownOperation(operation.to_string()))
    }

    fn as_container_store(&self) -> Option<&dyn ContainerRecordStore> {
        None
    }

    fn as_roster_store(&self) -> Option<&dyn RosterStore> {
        None
    }

    fn as_byte_exporter(&self) -> Option<&dyn ByteExporter> {
        None
    }

    fn as_path_exporter(&self) -> Option<&dyn PathExporter> {
        None
    }

    fn as_stream_exporter(&self) -> Option<&dyn StreamExporter> {
        None
    }

    fn as_settings_exporter(&self) -> Option<&dyn SettingsExporter> {
        None
    }
}

/// `(container, position)`; container `-1` is the transient roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub container: i32,
    pub position: usize,
}

impl Coordinate {
    pub const ROSTER: i32 = -1;

    /// Container indices past `i32::MAX` saturate, so they land outside every
    /// layout instead of wrapping onto a real container.
    pub fn slot(container: usize, position: usize) -> Self {
        Self {
            container: i32::try_from(container).unwrap_or(i32::MAX),
            position,
        }
    }

    /// Like [`Coordinate::slot`], but rejects container indices that do not
    /// fit the coordinate space.
    pub fn try_slot(container: usize, position: usize) -> Result<Self, CoreError> {
        let container = i32::try_from(container).map_err(|_| {
            CoreError::new(
                CoreErrorCode::InvalidArgument,
                format!("box {container} is out of range"),
            )
        })?;
        Ok(Self {
            container,
            position,
        })
    }

    pub fn roster(position: usize) -> Self {
        Self {
            container: Self::ROSTER,
            position,
        }
    }

    pub fn is_roster(&self) -> bool {
        self.container == Self::ROSTER
    }

    pub fn container_index(&self) -> Option<usize> {
        usize::try_from(self.container).ok()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_roster() {
            write!(f, "roster/{}", self.position)
        } else {
            write!(f, "box {}/slot {}", self.container, self.position)
        }
    }
}

/// Shape of a model's container grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub containers: usize,
    pub positions: usize,
    /// Reserved container never used as a destination.
    pub quarantine: Option<usize>,
}

impl Layout {
    pub const DEFAULT_CONTAINERS: usize = 18;
    pub const DEFAULT_POSITIONS: usize = 30;
    pub const QUARANTINE_CONTAINER: usize = 17;

    pub const DEFAULT: Layout = Layout {
        containers: Self::DEFAULT_CONTAINERS,
        positions: Self::DEFAULT_POSITIONS,
        quarantine: Some(Self::QUARANTINE_CONTAINER),
    };

    /// Reads `BoxCount` / `BoxSlotCount`, keeping the defaults for anything
    /// missing or non-positive.
    pub fn from_model(model: &dyn SaveModel) -> Self {
        let read = |name: &str, fallback: usize| {
            model
                .property(name)
                .and_then(|v| v.as_i64())
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(fallback)
        };
        let containers = read("BoxCount", Self::DEFAULT_CONTAINERS);
        let positions = read("BoxSlotCount", Self::DEFAULT_POSITIONS);
        Self {
            containers,
            positions,
            quarantine: Some(Self::QUARANTINE_CONTAINER).filter(|q| *q < containers),
        }
    }

    pub fn flat_index(&self, coordinate: Coordinate) -> Option<usize> {
        let container = coordinate.container_index()?;
        Some(container * self.positions + coordinate.position)
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        coordinate
            .container_index()
            .is_some_and(|c| c < self.containers && coordinate.position < self.positions)
    }

    /// Destination scan order: container ascending, then position ascending,
    /// skipping the quarantine container.
    pub fn destination_scan(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (0..self.containers)
            .filter(move |c| Some(*c) != self.quarantine)
            .flat_map(move |c| (0..self.positions).map(move |p| Coordinate::slot(c, p)))
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Valid identity and move ranges, both `[1, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub max_species: i64,
    pub max_move: i64,
}

impl Bounds {
    pub const GEN4: Bounds = Bounds {
        max_species: 493,
        max_move: 467,
    };

    pub fn species_in_range(&self, species: i64) -> bool {
        (1..=self.max_species).contains(&species)
    }

    pub fn move_in_range(&self, move_id: i64) -> bool {
        (1..=self.max_move).contains(&move_id)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::GEN4
    }
}
