//! Ranked lookup of operations by semantic role.
//!
//! Each role carries an ordered list of acceptable names and one parameter
//! shape. Lookup walks the name list first and the target's advertised
//! operations second, so list order is the tie-break: an exact, common name
//! always wins over a looser substring match.

use tracing::debug;

use crate::coerce::invoke_coerced;
use crate::model::{
    CallError, Coordinate, FieldValue, Layout, OperationSig, Record, RecordBox, ReturnKind,
    SaveModel,
};
use crate::value::{ParamKind, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePattern {
    Exact(&'static str),
    /// Every fragment must appear, ignoring ASCII case.
    Contains(&'static [&'static str]),
}

impl NamePattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => name == *expected,
            Self::Contains(fragments) => {
                let lower = name.to_ascii_lowercase();
                fragments.iter().all(|f| lower.contains(f))
            }
        }
    }
}

/// Accepted parameter shape for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Exactly `n` integer-like parameters.
    Ints(usize),
    /// `n` integer-like parameters followed by one record parameter.
    IntsThenRecord(usize),
}

impl Shape {
    pub fn accepts(&self, params: &[ParamKind]) -> bool {
        match *self {
            Self::Ints(n) => params.len() == n && params.iter().all(|p| p.is_integer_like()),
            Self::IntsThenRecord(n) => {
                params.len() == n + 1
                    && params[..n].iter().all(|p| p.is_integer_like())
                    && params[n] == ParamKind::Record
            }
        }
    }

    pub fn scalar_arity(&self) -> usize {
        match *self {
            Self::Ints(n) | Self::IntsThenRecord(n) => n,
        }
    }
}

const BOX_GETTERS: &[NamePattern] = &[
    NamePattern::Exact("GetBoxSlot"),
    NamePattern::Exact("GetPCSlot"),
    NamePattern::Exact("GetDecryptedBoxSlot"),
    NamePattern::Exact("GetBoxPKM"),
    NamePattern::Exact("GetSlot"),
    NamePattern::Exact("GetBoxSlotAtIndex"),
    NamePattern::Contains(&["get", "box"]),
];

const BOX_SETTERS: &[NamePattern] = &[
    NamePattern::Exact("SetBoxSlot"),
    NamePattern::Exact("SetPCSlot"),
    NamePattern::Exact("SetDecryptedBoxSlot"),
    NamePattern::Exact("SetBoxPKM"),
    NamePattern::Exact("SetSlot"),
    NamePattern::Exact("SetBoxSlotAtIndex"),
    NamePattern::Contains(&["set", "box"]),
];

const ROSTER_GETTERS: &[NamePattern] = &[
    NamePattern::Exact("GetPartySlot"),
    NamePattern::Exact("GetPartySlotAtIndex"),
    NamePattern::Contains(&["get", "party"]),
];

const ROSTER_SETTERS: &[NamePattern] = &[
    NamePattern::Exact("SetPartySlot"),
    NamePattern::Exact("SetPartySlotAtIndex"),
    NamePattern::Contains(&["set", "party"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// `(container, position) -> record`
    GetPositional,
    /// `(flat index) -> record`
    GetIndexed,
    SetPositional,
    SetIndexed,
    GetRoster,
    SetRoster,
    /// `(container) -> text`
    ContainerName,
    /// Record operation `(move slot) -> id`.
    MoveAt,
    /// Record operation `(move slot) -> remaining uses`.
    MoveUsesAt,
}

impl Role {
    pub fn patterns(self) -> &'static [NamePattern] {
        match self {
            Self::GetPositional | Self::GetIndexed => BOX_GETTERS,
            Self::SetPositional | Self::SetIndexed => BOX_SETTERS,
            Self::GetRoster => ROSTER_GETTERS,
            Self::SetRoster => ROSTER_SETTERS,
            Self::ContainerName => &[NamePattern::Exact("GetBoxName")],
            Self::MoveAt => &[NamePattern::Exact("GetMove")],
            Self::MoveUsesAt => &[NamePattern::Exact("GetMovePP")],
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            Self::GetPositional => Shape::Ints(2),
            Self::GetIndexed | Self::GetRoster | Self::ContainerName => Shape::Ints(1),
            Self::MoveAt | Self::MoveUsesAt => Shape::Ints(1),
            Self::SetPositional => Shape::IntsThenRecord(2),
            Self::SetIndexed | Self::SetRoster => Shape::IntsThenRecord(1),
        }
    }

    pub fn returns(self) -> ReturnKind {
        match self {
            Self::GetPositional | Self::GetIndexed | Self::GetRoster => ReturnKind::Record,
            Self::SetPositional | Self::SetIndexed | Self::SetRoster => ReturnKind::Unit,
            Self::ContainerName => ReturnKind::Text,
            Self::MoveAt | Self::MoveUsesAt => ReturnKind::Int,
        }
    }
}

/// An operation resolved for a role, ready to be invoked by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundOp {
    pub name: String,
    pub params: Vec<ParamKind>,
}

impl BoundOp {
    fn from_sig(sig: &OperationSig) -> Self {
        Self {
            name: sig.name.clone(),
            params: sig.params.clone(),
        }
    }
}

/// Every operation matching `patterns` + `shape` + `returns`, in rank order.
pub fn find_all_with(
    operations: &[OperationSig],
    patterns: &[NamePattern],
    shape: Shape,
    returns: ReturnKind,
) -> Vec<BoundOp> {
    let mut out: Vec<BoundOp> = Vec::new();
    for pattern in patterns {
        for sig in operations {
            if sig.returns != returns || !shape.accepts(&sig.params) || !pattern.matches(&sig.name)
            {
                continue;
            }
            if out.iter().any(|op| op.name == sig.name && op.params == sig.params) {
                continue;
            }
            out.push(BoundOp::from_sig(sig));
        }
    }
    out
}

pub fn find_all(operations: &[OperationSig], role: Role) -> Vec<BoundOp> {
    find_all_with(operations, role.patterns(), role.shape(), role.returns())
}

/// First-ranked operation for `role`, `None` when nothing matches.
pub fn find(operations: &[OperationSig], role: Role) -> Option<BoundOp> {
    let found = find_all(operations, role).into_iter().next();
    if found.is_none() {
        debug!(target: "boxbridge::probe", ?role, "no operation matched");
    }
    found
}

/// Tries each candidate in rank order and returns the first success.
/// A candidate that rejects its arguments even after coercion is skipped.
pub fn first_success<T, F>(candidates: &[BoundOp], mut attempt: F) -> Result<T, CallError>
where
    F: FnMut(&BoundOp) -> Result<T, CallError>,
{
    let mut last = None;
    for op in candidates {
        match attempt(op) {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(
                    target: "boxbridge::probe",
                    operation = %op.name,
                    error = %err,
                    "candidate rejected"
                );
                last = Some(err);
            }
        }
    }
    Err(last.unwrap_or_else(|| CallError::UnknownOperation("<no candidates>".to_string())))
}

/// First present field among `names`, in order.
pub fn find_field(record: &dyn Record, names: &[&str]) -> Option<FieldValue> {
    names.iter().find_map(|name| record.field(name))
}

/// Invokes an integer-returning record operation for `role` with coercion.
pub fn call_record_int(record: &dyn Record, role: Role, args: &[Scalar]) -> Option<i64> {
    let candidates = find_all(&record.operations(), role);
    first_success(&candidates, |op| {
        invoke_coerced(&op.name, &op.params, args, |a| record.call(&op.name, a))
    })
    .ok()
    .and_then(|v| v.as_i64())
}

/// Every slot accessor a model advertises, resolved once per mutation.
///
/// Positional accessors take `(container, position)`; indexed ones take the
/// flat offset `container * positions + position`. Reads and writes prefer
/// the positional form and fall back to the indexed one.
#[derive(Debug, Clone)]
pub struct SlotAccessors {
    get_positional: Vec<BoundOp>,
    get_indexed: Vec<BoundOp>,
    set_positional: Vec<BoundOp>,
    set_indexed: Vec<BoundOp>,
    get_roster: Vec<BoundOp>,
    set_roster: Vec<BoundOp>,
    layout: Layout,
}

impl SlotAccessors {
    pub fn detect(model: &dyn SaveModel) -> Self {
        let ops = model.operations();
        let accessors = Self {
            get_positional: find_all(&ops, Role::GetPositional),
            get_indexed: find_all(&ops, Role::GetIndexed),
            set_positional: find_all(&ops, Role::SetPositional),
            set_indexed: find_all(&ops, Role::SetIndexed),
            get_roster: find_all(&ops, Role::GetRoster),
            set_roster: find_all(&ops, Role::SetRoster),
            layout: Layout::from_model(model),
        };
        debug!(
            target: "boxbridge::probe",
            model = model.type_name(),
            get_positional = accessors.get_positional.len(),
            get_indexed = accessors.get_indexed.len(),
            set_positional = accessors.set_positional.len(),
            set_indexed = accessors.set_indexed.len(),
            get_roster = accessors.get_roster.len(),
            set_roster = accessors.set_roster.len(),
            "detected slot accessors"
        );
        accessors
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn can_read(&self) -> bool {
        !self.get_positional.is_empty() || !self.get_indexed.is_empty()
    }

    pub fn can_write(&self) -> bool {
        !self.set_positional.is_empty() || !self.set_indexed.is_empty()
    }

    pub fn can_read_roster(&self) -> bool {
        !self.get_roster.is_empty()
    }

    pub fn can_write_roster(&self) -> bool {
        !self.set_roster.is_empty()
    }

    /// Slot object at `coordinate`. `Ok(None)` is a null slot.
    pub fn read(
        &self,
        model: &dyn SaveModel,
        coordinate: Coordinate,
    ) -> Result<Option<RecordBox>, CallError> {
        if coordinate.is_roster() {
            return get_with(model, &self.get_roster, &[Scalar::from(coordinate.position)]);
        }
        let positional = get_with(model, &self.get_positional, &self.positional_args(coordinate));
        match (positional, self.indexed_args(coordinate)) {
            (Ok(slot), _) => Ok(slot),
            (Err(_), Some(args)) if !self.get_indexed.is_empty() => {
                get_with(model, &self.get_indexed, &args)
            }
            (Err(err), _) => Err(err),
        }
    }

    /// Writes `record` (or the empty sentinel for `None`) at `coordinate`.
    pub fn write(
        &self,
        model: &mut dyn SaveModel,
        coordinate: Coordinate,
        record: Option<RecordBox>,
    ) -> Result<(), CallError> {
        if coordinate.is_roster() {
            let args = [Scalar::from(coordinate.position)];
            return set_with(model, &self.set_roster, &args, &record);
        }
        let positional = set_with(
            model,
            &self.set_positional,
            &self.positional_args(coordinate),
            &record,
        );
        match (positional, self.indexed_args(coordinate)) {
            (Ok(()), _) => Ok(()),
            (Err(_), Some(args)) if !self.set_indexed.is_empty() => {
                set_with(model, &self.set_indexed, &args, &record)
            }
            (Err(err), _) => Err(err),
        }
    }

    fn positional_args(&self, coordinate: Coordinate) -> [Scalar; 2] {
        [
            Scalar::from(coordinate.container),
            Scalar::from(coordinate.position),
        ]
    }

    fn indexed_args(&self, coordinate: Coordinate) -> Option<[Scalar; 1]> {
        self.layout.flat_index(coordinate).map(|i| [Scalar::from(i)])
    }
}

fn get_with(
    model: &dyn SaveModel,
    candidates: &[BoundOp],
    args: &[Scalar],
) -> Result<Option<RecordBox>, CallError> {
    first_success(candidates, |op| {
        invoke_coerced(&op.name, &op.params, args, |a| model.get(&op.name, a))
    })
}

fn set_with(
    model: &mut dyn SaveModel,
    candidates: &[BoundOp],
    args: &[Scalar],
    record: &Option<RecordBox>,
) -> Result<(), CallError> {
    first_success(candidates, |op| {
        invoke_coerced(&op.name, &op.params, args, |a| {
            model.set(&op.name, a, record.clone())
        })
    })
}
