//! Walking a model's record collection.
//!
//! Two independent strategies exist. The container strategy reads an exposed
//! aggregate (`Boxes` → `Mons`) directly; the positional strategy synthesizes
//! coordinates and calls a discovered getter for each. Automatic mode prefers
//! the container strategy and only falls back when it finds nothing occupied.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::coerce::invoke_coerced;
use crate::extract::unwrap_occupied;
use crate::model::{
    Bounds, Coordinate, FieldValue, Layout, Record, RecordBox, ReturnKind, SaveModel,
};
use crate::probe::{
    BoundOp, NamePattern, Role, Shape, find, find_all, find_all_with, first_success,
};
use crate::value::Scalar;

const COLLECTION_PATHS: &[&str] = &["Boxes", "PC.Boxes", "Storage.Boxes", "AllBoxes"];
const SLOT_MEMBERS: &[&str] = &["Mons", "Pokemon", "Slots", "BoxMons"];
const ROSTER_MEMBERS: &[&str] = &["PartyData", "Party"];
const DEFAULT_ROSTER_SIZE: usize = 6;

/// The three known families of positional getter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalVariant {
    BoxSlot,
    PcSlot,
    Decrypted,
}

impl PositionalVariant {
    pub const ALL: [PositionalVariant; 3] = [Self::BoxSlot, Self::PcSlot, Self::Decrypted];

    pub fn patterns(self) -> &'static [NamePattern] {
        match self {
            Self::BoxSlot => &[NamePattern::Exact("GetBoxSlot"), NamePattern::Exact("GetBoxPKM")],
            Self::PcSlot => &[
                NamePattern::Exact("GetPCSlot"),
                NamePattern::Exact("GetSlot"),
                NamePattern::Exact("GetBoxSlotAtIndex"),
            ],
            Self::Decrypted => &[NamePattern::Exact("GetDecryptedBoxSlot")],
        }
    }

    pub fn mode_name(self) -> &'static str {
        match self {
            Self::BoxSlot => "m0",
            Self::PcSlot => "m1",
            Self::Decrypted => "m2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMode {
    #[default]
    Auto,
    Container,
    Positional(PositionalVariant),
}

impl FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "prop" | "container" => Ok(Self::Container),
            "m0" => Ok(Self::Positional(PositionalVariant::BoxSlot)),
            "m1" => Ok(Self::Positional(PositionalVariant::PcSlot)),
            "m2" => Ok(Self::Positional(PositionalVariant::Decrypted)),
            other => Err(format!(
                "unknown discovery mode '{other}', expected auto, prop, m0, m1 or m2"
            )),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Container => f.write_str("prop"),
            Self::Positional(variant) => f.write_str(variant.mode_name()),
        }
    }
}

/// Which strategy produced an enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Container,
    Positional(PositionalVariant),
}

#[derive(Debug, Clone)]
pub struct EnumeratedContainer {
    pub index: usize,
    pub name: String,
    /// Occupied records with their position, already unwrapped.
    pub records: Vec<(usize, RecordBox)>,
}

#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub strategy: Option<Strategy>,
    pub containers: Vec<EnumeratedContainer>,
}

impl Enumeration {
    pub fn occupied(&self) -> usize {
        self.containers.iter().map(|c| c.records.len()).sum()
    }

    fn from(strategy: Strategy, containers: Vec<EnumeratedContainer>) -> Self {
        Self {
            strategy: Some(strategy),
            containers,
        }
    }
}

fn any_occupied(containers: &[EnumeratedContainer]) -> bool {
    containers.iter().any(|c| !c.records.is_empty())
}

pub fn enumerate_containers(
    model: &dyn SaveModel,
    mode: DiscoveryMode,
    only_container: Option<usize>,
    bounds: &Bounds,
) -> Enumeration {
    match mode {
        DiscoveryMode::Container => container_strategy(model, only_container, bounds)
            .map(|c| Enumeration::from(Strategy::Container, c))
            .unwrap_or_default(),
        DiscoveryMode::Positional(variant) => {
            match positional_strategy(model, variant, only_container, bounds) {
                Some(containers) => Enumeration::from(Strategy::Positional(variant), containers),
                None => {
                    debug!(
                        target: "boxbridge::enumerate",
                        mode = variant.mode_name(),
                        "forced positional variant has no getter, using containers"
                    );
                    container_strategy(model, only_container, bounds)
                        .map(|c| Enumeration::from(Strategy::Container, c))
                        .unwrap_or_default()
                }
            }
        }
        DiscoveryMode::Auto => auto_strategy(model, only_container, bounds),
    }
}

fn auto_strategy(model: &dyn SaveModel, only_container: Option<usize>, bounds: &Bounds) -> Enumeration {
    if let Some(containers) = container_strategy(model, only_container, bounds)
        && any_occupied(&containers)
    {
        info!(target: "boxbridge::enumerate", "accepted container strategy");
        return Enumeration::from(Strategy::Container, containers);
    }

    for variant in PositionalVariant::ALL {
        if let Some(containers) = positional_strategy(model, variant, only_container, bounds)
            && any_occupied(&containers)
        {
            info!(
                target: "boxbridge::enumerate",
                mode = variant.mode_name(),
                "accepted positional strategy"
            );
            return Enumeration::from(Strategy::Positional(variant), containers);
        }
    }

    debug!(target: "boxbridge::enumerate", "no strategy found an occupied record");
    Enumeration::default()
}

/// Strategy A. `None` when the model exposes no container collection.
pub fn container_strategy(
    model: &dyn SaveModel,
    only_container: Option<usize>,
    bounds: &Bounds,
) -> Option<Vec<EnumeratedContainer>> {
    let store = model.as_container_store()?;
    let Some(collection) = COLLECTION_PATHS.iter().find_map(|path| store.collection(path)) else {
        debug!(target: "boxbridge::enumerate", "container store exposes no known collection");
        return None;
    };

    let mut out = Vec::new();
    if collection.is_empty() {
        return Some(out);
    }
    let last = collection.len() - 1;
    let (start, end) = match only_container {
        Some(only) => (only.min(last), only.min(last)),
        None => (0, last),
    };

    for (index, container) in collection.iter().enumerate().take(end + 1).skip(start) {
        let Some(slots) = SLOT_MEMBERS.iter().find_map(|member| container.slots(member)) else {
            continue;
        };
        let records = slots
            .into_iter()
            .enumerate()
            .filter_map(|(position, slot)| {
                let record = unwrap_occupied(slot?, bounds)?;
                Some((position, record.clone_record()))
            })
            .collect();
        out.push(EnumeratedContainer {
            index,
            name: container_name(model, container.name(), index),
            records,
        });
    }
    Some(out)
}

/// A resolved positional getter, either `(container, position)` or a flat index.
#[derive(Debug, Clone)]
enum PositionalGetter {
    Pair(Vec<BoundOp>),
    Flat(Vec<BoundOp>),
}

impl PositionalGetter {
    fn resolve(model: &dyn SaveModel, variant: PositionalVariant) -> Option<Self> {
        let ops = model.operations();
        let pairs = find_all_with(&ops, variant.patterns(), Shape::Ints(2), ReturnKind::Record);
        if !pairs.is_empty() {
            return Some(Self::Pair(pairs));
        }
        let flats = find_all_with(&ops, variant.patterns(), Shape::Ints(1), ReturnKind::Record);
        if !flats.is_empty() {
            return Some(Self::Flat(flats));
        }
        None
    }

    fn get(
        &self,
        model: &dyn SaveModel,
        coordinate: Coordinate,
        layout: &Layout,
    ) -> Option<RecordBox> {
        let (candidates, args) = match self {
            Self::Pair(ops) => (
                ops,
                vec![Scalar::from(coordinate.container), Scalar::from(coordinate.position)],
            ),
            Self::Flat(ops) => (ops, vec![Scalar::from(layout.flat_index(coordinate)?)]),
        };
        first_success(candidates, |op| {
            invoke_coerced(&op.name, &op.params, &args, |a| model.get(&op.name, a))
        })
        .ok()
        .flatten()
    }
}

/// Strategy B. `None` when the variant has no matching getter.
pub fn positional_strategy(
    model: &dyn SaveModel,
    variant: PositionalVariant,
    only_container: Option<usize>,
    bounds: &Bounds,
) -> Option<Vec<EnumeratedContainer>> {
    let getter = PositionalGetter::resolve(model, variant)?;
    let layout = Layout::from_model(model);
    if layout.containers == 0 {
        return Some(Vec::new());
    }
    let range = match only_container {
        Some(only) => {
            let clamped = only.min(layout.containers - 1);
            clamped..clamped + 1
        }
        None => 0..layout.containers,
    };

    let mut out = Vec::with_capacity(range.len());
    for index in range {
        let mut records = Vec::new();
        for position in 0..layout.positions {
            let coordinate = Coordinate::slot(index, position);
            let Some(slot) = getter.get(model, coordinate, &layout) else {
                continue;
            };
            if let Some(record) = unwrap_occupied(slot.as_ref(), bounds) {
                records.push((position, record.clone_record()));
            }
        }
        out.push(EnumeratedContainer {
            index,
            name: container_name(model, None, index),
            records,
        });
    }
    Some(out)
}

/// Own name, then `GetBoxName(i)`, then `BoxNames[i]`, then `Box <i+1>`.
pub fn container_name(model: &dyn SaveModel, own: Option<String>, index: usize) -> String {
    if let Some(name) = own.filter(|n| !n.is_empty()) {
        return name;
    }
    if let Some(op) = find(&model.operations(), Role::ContainerName) {
        let args = [Scalar::from(index)];
        if let Ok(Some(name)) =
            invoke_coerced(&op.name, &op.params, &args, |a| model.text(&op.name, a))
        {
            return name;
        }
    }
    if let Some(FieldValue::List(names)) = model.property("BoxNames")
        && let Some(name) = names.get(index).and_then(|v| v.as_text())
    {
        return name.to_string();
    }
    format!("Box {}", index + 1)
}

/// Roster records with their position: the exposed roster list first, then
/// a discovered roster getter over `PartyCount` positions.
pub fn enumerate_roster(model: &dyn SaveModel, bounds: &Bounds) -> Vec<(usize, RecordBox)> {
    if let Some(store) = model.as_roster_store()
        && let Some(slots) = ROSTER_MEMBERS.iter().find_map(|m| store.roster(m))
    {
        return slots
            .into_iter()
            .enumerate()
            .filter_map(|(position, slot)| {
                let record: &dyn Record = unwrap_occupied(slot?, bounds)?;
                Some((position, record.clone_record()))
            })
            .collect();
    }

    let getters = find_all(&model.operations(), Role::GetRoster);
    if getters.is_empty() {
        return Vec::new();
    }
    let size = model
        .property("PartyCount")
        .and_then(|v| v.as_i64())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(DEFAULT_ROSTER_SIZE);
    (0..size)
        .filter_map(|position| {
            let args = [Scalar::from(position)];
            let slot = first_success(&getters, |op| {
                invoke_coerced(&op.name, &op.params, &args, |a| model.get(&op.name, a))
            })
            .ok()
            .flatten()?;
            let record = unwrap_occupied(slot.as_ref(), bounds)?.clone_record();
            Some((position, record))
        })
        .collect()
}
