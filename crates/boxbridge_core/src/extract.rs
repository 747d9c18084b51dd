use serde::{Deserialize, Serialize};

use crate::model::{Bounds, Coordinate, Record};
use crate::names::{NameDomain, NameResolver};
use crate::probe::{Role, call_record_int, find_field};
use crate::value::Scalar;

pub const IDENTITY_FIELD: &str = "Species";
const MOVE_SLOTS: usize = 4;
const NICKNAME_FILLER: char = '\u{ffff}';

/// Members tried, in order, when a slot object wraps the real record.
const WRAPPER_MEMBERS: &[&str] = &[
    "Pokemon",
    "PKM",
    "CurrentPKM",
    "Current",
    "Data",
    "Value",
    "Entity",
    "Mon",
];

const LEVEL_FIELDS: &[&str] = &["CurrentLevel", "Level"];
const FRIENDSHIP_FIELDS: &[&str] = &["OT_Friendship", "Friendship", "CurrentFriendship"];
const TID_FIELDS: &[&str] = &["TID", "TrainerID"];
const SID_FIELDS: &[&str] = &["SID", "SecretID"];
const OT_NAME_FIELDS: &[&str] = &["OT_Name", "OT"];
const HELD_ITEM_FIELDS: &[&str] = &["HeldItem", "Item"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginTag {
    Container,
    Positional,
    Roster,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSpread {
    pub hp: i64,
    pub atk: i64,
    pub def: i64,
    pub spa: i64,
    pub spd: i64,
    pub spe: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntry {
    pub name: String,
    pub move_id: i64,
    pub pp: i64,
}

/// Flattened view of one occupied record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    pub species: String,
    pub species_id: i64,
    pub level: i64,
    pub nature: String,
    pub nature_id: i64,
    pub ability: String,
    pub ability_id: i64,
    pub form: i64,
    pub gender: i64,
    pub friendship: i64,
    pub item_id: i64,
    pub item: String,
    pub ivs: StatSpread,
    pub evs: StatSpread,
    pub nickname: String,
    pub moves: Vec<MoveEntry>,
    pub box_index: i32,
    pub slot_index: usize,
    pub source: OriginTag,
    pub ot_tid: i64,
    pub ot_sid: i64,
    pub ot_name: String,
}

impl FieldSet {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            container: self.box_index,
            position: self.slot_index,
        }
    }
}

pub fn identity(record: &dyn Record) -> Option<i64> {
    record.field(IDENTITY_FIELD).and_then(|v| v.as_i64())
}

/// A record is occupied iff its identity lies in `[1, max_species]`.
pub fn is_occupied(record: &dyn Record, bounds: &Bounds) -> bool {
    identity(record).is_some_and(|id| bounds.species_in_range(id))
}

/// The occupied record behind a slot object, looking through wrappers.
pub fn unwrap_occupied<'a>(record: &'a dyn Record, bounds: &Bounds) -> Option<&'a dyn Record> {
    if is_occupied(record, bounds) {
        return Some(record);
    }
    WRAPPER_MEMBERS
        .iter()
        .filter_map(|member| record.inner(member))
        .find(|inner| is_occupied(*inner, bounds))
}

/// Drops control characters and the fixed-width padding filler, then trims.
pub fn clean_nickname(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != NICKNAME_FILLER && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct Extractor<'a> {
    bounds: Bounds,
    names: &'a dyn NameResolver,
}

impl<'a> Extractor<'a> {
    pub fn new(bounds: Bounds, names: &'a dyn NameResolver) -> Self {
        Self { bounds, names }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// `None` when the slot is empty; every other field is best-effort.
    pub fn extract(
        &self,
        record: &dyn Record,
        coordinate: Coordinate,
        source: OriginTag,
    ) -> Option<FieldSet> {
        let species_id = identity(record).filter(|id| self.bounds.species_in_range(*id))?;

        let nature_id = int_field(record, &["Nature"]);
        let ability_id = int_field(record, &["Ability"]);
        let item_id = int_field(record, HELD_ITEM_FIELDS);

        Some(FieldSet {
            species: self.names.resolve(NameDomain::Species, species_id),
            species_id,
            level: int_field(record, LEVEL_FIELDS),
            nature: self.names.resolve(NameDomain::Nature, nature_id),
            nature_id,
            ability: self.names.resolve(NameDomain::Ability, ability_id),
            ability_id,
            form: int_field(record, &["Form"]),
            gender: int_field(record, &["Gender"]),
            friendship: int_field(record, FRIENDSHIP_FIELDS),
            item_id,
            item: self.names.resolve(NameDomain::Item, item_id),
            ivs: spread(record, "IV"),
            evs: spread(record, "EV"),
            nickname: clean_nickname(&text_field(record, &["Nickname"])),
            moves: self.moves(record),
            box_index: coordinate.container,
            slot_index: coordinate.position,
            source,
            ot_tid: int_field(record, TID_FIELDS),
            ot_sid: int_field(record, SID_FIELDS),
            ot_name: text_field(record, OT_NAME_FIELDS),
        })
    }

    fn moves(&self, record: &dyn Record) -> Vec<MoveEntry> {
        let mut out = Vec::with_capacity(MOVE_SLOTS);
        for slot in 0..MOVE_SLOTS {
            let arg = [Scalar::from(slot)];
            let move_id = call_record_int(record, Role::MoveAt, &arg)
                .or_else(|| {
                    record
                        .field(&format!("Move{}", slot + 1))
                        .and_then(|v| v.as_i64())
                })
                .unwrap_or(0);
            if !self.bounds.move_in_range(move_id) {
                continue;
            }
            let pp = call_record_int(record, Role::MoveUsesAt, &arg)
                .or_else(|| {
                    record
                        .field(&format!("Move{}_PP", slot + 1))
                        .and_then(|v| v.as_i64())
                })
                .unwrap_or(0);
            out.push(MoveEntry {
                name: self.names.resolve(NameDomain::Move, move_id),
                move_id,
                pp,
            });
        }
        out
    }
}

fn int_field(record: &dyn Record, names: &[&str]) -> i64 {
    find_field(record, names)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

fn text_field(record: &dyn Record, names: &[&str]) -> String {
    find_field(record, names)
        .and_then(|v| v.as_text().map(str::to_string))
        .unwrap_or_default()
}

fn spread(record: &dyn Record, prefix: &str) -> StatSpread {
    let stat = |suffix: &str| {
        record
            .field(&format!("{prefix}_{suffix}"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    };
    StatSpread {
        hp: stat("HP"),
        atk: stat("ATK"),
        def: stat("DEF"),
        spa: stat("SPA"),
        spd: stat("SPD"),
        spe: stat("SPE"),
    }
}
