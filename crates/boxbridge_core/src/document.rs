//! JSON save documents, optionally zlib-compressed.
//!
//! A document declares a schema revision and the adapter exposes a different
//! capability set for each one: different accessor names, parameter types,
//! container paths and persistence shapes. Nothing outside this module knows
//! which revision it is talking to.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, CoreErrorCode};
use crate::model::{
    ByteExporter, CallError, ContainerRecordStore, ExportError, ExportSettings, FieldValue, Layout,
    OperationSig, PathExporter, Record, RecordBox, RecordContainer, ReturnKind, RosterStore,
    SaveModel, SettingsExporter, StreamExporter,
};
use crate::provider::{LoadedModel, ModelInfo, ModelProvider};
use crate::value::{IntKind, ParamKind, Scalar};

pub const DOCUMENT_FORMAT: &str = "boxbridge-document/1";
pub const ROSTER_CAPACITY: usize = 6;

const RECORD_TYPE: &str = "DocumentRecord";
const MOVE_SLOTS: usize = 4;
const ZLIB_MAGIC: u8 = 0x78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaRevision {
    Containers,
    Indexed,
    Legacy,
    Settings,
}

impl SchemaRevision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Containers => "containers",
            Self::Indexed => "indexed",
            Self::Legacy => "legacy",
            Self::Settings => "settings",
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            Self::Containers => "ContainerDocument",
            Self::Indexed => "IndexedDocument",
            Self::Legacy => "LegacyDocument",
            Self::Settings => "SettingsDocument",
        }
    }

    /// `(collection path, slot member)` of the container store, if any.
    fn container_store(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Containers | Self::Settings => Some(("Boxes", "Mons")),
            Self::Legacy => Some(("Storage.Boxes", "Slots")),
            Self::Indexed => None,
        }
    }

    fn has_roster_store(self) -> bool {
        matches!(self, Self::Containers | Self::Settings)
    }

    fn record_operations(self) -> bool {
        matches!(self, Self::Containers | Self::Settings)
    }

    /// Whether null slots are handed out as blank records rather than `None`.
    fn blank_placeholders(self) -> bool {
        !matches!(self, Self::Indexed)
    }

    fn operations(self) -> Vec<OperationSig> {
        let int = ParamKind::Int;
        let record = ParamKind::Record;
        match self {
            Self::Containers | Self::Settings => {
                let i32_ = int(IntKind::I32);
                let mut ops = vec![
                    OperationSig::new("GetBoxSlot", vec![i32_, i32_], ReturnKind::Record),
                    OperationSig::new("SetBoxSlot", vec![i32_, i32_, record], ReturnKind::Unit),
                    OperationSig::new("GetPartySlot", vec![i32_], ReturnKind::Record),
                    OperationSig::new("SetPartySlot", vec![i32_, record], ReturnKind::Unit),
                ];
                if self == Self::Settings {
                    ops.push(OperationSig::new("GetBoxName", vec![i32_], ReturnKind::Text));
                }
                ops
            }
            Self::Indexed => vec![
                OperationSig::new("GetPCSlot", vec![int(IntKind::U16)], ReturnKind::Record),
                OperationSig::new(
                    "SetBoxSlotAtIndex",
                    vec![int(IntKind::I32), record],
                    ReturnKind::Unit,
                ),
                OperationSig::new("GetPartySlot", vec![int(IntKind::U8)], ReturnKind::Record),
                OperationSig::new(
                    "SetPartySlot",
                    vec![int(IntKind::U8), record],
                    ReturnKind::Unit,
                ),
            ],
            Self::Legacy => vec![
                OperationSig::new(
                    "GetDecryptedBoxSlot",
                    vec![int(IntKind::U8), int(IntKind::U8)],
                    ReturnKind::Record,
                ),
                OperationSig::new(
                    "SetDecryptedBoxSlot",
                    vec![int(IntKind::U8), int(IntKind::U8), record],
                    ReturnKind::Unit,
                ),
            ],
        }
    }
}

/// One record inside a document: a flat map of named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentRecord {
    fields: BTreeMap<String, FieldValue>,
    move_ops: bool,
}

impl DocumentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    fn blank(move_ops: bool) -> Self {
        Self {
            fields: BTreeMap::from([("Species".to_string(), FieldValue::int(0))]),
            move_ops,
        }
    }

    /// Copies every advertised field of an arbitrary record.
    fn from_record(record: &dyn Record, move_ops: bool) -> Self {
        let fields = record
            .field_names()
            .into_iter()
            .filter_map(|name| record.field(&name).map(|value| (name, value)))
            .collect();
        Self { fields, move_ops }
    }

    fn is_blank(&self) -> bool {
        self.fields
            .get("Species")
            .and_then(FieldValue::as_i64)
            .is_none_or(|species| species == 0)
    }

    fn from_json(value: &JsonValue, move_ops: bool) -> Result<Self, String> {
        let JsonValue::Object(map) = value else {
            return Err("record must be a JSON object".to_string());
        };
        let mut fields = BTreeMap::new();
        for (name, raw) in map {
            if raw.is_null() {
                continue;
            }
            let value = field_from_json(raw).map_err(|e| format!("field {name}: {e}"))?;
            fields.insert(name.clone(), value);
        }
        Ok(Self { fields, move_ops })
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), field_to_json(value)))
                .collect(),
        )
    }

    fn move_field(
        &self,
        operation: &str,
        args: &[Scalar],
        suffix: &str,
    ) -> Result<FieldValue, CallError> {
        let sig = OperationSig::new(
            operation,
            vec![ParamKind::Int(IntKind::I32)],
            ReturnKind::Int,
        );
        sig.check_args(args)?;
        let index = usize::try_from(args[0].as_i128())
            .ok()
            .filter(|i| *i < MOVE_SLOTS)
            .ok_or_else(|| CallError::OutOfRange {
                operation: operation.to_string(),
            })?;
        Ok(self
            .fields
            .get(&format!("Move{}{suffix}", index + 1))
            .cloned()
            .unwrap_or_else(|| FieldValue::int(0)))
    }
}

impl Record for DocumentRecord {
    fn type_name(&self) -> &str {
        RECORD_TYPE
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).cloned()
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CallError> {
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn operations(&self) -> Vec<OperationSig> {
        if !self.move_ops {
            return Vec::new();
        }
        let i32_ = ParamKind::Int(IntKind::I32);
        vec![
            OperationSig::new("GetMove", vec![i32_], ReturnKind::Int),
            OperationSig::new("GetMovePP", vec![i32_], ReturnKind::Int),
        ]
    }

    fn call(&self, operation: &str, args: &[Scalar]) -> Result<FieldValue, CallError> {
        match operation {
            "GetMove" if self.move_ops => self.move_field(operation, args, ""),
            "GetMovePP" if self.move_ops => self.move_field(operation, args, "_PP"),
            _ => Err(CallError::UnknownOperation(operation.to_string())),
        }
    }

    fn clone_record(&self) -> RecordBox {
        Box::new(self.clone())
    }
}

fn field_from_json(raw: &JsonValue) -> Result<FieldValue, String> {
    match raw {
        JsonValue::String(text) => Ok(FieldValue::Text(text.clone())),
        JsonValue::Number(number) => {
            let value = number
                .as_i64()
                .map(i128::from)
                .ok_or_else(|| format!("{number} is not an integer"))?;
            IntKind::narrowest_for(value)
                .and_then(|kind| Scalar::of_kind(kind, value))
                .map(FieldValue::Int)
                .ok_or_else(|| format!("{number} is out of range"))
        }
        JsonValue::Array(items) => items
            .iter()
            .map(field_from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::List),
        other => Err(format!("unsupported value {other}")),
    }
}

fn field_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Int(scalar) => JsonValue::from(scalar.as_i64()),
        FieldValue::Text(text) => JsonValue::from(text.as_str()),
        FieldValue::List(items) => JsonValue::Array(items.iter().map(field_to_json).collect()),
    }
}

#[derive(Debug, Clone)]
struct DocumentContainer {
    name: Option<String>,
    member: &'static str,
    slots: Vec<Option<DocumentRecord>>,
}

impl RecordContainer for DocumentContainer {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn slots(&self, member: &str) -> Option<Vec<Option<&dyn Record>>> {
        if member != self.member {
            return None;
        }
        Some(
            self.slots
                .iter()
                .map(|slot| slot.as_ref().map(|r| r as &dyn Record))
                .collect(),
        )
    }
}

/// On-disk shape of a document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentFile {
    format: String,
    schema: SchemaRevision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    game: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generation: Option<u8>,
    #[serde(default)]
    trainer: serde_json::Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    box_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    box_slot_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    box_names: Vec<String>,
    #[serde(default)]
    party: Vec<JsonValue>,
    #[serde(default)]
    boxes: Vec<Vec<JsonValue>>,
}

enum SlotRef {
    Container(usize, usize),
    Roster(usize),
}

#[derive(Debug, Clone)]
pub struct DocumentModel {
    revision: SchemaRevision,
    game: Option<String>,
    generation: Option<u8>,
    trainer: BTreeMap<String, FieldValue>,
    box_slot_count: usize,
    box_names: Vec<String>,
    party: Vec<Option<DocumentRecord>>,
    boxes: Vec<DocumentContainer>,
    compressed: bool,
}

impl DocumentModel {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let compressed = looks_like_zlib(bytes);
        let text = if compressed {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| format!("zlib decode failed: {e}"))?;
            out
        } else {
            bytes.to_vec()
        };
        let file: DocumentFile =
            serde_json::from_slice(&text).map_err(|e| format!("invalid document: {e}"))?;
        Self::from_file(file, compressed)
    }

    fn from_file(file: DocumentFile, compressed: bool) -> Result<Self, String> {
        if file.format != DOCUMENT_FORMAT {
            return Err(format!(
                "unsupported document format '{}', expected '{DOCUMENT_FORMAT}'",
                file.format
            ));
        }
        let revision = file.schema;
        let move_ops = revision.record_operations();

        let box_count = file
            .box_count
            .unwrap_or(if file.boxes.is_empty() {
                Layout::DEFAULT_CONTAINERS
            } else {
                file.boxes.len()
            });
        let box_slot_count = file.box_slot_count.unwrap_or_else(|| {
            file.boxes
                .iter()
                .map(Vec::len)
                .max()
                .unwrap_or(Layout::DEFAULT_POSITIONS)
        });
        if box_count == 0 || box_slot_count == 0 {
            return Err("box_count and box_slot_count must be positive".to_string());
        }
        if file.boxes.len() > box_count {
            return Err(format!(
                "{} boxes listed but box_count is {box_count}",
                file.boxes.len()
            ));
        }
        if file.party.len() > ROSTER_CAPACITY {
            return Err(format!(
                "party holds {} records, at most {ROSTER_CAPACITY} allowed",
                file.party.len()
            ));
        }

        let party = parse_slots(&file.party, ROSTER_CAPACITY, "party", move_ops)?;
        let own_names = revision == SchemaRevision::Containers;
        let member = revision.container_store().map_or("Slots", |(_, member)| member);
        let mut boxes = Vec::with_capacity(box_count);
        for index in 0..box_count {
            let raw = file.boxes.get(index).map(Vec::as_slice).unwrap_or(&[]);
            boxes.push(DocumentContainer {
                name: file.box_names.get(index).cloned().filter(|_| own_names),
                member,
                slots: parse_slots(raw, box_slot_count, &format!("box {index}"), move_ops)?,
            });
        }

        let mut trainer = BTreeMap::new();
        for (name, raw) in &file.trainer {
            let value = field_from_json(raw).map_err(|e| format!("trainer {name}: {e}"))?;
            trainer.insert(name.clone(), value);
        }

        Ok(Self {
            revision,
            game: file.game,
            generation: file.generation,
            trainer,
            box_slot_count,
            box_names: file.box_names,
            party,
            boxes,
            compressed,
        })
    }

    pub fn revision(&self) -> SchemaRevision {
        self.revision
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            description: self.game.clone(),
            generation: self.generation,
            schema: self.revision.as_str().to_string(),
        }
    }

    /// Serializes the document back to its on-disk form, recompressing when
    /// the source was compressed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let slots_json = |slots: &[Option<DocumentRecord>]| {
            slots
                .iter()
                .map(|slot| match slot {
                    Some(record) if !record.is_blank() => record.to_json(),
                    _ => JsonValue::Null,
                })
                .collect::<Vec<_>>()
        };
        let file = DocumentFile {
            format: DOCUMENT_FORMAT.to_string(),
            schema: self.revision,
            game: self.game.clone(),
            generation: self.generation,
            trainer: self
                .trainer
                .iter()
                .map(|(name, value)| (name.clone(), field_to_json(value)))
                .collect(),
            box_count: Some(self.boxes.len()),
            box_slot_count: Some(self.box_slot_count),
            box_names: self.box_names.clone(),
            party: slots_json(&self.party),
            boxes: self.boxes.iter().map(|b| slots_json(&b.slots)).collect(),
        };
        let mut json =
            serde_json::to_vec_pretty(&file).map_err(|e| ExportError::Failed(e.to_string()))?;
        json.push(b'\n');
        if !self.compressed {
            return Ok(json);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    fn signature(&self, operation: &str, returns: ReturnKind) -> Result<OperationSig, CallError> {
        self.revision
            .operations()
            .into_iter()
            .find(|sig| sig.name == operation && sig.returns == returns)
            .ok_or_else(|| CallError::UnknownOperation(operation.to_string()))
    }

    fn resolve(&self, operation: &str, args: &[Scalar]) -> Result<SlotRef, CallError> {
        let out_of_range = || CallError::OutOfRange {
            operation: operation.to_string(),
        };
        let index = |i: usize| {
            args.get(i)
                .and_then(|a| usize::try_from(a.as_i128()).ok())
                .ok_or_else(out_of_range)
        };
        let at = match operation {
            "GetBoxSlot" | "SetBoxSlot" | "GetDecryptedBoxSlot" | "SetDecryptedBoxSlot" => {
                SlotRef::Container(index(0)?, index(1)?)
            }
            "GetPCSlot" | "SetBoxSlotAtIndex" => {
                let flat = index(0)?;
                SlotRef::Container(flat / self.box_slot_count, flat % self.box_slot_count)
            }
            "GetPartySlot" | "SetPartySlot" => SlotRef::Roster(index(0)?),
            _ => return Err(CallError::UnknownOperation(operation.to_string())),
        };
        let in_range = match at {
            SlotRef::Container(c, p) => c < self.boxes.len() && p < self.box_slot_count,
            SlotRef::Roster(p) => p < self.party.len(),
        };
        if in_range { Ok(at) } else { Err(out_of_range()) }
    }

    fn slot(&self, at: &SlotRef) -> Option<&DocumentRecord> {
        match *at {
            SlotRef::Container(c, p) => self.boxes[c].slots[p].as_ref(),
            SlotRef::Roster(p) => self.party[p].as_ref(),
        }
    }

    fn slot_mut(&mut self, at: &SlotRef) -> &mut Option<DocumentRecord> {
        match *at {
            SlotRef::Container(c, p) => &mut self.boxes[c].slots[p],
            SlotRef::Roster(p) => &mut self.party[p],
        }
    }
}

fn parse_slots(
    raw: &[JsonValue],
    capacity: usize,
    what: &str,
    move_ops: bool,
) -> Result<Vec<Option<DocumentRecord>>, String> {
    if raw.len() > capacity {
        return Err(format!(
            "{what} holds {} slots, capacity is {capacity}",
            raw.len()
        ));
    }
    let mut slots = Vec::with_capacity(capacity);
    for (index, value) in raw.iter().enumerate() {
        let slot = if value.is_null() {
            None
        } else {
            let record = DocumentRecord::from_json(value, move_ops)
                .map_err(|e| format!("{what} slot {index}: {e}"))?;
            Some(record).filter(|r| !r.is_blank())
        };
        slots.push(slot);
    }
    slots.resize(capacity, None);
    Ok(slots)
}

fn looks_like_zlib(bytes: &[u8]) -> bool {
    match bytes {
        [first, second, ..] => {
            *first == ZLIB_MAGIC && ((u16::from(*first) << 8) | u16::from(*second)) % 31 == 0
        }
        _ => false,
    }
}

impl SaveModel for DocumentModel {
    fn type_name(&self) -> &str {
        self.revision.type_name()
    }

    fn property(&self, name: &str) -> Option<FieldValue> {
        let count = |n: usize| FieldValue::int(i64::try_from(n).unwrap_or(i64::MAX));
        match name {
            "BoxCount" => Some(count(self.boxes.len())),
            "BoxSlotCount" => Some(count(self.box_slot_count)),
            "PartyCount" => Some(count(self.party.len())),
            "BoxNames" if !self.box_names.is_empty() => Some(FieldValue::List(
                self.box_names.iter().cloned().map(FieldValue::Text).collect(),
            )),
            "Generation" => self.generation.map(|g| FieldValue::int(i64::from(g))),
            other => self.trainer.get(other).cloned(),
        }
    }

    fn operations(&self) -> Vec<OperationSig> {
        self.revision.operations()
    }

    fn get(&self, operation: &str, args: &[Scalar]) -> Result<Option<RecordBox>, CallError> {
        self.signature(operation, ReturnKind::Record)?.check_args(args)?;
        let at = self.resolve(operation, args)?;
        let record = match self.slot(&at) {
            Some(record) => Some(record.clone()),
            None if self.revision.blank_placeholders() => {
                Some(DocumentRecord::blank(self.revision.record_operations()))
            }
            None => None,
        };
        Ok(record.map(|r| Box::new(r) as RecordBox))
    }

    fn set(
        &mut self,
        operation: &str,
        args: &[Scalar],
        record: Option<RecordBox>,
    ) -> Result<(), CallError> {
        self.signature(operation, ReturnKind::Unit)?.check_args(args)?;
        let at = self.resolve(operation, args)?;
        let Some(record) = record else {
            if self.revision == SchemaRevision::Legacy {
                return Err(CallError::Rejected {
                    operation: operation.to_string(),
                    reason: "slot writes require a record".to_string(),
                });
            }
            *self.slot_mut(&at) = None;
            return Ok(());
        };
        let stored = DocumentRecord::from_record(record.as_ref(), self.revision.record_operations());
        *self.slot_mut(&at) = Some(stored).filter(|r| !r.is_blank());
        Ok(())
    }

    fn text(&self, operation: &str, args: &[Scalar]) -> Result<Option<String>, CallError> {
        self.signature(operation, ReturnKind::Text)?.check_args(args)?;
        let index = usize::try_from(args[0].as_i128()).ok();
        Ok(index.and_then(|i| self.box_names.get(i).cloned()))
    }

    fn as_container_store(&self) -> Option<&dyn ContainerRecordStore> {
        self.revision.container_store().map(|_| self as &dyn ContainerRecordStore)
    }

    fn as_roster_store(&self) -> Option<&dyn RosterStore> {
        if self.revision.has_roster_store() {
            Some(self)
        } else {
            None
        }
    }

    fn as_byte_exporter(&self) -> Option<&dyn ByteExporter> {
        (self.revision == SchemaRevision::Containers).then_some(self as &dyn ByteExporter)
    }

    fn as_path_exporter(&self) -> Option<&dyn PathExporter> {
        (self.revision == SchemaRevision::Legacy).then_some(self as &dyn PathExporter)
    }

    fn as_stream_exporter(&self) -> Option<&dyn StreamExporter> {
        (self.revision == SchemaRevision::Indexed).then_some(self as &dyn StreamExporter)
    }

    fn as_settings_exporter(&self) -> Option<&dyn SettingsExporter> {
        (self.revision == SchemaRevision::Settings).then_some(self as &dyn SettingsExporter)
    }
}

impl ContainerRecordStore for DocumentModel {
    fn collection(&self, path: &str) -> Option<Vec<&dyn RecordContainer>> {
        let (expected, _) = self.revision.container_store()?;
        if path != expected {
            return None;
        }
        Some(
            self.boxes
                .iter()
                .map(|b| b as &dyn RecordContainer)
                .collect(),
        )
    }
}

impl RosterStore for DocumentModel {
    fn roster(&self, member: &str) -> Option<Vec<Option<&dyn Record>>> {
        if member != "PartyData" {
            return None;
        }
        Some(
            self.party
                .iter()
                .map(|slot| slot.as_ref().map(|r| r as &dyn Record))
                .collect(),
        )
    }
}

impl ByteExporter for DocumentModel {
    fn export_bytes(&self) -> Result<Vec<u8>, ExportError> {
        self.to_bytes()
    }
}

impl PathExporter for DocumentModel {
    fn export_to_path(&self, path: &Path) -> Result<bool, ExportError> {
        fs::write(path, self.to_bytes()?)?;
        Ok(true)
    }
}

impl StreamExporter for DocumentModel {
    fn export_to_writer(&self, sink: &mut dyn Write) -> Result<(), ExportError> {
        sink.write_all(&self.to_bytes()?)?;
        Ok(())
    }
}

impl SettingsExporter for DocumentModel {
    fn construct_settings(&self) -> Option<ExportSettings> {
        Some(ExportSettings {
            include_header: true,
            include_footer: false,
        })
    }

    fn export_with_settings(&self, settings: &ExportSettings) -> Result<Vec<u8>, ExportError> {
        if !settings.include_header {
            return Err(ExportError::Failed(
                "documents cannot be written without their format header".to_string(),
            ));
        }
        self.to_bytes()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentProvider;

impl DocumentProvider {
    pub const NAME: &'static str = "document";

    pub fn new() -> Self {
        Self
    }
}

impl ModelProvider for DocumentProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&self, path: &Path) -> Result<LoadedModel, CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::ModelLoad,
                format!("could not read {}: {e}", path.display()),
            )
        })?;
        let model = DocumentModel::from_bytes(&bytes).map_err(|e| {
            CoreError::new(
                CoreErrorCode::ModelLoad,
                format!("could not load {}: {e}", path.display()),
            )
        })?;
        let info = model.info();
        Ok(LoadedModel {
            model: Box::new(model),
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentModel, SchemaRevision, looks_like_zlib};
    use crate::model::{FieldValue, Record, SaveModel};
    use crate::value::Scalar;

    const LEGACY: &str = r#"{
        "format": "boxbridge-document/1",
        "schema": "legacy",
        "box_count": 2,
        "box_slot_count": 3,
        "boxes": [[{"Species": 25, "Move1": 84}, null, {"Species": 0}]]
    }"#;

    #[test]
    fn pads_boxes_and_drops_blank_records() {
        let model = DocumentModel::from_bytes(LEGACY.as_bytes()).expect("parse");
        assert_eq!(model.revision(), SchemaRevision::Legacy);
        assert_eq!(model.property("BoxCount"), Some(FieldValue::int(2)));
        assert_eq!(model.property("PartyCount"), Some(FieldValue::int(6)));
        assert!(model.boxes[0].slots[2].is_none());
        assert_eq!(model.boxes[1].slots.len(), 3);
    }

    #[test]
    fn legacy_getter_requires_declared_byte_arguments() {
        let model = DocumentModel::from_bytes(LEGACY.as_bytes()).expect("parse");
        let err = model
            .get("GetDecryptedBoxSlot", &[Scalar::I32(0), Scalar::I32(0)])
            .expect_err("i32 arguments should be rejected");
        assert!(err.is_shape_rejection());

        let slot = model
            .get("GetDecryptedBoxSlot", &[Scalar::U8(0), Scalar::U8(0)])
            .expect("byte arguments accepted")
            .expect("slot present");
        assert_eq!(slot.field("Species").and_then(|v| v.as_i64()), Some(25));
        assert!(slot.operations().is_empty());
    }

    #[test]
    fn legacy_setter_refuses_the_empty_sentinel() {
        let mut model = DocumentModel::from_bytes(LEGACY.as_bytes()).expect("parse");
        let err = model
            .set("SetDecryptedBoxSlot", &[Scalar::U8(0), Scalar::U8(0)], None)
            .expect_err("sentinel rejected");
        assert!(!err.is_shape_rejection());
    }

    #[test]
    fn rejects_foreign_format_tag() {
        let err = DocumentModel::from_bytes(br#"{"format":"other/9","schema":"indexed"}"#)
            .expect_err("foreign format");
        assert!(err.contains("unsupported document format"));
    }

    #[test]
    fn compressed_documents_round_trip_compressed() {
        let model = DocumentModel::from_bytes(LEGACY.as_bytes()).expect("parse");
        assert!(!model.is_compressed());

        let mut packed = model.clone();
        packed.compressed = true;
        let bytes = packed.to_bytes().expect("encode");
        assert!(looks_like_zlib(&bytes));

        let reopened = DocumentModel::from_bytes(&bytes).expect("decode");
        assert!(reopened.is_compressed());
        assert_eq!(reopened.to_bytes().expect("encode"), bytes);
    }

    #[test]
    fn plain_json_is_not_mistaken_for_zlib() {
        assert!(!looks_like_zlib(b"{\"format\": 1}"));
        assert!(!looks_like_zlib(b"x"));
    }
}
