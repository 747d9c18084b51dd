use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use boxbridge_core::CoreErrorCode;
use boxbridge_core::enumerate::{
    DiscoveryMode, PositionalVariant, Strategy, enumerate_containers, enumerate_roster,
};
use boxbridge_core::extract::{Extractor, OriginTag};
use boxbridge_core::model::{
    Bounds, CallError, ContainerRecordStore, Coordinate, ExportError, FieldValue, OperationSig,
    PathExporter, Record, RecordBox, RecordContainer, ReturnKind, SaveModel, SaveUtility,
    StreamExporter,
};
use boxbridge_core::mutate::{MutationEngine, Origin, backup_path};
use boxbridge_core::names::NumericNames;
use boxbridge_core::persist::{PersistShape, PersistenceSelector, temp_path};
use boxbridge_core::value::{IntKind, ParamKind, Scalar};
use tempfile::TempDir;

#[derive(Debug, Clone, Default)]
struct Mon {
    fields: BTreeMap<String, FieldValue>,
    wrapped: Option<Box<Mon>>,
}

impl Mon {
    fn species(id: i64) -> Self {
        Self::default().with("Species", id)
    }

    fn with(mut self, name: &str, value: i64) -> Self {
        self.fields.insert(name.to_string(), FieldValue::int(value));
        self
    }

    fn wrapper(inner: Mon) -> Self {
        Self {
            fields: BTreeMap::new(),
            wrapped: Some(Box::new(inner)),
        }
    }

    fn copy_of(record: &dyn Record) -> Self {
        let fields = record
            .field_names()
            .into_iter()
            .filter_map(|name| record.field(&name).map(|v| (name, v)))
            .collect();
        Self {
            fields,
            wrapped: record.inner("Pokemon").map(|inner| Box::new(Self::copy_of(inner))),
        }
    }
}

impl Record for Mon {
    fn type_name(&self) -> &str {
        if self.wrapped.is_some() {
            "SlotWrapper"
        } else {
            "Mon"
        }
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

    fn inner(&self, member: &str) -> Option<&dyn Record> {
        match member {
            "Pokemon" => self.wrapped.as_deref().map(|m| m as &dyn Record),
            _ => None,
        }
    }

    fn clone_record(&self) -> RecordBox {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
struct GridBox {
    slots: Vec<Option<Mon>>,
}

impl RecordContainer for GridBox {
    fn slots(&self, member: &str) -> Option<Vec<Option<&dyn Record>>> {
        (member == "Mons").then(|| {
            self.slots
                .iter()
                .map(|slot| slot.as_ref().map(|m| m as &dyn Record))
                .collect()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persistence {
    Stream,
    Declines,
    /// Writes part of the file in place, then fails.
    Truncates,
    Nothing,
}

/// A box grid whose accessor names, container store and persistence shape
/// are chosen per test.
#[derive(Debug, Clone)]
struct Grid {
    boxes: Vec<GridBox>,
    positions: usize,
    store: bool,
    /// When set, the container store serves this snapshot instead of `boxes`.
    snapshot: Option<Vec<GridBox>>,
    operations: Vec<OperationSig>,
    persistence: Persistence,
}

impl Grid {
    fn new(containers: usize, positions: usize) -> Self {
        let i32_ = ParamKind::Int(IntKind::I32);
        Self {
            boxes: vec![
                GridBox {
                    slots: vec![None; positions]
                };
                containers
            ],
            positions,
            store: false,
            snapshot: None,
            operations: vec![
                OperationSig::new("GetBoxSlot", vec![i32_, i32_], ReturnKind::Record),
                OperationSig::new(
                    "SetBoxSlot",
                    vec![i32_, i32_, ParamKind::Record],
                    ReturnKind::Unit,
                ),
            ],
            persistence: Persistence::Stream,
        }
    }

    fn with_store(mut self) -> Self {
        self.store = true;
        self
    }

    /// Freezes what the container store reports; later placements are only
    /// visible through the positional getter.
    fn with_stale_store(mut self) -> Self {
        self.store = true;
        self.snapshot = Some(self.boxes.clone());
        self
    }

    fn without_operations(mut self) -> Self {
        self.operations.clear();
        self
    }

    fn persisting(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    fn place(mut self, container: usize, position: usize, mon: Mon) -> Self {
        self.boxes[container].slots[position] = Some(mon);
        self
    }

    fn species_at(&self, container: usize, position: usize) -> Option<i64> {
        self.boxes[container].slots[position]
            .as_ref()
            .and_then(|m| m.field("Species"))
            .and_then(|v| v.as_i64())
    }

    fn dump(&self) -> Vec<u8> {
        let mut out = String::new();
        for (c, b) in self.boxes.iter().enumerate() {
            for (p, slot) in b.slots.iter().enumerate() {
                if let Some(species) = slot
                    .as_ref()
                    .and_then(|m| m.field("Species"))
                    .and_then(|v| v.as_i64())
                {
                    out.push_str(&format!("{c}/{p}={species}\n"));
                }
            }
        }
        out.into_bytes()
    }

    fn signature(&self, operation: &str, returns: ReturnKind) -> Result<OperationSig, CallError> {
        self.operations
            .iter()
            .find(|sig| sig.name == operation && sig.returns == returns)
            .cloned()
            .ok_or_else(|| CallError::UnknownOperation(operation.to_string()))
    }

    fn locate(&self, operation: &str, args: &[Scalar]) -> Result<(usize, usize), CallError> {
        let ints: Vec<usize> = args
            .iter()
            .map(|a| usize::try_from(a.as_i128()).unwrap_or(usize::MAX))
            .collect();
        let (c, p) = match ints.as_slice() {
            [c, p] => (*c, *p),
            [flat] => (flat / self.positions, flat % self.positions),
            _ => (usize::MAX, usize::MAX),
        };
        if c < self.boxes.len() && p < self.positions {
            Ok((c, p))
        } else {
            Err(CallError::OutOfRange {
                operation: operation.to_string(),
            })
        }
    }
}

impl SaveModel for Grid {
    fn type_name(&self) -> &str {
        "Grid"
    }

    fn property(&self, name: &str) -> Option<FieldValue> {
        match name {
            "BoxCount" => Some(FieldValue::int(self.boxes.len() as i64)),
            "BoxSlotCount" => Some(FieldValue::int(self.positions as i64)),
            _ => None,
        }
    }

    fn operations(&self) -> Vec<OperationSig> {
        self.operations.clone()
    }

    fn get(&self, operation: &str, args: &[Scalar]) -> Result<Option<RecordBox>, CallError> {
        self.signature(operation, ReturnKind::Record)?
            .check_args(args)?;
        let (c, p) = self.locate(operation, args)?;
        Ok(self.boxes[c].slots[p]
            .clone()
            .map(|m| Box::new(m) as RecordBox))
    }

    fn set(
        &mut self,
        operation: &str,
        args: &[Scalar],
        record: Option<RecordBox>,
    ) -> Result<(), CallError> {
        self.signature(operation, ReturnKind::Unit)?
            .check_args(args)?;
        let (c, p) = self.locate(operation, args)?;
        self.boxes[c].slots[p] = record.map(|r| Mon::copy_of(r.as_ref()));
        Ok(())
    }

    fn as_container_store(&self) -> Option<&dyn ContainerRecordStore> {
        self.store.then_some(self as &dyn ContainerRecordStore)
    }

    fn as_path_exporter(&self) -> Option<&dyn PathExporter> {
        matches!(
            self.persistence,
            Persistence::Declines | Persistence::Truncates
        )
        .then_some(self as &dyn PathExporter)
    }

    fn as_stream_exporter(&self) -> Option<&dyn StreamExporter> {
        (self.persistence == Persistence::Stream).then_some(self as &dyn StreamExporter)
    }
}

impl ContainerRecordStore for Grid {
    fn collection(&self, path: &str) -> Option<Vec<&dyn RecordContainer>> {
        (path == "Boxes").then(|| {
            self.snapshot
                .as_ref()
                .unwrap_or(&self.boxes)
                .iter()
                .map(|b| b as &dyn RecordContainer)
                .collect()
        })
    }
}

impl StreamExporter for Grid {
    fn export_to_writer(&self, sink: &mut dyn Write) -> Result<(), ExportError> {
        sink.write_all(&self.dump())?;
        Ok(())
    }
}

impl PathExporter for Grid {
    fn export_to_path(&self, path: &Path) -> Result<bool, ExportError> {
        if self.persistence != Persistence::Truncates {
            return Ok(false);
        }
        let dump = self.dump();
        fs::write(path, &dump[..dump.len() / 2])?;
        Err(ExportError::Failed("disk full".to_string()))
    }
}

struct DumpUtility;

impl SaveUtility for DumpUtility {
    fn write_model(&self, model: &dyn SaveModel, path: &Path) -> Result<bool, ExportError> {
        fs::write(path, format!("written by utility: {}", model.type_name()))?;
        Ok(true)
    }
}

fn saved(dir: &TempDir, name: &str, grid: &Grid) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, grid.dump()).expect("seed save file");
    path
}

#[test]
fn auto_mode_prefers_container_store_results() {
    let grid = Grid::new(2, 4).with_store().place(0, 2, Mon::species(25));
    let found = enumerate_containers(&grid, DiscoveryMode::Auto, None, &Bounds::GEN4);
    assert_eq!(found.strategy, Some(Strategy::Container));
    assert_eq!(found.occupied(), 1);
    assert_eq!(found.containers[0].name, "Box 1");

    let positional_only = Grid::new(2, 4).place(1, 3, Mon::species(25));
    let found = enumerate_containers(&positional_only, DiscoveryMode::Auto, None, &Bounds::GEN4);
    assert_eq!(
        found.strategy,
        Some(Strategy::Positional(PositionalVariant::BoxSlot))
    );
    assert_eq!(found.containers[1].records[0].0, 3);
}

#[test]
fn auto_mode_keeps_container_store_when_getter_sees_more() {
    let grid = Grid::new(2, 4)
        .place(0, 0, Mon::species(1))
        .with_stale_store()
        .place(0, 1, Mon::species(4))
        .place(1, 2, Mon::species(7));

    let positional = enumerate_containers(
        &grid,
        DiscoveryMode::Positional(PositionalVariant::BoxSlot),
        None,
        &Bounds::GEN4,
    );
    assert_eq!(
        positional.strategy,
        Some(Strategy::Positional(PositionalVariant::BoxSlot))
    );
    assert_eq!(positional.occupied(), 3);

    let found = enumerate_containers(&grid, DiscoveryMode::Auto, None, &Bounds::GEN4);
    assert_eq!(found.strategy, Some(Strategy::Container));
    assert_eq!(found.occupied(), 1);
    assert_eq!(found.containers[0].records[0].0, 0);
}

#[test]
fn forced_variant_without_getter_falls_back_to_container_store() {
    let grid = Grid::new(2, 4).with_store().place(1, 0, Mon::species(7));
    let found = enumerate_containers(
        &grid,
        DiscoveryMode::Positional(PositionalVariant::Decrypted),
        None,
        &Bounds::GEN4,
    );
    assert_eq!(found.strategy, Some(Strategy::Container));
    assert_eq!(found.occupied(), 1);
}

#[test]
fn nothing_discoverable_yields_empty_enumeration() {
    let grid = Grid::new(2, 4).without_operations().place(0, 0, Mon::species(1));
    let found = enumerate_containers(&grid, DiscoveryMode::Auto, None, &Bounds::GEN4);
    assert_eq!(found.strategy, None);
    assert_eq!(found.occupied(), 0);
    assert!(enumerate_roster(&grid, &Bounds::GEN4).is_empty());
}

#[test]
fn quarantined_record_relocates_to_first_slot() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut grid = Grid::new(18, 30).place(17, 0, Mon::species(25));
    let path = saved(&dir, "save.dat", &grid);
    let original = fs::read(&path).expect("read");

    let ack = MutationEngine::new(Bounds::GEN4)
        .relocate(&mut grid, &path, Coordinate::slot(17, 0))
        .expect("relocate");

    assert_eq!(ack.destination(), Coordinate::slot(0, 0));
    assert_eq!(grid.species_at(0, 0), Some(25));
    assert_eq!(grid.species_at(17, 0), None);
    assert_eq!(fs::read(&path).expect("read"), grid.dump());
    assert_eq!(fs::read(backup_path(&path)).expect("backup"), original);
    assert!(!temp_path(&path).exists());
}

#[test]
fn relocation_skips_occupied_and_quarantine_slots() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut grid = Grid::new(18, 2)
        .place(0, 0, Mon::species(1))
        .place(0, 1, Mon::species(2))
        .place(17, 1, Mon::species(3));
    let path = saved(&dir, "save.dat", &grid);

    let ack = MutationEngine::new(Bounds::GEN4)
        .relocate(&mut grid, &path, Coordinate::slot(17, 1))
        .expect("relocate");
    assert_eq!(ack.destination(), Coordinate::slot(1, 0));
}

#[test]
fn empty_source_fails_without_backup_or_write() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut grid = Grid::new(18, 30);
    let path = saved(&dir, "save.dat", &grid);
    let before = fs::read(&path).expect("read");

    let err = MutationEngine::new(Bounds::GEN4)
        .relocate(&mut grid, &path, Coordinate::slot(17, 3))
        .expect_err("empty source");
    assert_eq!(err.code, CoreErrorCode::EmptySource);
    assert!(!backup_path(&path).exists());
    assert_eq!(fs::read(&path).expect("read"), before);
}

#[test]
fn full_layout_reports_no_free_destination() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut grid = Grid::new(2, 2)
        .place(0, 0, Mon::species(1))
        .place(0, 1, Mon::species(2))
        .place(1, 0, Mon::species(3))
        .place(1, 1, Mon::species(4));
    let path = saved(&dir, "save.dat", &grid);

    let err = MutationEngine::new(Bounds::GEN4)
        .relocate(&mut grid, &path, Coordinate::slot(1, 1))
        .expect_err("grid is full");
    assert_eq!(err.code, CoreErrorCode::NoFreeDestination);
    assert!(!backup_path(&path).exists());
}

#[test]
fn model_without_slot_operations_has_no_accessor() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut grid = Grid::new(2, 2)
        .without_operations()
        .place(1, 1, Mon::species(4));
    let path = saved(&dir, "save.dat", &grid);

    let err = MutationEngine::new(Bounds::GEN4)
        .relocate(&mut grid, &path, Coordinate::slot(1, 1))
        .expect_err("no accessors");
    assert_eq!(err.code, CoreErrorCode::NoAccessor);
}

#[test]
fn failed_destination_write_restores_source_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut src = Grid::new(2, 2).place(0, 1, Mon::species(150));
    let mut dst = Grid::new(2, 2).persisting(Persistence::Declines);
    let src_path = saved(&dir, "src.dat", &src);
    let dst_path = saved(&dir, "dst.dat", &dst);
    let src_before = fs::read(&src_path).expect("read");

    let err = MutationEngine::new(Bounds::GEN4)
        .transfer(
            &mut src,
            &src_path,
            &mut dst,
            &dst_path,
            Origin::Container {
                container: 0,
                position: 1,
            },
        )
        .expect_err("destination cannot be written");

    assert_eq!(err.code, CoreErrorCode::PersistenceFailed);
    assert_eq!(fs::read(&src_path).expect("read"), src_before);
    assert!(backup_path(&src_path).exists());
    assert!(backup_path(&dst_path).exists());
}

#[test]
fn failed_in_place_destination_write_is_rolled_back() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut src = Grid::new(2, 2).place(1, 1, Mon::species(150));
    let mut dst = Grid::new(2, 2)
        .place(0, 0, Mon::species(1))
        .persisting(Persistence::Truncates);
    let src_path = saved(&dir, "src.dat", &src);
    let dst_path = saved(&dir, "dst.dat", &dst);
    let src_before = fs::read(&src_path).expect("read");
    let dst_before = fs::read(&dst_path).expect("read");

    let err = MutationEngine::new(Bounds::GEN4)
        .transfer(
            &mut src,
            &src_path,
            &mut dst,
            &dst_path,
            Origin::Container {
                container: 1,
                position: 1,
            },
        )
        .expect_err("destination write fails");

    assert_eq!(err.code, CoreErrorCode::PersistenceFailed);
    assert_eq!(fs::read(&src_path).expect("read"), src_before);
    assert_eq!(fs::read(&dst_path).expect("read"), dst_before);
}

#[test]
fn transfer_writes_both_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut src = Grid::new(2, 2).place(1, 1, Mon::species(150));
    let mut dst = Grid::new(2, 2).place(0, 0, Mon::species(1));
    let src_path = saved(&dir, "src.dat", &src);
    let dst_path = saved(&dir, "dst.dat", &dst);

    let ack = MutationEngine::new(Bounds::GEN4)
        .transfer(
            &mut src,
            &src_path,
            &mut dst,
            &dst_path,
            Origin::Container {
                container: 1,
                position: 1,
            },
        )
        .expect("transfer");

    assert_eq!(ack.destination(), Coordinate::slot(0, 1));
    assert_eq!(fs::read(&src_path).expect("read"), b"");
    assert_eq!(fs::read(&dst_path).expect("read"), b"0/0=1\n0/1=150\n");
}

#[test]
fn stream_only_model_persists_through_temp_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let grid = Grid::new(2, 2).place(1, 0, Mon::species(9));
    let path = dir.path().join("nested/out/save.dat");

    let shape = PersistenceSelector::new()
        .persist(&grid, &path)
        .expect("persist");
    assert_eq!(shape, PersistShape::Stream);
    assert_eq!(fs::read(&path).expect("read"), grid.dump());
    assert!(!temp_path(&path).exists());
}

#[test]
fn utility_shape_used_when_model_exports_nothing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let grid = Grid::new(1, 1).persisting(Persistence::Nothing);
    let path = dir.path().join("save.dat");

    let utility = DumpUtility;
    let shape = PersistenceSelector::with_utility(&utility)
        .persist(&grid, &path)
        .expect("persist");
    assert_eq!(shape, PersistShape::Utility);
    assert_eq!(
        fs::read_to_string(&path).expect("read"),
        "written by utility: Grid"
    );
}

#[test]
fn exhausted_shapes_are_a_persistence_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let grid = Grid::new(1, 1).persisting(Persistence::Declines);
    let err = PersistenceSelector::new()
        .persist(&grid, &dir.path().join("save.dat"))
        .expect_err("nothing works");
    assert_eq!(err.code, CoreErrorCode::PersistenceFailed);
}

#[test]
fn wrapped_records_are_unwrapped_before_extraction() {
    let grid = Grid::new(1, 3)
        .with_store()
        .place(0, 1, Mon::wrapper(Mon::species(25).with("Level", 12)));
    let found = enumerate_containers(&grid, DiscoveryMode::Container, None, &Bounds::GEN4);
    let (position, record) = &found.containers[0].records[0];
    assert_eq!(*position, 1);

    let names = NumericNames;
    let extracted = Extractor::new(Bounds::GEN4, &names)
        .extract(record.as_ref(), Coordinate::slot(0, *position), OriginTag::Container)
        .expect("occupied");
    assert_eq!(extracted.species_id, 25);
    assert_eq!(extracted.species, "#25");
    assert_eq!(extracted.level, 12);
}

#[test]
fn out_of_range_identity_is_not_occupied() {
    let grid = Grid::new(1, 2)
        .with_store()
        .place(0, 0, Mon::species(494))
        .place(0, 1, Mon::species(0));
    let found = enumerate_containers(&grid, DiscoveryMode::Container, None, &Bounds::GEN4);
    assert_eq!(found.occupied(), 0);
}

#[test]
fn moves_outside_bounds_are_dropped() {
    let mon = Mon::species(1)
        .with("Move1", 500)
        .with("Move2", 33)
        .with("Move2_PP", 35)
        .with("Move3", 0);
    let names = NumericNames;
    let extracted = Extractor::new(Bounds::GEN4, &names)
        .extract(&mon, Coordinate::roster(0), OriginTag::Roster)
        .expect("occupied");
    assert_eq!(extracted.moves.len(), 1);
    assert_eq!(extracted.moves[0].move_id, 33);
    assert_eq!(extracted.moves[0].pp, 35);
}
