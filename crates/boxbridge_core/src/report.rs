use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enumerate::{DiscoveryMode, Strategy, enumerate_containers, enumerate_roster};
use crate::extract::{Extractor, FieldSet, OriginTag};
use crate::model::{Coordinate, SaveModel};
use crate::provider::ModelInfo;

pub const UNKNOWN_GAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOptions {
    pub mode: DiscoveryMode,
    /// Restrict container enumeration to one container index.
    pub only_container: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerSummary {
    pub name: String,
    pub tid: i64,
    pub sid: i64,
    pub money: i64,
    pub badges: i64,
    pub played_hours: i64,
    pub played_minutes: i64,
}

impl TrainerSummary {
    pub fn from_model(model: &dyn SaveModel) -> Self {
        Self {
            name: ["OT", "OT_Name", "TrainerName"]
                .iter()
                .find_map(|name| model.property(name))
                .and_then(|v| v.as_text().map(str::to_string))
                .unwrap_or_default(),
            tid: int_property(model, &["TID", "TrainerID"]),
            sid: int_property(model, &["SID", "SecretID"]),
            money: int_property(model, &["Money"]),
            badges: int_property(model, &["Badges"]),
            played_hours: int_property(model, &["PlayedHours"]),
            played_minutes: int_property(model, &["PlayedMinutes"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub index: usize,
    pub name: String,
    pub records: Vec<FieldSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub game: String,
    pub save_class: String,
    pub box_count: usize,
    pub trainer: TrainerSummary,
    pub party: Vec<FieldSet>,
    pub boxes: Vec<ContainerReport>,
}

impl SaveReport {
    pub fn record_count(&self) -> usize {
        self.party.len() + self.boxes.iter().map(|b| b.records.len()).sum::<usize>()
    }
}

/// Enumerates and extracts everything the read surface reports.
pub fn build_report(
    model: &dyn SaveModel,
    info: &ModelInfo,
    options: &ReadOptions,
    extractor: &Extractor<'_>,
) -> SaveReport {
    let bounds = *extractor.bounds();

    let party = enumerate_roster(model, &bounds)
        .into_iter()
        .filter_map(|(position, record)| {
            extractor.extract(record.as_ref(), Coordinate::roster(position), OriginTag::Roster)
        })
        .collect();

    let enumeration = enumerate_containers(model, options.mode, options.only_container, &bounds);
    let source = match enumeration.strategy {
        Some(Strategy::Positional(_)) => OriginTag::Positional,
        _ => OriginTag::Container,
    };
    let enumerated = enumeration.containers.len();
    let boxes = enumeration
        .containers
        .into_iter()
        .map(|container| ContainerReport {
            index: container.index,
            records: container
                .records
                .iter()
                .filter_map(|(position, record)| {
                    let at = Coordinate::slot(container.index, *position);
                    extractor.extract(record.as_ref(), at, source)
                })
                .collect(),
            name: container.name,
        })
        .collect();

    let box_count = find_box_count(model).unwrap_or(enumerated);
    let report = SaveReport {
        game: info
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| UNKNOWN_GAME.to_string()),
        save_class: model.type_name().to_string(),
        box_count,
        trainer: TrainerSummary::from_model(model),
        party,
        boxes,
    };
    debug!(
        target: "boxbridge::enumerate",
        records = report.record_count(),
        "report assembled"
    );
    report
}

fn find_box_count(model: &dyn SaveModel) -> Option<usize> {
    model
        .property("BoxCount")
        .and_then(|v| v.as_i64())
        .and_then(|v| usize::try_from(v).ok())
}

fn int_property(model: &dyn SaveModel, names: &[&str]) -> i64 {
    names
        .iter()
        .find_map(|name| model.property(name))
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}
