use std::fmt::Write as _;

use boxbridge_core::extract::{FieldSet, MoveEntry, OriginTag, StatSpread};
use boxbridge_core::mutate::Acknowledgement;
use boxbridge_core::report::{ContainerReport, SaveReport, TrainerSummary};
use serde_json::{Map as JsonMap, Value as JsonValue};

const SLOT_COL_WIDTH: usize = 4;
const SPECIES_COL_WIDTH: usize = 14;
const NICKNAME_COL_WIDTH: usize = 14;
const NATURE_COL_WIDTH: usize = 9;
const ABILITY_COL_WIDTH: usize = 16;
const ITEM_COL_WIDTH: usize = 16;
const MOVE_COL_WIDTH: usize = 18;
const HEADER_RULE: &str = "======================================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    #[default]
    CanonicalV1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextStyle {
    #[default]
    Listing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    /// Adds stat spreads, moves and original-trainer lines under each record.
    pub verbose: bool,
}

pub fn render_json(report: &SaveReport, style: JsonStyle) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => JsonValue::Object(default_json(report)),
    }
}

pub fn render_text(report: &SaveReport, style: TextStyle) -> String {
    render_text_with_options(report, style, TextRenderOptions::default())
}

pub fn render_text_with_options(
    report: &SaveReport,
    style: TextStyle,
    options: TextRenderOptions,
) -> String {
    match style {
        TextStyle::Listing => render_listing(report, options),
    }
}

/// Single-line acknowledgement printed after a committed mutation.
pub fn render_acknowledgement(ack: &Acknowledgement) -> serde_json::Result<String> {
    serde_json::to_string(ack)
}

fn default_json(report: &SaveReport) -> JsonMap<String, JsonValue> {
    let mut out = JsonMap::new();
    out.insert("game".to_string(), JsonValue::String(report.game.clone()));
    out.insert(
        "save_class".to_string(),
        JsonValue::String(report.save_class.clone()),
    );
    out.insert("box_count".to_string(), JsonValue::from(report.box_count));
    out.insert("trainer".to_string(), trainer_to_json(&report.trainer));
    out.insert(
        "party".to_string(),
        JsonValue::Array(report.party.iter().map(field_set_to_json).collect()),
    );
    out.insert(
        "boxes".to_string(),
        JsonValue::Array(report.boxes.iter().map(container_to_json).collect()),
    );
    out
}

fn trainer_to_json(trainer: &TrainerSummary) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("name".to_string(), JsonValue::String(trainer.name.clone()));
    m.insert("tid".to_string(), JsonValue::from(trainer.tid));
    m.insert("sid".to_string(), JsonValue::from(trainer.sid));
    m.insert("money".to_string(), JsonValue::from(trainer.money));
    m.insert("badges".to_string(), JsonValue::from(trainer.badges));
    m.insert(
        "played_hours".to_string(),
        JsonValue::from(trainer.played_hours),
    );
    m.insert(
        "played_minutes".to_string(),
        JsonValue::from(trainer.played_minutes),
    );
    JsonValue::Object(m)
}

fn container_to_json(container: &ContainerReport) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("index".to_string(), JsonValue::from(container.index));
    m.insert("name".to_string(), JsonValue::String(container.name.clone()));
    m.insert(
        "records".to_string(),
        JsonValue::Array(container.records.iter().map(field_set_to_json).collect()),
    );
    JsonValue::Object(m)
}

fn field_set_to_json(f: &FieldSet) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("species".to_string(), JsonValue::String(f.species.clone()));
    m.insert("species_id".to_string(), JsonValue::from(f.species_id));
    m.insert("level".to_string(), JsonValue::from(f.level));
    m.insert("nature".to_string(), JsonValue::String(f.nature.clone()));
    m.insert("nature_id".to_string(), JsonValue::from(f.nature_id));
    m.insert("ability".to_string(), JsonValue::String(f.ability.clone()));
    m.insert("ability_id".to_string(), JsonValue::from(f.ability_id));
    m.insert("form".to_string(), JsonValue::from(f.form));
    m.insert("gender".to_string(), JsonValue::from(f.gender));
    m.insert("friendship".to_string(), JsonValue::from(f.friendship));
    m.insert("item_id".to_string(), JsonValue::from(f.item_id));
    m.insert("item".to_string(), JsonValue::String(f.item.clone()));
    m.insert("ivs".to_string(), spread_to_json(&f.ivs));
    m.insert("evs".to_string(), spread_to_json(&f.evs));
    m.insert("nickname".to_string(), JsonValue::String(f.nickname.clone()));
    m.insert(
        "moves".to_string(),
        JsonValue::Array(f.moves.iter().map(move_to_json).collect()),
    );
    m.insert("box".to_string(), JsonValue::from(f.box_index));
    m.insert("slot".to_string(), JsonValue::from(f.slot_index));
    m.insert(
        "source".to_string(),
        JsonValue::String(origin_name(f.source).to_string()),
    );
    m.insert("ot_tid".to_string(), JsonValue::from(f.ot_tid));
    m.insert("ot_sid".to_string(), JsonValue::from(f.ot_sid));
    m.insert("ot_name".to_string(), JsonValue::String(f.ot_name.clone()));
    JsonValue::Object(m)
}

fn spread_to_json(s: &StatSpread) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("hp".to_string(), JsonValue::from(s.hp));
    m.insert("atk".to_string(), JsonValue::from(s.atk));
    m.insert("def".to_string(), JsonValue::from(s.def));
    m.insert("spa".to_string(), JsonValue::from(s.spa));
    m.insert("spd".to_string(), JsonValue::from(s.spd));
    m.insert("spe".to_string(), JsonValue::from(s.spe));
    JsonValue::Object(m)
}

fn move_to_json(mv: &MoveEntry) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("name".to_string(), JsonValue::String(mv.name.clone()));
    m.insert("move_id".to_string(), JsonValue::from(mv.move_id));
    m.insert("pp".to_string(), JsonValue::from(mv.pp));
    JsonValue::Object(m)
}

fn origin_name(origin: OriginTag) -> &'static str {
    match origin {
        OriginTag::Container => "container",
        OriginTag::Positional => "positional",
        OriginTag::Roster => "roster",
    }
}

fn render_listing(report: &SaveReport, options: TextRenderOptions) -> String {
    let mut out = String::new();
    let trainer = &report.trainer;

    writeln!(out, "{HEADER_RULE}").expect("writing to String cannot fail");
    writeln!(out, "{}  ({})", report.game, report.save_class)
        .expect("writing to String cannot fail");
    writeln!(out, "{HEADER_RULE}").expect("writing to String cannot fail");
    let name = if trainer.name.is_empty() {
        "-"
    } else {
        trainer.name.as_str()
    };
    writeln!(
        out,
        "Trainer: {name}  TID: {:05}  SID: {:05}",
        trainer.tid, trainer.sid
    )
    .expect("writing to String cannot fail");
    writeln!(
        out,
        "Money: {}  Badges: {}  Played: {}:{:02}",
        format_number_with_commas(trainer.money),
        trainer.badges,
        trainer.played_hours,
        trainer.played_minutes
    )
    .expect("writing to String cannot fail");
    writeln!(
        out,
        "Boxes: {}  Records: {}",
        report.box_count,
        report.record_count()
    )
    .expect("writing to String cannot fail");

    writeln!(out).expect("writing to String cannot fail");
    writeln!(out, "Party ({})", report.party.len()).expect("writing to String cannot fail");
    push_records(&mut out, &report.party, options);

    for container in &report.boxes {
        if container.records.is_empty() {
            continue;
        }
        writeln!(out).expect("writing to String cannot fail");
        writeln!(
            out,
            "{} [#{}] ({})",
            container.name,
            container.index,
            container.records.len()
        )
        .expect("writing to String cannot fail");
        push_records(&mut out, &container.records, options);
    }
    out
}

fn push_records(out: &mut String, records: &[FieldSet], options: TextRenderOptions) {
    if records.is_empty() {
        writeln!(out, "  (none)").expect("writing to String cannot fail");
        return;
    }
    for record in records {
        let nickname = if record.nickname.is_empty() || record.nickname == record.species {
            String::new()
        } else {
            format!("\"{}\"", record.nickname)
        };
        let line = format!(
            "  {:>s$} {:<sp$} {:<n$} Lv{:>3} {:<na$} {:<ab$} {:<it$}",
            record.slot_index,
            fit_column(&record.species, SPECIES_COL_WIDTH),
            fit_column(&nickname, NICKNAME_COL_WIDTH),
            record.level,
            fit_column(&record.nature, NATURE_COL_WIDTH),
            fit_column(&record.ability, ABILITY_COL_WIDTH),
            fit_column(&record.item, ITEM_COL_WIDTH),
            s = SLOT_COL_WIDTH,
            sp = SPECIES_COL_WIDTH,
            n = NICKNAME_COL_WIDTH,
            na = NATURE_COL_WIDTH,
            ab = ABILITY_COL_WIDTH,
            it = ITEM_COL_WIDTH,
        );
        writeln!(out, "{}", line.trim_end()).expect("writing to String cannot fail");
        if options.verbose {
            push_details(out, record);
        }
    }
}

fn push_details(out: &mut String, record: &FieldSet) {
    let indent = " ".repeat(SLOT_COL_WIDTH + 3);
    writeln!(out, "{indent}IVs {}", format_spread(&record.ivs))
        .expect("writing to String cannot fail");
    writeln!(out, "{indent}EVs {}", format_spread(&record.evs))
        .expect("writing to String cannot fail");
    if !record.moves.is_empty() {
        let moves: Vec<String> = record
            .moves
            .iter()
            .map(|mv| {
                format!(
                    "{:<w$}",
                    fit_column(&format!("{} ({})", mv.name, mv.pp), MOVE_COL_WIDTH),
                    w = MOVE_COL_WIDTH
                )
            })
            .collect();
        writeln!(out, "{indent}Moves {}", moves.join(" ").trim_end())
            .expect("writing to String cannot fail");
    }
    writeln!(
        out,
        "{indent}OT {} ({:05}/{:05})",
        record.ot_name, record.ot_tid, record.ot_sid
    )
    .expect("writing to String cannot fail");
}

fn format_spread(s: &StatSpread) -> String {
    format!(
        "{}/{}/{}/{}/{}/{}",
        s.hp, s.atk, s.def, s.spa, s.spd, s.spe
    )
}

fn fit_column(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }

    let mut out = String::with_capacity(width);
    for ch in value.chars().take(width - 3) {
        out.push(ch);
    }
    out.push_str("...");
    out
}

fn format_number_with_commas(n: i64) -> String {
    if n < 0 {
        return format!("-{}", format_number_with_commas(-n));
    }
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
