use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
    "provider": "document",
    "generations": [4],
    "names": {
        "species": {"25": "Pikachu", "150": "Mewtwo"},
        "moves": {"85": "Thunderbolt"},
        "natures": {"3": "Adamant"}
    }
}"#;

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_boxbridge"))
        .args(args)
        .current_dir(dir)
        .env_remove("BOXBRIDGE_LIBRARY_PATH")
        .env_remove("BOXBRIDGE_LOG")
        .output()
        .expect("failed to run boxbridge CLI")
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("boxbridge-provider.json"), MANIFEST).expect("write manifest");
    dir
}

fn write_document(dir: &Path, name: &str, document: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(document).expect("encode")).expect("write");
    path
}

fn read_document(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).expect("read back")).expect("valid json")
}

/// 18 boxes of 30 slots; `fill` places `(box, slot, species)` records.
fn containers_document(fill: &[(usize, usize, i64)], party: Vec<Value>) -> Value {
    let mut boxes = vec![vec![Value::Null; 30]; 18];
    for &(container, slot, species) in fill {
        boxes[container][slot] = json!({"Species": species, "Level": 30, "Nickname": "Sparky"});
    }
    json!({
        "format": "boxbridge-document/1",
        "schema": "containers",
        "game": "Pearl",
        "generation": 4,
        "trainer": {"OT": "Dawn", "TID": 12345, "Money": 3000},
        "box_count": 18,
        "box_slot_count": 30,
        "party": party,
        "boxes": boxes,
    })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn backup_of(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[test]
fn read_json_lists_party_and_boxes() {
    let dir = workspace();
    let save = write_document(
        dir.path(),
        "save.json",
        &containers_document(&[(2, 5, 25)], vec![json!({"Species": 150, "Level": 70})]),
    );

    let output = run_cli(dir.path(), &["read", &path_arg(&save), "--json"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout is json");
    assert_eq!(value["game"], "Pearl");
    assert_eq!(value["save_class"], "ContainerDocument");
    assert_eq!(value["box_count"], 18);
    assert_eq!(value["trainer"]["name"], "Dawn");
    assert_eq!(value["party"][0]["species"], "Mewtwo");
    assert_eq!(value["party"][0]["box"], -1);

    let boxes = value["boxes"].as_array().expect("boxes array");
    let found: Vec<&Value> = boxes
        .iter()
        .flat_map(|b| b["records"].as_array().into_iter().flatten())
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["species"], "Pikachu");
    assert_eq!(found[0]["box"], 2);
    assert_eq!(found[0]["slot"], 5);
}

#[test]
fn read_text_with_box_filter_shows_only_that_box() {
    let dir = workspace();
    let save = write_document(
        dir.path(),
        "save.json",
        &containers_document(&[(0, 0, 25), (3, 1, 150)], Vec::new()),
    );

    let output = run_cli(dir.path(), &["read", &path_arg(&save), "--box", "3"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mewtwo"));
    assert!(!stdout.contains("Pikachu"));
}

#[test]
fn read_rejects_unlisted_generation() {
    let dir = workspace();
    let mut document = containers_document(&[], Vec::new());
    document["generation"] = json!(7);
    let save = write_document(dir.path(), "save.json", &document);

    let output = run_cli(dir.path(), &["read", &path_arg(&save)]);
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn read_forced_decrypted_mode_on_legacy_document() {
    let dir = workspace();
    let save = write_document(
        dir.path(),
        "legacy.json",
        &json!({
            "format": "boxbridge-document/1",
            "schema": "legacy",
            "box_count": 2,
            "box_slot_count": 4,
            "boxes": [[null, {"Species": 25, "Move1": 85, "Move1_PP": 15}]]
        }),
    );

    let output = run_cli(
        dir.path(),
        &["read", &path_arg(&save), "--mode", "m2", "--json"],
    );
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout is json");
    let record = &value["boxes"][0]["records"][0];
    assert_eq!(record["species"], "Pikachu");
    assert_eq!(record["slot"], 1);
    assert_eq!(record["source"], "positional");
    assert_eq!(record["moves"][0]["name"], "Thunderbolt");
}

#[test]
fn missing_source_exits_3() {
    let dir = workspace();
    let missing = dir.path().join("absent.json");
    let output = run_cli(dir.path(), &["read", &path_arg(&missing)]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn missing_library_exits_5() {
    let dir = tempfile::tempdir().expect("temp dir");
    let save = write_document(dir.path(), "save.json", &containers_document(&[], Vec::new()));
    let empty = tempfile::tempdir().expect("empty library dir");

    let output = run_cli(
        dir.path(),
        &["read", &path_arg(&save), "--library", &path_arg(empty.path())],
    );
    assert_eq!(output.status.code(), Some(5));
    assert!(String::from_utf8_lossy(&output.stderr).contains("boxbridge-provider.json"));
}

#[test]
fn malformed_document_exits_6() {
    let dir = workspace();
    let save = dir.path().join("broken.json");
    fs::write(&save, b"{ not json").expect("write");

    let output = run_cli(dir.path(), &["read", &path_arg(&save)]);
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn relocate_moves_quarantined_record_to_first_free_slot() {
    let dir = workspace();
    let save = write_document(
        dir.path(),
        "save.json",
        &containers_document(&[(17, 4, 25)], Vec::new()),
    );

    let output = run_cli(
        dir.path(),
        &["relocate", "--src", &path_arg(&save), "--slot", "4"],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"status":"ok","op":"relocate","box":0,"slot":0}"#
    );

    let written = read_document(&save);
    assert_eq!(written["boxes"][0][0]["Species"], 25);
    assert!(written["boxes"][17][4].is_null());
    assert!(backup_of(&save).exists());
}

#[test]
fn relocate_with_oversized_box_index_leaves_save_untouched() {
    let dir = workspace();
    let save = write_document(
        dir.path(),
        "save.json",
        &containers_document(&[(17, 4, 25)], Vec::new()),
    );
    let before = fs::read(&save).expect("read");
    let wrapped = ((1u64 << 32) + 17).to_string();

    let output = run_cli(
        dir.path(),
        &["relocate", "--src", &path_arg(&save), "--box", &wrapped, "--slot", "4"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert_eq!(fs::read(&save).expect("read"), before);
    assert!(!backup_of(&save).exists());
}

#[test]
fn relocate_from_empty_slot_exits_11_without_backup() {
    let dir = workspace();
    let save = write_document(dir.path(), "save.json", &containers_document(&[], Vec::new()));
    let before = fs::read(&save).expect("read");

    let output = run_cli(
        dir.path(),
        &["relocate", "--src", &path_arg(&save), "--slot", "0"],
    );
    assert_eq!(output.status.code(), Some(11));
    assert!(!backup_of(&save).exists());
    assert_eq!(fs::read(&save).expect("read"), before);
}

#[test]
fn relocate_without_slot_is_a_usage_error() {
    let dir = workspace();
    let save = write_document(dir.path(), "save.json", &containers_document(&[], Vec::new()));
    let output = run_cli(dir.path(), &["relocate", "--src", &path_arg(&save)]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn transfer_party_record_into_destination_box() {
    let dir = workspace();
    let src = write_document(
        dir.path(),
        "src.json",
        &containers_document(&[], vec![json!({"Species": 150, "Level": 70})]),
    );
    let dst = write_document(
        dir.path(),
        "dst.json",
        &containers_document(&[(0, 0, 25)], Vec::new()),
    );

    let output = run_cli(
        dir.path(),
        &[
            "transfer",
            "--src",
            &path_arg(&src),
            "--dst",
            &path_arg(&dst),
            "--kind",
            "party",
            "--slot",
            "0",
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"status":"ok","op":"transfer","box":0,"slot":1}"#
    );

    assert!(read_document(&src)["party"][0].is_null());
    assert_eq!(read_document(&dst)["boxes"][0][1]["Species"], 150);
    assert!(backup_of(&src).exists());
    assert!(backup_of(&dst).exists());
}

#[test]
fn transfer_into_the_same_file_is_rejected() {
    let dir = workspace();
    let save = write_document(
        dir.path(),
        "save.json",
        &containers_document(&[(1, 1, 25)], Vec::new()),
    );
    let output = run_cli(
        dir.path(),
        &[
            "transfer",
            "--src",
            &path_arg(&save),
            "--dst",
            &path_arg(&save),
            "--kind",
            "box",
            "--box",
            "1",
            "--slot",
            "1",
        ],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(!backup_of(&save).exists());
}
