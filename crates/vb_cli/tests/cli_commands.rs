use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Value, json};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    data: PathBuf,
    saves: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let data = dir.path().join("Data");
        let saves = dir.path().join("vb");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(saves.join("Players")).unwrap();
        fs::create_dir_all(saves.join("Factions")).unwrap();

        fs::write(
            data.join("NameIdMapping.json"),
            r#"{"Medkit": 10, "Rifle": 20, "Ammo": 30}"#,
        )
        .unwrap();
        fs::write(data.join("Localization.csv"), "Medkit,First Aid Kit,\n").unwrap();
        fs::write(
            data.join("Configuration.json"),
            r#"{"PersonalBackpack": {"MaxBackpacks": 3}}"#,
        )
        .unwrap();

        let fixture = Self {
            _dir: dir,
            data,
            saves,
        };
        fixture.write_save("Players/alice.json", save("Alice", Value::Null));
        fixture.write_save("Players/bob.json", save("Bob", json!("Bob")));
        fixture.write_save(
            "Factions/Faction_1.json",
            json!({
                "LastAccessPlayerName": "Alice",
                "LastAccessFactionName": "Raiders",
                "OpendByName": null,
                "OpendBySteamId": null,
                "Backpacks": []
            }),
        );
        fixture
    }

    fn write_save(&self, relative: &str, document: Value) {
        fs::write(self.saves.join(relative), document.to_string()).unwrap();
    }

    fn read_save(&self, relative: &str) -> Value {
        serde_json::from_slice(&fs::read(self.saves.join(relative)).unwrap()).unwrap()
    }

    fn run(&self, args: &[&str]) -> std::process::Output {
        let data = self.data.to_string_lossy().to_string();
        let saves = self.saves.to_string_lossy().to_string();
        let mut full = vec![
            "--data-dir",
            data.as_str(),
            "--vb-dir",
            saves.as_str(),
            "--poll-interval-ms",
            "5",
        ];
        full.extend_from_slice(args);
        run_cli(&full)
    }
}

fn save(player: &str, lock_name: Value) -> Value {
    json!({
        "LastAccessPlayerName": player,
        "LastAccessFactionName": null,
        "OpendByName": lock_name,
        "OpendBySteamId": null,
        "Backpacks": [{"Items": [
            {"id": 10, "name": null, "count": 4, "slotIdx": 1, "ammo": 0, "decay": 55}
        ]}]
    })
}

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_vb-manager"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run vb-manager CLI")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn cli_lists_players_and_factions() {
    let fixture = Fixture::new();

    let players = fixture.run(&["players"]);
    assert!(players.status.success());
    assert_eq!(stdout(&players), "All players:\nAlice\nBob\n");

    let factions = fixture.run(&["factions", "--json"]);
    assert!(factions.status.success());
    let value: Value = serde_json::from_slice(&factions.stdout).unwrap();
    assert_eq!(value, json!(["Raiders"]));
}

#[test]
fn cli_show_summarizes_padded_backpacks() {
    let fixture = Fixture::new();

    let output = fixture.run(&["show", "player", "alice"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "Alice's backpacks:\n\t0: 1 items\n\t1: 0 items\n\t2: 0 items\n"
    );
}

#[test]
fn cli_show_backpack_uses_localized_names() {
    let fixture = Fixture::new();

    let output = fixture.run(&["show", "player", "Alice", "--backpack", "0"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "1: 4 x First Aid Kit\n");
}

#[test]
fn cli_add_writes_item_to_unlocked_save() {
    let fixture = Fixture::new();

    let output = fixture.run(&[
        "add", "player", "alice", "--backpack", "2", "--slot", "7", "--key", "Rifle", "--count",
        "3",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output).trim(), "Added 3 of Rifle");

    let saved = fixture.read_save("Players/alice.json");
    assert_eq!(saved["Backpacks"].as_array().unwrap().len(), 3);
    assert_eq!(
        saved["Backpacks"][2]["Items"],
        json!([{"id": 20, "name": null, "count": 3, "slotIdx": 7, "ammo": 0, "decay": 0}])
    );
    assert_eq!(saved["Backpacks"][0]["Items"][0]["count"], json!(4));
}

#[test]
fn cli_unknown_key_fails_without_writing() {
    let fixture = Fixture::new();
    let before = fs::read(fixture.saves.join("Players/alice.json")).unwrap();

    let output = fixture.run(&[
        "add", "player", "alice", "--backpack", "0", "--slot", "0", "--key", "Nuke",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("UnknownItem"));
    assert_eq!(
        fs::read(fixture.saves.join("Players/alice.json")).unwrap(),
        before
    );
}

#[test]
fn cli_edit_of_locked_save_times_out() {
    let fixture = Fixture::new();
    let before = fs::read(fixture.saves.join("Players/bob.json")).unwrap();

    let output = fixture.run(&[
        "reset-decay",
        "player",
        "bob",
        "--backpack",
        "0",
        "--slot",
        "1",
        "--timeout",
        "2",
    ]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(fs::read(fixture.saves.join("Players/bob.json")).unwrap(), before);
}

#[test]
fn cli_lock_and_forced_unlock() {
    let fixture = Fixture::new();

    let refused = fixture.run(&["lock", "player", "bob"]);
    assert_eq!(refused.status.code(), Some(3));
    assert_eq!(fixture.read_save("Players/bob.json")["OpendByName"], json!("Bob"));

    let unlocked = fixture.run(&["unlock", "player", "bob"]);
    assert!(unlocked.status.success());
    assert_eq!(fixture.read_save("Players/bob.json")["OpendByName"], Value::Null);

    let locked = fixture.run(&["lock", "player", "bob"]);
    assert!(locked.status.success());
    let saved = fixture.read_save("Players/bob.json");
    assert_eq!(saved["OpendByName"], json!("ADMIN"));
    assert_eq!(saved["OpendBySteamId"], json!(1));
}

#[test]
fn cli_polite_unlock_leaves_foreign_lock() {
    let fixture = Fixture::new();

    let output = fixture.run(&["unlock", "player", "bob", "--only-if-held"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("left as is"));
    assert_eq!(fixture.read_save("Players/bob.json")["OpendByName"], json!("Bob"));
}

#[test]
fn cli_search_reports_hits() {
    let fixture = Fixture::new();

    let output = fixture.run(&["search", "Medkit", "--json"]);
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        value,
        json!([
            {"scope": "player", "name": "Alice", "backpack": 0, "slot": 1, "count": 4},
            {"scope": "player", "name": "Bob", "backpack": 0, "slot": 1, "count": 4}
        ])
    );
}

#[test]
fn cli_save_path_remembers_directory() {
    let fixture = Fixture::new();
    let saves = fixture.saves.to_string_lossy().to_string();
    let data = fixture.data.to_string_lossy().to_string();

    let first = run_cli(&[
        "--data-dir",
        &data,
        "--vb-dir",
        &saves,
        "--save-path",
        "players",
    ]);
    assert!(first.status.success());

    let second = run_cli(&["--data-dir", &data, "players"]);
    assert!(second.status.success());
    assert_eq!(stdout(&second), "All players:\nAlice\nBob\n");
    assert!(config_path(&fixture.data).exists());
}

#[test]
fn cli_without_directory_is_a_usage_error() {
    let fixture = Fixture::new();
    let data = fixture.data.to_string_lossy().to_string();

    let output = run_cli(&["--data-dir", &data, "players"]);
    assert_eq!(output.status.code(), Some(2));
}

fn config_path(data: &Path) -> PathBuf {
    data.join("vbm_config.json")
}
