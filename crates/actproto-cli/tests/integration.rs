#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn actproto(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("actproto").unwrap();
    cmd.current_dir(dir.path()).env_remove("ACTPROTO_CONFIG");
    cmd
}

fn stdout_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// actproto parse
// ---------------------------------------------------------------------------

#[test]
fn parse_stdin_as_json() {
    let dir = TempDir::new().unwrap();
    let out = actproto(&dir)
        .args(["parse", "--json"])
        .write_stdin(">> look first\n::c0.9 ::s0.8\n::read_file @src/lib.rs\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = stdout_json(&out);
    assert_eq!(v["mode"], "strict");
    assert_eq!(v["actions"][0]["kind"], "read_file");
    assert_eq!(v["actions"][0]["target"], "src/lib.rs");
    assert_eq!(v["vitals"]["confidence"], 0.9);
    assert_eq!(v["thoughts"][0], "look first");
}

#[test]
fn parse_file_prints_table() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("turn.txt");
    std::fs::write(
        &file,
        "::create_file @a.py\n<<<\nprint(1)\n>>>\n::run_command @cargo test\n",
    )
    .unwrap();
    actproto(&dir)
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("KIND"))
        .stdout(predicate::str::contains("create_file"))
        .stdout(predicate::str::contains("cargo test"))
        .stdout(predicate::str::contains("batch: yes"));
}

#[test]
fn parse_dash_reads_stdin() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["parse", "-"])
        .write_stdin("::finish")
        .assert()
        .success()
        .stdout(predicate::str::contains("finish"));
}

#[test]
fn parse_strict_mode_fails_without_structure() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["parse", "--mode", "strict"])
        .write_stdin(">>>\n>>>\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("strict parse failed"));
}

#[test]
fn parse_auto_mode_falls_back() {
    let dir = TempDir::new().unwrap();
    let out = actproto(&dir)
        .args(["parse", "--json"])
        .write_stdin(">>>\n>>>\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = stdout_json(&out);
    assert_eq!(v["mode"], "fuzzy");
    assert_eq!(v["confidence"], 0.5);
}

#[test]
fn parse_fuzzy_mode_scores_implicit_content() {
    let dir = TempDir::new().unwrap();
    let out = actproto(&dir)
        .args(["parse", "--mode", "fuzzy", "-j"])
        .write_stdin("::create_file @a.py\nprint(1)\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = stdout_json(&out);
    assert_eq!(v["mode"], "fuzzy");
    assert_eq!(v["actions"][0]["confidence"], 0.7);
    assert_eq!(v["actions"][0]["content"], "print(1)");
}

#[test]
fn parse_tolerates_invalid_utf8() {
    let dir = TempDir::new().unwrap();
    let out = actproto(&dir)
        .args(["parse", "--json"])
        .write_stdin(&b">> caf\xe9 plan\n::finish\n"[..])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = stdout_json(&out);
    assert_eq!(v["actions"][0]["kind"], "finish");
    assert_eq!(v["thoughts"][0], "caf\u{fffd} plan");

    let file = dir.path().join("latin1.txt");
    std::fs::write(&file, b"::read_file @r\xe9sum\xe9.txt\n").unwrap();
    actproto(&dir)
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("read_file"));
}

#[test]
fn parse_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["parse", "nope.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read nope.txt"));
}

// ---------------------------------------------------------------------------
// actproto repair / normalize
// ---------------------------------------------------------------------------

#[test]
fn repair_prints_fixed_text() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .arg("repair")
        .write_stdin(">> plan\nread_file @a.py\n<<<\nx\n")
        .assert()
        .success()
        .stdout(">> plan\n::read_file @a.py\n<<<\nx\n>>>\n");
}

#[test]
fn repair_json_lists_passes() {
    let dir = TempDir::new().unwrap();
    let out = actproto(&dir)
        .args(["repair", "--json"])
        .write_stdin("Sure!\n>> plan\n::response\n<<<\nhi")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = stdout_json(&out);
    assert_eq!(v["converted"], false);
    assert_eq!(v["repairs"][0], "unclosed_blocks");
    assert!(v["corrections"][0]
        .as_str()
        .unwrap()
        .contains("preamble"));
}

#[test]
fn normalize_prints_canonical_form() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .arg("normalize")
        .write_stdin(">> go\nConfidence: 90%\nfinish\n")
        .assert()
        .success()
        .stdout(">> go\n::c0.9\n::finish\n");
}

// ---------------------------------------------------------------------------
// actproto config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_default_file() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let written = std::fs::read_to_string(dir.path().join(".actproto.yaml")).unwrap();
    assert!(written.contains("run_verb: run_command"));

    actproto(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    actproto(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_validate_clean_defaults() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".actproto.yaml"), "run_verb: \"\"\n").unwrap();
    actproto(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_show_names_source() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# source: built-in defaults"))
        .stdout(predicate::str::contains("run_verb: run_command"));
}

#[test]
fn discovered_config_extends_vocabulary() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".actproto.yaml"),
        "verbs: [deploy, finish]\n",
    )
    .unwrap();
    let sub = dir.path().join("nested");
    std::fs::create_dir_all(&sub).unwrap();
    Command::cargo_bin("actproto")
        .unwrap()
        .current_dir(&sub)
        .env_remove("ACTPROTO_CONFIG")
        .arg("repair")
        .write_stdin(">> ship it\ndeploy @prod\n")
        .assert()
        .success()
        .stdout(">> ship it\n::deploy @prod\n");
}

#[test]
fn explicit_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    actproto(&dir)
        .args(["--config", "missing.yaml", "parse"])
        .write_stdin("::finish")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn invalid_config_rejected_for_parsing() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("bad.yaml");
    std::fs::write(&cfg, "fuzzy:\n  implicit_confidence: 3.0\n").unwrap();
    actproto(&dir)
        .env("ACTPROTO_CONFIG", &cfg)
        .arg("parse")
        .write_stdin("::finish")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
