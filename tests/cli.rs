use assert_cmd::Command;

fn nback(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nback").unwrap();
    cmd.env("HOME", dir.path())
        .env_remove("NBACK_LOG")
        .arg("--config")
        .arg(dir.path().join("prefs.json"))
        .arg("--history")
        .arg(dir.path().join("history.db"));
    cmd
}

#[test]
fn settings_show_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let out = nback(&dir).args(["settings", "show"]).assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let prefs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(prefs["n_back"], 2);
    assert_eq!(prefs["number_of_events"], 20);
    assert_eq!(prefs["event_interval_ms"], 2000);
    assert_eq!(prefs["highscore"], 0);
}

#[test]
fn settings_reset_keeps_highscore() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("prefs.json"),
        r#"{"highscore": 9, "n_back": 5, "grid_size": 4}"#,
    )
    .unwrap();

    let out = nback(&dir).args(["settings", "reset"]).assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let prefs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(prefs["highscore"], 9);
    assert_eq!(prefs["n_back"], 2);
    assert_eq!(prefs["grid_size"], 3);
}

#[test]
fn empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let out = nback(&dir).arg("history").assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    assert_eq!(stdout.trim(), "no sessions recorded");

    nback(&dir)
        .args(["history", "--csv"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn play_requires_a_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let out = nback(&dir).arg("play").write_stdin("").assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("stdin must be a tty"));
}

#[test]
fn rejects_out_of_range_n_back() {
    let dir = tempfile::tempdir().unwrap();
    nback(&dir).args(["play", "--n-back", "9"]).assert().failure();
}
