//! CLI tests for the cpuwatch binary.
use assert_cmd::prelude::*;
use std::process::Command;

fn run(args: &[&str], config_home: &std::path::Path) -> std::process::Output {
    Command::cargo_bin("cpuwatch")
        .expect("binary exists")
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("CPUWATCH_INTERVAL")
        .env_remove("CPUWATCH_DB")
        .output()
        .expect("run cpuwatch")
}

fn text(out: &std::process::Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

#[test]
fn help_mentions_short_and_long_flags() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["--help"], td.path());
    assert!(out.status.success());
    let text = text(&out);
    for flag in ["--processes", "-p", "--interval", "-i", "--filter", "--db", "--no-db", "--ticks"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
    assert!(text.contains("pause"), "help should list interactive commands\n{text}");
}

#[test]
fn help_wins_over_other_flags() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["-p", "firefox", "-i", "2", "--help"], td.path());
    assert!(out.status.success());
    assert!(text(&out).contains("Usage:"));
}

#[test]
fn filter_followed_by_a_flag_lists_everything() {
    let td = tempfile::tempdir().unwrap();
    Command::cargo_bin("cpuwatch")
        .expect("binary exists")
        .env("XDG_CONFIG_HOME", td.path())
        .args(["--filter", "--names"])
        .assert()
        .success();
}

#[test]
fn bad_interval_is_rejected() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["-i", "0", "-p", "x"], td.path());
    assert_eq!(out.status.code(), Some(2));
    assert!(text(&out).contains("invalid interval"));
}

#[test]
fn unknown_flag_is_rejected() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["--frobnicate"], td.path());
    assert_eq!(out.status.code(), Some(2));
    assert!(text(&out).contains("Unexpected argument"));
}

#[test]
fn filter_lists_our_own_process() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["--filter", "cpuwatch"], td.path());
    assert!(out.status.success(), "{}", text(&out));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let me = stdout
        .lines()
        .any(|l| l.split_whitespace().nth(1).is_some_and(|n| n.starts_with("cpuwatch")));
    assert!(me, "own process not listed:\n{stdout}");
}

#[test]
fn names_are_sorted_and_distinct() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["--names"], td.path());
    assert!(out.status.success(), "{}", text(&out));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let names: Vec<&str> = stdout.lines().collect();
    assert!(!names.is_empty());
    assert!(names.windows(2).all(|w| w[0] < w[1]), "not sorted/distinct");
}

#[test]
fn watches_itself_for_a_few_ticks() {
    let td = tempfile::tempdir().unwrap();
    let db = td.path().join("metrics.db");
    let out = run(
        &[
            "-p",
            "cpuwatch",
            "-i",
            "1",
            "--ticks",
            "2",
            "--db",
            db.to_str().unwrap(),
        ],
        td.path(),
    );
    assert!(out.status.success(), "{}", text(&out));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("tick    1"), "chart lines missing:\n{stdout}");
    assert!(stdout.contains("cpuwatch["), "series missing:\n{stdout}");

    let conn = rusqlite::Connection::open(&db).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM CpuWorkload", [], |r| r.get(0))
        .unwrap();
    assert!(rows >= 2, "expected persisted rows, got {rows}");
    let events: Vec<String> = conn
        .prepare("SELECT Event FROM SystemEvents ORDER BY ID")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(events.first().is_some_and(|e| e.starts_with("monitoring started")));
    assert!(events.last().is_some_and(|e| e.starts_with("monitoring stopped")));

    // first run writes default settings
    assert!(td.path().join("cpuwatch").join("settings.json").exists());
}

#[test]
fn no_db_run_still_charts() {
    let td = tempfile::tempdir().unwrap();
    let out = run(&["-p", "cpuwatch", "-i", "1", "--ticks", "1", "--no-db"], td.path());
    assert!(out.status.success(), "{}", text(&out));
    assert!(String::from_utf8_lossy(&out.stdout).contains("tick    0"));
}

#[test]
fn json_mode_prints_one_update_per_line() {
    let td = tempfile::tempdir().unwrap();
    let out = run(
        &["-p", "cpuwatch", "-i", "1", "--ticks", "1", "--no-db", "--json"],
        td.path(),
    );
    assert!(out.status.success(), "{}", text(&out));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let first = stdout.lines().next().expect("one chart update");
    let update: serde_json::Value = serde_json::from_str(first).expect("json line");
    assert!(update["ticks"].as_u64().is_some_and(|t| t >= 1), "{first}");
    assert!(update["series"].is_array(), "{first}");
    assert!(!stdout.contains("mean"), "text summary leaked into json output:\n{stdout}");
}
