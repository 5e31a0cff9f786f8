//! Settings file handling and env overrides.
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use cpuwatch::cli::ParsedArgs;
use cpuwatch::settings::{
    load_settings_from, save_settings_to, settings_path, Settings, DB_ENV, INTERVAL_ENV,
};

// Serializes tests that mutate process-wide environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn missing_file_is_created_with_defaults() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("nested").join("settings.json");
    let loaded = load_settings_from(&path);
    assert_eq!(loaded, Settings::default());
    let written = fs::read_to_string(&path).expect("settings.json created");
    assert!(written.contains("interval_secs"), "{written}");
}

#[test]
fn saved_settings_load_back() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("settings.json");
    let settings = Settings {
        interval_secs: 5,
        default_processes: vec!["postgres".into(), "nginx".into()],
        database: Some(td.path().join("cpu.db")),
        rewrite_database: true,
        ..Settings::default()
    };
    save_settings_to(&path, &settings).unwrap();
    assert_eq!(load_settings_from(&path), settings);
}

#[test]
fn malformed_file_yields_defaults_and_is_left_alone() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("settings.json");
    fs::write(&path, "{ not json").unwrap();
    assert_eq!(load_settings_from(&path), Settings::default());
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn settings_path_follows_xdg_config_home() {
    let _guard = ENV_LOCK.lock().unwrap();
    let td = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", td.path());
    assert_eq!(
        settings_path(),
        td.path().join("cpuwatch").join("settings.json")
    );
    std::env::remove_var("XDG_CONFIG_HOME");
}

#[test]
fn env_overrides_sit_between_file_and_flags() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var(INTERVAL_ENV, "3");
    std::env::set_var(DB_ENV, "/tmp/from-env.db");

    let mut settings = Settings {
        interval_secs: 10,
        ..Settings::default()
    };
    settings.apply_env();
    std::env::remove_var(INTERVAL_ENV);
    std::env::remove_var(DB_ENV);

    assert_eq!(settings.interval_secs, 3);
    let run = settings.resolve(&ParsedArgs::default());
    assert_eq!(run.watch.interval, Duration::from_secs(3));
    assert_eq!(run.database, Some(PathBuf::from("/tmp/from-env.db")));

    let flagged = ParsedArgs {
        interval_secs: Some(7),
        ..ParsedArgs::default()
    };
    assert_eq!(
        settings.resolve(&flagged).watch.interval,
        Duration::from_secs(7)
    );
}

#[test]
fn invalid_env_interval_is_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var(INTERVAL_ENV, "soon");
    let mut settings = Settings::default();
    settings.apply_env();
    std::env::remove_var(INTERVAL_ENV);
    assert_eq!(settings.interval_secs, 1);
}
