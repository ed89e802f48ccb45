use std::path::PathBuf;

use clap::Parser;
use serial_test::serial;

use super::*;
use crate::domain::types::ContentKind;

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.write_timeout, Duration::from_secs(5));
    assert_eq!(settings.cache.prune_mode, PruneMode::Inline);
    assert_eq!(settings.cache.sweep_interval, Duration::from_secs(1));
    assert_eq!(settings.cache.collect_min_gen_delta, 8);
    assert_eq!(settings.cache.channel_capacity.get(), 1024);
    assert_eq!(settings.cache.consume_batch_limit.get(), 100);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.cache.write_timeout_ms = Some(250);
    raw.cache.prune_mode = Some("inline".to_string());

    let overrides = RuntimeOverrides {
        log_level: Some("debug".to_string()),
        write_timeout_ms: Some(40),
        prune_mode: Some(PruneMode::Background),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.write_timeout, Duration::from_millis(40));
    assert_eq!(settings.cache.prune_mode, PruneMode::Background);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = RuntimeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_write_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.write_timeout_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero timeout");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.write_timeout_ms",
            ..
        }
    ));
}

#[test]
fn zero_channel_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.channel_capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.channel_capacity",
            ..
        }
    ));
}

#[test]
fn unknown_prune_mode_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.prune_mode = Some("lazy".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown mode");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.prune_mode",
            ..
        }
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parses_inspect_command() {
    let args = CliArgs::parse_from([
        "snapcache",
        "inspect",
        "content.json",
        "--kind",
        "media",
        "--log-json",
        "yes",
    ]);

    let Command::Inspect(inspect) = args.command else {
        panic!("expected inspect command");
    };
    assert_eq!(inspect.fixture, PathBuf::from("content.json"));
    assert_eq!(inspect.kind, Some(ContentKind::Media));
    assert_eq!(inspect.overrides.log_json, Some(true));
}

#[test]
fn parses_replay_command() {
    let args = CliArgs::parse_from([
        "snapcache",
        "replay",
        "content.json",
        "--changes",
        "changes.json",
        "--cache-prune-mode",
        "background",
    ]);

    let Command::Replay(replay) = &args.command else {
        panic!("expected replay command");
    };
    assert_eq!(replay.changes, PathBuf::from("changes.json"));
    assert_eq!(args.command.overrides().prune_mode, Some(PruneMode::Background));
}

#[test]
#[serial]
fn file_source_is_layered_under_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(
        &mut file,
        b"[cache]\nwrite_timeout_ms = 1200\nconsume_batch_limit = 7\n",
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from([
        "snapcache",
        "--config-file",
        path.as_str(),
        "inspect",
        "content.json",
        "--cache-write-timeout-ms",
        "300",
    ]);

    let settings = load(&args).expect("settings");
    assert_eq!(settings.cache.write_timeout, Duration::from_millis(300));
    assert_eq!(settings.cache.consume_batch_limit.get(), 7);
}

#[test]
#[serial]
fn environment_overrides_file_defaults() {
    // SAFETY: serialized with every other test that reads the environment.
    unsafe { std::env::set_var("SNAPCACHE__CACHE__PRUNE_MODE", "background") };
    let args = CliArgs::parse_from(["snapcache", "inspect", "content.json"]);
    let settings = load(&args);
    unsafe { std::env::remove_var("SNAPCACHE__CACHE__PRUNE_MODE") };

    let settings = settings.expect("settings");
    assert_eq!(settings.cache.prune_mode, PruneMode::Background);
}
